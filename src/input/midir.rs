// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{error::Error, fmt, mem};

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{info, span, warn, Level};

use super::{InputError, RawSender};

/// A connected MIDI input port whose messages are forwarded into an input
/// queue. Dropping it closes the port.
pub struct Input {
    name: String,
    connection: Option<MidiInputConnection<()>>,
}

impl Input {
    /// Returns the full name of the connected port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops forwarding and closes the port.
    pub fn close(mut self) {
        mem::drop(self.connection.take());
        info!(device = self.name, "Closed MIDI input.");
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input").field("name", &self.name).finish()
    }
}

/// Lists the names of all MIDI input ports.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let input = MidiInput::new("pisynth input listing")?;
    Ok(input
        .ports()
        .iter()
        .map(|port| input.port_name(port))
        .collect::<Result<Vec<String>, _>>()?)
}

/// Connects to the single input port whose name contains the given device name.
pub fn connect(device: &str, sender: RawSender) -> Result<Input, Box<dyn Error>> {
    let span = span!(Level::INFO, "connect input (midir)");
    let _enter = span.enter();

    let input = MidiInput::new("pisynth input")?;
    let (name, port) = find_port(&input, device)?;

    let connection = {
        let name = name.clone();
        input.connect(
            &port,
            "pisynth input watcher",
            move |_, raw_event, _| {
                if let Err(e) = sender.send(raw_event) {
                    log_dropped(&name, raw_event.len(), e);
                }
            },
            (),
        )?
    };

    info!(device = name, "Watching MIDI input.");
    Ok(Input {
        name,
        connection: Some(connection),
    })
}

fn find_port(input: &MidiInput, device: &str) -> Result<(String, MidiInputPort), Box<dyn Error>> {
    let mut matches = Vec::new();
    for port in input.ports() {
        let name = input.port_name(&port)?;
        if name.contains(device) {
            matches.push((name, port));
        }
    }

    if matches.is_empty() {
        return Err(format!("no MIDI input found with name {}", device).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many MIDI inputs that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    Ok(matches.swap_remove(0))
}

fn log_dropped(device: &str, bytes: usize, error: InputError) {
    warn!(device, bytes, err = %error, "Dropping MIDI input.");
}
