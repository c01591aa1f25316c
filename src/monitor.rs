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
use tracing::info;

use crate::midi::events::{MidiEvents, SubscriptionId};

/// Logs every dispatched event. Returns the subscriptions, one per event list,
/// in the order the lists are declared on `MidiEvents`.
pub fn attach(events: &MidiEvents) -> Vec<SubscriptionId> {
    vec![
        events.note_off().subscribe(|e| {
            info!(channel = e.channel, note = e.note, velocity = e.velocity, "Note off.")
        }),
        events.note_on().subscribe(|e| {
            info!(channel = e.channel, note = e.note, velocity = e.velocity, "Note on.")
        }),
        events.poly_pressure().subscribe(|e| {
            info!(channel = e.channel, note = e.note, pressure = e.pressure, "Poly pressure.")
        }),
        events.control_change().subscribe(|e| {
            info!(
                channel = e.channel,
                controller = e.controller,
                value = e.value,
                "Control change."
            )
        }),
        events
            .program_change()
            .subscribe(|e| info!(channel = e.channel, program = e.program, "Program change.")),
        events.channel_pressure().subscribe(|e| {
            info!(channel = e.channel, pressure = e.pressure, "Channel pressure.")
        }),
        events.pitch_bend().subscribe(|e| {
            info!(channel = e.channel, value = e.value, offset = e.offset(), "Pitch bend.")
        }),
        events
            .sysex()
            .subscribe(|bytes| info!(length = bytes.len(), data = ?bytes, "Sysex.")),
        events.reset().subscribe(|_| info!("System reset.")),
    ]
}
