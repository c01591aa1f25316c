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
use std::{
    sync::Arc,
    thread,
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;

use crate::{
    graph::{NodeContext, StreamNode},
    midi::events::{
        ChannelPressure, ControlChange, MidiEvents, NoteOff, NoteOn, PitchBend, PolyPressure,
        ProgramChange,
    },
};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        let elapsed = start.elapsed();
        if elapsed.is_err() {
            panic!("System time error");
        }
        let elapsed = elapsed.unwrap();

        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }
        thread::sleep(tick);
    }
}

/// A node whose behavior is given by a closure.
pub struct FnNode<F>(pub F);

impl<F> StreamNode for FnNode<F>
where
    F: FnMut(&mut NodeContext<'_>) + Send,
{
    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        (self.0)(ctx)
    }
}

/// A node that stores the payload of every block it receives on input 0.
pub fn capture(frames: Arc<Mutex<Vec<Vec<u8>>>>) -> impl StreamNode {
    FnNode(move |ctx: &mut NodeContext<'_>| {
        if let Some(block) = ctx.receive(0) {
            frames.lock().push(block.read().data().to_vec());
        }
    })
}

/// Everything a subscriber can observe, in one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    NoteOff(NoteOff),
    NoteOn(NoteOn),
    PolyPressure(PolyPressure),
    ControlChange(ControlChange),
    ProgramChange(ProgramChange),
    ChannelPressure(ChannelPressure),
    PitchBend(PitchBend),
    Sysex(Vec<u8>),
    Reset,
}

/// Subscribes to every event list and records the dispatched events in order.
pub fn record(events: &MidiEvents) -> Arc<Mutex<Vec<Recorded>>> {
    let recorded = Arc::new(Mutex::new(Vec::new()));

    macro_rules! record_into {
        ($list:ident, $variant:ident) => {{
            let recorded = recorded.clone();
            events
                .$list()
                .subscribe(move |event| recorded.lock().push(Recorded::$variant(*event)));
        }};
    }
    record_into!(note_off, NoteOff);
    record_into!(note_on, NoteOn);
    record_into!(poly_pressure, PolyPressure);
    record_into!(control_change, ControlChange);
    record_into!(program_change, ProgramChange);
    record_into!(channel_pressure, ChannelPressure);
    record_into!(pitch_bend, PitchBend);

    {
        let recorded = recorded.clone();
        events
            .sysex()
            .subscribe(move |bytes: &[u8]| recorded.lock().push(Recorded::Sysex(bytes.to_vec())));
    }
    {
        let recorded = recorded.clone();
        events
            .reset()
            .subscribe(move |_: &()| recorded.lock().push(Recorded::Reset));
    }

    recorded
}
