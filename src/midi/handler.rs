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

//! Decodes framed MIDI commands and dispatches them to subscribers.

use std::{fmt, sync::Arc};

use midly::{
    live::{LiveEvent, SystemRealtime},
    MidiMessage,
};
use tracing::{debug, trace, warn};

use crate::{
    block::{Block, BlockKind},
    graph::{NodeContext, StreamNode},
    stats::{Fault, FaultCounters},
};

use super::{
    events::{
        ChannelPressure, ControlChange, MidiEvents, NoteOff, NoteOn, PitchBend, PolyPressure,
        ProgramChange,
    },
    DELIMITER, SYSEX_END, SYSEX_START,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Sysex,
    /// Skipping the rest of an oversized Sysex message.
    Discard,
}

pub struct MidiHandler {
    events: Arc<MidiEvents>,
    state: State,
    /// Sysex reassembly buffer. Never grows past its initial capacity.
    sysex: Vec<u8>,
    max_sysex_length: usize,
    faults: Arc<FaultCounters>,
}

impl MidiHandler {
    pub const INPUTS: usize = 1;
    pub const OUTPUTS: usize = 0;

    pub fn new(events: Arc<MidiEvents>, max_sysex_length: usize) -> MidiHandler {
        MidiHandler {
            events,
            state: State::Idle,
            sysex: Vec::with_capacity(max_sysex_length),
            max_sysex_length,
            faults: Arc::new(FaultCounters::new()),
        }
    }

    pub fn events(&self) -> Arc<MidiEvents> {
        self.events.clone()
    }

    pub fn faults(&self) -> Arc<FaultCounters> {
        self.faults.clone()
    }

    /// Processes one received block. MIDI_MULTI payloads are split on the
    /// delimiter and every piece is handled as if received on its own.
    pub fn handle_block(&mut self, block: &Block) {
        match block.kind() {
            BlockKind::MidiMulti => {
                for command in block.data().split(|byte| *byte == DELIMITER) {
                    if !command.is_empty() {
                        self.process(command);
                    }
                }
            }
            BlockKind::Midi | BlockKind::MidiLong => self.process(block.data()),
            kind => debug!(?kind, "Handler ignoring block."),
        }
    }

    /// Processes a byte sequence holding whole commands or a piece of a Sysex
    /// message.
    pub fn process(&mut self, bytes: &[u8]) {
        let mut rest = bytes;
        while !rest.is_empty() {
            rest = match self.state {
                State::Idle => self.command(rest),
                State::Sysex => self.sysex(rest),
                State::Discard => self.discard(rest),
            };
        }
    }

    /// Handles the command at the start of the bytes and returns what follows it.
    fn command<'a>(&mut self, bytes: &'a [u8]) -> &'a [u8] {
        let status = bytes[0];
        if status == SYSEX_START {
            self.sysex.clear();
            self.sysex.push(status);
            self.state = State::Sysex;
            return &bytes[1..];
        }

        let Some(length) = super::message_length(status) else {
            let skipped = bytes
                .iter()
                .position(|byte| super::is_status(*byte))
                .unwrap_or(bytes.len());
            self.faults.record(Fault::MalformedFraming);
            debug!(skipped, "Discarding data bytes without status.");
            return &bytes[skipped..];
        };

        if bytes.len() < length {
            self.faults.record(Fault::MalformedFraming);
            debug!(status, length = bytes.len(), "Discarding truncated command.");
            return &[];
        }

        let (command, rest) = bytes.split_at(length);
        if let Some(position) = command[1..].iter().position(|byte| super::is_status(*byte)) {
            self.faults.record(Fault::MalformedFraming);
            debug!(status, "Discarding interrupted command.");
            return &bytes[position + 1..];
        }

        self.dispatch(command);
        rest
    }

    /// Collects Sysex bytes and returns whatever follows the end of the message.
    fn sysex<'a>(&mut self, bytes: &'a [u8]) -> &'a [u8] {
        for (i, &byte) in bytes.iter().enumerate() {
            if byte == SYSEX_END {
                self.state = State::Idle;
                if self.push_sysex(byte) {
                    self.dispatch_sysex();
                }
                return &bytes[i + 1..];
            }
            if super::is_realtime(byte) {
                continue;
            }
            if super::is_status(byte) {
                self.faults.record(Fault::MalformedFraming);
                debug!(
                    collected = self.sysex.len(),
                    "Sysex interrupted by status byte, discarding."
                );
                self.sysex.clear();
                self.state = State::Idle;
                return &bytes[i..];
            }
            if !self.push_sysex(byte) {
                self.state = State::Discard;
                return &bytes[i + 1..];
            }
        }
        &[]
    }

    /// Drops the remainder of an overflowed Sysex up to its end or the next
    /// status byte. The overflow has already been counted.
    fn discard<'a>(&mut self, bytes: &'a [u8]) -> &'a [u8] {
        match bytes
            .iter()
            .position(|byte| super::is_status(*byte) && !super::is_realtime(*byte))
        {
            Some(i) if bytes[i] == SYSEX_END => {
                self.state = State::Idle;
                &bytes[i + 1..]
            }
            Some(i) => {
                self.state = State::Idle;
                &bytes[i..]
            }
            None => &[],
        }
    }

    fn push_sysex(&mut self, byte: u8) -> bool {
        if self.sysex.len() >= self.max_sysex_length {
            self.faults.record(Fault::Overflow);
            warn!(
                max_sysex_length = self.max_sysex_length,
                "Discarding oversized Sysex message."
            );
            self.sysex.clear();
            return false;
        }
        self.sysex.push(byte);
        true
    }

    fn dispatch_sysex(&mut self) {
        if !self.events.is_enabled() {
            self.faults.record(Fault::Muted);
        } else {
            self.events.sysex().emit(&self.sysex);
        }
        self.sysex.clear();
    }

    fn dispatch(&self, command: &[u8]) {
        let event = match LiveEvent::parse(command) {
            Ok(event) => event,
            Err(e) => {
                self.faults.record(Fault::MalformedFraming);
                debug!(err = %e, "Unable to decode MIDI command.");
                return;
            }
        };

        if !self.events.is_enabled() {
            self.faults.record(Fault::Muted);
            return;
        }

        match event {
            LiveEvent::Midi { channel, message } => {
                let channel = channel.as_int();
                match message {
                    MidiMessage::NoteOff { key, vel } => self.events.note_off().emit(&NoteOff {
                        channel,
                        note: key.as_int(),
                        velocity: vel.as_int(),
                    }),
                    MidiMessage::NoteOn { key, vel } => self.events.note_on().emit(&NoteOn {
                        channel,
                        note: key.as_int(),
                        velocity: vel.as_int(),
                    }),
                    MidiMessage::Aftertouch { key, vel } => {
                        self.events.poly_pressure().emit(&PolyPressure {
                            channel,
                            note: key.as_int(),
                            pressure: vel.as_int(),
                        })
                    }
                    MidiMessage::Controller { controller, value } => {
                        self.events.control_change().emit(&ControlChange {
                            channel,
                            controller: controller.as_int(),
                            value: value.as_int(),
                        })
                    }
                    MidiMessage::ProgramChange { program } => {
                        self.events.program_change().emit(&ProgramChange {
                            channel,
                            program: program.as_int(),
                        })
                    }
                    MidiMessage::ChannelAftertouch { vel } => {
                        self.events.channel_pressure().emit(&ChannelPressure {
                            channel,
                            pressure: vel.as_int(),
                        })
                    }
                    MidiMessage::PitchBend { bend } => self.events.pitch_bend().emit(&PitchBend {
                        channel,
                        value: bend.0.as_int(),
                    }),
                }
            }
            LiveEvent::Realtime(SystemRealtime::Reset) => self.events.reset().emit(&()),
            other => trace!(event = ?other, "Ignoring system message."),
        }
    }
}

impl StreamNode for MidiHandler {
    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        let Some(block) = ctx.receive(0) else {
            return;
        };
        self.handle_block(&block.read());
    }
}

impl fmt::Debug for MidiHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiHandler")
            .field("state", &self.state)
            .field("enabled", &self.events.is_enabled())
            .field("faults", &self.faults)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::{
        block::{BlockKind, Pool},
        midi::events::{
            ChannelPressure, ControlChange, MidiEvents, NoteOff, NoteOn, PitchBend,
            PolyPressure, ProgramChange,
        },
        stats::Fault,
        testutil::{record, Recorded},
    };

    use super::MidiHandler;

    fn handler(max_sysex_length: usize) -> MidiHandler {
        MidiHandler::new(Arc::new(MidiEvents::default()), max_sysex_length)
    }

    fn block(pool: &Pool, kind: BlockKind, bytes: &[u8]) -> crate::block::BlockRef {
        let mut block = pool.allocate().unwrap();
        {
            let mut data = block.write();
            data.set_kind(kind);
            data.set_data(bytes);
        }
        block.freeze()
    }

    #[test]
    fn test_channel_messages() {
        let mut handler = handler(256);
        let recorded = record(&handler.events());

        handler.process(&[0x83, 0x3C, 0x40]);
        handler.process(&[0x90, 0x3C, 0x64]);
        handler.process(&[0x91, 0x3C, 0x00]);
        handler.process(&[0xA2, 0x3C, 0x22]);
        handler.process(&[0xB0, 0x07, 0x64]);
        handler.process(&[0xC4, 0x05]);
        handler.process(&[0xD5, 0x33]);
        handler.process(&[0xE0, 0x00, 0x40]);
        handler.process(&[0xEF, 0x7F, 0x7F]);

        assert_eq!(
            vec![
                Recorded::NoteOff(NoteOff {
                    channel: 3,
                    note: 0x3C,
                    velocity: 0x40
                }),
                Recorded::NoteOn(NoteOn {
                    channel: 0,
                    note: 0x3C,
                    velocity: 0x64
                }),
                // Velocity zero stays a note-on.
                Recorded::NoteOn(NoteOn {
                    channel: 1,
                    note: 0x3C,
                    velocity: 0
                }),
                Recorded::PolyPressure(PolyPressure {
                    channel: 2,
                    note: 0x3C,
                    pressure: 0x22
                }),
                Recorded::ControlChange(ControlChange {
                    channel: 0,
                    controller: 7,
                    value: 100
                }),
                Recorded::ProgramChange(ProgramChange {
                    channel: 4,
                    program: 5
                }),
                Recorded::ChannelPressure(ChannelPressure {
                    channel: 5,
                    pressure: 0x33
                }),
                Recorded::PitchBend(PitchBend {
                    channel: 0,
                    value: 0x2000
                }),
                Recorded::PitchBend(PitchBend {
                    channel: 15,
                    value: 0x3FFF
                }),
            ],
            *recorded.lock()
        );
        assert_eq!(0, handler.faults().errors());
    }

    #[test]
    fn test_multi_block_is_split() {
        let pool = Pool::new("test", 32).unwrap();
        let mut handler = handler(256);
        let recorded = record(&handler.events());

        let multi = block(
            &pool,
            BlockKind::MidiMulti,
            &[0x90, 0x3C, 0x64, 0xF5, 0xFF, 0xF5, 0x80, 0x3C, 0x40, 0xF5],
        );
        handler.handle_block(&multi.read());

        assert_eq!(
            vec![
                Recorded::NoteOn(NoteOn {
                    channel: 0,
                    note: 0x3C,
                    velocity: 0x64
                }),
                Recorded::Reset,
                Recorded::NoteOff(NoteOff {
                    channel: 0,
                    note: 0x3C,
                    velocity: 0x40
                }),
            ],
            *recorded.lock()
        );
    }

    #[test]
    fn test_sysex_spanning_blocks() {
        let pool = Pool::new("test", 32).unwrap();
        let mut handler = handler(256);
        let recorded = record(&handler.events());

        handler.handle_block(&block(&pool, BlockKind::MidiLong, &[0xF0, 0x00, 0x35]).read());
        assert!(recorded.lock().is_empty());
        handler.handle_block(&block(&pool, BlockKind::MidiLong, &[0x56, 0xF8, 0x30]).read());
        handler.handle_block(&block(&pool, BlockKind::Midi, &[0x45, 0xF7, 0xC0, 0x01]).read());

        assert_eq!(
            vec![
                Recorded::Sysex(vec![0xF0, 0x00, 0x35, 0x56, 0x30, 0x45, 0xF7]),
                Recorded::ProgramChange(ProgramChange {
                    channel: 0,
                    program: 1
                }),
            ],
            *recorded.lock()
        );
    }

    #[test]
    fn test_sysex_overflow_resets() {
        let mut handler = handler(8);
        let recorded = record(&handler.events());

        let mut bytes = vec![0xF0];
        bytes.extend([0x01; 10]);
        bytes.push(0xF7);
        handler.process(&bytes);
        assert!(recorded.lock().is_empty());
        assert_eq!(1, handler.faults().count(Fault::Overflow));
        assert_eq!(1, handler.faults().errors());

        // The remainder of an oversized message may arrive in later blocks.
        handler.process(&[0xF0, 1, 2, 3, 4, 5, 6, 7, 8]);
        handler.process(&[9, 0xF8, 10]);
        handler.process(&[11, 0xF7]);
        assert!(recorded.lock().is_empty());
        assert_eq!(2, handler.faults().count(Fault::Overflow));
        assert_eq!(2, handler.faults().errors());

        // The buffer is usable again, up to exactly the limit.
        handler.process(&[0xF0, 1, 2, 3, 4, 5, 6, 0xF7]);
        assert_eq!(
            vec![Recorded::Sysex(vec![0xF0, 1, 2, 3, 4, 5, 6, 0xF7])],
            *recorded.lock()
        );
    }

    #[test]
    fn test_sysex_interrupted_by_status() {
        let mut handler = handler(256);
        let recorded = record(&handler.events());

        handler.process(&[0xF0, 0x01, 0x02]);
        handler.process(&[0x90, 0x40, 0x7F]);

        assert_eq!(
            vec![Recorded::NoteOn(NoteOn {
                channel: 0,
                note: 0x40,
                velocity: 0x7F
            })],
            *recorded.lock()
        );
        assert_eq!(1, handler.faults().count(Fault::MalformedFraming));
    }

    #[test]
    fn test_malformed_commands_are_discarded() {
        let mut handler = handler(256);
        let recorded = record(&handler.events());

        // Truncated.
        handler.process(&[0x90, 0x40]);
        // Data without status.
        handler.process(&[0x40, 0x7F]);
        // Interrupted by another status byte.
        handler.process(&[0xB0, 0x90, 0x40, 0x7F]);

        assert_eq!(
            vec![Recorded::NoteOn(NoteOn {
                channel: 0,
                note: 0x40,
                velocity: 0x7F
            })],
            *recorded.lock()
        );
        assert_eq!(3, handler.faults().count(Fault::MalformedFraming));
    }

    #[test]
    fn test_mute_gate() {
        let mut handler = handler(256);
        let events = handler.events();
        let recorded = record(&events);

        events.set_enabled(false);
        handler.process(&[0x90, 0x40, 0x7F]);
        handler.process(&[0xF0, 0x01, 0xF7]);
        assert!(recorded.lock().is_empty());
        assert_eq!(2, handler.faults().count(Fault::Muted));
        assert_eq!(0, handler.faults().errors());

        events.set_enabled(true);
        handler.process(&[0x80, 0x40, 0x00]);
        assert_eq!(
            vec![Recorded::NoteOff(NoteOff {
                channel: 0,
                note: 0x40,
                velocity: 0
            })],
            *recorded.lock()
        );
    }

    #[test]
    fn test_unsubscribed_callback_stops_firing() {
        let mut handler = handler(256);
        let events = handler.events();
        let recorded = record(&events);
        let extra = Arc::new(parking_lot::Mutex::new(0));
        let id = {
            let extra = extra.clone();
            events.note_on().subscribe(move |_| *extra.lock() += 1)
        };

        handler.process(&[0x90, 0x40, 0x7F]);
        assert!(events.note_on().unsubscribe(id));
        handler.process(&[0x90, 0x41, 0x7F]);

        assert_eq!(1, *extra.lock());
        assert_eq!(2, recorded.lock().len());
    }
}
