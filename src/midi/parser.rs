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

//! Frames an unstructured MIDI byte stream into complete commands.
//!
//! Bytes arrive as RAW blocks on input 0 or through attached input queues and
//! are buffered in a ring. Each tick the parser frames every complete command
//! it can into one MIDI_MULTI block, each command followed by the delimiter,
//! and transmits it on output 0.

use std::{fmt, sync::Arc};

use tracing::{debug, trace, warn};

use crate::{
    block::{Block, BlockKind, PAYLOAD_SIZE},
    config,
    graph::{NodeContext, StreamNode},
    input::RawReceiver,
    stats::{Fault, FaultCounters},
};

use super::{ring::RingBuffer, DELIMITER, RESET, SYSEX_END, SYSEX_START};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Command,
    Sysex,
}

pub struct MidiParser {
    ring: RingBuffer,
    queues: Vec<RawReceiver>,
    state: State,
    /// The command being collected, or a complete one waiting for room.
    message: Vec<u8>,
    expected: usize,
    complete: bool,
    max_message_length: usize,
    running_status: bool,
    last_status: Option<u8>,
    faults: Arc<FaultCounters>,
}

impl MidiParser {
    pub const INPUTS: usize = 1;
    pub const OUTPUTS: usize = 1;

    pub fn new(config: &config::Parser) -> MidiParser {
        let max_message_length = config.max_message_length().min(PAYLOAD_SIZE - 1);
        MidiParser {
            ring: RingBuffer::new(config.ring_capacity()),
            queues: Vec::new(),
            state: State::Idle,
            message: Vec::with_capacity(max_message_length),
            expected: 0,
            complete: false,
            max_message_length,
            running_status: config.running_status(),
            last_status: None,
            faults: Arc::new(FaultCounters::new()),
        }
    }

    /// Adds an input queue to drain every tick.
    pub fn attach(&mut self, queue: RawReceiver) {
        self.queues.push(queue);
    }

    pub fn faults(&self) -> Arc<FaultCounters> {
        self.faults.clone()
    }

    /// Moves pending input into the ring. Queued blocks are only taken while a
    /// whole block is guaranteed to fit, the rest wait in their queue.
    fn fill(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(block) = ctx.receive(0) {
            let block = block.read();
            match block.kind() {
                BlockKind::Raw => self.feed(block.data()),
                kind => debug!(?kind, "Parser ignoring non-raw block."),
            }
        }

        for i in 0..self.queues.len() {
            while self.ring.free() >= PAYLOAD_SIZE {
                let Some(block) = self.queues[i].try_recv() else {
                    break;
                };
                self.feed(block.read().data());
            }
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        let stored = self.ring.push_slice(bytes);
        if stored < bytes.len() {
            self.faults.record(Fault::Overflow);
            warn!(
                dropped = bytes.len() - stored,
                capacity = self.ring.capacity(),
                "Parser ring buffer full, dropping bytes."
            );
        }
    }

    /// Appends complete commands to the block until it is full or the ring is
    /// empty. Returns the number of commands framed.
    fn frame_into(&mut self, out: &mut Block) -> usize {
        let mut framed = 0;
        loop {
            if self.complete {
                if out.remaining() < self.message.len() + 1 {
                    break;
                }
                out.extend_from_slice(&self.message);
                out.push(DELIMITER);
                self.message.clear();
                self.complete = false;
                framed += 1;
            }

            let Some(byte) = self.ring.pop() else {
                break;
            };
            self.step(byte);
        }
        framed
    }

    fn step(&mut self, byte: u8) {
        if super::is_realtime(byte) {
            if byte == RESET {
                self.abort();
                self.last_status = None;
                self.message.push(byte);
                self.complete = true;
            }
            return;
        }

        match self.state {
            State::Idle => self.begin(byte),
            State::Command => {
                if super::is_status(byte) {
                    self.abort();
                    self.begin(byte);
                    return;
                }
                self.message.push(byte);
                if self.message.len() == self.expected {
                    self.finish();
                }
            }
            State::Sysex => {
                if byte == SYSEX_END {
                    if self.message.len() < self.max_message_length {
                        self.message.push(byte);
                        self.finish();
                    } else {
                        self.overflow();
                    }
                } else if super::is_status(byte) {
                    self.abort();
                    self.begin(byte);
                } else if self.message.len() + 1 < self.max_message_length {
                    // One byte is always left for the terminator.
                    self.message.push(byte);
                } else {
                    self.overflow();
                }
            }
        }
    }

    /// Handles a byte in the idle state.
    fn begin(&mut self, byte: u8) {
        self.message.clear();

        if !super::is_status(byte) {
            match self.last_status {
                Some(status) if self.running_status => {
                    self.start_command(status);
                    self.message.push(byte);
                    if self.message.len() == self.expected {
                        self.finish();
                    }
                }
                _ => trace!(byte, "Discarding data byte without status."),
            }
            return;
        }

        match byte {
            SYSEX_START => {
                self.last_status = None;
                self.message.push(byte);
                self.state = State::Sysex;
            }
            0x80..=0xEF => {
                self.last_status = Some(byte);
                self.start_command(byte);
            }
            _ => {
                // System common messages are not framed, which keeps the
                // delimiter out of framed output.
                self.last_status = None;
                self.state = State::Idle;
                trace!(byte, "Discarding system common byte.");
            }
        }
    }

    fn start_command(&mut self, status: u8) {
        self.message.push(status);
        self.expected = super::command_length(status).unwrap_or(1);
        self.state = State::Command;
    }

    fn finish(&mut self) {
        self.complete = true;
        self.state = State::Idle;
    }

    /// Discards a partially collected command.
    fn abort(&mut self) {
        if self.state != State::Idle {
            self.faults.record(Fault::MalformedFraming);
            debug!(
                collected = self.message.len(),
                "Discarding truncated MIDI command."
            );
        }
        self.message.clear();
        self.state = State::Idle;
    }

    fn overflow(&mut self) {
        self.faults.record(Fault::Overflow);
        warn!(
            max_message_length = self.max_message_length,
            "Discarding oversized Sysex message."
        );
        self.message.clear();
        self.state = State::Idle;
    }
}

impl StreamNode for MidiParser {
    fn update(&mut self, ctx: &mut NodeContext<'_>) {
        self.fill(ctx);
        if self.ring.is_empty() && !self.complete {
            return;
        }

        let Some(mut block) = ctx.allocate() else {
            self.faults.record(Fault::ResourceExhausted);
            debug!(
                buffered = self.ring.len(),
                "No block available for parser output, keeping bytes buffered."
            );
            return;
        };

        let framed = {
            let mut out = block.write();
            out.set_kind(BlockKind::MidiMulti);
            self.frame_into(&mut out)
        };
        if framed == 0 {
            return;
        }

        trace!(commands = framed, "Transmitting framed commands.");
        let block = block.freeze();
        ctx.transmit(&block, 0);
    }
}

impl fmt::Debug for MidiParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiParser")
            .field("state", &self.state)
            .field("buffered", &self.ring.len())
            .field("queues", &self.queues.len())
            .field("faults", &self.faults)
            .finish()
    }
}
