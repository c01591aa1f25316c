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

//! Raw byte input from producer threads.
//!
//! Producers copy bytes into RAW blocks from the raw pool and push them into a
//! bounded queue that the MIDI parser drains on the scheduler thread. Nothing
//! here ever blocks the producer.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::block::{BlockKind, BlockRef, Pool, PAYLOAD_SIZE};

pub mod midir;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("no free block in pool {0}")]
    ResourceExhausted(String),

    #[error("input queue is full")]
    QueueFull,

    #[error("input queue is disconnected")]
    Disconnected,
}

/// Creates a bounded input queue whose sender allocates from the given pool.
pub fn queue(pool: Pool, depth: usize) -> (RawSender, RawReceiver) {
    let (sender, receiver) = crossbeam_channel::bounded(depth);
    (RawSender { pool, sender }, RawReceiver { receiver })
}

/// The producer side of an input queue.
#[derive(Clone)]
pub struct RawSender {
    pool: Pool,
    sender: Sender<BlockRef>,
}

impl RawSender {
    /// Sends the bytes as one or more RAW blocks of at most one payload each.
    /// On error, blocks already queued for earlier chunks stay queued.
    pub fn send(&self, bytes: &[u8]) -> Result<(), InputError> {
        for chunk in bytes.chunks(PAYLOAD_SIZE) {
            let Some(mut block) = self.pool.allocate() else {
                return Err(InputError::ResourceExhausted(self.pool.name().to_string()));
            };
            {
                let mut data = block.write();
                data.set_kind(BlockKind::Raw);
                data.set_data(chunk);
            }

            self.sender
                .try_send(block.freeze())
                .map_err(|e| match e {
                    TrySendError::Full(_) => InputError::QueueFull,
                    TrySendError::Disconnected(_) => InputError::Disconnected,
                })?;
        }
        Ok(())
    }
}

impl fmt::Debug for RawSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawSender")
            .field("pool", &self.pool.name())
            .field("queued", &self.sender.len())
            .finish()
    }
}

/// The consumer side of an input queue.
pub struct RawReceiver {
    receiver: Receiver<BlockRef>,
}

impl RawReceiver {
    /// Takes the next queued block without waiting.
    pub fn try_recv(&self) -> Option<BlockRef> {
        self.receiver.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
