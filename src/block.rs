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

//! Blocks are the fixed-size units circulated between stream nodes.
//!
//! Every block lives in a slot of a [`Pool`] for its whole life. Nodes only ever
//! see blocks through the scope-guarded [`BlockMut`] (exclusive, writable) and
//! [`BlockRef`] (shared, read-only) handles.

use std::fmt;

mod pool;

pub use pool::{BlockMut, BlockRef, Pool, PoolError, MASK_BITS, MAX_CAPACITY};

/// The number of payload bytes carried by every block.
pub const PAYLOAD_SIZE: usize = 509;

/// The size of an encoded block header.
pub const HEADER_SIZE: usize = 6;

/// The maximum number of simultaneous owners of a block.
pub const MAX_REF_COUNT: u8 = 7;

/// What the payload of a block holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Unframed bytes as read from a device.
    Raw,
    /// A single short MIDI command.
    Midi,
    /// A chunk of a long (Sysex) MIDI message.
    MidiLong,
    /// Framed MIDI commands separated by the delimiter byte.
    MidiMulti,
    /// A kind this crate does not interpret.
    Reserved(u8),
}

impl BlockKind {
    /// Returns the wire value of the kind.
    pub fn as_u8(self) -> u8 {
        match self {
            BlockKind::Raw => 0,
            BlockKind::Midi => 1,
            BlockKind::MidiLong => 2,
            BlockKind::MidiMulti => 3,
            BlockKind::Reserved(value) => value,
        }
    }
}

impl From<u8> for BlockKind {
    fn from(value: u8) -> Self {
        match value {
            0 => BlockKind::Raw,
            1 => BlockKind::Midi,
            2 => BlockKind::MidiLong,
            3 => BlockKind::MidiMulti,
            other => BlockKind::Reserved(other),
        }
    }
}

/// A short MIDI command view of a block payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortMessage {
    pub command: u8,
    pub byte2: u8,
    pub byte3: u8,
    pub byte4: u8,
    pub byte5: u8,
}

impl ShortMessage {
    /// The number of bytes a short message occupies in a payload.
    pub const SIZE: usize = 5;

    fn to_bytes(self) -> [u8; Self::SIZE] {
        [self.command, self.byte2, self.byte3, self.byte4, self.byte5]
    }
}

/// The fixed header that precedes a block payload when it is framed for
/// collaborators outside of the process.
///
/// Layout: ref count, pool index, kind, then the length as two little-endian
/// bytes (the second one occupying the first reserved byte) and one reserved
/// zero byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub ref_count: u8,
    pub pool_index: u8,
    pub kind: BlockKind,
    pub length: u16,
}

impl BlockHeader {
    /// Encodes the header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let length = self.length.to_le_bytes();
        [
            self.ref_count,
            self.pool_index,
            self.kind.as_u8(),
            length[0],
            length[1],
            0,
        ]
    }

    /// Decodes a header from its wire form.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> BlockHeader {
        BlockHeader {
            ref_count: bytes[0],
            pool_index: bytes[1],
            kind: BlockKind::from(bytes[2]),
            length: u16::from_le_bytes([bytes[3], bytes[4]]),
        }
    }
}

/// The unit circulated through the stream graph.
#[derive(Clone)]
pub struct Block {
    pool_index: u8,
    kind: BlockKind,
    length: usize,
    payload: [u8; PAYLOAD_SIZE],
}

impl Block {
    pub(crate) fn empty(pool_index: u8) -> Block {
        Block {
            pool_index,
            kind: BlockKind::Raw,
            length: 0,
            payload: [0; PAYLOAD_SIZE],
        }
    }

    /// Returns the block to its freshly allocated state.
    pub(crate) fn reset(&mut self) {
        self.kind = BlockKind::Raw;
        self.length = 0;
    }

    /// Copies the contents of another block into this one, keeping this block's slot.
    pub(crate) fn copy_from(&mut self, other: &Block) {
        self.kind = other.kind;
        self.length = other.length;
        self.payload[..other.length].copy_from_slice(&other.payload[..other.length]);
    }

    /// The slot this block occupies in its pool.
    pub fn pool_index(&self) -> u8 {
        self.pool_index
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: BlockKind) {
        self.kind = kind;
    }

    /// The number of valid payload bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of payload bytes still free.
    pub fn remaining(&self) -> usize {
        PAYLOAD_SIZE - self.length
    }

    /// The valid payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }

    /// Appends a single byte. Returns false if the payload is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.length == PAYLOAD_SIZE {
            return false;
        }
        self.payload[self.length] = byte;
        self.length += 1;
        true
    }

    /// Appends as many of the given bytes as fit and returns how many were copied.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.remaining());
        self.payload[self.length..self.length + count].copy_from_slice(&bytes[..count]);
        self.length += count;
        count
    }

    /// Replaces the payload with the given bytes, truncating to the payload size.
    pub fn set_data(&mut self, bytes: &[u8]) -> usize {
        self.length = 0;
        self.extend_from_slice(bytes)
    }

    /// Interprets the start of the payload as a short MIDI command.
    pub fn midi(&self) -> ShortMessage {
        ShortMessage {
            command: self.payload[0],
            byte2: self.payload[1],
            byte3: self.payload[2],
            byte4: self.payload[3],
            byte5: self.payload[4],
        }
    }

    /// Stores a short MIDI command of the given length (at most five bytes).
    pub fn set_midi(&mut self, message: ShortMessage, length: usize) {
        let length = length.min(ShortMessage::SIZE);
        self.payload[..ShortMessage::SIZE].copy_from_slice(&message.to_bytes());
        self.kind = BlockKind::Midi;
        self.length = length;
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("pool_index", &self.pool_index)
            .field("kind", &self.kind)
            .field("data", &self.data())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = BlockHeader {
            ref_count: 3,
            pool_index: 17,
            kind: BlockKind::MidiMulti,
            length: 509,
        };

        let encoded = header.encode();
        assert_eq!([3, 17, 3, 0xFD, 0x01, 0], encoded);
        assert_eq!(header, BlockHeader::decode(&encoded));
    }

    #[test]
    fn test_kind_wire_values() {
        assert_eq!(BlockKind::Raw, BlockKind::from(0));
        assert_eq!(BlockKind::MidiLong, BlockKind::from(2));
        assert_eq!(BlockKind::Reserved(9), BlockKind::from(9));
        assert_eq!(9, BlockKind::Reserved(9).as_u8());
    }

    #[test]
    fn test_payload_bounds() {
        let mut block = Block::empty(0);
        assert!(block.is_empty());

        let bytes = vec![0x42u8; PAYLOAD_SIZE + 10];
        assert_eq!(PAYLOAD_SIZE, block.extend_from_slice(&bytes));
        assert_eq!(0, block.remaining());
        assert!(!block.push(0x01));

        assert_eq!(3, block.set_data(&[0x90, 0x40, 0x7F]));
        assert_eq!(&[0x90, 0x40, 0x7F], block.data());
    }

    #[test]
    fn test_short_message() {
        let mut block = Block::empty(4);
        block.set_midi(
            ShortMessage {
                command: 0xB2,
                byte2: 0x07,
                byte3: 0x64,
                ..Default::default()
            },
            3,
        );

        assert_eq!(BlockKind::Midi, block.kind());
        assert_eq!(&[0xB2, 0x07, 0x64], block.data());
        assert_eq!(0x07, block.midi().byte2);
    }
}
