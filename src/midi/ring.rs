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

/// A fixed byte ring buffer. The capacity is a power of two so positions wrap
/// with a mask; the read and write positions only ever increase.
pub(crate) struct RingBuffer {
    buffer: Box<[u8]>,
    mask: usize,
    read: usize,
    write: usize,
}

impl RingBuffer {
    /// Creates a ring buffer, rounding the capacity up to a power of two.
    pub fn new(capacity: usize) -> RingBuffer {
        let capacity = capacity.max(1).next_power_of_two();
        RingBuffer {
            buffer: vec![0; capacity].into_boxed_slice(),
            mask: capacity - 1,
            read: 0,
            write: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.write.wrapping_sub(self.read)
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Appends as many bytes as fit and returns how many were stored.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.free());
        for &byte in &bytes[..count] {
            self.buffer[self.write & self.mask] = byte;
            self.write = self.write.wrapping_add(1);
        }
        count
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buffer[self.read & self.mask];
        self.read = self.read.wrapping_add(1);
        Some(byte)
    }
}
