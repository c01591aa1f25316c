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

//! Fixed-capacity slab allocator for blocks.
//!
//! Free slots are tracked in 32-bit availability masks, one bit per slot, with
//! bit 31 of a word standing for the first slot of that word. Allocation takes
//! the first set bit found by a leading-zero count. Reference counts and mask
//! updates share a single mutex, so a pool can be used from producer threads and
//! the scheduler thread at the same time.

use std::{fmt, sync::Arc};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

use super::{Block, BlockHeader, HEADER_SIZE, MAX_REF_COUNT};

/// The number of slots tracked by one availability mask word.
pub const MASK_BITS: usize = 32;

/// The largest capacity whose slot indices still fit in a one-byte pool index.
pub const MAX_CAPACITY: usize = 256;

/// The mask bit for the first slot in a word.
const FIRST_SLOT_BIT: u32 = 1 << 31;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("pool {name}: capacity {capacity} must be a non-zero multiple of 32")]
    Capacity { name: String, capacity: usize },

    #[error("pool {name}: capacity {capacity} exceeds the maximum of 256")]
    TooLarge { name: String, capacity: usize },
}

/// The bookkeeping guarded by the pool mutex.
struct PoolState {
    /// Availability masks, a set bit is a free slot.
    masks: Vec<u32>,
    /// Current owners of each slot.
    ref_counts: Vec<u8>,
    /// Number of live blocks.
    in_use: usize,
}

impl PoolState {
    /// Claims the first free slot.
    fn claim(&mut self) -> Option<usize> {
        let (word_index, word) = self
            .masks
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != 0)?;

        let bit = word.leading_zeros() as usize;
        *word &= !(FIRST_SLOT_BIT >> bit);

        let index = word_index * MASK_BITS + bit;
        self.ref_counts[index] = 1;
        self.in_use += 1;
        Some(index)
    }

    /// Adds an owner to the slot unless it is already at the maximum.
    fn retain(&mut self, index: usize) -> bool {
        if self.ref_counts[index] >= MAX_REF_COUNT {
            return false;
        }
        self.ref_counts[index] += 1;
        true
    }

    /// Removes an owner from the slot, freeing it when the last owner goes away.
    fn release(&mut self, index: usize) {
        match self.ref_counts[index] {
            0 => error!(index, "Released a block that was not allocated."),
            1 => {
                self.ref_counts[index] = 0;
                self.masks[index / MASK_BITS] |= FIRST_SLOT_BIT >> (index % MASK_BITS);
                self.in_use -= 1;
            }
            _ => self.ref_counts[index] -= 1,
        }
    }
}

struct Shared {
    name: String,
    capacity: usize,
    state: Mutex<PoolState>,
    blocks: Box<[RwLock<Block>]>,
}

/// A fixed-capacity pool of blocks. Cloning a pool yields another handle to the
/// same storage.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Creates a pool with the given capacity. All storage is allocated here and
    /// never grows or shrinks afterwards.
    pub fn new(name: &str, capacity: usize) -> Result<Pool, PoolError> {
        if capacity == 0 || capacity % MASK_BITS != 0 {
            return Err(PoolError::Capacity {
                name: name.to_string(),
                capacity,
            });
        }
        if capacity > MAX_CAPACITY {
            return Err(PoolError::TooLarge {
                name: name.to_string(),
                capacity,
            });
        }

        let blocks = (0..capacity)
            .map(|index| RwLock::new(Block::empty(index as u8)))
            .collect::<Vec<RwLock<Block>>>()
            .into_boxed_slice();

        debug!(pool = name, capacity, "Initialized block pool.");

        Ok(Pool {
            shared: Arc::new(Shared {
                name: name.to_string(),
                capacity,
                state: Mutex::new(PoolState {
                    masks: vec![u32::MAX; capacity / MASK_BITS],
                    ref_counts: vec![0; capacity],
                    in_use: 0,
                }),
                blocks,
            }),
        })
    }

    /// Allocates a block. Returns None when the pool is exhausted, which callers
    /// must treat as backpressure.
    pub fn allocate(&self) -> Option<BlockMut> {
        let index = self.shared.state.lock().claim();
        let Some(index) = index else {
            debug!(pool = self.shared.name, "Block pool exhausted.");
            return None;
        };

        self.shared.blocks[index].write().reset();
        Some(BlockMut(Handle {
            shared: self.shared.clone(),
            index,
        }))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// The number of live blocks.
    pub fn in_use(&self) -> usize {
        self.shared.state.lock().in_use
    }

    /// The number of free slots.
    pub fn available(&self) -> usize {
        self.shared.capacity - self.in_use()
    }

    /// A snapshot of the availability masks.
    pub fn masks(&self) -> Vec<u32> {
        self.shared.state.lock().masks.clone()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// One owner's claim on a slot. Dropping it releases the claim.
struct Handle {
    shared: Arc<Shared>,
    index: usize,
}

impl Handle {
    fn block(&self) -> &RwLock<Block> {
        &self.shared.blocks[self.index]
    }

    fn ref_count(&self) -> u8 {
        self.shared.state.lock().ref_counts[self.index]
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.state.lock().release(self.index);
    }
}

/// The exclusive handle to a block. Only this handle can write the payload.
pub struct BlockMut(Handle);

impl BlockMut {
    pub fn pool_index(&self) -> u8 {
        self.0.index as u8
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Block> {
        self.0.block().read()
    }

    pub fn write(&mut self) -> RwLockWriteGuard<'_, Block> {
        self.0.block().write()
    }

    /// Gives up write access so the block can be published to other nodes.
    pub fn freeze(self) -> BlockRef {
        BlockRef(self.0)
    }

    /// Returns the block to its pool.
    pub fn release(self) {}
}

impl fmt::Debug for BlockMut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockMut({}#{})", self.0.shared.name, self.0.index)
    }
}

/// A shared, read-only handle to a block.
pub struct BlockRef(Handle);

impl BlockRef {
    pub fn pool_index(&self) -> u8 {
        self.0.index as u8
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Block> {
        self.0.block().read()
    }

    /// The current number of owners.
    pub fn ref_count(&self) -> u8 {
        self.0.ref_count()
    }

    /// Creates another owner of this block. Returns None when the block already
    /// has the maximum number of owners.
    pub fn try_share(&self) -> Option<BlockRef> {
        if !self.0.shared.state.lock().retain(self.0.index) {
            return None;
        }
        Some(BlockRef(Handle {
            shared: self.0.shared.clone(),
            index: self.0.index,
        }))
    }

    /// Regains write access if this is the only owner.
    pub fn try_into_mut(self) -> Result<BlockMut, BlockRef> {
        if self.ref_count() == 1 {
            Ok(BlockMut(self.0))
        } else {
            Err(self)
        }
    }

    /// The header describing this block.
    pub fn header(&self) -> BlockHeader {
        let block = self.read();
        BlockHeader {
            ref_count: self.ref_count(),
            pool_index: block.pool_index(),
            kind: block.kind(),
            length: block.len() as u16,
        }
    }

    /// Writes the header and payload into the given buffer and returns the
    /// number of bytes written, or None if the buffer is too small.
    pub fn encode_frame(&self, out: &mut [u8]) -> Option<usize> {
        let header = self.header().encode();
        let block = self.read();
        let size = HEADER_SIZE + block.len();
        if out.len() < size {
            return None;
        }
        out[..HEADER_SIZE].copy_from_slice(&header);
        out[HEADER_SIZE..size].copy_from_slice(block.data());
        Some(size)
    }

    /// Gives up this owner's claim on the block.
    pub fn release(self) {}
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRef({}#{})", self.0.shared.name, self.0.index)
    }
}
