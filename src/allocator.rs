// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Block allocation and the pin protocol.
//!
//! The allocator hands out `(BlockId, offset)` handles into fixed-size blocks
//! of raw bytes. Readers and writers pin blocks into a [`ChunkState`] cache;
//! a pinned handle stays valid until the cache is cleared. Blocks here are
//! plain in-memory buffers, but the pin protocol matches what a spilling
//! buffer manager would require, so one can be substituted behind the same
//! interface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

/// Size of a freshly allocated block. Allocations larger than this get a
/// dedicated block of exactly the requested size.
pub const BLOCK_SIZE: usize = 256 * 1024;

/// Identifier of one block owned by an allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

/// One block of raw bytes. Append writes and scan reads take short
/// read/write locks; the block itself is kept alive by pinned `Arc` handles.
pub struct Block {
    data: RwLock<Box<[u8]>>,
}

impl Block {
    fn new(capacity: usize) -> Self {
        Block {
            data: RwLock::new(vec![0; capacity].into_boxed_slice()),
        }
    }

    pub fn with_read<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.data.read())
    }

    pub fn with_write<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.data.write())
    }
}

/// A per-reader (or per-appender) cache of pinned block handles.
///
/// Dropping or clearing the state releases the references.
#[derive(Default)]
pub struct ChunkState {
    handles: HashMap<BlockId, Arc<Block>>,
}

impl ChunkState {
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }
}

struct AllocatorInner {
    blocks: Vec<Arc<Block>>,
    /// Bytes already handed out from the last block.
    head_used: usize,
    /// Capacity of the last block.
    head_capacity: usize,
    allocated_bytes: usize,
}

/// Allocates vector buffers, packing them into shared blocks.
///
/// The allocator is reference-shared between a collection and everything it
/// was combined from; an optional byte budget turns exhaustion into
/// [`Error::OutOfMemory`].
pub struct ColumnDataAllocator {
    inner: Mutex<AllocatorInner>,
    budget: Option<usize>,
}

impl Default for ColumnDataAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnDataAllocator {
    pub fn new() -> Self {
        ColumnDataAllocator {
            inner: Mutex::new(AllocatorInner {
                blocks: Vec::new(),
                head_used: 0,
                head_capacity: 0,
                allocated_bytes: 0,
            }),
            budget: None,
        }
    }

    /// An allocator refusing to grow past `budget` bytes of block memory.
    pub fn with_budget(budget: usize) -> Self {
        ColumnDataAllocator {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Reserves `size` bytes, returning the block and the offset within it.
    pub fn allocate(&self, size: usize) -> Result<(BlockId, u32)> {
        let mut inner = self.inner.lock();
        if inner.blocks.is_empty() || inner.head_capacity - inner.head_used < size {
            let capacity = size.max(BLOCK_SIZE);
            if let Some(budget) = self.budget {
                if inner.allocated_bytes + capacity > budget {
                    return Err(Error::OutOfMemory {
                        requested: capacity,
                        budget,
                    });
                }
            }
            inner.blocks.push(Arc::new(Block::new(capacity)));
            inner.head_used = 0;
            inner.head_capacity = capacity;
            inner.allocated_bytes += capacity;
        }
        let block_id = BlockId((inner.blocks.len() - 1) as u32);
        let offset = inner.head_used as u32;
        inner.head_used += size;
        Ok((block_id, offset))
    }

    /// Pins `block_id` into `state`, returning a handle that stays valid for
    /// the lifetime of the cache entry.
    pub fn pin(&self, state: &mut ChunkState, block_id: BlockId) -> Arc<Block> {
        if let Some(handle) = state.handles.get(&block_id) {
            return handle.clone();
        }
        let handle = self.inner.lock().blocks[block_id.0 as usize].clone();
        state.handles.insert(block_id, handle.clone());
        handle
    }

    /// Total bytes of block memory handed out so far.
    pub fn allocated_bytes(&self) -> usize {
        self.inner.lock().allocated_bytes
    }
}
