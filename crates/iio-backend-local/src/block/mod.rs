//! Zero-copy blocks.
//!
//! A block is memory shared with the kernel, so samples move without a copy
//! through `read(2)`/`write(2)`. Two kernel interfaces provide it:
//!
//! - DMABUF: buffers allocated from a DMA heap and attached to the IIO
//!   buffer ([`DmaBufPool`])
//! - the older mapped block ring ([`MmapRing`])
//!
//! The first block created on a buffer negotiates the interface, DMABUF
//! first. The winner is kept for every later block of that buffer.

mod dmabuf;
mod mmap;

use std::io;
use std::os::fd::BorrowedFd;
use std::path::Path;

use tracing::{debug, info};

use iio_core::{IioError, Result};

use crate::poll::TimedPoller;

pub use dmabuf::DmaBufPool;
pub use mmap::{MmapRing, NB_BLOCKS};

/// Handle of a block inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Slot number of the block.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// Kernel interface backing the blocks of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStrategy {
    /// DMA heap buffers attached to the IIO buffer.
    DmaBuf,
    /// The mapped block ring.
    Mmap,
}

/// What a strategy borrows from its buffer for one call.
#[derive(Debug, Clone, Copy)]
pub struct BlockTarget<'a> {
    /// Data descriptor of the buffer.
    pub fd: BorrowedFd<'a>,
    /// Waiter bound to the buffer's cancel descriptor and timeout.
    pub poller: TimedPoller<'a>,
    /// Whether the buffer streams towards the device.
    pub is_tx: bool,
}

/// Map a block ioctl failure, treating a missing device as unsupported.
pub(crate) fn block_error(err: io::Error) -> IioError {
    match err.raw_os_error() {
        Some(libc::ENODEV) => IioError::not_supported("zero-copy blocks"),
        _ => IioError::from_os(err),
    }
}

/// Slot table giving blocks stable ids.
#[derive(Debug)]
pub(crate) struct BlockSlots<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for BlockSlots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> BlockSlots<T> {
    /// Fill the lowest free slot with the value built for that slot number.
    pub fn try_insert_with(&mut self, build: impl FnOnce(usize) -> Result<T>) -> Result<BlockId> {
        let idx = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len());
        let value = build(idx)?;
        if idx == self.slots.len() {
            self.slots.push(Some(value));
        } else {
            self.slots[idx] = Some(value);
        }
        Ok(BlockId(idx))
    }

    pub fn get(&self, id: BlockId) -> Result<&T> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| unknown_block(id))
    }

    pub fn get_mut(&mut self, id: BlockId) -> Result<&mut T> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| unknown_block(id))
    }

    pub fn remove(&mut self, id: BlockId) -> Result<T> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or_else(|| unknown_block(id))
    }

    /// Live blocks in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().flatten()
    }

    /// Number of live blocks.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Take every live block out, leaving the table empty.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.slots.drain(..).flatten()
    }
}

fn unknown_block(id: BlockId) -> IioError {
    IioError::invalid_argument(format!("unknown {}", id))
}

#[derive(Debug, Default)]
enum Blocks {
    #[default]
    Unnegotiated,
    DmaBuf(DmaBufPool),
    Mmap(MmapRing),
}

/// Blocks of one buffer and the strategy they use.
#[derive(Debug, Default)]
pub struct BlockEngine {
    blocks: Blocks,
    cyclic_enqueued: bool,
}

impl BlockEngine {
    /// The negotiated strategy, if any block was ever created.
    pub fn strategy(&self) -> Option<BlockStrategy> {
        match self.blocks {
            Blocks::Unnegotiated => None,
            Blocks::DmaBuf(_) => Some(BlockStrategy::DmaBuf),
            Blocks::Mmap(_) => Some(BlockStrategy::Mmap),
        }
    }

    /// Whether a zero-copy strategy was negotiated.
    pub fn is_zero_copy(&self) -> bool {
        self.strategy().is_some()
    }

    /// Create a block of `size` bytes.
    ///
    /// Fails with [`IioError::NotImplemented`] when the kernel offers
    /// neither strategy.
    pub fn create(&mut self, target: BlockTarget<'_>, heap: &Path, size: usize) -> Result<BlockId> {
        if size == 0 {
            return Err(IioError::invalid_argument("block size must be nonzero"));
        }

        match &mut self.blocks {
            Blocks::DmaBuf(pool) => return pool.create(target, heap, size),
            Blocks::Mmap(ring) => return ring.create(target, size),
            Blocks::Unnegotiated => {}
        }

        let mut pool = DmaBufPool::default();
        match pool.create(target, heap, size) {
            Ok(id) => {
                info!(size, "Using DMABUF blocks");
                self.blocks = Blocks::DmaBuf(pool);
                return Ok(id);
            }
            Err(e) if e.is_not_supported() => debug!(error = %e, "DMABUF unavailable"),
            Err(e) => return Err(e),
        }

        let mut ring = MmapRing::default();
        match ring.create(target, size) {
            Ok(id) => {
                info!(size, "Using mapped block ring");
                self.blocks = Blocks::Mmap(ring);
                return Ok(id);
            }
            Err(e) => {
                ring.release(target);
                if !e.is_not_supported() {
                    return Err(e);
                }
                debug!(error = %e, "Mapped block ring unavailable");
            }
        }

        Err(IioError::NotImplemented {
            message: "zero-copy blocks are not supported by this buffer".to_string(),
        })
    }

    /// Memory of a block.
    pub fn data(&self, id: BlockId) -> Result<&[u8]> {
        match &self.blocks {
            Blocks::DmaBuf(pool) => pool.data(id),
            Blocks::Mmap(ring) => ring.data(id),
            Blocks::Unnegotiated => Err(unknown_block(id)),
        }
    }

    /// Mutable memory of a block.
    pub fn data_mut(&mut self, id: BlockId) -> Result<&mut [u8]> {
        match &mut self.blocks {
            Blocks::DmaBuf(pool) => pool.data_mut(id),
            Blocks::Mmap(ring) => ring.data_mut(id),
            Blocks::Unnegotiated => Err(unknown_block(id)),
        }
    }

    /// Hand a block to the kernel. Only one cyclic enqueue is allowed per
    /// buffer.
    pub fn enqueue(
        &mut self,
        target: BlockTarget<'_>,
        id: BlockId,
        bytes_used: usize,
        cyclic: bool,
    ) -> Result<()> {
        if cyclic && self.cyclic_enqueued {
            return Err(IioError::invalid_argument(
                "a cyclic block was already enqueued on this buffer",
            ));
        }
        match &mut self.blocks {
            Blocks::DmaBuf(pool) => pool.enqueue(target, id, bytes_used, cyclic)?,
            Blocks::Mmap(ring) => ring.enqueue(target, id, bytes_used, cyclic)?,
            Blocks::Unnegotiated => return Err(unknown_block(id)),
        }
        self.cyclic_enqueued |= cyclic;
        Ok(())
    }

    /// Wait for the kernel to hand a block back.
    pub fn dequeue(&mut self, target: BlockTarget<'_>, id: BlockId, nonblock: bool) -> Result<()> {
        match &mut self.blocks {
            Blocks::DmaBuf(pool) => pool.dequeue(target, id, nonblock),
            Blocks::Mmap(ring) => ring.dequeue(target, id, nonblock),
            Blocks::Unnegotiated => Err(unknown_block(id)),
        }
    }

    /// Destroy a block.
    pub fn free(&mut self, target: BlockTarget<'_>, id: BlockId) -> Result<()> {
        match &mut self.blocks {
            Blocks::DmaBuf(pool) => pool.free(target, id),
            Blocks::Mmap(ring) => ring.free(target, id),
            Blocks::Unnegotiated => Err(unknown_block(id)),
        }
    }

    /// Destroy every block. The negotiated strategy is kept.
    pub fn release(&mut self, target: BlockTarget<'_>) {
        match &mut self.blocks {
            Blocks::DmaBuf(pool) => pool.release(target),
            Blocks::Mmap(ring) => ring.release(target),
            Blocks::Unnegotiated => {}
        }
    }
}
