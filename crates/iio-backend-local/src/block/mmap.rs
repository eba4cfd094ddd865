//! Mapped block ring.
//!
//! The kernel allocates a fixed ring of equally sized blocks on the first
//! `BLOCK_ALLOC` call. Each block is queried for its offset and mapped from
//! the buffer descriptor. The ring is freed once its last block goes away.

use std::os::fd::AsRawFd;
use std::time::Instant;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use iio_core::{IioError, Result};

use super::{block_error, BlockId, BlockSlots, BlockTarget};
use crate::ioctl::{
    ioctl_nointr, BlockAllocRequest, RingBlock, BLOCK_ALLOC_IOCTL, BLOCK_DEQUEUE_IOCTL,
    BLOCK_ENQUEUE_IOCTL, BLOCK_FLAG_CYCLIC, BLOCK_FREE_IOCTL, BLOCK_QUERY_IOCTL,
};
use crate::poll::Readiness;

/// Blocks requested from the kernel per ring.
pub const NB_BLOCKS: u32 = 4;

#[derive(Debug)]
struct RingEntry {
    desc: RingBlock,
    map: MmapMut,
    enqueued: bool,
}

/// Blocks of one buffer's mapped ring.
#[derive(Debug, Default)]
pub struct MmapRing {
    slots: BlockSlots<RingEntry>,
    block_size: Option<u32>,
    count: u32,
}

impl MmapRing {
    pub(crate) fn create(&mut self, target: BlockTarget<'_>, size: usize) -> Result<BlockId> {
        let size = u32::try_from(size)
            .map_err(|_| IioError::invalid_argument("block size exceeds the ring limit"))?;

        match self.block_size {
            None => {
                let mut req = BlockAllocRequest {
                    kind: u32::from(target.is_tx),
                    size,
                    count: NB_BLOCKS,
                    id: 0,
                };
                // SAFETY: BLOCK_ALLOC takes a BlockAllocRequest.
                unsafe { ioctl_nointr(target.fd, BLOCK_ALLOC_IOCTL, &mut req) }
                    .map_err(block_error)?;
                self.block_size = Some(size);
                self.count = req.count.min(NB_BLOCKS);
                debug!(size, count = self.count, "Allocated block ring");
            }
            Some(ring_size) if ring_size != size => {
                return Err(IioError::invalid_argument(format!(
                    "ring blocks are {} bytes, {} requested",
                    ring_size, size
                )));
            }
            Some(_) => {}
        }

        if self.slots.live() >= self.count as usize {
            return Err(IioError::Busy {
                what: "mapped block ring".to_string(),
            });
        }

        self.slots.try_insert_with(|idx| {
            let mut desc = RingBlock {
                id: idx as u32,
                ..RingBlock::default()
            };
            // SAFETY: BLOCK_QUERY takes a RingBlock.
            unsafe { ioctl_nointr(target.fd, BLOCK_QUERY_IOCTL, &mut desc) }
                .map_err(block_error)?;

            // SAFETY: the region is owned by the kernel ring and stays
            // valid until BLOCK_FREE, which only runs after every map is gone.
            let map = unsafe {
                MmapOptions::new()
                    .len(desc.size as usize)
                    .offset(u64::from(desc.offset))
                    .map_mut(target.fd.as_raw_fd())
            }
            .map_err(IioError::from_os)?;

            Ok(RingEntry {
                desc,
                map,
                enqueued: false,
            })
        })
    }

    pub(crate) fn data(&self, id: BlockId) -> Result<&[u8]> {
        self.slots.get(id).map(|e| &e.map[..])
    }

    pub(crate) fn data_mut(&mut self, id: BlockId) -> Result<&mut [u8]> {
        self.slots.get_mut(id).map(|e| &mut e.map[..])
    }

    pub(crate) fn enqueue(
        &mut self,
        target: BlockTarget<'_>,
        id: BlockId,
        bytes_used: usize,
        cyclic: bool,
    ) -> Result<()> {
        let entry = self.slots.get_mut(id)?;
        if bytes_used > entry.map.len() {
            return Err(IioError::invalid_argument(format!(
                "{} bytes do not fit in a {} byte block",
                bytes_used,
                entry.map.len()
            )));
        }

        entry.desc.bytes_used = bytes_used as u32;
        entry.desc.flags = if cyclic { BLOCK_FLAG_CYCLIC } else { 0 };
        let mut desc = entry.desc;
        // SAFETY: BLOCK_ENQUEUE takes a RingBlock.
        unsafe { ioctl_nointr(target.fd, BLOCK_ENQUEUE_IOCTL, &mut desc) }.map_err(block_error)?;
        entry.enqueued = true;
        Ok(())
    }

    pub(crate) fn dequeue(&mut self, target: BlockTarget<'_>, id: BlockId, nonblock: bool) -> Result<()> {
        let entry = self.slots.get(id)?;
        if !entry.enqueued {
            return Err(IioError::invalid_argument(format!("{} is not enqueued", id)));
        }

        let readiness = if target.is_tx {
            Readiness::Writable
        } else {
            Readiness::Readable
        };
        target
            .poller
            .wait(target.fd, readiness, (!nonblock).then(Instant::now))?;

        let mut desc = RingBlock::default();
        // SAFETY: BLOCK_DEQUEUE takes a RingBlock.
        unsafe { ioctl_nointr(target.fd, BLOCK_DEQUEUE_IOCTL, &mut desc) }.map_err(block_error)?;
        self.settle(id, desc)
    }

    /// Record a block the kernel handed back, which may not be the one the
    /// caller waited for.
    fn settle(&mut self, id: BlockId, desc: RingBlock) -> Result<()> {
        let wanted = self.slots.get(id)?.desc.id;
        let Some(entry) = self.slots.iter_mut().find(|e| e.desc.id == desc.id) else {
            return Err(IioError::protocol(
                "mapped block ring",
                format!("dequeued unknown block {}", desc.id),
            ));
        };

        entry.desc.bytes_used = desc.bytes_used;
        entry.desc.timestamp = desc.timestamp;
        entry.enqueued = false;

        if desc.id != wanted {
            return Err(IioError::protocol(
                "mapped block ring",
                format!("dequeued block {} while waiting for {}", desc.id, wanted),
            ));
        }
        Ok(())
    }

    pub(crate) fn free(&mut self, target: BlockTarget<'_>, id: BlockId) -> Result<()> {
        drop(self.slots.remove(id)?);
        if self.slots.live() == 0 {
            self.release(target);
        }
        Ok(())
    }

    /// Unmap every block and free the kernel ring.
    pub(crate) fn release(&mut self, target: BlockTarget<'_>) {
        self.slots.drain().for_each(drop);
        if self.block_size.take().is_none() {
            return;
        }
        self.count = 0;

        // SAFETY: BLOCK_FREE takes no argument.
        let ret = unsafe { ioctl_nointr::<libc::c_void>(target.fd, BLOCK_FREE_IOCTL, std::ptr::null_mut()) };
        match ret {
            Ok(_) => debug!("Freed block ring"),
            Err(e) => warn!(error = %e, "Unable to free block ring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(blocks: u32) -> (MmapRing, Vec<BlockId>) {
        let mut ring = MmapRing::default();
        let ids = (0..blocks)
            .map(|_| {
                ring.slots
                    .try_insert_with(|idx| {
                        Ok(RingEntry {
                            desc: RingBlock {
                                id: idx as u32,
                                size: 64,
                                ..RingBlock::default()
                            },
                            map: MmapMut::map_anon(64).unwrap(),
                            enqueued: true,
                        })
                    })
                    .unwrap()
            })
            .collect();
        (ring, ids)
    }

    #[test]
    fn test_settle_expected_block() {
        let (mut ring, ids) = ring(2);
        let desc = RingBlock {
            id: 0,
            bytes_used: 48,
            timestamp: 7,
            ..RingBlock::default()
        };

        ring.settle(ids[0], desc).unwrap();
        let entry = ring.slots.get(ids[0]).unwrap();
        assert!(!entry.enqueued);
        assert_eq!(entry.desc.bytes_used, 48);
        assert_eq!(entry.desc.timestamp, 7);
        assert!(ring.slots.get(ids[1]).unwrap().enqueued);
    }

    #[test]
    fn test_settle_other_block_updates_it() {
        let (mut ring, ids) = ring(2);
        let desc = RingBlock {
            id: 1,
            bytes_used: 32,
            timestamp: 99,
            ..RingBlock::default()
        };

        let err = ring.settle(ids[0], desc).unwrap_err();
        assert!(err.is_protocol());

        // The block the kernel returned is no longer queued.
        let other = ring.slots.get(ids[1]).unwrap();
        assert!(!other.enqueued);
        assert_eq!(other.desc.bytes_used, 32);
        assert_eq!(other.desc.timestamp, 99);
        assert!(ring.slots.get(ids[0]).unwrap().enqueued);

        // Still waiting on the first one.
        let desc = RingBlock {
            id: 0,
            bytes_used: 16,
            ..RingBlock::default()
        };
        ring.settle(ids[0], desc).unwrap();
        assert!(!ring.slots.get(ids[0]).unwrap().enqueued);
    }

    #[test]
    fn test_settle_unknown_block() {
        let (mut ring, ids) = ring(1);
        let desc = RingBlock {
            id: 3,
            ..RingBlock::default()
        };
        assert!(ring.settle(ids[0], desc).unwrap_err().is_protocol());
        assert!(ring.slots.get(ids[0]).unwrap().enqueued);
    }
}
