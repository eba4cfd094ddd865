//! DMABUF blocks.
//!
//! Each block is a buffer allocated from the system DMA heap, attached to
//! the IIO buffer and mapped for CPU access. CPU ownership is bracketed
//! with `DMA_BUF_IOCTL_SYNC`: the CPU owns a block from creation or
//! dequeue until the next enqueue.

use std::fs::File;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::Path;
use std::time::Instant;

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use iio_core::{IioError, Result};

use super::{block_error, BlockId, BlockSlots, BlockTarget};
use crate::ioctl::{
    ioctl_nointr, DmaBufSync, DmaHeapAllocation, IioDmabuf, DMA_BUF_IOCTL_SYNC, DMA_BUF_SYNC_END,
    DMA_BUF_SYNC_RW, DMA_BUF_SYNC_START, DMA_HEAP_IOCTL_ALLOC, IIO_BUFFER_DMABUF_ATTACH_IOCTL,
    IIO_BUFFER_DMABUF_CYCLIC, IIO_BUFFER_DMABUF_DETACH_IOCTL, IIO_BUFFER_DMABUF_ENQUEUE_IOCTL,
};
use crate::poll::Readiness;

#[derive(Debug)]
struct DmaBufEntry {
    map: MmapMut,
    fd: OwnedFd,
    enqueued: bool,
}

fn sync(fd: BorrowedFd<'_>, flags: u64) -> Result<()> {
    let mut arg = DmaBufSync { flags };
    // SAFETY: DMA_BUF_IOCTL_SYNC takes a DmaBufSync.
    unsafe { ioctl_nointr(fd, DMA_BUF_IOCTL_SYNC, &mut arg) }.map_err(block_error)?;
    Ok(())
}

fn detach(buffer: BorrowedFd<'_>, dmabuf: BorrowedFd<'_>) {
    let mut raw = dmabuf.as_raw_fd();
    // SAFETY: DMABUF_DETACH takes the dmabuf descriptor as an int.
    if let Err(e) = unsafe { ioctl_nointr(buffer, IIO_BUFFER_DMABUF_DETACH_IOCTL, &mut raw) } {
        warn!(error = %e, "Unable to detach DMABUF");
    }
}

fn allocate(heap: &Path, size: usize) -> Result<OwnedFd> {
    let heap = File::open(heap).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IioError::not_supported("DMA heap"),
        _ => IioError::Io(e),
    })?;

    let mut alloc = DmaHeapAllocation {
        len: size as u64,
        fd_flags: (libc::O_RDWR | libc::O_CLOEXEC) as u32,
        ..DmaHeapAllocation::default()
    };
    // SAFETY: DMA_HEAP_IOCTL_ALLOC takes a DmaHeapAllocation.
    unsafe { ioctl_nointr(heap.as_fd(), DMA_HEAP_IOCTL_ALLOC, &mut alloc) }.map_err(block_error)?;

    // SAFETY: the kernel returned a fresh descriptor that nobody else owns.
    Ok(unsafe { OwnedFd::from_raw_fd(alloc.fd as libc::c_int) })
}

/// DMABUF blocks of one buffer.
#[derive(Debug, Default)]
pub struct DmaBufPool {
    slots: BlockSlots<DmaBufEntry>,
}

impl DmaBufPool {
    pub(crate) fn create(&mut self, target: BlockTarget<'_>, heap: &Path, size: usize) -> Result<BlockId> {
        self.slots.try_insert_with(|_| {
            let fd = allocate(heap, size)?;

            let mut raw = fd.as_raw_fd();
            // SAFETY: DMABUF_ATTACH takes the dmabuf descriptor as an int.
            unsafe { ioctl_nointr(target.fd, IIO_BUFFER_DMABUF_ATTACH_IOCTL, &mut raw) }
                .map_err(block_error)?;

            // SAFETY: the dmabuf is at least `size` bytes and lives as long
            // as the entry holding both the map and the descriptor.
            let map = match unsafe { MmapOptions::new().len(size).map_mut(fd.as_raw_fd()) } {
                Ok(map) => map,
                Err(e) => {
                    detach(target.fd, fd.as_fd());
                    return Err(IioError::from_os(e));
                }
            };

            if let Err(e) = sync(fd.as_fd(), DMA_BUF_SYNC_START | DMA_BUF_SYNC_RW) {
                detach(target.fd, fd.as_fd());
                return Err(e);
            }

            debug!(size, fd = fd.as_raw_fd(), "Created DMABUF block");
            Ok(DmaBufEntry {
                map,
                fd,
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

        sync(entry.fd.as_fd(), DMA_BUF_SYNC_END | DMA_BUF_SYNC_RW)?;

        let mut req = IioDmabuf {
            fd: entry.fd.as_raw_fd() as u32,
            flags: if cyclic { IIO_BUFFER_DMABUF_CYCLIC } else { 0 },
            bytes_used: bytes_used as u64,
        };
        // SAFETY: DMABUF_ENQUEUE takes an IioDmabuf.
        unsafe { ioctl_nointr(target.fd, IIO_BUFFER_DMABUF_ENQUEUE_IOCTL, &mut req) }
            .map_err(block_error)?;
        entry.enqueued = true;
        Ok(())
    }

    pub(crate) fn dequeue(&mut self, target: BlockTarget<'_>, id: BlockId, nonblock: bool) -> Result<()> {
        let entry = self.slots.get_mut(id)?;
        if !entry.enqueued {
            return Err(IioError::invalid_argument(format!("{} is not enqueued", id)));
        }

        // The dmabuf descriptor becomes ready once the transfer fence signals.
        let readiness = if target.is_tx {
            Readiness::Writable
        } else {
            Readiness::Readable
        };
        target
            .poller
            .wait(entry.fd.as_fd(), readiness, (!nonblock).then(Instant::now))?;

        sync(entry.fd.as_fd(), DMA_BUF_SYNC_START | DMA_BUF_SYNC_RW)?;
        entry.enqueued = false;
        Ok(())
    }

    pub(crate) fn free(&mut self, target: BlockTarget<'_>, id: BlockId) -> Result<()> {
        let entry = self.slots.remove(id)?;
        detach(target.fd, entry.fd.as_fd());
        Ok(())
    }

    pub(crate) fn release(&mut self, target: BlockTarget<'_>) {
        for entry in self.slots.drain() {
            detach(target.fd, entry.fd.as_fd());
        }
    }
}
