//! Kernel ioctl numbers and argument layouts used by the buffer engine.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << 30) | ((size as u32) << 16) | ((ty as u32) << 8) | nr as u32
}

const fn io(ty: u8, nr: u8) -> u32 {
    ioc(IOC_NONE, ty, nr, 0)
}

const fn iow<T>(ty: u8, nr: u8) -> u32 {
    ioc(IOC_WRITE, ty, nr, std::mem::size_of::<T>())
}

const fn iowr<T>(ty: u8, nr: u8) -> u32 {
    ioc(IOC_READ | IOC_WRITE, ty, nr, std::mem::size_of::<T>())
}

/// Argument of `IIO_BUFFER_DMABUF_ENQUEUE_IOCTL`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct IioDmabuf {
    pub fd: u32,
    pub flags: u32,
    pub bytes_used: u64,
}

/// Argument of `DMA_HEAP_IOCTL_ALLOC`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DmaHeapAllocation {
    pub len: u64,
    pub fd: u32,
    pub fd_flags: u32,
    pub heap_flags: u64,
}

/// Argument of `DMA_BUF_IOCTL_SYNC`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct DmaBufSync {
    pub flags: u64,
}

/// Argument of `BLOCK_ALLOC_IOCTL`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockAllocRequest {
    pub kind: u32,
    pub size: u32,
    pub count: u32,
    pub id: u32,
}

/// One block of the mapped ring, as the kernel describes it.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RingBlock {
    pub id: u32,
    pub size: u32,
    pub bytes_used: u32,
    pub kind: u32,
    pub flags: u32,
    pub offset: u32,
    pub timestamp: u64,
}

pub const IIO_BUFFER_GET_FD_IOCTL: u32 = iowr::<libc::c_int>(b'i', 0x91);
pub const IIO_BUFFER_DMABUF_ATTACH_IOCTL: u32 = iow::<libc::c_int>(b'i', 0x92);
pub const IIO_BUFFER_DMABUF_DETACH_IOCTL: u32 = iow::<libc::c_int>(b'i', 0x93);
pub const IIO_BUFFER_DMABUF_ENQUEUE_IOCTL: u32 = iow::<IioDmabuf>(b'i', 0x94);
pub const IIO_BUFFER_DMABUF_CYCLIC: u32 = 1 << 0;

pub const DMA_HEAP_IOCTL_ALLOC: u32 = iowr::<DmaHeapAllocation>(b'H', 0x0);
pub const DMA_BUF_IOCTL_SYNC: u32 = iow::<DmaBufSync>(b'b', 0);
pub const DMA_BUF_SYNC_READ: u64 = 1 << 0;
pub const DMA_BUF_SYNC_WRITE: u64 = 2 << 0;
pub const DMA_BUF_SYNC_RW: u64 = DMA_BUF_SYNC_READ | DMA_BUF_SYNC_WRITE;
pub const DMA_BUF_SYNC_START: u64 = 0 << 2;
pub const DMA_BUF_SYNC_END: u64 = 1 << 2;

pub const BLOCK_ALLOC_IOCTL: u32 = iowr::<BlockAllocRequest>(b'i', 0xa0);
pub const BLOCK_FREE_IOCTL: u32 = io(b'i', 0xa1);
pub const BLOCK_QUERY_IOCTL: u32 = iowr::<RingBlock>(b'i', 0xa2);
pub const BLOCK_ENQUEUE_IOCTL: u32 = iowr::<RingBlock>(b'i', 0xa3);
pub const BLOCK_DEQUEUE_IOCTL: u32 = iowr::<RingBlock>(b'i', 0xa4);
pub const BLOCK_FLAG_CYCLIC: u32 = 1 << 1;

/// Issue an ioctl, retrying on `EINTR`.
///
/// # Safety
///
/// `arg` must be the argument type the kernel expects for `request`, or
/// null for requests that take none.
pub unsafe fn ioctl_nointr<T>(fd: BorrowedFd<'_>, request: u32, arg: *mut T) -> io::Result<libc::c_int> {
    loop {
        // SAFETY: forwarded from the caller.
        let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request as _, arg) };
        if ret >= 0 {
            return Ok(ret);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
