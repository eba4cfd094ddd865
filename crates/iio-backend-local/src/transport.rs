//! Blocking read/write loops over a buffer's data descriptor.
//!
//! The descriptor is non-blocking; blocking behaviour comes from waiting on
//! [`TimedPoller`] before each transfer. A transfer loop keeps going until
//! the whole slice moved or something stops it (timeout, cancellation,
//! error). Partial progress always wins over the stopping error.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Instant;

use tracing::trace;

use iio_core::{IioError, Result};

use crate::poll::{Readiness, TimedPoller};

/// Read/write access to one data descriptor.
#[derive(Debug, Clone, Copy)]
pub struct BlockingTransport<'a> {
    fd: BorrowedFd<'a>,
    poller: TimedPoller<'a>,
}

impl<'a> BlockingTransport<'a> {
    /// Transport over `fd`, waiting through `poller`.
    pub fn new(fd: BorrowedFd<'a>, poller: TimedPoller<'a>) -> Self {
        Self { fd, poller }
    }

    /// Read into `buf`, returning the number of bytes read.
    ///
    /// With `nonblock` the call never waits and reports
    /// [`IioError::WouldBlock`] when no data is available.
    pub fn read(&self, buf: &mut [u8], nonblock: bool) -> Result<usize> {
        let fd = self.fd.as_raw_fd();
        let len = buf.len();
        let ptr = buf.as_mut_ptr();
        self.transfer(len, Readiness::Readable, nonblock, |done| {
            // SAFETY: `done < len`, so the range [done, len) lies inside buf.
            unsafe { libc::read(fd, ptr.add(done).cast(), len - done) }
        })
    }

    /// Write `buf`, returning the number of bytes written.
    pub fn write(&self, buf: &[u8], nonblock: bool) -> Result<usize> {
        let fd = self.fd.as_raw_fd();
        let len = buf.len();
        let ptr = buf.as_ptr();
        self.transfer(len, Readiness::Writable, nonblock, |done| {
            // SAFETY: `done < len`, so the range [done, len) lies inside buf.
            unsafe { libc::write(fd, ptr.add(done).cast(), len - done) }
        })
    }

    fn transfer<F>(&self, len: usize, readiness: Readiness, nonblock: bool, mut op: F) -> Result<usize>
    where
        F: FnMut(usize) -> isize,
    {
        if len == 0 {
            return Ok(0);
        }

        let start = (!nonblock).then(Instant::now);
        let mut done = 0;
        let mut stopped_by = None;

        while done < len {
            if let Err(e) = self.poller.wait(self.fd, readiness, start) {
                stopped_by = Some(e);
                break;
            }

            let ret = loop {
                let ret = op(done);
                if ret < 0 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break ret;
            };

            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EAGAIN) {
                    continue;
                }
                stopped_by = Some(IioError::from_os(err));
                break;
            }
            if ret == 0 {
                stopped_by = Some(IioError::Io(io::Error::from_raw_os_error(libc::EIO)));
                break;
            }
            done += ret as usize;
        }

        trace!(?readiness, done, len, "Transfer finished");
        match stopped_by {
            Some(_) if done > 0 => Ok(done),
            Some(e) => Err(e),
            None => Ok(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::CancelFd;
    use std::os::fd::{AsFd, FromRawFd, OwnedFd};

    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_round_trip() {
        let (rx, tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let poller = TimedPoller::new(cancel.as_fd(), 1000);

        let written = BlockingTransport::new(tx.as_fd(), poller)
            .write(b"scan data", false)
            .unwrap();
        assert_eq!(written, 9);

        let mut buf = [0u8; 9];
        let read = BlockingTransport::new(rx.as_fd(), poller)
            .read(&mut buf, false)
            .unwrap();
        assert_eq!(read, 9);
        assert_eq!(&buf, b"scan data");
    }

    #[test]
    fn test_partial_read_returns_progress() {
        let (rx, tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let poller = TimedPoller::new(cancel.as_fd(), 30);
        BlockingTransport::new(tx.as_fd(), poller)
            .write(b"abcd", false)
            .unwrap();

        let mut buf = [0u8; 16];
        let read = BlockingTransport::new(rx.as_fd(), poller)
            .read(&mut buf, false)
            .unwrap();
        assert_eq!(read, 4);
        assert_eq!(&buf[..4], b"abcd");
    }

    #[test]
    fn test_empty_transfer() {
        let (rx, _tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let transport = BlockingTransport::new(rx.as_fd(), TimedPoller::new(cancel.as_fd(), 10));
        assert_eq!(transport.read(&mut [], false).unwrap(), 0);
    }

    #[test]
    fn test_nonblocking_read_without_data() {
        let (rx, _tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let transport = BlockingTransport::new(rx.as_fd(), TimedPoller::new(cancel.as_fd(), 1000));

        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf, true).unwrap_err();
        assert!(matches!(err, IioError::WouldBlock));
    }

    #[test]
    fn test_cancelled_read_leaves_data() {
        let (rx, tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let poller = TimedPoller::new(cancel.as_fd(), 1000);
        BlockingTransport::new(tx.as_fd(), poller)
            .write(b"keep", false)
            .unwrap();
        cancel.signal().unwrap();

        let mut buf = [0u8; 4];
        let err = BlockingTransport::new(rx.as_fd(), poller)
            .read(&mut buf, false)
            .unwrap_err();
        assert!(matches!(err, IioError::Cancelled));

        let fresh = CancelFd::new().unwrap();
        let read = BlockingTransport::new(rx.as_fd(), TimedPoller::new(fresh.as_fd(), 1000))
            .read(&mut buf, false)
            .unwrap();
        assert_eq!(&buf[..read], b"keep");
    }

    #[test]
    fn test_hangup_is_io_error() {
        let (rx, tx) = pipe();
        drop(tx);
        let cancel = CancelFd::new().unwrap();
        let transport = BlockingTransport::new(rx.as_fd(), TimedPoller::new(cancel.as_fd(), 100));

        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf, false).unwrap_err();
        assert!(matches!(err, IioError::Io(_)));
    }
}
