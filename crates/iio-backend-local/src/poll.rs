//! Cancellable, deadline-bounded readiness waits.
//!
//! Every blocking operation of a buffer waits on two descriptors: the data
//! descriptor and the buffer's cancel eventfd. The deadline is absolute:
//! the remaining time is recomputed from the operation's start on every
//! iteration, so retries after a signal or a short transfer never extend
//! the total wait.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Instant;

use tracing::{error, trace};

use iio_core::{IioError, Result};

/// Remaining wait in milliseconds for an operation started at `start`.
///
/// `None` means "wait forever" (a zero `timeout_ms`). Otherwise the result
/// never goes below zero and reaches zero exactly at the deadline.
pub fn rel_timeout_ms(start: Instant, now: Instant, timeout_ms: u32) -> Option<u32> {
    if timeout_ms == 0 {
        return None;
    }
    let elapsed = now.saturating_duration_since(start).as_millis();
    let remaining = u128::from(timeout_ms).saturating_sub(elapsed);
    Some(u32::try_from(remaining).unwrap_or(u32::MAX))
}

/// Which readiness a wait is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Data can be read.
    Readable,
    /// Space can be written.
    Writable,
}

impl Readiness {
    fn events(self) -> libc::c_short {
        match self {
            Readiness::Readable => libc::POLLIN,
            Readiness::Writable => libc::POLLOUT,
        }
    }
}

/// The buffer's cancel eventfd.
///
/// Signalling is sticky: the counter is never drained, so every later wait
/// observes the cancellation.
#[derive(Debug)]
pub struct CancelFd {
    fd: OwnedFd,
}

impl CancelFd {
    /// Create a non-blocking, close-on-exec eventfd.
    pub fn new() -> Result<Self> {
        // SAFETY: eventfd has no memory-safety preconditions.
        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if raw < 0 {
            return Err(IioError::Io(io::Error::last_os_error()));
        }
        // SAFETY: raw is a freshly created descriptor we exclusively own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        Ok(Self { fd })
    }

    /// Signal cancellation.
    pub fn signal(&self) -> Result<()> {
        signal_eventfd(self.fd.as_fd())
    }

    /// A handle another thread can use to cancel.
    pub fn handle(&self) -> Result<CancelHandle> {
        Ok(CancelHandle {
            fd: self.fd.try_clone()?,
        })
    }
}

impl AsFd for CancelFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Cross-thread cancellation handle for one buffer.
///
/// Holds a duplicate of the buffer's eventfd, so it stays valid after the
/// buffer is closed (signalling then has no effect).
#[derive(Debug)]
pub struct CancelHandle {
    fd: OwnedFd,
}

impl CancelHandle {
    /// Cancel every current and future wait of the buffer.
    pub fn cancel(&self) -> Result<()> {
        signal_eventfd(self.fd.as_fd())
    }
}

fn signal_eventfd(fd: BorrowedFd<'_>) -> Result<()> {
    let value: u64 = 1;
    // SAFETY: writes exactly 8 bytes from a live u64.
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            (&value as *const u64).cast(),
            std::mem::size_of::<u64>(),
        )
    };
    if ret != std::mem::size_of::<u64>() as isize {
        let err = io::Error::last_os_error();
        error!(fd = fd.as_raw_fd(), error = %err, "Unable to signal cancellation");
        return Err(IioError::Io(err));
    }
    trace!(fd = fd.as_raw_fd(), "Signalled cancellation");
    Ok(())
}

/// Readiness waiter bound to one cancel descriptor and timeout.
#[derive(Debug, Clone, Copy)]
pub struct TimedPoller<'a> {
    cancel: BorrowedFd<'a>,
    timeout_ms: u32,
}

impl<'a> TimedPoller<'a> {
    /// Waiter using `cancel` and `timeout_ms` (`0` waits forever).
    pub fn new(cancel: BorrowedFd<'a>, timeout_ms: u32) -> Self {
        Self { cancel, timeout_ms }
    }

    /// The configured timeout.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Wait until `fd` is ready.
    ///
    /// With `start = None` the wait does not block and reports
    /// [`IioError::WouldBlock`] when nothing is ready. Cancellation is
    /// checked before anything else and wins over pending data.
    pub fn wait(&self, fd: BorrowedFd<'_>, readiness: Readiness, start: Option<Instant>) -> Result<()> {
        let events = readiness.events();

        loop {
            let timeout = match start {
                Some(start) => match rel_timeout_ms(start, Instant::now(), self.timeout_ms) {
                    Some(ms) => libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX),
                    None => -1,
                },
                None => 0,
            };

            let mut fds = [
                libc::pollfd {
                    fd: fd.as_raw_fd(),
                    events,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.cancel.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];

            // SAFETY: fds is a live array of two pollfd structs.
            let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
            let poll_err = (ret < 0).then(io::Error::last_os_error);

            if let Some(err) = &poll_err {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
            }
            if fds[1].revents & libc::POLLIN != 0 {
                return Err(IioError::Cancelled);
            }
            if let Some(err) = poll_err {
                return Err(IioError::from_os(err));
            }
            if ret == 0 {
                return Err(match start {
                    Some(_) => IioError::TimedOut {
                        timeout_ms: self.timeout_ms,
                    },
                    None => IioError::WouldBlock,
                });
            }
            if fds[0].revents & libc::POLLNVAL != 0 {
                return Err(IioError::BadDescriptor);
            }
            if fds[0].revents & events == 0 {
                return Err(IioError::Io(io::Error::from_raw_os_error(libc::EIO)));
            }
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        assert_eq!(ret, 0);
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    #[test]
    fn test_rel_timeout_zero_waits_forever() {
        let start = Instant::now();
        assert_eq!(rel_timeout_ms(start, start + Duration::from_secs(5), 0), None);
    }

    #[test]
    fn test_rel_timeout_counts_down() {
        let start = Instant::now();
        let mut last = u32::MAX;
        for elapsed in [0, 1, 250, 999, 1000, 1001, 5000] {
            let now = start + Duration::from_millis(elapsed);
            let remaining = rel_timeout_ms(start, now, 1000).unwrap();
            assert!(remaining <= last, "remaining went up at {} ms", elapsed);
            last = remaining;
        }
        assert_eq!(rel_timeout_ms(start, start + Duration::from_millis(250), 1000), Some(750));
        assert_eq!(rel_timeout_ms(start, start + Duration::from_millis(1000), 1000), Some(0));
        assert_eq!(rel_timeout_ms(start, start + Duration::from_millis(4000), 1000), Some(0));
    }

    #[test]
    fn test_ready_fd() {
        let (rx, tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        unsafe { libc::write(tx.as_raw_fd(), b"x".as_ptr().cast(), 1) };

        let poller = TimedPoller::new(cancel.as_fd(), 1000);
        poller
            .wait(rx.as_fd(), Readiness::Readable, Some(Instant::now()))
            .unwrap();
    }

    #[test]
    fn test_cancel_wins_over_data() {
        let (rx, tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        unsafe { libc::write(tx.as_raw_fd(), b"x".as_ptr().cast(), 1) };
        cancel.handle().unwrap().cancel().unwrap();

        let poller = TimedPoller::new(cancel.as_fd(), 1000);
        let err = poller
            .wait(rx.as_fd(), Readiness::Readable, Some(Instant::now()))
            .unwrap_err();
        assert!(matches!(err, IioError::Cancelled));

        // Sticky: a second wait sees it too.
        let err = poller.wait(rx.as_fd(), Readiness::Readable, None).unwrap_err();
        assert!(matches!(err, IioError::Cancelled));
    }

    #[test]
    fn test_timeout_and_would_block() {
        let (rx, _tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let poller = TimedPoller::new(cancel.as_fd(), 30);

        let begin = Instant::now();
        let err = poller
            .wait(rx.as_fd(), Readiness::Readable, Some(begin))
            .unwrap_err();
        assert!(matches!(err, IioError::TimedOut { timeout_ms: 30 }));
        assert!(begin.elapsed() >= Duration::from_millis(25));

        let err = poller.wait(rx.as_fd(), Readiness::Readable, None).unwrap_err();
        assert!(matches!(err, IioError::WouldBlock));
    }

    #[test]
    fn test_cancel_from_other_thread() {
        let (rx, _tx) = pipe();
        let cancel = CancelFd::new().unwrap();
        let handle = cancel.handle().unwrap();

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.cancel().unwrap();
        });

        let poller = TimedPoller::new(cancel.as_fd(), 0);
        let err = poller
            .wait(rx.as_fd(), Readiness::Readable, Some(Instant::now()))
            .unwrap_err();
        assert!(matches!(err, IioError::Cancelled));
        canceller.join().unwrap();
    }
}
