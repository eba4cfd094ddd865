//! Local backend for rust-iio.
//!
//! Discovers Industrial I/O devices from sysfs and streams samples through
//! their buffer character devices.
//!
//! # Architecture
//!
//! ## Discovery
//! - [`DeviceTreeScanner`] - walks `bus/iio/devices` and `class/hwmon`
//! - [`channel_builder`] - turns attribute file names into channels
//! - [`scan_element`] - decodes `index`, `type` and `en` files
//! - [`naming`] - file name heuristics (modifiers, hwmon prefixes)
//!
//! ## Streaming
//! - [`LocalBuffer`] - buffer lifecycle, channel enables, read/write
//! - [`BlockingTransport`] - partial I/O loops bounded by a deadline
//! - [`TimedPoller`] - cancellable readiness waits
//! - [`block`] - zero-copy blocks over DMABUF or the mapped ring
//!
//! ## Context
//! - [`LocalBackend`] - the `local:` [`Backend`](iio_core::Backend)
//! - [`LocalConfig`] - filesystem roots, loaded with figment
//! - [`trigger`] - `current_trigger` association
//!
//! # Example
//!
//! ```no_run
//! use iio_backend_local::{LocalBackend, LocalConfig};
//! use iio_core::{Backend, ChannelsMask, ContextParams};
//!
//! # fn example() -> iio_core::Result<()> {
//! let backend = LocalBackend::new(LocalConfig::load(None)?);
//! let ctx = backend.create_context(&ContextParams::default(), "")?;
//!
//! let dev = ctx.find_device("ad7291").expect("device present");
//! let mut mask = ChannelsMask::new(dev.channels.len());
//! mask.enable(0);
//!
//! let mut buffer = backend.open_buffer(&ctx, dev, 0, &mut mask)?;
//! buffer.enable(256)?;
//!
//! let mut samples = vec![0u8; 512];
//! let n = buffer.read(&mut samples)?;
//! println!("read {} bytes", n);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod block;
pub mod buffer;
pub mod channel_builder;
pub mod config;
pub mod discovery;
mod ioctl;
pub mod naming;
pub mod poll;
pub mod scan_element;
pub mod scanner;
pub mod sysfs;
pub mod transport;
pub mod trigger;

pub use backend::{LocalBackend, DEFAULT_TIMEOUT_MS};
pub use block::{BlockId, BlockStrategy};
pub use buffer::{BufferState, LocalBuffer};
pub use config::LocalConfig;
pub use discovery::{KernelInfo, LOCAL_URI};
pub use poll::{CancelHandle, TimedPoller};
pub use scanner::DeviceTreeScanner;
pub use sysfs::Sysfs;
pub use transport::BlockingTransport;
pub use trigger::{current_trigger, set_trigger};
