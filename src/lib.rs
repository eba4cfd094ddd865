//! # rust-iio
//!
//! Facade over the rust-iio workspace. Applications depend on this crate and
//! get the core model together with the backends compiled into it.
//!
//! ## Crate Structure
//!
//! - **`core`** (`iio-core`): devices, channels, attributes, channel masks,
//!   contexts, the error taxonomy and the [`BackendRegistry`].
//! - **`local`** (`iio-backend-local`): the `local:` backend. Discovers
//!   devices from sysfs, streams samples through `/dev/iio:deviceN`, and
//!   supports zero-copy blocks where the kernel does.
//!
//! ## Usage
//!
//! ```no_run
//! use rust_iio::core::ContextParams;
//!
//! # fn example() -> rust_iio::core::Result<()> {
//! let registry = rust_iio::default_registry();
//! let ctx = registry.create_context("local:", &ContextParams::default())?;
//! for dev in ctx.devices() {
//!     println!("{}: {}", dev.id, dev.name.as_deref().unwrap_or(""));
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use iio_backend_local as local;
pub use iio_core as core;

pub use iio_core::{BackendRegistry, Context, ContextParams, IioError, Result};

use iio_backend_local::{LocalBackend, LocalConfig};

/// Registry holding every built-in backend with its default configuration.
pub fn default_registry() -> BackendRegistry {
    registry_with(LocalConfig::default())
}

/// Registry whose local backend uses `config`.
pub fn registry_with(config: LocalConfig) -> BackendRegistry {
    let registry = BackendRegistry::new();
    registry.register(Arc::new(LocalBackend::new(config)));
    registry
}
