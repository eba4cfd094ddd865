//! `iio-core`
//!
//! Core model types for rust-iio: devices, channels, attributes, data
//! formats, channel masks, contexts and the backend registry.
//!
//! Backends (see `iio-backend-local`) discover devices and populate a
//! [`Context`]; everything in this crate is backend-agnostic.
//!
//! ## Key Types
//!
//! - [`Device`] / [`Channel`]: the immutable discovered model
//! - [`AttrStore`]: ordered logical-name to backing-file map
//! - [`ChannelsMask`]: per-channel enable bits used by buffers
//! - [`Context`]: device tree plus attribute I/O through [`AttrIo`]
//! - [`BackendRegistry`]: explicit, URI-prefix keyed backend table
//! - [`IioError`]: error taxonomy shared by all crates

pub mod attr;
pub mod backend;
pub mod channel;
pub mod context;
pub mod device;
pub mod error;
pub mod mask;
pub mod modifier;

pub use attr::{Attr, AttrStore};
pub use backend::{Backend, BackendRegistry};
pub use channel::{Channel, DataFormat};
pub use context::{AttrIo, AttrScope, Context, ContextBuilder, ContextParams, ScanResult};
pub use device::{Device, DeviceKind};
pub use error::{ErrorKind, IioError, Result};
pub use mask::ChannelsMask;
pub use modifier::find_modifier;
