//! The `local:` backend.

use std::sync::Arc;

use tracing::info;

use iio_core::{AttrIo, Backend, ChannelsMask, Context, ContextParams, Device, Result, ScanResult};

use crate::buffer::LocalBuffer;
use crate::config::{read_context_ini, LocalConfig};
use crate::discovery::{self, KernelInfo, LOCAL_URI};
use crate::scanner::DeviceTreeScanner;
use crate::sysfs::Sysfs;

/// Default I/O timeout of local contexts.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Backend over the local sysfs tree and buffer character devices.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    sysfs: Arc<Sysfs>,
}

impl LocalBackend {
    /// Backend working on the layout described by `config`.
    pub fn new(config: LocalConfig) -> Self {
        Self {
            sysfs: Arc::new(Sysfs::new(config)),
        }
    }

    /// The filesystem layout.
    pub fn sysfs(&self) -> &Arc<Sysfs> {
        &self.sysfs
    }

    /// Open buffer `idx` of a device of `ctx`, using the context timeout.
    pub fn open_buffer(
        &self,
        ctx: &Context,
        device: &Arc<Device>,
        idx: u32,
        mask: &mut ChannelsMask,
    ) -> Result<LocalBuffer> {
        LocalBuffer::open(
            Arc::clone(&self.sysfs),
            Arc::clone(device),
            idx,
            mask,
            ctx.timeout_ms(),
        )
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(LocalConfig::default())
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn uri_prefix(&self) -> &'static str {
        LOCAL_URI
    }

    fn default_timeout_ms(&self) -> u32 {
        DEFAULT_TIMEOUT_MS
    }

    fn scan(&self, _params: &ContextParams, _args: &str) -> Result<Vec<ScanResult>> {
        Ok(discovery::scan(self.sysfs.config()))
    }

    fn create_context(&self, params: &ContextParams, _args: &str) -> Result<Context> {
        let devices = DeviceTreeScanner::new(&self.sysfs).scan()?;
        let kernel = KernelInfo::current()?;

        let io: Arc<dyn AttrIo> = self.sysfs.clone();
        let mut builder = Context::builder(kernel.description(), io);
        for (key, value) in read_context_ini(&self.sysfs.config().context_ini) {
            builder = builder.attr(key, value);
        }

        let ctx = builder
            .attr("local,kernel", kernel.release)
            .attr("uri", LOCAL_URI)
            .devices(devices)
            .timeout_ms(params.resolve_timeout(DEFAULT_TIMEOUT_MS))
            .build();

        info!(
            devices = ctx.devices().len(),
            timeout_ms = ctx.timeout_ms(),
            "Created local context"
        );
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let backend = LocalBackend::default();
        assert_eq!(backend.name(), "local");
        assert_eq!(backend.uri_prefix(), "local:");
        assert_eq!(backend.default_timeout_ms(), 1000);
    }

    #[test]
    fn test_missing_tree_is_not_found() {
        let root = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(LocalConfig::rooted_at(root.path()));
        let err = backend
            .create_context(&ContextParams::default(), "")
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.scan(&ContextParams::default(), "").unwrap().is_empty());
    }
}
