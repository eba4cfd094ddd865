//! Context: the discovered device tree plus its attribute I/O surface.
//!
//! A [`Context`] is produced by a backend (see [`crate::backend`]) and is
//! read-only afterwards. Attribute reads and writes go through the
//! backend-provided [`AttrIo`] so the same context API works for every
//! backend.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::channel::Channel;
use crate::device::Device;
use crate::error::{IioError, Result};

/// Where an attribute file lives relative to its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrScope {
    /// The device directory itself.
    Device,
    /// A buffer directory, by buffer index.
    Buffer(u32),
    /// The device's debugfs directory.
    Debug,
}

/// Backend hook for reading and writing attribute files.
pub trait AttrIo: Send + Sync + fmt::Debug {
    /// Read an attribute, returning its content without the trailing
    /// terminator.
    fn read_attr(&self, device: &Device, scope: AttrScope, filename: &str) -> Result<String>;

    /// Write an attribute, returning the number of bytes written.
    fn write_attr(
        &self,
        device: &Device,
        scope: AttrScope,
        filename: &str,
        value: &str,
    ) -> Result<usize>;
}

/// Caller-tunable context parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextParams {
    /// Default I/O timeout. `None` picks the backend default; `Some(0)`
    /// blocks forever.
    pub timeout_ms: Option<u32>,
}

impl ContextParams {
    /// Parameters with an explicit timeout.
    pub fn with_timeout_ms(timeout_ms: u32) -> Self {
        Self {
            timeout_ms: Some(timeout_ms),
        }
    }

    /// Resolve the timeout against a backend default.
    pub fn resolve_timeout(&self, backend_default_ms: u32) -> u32 {
        self.timeout_ms.unwrap_or(backend_default_ms)
    }
}

/// One entry returned by a backend scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Human readable summary of what the URI would expose.
    pub description: String,
    /// URI to pass to context creation.
    pub uri: String,
}

/// A discovered device tree.
pub struct Context {
    description: String,
    attrs: Vec<(String, String)>,
    devices: Vec<Arc<Device>>,
    timeout_ms: u32,
    io: Arc<dyn AttrIo>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("description", &self.description)
            .field("attrs", &self.attrs)
            .field("devices", &self.devices.len())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Context {
    /// Start building a context.
    pub fn builder(description: impl Into<String>, io: Arc<dyn AttrIo>) -> ContextBuilder {
        ContextBuilder {
            description: description.into(),
            attrs: Vec::new(),
            devices: Vec::new(),
            timeout_ms: 0,
            io,
        }
    }

    /// Context description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Context attributes in insertion order.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Look up a context attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Devices sorted by id.
    pub fn devices(&self) -> &[Arc<Device>] {
        &self.devices
    }

    /// Find a device by id, name or label.
    pub fn find_device(&self, key: &str) -> Option<&Arc<Device>> {
        self.devices
            .iter()
            .find(|d| d.id == key)
            .or_else(|| self.devices.iter().find(|d| d.matches(key)))
    }

    /// Default I/O timeout in milliseconds; `0` blocks forever.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Attribute I/O hook of the backend that built this context.
    pub fn io(&self) -> &Arc<dyn AttrIo> {
        &self.io
    }

    /// Read a device attribute.
    pub fn read_device_attr(&self, device: &Device, name: &str) -> Result<String> {
        self.io.read_attr(device, AttrScope::Device, name)
    }

    /// Write a device attribute.
    pub fn write_device_attr(&self, device: &Device, name: &str, value: &str) -> Result<usize> {
        self.io.write_attr(device, AttrScope::Device, name, value)
    }

    /// Read a channel attribute by logical name.
    ///
    /// Names that are not channel attributes are read from the device
    /// directory under the same name.
    pub fn read_channel_attr(&self, device: &Device, channel: &Channel, name: &str) -> Result<String> {
        let filename = channel.attrs.filename_of(name).unwrap_or(name);
        self.io.read_attr(device, AttrScope::Device, filename)
    }

    /// Write a channel attribute by logical name.
    pub fn write_channel_attr(
        &self,
        device: &Device,
        channel: &Channel,
        name: &str,
        value: &str,
    ) -> Result<usize> {
        let filename = channel.attrs.filename_of(name).unwrap_or(name);
        self.io.write_attr(device, AttrScope::Device, filename, value)
    }

    /// Read an attribute of buffer `buf_id`.
    pub fn read_buffer_attr(&self, device: &Device, buf_id: u32, name: &str) -> Result<String> {
        self.io.read_attr(device, AttrScope::Buffer(buf_id), name)
    }

    /// Write an attribute of buffer `buf_id`.
    pub fn write_buffer_attr(
        &self,
        device: &Device,
        buf_id: u32,
        name: &str,
        value: &str,
    ) -> Result<usize> {
        self.io.write_attr(device, AttrScope::Buffer(buf_id), name, value)
    }

    /// Read a debug attribute.
    pub fn read_debug_attr(&self, device: &Device, name: &str) -> Result<String> {
        if !device.debug_attrs.contains(name) {
            return Err(IioError::NotFound {
                what: format!("debug attribute '{}' of {}", name, device.id),
            });
        }
        self.io.read_attr(device, AttrScope::Debug, name)
    }

    /// Write a debug attribute.
    pub fn write_debug_attr(&self, device: &Device, name: &str, value: &str) -> Result<usize> {
        if !device.debug_attrs.contains(name) {
            return Err(IioError::NotFound {
                what: format!("debug attribute '{}' of {}", name, device.id),
            });
        }
        self.io.write_attr(device, AttrScope::Debug, name, value)
    }
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    description: String,
    attrs: Vec<(String, String)>,
    devices: Vec<Device>,
    timeout_ms: u32,
    io: Arc<dyn AttrIo>,
}

impl ContextBuilder {
    /// Add or replace a context attribute.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((key, value)),
        }
        self
    }

    /// Add devices.
    pub fn devices(mut self, devices: impl IntoIterator<Item = Device>) -> Self {
        self.devices.extend(devices);
        self
    }

    /// Default I/O timeout in milliseconds.
    pub fn timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Finish the context. Devices are sorted by id.
    pub fn build(mut self) -> Context {
        self.devices.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(
            devices = self.devices.len(),
            attrs = self.attrs.len(),
            "Built context"
        );
        Context {
            description: self.description,
            attrs: self.attrs,
            devices: self.devices.into_iter().map(Arc::new).collect(),
            timeout_ms: self.timeout_ms,
            io: self.io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::Attr;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    struct MemoryIo {
        files: Mutex<HashMap<(String, String), String>>,
    }

    impl AttrIo for MemoryIo {
        fn read_attr(&self, device: &Device, scope: AttrScope, filename: &str) -> Result<String> {
            let key = (device.id.clone(), format!("{:?}/{}", scope, filename));
            self.files
                .lock()
                .get(&key)
                .cloned()
                .ok_or_else(|| IioError::NotFound { what: key.1 })
        }

        fn write_attr(
            &self,
            device: &Device,
            scope: AttrScope,
            filename: &str,
            value: &str,
        ) -> Result<usize> {
            let key = (device.id.clone(), format!("{:?}/{}", scope, filename));
            self.files.lock().insert(key, value.to_string());
            Ok(value.len())
        }
    }

    fn context() -> Context {
        let mut dev = Device::new("iio:device1");
        dev.name = Some("ad7476".into());
        let mut chn = Channel::new("voltage0", false);
        chn.attrs.insert(Attr::new("raw", "in_voltage0_raw"));
        dev.channels.push(chn);
        dev.debug_attrs.insert(Attr::named("direct_reg_access"));

        Context::builder("test", Arc::new(MemoryIo::default()))
            .attr("uri", "local:")
            .attr("uri", "local:replaced")
            .devices([dev, Device::new("iio:device0")])
            .timeout_ms(500)
            .build()
    }

    #[test]
    fn test_builder_sorts_and_replaces() {
        let ctx = context();
        assert_eq!(ctx.devices()[0].id, "iio:device0");
        assert_eq!(ctx.attr("uri"), Some("local:replaced"));
        assert_eq!(ctx.attrs().len(), 1);
        assert_eq!(ctx.timeout_ms(), 500);
        assert_eq!(ctx.find_device("ad7476").map(|d| d.id.as_str()), Some("iio:device1"));
    }

    #[test]
    fn test_channel_attr_uses_backing_file() {
        let ctx = context();
        let dev = ctx.find_device("iio:device1").cloned().unwrap();
        let chn = &dev.channels[0];

        ctx.write_channel_attr(&dev, chn, "raw", "42").unwrap();
        assert_eq!(ctx.read_device_attr(&dev, "in_voltage0_raw").unwrap(), "42");
        assert_eq!(ctx.read_channel_attr(&dev, chn, "raw").unwrap(), "42");
    }

    #[test]
    fn test_unknown_debug_attr() {
        let ctx = context();
        let dev = ctx.find_device("iio:device0").cloned().unwrap();
        let err = ctx.read_debug_attr(&dev, "direct_reg_access").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_resolve_timeout() {
        assert_eq!(ContextParams::default().resolve_timeout(1000), 1000);
        assert_eq!(ContextParams::with_timeout_ms(0).resolve_timeout(1000), 0);
    }
}
