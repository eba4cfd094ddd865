//! Device model.
//!
//! A [`Device`] is built once by a backend's discovery pass and is immutable
//! afterwards; contexts share devices as `Arc<Device>`.

use crate::attr::AttrStore;
use crate::channel::Channel;

/// Which kernel subsystem exposes the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Industrial I/O device (`iio:deviceN`, `triggerN`, ...).
    Iio,
    /// Hardware-monitoring device (`hwmonN`).
    Hwmon,
}

impl DeviceKind {
    /// Classify a device by its directory name.
    pub fn from_id(id: &str) -> Self {
        if id.starts_with("hwmon") {
            DeviceKind::Hwmon
        } else {
            DeviceKind::Iio
        }
    }
}

/// A discovered device with its channels and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Directory name, e.g. `iio:device0`.
    pub id: String,
    /// Content of the `name` file.
    pub name: Option<String>,
    /// Content of the `label` file.
    pub label: Option<String>,
    /// Subsystem the device belongs to.
    pub kind: DeviceKind,
    /// Channels in scan order.
    pub channels: Vec<Channel>,
    /// Device-scope attributes.
    pub attrs: AttrStore,
    /// Attributes of the device's buffer directory.
    pub buffer_attrs: AttrStore,
    /// Attributes exposed through debugfs.
    pub debug_attrs: AttrStore,
}

impl Device {
    /// Create an empty device.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            kind: DeviceKind::from_id(&id),
            id,
            name: None,
            label: None,
            channels: Vec::new(),
            attrs: AttrStore::new(),
            buffer_attrs: AttrStore::new(),
            debug_attrs: AttrStore::new(),
        }
    }

    /// Whether this is a hardware-monitoring device.
    pub fn is_hwmon(&self) -> bool {
        self.kind == DeviceKind::Hwmon
    }

    /// Whether the device names itself as a trigger.
    pub fn is_trigger(&self) -> bool {
        self.id.starts_with("trigger")
    }

    /// Find a channel by id and direction.
    pub fn find_channel(&self, id: &str, is_output: bool) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.is_output == is_output && (c.id == id || c.name.as_deref() == Some(id)))
    }

    /// Position of a channel in [`Device::channels`].
    pub fn channel_position(&self, id: &str, is_output: bool) -> Option<usize> {
        self.channels
            .iter()
            .position(|c| c.is_output == is_output && c.id == id)
    }

    /// Whether this device matches an id, name or label.
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name.as_deref() == Some(key) || self.label.as_deref() == Some(key)
    }
}
