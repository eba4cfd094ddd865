//! Channel model construction.
//!
//! The scanner feeds every file name it finds into a [`DeviceBuilder`],
//! which groups channel files into channels, recovers display names and
//! finally moves device-level attributes that really belong to channels.

use tracing::debug;

use iio_core::{Attr, AttrStore, Channel, Device, IioError, Result};

use crate::naming::{self, GlobalMatch};

/// A channel under construction.
///
/// `protected` holds the scan-element attributes (`index`, `type`, `en`);
/// they are consumed by the scan-element pass and never exposed.
#[derive(Debug, Clone)]
pub struct PendingChannel {
    /// The channel being built.
    pub channel: Channel,
    /// Scan-element attributes, logical name to `scan_elements/` file.
    pub protected: Vec<Attr>,
}

impl PendingChannel {
    fn create(id: String, file_name: &str, hwmon: bool) -> Result<Self> {
        let is_output = if hwmon {
            false
        } else if file_name.starts_with("out_") {
            true
        } else if file_name.starts_with("in_") {
            false
        } else {
            return Err(IioError::protocol(file_name, "channel without direction prefix"));
        };

        Ok(Self {
            channel: Channel::new(id, is_output),
            protected: Vec::new(),
        })
    }

    fn add_attr(&mut self, file_name: &str, path: &str, scan: bool, hwmon: bool) -> Result<()> {
        let short = naming::short_attr_name(file_name, hwmon, self.channel.name.as_deref())?;
        let attr = Attr::new(short, path);
        if scan {
            self.protected.push(attr);
        } else {
            self.channel.attrs.push(attr);
        }
        Ok(())
    }

    /// Recover a display name from a prefix common to all attributes.
    ///
    /// `{vref_raw, vref_scale}` names the channel `vref` and leaves
    /// `{raw, scale}`. Channels with fewer than two attributes keep no name.
    pub fn set_name(&mut self) {
        if self.channel.attrs.len() + self.protected.len() < 2 {
            return;
        }

        let first = self
            .channel
            .attrs
            .iter()
            .next()
            .or_else(|| self.protected.first())
            .map(|a| a.name.clone())
            .unwrap_or_default();

        let skip_protected = usize::from(self.channel.attrs.is_empty());
        let plain_rest = self.channel.attrs.iter().skip(1);
        let protected_rest = self.protected.iter().skip(skip_protected);
        let others: Vec<&str> = plain_rest
            .chain(protected_rest)
            .map(|a| a.name.as_str())
            .collect();

        let mut prefix_len = 0;
        for (pos, _) in first.match_indices('_') {
            let prefix = &first[..=pos];
            if others.iter().all(|name| name.starts_with(prefix)) {
                prefix_len = pos + 1;
            } else {
                break;
            }
        }
        if prefix_len == 0 {
            return;
        }

        let name = first[..prefix_len - 1].to_string();
        debug!(channel = %self.channel.id, name = %name, "Recovered channel name");

        for attr in self.channel.attrs.iter_mut() {
            attr.name.replace_range(..prefix_len, "");
        }
        for attr in &mut self.protected {
            attr.name.replace_range(..prefix_len, "");
        }
        self.channel.name = Some(name);
    }
}

/// A device under construction.
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    device: Device,
    channels: Vec<PendingChannel>,
}

impl DeviceBuilder {
    /// Start building the device with directory name `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            device: Device::new(id),
            channels: Vec::new(),
        }
    }

    /// The device fields collected so far.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Mutable device fields (name, label, buffer attributes).
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    /// Channels collected so far.
    pub fn channels(&self) -> &[PendingChannel] {
        &self.channels
    }

    /// Mutable channels, for the naming and scan-element passes.
    pub fn channels_mut(&mut self) -> &mut [PendingChannel] {
        &mut self.channels
    }

    /// Add a channel attribute file, creating the channel when its
    /// (id, direction) pair is new.
    ///
    /// `path` is the backing file relative to the device directory; `scan`
    /// marks files from `scan_elements/`.
    pub fn add_channel(&mut self, file_name: &str, path: &str, scan: bool) -> Result<()> {
        let hwmon = self.device.is_hwmon();
        let id = naming::channel_id(file_name, hwmon)?;
        let is_output = file_name.starts_with('o');

        if let Some(chn) = self
            .channels
            .iter_mut()
            .find(|c| c.channel.id == id && c.channel.is_output == is_output)
        {
            chn.add_attr(file_name, path, scan, hwmon)?;
            chn.channel.is_scan_element |= scan;
            return Ok(());
        }

        let mut chn = PendingChannel::create(id, file_name, hwmon)?;
        chn.add_attr(file_name, path, scan, hwmon)?;
        chn.channel.is_scan_element = scan;
        debug!(
            device = %self.device.id,
            channel = %chn.channel.id,
            output = chn.channel.is_output,
            "Added channel"
        );
        self.channels.push(chn);
        Ok(())
    }

    /// Add a device-scope attribute. Duplicates are ignored.
    pub fn add_attr(&mut self, name: &str) {
        self.device.attrs.insert(Attr::named(name));
    }

    /// Name every channel from its common attribute prefix.
    pub fn set_channel_names(&mut self) {
        for chn in &mut self.channels {
            chn.set_name();
        }
    }

    /// Move device attributes that belong to channels.
    ///
    /// Attributes private to a named channel win over attributes shared by a
    /// channel type; an attribute may be copied to several channels. What
    /// remains and still parses as a channel name becomes an index-less
    /// channel.
    pub fn move_global_attrs(&mut self) -> Result<()> {
        let hwmon = self.device.is_hwmon();
        let mut leftovers = Vec::new();

        for attr in std::mem::take(&mut self.device.attrs) {
            let mut matched = false;
            for level in [GlobalMatch::Private, GlobalMatch::Shared] {
                for chn in &mut self.channels {
                    let found = naming::global_attr_match(
                        &attr.name,
                        &chn.channel.id,
                        chn.channel.name.as_deref(),
                        chn.channel.is_output,
                    );
                    if found == level {
                        debug!(attr = %attr.name, channel = %chn.channel.id, "Promoted device attribute");
                        chn.add_attr(&attr.name, &attr.filename, false, hwmon)?;
                        matched = true;
                    }
                }
                if matched {
                    break;
                }
            }
            if !matched {
                leftovers.push(attr);
            }
        }

        let mut remaining = AttrStore::new();
        for attr in leftovers {
            if naming::is_channel(&attr.name, hwmon, false) {
                self.add_channel(&attr.name, &attr.filename, false)?;
            } else {
                remaining.insert(attr);
            }
        }
        self.device.attrs = remaining;
        Ok(())
    }

    /// Sort everything and produce the device.
    pub fn finish(mut self) -> Device {
        let mut channels: Vec<Channel> = self
            .channels
            .into_iter()
            .map(|mut c| {
                c.channel.attrs.sort();
                c.channel
            })
            .collect();
        channels.sort_by(Channel::scan_order);

        self.device.attrs.sort();
        self.device.buffer_attrs.sort();
        self.device.channels = channels;
        self.device
    }
}
