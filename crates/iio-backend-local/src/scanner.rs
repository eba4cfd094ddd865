//! Device tree discovery.
//!
//! Walks `<sysfs>/bus/iio/devices` (and `<sysfs>/class/hwmon`), turning every
//! device directory into a [`Device`]:
//!
//! 1. regular files become channel attributes or device attributes
//! 2. `buffer/` files become buffer attributes
//! 3. `scan_elements/` files become protected channel attributes
//! 4. channels get display names, then scan-element data
//! 5. device attributes that belong to channels are moved
//! 6. everything is sorted
//!
//! A device whose content breaks the naming conventions is skipped; a
//! directory that cannot be read aborts the whole scan.

use std::path::Path;

use tracing::{debug, info, warn};

use iio_core::{Attr, Device, IioError, Result};

use crate::channel_builder::DeviceBuilder;
use crate::naming;
use crate::scan_element::apply_scan_elements;
use crate::sysfs::{list_dir, DirEntry, EntryFilter, Sysfs};

/// Device files that are not attributes.
const DEVICE_ATTR_DENYLIST: &[&str] = &["dev", "uevent"];

/// Buffer files driven by the buffer engine itself.
const BUFFER_ATTR_RESERVED: &[&str] = &["length", "enable", "watermark"];

/// List a directory that may legitimately be absent.
fn list_optional_dir(dir: &Path, filter: EntryFilter) -> Result<Vec<DirEntry>> {
    match list_dir(dir, filter) {
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        other => other,
    }
}

/// Builds the device list of a context.
#[derive(Debug)]
pub struct DeviceTreeScanner<'a> {
    sysfs: &'a Sysfs,
}

impl<'a> DeviceTreeScanner<'a> {
    /// Scanner over a filesystem layout.
    pub fn new(sysfs: &'a Sysfs) -> Self {
        Self { sysfs }
    }

    /// Discover every device, sorted by id.
    ///
    /// A missing IIO root is tolerated when hwmon scanning is enabled, and a
    /// missing hwmon root is tolerated when the IIO root exists. With both
    /// roots gone the scan fails with "not found".
    pub fn scan(&self) -> Result<Vec<Device>> {
        let config = self.sysfs.config();
        let mut devices = Vec::new();

        let iio_missing = match self.scan_root(&config.iio_devices_dir(), &mut devices) {
            Ok(()) => false,
            Err(e) if e.is_not_found() && config.hwmon => {
                debug!("No IIO device directory");
                true
            }
            Err(e) => return Err(e),
        };

        if config.hwmon {
            match self.scan_root(&config.hwmon_dir(), &mut devices) {
                Ok(()) => {}
                Err(e) if e.is_not_found() && !iio_missing => {
                    debug!("No hwmon device directory");
                }
                Err(e) => return Err(e),
            }
        }

        self.attach_debug_attrs(&mut devices);
        self.init_scales(&mut devices);
        devices.sort_by(|a, b| a.id.cmp(&b.id));

        info!(devices = devices.len(), "Scanned device tree");
        Ok(devices)
    }

    fn scan_root(&self, root: &Path, devices: &mut Vec<Device>) -> Result<()> {
        for entry in list_dir(root, EntryFilter::Dirs)? {
            match self.create_device(&entry.name, &entry.path) {
                Ok(device) => devices.push(device),
                Err(e @ IioError::Directory { .. }) => return Err(e),
                Err(e) => {
                    warn!(device = %entry.name, error = %e, "Skipping device");
                }
            }
        }
        Ok(())
    }

    /// Build one device from its sysfs directory.
    pub fn create_device(&self, id: &str, dir: &Path) -> Result<Device> {
        let mut builder = DeviceBuilder::new(id);
        let hwmon = builder.device().is_hwmon();

        for file in list_dir(dir, EntryFilter::Files)? {
            if naming::is_channel(&file.name, hwmon, true) {
                builder.add_channel(&file.name, &file.name, false)?;
            } else {
                self.add_device_file(&mut builder, &file)?;
            }
        }

        for file in list_optional_dir(&dir.join("buffer"), EntryFilter::Files)? {
            if !BUFFER_ATTR_RESERVED.contains(&file.name.as_str()) {
                builder.device_mut().buffer_attrs.insert(Attr::named(file.name));
            }
        }

        for file in list_optional_dir(&dir.join("scan_elements"), EntryFilter::Files)? {
            let path = format!("scan_elements/{}", file.name);
            builder.add_channel(&file.name, &path, true)?;
        }

        for chn in builder.channels_mut() {
            chn.set_name();
            apply_scan_elements(chn, |path| self.sysfs.read_file(&dir.join(path)))?;
        }

        builder.move_global_attrs()?;

        let device = builder.finish();
        debug!(
            device = %device.id,
            name = device.name.as_deref().unwrap_or(""),
            channels = device.channels.len(),
            attrs = device.attrs.len(),
            "Created device"
        );
        Ok(device)
    }

    fn add_device_file(&self, builder: &mut DeviceBuilder, file: &DirEntry) -> Result<()> {
        match file.name.as_str() {
            name if DEVICE_ATTR_DENYLIST.contains(&name) => {}
            "name" => builder.device_mut().name = Some(self.sysfs.read_file(&file.path)?),
            "label" => builder.device_mut().label = Some(self.sysfs.read_file(&file.path)?),
            name => builder.add_attr(name),
        }
        Ok(())
    }

    /// Attach debugfs attributes to their devices.
    fn attach_debug_attrs(&self, devices: &mut [Device]) {
        let debug_dir = self.sysfs.config().debug_dir();
        let dirs = match list_optional_dir(&debug_dir, EntryFilter::Dirs) {
            Ok(dirs) => dirs,
            Err(e) => {
                debug!(error = %e, "Debug attributes unavailable");
                return;
            }
        };

        for dir in dirs {
            let Some(device) = devices.iter_mut().find(|d| d.id == dir.name) else {
                let err = IioError::NoSuchDevice { id: dir.name };
                debug!(error = %err, "Ignoring debug directory");
                continue;
            };

            match list_dir(&dir.path, EntryFilter::Files) {
                Ok(files) => {
                    for file in files {
                        device.debug_attrs.insert(Attr::named(file.name));
                    }
                    device.debug_attrs.sort();
                }
                Err(e) => {
                    warn!(device = %device.id, error = %e, "Cannot list debug attributes");
                }
            }
        }
    }

    /// Read every channel's `scale` into its data format.
    fn init_scales(&self, devices: &mut [Device]) {
        for device in devices.iter_mut() {
            let dir = self.sysfs.device_dir(device);
            for chn in &mut device.channels {
                let Some(filename) = chn.attrs.filename_of("scale") else {
                    continue;
                };
                let scale = self
                    .sysfs
                    .read_file(&dir.join(filename))
                    .ok()
                    .and_then(|s| s.trim().parse::<f64>().ok());
                if let Some(scale) = scale {
                    chn.format.with_scale = true;
                    chn.format.scale = scale;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_create_device_skips_denylist() {
        let root = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(LocalConfig::rooted_at(root.path()));
        let dir = root.path().join("dev0");
        write(&dir.join("name"), "ad7291\n");
        write(&dir.join("uevent"), "MAJOR=250\n");
        write(&dir.join("dev"), "250:0\n");
        write(&dir.join("sampling_frequency"), "1000\n");
        write(&dir.join("buffer/length"), "128\n");
        write(&dir.join("buffer/data_available"), "0\n");

        let dev = DeviceTreeScanner::new(&sysfs)
            .create_device("iio:device0", &dir)
            .unwrap();
        assert_eq!(dev.name.as_deref(), Some("ad7291"));
        assert_eq!(dev.attrs.names().collect::<Vec<_>>(), ["sampling_frequency"]);
        assert_eq!(
            dev.buffer_attrs.names().collect::<Vec<_>>(),
            ["data_available"]
        );
    }

    #[test]
    fn test_empty_name_fails_device() {
        let root = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(LocalConfig::rooted_at(root.path()));
        let dir = root.path().join("dev0");
        write(&dir.join("name"), "");

        let err = DeviceTreeScanner::new(&sysfs)
            .create_device("iio:device0", &dir)
            .unwrap_err();
        assert!(matches!(err, IioError::Attribute { .. }));
    }
}
