//! Host description helpers: kernel identification for context
//! descriptions and the short summary shown by scans.

use std::ffi::CStr;
use std::io;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::path::Path;

use tracing::debug;

use iio_core::{IioError, Result, ScanResult};

use crate::config::LocalConfig;
use crate::sysfs::{list_dir, read_attr_file, EntryFilter};

/// URI of the local backend.
pub const LOCAL_URI: &str = "local:";

/// Longest host file read while building scan descriptions.
const HOST_FILE_LIMIT: usize = 127;

/// Kernel identification, as reported by `uname(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo {
    /// Operating system name.
    pub sysname: String,
    /// Host name.
    pub nodename: String,
    /// Kernel release, e.g. `6.1.0-xilinx`.
    pub release: String,
    /// Kernel build string.
    pub version: String,
    /// Hardware architecture.
    pub machine: String,
}

impl KernelInfo {
    /// Query the running kernel.
    pub fn current() -> Result<Self> {
        let mut uts = MaybeUninit::<libc::utsname>::zeroed();
        // SAFETY: uname fills the struct it is given; it is zero-initialised
        // so every field is NUL terminated even on partial writes.
        let ret = unsafe { libc::uname(uts.as_mut_ptr()) };
        if ret < 0 {
            return Err(IioError::Io(io::Error::last_os_error()));
        }
        // SAFETY: initialised by the successful call above.
        let uts = unsafe { uts.assume_init() };

        Ok(Self {
            sysname: field(&uts.sysname),
            nodename: field(&uts.nodename),
            release: field(&uts.release),
            version: field(&uts.version),
            machine: field(&uts.machine),
        })
    }

    /// `"<sysname> <nodename> <release> <version> <machine>"`
    pub fn description(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.sysname, self.nodename, self.release, self.version, self.machine
        )
    }
}

fn field(raw: &[c_char]) -> String {
    // SAFETY: utsname fields are NUL-terminated arrays (see `current`).
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Read a small host file, `None` when absent, unreadable or empty.
fn host_file(path: &Path) -> Option<String> {
    read_attr_file(path, HOST_FILE_LIMIT)
        .ok()
        .filter(|s| !s.is_empty())
}

/// Board or machine model, from the device tree or DMI.
pub fn machine_model(config: &LocalConfig) -> Option<String> {
    host_file(&config.sysfs_root.join("firmware/devicetree/base/model"))
        .or_else(|| host_file(&config.sysfs_root.join("class/dmi/id/board_vendor")))
}

/// Names of the devices below a root whose directory name contains `marker`.
fn device_names(root: &Path, marker: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for dir in list_dir(root, EntryFilter::Dirs)? {
        if !dir.name.contains(marker) {
            continue;
        }
        if let Some(name) = host_file(&dir.path.join("name")) {
            names.push(name);
        }
    }
    Ok(names)
}

/// Summarise the local devices for a scan.
///
/// Returns no result when neither device root can be listed.
pub fn scan(config: &LocalConfig) -> Vec<ScanResult> {
    let mut names = Vec::new();
    let mut found_root = false;

    match device_names(&config.iio_devices_dir(), "iio:device") {
        Ok(found) => {
            found_root = true;
            names.extend(found);
        }
        Err(e) => debug!(error = %e, "IIO root unavailable for scan"),
    }
    if config.hwmon {
        match device_names(&config.hwmon_dir(), "hwmon") {
            Ok(found) => {
                found_root = true;
                names.extend(found);
            }
            Err(e) => debug!(error = %e, "hwmon root unavailable for scan"),
        }
    }

    if !found_root {
        return Vec::new();
    }

    let description = describe(&names, machine_model(config).as_deref());
    vec![ScanResult {
        description,
        uri: LOCAL_URI.to_string(),
    }]
}

/// Format a scan description from device names and a machine model.
///
/// Device names are only listed alongside a machine model.
pub fn describe(names: &[String], machine: Option<&str>) -> String {
    match machine {
        Some(machine) if !names.is_empty() => format!("({} on {})", names.join(","), machine),
        Some(machine) => format!("(Local IIO devices on {})", machine),
        None => "(Local IIO devices)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_describe() {
        let names = vec!["ad7291".to_string(), "adxl345".to_string()];
        assert_eq!(
            describe(&names, Some("Zynq ZC702")),
            "(ad7291,adxl345 on Zynq ZC702)"
        );
        assert_eq!(describe(&[], Some("Zynq ZC702")), "(Local IIO devices on Zynq ZC702)");
        assert_eq!(describe(&[], None), "(Local IIO devices)");
        assert_eq!(describe(&names, None), "(Local IIO devices)");
    }

    #[test]
    fn test_kernel_description() {
        let info = KernelInfo {
            sysname: "Linux".into(),
            nodename: "analog".into(),
            release: "6.1.0".into(),
            version: "#1 SMP".into(),
            machine: "armv7l".into(),
        };
        assert_eq!(info.description(), "Linux analog 6.1.0 #1 SMP armv7l");
    }

    #[test]
    fn test_current_kernel() {
        let info = KernelInfo::current().unwrap();
        assert!(!info.sysname.is_empty());
    }

    #[test]
    fn test_scan_reads_names_and_model() {
        let root = tempfile::tempdir().unwrap();
        let config = LocalConfig::rooted_at(root.path());
        let dev = config.iio_devices_dir().join("iio:device0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("name"), "ad9361-phy\n").unwrap();
        fs::create_dir_all(config.iio_devices_dir().join("trigger0")).unwrap();
        let model = config.sysfs_root.join("firmware/devicetree/base");
        fs::create_dir_all(&model).unwrap();
        fs::write(model.join("model"), "Xilinx Zynq ZED\0").unwrap();

        let results = scan(&config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].description, "(ad9361-phy on Xilinx Zynq ZED)");
        assert_eq!(results[0].uri, "local:");
    }

    #[test]
    fn test_scan_without_roots() {
        let root = tempfile::tempdir().unwrap();
        assert!(scan(&LocalConfig::rooted_at(root.path())).is_empty());
    }
}
