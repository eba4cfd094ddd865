//! Backend configuration.
//!
//! [`LocalConfig`] locates the filesystem roots the backend works on. It is
//! layered with figment: built-in defaults, then an optional TOML file, then
//! `IIO_LOCAL_*` environment variables.
//!
//! ```toml
//! sysfs_root = "/sys"
//! dev_root = "/dev"
//! hwmon = true
//! ```
//!
//! Context attributes come from a separate INI file (`/etc/libiio.ini` by
//! default), whose `Context Attributes` section is copied verbatim into every
//! local context.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use ini::Ini;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use iio_core::{IioError, Result};

/// Fixed location of the context attribute file.
pub const CONTEXT_INI_PATH: &str = "/etc/libiio.ini";

/// Section of the INI file holding context attributes.
pub const CONTEXT_ATTRS_SECTION: &str = "Context Attributes";

/// Default size of the attribute read buffer.
pub const ATTR_READ_LIMIT: usize = 1024;

/// Filesystem layout and tunables of the local backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Root of the sysfs mount.
    pub sysfs_root: PathBuf,
    /// Directory holding the buffer character devices and `dma_heap/`.
    pub dev_root: PathBuf,
    /// Root of the debugfs mount.
    pub debugfs_root: PathBuf,
    /// Also expose hardware-monitoring devices.
    pub hwmon: bool,
    /// INI file providing context attributes.
    pub context_ini: PathBuf,
    /// Largest attribute file accepted by reads, in bytes.
    pub attr_read_limit: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            debugfs_root: PathBuf::from("/sys/kernel/debug"),
            hwmon: true,
            context_ini: PathBuf::from(CONTEXT_INI_PATH),
            attr_read_limit: ATTR_READ_LIMIT,
        }
    }
}

impl LocalConfig {
    /// Load the configuration, optionally merging a TOML file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(LocalConfig::default()));
        if let Some(path) = path {
            debug!("Loading backend config from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: LocalConfig = figment
            .merge(Env::prefixed("IIO_LOCAL_"))
            .extract()
            .map_err(|e| IioError::Config {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted at a scratch directory, used by tests and
    /// tooling that replay captured sysfs trees.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            sysfs_root: root.join("sys"),
            dev_root: root.join("dev"),
            debugfs_root: root.join("sys/kernel/debug"),
            hwmon: true,
            context_ini: root.join("etc/libiio.ini"),
            attr_read_limit: ATTR_READ_LIMIT,
        }
    }

    /// Reject configurations that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.attr_read_limit < 2 {
            return Err(IioError::Config {
                message: format!(
                    "attr_read_limit must be at least 2 bytes, got {}",
                    self.attr_read_limit
                ),
            });
        }
        Ok(())
    }

    /// `<sysfs>/bus/iio/devices`
    pub fn iio_devices_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus/iio/devices")
    }

    /// `<sysfs>/class/hwmon`
    pub fn hwmon_dir(&self) -> PathBuf {
        self.sysfs_root.join("class/hwmon")
    }

    /// `<debugfs>/iio`
    pub fn debug_dir(&self) -> PathBuf {
        self.debugfs_root.join("iio")
    }
}

/// Read the context attributes section of an INI file.
///
/// A missing file yields no attributes. Parse failures are logged and also
/// yield no attributes; they never prevent context creation.
pub fn read_context_ini(path: &Path) -> Vec<(String, String)> {
    if !path.exists() {
        debug!("No context attribute file at {}", path.display());
        return Vec::new();
    }

    match parse_context_ini(path) {
        Ok(attrs) => attrs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable context attribute file");
            Vec::new()
        }
    }
}

fn parse_context_ini(path: &Path) -> std::result::Result<Vec<(String, String)>, ini::Error> {
    let ini = Ini::load_from_file_noescape(path)?;
    let Some(section) = ini.section(Some(CONTEXT_ATTRS_SECTION)) else {
        return Ok(Vec::new());
    };

    Ok(section
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = LocalConfig::default();
        assert_eq!(config.iio_devices_dir(), PathBuf::from("/sys/bus/iio/devices"));
        assert_eq!(config.hwmon_dir(), PathBuf::from("/sys/class/hwmon"));
        assert_eq!(config.debug_dir(), PathBuf::from("/sys/kernel/debug/iio"));
        assert_eq!(config.attr_read_limit, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_merges_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.toml");
        fs::write(&path, "sysfs_root = \"/tmp/fake-sys\"\nhwmon = false\n").unwrap();

        let config = LocalConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sysfs_root, PathBuf::from("/tmp/fake-sys"));
        assert!(!config.hwmon);
        assert_eq!(config.dev_root, PathBuf::from("/dev"));
    }

    #[test]
    fn test_validate_rejects_tiny_read_limit() {
        let config = LocalConfig {
            attr_read_limit: 1,
            ..LocalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_context_ini_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libiio.ini");
        fs::write(
            &path,
            "[Other]\nignored=1\n\n[Context Attributes]\nhw_model=zedboard\nserial=1234\n",
        )
        .unwrap();

        let attrs = read_context_ini(&path);
        assert_eq!(
            attrs,
            [
                ("hw_model".to_string(), "zedboard".to_string()),
                ("serial".to_string(), "1234".to_string())
            ]
        );
    }

    #[test]
    fn test_context_ini_keeps_case_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libiio.ini");
        fs::write(
            &path,
            "[context attributes]\nlower=1\n\n[Context Attributes]\nSerial_Number=AB12\nHW_Model=ZedBoard\n",
        )
        .unwrap();

        let attrs = read_context_ini(&path);
        assert_eq!(
            attrs,
            [
                ("Serial_Number".to_string(), "AB12".to_string()),
                ("HW_Model".to_string(), "ZedBoard".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_context_ini() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_context_ini(&dir.path().join("absent.ini")).is_empty());
    }
}
