//! Fake sysfs trees for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use iio_backend_local::LocalConfig;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub const DEV0: &str = "sys/bus/iio/devices/iio:device0";

/// Route library logs to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scratch root laid out like `/`.
pub struct FakeTree {
    root: TempDir,
}

impl FakeTree {
    pub fn new() -> Self {
        init_tracing();
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    /// An ad7291-like ADC with three scan elements, a trigger, a hwmon
    /// sensor, a malformed device and some debugfs entries.
    pub fn populated() -> Self {
        let tree = Self::new();
        tree.file(&format!("{DEV0}/name"), "ad7291\n")
            .file(&format!("{DEV0}/uevent"), "MAJOR=250\nMINOR=0\n")
            .file(&format!("{DEV0}/dev"), "250:0\n")
            .file(&format!("{DEV0}/sampling_frequency"), "1000\n")
            .file(&format!("{DEV0}/in_voltage0_raw"), "1023\n")
            .file(&format!("{DEV0}/in_voltage1_raw"), "12\n")
            .file(&format!("{DEV0}/in_voltage_scale"), "0.610351562\n")
            .file(&format!("{DEV0}/in_temp0_raw"), "310\n")
            .file(&format!("{DEV0}/buffer/length"), "0\n")
            .file(&format!("{DEV0}/buffer/enable"), "0\n")
            .file(&format!("{DEV0}/buffer/data_available"), "0\n")
            .file(&format!("{DEV0}/trigger/current_trigger"), "\n");

        for (chn, index, ty) in [
            ("voltage0", 0, "le:u12/16>>0"),
            ("voltage1", 1, "le:u12/16>>0"),
            ("timestamp", 2, "le:s64/64>>0"),
        ] {
            tree.file(&format!("{DEV0}/scan_elements/in_{chn}_en"), "0\n")
                .file(&format!("{DEV0}/scan_elements/in_{chn}_index"), &format!("{index}\n"))
                .file(&format!("{DEV0}/scan_elements/in_{chn}_type"), &format!("{ty}\n"));
        }

        tree.file("sys/bus/iio/devices/trigger0/name", "ad7291-dev0\n")
            .file("sys/bus/iio/devices/iio:device1/name", "broken\n")
            .file("sys/bus/iio/devices/iio:device1/scan_elements/in_voltage0_bogus", "1\n")
            .file("sys/class/hwmon/hwmon0/name", "cpu_thermal\n")
            .file("sys/class/hwmon/hwmon0/temp1_input", "42000\n")
            .file("sys/kernel/debug/iio/iio:device0/direct_reg_access", "0x0\n")
            .dir("sys/kernel/debug/iio/iio:device7")
            .file("dev/iio:device0", "")
            .file("etc/libiio.ini", "[Context Attributes]\nhw_model=Test board\n");
        tree
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn file(&self, rel: &str, content: &str) -> &Self {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.path(rel)).unwrap();
        self
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn config(&self) -> LocalConfig {
        LocalConfig::rooted_at(self.root.path())
    }
}
