//! Sysfs access: attribute files and directory walking.
//!
//! Attribute files are small text files. A read pulls the whole file into a
//! bounded buffer and drops the trailing newline; a write replaces the
//! content with a single write. Files are never created: writing an
//! attribute the kernel does not expose fails with "not found".

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use iio_core::{AttrIo, AttrScope, Device, DeviceKind, IioError, Result};

use crate::config::LocalConfig;

/// Read an attribute file.
///
/// Files longer than `limit` bytes are rejected with
/// [`IioError::FileTooBig`]; empty files are an I/O error.
pub fn read_attr_file(path: &Path, limit: usize) -> Result<String> {
    let file = File::open(path).map_err(|e| IioError::attribute(path, e))?;

    let mut buf = Vec::with_capacity(limit.min(4096));
    file.take(limit as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(|e| IioError::attribute(path, e))?;

    if buf.len() > limit {
        return Err(IioError::FileTooBig {
            path: path.to_path_buf(),
            limit,
        });
    }
    if buf.is_empty() {
        return Err(IioError::attribute(
            path,
            io::Error::new(io::ErrorKind::UnexpectedEof, "empty attribute"),
        ));
    }

    if matches!(buf.last(), Some(b'\n') | Some(0)) {
        buf.pop();
    }
    trace!(path = %path.display(), len = buf.len(), "Read attribute");
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write an attribute file in one write call.
///
/// Returns the number of bytes the kernel accepted.
pub fn write_attr_file(path: &Path, value: &str) -> Result<usize> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|e| IioError::attribute(path, e))?;

    let data = format!("{}\n", value);
    let written = loop {
        match file.write(data.as_bytes()) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(IioError::attribute(path, e)),
        }
    };

    if written == 0 {
        return Err(IioError::attribute(
            path,
            io::Error::new(io::ErrorKind::WriteZero, "attribute write accepted no bytes"),
        ));
    }
    trace!(path = %path.display(), value, "Wrote attribute");
    Ok(written)
}

/// One visited directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
}

/// Which entries [`list_dir`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    /// Directories not starting with a dot.
    Dirs,
    /// Regular files.
    Files,
}

/// List a directory, following symlinks, in name order.
///
/// Any failure to read the directory or stat an entry aborts the listing.
pub fn list_dir(dir: &Path, filter: EntryFilter) -> Result<Vec<DirEntry>> {
    let directory_error = |source: io::Error| IioError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(directory_error)? {
        let entry = entry.map_err(directory_error)?;
        let path = entry.path();
        let meta = fs::metadata(&path).map_err(|source| IioError::Directory {
            path: path.clone(),
            source,
        })?;

        let Ok(name) = entry.file_name().into_string() else {
            debug!(path = %path.display(), "Skipping non UTF-8 entry");
            continue;
        };

        let keep = match filter {
            EntryFilter::Dirs => meta.is_dir() && !name.starts_with('.'),
            EntryFilter::Files => meta.is_file(),
        };
        if keep {
            entries.push(DirEntry { name, path });
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Path resolution and attribute I/O for one filesystem layout.
#[derive(Debug, Clone)]
pub struct Sysfs {
    config: LocalConfig,
}

impl Sysfs {
    /// Wrap a configuration.
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    /// The underlying configuration.
    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Directory of a device.
    pub fn device_dir(&self, device: &Device) -> PathBuf {
        match device.kind {
            DeviceKind::Iio => self.config.iio_devices_dir().join(&device.id),
            DeviceKind::Hwmon => self.config.hwmon_dir().join(&device.id),
        }
    }

    /// Buffer directory of a device: `buffer/` for index 0, `buffer<n>/`
    /// otherwise.
    pub fn buffer_dir(&self, device: &Device, buf_id: u32) -> PathBuf {
        let dir = self.device_dir(device);
        if buf_id == 0 {
            dir.join("buffer")
        } else {
            dir.join(format!("buffer{}", buf_id))
        }
    }

    /// Full path of an attribute file.
    pub fn attr_path(&self, device: &Device, scope: AttrScope, filename: &str) -> PathBuf {
        match scope {
            AttrScope::Device => self.device_dir(device).join(filename),
            AttrScope::Buffer(buf_id) => self.buffer_dir(device, buf_id).join(filename),
            AttrScope::Debug => self.config.debug_dir().join(&device.id).join(filename),
        }
    }

    /// Character device carrying the buffer data stream.
    pub fn data_path(&self, device: &Device) -> PathBuf {
        self.config.dev_root.join(&device.id)
    }

    /// DMA heap used for DMABUF blocks.
    pub fn dma_heap_path(&self) -> PathBuf {
        self.config.dev_root.join("dma_heap/system")
    }

    /// Read a file with this layout's size limit.
    pub fn read_file(&self, path: &Path) -> Result<String> {
        read_attr_file(path, self.config.attr_read_limit)
    }
}

impl AttrIo for Sysfs {
    fn read_attr(&self, device: &Device, scope: AttrScope, filename: &str) -> Result<String> {
        self.read_file(&self.attr_path(device, scope, filename))
    }

    fn write_attr(
        &self,
        device: &Device,
        scope: AttrScope,
        filename: &str,
        value: &str,
    ) -> Result<usize> {
        write_attr_file(&self.attr_path(device, scope, filename), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_strips_terminator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name");
        fs::write(&path, "ad7291\n").unwrap();
        assert_eq!(read_attr_file(&path, 1024).unwrap(), "ad7291");
    }

    #[test]
    fn test_read_too_big() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, "x".repeat(64)).unwrap();

        let err = read_attr_file(&path, 16).unwrap_err();
        assert!(matches!(err, IioError::FileTooBig { limit: 16, .. }));
    }

    #[test]
    fn test_read_empty_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            read_attr_file(&path, 16),
            Err(IioError::Attribute { .. })
        ));
    }

    #[test]
    fn test_write_does_not_create() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_attr_file(&dir.path().join("watermark"), "4").unwrap_err();
        assert!(err.is_not_found());
        assert!(!dir.path().join("watermark").exists());
    }

    #[test]
    fn test_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("length");
        fs::write(&path, "1024\n").unwrap();

        assert_eq!(write_attr_file(&path, "16").unwrap(), 3);
        assert_eq!(read_attr_file(&path, 1024).unwrap(), "16");
    }

    #[test]
    fn test_list_dir_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("scan_elements")).unwrap();
        fs::create_dir(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join("uevent"), "").unwrap();
        fs::write(dir.path().join("name"), "").unwrap();

        let dirs = list_dir(dir.path(), EntryFilter::Dirs).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].name, "scan_elements");

        let files: Vec<_> = list_dir(dir.path(), EntryFilter::Files)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(files, ["name", "uevent"]);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = list_dir(&dir.path().join("absent"), EntryFilter::Dirs).unwrap_err();
        assert!(matches!(err, IioError::Directory { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_paths() {
        let sysfs = Sysfs::new(LocalConfig::default());
        let dev = Device::new("iio:device0");
        assert_eq!(
            sysfs.attr_path(&dev, AttrScope::Buffer(0), "enable"),
            PathBuf::from("/sys/bus/iio/devices/iio:device0/buffer/enable")
        );
        assert_eq!(
            sysfs.attr_path(&dev, AttrScope::Buffer(2), "length"),
            PathBuf::from("/sys/bus/iio/devices/iio:device0/buffer2/length")
        );
        assert_eq!(
            sysfs.attr_path(&dev, AttrScope::Debug, "direct_reg_access"),
            PathBuf::from("/sys/kernel/debug/iio/iio:device0/direct_reg_access")
        );
        assert_eq!(sysfs.data_path(&dev), PathBuf::from("/dev/iio:device0"));

        let hwmon = Device::new("hwmon1");
        assert_eq!(
            sysfs.device_dir(&hwmon),
            PathBuf::from("/sys/class/hwmon/hwmon1")
        );
    }
}
