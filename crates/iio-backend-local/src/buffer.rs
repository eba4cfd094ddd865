//! Streaming buffers.
//!
//! A [`LocalBuffer`] owns the data descriptor of one hardware buffer plus a
//! cancel eventfd. Opening it programs the channel enables, [`enable`]
//! starts the stream, and bytes then move either through
//! [`read`]/[`write`] or through zero-copy blocks.
//!
//! ```text
//!   open ──► Opened ──enable──► Enabled
//!              ▲                   │
//!              └──────disable──────┘
//! ```
//!
//! Dropping the buffer frees its blocks, disables the stream and closes both
//! descriptors. Cancellation is sticky: once [`cancel`] ran, every later
//! wait on this buffer fails with [`IioError::Cancelled`].
//!
//! [`enable`]: LocalBuffer::enable
//! [`read`]: LocalBuffer::read
//! [`write`]: LocalBuffer::write
//! [`cancel`]: LocalBuffer::cancel

use std::fs::OpenOptions;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use iio_core::{AttrScope, Channel, ChannelsMask, Device, IioError, Result};

use crate::block::{BlockEngine, BlockId, BlockStrategy, BlockTarget};
use crate::ioctl::{ioctl_nointr, IIO_BUFFER_GET_FD_IOCTL};
use crate::poll::{CancelFd, CancelHandle, TimedPoller};
use crate::sysfs::{read_attr_file, write_attr_file, Sysfs};
use crate::transport::BlockingTransport;

/// Lifecycle state of an open buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Channels programmed, stream stopped.
    Opened,
    /// Stream running.
    Enabled,
}

/// Enable file of a channel for buffer `idx`.
///
/// Buffer 0 uses the legacy `scan_elements/` file; other buffers keep their
/// enables in `buffer<n>/`.
fn channel_enable_file(sysfs: &Sysfs, device: &Device, chn: &Channel, idx: u32) -> Option<PathBuf> {
    let rel = chn.enable_path.as_deref()?;
    if idx == 0 {
        return Some(sysfs.device_dir(device).join(rel));
    }
    let file = rel.rsplit('/').next().unwrap_or(rel);
    Some(sysfs.buffer_dir(device, idx).join(file))
}

fn write_buffer_attr(sysfs: &Sysfs, device: &Device, idx: u32, name: &str, value: &str) -> Result<()> {
    write_attr_file(&sysfs.attr_path(device, AttrScope::Buffer(idx), name), value).map(drop)
}

/// Program the channel enables of buffer `idx` from `mask`, then read the
/// hardware state back into `mask`.
///
/// Some devices couple channels together, so the readback may both add and
/// remove bits.
fn reconcile_channels(sysfs: &Sysfs, device: &Device, idx: u32, mask: &mut ChannelsMask) -> Result<()> {
    for (pos, chn) in device.channels.iter().enumerate() {
        if chn.index.is_none() || chn.enable_path.is_some() {
            continue;
        }
        if mask.is_enabled(pos) {
            return Err(IioError::invalid_argument(format!(
                "channel {} of {} has a scan index but no enable file",
                chn.id, device.id
            )));
        }
        warn!(device = %device.id, channel = %chn.id, "Scan element without enable file");
    }

    let scan: Vec<(usize, PathBuf)> = device
        .channels
        .iter()
        .enumerate()
        .filter(|(_, chn)| chn.is_enableable())
        .filter_map(|(pos, chn)| channel_enable_file(sysfs, device, chn, idx).map(|p| (pos, p)))
        .collect();

    for (_, path) in &scan {
        write_attr_file(path, "0")?;
    }
    for (pos, path) in &scan {
        if mask.is_enabled(*pos) {
            write_attr_file(path, "1")?;
        }
    }
    for (pos, path) in &scan {
        let state = read_attr_file(path, sysfs.config().attr_read_limit)?;
        mask.set(*pos, state.trim_start().starts_with('1'));
    }
    Ok(())
}

/// One open hardware buffer.
#[derive(Debug)]
pub struct LocalBuffer {
    // Blocks hold mappings of `fd`; keep them first so they go before it.
    engine: BlockEngine,
    fd: OwnedFd,
    cancel: CancelFd,
    device: Arc<Device>,
    sysfs: Arc<Sysfs>,
    idx: u32,
    multi_buffer: bool,
    is_tx: bool,
    state: BufferState,
    timeout_ms: u32,
    closed: bool,
}

impl LocalBuffer {
    /// Open buffer `idx` of `device` with the channels set in `mask`.
    ///
    /// On return `mask` holds the channels the hardware actually enabled.
    /// Buffers other than 0 need a kernel with per-buffer descriptors.
    pub fn open(
        sysfs: Arc<Sysfs>,
        device: Arc<Device>,
        idx: u32,
        mask: &mut ChannelsMask,
        timeout_ms: u32,
    ) -> Result<Self> {
        if mask.len() != device.channels.len() {
            return Err(IioError::invalid_argument(format!(
                "mask covers {} channels, {} has {}",
                mask.len(),
                device.id,
                device.channels.len()
            )));
        }

        let cancel = CancelFd::new()?;

        let path = sysfs.data_path(&device);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(&path)
            .map_err(IioError::from_os)?;
        let mut fd = OwnedFd::from(file);

        let mut buf_fd = idx as libc::c_int;
        // SAFETY: IIO_BUFFER_GET_FD takes an int, replaced by the new fd.
        let got_fd = unsafe { ioctl_nointr(fd.as_fd(), IIO_BUFFER_GET_FD_IOCTL, &mut buf_fd) };
        let multi_buffer = match got_fd {
            Ok(_) => {
                // SAFETY: the kernel returned a fresh descriptor we own.
                fd = unsafe { OwnedFd::from_raw_fd(buf_fd) };
                true
            }
            Err(e) if idx == 0 => {
                debug!(device = %device.id, error = %e, "No per-buffer descriptors");
                false
            }
            Err(e) => return Err(IioError::from_os(e)),
        };

        write_buffer_attr(&sysfs, &device, idx, "enable", "0")?;
        reconcile_channels(&sysfs, &device, idx, mask)?;

        let is_tx = device
            .channels
            .iter()
            .enumerate()
            .any(|(pos, chn)| chn.is_output && mask.is_enabled(pos));

        info!(
            device = %device.id,
            buffer = idx,
            channels = mask.count(),
            is_tx,
            multi_buffer,
            "Opened buffer"
        );

        Ok(Self {
            engine: BlockEngine::default(),
            fd,
            cancel,
            device,
            sysfs,
            idx,
            multi_buffer,
            is_tx,
            state: BufferState::Opened,
            timeout_ms,
            closed: false,
        })
    }

    /// Device the buffer belongs to.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Buffer index.
    pub fn index(&self) -> u32 {
        self.idx
    }

    /// Whether the buffer streams towards the device.
    pub fn is_tx(&self) -> bool {
        self.is_tx
    }

    /// Whether the kernel gave this buffer its own descriptor.
    pub fn is_multi_buffer(&self) -> bool {
        self.multi_buffer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Timeout for blocking waits in milliseconds, `0` waits forever.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Zero-copy strategy in use, once the first block was created.
    pub fn block_strategy(&self) -> Option<BlockStrategy> {
        self.engine.strategy()
    }

    /// Start streaming.
    ///
    /// `nb_samples` sizes the kernel buffer for read/write streaming and must
    /// be zero once zero-copy blocks are in use, where the blocks size it.
    pub fn enable(&mut self, nb_samples: usize) -> Result<()> {
        if self.engine.is_zero_copy() != (nb_samples == 0) {
            return Err(IioError::invalid_argument(if nb_samples == 0 {
                "sample count required without zero-copy blocks"
            } else {
                "sample count must be zero with zero-copy blocks"
            }));
        }

        if nb_samples > 0 {
            let samples = nb_samples.to_string();
            self.write_attr("length", &samples)?;
            match self.write_attr("watermark", &samples) {
                Ok(()) => {}
                Err(e) if e.is_not_found() || e.is_permission_denied() => {
                    debug!(device = %self.device.id, error = %e, "Watermark not set");
                }
                Err(e) => return Err(e),
            }
        }

        self.write_attr("enable", "1")?;
        self.state = BufferState::Enabled;
        info!(device = %self.device.id, buffer = self.idx, nb_samples, "Enabled buffer");
        Ok(())
    }

    /// Stop streaming.
    pub fn disable(&mut self) -> Result<()> {
        self.write_attr("enable", "0")?;
        self.state = BufferState::Opened;
        debug!(device = %self.device.id, buffer = self.idx, "Disabled buffer");
        Ok(())
    }

    /// Abort current and future waits on this buffer.
    pub fn cancel(&self) -> Result<()> {
        self.cancel.signal()
    }

    /// Handle for cancelling from another thread.
    pub fn cancel_handle(&self) -> Result<CancelHandle> {
        self.cancel.handle()
    }

    /// Read samples, waiting up to the buffer timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transport().read(buf, false)
    }

    /// Read whatever is available without waiting.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transport().read(buf, true)
    }

    /// Write samples, waiting up to the buffer timeout.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.transport().write(buf, false)
    }

    /// Write what fits without waiting.
    pub fn try_write(&mut self, buf: &[u8]) -> Result<usize> {
        self.transport().write(buf, true)
    }

    /// Create a zero-copy block of `size` bytes.
    pub fn create_block(&mut self, size: usize) -> Result<BlockId> {
        let heap = self.sysfs.dma_heap_path();
        let (engine, target) = self.blocks();
        engine.create(target, &heap, size)
    }

    /// Memory of a block.
    pub fn block_data(&self, id: BlockId) -> Result<&[u8]> {
        self.engine.data(id)
    }

    /// Mutable memory of a block. Only touch it while the block is not
    /// enqueued.
    pub fn block_data_mut(&mut self, id: BlockId) -> Result<&mut [u8]> {
        self.engine.data_mut(id)
    }

    /// Give a block to the hardware with its first `bytes_used` bytes.
    pub fn enqueue_block(&mut self, id: BlockId, bytes_used: usize, cyclic: bool) -> Result<()> {
        let (engine, target) = self.blocks();
        engine.enqueue(target, id, bytes_used, cyclic)
    }

    /// Take a block back from the hardware.
    pub fn dequeue_block(&mut self, id: BlockId, nonblock: bool) -> Result<()> {
        let (engine, target) = self.blocks();
        engine.dequeue(target, id, nonblock)
    }

    /// Destroy a block.
    pub fn free_block(&mut self, id: BlockId) -> Result<()> {
        let (engine, target) = self.blocks();
        engine.free(target, id)
    }

    /// Close the buffer, reporting a failure to disable it.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn poller(&self) -> TimedPoller<'_> {
        TimedPoller::new(self.cancel.as_fd(), self.timeout_ms)
    }

    fn transport(&self) -> BlockingTransport<'_> {
        BlockingTransport::new(self.fd.as_fd(), self.poller())
    }

    fn blocks(&mut self) -> (&mut BlockEngine, BlockTarget<'_>) {
        let target = BlockTarget {
            fd: self.fd.as_fd(),
            poller: TimedPoller::new(self.cancel.as_fd(), self.timeout_ms),
            is_tx: self.is_tx,
        };
        (&mut self.engine, target)
    }

    fn write_attr(&self, name: &str, value: &str) -> Result<()> {
        write_buffer_attr(&self.sysfs, &self.device, self.idx, name, value)
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let (engine, target) = self.blocks();
        engine.release(target);
        let res = self.write_attr("enable", "0");
        debug!(device = %self.device.id, buffer = self.idx, "Closed buffer");
        res
    }
}

impl Drop for LocalBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(device = %self.device.id, buffer = self.idx, error = %e, "Unable to disable buffer on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalConfig;

    fn scan_channel(id: &str, enable: &str) -> Channel {
        let mut chn = Channel::new(id, false);
        chn.index = Some(0);
        chn.enable_path = Some(enable.to_string());
        chn
    }

    #[test]
    fn test_enable_file_per_buffer() {
        let sysfs = Sysfs::new(LocalConfig::default());
        let dev = Device::new("iio:device0");
        let chn = scan_channel("voltage0", "scan_elements/in_voltage0_en");

        assert_eq!(
            channel_enable_file(&sysfs, &dev, &chn, 0),
            Some(PathBuf::from(
                "/sys/bus/iio/devices/iio:device0/scan_elements/in_voltage0_en"
            ))
        );
        assert_eq!(
            channel_enable_file(&sysfs, &dev, &chn, 2),
            Some(PathBuf::from("/sys/bus/iio/devices/iio:device0/buffer2/in_voltage0_en"))
        );
        assert_eq!(
            channel_enable_file(&sysfs, &dev, &Channel::new("temp", false), 0),
            None
        );
    }

    #[test]
    fn test_reconcile_reads_back_hardware() {
        let root = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(LocalConfig::rooted_at(root.path()));
        let mut dev = Device::new("iio:device0");
        dev.channels = vec![
            scan_channel("voltage0", "scan_elements/in_voltage0_en"),
            scan_channel("voltage1", "scan_elements/in_voltage1_en"),
            Channel::new("temp", false),
        ];
        let scan_dir = sysfs.device_dir(&dev).join("scan_elements");
        std::fs::create_dir_all(&scan_dir).unwrap();
        std::fs::write(scan_dir.join("in_voltage0_en"), "1\n").unwrap();
        std::fs::write(scan_dir.join("in_voltage1_en"), "1\n").unwrap();

        let mut mask = ChannelsMask::new(3);
        mask.enable(1);
        mask.enable(2);
        reconcile_channels(&sysfs, &dev, 0, &mut mask).unwrap();

        assert!(!mask.is_enabled(0));
        assert!(mask.is_enabled(1));
        // Not a scan element, left untouched.
        assert!(mask.is_enabled(2));
        assert_eq!(
            std::fs::read_to_string(scan_dir.join("in_voltage0_en")).unwrap(),
            "0\n"
        );
    }

    #[test]
    fn test_reconcile_rejects_scan_element_without_enable() {
        let root = tempfile::tempdir().unwrap();
        let sysfs = Sysfs::new(LocalConfig::rooted_at(root.path()));
        let mut dev = Device::new("iio:device0");
        let mut orphan = Channel::new("voltage1", false);
        orphan.index = Some(1);
        dev.channels = vec![
            scan_channel("voltage0", "scan_elements/in_voltage0_en"),
            orphan,
        ];
        let scan_dir = sysfs.device_dir(&dev).join("scan_elements");
        std::fs::create_dir_all(&scan_dir).unwrap();
        std::fs::write(scan_dir.join("in_voltage0_en"), "0\n").unwrap();

        // Not requested: tolerated.
        let mut mask = ChannelsMask::new(2);
        mask.enable(0);
        reconcile_channels(&sysfs, &dev, 0, &mut mask).unwrap();
        assert!(mask.is_enabled(0));

        let mut mask = ChannelsMask::new(2);
        mask.enable(1);
        let err = reconcile_channels(&sysfs, &dev, 0, &mut mask).unwrap_err();
        assert!(matches!(err, IioError::InvalidArgument { .. }));
    }
}
