//! Channel model.

use std::cmp::Ordering;

use crate::attr::AttrStore;

/// Sample layout of a scan element, as described by its `type` file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataFormat {
    /// Significant bits per sample.
    pub bits: u32,
    /// Storage bits per sample.
    pub length: u32,
    /// Samples per scan slot.
    pub repeat: u32,
    /// Right shift to apply after reading.
    pub shift: u32,
    /// Two's complement sample.
    pub is_signed: bool,
    /// Big-endian storage.
    pub is_be: bool,
    /// Every storage bit is significant.
    pub is_fully_defined: bool,
    /// Whether `scale` holds a value read from the device.
    pub with_scale: bool,
    /// Scale to physical units.
    pub scale: f64,
}

impl Default for DataFormat {
    fn default() -> Self {
        Self {
            bits: 0,
            length: 0,
            repeat: 1,
            shift: 0,
            is_signed: false,
            is_be: false,
            is_fully_defined: false,
            with_scale: false,
            scale: 0.0,
        }
    }
}

/// A logical measurement or output stream of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Channel identifier, e.g. `voltage0`, `accel_x`, `voltage0-voltage1`.
    pub id: String,
    /// Display name recovered from a common attribute prefix.
    pub name: Option<String>,
    /// Output (`out_`) rather than input (`in_`) channel.
    pub is_output: bool,
    /// Participates in buffered capture.
    pub is_scan_element: bool,
    /// Position in the scan, `None` for channels without one.
    pub index: Option<u32>,
    /// Sample layout.
    pub format: DataFormat,
    /// Channel attributes, logical name to backing file.
    pub attrs: AttrStore,
    /// File toggling buffered capture, relative to the device directory.
    pub enable_path: Option<String>,
}

impl Channel {
    /// Create an empty channel with no scan index.
    pub fn new(id: impl Into<String>, is_output: bool) -> Self {
        Self {
            id: id.into(),
            name: None,
            is_output,
            is_scan_element: false,
            index: None,
            format: DataFormat::default(),
            attrs: AttrStore::new(),
            enable_path: None,
        }
    }

    /// Scan-element ordering: indexed channels by (index, shift), then
    /// channels without an index.
    pub fn scan_order(a: &Channel, b: &Channel) -> Ordering {
        match (a.index, b.index) {
            (Some(ia), Some(ib)) => ia
                .cmp(&ib)
                .then_with(|| a.format.shift.cmp(&b.format.shift)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Whether the channel has a backing enable file for buffered capture.
    pub fn is_enableable(&self) -> bool {
        self.index.is_some() && self.enable_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(id: &str, index: Option<u32>, shift: u32) -> Channel {
        let mut chn = Channel::new(id, false);
        chn.index = index;
        chn.format.shift = shift;
        chn
    }

    #[test]
    fn test_scan_order() {
        let mut channels = vec![
            indexed("temp", None, 0),
            indexed("voltage1", Some(1), 0),
            indexed("timestamp", Some(3), 0),
            indexed("voltage0_hi", Some(0), 8),
            indexed("voltage0_lo", Some(0), 0),
            indexed("supply", None, 0),
        ];
        channels.sort_by(Channel::scan_order);

        let ids: Vec<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "voltage0_lo",
                "voltage0_hi",
                "voltage1",
                "timestamp",
                "temp",
                "supply"
            ]
        );
    }
}
