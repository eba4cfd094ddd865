//! Attribute file naming conventions.
//!
//! IIO encodes structure in file names:
//!
//! ```text
//! in_voltage0_raw            direction _ channel id _ attribute
//! in_accel_x_calibbias       channel id may carry a modifier (accel_x)
//! in_voltage0-voltage1_raw   differential channel id
//! in_voltage_scale           shared by every input voltage channel
//! in_voltage0_vref_raw       "vref" is a display name of voltage0
//! ```
//!
//! Hardware-monitoring devices use `<type><n>_<attribute>` instead
//! (`temp1_input`, `fan2_min`).

use iio_core::{find_modifier, IioError, Result};

/// Hardware-monitoring channel type prefixes.
const HWMON_CHANNEL_PREFIXES: &[&str] = &[
    "in",
    "fan",
    "pwm",
    "temp",
    "curr",
    "power",
    "energy",
    "humidity",
    "intrusion",
];

/// Whether a hwmon attribute name belongs to a channel (`temp1_input`).
pub fn is_hwmon_channel(name: &str) -> bool {
    HWMON_CHANNEL_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.bytes().next())
            .is_some_and(|b| b.is_ascii_digit())
    })
}

/// Position of the underscore ending the channel type, after the
/// direction prefix.
fn type_separator(name: &str) -> Option<usize> {
    let start = if name.starts_with("in_") {
        3
    } else if name.starts_with("out_") {
        4
    } else {
        return None;
    };
    name[start..].find('_').map(|pos| start + pos)
}

/// Whether an attribute name describes a channel.
///
/// In strict mode the channel type must be indexed (`voltage0_`) or
/// modified (`accel_x_`); non-strict mode accepts any `in_<type>_<attr>`
/// or `out_<type>_<attr>` name.
pub fn is_channel(name: &str, hwmon: bool, strict: bool) -> bool {
    if hwmon {
        return is_hwmon_channel(name);
    }
    if name.starts_with("in_timestamp_") {
        return true;
    }

    let Some(sep) = type_separator(name) else {
        return false;
    };
    if !strict {
        return true;
    }

    if name.as_bytes()[sep - 1].is_ascii_digit() {
        return true;
    }
    find_modifier(&name[sep + 1..]).is_some()
}

/// Extract the channel id from an attribute name.
///
/// `in_voltage0_raw` gives `voltage0`, `in_accel_x_raw` gives `accel_x`.
pub fn channel_id(name: &str, hwmon: bool) -> Result<String> {
    let first = name.find('_');

    if hwmon {
        return Ok(match first {
            Some(pos) => name[..pos].to_string(),
            None => name.to_string(),
        });
    }

    let rest = first
        .map(|pos| &name[pos + 1..])
        .ok_or_else(|| IioError::protocol(name, "missing direction separator"))?;
    let mut end = rest
        .find('_')
        .ok_or_else(|| IioError::protocol(name, "missing channel separator"))?;

    if let Some((_, len)) = find_modifier(&rest[end + 1..]) {
        end += len + 1;
    }
    Ok(rest[..end.min(rest.len())].to_string())
}

/// Derive the logical attribute name a channel file exposes.
///
/// Strips the direction, channel type, modifier and (when known) the
/// channel's display name: `in_voltage0_vref_scale` with display name
/// `vref` gives `scale`.
pub fn short_attr_name(name: &str, hwmon: bool, channel_name: Option<&str>) -> Result<String> {
    if hwmon {
        return Ok(match name.find('_') {
            Some(pos) => name[pos + 1..].to_string(),
            None => name.to_string(),
        });
    }

    let first = name
        .find('_')
        .ok_or_else(|| IioError::protocol(name, "missing direction separator"))?;
    let second = name[first + 1..]
        .find('_')
        .ok_or_else(|| IioError::protocol(name, "missing channel separator"))?;
    let mut rest = &name[first + 1 + second + 1..];

    if let Some((_, len)) = find_modifier(rest) {
        rest = rest.get(len + 1..).unwrap_or("");
    }

    if let Some(chn_name) = channel_name {
        if let Some(stripped) = rest
            .strip_prefix(chn_name)
            .and_then(|r| r.strip_prefix('_'))
        {
            rest = stripped;
        }
    }

    Ok(rest.to_string())
}

/// How a device-level attribute relates to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GlobalMatch {
    /// Unrelated.
    None,
    /// Shared by every channel of the type (`in_voltage_scale` for
    /// `voltage0`).
    Shared,
    /// Private to the channel through its display name
    /// (`in_voltage_vref_scale` for `voltage0` named `vref`).
    Private,
}

/// Classify a device-level attribute against a channel.
pub fn global_attr_match(
    name: &str,
    chn_id: &str,
    chn_name: Option<&str>,
    chn_is_output: bool,
) -> GlobalMatch {
    let attr = match (chn_is_output, name.strip_prefix("in_"), name.strip_prefix("out_")) {
        (false, Some(rest), _) => rest,
        (true, _, Some(rest)) => rest,
        _ => return GlobalMatch::None,
    };

    let Some(len) = attr.find('_') else {
        return GlobalMatch::None;
    };
    let attr_bytes = attr.as_bytes();
    let id_bytes = chn_id.as_bytes();

    // Differential: in_voltage-voltage_scale against voltage0-voltage1
    if let Some(dash) = attr.find('-').filter(|&d| d > 0 && d < len) {
        let len1 = dash;
        let len2 = len - dash - 1;
        if let Some(iddash) = chn_id.find('-') {
            let id_tail = &id_bytes[iddash + 1..];
            if id_tail.len() > len2
                && iddash > len1
                && id_bytes[len1].is_ascii_digit()
                && id_bytes[..len1] == attr_bytes[..len1]
                && id_tail[len2].is_ascii_digit()
                && id_tail[..len2] == attr_bytes[dash + 1..dash + 1 + len2]
            {
                return GlobalMatch::Shared;
            }
        }
    }

    if id_bytes.len() < len || id_bytes[..len] != attr_bytes[..len] {
        return GlobalMatch::None;
    }

    match id_bytes.get(len) {
        Some(c) if c.is_ascii_digit() => {
            if let Some(chn_name) = chn_name {
                let private = attr[len + 1..]
                    .strip_prefix(chn_name)
                    .is_some_and(|r| r.starts_with('_'));
                if private {
                    return GlobalMatch::Private;
                }
            }
            GlobalMatch::Shared
        }
        Some(b'_') => {
            if find_modifier(&chn_id[len + 1..]).is_some() {
                GlobalMatch::Shared
            } else {
                GlobalMatch::None
            }
        }
        _ => GlobalMatch::None,
    }
}
