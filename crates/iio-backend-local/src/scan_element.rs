//! Scan-element attributes.
//!
//! Every buffered channel has three files in `scan_elements/`:
//!
//! | file    | content                       | result                     |
//! |---------|-------------------------------|----------------------------|
//! | `index` | scan position, C integer      | [`Channel::index`]         |
//! | `type`  | `le:s12/16>>4`, `be:u8/8X2>>0`| [`DataFormat`]             |
//! | `en`    | `0` / `1`                     | [`Channel::enable_path`]   |
//!
//! [`Channel::index`]: iio_core::Channel::index
//! [`Channel::enable_path`]: iio_core::Channel::enable_path

use tracing::{debug, warn};

use iio_core::{DataFormat, IioError, Result};

use crate::channel_builder::PendingChannel;

/// Parse an integer the way C's `strtoll(s, &end, 0)` does: optional sign,
/// `0x` hex, leading-zero octal, longest valid prefix.
///
/// Returns `None` when no digit could be consumed.
pub fn parse_c_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .filter(|h| h.starts_with(|c: char| c.is_ascii_hexdigit()))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    let end = body
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(body.len());
    let value = if end == 0 {
        // A lone "0" followed by non-octal characters is still zero.
        if radix == 8 {
            0
        } else {
            return None;
        }
    } else {
        i64::from_str_radix(&body[..end], radix).ok()?
    };

    Some(if negative { -value } else { value })
}

/// Parse a scan-element `type` string.
///
/// Format: `<e>e:<s><bits>/<length>[X<repeat>]>><shift>` where `<e>` is
/// `l` or `b` and `<s>` is one of `s`, `S`, `u`, `U`.
pub fn parse_type(s: &str) -> Option<DataFormat> {
    let b = s.as_bytes();
    let endian = *b.first()?;
    let rest = s.get(1..)?.strip_prefix("e:")?;
    let sign = *rest.as_bytes().first()?;
    let rest = rest.get(1..)?;

    let (bits, rest) = take_u32(rest)?;
    let rest = rest.strip_prefix('/')?;
    let (length, mut rest) = take_u32(rest)?;

    let mut repeat = 1;
    if s.contains('X') {
        let after = rest.strip_prefix('X')?;
        let (r, tail) = take_u32(after)?;
        repeat = r;
        rest = tail;
    }

    let rest = rest.strip_prefix(">>")?;
    let (shift, _) = take_u32(rest)?;

    Some(DataFormat {
        bits,
        length,
        repeat,
        shift,
        is_signed: sign == b's' || sign == b'S',
        is_be: endian == b'b',
        is_fully_defined: sign == b'S' || sign == b'U' || bits == length,
        ..DataFormat::default()
    })
}

fn take_u32(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some((s[..end].parse().ok()?, &s[end..]))
}

/// Interpret the protected attributes of one channel.
///
/// `read` fetches a file relative to the device directory. An unreadable
/// `index` file is skipped; a malformed one, a second `en` file or an
/// unknown scan-element name is a protocol error. An unparseable `type`
/// leaves the default format.
pub fn apply_scan_elements<F>(chn: &mut PendingChannel, mut read: F) -> Result<()>
where
    F: FnMut(&str) -> Result<String>,
{
    let context = chn.channel.id.clone();

    for attr in &chn.protected {
        match attr.name.as_str() {
            "index" => match read(&attr.filename) {
                Ok(value) => {
                    let index = parse_c_integer(&value)
                        .filter(|&v| v >= 0)
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| {
                            IioError::protocol(&context, format!("invalid scan index '{}'", value))
                        })?;
                    chn.channel.index = Some(index);
                }
                Err(e) => {
                    debug!(channel = %context, error = %e, "Scan index unreadable");
                }
            },
            "type" => match read(&attr.filename) {
                Ok(value) => match parse_type(&value) {
                    Some(format) => chn.channel.format = format,
                    None => {
                        warn!(channel = %context, value = %value, "Unparseable scan element type");
                    }
                },
                Err(e) => {
                    debug!(channel = %context, error = %e, "Scan element type unreadable");
                }
            },
            "en" => {
                if chn.channel.enable_path.is_some() {
                    return Err(IioError::protocol(&context, "duplicate enable attribute"));
                }
                chn.channel.enable_path = Some(attr.filename.clone());
            }
            other => {
                return Err(IioError::protocol(
                    &context,
                    format!("unknown scan element attribute '{}'", other),
                ));
            }
        }
    }

    chn.protected.clear();
    Ok(())
}
