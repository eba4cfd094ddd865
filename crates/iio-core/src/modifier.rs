//! Channel modifier table.
//!
//! Modifiers qualify a channel type (`accel_x`, `intensity_ir`,
//! `temp_ambient`). The table order matters: the first entry that matches
//! wins, and a match must be followed by `_` or the end of the string.

/// Known channel modifiers, in kernel enumeration order.
pub const MODIFIERS: &[&str] = &[
    "x",
    "y",
    "z",
    "x&y",
    "x&z",
    "y&z",
    "x&y&z",
    "x|y",
    "x|z",
    "y|z",
    "x|y|z",
    "sqrt(x^2+y^2)",
    "x^2+y^2+z^2",
    "both",
    "ir",
    "clear",
    "red",
    "green",
    "blue",
    "uv",
    "duv",
    "quaternion",
    "ambient",
    "object",
    "from_north_magnetic",
    "from_north_true",
    "from_north_magnetic_tilt_comp",
    "from_north_true_tilt_comp",
    "running",
    "jogging",
    "walking",
    "still",
    "sqrt(x^2+y^2+z^2)",
    "i",
    "q",
    "co2",
    "voc",
    "pm1",
    "pm2p5",
    "pm4",
    "pm10",
    "ethanol",
    "h2",
    "o2",
    "linear_x",
    "linear_y",
    "linear_z",
    "pitch",
    "yaw",
    "roll",
    "uva",
    "uvb",
];

/// Find the modifier `s` starts with.
///
/// Returns the modifier and its length in bytes.
pub fn find_modifier(s: &str) -> Option<(&'static str, usize)> {
    MODIFIERS.iter().find_map(|&m| {
        let rest = s.strip_prefix(m)?;
        (rest.is_empty() || rest.starts_with('_')).then_some((m, m.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_modifier_requires_separator() {
        assert_eq!(find_modifier("x_raw"), Some(("x", 1)));
        assert_eq!(find_modifier("x"), Some(("x", 1)));
        assert_eq!(find_modifier("x&y_raw"), Some(("x&y", 3)));
        assert_eq!(find_modifier("xyz_raw"), None);
        assert_eq!(find_modifier("raw"), None);
    }

    #[test]
    fn test_find_modifier_first_match_wins() {
        assert_eq!(
            find_modifier("from_north_magnetic_tilt_comp_raw"),
            Some(("from_north_magnetic", 19))
        );
        assert_eq!(find_modifier("ir_raw"), Some(("ir", 2)));
        assert_eq!(find_modifier("linear_x_raw"), Some(("linear_x", 8)));
    }
}
