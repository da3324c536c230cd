//! Per-device UTC offsets for plain-text replay timestamps.

use chrono::FixedOffset;

/// Largest offset in use anywhere, in hours.
const MAX_HOURS: i32 = 14;

/// Parse `UTC`, `Z`, `+2`, `-05:30`, `+0530` or `UTC+1`.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    let upper = raw.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if (rest.is_empty() && !raw.is_empty()) || rest == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, digits) = if let Some(d) = rest.strip_prefix('+') {
        (1, d)
    } else if let Some(d) = rest.strip_prefix('-') {
        (-1, d)
    } else {
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (hours, minutes) = match digits.split_once(':') {
        Some(parts) => parts,
        None if digits.len() > 2 => digits.split_at(digits.len() - 2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > MAX_HOURS || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(raw: &str) -> Option<i32> {
        parse_offset(raw).map(|o| o.local_minus_utc())
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(secs("UTC"), Some(0));
        assert_eq!(secs("z"), Some(0));
        assert_eq!(secs("+2"), Some(7200));
        assert_eq!(secs("-05:30"), Some(-19800));
        assert_eq!(secs("+0530"), Some(19800));
        assert_eq!(secs("utc+1"), Some(3600));
        assert_eq!(secs("GMT-3"), Some(-10800));
    }

    #[test]
    fn test_parse_offset_rejects_junk() {
        for raw in ["", "Europe/Berlin", "+", "+15", "+02:75", "2", "+1:x", "+٣"] {
            assert_eq!(secs(raw), None, "{raw}");
        }
    }
}
