//! Form timestamps (`YYYY-MM-DDTHH:MM`, local wall clock) to epoch seconds.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};

use crate::error::ValidationError;

pub const FORM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Parse `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, ValidationError> {
    let bad = |reason: &str| ValidationError::TimeParse { value: s.to_string(), reason: reason.to_string() };
    let s = s.trim();
    if s == "Z" || s == "z" {
        return FixedOffset::east_opt(0).ok_or_else(|| bad("offset out of range"));
    }
    let (sign, rest) = match s.chars().next() {
        Some('+') => (1, &s[1..]),
        Some('-') => (-1, &s[1..]),
        _ => return Err(bad("offset must start with + or -")),
    };
    let (h, m) = rest.split_once(':').ok_or_else(|| bad("offset must look like +HH:MM"))?;
    if h.len() != 2 || m.len() != 2 {
        return Err(bad("offset must look like +HH:MM"));
    }
    let h: i32 = h.parse().map_err(|_| bad("invalid hours"))?;
    let m: i32 = m.parse().map_err(|_| bad("invalid minutes"))?;
    if m >= 60 {
        return Err(bad("invalid minutes"));
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(|| bad("offset out of range"))
}

/// Interpret a minute-precision wall-clock time in `offset` and return unix seconds.
pub fn parse_form_time(value: &str, offset: &FixedOffset) -> Result<i64, ValidationError> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), FORM_TIME_FORMAT)
        .map_err(|e| ValidationError::TimeParse { value: value.to_string(), reason: e.to_string() })?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| ValidationError::TimeParse { value: value.to_string(), reason: "ambiguous local time".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        assert_eq!(parse_utc_offset("+02:00").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("02:00").is_err());
        assert!(parse_utc_offset("+2").is_err());
        assert!(parse_utc_offset("+02:75").is_err());
    }

    #[test]
    fn form_time_applies_offset() {
        let plus2 = parse_utc_offset("+02:00").unwrap();
        assert_eq!(parse_form_time("2024-01-01T10:00", &plus2).unwrap(), 1704096000);
        assert_eq!(parse_form_time("2024-01-01T11:00", &plus2).unwrap(), 1704099600);
        let utc = parse_utc_offset("+00:00").unwrap();
        assert_eq!(parse_form_time("1970-01-01T00:01", &utc).unwrap(), 60);
    }

    #[test]
    fn form_time_rejects_other_shapes() {
        let utc = parse_utc_offset("+00:00").unwrap();
        assert!(matches!(parse_form_time("2024-01-01 10:00", &utc), Err(ValidationError::TimeParse { .. })));
        assert!(parse_form_time("2024-01-01T10:00:00", &utc).is_err());
        assert!(parse_form_time("yesterday", &utc).is_err());
    }
}
