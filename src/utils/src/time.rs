use std::time::Duration;

use chrono::format::StrftimeItems;
use chrono::{DateTime, NaiveDateTime};

pub fn unix_nano_to_time(unix_nano: i64) -> NaiveDateTime {
    let secs = unix_nano.div_euclid(1_000_000_000);
    let nsecs = unix_nano.rem_euclid(1_000_000_000);
    DateTime::from_timestamp(secs, nsecs as u32)
        .unwrap_or_default()
        .naive_utc()
}

pub fn time_format(dt: NaiveDateTime) -> String {
    let fmt = StrftimeItems::new("%Y-%m-%d %H:%M:%S");
    format!("{}", dt.format_with_items(fmt))
}

pub fn format_unix_nano(unix_nano: i64) -> String {
    time_format(unix_nano_to_time(unix_nano))
}

/// parse_duration parses durations such as `168h`, `7d`, `1h30m` or `90s`.
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let mut total: u128 = 0;
    let mut num = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            num.push(c);
            continue;
        }

        if num.is_empty() {
            return Err(anyhow!("invalid duration {:?}: missing number", s));
        }
        let n: u64 = num.parse()?;
        num.clear();

        let unit: u128 = match c {
            'n' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            'u' if chars.peek() == Some(&'s') => {
                chars.next();
                1_000
            }
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1_000_000
            }
            's' => NANOS_PER_SEC,
            'm' => 60 * NANOS_PER_SEC,
            'h' => 60 * 60 * NANOS_PER_SEC,
            'd' => 24 * 60 * 60 * NANOS_PER_SEC,
            'w' => 7 * 24 * 60 * 60 * NANOS_PER_SEC,
            _ => return Err(anyhow!("invalid duration {:?}: unknown unit {:?}", s, c)),
        };
        total = unit
            .checked_mul(n as u128)
            .and_then(|d| total.checked_add(d))
            .ok_or_else(|| anyhow!("invalid duration {:?}: out of range", s))?;
    }

    if !num.is_empty() {
        return Err(anyhow!("invalid duration {:?}: missing unit", s));
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| anyhow!("invalid duration {:?}: out of range", s))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::time::{format_unix_nano, parse_duration};

    #[test]
    fn test_format_unix_nano() {
        assert_eq!(format_unix_nano(0), "1970-01-01 00:00:00");
        assert_eq!(format_unix_nano(1_500_000_000_000_000_000), "2017-07-14 02:40:00");
        assert_eq!(format_unix_nano(-1), "1969-12-31 23:59:59");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("168h").unwrap(), Duration::from_secs(168 * 3600));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(7 * 86400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(7 * 86400));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("h").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
    }

    #[test]
    fn test_parse_duration_large() {
        assert_eq!(
            parse_duration("4294967297s").unwrap(),
            Duration::from_secs(4_294_967_297)
        );
        assert_eq!(
            parse_duration("4294967297").unwrap(),
            Duration::from_secs(4_294_967_297)
        );
        assert!(parse_duration("99999999999999999999h").is_err());
        assert!(parse_duration("18446744073709551615w").is_err());
    }
}
