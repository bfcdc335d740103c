//! Duration literals: `250ms`, `1.5s`, `2h`.

use std::time::Duration;

/// Recognized unit suffixes, in the order the scanner tries them.
pub const UNIT_SUFFIXES: [&str; 7] = ["ns", "us", "µs", "ms", "s", "m", "h"];

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

fn unit_scale(unit: &str) -> Option<u128> {
    let scale = match unit {
        "ns" => 1,
        "us" | "µs" => NANOS_PER_MICRO,
        "ms" => NANOS_PER_MILLI,
        "s" => NANOS_PER_SECOND,
        "m" => NANOS_PER_MINUTE,
        "h" => NANOS_PER_HOUR,
        _ => return None,
    };
    Some(scale)
}

/// Parses a decimal magnitude followed by a unit, e.g. `("1.5", "ms")`.
///
/// Exponents and signs are rejected, and the result must fit in a signed
/// 64-bit nanosecond count.
pub fn parse(number: &str, unit: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid duration {number:?}{unit}");
    let scale = unit_scale(unit).ok_or_else(|| format!("unknown unit {unit:?} in duration"))?;
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|ch| ch.is_ascii_digit())
        || !fraction.chars().all(|ch| ch.is_ascii_digit())
    {
        return Err(invalid());
    }

    let mut nanos: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| invalid())?
    };
    nanos = nanos.checked_mul(scale).ok_or_else(invalid)?;

    let mut place = scale;
    for digit in fraction.bytes() {
        place /= 10;
        if place == 0 {
            break;
        }
        nanos += u128::from(digit - b'0') * place;
    }

    if nanos > i64::MAX as u128 {
        return Err(format!("duration {number}{unit} overflows"));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

/// Formats a duration the way operators usually write them: `1h2m3.5s`,
/// `250ms`, `0s`.
pub fn format(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{nanos}ns");
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}µs", decimal(nanos, NANOS_PER_MICRO));
    }
    if nanos < NANOS_PER_SECOND {
        return format!("{}ms", decimal(nanos, NANOS_PER_MILLI));
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MINUTE;
    let seconds = nanos % NANOS_PER_MINUTE;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    out.push_str(&decimal(seconds, NANOS_PER_SECOND));
    out.push('s');
    out
}

fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let width = unit.ilog10() as usize;
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fractional_units() {
        assert_eq!(parse("1.5", "s"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse("250", "ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse("3", "µs"), Ok(Duration::from_micros(3)));
        assert_eq!(parse("2", "h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn rejects_exponents_and_overflow() {
        assert!(parse("1e3", "ms").is_err());
        assert!(parse("99999999999", "h").is_err());
        assert!(parse(".", "s").is_err());
    }

    #[test]
    fn formats_compound_durations() {
        assert_eq!(format(Duration::ZERO), "0s");
        assert_eq!(format(Duration::from_nanos(12)), "12ns");
        assert_eq!(format(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format(Duration::from_secs(3723)), "1h2m3s");
        assert_eq!(format(Duration::from_millis(90_500)), "1m30.5s");
    }
}
