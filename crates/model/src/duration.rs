use crate::error::{ModelError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_MIN: u64 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u64 = 60 * NANOS_PER_MIN;
const NANOS_PER_DAY: u64 = 24 * NANOS_PER_HOUR;

/// Largest-first units used when rendering the canonical form.
const CANONICAL_UNITS: [(u64, &str); 6] = [
    (NANOS_PER_HOUR, "h"),
    (NANOS_PER_MIN, "m"),
    (NANOS_PER_SEC, "s"),
    (NANOS_PER_MILLI, "ms"),
    (NANOS_PER_MICRO, "us"),
    (1, "ns"),
];

/// A duration resolved to nanoseconds.
///
/// Serialized as a canonical string (`"1h30m"`, `"1s500ms"`, `"0s"`), so two
/// spellings of the same span (`"90s"`, `"1m30s"`, `"1.5m"`) store identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DurationValue(u64);

impl DurationValue {
    pub const ZERO: DurationValue = DurationValue(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(NANOS_PER_MILLI))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SEC))
    }

    pub fn from_mins(mins: u64) -> Self {
        Self(mins.saturating_mul(NANOS_PER_MIN))
    }

    pub fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(NANOS_PER_HOUR))
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Parse Go (`time.ParseDuration`) and TiKV (`ReadableDuration`) spellings.
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(ModelError::InvalidDuration(input.to_string()));
        }
        if raw == "0" {
            return Ok(Self::ZERO);
        }

        let invalid = || ModelError::InvalidDuration(input.to_string());
        let mut total: u128 = 0;
        let mut rest = raw;
        while !rest.is_empty() {
            let number_len = rest
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(invalid)?;
            if number_len == 0 {
                return Err(invalid());
            }
            let (number, tail) = rest.split_at(number_len);
            let unit_len = tail
                .find(|c: char| c.is_ascii_digit() || c == '.')
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_len);
            let scale = unit_scale(unit).ok_or_else(invalid)?;
            total = total
                .checked_add(scaled(number, scale).ok_or_else(invalid)?)
                .ok_or_else(invalid)?;
            rest = tail;
        }

        u64::try_from(total).map(Self).map_err(|_| invalid())
    }
}

fn unit_scale(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        "d" => Some(NANOS_PER_DAY),
        _ => None,
    }
}

/// `number * scale` with a decimal fraction, truncated to whole nanoseconds.
fn scaled(number: &str, scale: u64) -> Option<u128> {
    let (whole, frac) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut value = whole.checked_mul(scale as u128)?;
    if !frac.is_empty() {
        if frac.contains('.') {
            return None;
        }
        // Keep at most 18 digits; anything finer is below a nanosecond for every unit.
        let digits = &frac[..frac.len().min(18)];
        let numerator: u128 = digits.parse().ok()?;
        let denominator = 10u128.pow(digits.len() as u32);
        value = value.checked_add(numerator * scale as u128 / denominator)?;
    }
    Some(value)
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0s");
        }
        let mut remaining = self.0;
        for (scale, unit) in CANONICAL_UNITS {
            let count = remaining / scale;
            if count > 0 {
                write!(f, "{count}{unit}")?;
                remaining -= count * scale;
            }
        }
        Ok(())
    }
}

impl FromStr for DurationValue {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<std::time::Duration> for DurationValue {
    fn from(d: std::time::Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<DurationValue> for std::time::Duration {
    fn from(d: DurationValue) -> Self {
        std::time::Duration::from_nanos(d.0)
    }
}

impl Serialize for DurationValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DurationValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DurationValue::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_go_and_tikv_spellings() {
        assert_eq!(DurationValue::parse("1h").unwrap(), DurationValue::from_hours(1));
        assert_eq!(
            DurationValue::parse("10m0s").unwrap(),
            DurationValue::from_mins(10)
        );
        assert_eq!(
            DurationValue::parse("1.5s").unwrap(),
            DurationValue::from_millis(1500)
        );
        assert_eq!(
            DurationValue::parse("1h30m").unwrap(),
            DurationValue::from_mins(90)
        );
        assert_eq!(
            DurationValue::parse("2d").unwrap(),
            DurationValue::from_hours(48)
        );
        assert_eq!(
            DurationValue::parse("300µs").unwrap(),
            DurationValue::from_nanos(300_000)
        );
        assert_eq!(DurationValue::parse("0").unwrap(), DurationValue::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "s", "10", "1.2.3s", "5 parsecs", "-1s", "1x"] {
            assert!(DurationValue::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn renders_canonical_form() {
        assert_eq!(DurationValue::from_secs(90).to_string(), "1m30s");
        assert_eq!(DurationValue::from_millis(250).to_string(), "250ms");
        assert_eq!(DurationValue::from_millis(1500).to_string(), "1s500ms");
        assert_eq!(DurationValue::ZERO.to_string(), "0s");
        assert_eq!(DurationValue::from_hours(36).to_string(), "36h");
    }

    #[test]
    fn serde_uses_canonical_string() {
        let d = DurationValue::parse("90s").unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, "\"1m30s\"");
        let back: DurationValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
