use precheck_model::{DurationValue, Value};

const KIB: u64 = 1024;
const SIZE_UNITS: [(u64, &str); 5] = [
    (KIB * KIB * KIB * KIB * KIB, "PiB"),
    (KIB * KIB * KIB * KIB, "TiB"),
    (KIB * KIB * KIB, "GiB"),
    (KIB * KIB, "MiB"),
    (KIB, "KiB"),
];

/// A constant folded out of source code.
#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    /// Nanoseconds.
    Duration(i128),
    List(Vec<Lit>),
}

impl Lit {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Lit::Int(i) => Some(*i),
            Lit::Duration(d) => Some(*d),
            Lit::Float(f) if f.fract() == 0.0 => Some(*f as i128),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Lit::Int(i) => Some(*i as f64),
            Lit::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Textual form, as a system variable stores it.
    pub fn text(&self) -> String {
        match self {
            Lit::Int(i) => i.to_string(),
            Lit::Float(f) => f.to_string(),
            Lit::Bool(b) => if *b { "ON" } else { "OFF" }.to_string(),
            Lit::Str(s) => s.clone(),
            Lit::Duration(d) => u64::try_from(*d)
                .map(|n| DurationValue::from_nanos(n).to_string())
                .unwrap_or_else(|_| d.to_string()),
            Lit::List(items) => items.iter().map(Lit::text).collect::<Vec<_>>().join(","),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Lit::Int(i) => Some(i64::try_from(i).map_or(Value::Float(i as f64), Value::Int)),
            Lit::Float(f) => Some(Value::Float(f)),
            Lit::Bool(b) => Some(Value::Bool(b)),
            Lit::Str(s) => Some(Value::String(s)),
            Lit::Duration(d) => u64::try_from(d)
                .ok()
                .map(|n| Value::Duration(DurationValue::from_nanos(n))),
            Lit::List(items) => Some(Value::StringList(items.iter().map(Lit::text).collect())),
        }
    }

    pub fn negate(self) -> Option<Lit> {
        match self {
            Lit::Int(i) => Some(Lit::Int(-i)),
            Lit::Float(f) => Some(Lit::Float(-f)),
            Lit::Duration(d) => Some(Lit::Duration(-d)),
            _ => None,
        }
    }

    pub fn not(self) -> Option<Lit> {
        match self {
            Lit::Bool(b) => Some(Lit::Bool(!b)),
            _ => None,
        }
    }

    /// Fold a binary operator the way Go and Rust constant arithmetic would.
    pub fn binary(op: &str, left: Lit, right: Lit) -> Option<Lit> {
        use Lit::*;
        match (left, right) {
            (Int(a), Int(b)) => int_op(op, a, b).map(Int),
            (Duration(a), Int(b)) | (Int(b), Duration(a)) if op == "*" => {
                a.checked_mul(b).map(Duration)
            }
            (Duration(a), Int(b)) if op == "/" && b != 0 => Some(Duration(a / b)),
            (Duration(a), Duration(b)) => match op {
                "+" => a.checked_add(b).map(Duration),
                "-" => a.checked_sub(b).map(Duration),
                "/" if b != 0 => Some(Int(a / b)),
                _ => None,
            },
            (Float(a), Duration(b)) | (Duration(b), Float(a)) if op == "*" => {
                Some(Duration((a * b as f64) as i128))
            }
            (Str(a), Str(b)) if op == "+" => Some(Str(a + &b)),
            (l, r) => {
                let (a, b) = (l.as_float()?, r.as_float()?);
                match op {
                    "+" => Some(Float(a + b)),
                    "-" => Some(Float(a - b)),
                    "*" => Some(Float(a * b)),
                    "/" if b != 0.0 => Some(Float(a / b)),
                    _ => None,
                }
            }
        }
    }
}

fn int_op(op: &str, a: i128, b: i128) -> Option<i128> {
    match op {
        "+" => a.checked_add(b),
        "-" => a.checked_sub(b),
        "*" => a.checked_mul(b),
        "/" if b != 0 => Some(a / b),
        "%" if b != 0 => Some(a % b),
        "<<" => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)),
        ">>" => u32::try_from(b).ok().and_then(|s| a.checked_shr(s)),
        "|" => Some(a | b),
        "&" => Some(a & b),
        "^" => Some(a ^ b),
        _ => None,
    }
}

/// Render a byte count the way TiKV's `ReadableSize` serializes it.
pub fn format_readable_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0KiB".to_string();
    }
    for (unit, suffix) in SIZE_UNITS {
        if bytes % unit == 0 {
            return format!("{}{suffix}", bytes / unit);
        }
    }
    format!("{bytes}B")
}

/// `TiDBOptRangeMaxSize` -> `tidb_opt_range_max_size`.
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// `snake_case` or `CamelCase` -> `kebab-case`.
pub fn kebab_case(name: &str) -> String {
    camel_to_snake(name).replace('_', "-")
}

/// Decode the body of a double-quoted literal; unknown escapes are kept verbatim.
pub fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('`').and_then(|r| r.strip_suffix('`')) {
        return inner.to_string();
    }
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Parse an integer literal with `_` separators, radix prefixes and type suffixes.
pub fn parse_int_literal(raw: &str) -> Option<i128> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let cleaned = strip_numeric_suffix(&cleaned);
    let lower = cleaned.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        return i128::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return i128::from_str_radix(bin, 2).ok();
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return i128::from_str_radix(oct, 8).ok();
    }
    if lower.len() > 1 && lower.starts_with('0') && lower.bytes().all(|b| b.is_ascii_digit()) {
        return i128::from_str_radix(&lower[1..], 8).ok();
    }
    lower.parse().ok()
}

pub fn parse_float_literal(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();
    let cleaned = cleaned
        .strip_suffix("f64")
        .or_else(|| cleaned.strip_suffix("f32"))
        .unwrap_or(&cleaned);
    cleaned.parse().ok()
}

fn strip_numeric_suffix(raw: &str) -> &str {
    const SUFFIXES: [&str; 12] = [
        "usize", "isize", "u128", "i128", "u64", "i64", "u32", "i32", "u16", "i16", "u8", "i8",
    ];
    SUFFIXES
        .iter()
        .find_map(|suffix| raw.strip_suffix(suffix))
        .unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_size_picks_largest_exact_unit() {
        assert_eq!(format_readable_size(64 * 1024 * 1024), "64MiB");
        assert_eq!(format_readable_size(1024 * 1024 * 1024), "1GiB");
        assert_eq!(format_readable_size(1536), "1536B");
        assert_eq!(format_readable_size(0), "0KiB");
        assert_eq!(format_readable_size(100), "100B");
    }

    #[test]
    fn case_conversions() {
        assert_eq!(camel_to_snake("TiDBOptRangeMaxSize"), "ti_db_opt_range_max_size");
        assert_eq!(camel_to_snake("EnableAsyncCommit"), "enable_async_commit");
        assert_eq!(kebab_case("region_split_size"), "region-split-size");
        assert_eq!(kebab_case("Lz4"), "lz4");
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(parse_int_literal("1_024u64"), Some(1024));
        assert_eq!(parse_int_literal("0x10"), Some(16));
        assert_eq!(parse_int_literal("0755"), Some(0o755));
        assert_eq!(parse_int_literal("0"), Some(0));
        assert_eq!(parse_float_literal("0.8f64"), Some(0.8));
    }

    #[test]
    fn constant_folding() {
        let d = Lit::binary("*", Lit::Int(30), Lit::Duration(60_000_000_000)).unwrap();
        assert_eq!(d, Lit::Duration(1_800_000_000_000));
        assert_eq!(Lit::binary("<<", Lit::Int(4), Lit::Int(30)), Some(Lit::Int(4 << 30)));
        assert_eq!(
            Lit::binary("*", Lit::Float(0.5), Lit::Int(4)),
            Some(Lit::Float(2.0))
        );
        assert_eq!(Lit::binary("+", Lit::Str("a".into()), Lit::Str("b".into())), Some(Lit::Str("ab".into())));
    }
}
