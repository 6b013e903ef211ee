const MAX_GENERATE_CONCURRENCY: usize = 32;

pub const GENERATE_CONCURRENCY_ENV: &str = "UPGRADE_PRECHECK_GENERATE_CONCURRENCY";

fn total_memory_gib_linux_best_effort() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        let line = line.trim_start();
        if !line.starts_with("MemTotal:") {
            continue;
        }
        let kb = line
            .split_whitespace()
            .nth(1)
            .and_then(|v| v.parse::<u64>().ok())?;
        return Some(kb / 1024 / 1024);
    }
    None
}

/// Each worker holds a full checkout and its parse trees, so memory caps the default too.
pub fn default_generate_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let cpu_default = (cpus / 2).clamp(1, 8);

    let Some(mem_gib) = total_memory_gib_linux_best_effort() else {
        return cpu_default;
    };
    let mem_default = (mem_gib / 4).clamp(1, 8) as usize;

    cpu_default.min(mem_default).max(1)
}

fn parse_generate_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_GENERATE_CONCURRENCY)
}

/// Worker count: the explicit value, else the environment, else a machine-derived default.
pub fn resolve_generate_concurrency(explicit: Option<usize>) -> usize {
    if let Some(n) = explicit {
        return n.clamp(1, MAX_GENERATE_CONCURRENCY);
    }
    let raw = std::env::var(GENERATE_CONCURRENCY_ENV).ok();
    parse_generate_concurrency(raw.as_deref(), default_generate_concurrency())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_generate_concurrency_defaults_and_clamps() {
        let default_value = default_generate_concurrency();
        assert_eq!(parse_generate_concurrency(None, default_value), default_value);
        assert_eq!(
            parse_generate_concurrency(Some(""), default_value),
            default_value
        );
        assert_eq!(
            parse_generate_concurrency(Some("   "), default_value),
            default_value
        );
        assert_eq!(parse_generate_concurrency(Some("2"), default_value), 2);
        assert_eq!(parse_generate_concurrency(Some("0"), default_value), 1);
        assert_eq!(
            parse_generate_concurrency(Some("999"), default_value),
            MAX_GENERATE_CONCURRENCY
        );
        assert_eq!(
            parse_generate_concurrency(Some("abc"), default_value),
            default_value
        );
        assert_eq!(parse_generate_concurrency(Some(" 5 "), default_value), 5);
    }

    #[test]
    fn explicit_value_wins_and_is_clamped() {
        assert_eq!(resolve_generate_concurrency(Some(3)), 3);
        assert_eq!(resolve_generate_concurrency(Some(0)), 1);
        assert_eq!(resolve_generate_concurrency(Some(100)), MAX_GENERATE_CONCURRENCY);
    }
}
