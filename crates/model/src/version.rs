use crate::error::{ModelError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Release tag such as `v7.1.0` or `v8.5.0-rc.1`
/// Equality and hashing follow the ordering, so `rc.01` and `rc.1` are one version.
#[derive(Debug, Clone)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || ModelError::InvalidVersion(input.to_string());
        let raw = input.trim();
        let raw = raw.strip_prefix('v').or_else(|| raw.strip_prefix('V')).unwrap_or(raw);
        // Build metadata does not participate in ordering.
        let raw = raw.split_once('+').map_or(raw, |(core, _)| core);
        let (core, pre) = match raw.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid()),
            None => (raw, None),
        };

        let mut parts = core.split('.');
        let mut next = || -> Result<u64> {
            parts
                .next()
                .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Release-line group directory, e.g. `v7.1` for `v7.1.3`.
    pub fn release_line(&self) -> String {
        format!("v{}.{}", self.major, self.minor)
    }

    /// Whether this version belongs to a release line spelled `v7.1` / `7.1`.
    pub fn in_release_line(&self, line: &str) -> bool {
        let line = line.trim();
        let line = line.strip_prefix('v').unwrap_or(line);
        line == format!("{}.{}", self.major, self.minor)
    }

    /// Tag spelling used by the upstream repositories.
    pub fn tag(&self) -> String {
        self.to_string()
    }
}

fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor, self.patch).hash(state);
        if let Some(pre) = &self.pre {
            for ident in pre.split('.') {
                match ident.parse::<u64>() {
                    Ok(n) => n.hash(state),
                    Err(_) => ident.hash(state),
                }
            }
        }
        self.pre.is_some().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parses_common_tag_shapes() {
        assert_eq!(v("v7.1.0"), Version::new(7, 1, 0));
        assert_eq!(v("7.1.0"), Version::new(7, 1, 0));
        assert_eq!(v("v7.5.0-alpha").pre.as_deref(), Some("alpha"));
        assert_eq!(v("v8.5.0-rc.1").pre.as_deref(), Some("rc.1"));
        assert!(Version::parse("v7.1").is_err());
        assert!(Version::parse("v7.1.0.1").is_err());
        assert!(Version::parse("release-7.1").is_err());
        assert!(Version::parse("v7.1.0-").is_err());
    }

    #[test]
    fn prerelease_sorts_before_release() {
        assert!(v("v7.5.0-alpha") < v("v7.5.0"));
        assert!(v("v8.5.0-rc.1") < v("v8.5.0-rc.2"));
        assert!(v("v8.5.0-rc.2") < v("v8.5.0-rc.10"));
        assert!(v("v8.5.0-alpha") < v("v8.5.0-rc.1"));
        assert!(v("v6.5.12") > v("v6.5.9"));
        assert!(v("v7.1.0") > v("v6.5.12"));
    }

    #[test]
    fn numerically_equal_prereleases_are_one_version() {
        use std::collections::{BTreeSet, HashSet};
        assert_eq!(v("v8.5.0-rc.01"), v("v8.5.0-rc.1"));
        assert_eq!(v("v8.5.0-rc.01").cmp(&v("v8.5.0-rc.1")), Ordering::Equal);
        let sorted: BTreeSet<_> = [v("v8.5.0-rc.01"), v("v8.5.0-rc.1")].into_iter().collect();
        let hashed: HashSet<_> = [v("v8.5.0-rc.01"), v("v8.5.0-rc.1")].into_iter().collect();
        assert_eq!(sorted.len(), 1);
        assert_eq!(hashed.len(), 1);
        assert_ne!(v("v8.5.0-rc.1"), v("v8.5.0-rc.2"));
        assert_ne!(v("v8.5.0-rc.1"), v("v8.5.0"));
    }

    #[test]
    fn release_line_groups_by_minor() {
        assert_eq!(v("v7.1.3").release_line(), "v7.1");
        assert!(v("v7.1.3").in_release_line("7.1"));
        assert!(!v("v7.1.3").in_release_line("v7.5"));
    }

    #[test]
    fn display_round_trips() {
        for tag in ["v6.5.0", "v8.5.0-rc.1", "v7.5.0-alpha"] {
            assert_eq!(v(tag).to_string(), tag);
        }
    }

    proptest! {
        #[test]
        fn ordering_matches_numeric_tuple(a in (0u64..20, 0u64..20, 0u64..20), b in (0u64..20, 0u64..20, 0u64..20)) {
            let va = Version::new(a.0, a.1, a.2);
            let vb = Version::new(b.0, b.1, b.2);
            prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
        }
    }
}
