use crate::error::{BuildError, Result};
use precheck_model::Version;
use std::collections::BTreeMap;

/// Which versions a generation run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelection {
    /// One tag, pre-releases allowed.
    Single(Version),
    /// Every release tag in `from..=to`.
    Range { from: Version, to: Version },
    /// Every release tag of the given release lines, or of all lines when empty.
    Auto { release_lines: Vec<String> },
}

/// Inclusive start/stop bounds applied to range and auto selections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionBounds {
    pub start: Option<Version>,
    pub stop: Option<Version>,
}

impl VersionBounds {
    pub fn contains(&self, version: &Version) -> bool {
        self.start.as_ref().map_or(true, |s| version >= s)
            && self.stop.as_ref().map_or(true, |s| version <= s)
    }
}

/// Parse tag names into versions, keeping the original spelling for checkout.
///
/// Unparseable tags are ignored; when two tags parse to the same version the
/// first one listed wins.
pub fn parse_tags(tags: &[String]) -> BTreeMap<Version, String> {
    let mut out = BTreeMap::new();
    for tag in tags {
        if let Ok(version) = Version::parse(tag) {
            out.entry(version).or_insert_with(|| tag.clone());
        }
    }
    out
}

/// Resolve a selection against the available versions, sorted ascending.
pub fn resolve_targets<'a>(
    available: impl IntoIterator<Item = &'a Version>,
    selection: &VersionSelection,
    bounds: &VersionBounds,
) -> Result<Vec<Version>> {
    let mut out: Vec<Version> = match selection {
        VersionSelection::Single(version) => return Ok(vec![version.clone()]),
        VersionSelection::Range { from, to } => {
            if from > to {
                return Err(BuildError::Config(format!("empty range {from}..{to}")));
            }
            available
                .into_iter()
                .filter(|v| !v.is_prerelease() && *v >= from && *v <= to)
                .filter(|v| bounds.contains(v))
                .cloned()
                .collect()
        }
        VersionSelection::Auto { release_lines } => available
            .into_iter()
            .filter(|v| !v.is_prerelease())
            .filter(|v| release_lines.is_empty() || release_lines.iter().any(|line| v.in_release_line(line)))
            .filter(|v| bounds.contains(v))
            .cloned()
            .collect(),
    };
    out.sort();
    out.dedup();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn available() -> Vec<Version> {
        parse_tags(
            &[
                "v6.5.0", "v6.5.1", "v7.1.0", "v7.1.1", "v7.5.0-alpha", "v7.5.0", "v8.1.0",
                "not-a-tag", "v7.1.0-rc.2",
            ]
            .map(String::from),
        )
        .into_keys()
        .collect()
    }

    #[test]
    fn auto_discovery_by_release_line_and_bounds() {
        let selection = VersionSelection::Auto {
            release_lines: vec!["v6.5".into(), "v7.1".into(), "7.5".into()],
        };
        let bounds = VersionBounds {
            start: Some(v("v6.5.1")),
            stop: Some(v("v7.5.0")),
        };
        let targets = resolve_targets(&available(), &selection, &bounds).unwrap();
        assert_eq!(targets, vec![v("v6.5.1"), v("v7.1.0"), v("v7.1.1"), v("v7.5.0")]);
    }

    #[test]
    fn range_is_inclusive_and_skips_prereleases() {
        let selection = VersionSelection::Range {
            from: v("v7.1.0"),
            to: v("v7.5.0"),
        };
        let targets = resolve_targets(&available(), &selection, &VersionBounds::default()).unwrap();
        assert_eq!(targets, vec![v("v7.1.0"), v("v7.1.1"), v("v7.5.0")]);

        let backwards = VersionSelection::Range {
            from: v("v7.5.0"),
            to: v("v7.1.0"),
        };
        assert!(resolve_targets(&available(), &backwards, &VersionBounds::default()).is_err());
    }

    #[test]
    fn single_version_is_taken_as_given() {
        let selection = VersionSelection::Single(v("v7.5.0-alpha"));
        let targets = resolve_targets(&available(), &selection, &VersionBounds::default()).unwrap();
        assert_eq!(targets, vec![v("v7.5.0-alpha")]);
    }

    #[test]
    fn tag_spelling_is_kept() {
        let tags = parse_tags(&["7.1.0".to_string(), "v7.1.0".to_string()]);
        assert_eq!(tags[&v("v7.1.0")], "7.1.0");
    }
}
