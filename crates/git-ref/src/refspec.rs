//! Refspecs: `[+]<source>[:<target>]`, mapping refs on one side of a
//! fetch or push to refs on the other.

use std::collections::BTreeMap;
use std::fmt;

use crate::HEADS_DIR;

/// Where each target ref comes from, and whether the update is forced.
pub type RefMappings = BTreeMap<String, (String, bool)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec {
    pub source: String,
    pub target: String,
    pub forced: bool,
}

impl Refspec {
    pub fn new(source: impl Into<String>, target: impl Into<String>, forced: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            forced,
        }
    }

    /// Parse a refspec. Short names are taken as branches, and a missing
    /// target means the same name as the source.
    pub fn parse(spec: &str) -> Option<Self> {
        let (forced, spec) = match spec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let (source, target) = match spec.split_once(':') {
            Some((source, target)) if !target.contains(':') => (source, Some(target)),
            Some(_) => return None,
            None => (spec, None),
        };
        let source = long_name(source);
        let target = target.map_or_else(|| source.clone(), long_name);
        Some(Self::new(source, target, forced))
    }

    /// Map each of `refs` through every spec. Later specs win for the same
    /// target.
    pub fn expand<S: AsRef<str>, R: AsRef<str>>(specs: &[S], refs: &[R]) -> RefMappings {
        let mut mappings = RefMappings::new();
        for spec in specs.iter().filter_map(|spec| Self::parse(spec.as_ref())) {
            mappings.extend(spec.match_refs(refs));
        }
        mappings
    }

    /// The source-side name that `target` would be fetched from.
    pub fn invert<S: AsRef<str>>(specs: &[S], target: &str) -> Option<String> {
        let mut mappings = RefMappings::new();
        for spec in specs.iter().filter_map(|spec| Self::parse(spec.as_ref())) {
            let inverted = Self::new(spec.target, spec.source, spec.forced);
            mappings.extend(inverted.match_refs(&[target]));
        }
        mappings.into_keys().next()
    }

    /// Targets for each matching ref. A spec without `*` maps its single
    /// source whether or not it appears in `refs`.
    pub fn match_refs<R: AsRef<str>>(&self, refs: &[R]) -> RefMappings {
        let mut mappings = RefMappings::new();
        let Some((prefix, suffix)) = self.source.split_once('*') else {
            mappings.insert(self.target.clone(), (self.source.clone(), self.forced));
            return mappings;
        };

        for name in refs.iter().map(AsRef::as_ref) {
            let matched = name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix));
            if let Some(matched) = matched {
                let target = self.target.replacen('*', matched, 1);
                mappings.insert(target, (name.to_owned(), self.forced));
            }
        }
        mappings
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.forced {
            f.write_str("+")?;
        }
        write!(f, "{}:{}", self.source, self.target)
    }
}

fn long_name(name: &str) -> String {
    if name.starts_with("refs/") || name.is_empty() {
        name.to_owned()
    } else {
        format!("{HEADS_DIR}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fills_in_long_names() {
        let spec = Refspec::parse("+main:topic").unwrap();
        assert_eq!(spec, Refspec::new("refs/heads/main", "refs/heads/topic", true));
        assert_eq!(spec.to_string(), "+refs/heads/main:refs/heads/topic");

        let spec = Refspec::parse("refs/tags/v1").unwrap();
        assert_eq!(spec.target, "refs/tags/v1");
        assert!(!spec.forced);
    }

    #[test]
    fn expand_globs() {
        let refs = ["refs/heads/main", "refs/heads/maint", "refs/remotes/x/main"];
        let mappings = Refspec::expand(&["+refs/heads/*:refs/remotes/origin/*"], &refs);
        assert_eq!(mappings.len(), 2);
        assert_eq!(
            mappings["refs/remotes/origin/maint"],
            ("refs/heads/maint".to_owned(), true)
        );
    }

    #[test]
    fn expand_without_glob_maps_the_source() {
        let mappings = Refspec::expand(&["main:refs/remotes/origin/main"], &[] as &[&str]);
        assert_eq!(
            mappings["refs/remotes/origin/main"],
            ("refs/heads/main".to_owned(), false)
        );
    }

    #[test]
    fn invert_finds_the_remote_ref() {
        let specs = ["+refs/heads/*:refs/remotes/origin/*"];
        assert_eq!(
            Refspec::invert(&specs, "refs/remotes/origin/topic").as_deref(),
            Some("refs/heads/topic")
        );
        assert_eq!(Refspec::invert(&specs, "refs/tags/v1"), None);
    }
}
