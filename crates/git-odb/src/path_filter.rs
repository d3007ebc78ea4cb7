use std::collections::BTreeMap;
use std::sync::Arc;

use bstr::{BStr, BString, ByteSlice};

#[derive(Debug, Clone, Default)]
struct Trie {
    matched: bool,
    children: BTreeMap<BString, Arc<Trie>>,
}

impl Trie {
    fn from_paths<P: AsRef<[u8]>>(paths: &[P]) -> Self {
        let mut root = Trie {
            matched: paths.is_empty(),
            children: BTreeMap::new(),
        };
        for path in paths {
            let mut node = &mut root;
            for name in path.as_ref().split_str("/").filter(|n| !n.is_empty()) {
                let child = node.children.entry(BString::from(name)).or_default();
                node = Arc::make_mut(child);
            }
            node.matched = true;
        }
        root
    }
}

/// Restricts tree walks to a set of path prefixes.
///
/// A filter is a cursor into a trie of path components. Joining a name
/// moves the cursor down. Once a listed path is reached everything below
/// it matches.
#[derive(Debug, Clone)]
pub struct PathFilter {
    routes: Arc<Trie>,
    path: BString,
}

impl Default for PathFilter {
    /// Matches everything.
    fn default() -> Self {
        Self {
            routes: Arc::new(Trie {
                matched: true,
                children: BTreeMap::new(),
            }),
            path: BString::default(),
        }
    }
}

impl PathFilter {
    /// A filter for `/`-separated paths. No paths matches everything.
    pub fn build<P: AsRef<[u8]>>(paths: &[P]) -> Self {
        Self {
            routes: Arc::new(Trie::from_paths(paths)),
            path: BString::default(),
        }
    }

    /// Path of the tree this filter currently sits at.
    pub fn path(&self) -> &BStr {
        self.path.as_bstr()
    }

    /// Whether entry `name` at this level should be visited.
    pub fn matches(&self, name: &[u8]) -> bool {
        self.routes.matched || self.routes.children.contains_key(name.as_bstr())
    }

    /// Descend into `name`.
    pub fn join(&self, name: &[u8]) -> Self {
        let routes = if self.routes.matched {
            Arc::clone(&self.routes)
        } else {
            self.routes
                .children
                .get(name.as_bstr())
                .cloned()
                .unwrap_or_default()
        };
        Self {
            routes,
            path: join_path(&self.path, name),
        }
    }
}

/// `dir/name`, or `name` at the root.
pub fn join_path(dir: &[u8], name: &[u8]) -> BString {
    if dir.is_empty() {
        return BString::from(name);
    }
    let mut path = BString::from(dir);
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = PathFilter::build::<&str>(&[]);
        assert!(filter.matches(b"anything"));
        assert!(filter.join(b"a").join(b"b").matches(b"c"));
        assert_eq!(filter.join(b"a").join(b"b").path(), "a/b");
    }

    #[test]
    fn filter_follows_listed_prefixes() {
        let filter = PathFilter::build(&["src/lib", "README"]);
        assert!(filter.matches(b"src"));
        assert!(filter.matches(b"README"));
        assert!(!filter.matches(b"docs"));

        let src = filter.join(b"src");
        assert!(src.matches(b"lib"));
        assert!(!src.matches(b"bin"));
        assert!(src.join(b"lib").matches(b"anything.rs"));
    }
}
