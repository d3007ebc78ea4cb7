//! Git config files: parsing, typed lookup, in-place editing and the
//! system/global/local stack.

pub mod error;
pub mod file;
pub mod parse;
pub mod stack;
pub mod types;

pub use error::ConfigError;
pub use file::ConfigFile;
pub use stack::ConfigStack;
pub use types::Value;

/// Configuration file scope (priority order, low to high).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigScope {
    /// System-wide: /etc/gitconfig
    System,
    /// User-global: ~/.gitconfig
    Global,
    /// Repository-local: .git/config
    Local,
}

/// Normalized section identity: lowercased name, case-preserved subsection
/// (empty when absent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SectionId {
    pub name: String,
    pub subsection: String,
}

impl SectionId {
    pub fn new(name: &str, subsection: Option<&str>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            subsection: subsection.unwrap_or_default().to_owned(),
        }
    }

    /// Parse `section` or `section.subsection`.
    pub fn parse(key: &str) -> Self {
        match key.split_once('.') {
            Some((name, sub)) => Self::new(name, Some(sub)),
            None => Self::new(key, None),
        }
    }
}

/// A configuration key as the caller spelled it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub section: String,
    pub subsection: Option<String>,
    pub name: String,
}

impl ConfigKey {
    /// Parse from "section.name" or "section.subsection.name".
    ///
    /// The section is everything before the first dot and the name
    /// everything after the last, so subsections may contain dots.
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidKey(key.to_owned());

        let (section, rest) = key.split_once('.').ok_or_else(invalid)?;
        let (subsection, name) = match rest.rsplit_once('.') {
            Some((sub, name)) => (Some(sub.to_owned()), name),
            None => (None, rest),
        };

        let valid_section =
            !section.is_empty() && section.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        let valid_name = name.bytes().next().is_some_and(|b| b.is_ascii_alphabetic())
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        if !valid_section || !valid_name {
            return Err(invalid());
        }

        Ok(ConfigKey {
            section: section.to_owned(),
            subsection,
            name: name.to_owned(),
        })
    }

    pub fn section_id(&self) -> SectionId {
        SectionId::new(&self.section, self.subsection.as_deref())
    }

    pub fn normal_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// `[section]` or `[section "subsection"]`, with a newline.
    pub fn heading_line(&self) -> String {
        match &self.subsection {
            Some(sub) => format!("[{} \"{}\"]\n", self.section, sub),
            None => format!("[{}]\n", self.section),
        }
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subsection {
            Some(sub) => write!(f, "{}.{}.{}", self.section, sub, self.name),
            None => write!(f, "{}.{}", self.section, self.name),
        }
    }
}
