//! Single config file representation with formatting preservation.

use std::io::Write;
use std::path::{Path, PathBuf};

use git_utils::lockfile::LockFile;

use crate::error::ConfigError;
use crate::parse::{self, Line, Variable};
use crate::types::Value;
use crate::{ConfigKey, SectionId};

/// A config file, loaded lazily, edited in memory and saved through its
/// lock file.
pub struct ConfigFile {
    path: PathBuf,
    lock: Option<LockFile>,
    /// Lines in file order; `None` until loaded.
    lines: Option<Vec<Line>>,
}

impl ConfigFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: None,
            lines: None,
        }
    }

    /// Parse from memory; the result is not tied to a file on disk.
    pub fn parse(content: &str, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut file = Self::new(path);
        let filename = file.path.display().to_string();
        file.lines = Some(parse::parse_config(content, &filename)?);
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file if not loaded yet. A missing file is empty.
    pub fn open(&mut self) -> Result<(), ConfigError> {
        if self.lines.is_none() {
            self.read_config_file()?;
        }
        Ok(())
    }

    /// Take the lock, then (re)load.
    pub fn open_for_update(&mut self) -> Result<(), ConfigError> {
        self.lock = Some(LockFile::acquire(&self.path)?);
        self.read_config_file()
    }

    /// Write every line through the lock and release it.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let mut lock = self.lock.take().ok_or(ConfigError::NotLocked)?;
        lock.write_all(self.to_string().as_bytes())?;
        lock.commit()?;
        tracing::debug!(path = %self.path.display(), "saved config");
        Ok(())
    }

    /// Drop the lock without writing.
    pub fn release(&mut self) -> Result<(), ConfigError> {
        if let Some(lock) = self.lock.take() {
            lock.rollback()?;
        }
        Ok(())
    }

    fn read_config_file(&mut self) -> Result<(), ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let filename = self.path.display().to_string();
        self.lines = Some(parse::parse_config(&content, &filename)?);
        Ok(())
    }

    fn lines(&self) -> &[Line] {
        self.lines.as_deref().unwrap_or_default()
    }

    fn lines_mut(&mut self) -> &mut Vec<Line> {
        self.lines.get_or_insert_with(Vec::new)
    }

    /// Every value of `key`, in file order.
    pub fn get_all(&self, key: &str) -> Result<Vec<Value>, ConfigError> {
        let key = ConfigKey::parse(key)?;
        let values = self
            .find_lines(&key)
            .into_iter()
            .filter_map(|i| self.lines()[i].variable.as_ref())
            .map(|var| var.value.clone())
            .collect();
        Ok(values)
    }

    /// The last value of `key`.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.get_all(key)?.pop())
    }

    /// Append another value for `key`.
    pub fn add(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        self.add_variable(&key, value.into());
        Ok(())
    }

    /// Set the single value of `key`, refusing if it has several.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        let value = value.into();
        match self.find_lines(&key).as_slice() {
            [] => self.add_variable(&key, value),
            [index] => self.update_variable(*index, &key, value),
            _ => {
                return Err(ConfigError::Conflict(
                    "cannot overwrite multiple values with a single value".into(),
                ))
            }
        }
        Ok(())
    }

    /// Replace every value of `key` with one.
    pub fn replace_all(&mut self, key: &str, value: impl Into<Value>) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        let found = self.find_lines(&key);
        self.remove_lines(&found);
        self.add_variable(&key, value.into());
        Ok(())
    }

    /// Remove every value of `key`, and its section once nothing else is left.
    pub fn unset_all(&mut self, key: &str) -> Result<(), ConfigError> {
        self.unset_with(key, |_| Ok(()))
    }

    /// Remove the value of `key`, refusing if it has several.
    pub fn unset(&mut self, key: &str) -> Result<(), ConfigError> {
        self.unset_with(key, |count| {
            if count > 1 {
                return Err(ConfigError::Conflict(format!("{key} has multiple values")));
            }
            Ok(())
        })
    }

    fn unset_with(
        &mut self,
        key: &str,
        check: impl FnOnce(usize) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let key = ConfigKey::parse(key)?;
        let id = key.section_id();
        if !self.has_section_id(&id) {
            return Ok(());
        }
        let found = self.find_lines(&key);
        check(found.len())?;
        self.remove_lines(&found);

        let remaining = self.lines().iter().filter(|l| l.section == id).count();
        if remaining == 1 {
            self.remove_section_id(&id);
        }
        Ok(())
    }

    /// Remove `section` or `section.subsection` with all its lines.
    /// Returns whether it existed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        self.remove_section_id(&SectionId::parse(name))
    }

    fn remove_section_id(&mut self, id: &SectionId) -> bool {
        let lines = self.lines_mut();
        let before = lines.len();
        lines.retain(|line| &line.section != id);
        lines.len() != before
    }

    /// Subsection names of every `[name "..."]` section, in file order.
    pub fn subsections(&self, name: &str) -> Vec<String> {
        let name = name.to_ascii_lowercase();
        let mut subs: Vec<String> = Vec::new();
        for line in self.lines() {
            let id = &line.section;
            if id.name == name && !id.subsection.is_empty() && !subs.contains(&id.subsection) {
                subs.push(id.subsection.clone());
            }
        }
        subs
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.has_section_id(&SectionId::parse(name))
    }

    fn has_section_id(&self, id: &SectionId) -> bool {
        self.lines().iter().any(|line| &line.section == id)
    }

    /// Indices of the assignments to `key`.
    fn find_lines(&self, key: &ConfigKey) -> Vec<usize> {
        let id = key.section_id();
        let name = key.normal_name();
        self.lines()
            .iter()
            .enumerate()
            .filter(|(_, line)| line.section == id)
            .filter(|(_, line)| line.variable.as_ref().is_some_and(|v| v.normal_name() == name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Insert after the section's last line, creating the section at the end
    /// of the file when missing.
    fn add_variable(&mut self, key: &ConfigKey, value: Value) {
        let id = key.section_id();
        let text = Variable::serialize(&key.name, &value);
        let line = Line {
            text,
            section: id.clone(),
            variable: Some(Variable {
                name: key.name.clone(),
                value,
            }),
        };

        let lines = self.lines_mut();
        match lines.iter().rposition(|l| l.section == id) {
            Some(last) => lines.insert(last + 1, line),
            None => {
                lines.push(Line {
                    text: key.heading_line(),
                    section: id,
                    variable: None,
                });
                lines.push(line);
            }
        }
    }

    fn update_variable(&mut self, index: usize, key: &ConfigKey, value: Value) {
        let line = &mut self.lines_mut()[index];
        line.text = Variable::serialize(&key.name, &value);
        line.variable = Some(Variable {
            name: key.name.clone(),
            value,
        });
    }

    fn remove_lines(&mut self, indices: &[usize]) {
        let lines = self.lines_mut();
        for &i in indices.iter().rev() {
            lines.remove(i);
        }
    }
}

impl std::fmt::Display for ConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.lines().iter().try_for_each(|line| f.write_str(&line.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConfigFile {
        ConfigFile::parse("", "memory").unwrap()
    }

    #[test]
    fn unknown_key_is_none() {
        assert_eq!(config().get("core.editor").unwrap(), None);
    }

    #[test]
    fn names_fold_case_but_subsections_do_not() {
        let mut c = config();
        c.set("core.editor", "ed").unwrap();
        c.set("branch.main.remote", "origin").unwrap();
        assert_eq!(c.get("Core.Editor").unwrap(), Some(Value::from("ed")));
        assert_eq!(c.get("branch.main.remote").unwrap(), Some(Value::from("origin")));
        assert_eq!(c.get("branch.Main.remote").unwrap(), None);
    }

    #[test]
    fn multi_valued_keys() {
        let mut c = config();
        c.add("remote.origin.fetch", "main").unwrap();
        c.add("remote.origin.fetch", "topic").unwrap();
        assert_eq!(c.get("remote.origin.fetch").unwrap(), Some(Value::from("topic")));
        assert_eq!(
            c.get_all("remote.origin.fetch").unwrap(),
            vec![Value::from("main"), Value::from("topic")]
        );

        let err = c.set("remote.origin.fetch", "new-value").unwrap_err();
        assert_eq!(err.to_string(), "cannot overwrite multiple values with a single value");

        let err = c.unset("remote.origin.fetch").unwrap_err();
        assert_eq!(err.to_string(), "remote.origin.fetch has multiple values");

        c.replace_all("remote.origin.fetch", "new-value").unwrap();
        assert_eq!(c.get_all("remote.origin.fetch").unwrap(), vec![Value::from("new-value")]);
    }

    #[test]
    fn unset_last_variable_drops_the_section() {
        let mut c = config();
        c.set("remote.origin.url", "/tmp/repo").unwrap();
        c.unset("remote.origin.url").unwrap();
        assert!(!c.has_section("remote.origin"));
        assert_eq!(c.to_string(), "");
    }

    #[test]
    fn remove_section_and_subsections() {
        let mut c = config();
        c.set("remote.origin.url", "a").unwrap();
        c.set("remote.backup.url", "b").unwrap();
        assert_eq!(c.subsections("remote"), vec!["origin", "backup"]);
        assert!(c.remove_section("remote.origin"));
        assert!(!c.remove_section("remote.origin"));
        assert_eq!(c.subsections("remote"), vec!["backup"]);
    }

    #[test]
    fn save_requires_the_lock() {
        assert!(matches!(config().save(), Err(ConfigError::NotLocked)));
    }
}
