//! Merged multi-scope configuration view.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::file::ConfigFile;
use crate::types::Value;
use crate::ConfigScope;

const SYSTEM_CONFIG: &str = "/etc/gitconfig";

/// The system, global and local files of a repository. Lookups read all
/// three; later scopes win.
pub struct ConfigStack {
    system: ConfigFile,
    global: ConfigFile,
    local: ConfigFile,
}

impl ConfigStack {
    /// The standard files for the repository at `git_dir`.
    ///
    /// Global config is `~/.gitconfig`, or `$XDG_CONFIG_HOME/git/config`
    /// when only that exists.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self::with_paths(
            PathBuf::from(SYSTEM_CONFIG),
            global_config_path(),
            git_dir.as_ref().join("config"),
        )
    }

    pub fn with_paths(system: PathBuf, global: PathBuf, local: PathBuf) -> Self {
        Self {
            system: ConfigFile::new(system),
            global: ConfigFile::new(global),
            local: ConfigFile::new(local),
        }
    }

    pub fn open(&mut self) -> Result<(), ConfigError> {
        for scope in [ConfigScope::System, ConfigScope::Global, ConfigScope::Local] {
            self.file(scope).open()?;
        }
        Ok(())
    }

    /// Every value of `key` across scopes, system first.
    pub fn get_all(&mut self, key: &str) -> Result<Vec<Value>, ConfigError> {
        self.open()?;
        let mut values = self.system.get_all(key)?;
        values.extend(self.global.get_all(key)?);
        values.extend(self.local.get_all(key)?);
        Ok(values)
    }

    /// The effective value of `key`.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.get_all(key)?.pop())
    }

    pub fn get_string(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.get(key)?.map(|v| v.to_string()))
    }

    pub fn get_int(&mut self, key: &str) -> Result<Option<i64>, ConfigError> {
        Ok(self.get(key)?.and_then(|v| v.as_int()))
    }

    pub fn get_bool(&mut self, key: &str) -> Result<Option<bool>, ConfigError> {
        Ok(self.get(key)?.and_then(|v| v.as_bool()))
    }

    pub fn file(&mut self, scope: ConfigScope) -> &mut ConfigFile {
        match scope {
            ConfigScope::System => &mut self.system,
            ConfigScope::Global => &mut self.global,
            ConfigScope::Local => &mut self.local,
        }
    }
}

fn global_config_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_default();
    let dotfile = home.join(".gitconfig");

    let xdg = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join(".config"))
        .join("git/config");

    if xdg.exists() && !dotfile.exists() {
        xdg
    } else {
        dotfile
    }
}
