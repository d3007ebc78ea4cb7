//! Remotes as recorded in config: `[remote "<name>"]` sections, and the
//! `branch.<name>.remote` / `branch.<name>.merge` pairs that make a branch
//! track one of them.

use git_config::{ConfigError, ConfigFile};
use git_ref::Refspec;

use crate::ProtocolError;

pub const DEFAULT_REMOTE: &str = "origin";

/// One remote's settings, read when it is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub fetch_url: Option<String>,
    /// `remote.<name>.pushurl`, else the fetch URL.
    pub push_url: Option<String>,
    pub fetch_specs: Vec<String>,
    pub push_specs: Vec<String>,
    /// Program to run as upload-pack on the remote end.
    pub uploader: Option<String>,
    /// Program to run as receive-pack on the remote end.
    pub receiver: Option<String>,
}

/// The remotes of one config file.
pub struct Remotes<'c> {
    config: &'c mut ConfigFile,
}

impl<'c> Remotes<'c> {
    pub fn new(config: &'c mut ConfigFile) -> Self {
        Self { config }
    }

    /// Record a remote that fetches `branches` (every branch when empty)
    /// into `refs/remotes/<name>/`.
    pub fn add(&mut self, name: &str, url: &str, branches: &[&str]) -> Result<(), ProtocolError> {
        self.config.open_for_update()?;
        if self.config.get(&format!("remote.{name}.url"))?.is_some() {
            self.config.release()?;
            return Err(ProtocolError::RemoteExists(name.to_owned()));
        }
        self.config.set(&format!("remote.{name}.url"), url)?;

        let branches = if branches.is_empty() { &["*"][..] } else { branches };
        for branch in branches {
            let spec = Refspec::new(
                format!("refs/heads/{branch}"),
                format!("refs/remotes/{name}/{branch}"),
                true,
            );
            self.config.add(&format!("remote.{name}.fetch"), spec.to_string())?;
        }
        self.config.save()?;
        tracing::debug!(name, url, "added remote");
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.config.open_for_update()?;
        if !self.config.remove_section(&format!("remote.{name}")) {
            self.config.release()?;
            return Err(ProtocolError::NoSuchRemote(name.to_owned()));
        }
        self.config.save()?;
        Ok(())
    }

    /// Remote names in config order.
    pub fn list(&mut self) -> Result<Vec<String>, ProtocolError> {
        self.config.open()?;
        Ok(self.config.subsections("remote"))
    }

    pub fn get(&mut self, name: &str) -> Result<Option<Remote>, ProtocolError> {
        self.config.open()?;
        if !self.config.has_section(&format!("remote.{name}")) {
            return Ok(None);
        }
        let string = |key: &str| -> Result<Option<String>, ConfigError> {
            Ok(self.config.get(&format!("remote.{name}.{key}"))?.map(|v| v.to_string()))
        };
        let strings = |key: &str| -> Result<Vec<String>, ConfigError> {
            let values = self.config.get_all(&format!("remote.{name}.{key}"))?;
            Ok(values.iter().map(ToString::to_string).collect())
        };

        let fetch_url = string("url")?;
        Ok(Some(Remote {
            name: name.to_owned(),
            push_url: string("pushurl")?.or_else(|| fetch_url.clone()),
            fetch_url,
            fetch_specs: strings("fetch")?,
            push_specs: strings("push")?,
            uploader: string("uploadpack")?,
            receiver: string("receivepack")?,
        }))
    }

    /// Make `branch` track `upstream`, a remote-tracking ref such as
    /// `refs/remotes/origin/main`. The first remote whose fetch refspecs
    /// produce `upstream` is chosen. Returns that remote's name and the
    /// ref on the remote.
    pub fn set_upstream(&mut self, branch: &str, upstream: &str) -> Result<(String, String), ProtocolError> {
        for name in self.list()? {
            let Some(remote) = self.get(&name)? else {
                continue;
            };
            let Some(merge) = Refspec::invert(&remote.fetch_specs, upstream) else {
                continue;
            };

            self.config.open_for_update()?;
            self.config.set(&format!("branch.{branch}.remote"), name.as_str())?;
            self.config.set(&format!("branch.{branch}.merge"), merge.as_str())?;
            self.config.save()?;
            tracing::debug!(branch, remote = %name, %merge, "set upstream");
            return Ok((name, merge));
        }
        Err(ProtocolError::InvalidUpstream(upstream.to_owned()))
    }

    /// The remote-tracking ref `branch` follows, if any.
    pub fn get_upstream(&mut self, branch: &str) -> Result<Option<String>, ProtocolError> {
        self.config.open()?;
        let Some(name) = self.config.get(&format!("branch.{branch}.remote"))? else {
            return Ok(None);
        };
        let Some(merge) = self.config.get(&format!("branch.{branch}.merge"))? else {
            return Ok(None);
        };
        let Some(remote) = self.get(&name.to_string())? else {
            return Ok(None);
        };
        let targets = Refspec::expand(&remote.fetch_specs, &[merge.to_string()]);
        Ok(targets.into_keys().next())
    }

    pub fn unset_upstream(&mut self, branch: &str) -> Result<(), ProtocolError> {
        self.config.open_for_update()?;
        self.config.unset(&format!("branch.{branch}.remote"))?;
        self.config.unset(&format!("branch.{branch}.merge"))?;
        self.config.save()?;
        Ok(())
    }
}
