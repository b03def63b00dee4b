// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config profiles as `<profile>.json` files in the platform config dir.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::config::{ConfigError, ConfigStore};

/// Profiles stored as JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store in the user config directory (e.g. `~/.config/attrib`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "attrib")
            .ok_or_else(|| ConfigError::Invalid("could not resolve config dir".into()))?;
        Self::at(proj.config_dir())
    }

    /// Store rooted at `base`, created if missing.
    pub fn at(base: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory the store writes into.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn profile_path(&self, profile: &str) -> PathBuf {
        self.base.join(format!("{profile}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn read_profile(&self, profile: &str) -> Result<Option<String>, ConfigError> {
        match fs::read_to_string(self.profile_path(profile)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes a sibling temp file and renames it over the profile, so a
    /// reader never sees half a config.
    fn write_profile(&self, profile: &str, json: &str) -> Result<(), ConfigError> {
        let path = self.profile_path(profile);
        let staging = self.base.join(format!(".{profile}.json.tmp"));
        fs::write(&staging, json)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }
}
