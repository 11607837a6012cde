use anyhow::Context;
use pipeline::Session;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config is the persisted state of a profile.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Session of the profile, which remembers its current job.
    #[serde(default)]
    pub session: Session,
}

impl Config {
    /// Loads the config of the named profile, or returns a default Config
    /// if the profile hasn't been written yet.
    pub fn load(profile: &str) -> anyhow::Result<Self> {
        Self::load_from(&Self::file_path(profile)?)
    }

    /// Writes the config of the named profile, creating its directory if needed.
    pub fn write(&self, profile: &str) -> anyhow::Result<()> {
        self.write_to(&Self::file_path(profile)?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).context(format!("failed to read config {}", path.display()))
            }
        };

        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }
        let data = serde_json::to_vec_pretty(self)?;

        // Written through a temporary sibling, which is renamed into place.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .with_context(|| format!("failed to write config {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to write config {}", path.display()))?;

        tracing::debug!(path = %path.display(), "wrote config");
        Ok(())
    }

    fn file_path(profile: &str) -> anyhow::Result<PathBuf> {
        if profile.is_empty() || profile.contains(['/', '\\']) || profile.starts_with('.') {
            anyhow::bail!("invalid profile name {profile:?}");
        }
        let dir = dirs::config_dir().context("couldn't determine the user config directory")?;
        Ok(dir.join("batchctl").join(format!("{profile}.json")))
    }
}
