use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Small piece of state remembered between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Base url of the last confirmed endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_endpoint: Option<String>,
}

pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Preferences>;
    fn save(&self, preferences: &Preferences) -> anyhow::Result<()>;
}

/// Preferences persisted as a TOML file. A missing file reads as defaults.
pub struct TomlPreferenceStore {
    path: PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self) -> anyhow::Result<Preferences> {
        if !self.path.exists() {
            return Ok(Preferences::default());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read preferences {}", self.path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse preferences {}", self.path.display()))
    }

    fn save(&self, preferences: &Preferences) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = toml::to_string(preferences).context("failed to serialize preferences")?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("failed to write preferences {}", self.path.display()))
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> anyhow::Result<Preferences> {
        self.inner
            .lock()
            .map(|prefs| prefs.clone())
            .map_err(|_| anyhow::anyhow!("preference lock poisoned"))
    }

    fn save(&self, preferences: &Preferences) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("preference lock poisoned"))?;
        *guard = preferences.clone();
        Ok(())
    }
}

/// Moves the remembered endpoint to the front of `candidates`, adding it if
/// it is not configured.
pub fn prefer_endpoint(candidates: &[String], preferences: &Preferences) -> Vec<String> {
    let Some(preferred) = preferences
        .last_endpoint
        .as_deref()
        .map(|base| base.trim().trim_end_matches('/'))
        .filter(|base| !base.is_empty())
    else {
        return candidates.to_vec();
    };
    let mut ordered = vec![preferred.to_string()];
    ordered.extend(
        candidates
            .iter()
            .filter(|candidate| candidate.trim().trim_end_matches('/') != preferred)
            .cloned(),
    );
    ordered
}
