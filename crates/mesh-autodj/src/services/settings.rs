use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Result;

use crate::config::{load_config, save_config, AutoDjSettings};

/// Persistent home of the user's Auto-DJ preferences
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> AutoDjSettings;

    fn save(&self, settings: &AutoDjSettings) -> Result<()>;
}

/// Settings kept in a YAML file
///
/// A missing or broken file loads as defaults.
pub struct YamlSettingsStore {
    path: PathBuf,
}

impl YamlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for YamlSettingsStore {
    fn load(&self) -> AutoDjSettings {
        load_config(&self.path)
    }

    fn save(&self, settings: &AutoDjSettings) -> Result<()> {
        save_config(settings, &self.path)
    }
}

#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<AutoDjSettings>,
}

impl MemorySettingsStore {
    pub fn new(settings: AutoDjSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> AutoDjSettings {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, settings: &AutoDjSettings) -> Result<()> {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnergyStyle;

    #[test]
    fn test_yaml_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = YamlSettingsStore::new(dir.path().join("settings.yaml"));
        assert_eq!(store.load(), AutoDjSettings::default());

        let settings = AutoDjSettings {
            energy_style: EnergyStyle::PeakValley,
            prefer_harmonic: false,
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySettingsStore::default();
        let settings = AutoDjSettings {
            enabled: false,
            ..Default::default()
        };
        store.save(&settings).unwrap();
        assert!(!store.load().enabled);
    }
}
