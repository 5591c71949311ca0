use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};
use uuid::Uuid;

use crate::prediction::PredictionConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Base URL of the sync server; `None` keeps the app fully offline.
    pub base_url: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { base_url: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSettings {
    prediction: PredictionConfig,
    sync: SyncSettings,
    /// Stable random id identifying this install to the sync server.
    device_id: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            prediction: PredictionConfig::default(),
            sync: SyncSettings::default(),
            device_id: String::new(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        let store = Self {
            path,
            data: RwLock::new(data),
        };
        store.ensure_device_id()?;
        Ok(store)
    }

    pub fn prediction(&self) -> PredictionConfig {
        self.data.read().unwrap().prediction.clone()
    }

    pub fn sync(&self) -> SyncSettings {
        self.data.read().unwrap().sync.clone()
    }

    pub fn device_id(&self) -> String {
        self.data.read().unwrap().device_id.clone()
    }

    pub fn update_prediction(&self, settings: PredictionConfig) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.prediction = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    pub fn update_sync(&self, settings: SyncSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.sync = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    /// Generates the device id on first run and writes it back, so the id
    /// survives restarts.
    fn ensure_device_id(&self) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        if guard.device_id.is_empty() {
            guard.device_id = Uuid::new_v4().to_string();
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl SettingsStore {
    #[allow(dead_code)]
    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}
