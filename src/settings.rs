use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::capture::{fusion::DEFAULT_JITTER, CaptureConfig};

const DB_PATH_ENV: &str = "COGNI_DB_PATH";
const CAPTURE_PERIOD_ENV: &str = "COGNI_CAPTURE_PERIOD_SECS";
const DEFAULT_DB_FILE: &str = "cogni.sqlite3";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureSettings {
    pub period_secs: u64,
    pub capture_timeout_secs: u64,
    pub jitter: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            period_secs: 60,
            capture_timeout_secs: 10,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl CaptureSettings {
    pub fn to_config(&self) -> CaptureConfig {
        CaptureConfig {
            period: Duration::from_secs(self.period_secs.max(1)),
            capture_timeout: Duration::from_secs(self.capture_timeout_secs.max(1)),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub database_path: PathBuf,
    pub capture: CaptureSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_FILE),
            capture: CaptureSettings::default(),
        }
    }
}

impl AppSettings {
    /// Apply environment overrides; `lookup` is `std::env::var` outside of tests.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(CAPTURE_PERIOD_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.capture.period_secs = secs,
                _ => warn!("Ignoring invalid {CAPTURE_PERIOD_ENV}={raw}"),
            }
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AppSettings>,
}

impl SettingsStore {
    /// Load settings from `path` (defaults when the file is missing or unreadable as
    /// JSON), then apply environment overrides.
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::load(path, |key| std::env::var(key).ok())
    }

    fn load<F>(path: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Invalid settings in {}: {err}; using defaults", path.display());
                AppSettings::default()
            })
        } else {
            AppSettings::default()
        };
        data.apply_overrides(lookup);

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> AppSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Write the current settings out unless the file already exists.
    /// Returns `true` when a file was written.
    pub fn write_if_missing(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        self.persist(&self.current())?;
        Ok(true)
    }

    fn persist(&self, data: &AppSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
