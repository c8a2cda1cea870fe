use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf, sync::RwLock};

use crate::excel::acquire::AcquireConfig;
use crate::excel::notes::NoteConfig;
use crate::worker::WorkerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub ready_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub cooldown_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 300,
            ready_timeout_ms: 1000,
            poll_interval_ms: 100,
            cooldown_ms: 200,
            settle_delay_ms: 50,
        }
    }
}

impl SessionSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            acquire: AcquireConfig {
                max_attempts: self.max_attempts,
                backoff_base: Duration::from_millis(self.backoff_base_ms),
                ready_timeout: Duration::from_millis(self.ready_timeout_ms),
                ..AcquireConfig::default()
            },
            note: NoteConfig {
                max_attempts: self.max_attempts,
                backoff_base: Duration::from_millis(self.backoff_base_ms),
                settle_delay: Duration::from_millis(self.settle_delay_ms),
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgarSettings {
    /// SEC.gov rejects requests without a descriptive User-Agent.
    pub user_agent: String,
    /// Which filing type to pull ("10-Q" or "10-K").
    pub form_type: String,
}

impl Default for EdgarSettings {
    fn default() -> Self {
        Self {
            user_agent: "axenote/0.2 (open source research; contact@axenote.dev)".into(),
            form_type: "10-Q".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lands in the settings file.
    pub api_key_env: String,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "AXENOTE_LLM_API_KEY".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    session: SessionSettings,
    edgar: EdgarSettings,
    summarizer: SummarizerSettings,
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

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn session(&self) -> SessionSettings {
        self.data.read().unwrap().session.clone()
    }

    pub fn edgar(&self) -> EdgarSettings {
        self.data.read().unwrap().edgar.clone()
    }

    pub fn summarizer(&self) -> SummarizerSettings {
        self.data.read().unwrap().summarizer.clone()
    }

    pub fn update_session(&self, settings: SessionSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.session = settings;
        self.persist(&guard)
    }

    /// Writes the current settings out, creating the file with defaults on
    /// first run so users have something to edit.
    pub fn persist_current(&self) -> Result<()> {
        let guard = self.data.read().unwrap();
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap();
        *guard = data;
        Ok(())
    }
}
