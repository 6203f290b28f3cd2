use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

use cardroom_engine::player::Chips;
use cardroom_engine::poker::Blinds;

/// Table configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TableSettings {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
    /// Seats per poker room (2-10); Blot rooms always have two.
    pub max_seats: u8,
    /// Lifetime of a stored hand after its last update
    pub state_ttl_secs: u64,
    /// How often expired state and idle room locks are freed
    pub state_sweep_interval_secs: u64,
    pub next_hand_delay_ms: u64,
    /// Pause before dealing the next street; zero deals immediately
    pub stage_advance_delay_ms: u64,
    pub blot_target_score: u32,
    pub blot_next_hand_delay_ms: u64,
    pub log_filter: String,
    /// One JSON object per log line instead of plain text
    pub log_json: bool,
    /// JSONL hand history file; none keeps history in memory
    pub history_path: Option<PathBuf>,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            small_blind: 5,
            big_blind: 10,
            min_buy_in: 100,
            max_buy_in: 1000,
            max_seats: 6,
            state_ttl_secs: 3600,
            state_sweep_interval_secs: 60,
            next_hand_delay_ms: 3000,
            stage_advance_delay_ms: 1000,
            blot_target_score: 11,
            blot_next_hand_delay_ms: 3000,
            log_filter: "info,cardroom_tables=debug".to_string(),
            log_json: false,
            history_path: None,
        }
    }
}

impl TableSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.small_blind == 0 {
            return Err(SettingsError::InvalidValue(
                "small_blind must be greater than 0".to_string(),
            ));
        }
        if self.big_blind < self.small_blind {
            return Err(SettingsError::InvalidValue(
                "big_blind cannot be smaller than small_blind".to_string(),
            ));
        }
        if self.min_buy_in < self.big_blind {
            return Err(SettingsError::InvalidValue(
                "min_buy_in must cover at least one big blind".to_string(),
            ));
        }
        if self.max_buy_in < self.min_buy_in {
            return Err(SettingsError::InvalidValue(
                "max_buy_in cannot be smaller than min_buy_in".to_string(),
            ));
        }
        if !(2..=10).contains(&self.max_seats) {
            return Err(SettingsError::InvalidValue(
                "max_seats must be between 2 and 10".to_string(),
            ));
        }
        if self.state_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "state_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.state_sweep_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "state_sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.blot_target_score == 0 {
            return Err(SettingsError::InvalidValue(
                "blot_target_score must be greater than 0".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "log_filter cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates settings; missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: TableSettings =
            toml::from_str(raw).map_err(|e| SettingsError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SettingsError::Parse(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn blinds(&self) -> Blinds {
        Blinds {
            small: self.small_blind,
            big: self.big_blind,
        }
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }

    pub fn state_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.state_sweep_interval_secs)
    }

    pub fn next_hand_delay(&self) -> Duration {
        Duration::from_millis(self.next_hand_delay_ms)
    }

    pub fn stage_advance_delay(&self) -> Duration {
        Duration::from_millis(self.stage_advance_delay_ms)
    }

    pub fn blot_next_hand_delay(&self) -> Duration {
        Duration::from_millis(self.blot_next_hand_delay_ms)
    }
}

/// Live settings shared by every table, validated on each update.
#[derive(Debug)]
pub struct SettingsStore {
    settings: RwLock<TableSettings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(TableSettings::default()),
        }
    }

    pub fn with_settings(settings: TableSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
        })
    }

    pub fn get(&self) -> Result<TableSettings, SettingsError> {
        self.settings
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| SettingsError::StoragePoisoned)
    }

    pub fn update(&self, new_settings: TableSettings) -> Result<TableSettings, SettingsError> {
        new_settings.validate()?;

        let mut guard = self
            .settings
            .write()
            .map_err(|_| SettingsError::StoragePoisoned)?;
        *guard = new_settings.clone();
        Ok(new_settings)
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
    #[error("Could not read settings: {0}")]
    Parse(String),
    #[error("Settings storage poisoned")]
    StoragePoisoned,
}
