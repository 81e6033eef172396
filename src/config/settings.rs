//! Operator-tunable settings
//!
//! Loaded from `settings.json` under the base directory; every field has a
//! default so a missing or partial file still yields a working configuration.

use serde::{Deserialize, Serialize};

use super::paths::PayguardPaths;
use crate::error::PayguardError;
use crate::models::LockoutPolicy;

/// User settings for payguard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Login lockout policy
    #[serde(default)]
    pub lockout: LockoutPolicy,

    /// Minimum trimmed length of a batch-unlock justification
    #[serde(default = "default_min_unlock_reason_chars")]
    pub min_unlock_reason_chars: usize,
}

fn default_schema_version() -> u32 {
    1
}

fn default_min_unlock_reason_chars() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            lockout: LockoutPolicy::default(),
            min_unlock_reason_chars: default_min_unlock_reason_chars(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &PayguardPaths) -> Result<Self, PayguardError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| PayguardError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents)
                .map_err(|e| PayguardError::Config(format!("Failed to parse settings file: {}", e)))?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &PayguardPaths) -> Result<(), PayguardError> {
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| PayguardError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| PayguardError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }
}
