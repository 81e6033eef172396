//! Path management for payguard
//!
//! Provides XDG-compliant path resolution for configuration and data.
//!
//! ## Path Resolution Order
//!
//! 1. `PAYGUARD_DATA_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/payguard` or `~/.config/payguard`
//! 3. Windows: `%APPDATA%\payguard`

use std::path::PathBuf;

use crate::error::PayguardError;

/// Manages all paths used by payguard
#[derive(Debug, Clone)]
pub struct PayguardPaths {
    /// Base directory for all payguard data
    base_dir: PathBuf,
}

impl PayguardPaths {
    /// Create a new PayguardPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, PayguardError> {
        let base_dir = if let Ok(custom) = std::env::var("PAYGUARD_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create PayguardPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.config/payguard/ or equivalent)
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory holding the JSON collections
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Get the export directory for generated reports
    pub fn export_dir(&self) -> PathBuf {
        self.base_dir.join("exports")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    /// Get the path to the audit ledger
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Get the path to the sealed key ring
    pub fn keys_file(&self) -> PathBuf {
        self.base_dir.join("keys.dat")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), PayguardError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| PayguardError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| PayguardError::Io(format!("Failed to create data directory: {}", e)))?;

        std::fs::create_dir_all(self.export_dir())
            .map_err(|e| PayguardError::Io(format!("Failed to create export directory: {}", e)))?;

        Ok(())
    }

    /// Check if payguard has been initialized (settings file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, PayguardError> {
    // Unix (Linux/macOS): Use XDG_CONFIG_HOME if set, otherwise ~/.config
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .map_err(|_| {
                    PayguardError::Config("Could not determine home directory".into())
                })
        })?;
    Ok(config_base.join("payguard"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, PayguardError> {
    // Windows: Use APPDATA
    let appdata = std::env::var("APPDATA")
        .map_err(|_| PayguardError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("payguard"))
}
