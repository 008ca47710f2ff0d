use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Main settings structure containing all application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub panel: PanelSettings,
}

/// Chat panel settings
///
/// `collapsed` is the only persisted UI preference. It is keyed globally,
/// not per-video, and survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelSettings {
    pub collapsed: bool,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self { collapsed: false }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            panel: PanelSettings::default(),
        }
    }
}

/// Manages settings persistence and provides thread-safe access
pub struct SettingsManager {
    settings_path: PathBuf,
    current_settings: Arc<RwLock<Settings>>,
}

impl SettingsManager {
    /// Creates a new SettingsManager and loads settings from disk
    ///
    /// If the settings file doesn't exist, creates it with default values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The settings directory cannot be created
    /// - The settings file cannot be read or written
    pub fn new() -> Result<Self, String> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| "Failed to get home directory".to_string())?;

        let tubechat_dir = home_dir.join(".tubechat");
        let settings_path = tubechat_dir.join("settings.json");

        Self::new_with_path(settings_path)
    }

    /// Creates a new SettingsManager with a custom settings path
    ///
    /// This is primarily used for testing but is also used internally by new().
    pub(crate) fn new_with_path(settings_path: PathBuf) -> Result<Self, String> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = settings_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create settings directory: {}", e))?;
            }
        }

        let manager = Self {
            settings_path: settings_path.clone(),
            current_settings: Arc::new(RwLock::new(Settings::default())),
        };

        // Load settings from file or create with defaults
        let settings = if settings_path.exists() {
            manager.load_from_file()?
        } else {
            let defaults = Settings::default();
            manager.save_to_file(&defaults)?;
            defaults
        };

        // Update in-memory settings
        *manager.current_settings.write()
            .map_err(|e| format!("Failed to acquire write lock: {}", e))? = settings;

        Ok(manager)
    }

    /// Returns a clone of the current settings
    pub fn get(&self) -> Settings {
        self.current_settings.read()
            .expect("Failed to acquire read lock")
            .clone()
    }

    /// Updates settings (persists to disk, then updates in-memory)
    ///
    /// This method follows the critical ordering:
    /// 1. Persist to disk (FIRST)
    /// 2. Update in-memory state (ONLY if persist succeeded)
    ///
    /// This ensures in-memory state never becomes stale if disk write fails.
    pub fn update(&self, settings: Settings) -> Result<(), String> {
        // Persist to disk FIRST
        self.save_to_file(&settings)?;

        // Update in-memory state ONLY if save succeeded
        *self.current_settings.write()
            .map_err(|e| format!("Failed to acquire write lock: {}", e))? = settings;

        Ok(())
    }

    /// Persist a new value for the panel collapse preference.
    pub fn set_panel_collapsed(&self, collapsed: bool) -> Result<(), String> {
        let mut settings = self.get();
        settings.panel.collapsed = collapsed;
        self.update(settings)
    }

    /// Loads settings from disk
    ///
    /// If the file contains invalid JSON, logs an error and returns defaults
    /// to ensure graceful degradation.
    fn load_from_file(&self) -> Result<Settings, String> {
        let contents = std::fs::read_to_string(&self.settings_path)
            .map_err(|e| format!("Failed to read settings file: {}", e))?;

        match serde_json::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                eprintln!("Failed to parse settings JSON: {}. Using defaults.", e);
                Ok(Settings::default())
            }
        }
    }

    /// Saves settings to disk atomically
    ///
    /// Uses a temporary file and atomic rename to prevent partial writes.
    fn save_to_file(&self, settings: &Settings) -> Result<(), String> {
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        // Write to temporary file
        let temp_path = self.settings_path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)
            .map_err(|e| format!("Failed to write temporary settings file: {}", e))?;

        // Atomic rename
        std::fs::rename(&temp_path, &self.settings_path)
            .map_err(|e| format!("Failed to rename settings file: {}", e))?;

        Ok(())
    }
}
