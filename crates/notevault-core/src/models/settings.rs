//! Application settings model

use serde::{Deserialize, Serialize};

/// Theme mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    /// Light theme
    Light,
    /// Dark theme
    Dark,
    /// Follow system preference
    #[default]
    System,
}

/// Application settings stored inside the primary document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Theme mode
    pub theme: ThemeMode,
    /// Font size in pixels
    pub font_size: u32,
    /// Editor autosave debounce in milliseconds
    pub autosave_interval_ms: u64,
    /// Show a banner when storage usage crosses the warning threshold
    pub show_quota_warnings: bool,
    /// Ask before deleting a folder that still holds notes
    pub confirm_folder_delete: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: ThemeMode::System,
            font_size: 14,
            autosave_interval_ms: 1000,
            show_quota_warnings: true,
            confirm_folder_delete: true,
        }
    }
}
