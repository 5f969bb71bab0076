//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::screen::{Combination, ScreenId};

/// Default screen mode applied to a freshly connected external screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalScreenMode {
    /// Join at the origin
    Mirror,
    /// Keep the screen's last known extend position
    Extend,
}

/// Composition engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionConfig {
    /// First logical id handed out by the id table (must be >= 2)
    #[serde(default = "default_first_logical_id")]
    pub first_logical_id: ScreenId,

    /// New groups start as EXPAND
    #[serde(default)]
    pub expand_enabled: bool,

    /// New groups start as UNIQUE (ignored when `expand_enabled` is set)
    #[serde(default)]
    pub unique_requested: bool,

    /// Placement policy for the first screen of a new group
    #[serde(default = "default_external_screen_mode")]
    pub external_screen_default_mode: ExternalScreenMode,

    /// Join the group automatically when a hardware screen connects
    #[serde(default)]
    pub join_on_connect: bool,

    /// Default for the mirror "region follows rotation" flag
    #[serde(default = "default_true")]
    pub region_rotation_default: bool,

    /// Screen names whose mirror region never rotates (capture / recording targets)
    #[serde(default = "default_region_rotation_excluded_names")]
    pub region_rotation_excluded_names: Vec<String>,

    /// Reject all mirror requests
    #[serde(default)]
    pub mirror_disabled: bool,
}

fn default_first_logical_id() -> ScreenId {
    1000
}

fn default_external_screen_mode() -> ExternalScreenMode {
    ExternalScreenMode::Mirror
}

fn default_true() -> bool {
    true
}

fn default_region_rotation_excluded_names() -> Vec<String> {
    vec![
        "ScreenCapture".to_string(),
        "ScreenRecorder".to_string(),
        "CastEngine".to_string(),
    ]
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            first_logical_id: default_first_logical_id(),
            expand_enabled: false,
            unique_requested: false,
            external_screen_default_mode: default_external_screen_mode(),
            join_on_connect: false,
            region_rotation_default: true,
            region_rotation_excluded_names: default_region_rotation_excluded_names(),
            mirror_disabled: false,
        }
    }
}

impl CompositionConfig {
    /// Combination for a freshly created group
    ///
    /// Expand wins over unique, unique over the mirror default.
    pub fn initial_combination(&self, unique_hint: bool) -> Combination {
        if self.expand_enabled {
            Combination::Expand
        } else if self.unique_requested || unique_hint {
            Combination::Unique
        } else {
            Combination::Mirror
        }
    }

    /// Whether the mirror region of a screen named `name` may rotate
    pub fn region_rotation_for(&self, name: &str) -> bool {
        if self
            .region_rotation_excluded_names
            .iter()
            .any(|excluded| excluded == name)
        {
            false
        } else {
            self.region_rotation_default
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("pretty", "compact", "json")
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for log files (None = console only)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
