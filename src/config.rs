//! Application configuration.
//!
//! The configuration is loaded from a JSON file, by default
//! `<config dir>/rearrange/config.json`.  Every section and field is
//! optional; a minimal `{}` file is valid.  The values are read once at
//! startup and stay constant for the session.
//!
//! # Example
//!
//! ```json
//! {
//!   "snapping": { "enabled": true, "pixels": 10, "include_self": false },
//!   "pointer": { "shift_cursor": 20 },
//!   "window": { "min_width": 100, "min_height": 80 }
//! }
//! ```

use crate::model::SizeLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub snapping: SnappingConfig,

    #[serde(default)]
    pub pointer: PointerConfig,

    #[serde(default)]
    pub window: WindowConfig,
}

/// Edge snapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnappingConfig {
    pub enabled: bool,
    /// Half the thickness of a snapping band, in pixels.
    pub pixels: i32,
    /// Let the window snap to its own original position.
    pub include_self: bool,
}

impl Default for SnappingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pixels: 10,
            include_self: false,
        }
    }
}

/// Pointer handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Distance between the cursor and the corner it drives, on both axes.
    pub shift_cursor: i32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self { shift_cursor: 20 }
    }
}

/// Window size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let limits = SizeLimits::default();
        Self {
            min_width: limits.min_width,
            min_height: limits.min_height,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::persist::APP_NAME).join("config.json"))
    }

    /// Minimum window size for the model.
    pub fn size_limits(&self) -> SizeLimits {
        SizeLimits {
            min_width: self.window.min_width.max(0),
            min_height: self.window.min_height.max(0),
        }
    }

    /// Snapping band half-thickness, or `None` when snapping is off.
    pub fn snap_pixels(&self) -> Option<i32> {
        (self.snapping.enabled && self.snapping.pixels > 0).then_some(self.snapping.pixels)
    }
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deserialize_full_config() {
        let json = r#"{
            "snapping": { "enabled": false, "pixels": 6, "include_self": true },
            "pointer": { "shift_cursor": 12 },
            "window": { "min_width": 200, "min_height": 150 }
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert!(!cfg.snapping.enabled);
        assert_eq!(cfg.snapping.pixels, 6);
        assert!(cfg.snapping.include_self);
        assert_eq!(cfg.pointer.shift_cursor, 12);
        assert_eq!(cfg.size_limits(), SizeLimits { min_width: 200, min_height: 150 });
        assert_eq!(cfg.snap_pixels(), None);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert!(cfg.snapping.enabled);
        assert_eq!(cfg.snap_pixels(), Some(10));
        assert!(!cfg.snapping.include_self);
        assert_eq!(cfg.pointer.shift_cursor, 20);
        assert_eq!(cfg.size_limits(), SizeLimits::default());
    }

    #[test]
    fn deserialize_partial_section() {
        let cfg: Config = serde_json::from_str(r#"{ "snapping": { "pixels": 4 } }"#).unwrap();
        assert_eq!(cfg.snap_pixels(), Some(4));
        assert!(!cfg.snapping.include_self);
    }

    #[test]
    fn unknown_keys_ignored() {
        let json = r#"{ "snapping": { "magnet": 3 }, "future_section": { "key": 42 } }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.snapping.pixels, 10);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "pointer": {{ "shift_cursor": 5 }} }}"#).unwrap();
        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.pointer.shift_cursor, 5);
    }

    #[test]
    fn load_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().starts_with("config error: failed to parse"));
    }
}
