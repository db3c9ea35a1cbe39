//! Configuration for camfeed
//!
//! Tunables for the preview and capture paths and the location of the
//! preference file. Stored as TOML; a missing file means defaults.

use crate::errors::CameraError;
use crate::sizing::TARGET_CAPTURE_AREA;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CamfeedConfig {
    pub preview: PreviewConfig,
    pub capture: CaptureConfig,
    pub preferences: PreferencesConfig,
}

/// Live preview path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Quality of the compressed intermediate (1-100)
    pub jpeg_quality: u8,
    /// Preview target area is the display area divided by this
    pub area_divisor: u32,
}

/// Still capture path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Capture size target in pixels
    pub target_area: u64,
    /// Downsampling retries after an out-of-memory failure
    pub max_retries: u32,
    /// Bytes a decoded capture may occupy
    pub memory_budget_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// File holding the last-chosen camera
    pub path: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            area_divisor: 4,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_area: TARGET_CAPTURE_AREA,
            max_retries: 5,
            memory_budget_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: "camfeed-prefs.toml".to_string(),
        }
    }
}

impl CamfeedConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: CamfeedConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("camfeed.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        if self.preview.jpeg_quality == 0 || self.preview.jpeg_quality > 100 {
            return Err(CameraError::ConfigError(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }
        if self.preview.area_divisor == 0 {
            return Err(CameraError::ConfigError(
                "Preview area divisor must be at least 1".to_string(),
            ));
        }
        if self.capture.target_area == 0 {
            return Err(CameraError::ConfigError(
                "Capture target area must be positive".to_string(),
            ));
        }
        if self.capture.max_retries > 16 {
            return Err(CameraError::ConfigError(
                "Capture retries must be between 0 and 16".to_string(),
            ));
        }
        if self.capture.memory_budget_bytes == 0 {
            return Err(CameraError::ConfigError(
                "Capture memory budget must be positive".to_string(),
            ));
        }
        if self.preferences.path.trim().is_empty() {
            return Err(CameraError::ConfigError(
                "Preference path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CamfeedConfig::default();
        assert_eq!(config.preview.jpeg_quality, 90);
        assert_eq!(config.preview.area_divisor, 4);
        assert_eq!(config.capture.target_area, 1_166_400);
        assert_eq!(config.capture.max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad_quality = CamfeedConfig::default();
        bad_quality.preview.jpeg_quality = 0;
        assert!(bad_quality.validate().is_err());

        let mut bad_divisor = CamfeedConfig::default();
        bad_divisor.preview.area_divisor = 0;
        assert!(bad_divisor.validate().is_err());

        let mut bad_budget = CamfeedConfig::default();
        bad_budget.capture.memory_budget_bytes = 0;
        assert!(matches!(
            bad_budget.validate(),
            Err(CameraError::ConfigError(_))
        ));
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("camfeed.toml");

        let mut config = CamfeedConfig::default();
        config.capture.max_retries = 3;
        config.save_to_file(&config_path).unwrap();

        let loaded = CamfeedConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&CamfeedConfig::default()).unwrap();
        assert!(toml_string.contains("[preview]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[preferences]"));
        assert!(toml_string.contains("memory_budget_bytes"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camfeed.toml");
        fs::write(&path, "[preview]\njpeg_quality = 70\n").unwrap();
        let loaded = CamfeedConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.preview.jpeg_quality, 70);
        assert_eq!(loaded.preview.area_divisor, 4);
        assert_eq!(loaded.capture, CaptureConfig::default());
    }

    #[test]
    fn test_garbage_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camfeed.toml");
        fs::write(&path, "[preview\n").unwrap();
        assert!(matches!(
            CamfeedConfig::load_from_file(&path),
            Err(CameraError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loaded = CamfeedConfig::load_from_file("nonexistent_camfeed.toml").unwrap();
        assert_eq!(loaded, CamfeedConfig::default());
    }
}
