//! Persisted camera choice.
//!
//! A single integer, the last-chosen device id, under the `camfeed`
//! namespace. The file store keeps it in a small TOML document.

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const NAMESPACE: &str = "camfeed";
pub const CAMERA_ID_KEY: &str = "camera_id";

pub trait PreferenceStore: Send + Sync {
    fn camera_id(&self) -> Option<usize>;
    fn set_camera_id(&self, id: usize) -> Result<(), CameraError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default)]
    camfeed: BTreeMap<String, i64>,
}

/// Preferences stored in a TOML file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<PreferenceFile, CameraError> {
        if !self.path.exists() {
            return Ok(PreferenceFile::default());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read preferences: {}", e)))?;
        toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse preferences: {}", e)))
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn camera_id(&self) -> Option<usize> {
        match self.read() {
            Ok(file) => file
                .camfeed
                .get(CAMERA_ID_KEY)
                .and_then(|&id| usize::try_from(id).ok()),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }

    fn set_camera_id(&self, id: usize) -> Result<(), CameraError> {
        // An unreadable file is replaced rather than blocking the write.
        let mut file = self.read().unwrap_or_default();
        file.camfeed.insert(CAMERA_ID_KEY.to_string(), id as i64);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CameraError::ConfigError(format!("Failed to create preference directory: {}", e))
                })?;
            }
        }
        let toml_string = toml::to_string_pretty(&file)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize preferences: {}", e)))?;
        fs::write(&self.path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write preferences: {}", e)))?;
        log::debug!("{}.{} = {} saved to {:?}", NAMESPACE, CAMERA_ID_KEY, id, self.path);
        Ok(())
    }
}

/// In-process preferences, for tests and hosts without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    camera_id: Mutex<Option<usize>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera_id(id: usize) -> Self {
        Self {
            camera_id: Mutex::new(Some(id)),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn camera_id(&self) -> Option<usize> {
        *self.camera_id.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_camera_id(&self, id: usize) -> Result<(), CameraError> {
        *self.camera_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs").join("camfeed.toml"));
        assert_eq!(store.camera_id(), None);
        store.set_camera_id(2).unwrap();
        assert_eq!(store.camera_id(), Some(2));

        let contents = fs::read_to_string(store.path()).unwrap();
        assert!(contents.contains("[camfeed]"));
        assert!(contents.contains("camera_id = 2"));
    }

    #[test]
    fn test_corrupt_file_reads_as_unset_and_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camfeed.toml");
        fs::write(&path, "not [valid toml").unwrap();
        let store = FilePreferenceStore::new(&path);
        assert_eq!(store.camera_id(), None);
        store.set_camera_id(1).unwrap();
        assert_eq!(store.camera_id(), Some(1));
    }

    #[test]
    fn test_negative_id_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camfeed.toml");
        fs::write(&path, "[camfeed]\ncamera_id = -1\n").unwrap();
        assert_eq!(FilePreferenceStore::new(&path).camera_id(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryPreferenceStore::with_camera_id(3);
        assert_eq!(store.camera_id(), Some(3));
        store.set_camera_id(0).unwrap();
        assert_eq!(store.camera_id(), Some(0));
    }
}
