//! Shared value types: sizes, orientations, capabilities and negotiated parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Area in pixels. `u64` so 8K sensors cannot overflow.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn swapped(&self) -> Self {
        Self::new(self.height, self.width)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which way the sensor faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Front,
    Back,
}

/// Quarter-turn rotation, used both for sensor mount orientation and display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Accepts only exact quarter turns.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashMode {
    Off,
    On,
    Auto,
}

impl FlashMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashMode::Off => "off",
            FlashMode::On => "on",
            FlashMode::Auto => "auto",
        }
    }
}

/// Raw frame layout negotiated with the driver. Only planar 4:2:0 is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane, then V, then U; every plane stride padded to 16 bytes.
    Yv12,
}

/// What the device reports about itself before it is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub supported_preview_sizes: Vec<Size>,
    pub supported_capture_sizes: Vec<Size>,
    pub supported_flash_modes: Vec<FlashMode>,
    pub can_autofocus: bool,
    pub can_zoom: bool,
    pub max_zoom: u32,
    pub facing: Facing,
    pub mount_orientation: Rotation,
    /// Sizes the device uses when nothing else is negotiated.
    pub default_preview_size: Size,
    pub default_capture_size: Size,
}

/// A device as listed by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: usize,
    pub name: String,
    pub facing: Facing,
}

/// Parameter block pushed to the driver on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceParameters {
    pub format: PixelFormat,
    pub preview_size: Size,
    pub capture_size: Size,
    pub flash_mode: Option<FlashMode>,
    pub zoom: u32,
}

/// Display the preview is shown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
}

impl DisplayInfo {
    pub fn new(width: u32, height: u32, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            rotation,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Closed,
    Open,
    Streaming,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Open => "open",
            SessionState::Streaming => "streaming",
        }
    }
}

/// Counters kept per session, read with [`crate::Session::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub previews_delivered: u64,
    pub stale_dropped: u64,
    pub suppressed_recycled: u64,
    pub decode_failures: u64,
    pub captures_delivered: u64,
    pub captures_failed: u64,
}
