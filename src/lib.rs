//! camfeed: a camera frame pipeline with a bounded buffer pool
//!
//! Raw sensor frames are decoded, orientation-corrected and delivered to a
//! consumer through two single-worker stages, while a fixed pool of three
//! buffers circulates between the driver and the pipeline. Still captures
//! interleave with the preview stream.
//!
//! # Features
//! - Fixed three-buffer pool with generation tracking across restarts
//! - Rotation and mirroring derived from sensor mount, facing and display rotation
//! - Preview and capture size negotiation
//! - Capture decoding that backs off in resolution under memory pressure
//! - Pinch-to-zoom and tap-to-focus gesture handling
//! - Hardware-free test doubles in [`testing`]
//!
//! # Usage
//! ```rust,no_run
//! use camfeed::platform::SyntheticBackend;
//! use camfeed::preferences::MemoryPreferenceStore;
//! use camfeed::testing::RecordingListener;
//! use camfeed::{CamfeedConfig, DisplayInfo, Rotation, Session};
//! use std::sync::Arc;
//!
//! let listener = Arc::new(RecordingListener::new());
//! let session = Session::new(
//!     Box::new(SyntheticBackend::phone()),
//!     listener.clone(),
//!     DisplayInfo::new(1080, 1920, Rotation::Deg0),
//!     Box::new(MemoryPreferenceStore::new()),
//!     CamfeedConfig::default(),
//! )?;
//! session.start()?;
//! session.take_capture()?;
//! session.stop();
//! # Ok::<(), camfeed::CameraError>(())
//! ```
pub mod config;
pub mod convert;
pub mod errors;
pub mod geometry;
pub mod interaction;
mod pipeline;
pub mod platform;
pub mod pool;
pub mod preferences;
pub mod session;
pub mod sizing;
pub mod timing;
pub mod types;

// Testing utilities - hardware-free doubles and synthetic data
pub mod testing;

// Re-exports for convenience
pub use config::CamfeedConfig;
pub use errors::{BestEffort, CameraError};
pub use geometry::Transform;
pub use interaction::{GestureAction, GestureEvent, InteractionController};
pub use platform::{CameraBackend, CameraDevice, FrameListener};
pub use pool::{BufferRef, RawFrame};
pub use session::{FrameSink, Session};
pub use types::{
    DeviceCapabilities, DeviceInfo, DeviceParameters, DisplayInfo, Facing, FlashMode,
    PipelineStats, PixelFormat, Rotation, SessionState, Size,
};

/// Initialize logging for the camera pipeline
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camfeed=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        assert_eq!(NAME, "camfeed");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
