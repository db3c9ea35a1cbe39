//! Testing utilities for camfeed
//!
//! Hardware-free doubles: a camera driven by the test, a listener that
//! records what it receives, and synthetic sensor data.

pub mod manual_device;
pub mod recording_listener;
pub mod synthetic_data;

pub use manual_device::{phone_capabilities, DeviceCounters, ManualBackend, ManualDeviceHandle};
pub use recording_listener::{PreviewRecord, RecordingListener};
pub use synthetic_data::{
    fill_yv12, solid_yv12_frame, synthetic_jpeg, synthetic_picture, synthetic_yv12_frame,
};
