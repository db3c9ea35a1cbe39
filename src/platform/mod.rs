//! Driver-facing seams.
//!
//! A [`CameraBackend`] lists and opens devices; a [`CameraDevice`] is one
//! open device. Frames and capture results flow back through the
//! [`FrameSink`] handed to [`CameraDevice::start_stream`].
//!
//! Device methods are called with the session lock held, so a device must
//! never call into its sink synchronously from one of its own methods. It
//! may only call the sink from its own thread (or a test's), and it must
//! drop the sink in `stop_stream`.

pub mod synthetic;

pub use synthetic::{SyntheticBackend, SyntheticCamera};

use crate::errors::CameraError;
use crate::pool::RawFrame;
use crate::session::FrameSink;
use crate::types::{DeviceCapabilities, DeviceInfo, DeviceParameters, Facing};
use image::RgbImage;

pub trait CameraBackend: Send + Sync {
    fn device_count(&self) -> usize;

    fn device_info(&self, id: usize) -> Result<DeviceInfo, CameraError>;

    fn open(&self, id: usize) -> Result<Box<dyn CameraDevice>, CameraError>;

    fn list_devices(&self) -> Vec<DeviceInfo> {
        (0..self.device_count())
            .filter_map(|id| self.device_info(id).ok())
            .collect()
    }

    /// Persisted choice if still valid, else the first front-facing
    /// device, else device 0.
    fn pick_device(&self, preferred: Option<usize>) -> usize {
        let count = self.device_count();
        if let Some(id) = preferred.filter(|&id| id < count) {
            return id;
        }
        self.list_devices()
            .iter()
            .find(|info| info.facing == Facing::Front)
            .map(|info| info.id)
            .unwrap_or(0)
    }
}

pub trait CameraDevice: Send {
    fn capabilities(&self) -> DeviceCapabilities;

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), CameraError>;

    /// Hand an empty buffer to the driver. It comes back filled through
    /// [`FrameSink::preview_frame`].
    fn queue_buffer(&mut self, frame: RawFrame);

    fn start_stream(&mut self, sink: FrameSink) -> Result<(), CameraError>;

    /// Stop pushing frames and drop the sink. Called without the session lock.
    fn stop_stream(&mut self);

    /// Start a still capture; the result arrives through
    /// [`FrameSink::capture_result`].
    fn trigger_capture(&mut self) -> Result<(), CameraError>;

    fn trigger_autofocus(&mut self) -> Result<(), CameraError>;

    fn cancel_autofocus(&mut self) -> Result<(), CameraError>;

    /// Release the device. Queued buffers are dropped.
    fn close(&mut self);
}

/// Consumer of finished images. Both callbacks run on the delivery worker.
pub trait FrameListener: Send + Sync {
    /// `image` is only borrowed for the duration of the call.
    fn on_preview(&self, image: &RgbImage, timestamp_ms: u64);

    fn on_capture(&self, image: RgbImage);
}
