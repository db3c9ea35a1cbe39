//! Hand-cranked camera for tests.
//!
//! A [`ManualBackend`] owns any number of cameras. Each has a
//! [`ManualDeviceHandle`] the test keeps to push frames and captures into
//! the session at exactly the moments it wants, and to inspect what the
//! session asked of the device.

use crate::errors::CameraError;
use crate::platform::{CameraBackend, CameraDevice};
use crate::pool::{PlanarLayout, RawFrame};
use crate::session::FrameSink;
use crate::testing::synthetic_data::fill_yv12;
use crate::types::{DeviceCapabilities, DeviceInfo, DeviceParameters, Facing, FlashMode, Rotation, Size};
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest a stalled `stop_stream` waits for the test to let it finish.
const STALL_LIMIT: Duration = Duration::from_secs(10);

/// Capabilities of a typical phone sensor at test-friendly sizes.
pub fn phone_capabilities(facing: Facing, mount: Rotation) -> DeviceCapabilities {
    DeviceCapabilities {
        supported_preview_sizes: vec![Size::new(320, 240), Size::new(640, 480)],
        supported_capture_sizes: vec![Size::new(320, 240), Size::new(640, 480)],
        supported_flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto],
        can_autofocus: true,
        can_zoom: true,
        max_zoom: 10,
        facing,
        mount_orientation: mount,
        default_preview_size: Size::new(320, 240),
        default_capture_size: Size::new(640, 480),
    }
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    set_parameters: bool,
    trigger_capture: bool,
    autofocus: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCounters {
    pub opens: u32,
    pub parameter_updates: u32,
    pub captures_requested: u32,
    pub autofocus_requests: u32,
    pub autofocus_cancels: u32,
    pub frames_emitted: u64,
}

struct ManualState {
    info: DeviceInfo,
    caps: DeviceCapabilities,
    open: bool,
    queued: VecDeque<RawFrame>,
    sink: Option<FrameSink>,
    params: Option<DeviceParameters>,
    faults: Faults,
    counters: DeviceCounters,
    stop_gate: Option<Receiver<()>>,
    stopping: bool,
}

/// Test-side control of one manual camera.
#[derive(Clone)]
pub struct ManualDeviceHandle {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDeviceHandle {
    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self) -> DeviceInfo {
        self.lock().info.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().sink.is_some()
    }

    /// Buffers waiting for the driver to fill them.
    pub fn queued_buffers(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn parameters(&self) -> Option<DeviceParameters> {
        self.lock().params.clone()
    }

    pub fn counters(&self) -> DeviceCounters {
        self.lock().counters
    }

    /// Refuse to open, as if another process had the camera.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().faults.unavailable = unavailable;
    }

    pub fn fail_set_parameters(&self, fail: bool) {
        self.lock().faults.set_parameters = fail;
    }

    pub fn fail_capture_trigger(&self, fail: bool) {
        self.lock().faults.trigger_capture = fail;
    }

    pub fn fail_autofocus(&self, fail: bool) {
        self.lock().faults.autofocus = fail;
    }

    /// Make the next `stop_stream` block until the returned sender is
    /// dropped or signalled.
    pub fn stall_next_stop(&self) -> Sender<()> {
        let (tx, rx) = bounded(0);
        self.lock().stop_gate = Some(rx);
        tx
    }

    /// Inside a `stop_stream` call.
    pub fn is_stopping(&self) -> bool {
        self.lock().stopping
    }

    /// Take a queued buffer out as if the driver were filling it.
    pub fn hold_frame(&self) -> Option<RawFrame> {
        self.lock().queued.pop_front()
    }

    /// Hand a filled buffer to the session. Without a running stream the
    /// buffer goes back to the queue and `false` is returned.
    pub fn deliver(&self, frame: RawFrame) -> bool {
        let sink = {
            let mut state = self.lock();
            match state.sink.clone() {
                Some(sink) => {
                    state.counters.frames_emitted += 1;
                    sink
                }
                None => {
                    state.queued.push_back(frame);
                    return false;
                }
            }
        };
        sink.preview_frame(frame);
        true
    }

    /// Fill the next queued buffer with a synthetic picture and deliver it.
    /// `false` when no buffer is queued or the stream is not running.
    pub fn emit_frame(&self) -> bool {
        let (mut frame, layout, number) = {
            let mut state = self.lock();
            if state.sink.is_none() {
                return false;
            }
            let Some(size) = state.params.as_ref().map(|p| p.preview_size) else {
                return false;
            };
            let Some(frame) = state.queued.pop_front() else {
                return false;
            };
            (frame, PlanarLayout::yv12(size), state.counters.frames_emitted)
        };
        fill_yv12(number, &layout, frame.data_mut());
        self.deliver(frame)
    }

    /// Deliver a compressed capture result.
    pub fn emit_capture(&self, jpeg: Vec<u8>) -> bool {
        let Some(sink) = self.lock().sink.clone() else {
            return false;
        };
        sink.capture_result(Bytes::from(jpeg));
        true
    }

    /// Report that the hardware failed to take the picture.
    pub fn emit_capture_failure(&self, reason: &str) -> bool {
        let Some(sink) = self.lock().sink.clone() else {
            return false;
        };
        sink.capture_failed(reason);
        true
    }
}

struct ManualDevice {
    state: Arc<Mutex<ManualState>>,
}

impl ManualDevice {
    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CameraDevice for ManualDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.lock().caps.clone()
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), CameraError> {
        let mut state = self.lock();
        if state.faults.set_parameters {
            return Err(CameraError::ControlError("setParameters failed".to_string()));
        }
        state.params = Some(params.clone());
        state.counters.parameter_updates += 1;
        Ok(())
    }

    fn queue_buffer(&mut self, frame: RawFrame) {
        self.lock().queued.push_back(frame);
    }

    fn start_stream(&mut self, sink: FrameSink) -> Result<(), CameraError> {
        self.lock().sink = Some(sink);
        Ok(())
    }

    fn stop_stream(&mut self) {
        let gate = {
            let mut state = self.lock();
            state.stopping = true;
            state.stop_gate.take()
        };
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(STALL_LIMIT);
        }
        let mut state = self.lock();
        state.sink = None;
        state.stopping = false;
    }

    fn trigger_capture(&mut self) -> Result<(), CameraError> {
        let mut state = self.lock();
        if state.faults.trigger_capture {
            return Err(CameraError::ControlError("takePicture failed".to_string()));
        }
        state.counters.captures_requested += 1;
        Ok(())
    }

    fn trigger_autofocus(&mut self) -> Result<(), CameraError> {
        let mut state = self.lock();
        state.counters.autofocus_requests += 1;
        if state.faults.autofocus {
            return Err(CameraError::ControlError("autoFocus failed".to_string()));
        }
        Ok(())
    }

    fn cancel_autofocus(&mut self) -> Result<(), CameraError> {
        self.lock().counters.autofocus_cancels += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.queued.clear();
        state.sink = None;
        state.open = false;
    }
}

/// Backend over a fixed list of manual cameras.
#[derive(Default)]
pub struct ManualBackend {
    cameras: Vec<Arc<Mutex<ManualState>>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a camera; its id is its position.
    pub fn add_camera(&mut self, name: &str, caps: DeviceCapabilities) -> ManualDeviceHandle {
        let info = DeviceInfo {
            id: self.cameras.len(),
            name: name.to_string(),
            facing: caps.facing,
        };
        let state = Arc::new(Mutex::new(ManualState {
            info,
            caps,
            open: false,
            queued: VecDeque::new(),
            sink: None,
            params: None,
            faults: Faults::default(),
            counters: DeviceCounters::default(),
            stop_gate: None,
            stopping: false,
        }));
        self.cameras.push(state.clone());
        ManualDeviceHandle { state }
    }

    fn camera(&self, id: usize) -> Result<&Arc<Mutex<ManualState>>, CameraError> {
        self.cameras
            .get(id)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("no camera {}", id)))
    }
}

impl CameraBackend for ManualBackend {
    fn device_count(&self) -> usize {
        self.cameras.len()
    }

    fn device_info(&self, id: usize) -> Result<DeviceInfo, CameraError> {
        let camera = self.camera(id)?;
        let state = camera.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.info.clone())
    }

    fn open(&self, id: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let camera = self.camera(id)?;
        let mut state = camera.lock().unwrap_or_else(PoisonError::into_inner);
        if state.faults.unavailable {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} is unavailable",
                id
            )));
        }
        if state.open {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} is already open",
                id
            )));
        }
        state.open = true;
        state.counters.opens += 1;
        Ok(Box::new(ManualDevice {
            state: camera.clone(),
        }))
    }
}
