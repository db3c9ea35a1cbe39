//! Device session: lifecycle, negotiated parameters and the driver-facing sink.
//!
//! ```text
//! Closed --open()--> Open --start_streaming()--> Streaming
//!        <--close()--      <--stop_streaming()--
//! ```
//!
//! All mutable state lives in one [`Shared`] behind one mutex. Driver
//! callbacks and both workers lock it briefly and never across decoding,
//! drawing or a consumer callback.

use crate::config::CamfeedConfig;
use crate::errors::{BestEffort, CameraError};
use crate::geometry::{self, Transform};
use crate::pipeline::{Stage1Msg, Workers};
use crate::platform::{CameraBackend, CameraDevice, FrameListener};
use crate::pool::{BufferPool, PlanarLayout, RawFrame, SlotOwner, NUM_BUFFERS};
use crate::preferences::PreferenceStore;
use crate::sizing;
use crate::timing::FrameClock;
use crate::types::{
    DeviceCapabilities, DeviceParameters, DisplayInfo, Facing, FlashMode, PipelineStats,
    PixelFormat, SessionState, Size,
};
use bytes::Bytes;
use crossbeam_channel::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Everything negotiated with the device at `open()`.
#[derive(Debug, Clone)]
pub(crate) struct Negotiated {
    pub caps: DeviceCapabilities,
    pub params: DeviceParameters,
    pub transform: Transform,
}

pub(crate) struct Shared {
    pub state: SessionState,
    pub camera_id: usize,
    pub device: Option<Box<dyn CameraDevice>>,
    pub negotiated: Option<Negotiated>,
    pub pool: Option<BufferPool>,
    pub last_generation: u64,
    pub suppress_preview: bool,
    pub capture_in_flight: bool,
    /// Bumped on every `start_streaming`; capture results from an older
    /// stream are ignored.
    pub stream_epoch: u64,
    pub clock: FrameClock,
    pub stage1: Option<Sender<Stage1Msg>>,
    pub stats: PipelineStats,
}

impl Shared {
    pub fn is_delivering(&self) -> bool {
        self.state == SessionState::Streaming && !self.suppress_preview
    }

    /// The capture finished, delivered or not. Preview resumes if the
    /// stream is still running.
    pub fn finish_capture(&mut self, delivered: bool) {
        if !self.capture_in_flight {
            return;
        }
        self.capture_in_flight = false;
        if delivered {
            self.stats.captures_delivered += 1;
        } else {
            self.stats.captures_failed += 1;
        }
        if self.state == SessionState::Streaming {
            self.suppress_preview = false;
        }
    }
}

/// Give a raw buffer back to the driver, or park it idle when the device is
/// out of reach (stopping or closed).
pub(crate) fn return_to_driver(
    device: &mut Option<Box<dyn CameraDevice>>,
    pool: &mut BufferPool,
    slot: usize,
    frame: RawFrame,
) {
    match device.as_mut() {
        Some(device) => {
            pool.set_owner(slot, SlotOwner::Driver);
            device.queue_buffer(frame);
        }
        None => {
            let ts = pool.timestamp_ms(slot);
            pool.park(slot, frame, SlotOwner::Idle, ts);
        }
    }
}

/// Error for a control call that found no device. While open the device is
/// only missing because `stop_streaming` is stopping the driver.
fn unreachable_device(state: SessionState, what: &str) -> CameraError {
    match state {
        SessionState::Closed => CameraError::InvalidState(format!("{} while closed", what)),
        _ => CameraError::NotReady(format!("{} while the stream is stopping", what)),
    }
}

pub(crate) struct Core {
    shared: Mutex<Shared>,
    pub listener: Arc<dyn FrameListener>,
    pub config: CamfeedConfig,
}

impl Core {
    /// A panicking consumer must not wedge the driver, so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Driver-side entry point into a streaming session.
///
/// Cheap to clone. Both methods only lock briefly and enqueue.
#[derive(Clone)]
pub struct FrameSink {
    core: Arc<Core>,
    epoch: u64,
}

impl FrameSink {
    /// A filled preview buffer. It is always queued to the decode worker
    /// while a stream is running; the worker recycles it if preview is
    /// suppressed by then.
    pub fn preview_frame(&self, frame: RawFrame) {
        let mut guard = self.core.lock();
        let shared = &mut *guard;

        let Some(pool) = shared.pool.as_mut() else {
            log::debug!("preview frame after close, dropping");
            shared.stats.stale_dropped += 1;
            return;
        };
        let slot = match pool.index_of(&frame) {
            Ok(slot) => slot,
            Err(e) => {
                log::debug!("dropping preview frame: {}", e);
                shared.stats.stale_dropped += 1;
                return;
            }
        };

        let Some(stage1) = shared.stage1.as_ref() else {
            shared.stats.suppressed_recycled += 1;
            return_to_driver(&mut shared.device, pool, slot, frame);
            return;
        };

        let buffer = frame.buffer_ref();
        pool.park(slot, frame, SlotOwner::Stage1, shared.clock.elapsed_ms());
        if stage1.send(Stage1Msg::ProcessPreview(buffer)).is_err() {
            log::warn!("decode worker gone, recycling slot {}", slot);
            if let Some(frame) = pool.take_raw(slot) {
                return_to_driver(&mut shared.device, pool, slot, frame);
            }
        }
    }

    /// The compressed result of a still capture.
    pub fn capture_result(&self, jpeg: Bytes) {
        let mut shared = self.core.lock();
        if shared.stream_epoch != self.epoch || !shared.capture_in_flight {
            log::debug!("unexpected capture result ({} bytes), dropping", jpeg.len());
            return;
        }
        let sent = shared
            .stage1
            .as_ref()
            .map(|tx| tx.send(Stage1Msg::ProcessCapture(jpeg)).is_ok())
            .unwrap_or(false);
        if !sent {
            log::warn!("capture result arrived with no decode worker");
            shared.finish_capture(false);
        }
    }

    /// Report a failed capture so the session stops waiting for it.
    pub fn capture_failed(&self, reason: &str) {
        let mut shared = self.core.lock();
        if shared.stream_epoch == self.epoch {
            log::warn!("capture failed: {}", reason);
            shared.finish_capture(false);
        }
    }
}

/// One camera, its buffers and its two workers.
///
/// All methods take `&self`; the session can be shared between the control
/// thread and a gesture handler.
pub struct Session {
    core: Arc<Core>,
    backend: Box<dyn CameraBackend>,
    display: DisplayInfo,
    prefs: Box<dyn PreferenceStore>,
    workers: Mutex<Option<Workers>>,
}

impl Session {
    /// Build a closed session. The camera is the persisted choice if it
    /// still exists, else the first front-facing one, else device 0.
    pub fn new(
        backend: Box<dyn CameraBackend>,
        listener: Arc<dyn FrameListener>,
        display: DisplayInfo,
        prefs: Box<dyn PreferenceStore>,
        config: CamfeedConfig,
    ) -> Result<Self, CameraError> {
        config.validate()?;
        let camera_id = backend.pick_device(prefs.camera_id());
        log::debug!("session camera {}", camera_id);

        let shared = Shared {
            state: SessionState::Closed,
            camera_id,
            device: None,
            negotiated: None,
            pool: None,
            last_generation: 0,
            suppress_preview: true,
            capture_in_flight: false,
            stream_epoch: 0,
            clock: FrameClock::new(),
            stage1: None,
            stats: PipelineStats::default(),
        };
        Ok(Self {
            core: Arc::new(Core {
                shared: Mutex::new(shared),
                listener,
                config,
            }),
            backend,
            display,
            prefs,
            workers: Mutex::new(None),
        })
    }

    fn workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    pub fn camera_id(&self) -> usize {
        self.core.lock().camera_id
    }

    pub fn display(&self) -> DisplayInfo {
        self.display
    }

    /// Open the selected device, negotiate sizes and allocate buffers.
    pub fn open(&self) -> Result<(), CameraError> {
        let mut shared = self.core.lock();
        if shared.state != SessionState::Closed {
            return Err(CameraError::InvalidState(format!(
                "open() while {}",
                shared.state.as_str()
            )));
        }

        let camera_id = shared.camera_id;
        let mut device = self.backend.open(camera_id)?;
        let caps = device.capabilities();

        let config = &self.core.config;
        let target = sizing::preview_target_area(&self.display, config.preview.area_divisor);
        let preview_size = sizing::select_preview_size(&caps.supported_preview_sizes, target)
            .unwrap_or(caps.default_preview_size);
        let capture_size =
            sizing::select_capture_size(&caps.supported_capture_sizes, config.capture.target_area)
                .unwrap_or(caps.default_capture_size);

        let flash_mode = if caps.supported_flash_modes.contains(&FlashMode::Off) {
            Some(FlashMode::Off)
        } else {
            caps.supported_flash_modes.first().copied()
        };
        let params = DeviceParameters {
            format: PixelFormat::Yv12,
            preview_size,
            capture_size,
            flash_mode,
            zoom: 0,
        };
        if let Err(e) = device.set_parameters(&params) {
            device.close();
            return Err(e);
        }

        let transform = geometry::resolve(
            caps.facing,
            caps.mount_orientation,
            self.display.rotation,
            preview_size,
        );

        shared.last_generation += 1;
        let mut pool = BufferPool::allocate(
            shared.last_generation,
            NUM_BUFFERS,
            PlanarLayout::yv12(preview_size),
            transform.output_size(),
        );
        for frame in pool.drain_idle() {
            device.queue_buffer(frame);
        }

        log::info!(
            "opened camera {} ({:?}): preview {}, capture {}, rotate {}{}",
            camera_id,
            caps.facing,
            preview_size,
            capture_size,
            transform.rotation().degrees(),
            if transform.is_flipped() { " flipped" } else { "" }
        );

        shared.device = Some(device);
        shared.negotiated = Some(Negotiated {
            caps,
            params,
            transform,
        });
        shared.pool = Some(pool);
        shared.suppress_preview = true;
        shared.capture_in_flight = false;
        shared.state = SessionState::Open;
        Ok(())
    }

    /// Spawn the workers and start the driver stream.
    pub fn start_streaming(&self) -> Result<(), CameraError> {
        let mut workers = self.workers();
        let mut guard = self.core.lock();
        match guard.state {
            SessionState::Open => {}
            state => {
                return Err(CameraError::InvalidState(format!(
                    "start_streaming() while {}",
                    state.as_str()
                )))
            }
        }

        let (spawned, stage1) = Workers::spawn(self.core.clone())?;

        let shared = &mut *guard;
        shared.stream_epoch += 1;
        shared.clock = FrameClock::new();
        shared.stage1 = Some(stage1);
        shared.suppress_preview = false;
        shared.state = SessionState::Streaming;

        let sink = FrameSink {
            core: self.core.clone(),
            epoch: shared.stream_epoch,
        };
        let can_autofocus = shared
            .negotiated
            .as_ref()
            .map(|n| n.caps.can_autofocus)
            .unwrap_or(false);

        let started = match shared.device.as_mut() {
            Some(device) => {
                if let Some(pool) = shared.pool.as_mut() {
                    for frame in pool.drain_idle() {
                        device.queue_buffer(frame);
                    }
                }
                device.start_stream(sink)
            }
            None => Err(CameraError::InvalidState("no device".to_string())),
        };

        if let Err(e) = started {
            log::error!("failed to start stream: {}", e);
            shared.stage1 = None;
            shared.suppress_preview = true;
            shared.state = SessionState::Open;
            drop(guard);
            spawned.shutdown();
            return Err(e);
        }

        if can_autofocus {
            if let Some(device) = shared.device.as_mut() {
                device.trigger_autofocus().or_log("initial autofocus");
            }
        }

        log::info!("streaming camera {}", shared.camera_id);
        *workers = Some(spawned);
        Ok(())
    }

    /// Stop the stream and join both workers. Pending preview work is
    /// recycled, a pending capture is finished first. No listener callback
    /// runs after this returns. Does nothing unless streaming.
    pub fn stop_streaming(&self) {
        let mut workers = self.workers();
        let device = {
            let mut shared = self.core.lock();
            if shared.state != SessionState::Streaming {
                return;
            }
            shared.suppress_preview = true;
            shared.state = SessionState::Open;
            shared.stage1 = None;
            shared.device.take()
        };

        // Outside the lock: a driver thread may be waiting on it.
        let device = device.map(|mut device| {
            device.stop_stream();
            device
        });
        self.core.lock().device = device;

        if let Some(spawned) = workers.take() {
            spawned.shutdown();
        }

        let mut guard = self.core.lock();
        let shared = &mut *guard;
        if shared.capture_in_flight {
            log::warn!("capture abandoned by stop");
            shared.finish_capture(false);
        }
        if let (Some(device), Some(pool)) = (shared.device.as_mut(), shared.pool.as_mut()) {
            for frame in pool.drain_idle() {
                device.queue_buffer(frame);
            }
        }
        log::info!("stopped camera {}", shared.camera_id);
    }

    /// Close the device and release every buffer. Stops streaming first.
    pub fn close(&self) {
        self.stop_streaming();
        let mut shared = self.core.lock();
        if shared.state == SessionState::Closed {
            return;
        }
        if let Some(mut device) = shared.device.take() {
            device.close();
        }
        if let Some(mut pool) = shared.pool.take() {
            pool.release();
        }
        shared.negotiated = None;
        shared.suppress_preview = true;
        shared.state = SessionState::Closed;
        log::info!("closed camera {}", shared.camera_id);
    }

    /// Open if needed, then stream.
    pub fn start(&self) -> Result<(), CameraError> {
        if self.state() == SessionState::Closed {
            self.open()?;
        }
        self.start_streaming()
    }

    /// Stop streaming and close.
    pub fn stop(&self) {
        self.close();
    }

    /// Ask the driver for a still capture. Preview delivery pauses until the
    /// capture is delivered or fails.
    pub fn take_capture(&self) -> Result<(), CameraError> {
        let mut guard = self.core.lock();
        let shared = &mut *guard;
        if shared.state != SessionState::Streaming {
            return Err(CameraError::NotReady(format!(
                "capture while {}",
                shared.state.as_str()
            )));
        }
        if shared.capture_in_flight {
            return Err(CameraError::NotReady("capture already in flight".to_string()));
        }
        let Some(device) = shared.device.as_mut() else {
            return Err(CameraError::NotReady("no device".to_string()));
        };

        shared.capture_in_flight = true;
        shared.suppress_preview = true;
        if let Err(e) = device.trigger_capture() {
            shared.capture_in_flight = false;
            shared.suppress_preview = false;
            return Err(CameraError::NotReady(format!("capture trigger failed: {}", e)));
        }
        log::debug!("capture triggered");
        Ok(())
    }

    /// Streaming with no capture outstanding.
    pub fn is_capturable(&self) -> bool {
        let shared = self.core.lock();
        shared.state == SessionState::Streaming && !shared.capture_in_flight
    }

    fn with_negotiated<T>(&self, f: impl FnOnce(&Negotiated) -> T) -> Option<T> {
        self.core.lock().negotiated.as_ref().map(f)
    }

    /// Change a parameter and push the whole block to the device. The
    /// previous parameters are restored if the device rejects them.
    fn update_parameters(
        &self,
        what: &str,
        update: impl FnOnce(&DeviceCapabilities, &mut DeviceParameters) -> Result<bool, CameraError>,
    ) -> Result<(), CameraError> {
        let mut guard = self.core.lock();
        let shared = &mut *guard;
        let (Some(negotiated), Some(device)) = (shared.negotiated.as_mut(), shared.device.as_mut())
        else {
            return Err(unreachable_device(shared.state, what));
        };

        let previous = negotiated.params.clone();
        if !update(&negotiated.caps, &mut negotiated.params)? {
            return Ok(());
        }
        if let Err(e) = device.set_parameters(&negotiated.params) {
            negotiated.params = previous;
            return Err(CameraError::ControlError(format!("{}: {}", what, e)));
        }
        log::debug!("{} applied", what);
        Ok(())
    }

    pub fn capabilities(&self) -> Option<DeviceCapabilities> {
        self.with_negotiated(|n| n.caps.clone())
    }

    pub fn can_autofocus(&self) -> bool {
        self.with_negotiated(|n| n.caps.can_autofocus).unwrap_or(false)
    }

    pub fn can_zoom(&self) -> bool {
        self.with_negotiated(|n| n.caps.can_zoom).unwrap_or(false)
    }

    pub fn max_zoom(&self) -> Option<u32> {
        self.with_negotiated(|n| n.caps.max_zoom)
    }

    pub fn zoom(&self) -> Option<u32> {
        self.with_negotiated(|n| n.params.zoom)
    }

    /// Set the zoom step, clamped to `[0, max_zoom]`. Returns the applied step.
    pub fn set_zoom(&self, zoom: u32) -> Result<u32, CameraError> {
        let mut applied = 0;
        self.update_parameters("zoom", |caps, params| {
            if !caps.can_zoom {
                return Err(CameraError::Unsupported("device cannot zoom".to_string()));
            }
            applied = zoom.min(caps.max_zoom);
            if applied == params.zoom {
                return Ok(false);
            }
            params.zoom = applied;
            Ok(true)
        })?;
        Ok(applied)
    }

    /// Move the zoom by `delta` steps, clamped.
    pub fn step_zoom(&self, delta: i32) -> Result<u32, CameraError> {
        let current = self
            .zoom()
            .ok_or_else(|| CameraError::InvalidState("zoom while closed".to_string()))?;
        let target = current.saturating_add_signed(delta);
        self.set_zoom(target)
    }

    pub fn supported_flash_modes(&self) -> Vec<FlashMode> {
        self.with_negotiated(|n| n.caps.supported_flash_modes.clone())
            .unwrap_or_default()
    }

    pub fn flash_mode(&self) -> Option<FlashMode> {
        self.with_negotiated(|n| n.params.flash_mode).flatten()
    }

    pub fn set_flash_mode(&self, mode: FlashMode) -> Result<(), CameraError> {
        self.update_parameters("flash mode", |caps, params| {
            if !caps.supported_flash_modes.contains(&mode) {
                return Err(CameraError::Unsupported(format!(
                    "flash mode {} not supported",
                    mode.as_str()
                )));
            }
            if params.flash_mode == Some(mode) {
                return Ok(false);
            }
            params.flash_mode = Some(mode);
            Ok(true)
        })
    }

    /// Advance to the next supported flash mode. `false` when the device has
    /// no flash, the session is closed or the device refused.
    pub fn cycle_flash_mode(&self) -> bool {
        let modes = self.supported_flash_modes();
        if modes.is_empty() {
            return false;
        }
        let next = match self.flash_mode().and_then(|m| modes.iter().position(|&x| x == m)) {
            Some(i) => modes[(i + 1) % modes.len()],
            None => modes[0],
        };
        match self.set_flash_mode(next) {
            Ok(()) => {
                log::debug!("flash mode -> {}", next.as_str());
                true
            }
            Err(e) => {
                log::warn!("cycle flash mode: {}", e);
                false
            }
        }
    }

    /// Best-effort autofocus; callers usually discard the result with
    /// [`BestEffort::or_log`].
    pub fn trigger_autofocus(&self) -> Result<(), CameraError> {
        let mut shared = self.core.lock();
        let can = shared
            .negotiated
            .as_ref()
            .map(|n| n.caps.can_autofocus)
            .unwrap_or(false);
        if !can {
            return Err(CameraError::Unsupported("device cannot autofocus".to_string()));
        }
        let state = shared.state;
        match shared.device.as_mut() {
            Some(device) => device.trigger_autofocus(),
            None => Err(unreachable_device(state, "autofocus")),
        }
    }

    pub fn cancel_autofocus(&self) -> Result<(), CameraError> {
        let mut shared = self.core.lock();
        let state = shared.state;
        match shared.device.as_mut() {
            Some(device) => device.cancel_autofocus(),
            None => Err(unreachable_device(state, "cancel autofocus")),
        }
    }

    pub fn can_change_camera(&self) -> bool {
        self.backend.device_count() > 1
    }

    /// Switch to the next device, restarting in whatever state the session
    /// was in, and persist the choice. Returns the new device id.
    pub fn change_camera(&self) -> Result<usize, CameraError> {
        let count = self.backend.device_count();
        if count < 2 {
            return Err(CameraError::Unsupported("only one camera".to_string()));
        }
        let was = self.state();
        self.stop();

        let next = {
            let mut shared = self.core.lock();
            shared.camera_id = (shared.camera_id + 1) % count;
            shared.camera_id
        };
        self.prefs.set_camera_id(next).or_log("persist camera choice");
        log::info!("changed to camera {}", next);

        match was {
            SessionState::Streaming => self.start()?,
            SessionState::Open => self.open()?,
            SessionState::Closed => {}
        }
        Ok(next)
    }

    /// Facing of the selected device, from the backend when closed.
    pub fn is_front_facing(&self) -> bool {
        if let Some(facing) = self.with_negotiated(|n| n.caps.facing) {
            return facing == Facing::Front;
        }
        self.backend
            .device_info(self.camera_id())
            .map(|info| info.facing == Facing::Front)
            .unwrap_or(false)
    }

    pub fn preview_size(&self) -> Option<Size> {
        self.with_negotiated(|n| n.params.preview_size)
    }

    pub fn capture_size(&self) -> Option<Size> {
        self.with_negotiated(|n| n.params.capture_size)
    }

    /// Orientation correction applied to preview frames.
    pub fn transform(&self) -> Option<Transform> {
        self.with_negotiated(|n| n.transform.clone())
    }

    pub fn stats(&self) -> PipelineStats {
        self.core.lock().stats
    }

    /// Buffers currently held by a worker or the consumer.
    pub fn in_flight(&self) -> usize {
        self.core
            .lock()
            .pool
            .as_ref()
            .map(BufferPool::in_flight)
            .unwrap_or(0)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
