//! Software camera that streams generated frames from its own thread.
//!
//! Used by the CLI and for demos on machines without a sensor. Frames are
//! produced at a fixed rate into whatever buffers the session has queued;
//! with no buffer queued, the tick is skipped.

use crate::errors::CameraError;
use crate::platform::{CameraBackend, CameraDevice};
use crate::pool::{PlanarLayout, RawFrame};
use crate::session::FrameSink;
use crate::testing::synthetic_data::{fill_yv12, synthetic_jpeg};
use crate::types::{DeviceCapabilities, DeviceInfo, DeviceParameters, Facing, FlashMode, Rotation, Size};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Description of one synthetic camera.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub name: String,
    pub caps: DeviceCapabilities,
    pub fps: u32,
}

impl SyntheticCamera {
    /// Back sensor mounted landscape-right, like most phones.
    pub fn phone_back() -> Self {
        Self {
            name: "synthetic back camera".to_string(),
            caps: DeviceCapabilities {
                supported_preview_sizes: vec![
                    Size::new(1920, 1080),
                    Size::new(1280, 720),
                    Size::new(640, 480),
                    Size::new(320, 240),
                ],
                supported_capture_sizes: vec![
                    Size::new(640, 480),
                    Size::new(1280, 960),
                    Size::new(1920, 1080),
                    Size::new(2592, 1944),
                ],
                supported_flash_modes: vec![FlashMode::Off, FlashMode::On, FlashMode::Auto],
                can_autofocus: true,
                can_zoom: true,
                max_zoom: 30,
                facing: Facing::Back,
                mount_orientation: Rotation::Deg90,
                default_preview_size: Size::new(640, 480),
                default_capture_size: Size::new(1280, 960),
            },
            fps: 30,
        }
    }

    /// Fixed-focus front sensor without flash or zoom.
    pub fn phone_front() -> Self {
        Self {
            name: "synthetic front camera".to_string(),
            caps: DeviceCapabilities {
                supported_preview_sizes: vec![Size::new(640, 480), Size::new(320, 240)],
                supported_capture_sizes: vec![Size::new(640, 480), Size::new(1280, 960)],
                supported_flash_modes: Vec::new(),
                can_autofocus: false,
                can_zoom: false,
                max_zoom: 0,
                facing: Facing::Front,
                mount_orientation: Rotation::Deg270,
                default_preview_size: Size::new(640, 480),
                default_capture_size: Size::new(640, 480),
            },
            fps: 30,
        }
    }
}

#[derive(Default)]
struct DriverState {
    queued: VecDeque<RawFrame>,
    params: Option<DeviceParameters>,
    capture_requested: bool,
    frame_number: u64,
}

struct SyntheticDevice {
    camera: SyntheticCamera,
    state: Arc<Mutex<DriverState>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    opened: Arc<AtomicBool>,
}

fn lock(state: &Mutex<DriverState>) -> MutexGuard<'_, DriverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn stream_loop(state: Arc<Mutex<DriverState>>, stop: Arc<AtomicBool>, sink: FrameSink, fps: u32) {
    let interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(interval);

        let (frame, params, capture, number) = {
            let mut s = lock(&state);
            s.frame_number += 1;
            let capture = std::mem::take(&mut s.capture_requested);
            (s.queued.pop_front(), s.params.clone(), capture, s.frame_number)
        };
        let Some(params) = params else {
            continue;
        };

        if let Some(mut frame) = frame {
            fill_yv12(number, &PlanarLayout::yv12(params.preview_size), frame.data_mut());
            sink.preview_frame(frame);
        }

        if capture {
            match synthetic_jpeg(number, params.capture_size) {
                Ok(jpeg) => sink.capture_result(Bytes::from(jpeg)),
                Err(e) => sink.capture_failed(&e.to_string()),
            }
        }
    }
}

impl CameraDevice for SyntheticDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.camera.caps.clone()
    }

    fn set_parameters(&mut self, params: &DeviceParameters) -> Result<(), CameraError> {
        if !self.camera.caps.supported_preview_sizes.contains(&params.preview_size)
            && params.preview_size != self.camera.caps.default_preview_size
        {
            return Err(CameraError::ControlError(format!(
                "preview size {} not supported",
                params.preview_size
            )));
        }
        log::debug!(
            "synthetic: preview {} capture {} zoom {} flash {:?}",
            params.preview_size,
            params.capture_size,
            params.zoom,
            params.flash_mode.map(|m| m.as_str())
        );
        lock(&self.state).params = Some(params.clone());
        Ok(())
    }

    fn queue_buffer(&mut self, frame: RawFrame) {
        lock(&self.state).queued.push_back(frame);
    }

    fn start_stream(&mut self, sink: FrameSink) -> Result<(), CameraError> {
        if self.thread.is_some() {
            return Err(CameraError::InvalidState("already streaming".to_string()));
        }
        self.stop.store(false, Ordering::Relaxed);
        let state = self.state.clone();
        let stop = self.stop.clone();
        let fps = self.camera.fps;
        let handle = std::thread::Builder::new()
            .name("camfeed-synthetic".to_string())
            .spawn(move || stream_loop(state, stop, sink, fps))
            .map_err(|e| CameraError::DeviceUnavailable(format!("spawn failed: {e}")))?;
        self.thread = Some(handle);
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("synthetic stream thread panicked");
            }
        }
    }

    fn trigger_capture(&mut self) -> Result<(), CameraError> {
        if self.thread.is_none() {
            return Err(CameraError::InvalidState("not streaming".to_string()));
        }
        lock(&self.state).capture_requested = true;
        Ok(())
    }

    fn trigger_autofocus(&mut self) -> Result<(), CameraError> {
        if !self.camera.caps.can_autofocus {
            return Err(CameraError::Unsupported("fixed focus".to_string()));
        }
        log::debug!("synthetic: autofocus");
        Ok(())
    }

    fn cancel_autofocus(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    fn close(&mut self) {
        self.stop_stream();
        lock(&self.state).queued.clear();
        self.opened.store(false, Ordering::Relaxed);
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Backend over a list of synthetic cameras.
pub struct SyntheticBackend {
    cameras: Vec<(SyntheticCamera, Arc<AtomicBool>)>,
}

impl SyntheticBackend {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            cameras: cameras
                .into_iter()
                .map(|camera| (camera, Arc::new(AtomicBool::new(false))))
                .collect(),
        }
    }

    /// A back and a front camera.
    pub fn phone() -> Self {
        Self::new(vec![SyntheticCamera::phone_back(), SyntheticCamera::phone_front()])
    }
}

impl CameraBackend for SyntheticBackend {
    fn device_count(&self) -> usize {
        self.cameras.len()
    }

    fn device_info(&self, id: usize) -> Result<DeviceInfo, CameraError> {
        let (camera, _) = self
            .cameras
            .get(id)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("no camera {}", id)))?;
        Ok(DeviceInfo {
            id,
            name: camera.name.clone(),
            facing: camera.caps.facing,
        })
    }

    fn open(&self, id: usize) -> Result<Box<dyn CameraDevice>, CameraError> {
        let (camera, opened) = self
            .cameras
            .get(id)
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("no camera {}", id)))?;
        if opened.swap(true, Ordering::SeqCst) {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} is already open",
                id
            )));
        }
        log::debug!("synthetic: open {}", camera.name);
        Ok(Box::new(SyntheticDevice {
            camera: camera.clone(),
            state: Arc::new(Mutex::new(DriverState::default())),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
            opened: opened.clone(),
        }))
    }
}
