//! Listener that records deliveries and lets tests wait for them.

use crate::platform::FrameListener;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// What the listener saw of one preview image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRecord {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    pub top_left: [u8; 3],
}

/// Longest a held callback waits before letting go on its own, so a broken
/// test cannot hang the delivery worker forever.
const HOLD_LIMIT: Duration = Duration::from_secs(10);

pub struct RecordingListener {
    previews_tx: Sender<PreviewRecord>,
    previews_rx: Receiver<PreviewRecord>,
    captures_tx: Sender<RgbImage>,
    captures_rx: Receiver<RgbImage>,
    preview_count: AtomicU64,
    capture_count: AtomicU64,
    held: Mutex<bool>,
    released: Condvar,
}

impl Default for RecordingListener {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingListener {
    pub fn new() -> Self {
        let (previews_tx, previews_rx) = unbounded();
        let (captures_tx, captures_rx) = unbounded();
        Self {
            previews_tx,
            previews_rx,
            captures_tx,
            captures_rx,
            preview_count: AtomicU64::new(0),
            capture_count: AtomicU64::new(0),
            held: Mutex::new(false),
            released: Condvar::new(),
        }
    }

    pub fn preview_count(&self) -> u64 {
        self.preview_count.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> u64 {
        self.capture_count.load(Ordering::SeqCst)
    }

    /// Next preview, recorded when the callback was entered.
    pub fn recv_preview(&self, timeout: Duration) -> Option<PreviewRecord> {
        self.previews_rx.recv_timeout(timeout).ok()
    }

    pub fn recv_capture(&self, timeout: Duration) -> Option<RgbImage> {
        self.captures_rx.recv_timeout(timeout).ok()
    }

    /// Make `on_preview` block until [`release`](Self::release).
    pub fn hold(&self) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn release(&self) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.released.notify_all();
    }
}

impl FrameListener for RecordingListener {
    fn on_preview(&self, image: &RgbImage, timestamp_ms: u64) {
        let top_left = image.get_pixel_checked(0, 0).map(|p| p.0).unwrap_or([0; 3]);
        self.preview_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.previews_tx.send(PreviewRecord {
            width: image.width(),
            height: image.height(),
            timestamp_ms,
            top_left,
        });

        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .released
            .wait_timeout_while(held, HOLD_LIMIT, |held| *held);
    }

    fn on_capture(&self, image: RgbImage) {
        self.capture_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.captures_tx.send(image);
    }
}
