use image::error::{ImageError, LimitErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    /// The device could not be opened (in use, permission revoked, absent).
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The operation is not valid for the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// A capture was requested while busy or before streaming.
    #[error("Not ready: {0}")]
    NotReady(String),
    #[error("Decode failure: {0}")]
    DecodeFailure(String),
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
    /// A buffer from an earlier pool generation showed up after a restart.
    #[error("Stale buffer: slot {slot} of generation {generation}")]
    StaleBuffer { generation: u64, slot: usize },
    #[error("Camera control error: {0}")]
    ControlError(String),
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CameraError {
    /// Per-frame failures are dropped locally; everything else is surfaced.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            CameraError::DecodeFailure(_)
                | CameraError::OutOfMemory(_)
                | CameraError::StaleBuffer { .. }
        )
    }
}

impl From<ImageError> for CameraError {
    fn from(err: ImageError) -> Self {
        match &err {
            ImageError::Limits(limit) if matches!(limit.kind(), LimitErrorKind::InsufficientMemory) => {
                CameraError::OutOfMemory(err.to_string())
            }
            _ => CameraError::DecodeFailure(err.to_string()),
        }
    }
}

/// Operations whose failure must never abort the caller: autofocus triggers,
/// autofocus cancellation, parameter refreshes after a gesture.
pub trait BestEffort {
    /// Log a failure at warn level and discard it.
    fn or_log(self, what: &str);
}

impl BestEffort for Result<(), CameraError> {
    fn or_log(self, what: &str) {
        if let Err(e) = self {
            log::warn!("{} failed (ignored): {}", what, e);
        }
    }
}
