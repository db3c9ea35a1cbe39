#[cfg(test)]
mod error_tests {
    use camfeed::errors::{BestEffort, CameraError};
    use std::error::Error;

    #[test]
    fn test_camera_error_device_unavailable() {
        let error = CameraError::DeviceUnavailable("camera 0 is already open".to_string());
        assert!(error.to_string().contains("Device unavailable"));
        assert!(error.to_string().contains("already open"));
    }

    #[test]
    fn test_camera_error_not_ready() {
        let error = CameraError::NotReady("capture already in flight".to_string());
        assert_eq!(error.to_string(), "Not ready: capture already in flight");
    }

    #[test]
    fn test_camera_error_stale_buffer() {
        let error = CameraError::StaleBuffer {
            generation: 4,
            slot: 2,
        };
        assert_eq!(error.to_string(), "Stale buffer: slot 2 of generation 4");
    }

    #[test]
    fn test_camera_error_debug_format() {
        let error = CameraError::InvalidState("open() while streaming".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("InvalidState"));
        assert!(debug_str.contains("streaming"));
    }

    #[test]
    fn test_camera_error_is_std_error() {
        let error = CameraError::DecodeFailure("truncated".to_string());
        let boxed: Box<dyn Error> = Box::new(error);
        assert!(boxed.source().is_none());
        assert_eq!(boxed.to_string(), "Decode failure: truncated");
    }

    #[test]
    fn test_lifecycle_errors_are_not_frame_local() {
        let surfaced = [
            CameraError::DeviceUnavailable("x".into()),
            CameraError::InvalidState("x".into()),
            CameraError::NotReady("x".into()),
            CameraError::ControlError("x".into()),
            CameraError::Unsupported("x".into()),
            CameraError::ConfigError("x".into()),
        ];
        for error in surfaced {
            assert!(!error.is_frame_local(), "{}", error);
        }
        assert!(CameraError::OutOfMemory("x".into()).is_frame_local());
    }

    #[test]
    fn test_image_errors_convert() {
        let err = image::load_from_memory(b"garbage").unwrap_err();
        assert!(matches!(CameraError::from(err), CameraError::DecodeFailure(_)));
    }

    #[test]
    fn test_best_effort_discards() {
        Err::<(), _>(CameraError::Unsupported("fixed focus".into())).or_log("autofocus");
    }
}
