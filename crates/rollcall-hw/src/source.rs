//! The `FrameSource` seam between capture backends and the session loop.

use crate::camera::{Camera, CameraError};
use crate::frame::{Frame, FrameError};
use crate::http::HttpError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("http: {0}")]
    Http(#[from] HttpError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

impl CaptureError {
    /// Whether the next poll may succeed. Networked failures are transient;
    /// a local device that stops delivering frames is not.
    pub fn is_transient(&self) -> bool {
        match self {
            CaptureError::Camera(_) => false,
            CaptureError::Http(_) | CaptureError::Frame(_) => true,
        }
    }
}

/// Supplies one frame per polling iteration.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;

    /// Short human-readable description for logs and window titles.
    fn describe(&self) -> String;
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.capture_frame()?)
    }

    fn describe(&self) -> String {
        format!("webcam {}", self.device_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let device = CaptureError::from(CameraError::CaptureFailed("EIO".into()));
        assert!(!device.is_transient());

        let decode = image::load_from_memory(b"not an image").unwrap_err();
        let payload = CaptureError::from(FrameError::from(decode));
        assert!(payload.is_transient());

        let status = CaptureError::from(HttpError::Status(503));
        assert!(status.is_transient());
    }
}
