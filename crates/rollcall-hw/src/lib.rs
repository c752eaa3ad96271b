//! rollcall-hw — frame acquisition.
//!
//! A V4L2 webcam and a networked snapshot camera behind one
//! [`FrameSource`] trait, plus the retry backoff used between failed polls.

pub mod backoff;
pub mod camera;
pub mod frame;
pub mod http;
pub mod source;

pub use backoff::Backoff;
pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::{Frame, FrameError};
pub use http::{HttpError, HttpSnapshotSource};
pub use source::{CaptureError, FrameSource};
