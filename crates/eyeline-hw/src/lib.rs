//! eyeline-hw — Webcam capture for the eye-contact tracker.
//!
//! Provides V4L2-based camera access with YUYV and MJPG decoding to RGB.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
