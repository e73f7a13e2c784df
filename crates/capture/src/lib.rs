//! Screen capture core for RegionCap
//!
//! Provides the physical/logical geometry types, the monitor model and the
//! capture backends that turn a physical desktop rectangle into pixels.

pub mod backend;
pub mod cursor;
pub mod frame;
pub mod geometry;
pub mod monitor;
pub mod platform;

pub use backend::{
    probe_backends, BackendCapabilities, BackendKind, CaptureBackend, CaptureOptions,
    CapturePrimitive, CompositingBackend, FallbackChain,
};
pub use cursor::{CursorImage, CursorSource};
pub use frame::PixelBuffer;
pub use geometry::{LogicalPoint, LogicalRect, PhysicalPoint, PhysicalRect};
pub use monitor::{MonitorInfo, MonitorSnapshot, MonitorSource, StaticMonitors};
pub use platform::system_monitors;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    Windows(#[from] windows::core::Error),

    #[error("Duplication error: {0}")]
    Duplication(String),

    #[error("Capture tool failed: {0}")]
    Tool(String),

    #[error("Capture not supported: {0}")]
    NotSupported(&'static str),

    #[error("Invalid capture region: {0}")]
    InvalidRegion(String),

    #[error("Frame timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
