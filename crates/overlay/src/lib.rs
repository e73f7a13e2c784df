//! Region selection for RegionCap
//!
//! Maps pointer input between physical and logical space, turns it into a
//! selection through a toolkit-independent state machine and runs the
//! capture session around it. On Windows a frozen-desktop popup drives the
//! state machine from real input.

pub mod coords;
pub mod magnifier;
pub mod orchestrator;
pub mod selection;
pub mod window_list;

#[cfg(windows)]
mod render;
#[cfg(windows)]
pub mod window;

pub use coords::CoordinateMapper;
pub use orchestrator::{
    OverlayPlacement, PreviewFrame, RegionCaptureSession, SessionOptions, SessionOutcome,
};
pub use selection::{
    Effect, Key, Modifiers, PointerButton, PointerPosition, Selection, SelectionConfig,
    SelectionEvent, SelectionMachine, SelectionSource, SelectionState,
};
pub use window_list::{
    system_windows, StaticWindows, WindowHandle, WindowInfo, WindowSnapshot, WindowSource,
    WindowTraits, MIN_WINDOW_EXTENT,
};

#[cfg(windows)]
pub use window::OverlayWindow;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    Windows(#[from] windows::core::Error),

    #[error("No monitors available")]
    NoMonitors,

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Capture worker stopped")]
    WorkerGone,

    #[error("Selection cancelled")]
    Cancelled,
}

pub type OverlayResult<T> = Result<T, OverlayError>;
