//! Per-OS monitor sources, capture primitives and cursor access
//!
//! Each target compiles only its own implementations; which primitives are
//! actually usable is decided at runtime by [`available_primitives`].

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(windows)]
pub mod win32;

use crate::backend::CapturePrimitive;
use crate::cursor::CursorSource;
use crate::monitor::MonitorSource;

/// Monitor source for the current platform.
pub fn system_monitors() -> Box<dyn MonitorSource> {
    #[cfg(windows)]
    {
        Box::new(win32::monitors::Win32Monitors)
    }

    #[cfg(target_os = "linux")]
    {
        Box::new(linux::monitors::XcapMonitors::from_env())
    }

    #[cfg(not(any(windows, target_os = "linux")))]
    {
        Box::new(crate::monitor::StaticMonitors::default())
    }
}

/// Capture primitives that passed their probe, most capable first.
pub fn available_primitives() -> Vec<Box<dyn CapturePrimitive>> {
    #[allow(unused_mut)]
    let mut primitives: Vec<Box<dyn CapturePrimitive>> = Vec::new();

    #[cfg(windows)]
    {
        match win32::dxgi::DuplicationPrimitive::probe() {
            Ok(primitive) => primitives.push(Box::new(primitive)),
            Err(e) => tracing::info!("hardware duplication unavailable: {}", e),
        }
        primitives.push(Box::new(win32::gdi::GdiPrimitive::new()));
    }

    #[cfg(target_os = "linux")]
    {
        match linux::portal::PortalPrimitive::probe() {
            Ok(primitive) => primitives.push(Box::new(primitive)),
            Err(e) => tracing::info!("no screenshot tool available: {}", e),
        }
    }

    primitives
}

/// Cursor access for the current platform, if any.
pub fn cursor_source() -> Option<Box<dyn CursorSource>> {
    #[cfg(windows)]
    {
        Some(Box::new(win32::cursor::Win32Cursor::default()))
    }

    #[cfg(not(windows))]
    {
        None
    }
}
