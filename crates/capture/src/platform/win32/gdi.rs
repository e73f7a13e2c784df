//! Basic blit from the screen DC

use super::{MemoryBitmap, ScreenDc};
use crate::backend::{BackendCapabilities, BackendKind, CapturePrimitive};
use crate::frame::PixelBuffer;
use crate::geometry::PhysicalRect;
use crate::monitor::MonitorInfo;
use crate::CaptureResult;
use windows::Win32::Graphics::Gdi::{BitBlt, CAPTUREBLT, ROP_CODE, SRCCOPY};

/// Always available; used when duplication fails.
#[derive(Debug, Default)]
pub struct GdiPrimitive;

impl GdiPrimitive {
    pub fn new() -> Self {
        Self
    }
}

impl CapturePrimitive for GdiPrimitive {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            kind: BackendKind::GdiBlit,
            name: "GDI BitBlt",
            hardware_accelerated: false,
            // CAPTUREBLT picks up layered windows, which includes software cursors.
            may_include_system_cursor: true,
        }
    }

    fn grab(&mut self, _monitor: &MonitorInfo, region: PhysicalRect) -> CaptureResult<PixelBuffer> {
        let width = region.width as i32;
        let height = region.height as i32;

        let screen = ScreenDc::acquire()?;
        let target = MemoryBitmap::compatible_with(&screen, width, height)?;

        unsafe {
            BitBlt(
                target.dc,
                0,
                0,
                width,
                height,
                screen.0,
                region.x,
                region.y,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            )?;
        }

        let data = target.read_bgra()?;
        PixelBuffer::from_bgra(region.width, region.height, data)
    }
}
