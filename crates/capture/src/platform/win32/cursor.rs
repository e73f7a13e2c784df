//! Cursor position/shape and temporary hiding of the system cursors

use super::{MemoryBitmap, ScreenDc};
use crate::cursor::{alpha_from_backgrounds, CursorImage, CursorSource, CursorSuppression};
use crate::frame::PixelBuffer;
use crate::geometry::PhysicalPoint;
use std::time::Duration;
use tracing::{debug, warn};
use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Gdi::{DeleteObject, PatBlt, BLACKNESS, HBRUSH, ROP_CODE, WHITENESS};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateCursor, DestroyCursor, DrawIconEx, GetCursorInfo, GetCursorPos, GetIconInfo, GetSystemMetrics,
    SetSystemCursor, SystemParametersInfoW, CURSORINFO, CURSOR_SHOWING, DI_NORMAL, HCURSOR, HICON,
    ICONINFO, OCR_APPSTARTING, OCR_CROSS, OCR_HAND, OCR_IBEAM, OCR_NO, OCR_NORMAL, OCR_SIZEALL,
    OCR_SIZENESW, OCR_SIZENS, OCR_SIZENWSE, OCR_SIZEWE, OCR_UP, OCR_WAIT, SM_CXCURSOR,
    SM_CYCURSOR, SPI_SETCURSORS, SYSTEM_CURSOR_ID, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
};

const HIDDEN_CURSORS: [SYSTEM_CURSOR_ID; 13] = [
    OCR_NORMAL,
    OCR_IBEAM,
    OCR_WAIT,
    OCR_CROSS,
    OCR_UP,
    OCR_SIZENWSE,
    OCR_SIZENESW,
    OCR_SIZEWE,
    OCR_SIZENS,
    OCR_SIZEALL,
    OCR_NO,
    OCR_HAND,
    OCR_APPSTARTING,
];

/// Cursor access through user32.
#[derive(Debug, Clone)]
pub struct Win32Cursor {
    /// Time for the compositor to repaint after the cursors were swapped.
    pub settle: Duration,
}

impl Default for Win32Cursor {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(150),
        }
    }
}

impl CursorSource for Win32Cursor {
    fn cursor_position(&self) -> Option<PhysicalPoint> {
        let mut pt = POINT::default();
        unsafe { GetCursorPos(&mut pt).ok()? };
        Some(PhysicalPoint::new(pt.x, pt.y))
    }

    fn cursor_image(&self) -> Option<CursorImage> {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        unsafe { GetCursorInfo(&mut info).ok()? };

        if info.flags.0 & CURSOR_SHOWING.0 == 0 || info.hCursor.is_invalid() {
            return None;
        }

        let mut icon = ICONINFO::default();
        unsafe { GetIconInfo(HICON(info.hCursor.0), &mut icon).ok()? };
        let hotspot = PhysicalPoint::new(icon.xHotspot as i32, icon.yHotspot as i32);
        let _icon_bitmaps = IconBitmaps(icon);

        let (width, height) = unsafe { (GetSystemMetrics(SM_CXCURSOR), GetSystemMetrics(SM_CYCURSOR)) };
        let on_black = render_cursor(info.hCursor, width, height, BLACKNESS)?;
        let on_white = render_cursor(info.hCursor, width, height, WHITENESS)?;
        let data = alpha_from_backgrounds(&on_black, &on_white);

        Some(CursorImage {
            position: PhysicalPoint::new(info.ptScreenPos.x, info.ptScreenPos.y),
            hotspot,
            image: PixelBuffer::from_bgra(width as u32, height as u32, data).ok()?,
        })
    }

    fn suppress_system_cursor(&self) -> CursorSuppression {
        let mut replaced = 0;
        for id in HIDDEN_CURSORS {
            // SetSystemCursor takes ownership, so every slot gets its own copy.
            let Some(blank) = blank_cursor() else { continue };
            match unsafe { SetSystemCursor(blank, id) } {
                Ok(()) => replaced += 1,
                // Ownership only passes on success.
                Err(_) => unsafe {
                    let _ = DestroyCursor(blank);
                },
            }
        }

        if replaced == 0 {
            warn!("could not hide system cursors");
            return CursorSuppression::none();
        }

        debug!(replaced, "system cursors hidden");
        std::thread::sleep(self.settle);
        CursorSuppression::new(restore_system_cursors)
    }
}

fn restore_system_cursors() {
    let restored = unsafe {
        SystemParametersInfoW(SPI_SETCURSORS, 0, None, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0))
    };
    if let Err(e) = restored {
        warn!("failed to restore system cursors: {}", e);
    }
}

fn blank_cursor() -> Option<HCURSOR> {
    const SIZE: i32 = 32;
    let and_plane = [0xFFu8; (SIZE * SIZE / 8) as usize];
    let xor_plane = [0u8; (SIZE * SIZE / 8) as usize];

    unsafe {
        CreateCursor(
            None,
            0,
            0,
            SIZE,
            SIZE,
            and_plane.as_ptr() as *const _,
            xor_plane.as_ptr() as *const _,
        )
        .ok()
    }
}

fn render_cursor(cursor: HCURSOR, width: i32, height: i32, background: ROP_CODE) -> Option<Vec<u8>> {
    let screen = ScreenDc::acquire().ok()?;
    let target = MemoryBitmap::compatible_with(&screen, width, height).ok()?;

    unsafe {
        PatBlt(target.dc, 0, 0, width, height, background).ok().ok()?;
        DrawIconEx(target.dc, 0, 0, HICON(cursor.0), width, height, 0, HBRUSH::default(), DI_NORMAL).ok()?;
    }

    target.read_bgra().ok()
}

/// Frees the bitmaps GetIconInfo hands back.
struct IconBitmaps(ICONINFO);

impl Drop for IconBitmaps {
    fn drop(&mut self) {
        unsafe {
            if !self.0.hbmMask.is_invalid() {
                let _ = DeleteObject(self.0.hbmMask);
            }
            if !self.0.hbmColor.is_invalid() {
                let _ = DeleteObject(self.0.hbmColor);
            }
        }
    }
}
