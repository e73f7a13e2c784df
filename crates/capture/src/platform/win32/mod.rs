//! Win32 monitor enumeration, GDI blit, DXGI duplication and cursor access

pub mod cursor;
pub mod d3d11;
pub mod dxgi;
pub mod gdi;
pub mod monitors;

use crate::{CaptureError, CaptureResult};
use windows::Win32::Graphics::Gdi::{
    CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
    HGDIOBJ,
};

/// Device context of the whole screen, released on drop.
pub(crate) struct ScreenDc(pub HDC);

impl ScreenDc {
    pub fn acquire() -> CaptureResult<Self> {
        let hdc = unsafe { GetDC(None) };
        if hdc.is_invalid() {
            return Err(CaptureError::NotSupported("screen DC unavailable"));
        }
        Ok(Self(hdc))
    }
}

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(None, self.0);
        }
    }
}

/// Memory DC with a bitmap selected into it. Deselects and frees both on drop.
pub(crate) struct MemoryBitmap {
    pub dc: HDC,
    pub bitmap: HBITMAP,
    previous: HGDIOBJ,
    pub width: i32,
    pub height: i32,
}

impl MemoryBitmap {
    pub fn compatible_with(screen: &ScreenDc, width: i32, height: i32) -> CaptureResult<Self> {
        unsafe {
            let dc = CreateCompatibleDC(screen.0);
            if dc.is_invalid() {
                return Err(CaptureError::NotSupported("CreateCompatibleDC failed"));
            }

            let bitmap = CreateCompatibleBitmap(screen.0, width, height);
            if bitmap.is_invalid() {
                let _ = DeleteDC(dc);
                return Err(CaptureError::NotSupported("CreateCompatibleBitmap failed"));
            }

            let previous = SelectObject(dc, bitmap);

            Ok(Self {
                dc,
                bitmap,
                previous,
                width,
                height,
            })
        }
    }

    /// Read the bitmap back as top-down BGRA.
    pub fn read_bgra(&self) -> CaptureResult<Vec<u8>> {
        let mut bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: self.width,
                biHeight: -self.height, // Top-down DIB
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            bmiColors: [Default::default()],
        };

        let mut data = vec![0u8; self.width as usize * self.height as usize * 4];

        let lines = unsafe {
            GetDIBits(
                self.dc,
                self.bitmap,
                0,
                self.height as u32,
                Some(data.as_mut_ptr() as *mut _),
                &mut bmi,
                DIB_RGB_COLORS,
            )
        };

        if lines != self.height {
            return Err(CaptureError::NotSupported("GetDIBits returned short read"));
        }

        // GDI leaves alpha undefined.
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }

        Ok(data)
    }
}

impl Drop for MemoryBitmap {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(self.bitmap);
            let _ = DeleteDC(self.dc);
        }
    }
}
