//! GDI drawing for the overlay window

use capture::{PhysicalPoint, PhysicalRect, PixelBuffer};
use std::mem::size_of;
use windows::Win32::Foundation::{COLORREF, HWND, RECT};
use windows::Win32::Graphics::Gdi::{
    BeginPaint, CreatePen, CreateSolidBrush, DeleteObject, EndPaint, FillRect, GetStockObject,
    Rectangle, SelectObject, SetBkMode, SetDIBitsToDevice, SetStretchBltMode, SetTextColor,
    StretchDIBits, TextOutW, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, COLORONCOLOR, DIB_RGB_COLORS,
    HDC, NULL_BRUSH, PAINTSTRUCT, PEN_STYLE, PS_DASH, PS_SOLID, SRCCOPY, TRANSPARENT,
};

const HOVER_COLOR: COLORREF = COLORREF(0x00FF8800);
const SELECTION_COLOR: COLORREF = COLORREF(0x0000FF00);
const BAR_COLOR: COLORREF = COLORREF(0x00333333);
const TEXT_COLOR: COLORREF = COLORREF(0x00FFFFFF);
const MAGNIFIER_BORDER: COLORREF = COLORREF(0x00FFFFFF);
const BAR_HEIGHT: i32 = 32;

/// Paints the frozen desktop plus hover and selection outlines. Rectangles
/// are kept in desktop coordinates and shifted by `origin` when drawn.
pub(crate) struct OverlayRenderer {
    backdrop: PixelBuffer,
    origin: PhysicalPoint,
    selection: Option<PhysicalRect>,
    hover: Option<PhysicalRect>,
    dragging: bool,
    /// Zoomed live frame and where it goes on the desktop.
    magnifier: Option<(PhysicalRect, PixelBuffer)>,
}

impl OverlayRenderer {
    pub fn new(backdrop: PixelBuffer, origin: PhysicalPoint) -> Self {
        Self {
            backdrop,
            origin,
            selection: None,
            hover: None,
            dragging: false,
            magnifier: None,
        }
    }

    pub fn set_selection(&mut self, rect: Option<PhysicalRect>) {
        self.selection = rect;
    }

    pub fn set_hover(&mut self, rect: Option<PhysicalRect>) {
        self.hover = rect;
    }

    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
    }

    pub fn set_magnifier(&mut self, view: PhysicalRect, frame: PixelBuffer) {
        self.magnifier = Some((view, frame));
    }

    pub fn clear_magnifier(&mut self) {
        self.magnifier = None;
    }

    /// Client-area position to desktop position.
    pub fn to_desktop(&self, x: i32, y: i32) -> PhysicalPoint {
        PhysicalPoint::new(self.origin.x + x, self.origin.y + y)
    }

    pub fn render(&self, hwnd: HWND) {
        unsafe {
            let mut ps = PAINTSTRUCT::default();
            let hdc = BeginPaint(hwnd, &mut ps);

            self.draw_backdrop(hdc);

            if let Some(rect) = self.hover {
                if !self.dragging && self.selection.is_none() {
                    self.draw_outline(hdc, &rect, PS_SOLID, 3, HOVER_COLOR);
                }
            }

            if let Some(rect) = self.selection {
                self.draw_outline(hdc, &rect, PS_DASH, 1, SELECTION_COLOR);
                self.draw_size_label(hdc, &rect);
            }

            if let Some((view, frame)) = &self.magnifier {
                self.draw_magnifier(hdc, view, frame);
            }

            self.draw_info_bar(hdc);

            let _ = EndPaint(hwnd, &ps);
        }
    }

    unsafe fn draw_backdrop(&self, hdc: HDC) {
        let width = self.backdrop.width() as i32;
        let height = self.backdrop.height() as i32;
        let bmi = bgra_info(width, height);

        SetDIBitsToDevice(
            hdc,
            0,
            0,
            width as u32,
            height as u32,
            0,
            0,
            0,
            height as u32,
            self.backdrop.data().as_ptr() as *const _,
            &bmi,
            DIB_RGB_COLORS,
        );
    }

    unsafe fn draw_magnifier(&self, hdc: HDC, view: &PhysicalRect, frame: &PixelBuffer) {
        let width = frame.width() as i32;
        let height = frame.height() as i32;
        let bmi = bgra_info(width, height);

        SetStretchBltMode(hdc, COLORONCOLOR);
        StretchDIBits(
            hdc,
            view.x - self.origin.x,
            view.y - self.origin.y,
            view.width as i32,
            view.height as i32,
            0,
            0,
            width,
            height,
            Some(frame.data().as_ptr() as *const _),
            &bmi,
            DIB_RGB_COLORS,
            SRCCOPY,
        );
        self.draw_outline(hdc, view, PS_SOLID, 1, MAGNIFIER_BORDER);
    }

    unsafe fn draw_outline(&self, hdc: HDC, rect: &PhysicalRect, style: PEN_STYLE, width: i32, color: COLORREF) {
        let pen = CreatePen(style, width, color);
        let old_pen = SelectObject(hdc, pen);
        let old_brush = SelectObject(hdc, GetStockObject(NULL_BRUSH));

        let left = rect.x - self.origin.x;
        let top = rect.y - self.origin.y;
        let _ = Rectangle(hdc, left, top, left + rect.width as i32, top + rect.height as i32);

        SelectObject(hdc, old_brush);
        SelectObject(hdc, old_pen);
        let _ = DeleteObject(pen);
    }

    unsafe fn draw_size_label(&self, hdc: HDC, rect: &PhysicalRect) {
        let label: Vec<u16> = format!("{} x {}", rect.width, rect.height).encode_utf16().collect();

        SetBkMode(hdc, TRANSPARENT);
        SetTextColor(hdc, TEXT_COLOR);
        let _ = TextOutW(
            hdc,
            rect.x - self.origin.x + 4,
            rect.bottom() - self.origin.y + 4,
            &label,
        );
    }

    unsafe fn draw_info_bar(&self, hdc: HDC) {
        let width = self.backdrop.width() as i32;
        let height = self.backdrop.height() as i32;
        let bar = RECT {
            left: 0,
            top: height - BAR_HEIGHT,
            right: width,
            bottom: height,
        };

        let brush = CreateSolidBrush(BAR_COLOR);
        FillRect(hdc, &bar, brush);
        let _ = DeleteObject(brush);

        let text = if self.dragging {
            "Release to capture | Shift square | Alt from centre | Esc discard"
        } else {
            "Drag to select | Click a window | 1-9 monitor | ` monitor under cursor | Esc cancel"
        };
        let text: Vec<u16> = text.encode_utf16().collect();

        SetBkMode(hdc, TRANSPARENT);
        SetTextColor(hdc, TEXT_COLOR);
        let _ = TextOutW(hdc, 10, bar.top + 8, &text);
    }
}

/// Top-down 32-bit BGRA bitmap header.
fn bgra_info(width: i32, height: i32) -> BITMAPINFO {
    BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width,
            biHeight: -height,
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    }
}
