//! Top-level window enumeration via EnumWindows

use super::{WindowHandle, WindowInfo, WindowSource, WindowTraits};
use capture::PhysicalRect;
use std::ffi::c_void;
use tracing::{trace, warn};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Dwm::{
    DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS, DWMWINDOWATTRIBUTE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetWindow, GetWindowLongW, GetWindowRect, GetWindowTextW,
    GetWindowThreadProcessId, IsWindowVisible, GA_ROOT, GWL_EXSTYLE, GWL_STYLE, GW_OWNER,
    WS_DISABLED, WS_EX_TOOLWINDOW,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Windows {
    pub exclude: Option<WindowHandle>,
}

struct EnumState {
    exclude: Option<WindowHandle>,
    windows: Vec<WindowInfo>,
}

impl WindowSource for Win32Windows {
    /// EnumWindows walks top-level windows in Z-order, top-most first.
    fn get_windows(&self) -> Vec<WindowInfo> {
        let mut state = EnumState {
            exclude: self.exclude,
            windows: Vec::new(),
        };

        let result = unsafe {
            EnumWindows(
                Some(enum_window_proc),
                LPARAM(&mut state as *mut EnumState as isize),
            )
        };
        if let Err(e) = result {
            warn!("EnumWindows failed: {}", e);
        }

        state.windows
    }
}

unsafe extern "system" fn enum_window_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let state = &mut *(lparam.0 as *mut EnumState);

    let handle = WindowHandle(hwnd.0 as isize);
    if state.exclude == Some(handle) {
        return TRUE;
    }

    // Invisible windows vastly outnumber the rest; skip them before any
    // further queries.
    if !IsWindowVisible(hwnd).as_bool() {
        return TRUE;
    }

    let Some(traits) = read_traits(hwnd) else {
        return TRUE;
    };
    match traits.into_window(handle, window_title(hwnd), process_id(hwnd)) {
        Some(window) => state.windows.push(window),
        None => trace!(%handle, ?traits, "window not offered"),
    }

    TRUE
}

unsafe fn read_traits(hwnd: HWND) -> Option<WindowTraits> {
    let style = GetWindowLongW(hwnd, GWL_STYLE) as u32;
    let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
    let owner = GetWindow(hwnd, GW_OWNER).ok().filter(|owner| !owner.is_invalid());

    Some(WindowTraits {
        shown: true,
        cloaked: dwm_u32(hwnd, DWMWA_CLOAKED).is_some_and(|cloaked| cloaked != 0),
        enabled: style & WS_DISABLED.0 == 0,
        tool_window: ex_style & WS_EX_TOOLWINDOW.0 != 0,
        has_owner: owner.is_some() || GetAncestor(hwnd, GA_ROOT) != hwnd,
        bounds: window_bounds(hwnd)?,
    })
}

unsafe fn dwm_u32(hwnd: HWND, attribute: DWMWINDOWATTRIBUTE) -> Option<u32> {
    let mut value: u32 = 0;
    DwmGetWindowAttribute(
        hwnd,
        attribute,
        &mut value as *mut u32 as *mut c_void,
        std::mem::size_of::<u32>() as u32,
    )
    .ok()?;
    Some(value)
}

/// Visible frame without the invisible resize borders, falling back to the
/// plain window rect.
unsafe fn window_bounds(hwnd: HWND) -> Option<PhysicalRect> {
    let mut rect = RECT::default();
    let frame = DwmGetWindowAttribute(
        hwnd,
        DWMWA_EXTENDED_FRAME_BOUNDS,
        &mut rect as *mut RECT as *mut c_void,
        std::mem::size_of::<RECT>() as u32,
    );

    if frame.is_err() {
        GetWindowRect(hwnd, &mut rect).ok()?;
    }

    Some(PhysicalRect::from_corners(
        capture::PhysicalPoint::new(rect.left, rect.top),
        capture::PhysicalPoint::new(rect.right.max(rect.left), rect.bottom.max(rect.top)),
    ))
}

unsafe fn window_title(hwnd: HWND) -> String {
    let mut buf = [0u16; 512];
    let len = GetWindowTextW(hwnd, &mut buf);
    if len <= 0 {
        return String::new();
    }
    String::from_utf16_lossy(&buf[..len as usize])
}

unsafe fn process_id(hwnd: HWND) -> u32 {
    let mut pid: u32 = 0;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    pid
}
