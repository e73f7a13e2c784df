//! Window list from xcap, with `wmctrl` as a fallback

use super::wmctrl::WmctrlWindows;
use super::{WindowHandle, WindowInfo, WindowSource};
use capture::PhysicalRect;
use tracing::{debug, warn};

/// xcap lists windows front to back.
#[derive(Debug, Clone, Copy, Default)]
pub struct XcapWindows {
    pub exclude: Option<WindowHandle>,
}

impl WindowSource for XcapWindows {
    fn get_windows(&self) -> Vec<WindowInfo> {
        let mut windows: Vec<WindowInfo> = match xcap::Window::all() {
            Ok(all) => all.iter().filter_map(read_window).collect(),
            Err(e) => {
                warn!("xcap window enumeration failed: {}", e);
                Vec::new()
            }
        };

        if windows.is_empty() {
            debug!("no windows from xcap, trying wmctrl");
            return WmctrlWindows { exclude: self.exclude }.get_windows();
        }

        if let Some(exclude) = self.exclude {
            windows.retain(|w| w.handle != exclude);
        }
        windows
    }
}

fn read_window(window: &xcap::Window) -> Option<WindowInfo> {
    let id = window.id().ok()?;
    let bounds = PhysicalRect::new(
        window.x().ok()?,
        window.y().ok()?,
        window.width().ok()?,
        window.height().ok()?,
    );

    Some(window_info(
        id,
        bounds,
        window.title().unwrap_or_default(),
        window.pid().unwrap_or_default(),
        window.is_minimized().unwrap_or(false),
    ))
}

pub fn window_info(id: u32, bounds: PhysicalRect, title: String, process_id: u32, minimized: bool) -> WindowInfo {
    WindowInfo {
        handle: WindowHandle(id as isize),
        bounds,
        title,
        process_id,
        is_visible: !minimized && !bounds.is_empty(),
    }
}
