//! Top-level window snapshot for click-to-select
//!
//! The list is taken once when a session starts and not refreshed; windows
//! rarely move during a selection gesture.

#[cfg(target_os = "linux")]
pub mod wmctrl;
#[cfg(target_os = "linux")]
pub mod xcap_windows;
#[cfg(windows)]
pub mod win32;

use capture::{PhysicalPoint, PhysicalRect};
use std::fmt;
use tracing::debug;

/// Opaque platform window id (HWND on Windows, X11 window id on Linux).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    /// Physical bounds on the virtual desktop.
    pub bounds: PhysicalRect,
    pub title: String,
    pub process_id: u32,
    pub is_visible: bool,
}

impl WindowInfo {
    pub fn contains(&self, point: PhysicalPoint) -> bool {
        self.bounds.contains(point)
    }
}

/// Windows must be strictly larger than this on both axes to be offered.
pub const MIN_WINDOW_EXTENT: u32 = 50;

/// What the platform reports about a top-level window, reduced to the
/// properties that decide click-to-select eligibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTraits {
    pub shown: bool,
    /// Hidden by the compositor, e.g. on another virtual desktop.
    pub cloaked: bool,
    pub enabled: bool,
    pub tool_window: bool,
    /// Owned popups and child windows.
    pub has_owner: bool,
    pub bounds: PhysicalRect,
}

impl WindowTraits {
    fn is_eligible(&self) -> bool {
        self.shown
            && !self.cloaked
            && self.enabled
            && !self.tool_window
            && !self.has_owner
            && self.bounds.width > MIN_WINDOW_EXTENT
            && self.bounds.height > MIN_WINDOW_EXTENT
    }

    /// Snapshot entry for an eligible window.
    pub fn into_window(self, handle: WindowHandle, title: String, process_id: u32) -> Option<WindowInfo> {
        self.is_eligible().then(|| WindowInfo {
            handle,
            bounds: self.bounds,
            title,
            process_id,
            is_visible: true,
        })
    }
}

/// Platform window enumeration, top-most first.
///
/// Returns an empty list when enumeration is unavailable.
pub trait WindowSource: Send + Sync {
    fn get_windows(&self) -> Vec<WindowInfo>;
}

/// Fixed window list.
#[derive(Debug, Clone, Default)]
pub struct StaticWindows(pub Vec<WindowInfo>);

impl WindowSource for StaticWindows {
    fn get_windows(&self) -> Vec<WindowInfo> {
        self.0.clone()
    }
}

/// Immutable window list in Z-order, top-most first.
#[derive(Debug, Clone, Default)]
pub struct WindowSnapshot {
    windows: Vec<WindowInfo>,
}

impl WindowSnapshot {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self { windows }
    }

    pub fn capture(source: &dyn WindowSource) -> Self {
        let snapshot = Self::new(source.get_windows());
        debug!(count = snapshot.len(), "window snapshot taken");
        snapshot
    }

    pub fn windows(&self) -> &[WindowInfo] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Top-most visible window under `point`.
    pub fn hit_test(&self, point: PhysicalPoint) -> Option<&WindowInfo> {
        self.windows
            .iter()
            .find(|w| w.is_visible && w.contains(point))
    }

    pub fn find(&self, handle: WindowHandle) -> Option<&WindowInfo> {
        self.windows.iter().find(|w| w.handle == handle)
    }

    /// Same snapshot minus one window, typically the overlay itself.
    pub fn without(&self, handle: WindowHandle) -> Self {
        Self::new(
            self.windows
                .iter()
                .filter(|w| w.handle != handle)
                .cloned()
                .collect(),
        )
    }
}

/// Window source for the current platform. `exclude` is left out of the
/// enumeration.
pub fn system_windows(exclude: Option<WindowHandle>) -> Box<dyn WindowSource> {
    #[cfg(windows)]
    {
        Box::new(win32::Win32Windows { exclude })
    }

    #[cfg(target_os = "linux")]
    {
        Box::new(xcap_windows::XcapWindows { exclude })
    }

    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = exclude;
        Box::new(StaticWindows::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(handle: isize, bounds: PhysicalRect, visible: bool) -> WindowInfo {
        WindowInfo {
            handle: WindowHandle(handle),
            bounds,
            title: format!("window {handle}"),
            process_id: 1,
            is_visible: visible,
        }
    }

    #[test]
    fn hit_test_prefers_top_most() {
        let snapshot = WindowSnapshot::new(vec![
            window(1, PhysicalRect::new(100, 100, 200, 200), true),
            window(2, PhysicalRect::new(0, 0, 800, 600), true),
        ]);

        let hit = snapshot.hit_test(PhysicalPoint::new(150, 150));
        assert_eq!(hit.map(|w| w.handle), Some(WindowHandle(1)));

        let hit = snapshot.hit_test(PhysicalPoint::new(50, 50));
        assert_eq!(hit.map(|w| w.handle), Some(WindowHandle(2)));

        assert!(snapshot.hit_test(PhysicalPoint::new(900, 50)).is_none());
    }

    #[test]
    fn hidden_windows_are_skipped() {
        let snapshot = WindowSnapshot::new(vec![
            window(1, PhysicalRect::new(0, 0, 100, 100), false),
            window(2, PhysicalRect::new(0, 0, 100, 100), true),
        ]);
        let hit = snapshot.hit_test(PhysicalPoint::new(10, 10));
        assert_eq!(hit.map(|w| w.handle), Some(WindowHandle(2)));
    }

    fn plain_window() -> WindowTraits {
        WindowTraits {
            shown: true,
            enabled: true,
            bounds: PhysicalRect::new(-1200, 40, 800, 600),
            ..Default::default()
        }
    }

    #[test]
    fn eligible_window_enters_snapshot() {
        let info = plain_window()
            .into_window(WindowHandle(3), "Editor".into(), 11)
            .expect("eligible");
        assert_eq!(info.bounds, PhysicalRect::new(-1200, 40, 800, 600));
        assert!(info.is_visible);
    }

    #[test]
    fn ineligible_windows_are_dropped() {
        let rejected = [
            WindowTraits { shown: false, ..plain_window() },
            WindowTraits { cloaked: true, ..plain_window() },
            WindowTraits { enabled: false, ..plain_window() },
            WindowTraits { tool_window: true, ..plain_window() },
            WindowTraits { has_owner: true, ..plain_window() },
            WindowTraits {
                bounds: PhysicalRect::new(0, 0, MIN_WINDOW_EXTENT, 400),
                ..plain_window()
            },
        ];
        for traits in rejected {
            assert!(traits.into_window(WindowHandle(1), String::new(), 0).is_none(), "{traits:?}");
        }

        let just_big_enough = WindowTraits {
            bounds: PhysicalRect::new(0, 0, MIN_WINDOW_EXTENT + 1, MIN_WINDOW_EXTENT + 1),
            ..plain_window()
        };
        assert!(just_big_enough.into_window(WindowHandle(1), String::new(), 0).is_some());
    }

    #[test]
    fn without_removes_overlay() {
        let snapshot = WindowSnapshot::new(vec![
            window(7, PhysicalRect::new(0, 0, 1920, 1080), true),
            window(8, PhysicalRect::new(10, 10, 100, 100), true),
        ]);
        let filtered = snapshot.without(WindowHandle(7));
        assert_eq!(filtered.len(), 1);
        assert!(filtered.find(WindowHandle(7)).is_none());
        assert_eq!(
            filtered.hit_test(PhysicalPoint::new(500, 500)).map(|w| w.handle),
            None
        );
    }
}
