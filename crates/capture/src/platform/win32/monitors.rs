//! Monitor enumeration via EnumDisplayMonitors

use crate::geometry::PhysicalRect;
use crate::monitor::{MonitorInfo, MonitorSource};
use tracing::{debug, warn};
use windows::Win32::Foundation::{BOOL, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    EnumDisplayMonitors, GetMonitorInfoW, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
};
use windows::Win32::UI::HiDpi::{GetDpiForMonitor, MDT_EFFECTIVE_DPI};

const MONITORINFOF_PRIMARY: u32 = 1;

/// Requires a per-monitor DPI aware process, otherwise the bounds are
/// virtualised.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Monitors;

impl MonitorSource for Win32Monitors {
    fn get_monitors(&self) -> Vec<MonitorInfo> {
        let mut monitors: Vec<MonitorInfo> = Vec::new();

        let ok = unsafe {
            EnumDisplayMonitors(
                HDC::default(),
                None,
                Some(enum_monitor_proc),
                LPARAM(&mut monitors as *mut Vec<MonitorInfo> as isize),
            )
        };

        if !ok.as_bool() {
            warn!("EnumDisplayMonitors failed");
            return Vec::new();
        }

        debug!(count = monitors.len(), "enumerated monitors");
        monitors
    }
}

unsafe extern "system" fn enum_monitor_proc(
    hmonitor: HMONITOR,
    _hdc: HDC,
    _rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let monitors = &mut *(lparam.0 as *mut Vec<MonitorInfo>);

    let mut info = MONITORINFOEXW {
        monitorInfo: MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFOEXW>() as u32,
            ..Default::default()
        },
        ..Default::default()
    };

    // Skip a monitor that cannot be described rather than aborting.
    if !GetMonitorInfoW(hmonitor, &mut info.monitorInfo).as_bool() {
        return TRUE;
    }

    let mut dpi_x: u32 = 96;
    let mut dpi_y: u32 = 96;
    if GetDpiForMonitor(hmonitor, MDT_EFFECTIVE_DPI, &mut dpi_x, &mut dpi_y).is_err() {
        dpi_x = 96;
    }

    let rc = info.monitorInfo.rcMonitor;
    let bounds = PhysicalRect::new(
        rc.left,
        rc.top,
        (rc.right - rc.left).max(0) as u32,
        (rc.bottom - rc.top).max(0) as u32,
    );

    let name_len = info.szDevice.iter().position(|&c| c == 0).unwrap_or(info.szDevice.len());
    let name = String::from_utf16_lossy(&info.szDevice[..name_len]);
    let is_primary = info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0;

    monitors.push(MonitorInfo::from_dpi(name, bounds, dpi_x, is_primary));

    TRUE
}
