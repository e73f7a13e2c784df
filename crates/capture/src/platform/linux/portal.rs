//! Capture through the desktop's own screenshot tool
//!
//! Wayland compositors do not allow clients to read the screen directly, so
//! the whole desktop is captured once per request by an external tool into a
//! temporary PNG, then cropped per monitor.

use super::find_program;
use crate::backend::{BackendCapabilities, BackendKind, CapturePrimitive};
use crate::frame::PixelBuffer;
use crate::geometry::PhysicalRect;
use crate::monitor::{MonitorInfo, MonitorSnapshot};
use crate::{CaptureError, CaptureResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A full-screen screenshot command. The output path is appended last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotTool {
    pub program: &'static str,
    pub args: &'static [&'static str],
    pub wayland: bool,
}

/// Known tools in order of preference.
pub const TOOLS: &[ScreenshotTool] = &[
    ScreenshotTool { program: "grim", args: &[], wayland: true },
    ScreenshotTool { program: "gnome-screenshot", args: &["-f"], wayland: true },
    ScreenshotTool { program: "spectacle", args: &["-b", "-n", "-f", "-o"], wayland: true },
    ScreenshotTool { program: "scrot", args: &["-o"], wayland: false },
    ScreenshotTool { program: "import", args: &["-window", "root"], wayland: false },
];

/// Tools usable for the given session type.
pub fn candidate_tools(is_wayland: bool) -> impl Iterator<Item = &'static ScreenshotTool> {
    TOOLS.iter().filter(move |t| t.wayland || !is_wayland)
}

fn is_wayland_session() -> bool {
    std::env::var_os("WAYLAND_DISPLAY").is_some()
        || std::env::var("XDG_SESSION_TYPE").map(|v| v == "wayland").unwrap_or(false)
}

/// Deletes the temporary screenshot on drop.
struct TempImage(PathBuf);

impl TempImage {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("regioncap-{}.png", Uuid::new_v4())))
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        if self.0.exists() {
            let _ = std::fs::remove_file(&self.0);
        }
    }
}

pub struct PortalPrimitive {
    tool: ScreenshotTool,
    timeout: Duration,
    frame: Option<(PhysicalRect, PixelBuffer)>,
}

impl PortalPrimitive {
    pub fn new(tool: ScreenshotTool) -> Self {
        Self {
            tool,
            timeout: DEFAULT_TIMEOUT,
            frame: None,
        }
    }

    /// Pick the first installed tool that suits the session.
    pub fn probe() -> CaptureResult<Self> {
        let wayland = is_wayland_session();
        candidate_tools(wayland)
            .find(|tool| find_program(tool.program).is_some())
            .map(|tool| {
                debug!(tool = tool.program, wayland, "using screenshot tool");
                Self::new(tool.clone())
            })
            .ok_or(CaptureError::NotSupported("no screenshot tool on PATH"))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_tool(&self, output: &Path) -> CaptureResult<()> {
        let mut child = Command::new(self.tool.program)
            .args(self.tool.args)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(CaptureError::Tool(format!("{} exited with {}", self.tool.program, status)));
            }

            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CaptureError::Tool(format!(
                    "{} timed out after {:?}",
                    self.tool.program, self.timeout
                )));
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CapturePrimitive for PortalPrimitive {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            kind: BackendKind::PortalBased,
            name: self.tool.program,
            hardware_accelerated: false,
            may_include_system_cursor: false,
        }
    }

    fn begin_frame(&mut self, monitors: &MonitorSnapshot) -> CaptureResult<()> {
        let temp = TempImage::new();
        self.run_tool(&temp.0)?;

        let image = image::open(&temp.0)?.to_rgba8();
        let frame = PixelBuffer::from_rgba_image(image);

        // Tools write the whole X screen, anchored at the desktop origin.
        let desktop = monitors.get_virtual_desktop_bounds_physical();
        if (frame.width(), frame.height()) != (desktop.width, desktop.height) {
            warn!(
                tool = self.tool.program,
                got = %format!("{}x{}", frame.width(), frame.height()),
                expected = %desktop,
                "screenshot size differs from monitor layout"
            );
        }

        let origin = PhysicalRect::new(desktop.x, desktop.y, frame.width(), frame.height());
        self.frame = Some((origin, frame));
        Ok(())
    }

    fn grab(&mut self, monitor: &MonitorInfo, region: PhysicalRect) -> CaptureResult<PixelBuffer> {
        let (origin, frame) = self
            .frame
            .as_ref()
            .ok_or_else(|| CaptureError::Tool("no screenshot taken".into()))?;

        let local = region.offset(-origin.x, -origin.y);
        let pixels = frame.crop(&local);
        if (pixels.width(), pixels.height()) != (region.width, region.height) {
            return Err(CaptureError::InvalidRegion(format!(
                "{} part {} lies outside the screenshot",
                monitor.name, region
            )));
        }

        Ok(pixels)
    }

    fn end_frame(&mut self) {
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wayland_excludes_x11_only_tools() {
        let names: Vec<&str> = candidate_tools(true).map(|t| t.program).collect();
        assert_eq!(names, vec!["grim", "gnome-screenshot", "spectacle"]);

        let all: Vec<&str> = candidate_tools(false).map(|t| t.program).collect();
        assert_eq!(all.len(), TOOLS.len());
    }

    #[test]
    fn grab_without_frame_fails() {
        let mut primitive = PortalPrimitive::new(TOOLS[0].clone());
        let monitor = MonitorInfo::new("m", PhysicalRect::new(0, 0, 10, 10), 1.0, true);
        assert!(primitive.grab(&monitor, PhysicalRect::new(0, 0, 5, 5)).is_err());
    }

    #[test]
    fn failing_tool_reports_error() {
        let primitive = PortalPrimitive::new(ScreenshotTool {
            program: "regioncap-definitely-missing-tool",
            args: &[],
            wayland: true,
        })
        .with_timeout(Duration::from_millis(200));

        let temp = TempImage::new();
        assert!(primitive.run_tool(&temp.0).is_err());
    }
}
