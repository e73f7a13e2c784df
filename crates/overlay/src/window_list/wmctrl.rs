//! Window list from `wmctrl -lpG`, used when xcap reports nothing

use super::{WindowHandle, WindowInfo, WindowSource};
use capture::PhysicalRect;
use std::process::Command;
use tracing::{debug, warn};

/// wmctrl lists client windows oldest first; the list is reversed so the
/// most recently mapped window is treated as top-most.
#[derive(Debug, Clone, Copy, Default)]
pub struct WmctrlWindows {
    pub exclude: Option<WindowHandle>,
}

impl WindowSource for WmctrlWindows {
    fn get_windows(&self) -> Vec<WindowInfo> {
        let output = match Command::new("wmctrl").arg("-lpG").output() {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(status = %output.status, "wmctrl failed");
                return Vec::new();
            }
            Err(e) => {
                debug!("wmctrl unavailable: {}", e);
                return Vec::new();
            }
        };

        let mut windows = parse_wmctrl(&String::from_utf8_lossy(&output.stdout));
        windows.reverse();
        if let Some(exclude) = self.exclude {
            windows.retain(|w| w.handle != exclude);
        }
        windows
    }
}

/// Parse `0x03a00007  0 4321   100 200  800 600 host Title words`:
/// id, desktop, pid, x, y, width, height, client machine, title.
pub fn parse_wmctrl(text: &str) -> Vec<WindowInfo> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<WindowInfo> {
    let mut rest = line.trim_start();
    let mut fields: [&str; 8] = [""; 8];

    for field in fields.iter_mut() {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if end == 0 {
            return None;
        }
        *field = &rest[..end];
        rest = rest[end..].trim_start();
    }

    let [id, _desktop, pid, x, y, w, h, _host] = fields;
    let handle = isize::from_str_radix(id.strip_prefix("0x")?, 16).ok()?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;

    Some(WindowInfo {
        handle: WindowHandle(handle),
        bounds: PhysicalRect::new(x.parse().ok()?, y.parse().ok()?, width, height),
        title: rest.trim_end().to_string(),
        process_id: pid.parse().ok()?,
        // Unmapped windows report a zero size.
        is_visible: width > 0 && height > 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
0x03a00007  0 4321   100 200  800 600 box Terminal - bash
0x01e00003 -1 0      0    0    1920 32  box panel
0x04000001  0 777    -50  40   0    0   box
garbage line
";

    #[test]
    fn parses_windows() {
        let windows = parse_wmctrl(SAMPLE);
        assert_eq!(windows.len(), 3);

        assert_eq!(windows[0].handle, WindowHandle(0x03a00007));
        assert_eq!(windows[0].bounds, PhysicalRect::new(100, 200, 800, 600));
        assert_eq!(windows[0].title, "Terminal - bash");
        assert_eq!(windows[0].process_id, 4321);
        assert!(windows[0].is_visible);

        assert_eq!(windows[1].title, "panel");
        assert!(windows[1].is_visible);

        assert_eq!(windows[2].bounds.x, -50);
        assert_eq!(windows[2].title, "");
        assert!(!windows[2].is_visible);
    }

    #[test]
    fn empty_output() {
        assert!(parse_wmctrl("").is_empty());
    }
}
