//! Monitor layout from xcap, with `xrandr --current` as a fallback

use crate::geometry::PhysicalRect;
use crate::monitor::{MonitorInfo, MonitorSource};
use std::process::Command;
use tracing::{debug, warn};

/// Outputs reported by xcap. When xcap fails or reports nothing the
/// xrandr text output is used instead.
#[derive(Debug, Clone)]
pub struct XcapMonitors {
    pub fallback: XrandrMonitors,
}

impl XcapMonitors {
    pub fn from_env() -> Self {
        Self {
            fallback: XrandrMonitors::from_env(),
        }
    }
}

impl MonitorSource for XcapMonitors {
    fn get_monitors(&self) -> Vec<MonitorInfo> {
        let mut monitors: Vec<MonitorInfo> = match xcap::Monitor::all() {
            Ok(all) => all
                .iter()
                .filter_map(|m| read_monitor(m, self.fallback.scale_factor))
                .collect(),
            Err(e) => {
                warn!("xcap monitor enumeration failed: {}", e);
                Vec::new()
            }
        };

        if monitors.is_empty() {
            debug!("no monitors from xcap, trying xrandr");
            return self.fallback.get_monitors();
        }

        ensure_primary(&mut monitors);
        debug!(count = monitors.len(), "xcap monitors");
        monitors
    }
}

fn read_monitor(monitor: &xcap::Monitor, default_scale: f64) -> Option<MonitorInfo> {
    let bounds = PhysicalRect::new(
        monitor.x().ok()?,
        monitor.y().ok()?,
        monitor.width().ok()?,
        monitor.height().ok()?,
    );
    let name = monitor
        .name()
        .unwrap_or_else(|_| format!("monitor-{}", monitor.id().unwrap_or_default()));

    monitor_info(
        name,
        bounds,
        monitor.scale_factor().ok().map(f64::from),
        default_scale,
        monitor.is_primary().unwrap_or(false),
    )
}

/// A reported scale of exactly 1.0 carries no information on X11, so an
/// explicit `default_scale` (from `GDK_SCALE`) replaces it.
pub fn monitor_info(
    name: String,
    bounds: PhysicalRect,
    reported_scale: Option<f64>,
    default_scale: f64,
    is_primary: bool,
) -> Option<MonitorInfo> {
    if bounds.is_empty() {
        return None;
    }

    let scale_factor = match reported_scale {
        Some(scale) if scale.is_finite() && scale > 0.0 && scale != 1.0 => scale,
        _ => default_scale,
    };
    Some(MonitorInfo::new(name, bounds, scale_factor, is_primary))
}

/// When no output is flagged primary the first one becomes primary.
fn ensure_primary(monitors: &mut [MonitorInfo]) {
    if !monitors.iter().any(|m| m.is_primary) {
        if let Some(first) = monitors.first_mut() {
            first.is_primary = true;
        }
    }
}

/// Reads connected outputs from xrandr. Scaling is global on X11, taken
/// from `GDK_SCALE` when set.
#[derive(Debug, Clone)]
pub struct XrandrMonitors {
    pub scale_factor: f64,
}

impl XrandrMonitors {
    pub fn from_env() -> Self {
        let scale_factor = std::env::var("GDK_SCALE")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);

        Self { scale_factor }
    }
}

impl MonitorSource for XrandrMonitors {
    fn get_monitors(&self) -> Vec<MonitorInfo> {
        let output = match Command::new("xrandr").arg("--current").output() {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                warn!(status = %output.status, "xrandr failed");
                return Vec::new();
            }
            Err(e) => {
                warn!("xrandr unavailable: {}", e);
                return Vec::new();
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        let monitors = parse_xrandr(&text, self.scale_factor);
        debug!(count = monitors.len(), "parsed xrandr outputs");
        monitors
    }
}

/// Parse lines like `HDMI-1 connected primary 1920x1080+0+0 (normal ...)`.
/// Connected outputs without a mode (disabled) are skipped.
pub fn parse_xrandr(text: &str, scale_factor: f64) -> Vec<MonitorInfo> {
    let mut monitors: Vec<MonitorInfo> = text
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let name = tokens.next()?;
            if tokens.next()? != "connected" {
                return None;
            }

            let mut next = tokens.next()?;
            let is_primary = next == "primary";
            if is_primary {
                next = tokens.next()?;
            }

            let bounds = parse_geometry(next)?;
            Some(MonitorInfo::new(name, bounds, scale_factor, is_primary))
        })
        .collect();

    ensure_primary(&mut monitors);
    monitors
}

/// `WIDTHxHEIGHT+X+Y`, offsets may be negative (`+-1280`) or written `-1280`.
fn parse_geometry(geometry: &str) -> Option<PhysicalRect> {
    let (size, offsets) = geometry.split_at(geometry.find(['+', '-'])?);
    let (w, h) = size.split_once('x')?;
    let width: u32 = w.parse().ok()?;
    let height: u32 = h.parse().ok()?;

    let (x, rest) = parse_offset(offsets)?;
    let (y, rest) = parse_offset(rest)?;
    if !rest.is_empty() {
        return None;
    }

    Some(PhysicalRect::new(x, y, width, height))
}

fn parse_offset(s: &str) -> Option<(i32, &str)> {
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i)
        .unwrap_or(s.len());

    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Screen 0: minimum 320 x 200, current 4480 x 1440, maximum 16384 x 16384
eDP-1 connected 2560x1440+1920+0 (normal left inverted right x axis y axis) 310mm x 174mm
   2560x1440     60.00*+
HDMI-1 connected primary 1920x1080+0+180 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00*+
DP-1 disconnected (normal left inverted right x axis y axis)
DP-2 connected (normal left inverted right x axis y axis)
";

    #[test]
    fn parses_connected_outputs() {
        let monitors = parse_xrandr(SAMPLE, 1.0);
        assert_eq!(monitors.len(), 2);

        assert_eq!(monitors[0].name, "eDP-1");
        assert_eq!(monitors[0].bounds, PhysicalRect::new(1920, 0, 2560, 1440));
        assert!(!monitors[0].is_primary);

        assert_eq!(monitors[1].name, "HDMI-1");
        assert_eq!(monitors[1].bounds, PhysicalRect::new(0, 180, 1920, 1080));
        assert!(monitors[1].is_primary);
    }

    #[test]
    fn first_output_primary_when_unflagged() {
        let monitors = parse_xrandr("VGA-1 connected 1024x768+0+0 (normal)\n", 2.0);
        assert_eq!(monitors.len(), 1);
        assert!(monitors[0].is_primary);
        assert_eq!(monitors[0].scale_factor, 2.0);
    }

    #[test]
    fn negative_offsets() {
        assert_eq!(
            parse_geometry("1280x1024+-1280+0"),
            Some(PhysicalRect::new(-1280, 0, 1280, 1024))
        );
        assert_eq!(
            parse_geometry("1280x1024-1280-20"),
            Some(PhysicalRect::new(-1280, -20, 1280, 1024))
        );
        assert_eq!(parse_geometry("garbage"), None);
    }

    #[test]
    fn reported_scale_wins_over_default() {
        let bounds = PhysicalRect::new(0, 0, 3840, 2160);
        let m = monitor_info("eDP-1".into(), bounds, Some(2.0), 1.5, true).unwrap();
        assert_eq!(m.scale_factor, 2.0);

        let m = monitor_info("eDP-1".into(), bounds, Some(1.0), 1.5, true).unwrap();
        assert_eq!(m.scale_factor, 1.5);

        let m = monitor_info("eDP-1".into(), bounds, Some(f64::NAN), 1.0, true).unwrap();
        assert_eq!(m.scale_factor, 1.0);
    }

    #[test]
    fn empty_outputs_are_dropped() {
        let bounds = PhysicalRect::new(1920, 0, 0, 1080);
        assert!(monitor_info("DP-2".into(), bounds, None, 1.0, false).is_none());
    }

    #[test]
    fn first_monitor_promoted_to_primary() {
        let mut monitors = vec![
            MonitorInfo::new("A", PhysicalRect::new(0, 0, 10, 10), 1.0, false),
            MonitorInfo::new("B", PhysicalRect::new(10, 0, 10, 10), 1.0, false),
        ];
        ensure_primary(&mut monitors);
        assert!(monitors[0].is_primary);
        assert!(!monitors[1].is_primary);
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_xrandr("Can't open display\n", 1.0).is_empty());
    }
}
