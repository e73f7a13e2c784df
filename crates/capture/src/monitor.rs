//! Monitor enumeration and the per-session virtual desktop snapshot.

use crate::geometry::{LogicalPoint, LogicalRect, PhysicalPoint, PhysicalRect};
use tracing::{debug, warn};

/// DPI that corresponds to a scale factor of 1.0.
pub const BASE_DPI: f64 = 96.0;

/// One physical display.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorInfo {
    pub name: String,
    /// Bounds in physical pixels on the virtual desktop.
    pub bounds: PhysicalRect,
    /// Physical pixels per logical pixel.
    pub scale_factor: f64,
    /// Informational only.
    pub physical_dpi: f64,
    pub is_primary: bool,
}

impl MonitorInfo {
    pub fn new(name: impl Into<String>, bounds: PhysicalRect, scale_factor: f64, is_primary: bool) -> Self {
        let scale_factor = sanitize_scale(scale_factor);
        Self {
            name: name.into(),
            bounds,
            scale_factor,
            physical_dpi: scale_factor * BASE_DPI,
            is_primary,
        }
    }

    /// Build from the platform's effective DPI (96 = 100%).
    pub fn from_dpi(name: impl Into<String>, bounds: PhysicalRect, dpi_x: u32, is_primary: bool) -> Self {
        let dpi = if dpi_x == 0 { BASE_DPI } else { f64::from(dpi_x) };
        let mut info = Self::new(name, bounds, dpi / BASE_DPI, is_primary);
        info.physical_dpi = dpi;
        info
    }
}

fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Platform query for the attached monitors.
///
/// Implementations return an empty list when the platform query is
/// unavailable; they never fail.
pub trait MonitorSource: Send + Sync {
    fn get_monitors(&self) -> Vec<MonitorInfo>;
}

/// Fixed monitor list, for callers that already know the layout.
#[derive(Debug, Clone, Default)]
pub struct StaticMonitors(pub Vec<MonitorInfo>);

impl MonitorSource for StaticMonitors {
    fn get_monitors(&self) -> Vec<MonitorInfo> {
        self.0.clone()
    }
}

/// Immutable monitor layout for one capture session.
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    monitors: Vec<MonitorInfo>,
    logical_bounds: Vec<LogicalRect>,
    physical_desktop: PhysicalRect,
    logical_desktop: LogicalRect,
}

impl MonitorSnapshot {
    /// Query `source` once and freeze the result.
    pub fn capture(source: &dyn MonitorSource) -> Self {
        Self::new(source.get_monitors())
    }

    /// Order is primary first, then left to right, then top to bottom.
    pub fn new(mut monitors: Vec<MonitorInfo>) -> Self {
        monitors.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.bounds.x.cmp(&b.bounds.x))
                .then(a.bounds.y.cmp(&b.bounds.y))
        });

        warn_on_overlap(&monitors);

        let logical_bounds = layout_logical(&monitors);

        let physical_desktop = monitors
            .iter()
            .map(|m| m.bounds)
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or_default();

        let logical_desktop = logical_bounds
            .iter()
            .copied()
            .reduce(|acc, b| acc.union(&b))
            .unwrap_or_default();

        debug!(
            count = monitors.len(),
            %physical_desktop,
            %logical_desktop,
            "monitor snapshot taken"
        );

        Self {
            monitors,
            logical_bounds,
            physical_desktop,
            logical_desktop,
        }
    }

    pub fn get_monitors(&self) -> &[MonitorInfo] {
        &self.monitors
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn monitor(&self, index: usize) -> Option<&MonitorInfo> {
        self.monitors.get(index)
    }

    pub fn primary(&self) -> Option<&MonitorInfo> {
        self.monitors.iter().find(|m| m.is_primary).or_else(|| self.monitors.first())
    }

    /// Union of all monitor bounds in physical pixels.
    pub fn get_virtual_desktop_bounds_physical(&self) -> PhysicalRect {
        self.physical_desktop
    }

    /// Union of every monitor's logical bounds. This is piecewise: each
    /// monitor contributes its own size divided by its own scale factor.
    pub fn get_virtual_desktop_bounds_logical(&self) -> LogicalRect {
        self.logical_desktop
    }

    /// Logical bounds of the monitor at `index`.
    pub fn logical_bounds(&self, index: usize) -> Option<LogicalRect> {
        self.logical_bounds.get(index).copied()
    }

    /// Index of the first monitor containing `point`.
    pub fn index_containing_physical(&self, point: PhysicalPoint) -> Option<usize> {
        self.monitors.iter().position(|m| m.bounds.contains(point))
    }

    /// Index of the first monitor whose logical bounds contain `point`.
    pub fn index_containing_logical(&self, point: LogicalPoint) -> Option<usize> {
        self.logical_bounds.iter().position(|b| b.contains(point))
    }

    /// Index of the monitor whose physical centre is closest to `point`.
    pub fn nearest_physical(&self, point: PhysicalPoint) -> Option<usize> {
        self.monitors
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = a.bounds.center().distance_to(point);
                let db = b.bounds.center().distance_to(point);
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)
    }

    /// Monitor containing `point`, falling back to the nearest one.
    pub fn monitor_at_physical(&self, point: PhysicalPoint) -> Option<&MonitorInfo> {
        self.index_containing_physical(point)
            .or_else(|| self.nearest_physical(point))
            .and_then(|i| self.monitors.get(i))
    }

    /// Monitors overlapping `region`, largest overlap first, paired with the
    /// overlapping part.
    pub fn monitors_intersecting(&self, region: &PhysicalRect) -> Vec<(&MonitorInfo, PhysicalRect)> {
        let mut hits: Vec<(&MonitorInfo, PhysicalRect)> = self
            .monitors
            .iter()
            .filter_map(|m| m.bounds.intersection(region).map(|i| (m, i)))
            .collect();

        hits.sort_by(|a, b| b.1.area().cmp(&a.1.area()));
        hits
    }
}

/// Side of an already placed monitor that another monitor sits against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Above,
    Below,
}

fn side_of(m: &PhysicalRect, anchor: &PhysicalRect) -> Option<Side> {
    if m.right() <= anchor.x {
        Some(Side::Left)
    } else if m.x >= anchor.right() {
        Some(Side::Right)
    } else if m.bottom() <= anchor.y {
        Some(Side::Above)
    } else if m.y >= anchor.bottom() {
        Some(Side::Below)
    } else {
        None
    }
}

/// Manhattan distance between the edges of two rects; 0 when they touch.
fn edge_gap(a: &PhysicalRect, b: &PhysicalRect) -> i64 {
    let gap = |lo_a: i32, hi_a: i32, lo_b: i32, hi_b: i32| {
        (i64::from(lo_b) - i64::from(hi_a))
            .max(i64::from(lo_a) - i64::from(hi_b))
            .max(0)
    };
    gap(a.x, a.right(), b.x, b.right()) + gap(a.y, a.bottom(), b.y, b.bottom())
}

/// Logical bounds for every monitor, in the same order.
///
/// The primary sits at its physical origin divided by its own scale. Every
/// other monitor is placed against the nearest monitor already placed, on
/// the side it touches physically, so the shared edge lines up in logical
/// space and neighbours never overlap there. The gap between them and the
/// offset along the shared edge are carried over through the reference and
/// neighbour scales. A monitor that physically overlaps everything placed
/// so far falls back to physical origin / reference scale.
fn layout_logical(monitors: &[MonitorInfo]) -> Vec<LogicalRect> {
    if monitors.is_empty() {
        return Vec::new();
    }
    let reference = monitors.iter().position(|m| m.is_primary).unwrap_or(0);
    let reference_scale = monitors[reference].scale_factor;

    let size = |m: &MonitorInfo| {
        (
            f64::from(m.bounds.width) / m.scale_factor,
            f64::from(m.bounds.height) / m.scale_factor,
        )
    };
    let by_origin = |m: &MonitorInfo| {
        let (w, h) = size(m);
        LogicalRect::new(
            f64::from(m.bounds.x) / reference_scale,
            f64::from(m.bounds.y) / reference_scale,
            w,
            h,
        )
    };

    let mut placed: Vec<Option<LogicalRect>> = vec![None; monitors.len()];
    placed[reference] = Some(by_origin(&monitors[reference]));

    for _ in 1..monitors.len() {
        // Next: the unplaced monitor closest to anything already placed.
        let next = (0..monitors.len())
            .filter(|&i| placed[i].is_none())
            .min_by_key(|&i| {
                (0..monitors.len())
                    .filter(|&j| placed[j].is_some())
                    .map(|j| edge_gap(&monitors[i].bounds, &monitors[j].bounds))
                    .min()
                    .unwrap_or(i64::MAX)
            });
        let Some(index) = next else { break };
        let m = &monitors[index];

        let anchor = (0..monitors.len())
            .filter_map(|j| {
                let logical = placed[j]?;
                let side = side_of(&m.bounds, &monitors[j].bounds)?;
                Some((edge_gap(&m.bounds, &monitors[j].bounds), j, side, logical))
            })
            .min_by_key(|&(gap, j, _, _)| (gap, j));

        let rect = match anchor {
            Some((_, j, side, n)) => {
                let neighbour = &monitors[j];
                let (w, h) = size(m);
                let along_x = n.x + f64::from(m.bounds.x - neighbour.bounds.x) / neighbour.scale_factor;
                let along_y = n.y + f64::from(m.bounds.y - neighbour.bounds.y) / neighbour.scale_factor;
                match side {
                    Side::Left => {
                        let gap = f64::from(neighbour.bounds.x - m.bounds.right()) / reference_scale;
                        LogicalRect::new(n.x - gap - w, along_y, w, h)
                    }
                    Side::Right => {
                        let gap = f64::from(m.bounds.x - neighbour.bounds.right()) / reference_scale;
                        LogicalRect::new(n.right() + gap, along_y, w, h)
                    }
                    Side::Above => {
                        let gap = f64::from(neighbour.bounds.y - m.bounds.bottom()) / reference_scale;
                        LogicalRect::new(along_x, n.y - gap - h, w, h)
                    }
                    Side::Below => {
                        let gap = f64::from(m.bounds.y - neighbour.bounds.bottom()) / reference_scale;
                        LogicalRect::new(along_x, n.bottom() + gap, w, h)
                    }
                }
            }
            None => by_origin(m),
        };
        placed[index] = Some(rect);
    }

    let bounds: Vec<LogicalRect> = placed
        .into_iter()
        .zip(monitors)
        .map(|(rect, m)| rect.unwrap_or_else(|| by_origin(m)))
        .collect();

    for (i, a) in bounds.iter().enumerate() {
        for (j, b) in bounds.iter().enumerate().skip(i + 1) {
            if a.intersects(b) {
                warn!(
                    first = %monitors[i].name,
                    second = %monitors[j].name,
                    "logical bounds overlap; logical points there resolve by round trip"
                );
            }
        }
    }

    bounds
}

fn warn_on_overlap(monitors: &[MonitorInfo]) {
    for (i, a) in monitors.iter().enumerate() {
        for b in &monitors[i + 1..] {
            if let Some(overlap) = a.bounds.intersection(&b.bounds) {
                warn!(
                    first = %a.name,
                    second = %b.name,
                    %overlap,
                    "monitor bounds overlap; first match wins for hit testing"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dual_mixed_dpi() -> Vec<MonitorInfo> {
        vec![
            MonitorInfo::new("Secondary", PhysicalRect::new(-1280, 0, 2560, 1440), 2.0, false),
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
        ]
    }

    #[test]
    fn from_dpi_derives_scale() {
        let m = MonitorInfo::from_dpi("4K", PhysicalRect::new(0, 0, 3840, 2160), 192, true);
        assert_eq!(m.scale_factor, 2.0);
        assert_eq!(m.physical_dpi, 192.0);

        let fallback = MonitorInfo::from_dpi("odd", PhysicalRect::new(0, 0, 10, 10), 0, false);
        assert_eq!(fallback.scale_factor, 1.0);
    }

    #[test]
    fn primary_sorts_first() {
        let snapshot = MonitorSnapshot::new(dual_mixed_dpi());
        assert_eq!(snapshot.get_monitors()[0].name, "Primary");
        assert_eq!(snapshot.get_monitors()[1].name, "Secondary");
    }

    #[test]
    fn physical_desktop_is_union() {
        let snapshot = MonitorSnapshot::new(dual_mixed_dpi());
        assert_eq!(
            snapshot.get_virtual_desktop_bounds_physical(),
            PhysicalRect::new(-1280, 0, 3200, 1440)
        );
    }

    #[test]
    fn logical_desktop_is_piecewise() {
        let snapshot = MonitorSnapshot::new(dual_mixed_dpi());

        // Secondary overlaps the primary physically: origin -1280 / 1.0,
        // size 2560x1440 / 2.0.
        assert_eq!(
            snapshot.logical_bounds(1),
            Some(LogicalRect::new(-1280.0, 0.0, 1280.0, 720.0))
        );
        assert_eq!(
            snapshot.get_virtual_desktop_bounds_logical(),
            LogicalRect::new(-1280.0, 0.0, 3200.0, 1080.0)
        );
    }

    #[test]
    fn lower_scale_neighbour_left_of_primary_is_disjoint() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("External", PhysicalRect::new(-1920, 0, 1920, 1080), 1.0, false),
            MonitorInfo::new("Laptop", PhysicalRect::new(0, 0, 3840, 2160), 2.0, true),
        ]);

        assert_eq!(snapshot.logical_bounds(0), Some(LogicalRect::new(0.0, 0.0, 1920.0, 1080.0)));
        assert_eq!(
            snapshot.logical_bounds(1),
            Some(LogicalRect::new(-1920.0, 0.0, 1920.0, 1080.0))
        );
        assert_eq!(
            snapshot.get_virtual_desktop_bounds_logical(),
            LogicalRect::new(-1920.0, 0.0, 3840.0, 1080.0)
        );
        assert_eq!(snapshot.index_containing_logical(LogicalPoint::new(-100.0, 500.0)), Some(1));
    }

    #[test]
    fn neighbour_above_primary_shares_its_edge() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("Laptop", PhysicalRect::new(0, 0, 3840, 2160), 2.0, true),
            MonitorInfo::new("Above", PhysicalRect::new(960, -1080, 1920, 1080), 1.0, false),
        ]);

        // 960px along a 2.0x edge is 480 logical units.
        assert_eq!(
            snapshot.logical_bounds(1),
            Some(LogicalRect::new(480.0, -1080.0, 1920.0, 1080.0))
        );
    }

    #[test]
    fn chained_monitors_keep_gaps_in_reference_units() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
            MonitorInfo::new("Middle", PhysicalRect::new(1920, 0, 2560, 1440), 2.0, false),
            MonitorInfo::new("Far", PhysicalRect::new(4580, 100, 1920, 1080), 1.0, false),
        ]);

        assert_eq!(
            snapshot.logical_bounds(1),
            Some(LogicalRect::new(1920.0, 0.0, 1280.0, 720.0))
        );
        // Right of Middle with a 100px gap, 100px down Middle's 2.0x edge.
        assert_eq!(
            snapshot.logical_bounds(2),
            Some(LogicalRect::new(3300.0, 50.0, 1920.0, 1080.0))
        );
    }

    #[test]
    fn triple_monitor_bounds() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
            MonitorInfo::new("Left", PhysicalRect::new(-1920, 0, 1920, 1080), 1.0, false),
            MonitorInfo::new("Above", PhysicalRect::new(0, -1080, 1920, 1080), 1.0, false),
        ]);

        assert_eq!(
            snapshot.get_virtual_desktop_bounds_physical(),
            PhysicalRect::new(-1920, -1080, 3840, 2160)
        );
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = MonitorSnapshot::capture(&StaticMonitors::default());
        assert!(snapshot.is_empty());
        assert!(snapshot.primary().is_none());
        assert!(snapshot.get_virtual_desktop_bounds_physical().is_empty());
        assert!(snapshot.monitor_at_physical(PhysicalPoint::new(0, 0)).is_none());
    }

    #[test]
    fn nearest_monitor_for_off_screen_point() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
            MonitorInfo::new("Right", PhysicalRect::new(1920, 0, 1920, 1080), 1.25, false),
        ]);

        let m = snapshot.monitor_at_physical(PhysicalPoint::new(5000, 500));
        assert_eq!(m.map(|m| m.name.as_str()), Some("Right"));
    }

    #[test]
    fn intersecting_monitors_sorted_by_overlap() {
        let snapshot = MonitorSnapshot::new(vec![
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
            MonitorInfo::new("Right", PhysicalRect::new(1920, 0, 1920, 1080), 1.25, false),
        ]);

        let hits = snapshot.monitors_intersecting(&PhysicalRect::new(1800, 100, 300, 200));
        let names: Vec<&str> = hits.iter().map(|(m, _)| m.name.as_str()).collect();
        assert_eq!(names, vec!["Right", "Primary"]);
        assert_eq!(hits[0].1, PhysicalRect::new(1920, 100, 180, 200));
    }
}
