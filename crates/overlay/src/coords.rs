//! Physical <-> logical coordinate mapping
//!
//! The mapping is piecewise: every monitor has its own scale factor, so a
//! point is converted through the transform of the monitor it lies on. A
//! monitor's logical size is its physical size divided by its own scale, and
//! it is placed against the neighbour it touches (see [`MonitorSnapshot`]).
//!
//! Nothing here fails for off-screen points; the nearest monitor is used
//! instead, since drag gestures routinely leave the desktop.

use crate::{OverlayError, OverlayResult};
use capture::{LogicalPoint, LogicalRect, MonitorSnapshot, PhysicalPoint, PhysicalRect};
use std::sync::Arc;
use tracing::trace;

/// Largest width or height accepted for a capture.
pub const MAX_CAPTURE_EXTENT: u32 = 16384;

/// Logical distance within which a mapped point counts as mapping back to
/// where it came from. Covers rounding to whole physical pixels.
const ROUND_TRIP_SLACK: f64 = 1.0;

/// Offset used to pick the monitor owning the exclusive corner of a rect.
const INNER_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    monitors: Arc<MonitorSnapshot>,
}

impl CoordinateMapper {
    pub fn new(monitors: Arc<MonitorSnapshot>) -> Self {
        Self { monitors }
    }

    pub fn monitors(&self) -> &MonitorSnapshot {
        &self.monitors
    }

    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        self.monitors.clone()
    }

    /// Global physical pixel to global logical units.
    pub fn physical_to_logical(&self, point: PhysicalPoint) -> LogicalPoint {
        self.resolve_physical(point)
            .and_then(|index| self.to_logical_on(index, point))
            .unwrap_or_else(|| LogicalPoint::new(f64::from(point.x), f64::from(point.y)))
    }

    /// Global logical units to the global physical pixel, rounded.
    pub fn logical_to_physical(&self, point: LogicalPoint) -> PhysicalPoint {
        self.resolve_logical(point)
            .map(|(_, physical)| physical)
            .unwrap_or_else(|| PhysicalPoint::new(round_px(point.x), round_px(point.y)))
    }

    /// `local` is relative to a window whose top-left sits at `window_origin`
    /// in global logical space.
    pub fn window_logical_to_physical(&self, local: LogicalPoint, window_origin: LogicalPoint) -> PhysicalPoint {
        self.logical_to_physical(LogicalPoint::new(
            local.x + window_origin.x,
            local.y + window_origin.y,
        ))
    }

    pub fn physical_to_window_logical(&self, point: PhysicalPoint, window_origin: LogicalPoint) -> LogicalPoint {
        let global = self.physical_to_logical(point);
        LogicalPoint::new(global.x - window_origin.x, global.y - window_origin.y)
    }

    /// Convert corner by corner. The far corner is mapped with the transform
    /// of the monitor owning the rect's last pixel, so a rect that ends
    /// exactly on a monitor edge keeps that monitor's scale.
    pub fn physical_rect_to_logical(&self, rect: &PhysicalRect) -> LogicalRect {
        let top_left = self.physical_to_logical(rect.top_left());
        if rect.is_empty() {
            return LogicalRect::new(top_left.x, top_left.y, 0.0, 0.0);
        }

        let last_pixel = PhysicalPoint::new(rect.right() - 1, rect.bottom() - 1);
        let bottom_right = self
            .resolve_physical(last_pixel)
            .and_then(|index| self.to_logical_on(index, rect.bottom_right()))
            .unwrap_or_else(|| self.physical_to_logical(rect.bottom_right()));

        LogicalRect::from_corners(top_left, bottom_right)
    }

    pub fn logical_rect_to_physical(&self, rect: &LogicalRect) -> PhysicalRect {
        let top_left = self.logical_to_physical(rect.top_left());
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return PhysicalRect::new(top_left.x, top_left.y, 0, 0);
        }

        let inner = LogicalPoint::new(rect.right() - INNER_EPSILON, rect.bottom() - INNER_EPSILON);
        let bottom_right = self
            .monitors
            .index_containing_logical(inner)
            .or_else(|| self.resolve_logical(inner).map(|(index, _)| index))
            .and_then(|index| self.to_physical_on(index, rect.bottom_right()))
            .unwrap_or_else(|| self.logical_to_physical(rect.bottom_right()));

        PhysicalRect::from_corners(top_left, bottom_right)
    }

    /// Physical distance a point moves after a trip through logical space.
    pub fn round_trip_error(&self, point: PhysicalPoint) -> f64 {
        let back = self.logical_to_physical(self.physical_to_logical(point));
        back.distance_to(point)
    }

    /// Reject rectangles no backend should be asked to capture.
    pub fn validate_capture_region(&self, rect: &PhysicalRect) -> OverlayResult<PhysicalRect> {
        if rect.is_empty() {
            return Err(OverlayError::InvalidRegion(format!("{rect} is empty")));
        }

        if rect.width > MAX_CAPTURE_EXTENT || rect.height > MAX_CAPTURE_EXTENT {
            return Err(OverlayError::InvalidRegion(format!(
                "{rect} exceeds {MAX_CAPTURE_EXTENT}px"
            )));
        }

        if self.monitors.monitors_intersecting(rect).is_empty() {
            return Err(OverlayError::InvalidRegion(format!(
                "{rect} does not touch any monitor"
            )));
        }

        Ok(*rect)
    }

    /// Monitor containing the point, else the one with the closest centre.
    fn resolve_physical(&self, point: PhysicalPoint) -> Option<usize> {
        self.monitors
            .index_containing_physical(point)
            .or_else(|| self.monitors.nearest_physical(point))
    }

    /// Logical bounds still overlap when the monitors overlap physically, so
    /// a logical point can have several physical preimages. The first
    /// candidate whose result maps back to the same logical point wins.
    fn resolve_logical(&self, point: LogicalPoint) -> Option<(usize, PhysicalPoint)> {
        let candidates = self.logical_candidates(point);
        let mut fallback = None;

        for index in candidates {
            let Some(physical) = self.to_physical_on(index, point) else {
                continue;
            };

            if self.physical_to_logical(physical).distance_to(point) <= ROUND_TRIP_SLACK {
                return Some((index, physical));
            }

            if fallback.is_none() {
                fallback = Some((index, physical));
            }
        }

        if let Some((index, physical)) = fallback {
            trace!(%point, monitor = index, %physical, "no self-consistent monitor, using best candidate");
        }
        fallback
    }

    /// Monitors containing the point first, then the rest by centre distance.
    fn logical_candidates(&self, point: LogicalPoint) -> Vec<usize> {
        let count = self.monitors.len();
        let contains = |i: &usize| {
            self.monitors
                .logical_bounds(*i)
                .map(|b| b.contains(point))
                .unwrap_or(false)
        };

        let mut candidates: Vec<usize> = (0..count).filter(|i| contains(i)).collect();

        let mut rest: Vec<(usize, f64)> = (0..count)
            .filter(|i| !contains(i))
            .filter_map(|i| {
                self.monitors
                    .logical_bounds(i)
                    .map(|b| (i, b.center().distance_to(point)))
            })
            .collect();
        rest.sort_by(|a, b| a.1.total_cmp(&b.1));

        candidates.extend(rest.into_iter().map(|(i, _)| i));
        candidates
    }

    fn to_logical_on(&self, index: usize, point: PhysicalPoint) -> Option<LogicalPoint> {
        let monitor = self.monitors.monitor(index)?;
        let origin = self.monitors.logical_bounds(index)?;
        let scale = monitor.scale_factor;

        Some(LogicalPoint::new(
            origin.x + (f64::from(point.x) - f64::from(monitor.bounds.x)) / scale,
            origin.y + (f64::from(point.y) - f64::from(monitor.bounds.y)) / scale,
        ))
    }

    fn to_physical_on(&self, index: usize, point: LogicalPoint) -> Option<PhysicalPoint> {
        let monitor = self.monitors.monitor(index)?;
        let origin = self.monitors.logical_bounds(index)?;
        let scale = monitor.scale_factor;

        Some(PhysicalPoint::new(
            round_px(f64::from(monitor.bounds.x) + (point.x - origin.x) * scale),
            round_px(f64::from(monitor.bounds.y) + (point.y - origin.y) * scale),
        ))
    }
}

/// Float to pixel; `as` saturates at the i32 range.
fn round_px(value: f64) -> i32 {
    value.round() as i32
}
