//! Coordinate-space aware points and rectangles.
//!
//! Physical values are device pixels on the virtual desktop. Logical values
//! are DPI-scaled units as seen by the UI layer. The two are kept as distinct
//! types so they can never be mixed up by accident; converting between them
//! always goes through a monitor's scale factor.

use std::fmt;

/// Point in physical (device) pixels on the virtual desktop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PhysicalPoint {
    pub x: i32,
    pub y: i32,
}

impl PhysicalPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in physical pixels.
    pub fn distance_to(&self, other: PhysicalPoint) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

impl fmt::Display for PhysicalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})px", self.x, self.y)
    }
}

/// Point in logical (DPI-scaled) units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogicalPoint {
    pub x: f64,
    pub y: f64,
}

impl LogicalPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: LogicalPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for LogicalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})lp", self.x, self.y)
    }
}

/// Rectangle in physical pixels. `x`/`y` may be negative for monitors
/// left of or above the primary display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PhysicalRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl PhysicalRect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Bounding box of two corner points, in any order.
    pub fn from_corners(a: PhysicalPoint, b: PhysicalPoint) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        let width = (i64::from(a.x) - i64::from(b.x)).unsigned_abs() as u32;
        let height = (i64::from(a.y) - i64::from(b.y)).unsigned_abs() as u32;

        Self::new(x, y, width, height)
    }

    /// Right edge (exclusive), saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(extent(self.width))
    }

    /// Bottom edge (exclusive), saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(extent(self.height))
    }

    pub fn top_left(&self) -> PhysicalPoint {
        PhysicalPoint::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> PhysicalPoint {
        PhysicalPoint::new(self.right(), self.bottom())
    }

    pub fn center(&self) -> PhysicalPoint {
        PhysicalPoint::new(
            self.x.saturating_add(extent(self.width / 2)),
            self.y.saturating_add(extent(self.height / 2)),
        )
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, point: PhysicalPoint) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &PhysicalRect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Overlapping area of two rectangles, `None` when they only touch or
    /// are disjoint.
    pub fn intersection(&self, other: &PhysicalRect) -> Option<PhysicalRect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if left < right && top < bottom {
            Some(PhysicalRect::new(left, top, span(left, right), span(top, bottom)))
        } else {
            None
        }
    }

    pub fn union(&self, other: &PhysicalRect) -> PhysicalRect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());

        PhysicalRect::new(left, top, span(left, right), span(top, bottom))
    }

    pub fn offset(&self, dx: i32, dy: i32) -> PhysicalRect {
        PhysicalRect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Clamp to `bounds`; an empty rectangle when there is no overlap.
    pub fn clamp_to(&self, bounds: &PhysicalRect) -> PhysicalRect {
        self.intersection(bounds)
            .unwrap_or_else(|| PhysicalRect::new(self.x, self.y, 0, 0))
    }
}

fn extent(length: u32) -> i32 {
    i32::try_from(length).unwrap_or(i32::MAX)
}

fn span(start: i32, end: i32) -> u32 {
    u32::try_from(i64::from(end) - i64::from(start)).unwrap_or(0)
}

impl fmt::Display for PhysicalRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@({}, {})px", self.width, self.height, self.x, self.y)
    }
}

/// Rectangle in logical units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LogicalRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LogicalRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_corners(a: LogicalPoint, b: LogicalPoint) -> Self {
        Self::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (a.x - b.x).abs(),
            (a.y - b.y).abs(),
        )
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn top_left(&self) -> LogicalPoint {
        LogicalPoint::new(self.x, self.y)
    }

    pub fn bottom_right(&self) -> LogicalPoint {
        LogicalPoint::new(self.right(), self.bottom())
    }

    pub fn center(&self) -> LogicalPoint {
        LogicalPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, point: LogicalPoint) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &LogicalRect) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    pub fn union(&self, other: &LogicalRect) -> LogicalRect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        LogicalRect::new(
            left,
            top,
            self.right().max(other.right()) - left,
            self.bottom().max(other.bottom()) - top,
        )
    }
}

impl fmt::Display for LogicalRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}x{:.1}@({:.1}, {:.1})lp",
            self.width, self.height, self.x, self.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_normalizes_any_drag_direction() {
        let a = PhysicalPoint::new(300, 50);
        let b = PhysicalPoint::new(100, 250);

        assert_eq!(PhysicalRect::from_corners(a, b), PhysicalRect::new(100, 50, 200, 200));
        assert_eq!(PhysicalRect::from_corners(b, a), PhysicalRect::new(100, 50, 200, 200));
    }

    #[test]
    fn from_corners_handles_negative_coordinates() {
        let rect = PhysicalRect::from_corners(PhysicalPoint::new(-1280, 10), PhysicalPoint::new(40, -20));
        assert_eq!(rect, PhysicalRect::new(-1280, -20, 1320, 30));
    }

    #[test]
    fn contains_is_half_open() {
        let rect = PhysicalRect::new(0, 0, 1920, 1080);
        assert!(rect.contains(PhysicalPoint::new(0, 0)));
        assert!(rect.contains(PhysicalPoint::new(1919, 1079)));
        assert!(!rect.contains(PhysicalPoint::new(1920, 500)));
        assert!(!rect.contains(PhysicalPoint::new(-1, 500)));
    }

    #[test]
    fn intersection_of_adjacent_monitors_is_none() {
        let left = PhysicalRect::new(-1920, 0, 1920, 1080);
        let right = PhysicalRect::new(0, 0, 1920, 1080);
        assert!(left.intersection(&right).is_none());
        assert!(!left.intersects(&right));
    }

    #[test]
    fn intersection_and_union() {
        let a = PhysicalRect::new(1800, 100, 300, 200);
        let b = PhysicalRect::new(1920, 0, 1920, 1080);

        assert_eq!(a.intersection(&b), Some(PhysicalRect::new(1920, 100, 180, 200)));
        assert_eq!(a.union(&b), PhysicalRect::new(1800, 0, 2040, 1080));
    }

    #[test]
    fn clamp_outside_bounds_is_empty() {
        let bounds = PhysicalRect::new(0, 0, 1920, 1080);
        let clamped = PhysicalRect::new(5000, 5000, 100, 100).clamp_to(&bounds);
        assert!(clamped.is_empty());
    }

    #[test]
    fn physical_distance() {
        let a = PhysicalPoint::new(0, 0);
        assert_eq!(a.distance_to(PhysicalPoint::new(3, 4)), 5.0);
    }

    #[test]
    fn edges_saturate_for_huge_extents() {
        let rect = PhysicalRect::new(i32::MAX - 10, -5, u32::MAX, u32::MAX);
        assert_eq!(rect.right(), i32::MAX);
        assert_eq!(rect.bottom(), i32::MAX);
        assert_eq!(rect.center(), PhysicalPoint::new(i32::MAX, i32::MAX - 5));

        let wide = PhysicalRect::new(i32::MIN, 0, 10, 10).union(&PhysicalRect::new(i32::MAX - 10, 0, 10, 10));
        assert_eq!(wide.width, u32::MAX);
        assert!(rect.contains(PhysicalPoint::new(i32::MAX - 1, 0)));
    }

    #[test]
    fn logical_rects_touching_do_not_intersect() {
        let left = LogicalRect::new(-1920.0, 0.0, 1920.0, 1080.0);
        let right = LogicalRect::new(0.0, 0.0, 1920.0, 1080.0);
        assert!(!left.intersects(&right));
        assert!(left.intersects(&LogicalRect::new(-1.0, 10.0, 5.0, 5.0)));
    }

    #[test]
    fn logical_rect_corners_and_union() {
        let r = LogicalRect::from_corners(LogicalPoint::new(50.0, 50.0), LogicalPoint::new(-100.0, 10.0));
        assert_eq!(r, LogicalRect::new(-100.0, 10.0, 150.0, 40.0));

        let u = r.union(&LogicalRect::new(0.0, 0.0, 10.0, 100.0));
        assert_eq!(u, LogicalRect::new(-100.0, 0.0, 150.0, 100.0));
    }
}
