//! Zoomed view of the live pixels around the pointer

use capture::{MonitorSnapshot, PhysicalPoint, PhysicalRect};

/// Side of the captured square, in physical pixels.
pub const SOURCE_SIZE: u32 = 24;

/// Each source pixel is drawn this many pixels wide.
pub const ZOOM: u32 = 6;

/// Distance between the pointer and the zoomed view.
const POINTER_OFFSET: i32 = 24;

/// Square around `pointer`, shifted to stay on the monitor under it.
pub fn source_rect(monitors: &MonitorSnapshot, pointer: PhysicalPoint) -> Option<PhysicalRect> {
    let monitor = monitors.monitor_at_physical(pointer)?;
    let bounds = monitor.bounds;

    let width = SOURCE_SIZE.min(bounds.width);
    let height = SOURCE_SIZE.min(bounds.height);
    if width == 0 || height == 0 {
        return None;
    }

    let x = (pointer.x - (width / 2) as i32).clamp(bounds.x, bounds.right() - width as i32);
    let y = (pointer.y - (height / 2) as i32).clamp(bounds.y, bounds.bottom() - height as i32);
    Some(PhysicalRect::new(x, y, width, height))
}

/// Where to draw the zoomed view of a `source`-sized frame. Below and right
/// of the pointer, flipped to the other side on either axis where it would
/// leave `area`.
pub fn view_rect(pointer: PhysicalPoint, source: PhysicalRect, area: PhysicalRect) -> PhysicalRect {
    let width = source.width.saturating_mul(ZOOM);
    let height = source.height.saturating_mul(ZOOM);

    let mut x = pointer.x.saturating_add(POINTER_OFFSET);
    if x.saturating_add(width as i32) > area.right() {
        x = pointer.x - POINTER_OFFSET - width as i32;
    }

    let mut y = pointer.y.saturating_add(POINTER_OFFSET);
    if y.saturating_add(height as i32) > area.bottom() {
        y = pointer.y - POINTER_OFFSET - height as i32;
    }

    PhysicalRect::new(x, y, width, height)
}
