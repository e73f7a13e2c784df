//! Cursor shape and position for post-capture compositing

use crate::frame::PixelBuffer;
use crate::geometry::{PhysicalPoint, PhysicalRect};

/// Cursor bitmap with its desktop placement.
#[derive(Debug, Clone)]
pub struct CursorImage {
    /// Desktop position of the pointer.
    pub position: PhysicalPoint,
    /// Offset of the pointer tip inside `image`.
    pub hotspot: PhysicalPoint,
    pub image: PixelBuffer,
}

impl CursorImage {
    /// Where the bitmap lands on the desktop.
    pub fn bounds(&self) -> PhysicalRect {
        PhysicalRect::new(
            self.position.x - self.hotspot.x,
            self.position.y - self.hotspot.y,
            self.image.width(),
            self.image.height(),
        )
    }

    /// Draw onto `canvas`, whose top-left sits at `origin` on the desktop.
    pub fn composite_onto(&self, canvas: &mut PixelBuffer, origin: PhysicalPoint) {
        let bounds = self.bounds();
        canvas.blend(&self.image, bounds.x - origin.x, bounds.y - origin.y);
    }
}

/// Recover straight-alpha BGRA from the same shape drawn once over black
/// and once over white. Works for monochrome and colour cursors alike.
pub fn alpha_from_backgrounds(on_black: &[u8], on_white: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(on_black.len());

    for (b, w) in on_black.chunks_exact(4).zip(on_white.chunks_exact(4)) {
        let spread = (0..3)
            .map(|c| w[c].saturating_sub(b[c]))
            .max()
            .unwrap_or(0);
        let alpha = 255 - spread;

        if alpha == 0 {
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }

        for c in 0..3 {
            let v = u32::from(b[c]) * 255 / u32::from(alpha);
            out.push(v.min(255) as u8);
        }
        out.push(alpha);
    }

    out
}

/// Restores the system cursor when dropped.
pub struct CursorSuppression {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl CursorSuppression {
    pub fn new(restore: impl FnOnce() + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    /// Nothing was hidden.
    pub fn none() -> Self {
        Self { restore: None }
    }
}

impl Drop for CursorSuppression {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// Platform access to the pointer.
pub trait CursorSource: Send {
    fn cursor_position(&self) -> Option<PhysicalPoint>;

    /// Current shape, already placed at the pointer position.
    fn cursor_image(&self) -> Option<CursorImage>;

    /// Hide the OS cursor until the returned guard is dropped.
    fn suppress_system_cursor(&self) -> CursorSuppression {
        CursorSuppression::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn composite_uses_hotspot() {
        let cursor = CursorImage {
            position: PhysicalPoint::new(105, 52),
            hotspot: PhysicalPoint::new(1, 2),
            image: PixelBuffer::filled(2, 2, [255, 255, 255, 255]),
        };
        assert_eq!(cursor.bounds(), PhysicalRect::new(104, 50, 2, 2));

        let mut canvas = PixelBuffer::black(10, 10);
        cursor.composite_onto(&mut canvas, PhysicalPoint::new(100, 50));
        assert_eq!(canvas.pixel(4, 0), Some([255, 255, 255, 255]));
        assert_eq!(canvas.pixel(3, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn alpha_recovered_from_two_backgrounds() {
        // Opaque red, fully transparent, half-transparent white.
        let on_black = [0, 0, 255, 255, 0, 0, 0, 255, 128, 128, 128, 255];
        let on_white = [0, 0, 255, 255, 255, 255, 255, 255, 255, 255, 255, 255];

        let out = alpha_from_backgrounds(&on_black, &on_white);
        assert_eq!(&out[0..4], &[0, 0, 255, 255]);
        assert_eq!(out[7], 0);
        assert_eq!(out[11], 128);
        assert_eq!(out[8], 255);
    }

    #[test]
    fn suppression_restores_on_drop() {
        let restored = Arc::new(AtomicBool::new(false));
        {
            let flag = restored.clone();
            let _guard = CursorSuppression::new(move || flag.store(true, Ordering::SeqCst));
            assert!(!restored.load(Ordering::SeqCst));
        }
        assert!(restored.load(Ordering::SeqCst));
    }
}
