//! Captured pixel data

use crate::geometry::PhysicalRect;
use crate::{CaptureError, CaptureResult};
use image::{ImageBuffer, RgbaImage};

const BPP: usize = 4;

/// 32-bit BGRA pixels, top-down, tightly packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Wrap raw BGRA bytes. The length must be exactly `width * height * 4`.
    pub fn from_bgra(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let expected = width as usize * height as usize * BPP;
        if data.len() != expected {
            return Err(CaptureError::InvalidRegion(format!(
                "buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self { data, width, height })
    }

    /// Buffer filled with one BGRA colour.
    pub fn filled(width: u32, height: u32, bgra: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * BPP);
        for _ in 0..count {
            data.extend_from_slice(&bgra);
        }

        Self { data, width, height }
    }

    /// Opaque black, the background for areas outside every monitor.
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0, 255])
    }

    /// Convert from an RGBA image (e.g. a decoded PNG).
    pub fn from_rgba_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = img.into_raw();
        for chunk in data.chunks_exact_mut(BPP) {
            chunk.swap(0, 2);
        }

        Self { data, width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BPP
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride() + x as usize * BPP;
        let px = &self.data[offset..offset + BPP];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy `src` into this buffer with its top-left at (`dx`, `dy`).
    /// Parts falling outside are clipped.
    pub fn blit(&mut self, src: &PixelBuffer, dx: i32, dy: i32) {
        let Some((sx, sy, dx, dy, w, h)) = self.clip(src, dx, dy) else {
            return;
        };

        let row_bytes = w * BPP;
        for row in 0..h {
            let src_offset = (sy + row) * src.stride() + sx * BPP;
            let dst_offset = (dy + row) * self.stride() + dx * BPP;
            self.data[dst_offset..dst_offset + row_bytes]
                .copy_from_slice(&src.data[src_offset..src_offset + row_bytes]);
        }
    }

    /// Alpha-blend `src` over this buffer (straight alpha).
    pub fn blend(&mut self, src: &PixelBuffer, dx: i32, dy: i32) {
        let Some((sx, sy, dx, dy, w, h)) = self.clip(src, dx, dy) else {
            return;
        };

        for row in 0..h {
            for col in 0..w {
                let s = (sy + row) * src.stride() + (sx + col) * BPP;
                let d = (dy + row) * self.stride() + (dx + col) * BPP;
                let alpha = u32::from(src.data[s + 3]);
                if alpha == 0 {
                    continue;
                }
                for c in 0..3 {
                    let sc = u32::from(src.data[s + c]);
                    let dc = u32::from(self.data[d + c]);
                    self.data[d + c] = ((sc * alpha + dc * (255 - alpha)) / 255) as u8;
                }
                self.data[d + 3] = 255;
            }
        }
    }

    /// Returns (src_x, src_y, dst_x, dst_y, width, height) of the visible part.
    fn clip(&self, src: &PixelBuffer, dx: i32, dy: i32) -> Option<(usize, usize, usize, usize, usize, usize)> {
        let dst = PhysicalRect::new(0, 0, self.width, self.height);
        let placed = PhysicalRect::new(dx, dy, src.width, src.height);
        let visible = dst.intersection(&placed)?;

        Some((
            (visible.x - dx) as usize,
            (visible.y - dy) as usize,
            visible.x as usize,
            visible.y as usize,
            visible.width as usize,
            visible.height as usize,
        ))
    }

    /// Crop to `rect`, given in buffer coordinates. The result is clipped to
    /// the buffer.
    pub fn crop(&self, rect: &PhysicalRect) -> PixelBuffer {
        let bounds = PhysicalRect::new(0, 0, self.width, self.height);
        let Some(area) = rect.intersection(&bounds) else {
            return PixelBuffer::filled(0, 0, [0; 4]);
        };

        let mut out = PixelBuffer::filled(area.width, area.height, [0; 4]);
        out.blit(self, -area.x, -area.y);
        out
    }

    /// Convert BGRA data to an RGBA image.
    pub fn to_rgba_image(&self) -> CaptureResult<RgbaImage> {
        let mut rgba_data = self.data.clone();
        for chunk in rgba_data.chunks_exact_mut(BPP) {
            chunk.swap(0, 2);
        }

        ImageBuffer::from_raw(self.width, self.height, rgba_data)
            .ok_or_else(|| CaptureError::InvalidRegion("pixel buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [0, 0, 255, 255];
    const BLUE: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn from_bgra_checks_length() {
        assert!(PixelBuffer::from_bgra(2, 2, vec![0; 16]).is_ok());
        assert!(PixelBuffer::from_bgra(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn blit_clips_at_edges() {
        let mut canvas = PixelBuffer::black(4, 4);
        let patch = PixelBuffer::filled(3, 3, RED);
        canvas.blit(&patch, 2, -1);

        assert_eq!(canvas.pixel(2, 0), Some(RED));
        assert_eq!(canvas.pixel(3, 1), Some(RED));
        assert_eq!(canvas.pixel(3, 2), Some([0, 0, 0, 255]));
        assert_eq!(canvas.pixel(1, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn blit_fully_outside_is_noop() {
        let mut canvas = PixelBuffer::black(4, 4);
        canvas.blit(&PixelBuffer::filled(2, 2, RED), 10, 10);
        assert_eq!(canvas, PixelBuffer::black(4, 4));
    }

    #[test]
    fn crop_returns_requested_region() {
        let mut canvas = PixelBuffer::black(10, 10);
        canvas.blit(&PixelBuffer::filled(2, 2, BLUE), 5, 5);

        let cropped = canvas.crop(&PhysicalRect::new(4, 4, 4, 4));
        assert_eq!((cropped.width(), cropped.height()), (4, 4));
        assert_eq!(cropped.pixel(1, 1), Some(BLUE));
        assert_eq!(cropped.pixel(0, 0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn blend_respects_alpha() {
        let mut canvas = PixelBuffer::black(1, 1);
        canvas.blend(&PixelBuffer::filled(1, 1, [255, 255, 255, 0]), 0, 0);
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 255]));

        canvas.blend(&PixelBuffer::filled(1, 1, [255, 255, 255, 255]), 0, 0);
        assert_eq!(canvas.pixel(0, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn rgba_conversion_swaps_channels() {
        let buf = PixelBuffer::filled(1, 1, RED);
        let img = buf.to_rgba_image().unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(PixelBuffer::from_rgba_image(img), buf);
    }
}
