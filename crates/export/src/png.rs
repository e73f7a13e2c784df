//! PNG export

use crate::ExportResult;
use capture::PixelBuffer;
use image::ImageFormat;
use std::path::Path;

/// PNG exporter
pub struct PngExporter;

impl PngExporter {
    /// Write a lossless RGBA PNG.
    pub fn export(buffer: &PixelBuffer, path: &Path) -> ExportResult<()> {
        let image = buffer.to_rgba_image()?;
        image.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_channels_to_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");

        // BGRA red
        let buffer = PixelBuffer::filled(3, 2, [0, 0, 255, 255]);
        PngExporter::export(&buffer, &path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [255, 0, 0, 255]);
    }
}
