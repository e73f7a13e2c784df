//! JPEG export

use crate::{ExportError, ExportResult};
use capture::PixelBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// JPEG exporter. Alpha is dropped.
pub struct JpegExporter;

impl JpegExporter {
    pub fn export(buffer: &PixelBuffer, path: &Path, quality: u8) -> ExportResult<()> {
        if !(1..=100).contains(&quality) {
            return Err(ExportError::InvalidQuality(quality));
        }

        let rgb: Vec<u8> = buffer
            .data()
            .chunks_exact(4)
            .flat_map(|bgra| [bgra[2], bgra[1], bgra[0]])
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        JpegEncoder::new_with_quality(writer, quality).write_image(
            &rgb,
            buffer.width(),
            buffer.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_rgb_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blue.jpg");

        // BGRA blue
        let buffer = PixelBuffer::filled(16, 16, [255, 0, 0, 255]);
        JpegExporter::export(&buffer, &path, 90).unwrap();

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 16));
        let [r, g, b] = decoded.get_pixel(8, 8).0;
        assert!(b > 200 && r < 40 && g < 40, "got {:?}", (r, g, b));
    }

    #[test]
    fn rejects_zero_quality() {
        let dir = tempfile::tempdir().unwrap();
        let result = JpegExporter::export(&PixelBuffer::black(2, 2), &dir.path().join("x.jpg"), 0);
        assert!(matches!(result, Err(ExportError::InvalidQuality(0))));
    }
}
