//! Export module for RegionCap
//!
//! Writes captured pixel buffers to PNG or JPEG files.

mod jpeg;
mod png;

pub use jpeg::JpegExporter;
pub use png::PngExporter;

use capture::PixelBuffer;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Capture error: {0}")]
    Capture(#[from] capture::CaptureError),

    #[error("Nothing to export: {0}x{1} image")]
    EmptyImage(u32, u32),

    #[error("Unknown image format: {0}")]
    UnknownFormat(String),

    #[error("JPEG quality must be 1-100, got {0}")]
    InvalidQuality(u8),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Export format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> ExportResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpeg),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Common export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub output_path: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: ExportFormat::Png,
            output_path: PathBuf::new(),
            jpeg_quality: 90,
        }
    }
}

/// Write `buffer` as configured, creating parent directories as needed.
pub fn export(buffer: &PixelBuffer, config: &ExportConfig) -> ExportResult<PathBuf> {
    if buffer.width() == 0 || buffer.height() == 0 {
        return Err(ExportError::EmptyImage(buffer.width(), buffer.height()));
    }

    if let Some(parent) = config.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    match config.format {
        ExportFormat::Png => PngExporter::export(buffer, &config.output_path)?,
        ExportFormat::Jpeg => {
            JpegExporter::export(buffer, &config.output_path, config.jpeg_quality)?
        }
    }

    tracing::info!(
        path = %config.output_path.display(),
        format = %config.format,
        width = buffer.width(),
        height = buffer.height(),
        "exported capture"
    );

    Ok(config.output_path.clone())
}
