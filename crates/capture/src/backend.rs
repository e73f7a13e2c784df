//! Capture backends and the fallback chain
//!
//! A [`CapturePrimitive`] knows how to grab pixels from one monitor. The
//! [`CompositingBackend`] wraps a primitive and turns it into a
//! [`CaptureBackend`]: it clamps requests to the desktop, stitches per-monitor
//! grabs onto a black canvas and composites the cursor. A [`FallbackChain`]
//! tries several backends in order until one produces a frame.

use crate::cursor::CursorSource;
use crate::frame::PixelBuffer;
use crate::geometry::{PhysicalPoint, PhysicalRect};
use crate::monitor::{MonitorInfo, MonitorSnapshot};
use crate::{platform, CaptureError, CaptureResult};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Capture strategies, most capable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// GPU output duplication.
    HardwareDuplication,
    /// Plain device-context blit.
    GdiBlit,
    /// External desktop screenshot tool or portal.
    PortalBased,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::HardwareDuplication => "hardware-duplication",
            BackendKind::GdiBlit => "gdi-blit",
            BackendKind::PortalBased => "portal",
        };
        f.write_str(name)
    }
}

/// What a primitive can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub kind: BackendKind,
    pub name: &'static str,
    pub hardware_accelerated: bool,
    /// Raw frames may contain the OS cursor, so it has to be hidden while
    /// grabbing.
    pub may_include_system_cursor: bool,
}

/// Per-request options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub show_cursor: bool,
}

/// Raw pixel source for a single monitor.
pub trait CapturePrimitive: Send {
    fn capabilities(&self) -> BackendCapabilities;

    /// Called once before the per-monitor grabs of one request.
    fn begin_frame(&mut self, _monitors: &MonitorSnapshot) -> CaptureResult<()> {
        Ok(())
    }

    /// Grab `region` (desktop coordinates, fully inside `monitor`) at native
    /// resolution. The buffer must be exactly `region.width` x `region.height`.
    fn grab(&mut self, monitor: &MonitorInfo, region: PhysicalRect) -> CaptureResult<PixelBuffer>;

    /// Called after the grabs, on success and failure.
    fn end_frame(&mut self) {}
}

/// Produces a composited image for a desktop rectangle.
///
/// Failures are reported as `None`; callers fall back to another backend.
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> BackendCapabilities;

    fn capture_rect(&mut self, rect: PhysicalRect, show_cursor: bool) -> Option<PixelBuffer>;

    fn capture_full_screen(&mut self, show_cursor: bool) -> Option<PixelBuffer>;
}

/// Stitches per-monitor grabs into one buffer.
pub struct CompositingBackend {
    primitive: Box<dyn CapturePrimitive>,
    monitors: Arc<MonitorSnapshot>,
    cursor: Option<Box<dyn CursorSource>>,
}

impl CompositingBackend {
    pub fn new(primitive: Box<dyn CapturePrimitive>, monitors: Arc<MonitorSnapshot>) -> Self {
        Self {
            primitive,
            monitors,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Box<dyn CursorSource>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn monitors(&self) -> &MonitorSnapshot {
        &self.monitors
    }

    /// Capture `rect` or report why it failed.
    pub fn try_capture(&mut self, rect: PhysicalRect, show_cursor: bool) -> CaptureResult<PixelBuffer> {
        if rect.is_empty() {
            return Err(CaptureError::InvalidRegion(format!("{rect} is empty")));
        }

        let desktop = self.monitors.get_virtual_desktop_bounds_physical();
        let clamped = rect.clamp_to(&desktop);
        if clamped.is_empty() {
            return Err(CaptureError::InvalidRegion(format!(
                "{rect} is outside the desktop {desktop}"
            )));
        }

        let caps = self.primitive.capabilities();
        let mut canvas = PixelBuffer::black(rect.width, rect.height);

        {
            // Only a composited cursor can end up twice in the frame.
            let _hidden = match &self.cursor {
                Some(cursor) if show_cursor && caps.may_include_system_cursor => {
                    cursor.suppress_system_cursor()
                }
                _ => crate::cursor::CursorSuppression::none(),
            };

            self.primitive.begin_frame(&self.monitors)?;
            let result = Self::stitch(
                self.primitive.as_mut(),
                &self.monitors,
                rect,
                clamped,
                &mut canvas,
            );
            self.primitive.end_frame();
            result?;
        }

        if show_cursor {
            if let Some(image) = self.cursor.as_ref().and_then(|c| c.cursor_image()) {
                if image.bounds().intersects(&rect) {
                    image.composite_onto(&mut canvas, PhysicalPoint::new(rect.x, rect.y));
                }
            }
        }

        Ok(canvas)
    }

    fn stitch(
        primitive: &mut dyn CapturePrimitive,
        monitors: &MonitorSnapshot,
        rect: PhysicalRect,
        clamped: PhysicalRect,
        canvas: &mut PixelBuffer,
    ) -> CaptureResult<()> {
        for (monitor, part) in monitors.monitors_intersecting(&clamped) {
            let pixels = primitive.grab(monitor, part)?;
            if pixels.width() != part.width || pixels.height() != part.height {
                return Err(CaptureError::InvalidRegion(format!(
                    "{} returned {}x{} for {}",
                    monitor.name,
                    pixels.width(),
                    pixels.height(),
                    part
                )));
            }

            debug!(monitor = %monitor.name, %part, "blit monitor region");
            canvas.blit(&pixels, part.x - rect.x, part.y - rect.y);
        }

        Ok(())
    }
}

impl CaptureBackend for CompositingBackend {
    fn kind(&self) -> BackendKind {
        self.primitive.capabilities().kind
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.primitive.capabilities()
    }

    fn capture_rect(&mut self, rect: PhysicalRect, show_cursor: bool) -> Option<PixelBuffer> {
        match self.try_capture(rect, show_cursor) {
            Ok(buffer) => Some(buffer),
            Err(e) => {
                warn!(backend = %self.kind(), %rect, "capture failed: {}", e);
                None
            }
        }
    }

    fn capture_full_screen(&mut self, show_cursor: bool) -> Option<PixelBuffer> {
        let desktop = self.monitors.get_virtual_desktop_bounds_physical();
        self.capture_rect(desktop, show_cursor)
    }
}

/// Ordered list of backends; the first one that succeeds wins.
pub struct FallbackChain {
    backends: Vec<Box<dyn CaptureBackend>>,
    active: usize,
}

impl FallbackChain {
    pub fn new(backends: Vec<Box<dyn CaptureBackend>>) -> Self {
        Self { backends, active: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    fn run(&mut self, mut attempt: impl FnMut(&mut dyn CaptureBackend) -> Option<PixelBuffer>) -> Option<PixelBuffer> {
        for (index, backend) in self.backends.iter_mut().enumerate() {
            if let Some(buffer) = attempt(backend.as_mut()) {
                if index != self.active {
                    info!(backend = %backend.kind(), "switched capture backend");
                    self.active = index;
                }
                return Some(buffer);
            }
            warn!(backend = %backend.kind(), "backend failed, trying next");
        }

        None
    }
}

impl CaptureBackend for FallbackChain {
    /// Kind of the backend that served the last successful capture.
    fn kind(&self) -> BackendKind {
        self.backends
            .get(self.active)
            .map(|b| b.kind())
            .unwrap_or(BackendKind::GdiBlit)
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.backends
            .get(self.active)
            .map(|b| b.capabilities())
            .unwrap_or(BackendCapabilities {
                kind: BackendKind::GdiBlit,
                name: "none",
                hardware_accelerated: false,
                may_include_system_cursor: false,
            })
    }

    fn capture_rect(&mut self, rect: PhysicalRect, show_cursor: bool) -> Option<PixelBuffer> {
        self.run(|b| b.capture_rect(rect, show_cursor))
    }

    fn capture_full_screen(&mut self, show_cursor: bool) -> Option<PixelBuffer> {
        self.run(|b| b.capture_full_screen(show_cursor))
    }
}

/// Build the fallback chain from whatever primitives this machine supports.
pub fn probe_backends(monitors: Arc<MonitorSnapshot>) -> FallbackChain {
    let backends: Vec<Box<dyn CaptureBackend>> = platform::available_primitives()
        .into_iter()
        .map(|primitive| {
            let mut backend = CompositingBackend::new(primitive, monitors.clone());
            if let Some(cursor) = platform::cursor_source() {
                backend = backend.with_cursor(cursor);
            }
            Box::new(backend) as Box<dyn CaptureBackend>
        })
        .collect();

    let chain = FallbackChain::new(backends);
    info!(backends = ?chain.kinds(), "capture backends probed");
    chain
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cursor::{CursorImage, CursorSuppression};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Fills each grab with a colour derived from the monitor's scale.
    pub(crate) struct FakePrimitive {
        pub kind: BackendKind,
        pub fail: bool,
        pub includes_cursor: bool,
        pub grabs: Arc<Mutex<Vec<(String, PhysicalRect)>>>,
    }

    impl FakePrimitive {
        pub(crate) fn new(kind: BackendKind) -> Self {
            Self {
                kind,
                fail: false,
                includes_cursor: true,
                grabs: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    pub(crate) fn shade(monitor: &MonitorInfo) -> [u8; 4] {
        let v = (monitor.scale_factor * 100.0) as u8;
        [v, v, v, 255]
    }

    impl CapturePrimitive for FakePrimitive {
        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                kind: self.kind,
                name: "fake",
                hardware_accelerated: false,
                may_include_system_cursor: self.includes_cursor,
            }
        }

        fn grab(&mut self, monitor: &MonitorInfo, region: PhysicalRect) -> CaptureResult<PixelBuffer> {
            if self.fail {
                return Err(CaptureError::Duplication("device lost".into()));
            }
            self.grabs.lock().push((monitor.name.clone(), region));
            Ok(PixelBuffer::filled(region.width, region.height, shade(monitor)))
        }
    }

    struct FakeCursor {
        hidden: Arc<AtomicBool>,
        restored: Arc<AtomicBool>,
    }

    impl CursorSource for FakeCursor {
        fn cursor_position(&self) -> Option<PhysicalPoint> {
            Some(PhysicalPoint::new(10, 10))
        }

        fn cursor_image(&self) -> Option<CursorImage> {
            Some(CursorImage {
                position: PhysicalPoint::new(10, 10),
                hotspot: PhysicalPoint::new(0, 0),
                image: PixelBuffer::filled(2, 2, [1, 2, 3, 255]),
            })
        }

        fn suppress_system_cursor(&self) -> CursorSuppression {
            self.hidden.store(true, Ordering::SeqCst);
            let restored = self.restored.clone();
            CursorSuppression::new(move || restored.store(true, Ordering::SeqCst))
        }
    }

    fn mixed_dpi_desktop() -> Arc<MonitorSnapshot> {
        Arc::new(MonitorSnapshot::new(vec![
            MonitorInfo::new("Primary", PhysicalRect::new(0, 0, 1920, 1080), 1.0, true),
            MonitorInfo::new("Right", PhysicalRect::new(1920, 0, 2560, 1440), 2.0, false),
        ]))
    }

    #[test]
    fn spanning_capture_has_requested_physical_size() {
        let fake = FakePrimitive::new(BackendKind::GdiBlit);
        let grabs = fake.grabs.clone();
        let mut backend = CompositingBackend::new(Box::new(fake), mixed_dpi_desktop());

        let rect = PhysicalRect::new(1800, 100, 400, 300);
        let buffer = backend.capture_rect(rect, false).unwrap();

        assert_eq!((buffer.width(), buffer.height()), (400, 300));
        assert_eq!(buffer.pixel(0, 0), Some([100, 100, 100, 255]));
        assert_eq!(buffer.pixel(399, 0), Some([200, 200, 200, 255]));

        let grabs = grabs.lock();
        assert_eq!(grabs.len(), 2);
        assert!(grabs.contains(&("Right".to_string(), PhysicalRect::new(1920, 100, 280, 300))));
        assert!(grabs.contains(&("Primary".to_string(), PhysicalRect::new(1800, 100, 120, 300))));
    }

    #[test]
    fn area_outside_monitors_is_black() {
        let mut backend = CompositingBackend::new(
            Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
            mixed_dpi_desktop(),
        );

        // Below the primary, beside the taller right monitor.
        let buffer = backend.capture_rect(PhysicalRect::new(1900, 1000, 40, 200), false).unwrap();
        assert_eq!((buffer.width(), buffer.height()), (40, 200));
        assert_eq!(buffer.pixel(5, 150), Some([0, 0, 0, 255]));
        assert_eq!(buffer.pixel(30, 150), Some([200, 200, 200, 255]));
    }

    #[test]
    fn rect_outside_desktop_fails() {
        let mut backend = CompositingBackend::new(
            Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
            mixed_dpi_desktop(),
        );
        assert!(backend.capture_rect(PhysicalRect::new(-5000, -5000, 10, 10), false).is_none());
        assert!(backend.capture_rect(PhysicalRect::new(0, 0, 0, 10), false).is_none());
    }

    #[test]
    fn full_screen_covers_virtual_desktop() {
        let mut backend = CompositingBackend::new(
            Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
            mixed_dpi_desktop(),
        );
        let buffer = backend.capture_full_screen(false).unwrap();
        assert_eq!((buffer.width(), buffer.height()), (4480, 1440));
    }

    #[test]
    fn cursor_hidden_during_grab_and_composited_after() {
        let hidden = Arc::new(AtomicBool::new(false));
        let restored = Arc::new(AtomicBool::new(false));
        let cursor = FakeCursor {
            hidden: hidden.clone(),
            restored: restored.clone(),
        };

        let mut backend = CompositingBackend::new(
            Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
            mixed_dpi_desktop(),
        )
        .with_cursor(Box::new(cursor));

        let buffer = backend.capture_rect(PhysicalRect::new(0, 0, 20, 20), true).unwrap();
        assert!(hidden.load(Ordering::SeqCst));
        assert!(restored.load(Ordering::SeqCst));
        assert_eq!(buffer.pixel(10, 10), Some([1, 2, 3, 255]));
        assert_eq!(buffer.pixel(0, 0), Some([100, 100, 100, 255]));
    }

    #[test]
    fn system_cursor_left_alone_unless_composited() {
        let hidden = Arc::new(AtomicBool::new(false));
        let cursor = FakeCursor {
            hidden: hidden.clone(),
            restored: Arc::default(),
        };
        let mut backend = CompositingBackend::new(
            Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
            mixed_dpi_desktop(),
        )
        .with_cursor(Box::new(cursor));

        let buffer = backend.capture_rect(PhysicalRect::new(0, 0, 20, 20), false).unwrap();
        assert!(!hidden.load(Ordering::SeqCst));
        assert_eq!(buffer.pixel(10, 10), Some([100, 100, 100, 255]));
    }

    #[test]
    fn cursor_free_primitive_never_hides_the_cursor() {
        let hidden = Arc::new(AtomicBool::new(false));
        let cursor = FakeCursor {
            hidden: hidden.clone(),
            restored: Arc::default(),
        };
        let mut primitive = FakePrimitive::new(BackendKind::HardwareDuplication);
        primitive.includes_cursor = false;
        let mut backend = CompositingBackend::new(Box::new(primitive), mixed_dpi_desktop())
            .with_cursor(Box::new(cursor));

        let buffer = backend.capture_rect(PhysicalRect::new(0, 0, 20, 20), true).unwrap();
        assert!(!hidden.load(Ordering::SeqCst));
        assert_eq!(buffer.pixel(10, 10), Some([1, 2, 3, 255]));
    }

    #[test]
    fn chain_falls_back_to_next_backend() {
        let monitors = mixed_dpi_desktop();
        let mut failing = FakePrimitive::new(BackendKind::HardwareDuplication);
        failing.fail = true;

        let mut chain = FallbackChain::new(vec![
            Box::new(CompositingBackend::new(Box::new(failing), monitors.clone())),
            Box::new(CompositingBackend::new(
                Box::new(FakePrimitive::new(BackendKind::GdiBlit)),
                monitors,
            )),
        ]);

        assert_eq!(chain.kind(), BackendKind::HardwareDuplication);
        let buffer = chain.capture_rect(PhysicalRect::new(0, 0, 10, 10), false);
        assert!(buffer.is_some());
        assert_eq!(chain.kind(), BackendKind::GdiBlit);
    }

    #[test]
    fn empty_chain_returns_none() {
        let mut chain = FallbackChain::new(Vec::new());
        assert!(chain.is_empty());
        assert!(chain.capture_full_screen(false).is_none());
    }
}
