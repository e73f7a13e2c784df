//! Region capture session
//!
//! Owns the snapshots and the selection machine for one capture, and a
//! background worker that talks to the capture backend so the event thread
//! never blocks on a frame.

use crate::coords::CoordinateMapper;
use crate::selection::{Effect, Selection, SelectionConfig, SelectionEvent, SelectionMachine};
use crate::window_list::{WindowHandle, WindowSnapshot, WindowSource};
use crate::{OverlayError, OverlayResult};
use capture::{
    CaptureBackend, CaptureOptions, LogicalRect, MonitorSnapshot, MonitorSource, PhysicalPoint,
    PhysicalRect, PixelBuffer,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Session settings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionOptions {
    pub selection: SelectionConfig,
    pub capture: CaptureOptions,
}

/// Where the overlay window has to go to cover every monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayPlacement {
    pub physical: PhysicalRect,
    pub logical: LogicalRect,
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Captured { rect: PhysicalRect, buffer: PixelBuffer },
    Cancelled,
    Failed(String),
}

/// A background capture made for live preview (magnifier).
#[derive(Debug)]
pub struct PreviewFrame {
    pub request: u64,
    pub rect: PhysicalRect,
    pub buffer: PixelBuffer,
}

enum WorkerCommand {
    Preview {
        request: u64,
        rect: PhysicalRect,
    },
    Capture {
        rect: PhysicalRect,
        show_cursor: bool,
        reply: Sender<Option<PixelBuffer>>,
    },
    Shutdown,
}

/// Which preview is still wanted. Only the newest request counts, and
/// everything before `valid_from` was invalidated by a cleared selection.
#[derive(Debug, Default)]
struct PreviewLedger {
    latest: u64,
    valid_from: u64,
}

impl PreviewLedger {
    fn is_current(&self, request: u64) -> bool {
        request == self.latest && request >= self.valid_from
    }
}

struct CaptureWorker {
    cmd_tx: Sender<WorkerCommand>,
    preview_rx: Receiver<PreviewFrame>,
    ledger: Arc<Mutex<PreviewLedger>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    fn spawn(backend: Box<dyn CaptureBackend>) -> OverlayResult<Self> {
        let (cmd_tx, cmd_rx) = unbounded();
        let (preview_tx, preview_rx) = bounded(4);
        let ledger = Arc::new(Mutex::new(PreviewLedger::default()));

        let worker_ledger = ledger.clone();
        let handle = thread::Builder::new()
            .name("regioncap-capture".into())
            .spawn(move || capture_worker(backend, cmd_rx, preview_tx, worker_ledger))
            .map_err(|e| OverlayError::Capture(format!("failed to start capture worker: {e}")))?;

        Ok(Self {
            cmd_tx,
            preview_rx,
            ledger,
            handle: Some(handle),
        })
    }

    fn request_preview(&self, rect: PhysicalRect) -> u64 {
        let request = {
            let mut ledger = self.ledger.lock();
            ledger.latest += 1;
            ledger.latest
        };

        if self.cmd_tx.send(WorkerCommand::Preview { request, rect }).is_err() {
            warn!("capture worker gone, preview dropped");
        }
        request
    }

    /// Newest current preview that has already arrived.
    fn latest_preview(&self) -> Option<PreviewFrame> {
        let newest = self.preview_rx.try_iter().last()?;
        self.ledger.lock().is_current(newest.request).then_some(newest)
    }

    fn wait_preview(&self, timeout: Duration) -> Option<PreviewFrame> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let frame = self.preview_rx.recv_timeout(remaining).ok()?;
            if self.ledger.lock().is_current(frame.request) {
                return Some(frame);
            }
            trace!(request = frame.request, "stale preview discarded");
        }
    }

    fn discard_previews(&self) {
        let mut ledger = self.ledger.lock();
        ledger.valid_from = ledger.latest + 1;
    }

    /// Blocks until the backend has answered.
    fn capture(&self, rect: PhysicalRect, show_cursor: bool) -> OverlayResult<Option<PixelBuffer>> {
        let (reply, result) = bounded(1);
        self.cmd_tx
            .send(WorkerCommand::Capture {
                rect,
                show_cursor,
                reply,
            })
            .map_err(|_| OverlayError::WorkerGone)?;
        result.recv().map_err(|_| OverlayError::WorkerGone)
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn capture_worker(
    mut backend: Box<dyn CaptureBackend>,
    cmd_rx: Receiver<WorkerCommand>,
    preview_tx: Sender<PreviewFrame>,
    ledger: Arc<Mutex<PreviewLedger>>,
) {
    debug!(backend = %backend.kind(), "capture worker started");

    while let Ok(command) = cmd_rx.recv() {
        match command {
            WorkerCommand::Preview { request, rect } => {
                // Moves are coalesced: only the newest request is worth a frame.
                if !ledger.lock().is_current(request) {
                    trace!(request, "preview superseded");
                    continue;
                }

                let Some(buffer) = backend.capture_rect(rect, false) else {
                    continue;
                };

                match preview_tx.try_send(PreviewFrame { request, rect, buffer }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => trace!(request, "preview queue full"),
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            WorkerCommand::Capture {
                rect,
                show_cursor,
                reply,
            } => {
                let started = Instant::now();
                let buffer = backend.capture_rect(rect, show_cursor);
                debug!(
                    %rect,
                    backend = %backend.kind(),
                    ok = buffer.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "capture finished"
                );
                let _ = reply.send(buffer);
            }
            WorkerCommand::Shutdown => break,
        }
    }

    debug!("capture worker stopped");
}

enum Pending {
    Open,
    Confirmed(Selection),
    Cancelled,
}

/// One interactive capture, from overlay open to pixels.
pub struct RegionCaptureSession {
    monitors: Arc<MonitorSnapshot>,
    windows: Arc<WindowSnapshot>,
    mapper: CoordinateMapper,
    machine: SelectionMachine,
    options: SessionOptions,
    worker: CaptureWorker,
    pending: Pending,
}

impl RegionCaptureSession {
    /// Snapshot monitors and windows and start the capture worker.
    pub fn start(
        monitor_source: &dyn MonitorSource,
        window_source: &dyn WindowSource,
        backend: Box<dyn CaptureBackend>,
        options: SessionOptions,
    ) -> OverlayResult<Self> {
        let monitors = Arc::new(MonitorSnapshot::capture(monitor_source));
        let windows = Arc::new(WindowSnapshot::capture(window_source));
        Self::with_snapshots(monitors, windows, backend, options)
    }

    pub fn with_snapshots(
        monitors: Arc<MonitorSnapshot>,
        windows: Arc<WindowSnapshot>,
        backend: Box<dyn CaptureBackend>,
        options: SessionOptions,
    ) -> OverlayResult<Self> {
        if monitors.is_empty() {
            error!("no monitors found, capture session aborted");
            return Err(OverlayError::NoMonitors);
        }

        let mapper = CoordinateMapper::new(monitors.clone());
        let origin = monitors.get_virtual_desktop_bounds_logical().top_left();
        let machine = SelectionMachine::new(options.selection, mapper.clone(), windows.clone(), origin);
        let worker = CaptureWorker::spawn(backend)?;

        info!(
            monitors = monitors.len(),
            windows = windows.len(),
            desktop = %monitors.get_virtual_desktop_bounds_physical(),
            "capture session started"
        );

        Ok(Self {
            monitors,
            windows,
            mapper,
            machine,
            options,
            worker,
            pending: Pending::Open,
        })
    }

    pub fn placement(&self) -> OverlayPlacement {
        OverlayPlacement {
            physical: self.monitors.get_virtual_desktop_bounds_physical(),
            logical: self.monitors.get_virtual_desktop_bounds_logical(),
        }
    }

    pub fn monitors(&self) -> &Arc<MonitorSnapshot> {
        &self.monitors
    }

    pub fn windows(&self) -> &Arc<WindowSnapshot> {
        &self.windows
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn machine(&self) -> &SelectionMachine {
        &self.machine
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Confirmed or cancelled; the overlay can close.
    pub fn is_finished(&self) -> bool {
        !matches!(self.pending, Pending::Open)
    }

    /// Feed one input event through the selection machine.
    pub fn handle_event(&mut self, event: SelectionEvent) -> Vec<Effect> {
        let effects = self.machine.handle(event);

        for effect in &effects {
            match effect {
                Effect::Confirmed(selection) => {
                    self.worker.discard_previews();
                    self.pending = Pending::Confirmed(selection.clone());
                }
                Effect::Cancelled => {
                    self.worker.discard_previews();
                    self.pending = Pending::Cancelled;
                }
                Effect::SelectionCleared => self.worker.discard_previews(),
                _ => {}
            }
        }

        effects
    }

    /// Capture `rect` in the background for a live preview. Returns the
    /// request id; only the newest request's frame is ever handed out.
    pub fn request_preview(&self, rect: PhysicalRect) -> Option<u64> {
        if rect.is_empty() || self.is_finished() {
            return None;
        }
        Some(self.worker.request_preview(rect))
    }

    /// Request a magnifier frame for the pixels around `pointer`.
    pub fn request_magnifier(&self, pointer: PhysicalPoint) -> Option<u64> {
        let source = crate::magnifier::source_rect(&self.monitors, pointer)?;
        self.request_preview(source)
    }

    pub fn poll_preview(&self) -> Option<PreviewFrame> {
        self.worker.latest_preview()
    }

    pub fn wait_preview(&self, timeout: Duration) -> Option<PreviewFrame> {
        self.worker.wait_preview(timeout)
    }

    /// Capture whatever the session ended with.
    pub fn finish(self) -> SessionOutcome {
        match &self.pending {
            Pending::Confirmed(selection) => {
                info!(rect = %selection.physical, source = ?selection.source, "capturing selection");
                self.capture_region(selection.physical)
            }
            Pending::Open => {
                info!("session closed without a selection");
                SessionOutcome::Cancelled
            }
            Pending::Cancelled => SessionOutcome::Cancelled,
        }
    }

    /// Capture a physical rectangle directly, bypassing selection.
    pub fn capture_region(&self, rect: PhysicalRect) -> SessionOutcome {
        self.capture_with(rect, self.options.capture.show_cursor)
    }

    /// Whole desktop without a composited cursor, for the frozen overlay
    /// background.
    pub fn capture_backdrop(&self) -> SessionOutcome {
        self.capture_with(self.placement().physical, false)
    }

    fn capture_with(&self, rect: PhysicalRect, show_cursor: bool) -> SessionOutcome {
        let rect = match self.mapper.validate_capture_region(&rect) {
            Ok(rect) => rect,
            Err(e) => {
                warn!("{}", e);
                return SessionOutcome::Failed(e.to_string());
            }
        };

        match self.worker.capture(rect, show_cursor) {
            Ok(Some(buffer)) => {
                info!(%rect, "region captured");
                SessionOutcome::Captured { rect, buffer }
            }
            Ok(None) => {
                warn!(%rect, "no capture backend produced a frame");
                SessionOutcome::Failed(format!("capture of {rect} failed on every backend"))
            }
            Err(e) => SessionOutcome::Failed(e.to_string()),
        }
    }

    pub fn capture_full_screen(&self) -> SessionOutcome {
        self.capture_region(self.placement().physical)
    }

    /// Monitor by snapshot index (primary is 0).
    pub fn capture_monitor(&self, index: usize) -> SessionOutcome {
        match self.monitors.monitor(index) {
            Some(monitor) => self.capture_region(monitor.bounds),
            None => SessionOutcome::Failed(format!(
                "monitor {index} does not exist ({} attached)",
                self.monitors.len()
            )),
        }
    }

    /// Window by its snapshot bounds.
    pub fn capture_window(&self, handle: WindowHandle) -> SessionOutcome {
        match self.windows.find(handle) {
            Some(window) => self.capture_region(window.bounds),
            None => SessionOutcome::Failed(format!("window {handle} not in snapshot")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::{BackendCapabilities, BackendKind, MonitorInfo, StaticMonitors};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SolidBackend {
        captures: Arc<AtomicUsize>,
        with_cursor: Arc<AtomicUsize>,
        fail: bool,
    }

    impl CaptureBackend for SolidBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::GdiBlit
        }

        fn capabilities(&self) -> BackendCapabilities {
            BackendCapabilities {
                kind: BackendKind::GdiBlit,
                name: "solid",
                hardware_accelerated: false,
                may_include_system_cursor: false,
            }
        }

        fn capture_rect(&mut self, rect: PhysicalRect, show_cursor: bool) -> Option<PixelBuffer> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            if show_cursor {
                self.with_cursor.fetch_add(1, Ordering::SeqCst);
            }
            (!self.fail).then(|| PixelBuffer::filled(rect.width, rect.height, [1, 2, 3, 255]))
        }

        fn capture_full_screen(&mut self, _show_cursor: bool) -> Option<PixelBuffer> {
            None
        }
    }

    fn session(fail: bool) -> (RegionCaptureSession, Arc<AtomicUsize>) {
        session_with(fail, SessionOptions::default(), Arc::default())
    }

    fn session_with(
        fail: bool,
        options: SessionOptions,
        with_cursor: Arc<AtomicUsize>,
    ) -> (RegionCaptureSession, Arc<AtomicUsize>) {
        let captures = Arc::new(AtomicUsize::new(0));
        let backend = SolidBackend {
            captures: captures.clone(),
            with_cursor,
            fail,
        };
        let monitors = StaticMonitors(vec![MonitorInfo::new(
            "Primary",
            PhysicalRect::new(0, 0, 1920, 1080),
            1.0,
            true,
        )]);
        let session = RegionCaptureSession::start(
            &monitors,
            &crate::window_list::StaticWindows::default(),
            Box::new(backend),
            options,
        )
        .expect("session");
        (session, captures)
    }

    #[test]
    fn empty_monitor_list_aborts() {
        let result = RegionCaptureSession::start(
            &StaticMonitors::default(),
            &crate::window_list::StaticWindows::default(),
            Box::new(SolidBackend {
                captures: Arc::default(),
                with_cursor: Arc::default(),
                fail: false,
            }),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(OverlayError::NoMonitors)));
    }

    #[test]
    fn placement_covers_desktop() {
        let (session, _) = session(false);
        let placement = session.placement();
        assert_eq!(placement.physical, PhysicalRect::new(0, 0, 1920, 1080));
        assert_eq!(placement.logical, LogicalRect::new(0.0, 0.0, 1920.0, 1080.0));
    }

    #[test]
    fn region_capture_has_requested_size() {
        let (session, captures) = session(false);
        match session.capture_region(PhysicalRect::new(10, 20, 300, 200)) {
            SessionOutcome::Captured { rect, buffer } => {
                assert_eq!(rect, PhysicalRect::new(10, 20, 300, 200));
                assert_eq!((buffer.width(), buffer.height()), (300, 200));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalid_region_never_reaches_backend() {
        let (session, captures) = session(false);
        let outcome = session.capture_region(PhysicalRect::new(10, 20, 0, 200));
        assert!(matches!(outcome, SessionOutcome::Failed(_)));
        assert_eq!(captures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backend_failure_is_reported() {
        let (session, _) = session(true);
        let outcome = session.capture_full_screen();
        assert!(matches!(outcome, SessionOutcome::Failed(_)));
    }

    #[test]
    fn only_newest_preview_is_delivered() {
        let (session, _) = session(false);
        session.request_preview(PhysicalRect::new(0, 0, 10, 10));
        let newest = session.request_preview(PhysicalRect::new(0, 0, 20, 20));

        let frame = session.wait_preview(Duration::from_secs(5)).expect("preview");
        assert_eq!(Some(frame.request), newest);
        assert_eq!(frame.buffer.width(), 20);
    }

    #[test]
    fn cursor_only_requested_for_final_captures() {
        let with_cursor = Arc::new(AtomicUsize::new(0));
        let mut options = SessionOptions::default();
        options.capture.show_cursor = true;
        let (session, captures) = session_with(false, options, with_cursor.clone());

        assert!(matches!(session.capture_backdrop(), SessionOutcome::Captured { .. }));
        session.request_preview(PhysicalRect::new(0, 0, 10, 10));
        session.wait_preview(Duration::from_secs(5)).expect("preview");
        assert_eq!(captures.load(Ordering::SeqCst), 2);
        assert_eq!(with_cursor.load(Ordering::SeqCst), 0);

        assert!(matches!(
            session.capture_region(PhysicalRect::new(0, 0, 10, 10)),
            SessionOutcome::Captured { .. }
        ));
        assert_eq!(with_cursor.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn magnifier_frame_covers_pixels_around_pointer() {
        let (session, captures) = session(false);
        let request = session.request_magnifier(PhysicalPoint::new(1915, 5));

        let frame = session.wait_preview(Duration::from_secs(5)).expect("magnifier frame");
        assert_eq!(Some(frame.request), request);
        let size = crate::magnifier::SOURCE_SIZE;
        assert_eq!(frame.rect, PhysicalRect::new(1920 - size as i32, 0, size, size));
        assert_eq!((frame.buffer.width(), frame.buffer.height()), (size, size));
        assert_eq!(captures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn previews_discarded_after_clear() {
        let (mut session, _) = session(false);
        session.request_preview(PhysicalRect::new(0, 0, 10, 10));
        session.handle_event(SelectionEvent::KeyPressed {
            key: crate::selection::Key::Escape,
            modifiers: Default::default(),
        });

        assert!(session.is_finished());
        assert!(session.wait_preview(Duration::from_millis(200)).is_none());
        assert!(session.request_preview(PhysicalRect::new(0, 0, 10, 10)).is_none());
        assert!(matches!(session.finish(), SessionOutcome::Cancelled));
    }

    #[test]
    fn unknown_monitor_and_window_fail() {
        let (session, _) = session(false);
        assert!(matches!(session.capture_monitor(3), SessionOutcome::Failed(_)));
        assert!(matches!(
            session.capture_window(WindowHandle(99)),
            SessionOutcome::Failed(_)
        ));
    }
}
