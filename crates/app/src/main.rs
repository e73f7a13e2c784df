//! RegionCap - multi-monitor region screenshots

mod config;

use crate::config::{AppConfig, Cli, Command};
use anyhow::{bail, Context};
use clap::Parser;
use capture::{probe_backends, MonitorSnapshot, PhysicalPoint, PhysicalRect};
use export::ExportConfig;
use overlay::{
    CoordinateMapper, RegionCaptureSession, SessionOptions, SessionOutcome, WindowSnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest acceptable physical drift after a physical -> logical -> physical trip.
const ROUND_TRIP_TOLERANCE: f64 = 1.0;

/// Sample points per axis when verifying a monitor.
const VERIFY_GRID: u32 = 5;

fn main() -> anyhow::Result<()> {
    let (config, command) =
        AppConfig::from_cli(Cli::parse()).context("reading REGIONCAP_* environment")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .init();

    enable_dpi_awareness();

    match command {
        Command::Monitors => list_monitors(&*snapshot_monitors()?),
        Command::Verify => verify(&snapshot_monitors()?),
        Command::Region => run_region(&config),
        Command::Windows => list_windows(&snapshot_windows()),
        Command::Rect { rect } => {
            let session = start_session(&config)?;
            save(&config, session.capture_region(rect))
        }
        Command::Screen => {
            let session = start_session(&config)?;
            save(&config, session.capture_full_screen())
        }
        Command::Monitor { index } => {
            let session = start_session(&config)?;
            save(&config, session.capture_monitor(index))
        }
        Command::Window { handle } => {
            let session = start_session(&config)?;
            save(&config, session.capture_window(handle))
        }
    }
}

/// Physical coordinates everywhere require per-monitor DPI awareness.
#[cfg(windows)]
fn enable_dpi_awareness() {
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };

    unsafe {
        if let Err(e) = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) {
            warn!("could not enable per-monitor DPI awareness: {}", e);
        }
    }
}

#[cfg(not(windows))]
fn enable_dpi_awareness() {}

fn snapshot_monitors() -> anyhow::Result<Arc<MonitorSnapshot>> {
    let snapshot = MonitorSnapshot::capture(capture::system_monitors().as_ref());
    if snapshot.is_empty() {
        bail!("no monitors detected");
    }
    Ok(Arc::new(snapshot))
}

fn snapshot_windows() -> Arc<WindowSnapshot> {
    Arc::new(WindowSnapshot::capture(overlay::system_windows(None).as_ref()))
}

fn start_session(config: &AppConfig) -> anyhow::Result<RegionCaptureSession> {
    let monitors = snapshot_monitors()?;
    let windows = snapshot_windows();

    let chain = probe_backends(monitors.clone());
    if chain.is_empty() {
        bail!("no capture backend is available on this system");
    }

    let mut options = SessionOptions::default();
    options.capture.show_cursor = config.show_cursor;

    RegionCaptureSession::with_snapshots(monitors, windows, Box::new(chain), options)
        .context("starting capture session")
}

#[cfg(windows)]
fn run_region(config: &AppConfig) -> anyhow::Result<()> {
    let session = start_session(config)?;
    let outcome = overlay::OverlayWindow::show(session).context("running selection overlay")?;
    save(config, outcome)
}

#[cfg(not(windows))]
fn run_region(_config: &AppConfig) -> anyhow::Result<()> {
    bail!("interactive selection needs the Windows overlay; use `rect`, `screen`, `monitor` or `window`")
}

fn save(config: &AppConfig, outcome: SessionOutcome) -> anyhow::Result<()> {
    match outcome {
        SessionOutcome::Captured { rect, buffer } => {
            let export = ExportConfig {
                format: config.format,
                output_path: config.output_path(),
                ..Default::default()
            };
            let path: PathBuf = export::export(&buffer, &export)
                .with_context(|| format!("writing {}", export.output_path.display()))?;

            info!(%rect, "capture saved");
            println!("{}", path.display());
            Ok(())
        }
        SessionOutcome::Cancelled => {
            info!("capture cancelled");
            Ok(())
        }
        SessionOutcome::Failed(reason) => bail!("capture failed: {reason}"),
    }
}

fn list_monitors(monitors: &MonitorSnapshot) -> anyhow::Result<()> {
    for (index, monitor) in monitors.get_monitors().iter().enumerate() {
        let logical = monitors
            .logical_bounds(index)
            .context("monitor vanished from snapshot")?;
        println!(
            "{index}: {name}{primary}  physical {physical}  logical {logical}  scale {scale:.2}",
            name = monitor.name,
            primary = if monitor.is_primary { " (primary)" } else { "" },
            physical = monitor.bounds,
            scale = monitor.scale_factor,
        );
    }

    println!(
        "desktop: physical {}  logical {}",
        monitors.get_virtual_desktop_bounds_physical(),
        monitors.get_virtual_desktop_bounds_logical()
    );
    Ok(())
}

fn list_windows(windows: &WindowSnapshot) -> anyhow::Result<()> {
    for window in windows.windows().iter().filter(|w| w.is_visible) {
        println!(
            "{handle}  {bounds}  pid {pid}  {title}",
            handle = window.handle,
            bounds = window.bounds,
            pid = window.process_id,
            title = window.title,
        );
    }
    Ok(())
}

fn verify(monitors: &Arc<MonitorSnapshot>) -> anyhow::Result<()> {
    let mapper = CoordinateMapper::new(monitors.clone());
    let mut failures = 0;

    for (index, monitor) in monitors.get_monitors().iter().enumerate() {
        let worst = sample_points(&monitor.bounds)
            .map(|point| (point, mapper.round_trip_error(point)))
            .fold((monitor.bounds.top_left(), 0.0_f64), |worst, sample| {
                if sample.1 > worst.1 {
                    sample
                } else {
                    worst
                }
            });

        let ok = worst.1 <= ROUND_TRIP_TOLERANCE;
        println!(
            "{index}: {name}  max error {err:.3}px at {point}  {verdict}",
            name = monitor.name,
            err = worst.1,
            point = worst.0,
            verdict = if ok { "ok" } else { "FAILED" },
        );

        if !ok {
            warn!(monitor = %monitor.name, error = worst.1, "round trip drift above tolerance");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} monitor(s) exceed the {ROUND_TRIP_TOLERANCE}px round-trip tolerance");
    }
    Ok(())
}

/// Evenly spaced grid over the rect, including its last row and column.
fn sample_points(rect: &PhysicalRect) -> impl Iterator<Item = PhysicalPoint> + '_ {
    let step = |extent: u32, i: u32| (extent.saturating_sub(1) as u64 * i as u64 / (VERIFY_GRID - 1) as u64) as i32;

    (0..VERIFY_GRID).flat_map(move |row| {
        (0..VERIFY_GRID).map(move |col| {
            PhysicalPoint::new(rect.x + step(rect.width, col), rect.y + step(rect.height, row))
        })
    })
}
