//! DXGI desktop duplication
//!
//! One duplication per attached output. Duplication only delivers a frame
//! when the desktop changes, so the last full frame of every output is kept
//! and reused when acquisition times out.

use super::d3d11::D3D11Device;
use crate::backend::{BackendCapabilities, BackendKind, CapturePrimitive};
use crate::frame::PixelBuffer;
use crate::geometry::PhysicalRect;
use crate::monitor::MonitorInfo;
use crate::{CaptureError, CaptureResult};
use tracing::{debug, warn};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIAdapter1, IDXGIFactory1, IDXGIOutput1, IDXGIOutputDuplication,
    IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_FRAME_INFO,
};

const ACQUIRE_TIMEOUT_MS: u32 = 100;
const ACQUIRE_ATTEMPTS: usize = 3;

struct OutputDuplication {
    adapter: IDXGIAdapter1,
    output: IDXGIOutput1,
    device: D3D11Device,
    duplication: Option<IDXGIOutputDuplication>,
    bounds: PhysicalRect,
    last_frame: Option<PixelBuffer>,
}

/// Releases the acquired frame on every exit path.
struct FrameGuard<'a>(&'a IDXGIOutputDuplication);

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            let _ = self.0.ReleaseFrame();
        }
    }
}

impl OutputDuplication {
    fn duplicate(&mut self) -> CaptureResult<&IDXGIOutputDuplication> {
        if self.duplication.is_none() {
            let duplication = unsafe { self.output.DuplicateOutput(self.device.device()) }
                .map_err(|e| CaptureError::Duplication(format!("DuplicateOutput failed: {e}")))?;
            self.duplication = Some(duplication);
        }

        self.duplication
            .as_ref()
            .ok_or_else(|| CaptureError::Duplication("duplication missing".into()))
    }

    /// Refresh `last_frame` with the newest desktop image, if one arrives.
    fn refresh(&mut self) -> CaptureResult<()> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            match self.acquire() {
                Ok(true) => return Ok(()),
                Ok(false) => continue,
                Err(CaptureError::Windows(e)) if e.code() == DXGI_ERROR_ACCESS_LOST => {
                    warn!(output = %self.bounds, "duplication access lost, recreating");
                    self.duplication = None;
                    self.recreate_device()?;
                }
                Err(e) => return Err(e),
            }
        }

        if self.last_frame.is_some() {
            debug!(output = %self.bounds, "no new frame, reusing last one");
            Ok(())
        } else {
            Err(CaptureError::Timeout)
        }
    }

    fn recreate_device(&mut self) -> CaptureResult<()> {
        self.device = D3D11Device::on_adapter(&self.adapter)?;
        Ok(())
    }

    /// Returns false on timeout or when the frame carries no new image.
    fn acquire(&mut self) -> CaptureResult<bool> {
        let width = self.bounds.width;
        let height = self.bounds.height;
        let device = self.device.clone();
        let duplication = self.duplicate()?.clone();

        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        let acquired =
            unsafe { duplication.AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut resource) };
        if let Err(e) = acquired {
            if e.code() == DXGI_ERROR_WAIT_TIMEOUT {
                return Ok(false);
            }
            return Err(e.into());
        }
        let _release = FrameGuard(&duplication);

        if frame_info.LastPresentTime == 0 && self.last_frame.is_some() {
            return Ok(false);
        }

        let resource = resource
            .ok_or_else(|| CaptureError::Duplication("AcquireNextFrame returned no resource".into()))?;
        let texture: ID3D11Texture2D = resource.cast()?;

        let staging = device.create_staging(width, height)?;
        unsafe {
            device.context().CopyResource(&staging, &texture);
        }
        let mut data = device.read_staging(&staging, width, height)?;

        // Duplication alpha is not meaningful.
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }

        self.last_frame = Some(PixelBuffer::from_bgra(width, height, data)?);
        Ok(true)
    }
}

/// GPU output duplication across every attached output.
pub struct DuplicationPrimitive {
    outputs: Vec<OutputDuplication>,
}

// The D3D11 device is created free-threaded and the duplications are only
// reached through `&mut self`, so the primitive is exclusively owned by
// whichever worker it is moved into.
unsafe impl Send for DuplicationPrimitive {}

impl DuplicationPrimitive {
    /// Set up duplication for all attached outputs. Fails when none can be
    /// duplicated (remote sessions, pre-8 systems, another duplicator).
    pub fn probe() -> CaptureResult<Self> {
        let mut outputs = Vec::new();

        unsafe {
            let factory: IDXGIFactory1 = CreateDXGIFactory1()?;

            let mut adapter_idx = 0u32;
            while let Ok(adapter) = factory.EnumAdapters1(adapter_idx) {
                adapter_idx += 1;

                let device = match D3D11Device::on_adapter(&adapter) {
                    Ok(device) => device,
                    Err(e) => {
                        debug!(adapter = adapter_idx - 1, "no D3D11 device: {}", e);
                        continue;
                    }
                };

                let mut output_idx = 0u32;
                while let Ok(output) = adapter.EnumOutputs(output_idx) {
                    output_idx += 1;

                    let desc = output.GetDesc()?;
                    if !desc.AttachedToDesktop.as_bool() {
                        continue;
                    }

                    let rc = desc.DesktopCoordinates;
                    let bounds = PhysicalRect::new(
                        rc.left,
                        rc.top,
                        (rc.right - rc.left) as u32,
                        (rc.bottom - rc.top) as u32,
                    );

                    let output1: IDXGIOutput1 = match output.cast() {
                        Ok(o) => o,
                        Err(_) => continue,
                    };

                    let mut entry = OutputDuplication {
                        adapter: adapter.clone(),
                        output: output1,
                        device: device.clone(),
                        duplication: None,
                        bounds,
                        last_frame: None,
                    };

                    let duplicated = entry.duplicate().map(|_| ());
                    match duplicated {
                        Ok(()) => outputs.push(entry),
                        Err(e) => debug!(output = %bounds, "cannot duplicate: {}", e),
                    }
                }
            }
        }

        if outputs.is_empty() {
            return Err(CaptureError::NotSupported("no duplicable outputs"));
        }

        debug!(outputs = outputs.len(), "desktop duplication ready");
        Ok(Self { outputs })
    }
}

impl CapturePrimitive for DuplicationPrimitive {
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            kind: BackendKind::HardwareDuplication,
            name: "DXGI Desktop Duplication",
            hardware_accelerated: true,
            may_include_system_cursor: false,
        }
    }

    fn grab(&mut self, monitor: &MonitorInfo, region: PhysicalRect) -> CaptureResult<PixelBuffer> {
        let output = self
            .outputs
            .iter_mut()
            .find(|o| o.bounds == monitor.bounds)
            .ok_or_else(|| CaptureError::Duplication(format!("no duplicated output for {}", monitor.name)))?;

        output.refresh()?;

        let frame = output
            .last_frame
            .as_ref()
            .ok_or(CaptureError::Timeout)?;

        let local = region.offset(-output.bounds.x, -output.bounds.y);
        let pixels = frame.crop(&local);
        if pixels.width() != region.width || pixels.height() != region.height {
            return Err(CaptureError::InvalidRegion(format!(
                "{region} is not inside output {}",
                output.bounds
            )));
        }

        Ok(pixels)
    }
}
