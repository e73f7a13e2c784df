//! D3D11 device management

use crate::{CaptureError, CaptureResult};
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL_10_1, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::IDXGIAdapter1;

/// D3D11 device wrapper
#[derive(Clone)]
pub struct D3D11Device {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
}

impl D3D11Device {
    /// Create a device on a specific adapter; duplication requires the
    /// device to live on the adapter that owns the output.
    pub fn on_adapter(adapter: &IDXGIAdapter1) -> CaptureResult<Self> {
        unsafe {
            let mut device: Option<ID3D11Device> = None;
            let mut context: Option<ID3D11DeviceContext> = None;

            D3D11CreateDevice(
                adapter,
                D3D_DRIVER_TYPE_UNKNOWN,
                HMODULE(std::ptr::null_mut()),
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                Some(&[D3D_FEATURE_LEVEL_11_0, D3D_FEATURE_LEVEL_10_1]),
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )?;

            let device = device
                .ok_or_else(|| CaptureError::Duplication("D3D11CreateDevice returned no device".into()))?;
            let context = context
                .ok_or_else(|| CaptureError::Duplication("D3D11CreateDevice returned no context".into()))?;

            Ok(Self { device, context })
        }
    }

    pub fn device(&self) -> &ID3D11Device {
        &self.device
    }

    pub fn context(&self) -> &ID3D11DeviceContext {
        &self.context
    }

    /// CPU-readable BGRA texture.
    pub fn create_staging(&self, width: u32, height: u32) -> CaptureResult<ID3D11Texture2D> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe {
            self.device.CreateTexture2D(&desc, None, Some(&mut texture))?;
        }
        texture.ok_or_else(|| CaptureError::Duplication("CreateTexture2D returned null".into()))
    }

    /// Copy a mapped staging texture into tightly packed BGRA rows.
    pub fn read_staging(&self, staging: &ID3D11Texture2D, width: u32, height: u32) -> CaptureResult<Vec<u8>> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context.Map(staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))?;
        }
        let _unmap = MappedGuard {
            context: &self.context,
            texture: staging,
        };

        let row_pitch = mapped.RowPitch as usize;
        let row_bytes = width as usize * 4;
        let mut data = Vec::with_capacity(row_bytes * height as usize);

        for y in 0..height as usize {
            let row = unsafe {
                std::slice::from_raw_parts((mapped.pData as *const u8).add(y * row_pitch), row_bytes)
            };
            data.extend_from_slice(row);
        }

        Ok(data)
    }
}

struct MappedGuard<'a> {
    context: &'a ID3D11DeviceContext,
    texture: &'a ID3D11Texture2D,
}

impl Drop for MappedGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            self.context.Unmap(self.texture, 0);
        }
    }
}
