// capture/windows.rs - DXGI Output Duplication Implementation
//
// This module implements the duplication backend on top of Direct3D 11 and the DXGI
// Desktop Duplication API (IDXGIOutput1::DuplicateOutput), available on Windows 8 and later
// with a WDDM 1.2+ driver.

use anyhow::{anyhow, Context as _};
use log::{debug, info, trace, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_10_1,
    D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_SAMPLE_DESC};
use windows::Win32::Graphics::Dxgi::{
    IDXGIAdapter, IDXGIDevice, IDXGIOutput1, IDXGIOutputDuplication, IDXGIResource,
    DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_NOT_FOUND, DXGI_ERROR_WAIT_TIMEOUT,
    DXGI_OUTDUPL_FRAME_INFO,
};

use super::{
    AcquireOutcome, DuplicationChannel, GraphicsBackend, GraphicsContext, MappedSurface,
    OutputDesc, StagingSurface,
};
use crate::displays::output_name;
use crate::error::{describe_hresult, CaptureError};

/// Feature levels tried in order when creating the device
const FEATURE_LEVELS: [D3D_FEATURE_LEVEL; 3] = [
    D3D_FEATURE_LEVEL_11_0,
    D3D_FEATURE_LEVEL_10_1,
    D3D_FEATURE_LEVEL_10_0,
];

/// Creates hardware Direct3D 11 devices on the default adapter
#[derive(Debug, Default, Clone, Copy)]
pub struct D3D11Backend;

impl GraphicsBackend for D3D11Backend {
    type Context = D3D11Context;

    fn create_context(&self) -> Result<D3D11Context, CaptureError> {
        D3D11Context::create()
    }
}

/// Direct3D 11 device, its immediate context, and the adapter it lives on
pub struct D3D11Context {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    adapter: IDXGIAdapter,
}

impl D3D11Context {
    fn create() -> Result<Self, CaptureError> {
        let (device, context, feature_level) =
            create_d3d_device().map_err(|e| CaptureError::DeviceCreation {
                step: "D3D11CreateDevice",
                detail: format!("{:#}", e),
            })?;

        let dxgi_device: IDXGIDevice =
            device.cast().map_err(|e| CaptureError::DeviceCreation {
                step: "query IDXGIDevice",
                detail: describe_hresult(&e),
            })?;

        let adapter = unsafe { dxgi_device.GetAdapter() }.map_err(|e| {
            CaptureError::DeviceCreation {
                step: "IDXGIDevice::GetAdapter",
                detail: describe_hresult(&e),
            }
        })?;

        info!(
            "Created D3D11 device (feature level 0x{:X})",
            feature_level.0
        );

        Ok(Self {
            device,
            context,
            adapter,
        })
    }

    /// Number of outputs attached to this context's adapter
    fn count_outputs(&self) -> u32 {
        let mut count = 0;
        while unsafe { self.adapter.EnumOutputs(count) }.is_ok() {
            count += 1;
        }
        count
    }
}

impl GraphicsContext for D3D11Context {
    type Texture = ID3D11Texture2D;
    type Output = IDXGIOutput1;
    type Channel = DxgiDuplicationChannel;
    type Surface = D3D11StagingSurface;

    fn resolve_output(&self, index: u32) -> Result<(IDXGIOutput1, OutputDesc), CaptureError> {
        let output = match unsafe { self.adapter.EnumOutputs(index) } {
            Ok(output) => output,
            Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => {
                return Err(CaptureError::InvalidOutputIndex {
                    index,
                    available: self.count_outputs(),
                });
            }
            Err(e) => {
                return Err(CaptureError::DeviceCreation {
                    step: "IDXGIAdapter::EnumOutputs",
                    detail: describe_hresult(&e),
                });
            }
        };

        let desc = unsafe { output.GetDesc() }.map_err(|e| CaptureError::DeviceCreation {
            step: "IDXGIOutput::GetDesc",
            detail: describe_hresult(&e),
        })?;

        let output1: IDXGIOutput1 =
            output
                .cast()
                .map_err(|e| CaptureError::DuplicationUnavailable {
                    step: "query IDXGIOutput1",
                    detail: describe_hresult(&e),
                })?;

        let rect = desc.DesktopCoordinates;
        let output_desc = OutputDesc {
            name: output_name(&desc.DeviceName),
            width: (rect.right - rect.left).max(0) as u32,
            height: (rect.bottom - rect.top).max(0) as u32,
        };

        debug!(
            "Resolved output {} -> {} ({}x{})",
            index, output_desc.name, output_desc.width, output_desc.height
        );

        Ok((output1, output_desc))
    }

    fn open_channel(&self, output: &IDXGIOutput1) -> Result<DxgiDuplicationChannel, CaptureError> {
        let duplication = unsafe { output.DuplicateOutput(&self.device) }.map_err(|e| {
            CaptureError::DuplicationUnavailable {
                step: "IDXGIOutput1::DuplicateOutput",
                detail: format!(
                    "{}; requires a WDDM 1.2+ driver and no other duplication client on this output",
                    describe_hresult(&e)
                ),
            }
        })?;

        Ok(DxgiDuplicationChannel { duplication })
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<D3D11StagingSurface, CaptureError> {
        let texture = create_staging_texture(&self.device, width, height).map_err(|e| {
            CaptureError::StagingAllocation {
                width,
                height,
                detail: format!("{:#}", e),
            }
        })?;

        Ok(D3D11StagingSurface {
            context: self.context.clone(),
            texture,
            width,
            height,
        })
    }

    fn texture_size(&self, texture: &ID3D11Texture2D) -> (u32, u32) {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        unsafe { texture.GetDesc(&mut desc) };
        (desc.Width, desc.Height)
    }
}

/// Live duplication of one output
pub struct DxgiDuplicationChannel {
    duplication: IDXGIOutputDuplication,
}

impl DuplicationChannel for DxgiDuplicationChannel {
    type Texture = ID3D11Texture2D;

    fn acquire_frame(&mut self, timeout_ms: u32) -> AcquireOutcome<ID3D11Texture2D> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        match unsafe {
            self.duplication
                .AcquireNextFrame(timeout_ms, &mut frame_info, &mut resource)
        } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return AcquireOutcome::Timeout,
            Err(e) if e.code() == DXGI_ERROR_ACCESS_LOST => {
                warn!("AcquireNextFrame reported DXGI_ERROR_ACCESS_LOST");
                return AcquireOutcome::Lost;
            }
            Err(e) => return AcquireOutcome::Error(describe_hresult(&e)),
        }

        trace!(
            "Acquired frame: {} accumulated, last present {}",
            frame_info.AccumulatedFrames,
            frame_info.LastPresentTime
        );

        let Some(resource) = resource else {
            return AcquireOutcome::Error("AcquireNextFrame returned no desktop resource".into());
        };

        match resource.cast::<ID3D11Texture2D>() {
            Ok(texture) => AcquireOutcome::Frame(texture),
            Err(e) => AcquireOutcome::Error(format!(
                "desktop resource is not a 2D texture: {}",
                describe_hresult(&e)
            )),
        }
    }

    fn release_frame(&mut self) -> Result<(), CaptureError> {
        unsafe { self.duplication.ReleaseFrame() }
            .map_err(|e| CaptureError::capture("ReleaseFrame", describe_hresult(&e)))
    }
}

/// BGRA staging texture with CPU read access
pub struct D3D11StagingSurface {
    context: ID3D11DeviceContext,
    texture: ID3D11Texture2D,
    width: u32,
    height: u32,
}

impl StagingSurface for D3D11StagingSurface {
    type Texture = ID3D11Texture2D;

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn copy_from(&mut self, texture: &ID3D11Texture2D) {
        unsafe { self.context.CopyResource(&self.texture, texture) };
    }

    fn map_for_read(&mut self) -> Result<MappedSurface<'_>, CaptureError> {
        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&self.texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|e| CaptureError::capture("Map staging texture", describe_hresult(&e)))?;

        let context = &self.context;
        let texture = &self.texture;

        if mapped.pData.is_null() {
            unsafe { context.Unmap(texture, 0) };
            return Err(CaptureError::capture(
                "Map staging texture",
                "driver returned a null mapping",
            ));
        }

        let len = mapped.RowPitch as usize * self.height as usize;
        // SAFETY: the mapping stays valid for `RowPitch * height` bytes until Unmap, which only
        // runs when the returned guard is dropped.
        let bytes = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };

        Ok(MappedSurface::new(bytes, mapped.RowPitch, move || unsafe {
            context.Unmap(texture, 0)
        }))
    }
}

/// Create a hardware Direct3D11 device and immediate context
fn create_d3d_device() -> anyhow::Result<(ID3D11Device, ID3D11DeviceContext, D3D_FEATURE_LEVEL)> {
    let mut device = None;
    let mut context = None;
    let mut feature_level = D3D_FEATURE_LEVEL::default();

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&FEATURE_LEVELS),
            D3D11_SDK_VERSION,
            Some(&mut device),
            Some(&mut feature_level),
            Some(&mut context),
        )
        .context("D3D11CreateDevice failed")?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("Device creation returned null"))?,
        context.ok_or_else(|| anyhow!("Context creation returned null"))?,
        feature_level,
    ))
}

/// Create a CPU-readable staging texture matching (w×h, BGRA8)
fn create_staging_texture(
    device: &ID3D11Device,
    width: u32,
    height: u32,
) -> anyhow::Result<ID3D11Texture2D> {
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

    let mut texture = None;
    unsafe {
        device
            .CreateTexture2D(&desc, None, Some(&mut texture))
            .context("CreateTexture2D (staging) failed")?;
    }
    texture.ok_or_else(|| anyhow!("CreateTexture2D returned null"))
}

// SAFETY: each object is owned by exactly one capture session, which is driven from one
// thread at a time (`&mut self` on every capture operation).
unsafe impl Send for D3D11Context {}
unsafe impl Send for DxgiDuplicationChannel {}
unsafe impl Send for D3D11StagingSurface {}
