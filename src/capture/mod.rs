// capture/mod.rs - Duplication Backend Abstractions
//
// This module defines the three GPU-side collaborators a capture session drives:
// a graphics context (device + immediate context), a duplication channel bound to one
// output, and a CPU-readable staging surface. Each platform provides its own submodule
// with the actual implementation.

use crate::error::CaptureError;

#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(target_os = "windows")]
pub use self::windows::D3D11Backend;

#[cfg(test)]
pub(crate) mod mock;

/// Result of asking a duplication channel for the next frame
#[derive(Debug)]
pub enum AcquireOutcome<T> {
    /// A new image is held by the caller until `release_frame`
    Frame(T),
    /// Nothing new was presented within the wait window
    Timeout,
    /// The feed is permanently invalid and must be recreated
    Lost,
    /// Unexpected failure; the channel may still work on a later call
    Error(String),
}

/// Static facts about a resolved output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// An OS duplication feed bound to a single output
pub trait DuplicationChannel {
    type Texture;

    /// Wait up to `timeout_ms` for the next presented frame
    fn acquire_frame(&mut self, timeout_ms: u32) -> AcquireOutcome<Self::Texture>;

    /// Hand the last acquired frame back to the producer
    fn release_frame(&mut self) -> Result<(), CaptureError>;
}

/// Read-only view of a mapped staging surface. Unmaps when dropped.
pub struct MappedSurface<'a> {
    bytes: &'a [u8],
    row_pitch: u32,
    unmap: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> MappedSurface<'a> {
    pub fn new(bytes: &'a [u8], row_pitch: u32, unmap: impl FnOnce() + 'a) -> Self {
        Self {
            bytes,
            row_pitch,
            unmap: Some(Box::new(unmap)),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn row_pitch(&self) -> u32 {
        self.row_pitch
    }
}

impl Drop for MappedSurface<'_> {
    fn drop(&mut self) {
        if let Some(unmap) = self.unmap.take() {
            unmap();
        }
    }
}

/// CPU-mappable copy target for produced frames
pub trait StagingSurface {
    type Texture;

    /// Declared (width, height)
    fn size(&self) -> (u32, u32);

    /// Queue a GPU-side copy from a produced frame
    fn copy_from(&mut self, texture: &Self::Texture);

    /// Map for host reads; the returned guard must be dropped before the next `copy_from`
    fn map_for_read(&mut self) -> Result<MappedSurface<'_>, CaptureError>;
}

/// A GPU device plus its single command context
pub trait GraphicsContext {
    type Texture;
    type Output;
    type Channel: DuplicationChannel<Texture = Self::Texture>;
    type Surface: StagingSurface<Texture = Self::Texture>;

    /// Look up output `index` on the adapter this context was created on
    fn resolve_output(&self, index: u32) -> Result<(Self::Output, OutputDesc), CaptureError>;

    /// Start duplicating `output`
    fn open_channel(&self, output: &Self::Output) -> Result<Self::Channel, CaptureError>;

    /// Allocate a staging surface of the given size
    fn create_surface(&self, width: u32, height: u32) -> Result<Self::Surface, CaptureError>;

    /// Dimensions of a produced frame
    fn texture_size(&self, texture: &Self::Texture) -> (u32, u32);
}

/// Factory for graphics contexts; one context per (re)initialization
pub trait GraphicsBackend {
    type Context: GraphicsContext;

    fn create_context(&self) -> Result<Self::Context, CaptureError>;
}
