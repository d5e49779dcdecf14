//! Captured frame values handed to callers

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::capture::BYTES_PER_PIXEL;

/// Pixel layout of [`CapturedFrame::pixels`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// 8 bits per channel, blue first
    Bgra8,
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra8 => write!(f, "BGRA"),
        }
    }
}

/// A captured desktop image, owned outright by the caller
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Bytes per row (may include alignment padding)
    pub stride: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Milliseconds since the UNIX epoch when the frame was read back
    pub timestamp_ms: u64,
    /// Raw rows, `height * stride` bytes
    pub pixels: Vec<u8>,
}

impl CapturedFrame {
    /// Copy `height` rows of `stride` bytes out of a mapped surface.
    ///
    /// Returns `None` if `mapped` is shorter than `height * stride` or the stride can't
    /// hold a full row of pixels.
    pub fn from_mapped(width: u32, height: u32, stride: u32, mapped: &[u8]) -> Option<Self> {
        if stride < width.checked_mul(BYTES_PER_PIXEL)? {
            return None;
        }
        let len = (height as usize).checked_mul(stride as usize)?;
        let rows = mapped.get(..len)?;

        Some(Self {
            width,
            height,
            stride,
            format: PixelFormat::Bgra8,
            timestamp_ms: now_ms(),
            pixels: rows.to_vec(),
        })
    }

    /// Bytes of visible pixels per row
    pub fn packed_stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL as usize
    }

    /// Length the buffer would have without row padding
    pub fn packed_len(&self) -> usize {
        self.packed_stride() * self.height as usize
    }

    /// True when rows carry hardware alignment padding
    pub fn is_padded(&self) -> bool {
        self.stride as usize != self.packed_stride()
    }

    /// Visible pixels of row `y`, or `None` past the last row
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride as usize;
        self.pixels.get(start..start + self.packed_stride())
    }

    /// Copy the frame into a tightly packed buffer (stride == width * 4)
    pub fn to_packed(&self) -> Vec<u8> {
        if !self.is_padded() {
            return self.pixels.clone();
        }

        let mut packed = Vec::with_capacity(self.packed_len());
        for y in 0..self.height {
            if let Some(row) = self.row(y) {
                packed.extend_from_slice(row);
            }
        }
        packed
    }
}

/// Result of one capture attempt
#[derive(Debug)]
pub enum CaptureOutcome {
    /// A new desktop image
    Frame(CapturedFrame),
    /// Nothing changed on screen within the timeout
    NoNewFrame,
}

impl CaptureOutcome {
    pub fn into_frame(self) -> Option<CapturedFrame> {
        match self {
            CaptureOutcome::Frame(frame) => Some(frame),
            CaptureOutcome::NoNewFrame => None,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, CaptureOutcome::Frame(_))
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
