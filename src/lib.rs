//! DeskDup - Desktop Duplication Capture Library
//!
//! Captures whole-display frames over DXGI Output Duplication as host-memory BGRA buffers,
//! with a recoverable session lifecycle around access loss.

// Configuration constants
pub mod config;

pub mod error;
pub mod frame;

// GPU collaborators and the platform backend
pub mod capture;
pub mod displays;

// Session lifecycle
pub mod recovery;
pub mod session;
pub mod worker;

// Re-export commonly used types
pub use capture::{DuplicationChannel, GraphicsBackend, GraphicsContext, StagingSurface};
pub use displays::{enumerate_displays, get_available_displays, DisplayDescriptor};
pub use error::CaptureError;
pub use frame::{CaptureOutcome, CapturedFrame, PixelFormat};
pub use session::{CaptureSession, SessionConfig, SessionState, SessionStats};
pub use worker::CaptureWorker;

#[cfg(target_os = "windows")]
pub use capture::D3D11Backend;

/// Capture session over the hardware D3D11 device
#[cfg(target_os = "windows")]
pub type DesktopDuplicator = CaptureSession<D3D11Backend>;
