//! Capture session lifecycle
//!
//! A [`CaptureSession`] owns one graphics context, one duplication channel and one staging
//! surface, and drives them through initialize → capture → (access lost) → reinitialize →
//! teardown. Only one call may be in flight per session; `&mut self` enforces that.
//!
//! ```text
//!  Uninitialized ──initialize──▶ Initializing ──ok──▶ Ready ◀─┐ frame / timeout
//!        ▲                            │                 │  └──┘
//!        └────────── error ───────────┘                 │ lost
//!                                                       ▼
//!                                 Initializing ◀──reinitialize── AccessLost
//! ```

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::capture::{
    AcquireOutcome, DuplicationChannel, GraphicsBackend, GraphicsContext, StagingSurface,
};
use crate::config;
use crate::error::CaptureError;
use crate::frame::{CaptureOutcome, CapturedFrame};
use crate::recovery::{FailureKind, RecoveryAction, RecoveryController};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    AccessLost,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::Initializing => "Initializing",
            SessionState::Ready => "Ready",
            SessionState::AccessLost => "AccessLost",
        };
        write!(f, "{}", value)
    }
}

/// Tunables for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Consecutive transient errors before the session is treated as lost (0 = never)
    pub max_consecutive_errors: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: config::capture::MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Point-in-time session statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub initialized: bool,
    pub width: u32,
    pub height: u32,
    pub state: SessionState,
    pub output_index: u32,
    pub attempts: u64,
    pub frames_captured: u64,
    pub errors: u64,
    pub last_capture_ms: Option<u64>,
}

/// GPU objects of one (re)initialization.
///
/// Field order is drop order: staging surface, then channel, then context.
struct Pipeline<C: GraphicsContext> {
    surface: C::Surface,
    channel: C::Channel,
    context: C,
}

impl<C: GraphicsContext> Pipeline<C> {
    fn open<B>(backend: &B, output_index: u32) -> Result<(Self, u32, u32), CaptureError>
    where
        B: GraphicsBackend<Context = C>,
    {
        let context = backend.create_context()?;
        let (output, desc) = context.resolve_output(output_index)?;
        let channel = context.open_channel(&output)?;
        let surface = context.create_surface(desc.width, desc.height)?;

        tracing::debug!(
            output_index,
            name = %desc.name,
            width = desc.width,
            height = desc.height,
            "Opened duplication pipeline"
        );

        Ok((
            Self {
                surface,
                channel,
                context,
            },
            desc.width,
            desc.height,
        ))
    }

    /// Recreate the staging surface when the produced frame size differs
    fn ensure_surface_size(&mut self, width: u32, height: u32) -> Result<bool, CaptureError> {
        if self.surface.size() == (width, height) {
            return Ok(false);
        }

        let (old_width, old_height) = self.surface.size();
        tracing::info!(
            old_width,
            old_height,
            width,
            height,
            "Output resolution changed, reallocating staging surface"
        );
        self.surface = self.context.create_surface(width, height)?;
        Ok(true)
    }

    /// Copy a produced frame into host memory. Does not release the frame.
    fn read_back(&mut self, texture: &C::Texture) -> Result<CapturedFrame, CaptureError> {
        let (width, height) = self.context.texture_size(texture);
        // The session is still usable here; the next frame retries the allocation
        self.ensure_surface_size(width, height)
            .map_err(|e| CaptureError::capture("reallocate staging surface", e.to_string()))?;
        self.surface.copy_from(texture);

        let mapped = self.surface.map_for_read()?;
        CapturedFrame::from_mapped(width, height, mapped.row_pitch(), mapped.bytes()).ok_or_else(
            || {
                CaptureError::capture(
                    "read mapped surface",
                    format!(
                        "mapping of {} bytes with pitch {} is too small for {}x{}",
                        mapped.bytes().len(),
                        mapped.row_pitch(),
                        width,
                        height
                    ),
                )
            },
        )
    }
}

/// What one trip through the channel produced, before bookkeeping
enum Attempt {
    Frame(CapturedFrame),
    Timeout,
    Failed(FailureKind, CaptureError),
}

/// A capture session over a graphics backend
pub struct CaptureSession<B: GraphicsBackend> {
    pipeline: Option<Pipeline<B::Context>>,
    backend: B,
    state: SessionState,
    output_index: u32,
    width: u32,
    height: u32,
    recovery: RecoveryController,
    attempts: u64,
    frames_captured: u64,
    errors: u64,
    last_capture: Option<Instant>,
    last_capture_ms: Option<u64>,
}

impl<B: GraphicsBackend> CaptureSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, SessionConfig::default())
    }

    pub fn with_config(backend: B, session_config: SessionConfig) -> Self {
        Self {
            pipeline: None,
            backend,
            state: SessionState::Uninitialized,
            output_index: config::capture::DEFAULT_OUTPUT_INDEX,
            width: 0,
            height: 0,
            recovery: RecoveryController::new(session_config.max_consecutive_errors),
            attempts: 0,
            frames_captured: 0,
            errors: 0,
            last_capture: None,
            last_capture_ms: None,
        }
    }

    /// Stand up device, output, channel and staging surface for `output_index`.
    ///
    /// Any existing resources are released first. On failure everything created so far is
    /// released and the session is left `Uninitialized`.
    pub fn initialize(&mut self, output_index: u32) -> Result<(), CaptureError> {
        self.release_resources();
        self.output_index = output_index;
        self.state = SessionState::Initializing;

        match Pipeline::<B::Context>::open(&self.backend, output_index) {
            Ok((pipeline, width, height)) => {
                self.pipeline = Some(pipeline);
                self.width = width;
                self.height = height;
                self.state = SessionState::Ready;
                tracing::info!(
                    output_index,
                    width,
                    height,
                    "Capture session initialized"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Uninitialized;
                tracing::warn!(output_index, error = %e, "Capture session initialization failed");
                Err(e)
            }
        }
    }

    /// Re-run [`initialize`](Self::initialize) on the recorded output index
    pub fn reinitialize(&mut self) -> Result<(), CaptureError> {
        tracing::info!(output_index = self.output_index, "Reinitializing capture session");
        self.initialize(self.output_index).map_err(|e| {
            tracing::error!(error = %e, "Failed to reinitialize capture session");
            e
        })
    }

    /// Release every GPU object. Cumulative counters survive.
    pub fn teardown(&mut self) {
        if self.pipeline.is_some() {
            tracing::info!(output_index = self.output_index, "Tearing down capture session");
        }
        self.release_resources();
    }

    /// Wait up to `timeout_ms` for the next desktop image.
    ///
    /// Returns [`CaptureOutcome::NoNewFrame`] when nothing changed on screen. After an
    /// access loss every call fails with [`CaptureError::AccessLost`] without touching the
    /// channel until [`reinitialize`](Self::reinitialize) succeeds.
    pub fn capture_frame(&mut self, timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        match self.state {
            SessionState::Ready => {}
            SessionState::AccessLost => return Err(CaptureError::AccessLost),
            SessionState::Uninitialized | SessionState::Initializing => {
                return Err(CaptureError::NotInitialized)
            }
        }

        let pipeline = self.pipeline.as_mut().ok_or(CaptureError::NotInitialized)?;
        self.attempts += 1;

        match Self::attempt(pipeline, timeout_ms) {
            Attempt::Timeout => {
                self.recovery.on_success();
                Ok(CaptureOutcome::NoNewFrame)
            }
            Attempt::Frame(frame) => {
                self.recovery.on_success();
                self.width = frame.width;
                self.height = frame.height;
                self.frames_captured += 1;
                self.last_capture = Some(Instant::now());
                self.last_capture_ms = Some(frame.timestamp_ms);

                if self.frames_captured % config::capture::LOG_EVERY_N_FRAMES == 1 {
                    tracing::info!(
                        frames = self.frames_captured,
                        width = frame.width,
                        height = frame.height,
                        stride = frame.stride,
                        "Captured frame"
                    );
                }

                Ok(CaptureOutcome::Frame(frame))
            }
            Attempt::Failed(kind, error) => Err(self.on_failure(kind, error)),
        }
    }

    /// One acquire → copy → map → release round trip
    fn attempt(pipeline: &mut Pipeline<B::Context>, timeout_ms: u32) -> Attempt {
        match pipeline.channel.acquire_frame(timeout_ms) {
            AcquireOutcome::Timeout => Attempt::Timeout,
            AcquireOutcome::Frame(texture) => {
                let result = pipeline.read_back(&texture);
                drop(texture);

                // Always hand the frame back, even if the copy failed
                let released = pipeline.channel.release_frame();
                match (result, released) {
                    (Ok(frame), Ok(())) => Attempt::Frame(frame),
                    (Err(e), _) | (Ok(_), Err(e)) => Attempt::Failed(FailureKind::Transient, e),
                }
            }
            AcquireOutcome::Lost => {
                let _ = pipeline.channel.release_frame();
                Attempt::Failed(FailureKind::Lost, CaptureError::AccessLost)
            }
            AcquireOutcome::Error(detail) => {
                let _ = pipeline.channel.release_frame();
                Attempt::Failed(
                    FailureKind::Transient,
                    CaptureError::capture("AcquireNextFrame", detail),
                )
            }
        }
    }

    fn on_failure(&mut self, kind: FailureKind, error: CaptureError) -> CaptureError {
        self.errors += 1;

        match self.recovery.on_failure(kind) {
            RecoveryAction::Retry => {
                tracing::warn!(
                    error = %error,
                    consecutive = self.recovery.consecutive_errors(),
                    "Transient capture failure"
                );
                error
            }
            RecoveryAction::LockUntilReinitialize => {
                tracing::warn!(
                    cause = %error,
                    consecutive = self.recovery.consecutive_errors(),
                    "Desktop duplication access lost, reinitialize required"
                );
                self.state = SessionState::AccessLost;
                CaptureError::AccessLost
            }
        }
    }

    fn release_resources(&mut self) {
        self.pipeline = None;
        self.width = 0;
        self.height = 0;
        self.state = SessionState::Uninitialized;
        self.recovery.reset();
    }

    /// True only in [`SessionState::Ready`]
    pub fn is_initialized(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Output index used by the last initialize (and by reinitialize)
    pub fn output_index(&self) -> u32 {
        self.output_index
    }

    /// Current output width, 0 unless ready
    pub fn width(&self) -> u32 {
        if self.is_initialized() {
            self.width
        } else {
            0
        }
    }

    /// Current output height, 0 unless ready
    pub fn height(&self) -> u32 {
        if self.is_initialized() {
            self.height
        } else {
            0
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Time since the last successful capture
    pub fn since_last_capture(&self) -> Option<Duration> {
        self.last_capture.map(|at| at.elapsed())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            initialized: self.is_initialized(),
            width: self.width(),
            height: self.height(),
            state: self.state,
            output_index: self.output_index,
            attempts: self.attempts,
            frames_captured: self.frames_captured,
            errors: self.errors,
            last_capture_ms: self.last_capture_ms,
        }
    }
}

impl<B: GraphicsBackend + Default> Default for CaptureSession<B> {
    fn default() -> Self {
        Self::new(B::default())
    }
}
