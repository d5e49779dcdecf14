// capture/mock.rs - Scripted backend for session and worker tests
//
// Every object shares one MockState so tests can script acquire results, inject setup
// failures, and observe what the session did to the GPU side.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    AcquireOutcome, DuplicationChannel, GraphicsBackend, GraphicsContext, MappedSurface,
    OutputDesc, StagingSurface,
};
use crate::error::CaptureError;

/// One scripted `acquire_frame` result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockAcquire {
    Frame { width: u32, height: u32 },
    Timeout,
    Lost,
    Error,
}

/// Knobs a test flips before driving the session
#[derive(Debug, Default)]
pub(crate) struct MockScript {
    pub outputs: Vec<(u32, u32)>,
    pub acquires: VecDeque<MockAcquire>,
    pub fail_device: bool,
    pub fail_duplication: bool,
    pub fail_staging: bool,
    pub fail_map: bool,
    pub fail_release: bool,
    pub panic_on_acquire: bool,
    pub row_padding: u32,
}

#[derive(Default)]
struct MockState {
    script: Mutex<MockScript>,
    drop_order: Mutex<Vec<&'static str>>,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
    unmap_calls: AtomicUsize,
    mapped_now: AtomicUsize,
    contexts_created: AtomicUsize,
    surfaces_created: AtomicUsize,
    live_contexts: AtomicUsize,
    live_channels: AtomicUsize,
    live_surfaces: AtomicUsize,
}

impl MockState {
    fn script(&self) -> std::sync::MutexGuard<'_, MockScript> {
        self.script.lock().unwrap()
    }

    fn dropped(&self, what: &'static str, live: &AtomicUsize) {
        live.fetch_sub(1, Ordering::SeqCst);
        self.drop_order.lock().unwrap().push(what);
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn with_outputs(outputs: &[(u32, u32)]) -> Self {
        let backend = Self::default();
        backend.script(|s| s.outputs = outputs.to_vec());
        backend
    }

    pub fn script(&self, edit: impl FnOnce(&mut MockScript)) {
        edit(&mut self.state.script());
    }

    /// Lock the script; any backend call blocks until the guard drops
    pub fn hold(&self) -> std::sync::MutexGuard<'_, MockScript> {
        self.state.script()
    }

    pub fn push(&self, acquire: MockAcquire) {
        self.state.script().acquires.push_back(acquire);
    }

    pub fn acquire_calls(&self) -> usize {
        self.state.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.state.release_calls.load(Ordering::SeqCst)
    }

    pub fn unmap_calls(&self) -> usize {
        self.state.unmap_calls.load(Ordering::SeqCst)
    }

    pub fn mapped_now(&self) -> usize {
        self.state.mapped_now.load(Ordering::SeqCst)
    }

    pub fn contexts_created(&self) -> usize {
        self.state.contexts_created.load(Ordering::SeqCst)
    }

    pub fn surfaces_created(&self) -> usize {
        self.state.surfaces_created.load(Ordering::SeqCst)
    }

    pub fn live_contexts(&self) -> usize {
        self.state.live_contexts.load(Ordering::SeqCst)
    }

    pub fn live_channels(&self) -> usize {
        self.state.live_channels.load(Ordering::SeqCst)
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.live_surfaces.load(Ordering::SeqCst)
    }

    pub fn drop_order(&self) -> Vec<&'static str> {
        self.state.drop_order.lock().unwrap().clone()
    }
}

impl GraphicsBackend for MockBackend {
    type Context = MockContext;

    fn create_context(&self) -> Result<MockContext, CaptureError> {
        if self.state.script().fail_device {
            return Err(CaptureError::DeviceCreation {
                step: "D3D11CreateDevice",
                detail: "scripted failure".into(),
            });
        }
        self.state.contexts_created.fetch_add(1, Ordering::SeqCst);
        self.state.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(MockContext {
            state: self.state.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockTexture {
    pub width: u32,
    pub height: u32,
}

pub(crate) struct MockContext {
    state: Arc<MockState>,
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.state.dropped("context", &self.state.live_contexts);
    }
}

impl GraphicsContext for MockContext {
    type Texture = MockTexture;
    type Output = u32;
    type Channel = MockChannel;
    type Surface = MockSurface;

    fn resolve_output(&self, index: u32) -> Result<(u32, OutputDesc), CaptureError> {
        let script = self.state.script();
        let available = script.outputs.len() as u32;
        let (width, height) =
            *script
                .outputs
                .get(index as usize)
                .ok_or(CaptureError::InvalidOutputIndex { index, available })?;
        Ok((
            index,
            OutputDesc {
                name: format!("\\\\.\\DISPLAY{}", index + 1),
                width,
                height,
            },
        ))
    }

    fn open_channel(&self, _output: &u32) -> Result<MockChannel, CaptureError> {
        if self.state.script().fail_duplication {
            return Err(CaptureError::DuplicationUnavailable {
                step: "DuplicateOutput",
                detail: "scripted failure".into(),
            });
        }
        self.state.live_channels.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            state: self.state.clone(),
        })
    }

    fn create_surface(&self, width: u32, height: u32) -> Result<MockSurface, CaptureError> {
        let row_padding = {
            let script = self.state.script();
            if script.fail_staging {
                return Err(CaptureError::StagingAllocation {
                    width,
                    height,
                    detail: "scripted failure".into(),
                });
            }
            script.row_padding
        };
        self.state.surfaces_created.fetch_add(1, Ordering::SeqCst);
        self.state.live_surfaces.fetch_add(1, Ordering::SeqCst);
        Ok(MockSurface {
            state: self.state.clone(),
            width,
            height,
            row_pitch: width * 4 + row_padding,
            pixels: Vec::new(),
        })
    }

    fn texture_size(&self, texture: &MockTexture) -> (u32, u32) {
        (texture.width, texture.height)
    }
}

pub(crate) struct MockChannel {
    state: Arc<MockState>,
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.state.dropped("channel", &self.state.live_channels);
    }
}

impl DuplicationChannel for MockChannel {
    type Texture = MockTexture;

    fn acquire_frame(&mut self, _timeout_ms: u32) -> AcquireOutcome<MockTexture> {
        self.state.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.state.script();
            if script.panic_on_acquire {
                script.panic_on_acquire = false;
                drop(script);
                panic!("scripted acquire panic");
            }
            script.acquires.pop_front()
        };
        match next {
            Some(MockAcquire::Frame { width, height }) => {
                AcquireOutcome::Frame(MockTexture { width, height })
            }
            Some(MockAcquire::Lost) => AcquireOutcome::Lost,
            Some(MockAcquire::Error) => AcquireOutcome::Error("scripted failure".into()),
            Some(MockAcquire::Timeout) | None => AcquireOutcome::Timeout,
        }
    }

    fn release_frame(&mut self) -> Result<(), CaptureError> {
        self.state.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.script().fail_release {
            return Err(CaptureError::capture("ReleaseFrame", "scripted failure"));
        }
        Ok(())
    }
}

pub(crate) struct MockSurface {
    state: Arc<MockState>,
    width: u32,
    height: u32,
    row_pitch: u32,
    pixels: Vec<u8>,
}

impl Drop for MockSurface {
    fn drop(&mut self) {
        self.state.dropped("surface", &self.state.live_surfaces);
    }
}

impl StagingSurface for MockSurface {
    type Texture = MockTexture;

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn copy_from(&mut self, _texture: &MockTexture) {
        // Blue-green-red-alpha gradient, padding bytes left at zero
        let pitch = self.row_pitch as usize;
        self.pixels = vec![0; pitch * self.height as usize];
        for (y, row) in self.pixels.chunks_mut(pitch).enumerate() {
            for (x, px) in row[..self.width as usize * 4].chunks_mut(4).enumerate() {
                px.copy_from_slice(&[x as u8, y as u8, 0x80, 0xFF]);
            }
        }
    }

    fn map_for_read(&mut self) -> Result<MappedSurface<'_>, CaptureError> {
        if self.state.script().fail_map {
            return Err(CaptureError::capture("Map", "scripted failure"));
        }
        self.state.mapped_now.fetch_add(1, Ordering::SeqCst);
        let state = self.state.clone();
        Ok(MappedSurface::new(&self.pixels, self.row_pitch, move || {
            state.mapped_now.fetch_sub(1, Ordering::SeqCst);
            state.unmap_calls.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
