//! Background capture worker
//!
//! Owns a [`CaptureSession`] on a dedicated OS thread so async callers never block on
//! `AcquireNextFrame`. Jobs arrive over a std channel; each answer goes back on its own
//! `tokio::sync::oneshot`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tokio::sync::oneshot;

use crate::capture::GraphicsBackend;
use crate::error::CaptureError;
use crate::frame::CaptureOutcome;
use crate::session::{CaptureSession, SessionStats};

type Reply<T> = oneshot::Sender<Result<T, CaptureError>>;

enum Job {
    Initialize(u32, Reply<()>),
    Reinitialize(Reply<()>),
    Capture(u32, Reply<CaptureOutcome>),
    Stats(Reply<SessionStats>),
    Teardown(Reply<()>),
}

/// Handle to a session running on its own thread
pub struct CaptureWorker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    capture_in_flight: Arc<AtomicBool>,
}

impl CaptureWorker {
    /// Move `session` onto a new worker thread
    pub fn spawn<B>(session: CaptureSession<B>) -> Result<Self>
    where
        B: GraphicsBackend,
        CaptureSession<B>: Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job>();
        let capture_in_flight = Arc::new(AtomicBool::new(false));
        let in_flight = capture_in_flight.clone();

        let thread = thread::Builder::new()
            .name("deskdup-capture".into())
            .spawn(move || run(session, rx, in_flight))
            .context("Failed to spawn capture worker thread")?;

        Ok(Self {
            jobs: Some(tx),
            thread: Some(thread),
            capture_in_flight,
        })
    }

    /// Capture without blocking the async runtime.
    ///
    /// Fails with [`CaptureError::Busy`] while another capture is still running.
    pub async fn capture_frame(&self, timeout_ms: u32) -> Result<CaptureOutcome, CaptureError> {
        let rx = self.submit_capture(timeout_ms)?;
        rx.await.map_err(|_| self.capture_abandoned())?
    }

    /// Same as [`capture_frame`](Self::capture_frame) for synchronous callers.
    ///
    /// Must not be called from inside an async runtime.
    pub fn capture_frame_blocking(
        &self,
        timeout_ms: u32,
    ) -> Result<CaptureOutcome, CaptureError> {
        let rx = self.submit_capture(timeout_ms)?;
        rx.blocking_recv().map_err(|_| self.capture_abandoned())?
    }

    pub async fn initialize(&self, output_index: u32) -> Result<(), CaptureError> {
        self.call(|reply| Job::Initialize(output_index, reply)).await
    }

    pub async fn reinitialize(&self) -> Result<(), CaptureError> {
        self.call(Job::Reinitialize).await
    }

    pub async fn stats(&self) -> Result<SessionStats, CaptureError> {
        self.call(Job::Stats).await
    }

    /// Release the session's GPU resources but keep the worker alive
    pub async fn teardown(&self) -> Result<(), CaptureError> {
        self.call(Job::Teardown).await
    }

    /// True while the worker thread accepts jobs
    pub fn is_running(&self) -> bool {
        self.jobs.is_some() && !self.thread_finished()
    }

    fn thread_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |thread| thread.is_finished())
    }

    /// Stop the worker; the session is torn down on its own thread
    pub fn shutdown(&mut self) {
        // Closing the channel ends the job loop
        if self.jobs.take().is_none() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Capture worker thread panicked");
            }
        }
        log::info!("Capture worker stopped");
    }

    fn submit_capture(
        &self,
        timeout_ms: u32,
    ) -> Result<oneshot::Receiver<Result<CaptureOutcome, CaptureError>>, CaptureError> {
        let jobs = self.jobs.as_ref().ok_or(CaptureError::WorkerClosed)?;
        if self.thread_finished() {
            return Err(CaptureError::WorkerClosed);
        }

        if self
            .capture_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::Busy);
        }

        let (reply, rx) = oneshot::channel();
        if jobs.send(Job::Capture(timeout_ms, reply)).is_err() {
            self.capture_in_flight.store(false, Ordering::Release);
            return Err(CaptureError::WorkerClosed);
        }
        Ok(rx)
    }

    /// The reply was dropped unanswered, so the worker is gone
    fn capture_abandoned(&self) -> CaptureError {
        self.capture_in_flight.store(false, Ordering::Release);
        CaptureError::WorkerClosed
    }

    async fn call<T>(&self, job: impl FnOnce(Reply<T>) -> Job) -> Result<T, CaptureError> {
        let jobs = self.jobs.as_ref().ok_or(CaptureError::WorkerClosed)?;
        let (reply, rx) = oneshot::channel();
        jobs.send(job(reply))
            .map_err(|_| CaptureError::WorkerClosed)?;
        rx.await.map_err(|_| CaptureError::WorkerClosed)?
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the single-flight flag when a capture ends, unwinding included
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn run<B: GraphicsBackend>(
    mut session: CaptureSession<B>,
    jobs: mpsc::Receiver<Job>,
    capture_in_flight: Arc<AtomicBool>,
) {
    log::info!("Capture worker started");

    while let Ok(job) = jobs.recv() {
        // A dropped receiver just means the caller stopped waiting
        match job {
            Job::Initialize(index, reply) => {
                let _ = reply.send(session.initialize(index));
            }
            Job::Reinitialize(reply) => {
                let _ = reply.send(session.reinitialize());
            }
            Job::Capture(timeout_ms, reply) => {
                let outcome = {
                    let _in_flight = InFlight(&capture_in_flight);
                    session.capture_frame(timeout_ms)
                };
                let _ = reply.send(outcome);
            }
            Job::Stats(reply) => {
                let _ = reply.send(Ok(session.stats()));
            }
            Job::Teardown(reply) => {
                session.teardown();
                let _ = reply.send(Ok(()));
            }
        }
    }

    session.teardown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::{MockAcquire, MockBackend};

    fn worker(backend: &MockBackend) -> CaptureWorker {
        CaptureWorker::spawn(CaptureSession::new(backend.clone())).unwrap()
    }

    #[tokio::test]
    async fn capture_runs_on_worker_thread() {
        let backend = MockBackend::with_outputs(&[(1920, 1080)]);
        let worker = worker(&backend);
        worker.initialize(0).await.unwrap();
        backend.push(MockAcquire::Frame {
            width: 1920,
            height: 1080,
        });

        let frame = worker.capture_frame(16).await.unwrap().into_frame().unwrap();
        assert_eq!((frame.width, frame.height), (1920, 1080));

        let stats = worker.stats().await.unwrap();
        assert!(stats.initialized);
        assert_eq!(stats.frames_captured, 1);
    }

    #[tokio::test]
    async fn errors_are_forwarded_to_caller() {
        let backend = MockBackend::with_outputs(&[(800, 600)]);
        let worker = worker(&backend);

        assert_eq!(
            worker.capture_frame(16).await.unwrap_err(),
            CaptureError::NotInitialized
        );
        assert!(matches!(
            worker.initialize(3).await.unwrap_err(),
            CaptureError::InvalidOutputIndex { index: 3, .. }
        ));
    }

    #[tokio::test]
    async fn second_capture_while_in_flight_is_busy() {
        let backend = MockBackend::with_outputs(&[(800, 600)]);
        let worker = worker(&backend);
        worker.initialize(0).await.unwrap();

        // The worker blocks inside acquire until the script lock is released
        let hold = backend.hold();
        let first = worker.submit_capture(16).unwrap();
        assert!(matches!(
            worker.submit_capture(16).unwrap_err(),
            CaptureError::Busy
        ));
        drop(hold);

        assert!(matches!(
            first.await.unwrap().unwrap(),
            CaptureOutcome::NoNewFrame
        ));
        assert!(worker.capture_frame(16).await.is_ok());
    }

    #[tokio::test]
    async fn panicked_worker_reports_closed_instead_of_busy() {
        let backend = MockBackend::with_outputs(&[(800, 600)]);
        let worker = worker(&backend);
        worker.initialize(0).await.unwrap();
        backend.script(|s| s.panic_on_acquire = true);

        assert_eq!(
            worker.capture_frame(16).await.unwrap_err(),
            CaptureError::WorkerClosed
        );
        for _ in 0..2 {
            assert_eq!(
                worker.capture_frame(16).await.unwrap_err(),
                CaptureError::WorkerClosed
            );
        }
        assert!(!worker.capture_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn reinitialize_through_worker_recovers_from_loss() {
        let backend = MockBackend::with_outputs(&[(800, 600)]);
        let worker = worker(&backend);
        worker.initialize(0).await.unwrap();
        backend.push(MockAcquire::Lost);

        assert_eq!(
            worker.capture_frame(16).await.unwrap_err(),
            CaptureError::AccessLost
        );
        worker.reinitialize().await.unwrap();
        assert!(worker.stats().await.unwrap().initialized);
    }

    #[tokio::test]
    async fn shutdown_tears_down_and_closes() {
        let backend = MockBackend::with_outputs(&[(800, 600)]);
        let mut worker = worker(&backend);
        worker.initialize(0).await.unwrap();

        worker.shutdown();
        assert!(!worker.is_running());
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(
            worker.capture_frame(16).await.unwrap_err(),
            CaptureError::WorkerClosed
        );
        assert_eq!(worker.stats().await.unwrap_err(), CaptureError::WorkerClosed);
    }

    #[test]
    fn blocking_capture_and_drop_release_session() {
        let backend = MockBackend::with_outputs(&[(640, 480)]);
        {
            let worker = worker(&backend);
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(worker.initialize(0)).unwrap();

            backend.push(MockAcquire::Frame {
                width: 640,
                height: 480,
            });
            assert!(worker.capture_frame_blocking(16).unwrap().is_frame());
        }
        assert_eq!(backend.live_contexts(), 0);
    }
}
