//! The single worker thread that owns all host interop.
//!
//! Hotkey callbacks and the stdin loop run on other threads; the host's
//! automation layer is not safe to touch from more than one thread, so
//! producers only enqueue requests here and the worker drains them in FIFO
//! order. Same shape as a dedicated thread holding non-Send resources behind
//! an mpsc channel.

mod loop_worker;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

use crate::annotate::AnnotationSource;
use crate::excel::acquire::AcquireConfig;
use crate::excel::host::HostGateway;
use crate::excel::notes::NoteConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotateMode {
    /// Hotkey-triggered: derive everything from the cell position.
    Auto,
    /// User supplied a custom prompt to steer the annotation.
    Prompted,
}

#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub mode: AnnotateMode,
    pub payload: Option<String>,
}

impl AnnotationRequest {
    pub fn auto() -> Self {
        Self {
            mode: AnnotateMode::Auto,
            payload: None,
        }
    }

    pub fn prompted(prompt: String) -> Self {
        Self {
            mode: AnnotateMode::Prompted,
            payload: Some(prompt),
        }
    }
}

pub(crate) enum Task {
    Annotate(AnnotationRequest),
    HealthCheck,
    /// Sentinel: wakes the worker out of its poll and stops it after all
    /// earlier tasks have been processed.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Processing,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub acquire: AcquireConfig,
    pub note: NoteConfig,
    /// Queue poll interval. A short poll rather than a blocking wait: the
    /// host's pending messages must be serviced while idle or its
    /// cross-process references rot even with no annotation in flight.
    pub poll_interval: Duration,
    /// Pause after each completed request before picking up the next one.
    pub cooldown: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            acquire: AcquireConfig::default(),
            note: NoteConfig::default(),
            poll_interval: Duration::from_millis(100),
            cooldown: Duration::from_millis(200),
        }
    }
}

pub struct WorkerHandle {
    tx: Sender<Task>,
    state: Arc<Mutex<WorkerState>>,
    done_rx: Mutex<Option<Receiver<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawns the worker thread. The gateway is constructed by `factory`
    /// inside the new thread, not here: the host's interop apartment binds to
    /// the thread that initializes it, so the gateway must never exist on the
    /// caller's side.
    pub fn spawn<F>(
        factory: F,
        source: Box<dyn AnnotationSource + Send>,
        config: WorkerConfig,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn HostGateway>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(WorkerState::Idle));
        let thread_state = Arc::clone(&state);

        let join = thread::Builder::new()
            .name("excel-worker".to_string())
            .spawn(move || {
                loop_worker::run(factory, source, config, rx, thread_state, done_tx);
            })?;

        Ok(Self {
            tx,
            state,
            done_rx: Mutex::new(Some(done_rx)),
            join: Mutex::new(Some(join)),
        })
    }

    /// Fire-and-forget: producers never wait for a result.
    pub fn enqueue(&self, request: AnnotationRequest) {
        let _ = self.tx.send(Task::Annotate(request));
    }

    pub fn request_health_check(&self) {
        let _ = self.tx.send(Task::HealthCheck);
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    /// Cooperative shutdown: enqueue the sentinel, then wait at most `timeout`
    /// for the worker to finish whatever it is processing and stop. Returns
    /// false if the worker did not stop in time (an unreachable host mid-call
    /// can hold it up); the caller proceeds with exit either way.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let _ = self.tx.send(Task::Shutdown);

        let stopped = match self.done_rx.lock().unwrap().take() {
            Some(done_rx) => done_rx.recv_timeout(timeout).is_ok(),
            None => true, // shutdown already completed earlier
        };

        if stopped {
            if let Some(handle) = self.join.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
        stopped
    }
}
