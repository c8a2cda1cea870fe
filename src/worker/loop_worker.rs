use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Result;
use uuid::Uuid;

use crate::annotate::AnnotationSource;
use crate::excel::acquire::acquire;
use crate::excel::context::extract_context;
use crate::excel::health_check;
use crate::excel::host::HostGateway;
use crate::excel::notes::NoteWriter;

use super::{AnnotateMode, AnnotationRequest, Task, WorkerConfig, WorkerState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub(crate) fn run<F>(
    factory: F,
    source: Box<dyn AnnotationSource + Send>,
    config: WorkerConfig,
    rx: Receiver<Task>,
    state: Arc<Mutex<WorkerState>>,
    done_tx: Sender<()>,
) where
    F: FnOnce() -> Result<Box<dyn HostGateway>>,
{
    log_info!("Worker thread started, connecting to host...");

    let gateway = match factory() {
        Ok(gateway) => gateway,
        Err(err) => {
            log_error!("Could not initialize host gateway: {err:#}");
            set_state(&state, WorkerState::Stopped);
            let _ = done_tx.send(());
            return;
        }
    };

    // Startup probe is informational only; the host may come up later.
    match health_check(&*gateway) {
        Ok(msg) => log_info!("Excel connection verified: {msg}"),
        Err(err) => {
            log_warn!("{err}");
            log_warn!("The tool will still run - ensure Excel is open when using hotkeys.");
        }
    }

    let writer = NoteWriter::new();

    loop {
        // Service the host's pending cross-process messages on every idle
        // tick. Skipping this lets the host's references go stale even with
        // no annotation in flight.
        gateway.pump_messages();

        let task = match rx.recv_timeout(config.poll_interval) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match task {
            Task::Shutdown => {
                set_state(&state, WorkerState::ShuttingDown);
                break;
            }
            Task::HealthCheck => match health_check(&*gateway) {
                Ok(msg) => log_info!("Health: CONNECTED: {msg}"),
                Err(err) => log_warn!("Health: NOT READY: {err}"),
            },
            Task::Annotate(request) => {
                set_state(&state, WorkerState::Processing);
                process_request(&*gateway, &*source, &writer, &config, request);
                set_state(&state, WorkerState::Idle);
                // Back-to-back interop bursts overwhelm some host versions.
                thread::sleep(config.cooldown);
                log_info!("Ready for next annotation...");
            }
        }
    }

    set_state(&state, WorkerState::Stopped);
    let _ = done_tx.send(());
    log_info!("Worker thread stopped.");
}

fn process_request(
    gateway: &dyn HostGateway,
    source: &dyn AnnotationSource,
    writer: &NoteWriter,
    config: &WorkerConfig,
    request: AnnotationRequest,
) {
    let request_id = short_id();
    log_info!("[{request_id}] Processing {:?} annotation request", request.mode);

    let handle = match acquire(gateway, &config.acquire) {
        Ok(handle) => handle,
        Err(err) => {
            log_error!("[{request_id}] {err}");
            log_info!("[{request_id}] Tip: press Esc in Excel if you're editing a cell.");
            return;
        }
    };

    let context = extract_context(&*handle.sheet, &*handle.selection);
    log_info!(
        "[{request_id}] Context: {} | {} | {} | Cell: {}",
        context.ticker,
        context.period,
        context.line_item,
        context.cell_address
    );

    let prompt = match request.mode {
        AnnotateMode::Prompted => request.payload.as_deref(),
        AnnotateMode::Auto => None,
    };
    // The pipeline never fails; data-source problems come back as readable
    // text inside the note.
    let note = source.fetch(&context, prompt);

    match writer.attach(&*handle.sheet, &*handle.selection, &note, &config.note) {
        Ok(()) => log_info!("[{request_id}] Annotation added to {}", context.cell_address),
        Err(err) => log_error!("[{request_id}] {err}"),
    }
}

fn set_state(state: &Arc<Mutex<WorkerState>>, value: WorkerState) {
    *state.lock().unwrap() = value;
}

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}
