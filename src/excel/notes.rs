use std::cell::Cell;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use super::host::{CellRange, HostError, Worksheet};
use super::retry::Backoff;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone)]
pub struct NoteConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// Pause between the clear and write steps. Back-to-back interop writes
    /// have been observed to silently no-op on some host versions.
    pub settle_delay: Duration,
}

impl Default for NoteConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(300),
            settle_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum NoteError {
    #[error("Failed to write note after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// The two ways of removing an existing note, in preference order. Which one
/// works depends on the host version; the writer probes once and then sticks
/// with whichever succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearStrategy {
    ClearNotes,
    DeleteNoteObject,
}

const CLEAR_ORDER: [ClearStrategy; 2] = [ClearStrategy::ClearNotes, ClearStrategy::DeleteNoteObject];

/// Writes notes to cells with overwrite semantics: at most one note per cell,
/// a second write replaces the first.
///
/// Lives for the worker thread's lifetime so the probed clear strategy is
/// reused across requests.
pub struct NoteWriter {
    working_clear: Cell<Option<ClearStrategy>>,
}

impl NoteWriter {
    pub fn new() -> Self {
        Self {
            working_clear: Cell::new(None),
        }
    }

    /// Attaches `text` as the note on the selection's top-left cell. A
    /// multi-cell selection deliberately narrows to its top-left cell; notes
    /// are single-cell attachments in every host version.
    ///
    /// The whole clear+write sequence is retried on the shared backoff
    /// schedule. Clearing failures are swallowed (absence of a prior note is
    /// not an error); only the write itself can exhaust the attempts.
    pub fn attach(
        &self,
        sheet: &dyn Worksheet,
        selection: &dyn CellRange,
        text: &str,
        config: &NoteConfig,
    ) -> Result<(), NoteError> {
        let backoff = Backoff::new(config.backoff_base);
        let mut last_error = String::from("no attempts were made");

        for attempt in 0..config.max_attempts {
            match self.attach_once(sheet, selection, text, config.settle_delay) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_error = err.to_string();
                    if attempt + 1 < config.max_attempts {
                        let delay = backoff.delay(attempt);
                        log_warn!(
                            "Note write failed (attempt {}): {}. Retry in {:?}...",
                            attempt + 1,
                            err,
                            delay
                        );
                        thread::sleep(delay);
                    } else {
                        log_warn!(
                            "Failed to write note after {} attempts: {}",
                            config.max_attempts,
                            err
                        );
                    }
                }
            }
        }

        Err(NoteError::RetriesExhausted {
            attempts: config.max_attempts,
            last_error,
        })
    }

    fn attach_once(
        &self,
        sheet: &dyn Worksheet,
        selection: &dyn CellRange,
        text: &str,
        settle: Duration,
    ) -> Result<(), HostError> {
        let target: Box<dyn CellRange>;
        let cell: &dyn CellRange = if selection.cell_count() > 1 {
            target = sheet.range(selection.row(), selection.column())?;
            log_info!(
                "Multi-cell selection, narrowing to top-left cell {}",
                target.address()
            );
            &*target
        } else {
            selection
        };

        self.clear_existing(cell);
        thread::sleep(settle);
        cell.set_note(text)?;
        thread::sleep(settle);
        Ok(())
    }

    /// Tries the clear strategies in order, preferring the one that already
    /// worked on this host. All failures are swallowed.
    fn clear_existing(&self, cell: &dyn CellRange) {
        if let Some(strategy) = self.working_clear.get() {
            if run_clear(cell, strategy).is_ok() {
                return;
            }
            // The cached strategy stopped working; fall through and re-probe.
            self.working_clear.set(None);
        }

        for strategy in CLEAR_ORDER {
            match run_clear(cell, strategy) {
                Ok(()) => {
                    self.working_clear.set(Some(strategy));
                    return;
                }
                Err(err) => {
                    log_info!("Clear via {strategy:?} unavailable ({err})");
                }
            }
        }
    }
}

impl Default for NoteWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn run_clear(cell: &dyn CellRange, strategy: ClearStrategy) -> Result<(), HostError> {
    match strategy {
        ClearStrategy::ClearNotes => cell.clear_notes(),
        ClearStrategy::DeleteNoteObject => cell.delete_note_object(),
    }
}
