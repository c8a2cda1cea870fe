use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::host::{CellRange, HostError, HostGateway, RawSession, ResourceHandle, Worksheet};
use super::retry::Backoff;

// Set to false to silence per-attempt logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    /// First readiness-wait window after connecting the raw interface.
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    /// Pause before the second, last-chance readiness wait.
    pub ready_grace: Duration,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(300),
            ready_timeout: Duration::from_millis(1000),
            ready_poll: Duration::from_millis(100),
            ready_grace: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum AcquireError {
    /// A missing precondition the user has to fix. Never retried.
    #[error("{0}")]
    Connection(HostError),
    /// Transient failures exhausted the attempt budget.
    #[error("Could not get a fresh Excel selection after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// Gets a fresh, verified reference chain to the active Excel app, workbook,
/// sheet, and selection.
///
/// The wrapper interface caches object identity, so whenever the user switches
/// sheets, switches workbooks, or alt-tabs away and back, its `active_*`
/// accessors can answer from a no-longer-current object without erroring. The
/// only reliable detection is cross-checking a cheap identity (the sheet name)
/// against the low-level live interface, and the only recovery is re-resolving
/// objects by name rather than by cached reference. That is what each attempt
/// here does:
///
/// 1. connect through the low-level interface first (bypasses wrapper caches)
/// 2. wait for the host to report ready (absorbs the post-alt-tab window)
/// 3. nudge the host to reconcile internal state (non-fatal)
/// 4. resolve workbook and sheet by their live names, wrapper fallback
/// 5. resolve the selection, verify its owning sheet, rebuild from live
///    coordinates on mismatch
pub fn acquire(
    gateway: &dyn HostGateway,
    config: &AcquireConfig,
) -> Result<ResourceHandle, AcquireError> {
    let backoff = Backoff::new(config.backoff_base);
    let mut last_error = String::from("no attempts were made");

    for attempt in 0..config.max_attempts {
        match acquire_once(gateway, config) {
            Ok(handle) => {
                log_info!("Selection acquired: {}", handle.describe());
                return Ok(handle);
            }
            Err(err) if err.is_connection() => {
                // Backoff cannot open a workbook or select a cell for the user.
                return Err(AcquireError::Connection(err));
            }
            Err(err) => {
                last_error = err.to_string();
                if attempt + 1 < config.max_attempts {
                    let delay = backoff.delay(attempt);
                    log_warn!(
                        "Acquire attempt {} failed: {}. Retry in {:?}...",
                        attempt + 1,
                        err,
                        delay
                    );
                    thread::sleep(delay);
                } else {
                    log_warn!(
                        "All {} acquire attempts failed. Last error: {}",
                        config.max_attempts,
                        err
                    );
                }
            }
        }
    }

    Err(AcquireError::RetriesExhausted {
        attempts: config.max_attempts,
        last_error,
    })
}

fn acquire_once(
    gateway: &dyn HostGateway,
    config: &AcquireConfig,
) -> Result<ResourceHandle, HostError> {
    // --- Step 1: low-level connection first ---
    let raw = match gateway.raw() {
        Ok(raw) => Some(raw),
        Err(HostError::NotRunning) => return Err(HostError::NotRunning),
        Err(err) => {
            // Low-level interface unavailable; the wrapper alone still works,
            // it just cannot catch stale references this round.
            log_warn!("Low-level interface unavailable ({err}); using wrapper only");
            None
        }
    };

    // --- Step 2: readiness wait (handles alt-tab recovery) ---
    if let Some(raw) = raw.as_deref() {
        if !wait_for_ready(raw, config.ready_timeout, config.ready_poll) {
            log_info!("Waiting for Excel to be ready...");
            thread::sleep(config.ready_grace);
            if !wait_for_ready(raw, config.ready_timeout * 2, config.ready_poll) {
                return Err(HostError::Busy(
                    "not responding after regaining focus".into(),
                ));
            }
        }

        if raw.active_workbook_name()?.is_none() {
            return Err(HostError::NoWorkbook);
        }
        if raw.active_sheet_name()?.is_none() {
            return Err(HostError::NoSheet);
        }
    }

    let app = gateway.wrapper()?;

    // --- Step 3: force the host to reconcile its internal state ---
    // Helps when rows were just inserted or the user changed sheets. Failures
    // here are not fatal.
    if let Some(raw) = raw.as_deref() {
        if let Err(err) = nudge_refresh(raw) {
            log_info!("Note: refresh failed ({err}), continuing...");
        }
    }

    // A version read is the cheapest responsiveness probe the wrapper has.
    app.version()
        .map_err(|err| HostError::Busy(err.to_string()))?;

    // --- Step 4: workbook and sheet by current name, never by cached "active" ---
    let live_workbook_name = match raw.as_deref() {
        Some(raw) => raw.active_workbook_name().unwrap_or(None),
        None => None,
    };
    let workbook = match live_workbook_name {
        // The wrapper's index may not know a just-opened workbook yet.
        Some(name) => app
            .workbook_by_name(&name)
            .or_else(|_| app.active_workbook())?,
        None => app.active_workbook()?,
    };

    let live_sheet_name = match raw.as_deref() {
        Some(raw) => raw.active_sheet_name().unwrap_or(None),
        None => None,
    };
    let sheet = match live_sheet_name.as_deref() {
        Some(name) => workbook
            .sheet_by_name(name)
            .or_else(|_| workbook.active_sheet())?,
        None => workbook.active_sheet()?,
    };

    // --- Step 5: selection, with stale reference detection ---
    let selection = resolve_selection(&*app, raw.as_deref(), &*sheet)?;

    Ok(ResourceHandle {
        app,
        workbook,
        sheet,
        selection,
    })
}

fn resolve_selection(
    app: &dyn super::host::WrapperApp,
    raw: Option<&dyn RawSession>,
    sheet: &dyn Worksheet,
) -> Result<Box<dyn CellRange>, HostError> {
    match app.selection() {
        Ok(selection) => match selection.sheet_name() {
            Ok(owner) if owner != sheet.name() => {
                // Classic staleness: the wrapper handed back a selection cached
                // from a previously active sheet.
                log_warn!(
                    "Stale selection detected (selection on '{}', active sheet is '{}'); correcting",
                    owner,
                    sheet.name()
                );
                let corrected = selection_from_raw(raw, sheet)?;
                log_info!("Corrected selection: {}", corrected.address());
                Ok(corrected)
            }
            Ok(_) => Ok(selection),
            Err(err) => {
                // Verification failed but we do have a selection; use it.
                log_info!("Sheet verification skipped ({err})");
                Ok(selection)
            }
        },
        Err(wrapper_err) => {
            log_warn!("Wrapper selection failed ({wrapper_err}); using live coordinates");
            selection_from_raw(raw, sheet)
        }
    }
}

fn selection_from_raw(
    raw: Option<&dyn RawSession>,
    sheet: &dyn Worksheet,
) -> Result<Box<dyn CellRange>, HostError> {
    let raw = raw.ok_or(HostError::NoSelection)?;
    match raw.selection_position()? {
        Some((row, column)) => sheet.range(row, column),
        None => Err(HostError::NoSelection),
    }
}

/// Polls cheap read-only properties until the host answers all of them, or the
/// timeout passes. After an alt-tab the host can refuse automation calls for a
/// few hundred milliseconds while it restores its window.
fn wait_for_ready(raw: &dyn RawSession, timeout: Duration, poll: Duration) -> bool {
    let start = Instant::now();
    loop {
        // Workbook presence is deliberately not part of readiness: a missing
        // workbook must surface as NoWorkbook, not as a timeout.
        let ready = raw.version().is_ok() && raw.is_ready().unwrap_or(false);
        if ready {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(poll);
    }
}

/// A screen-updating toggle plus a recalculation is the cheapest way to make
/// the host flush pending internal state.
fn nudge_refresh(raw: &dyn RawSession) -> Result<(), HostError> {
    raw.set_screen_updating(false)?;
    raw.set_screen_updating(true)?;
    if let Err(err) = raw.recalculate() {
        log_info!("Recalculate skipped ({err})");
    }
    Ok(())
}
