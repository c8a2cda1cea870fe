//! Handle acquisition against the scripted host: staleness correction,
//! connection-vs-transient error handling, and the wrapper-only fallback.

mod common;

use common::{fast_acquire, shared, SimHost, SimSelection, SimState};

use axenote::excel::acquire::{acquire, AcquireError};
use axenote::excel::host::HostError;

#[test]
fn fresh_chain_resolves_active_objects() {
    let state = shared(SimState::single_sheet("Model"));
    let host = SimHost::new(state.clone());

    let handle = acquire(&host, &fast_acquire()).unwrap();

    assert_eq!(handle.workbook.name(), "Model.xlsx");
    assert_eq!(handle.sheet.name(), "Model");
    assert_eq!(handle.selection.sheet_name().unwrap(), "Model");
    assert_eq!(handle.selection.address(), "$B$2");
}

#[test]
fn stale_wrapper_selection_is_corrected_from_live_coordinates() {
    let mut sim = SimState::single_sheet("Sheet1");
    sim.add_sheet("Sheet2");
    // The user switched to Sheet2 and selected C5, but the wrapper still
    // answers with the selection it cached on Sheet1.
    sim.active_sheet = "Sheet2".to_string();
    sim.selection = SimSelection::single("Sheet2", 5, 3);
    sim.wrapper_selection = Some(SimSelection::single("Sheet1", 2, 2));
    let state = shared(sim);
    let host = SimHost::new(state.clone());

    let handle = acquire(&host, &fast_acquire()).unwrap();

    assert_eq!(handle.sheet.name(), "Sheet2");
    assert_eq!(handle.selection.sheet_name().unwrap(), "Sheet2");
    assert_eq!(handle.selection.row(), 5);
    assert_eq!(handle.selection.column(), 3);
}

#[test]
fn missing_workbook_is_reported_without_retries() {
    let mut sim = SimState::single_sheet("Model");
    sim.workbook_open = false;
    // Would fail later probes too; must stay untouched because the attempt
    // loop bails before reaching them.
    sim.wrapper_busy_failures = 5;
    let state = shared(sim);
    let host = SimHost::new(state.clone());

    let err = match acquire(&host, &fast_acquire()) {
        Err(err) => err,
        Ok(handle) => panic!("expected failure, acquired {}", handle.describe()),
    };

    assert!(matches!(
        err,
        AcquireError::Connection(HostError::NoWorkbook)
    ));
    assert_eq!(state.lock().unwrap().wrapper_busy_failures, 5);
}

#[test]
fn transient_busy_is_retried_until_success() {
    let mut sim = SimState::single_sheet("Model");
    sim.wrapper_busy_failures = 2; // fewer than max_attempts
    let state = shared(sim);
    let host = SimHost::new(state.clone());

    let handle = acquire(&host, &fast_acquire()).unwrap();

    assert_eq!(handle.sheet.name(), "Model");
    assert_eq!(state.lock().unwrap().wrapper_busy_failures, 0);
}

#[test]
fn attempts_are_bounded_when_host_stays_busy() {
    let mut sim = SimState::single_sheet("Model");
    sim.wrapper_busy_failures = 10;
    let state = shared(sim);
    let host = SimHost::new(state.clone());

    match acquire(&host, &fast_acquire()) {
        Ok(handle) => panic!("expected failure, acquired {}", handle.describe()),
        Err(AcquireError::RetriesExhausted {
            attempts,
            last_error,
        }) => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("busy"), "unexpected: {last_error}");
        }
        Err(other) => panic!("expected RetriesExhausted, got {other}"),
    }
    // Exactly one probe consumed per attempt.
    assert_eq!(state.lock().unwrap().wrapper_busy_failures, 10 - 3);
}

#[test]
fn wrapper_only_fallback_when_low_level_interface_is_unavailable() {
    let mut sim = SimState::single_sheet("Model");
    sim.raw_available = false;
    let state = shared(sim);
    let host = SimHost::new(state.clone());

    let handle = acquire(&host, &fast_acquire()).unwrap();

    // No live cross-check is possible, so the wrapper's view stands.
    assert_eq!(handle.sheet.name(), "Model");
    assert_eq!(handle.selection.row(), 2);
    assert_eq!(handle.selection.column(), 2);
}
