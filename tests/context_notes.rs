//! Context extraction and note writing against the scripted host.

mod common;

use common::{acquire_handle, fast_note, shared, SimSelection, SimState};

use axenote::excel::context::{
    extract_context, UNKNOWN_LINE_ITEM, UNKNOWN_PERIOD, UNKNOWN_TICKER,
};
use axenote::excel::notes::{NoteError, NoteWriter};

#[test]
fn context_reads_the_typical_model_layout() {
    let mut sim = SimState::single_sheet("Model");
    sim.set_cell("Model", 1, 1, "AAPL");
    sim.set_cell("Model", 5, 1, "Revenue");
    sim.set_cell("Model", 5, 2, "$1,234"); // data, not a label
    sim.set_cell("Model", 2, 3, "Q3 FY24");
    sim.set_cell("Model", 4, 3, "1,234"); // data in the header scan path
    sim.selection = SimSelection::single("Model", 5, 3);
    let state = shared(sim);

    let handle = acquire_handle(&state);
    let context = extract_context(&*handle.sheet, &*handle.selection);

    assert_eq!(context.ticker, "AAPL");
    assert_eq!(context.line_item, "Revenue");
    assert_eq!(context.period, "Q3 FY24");
    assert_eq!(context.cell_address, "$C$5");
}

#[test]
fn context_degrades_to_defaults_on_an_empty_sheet() {
    let mut sim = SimState::single_sheet("Model");
    sim.selection = SimSelection::single("Model", 1, 1);
    let state = shared(sim);

    let handle = acquire_handle(&state);
    let context = extract_context(&*handle.sheet, &*handle.selection);

    assert_eq!(context.ticker, UNKNOWN_TICKER);
    assert_eq!(context.period, UNKNOWN_PERIOD);
    assert_eq!(context.line_item, UNKNOWN_LINE_ITEM);
    assert_eq!(context.cell_address, "$A$1");
}

#[test]
fn second_note_replaces_the_first() {
    let state = shared(SimState::single_sheet("Model"));
    let writer = NoteWriter::new();

    let handle = acquire_handle(&state);
    writer
        .attach(&*handle.sheet, &*handle.selection, "first", &fast_note())
        .unwrap();
    writer
        .attach(&*handle.sheet, &*handle.selection, "second", &fast_note())
        .unwrap();

    // Read back through the range itself, then cross-check the sim's books.
    assert_eq!(handle.selection.note().unwrap(), Some("second".to_string()));
    let sim = state.lock().unwrap();
    assert_eq!(sim.note_at("Model", 2, 2), Some("second".to_string()));
    assert_eq!(sim.note_writes.len(), 2);
}

#[test]
fn multi_cell_selection_narrows_to_top_left() {
    let mut sim = SimState::single_sheet("Model");
    sim.selection = SimSelection {
        sheet: "Model".to_string(),
        row: 2,
        column: 2,
        cells: 9, // B2:D4
    };
    let state = shared(sim);
    let writer = NoteWriter::new();

    let handle = acquire_handle(&state);
    writer
        .attach(&*handle.sheet, &*handle.selection, "note", &fast_note())
        .unwrap();

    let sim = state.lock().unwrap();
    assert_eq!(sim.note_writes.len(), 1);
    assert_eq!(sim.note_writes[0].row, 2);
    assert_eq!(sim.note_writes[0].column, 2);
    assert_eq!(sim.note_at("Model", 2, 2), Some("note".to_string()));
}

#[test]
fn clear_falls_back_when_direct_clear_is_unsupported() {
    let mut sim = SimState::single_sheet("Model");
    sim.clear_notes_works = false;
    let state = shared(sim);
    let writer = NoteWriter::new();

    let handle = acquire_handle(&state);
    writer
        .attach(&*handle.sheet, &*handle.selection, "first", &fast_note())
        .unwrap();
    // The probed fallback strategy must keep overwrite semantics working.
    writer
        .attach(&*handle.sheet, &*handle.selection, "second", &fast_note())
        .unwrap();

    assert_eq!(
        state.lock().unwrap().note_at("Model", 2, 2),
        Some("second".to_string())
    );
}

#[test]
fn write_failures_are_retried_within_the_attempt_budget() {
    let mut sim = SimState::single_sheet("Model");
    sim.set_note_failures = 2; // fewer than max_attempts
    let state = shared(sim);
    let writer = NoteWriter::new();

    let handle = acquire_handle(&state);
    writer
        .attach(&*handle.sheet, &*handle.selection, "eventually", &fast_note())
        .unwrap();

    assert_eq!(
        state.lock().unwrap().note_at("Model", 2, 2),
        Some("eventually".to_string())
    );
}

#[test]
fn write_gives_up_after_the_attempt_budget() {
    let mut sim = SimState::single_sheet("Model");
    sim.set_note_failures = 10;
    let state = shared(sim);
    let writer = NoteWriter::new();

    let handle = acquire_handle(&state);
    let err = writer
        .attach(&*handle.sheet, &*handle.selection, "never", &fast_note())
        .unwrap_err();

    let NoteError::RetriesExhausted { attempts, .. } = err;
    assert_eq!(attempts, 3);
    assert_eq!(state.lock().unwrap().note_at("Model", 2, 2), None);
}
