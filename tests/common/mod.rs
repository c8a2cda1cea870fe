//! In-memory scripted host for integration tests.
//!
//! `SimHost` implements the full gateway surface over shared state, so tests
//! can script staleness (wrapper selection pointing at a previously active
//! sheet), transient failures, and missing-capability hosts, then observe
//! every note write in order.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axenote::excel::acquire::AcquireConfig;
use axenote::excel::host::{
    CellRange, CellValue, HostError, HostGateway, RawSession, ResourceHandle, Workbook, WrapperApp,
    Worksheet,
};
use axenote::excel::notes::NoteConfig;
use axenote::worker::WorkerConfig;

#[derive(Debug, Clone)]
pub struct SimSelection {
    pub sheet: String,
    pub row: u32,
    pub column: u32,
    pub cells: u32,
}

impl SimSelection {
    pub fn single(sheet: &str, row: u32, column: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            row,
            column,
            cells: 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct SimSheet {
    pub cells: HashMap<(u32, u32), CellValue>,
    pub notes: HashMap<(u32, u32), String>,
}

#[derive(Debug, Clone)]
pub struct NoteWrite {
    pub sheet: String,
    pub row: u32,
    pub column: u32,
    pub text: String,
}

#[derive(Debug)]
pub struct SimState {
    pub workbook_name: String,
    pub workbook_open: bool,
    pub sheets: BTreeMap<String, SimSheet>,
    pub active_sheet: String,
    /// What the host actually has selected right now.
    pub selection: SimSelection,
    /// The wrapper's possibly stale view of the selection. `None` mirrors the
    /// live selection.
    pub wrapper_selection: Option<SimSelection>,
    /// Fail this many wrapper responsiveness probes with Busy before
    /// answering. Consumed once per acquire attempt.
    pub wrapper_busy_failures: u32,
    /// Fail this many note writes with an interop error before succeeding.
    pub set_note_failures: u32,
    pub clear_notes_works: bool,
    pub delete_note_works: bool,
    /// When false the low-level interface refuses to connect and the session
    /// layer must work wrapper-only.
    pub raw_available: bool,
    pub note_writes: Vec<NoteWrite>,
    pub pump_count: u64,
}

impl SimState {
    /// One workbook, one sheet, a 1x1 selection at B2. Tests adjust from here.
    pub fn single_sheet(sheet: &str) -> Self {
        let mut sheets = BTreeMap::new();
        sheets.insert(sheet.to_string(), SimSheet::default());
        Self {
            workbook_name: "Model.xlsx".to_string(),
            workbook_open: true,
            sheets,
            active_sheet: sheet.to_string(),
            selection: SimSelection::single(sheet, 2, 2),
            wrapper_selection: None,
            wrapper_busy_failures: 0,
            set_note_failures: 0,
            clear_notes_works: true,
            delete_note_works: true,
            raw_available: true,
            note_writes: Vec::new(),
            pump_count: 0,
        }
    }

    pub fn add_sheet(&mut self, name: &str) {
        self.sheets.insert(name.to_string(), SimSheet::default());
    }

    pub fn set_cell(&mut self, sheet: &str, row: u32, column: u32, text: &str) {
        self.sheets
            .get_mut(sheet)
            .expect("unknown sheet in test setup")
            .cells
            .insert((row, column), CellValue::Text(text.to_string()));
    }

    pub fn note_at(&self, sheet: &str, row: u32, column: u32) -> Option<String> {
        self.sheets.get(sheet)?.notes.get(&(row, column)).cloned()
    }
}

pub type SharedState = Arc<Mutex<SimState>>;

pub fn shared(state: SimState) -> SharedState {
    Arc::new(Mutex::new(state))
}

pub struct SimHost {
    state: SharedState,
}

impl SimHost {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

fn lock(state: &SharedState) -> MutexGuard<'_, SimState> {
    state.lock().unwrap()
}

impl HostGateway for SimHost {
    fn raw(&self) -> Result<Box<dyn RawSession>, HostError> {
        if !lock(&self.state).raw_available {
            return Err(HostError::Interop("low-level interface refused".into()));
        }
        Ok(Box::new(SimRaw {
            state: Arc::clone(&self.state),
        }))
    }

    fn wrapper(&self) -> Result<Box<dyn WrapperApp>, HostError> {
        Ok(Box::new(SimApp {
            state: Arc::clone(&self.state),
        }))
    }

    fn pump_messages(&self) {
        lock(&self.state).pump_count += 1;
    }
}

struct SimRaw {
    state: SharedState,
}

impl RawSession for SimRaw {
    fn version(&self) -> Result<String, HostError> {
        Ok("16.0".to_string())
    }

    fn is_ready(&self) -> Result<bool, HostError> {
        Ok(true)
    }

    fn active_workbook_name(&self) -> Result<Option<String>, HostError> {
        let state = lock(&self.state);
        Ok(state.workbook_open.then(|| state.workbook_name.clone()))
    }

    fn active_sheet_name(&self) -> Result<Option<String>, HostError> {
        Ok(Some(lock(&self.state).active_sheet.clone()))
    }

    fn selection_position(&self) -> Result<Option<(u32, u32)>, HostError> {
        let state = lock(&self.state);
        Ok(Some((state.selection.row, state.selection.column)))
    }

    fn set_screen_updating(&self, _on: bool) -> Result<(), HostError> {
        Ok(())
    }

    fn recalculate(&self) -> Result<(), HostError> {
        Ok(())
    }
}

struct SimApp {
    state: SharedState,
}

impl WrapperApp for SimApp {
    fn version(&self) -> Result<String, HostError> {
        let mut state = lock(&self.state);
        if state.wrapper_busy_failures > 0 {
            state.wrapper_busy_failures -= 1;
            return Err(HostError::Busy("scripted busy".into()));
        }
        Ok("16.0".to_string())
    }

    fn workbook_by_name(&self, name: &str) -> Result<Box<dyn Workbook>, HostError> {
        let state = lock(&self.state);
        if state.workbook_open && state.workbook_name == name {
            Ok(Box::new(SimWorkbook {
                state: Arc::clone(&self.state),
            }))
        } else {
            Err(HostError::Interop(format!("no workbook named '{name}'")))
        }
    }

    fn active_workbook(&self) -> Result<Box<dyn Workbook>, HostError> {
        if !lock(&self.state).workbook_open {
            return Err(HostError::NoWorkbook);
        }
        Ok(Box::new(SimWorkbook {
            state: Arc::clone(&self.state),
        }))
    }

    fn selection(&self) -> Result<Box<dyn CellRange>, HostError> {
        let state = lock(&self.state);
        let sel = state
            .wrapper_selection
            .clone()
            .unwrap_or_else(|| state.selection.clone());
        Ok(Box::new(SimRange {
            state: Arc::clone(&self.state),
            sheet: sel.sheet,
            row: sel.row,
            column: sel.column,
            cells: sel.cells,
        }))
    }
}

struct SimWorkbook {
    state: SharedState,
}

impl Workbook for SimWorkbook {
    fn name(&self) -> String {
        lock(&self.state).workbook_name.clone()
    }

    fn sheet_by_name(&self, name: &str) -> Result<Box<dyn Worksheet>, HostError> {
        if !lock(&self.state).sheets.contains_key(name) {
            return Err(HostError::Interop(format!("no sheet named '{name}'")));
        }
        Ok(Box::new(SimWorksheet {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        }))
    }

    fn active_sheet(&self) -> Result<Box<dyn Worksheet>, HostError> {
        let name = lock(&self.state).active_sheet.clone();
        self.sheet_by_name(&name)
    }
}

struct SimWorksheet {
    state: SharedState,
    name: String,
}

impl Worksheet for SimWorksheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue, HostError> {
        let state = lock(&self.state);
        let sheet = state
            .sheets
            .get(&self.name)
            .ok_or_else(|| HostError::Interop("sheet vanished".into()))?;
        Ok(sheet
            .cells
            .get(&(row, column))
            .cloned()
            .unwrap_or(CellValue::Empty))
    }

    fn range(&self, row: u32, column: u32) -> Result<Box<dyn CellRange>, HostError> {
        Ok(Box::new(SimRange {
            state: Arc::clone(&self.state),
            sheet: self.name.clone(),
            row,
            column,
            cells: 1,
        }))
    }
}

struct SimRange {
    state: SharedState,
    sheet: String,
    row: u32,
    column: u32,
    cells: u32,
}

impl CellRange for SimRange {
    fn address(&self) -> String {
        format!("${}${}", column_letters(self.column), self.row)
    }

    fn row(&self) -> u32 {
        self.row
    }

    fn column(&self) -> u32 {
        self.column
    }

    fn cell_count(&self) -> u32 {
        self.cells
    }

    fn sheet_name(&self) -> Result<String, HostError> {
        Ok(self.sheet.clone())
    }

    fn clear_notes(&self) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if !state.clear_notes_works {
            return Err(HostError::Interop("ClearNotes not supported".into()));
        }
        if let Some(sheet) = state.sheets.get_mut(&self.sheet) {
            sheet.notes.remove(&(self.row, self.column));
        }
        Ok(())
    }

    fn delete_note_object(&self) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if !state.delete_note_works {
            return Err(HostError::Interop("no note object".into()));
        }
        if let Some(sheet) = state.sheets.get_mut(&self.sheet) {
            sheet.notes.remove(&(self.row, self.column));
        }
        Ok(())
    }

    fn set_note(&self, text: &str) -> Result<(), HostError> {
        let mut state = lock(&self.state);
        if state.set_note_failures > 0 {
            state.set_note_failures -= 1;
            return Err(HostError::Interop("scripted write failure".into()));
        }
        let sheet = self.sheet.clone();
        state
            .sheets
            .get_mut(&sheet)
            .expect("unknown sheet in note write")
            .notes
            .insert((self.row, self.column), text.to_string());
        state.note_writes.push(NoteWrite {
            sheet,
            row: self.row,
            column: self.column,
            text: text.to_string(),
        });
        Ok(())
    }

    fn note(&self) -> Result<Option<String>, HostError> {
        Ok(lock(&self.state).note_at(&self.sheet, self.row, self.column))
    }
}

fn column_letters(column: u32) -> String {
    let mut n = column;
    let mut out = String::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        out.insert(0, (b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    out
}

/// Acquire settings with near-zero waits so failure-path tests stay fast.
pub fn fast_acquire() -> AcquireConfig {
    AcquireConfig {
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        ready_timeout: Duration::from_millis(10),
        ready_poll: Duration::from_millis(1),
        ready_grace: Duration::from_millis(1),
    }
}

pub fn fast_note() -> NoteConfig {
    NoteConfig {
        max_attempts: 3,
        backoff_base: Duration::from_millis(1),
        settle_delay: Duration::from_millis(0),
    }
}

pub fn fast_worker() -> WorkerConfig {
    WorkerConfig {
        acquire: fast_acquire(),
        note: fast_note(),
        poll_interval: Duration::from_millis(5),
        cooldown: Duration::from_millis(1),
    }
}

/// Acquires with the fast config and panics on failure; for tests that only
/// need a handle as a fixture.
pub fn acquire_handle(state: &SharedState) -> ResourceHandle {
    let host = SimHost::new(Arc::clone(state));
    axenote::excel::acquire::acquire(&host, &fast_acquire()).expect("acquire failed in fixture")
}
