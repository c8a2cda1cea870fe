use thiserror::Error;

/// Errors surfaced by the host automation layer.
///
/// The connection variants describe missing preconditions the user has to fix
/// (open Excel, open a workbook, select a cell); retrying cannot repair them,
/// so the acquirer reports them immediately. Everything else is treated as
/// transient and goes through the backoff schedule.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("No Excel running. Please open Excel first.")]
    NotRunning,
    #[error("No active workbook. Please open a workbook.")]
    NoWorkbook,
    #[error("No active sheet found.")]
    NoSheet,
    #[error("No selection in Excel. Please select a cell.")]
    NoSelection,
    #[error("Excel busy or in Edit Mode. Press Esc in Excel first. ({0})")]
    Busy(String),
    #[error("Excel interop call failed: {0}")]
    Interop(String),
}

impl HostError {
    /// True for errors that name a missing user precondition. The acquirer
    /// does not retry these.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            HostError::NotRunning
                | HostError::NoWorkbook
                | HostError::NoSheet
                | HostError::NoSelection
        )
    }
}

/// A cell value read through the host, as an explicit result instead of a
/// property read that may throw mid-operation.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// The low-level live interface: the `GetActiveObject` connection that always
/// answers from the host's current state and bypasses any wrapper-side cache.
///
/// All reads return `Result` because the host may be mid-operation (cell edit
/// mode, dialog open) and refuse automation calls entirely.
pub trait RawSession {
    fn version(&self) -> Result<String, HostError>;
    fn is_ready(&self) -> Result<bool, HostError>;
    /// Name of the currently active workbook, or None when no workbook is open.
    fn active_workbook_name(&self) -> Result<Option<String>, HostError>;
    /// Name of the currently active sheet, or None when no sheet is active.
    fn active_sheet_name(&self) -> Result<Option<String>, HostError>;
    /// 1-indexed (row, column) of the live selection, or None when nothing is
    /// selected.
    fn selection_position(&self) -> Result<Option<(u32, u32)>, HostError>;
    fn set_screen_updating(&self, on: bool) -> Result<(), HostError>;
    fn recalculate(&self) -> Result<(), HostError>;
}

/// The high-level wrapper object graph. Its `active_*` accessors may answer
/// from a cached identity that no longer matches the host's current state;
/// callers that care about freshness resolve objects by name instead.
pub trait WrapperApp {
    fn version(&self) -> Result<String, HostError>;
    fn workbook_by_name(&self, name: &str) -> Result<Box<dyn Workbook>, HostError>;
    fn active_workbook(&self) -> Result<Box<dyn Workbook>, HostError>;
    /// The wrapper's view of the current selection. May be stale.
    fn selection(&self) -> Result<Box<dyn CellRange>, HostError>;
}

pub trait Workbook {
    fn name(&self) -> String;
    fn sheet_by_name(&self, name: &str) -> Result<Box<dyn Worksheet>, HostError>;
    fn active_sheet(&self) -> Result<Box<dyn Worksheet>, HostError>;
}

pub trait Worksheet {
    fn name(&self) -> String;
    /// Read one cell (1-indexed row/column).
    fn cell_value(&self, row: u32, column: u32) -> Result<CellValue, HostError>;
    /// A single-cell range on this sheet (1-indexed row/column).
    fn range(&self, row: u32, column: u32) -> Result<Box<dyn CellRange>, HostError>;
}

/// A concrete range handle. Coordinates are 1-indexed; `address` is the
/// host-native string form (e.g. `"$B$2"`).
pub trait CellRange {
    fn address(&self) -> String;
    fn row(&self) -> u32;
    fn column(&self) -> u32;
    fn cell_count(&self) -> u32;
    /// Name of the sheet this range lives on, read from the range object
    /// itself (not from any "active" accessor).
    fn sheet_name(&self) -> Result<String, HostError>;
    /// The direct clear-notes call. Not available on every host version.
    fn clear_notes(&self) -> Result<(), HostError>;
    /// Fallback clear path: delete the note object if one exists.
    fn delete_note_object(&self) -> Result<(), HostError>;
    fn set_note(&self, text: &str) -> Result<(), HostError>;
    fn note(&self) -> Result<Option<String>, HostError>;
}

/// Produces fresh connections over both interfaces and services the host's
/// pending cross-process messages. One gateway is owned by exactly one worker
/// thread for its whole lifetime.
pub trait HostGateway {
    /// Fresh low-level connection to the running host instance.
    fn raw(&self) -> Result<Box<dyn RawSession>, HostError>;
    /// The high-level wrapper over the same instance.
    fn wrapper(&self) -> Result<Box<dyn WrapperApp>, HostError>;
    /// Service pending cross-process messages. Called on every idle tick of
    /// the worker; hosts drop connections that are never pumped.
    fn pump_messages(&self);
}

/// The validated reference chain for one annotation request. Ephemeral by
/// design: never cached across requests.
///
/// Invariant: `sheet` is the workbook's currently active sheet and `selection`
/// lies on it. `acquire` is the only constructor that upholds this.
pub struct ResourceHandle {
    pub app: Box<dyn WrapperApp>,
    pub workbook: Box<dyn Workbook>,
    pub sheet: Box<dyn Worksheet>,
    pub selection: Box<dyn CellRange>,
}

impl ResourceHandle {
    pub fn describe(&self) -> String {
        format!(
            "'{}' / {} @ {}",
            self.workbook.name(),
            self.sheet.name(),
            self.selection.address()
        )
    }
}
