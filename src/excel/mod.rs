//! Excel interop: trait seams over the host's automation interfaces, the
//! fresh-handle acquirer, positional context extraction, and note writing.
//!
//! Reference freshness is the whole game here. When the user switches sheets
//! or workbooks, or alt-tabs away and back, wrapper-side object caches go
//! stale while still answering property reads. See [`acquire::acquire`] for
//! the correction strategy.

pub mod acquire;
pub mod context;
pub mod host;
pub mod notes;
pub mod retry;

#[cfg(windows)]
pub mod com;

use host::{HostError, HostGateway};
use sysinfo::System;

/// Image name of the host process we automate.
pub const HOST_PROCESS_NAME: &str = "EXCEL.EXE";

/// Checks whether the host process is running at all. Cheap way to tell "not
/// running" apart from "running but busy" before any interop call is made.
pub fn host_process_running() -> bool {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All);
    system
        .processes()
        .values()
        .any(|p| p.name().to_string_lossy().eq_ignore_ascii_case(HOST_PROCESS_NAME))
}

/// Quick read-only health check: verifies the host answers over both
/// interfaces and reports what it currently has open. Mutates nothing.
pub fn health_check(gateway: &dyn HostGateway) -> Result<String, HostError> {
    let wrapper = gateway.wrapper()?;
    let version = wrapper.version()?;
    let workbook = wrapper.active_workbook()?;
    let sheet_name = workbook
        .active_sheet()
        .map(|s| s.name())
        .unwrap_or_else(|_| "?".to_string());
    Ok(format!(
        "Excel {} - '{}' / {}",
        version,
        workbook.name(),
        sheet_name
    ))
}
