use super::host::{CellRange, CellValue, Worksheet};

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub const UNKNOWN_TICKER: &str = "UNKNOWN";
pub const UNKNOWN_PERIOD: &str = "Unknown Period";
pub const UNKNOWN_LINE_ITEM: &str = "Unknown Line Item";

/// Semantic context derived from a cell's position in the sheet. Created per
/// request and discarded after the note is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CellContext {
    pub ticker: String,
    pub period: String,
    pub line_item: String,
    pub cell_address: String,
}

/// Extracts context from the selection's position, assuming the typical
/// financial model layout: period headers above, line item labels to the left,
/// ticker in the sheet's anchor cell A1.
///
/// Never fails: every read problem degrades to a default field instead of
/// propagating. One bounded pass per axis, no caching across requests (the
/// layout may change between hotkey presses).
pub fn extract_context(sheet: &dyn Worksheet, selection: &dyn CellRange) -> CellContext {
    let row = selection.row();
    let column = selection.column();
    let cell_address = selection.address();

    // Search LEFT in the same row for the line item label.
    let mut line_item = None;
    for c in (1..column).rev() {
        if let Some(label) = read_label(sheet, row, c) {
            log_info!("Line item found in column {c}: '{label}'");
            line_item = Some(label);
            break;
        }
    }

    // Search UP in the same column for the period header.
    let mut period = None;
    for r in (1..row).rev() {
        if let Some(label) = read_label(sheet, r, column) {
            log_info!("Period found in row {r}: '{label}'");
            period = Some(label);
            break;
        }
    }

    let ticker = read_label(sheet, 1, 1).unwrap_or_else(|| UNKNOWN_TICKER.to_string());

    CellContext {
        ticker,
        period: period.unwrap_or_else(|| UNKNOWN_PERIOD.to_string()),
        line_item: line_item.unwrap_or_else(|| UNKNOWN_LINE_ITEM.to_string()),
        cell_address,
    }
}

/// Reads one cell and returns its trimmed text if it is label-like. Read
/// errors count as "no value" so a single bad cell never aborts the scan.
fn read_label(sheet: &dyn Worksheet, row: u32, column: u32) -> Option<String> {
    match sheet.cell_value(row, column) {
        Ok(value) => likely_label(&value),
        Err(_) => None,
    }
}

/// A label is non-empty text that does not parse as a number once common
/// formatting punctuation is stripped. `"Revenue"` is a label; `"$1,234"` and
/// `"50%"` are data.
fn likely_label(value: &CellValue) -> Option<String> {
    let text = value.as_text()?.trim();
    if text.is_empty() {
        return None;
    }
    let stripped: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%'))
        .collect();
    if stripped.trim().parse::<f64>().is_ok() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(value: &str) -> Option<String> {
        likely_label(&CellValue::Text(value.to_string()))
    }

    #[test]
    fn text_labels_are_detected() {
        assert_eq!(label("Revenue"), Some("Revenue".to_string()));
        assert_eq!(label("  Q3 FY24 "), Some("Q3 FY24".to_string()));
    }

    #[test]
    fn numbers_are_not_labels() {
        assert_eq!(likely_label(&CellValue::Number(1234.0)), None);
        assert_eq!(likely_label(&CellValue::Bool(true)), None);
        assert_eq!(likely_label(&CellValue::Empty), None);
    }

    #[test]
    fn formatted_numbers_are_not_labels() {
        assert_eq!(label("$1,234"), None);
        assert_eq!(label("50%"), None);
        assert_eq!(label("-3.5"), None);
        assert_eq!(label("$1,234.56"), None);
    }

    #[test]
    fn whitespace_only_is_not_a_label() {
        assert_eq!(label(""), None);
        assert_eq!(label("   "), None);
    }
}
