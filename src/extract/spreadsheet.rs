//! Excel workbooks (`.xlsx` and legacy `.xls`) read through `calamine`.

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::io::Cursor;

use super::ExtractError;

/// Maximum worksheets read from a workbook.
const MAX_SHEETS: usize = 100;
/// Maximum non-empty cells read per worksheet.
const MAX_CELLS_PER_SHEET: usize = 100_000;

fn sheet_err(e: impl ToString) -> ExtractError {
    ExtractError::Spreadsheet(e.to_string())
}

/// Text of every worksheet as `(sheet_name, text)`, in workbook order.
/// Non-empty cells of a row are joined by spaces, rows by newlines.
pub(super) fn workbook_sheets(bytes: &[u8]) -> Result<Vec<(String, String)>, ExtractError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(sheet_err)?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names().into_iter().take(MAX_SHEETS) {
        let range = workbook.worksheet_range(&name).map_err(sheet_err)?;
        sheets.push((name, range_text(&range)));
    }
    Ok(sheets)
}

fn range_text(range: &Range<Data>) -> String {
    let mut rows = Vec::new();
    let mut cells = 0usize;
    for row in range.rows() {
        if cells >= MAX_CELLS_PER_SHEET {
            break;
        }
        let values: Vec<String> = row
            .iter()
            .filter(|cell| !matches!(cell, Data::Empty))
            .map(|cell| cell.to_string().trim().to_string())
            .filter(|value| !value.is_empty())
            .collect();
        cells += values.len();
        if !values.is_empty() {
            rows.push(values.join(" "));
        }
    }
    rows.join("\n")
}
