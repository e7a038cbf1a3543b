use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::ledger::tools::error::{Result, ToolError};
use crate::ledger::tools::model::{CellValue, RawTable};

/// Reads the named sheets from an export workbook, in the order given.
///
/// Every sheet must be present; a missing one is reported before any sheet is
/// decoded so that callers never reconcile half a workbook.
pub fn read_sheets(path: &Path, names: &[&str]) -> Result<Vec<RawTable>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let available = workbook.sheet_names().to_owned();
    if let Some(missing) = names
        .iter()
        .find(|name| !available.iter().any(|sheet| sheet == *name))
    {
        return Err(ToolError::MissingSheet(missing.to_string()));
    }

    names
        .iter()
        .map(|name| {
            let range = read_required_sheet(&mut workbook, name)?;
            let table = range_to_table(&range);
            debug!(
                sheet = name,
                headers = table.headers.len(),
                rows = table.len(),
                "decoded sheet"
            );
            Ok(table)
        })
        .collect()
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::MissingSheet(name.to_string()))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// Treats the first row of the used range as headers and the rest as data.
pub(crate) fn range_to_table(range: &Range<DataType>) -> RawTable {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(first_row) => first_row
            .iter()
            .map(|cell| cell_to_string(Some(cell)))
            .collect(),
        None => return RawTable::default(),
    };

    let body = rows
        .map(|row| {
            let mut cells: Vec<CellValue> = row.iter().map(to_cell_value).collect();
            cells.resize(headers.len().max(cells.len()), CellValue::Empty);
            cells
        })
        .collect();

    RawTable::new(headers, body)
}

pub(crate) fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn to_cell_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty => CellValue::Empty,
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => serial_to_datetime(*serial)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Number(*serial)),
        other => CellValue::Text(other.to_string()),
    }
}

/// Converts an Excel serial timestamp (1900 date system) to a date-time.
fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    base.checked_add_signed(Duration::seconds(seconds))
}
