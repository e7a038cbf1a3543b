//! Plans and applies appends to a destination ledger sheet.
//!
//! The destination's occupied-row count is the only source of truth for where
//! a batch lands and which serial numbers it carries; serials produced by
//! reconciliation are always overwritten. A plan is only valid for the
//! snapshot it was computed from, so [`append`] re-reads the destination
//! immediately before writing.

use std::fmt;

use tracing::{debug, info, warn};

use crate::ledger::tools::error::{Result, ToolError};
use crate::ledger::tools::model::{CANONICAL_HEADERS, CanonicalTable, Field, OutputCell};

/// Rectangular, 1-based cell range such as `A43:M45`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: usize,
    pub start_column: usize,
    pub end_row: usize,
    pub end_column: usize,
}

impl CellRange {
    /// Range starting at `(row, column)` spanning `rows` × `columns` cells.
    /// Returns `None` for an empty extent.
    pub fn from_origin(row: usize, column: usize, rows: usize, columns: usize) -> Option<Self> {
        if rows == 0 || columns == 0 || row == 0 || column == 0 {
            return None;
        }
        Some(Self {
            start_row: row,
            start_column: column,
            end_row: row + rows - 1,
            end_column: column + columns - 1,
        })
    }

    pub fn row_count(&self) -> usize {
        self.end_row + 1 - self.start_row
    }

    pub fn column_count(&self) -> usize {
        self.end_column + 1 - self.start_column
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_name(self.start_column),
            self.start_row,
            column_name(self.end_column),
            self.end_row
        )
    }
}

/// Spreadsheet column letters for a 1-based column index (`1 → A`,
/// `27 → AA`).
pub fn column_name(column: usize) -> String {
    let mut remaining = column;
    let mut letters = Vec::new();
    while remaining > 0 {
        let offset = (remaining - 1) % 26;
        letters.push(b'A' + offset as u8);
        remaining = (remaining - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// A persistent sheet rows can be appended to.
///
/// `read_values` returns every row, header included, as displayed strings.
/// `write_range` must apply the whole payload or nothing.
pub trait Destination {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    fn read_values(&self) -> Result<Vec<Vec<String>>>;

    fn write_range(&mut self, range: &CellRange, rows: &[Vec<OutputCell>]) -> Result<()>;
}

/// The 1-based index of the last row holding a non-whitespace cell. Row 1 is
/// the header and is never inspected; an empty destination yields 1.
pub fn last_occupied_row(snapshot: &[Vec<String>]) -> usize {
    snapshot
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|(index, _)| index + 1)
        .last()
        .unwrap_or(1)
}

/// Where a batch will be written and what it will contain.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendPlan {
    pub range: CellRange,
    pub rows: Vec<Vec<OutputCell>>,
}

impl AppendPlan {
    pub fn first_serial(&self) -> Option<i64> {
        match self.rows.first()?.get(Field::SerialNo.index())? {
            OutputCell::Integer(serial) => Some(*serial),
            _ => None,
        }
    }
}

/// Computes the target range and outgoing rows for a canonical table given
/// the destination's current snapshot. Row `r` of the sheet carries serial
/// `r - 1`, so a batch continues from the highest occupied row regardless of
/// the serials it arrived with. Returns `None` for an empty table.
///
/// Serials are `last_row + offset`, not `last_row + offset + 1`: the header
/// holds row 1, so 41 data rows ending at row 42 continue with serial 42.
pub fn plan_append(table: &CanonicalTable, snapshot: &[Vec<String>]) -> Option<AppendPlan> {
    let last_row = last_occupied_row(snapshot);
    let rows: Vec<Vec<OutputCell>> = table
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let mut cells: Vec<OutputCell> =
                record.to_cells().into_iter().map(finite_or_zero).collect();
            cells[Field::SerialNo.index()] = OutputCell::Integer((last_row + offset) as i64);
            cells
        })
        .collect();

    let width = rows.first().map(Vec::len).unwrap_or_default();
    let range = CellRange::from_origin(last_row + 1, 1, rows.len(), width)?;
    Some(AppendPlan { range, rows })
}

fn finite_or_zero(cell: OutputCell) -> OutputCell {
    match cell {
        OutputCell::Number(value) if !value.is_finite() => OutputCell::Number(0.0),
        other => other,
    }
}

/// Writes the canonical header row when the destination's first row is
/// missing or narrower than the schema. Returns whether it was written.
pub fn ensure_header<D: Destination + ?Sized>(destination: &mut D) -> Result<bool> {
    let snapshot = destination.read_values()?;
    let width = snapshot
        .first()
        .map(|row| {
            row.iter()
                .rposition(|cell| !cell.trim().is_empty())
                .map_or(0, |index| index + 1)
        })
        .unwrap_or_default();
    if width >= CANONICAL_HEADERS.len() {
        return Ok(false);
    }

    let header: Vec<OutputCell> = CANONICAL_HEADERS
        .iter()
        .map(|header| OutputCell::Text(header.to_string()))
        .collect();
    let range = CellRange::from_origin(1, 1, 1, header.len()).ok_or_else(|| {
        ToolError::InvalidRange {
            range: "A1".into(),
            reason: "empty header".into(),
        }
    })?;
    destination.write_range(&range, &[header])?;
    info!(sheet = destination.name(), %range, "wrote canonical header row");
    Ok(true)
}

/// Number of data rows currently held by the destination.
pub fn data_row_count<D: Destination + ?Sized>(destination: &D) -> Result<usize> {
    Ok(last_occupied_row(&destination.read_values()?) - 1)
}

/// Result of appending one canonical table.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// Rows were written to the given range.
    Written { range: CellRange, rows: usize },
    /// The table was empty; nothing was written.
    Skipped,
    /// Reading or writing the destination failed; nothing was written.
    Failed { error: String },
}

impl AppendOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, AppendOutcome::Failed { .. })
    }

    pub fn rows_written(&self) -> usize {
        match self {
            AppendOutcome::Written { rows, .. } => *rows,
            _ => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AppendOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

/// Appends a canonical table to the destination, continuing its serials.
/// Failures are captured in the outcome rather than returned.
pub fn append<D: Destination + ?Sized>(destination: &mut D, table: &CanonicalTable) -> AppendOutcome {
    match try_append(destination, table) {
        Ok(Some((range, rows))) => AppendOutcome::Written { range, rows },
        Ok(None) => AppendOutcome::Skipped,
        Err(error) => {
            warn!(sheet = destination.name(), %error, "append failed");
            AppendOutcome::Failed {
                error: error.to_string(),
            }
        }
    }
}

fn try_append<D: Destination + ?Sized>(
    destination: &mut D,
    table: &CanonicalTable,
) -> Result<Option<(CellRange, usize)>> {
    if table.is_empty() {
        debug!(sheet = destination.name(), "nothing to append");
        return Ok(None);
    }

    let snapshot = destination.read_values()?;
    let Some(plan) = plan_append(table, &snapshot) else {
        return Ok(None);
    };
    destination.write_range(&plan.range, &plan.rows)?;
    info!(
        sheet = destination.name(),
        range = %plan.range,
        rows = plan.rows.len(),
        first_serial = plan.first_serial(),
        "appended rows"
    );
    Ok(Some((plan.range, plan.rows.len())))
}
