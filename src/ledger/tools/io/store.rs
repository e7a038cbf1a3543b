use std::fs;
use std::path::{Path, PathBuf};

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, info};

use crate::ledger::tools::append::{CellRange, Destination};
use crate::ledger::tools::error::{Result, ToolError};
use crate::ledger::tools::model::OutputCell;

/// In-memory copy of one destination sheet. Row 1 of the sheet is index 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetBuffer {
    name: String,
    rows: Vec<Vec<OutputCell>>,
}

impl SheetBuffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Vec<OutputCell>] {
        &self.rows
    }

    fn validate(&self, range: &CellRange, rows: &[Vec<OutputCell>]) -> Result<()> {
        let invalid = |reason: String| ToolError::InvalidRange {
            range: range.to_string(),
            reason,
        };
        if range.row_count() != rows.len() {
            return Err(invalid(format!(
                "range spans {} rows but {} were supplied",
                range.row_count(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|row| row.len() != range.column_count()) {
            return Err(invalid(format!(
                "range spans {} columns but a row has {}",
                range.column_count(),
                row.len()
            )));
        }
        Ok(())
    }
}

impl Destination for SheetBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_values(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect())
    }

    fn write_range(&mut self, range: &CellRange, rows: &[Vec<OutputCell>]) -> Result<()> {
        self.validate(range, rows)?;

        if self.rows.len() < range.end_row {
            self.rows.resize(range.end_row, Vec::new());
        }
        for (offset, cells) in rows.iter().enumerate() {
            let target = &mut self.rows[range.start_row - 1 + offset];
            if target.len() < range.end_column {
                target.resize(range.end_column, OutputCell::default());
            }
            for (column, cell) in cells.iter().enumerate() {
                target[range.start_column - 1 + column] = cell.clone();
            }
        }
        Ok(())
    }
}

/// The persistent ledger workbook: one sheet per ledger, appended to in place.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
    sheets: Vec<SheetBuffer>,
}

impl LedgerStore {
    /// Loads the workbook at `path`, or starts an empty one if it does not
    /// exist yet. Sheets listed in `required` are created when absent.
    pub fn open(path: &Path, required: &[&str]) -> Result<Self> {
        let mut sheets = if path.exists() {
            load_sheets(path)?
        } else {
            debug!(path = %path.display(), "store does not exist yet");
            Vec::new()
        };

        for name in required {
            if !sheets.iter().any(|sheet| sheet.name == *name) {
                sheets.push(SheetBuffer::new(*name));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            sheets,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetBuffer> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut SheetBuffer> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet.name == name)
            .ok_or_else(|| ToolError::MissingSheet(name.to_string()))
    }

    /// Writes every sheet to a sibling temporary file and moves it over the
    /// store path.
    pub fn save(&self) -> Result<()> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();

        for sheet in &self.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (row_idx, row) in sheet.rows.iter().enumerate() {
                for (col_idx, cell) in row.iter().enumerate() {
                    let (row_idx, col_idx) = (row_idx as u32, col_idx as u16);
                    match cell {
                        OutputCell::Integer(value) => {
                            worksheet.write_number(row_idx, col_idx, *value as f64)?;
                        }
                        OutputCell::Number(value) => {
                            worksheet.write_number(row_idx, col_idx, *value)?;
                        }
                        OutputCell::Text(value) if value.is_empty() => {}
                        OutputCell::Text(value) if row_idx == 0 => {
                            worksheet.write_string_with_format(
                                row_idx,
                                col_idx,
                                value,
                                &header_format,
                            )?;
                        }
                        OutputCell::Text(value) => {
                            worksheet.write_string(row_idx, col_idx, value)?;
                        }
                    }
                }
            }
        }

        let staging = staging_path(&self.path);
        workbook.save(&staging)?;
        fs::rename(&staging, &self.path)?;
        info!(path = %self.path.display(), sheets = self.sheets.len(), "saved store");
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn load_sheets(path: &Path) -> Result<Vec<SheetBuffer>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let names = workbook.sheet_names().to_owned();

    names
        .iter()
        .map(|name| {
            let range = workbook
                .worksheet_range(name)
                .ok_or_else(|| ToolError::InvalidWorkbook(format!("unreadable sheet '{name}'")))?
                .map_err(ToolError::from)?;
            Ok(SheetBuffer {
                name: name.clone(),
                rows: range_to_rows(&range),
            })
        })
        .collect()
}

/// Places the used range at its absolute position so that row 1 of the
/// sheet is always index 0.
fn range_to_rows(range: &Range<DataType>) -> Vec<Vec<OutputCell>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut rows = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![OutputCell::default(); start_col as usize];
        cells.extend(row.iter().map(stored_cell));
        rows.push(cells);
    }
    rows
}

fn stored_cell(cell: &DataType) -> OutputCell {
    match cell {
        DataType::Empty => OutputCell::default(),
        DataType::String(value) => OutputCell::Text(value.clone()),
        DataType::Int(value) => OutputCell::Integer(*value),
        DataType::Float(value) => OutputCell::Number(*value),
        DataType::DateTime(value) => OutputCell::Number(*value),
        other => OutputCell::Text(other.to_string()),
    }
}
