use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Header row written to every ledger sheet, in canonical column order.
pub const CANONICAL_HEADERS: [&str; 13] = [
    "S.no.",
    "Date",
    "Invoice No.",
    "GSTIN",
    "Particulars",
    "Quantity",
    "Rate",
    "Quantity *Rate",
    "% of GST",
    "CGST",
    "SGST",
    "IGST",
    "Total",
];

/// A single cell of an input sheet, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Blank cell, or a position past the end of a short row.
    Empty,
    /// Text as typed into the sheet.
    Text(String),
    /// Any numeric cell; integers are widened.
    Number(f64),
    /// Boolean cell.
    Bool(bool),
    /// Cell formatted as a date or date-time.
    Date(NaiveDateTime),
}

impl CellValue {
    /// Returns `true` for empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    /// Renders the cell the way it reads in a text column.
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(text) => text.clone(),
            CellValue::Number(value) => value.to_string(),
            CellValue::Bool(true) => "True".to_string(),
            CellValue::Bool(false) => "False".to_string(),
            CellValue::Date(moment) if moment.time() == NaiveTime::MIN => {
                moment.format("%Y-%m-%d").to_string()
            }
            CellValue::Date(moment) => moment.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Table of unknown shape as produced by a workbook reader: an ordered header
/// list plus rows of cells aligned to it by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Creates a table from headers and rows.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { headers, rows }
    }

    /// Number of data rows, excluding the header.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the cell at the given position, treating short rows as padded
    /// with empty cells.
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&EMPTY_CELL)
    }
}

/// How a canonical field is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Whole-number serial column.
    Serial,
    /// Calendar date emitted as `YYYY-MM-DD`.
    Date,
    /// Free text.
    Text,
    /// Two-decimal numeric amount.
    Amount,
}

/// The thirteen columns of the canonical ledger schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    SerialNo,
    Date,
    InvoiceNo,
    Gstin,
    Particulars,
    Quantity,
    Rate,
    Amount,
    GstPercent,
    Cgst,
    Sgst,
    Igst,
    Total,
}

impl Field {
    /// All fields in schema order.
    pub const ALL: [Field; 13] = [
        Field::SerialNo,
        Field::Date,
        Field::InvoiceNo,
        Field::Gstin,
        Field::Particulars,
        Field::Quantity,
        Field::Rate,
        Field::Amount,
        Field::GstPercent,
        Field::Cgst,
        Field::Sgst,
        Field::Igst,
        Field::Total,
    ];

    /// Fields that decide whether a row carries business content.
    pub const IMPORTANT: [Field; 5] = [
        Field::InvoiceNo,
        Field::Particulars,
        Field::Quantity,
        Field::Rate,
        Field::Total,
    ];

    /// Zero-based column position in the canonical schema.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical header text.
    pub fn header(self) -> &'static str {
        CANONICAL_HEADERS[self.index()]
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::SerialNo => FieldKind::Serial,
            Field::Date => FieldKind::Date,
            Field::InvoiceNo | Field::Gstin | Field::Particulars => FieldKind::Text,
            _ => FieldKind::Amount,
        }
    }

    pub fn is_important(self) -> bool {
        Self::IMPORTANT.contains(&self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// A row conforming exactly to the canonical schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(rename = "S.no.")]
    pub serial_no: i64,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Invoice No.")]
    pub invoice_no: String,
    #[serde(rename = "GSTIN")]
    pub gstin: String,
    #[serde(rename = "Particulars")]
    pub particulars: String,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Rate")]
    pub rate: f64,
    #[serde(rename = "Quantity *Rate")]
    pub amount: f64,
    #[serde(rename = "% of GST")]
    pub gst_percent: f64,
    #[serde(rename = "CGST")]
    pub cgst: f64,
    #[serde(rename = "SGST")]
    pub sgst: f64,
    #[serde(rename = "IGST")]
    pub igst: f64,
    #[serde(rename = "Total")]
    pub total: f64,
}

impl CanonicalRecord {
    /// Returns the text value of a string or date field.
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::Date => Some(&self.date),
            Field::InvoiceNo => Some(&self.invoice_no),
            Field::Gstin => Some(&self.gstin),
            Field::Particulars => Some(&self.particulars),
            _ => None,
        }
    }

    /// Returns the numeric value of a serial or amount field.
    pub fn number(&self, field: Field) -> Option<f64> {
        match field {
            Field::SerialNo => Some(self.serial_no as f64),
            Field::Quantity => Some(self.quantity),
            Field::Rate => Some(self.rate),
            Field::Amount => Some(self.amount),
            Field::GstPercent => Some(self.gst_percent),
            Field::Cgst => Some(self.cgst),
            Field::Sgst => Some(self.sgst),
            Field::Igst => Some(self.igst),
            Field::Total => Some(self.total),
            _ => None,
        }
    }

    pub(crate) fn set_text(&mut self, field: Field, value: String) {
        match field {
            Field::Date => self.date = value,
            Field::InvoiceNo => self.invoice_no = value,
            Field::Gstin => self.gstin = value,
            Field::Particulars => self.particulars = value,
            _ => {}
        }
    }

    pub(crate) fn set_amount(&mut self, field: Field, value: f64) {
        match field {
            Field::Quantity => self.quantity = value,
            Field::Rate => self.rate = value,
            Field::Amount => self.amount = value,
            Field::GstPercent => self.gst_percent = value,
            Field::Cgst => self.cgst = value,
            Field::Sgst => self.sgst = value,
            Field::Igst => self.igst = value,
            Field::Total => self.total = value,
            _ => {}
        }
    }

    /// Row-major cells in canonical column order, ready to be written.
    pub fn to_cells(&self) -> Vec<OutputCell> {
        Field::ALL
            .iter()
            .map(|field| match field.kind() {
                FieldKind::Serial => OutputCell::Integer(self.serial_no),
                FieldKind::Amount => OutputCell::Number(self.number(*field).unwrap_or_default()),
                FieldKind::Date | FieldKind::Text => {
                    OutputCell::Text(self.text(*field).unwrap_or_default().to_string())
                }
            })
            .collect()
    }
}

/// Output of reconciliation: canonical records in row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalTable {
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.iter()
    }
}

/// A value sent to or held by a destination sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputCell {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl OutputCell {
    pub fn is_blank(&self) -> bool {
        matches!(self, OutputCell::Text(text) if text.trim().is_empty())
    }
}

impl Default for OutputCell {
    fn default() -> Self {
        OutputCell::Text(String::new())
    }
}

impl fmt::Display for OutputCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputCell::Integer(value) => write!(f, "{value}"),
            OutputCell::Number(value) => write!(f, "{value}"),
            OutputCell::Text(value) => f.write_str(value),
        }
    }
}
