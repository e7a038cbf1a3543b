//! Maps a sheet of unknown shape onto the canonical ledger schema.
//!
//! Reconciliation runs in four passes over an immutable [`RawTable`]:
//! headers are bound to canonical fields, every cell is coerced into its
//! field's type, summary and blank rows are dropped, and the survivors are
//! renumbered from one. No pass can fail: malformed cells degrade to `0` or
//! an empty string.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::ledger::tools::model::{
    CanonicalRecord, CanonicalTable, CellValue, Field, FieldKind, RawTable,
};

/// Largest magnitude kept in a numeric field.
pub const MAX_MAGNITUDE: f64 = 1e15;

/// Substrings of `Particulars` that mark total and subtotal lines.
const SUMMARY_MARKERS: [&str; 3] = ["total", "grand", "sum"];

/// Text cells that spreadsheet exports use for missing values.
const NULL_LITERALS: [&str; 3] = ["nan", "NaN", "None"];

/// Predicate deciding whether a normalised raw header names a canonical
/// field. Receives the field, its lowercased header and the lowercased,
/// trimmed raw header.
type HeaderRule = fn(Field, &str, &str) -> bool;

const HEADER_RULES: [HeaderRule; 5] = [
    exact_header,
    compact_header,
    amount_alias,
    gst_percent_alias,
    serial_alias,
];

fn exact_header(_field: Field, canonical: &str, raw: &str) -> bool {
    canonical == raw
}

fn compact_header(_field: Field, canonical: &str, raw: &str) -> bool {
    compact(canonical) == compact(raw)
}

fn amount_alias(field: Field, _canonical: &str, raw: &str) -> bool {
    field == Field::Amount && raw.contains("total") && raw.contains("quantity")
}

fn gst_percent_alias(field: Field, _canonical: &str, raw: &str) -> bool {
    field == Field::GstPercent && raw.contains("gst") && raw.contains('%')
}

fn serial_alias(field: Field, _canonical: &str, raw: &str) -> bool {
    field == Field::SerialNo && ["s.no", "sno", "serial"].iter().any(|alias| raw.contains(alias))
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

fn compact(header: &str) -> String {
    header.chars().filter(|ch| *ch != '.' && *ch != ' ').collect()
}

/// Returns `true` when the raw header should feed the canonical field.
pub fn header_matches(field: Field, raw_header: &str) -> bool {
    let canonical = normalize_header(field.header());
    let raw = normalize_header(raw_header);
    HEADER_RULES.iter().any(|rule| rule(field, &canonical, &raw))
}

/// Which raw column, if any, feeds each canonical field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnBinding {
    columns: [Option<usize>; 13],
}

impl ColumnBinding {
    /// Raw column index bound to the field.
    pub fn column(&self, field: Field) -> Option<usize> {
        self.columns[field.index()]
    }

    /// Number of canonical fields that found a raw column.
    pub fn bound_count(&self) -> usize {
        self.columns.iter().flatten().count()
    }
}

/// Binds each canonical field to the first raw header that matches it. A raw
/// column may feed more than one field; a field takes at most one column.
pub fn bind_columns(headers: &[String]) -> ColumnBinding {
    let mut binding = ColumnBinding::default();
    for field in Field::ALL {
        binding.columns[field.index()] = headers
            .iter()
            .position(|header| header_matches(field, header));
    }
    binding
}

/// Reconciles a raw sheet into the canonical table.
pub fn reconcile(raw: &RawTable) -> CanonicalTable {
    if raw.is_empty() {
        return CanonicalTable::default();
    }

    let binding = bind_columns(&raw.headers);
    debug!(
        bound = binding.bound_count(),
        headers = raw.headers.len(),
        "bound raw headers to canonical fields"
    );

    let coerced = coerce_rows(raw, &binding);
    let before = coerced.len();
    let mut records: Vec<CanonicalRecord> = coerced.into_iter().filter(is_ledger_entry).collect();
    renumber(&mut records);

    debug!(
        rows = records.len(),
        dropped = before - records.len(),
        "filtered summary and blank rows"
    );
    CanonicalTable::new(records)
}

/// Coerces every raw row into a canonical record without filtering.
pub(crate) fn coerce_rows(raw: &RawTable, binding: &ColumnBinding) -> Vec<CanonicalRecord> {
    let serial_column = binding
        .column(Field::SerialNo)
        .filter(|column| (0..raw.len()).any(|row| !raw.cell(row, *column).is_blank()));

    (0..raw.len())
        .map(|row| {
            let mut record = CanonicalRecord::default();
            for field in Field::ALL {
                let Some(column) = binding.column(field) else {
                    continue;
                };
                let cell = raw.cell(row, column);
                match field.kind() {
                    FieldKind::Serial => {}
                    FieldKind::Amount => record.set_amount(field, coerce_amount(cell)),
                    FieldKind::Date => record.set_text(field, coerce_date(cell)),
                    FieldKind::Text => record.set_text(field, coerce_text(cell)),
                }
            }
            record.serial_no = match serial_column {
                Some(column) => coerce_serial(raw.cell(row, column)),
                None => row as i64 + 1,
            };
            record
        })
        .collect()
}

fn parse_number(cell: &CellValue) -> f64 {
    let value = match cell {
        CellValue::Number(value) => *value,
        CellValue::Text(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    if value.is_finite() {
        value.clamp(-MAX_MAGNITUDE, MAX_MAGNITUDE)
    } else {
        0.0
    }
}

/// Numeric coercion for amount fields: clamped and rounded to two decimals,
/// exact halves going to the even cent.
pub fn coerce_amount(cell: &CellValue) -> f64 {
    (parse_number(cell) * 100.0).round_ties_even() / 100.0 + 0.0
}

/// Numeric coercion for the serial field: clamped and rounded to a whole number.
pub fn coerce_serial(cell: &CellValue) -> i64 {
    parse_number(cell).round_ties_even() as i64
}

/// Text coercion: renders the cell and blanks out null literals.
pub fn coerce_text(cell: &CellValue) -> String {
    let text = cell.render();
    if NULL_LITERALS.contains(&text.as_str()) {
        String::new()
    } else {
        text
    }
}

/// Date coercion: `YYYY-MM-DD` on success, empty string otherwise.
pub fn coerce_date(cell: &CellValue) -> String {
    parse_date(cell)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

const YEAR_FIRST_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

const YEAR_FIRST_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

// Month-first is tried before day-first so that ambiguous dates read as
// month/day, falling back to day/month when the month would be out of range.
// Two-digit years come first because `%Y` also accepts two digits.
const DATE_FORMATS: [&str; 18] = [
    "%m/%d/%y",
    "%d/%m/%y",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%y",
    "%d-%m-%y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%d.%m.%y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
];

fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(moment) => Some(moment.date()),
        CellValue::Number(serial) => excel_serial_date(*serial),
        CellValue::Text(text) => parse_date_text(text.trim()),
        CellValue::Empty | CellValue::Bool(_) => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    let year_first = text.len() >= 4 && text.bytes().take(4).all(|byte| byte.is_ascii_digit());
    if year_first {
        if let Some(moment) = YEAR_FIRST_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        {
            return Some(moment.date());
        }
        if let Ok(moment) = chrono::DateTime::parse_from_rfc3339(text) {
            return Some(moment.date_naive());
        }
        return YEAR_FIRST_DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text, format).ok());
    }

    let date_part = text.split_once(' ').map_or(text, |(head, tail)| {
        if tail.contains(':') { head } else { text }
    });
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(date_part, format).ok())
}

/// Converts an Excel serial day number (1900 date system) into a date.
pub fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn is_ledger_entry(record: &CanonicalRecord) -> bool {
    !is_summary_row(record) && has_business_content(record)
}

fn is_summary_row(record: &CanonicalRecord) -> bool {
    let particulars = record.particulars.trim().to_lowercase();
    SUMMARY_MARKERS
        .iter()
        .any(|marker| particulars.contains(marker))
}

fn has_business_content(record: &CanonicalRecord) -> bool {
    Field::IMPORTANT.iter().any(|field| match record.text(*field) {
        Some(text) => {
            let text = text.trim();
            !text.is_empty() && !text.eq_ignore_ascii_case("nan")
        }
        None => record.number(*field).is_some_and(|value| value != 0.0),
    })
}

fn renumber(records: &mut [CanonicalRecord]) {
    for (index, record) in records.iter_mut().enumerate() {
        record.serial_no = index as i64 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    fn table(headers: &[&str], rows: Vec<Vec<CellValue>>) -> RawTable {
        RawTable::new(headers.iter().map(|h| h.to_string()).collect(), rows)
    }

    #[test]
    fn serial_aliases_bind_to_serial_field() {
        for header in ["S. No.", "Serial#", "sno", "S.No", "Serial Number"] {
            let binding = bind_columns(&[header.to_string(), "Particulars".to_string()]);
            assert_eq!(binding.column(Field::SerialNo), Some(0), "{header}");
        }
    }

    #[test]
    fn compact_match_ignores_periods_and_spaces() {
        assert!(header_matches(Field::InvoiceNo, "  invoice no "));
        assert!(header_matches(Field::InvoiceNo, "InvoiceNo"));
        assert!(header_matches(Field::Amount, "Quantity*Rate"));
        assert!(!header_matches(Field::InvoiceNo, "Invoice Number"));
    }

    #[test]
    fn special_aliases_cover_amount_and_gst_rate() {
        assert!(header_matches(Field::Amount, "Total Quantity Value"));
        assert!(header_matches(Field::GstPercent, "GST %"));
        assert!(header_matches(Field::GstPercent, "gst rate (%)"));
        assert!(!header_matches(Field::GstPercent, "GST"));
    }

    #[test]
    fn first_matching_column_wins() {
        let binding = bind_columns(&[
            "Rate".to_string(),
            "Total".to_string(),
            " rate ".to_string(),
            "TOTAL".to_string(),
        ]);
        assert_eq!(binding.column(Field::Rate), Some(0));
        assert_eq!(binding.column(Field::Total), Some(1));
        assert_eq!(binding.column(Field::Quantity), None);
    }

    #[test]
    fn numeric_coercion_clamps_and_zeroes_non_finite() {
        assert_eq!(coerce_amount(&CellValue::Number(1e20)), 1e15);
        assert_eq!(coerce_amount(&CellValue::Number(-1e20)), -1e15);
        assert_eq!(coerce_amount(&text("inf")), 0.0);
        assert_eq!(coerce_amount(&CellValue::Number(f64::INFINITY)), 0.0);
        assert_eq!(coerce_amount(&text("abc")), 0.0);
        assert_eq!(coerce_amount(&text(" 12.346 ")), 12.35);
        assert_eq!(coerce_amount(&CellValue::Bool(true)), 0.0);
        assert_eq!(coerce_serial(&text("4.6")), 5);
    }

    #[test]
    fn exact_halves_round_to_even() {
        let rounded: Vec<f64> = [0.125, 10.375, -0.625, 2.5, 0.135]
            .into_iter()
            .map(|value| coerce_amount(&CellValue::Number(value)))
            .collect();
        assert_eq!(rounded, vec![0.12, 10.38, -0.62, 2.5, 0.14]);
        assert_eq!(coerce_serial(&CellValue::Number(2.5)), 2);
        assert_eq!(coerce_serial(&CellValue::Number(3.5)), 4);
    }

    #[test]
    fn date_coercion_handles_common_formats() {
        assert_eq!(coerce_date(&text("2024-03-05")), "2024-03-05");
        assert_eq!(coerce_date(&text("2024-03-05 00:00:00")), "2024-03-05");
        assert_eq!(coerce_date(&text("03/05/2024")), "2024-03-05");
        assert_eq!(coerce_date(&text("25/12/2023")), "2023-12-25");
        assert_eq!(coerce_date(&text("5 Mar 2024")), "2024-03-05");
        assert_eq!(coerce_date(&text("25/12/23")), "2023-12-25");
        assert_eq!(coerce_date(&CellValue::Number(45356.0)), "2024-03-05");
    }

    #[test]
    fn unparsable_date_is_empty() {
        assert_eq!(coerce_date(&text("not a date")), "");
        assert_eq!(coerce_date(&text("NaT")), "");
        assert_eq!(coerce_date(&CellValue::Empty), "");
        assert_eq!(coerce_date(&CellValue::Number(-3.0)), "");
    }

    #[test]
    fn text_null_literals_become_empty() {
        assert_eq!(coerce_text(&text("nan")), "");
        assert_eq!(coerce_text(&text("None")), "");
        assert_eq!(coerce_text(&text("NONE")), "NONE");
        assert_eq!(coerce_text(&CellValue::Number(1001.0)), "1001");
    }

    #[test]
    fn missing_serial_column_is_regenerated_before_filtering() {
        let raw = table(
            &["S.no.", "Particulars"],
            vec![
                vec![CellValue::Empty, text("Cement")],
                vec![CellValue::Empty, text("Total")],
                vec![CellValue::Empty, text("Sand")],
            ],
        );
        let coerced = coerce_rows(&raw, &bind_columns(&raw.headers));
        let serials: Vec<i64> = coerced.iter().map(|r| r.serial_no).collect();
        assert_eq!(serials, vec![1, 2, 3]);
    }

    #[test]
    fn summary_rows_are_excluded() {
        let raw = table(
            &["Particulars", "Quantity", "Total"],
            vec![
                vec![text("Steel rods"), CellValue::Number(4.0), CellValue::Number(400.0)],
                vec![text("  Grand Total "), CellValue::Number(4.0), CellValue::Number(400.0)],
                vec![text("Sub-TOTAL"), CellValue::Number(1.0), CellValue::Number(1.0)],
                vec![text("Checksum"), CellValue::Number(1.0), CellValue::Number(1.0)],
            ],
        );
        let canonical = reconcile(&raw);
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical.records[0].particulars, "Steel rods");
    }

    #[test]
    fn rows_without_business_content_are_excluded() {
        let raw = table(
            &["Invoice No.", "GSTIN", "Particulars", "Quantity", "Rate", "Total", "CGST"],
            vec![
                vec![
                    CellValue::Empty,
                    text("27AAAAA0000A1Z5"),
                    text("nan"),
                    CellValue::Number(0.0),
                    text(""),
                    CellValue::Number(0.0),
                    CellValue::Number(9.0),
                ],
                vec![
                    text("INV-7"),
                    CellValue::Empty,
                    CellValue::Empty,
                    CellValue::Empty,
                    CellValue::Empty,
                    CellValue::Empty,
                    CellValue::Empty,
                ],
            ],
        );
        let canonical = reconcile(&raw);
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical.records[0].invoice_no, "INV-7");
    }

    #[test]
    fn survivors_are_renumbered_from_one() {
        let raw = table(
            &["S.No", "Particulars", "Total"],
            vec![
                vec![CellValue::Number(10.0), text("A"), CellValue::Number(1.0)],
                vec![CellValue::Number(11.0), text("Total"), CellValue::Number(1.0)],
                vec![CellValue::Number(12.0), CellValue::Empty, CellValue::Empty],
                vec![CellValue::Number(13.0), text("B"), CellValue::Number(2.0)],
                vec![CellValue::Number(14.0), text("C"), CellValue::Number(3.0)],
            ],
        );
        let canonical = reconcile(&raw);
        let serials: Vec<i64> = canonical.iter().map(|r| r.serial_no).collect();
        let names: Vec<&str> = canonical.iter().map(|r| r.particulars.as_str()).collect();
        assert_eq!(serials, vec![1, 2, 3]);
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn unmatched_fields_default_to_empty_and_zero() {
        let raw = table(&["Particulars"], vec![vec![text("Bricks")]]);
        let record = &reconcile(&raw).records[0];
        assert_eq!(record.date, "");
        assert_eq!(record.invoice_no, "");
        assert_eq!(record.total, 0.0);
        assert_eq!(record.igst, 0.0);
    }

    #[test]
    fn reconciliation_is_stable_across_header_variants() {
        let rows = vec![
            vec![CellValue::Number(1.0), text("2024-01-02"), text("Tiles"), text("12.499")],
            vec![CellValue::Number(2.0), text("bad"), text("Grand total"), text("1")],
        ];
        let first = table(&["S.no.", "Date", "Particulars", "Total"], rows.clone());
        let second = table(&["serial", " DATE ", "particulars", "TOTAL"], rows);
        assert_eq!(reconcile(&first), reconcile(&second));
        assert_eq!(reconcile(&first), reconcile(&first.clone()));
        assert_eq!(reconcile(&first).records[0].total, 12.5);
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let raw = table(&["Particulars", "Total"], Vec::new());
        assert!(reconcile(&raw).is_empty());
    }
}
