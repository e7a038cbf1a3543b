use std::fmt;
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::ledger::tools::append::{self, AppendOutcome};
use crate::ledger::tools::config::LedgerConfig;
use crate::ledger::tools::error::Result;
use crate::ledger::tools::io::excel_read;
use crate::ledger::tools::io::store::LedgerStore;
use crate::ledger::tools::model::CanonicalTable;
use crate::ledger::tools::reconcile::reconcile;

/// The two ledgers carried by every export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    Sales,
    Purchases,
}

impl LedgerKind {
    pub const ALL: [LedgerKind; 2] = [LedgerKind::Sales, LedgerKind::Purchases];

    /// Sheet name configured for this ledger.
    pub fn sheet_name(self, config: &LedgerConfig) -> &str {
        match self {
            LedgerKind::Sales => &config.sales_sheet,
            LedgerKind::Purchases => &config.purchases_sheet,
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerKind::Sales => write!(f, "Sales"),
            LedgerKind::Purchases => write!(f, "Purchases"),
        }
    }
}

/// A reconciled ledger ready to be previewed or appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub kind: LedgerKind,
    pub sheet: String,
    pub table: CanonicalTable,
}

/// Per-ledger result of an ingest run.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerReport {
    pub kind: LedgerKind,
    pub sheet: String,
    pub header_written: bool,
    pub outcome: AppendOutcome,
    /// Data rows held by the store after the append.
    pub total_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// Every ledger was appended (or had nothing to append).
    Completed,
    /// At least one ledger failed to append.
    PartiallyFailed,
    /// Both ledgers were empty after filtering; the store was not touched.
    NoValidData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub status: IngestStatus,
    pub ledgers: Vec<LedgerReport>,
}

/// Reads both ledger sheets from an export and reconciles them.
#[instrument(level = "info", skip_all, fields(input = %input.display()))]
pub fn preview(input: &Path, config: &LedgerConfig) -> Result<Vec<Ledger>> {
    let raw_tables = excel_read::read_sheets(input, &config.sheet_names())?;

    let ledgers: Vec<Ledger> = LedgerKind::ALL
        .into_iter()
        .zip(raw_tables)
        .map(|(kind, raw)| {
            let table = reconcile(&raw);
            info!(
                ledger = %kind,
                input_rows = raw.len(),
                rows = table.len(),
                "reconciled ledger"
            );
            Ledger {
                kind,
                sheet: kind.sheet_name(config).to_string(),
                table,
            }
        })
        .collect();
    Ok(ledgers)
}

/// Reconciles an export and appends both ledgers to the store.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), store = %store_path.display())
)]
pub fn ingest(input: &Path, store_path: &Path, config: &LedgerConfig) -> Result<IngestReport> {
    let ledgers = preview(input, config)?;
    if ledgers.iter().all(|ledger| ledger.table.is_empty()) {
        warn!("no valid rows after filtering; store left untouched");
        return Ok(IngestReport {
            status: IngestStatus::NoValidData,
            ledgers: Vec::new(),
        });
    }

    let mut store = LedgerStore::open(store_path, &config.sheet_names())?;
    let reports = append_ledgers(&mut store, &ledgers)?;
    store.save()?;

    let status = if reports.iter().all(|report| report.outcome.is_success()) {
        IngestStatus::Completed
    } else {
        IngestStatus::PartiallyFailed
    };
    Ok(IngestReport {
        status,
        ledgers: reports,
    })
}

/// Appends each ledger to its sheet in the store, writing the header row
/// first where needed. Sheets are appended one after another; a failure on
/// one does not stop the next.
pub fn append_ledgers(store: &mut LedgerStore, ledgers: &[Ledger]) -> Result<Vec<LedgerReport>> {
    let mut reports = Vec::with_capacity(ledgers.len());

    for ledger in ledgers {
        let sheet = store.sheet_mut(&ledger.sheet)?;
        let (header_written, outcome) = match append::ensure_header(sheet) {
            Ok(written) => (written, append::append(sheet, &ledger.table)),
            Err(error) => (
                false,
                AppendOutcome::Failed {
                    error: error.to_string(),
                },
            ),
        };
        let total_rows = append::data_row_count(&*sheet)?;

        info!(
            ledger = %ledger.kind,
            added = outcome.rows_written(),
            total_rows,
            "ledger appended"
        );
        reports.push(LedgerReport {
            kind: ledger.kind,
            sheet: ledger.sheet.clone(),
            header_written,
            outcome,
            total_rows,
        });
    }

    Ok(reports)
}
