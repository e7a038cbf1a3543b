//! Core library for the ledger-tools command line application.
//!
//! The library turns Sales and Purchases exports of unpredictable shape into a
//! fixed 13-column ledger and appends the cleaned rows to a persistent
//! workbook, continuing the serial numbering already stored there. Data
//! representations live under [`ledger::tools::model`], header matching and
//! row sanitisation in [`ledger::tools::reconcile`], range planning and the
//! destination seam in [`ledger::tools::append`], workbook adapters under
//! [`ledger::tools::io`], and the orchestration in [`ledger::tools::sync`].

pub mod ledger;

pub use ledger::tools::{Result, ToolError, append, config, error, io, model, reconcile, sync};
