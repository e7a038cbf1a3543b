use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::ledger::tools::error::Result;

/// Settings shared by the ingest and preview commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Sheet holding sales rows, in both the export and the store.
    #[serde(default = "default_sales_sheet")]
    pub sales_sheet: String,
    /// Sheet holding purchase rows, in both the export and the store.
    #[serde(default = "default_purchases_sheet")]
    pub purchases_sheet: String,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
    /// Fallback filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sales_sheet: default_sales_sheet(),
            purchases_sheet: default_purchases_sheet(),
            preview_rows: default_preview_rows(),
            log_level: default_log_level(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Sheet names in processing order: sales first, then purchases.
    pub fn sheet_names(&self) -> [&str; 2] {
        [&self.sales_sheet, &self.purchases_sheet]
    }
}

/// Loads the configuration file, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    match path {
        Some(path) => LedgerConfig::from_toml_str(&fs::read_to_string(path)?),
        None => Ok(LedgerConfig::default()),
    }
}

fn default_sales_sheet() -> String {
    "Sales".to_string()
}

fn default_purchases_sheet() -> String {
    "Purchases".to_string()
}

fn default_preview_rows() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}
