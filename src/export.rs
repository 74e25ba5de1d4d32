//! CSV export of each run's valuation.
//!
//! Two files are regenerated every run:
//! - `priced_tokens.csv`: `token,market_cap`, highest cap first
//! - `unpriced_tokens.csv`: `token`

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::Valuation;

pub const PRICED_FILE: &str = "priced_tokens.csv";
pub const UNPRICED_FILE: &str = "unpriced_tokens.csv";

#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, valuation: &Valuation) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export directory {}", self.dir.display()))?;

        let priced = self.dir.join(PRICED_FILE);
        fs::write(&priced, render_priced(valuation))
            .with_context(|| format!("Failed to write {}", priced.display()))?;

        let unpriced = self.dir.join(UNPRICED_FILE);
        fs::write(&unpriced, render_unpriced(valuation))
            .with_context(|| format!("Failed to write {}", unpriced.display()))?;

        debug!(
            dir = %self.dir.display(),
            priced = valuation.priced.len(),
            unpriced = valuation.unpriced.len(),
            "Exports written"
        );
        Ok(())
    }
}

fn render_priced(valuation: &Valuation) -> String {
    let mut out = String::from("token,market_cap\n");
    for (token, cap) in valuation.ranked() {
        let _ = writeln!(out, "{},{}", csv_field(token), cap);
    }
    out
}

fn render_unpriced(valuation: &Valuation) -> String {
    let mut out = String::from("token\n");
    for token in &valuation.unpriced {
        let _ = writeln!(out, "{}", csv_field(token));
    }
    out
}

/// Quote a field when it contains a delimiter, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
