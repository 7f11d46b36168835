//! Result files: pretty JSON and RFC-4180 CSV.

use crate::{Result, ScrapeResult};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Columns of the per-supplier CSV.
pub const RESULT_COLUMNS: [&str; 12] = [
    "supplier",
    "region",
    "postcode",
    "scraped_at",
    "tariff_name",
    "elec_unit_rate_p",
    "elec_standing_p",
    "gas_unit_rate_p",
    "gas_standing_p",
    "exit_fee",
    "contract_months",
    "error",
];

/// File name timestamp, e.g. `20250114_093012`.
pub fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.flush()?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one CSV row, quoting cells that need it.
pub fn write_row<W: Write, S: AsRef<str>>(mut w: W, row: &[S]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// Write a header and rows to `path`.
pub fn write_csv<S: AsRef<str>>(path: &Path, header: &[&str], rows: &[Vec<S>]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    write_row(&mut w, header)?;
    for row in rows {
        write_row(&mut w, row)?;
    }
    w.flush()?;
    Ok(())
}

pub(crate) fn cell<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// CSV row for a result; only the first tariff is written.
pub fn result_row(result: &ScrapeResult) -> Vec<String> {
    let quote = result.tariffs.first();
    vec![
        result.supplier.clone(),
        result.region.clone(),
        result.postcode.clone(),
        result.scraped_at.to_rfc3339(),
        cell(quote.and_then(|q| q.tariff_name.as_deref())),
        cell(quote.and_then(|q| q.elec_unit_rate_p.or(q.elec_day_rate_p))),
        cell(quote.and_then(|q| q.elec_standing_p)),
        cell(quote.and_then(|q| q.gas_unit_rate_p)),
        cell(quote.and_then(|q| q.gas_standing_p)),
        cell(quote.and_then(|q| q.exit_fee.as_deref())),
        cell(quote.and_then(|q| q.contract_months)),
        cell(result.error.as_deref()),
    ]
}

/// Write `{prefix}_{timestamp}.json` and `.csv` into `dir`.
pub fn write_results(dir: &Path, prefix: &str, results: &[ScrapeResult]) -> Result<String> {
    let ts = timestamp();
    let json = dir.join(format!("{}_{}.json", prefix, ts));
    let csv = dir.join(format!("{}_{}.csv", prefix, ts));

    write_json(&json, results)?;
    let rows: Vec<Vec<String>> = results.iter().map(result_row).collect();
    write_csv(&csv, &RESULT_COLUMNS, &rows)?;

    info!("Saved {} results to {}", results.len(), json.display());
    info!("Saved CSV to {}", csv.display());
    Ok(ts)
}
