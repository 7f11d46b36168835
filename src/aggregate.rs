//! Merging supplier result files into unified reports.

use crate::config::{Config, Region};
use crate::extract::{CompletenessPolicy, TariffQuote};
use crate::output::{self, cell};
use crate::{Result, ScrapeResult};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, info, warn};

static FEE_AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

/// Columns of the combined CSV.
pub const TARIFF_COLUMNS: [&str; 14] = [
    "supplier",
    "region",
    "postcode",
    "scraped_at",
    "tariff_name",
    "elec_unit_rate_p",
    "elec_day_rate_p",
    "elec_night_rate_p",
    "elec_standing_p",
    "gas_unit_rate_p",
    "gas_standing_p",
    "exit_fee",
    "contract_months",
    "error",
];

/// What the aggregator needs to know about a supplier.
#[derive(Debug, Clone)]
pub struct SupplierSource {
    pub name: String,
    pub output_prefix: String,
    pub completeness: CompletenessPolicy,
}

impl From<&Config> for SupplierSource {
    fn from(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            output_prefix: config.output_prefix.clone(),
            completeness: config.completeness.clone(),
        }
    }
}

/// Result files for `prefix` in `dir`: `{prefix}_*.json`.
///
/// The partial file is included so progress saved before a crash can still
/// be combined.
pub fn matching_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let stem = format!("{}_", prefix);
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&stem) && name.ends_with(".json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// The file with the most records, newest on a tie.
///
/// A single-postcode rerun writes a small file that is newer than the full
/// batch; picking by size keeps the batch. Unreadable files are skipped; if
/// none can be read the newest file is returned.
pub fn select_most_complete(files: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(usize, SystemTime, &PathBuf)> = None;
    for file in files {
        let count = match output::read_json::<Vec<serde_json::Value>>(file) {
            Ok(records) => records.len(),
            Err(e) => {
                debug!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let mtime = modified(file);
        let better = match best {
            None => true,
            Some((c, m, _)) => count > c || (count == c && mtime > m),
        };
        if better {
            best = Some((count, mtime, file));
        }
    }
    match best {
        Some((_, _, file)) => Some(file.clone()),
        None => files.iter().max_by_key(|f| modified(f)).cloned(),
    }
}

/// Load the most complete result file for a supplier.
pub fn load_results(dir: &Path, source: &SupplierSource) -> Result<Vec<ScrapeResult>> {
    let files = matching_files(dir, &source.output_prefix)?;
    let Some(file) = select_most_complete(&files) else {
        warn!("No output file found for {}_*.json", source.output_prefix);
        return Ok(Vec::new());
    };
    info!("Loading: {}", file.display());
    let mut results: Vec<ScrapeResult> = output::read_json(&file)?;
    for r in &mut results {
        if r.supplier.is_empty() {
            r.supplier = source.name.clone();
        }
    }
    Ok(results)
}

/// One row of the unified schema: a tariff, or a failed region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffRow {
    pub supplier: String,
    pub region: String,
    pub postcode: String,
    pub scraped_at: String,
    pub tariff_name: Option<String>,
    pub elec_unit_rate_p: Option<f64>,
    pub elec_day_rate_p: Option<f64>,
    pub elec_night_rate_p: Option<f64>,
    pub elec_standing_p: Option<f64>,
    pub gas_unit_rate_p: Option<f64>,
    pub gas_standing_p: Option<f64>,
    pub exit_fee: Option<String>,
    pub contract_months: Option<u32>,
    pub error: Option<String>,
}

impl TariffRow {
    fn new(result: &ScrapeResult, quote: Option<&TariffQuote>) -> Self {
        Self {
            supplier: result.supplier.clone(),
            region: result.region.clone(),
            postcode: result.postcode.clone(),
            scraped_at: result.scraped_at.to_rfc3339(),
            tariff_name: quote.and_then(|q| q.tariff_name.clone()),
            elec_unit_rate_p: quote.and_then(|q| q.elec_unit_rate_p),
            elec_day_rate_p: quote.and_then(|q| q.elec_day_rate_p),
            elec_night_rate_p: quote.and_then(|q| q.elec_night_rate_p),
            elec_standing_p: quote.and_then(|q| q.elec_standing_p),
            gas_unit_rate_p: quote.and_then(|q| q.gas_unit_rate_p),
            gas_standing_p: quote.and_then(|q| q.gas_standing_p),
            exit_fee: quote.and_then(|q| q.exit_fee.clone()),
            contract_months: quote.and_then(|q| q.contract_months),
            error: match quote {
                Some(_) => None,
                None => Some(result.error.clone().unwrap_or_else(|| "Unknown".into())),
            },
        }
    }

    pub fn quote(&self) -> TariffQuote {
        TariffQuote {
            tariff_name: self.tariff_name.clone(),
            exit_fee: self.exit_fee.clone(),
            elec_unit_rate_p: self.elec_unit_rate_p,
            elec_day_rate_p: self.elec_day_rate_p,
            elec_night_rate_p: self.elec_night_rate_p,
            elec_standing_p: self.elec_standing_p,
            gas_unit_rate_p: self.gas_unit_rate_p,
            gas_standing_p: self.gas_standing_p,
            contract_months: self.contract_months,
        }
    }

    /// Named tariff, at least one unit rate, no error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.tariff_name.is_some() && self.quote().has_unit_rate()
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.supplier.clone(),
            self.region.clone(),
            self.postcode.clone(),
            self.scraped_at.clone(),
            cell(self.tariff_name.as_deref()),
            cell(self.elec_unit_rate_p),
            cell(self.elec_day_rate_p),
            cell(self.elec_night_rate_p),
            cell(self.elec_standing_p),
            cell(self.gas_unit_rate_p),
            cell(self.gas_standing_p),
            cell(self.exit_fee.as_deref()),
            cell(self.contract_months),
            cell(self.error.as_deref()),
        ]
    }
}

/// Flatten results: one row per tariff, one error row per failed region.
pub fn normalize(results: &[ScrapeResult]) -> Vec<TariffRow> {
    let mut rows = Vec::new();
    for result in results {
        if result.tariffs.is_empty() {
            rows.push(TariffRow::new(result, None));
        } else {
            rows.extend(result.tariffs.iter().map(|q| TariffRow::new(result, Some(q))));
        }
    }
    rows
}

/// Load and normalise every supplier, in the order given.
pub fn combine(dir: &Path, sources: &[SupplierSource]) -> Result<Vec<TariffRow>> {
    let mut rows = Vec::new();
    for source in sources {
        let supplier_rows = normalize(&load_results(dir, source)?);
        info!("{}: {} records", source.name, supplier_rows.len());
        rows.extend(supplier_rows);
    }
    Ok(rows)
}

/// Replace rows for every (supplier, region) that a retry fixed.
pub fn merge_retried(rows: &mut Vec<TariffRow>, retried: &[ScrapeResult]) {
    for result in retried.iter().filter(|r| r.is_success()) {
        let position = rows
            .iter()
            .position(|r| r.supplier == result.supplier && r.region == result.region);
        rows.retain(|r| !(r.supplier == result.supplier && r.region == result.region));
        let fresh = normalize(std::slice::from_ref(result));
        let at = position.unwrap_or(rows.len()).min(rows.len());
        rows.splice(at..at, fresh);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupplierStats {
    pub supplier: String,
    pub successful: usize,
    pub total: usize,
}

impl SupplierStats {
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successful as f64 / self.total as f64
    }
}

/// Success counts per supplier, in order of first appearance.
pub fn supplier_stats(rows: &[TariffRow]) -> Vec<SupplierStats> {
    let mut stats: Vec<SupplierStats> = Vec::new();
    for row in rows {
        let i = match stats.iter().position(|s| s.supplier == row.supplier) {
            Some(i) => i,
            None => {
                stats.push(SupplierStats {
                    supplier: row.supplier.clone(),
                    successful: 0,
                    total: 0,
                });
                stats.len() - 1
            }
        };
        stats[i].total += 1;
        if row.is_success() {
            stats[i].successful += 1;
        }
    }
    stats
}

/// Which failed regions to rerun.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPlan {
    /// Suppliers at or above the threshold, with their failed regions.
    pub retry: Vec<(String, Vec<Region>)>,
    /// Suppliers below the threshold; these need a manual run.
    pub skip: Vec<String>,
}

pub fn plan_retries(rows: &[TariffRow], threshold: f64) -> RetryPlan {
    let mut plan = RetryPlan::default();
    for stats in supplier_stats(rows) {
        if stats.successful == stats.total {
            continue;
        }
        info!(
            "{}: {}/{} succeeded ({:.0}%)",
            stats.supplier,
            stats.successful,
            stats.total,
            stats.rate() * 100.0
        );
        if stats.rate() < threshold {
            warn!(
                "{}: below {:.0}% threshold, skipping retries",
                stats.supplier,
                threshold * 100.0
            );
            plan.skip.push(stats.supplier);
            continue;
        }
        let mut seen = HashSet::new();
        let regions: Vec<Region> = rows
            .iter()
            .filter(|r| r.supplier == stats.supplier && !r.is_success())
            .filter(|r| seen.insert(r.region.clone()))
            .map(|r| Region {
                region: r.region.clone(),
                postcode: r.postcode.clone(),
            })
            .collect();
        plan.retry.push((stats.supplier, regions));
    }
    plan
}

/// Rates for one region of a tariff summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRates {
    pub elec_unit_rate: Option<f64>,
    pub elec_day_rate: Option<f64>,
    pub elec_night_rate: Option<f64>,
    pub elec_standing: Option<f64>,
    pub gas_unit_rate: Option<f64>,
    pub gas_standing: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffSummary {
    pub supplier: String,
    pub tariff_name: String,
    pub regions: BTreeMap<String, RegionRates>,
    pub exit_fees: Option<String>,
    pub contract_length: Option<String>,
}

/// `"£N per fuel"`; a dual-fuel total is halved first.
pub fn normalize_exit_fee(fee: &str, covers_both_fuels: bool) -> Option<String> {
    if fee.to_lowercase().contains("per fuel") {
        return Some(fee.to_string());
    }
    let fee = fee.replace(',', "");
    let mut amount: f64 = FEE_AMOUNT_RE.find(&fee)?.as_str().parse().ok()?;
    if covers_both_fuels {
        amount /= 2.0;
    }
    Some(format!("£{} per fuel", amount.trunc() as i64))
}

/// One summary per `"{supplier}_{tariff}"`, in order of first appearance.
pub fn summarize(rows: &[TariffRow], sources: &[SupplierSource]) -> Vec<TariffSummary> {
    let halves: HashSet<&str> = sources
        .iter()
        .filter(|s| s.completeness.exit_fee_covers_both_fuels)
        .map(|s| s.name.as_str())
        .collect();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut summaries: Vec<TariffSummary> = Vec::new();

    for row in rows {
        let Some(ref tariff) = row.tariff_name else {
            continue;
        };
        if row.error.is_some() {
            continue;
        }
        let key = format!("{}_{}", row.supplier, tariff);
        let i = *index.entry(key).or_insert_with(|| {
            summaries.push(TariffSummary {
                supplier: row.supplier.clone(),
                tariff_name: tariff.clone(),
                regions: BTreeMap::new(),
                exit_fees: None,
                contract_length: None,
            });
            summaries.len() - 1
        });
        let summary = &mut summaries[i];

        summary.regions.insert(
            row.region.clone(),
            RegionRates {
                elec_unit_rate: row.elec_unit_rate_p,
                elec_day_rate: row.elec_day_rate_p,
                elec_night_rate: row.elec_night_rate_p,
                elec_standing: row.elec_standing_p,
                gas_unit_rate: row.gas_unit_rate_p,
                gas_standing: row.gas_standing_p,
            },
        );
        if let Some(fee) = row
            .exit_fee
            .as_deref()
            .and_then(|f| normalize_exit_fee(f, halves.contains(row.supplier.as_str())))
        {
            summary.exit_fees = Some(fee);
        }
        if let Some(months) = row.contract_months.filter(|&m| m > 0) {
            summary.contract_length = Some(format!("{} months", months));
        }
    }
    summaries
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub complete: usize,
    pub total: usize,
    /// Incomplete rows per supplier: `(region, reason)`.
    pub incomplete: Vec<(String, Vec<(String, String)>)>,
}

/// Why a row is not complete, judged by its supplier's policy.
pub fn incomplete_reason(row: &TariffRow, policy: &CompletenessPolicy) -> Option<String> {
    if let Some(ref e) = row.error {
        return Some(format!("error: {}", e));
    }
    policy.incomplete_reason(&row.quote())
}

pub fn quality_report(rows: &[TariffRow], sources: &[SupplierSource]) -> QualityReport {
    let default = CompletenessPolicy::default();
    let mut report = QualityReport {
        complete: 0,
        total: rows.len(),
        incomplete: Vec::new(),
    };
    for row in rows {
        let policy = sources
            .iter()
            .find(|s| s.name == row.supplier)
            .map(|s| &s.completeness)
            .unwrap_or(&default);
        match incomplete_reason(row, policy) {
            None => report.complete += 1,
            Some(reason) => {
                let i = match report.incomplete.iter().position(|(s, _)| *s == row.supplier) {
                    Some(i) => i,
                    None => {
                        report.incomplete.push((row.supplier.clone(), Vec::new()));
                        report.incomplete.len() - 1
                    }
                };
                report.incomplete[i].1.push((row.region.clone(), reason));
            }
        }
    }
    report
}

fn log_quality(report: &QualityReport) {
    let pct = if report.total > 0 {
        100.0 * report.complete as f64 / report.total as f64
    } else {
        0.0
    };
    info!(
        "Complete: {}/{} ({:.1}%)",
        report.complete, report.total, pct
    );
    for (supplier, regions) in &report.incomplete {
        warn!("{}: {} incomplete", supplier, regions.len());
        for (region, reason) in regions {
            debug!("  {}: {}", region, reason);
        }
    }
}

#[derive(Serialize)]
struct Combined<'a> {
    tariffs: &'a [TariffRow],
    updated: String,
}

/// Write `all_tariffs.json`, `all_tariffs_{ts}.csv` and `tariff_data_latest.json`.
pub fn write_aggregate(
    dir: &Path,
    rows: &[TariffRow],
    sources: &[SupplierSource],
) -> Result<QualityReport> {
    let combined = Combined {
        tariffs: rows,
        updated: Utc::now().to_rfc3339(),
    };
    let json = dir.join("all_tariffs.json");
    output::write_json(&json, &combined)?;
    info!("Saved: {}", json.display());

    let csv = dir.join(format!("all_tariffs_{}.csv", output::timestamp()));
    let csv_rows: Vec<Vec<String>> = rows.iter().map(TariffRow::csv_row).collect();
    output::write_csv(&csv, &TARIFF_COLUMNS, &csv_rows)?;
    info!("Saved: {}", csv.display());

    let latest = dir.join("tariff_data_latest.json");
    output::write_json(&latest, &summarize(rows, sources))?;
    info!("Saved: {}", latest.display());

    let report = quality_report(rows, sources);
    log_quality(&report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn region(name: &str, postcode: &str) -> Region {
        Region {
            region: name.into(),
            postcode: postcode.into(),
        }
    }

    fn quote(name: &str, elec: f64, gas: Option<f64>, fee: &str) -> TariffQuote {
        TariffQuote {
            tariff_name: Some(name.into()),
            exit_fee: Some(fee.into()),
            elec_unit_rate_p: Some(elec),
            elec_standing_p: Some(50.0),
            gas_unit_rate_p: gas,
            gas_standing_p: gas.map(|_| 30.0),
            contract_months: Some(12),
            ..Default::default()
        }
    }

    fn source(name: &str, prefix: &str, halve: bool) -> SupplierSource {
        SupplierSource {
            name: name.into(),
            output_prefix: prefix.into(),
            completeness: CompletenessPolicy {
                exit_fee_covers_both_fuels: halve,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_select_by_record_count_not_mtime() {
        let dir = std::env::temp_dir().join(format!("scout-agg-select-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let r = region("London", "N5 2SD");

        let full: Vec<ScrapeResult> = (0..14)
            .map(|i| ScrapeResult::failure("edf", &r, format!("e{}", i), 1, 0))
            .collect();
        output::write_json(&dir.join("edf_tariffs_20250101_000000.json"), &full).unwrap();
        sleep(Duration::from_millis(20));
        let rerun: Vec<ScrapeResult> = (0..3)
            .map(|i| ScrapeResult::failure("edf", &r, format!("r{}", i), 1, 0))
            .collect();
        output::write_json(&dir.join("edf_tariffs_20250102_000000.json"), &rerun).unwrap();
        output::write_json(&dir.join("edf_tariffs_partial.json"), &rerun).unwrap();
        fs::write(dir.join("edf_tariffs_broken.json"), "not json").unwrap();
        fs::write(dir.join("bg_tariffs_20250101_000000.json"), "[]").unwrap();

        let files = matching_files(&dir, "edf_tariffs").unwrap();
        assert_eq!(files.len(), 4);
        let chosen = select_most_complete(&files).unwrap();
        assert!(chosen.ends_with("edf_tariffs_20250101_000000.json"));

        let loaded = load_results(&dir, &source("edf", "edf_tariffs", true)).unwrap();
        assert_eq!(loaded.len(), 14);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_partial_only() {
        let dir = std::env::temp_dir().join(format!("scout-agg-partial-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let results: Vec<ScrapeResult> = (0..10)
            .map(|i| {
                ScrapeResult::success(
                    "edf",
                    &region(&format!("Region {}", i), "IP4 5ET"),
                    vec![quote("Simpler Energy", 24.0, Some(6.0), "£0")],
                    1,
                    1,
                )
            })
            .collect();
        output::write_json(&dir.join("edf_tariffs_partial.json"), &results).unwrap();

        let loaded = load_results(&dir, &source("edf", "edf_tariffs", false)).unwrap();
        assert_eq!(loaded.len(), 10);
        assert!(loaded.iter().all(|r| r.is_success()));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_normalize_and_success() {
        let ok = ScrapeResult::success(
            "british_gas",
            &region("Eastern", "IP4 5ET"),
            vec![quote("Fixed Tariff v3", 24.1, Some(6.0), "£75 per fuel")],
            1,
            1,
        );
        let failed = ScrapeResult::failure("british_gas", &region("London", "N5 2SD"), "blocked: captcha", 3, 0);
        let rows = normalize(&[ok, failed]);

        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_success());
        assert_eq!(rows[0].tariff_name.as_deref(), Some("Fixed Tariff v3"));
        assert!(!rows[1].is_success());
        assert_eq!(rows[1].error.as_deref(), Some("blocked: captcha"));

        let stats = supplier_stats(&rows);
        assert_eq!(stats.len(), 1);
        assert_eq!((stats[0].successful, stats[0].total), (1, 2));
        assert_eq!(stats[0].rate(), 0.5);
    }

    #[test]
    fn test_plan_retries_threshold() {
        let mut results = Vec::new();
        for (i, name) in ["Eastern", "London", "Southern", "Yorkshire"].iter().enumerate() {
            let r = region(name, "AB1 2CD");
            results.push(if i < 3 {
                ScrapeResult::success("edf", &r, vec![quote("Simpler Energy", 24.0, Some(6.0), "£0")], 1, 1)
            } else {
                ScrapeResult::failure("edf", &r, "timed out", 3, 0)
            });
            results.push(if i < 1 {
                ScrapeResult::success("eon_next", &r, vec![quote("Next Flex", 25.0, Some(6.1), "£0")], 1, 1)
            } else {
                ScrapeResult::failure("eon_next", &r, "blocked: captcha", 3, 0)
            });
        }
        let rows = normalize(&results);
        let plan = plan_retries(&rows, 0.5);
        assert_eq!(plan.retry.len(), 1);
        assert_eq!(plan.retry[0].0, "edf");
        assert_eq!(plan.retry[0].1, vec![region("Yorkshire", "AB1 2CD")]);
        assert_eq!(plan.skip, vec!["eon_next".to_string()]);
    }

    #[test]
    fn test_merge_retried_replaces_failed_row() {
        let r = region("Yorkshire", "YO31 1DT");
        let mut rows = normalize(&[
            ScrapeResult::failure("edf", &region("Eastern", "IP4 5ET"), "timed out", 3, 0),
            ScrapeResult::failure("edf", &r, "timed out", 3, 0),
            ScrapeResult::failure("bg", &r, "timed out", 3, 0),
        ]);
        let retried = vec![
            ScrapeResult::success("edf", &r, vec![quote("Simpler Energy", 24.0, Some(6.0), "£0")], 2, 1),
            ScrapeResult::failure("edf", &region("Eastern", "IP4 5ET"), "timed out again", 3, 0),
        ];
        merge_retried(&mut rows, &retried);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].error.as_deref(), Some("timed out"));
        assert_eq!(rows[1].region, "Yorkshire");
        assert!(rows[1].is_success());
        assert_eq!(rows[2].supplier, "bg");
        assert!(!rows[2].is_success());
    }

    #[test]
    fn test_exit_fee_normalisation() {
        assert_eq!(normalize_exit_fee("£50 per fuel", true).as_deref(), Some("£50 per fuel"));
        assert_eq!(normalize_exit_fee("£150", true).as_deref(), Some("£75 per fuel"));
        assert_eq!(normalize_exit_fee("£75", false).as_deref(), Some("£75 per fuel"));
        assert_eq!(normalize_exit_fee("£0", false).as_deref(), Some("£0 per fuel"));
        assert_eq!(normalize_exit_fee("none", false), None);
        assert_eq!(normalize_exit_fee("£1,200", false).as_deref(), Some("£1200 per fuel"));
        assert_eq!(normalize_exit_fee("£1,200", true).as_deref(), Some("£600 per fuel"));
    }

    #[test]
    fn test_summary_keyed_by_supplier_and_tariff() {
        let results = vec![
            ScrapeResult::success("edf", &region("Eastern", "IP4 5ET"), vec![quote("Simpler Energy", 24.0, Some(6.0), "£150")], 1, 1),
            ScrapeResult::success("edf", &region("London", "N5 2SD"), vec![quote("Simpler Energy", 26.0, Some(6.5), "£150")], 1, 1),
            ScrapeResult::success("eon_next", &region("London", "N5 2SD"), vec![quote("Next Flex", 25.0, Some(6.1), "£0")], 1, 1),
            ScrapeResult::failure("eon_next", &region("Eastern", "IP4 5ET"), "timed out", 3, 0),
        ];
        let rows = normalize(&results);
        let sources = vec![source("edf", "edf_tariffs", true), source("eon_next", "eon_tariffs", false)];
        let summary = summarize(&rows, &sources);

        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].supplier, "edf");
        assert_eq!(summary[0].tariff_name, "Simpler Energy");
        assert_eq!(summary[0].regions.len(), 2);
        assert_eq!(summary[0].regions["London"].elec_unit_rate, Some(26.0));
        assert_eq!(summary[0].exit_fees.as_deref(), Some("£75 per fuel"));
        assert_eq!(summary[0].contract_length.as_deref(), Some("12 months"));
        assert_eq!(summary[1].exit_fees.as_deref(), Some("£0 per fuel"));

        let order: Vec<&String> = summary[0].regions.keys().collect();
        assert_eq!(order, vec!["Eastern", "London"]);

        let json = serde_json::to_value(&summary[1]).unwrap();
        assert_eq!(json["tariffName"], "Next Flex");
        assert_eq!(json["regions"]["London"]["gasUnitRate"], 6.1);
        assert_eq!(json["contractLength"], "12 months");
    }

    #[test]
    fn test_quality_report() {
        let results = vec![
            ScrapeResult::success("edf", &region("Eastern", "IP4 5ET"), vec![quote("Simpler Energy", 24.0, Some(6.0), "£0")], 1, 1),
            ScrapeResult::success("edf", &region("London", "N5 2SD"), vec![quote("Simpler Energy", 24.0, None, "£0")], 1, 1),
            ScrapeResult::success("edf", &region("Southern", "BH6 4AS"), vec![quote("Simpler Electric", 24.0, None, "£0")], 1, 1),
            ScrapeResult::failure("edf", &region("Yorkshire", "YO31 1DT"), "timed out", 3, 0),
        ];
        let rows = normalize(&results);
        let report = quality_report(&rows, &[source("edf", "edf_tariffs", false)]);
        assert_eq!((report.complete, report.total), (2, 4));
        assert_eq!(report.incomplete.len(), 1);
        let (supplier, regions) = &report.incomplete[0];
        assert_eq!(supplier, "edf");
        assert_eq!(
            regions,
            &vec![
                ("London".to_string(), "missing gas rates".to_string()),
                ("Yorkshire".to_string(), "error: timed out".to_string()),
            ]
        );
    }

    #[test]
    fn test_write_aggregate() {
        let dir = std::env::temp_dir().join(format!("scout-agg-write-{}", std::process::id()));
        let rows = normalize(&[ScrapeResult::success(
            "edf",
            &region("Eastern", "IP4 5ET"),
            vec![quote("Simpler Energy", 24.0, Some(6.0), "£0")],
            1,
            1,
        )]);
        let report = write_aggregate(&dir, &rows, &[source("edf", "edf_tariffs", false)]).unwrap();
        assert_eq!(report.complete, 1);

        let combined: serde_json::Value = output::read_json(&dir.join("all_tariffs.json")).unwrap();
        assert_eq!(combined["tariffs"].as_array().map(|a| a.len()), Some(1));
        assert!(combined["updated"].is_string());
        let latest: serde_json::Value =
            output::read_json(&dir.join("tariff_data_latest.json")).unwrap();
        assert_eq!(latest[0]["exitFees"], "£0 per fuel");

        let csvs = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("all_tariffs_"))
            .count();
        assert_eq!(csvs, 1);

        fs::remove_dir_all(&dir).ok();
    }
}
