//! Running every configured region for one or more suppliers.
//!
//! Regions run one at a time in configured order, in batches separated by a
//! longer pause. Progress is written to `{prefix}_partial.json` after every
//! task so a crash keeps completed work.

use crate::config::{BatchConfig, Config, Region};
use crate::output;
use crate::{scrape_with_retry, Error, Result, ScrapeResult, Supplier};
use rand::Rng;
use scout_browser::SessionFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

/// Command-line overrides applied to a profile before it is loaded.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Restrict the run to this postcode.
    pub test_postcode: Option<String>,
    /// Replaces `batch.region_wait_secs`.
    pub wait_secs: Option<u64>,
    /// Replaces `retry.max_attempts`.
    pub retries: Option<u32>,
    pub headless: Option<bool>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(ref postcode) = self.test_postcode {
            let region = config.region_for(postcode);
            info!("Test mode: {} ({})", region.region, region.postcode);
            config.regions = vec![region];
        }
        if let Some(secs) = self.wait_secs {
            config.batch.region_wait_secs = secs;
        }
        if let Some(retries) = self.retries {
            if retries == 0 {
                return Err(Error::Config("--retries must be at least 1".into()));
            }
            config.retry.max_attempts = retries;
        }
        if let Some(headless) = self.headless {
            config.browser.headless = headless;
        }
        Ok(())
    }
}

/// Counts consecutive failures; warns, never stops the batch.
#[derive(Debug)]
pub struct FailureTrend {
    threshold: u32,
    consecutive: u32,
}

impl FailureTrend {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    /// Record a task outcome. Returns true when the warning threshold is reached.
    pub fn record(&mut self, success: bool) -> bool {
        if success {
            self.consecutive = 0;
            return false;
        }
        self.consecutive += 1;
        self.threshold > 0 && self.consecutive >= self.threshold
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

fn region_delay(batch: &BatchConfig) -> Duration {
    let (lo, hi) = batch.region_wait_jitter;
    let jitter = if lo < hi {
        rand::rng().random_range(lo..=hi)
    } else {
        lo
    };
    Duration::from_secs((batch.region_wait_secs as i64 + jitter).max(0) as u64)
}

fn batch_delay(batch: &BatchConfig) -> Duration {
    Duration::from_secs(batch.batch_wait_secs + rand::rng().random_range(0..=30))
}

/// All results of one supplier run.
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub supplier: String,
    pub results: Vec<ScrapeResult>,
    /// Timestamp of the written result files.
    pub timestamp: String,
}

impl BatchRun {
    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.successes() as f64 / self.results.len() as f64
    }
}

/// Runs one supplier's regions.
pub struct BatchRunner {
    supplier: Arc<Supplier>,
    sessions: Arc<dyn SessionFactory>,
    out_dir: PathBuf,
}

impl BatchRunner {
    pub fn new(
        supplier: Arc<Supplier>,
        sessions: Arc<dyn SessionFactory>,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            supplier,
            sessions,
            out_dir: out_dir.into(),
        }
    }

    pub fn supplier(&self) -> &Supplier {
        &self.supplier
    }

    pub fn partial_path(&self) -> PathBuf {
        self.out_dir
            .join(format!("{}_partial.json", self.supplier.config.output_prefix))
    }

    /// Run every configured region and write the result files.
    pub async fn run(&self) -> Result<BatchRun> {
        let regions = self.supplier.config.regions.clone();
        let results = self.run_regions(&regions).await?;
        let timestamp =
            output::write_results(&self.out_dir, &self.supplier.config.output_prefix, &results)?;
        let run = BatchRun {
            supplier: self.supplier.name().to_string(),
            results,
            timestamp,
        };
        info!(
            "{}: {}/{} regions succeeded",
            run.supplier,
            run.successes(),
            run.results.len()
        );
        Ok(run)
    }

    /// Run the given regions, persisting progress after each one.
    pub async fn run_regions(&self, regions: &[Region]) -> Result<Vec<ScrapeResult>> {
        let config = &self.supplier.config;
        let pacing = &config.batch;
        let partial = self.partial_path();
        let mut trend = FailureTrend::new(pacing.failure_warning_threshold);
        let mut results = Vec::with_capacity(regions.len());
        let batches = regions.len().div_ceil(pacing.batch_size);

        for (b, chunk) in regions.chunks(pacing.batch_size).enumerate() {
            if b > 0 {
                let delay = batch_delay(pacing);
                info!(
                    "Batch {}/{} done, waiting {}s",
                    b,
                    batches,
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            info!("Starting batch {}/{} ({} regions)", b + 1, batches, chunk.len());

            for (i, region) in chunk.iter().enumerate() {
                if i > 0 {
                    let delay = region_delay(pacing);
                    info!("Waiting {}s before next region", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }

                let result = scrape_with_retry(&self.supplier, self.sessions.as_ref(), region).await;
                match result.error {
                    None => info!(
                        "{}: {} tariff(s) after {} attempt(s)",
                        region.region,
                        result.tariffs.len(),
                        result.attempt
                    ),
                    Some(ref e) => warn!("{}: failed: {}", region.region, e),
                }
                if trend.record(result.is_success()) {
                    warn!(
                        "{} consecutive failures for {}; the site may be blocking",
                        trend.consecutive(),
                        config.name
                    );
                }
                results.push(result);
                if let Err(e) = output::write_json(&partial, &results) {
                    warn!("Failed to save progress to {}: {}", partial.display(), e);
                }
            }
        }
        Ok(results)
    }

    /// Rerun failed regions with a fixed cooldown between them.
    ///
    /// The results go to their own `{prefix}_retry_{timestamp}` files.
    pub async fn retry_regions(
        &self,
        regions: &[Region],
        cooldown: Duration,
    ) -> Result<Vec<ScrapeResult>> {
        let mut results = Vec::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            if i > 0 {
                info!("Cooling down {}s", cooldown.as_secs());
                tokio::time::sleep(cooldown).await;
            }
            info!("Retrying {} ({})", region.region, region.postcode);
            results.push(scrape_with_retry(&self.supplier, self.sessions.as_ref(), region).await);
        }
        if !results.is_empty() {
            let prefix = format!("{}_retry", self.supplier.config.output_prefix);
            output::write_results(&self.out_dir, &prefix, &results)?;
        }
        Ok(results)
    }
}

/// How several suppliers share the run.
#[derive(Debug, Clone, Copy)]
pub enum SupplierMode {
    /// All at once, each started `stagger` after the previous one.
    Parallel { stagger: Duration },
    /// One after another with `wait` between them.
    Sequential { wait: Duration },
}

/// Run several suppliers. Results come back in input order.
pub async fn run_suppliers(
    runners: Vec<BatchRunner>,
    mode: SupplierMode,
) -> Vec<(String, Result<BatchRun>)> {
    let mut out = Vec::with_capacity(runners.len());

    match mode {
        SupplierMode::Parallel { stagger } => {
            let mut handles = Vec::with_capacity(runners.len());
            for (i, runner) in runners.into_iter().enumerate() {
                let name = runner.supplier().name().to_string();
                let span = info_span!("supplier", supplier = %name);
                let delay = stagger * i as u32;
                let handle = tokio::spawn(
                    async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        runner.run().await
                    }
                    .instrument(span),
                );
                handles.push((name, handle));
            }
            for (name, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("{} task failed: {}", name, e);
                        Err(Error::Task(format!("{}: {}", name, e)))
                    }
                };
                out.push((name, result));
            }
        }
        SupplierMode::Sequential { wait } => {
            let count = runners.len();
            for (i, runner) in runners.into_iter().enumerate() {
                let name = runner.supplier().name().to_string();
                let span = info_span!("supplier", supplier = %name);
                let result = runner.run().instrument(span).await;
                out.push((name, result));
                if i + 1 < count {
                    info!("Waiting {}s before next supplier", wait.as_secs());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
    out
}
