//! Bounded attempts with exponential backoff around a single journey.

use crate::config::Region;
use crate::extract::TariffQuote;
use crate::journey::{self, AttemptReport, JourneyError};
use crate::Supplier;
use chrono::{DateTime, Utc};
use rand::Rng;
use scout_browser::{Driver, SessionFactory};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

fn default_max_attempts() -> u32 {
    3
}
fn default_base_secs() -> u64 {
    30
}
fn default_jitter_secs() -> u64 {
    10
}

/// Attempt budget and backoff for one task.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failure; doubles after each further one.
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,

    /// Upper bound of the uniform jitter added to every delay.
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_secs: default_base_secs(),
            jitter_secs: default_jitter_secs(),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(failed_attempt - 1)`, before jitter.
    pub fn base_delay(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(16);
        Duration::from_secs(self.base_secs.saturating_mul(1u64 << exp))
    }

    /// Un-jittered delays between attempts; one fewer than `max_attempts`.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.base_delay(a)).collect()
    }

    fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay(failed_attempt) + jitter(self.jitter_secs)
    }
}

fn jitter(max_secs: u64) -> Duration {
    if max_secs == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_secs * 1000))
}

/// Result of one (region, postcode) task.
///
/// Either `tariffs` is non-empty and `error` is `None`, or `tariffs` is
/// empty and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeResult {
    pub supplier: String,
    pub region: String,
    pub postcode: String,
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub tariffs: Vec<TariffQuote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempt that succeeded, or the last one made.
    #[serde(default)]
    pub attempt: u32,
    #[serde(default)]
    pub address_attempts: usize,
}

impl ScrapeResult {
    /// Quotes without a unit rate are dropped; if none remain this is a failure.
    pub fn success(
        supplier: &str,
        region: &Region,
        tariffs: Vec<TariffQuote>,
        attempt: u32,
        address_attempts: usize,
    ) -> Self {
        let tariffs: Vec<TariffQuote> = tariffs.into_iter().filter(|t| t.has_unit_rate()).collect();
        if tariffs.is_empty() {
            return Self::failure(
                supplier,
                region,
                "could not extract rates",
                attempt,
                address_attempts,
            );
        }
        Self {
            supplier: supplier.to_string(),
            region: region.region.clone(),
            postcode: region.postcode.clone(),
            scraped_at: Utc::now(),
            tariffs,
            error: None,
            attempt,
            address_attempts,
        }
    }

    pub fn failure(
        supplier: &str,
        region: &Region,
        error: impl Into<String>,
        attempt: u32,
        address_attempts: usize,
    ) -> Self {
        Self {
            supplier: supplier.to_string(),
            region: region.region.clone(),
            postcode: region.postcode.clone(),
            scraped_at: Utc::now(),
            tariffs: Vec::new(),
            error: Some(error.into()),
            attempt,
            address_attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.tariffs.is_empty()
    }
}

/// Run a task with retries, opening a fresh session for every attempt.
///
/// Returns the first success, or the last failure once attempts run out.
pub async fn scrape_with_retry(
    supplier: &Supplier,
    sessions: &dyn SessionFactory,
    region: &Region,
) -> ScrapeResult {
    let span = info_span!(
        "task",
        supplier = %supplier.name(),
        region = %region.region,
        postcode = %region.postcode
    );
    scrape(supplier, sessions, region).instrument(span).await
}

async fn scrape(supplier: &Supplier, sessions: &dyn SessionFactory, region: &Region) -> ScrapeResult {
    let policy = &supplier.config.retry;
    let mut last_error = String::from("no attempts made");
    let mut last_addresses = 0;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let delay = policy.delay_after(attempt - 1);
            warn!(
                "Retry attempt {}/{} in {:.1}s",
                attempt,
                policy.max_attempts,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }

        let report = attempt_once(supplier, sessions, region, attempt).await;
        last_addresses = report.address_attempts;
        match report.outcome {
            Ok(tariffs) => {
                info!("Attempt {} succeeded", attempt);
                return ScrapeResult::success(
                    supplier.name(),
                    region,
                    tariffs,
                    attempt,
                    report.address_attempts,
                );
            }
            Err(e) => {
                warn!("Attempt {} failed ({}): {}", attempt, e.kind(), e);
                last_error = e.to_string();
            }
        }
    }

    ScrapeResult::failure(
        supplier.name(),
        region,
        last_error,
        policy.max_attempts,
        last_addresses,
    )
}

async fn attempt_once(
    supplier: &Supplier,
    sessions: &dyn SessionFactory,
    region: &Region,
    attempt: u32,
) -> AttemptReport {
    let driver = match sessions.open().await {
        Ok(driver) => driver,
        Err(e) => {
            return AttemptReport {
                outcome: Err(JourneyError::Driver(e)),
                address_attempts: 0,
            }
        }
    };

    let report = journey::run_attempt(supplier, driver.as_ref(), &region.postcode, attempt).await;
    if report.outcome.is_err() {
        save_screenshot(supplier, driver.as_ref(), region, attempt).await;
    }
    if let Err(e) = driver.close().await {
        debug!("Failed to close session: {}", e);
    }
    report
}

async fn save_screenshot(supplier: &Supplier, driver: &dyn Driver, region: &Region, attempt: u32) {
    let Some(ref dir) = supplier.config.screenshots_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Failed to create {}: {}", dir.display(), e);
        return;
    }
    let file = format!(
        "{}_{}_attempt{}.png",
        supplier.config.output_prefix,
        region.region.replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        attempt
    );
    let path = dir.join(file);
    info!("Saving failure screenshot to: {}", path.display());
    if let Err(e) = driver.screenshot(&path).await {
        warn!("Failed to save screenshot: {}", e);
    }
}
