//! # tariff-scout
//!
//! Config-driven energy tariff scraping. A YAML supplier profile describes a
//! quote journey; the journey state machine walks it against a browser
//! [`Driver`](scout_browser::Driver), skipping ineligible addresses and
//! classifying blockers, and the batch layer runs it over every configured
//! region and merges the results.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scout_browser::EokaSessions;
//! use tariff_scout::{scrape_with_retry, Config, Supplier};
//!
//! # #[tokio::main]
//! # async fn main() -> tariff_scout::Result<()> {
//! let supplier = Supplier::new(Config::load("configs/british_gas.yaml")?)?;
//! let sessions = EokaSessions::new(supplier.config.browser.launch_options());
//! let region = supplier.config.regions[0].clone();
//! let result = scrape_with_retry(&supplier, &sessions, &region).await;
//! println!("{}: {} tariffs", result.region, result.tariffs.len());
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod aggregate;
pub mod batch;
pub mod blocker;
mod config;
pub mod extract;
pub mod journey;
pub mod output;
mod retry;
mod supplier;

pub use address::{AddressCandidate, CandidatePolicy};
pub use blocker::{BlockerClassifier, BlockerKind, BlockerScope};
pub use config::{
    AddressConfig, BatchConfig, BrowserConfig, Config, ExtractionConfig, JourneyConfig,
    ParamDef, Params, Region, RuleConfig, StartIndex, StepAction, StepConfig,
};
pub use extract::{CompletenessPolicy, Extractor, TariffQuote};
pub use journey::{AttemptReport, FailureKind, JourneyError, JourneyState, Step};
pub use retry::{scrape_with_retry, RetryPolicy, ScrapeResult};
pub use supplier::Supplier;

/// Result type for tariff-scout operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from loading profiles, writing results or driving the browser
/// outside a journey attempt.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("browser error: {0}")]
    Driver(#[from] scout_browser::Error),

    #[error("task failed: {0}")]
    Task(String),
}
