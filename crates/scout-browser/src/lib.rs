//! # scout-browser
//!
//! The browser capabilities a quote journey needs, behind a trait.
//!
//! The journey code only ever talks to [`Driver`] and [`SessionFactory`];
//! [`EokaSessions`] launches a real Chrome through `eoka`, and tests plug in
//! scripted drivers instead.
//!
//! ```rust,no_run
//! use scout_browser::{EokaSessions, LaunchOptions, SessionFactory, Target};
//!
//! # #[tokio::main]
//! # async fn main() -> scout_browser::Result<()> {
//! let sessions = EokaSessions::new(LaunchOptions::default());
//! let driver = sessions.open().await?;
//! driver.navigate("https://example.com").await?;
//! if let Some(button) = driver.find(&Target::text("Accept")).await? {
//!     driver.click(&button).await?;
//! }
//! driver.close().await?;
//! # Ok(())
//! # }
//! ```

mod condition;
mod session;
mod target;

pub use condition::Condition;
pub use session::{EokaDriver, EokaSessions, LaunchOptions};
pub use target::{ElementHandle, Target};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// Interval between checks in [`Driver::wait_for`].
pub const POLL_INTERVAL_MS: u64 = 250;

/// Result type for browser operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by a driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("unexpected script result: {0}")]
    Script(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session closed")]
    Closed,
}

/// One isolated browser session driving a single page.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Load `url` and wait for the DOM to be ready.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Resolve a target to an element on the current page, if present.
    async fn find(&self, target: &Target) -> Result<Option<ElementHandle>>;

    /// Visible text inside the first element matching `scope`.
    async fn read_text(&self, scope: &str) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Replace the value of an input.
    async fn type_text(&self, element: &ElementHandle, text: &str) -> Result<()>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// Choose the option at `index` of a `<select>`, firing its change event.
    async fn select_by_index(&self, element: &ElementHandle, index: usize) -> Result<()>;

    /// Option labels of a `<select>`, in document order.
    async fn option_texts(&self, element: &ElementHandle) -> Result<Vec<String>>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Tear the session down. Further calls fail with [`Error::Closed`].
    async fn close(&self) -> Result<()>;

    /// Evaluate a condition once against the current page.
    async fn check(&self, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::Selector(selector) => {
                Ok(self.find(&Target::selector(selector)).await?.is_some())
            }
            Condition::UrlContains(fragment) => Ok(self.current_url().await?.contains(fragment)),
            Condition::TextContains(_) | Condition::TextAny(_) => {
                let text = self.read_text("body").await?.to_lowercase();
                Ok(condition.matches_text(&text).unwrap_or(false))
            }
        }
    }

    /// Poll `condition` until it holds or `timeout_ms` elapses.
    async fn wait_for(&self, condition: &Condition, timeout_ms: u64) -> Result<bool> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.check(condition).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}

/// Opens fresh, unshared browser sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Driver>>;
}
