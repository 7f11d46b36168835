//! Page obstructions, recognised from body text.
//!
//! Classification is substring matching against a phrase table. Kinds are
//! checked in [`BlockerKind::PRIORITY`] order, so a page that matches several
//! kinds always resolves to the same one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Something that stops a journey on its happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Captcha,
    AccessDenied,
    RateLimited,
    NetworkError,
    AlreadyCustomer,
    BusinessMeter,
    PrepaymentMeter,
    UnsupportedMeter,
    GenericError,
}

/// What a blocker invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerScope {
    /// Only the selected address; the next candidate may work.
    Address,
    /// The whole browser session; needs a fresh attempt.
    Session,
}

impl BlockerKind {
    /// Highest priority first.
    pub const PRIORITY: [BlockerKind; 9] = [
        BlockerKind::Captcha,
        BlockerKind::AccessDenied,
        BlockerKind::RateLimited,
        BlockerKind::NetworkError,
        BlockerKind::AlreadyCustomer,
        BlockerKind::BusinessMeter,
        BlockerKind::PrepaymentMeter,
        BlockerKind::UnsupportedMeter,
        BlockerKind::GenericError,
    ];

    pub fn scope(self) -> BlockerScope {
        match self {
            BlockerKind::AlreadyCustomer
            | BlockerKind::BusinessMeter
            | BlockerKind::PrepaymentMeter
            | BlockerKind::UnsupportedMeter => BlockerScope::Address,
            BlockerKind::Captcha
            | BlockerKind::AccessDenied
            | BlockerKind::RateLimited
            | BlockerKind::NetworkError
            | BlockerKind::GenericError => BlockerScope::Session,
        }
    }

    /// Built-in phrases, lower-case.
    pub fn phrases(self) -> &'static [&'static str] {
        match self {
            BlockerKind::Captcha => &["captcha", "verify you are human", "are you a robot"],
            BlockerKind::AccessDenied => &["access denied", "you have been blocked"],
            BlockerKind::RateLimited => &["too many requests", "unusual traffic"],
            BlockerKind::NetworkError => &["network error", "err_connection", "site can't be reached"],
            BlockerKind::AlreadyCustomer => &[
                "already supply this property",
                "already supply",
                "existing customer",
            ],
            BlockerKind::BusinessMeter => &[
                "business meter",
                "commercial meter",
                "business account",
                "looks like a business",
            ],
            BlockerKind::PrepaymentMeter => &["prepayment", "pay as you go"],
            BlockerKind::UnsupportedMeter => &[
                "can't give you a quote",
                "unable to quote",
                "meter isn't supported",
            ],
            BlockerKind::GenericError => &["something went wrong"],
        }
    }
}

impl fmt::Display for BlockerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockerKind::Captcha => "captcha",
            BlockerKind::AccessDenied => "access_denied",
            BlockerKind::RateLimited => "rate_limited",
            BlockerKind::NetworkError => "network_error",
            BlockerKind::AlreadyCustomer => "already_customer",
            BlockerKind::BusinessMeter => "business_meter",
            BlockerKind::PrepaymentMeter => "prepayment_meter",
            BlockerKind::UnsupportedMeter => "unsupported_meter",
            BlockerKind::GenericError => "generic_error",
        };
        f.write_str(s)
    }
}

/// Classify lower-cased page text with the built-in table only.
pub fn classify(lower_text: &str) -> Option<BlockerKind> {
    BlockerKind::PRIORITY
        .into_iter()
        .find(|kind| kind.phrases().iter().any(|p| lower_text.contains(p)))
}

/// Built-in table plus a supplier's own phrases.
#[derive(Debug, Clone, Default)]
pub struct BlockerClassifier {
    extra: HashMap<BlockerKind, Vec<String>>,
}

impl BlockerClassifier {
    pub fn new(extra: &HashMap<BlockerKind, Vec<String>>) -> Self {
        let extra = extra
            .iter()
            .map(|(kind, phrases)| {
                let lowered = phrases
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect();
                (*kind, lowered)
            })
            .collect();
        Self { extra }
    }

    /// `None` is the normal case: nothing is in the way.
    pub fn classify(&self, lower_text: &str) -> Option<BlockerKind> {
        BlockerKind::PRIORITY.into_iter().find(|kind| {
            kind.phrases().iter().any(|p| lower_text.contains(p))
                || self
                    .extra
                    .get(kind)
                    .is_some_and(|ps| ps.iter().any(|p| lower_text.contains(p.as_str())))
        })
    }
}
