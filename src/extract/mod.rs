//! Tariff details from free-form page text.
//!
//! Text is split into fuel sections (from a fuel header to the next fuel
//! header or terminator) so electricity and gas figures never mix. Each
//! section runs an ordered rule list where the first match per field wins.
//! Out-of-range values are logged and kept.

pub mod rules;

use crate::config::ExtractionConfig;
use crate::Result;
use regex::Regex;
use rules::FieldRule;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use rules::{Field, Fuel};

/// One tariff as read from a supplier page. Rates are in pence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TariffQuote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tariff_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_fee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elec_unit_rate_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elec_day_rate_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elec_night_rate_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elec_standing_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_unit_rate_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_standing_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_months: Option<u32>,
}

impl TariffQuote {
    /// An economy-7 day rate counts as an electricity unit rate.
    pub fn has_elec_rate(&self) -> bool {
        self.elec_unit_rate_p.is_some() || self.elec_day_rate_p.is_some()
    }

    pub fn has_gas_rate(&self) -> bool {
        self.gas_unit_rate_p.is_some()
    }

    /// Quotes without any unit rate are extraction failures.
    pub fn has_unit_rate(&self) -> bool {
        self.has_elec_rate() || self.has_gas_rate()
    }
}

fn yes() -> bool {
    true
}

fn default_elec_only_markers() -> Vec<String> {
    vec!["electric".to_string(), "elec only".to_string()]
}

/// When a quote counts as complete rather than partial.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletenessPolicy {
    /// Gas rates are required unless the tariff is electricity-only.
    #[serde(default = "yes")]
    pub require_gas: bool,

    /// Tariff-name fragments (case-insensitive) marking electricity-only tariffs.
    #[serde(default = "default_elec_only_markers")]
    pub elec_only_markers: Vec<String>,

    /// The exit fee shown is a dual-fuel total.
    #[serde(default)]
    pub exit_fee_covers_both_fuels: bool,
}

impl Default for CompletenessPolicy {
    fn default() -> Self {
        Self {
            require_gas: true,
            elec_only_markers: default_elec_only_markers(),
            exit_fee_covers_both_fuels: false,
        }
    }
}

impl CompletenessPolicy {
    pub fn is_elec_only(&self, quote: &TariffQuote) -> bool {
        let Some(ref name) = quote.tariff_name else {
            return false;
        };
        let name = name.to_lowercase();
        self.elec_only_markers
            .iter()
            .any(|m| name.contains(&m.to_lowercase()))
    }

    /// Why a quote is partial, or `None` if it is complete.
    pub fn incomplete_reason(&self, quote: &TariffQuote) -> Option<String> {
        if quote.tariff_name.is_none() {
            return Some("missing tariff name".into());
        }
        if !quote.has_elec_rate() {
            return Some("missing electricity unit rate".into());
        }
        if quote.elec_standing_p.is_none() {
            return Some("missing electricity standing charge".into());
        }
        if self.require_gas
            && !self.is_elec_only(quote)
            && (quote.gas_unit_rate_p.is_none() || quote.gas_standing_p.is_none())
        {
            return Some("missing gas rates".into());
        }
        None
    }

    pub fn is_complete(&self, quote: &TariffQuote) -> bool {
        self.incomplete_reason(quote).is_none()
    }
}

/// Compiled extraction rules for one supplier.
#[derive(Debug, Clone)]
pub struct Extractor {
    elec_headers: Vec<String>,
    gas_headers: Vec<String>,
    terminators: Vec<String>,
    elec_rules: Vec<FieldRule>,
    gas_rules: Vec<FieldRule>,
    name_patterns: Vec<Regex>,
    exit_fee_patterns: Vec<Regex>,
    no_exit_fee: Regex,
    contract_patterns: Vec<Regex>,
}

fn lowered(configured: &[String], defaults: &[&str]) -> Vec<String> {
    if configured.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        configured.iter().map(|s| s.to_lowercase()).collect()
    }
}

impl Extractor {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            elec_headers: lowered(&config.electricity_headers, rules::ELECTRICITY_HEADERS),
            gas_headers: lowered(&config.gas_headers, rules::GAS_HEADERS),
            terminators: lowered(&config.section_terminators, rules::SECTION_TERMINATORS),
            elec_rules: rules::build_rules(Fuel::Electricity, &config.electricity_rules)?,
            gas_rules: rules::build_rules(Fuel::Gas, &config.gas_rules)?,
            name_patterns: rules::compile_all(
                &config.tariff_name_patterns,
                rules::TARIFF_NAME_PATTERNS,
            )?,
            exit_fee_patterns: rules::compile_all(
                &config.exit_fee_patterns,
                rules::EXIT_FEE_PATTERNS,
            )?,
            no_exit_fee: rules::compile(rules::NO_EXIT_FEE)?,
            contract_patterns: rules::compile_all(
                &config.contract_patterns,
                rules::CONTRACT_PATTERNS,
            )?,
        })
    }

    /// Read a quote out of page text. Never fails; missing fields stay `None`.
    pub fn extract(&self, text: &str) -> TariffQuote {
        let lower = text.to_lowercase();
        let mut quote = TariffQuote::default();

        for (fuel, rules) in [
            (Fuel::Electricity, &self.elec_rules),
            (Fuel::Gas, &self.gas_rules),
        ] {
            let Some(section) = self.section(&lower, fuel) else {
                debug!("No {} section found", fuel);
                continue;
            };
            for rule in rules {
                if let Some(value) = rule.apply(section) {
                    rules::set_once(&mut quote, fuel, rule.field, value);
                }
            }
        }

        quote.tariff_name = self.tariff_name(text);
        quote.exit_fee = self.exit_fee(text);
        quote.contract_months = self.contract_months(text);

        for warning in rules::plausibility_warnings(&quote) {
            warn!("Implausible value: {}", warning);
        }

        quote
    }

    /// The part of `lower` belonging to `fuel`, header excluded.
    ///
    /// Headers are tried in configured order and each header at every place
    /// it occurs. The first section holding a rate wins, so a heading such as
    /// "electricity and gas quote" does not hide the real sections below it.
    /// If no section holds a rate the first one found is returned.
    pub fn section<'t>(&self, lower: &'t str, fuel: Fuel) -> Option<&'t str> {
        let (own, other, rules) = match fuel {
            Fuel::Electricity => (&self.elec_headers, &self.gas_headers, &self.elec_rules),
            Fuel::Gas => (&self.gas_headers, &self.elec_headers, &self.gas_rules),
        };

        let mut first = None;
        for header in own {
            for (pos, _) in lower.match_indices(header.as_str()) {
                let section = self.section_body(&lower[pos + header.len()..], other);
                if rules.iter().any(|rule| rule.apply(section).is_some()) {
                    return Some(section);
                }
                first.get_or_insert(section);
            }
        }
        first
    }

    fn section_body<'t>(&self, rest: &'t str, other: &[String]) -> &'t str {
        let end = other
            .iter()
            .chain(self.terminators.iter())
            .filter_map(|h| rest.find(h.as_str()))
            .min()
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn tariff_name(&self, text: &str) -> Option<String> {
        self.name_patterns.iter().find_map(|pattern| {
            let raw = pattern.captures(text)?.get(1)?.as_str();
            let name = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            (name.len() > 5).then_some(name)
        })
    }

    fn exit_fee(&self, text: &str) -> Option<String> {
        let fee = self.exit_fee_patterns.iter().find_map(|pattern| {
            let caps = pattern.captures(text)?;
            let amount = caps.get(1)?.as_str();
            Some(match caps.get(2) {
                Some(_) => format!("£{} per fuel", amount),
                None => format!("£{}", amount),
            })
        });

        fee.or_else(|| self.no_exit_fee.is_match(text).then(|| "£0".to_string()))
    }

    fn contract_months(&self, text: &str) -> Option<u32> {
        self.contract_patterns.iter().find_map(|pattern| {
            pattern
                .captures(text)?
                .get(1)?
                .as_str()
                .parse()
                .ok()
                .filter(|m| *m > 0)
        })
    }
}
