use super::TariffQuote;
use crate::config::RuleConfig;
use crate::Result;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fmt;
use std::ops::RangeInclusive;

// Capture group 1 is always the value.
const NUM: &str = r"(\d+(?:\.\d+)?)";

pub const ELECTRICITY_HEADERS: &[&str] = &[
    "electricity tariff costs",
    "electricity supply",
    "electricity rates",
    "electricity",
];

pub const GAS_HEADERS: &[&str] = &["gas tariff costs", "gas supply", "gas rates", "gas"];

pub const SECTION_TERMINATORS: &[&str] = &["how we worked", "all rates"];

pub const TARIFF_NAME_PATTERNS: &[&str] = &[
    r"(Fixed Tariff\s+[A-Za-z]+\d+\s*v?\d*)",
    r"(Fixed Tariff\s+[A-Za-z]+\s+\d{4}\s*v?\d*)",
    r"(Simply Fixed\s*\w+\d+v?\d*)",
    r"(Next Fixed \d+m v\d+)",
    r"(Next Online v\d+)",
    r"(Next Flex[^\n]*)",
    r"((?:Fixed|Variable|Flex|Standard)\s+Tariff[^\n£]*?)(?:\s*(?:Estimated|Fixed energy|£))",
    r"(Standard Variable)",
    r"(Price Tracker)",
];

/// Group 1 is the amount, optional group 2 a "per fuel" qualifier.
pub const EXIT_FEE_PATTERNS: &[&str] = &[
    r"exit\s*fees?[:\s]*£\s*(\d+(?:\.\d+)?)\s*(per\s*fuel)?",
    r"£(\d+(?:\.\d+)?)\s*(per\s*fuel)?\s*exit\s*fees?",
    r"exit\s*fees?[:\s]+(\d+(?:\.\d+)?)\s*(per\s*fuel)?",
];

pub const NO_EXIT_FEE: &str = r"no\s*exit\s*fees?";

pub const CONTRACT_PATTERNS: &[&str] = &[
    r"(\d+)[\s-]*months?\b",
    r"fixed\s+(\d+)\s*m\b",
    r"\b(\d+)m\s+v\d+",
];

/// Which part of a fuel section a rule fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    UnitRate,
    DayRate,
    NightRate,
    StandingCharge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuel {
    Electricity,
    Gas,
}

impl fmt::Display for Fuel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fuel::Electricity => f.write_str("electricity"),
            Fuel::Gas => f.write_str("gas"),
        }
    }
}

/// A compiled `(pattern, field)` rule.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub pattern: Regex,
    pub field: Field,
}

impl FieldRule {
    pub fn new(pattern: &str, field: Field) -> Result<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            field,
        })
    }

    /// The captured number, if the rule matches.
    pub fn apply(&self, section: &str) -> Option<f64> {
        self.pattern
            .captures(section)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }
}

/// Case-insensitive, `.` spans lines.
pub fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()?)
}

pub fn compile_all(patterns: &[String], defaults: &[&str]) -> Result<Vec<Regex>> {
    if patterns.is_empty() {
        defaults.iter().map(|p| compile(p)).collect()
    } else {
        patterns.iter().map(|p| compile(p)).collect()
    }
}

pub fn default_rules(fuel: Fuel) -> Vec<(String, Field)> {
    let mut rules = Vec::new();
    if fuel == Fuel::Electricity {
        rules.push((
            format!(r"day\s*(?:time\s*)?(?:unit\s*)?rate[:\s]*{}\s*p", NUM),
            Field::DayRate,
        ));
        rules.push((
            format!(r"night\s*(?:time\s*)?(?:unit\s*)?rate[:\s]*{}\s*p", NUM),
            Field::NightRate,
        ));
    }
    rules.push((format!(r"unit\s*rate[:\s]*{}\s*p", NUM), Field::UnitRate));
    rules.push((format!(r"{}\s*p\s*(?:per\s*)?kwh", NUM), Field::UnitRate));
    rules.push((
        format!(r"standing\s*charge[:\s]*{}\s*p", NUM),
        Field::StandingCharge,
    ));
    rules.push((format!(r"{}\s*p\s*(?:per|a)\s*day", NUM), Field::StandingCharge));
    rules
}

pub fn build_rules(fuel: Fuel, configured: &[RuleConfig]) -> Result<Vec<FieldRule>> {
    if configured.is_empty() {
        return default_rules(fuel)
            .iter()
            .map(|(p, f)| FieldRule::new(p, *f))
            .collect();
    }
    configured
        .iter()
        .map(|r| {
            if fuel == Fuel::Gas && matches!(r.field, Field::DayRate | Field::NightRate) {
                return Err(crate::Error::Config(format!(
                    "gas rule '{}': day/night rates are electricity-only",
                    r.pattern
                )));
            }
            FieldRule::new(&r.pattern, r.field)
        })
        .collect()
}

/// Write `value` into the quote field named by `(fuel, field)` unless set.
pub fn set_once(quote: &mut TariffQuote, fuel: Fuel, field: Field, value: f64) {
    let slot = match (fuel, field) {
        (Fuel::Electricity, Field::UnitRate) => &mut quote.elec_unit_rate_p,
        (Fuel::Electricity, Field::DayRate) => &mut quote.elec_day_rate_p,
        (Fuel::Electricity, Field::NightRate) => &mut quote.elec_night_rate_p,
        (Fuel::Electricity, Field::StandingCharge) => &mut quote.elec_standing_p,
        (Fuel::Gas, Field::UnitRate) => &mut quote.gas_unit_rate_p,
        (Fuel::Gas, Field::StandingCharge) => &mut quote.gas_standing_p,
        (Fuel::Gas, Field::DayRate | Field::NightRate) => return,
    };
    if slot.is_none() {
        *slot = Some(value);
    }
}

const ELEC_RATE: RangeInclusive<f64> = 10.0..=60.0;
const GAS_RATE: RangeInclusive<f64> = 3.0..=20.0;
const STANDING: RangeInclusive<f64> = 20.0..=80.0;

/// Out-of-range fields, as human-readable warnings.
pub fn plausibility_warnings(quote: &TariffQuote) -> Vec<String> {
    let checks = [
        ("electricity unit rate", quote.elec_unit_rate_p, &ELEC_RATE),
        ("electricity day rate", quote.elec_day_rate_p, &ELEC_RATE),
        ("electricity night rate", quote.elec_night_rate_p, &ELEC_RATE),
        ("electricity standing charge", quote.elec_standing_p, &STANDING),
        ("gas unit rate", quote.gas_unit_rate_p, &GAS_RATE),
        ("gas standing charge", quote.gas_standing_p, &STANDING),
    ];

    checks
        .into_iter()
        .filter_map(|(name, value, range)| {
            let v = value?;
            (!range.contains(&v)).then(|| {
                format!(
                    "{} {:.2}p outside {}-{}p",
                    name,
                    v,
                    range.start(),
                    range.end()
                )
            })
        })
        .collect()
}
