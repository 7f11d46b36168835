use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// A page condition a journey waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// An element matching the selector exists.
    Selector(String),
    /// Body text contains the phrase (case-insensitive).
    TextContains(String),
    /// Body text contains at least one of the phrases (case-insensitive).
    TextAny(Vec<String>),
    /// Current URL contains the fragment.
    UrlContains(String),
}

impl Condition {
    /// Evaluate a text condition against already lower-cased page text.
    ///
    /// Returns `None` for conditions that need the live page.
    pub fn matches_text(&self, lower_text: &str) -> Option<bool> {
        match self {
            Condition::TextContains(phrase) => Some(lower_text.contains(&phrase.to_lowercase())),
            Condition::TextAny(phrases) => Some(
                phrases
                    .iter()
                    .any(|p| lower_text.contains(&p.to_lowercase())),
            ),
            Condition::Selector(_) | Condition::UrlContains(_) => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Selector(s) => write!(f, "selector '{}'", s),
            Condition::TextContains(t) => write!(f, "text '{}'", t),
            Condition::TextAny(ts) => write!(f, "any text of {:?}", ts),
            Condition::UrlContains(u) => write!(f, "url containing '{}'", u),
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(ConditionVisitor)
    }
}

struct ConditionVisitor;

const CONDITION_KEYS: &[&str] = &["selector", "text_contains", "text_any", "url_contains"];

impl<'de> Visitor<'de> for ConditionVisitor {
    type Value = Condition;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(
            "a condition map with a single key (selector, text_contains, text_any or url_contains)",
        )
    }

    fn visit_map<M>(self, mut map: M) -> std::result::Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected condition type key"))?;

        let condition = match key.as_str() {
            "selector" => Condition::Selector(map.next_value()?),
            "text_contains" => Condition::TextContains(map.next_value()?),
            "text_any" => {
                let phrases: Vec<String> = map.next_value()?;
                if phrases.is_empty() {
                    return Err(de::Error::custom("text_any needs at least one phrase"));
                }
                Condition::TextAny(phrases)
            }
            "url_contains" => Condition::UrlContains(map.next_value()?),
            other => return Err(de::Error::unknown_variant(other, CONDITION_KEYS)),
        };

        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom("a condition has exactly one key"));
        }
        Ok(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conditions() {
        let yaml = r##"
- selector: "#address-select"
- text_contains: "Choose the best tariff"
- text_any: ["simply fixed", "tariff details"]
- url_contains: "/results"
"##;
        let conditions: Vec<Condition> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            conditions,
            vec![
                Condition::Selector("#address-select".into()),
                Condition::TextContains("Choose the best tariff".into()),
                Condition::TextAny(vec!["simply fixed".into(), "tariff details".into()]),
                Condition::UrlContains("/results".into()),
            ]
        );
    }

    #[test]
    fn test_unknown_condition_rejected() {
        let result: Result<Condition, _> = serde_yaml::from_str("title_is: Quote");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_text_any_rejected() {
        let result: Result<Condition, _> = serde_yaml::from_str("text_any: []");
        assert!(result.is_err());
    }

    #[test]
    fn test_matches_text_is_case_insensitive() {
        let cond = Condition::TextContains("Choose The Best Tariff".into());
        assert_eq!(cond.matches_text("please choose the best tariff"), Some(true));
        assert_eq!(cond.matches_text("enter your postcode"), Some(false));

        let any = Condition::TextAny(vec!["Fixed".into(), "Tracker".into()]);
        assert_eq!(any.matches_text("price tracker v2"), Some(true));

        assert_eq!(Condition::Selector("#x".into()).matches_text("x"), None);
    }
}
