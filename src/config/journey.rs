use scout_browser::{Condition, Target};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_poll_ms() -> u64 {
    500
}

fn default_details_scope() -> String {
    "body".to_string()
}

/// The steps of a quote journey, from postcode entry to the tariff details view.
#[derive(Debug, Clone, Deserialize)]
pub struct JourneyConfig {
    pub postcode: PostcodeStep,

    pub address: AddressStep,

    /// Fuel and usage selection.
    #[serde(default)]
    pub service: StepConfig,

    /// Continue/payment pages up to the tariff listing.
    #[serde(default)]
    pub proceed: StepConfig,

    /// Open the tariff card and reveal its details.
    #[serde(default)]
    pub tariff: StepConfig,

    /// Default milestone timeout for every step.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Interval between milestone/blocker checks.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Overlays (cookie banners, modals) clicked away before every step.
    #[serde(default)]
    pub dismiss: Vec<Target>,

    /// Selector whose text is handed to extraction.
    #[serde(default = "default_details_scope")]
    pub details_scope: String,
}

impl JourneyConfig {
    pub fn timeout_for(&self, step: &StepConfig) -> u64 {
        step.timeout_ms.unwrap_or(self.timeout_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.postcode.input.is_empty() {
            return Err("journey.postcode.input needs a selector or text".into());
        }
        if self.address.select.is_empty() {
            return Err("journey.address.select needs a selector or text".into());
        }
        if self.poll_ms == 0 {
            return Err("journey.poll_ms must be at least 1".into());
        }
        let steps = [
            ("postcode", &self.postcode.step),
            ("address", &self.address.step),
            ("service", &self.service),
            ("proceed", &self.proceed),
            ("tariff", &self.tariff),
        ];
        for (name, step) in steps {
            for action in &step.actions {
                if action.target().is_some_and(Target::is_empty) {
                    return Err(format!(
                        "journey.{}: {} needs a selector or text",
                        name,
                        action.name()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A single step: actions to perform, then a milestone to wait for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub actions: Vec<StepAction>,

    /// Page state that proves the step worked. Without one the step is
    /// done once its actions ran and no blocker is showing.
    pub milestone: Option<Condition>,

    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostcodeStep {
    /// The postcode input.
    pub input: Target,

    #[serde(flatten)]
    pub step: StepConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressStep {
    /// The address `<select>`.
    pub select: Target,

    #[serde(flatten)]
    pub step: StepConfig,
}

/// An action inside a step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Click an element, waiting for it to appear.
    Click(ClickAction),
    /// Click an element if it is there right now.
    TryClick(Target),
    Fill(FillAction),
    PressKey(PressKeyAction),
    Wait(WaitAction),
    /// Try every `journey.dismiss` target.
    Dismiss,
}

impl StepAction {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click(_) => "click",
            Self::TryClick(_) => "try_click",
            Self::Fill(_) => "fill",
            Self::PressKey(_) => "press_key",
            Self::Wait(_) => "wait",
            Self::Dismiss => "dismiss",
        }
    }

    fn target(&self) -> Option<&Target> {
        match self {
            Self::Click(a) => Some(&a.target),
            Self::TryClick(t) => Some(t),
            Self::Fill(a) => Some(&a.target),
            Self::PressKey(_) | Self::Wait(_) | Self::Dismiss => None,
        }
    }
}

const ACTION_NAMES: &[&str] = &["click", "try_click", "fill", "press_key", "wait", "dismiss"];

impl<'de> Deserialize<'de> for StepAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StepActionVisitor)
    }
}

struct StepActionVisitor;

impl<'de> Visitor<'de> for StepActionVisitor {
    type Value = StepAction;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a step action (\"dismiss\", or a map with a single key)")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match value {
            "dismiss" => Ok(StepAction::Dismiss),
            other => Err(de::Error::unknown_variant(other, &["dismiss"])),
        }
    }

    fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let key: String = map
            .next_key()?
            .ok_or_else(|| de::Error::custom("expected action type key"))?;

        let action = match key.as_str() {
            "click" => StepAction::Click(map.next_value()?),
            "try_click" => StepAction::TryClick(map.next_value()?),
            "fill" => StepAction::Fill(map.next_value()?),
            "press_key" => StepAction::PressKey(map.next_value()?),
            "wait" => StepAction::Wait(map.next_value()?),
            "dismiss" => {
                let _: serde_yaml::Value = map.next_value()?;
                StepAction::Dismiss
            }
            other => return Err(de::Error::unknown_variant(other, ACTION_NAMES)),
        };

        Ok(action)
    }
}

// --- Action payloads ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClickAction {
    #[serde(flatten)]
    pub target: Target,

    /// How long to wait for the element. Defaults to the step timeout.
    pub timeout_ms: Option<u64>,

    /// A missing element means the current address cannot be quoted.
    #[serde(default)]
    pub or_next_address: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FillAction {
    #[serde(flatten)]
    pub target: Target,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PressKeyAction {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaitAction {
    pub ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_actions() {
        let yaml = r##"
actions:
  - dismiss
  - click:
      text: "Choose this address"
      or_next_address: true
  - try_click:
      selector: "#onetrust-accept-btn-handler"
  - fill:
      selector: "input[type=email]"
      value: "quotes@example.com"
  - press_key:
      key: "Enter"
  - wait:
      ms: 1500
milestone:
  text_contains: "What fuel do you need?"
timeout_ms: 15000
"##;
        let step: StepConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.actions.len(), 6);
        assert_eq!(step.actions[0], StepAction::Dismiss);

        if let StepAction::Click(a) = &step.actions[1] {
            assert_eq!(a.target, Target::text("Choose this address"));
            assert!(a.or_next_address);
            assert_eq!(a.timeout_ms, None);
        } else {
            panic!("Expected Click action");
        }

        if let StepAction::Fill(a) = &step.actions[3] {
            assert_eq!(a.target, Target::selector("input[type=email]"));
            assert_eq!(a.value, "quotes@example.com");
        } else {
            panic!("Expected Fill action");
        }

        assert_eq!(
            step.milestone,
            Some(Condition::TextContains("What fuel do you need?".into()))
        );
        assert_eq!(step.timeout_ms, Some(15000));
    }

    #[test]
    fn test_unknown_action_rejected() {
        let yaml = r#"
actions:
  - hover:
      text: "Menu"
"#;
        let result: Result<StepConfig, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_flattened_postcode_step() {
        let yaml = r##"
input:
  selector: "input[name=postcode]"
actions:
  - press_key:
      key: "Enter"
milestone:
  selector: "#address-select"
"##;
        let step: PostcodeStep = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.input, Target::selector("input[name=postcode]"));
        assert_eq!(step.step.actions.len(), 1);
        assert_eq!(
            step.step.milestone,
            Some(Condition::Selector("#address-select".into()))
        );
    }
}
