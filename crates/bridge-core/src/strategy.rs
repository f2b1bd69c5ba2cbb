//! Notification/call-UI strategy selection
//!
//! Some device families fail silently when inflating custom notification
//! layouts, others bury call notifications unless they are maximally urgent.
//! The mapping from device profile to presentation strategy is injected
//! configuration data, not embedded logic: the table ships with the
//! application config and selection is a pure function over it.

use serde::{Deserialize, Serialize};

/// How the incoming-call surface should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationStrategy {
    /// Native call-style presentation
    Standard,
    /// Simplest supported presentation, avoiding dynamically-inflated
    /// custom layouts
    Adaptive,
    /// Maximum urgency/priority with an interruptive full-screen
    /// presentation as primary
    Aggressive,
}

/// Device identity the selection runs against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceProfile {
    pub manufacturer: String,
    pub model: String,
    pub api_level: u32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self { manufacturer: String::new(), model: String::new(), api_level: 0 }
    }
}

/// One classification rule; all populated conditions must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRule {
    /// Case-insensitive manufacturer prefix
    pub manufacturer_prefix: String,
    /// Case-insensitive model prefix, matches any model when unset
    #[serde(default)]
    pub model_prefix: Option<String>,
    #[serde(default)]
    pub min_api_level: Option<u32>,
    #[serde(default)]
    pub max_api_level: Option<u32>,
    pub strategy: NotificationStrategy,
}

impl StrategyRule {
    fn matches(&self, profile: &DeviceProfile) -> bool {
        if !starts_with_ignore_case(&profile.manufacturer, &self.manufacturer_prefix) {
            return false;
        }
        if let Some(model_prefix) = &self.model_prefix {
            if !starts_with_ignore_case(&profile.model, model_prefix) {
                return false;
            }
        }
        if let Some(min) = self.min_api_level {
            if profile.api_level < min {
                return false;
            }
        }
        if let Some(max) = self.max_api_level {
            if profile.api_level > max {
                return false;
            }
        }
        true
    }
}

/// Injected classification table; first matching rule wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyTable {
    pub rules: Vec<StrategyRule>,
}

impl StrategyTable {
    /// Select the presentation strategy for a device. Defaults to
    /// [`NotificationStrategy::Standard`] when no rule matches.
    pub fn select(&self, profile: &DeviceProfile) -> NotificationStrategy {
        self.rules
            .iter()
            .find(|rule| rule.matches(profile))
            .map(|rule| rule.strategy)
            .unwrap_or(NotificationStrategy::Standard)
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    // get() rejects a split mid-character for non-ASCII device strings.
    value
        .get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(manufacturer: &str, model: &str, api_level: u32) -> DeviceProfile {
        DeviceProfile {
            manufacturer: manufacturer.to_string(),
            model: model.to_string(),
            api_level,
        }
    }

    fn table() -> StrategyTable {
        serde_json::from_str(
            r#"{
                "rules": [
                    { "manufacturerPrefix": "acme", "modelPrefix": "budget", "strategy": "adaptive" },
                    { "manufacturerPrefix": "acme", "strategy": "aggressive" },
                    { "manufacturerPrefix": "zen", "maxApiLevel": 28, "strategy": "adaptive" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn empty_table_defaults_to_standard() {
        let table = StrategyTable::default();
        assert_eq!(table.select(&profile("Any", "Thing", 33)), NotificationStrategy::Standard);
    }

    #[test]
    fn first_matching_rule_wins() {
        let table = table();
        assert_eq!(
            table.select(&profile("Acme", "Budget-3", 33)),
            NotificationStrategy::Adaptive
        );
        assert_eq!(
            table.select(&profile("Acme", "Flagship", 33)),
            NotificationStrategy::Aggressive
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let table = table();
        assert_eq!(
            table.select(&profile("ACME", "BUDGET X", 30)),
            NotificationStrategy::Adaptive
        );
    }

    #[test]
    fn non_ascii_manufacturer_does_not_match_or_panic() {
        let table = table();
        assert_eq!(
            table.select(&profile("Ācme", "Budget", 30)),
            NotificationStrategy::Standard
        );
    }

    #[test]
    fn api_level_bounds_apply() {
        let table = table();
        assert_eq!(table.select(&profile("Zen", "m1", 28)), NotificationStrategy::Adaptive);
        assert_eq!(table.select(&profile("Zen", "m1", 29)), NotificationStrategy::Standard);
    }
}
