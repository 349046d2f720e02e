//! Best-effort detection of which services a source project uses.
//!
//! Project properties are free-form, so detection is a heuristic over
//! property names and values. The outcome is informational only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use crate::devops::types::ProjectProperty;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Enabled,
    Disabled,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceServices {
    pub boards: ServiceState,
    pub repos: ServiceState,
    pub pipelines: ServiceState,
    pub test_plans: ServiceState,
    pub artifacts: ServiceState,
}

type Assign = fn(&mut SourceServices, ServiceState);

struct ServicePattern {
    name_pattern: Regex,
    assign: Assign,
}

static SERVICE_PATTERNS: LazyLock<Vec<ServicePattern>> = LazyLock::new(|| {
    let table: [(&str, Assign); 5] = [
        (r"(?i)(boards|work[-._]?items?|agile)", |s, v| s.boards = v),
        (r"(?i)(repos|version[-._]?control|\bcode\b)", |s, v| s.repos = v),
        (r"(?i)(pipelines|\bbuild\b|release)", |s, v| s.pipelines = v),
        (r"(?i)(test[-._]?plans?|test[-._]?management)", |s, v| s.test_plans = v),
        (r"(?i)(artifacts|\bfeeds?\b|packag)", |s, v| s.artifacts = v),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, assign)| {
            Regex::new(pattern).ok().map(|name_pattern| ServicePattern { name_pattern, assign })
        })
        .collect()
});

/// Interpret a property value as an on/off flag.
fn interpret(value: &Value) -> ServiceState {
    match value {
        Value::Bool(true) => ServiceState::Enabled,
        Value::Bool(false) => ServiceState::Disabled,
        Value::Number(n) => match n.as_i64() {
            Some(0) => ServiceState::Disabled,
            Some(1) => ServiceState::Enabled,
            _ => ServiceState::Unknown,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "enabled" | "true" | "1" | "on" => ServiceState::Enabled,
            "disabled" | "false" | "0" | "off" => ServiceState::Disabled,
            _ => ServiceState::Unknown,
        },
        _ => ServiceState::Unknown,
    }
}

/// Classify source services from project properties.
///
/// The first property with a recognizable value wins for each service.
pub fn classify_services(properties: &[ProjectProperty]) -> SourceServices {
    let mut services = SourceServices::default();
    let mut decided = vec![false; SERVICE_PATTERNS.len()];

    for property in properties {
        let state = interpret(&property.value);
        if state == ServiceState::Unknown {
            continue;
        }
        for (index, pattern) in SERVICE_PATTERNS.iter().enumerate() {
            if !decided[index] && pattern.name_pattern.is_match(&property.name) {
                (pattern.assign)(&mut services, state);
                decided[index] = true;
            }
        }
    }

    services
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn property(name: &str, value: Value) -> ProjectProperty {
        ProjectProperty {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn no_evidence_is_unknown() {
        assert_eq!(classify_services(&[]), SourceServices::default());
        let services = classify_services(&[property("System.Process Template", json!("Agile"))]);
        assert_eq!(services.boards, ServiceState::Unknown);
    }

    #[test]
    fn recognizes_names_and_values() {
        let services = classify_services(&[
            property("ms.vss-work.BOARDS.enabled", json!("Enabled")),
            property("ms.vss-code.repos.state", json!(true)),
            property("ms.vss-build.Pipelines", json!("off")),
            property("ms.vss-test.TestPlans", json!(0)),
            property("ms.feed.Artifacts", json!("1")),
        ]);

        assert_eq!(services.boards, ServiceState::Enabled);
        assert_eq!(services.repos, ServiceState::Enabled);
        assert_eq!(services.pipelines, ServiceState::Disabled);
        assert_eq!(services.test_plans, ServiceState::Disabled);
        assert_eq!(services.artifacts, ServiceState::Enabled);
    }

    #[test]
    fn first_recognizable_value_wins() {
        let services = classify_services(&[
            property("boards.flag", json!("maybe")),
            property("boards.enabled", json!("disabled")),
            property("boards.legacy", json!("enabled")),
        ]);
        assert_eq!(services.boards, ServiceState::Disabled);
    }
}
