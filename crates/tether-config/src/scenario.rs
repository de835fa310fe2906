//! Timed scenarios for the `tether simulate` command.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "shared cache",
//!   "service": { "latency_ms": 100 },
//!   "instances": [
//!     { "instance_id": "a", "config": { "cache_key": "users" } },
//!     { "instance_id": "b", "config": { "cache_key": "users" } }
//!   ],
//!   "steps": [
//!     { "at_ms": 0, "instance_id": "a", "action": "mount" },
//!     { "at_ms": 10, "instance_id": "b", "action": "mount" },
//!     { "at_ms": 500, "instance_id": "a", "action": "mutate", "data": "local edit" }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::request::RequestConfig;

/// A scripted run of one or more request instances over a simulated service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
  pub name: String,
  #[serde(default)]
  pub service: ServiceDef,
  pub instances: Vec<InstanceDef>,
  #[serde(default)]
  pub steps: Vec<StepDef>,
}

/// Behaviour of the simulated service shared by every instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDef {
  /// Time each call takes to settle.
  #[serde(default = "default_latency_ms")]
  pub latency_ms: u64,
  /// 1-based call numbers that fail instead of succeeding.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub fail_on_calls: Vec<u32>,
}

fn default_latency_ms() -> u64 {
  100
}

impl Default for ServiceDef {
  fn default() -> Self {
    Self {
      latency_ms: default_latency_ms(),
      fail_on_calls: Vec::new(),
    }
  }
}

/// One request instance in a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDef {
  pub instance_id: String,
  #[serde(default)]
  pub config: RequestConfig,
}

/// An action applied to an instance at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  /// Offset from the start of the scenario.
  pub at_ms: u64,
  pub instance_id: String,
  #[serde(flatten)]
  pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
  Mount,
  Unmount,
  Run {
    #[serde(default)]
    params: Vec<serde_json::Value>,
  },
  Refresh,
  Cancel,
  Mutate {
    data: serde_json::Value,
  },
  /// Replace the instance's configuration (re-render with new options).
  Update {
    config: RequestConfig,
  },
}

impl ScenarioDef {
  /// Parse and validate a scenario from JSON.
  pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
    let scenario: Self = serde_json::from_str(s)?;
    scenario.validate()?;
    Ok(scenario)
  }

  /// Check that instance ids are unique and every step targets a known instance.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut ids = HashSet::new();
    for instance in &self.instances {
      if !ids.insert(instance.instance_id.as_str()) {
        return Err(ConfigError::DuplicateInstance {
          instance_id: instance.instance_id.clone(),
        });
      }
    }

    for step in &self.steps {
      if !ids.contains(step.instance_id.as_str()) {
        return Err(ConfigError::UnknownInstance {
          instance_id: step.instance_id.clone(),
          at_ms: step.at_ms,
        });
      }
    }

    Ok(())
  }

  /// Steps ordered by time, keeping declaration order for equal offsets.
  pub fn ordered_steps(&self) -> Vec<&StepDef> {
    let mut steps: Vec<&StepDef> = self.steps.iter().collect();
    steps.sort_by_key(|step| step.at_ms);
    steps
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const SCENARIO: &str = r#"{
    "name": "shared cache",
    "service": { "latency_ms": 50, "fail_on_calls": [2] },
    "instances": [
      { "instance_id": "a", "config": { "cache_key": "users" } },
      { "instance_id": "b" }
    ],
    "steps": [
      { "at_ms": 30, "instance_id": "b", "action": "run", "params": [1] },
      { "at_ms": 0, "instance_id": "a", "action": "mount" },
      { "at_ms": 30, "instance_id": "a", "action": "mutate", "data": {"n": 1} },
      { "at_ms": 90, "instance_id": "a", "action": "update", "config": { "ready": false } }
    ]
  }"#;

  #[test]
  fn test_parse_scenario() {
    let scenario = ScenarioDef::from_json_str(SCENARIO).unwrap();
    assert_eq!(scenario.name, "shared cache");
    assert_eq!(scenario.service.latency_ms, 50);
    assert_eq!(scenario.service.fail_on_calls, vec![2]);
    assert_eq!(scenario.instances[1].config, RequestConfig::default());
    assert_eq!(
      scenario.steps[0].action,
      StepAction::Run {
        params: vec![json!(1)]
      }
    );
    assert_eq!(
      scenario.steps[2].action,
      StepAction::Mutate {
        data: json!({"n": 1})
      }
    );
    match &scenario.steps[3].action {
      StepAction::Update { config } => assert!(!config.ready),
      other => panic!("unexpected action {:?}", other),
    }
  }

  #[test]
  fn test_ordered_steps_is_stable() {
    let scenario = ScenarioDef::from_json_str(SCENARIO).unwrap();
    let order: Vec<(u64, &str)> = scenario
      .ordered_steps()
      .iter()
      .map(|s| (s.at_ms, s.instance_id.as_str()))
      .collect();
    assert_eq!(order, vec![(0, "a"), (30, "b"), (30, "a"), (90, "a")]);
  }

  #[test]
  fn test_unknown_instance_rejected() {
    let err = ScenarioDef::from_json_str(
      r#"{
        "name": "bad",
        "instances": [{ "instance_id": "a" }],
        "steps": [{ "at_ms": 5, "instance_id": "z", "action": "cancel" }]
      }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::UnknownInstance { ref instance_id, at_ms: 5 } if instance_id == "z"));
  }

  #[test]
  fn test_duplicate_instance_rejected() {
    let err = ScenarioDef::from_json_str(
      r#"{
        "name": "bad",
        "instances": [{ "instance_id": "a" }, { "instance_id": "a" }]
      }"#,
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateInstance { .. }));
  }
}
