//! Scenario replay for `tether simulate`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use serde_json::{Value, json};
use tether_config::{ScenarioDef, ServiceDef, StepAction};
use tether_engine::{Service, ServiceError, WeakEngine};
use tether_request::{JsonParams, Request, SharedCache, options_from_config};
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Data = Value;

/// Everything observed while replaying a scenario.
pub struct Report {
  pub scenario: String,
  pub service_calls: u32,
  pub interrupted: bool,
  pub timeline: Vec<Value>,
}

impl Report {
  pub fn to_json(&self) -> Value {
    json!({
      "scenario": self.scenario,
      "service_calls": self.service_calls,
      "interrupted": self.interrupted,
      "timeline": self.timeline,
    })
  }
}

/// Shared, time-stamped event log.
#[derive(Clone)]
struct Timeline {
  start: Instant,
  events: Arc<Mutex<Vec<Value>>>,
}

impl Timeline {
  fn new() -> Self {
    Self {
      start: Instant::now(),
      events: Arc::default(),
    }
  }

  fn elapsed_ms(&self) -> u64 {
    self.start.elapsed().as_millis() as u64
  }

  fn record(&self, mut event: Value) {
    event["at_ms"] = json!(self.elapsed_ms());
    self
      .events
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(event);
  }

  fn into_events(self) -> Vec<Value> {
    std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
  }
}

/// A service that answers after a fixed latency and fails on chosen calls.
fn simulated_service(
  def: &ServiceDef,
  calls: Arc<AtomicU32>,
) -> impl Service<Data, JsonParams> + 'static {
  let latency = Duration::from_millis(def.latency_ms);
  let fail_on_calls = def.fail_on_calls.clone();
  move |params: JsonParams| {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    let fails = fail_on_calls.contains(&call);
    async move {
      debug!(call, ?params, "simulated service called");
      sleep(latency).await;
      if fails {
        Err(ServiceError::msg(format!("simulated failure on call {call}")))
      } else {
        Ok(json!({ "call": call, "params": params }))
      }
    }
  }
}

/// Replay `scenario`, then keep observing for `settle_ms`.
pub async fn run(scenario: &ScenarioDef, settle_ms: u64, cancel: CancellationToken) -> Report {
  let timeline = Timeline::new();
  let calls = Arc::new(AtomicU32::new(0));
  let cache: SharedCache<Data, JsonParams> = SharedCache::new();

  let mut requests: HashMap<&str, Request<Data, JsonParams>> = HashMap::new();
  for instance in &scenario.instances {
    let engine: Arc<OnceLock<WeakEngine<Data, JsonParams>>> = Arc::default();
    let observer = engine.clone();
    let recorder = timeline.clone();
    let instance_id = instance.instance_id.clone();

    let request = Request::builder(simulated_service(&scenario.service, calls.clone()))
      .options(options_from_config(&instance.config))
      .cache(cache.clone())
      .subscriber(move || {
        if let Some(engine) = observer.get().and_then(WeakEngine::upgrade) {
          let state = engine.state();
          recorder.record(json!({
            "instance_id": instance_id,
            "event": "state",
            "loading": state.loading,
            "data": state.data,
            "error": state.error.map(|e| e.to_string()),
            "params": state.params.unwrap_or_default(),
          }));
        }
      })
      .build();
    let _ = engine.set(request.engine().downgrade());

    requests.insert(instance.instance_id.as_str(), request);
  }

  let replay = async {
    for step in scenario.ordered_steps() {
      sleep_until(timeline.start + Duration::from_millis(step.at_ms)).await;
      let Some(request) = requests.get(step.instance_id.as_str()) else {
        continue;
      };
      info!(
        at_ms = step.at_ms,
        instance = %step.instance_id,
        action = action_name(&step.action),
        "step"
      );
      timeline.record(json!({
        "instance_id": step.instance_id,
        "event": format!("step:{}", action_name(&step.action)),
      }));
      apply(request, &step.action);
    }
    sleep(Duration::from_millis(settle_ms)).await;
  };

  let interrupted = tokio::select! {
    () = replay => false,
    () = cancel.cancelled() => true,
  };

  let report = Report {
    scenario: scenario.name.clone(),
    service_calls: calls.load(Ordering::SeqCst),
    interrupted,
    timeline: timeline.into_events(),
  };

  for request in requests.values() {
    request.unmount();
  }
  report
}

fn apply(request: &Request<Data, JsonParams>, action: &StepAction) {
  match action {
    StepAction::Mount => request.mount(),
    StepAction::Unmount => request.unmount(),
    StepAction::Run { params } => request.run(params.clone()),
    StepAction::Refresh => request.refresh(),
    StepAction::Cancel => request.cancel(),
    StepAction::Mutate { data } => request.mutate(data.clone()),
    StepAction::Update { config } => request.update(options_from_config(config)),
  }
}

fn action_name(action: &StepAction) -> &'static str {
  match action {
    StepAction::Mount => "mount",
    StepAction::Unmount => "unmount",
    StepAction::Run { .. } => "run",
    StepAction::Refresh => "refresh",
    StepAction::Cancel => "cancel",
    StepAction::Mutate { .. } => "mutate",
    StepAction::Update { .. } => "update",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCENARIO: &str = r#"{
    "name": "dedup",
    "service": { "latency_ms": 100, "fail_on_calls": [2] },
    "instances": [
      { "instance_id": "a", "config": { "cache_key": "k" } },
      { "instance_id": "b", "config": { "cache_key": "k" } },
      { "instance_id": "c", "config": { "manual": true } }
    ],
    "steps": [
      { "at_ms": 0, "instance_id": "a", "action": "mount" },
      { "at_ms": 10, "instance_id": "b", "action": "mount" },
      { "at_ms": 200, "instance_id": "c", "action": "run", "params": [5] }
    ]
  }"#;

  fn events_for<'a>(report: &'a Report, instance: &str) -> Vec<&'a Value> {
    report
      .timeline
      .iter()
      .filter(|e| e["instance_id"] == instance && e["event"] == "state")
      .collect()
  }

  #[tokio::test(start_paused = true)]
  async fn test_replay_shares_request_and_records_failures() {
    let scenario = ScenarioDef::from_json_str(SCENARIO).unwrap();

    let report = run(&scenario, 500, CancellationToken::new()).await;

    assert!(!report.interrupted);
    assert_eq!(report.service_calls, 2);

    let b = events_for(&report, "b");
    let last = b.last().unwrap();
    assert_eq!(last["data"]["call"], 1);
    assert_eq!(last["loading"], false);

    let c = events_for(&report, "c");
    let last = c.last().unwrap();
    assert_eq!(last["error"], "simulated failure on call 2");
    assert_eq!(last["params"], json!([5]));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_replay_is_interrupted() {
    let scenario = ScenarioDef::from_json_str(SCENARIO).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = run(&scenario, 500, cancel).await;

    assert!(report.interrupted);
    assert_eq!(report.scenario, "dedup");
  }
}
