//! Readiness gating and automatic re-runs.

use std::sync::Mutex;

use serde_json::Value;
use tether_engine::{BeforeOutcome, Engine, Options, Plugin, PluginHooks, StatePatch};
use tracing::debug;

/// Whether a dependency list changed: different length or any element unequal.
pub fn deps_changed(previous: &[Value], next: &[Value]) -> bool {
  previous.len() != next.len() || previous.iter().zip(next).any(|(a, b)| a != b)
}

/// What the previous update saw.
struct Seen {
  ready: bool,
  refresh_deps: Vec<Value>,
}

/// Stops runs while not ready, runs when `ready` turns on and refreshes when
/// `refresh_deps` change.
///
/// Changes are detected between updates; the values present when the request
/// is built are only recorded.
#[derive(Default)]
pub struct AutoRunPlugin {
  seen: Mutex<Option<Seen>>,
}

impl AutoRunPlugin {
  pub fn new() -> Self {
    Self::default()
  }
}

struct AutoRunHooks {
  ready: bool,
}

impl<D, P> PluginHooks<D, P> for AutoRunHooks {
  fn on_before(&self, _params: &P) -> Option<BeforeOutcome<D, P>> {
    (!self.ready).then(BeforeOutcome::stop)
  }
}

impl<D, P> Plugin<D, P> for AutoRunPlugin
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  fn name(&self) -> &'static str {
    "auto_run"
  }

  fn on_init(&self, options: &Options<D, P>) -> StatePatch<D, P> {
    StatePatch::new().loading(!options.manual && options.ready)
  }

  fn hooks(&self, _engine: &Engine<D, P>, options: &Options<D, P>) -> Box<dyn PluginHooks<D, P>> {
    Box::new(AutoRunHooks {
      ready: options.ready,
    })
  }

  fn on_update(&self, engine: &Engine<D, P>, options: &Options<D, P>) {
    let previous = self
      .seen
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .replace(Seen {
        ready: options.ready,
        refresh_deps: options.refresh_deps.clone(),
      });
    let Some(previous) = previous else {
      return;
    };

    let mut auto_ran = false;
    if previous.ready != options.ready && !options.manual && options.ready {
      debug!("ready turned on; running with default params");
      auto_ran = true;
      engine.run(options.default_params.clone().unwrap_or_default());
    }

    if !auto_ran && !options.manual && deps_changed(&previous.refresh_deps, &options.refresh_deps) {
      debug!("refresh deps changed");
      match &options.refresh_deps_action {
        Some(action) => action(),
        None => engine.refresh(),
      }
    }
  }
}
