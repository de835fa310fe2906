//! The request facade.

use std::sync::Arc;

use tether_engine::{
  Engine, EngineState, Options, Plugin, RunOutcome, Service, ServiceError, StatePatch, Subscriber,
};
use tether_plugins::{AutoRunPlugin, CachePlugin, SharedCache};
use tracing::debug;

/// What a consumer reads from a request.
#[derive(Debug, Clone)]
pub struct RequestResult<D, P> {
  pub loading: bool,
  pub data: Option<D>,
  pub error: Option<ServiceError>,
  /// Parameters of the latest run, or the default value before any run.
  pub params: P,
}

impl<D, P: Default> From<EngineState<D, P>> for RequestResult<D, P> {
  fn from(state: EngineState<D, P>) -> Self {
    Self {
      loading: state.loading,
      data: state.data,
      error: state.error,
      params: state.params.unwrap_or_default(),
    }
  }
}

/// Builds a [`Request`].
pub struct RequestBuilder<D, P> {
  service: Arc<dyn Service<D, P>>,
  options: Options<D, P>,
  cache: Option<SharedCache<D, P>>,
  plugins: Vec<Box<dyn Plugin<D, P>>>,
  subscriber: Option<Subscriber>,
}

impl<D, P> RequestBuilder<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  #[must_use]
  pub fn options(mut self, options: Options<D, P>) -> Self {
    self.options = options;
    self
  }

  /// Share cache state with other requests.
  ///
  /// Without one the request gets a private cache, so caching still works
  /// for its own runs but nothing is shared.
  #[must_use]
  pub fn cache(mut self, cache: SharedCache<D, P>) -> Self {
    self.cache = Some(cache);
    self
  }

  /// Add a plugin after the built-in ones.
  #[must_use]
  pub fn plugin(mut self, plugin: impl Plugin<D, P> + 'static) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  /// Called after every state change.
  #[must_use]
  pub fn subscriber(mut self, subscriber: impl Fn() + Send + Sync + 'static) -> Self {
    self.subscriber = Some(Arc::new(subscriber));
    self
  }

  pub fn build(self) -> Request<D, P> {
    let mut plugins: Vec<Box<dyn Plugin<D, P>>> = vec![
      Box::new(AutoRunPlugin::new()),
      Box::new(CachePlugin::new(self.cache.unwrap_or_default())),
    ];
    plugins.extend(self.plugins);

    let init = plugins
      .iter()
      .map(|plugin| plugin.on_init(&self.options))
      .fold(StatePatch::new(), StatePatch::merge);

    let subscriber: Subscriber = match self.subscriber {
      Some(subscriber) => subscriber,
      None => Arc::new(|| {}),
    };
    let service = self.service;
    let engine = Engine::new(
      move |params: P| service.call(params),
      self.options.clone(),
      subscriber,
      init,
    );

    let request = Request { engine, plugins };
    request.render(self.options);
    request
  }
}

/// One logical request: an engine plus its plugins.
///
/// Call [`Request::mount`] once to start it, [`Request::update`] whenever its
/// options change and [`Request::unmount`] when done.
pub struct Request<D, P> {
  engine: Engine<D, P>,
  plugins: Vec<Box<dyn Plugin<D, P>>>,
}

impl<D, P> Request<D, P>
where
  D: Clone + Send + Sync + 'static,
  P: Clone + Default + Send + Sync + 'static,
{
  pub fn builder(service: impl Service<D, P> + 'static) -> RequestBuilder<D, P> {
    RequestBuilder {
      service: Arc::new(service),
      options: Options::default(),
      cache: None,
      plugins: Vec::new(),
      subscriber: None,
    }
  }

  /// Run automatically unless manual.
  ///
  /// Uses the params seeded from cache if any, otherwise the default params.
  /// Hooks are rebuilt first so plugins torn down by an earlier unmount
  /// attach again.
  pub fn mount(&self) {
    let options = self.engine.options();
    self.render(options.as_ref().clone());
    if options.manual {
      return;
    }
    let params = self
      .engine
      .state()
      .params
      .or_else(|| options.default_params.clone())
      .unwrap_or_default();
    debug!("request mounted");
    self.engine.run(params);
  }

  /// Install new options, rebuild plugin hooks and react to changes.
  pub fn update(&self, options: Options<D, P>) {
    self.render(options);
  }

  /// Void anything in flight and release plugin resources.
  pub fn unmount(&self) {
    self.engine.cancel();
    for plugin in &self.plugins {
      plugin.teardown();
    }
    debug!("request unmounted");
  }

  pub fn snapshot(&self) -> RequestResult<D, P> {
    self.engine.state().into()
  }

  pub fn engine(&self) -> &Engine<D, P> {
    &self.engine
  }

  pub fn run(&self, params: P) {
    self.engine.run(params);
  }

  pub async fn run_async(&self, params: P) -> Result<RunOutcome<D>, ServiceError> {
    self.engine.run_async(params).await
  }

  pub fn refresh(&self) {
    self.engine.refresh();
  }

  pub async fn refresh_async(&self) -> Result<RunOutcome<D>, ServiceError> {
    self.engine.refresh_async().await
  }

  pub fn cancel(&self) {
    self.engine.cancel();
  }

  pub fn mutate(&self, data: impl Into<Option<D>>) {
    self.engine.mutate(data);
  }

  pub fn mutate_with(&self, update: impl FnOnce(Option<&D>) -> Option<D>) {
    self.engine.mutate_with(update);
  }

  fn render(&self, options: Options<D, P>) {
    self.engine.update_options(options.clone());
    let hooks = self
      .plugins
      .iter()
      .map(|plugin| plugin.hooks(&self.engine, &options))
      .collect();
    self.engine.install_hooks(hooks);
    for plugin in &self.plugins {
      plugin.on_update(&self.engine, &options);
    }
  }
}
