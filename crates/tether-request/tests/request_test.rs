//! Integration tests for the request facade with the built-in plugins.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tether_request::{Lifetime, Options, Request, RunOutcome, Service, ServiceError, SharedCache};
use tokio::time::sleep;

type Params = Vec<u32>;

/// Answers `"<label>#<call>"` after `latency`.
fn service(
  label: &'static str,
  latency: Duration,
  calls: Arc<AtomicUsize>,
) -> impl Service<String, Params> + 'static {
  move |_params: Params| {
    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
    async move {
      sleep(latency).await;
      Ok(format!("{label}#{n}"))
    }
  }
}

fn counter() -> Arc<AtomicUsize> {
  Arc::new(AtomicUsize::new(0))
}

#[tokio::test(start_paused = true)]
async fn test_mount_runs_with_default_params() {
  let seen: Arc<std::sync::Mutex<Vec<Params>>> = Arc::default();
  let s = seen.clone();
  let request = Request::builder(move |params: Params| {
    s.lock().unwrap().push(params.clone());
    async move { Ok::<_, ServiceError>(params.len().to_string()) }
  })
  .options(Options::new().default_params(vec![1, 2]))
  .build();
  assert!(request.snapshot().loading);

  request.mount();
  sleep(Duration::from_millis(1)).await;

  let result = request.snapshot();
  assert!(!result.loading);
  assert_eq!(result.data.as_deref(), Some("2"));
  assert_eq!(result.params, vec![1, 2]);
  assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
}

#[tokio::test(start_paused = true)]
async fn test_manual_mount_does_nothing() {
  let calls = counter();
  let request = Request::builder(service("m", Duration::from_millis(10), calls.clone()))
    .options(Options::new().manual(true))
    .build();

  request.mount();
  sleep(Duration::from_millis(50)).await;

  let result = request.snapshot();
  assert!(!result.loading);
  assert!(result.data.is_none());
  assert_eq!(result.params, Params::new());
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_every_change() {
  let renders = counter();
  let r = renders.clone();
  let request = Request::builder(service("s", Duration::from_millis(10), counter()))
    .options(Options::new().manual(true))
    .subscriber(move || {
      r.fetch_add(1, Ordering::SeqCst);
    })
    .build();

  request.run_async(vec![]).await.unwrap();
  request.mutate("x".to_string());

  assert_eq!(renders.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_runs_apply_latest_only() {
  let request = Request::builder(|params: Params| async move {
    let delay = params[0] as u64;
    sleep(Duration::from_millis(delay)).await;
    Ok::<_, ServiceError>(delay)
  })
  .options(Options::new().manual(true))
  .build();

  let (a, b, c) = tokio::join!(
    request.run_async(vec![300]),
    request.run_async(vec![100]),
    request.run_async(vec![200]),
  );

  assert!(a.unwrap().is_voided());
  assert!(b.unwrap().is_voided());
  assert_eq!(c.unwrap(), RunOutcome::Completed(200));
  assert_eq!(request.snapshot().data, Some(200));
}

#[tokio::test(start_paused = true)]
async fn test_cache_round_trip_within_stale_time() {
  let cache = SharedCache::new();
  let calls = counter();
  let options = Options::new()
    .cache_key("profile")
    .stale_time(Duration::from_secs(30))
    .default_params(vec![7]);

  let first = Request::builder(service("r", Duration::from_millis(20), calls.clone()))
    .options(options.clone())
    .cache(cache.clone())
    .build();
  first.mount();
  sleep(Duration::from_millis(25)).await;
  assert_eq!(first.snapshot().data.as_deref(), Some("r#1"));

  sleep(Duration::from_secs(5)).await;
  let second = Request::builder(service("r", Duration::from_millis(20), calls.clone()))
    .options(options)
    .cache(cache.clone())
    .build();

  let seeded = second.snapshot();
  assert!(!seeded.loading);
  assert_eq!(seeded.data.as_deref(), Some("r#1"));
  assert_eq!(seeded.params, vec![7]);

  second.mount();
  sleep(Duration::from_millis(25)).await;
  assert_eq!(second.snapshot().data.as_deref(), Some("r#1"));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shared_key_deduplicates_in_flight_requests() {
  let cache = SharedCache::new();
  let calls = counter();
  let build = || {
    Request::builder(service("d", Duration::from_millis(100), calls.clone()))
      .options(Options::new().manual(true).cache_key("feed"))
      .cache(cache.clone())
      .build()
  };
  let a = build();
  let b = build();

  let (ra, rb) = tokio::join!(a.run_async(vec![1]), async {
    sleep(Duration::from_millis(30)).await;
    b.run_async(vec![1]).await
  });

  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(ra.unwrap().data().as_deref(), Some("d#1"));
  assert_eq!(rb.unwrap().data().as_deref(), Some("d#1"));
  assert_eq!(b.snapshot().data.as_deref(), Some("d#1"));
}

#[tokio::test(start_paused = true)]
async fn test_same_instance_rerun_starts_new_request() {
  let cache = SharedCache::new();
  let calls = counter();
  let request = Request::builder(service("own", Duration::from_millis(100), calls.clone()))
    .options(Options::new().manual(true).cache_key("own"))
    .cache(cache)
    .build();

  let (first, second) = tokio::join!(request.run_async(vec![]), async {
    sleep(Duration::from_millis(10)).await;
    request.run_async(vec![]).await
  });

  assert!(first.unwrap().is_voided());
  assert_eq!(second.unwrap().data().as_deref(), Some("own#2"));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entry_expires_after_cache_time() {
  let cache = SharedCache::new();
  let request = Request::builder(service("e", Duration::ZERO, counter()))
    .options(
      Options::new()
        .manual(true)
        .cache_key("short")
        .cache_time(Duration::from_millis(100)),
    )
    .cache(cache.clone())
    .build();

  request.run_async(vec![]).await.unwrap();
  sleep(Duration::from_millis(99)).await;
  assert!(cache.store.get("short").is_some());

  sleep(Duration::from_millis(2)).await;
  assert!(cache.store.get("short").is_none());

  let late = Request::builder(service("e", Duration::ZERO, counter()))
    .options(Options::new().manual(true).cache_key("short"))
    .cache(cache)
    .build();
  assert!(late.snapshot().data.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_time_zero_scenario() {
  let cache = SharedCache::new();
  let calls = counter();
  // first call answers "A", later calls fail so they never rewrite the cache
  let flaky = {
    let calls = calls.clone();
    move |_params: Params| {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 0 {
          Ok("A".to_string())
        } else {
          Err(ServiceError::msg("offline"))
        }
      }
    }
  };
  let options = Options::new()
    .cache_key("scenario")
    .cache_time(Duration::from_millis(100))
    .stale_time(Lifetime::For(Duration::ZERO));

  let first = Request::builder(flaky.clone())
    .options(options.clone())
    .cache(cache.clone())
    .build();
  first.mount();
  sleep(Duration::from_millis(1)).await;
  assert_eq!(first.snapshot().data.as_deref(), Some("A"));

  sleep(Duration::from_millis(50)).await;
  let second = Request::builder(flaky.clone())
    .options(options.clone())
    .cache(cache.clone())
    .build();
  let seeded = second.snapshot();
  assert_eq!(seeded.data.as_deref(), Some("A"));
  // stale, so the loading flag from auto-run stays on
  assert!(seeded.loading);

  second.mount();
  sleep(Duration::from_millis(1)).await;
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  let after = second.snapshot();
  assert_eq!(after.data.as_deref(), Some("A"));
  assert!(after.error.is_some());

  sleep(Duration::from_millis(100)).await;
  assert!(cache.store.get("scenario").is_none());
  let third = Request::builder(flaky)
    .options(options.manual(true))
    .cache(cache)
    .build();
  assert!(third.snapshot().data.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_ready_gates_auto_run() {
  let calls = counter();
  let options = Options::new().ready(false).default_params(vec![4]);
  let request = Request::builder(service("g", Duration::from_millis(10), calls.clone()))
    .options(options.clone())
    .build();
  assert!(!request.snapshot().loading);

  request.mount();
  sleep(Duration::from_millis(50)).await;
  assert_eq!(calls.load(Ordering::SeqCst), 0);
  assert!(request.snapshot().data.is_none());

  request.update(options.clone().ready(true));
  sleep(Duration::from_millis(50)).await;
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(request.snapshot().params, vec![4]);

  // no change, no run
  request.update(options.ready(true));
  sleep(Duration::from_millis(50)).await;
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_deps_change_refreshes() {
  let calls = counter();
  let options = Options::new()
    .default_params(vec![9])
    .refresh_deps(vec![serde_json::json!("page-1")]);
  let request = Request::builder(service("p", Duration::from_millis(10), calls.clone()))
    .options(options.clone())
    .build();
  request.mount();
  sleep(Duration::from_millis(20)).await;
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  request.update(options.refresh_deps(vec![serde_json::json!("page-2")]));
  sleep(Duration::from_millis(20)).await;

  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(request.snapshot().data.as_deref(), Some("p#2"));
  assert_eq!(request.snapshot().params, vec![9]);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_and_stops_sync() {
  let cache = SharedCache::new();
  let options = Options::new().manual(true).cache_key("u");
  let a = Request::builder(service("u", Duration::from_millis(100), counter()))
    .options(options.clone())
    .cache(cache.clone())
    .build();
  let b = Request::builder(service("u", Duration::from_millis(100), counter()))
    .options(options)
    .cache(cache.clone())
    .build();

  b.run(vec![]);
  sleep(Duration::from_millis(10)).await;
  b.unmount();
  assert!(!b.snapshot().loading);

  a.mutate("fresh".to_string());
  sleep(Duration::from_millis(200)).await;

  assert!(b.snapshot().data.is_none());
  assert_eq!(cache.bus.listener_count("u"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_mutate_composes_and_syncs() {
  let cache = SharedCache::new();
  let calls = counter();
  let options = Options::new().manual(true).cache_key("m");
  let a = Request::builder(service("m", Duration::from_millis(10), calls.clone()))
    .options(options.clone())
    .cache(cache.clone())
    .build();
  let b = Request::builder(service("m", Duration::from_millis(10), calls.clone()))
    .options(options)
    .cache(cache)
    .build();

  a.mutate("x".to_string());
  a.mutate_with(|data| data.map(|d| format!("f({d})")));

  assert_eq!(a.snapshot().data.as_deref(), Some("f(x)"));
  assert!(!a.snapshot().loading);
  assert_eq!(b.snapshot().data.as_deref(), Some("f(x)"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_remount_rejoins_sync() {
  let cache = SharedCache::new();
  let options = Options::new().manual(true).cache_key("re");
  let a = Request::builder(service("re", Duration::from_millis(10), counter()))
    .options(options.clone())
    .cache(cache.clone())
    .build();
  let b = Request::builder(service("re", Duration::from_millis(10), counter()))
    .options(options)
    .cache(cache.clone())
    .build();

  b.unmount();
  b.mutate("offline edit".to_string());
  assert_eq!(cache.bus.listener_count("re"), 1);

  b.mount();
  assert_eq!(cache.bus.listener_count("re"), 2);
  a.mutate("shared".to_string());
  assert_eq!(b.snapshot().data.as_deref(), Some("shared"));
}
