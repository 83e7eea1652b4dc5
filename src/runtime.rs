//! Hosting runtime: keeps the registration and routes signals to workers.
//!
//! Like a browser's service worker container, the runtime holds at most one
//! active and one waiting version. Each signal is handed to the right
//! version and the resulting unit of work is awaited before the call
//! returns, except fetches, which run on their own tasks so that several
//! can be in flight at once.

use color_eyre::{eyre::eyre, Result};
use semver::Version;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{CacheStorage, FetchRequest, FetchResult, StoredResponse};
use crate::host::LocalHost;
use crate::network::Network;
use crate::worker::{Controller, MessageKind, NotificationAction, WorkerConfig, WorkerState};

/// How a fetch was answered.
#[derive(Debug)]
pub enum FetchOutcome {
  /// The active worker responded
  Intercepted(FetchResult),
  /// No worker intercepted; plain network response
  PassedThrough(StoredResponse),
}

pub struct Runtime<S, N> {
  base: WorkerConfig,
  storage: Arc<S>,
  network: Arc<N>,
  host: Arc<LocalHost>,
  active: Option<Arc<Controller<S, N, LocalHost>>>,
  waiting: Option<Arc<Controller<S, N, LocalHost>>>,
  /// Keep installed versions waiting even when they signal skip-waiting
  hold_waiting: bool,
}

impl<S, N> Runtime<S, N>
where
  S: CacheStorage + 'static,
  N: Network + 'static,
{
  pub fn new(base: WorkerConfig, storage: Arc<S>, network: Arc<N>, host: Arc<LocalHost>) -> Self {
    Self {
      base,
      storage,
      network,
      host,
      active: None,
      waiting: None,
      hold_waiting: false,
    }
  }

  pub fn hold_waiting(mut self, hold: bool) -> Self {
    self.hold_waiting = hold;
    self
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.base
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn host(&self) -> &LocalHost {
    &self.host
  }

  pub fn active(&self) -> Option<&Arc<Controller<S, N, LocalHost>>> {
    self.active.as_ref()
  }

  pub fn waiting(&self) -> Option<&Arc<Controller<S, N, LocalHost>>> {
    self.waiting.as_ref()
  }

  fn worker(&self, config: WorkerConfig, state: WorkerState) -> Arc<Controller<S, N, LocalHost>> {
    Arc::new(Controller::with_state(
      config,
      Arc::clone(&self.storage),
      Arc::clone(&self.network),
      Arc::clone(&self.host),
      state,
    ))
  }

  /// Pick up where a previous run left off. A bucket for the configured
  /// version means it finished installing, but it may never have been
  /// activated (held, or the process stopped in between). It comes back
  /// waiting and goes through a full activation unless updates are held.
  /// Returns whether anything was resumed.
  pub async fn resume(&mut self) -> Result<bool> {
    if self.active.is_some() || self.waiting.is_some() {
      return Ok(true);
    }

    let bucket = self.base.cache_name.to_string();
    if !self.storage.has_bucket(&bucket)? {
      return Ok(false);
    }

    info!(%bucket, "Resuming installed version");
    self.waiting = Some(self.worker(self.base.clone(), WorkerState::Waiting));
    if !self.hold_waiting {
      self.activate().await?;
    }
    Ok(true)
  }

  /// Register and install a version (the configured one by default).
  ///
  /// On failure the new version is discarded and whatever was active keeps
  /// serving. On success it waits, or activates right away when it asked
  /// to skip waiting and the runtime is not holding updates.
  pub async fn install(&mut self, version: Option<Version>) -> Result<()> {
    let config = match version {
      Some(v) => self.base.with_version(v),
      None => self.base.clone(),
    };
    let worker = self.worker(config, WorkerState::Uninstalled);

    worker.install().await?;

    if let Some(previous) = self.waiting.replace(worker) {
      previous.supersede();
    }

    if self.host.take_skip_waiting() && !self.hold_waiting {
      self.activate().await?;
    }
    Ok(())
  }

  /// Promote the waiting version. The previously active one goes redundant.
  pub async fn activate(&mut self) -> Result<()> {
    let worker = self
      .waiting
      .take()
      .ok_or_else(|| eyre!("No installed version is waiting to activate"))?;

    worker.activate().await?;

    if let Some(previous) = self.active.replace(worker) {
      previous.supersede();
    }
    Ok(())
  }

  /// Post a message from a page. Goes to the waiting version if there is
  /// one, so a page can force a pending update through.
  pub async fn post_message(&mut self, kind: MessageKind) -> Result<()> {
    let target = self
      .waiting
      .as_ref()
      .or(self.active.as_ref())
      .cloned()
      .ok_or_else(|| eyre!("No worker is registered"))?;

    target.handle_message(kind).await?;

    if self.host.take_skip_waiting() && self.waiting.is_some() {
      self.activate().await?;
    }
    Ok(())
  }

  fn active_or_err(&self) -> Result<Arc<Controller<S, N, LocalHost>>> {
    self
      .active
      .clone()
      .ok_or_else(|| eyre!("No active worker"))
  }

  pub async fn sync(&self, tag: &str) -> Result<()> {
    self.active_or_err()?.handle_sync(tag).await
  }

  pub async fn push(&self, payload: Option<&str>) -> Result<()> {
    self.active_or_err()?.handle_push(payload).await
  }

  pub async fn notification_click(&self, action: NotificationAction) -> Result<()> {
    self.active_or_err()?.handle_notification_click(action).await
  }

  /// Start a fetch on its own task.
  pub fn fetch(&self, request: FetchRequest) -> JoinHandle<Result<FetchOutcome>> {
    let active = self.active.clone();
    let network = Arc::clone(&self.network);

    tokio::spawn(async move {
      if let Some(worker) = active {
        if let Some(result) = worker.handle_fetch(&request).await? {
          return Ok(FetchOutcome::Intercepted(result));
        }
      }

      let response = network.fetch(&request).await?;
      Ok(FetchOutcome::PassedThrough(response))
    })
  }

  /// Fetch and wait for the outcome.
  pub async fn fetch_now(&self, request: FetchRequest) -> Result<FetchOutcome> {
    self
      .fetch(request)
      .await
      .map_err(|e| eyre!("Fetch task failed: {}", e))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::host::HostEvent;
  use crate::network::test_support::ScriptedNetwork;
  use crate::worker::test_support::worker_config;
  use reqwest::Method;
  use url::Url;

  type TestRuntime = Runtime<SqliteStorage, ScriptedNetwork>;

  fn runtime(network: &Arc<ScriptedNetwork>) -> TestRuntime {
    Runtime::new(
      worker_config(&["/", "/css/style.css"]),
      Arc::new(SqliteStorage::open_in_memory().unwrap()),
      Arc::clone(network),
      Arc::new(LocalHost::new()),
    )
  }

  fn scripted() -> Arc<ScriptedNetwork> {
    let network = Arc::new(ScriptedNetwork::new());
    network.respond("http://localhost:8000/", StoredResponse::basic("<html>"));
    network.respond(
      "http://localhost:8000/css/style.css",
      StoredResponse::basic("body {}"),
    );
    network
  }

  fn url(path: &str) -> Url {
    Url::parse("http://localhost:8000").unwrap().join(path).unwrap()
  }

  #[tokio::test]
  async fn test_install_activates_immediately() {
    let network = scripted();
    let mut runtime = runtime(&network);

    runtime.install(None).await.unwrap();

    let active = runtime.active().unwrap();
    assert_eq!(active.state(), WorkerState::Active);
    assert!(runtime.waiting().is_none());
    assert_eq!(runtime.storage().entry_count("luccabot-pwa-v1.0.0").unwrap(), 2);
    assert_eq!(
      runtime.host().drain_events(),
      vec![HostEvent::SkipWaiting, HostEvent::ClientsClaimed]
    );
  }

  #[tokio::test]
  async fn test_held_update_waits_for_skip_waiting_message() {
    let network = scripted();
    let mut runtime = runtime(&network).hold_waiting(true);

    runtime.install(None).await.unwrap();
    assert!(runtime.active().is_none());
    assert_eq!(runtime.waiting().unwrap().state(), WorkerState::Waiting);

    runtime
      .post_message(MessageKind::parse("skip-waiting"))
      .await
      .unwrap();
    assert!(runtime.waiting().is_none());
    assert_eq!(runtime.active().unwrap().state(), WorkerState::Active);
  }

  #[tokio::test]
  async fn test_failed_upgrade_keeps_old_version_serving() {
    let network = scripted();
    let mut runtime = runtime(&network);
    runtime.install(None).await.unwrap();

    network.set_offline(true);
    assert!(runtime.install(Some(Version::new(1, 1, 0))).await.is_err());

    assert_eq!(
      runtime.active().unwrap().bucket(),
      "luccabot-pwa-v1.0.0".to_string()
    );
    assert_eq!(
      runtime.storage().bucket_names().unwrap(),
      vec!["luccabot-pwa-v1.0.0"]
    );

    let outcome = runtime.fetch_now(FetchRequest::get(url("/css/style.css"))).await.unwrap();
    match outcome {
      FetchOutcome::Intercepted(result) => assert_eq!(result.source, CacheSource::Cache),
      other => panic!("expected cache hit, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_upgrade_replaces_bucket_and_supersedes_old_worker() {
    let network = scripted();
    let mut runtime = runtime(&network);
    runtime.install(None).await.unwrap();
    let old = Arc::clone(runtime.active().unwrap());

    runtime.install(Some(Version::new(1, 1, 0))).await.unwrap();

    assert_eq!(old.state(), WorkerState::Redundant);
    assert_eq!(runtime.active().unwrap().bucket(), "luccabot-pwa-v1.1.0");
    assert_eq!(
      runtime.storage().bucket_names().unwrap(),
      vec!["luccabot-pwa-v1.1.0"]
    );
  }

  #[tokio::test]
  async fn test_fetch_without_worker_passes_through() {
    let network = scripted();
    let runtime = runtime(&network);

    let outcome = runtime.fetch_now(FetchRequest::get(url("/"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassedThrough(_)));
    assert!(runtime.storage().bucket_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_post_is_plain_network_call() {
    let network = scripted();
    let mut runtime = runtime(&network);
    runtime.install(None).await.unwrap();

    let post = FetchRequest::new(Method::POST, url("/api/partnership"), Default::default());
    let outcome = runtime.fetch_now(post).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::PassedThrough(_)));
    assert_eq!(network.call_count("http://localhost:8000/api/partnership"), 1);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_for_same_url() {
    let network = scripted();
    network.respond(
      "http://localhost:8000/images/new.jpg",
      StoredResponse::basic("jpeg"),
    );
    let mut runtime = runtime(&network);
    runtime.install(None).await.unwrap();

    let handles: Vec<_> = (0..4)
      .map(|_| runtime.fetch(FetchRequest::get(url("/images/new.jpg"))))
      .collect();
    for handle in handles {
      assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(runtime.storage().entry_count("luccabot-pwa-v1.0.0").unwrap(), 3);
  }

  #[tokio::test]
  async fn test_resume_existing_bucket() {
    let network = scripted();
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    storage.open_bucket("luccabot-pwa-v1.0.0").unwrap();

    let mut runtime = Runtime::new(
      worker_config(&["/"]),
      storage,
      network,
      Arc::new(LocalHost::new()),
    );
    assert!(runtime.resume().await.unwrap());
    assert_eq!(runtime.active().unwrap().state(), WorkerState::Active);
    assert_eq!(runtime.host().drain_events(), vec![HostEvent::ClientsClaimed]);
  }

  #[tokio::test]
  async fn test_resume_after_held_install_activates_and_purges() {
    let network = scripted();
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    storage.open_bucket("luccabot-pwa-v0.9.0").unwrap();

    let mut held = Runtime::new(
      worker_config(&["/"]),
      Arc::clone(&storage),
      Arc::clone(&network),
      Arc::new(LocalHost::new()),
    )
    .hold_waiting(true);
    held.install(None).await.unwrap();
    assert!(held.active().is_none());

    let mut runtime = Runtime::new(
      worker_config(&["/"]),
      Arc::clone(&storage),
      network,
      Arc::new(LocalHost::new()),
    );
    assert!(runtime.resume().await.unwrap());

    assert_eq!(runtime.active().unwrap().state(), WorkerState::Active);
    assert!(runtime.waiting().is_none());
    assert_eq!(storage.bucket_names().unwrap(), vec!["luccabot-pwa-v1.0.0"]);
    assert_eq!(runtime.host().drain_events(), vec![HostEvent::ClientsClaimed]);
  }

  #[tokio::test]
  async fn test_resume_while_holding_stays_waiting() {
    let network = scripted();
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    storage.open_bucket("luccabot-pwa-v0.9.0").unwrap();
    storage.open_bucket("luccabot-pwa-v1.0.0").unwrap();

    let mut runtime = Runtime::new(
      worker_config(&["/"]),
      Arc::clone(&storage),
      network,
      Arc::new(LocalHost::new()),
    )
    .hold_waiting(true);
    assert!(runtime.resume().await.unwrap());

    assert!(runtime.active().is_none());
    assert_eq!(runtime.waiting().unwrap().state(), WorkerState::Waiting);
    assert_eq!(storage.bucket_names().unwrap().len(), 2);

    let outcome = runtime.fetch_now(FetchRequest::get(url("/"))).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassedThrough(_)));
  }

  #[tokio::test]
  async fn test_resume_without_bucket() {
    let network = scripted();
    let mut runtime = runtime(&network);
    assert!(!runtime.resume().await.unwrap());
    assert!(runtime.active().is_none());
  }

  #[tokio::test]
  async fn test_fetch_in_flight_during_upgrade_leaves_old_bucket_deleted() {
    let network = scripted();
    network.respond(
      "http://localhost:8000/images/new.jpg",
      StoredResponse::basic("jpeg"),
    );
    let mut runtime = runtime(&network);
    runtime.install(None).await.unwrap();

    let gate = network.hold("http://localhost:8000/images/new.jpg");
    let handle = runtime.fetch(FetchRequest::get(url("/images/new.jpg")));
    while network.call_count("http://localhost:8000/images/new.jpg") == 0 {
      tokio::task::yield_now().await;
    }

    runtime.install(Some(Version::new(1, 1, 0))).await.unwrap();
    assert_eq!(
      runtime.storage().bucket_names().unwrap(),
      vec!["luccabot-pwa-v1.1.0"]
    );

    gate.notify_one();
    let outcome = handle.await.unwrap().unwrap();
    match outcome {
      FetchOutcome::Intercepted(result) => assert_eq!(result.source, CacheSource::Network),
      other => panic!("expected network response, got {:?}", other),
    }
    assert_eq!(
      runtime.storage().bucket_names().unwrap(),
      vec!["luccabot-pwa-v1.1.0"]
    );
  }

  #[tokio::test]
  async fn test_events_need_active_worker() {
    let network = scripted();
    let mut runtime = runtime(&network);

    assert!(runtime.push(None).await.is_err());
    assert!(runtime.sync("analytics-sync").await.is_err());
    assert!(runtime.post_message(MessageKind::SkipWaiting).await.is_err());
  }
}
