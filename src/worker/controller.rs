//! Effect adapter: runs lifecycle effects against storage, network and host.

use chrono::Utc;
use color_eyre::{eyre::eyre, eyre::WrapErr, Result};
use reqwest::Method;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, FetchRequest, FetchResult, RequestKey, StoredResponse};
use crate::host::Host;
use crate::network::Network;

use super::lifecycle::{route, transition, Effect, MessageKind, Signal, WorkerState};
use super::notification::NotificationAction;
use super::WorkerConfig;

/// One worker version.
///
/// Every handler is an `async fn` whose future is the unit of work for that
/// signal: the runtime must await it before treating the signal as handled.
pub struct Controller<S, N, H> {
  config: WorkerConfig,
  storage: Arc<S>,
  network: Arc<N>,
  host: Arc<H>,
  state: Mutex<WorkerState>,
}

impl<S, N, H> Controller<S, N, H>
where
  S: CacheStorage,
  N: Network,
  H: Host,
{
  /// A worker version starting out in `state`. Fresh registrations start
  /// `Uninstalled`; a version found on disk after a restart starts `Waiting`.
  pub fn with_state(
    config: WorkerConfig,
    storage: Arc<S>,
    network: Arc<N>,
    host: Arc<H>,
    state: WorkerState,
  ) -> Self {
    Self {
      config,
      storage,
      network,
      host,
      state: Mutex::new(state),
    }
  }

  pub fn bucket(&self) -> String {
    self.config.cache_name.to_string()
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  /// Apply a signal to the state machine. Returns the effects to run, or
  /// `None` if the signal was ignored in the current state.
  fn apply(&self, signal: &Signal) -> Option<Vec<Effect>> {
    let mut state = match self.state.lock() {
      Ok(state) => state,
      Err(e) => {
        warn!(bucket = %self.bucket(), "Worker state lock poisoned: {}", e);
        return None;
      }
    };

    let current = *state;
    let next = transition(&self.config, current, signal);
    if !next.handled {
      debug!(bucket = %self.bucket(), state = %current, ?signal, "Ignoring signal");
      return None;
    }

    if next.state != current {
      debug!(bucket = %self.bucket(), from = %current, to = %next.state, "Worker state changed");
      *state = next.state;
    }

    Some(next.effects)
  }

  /// Apply a signal and run its effects in order, stopping at the first error.
  async fn dispatch(&self, signal: &Signal) -> Result<Option<FetchResult>> {
    let effects = self.apply(signal).unwrap_or_default();

    let mut response = None;
    for effect in effects {
      if let Some(result) = self.execute(effect).await? {
        response = Some(result);
      }
    }
    Ok(response)
  }

  async fn execute(&self, effect: Effect) -> Result<Option<FetchResult>> {
    match effect {
      Effect::Precache { bucket, assets } => {
        self.precache(&bucket, &assets).await?;
      }
      Effect::SkipWaiting => self.host.skip_waiting(),
      Effect::PurgeStaleBuckets { keep } => self.purge_stale_buckets(&keep),
      Effect::ClaimClients => self.host.claim_clients(),
      Effect::RespondCacheFirst(request) => {
        return self.respond_cache_first(&request).await.map(Some);
      }
      Effect::FlushQueuedAnalytics => flush_queued_analytics().await?,
      Effect::ShowNotification { body } => {
        let notification = self.config.notification.build(body.as_deref(), Utc::now());
        self.host.show_notification(&notification)?;
      }
      Effect::CloseNotification => self.host.close_notification(),
      Effect::OpenWindow(path) => {
        let url = self.config.resolve(&path)?;
        self.host.open_window(&url)?;
      }
    }
    Ok(None)
  }

  /// Install this version: precache every static asset, then signal
  /// skip-waiting. Any asset failure fails the whole install and leaves
  /// the worker redundant with no bucket written.
  pub async fn install(&self) -> Result<()> {
    info!(bucket = %self.bucket(), "Installing");

    let effects = self
      .apply(&Signal::Install)
      .ok_or_else(|| eyre!("Cannot install {}: worker is {}", self.bucket(), self.state()))?;

    let mut result = Ok(());
    for effect in effects {
      if let Err(e) = self.execute(effect).await {
        result = Err(e);
        break;
      }
    }

    let ok = result.is_ok();
    self.dispatch(&Signal::InstallSettled { ok }).await?;

    match &result {
      Ok(()) => info!(bucket = %self.bucket(), "Installation complete"),
      Err(e) => warn!(bucket = %self.bucket(), "Installation failed: {:#}", e),
    }
    result
  }

  /// Activate this version: delete every other bucket, then claim clients.
  pub async fn activate(&self) -> Result<()> {
    info!(bucket = %self.bucket(), "Activating");

    let effects = self
      .apply(&Signal::Activate)
      .ok_or_else(|| eyre!("Cannot activate {}: worker is {}", self.bucket(), self.state()))?;

    for effect in effects {
      self.execute(effect).await?;
    }
    self.dispatch(&Signal::ActivateSettled).await?;

    info!(bucket = %self.bucket(), "Activation complete");
    Ok(())
  }

  /// Handle a fetch. `Ok(None)` means the request was not intercepted and
  /// should go to the network untouched.
  pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<Option<FetchResult>> {
    if let Err(reason) = route(&self.config, request) {
      debug!(url = %request.url, ?reason, "Not intercepting");
    }
    self.dispatch(&Signal::Fetch(request.clone())).await
  }

  pub async fn handle_message(&self, kind: MessageKind) -> Result<()> {
    self.dispatch(&Signal::Message(kind)).await.map(|_| ())
  }

  pub async fn handle_sync(&self, tag: &str) -> Result<()> {
    info!(tag, "Background sync triggered");
    self.dispatch(&Signal::Sync(tag.to_string())).await.map(|_| ())
  }

  pub async fn handle_push(&self, payload: Option<&str>) -> Result<()> {
    info!("Push notification received");
    self
      .dispatch(&Signal::Push(payload.map(String::from)))
      .await
      .map(|_| ())
  }

  pub async fn handle_notification_click(&self, action: NotificationAction) -> Result<()> {
    info!(action = action.as_str(), "Notification clicked");
    self
      .dispatch(&Signal::NotificationClick(action))
      .await
      .map(|_| ())
  }

  /// A newer version has taken over.
  pub fn supersede(&self) {
    if self.apply(&Signal::Superseded).is_some() {
      info!(bucket = %self.bucket(), "Worker is now redundant");
    }
  }

  async fn precache(&self, bucket: &str, assets: &[String]) -> Result<()> {
    info!(bucket, count = assets.len(), "Caching static assets");

    let fetches = assets.iter().map(|path| async move {
      let request = FetchRequest::get(self.config.resolve(path)?);
      let response = self
        .network
        .fetch(&request)
        .await
        .wrap_err_with(|| format!("Failed to fetch static asset {}", path))?;

      if !response.is_ok() {
        return Err(eyre!(
          "Static asset {} returned status {}",
          path,
          response.status
        ));
      }

      Ok::<_, color_eyre::Report>((RequestKey::for_request(&request), response))
    });

    let entries = futures::future::try_join_all(fetches).await?;

    self
      .storage
      .put_all(bucket, &entries)
      .wrap_err_with(|| format!("Failed to store static assets in {}", bucket))
  }

  /// Best-effort: a bucket that fails to delete is logged and left for the
  /// next activation.
  fn purge_stale_buckets(&self, keep: &str) {
    let names = match self.storage.bucket_names() {
      Ok(names) => names,
      Err(e) => {
        warn!("Failed to list cache buckets: {:#}", e);
        return;
      }
    };

    for name in names.into_iter().filter(|name| name != keep) {
      match self.storage.delete_bucket(&name) {
        Ok(_) => info!(bucket = %name, "Deleting old cache"),
        Err(e) => warn!(bucket = %name, "Failed to delete old cache: {:#}", e),
      }
    }
  }

  /// Store a network response in this version's bucket. A version that
  /// was superseded while the request was in flight writes nothing, and
  /// neither does one whose bucket a newer activation already deleted.
  fn write_through(&self, bucket: &str, key: &RequestKey, response: &StoredResponse) {
    let state = self.state();
    if state != WorkerState::Active {
      debug!(url = key.url(), %state, "Worker no longer active, not caching");
      return;
    }

    match self.storage.put(bucket, key, response) {
      Ok(true) => info!(url = key.url(), "Cached new resource"),
      Ok(false) => debug!(bucket, url = key.url(), "Bucket is gone, not caching"),
      Err(e) => warn!(url = key.url(), "Failed to cache response: {:#}", e),
    }
  }

  /// Cache-first with write-through of eligible responses and a cached
  /// root document for failed navigations.
  async fn respond_cache_first(&self, request: &FetchRequest) -> Result<FetchResult> {
    let bucket = self.bucket();
    let key = RequestKey::for_request(request);

    match self.storage.match_request(&bucket, &key) {
      Ok(Some(entry)) => {
        info!(url = %request.url, "Serving from cache");
        return Ok(FetchResult::from_cache(entry.response));
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, "Cache lookup failed: {:#}", e),
    }

    info!(url = %request.url, "Fetching from network");
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.write_through(&bucket, &key, &response);
        }
        Ok(FetchResult::from_network(response))
      }
      Err(err) if request.is_navigation() => {
        let root = RequestKey::new(&Method::GET, &self.config.root_url());
        match self.storage.match_request(&bucket, &root) {
          Ok(Some(entry)) => {
            info!(url = %request.url, "Serving offline page");
            Ok(FetchResult::offline(entry.response))
          }
          Ok(None) => Err(err),
          Err(e) => {
            warn!("Offline page lookup failed: {:#}", e);
            Err(err)
          }
        }
      }
      Err(err) => Err(err),
    }
  }
}

/// Send analytics events queued while offline. Nothing is queued yet, so
/// this resolves immediately.
async fn flush_queued_analytics() -> Result<()> {
  debug!("No queued analytics to send");
  Ok(())
}
