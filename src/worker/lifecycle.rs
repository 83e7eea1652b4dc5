//! Worker lifecycle as a pure state machine.
//!
//! `transition` maps `(state, signal)` to the next state plus the effects the
//! controller must carry out. Nothing here touches the cache, the network or
//! the host, so every path can be exercised without I/O.

use reqwest::Method;
use std::fmt;

use crate::cache::FetchRequest;

use super::notification::NotificationAction;
use super::WorkerConfig;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Registered, install not started
  Uninstalled,
  /// Precaching static assets
  Installing,
  /// Installed, not yet controlling clients
  Waiting,
  /// Purging stale buckets and claiming clients
  Activating,
  /// Controlling clients and intercepting fetches
  Active,
  /// Failed install or replaced by a newer version
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      WorkerState::Uninstalled => "uninstalled",
      WorkerState::Installing => "installing",
      WorkerState::Waiting => "waiting",
      WorkerState::Activating => "activating",
      WorkerState::Active => "active",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

/// Messages posted to the worker by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
  SkipWaiting,
  Other(String),
}

impl MessageKind {
  pub fn parse(kind: &str) -> Self {
    match kind {
      "skip-waiting" | "SKIP_WAITING" => MessageKind::SkipWaiting,
      other => MessageKind::Other(other.to_string()),
    }
  }
}

/// Signals delivered by the hosting runtime, plus completion notices for
/// the asynchronous work started by earlier signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
  Install,
  InstallSettled { ok: bool },
  Activate,
  ActivateSettled,
  Fetch(FetchRequest),
  Message(MessageKind),
  Sync(String),
  Push(Option<String>),
  NotificationClick(NotificationAction),
  /// A newer version finished activating
  Superseded,
}

/// Work the controller must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
  /// Fetch every asset and store them all in `bucket`, or store nothing
  Precache { bucket: String, assets: Vec<String> },
  /// Tell the host this version may activate without waiting
  SkipWaiting,
  /// Delete every bucket except `keep`
  PurgeStaleBuckets { keep: String },
  ClaimClients,
  /// Answer the request cache-first with network and offline fallbacks
  RespondCacheFirst(FetchRequest),
  FlushQueuedAnalytics,
  ShowNotification { body: Option<String> },
  CloseNotification,
  /// Open a window on this root-relative path
  OpenWindow(String),
}

/// Result of applying a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
  pub state: WorkerState,
  pub effects: Vec<Effect>,
  /// False when the signal means nothing in the current state
  pub handled: bool,
}

impl Transition {
  fn to(state: WorkerState) -> Self {
    Self {
      state,
      effects: Vec::new(),
      handled: true,
    }
  }

  fn with(mut self, effect: Effect) -> Self {
    self.effects.push(effect);
    self
  }

  fn ignore(state: WorkerState) -> Self {
    Self {
      state,
      effects: Vec::new(),
      handled: false,
    }
  }
}

/// Why a fetch was left to the network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThrough {
  NotGet,
  CrossOrigin,
}

/// Decide whether an active worker intercepts `request`.
pub fn route(config: &WorkerConfig, request: &FetchRequest) -> Result<(), PassThrough> {
  if request.method != Method::GET {
    return Err(PassThrough::NotGet);
  }
  if !config.is_same_origin(&request.url) {
    return Err(PassThrough::CrossOrigin);
  }
  Ok(())
}

/// Compute the next state and effects for `signal` in `state`.
pub fn transition(config: &WorkerConfig, state: WorkerState, signal: &Signal) -> Transition {
  use WorkerState::*;

  match (state, signal) {
    (Redundant, _) => Transition::ignore(Redundant),

    (Uninstalled, Signal::Install) => Transition::to(Installing).with(Effect::Precache {
      bucket: config.cache_name.to_string(),
      assets: config.static_assets.clone(),
    }),
    (Installing, Signal::InstallSettled { ok: true }) => {
      Transition::to(Waiting).with(Effect::SkipWaiting)
    }
    (Installing, Signal::InstallSettled { ok: false }) => Transition::to(Redundant),

    (Waiting, Signal::Activate) => Transition::to(Activating)
      .with(Effect::PurgeStaleBuckets {
        keep: config.cache_name.to_string(),
      })
      .with(Effect::ClaimClients),
    (Activating, Signal::ActivateSettled) => Transition::to(Active),

    (Active, Signal::Fetch(request)) => match route(config, request) {
      Ok(()) => Transition::to(Active).with(Effect::RespondCacheFirst(request.clone())),
      Err(_) => Transition::to(Active),
    },

    (Installing | Waiting, Signal::Message(MessageKind::SkipWaiting)) => {
      Transition::to(state).with(Effect::SkipWaiting)
    }
    (_, Signal::Message(_)) => Transition::to(state),

    (_, Signal::Sync(tag)) if *tag == config.analytics_tag => {
      Transition::to(state).with(Effect::FlushQueuedAnalytics)
    }
    (_, Signal::Sync(_)) => Transition::to(state),

    (_, Signal::Push(body)) => Transition::to(state).with(Effect::ShowNotification {
      body: body.clone(),
    }),

    (_, Signal::NotificationClick(action)) => {
      let clicked = Transition::to(state).with(Effect::CloseNotification);
      if *action == NotificationAction::Explore {
        clicked.with(Effect::OpenWindow("/".to_string()))
      } else {
        clicked
      }
    }

    (_, Signal::Superseded) => Transition::to(Redundant),

    _ => Transition::ignore(state),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::worker::test_support::worker_config;
  use url::Url;

  fn get(url: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_install_precaches_into_current_bucket() {
    let config = worker_config(&["/", "/css/style.css"]);
    let t = transition(&config, WorkerState::Uninstalled, &Signal::Install);

    assert_eq!(t.state, WorkerState::Installing);
    assert_eq!(
      t.effects,
      vec![Effect::Precache {
        bucket: "luccabot-pwa-v1.0.0".to_string(),
        assets: vec!["/".to_string(), "/css/style.css".to_string()],
      }]
    );
  }

  #[test]
  fn test_successful_install_signals_skip_waiting() {
    let config = worker_config(&["/"]);
    let t = transition(
      &config,
      WorkerState::Installing,
      &Signal::InstallSettled { ok: true },
    );

    assert_eq!(t.state, WorkerState::Waiting);
    assert_eq!(t.effects, vec![Effect::SkipWaiting]);
  }

  #[test]
  fn test_failed_install_is_redundant() {
    let config = worker_config(&["/"]);
    let t = transition(
      &config,
      WorkerState::Installing,
      &Signal::InstallSettled { ok: false },
    );

    assert_eq!(t.state, WorkerState::Redundant);
    assert!(t.effects.is_empty());
  }

  #[test]
  fn test_activate_purges_then_claims() {
    let config = worker_config(&["/"]);
    let t = transition(&config, WorkerState::Waiting, &Signal::Activate);

    assert_eq!(t.state, WorkerState::Activating);
    assert_eq!(
      t.effects,
      vec![
        Effect::PurgeStaleBuckets {
          keep: "luccabot-pwa-v1.0.0".to_string()
        },
        Effect::ClaimClients,
      ]
    );

    let settled = transition(&config, t.state, &Signal::ActivateSettled);
    assert_eq!(settled.state, WorkerState::Active);
  }

  #[test]
  fn test_activate_before_install_is_ignored() {
    let config = worker_config(&["/"]);
    let t = transition(&config, WorkerState::Uninstalled, &Signal::Activate);

    assert!(!t.handled);
    assert_eq!(t.state, WorkerState::Uninstalled);
    assert!(t.effects.is_empty());
  }

  #[test]
  fn test_fetch_routing() {
    let config = worker_config(&["/"]);

    let same_origin = get("http://localhost:8000/images/new.jpg");
    let t = transition(&config, WorkerState::Active, &Signal::Fetch(same_origin.clone()));
    assert_eq!(t.effects, vec![Effect::RespondCacheFirst(same_origin)]);

    let cross_origin = get("https://www.google-analytics.com/collect");
    let t = transition(&config, WorkerState::Active, &Signal::Fetch(cross_origin));
    assert!(t.handled);
    assert!(t.effects.is_empty());

    let post = FetchRequest::new(
      Method::POST,
      Url::parse("http://localhost:8000/api/partnership").unwrap(),
      Default::default(),
    );
    assert_eq!(route(&config, &post), Err(PassThrough::NotGet));
    let t = transition(&config, WorkerState::Active, &Signal::Fetch(post));
    assert!(t.effects.is_empty());
  }

  #[test]
  fn test_fetch_not_intercepted_unless_active() {
    let config = worker_config(&["/"]);
    let request = get("http://localhost:8000/");

    for state in [
      WorkerState::Uninstalled,
      WorkerState::Installing,
      WorkerState::Waiting,
      WorkerState::Activating,
      WorkerState::Redundant,
    ] {
      let t = transition(&config, state, &Signal::Fetch(request.clone()));
      assert!(t.effects.is_empty(), "state {} intercepted a fetch", state);
      assert_eq!(t.state, state);
    }
  }

  #[test]
  fn test_skip_waiting_message() {
    let config = worker_config(&["/"]);
    let message = Signal::Message(MessageKind::parse("skip-waiting"));

    let t = transition(&config, WorkerState::Waiting, &message);
    assert_eq!(t.state, WorkerState::Waiting);
    assert_eq!(t.effects, vec![Effect::SkipWaiting]);

    let t = transition(&config, WorkerState::Active, &message);
    assert!(t.effects.is_empty());

    let t = transition(
      &config,
      WorkerState::Waiting,
      &Signal::Message(MessageKind::parse("PING")),
    );
    assert!(t.effects.is_empty());
  }

  #[test]
  fn test_sync_only_flushes_analytics_tag() {
    let config = worker_config(&["/"]);

    let t = transition(
      &config,
      WorkerState::Active,
      &Signal::Sync("analytics-sync".to_string()),
    );
    assert_eq!(t.effects, vec![Effect::FlushQueuedAnalytics]);

    let t = transition(
      &config,
      WorkerState::Active,
      &Signal::Sync("form-sync".to_string()),
    );
    assert!(t.handled);
    assert!(t.effects.is_empty());
  }

  #[test]
  fn test_notification_click_actions() {
    let config = worker_config(&["/"]);

    let t = transition(
      &config,
      WorkerState::Active,
      &Signal::NotificationClick(NotificationAction::Explore),
    );
    assert_eq!(
      t.effects,
      vec![Effect::CloseNotification, Effect::OpenWindow("/".to_string())]
    );

    let t = transition(
      &config,
      WorkerState::Active,
      &Signal::NotificationClick(NotificationAction::Close),
    );
    assert_eq!(t.effects, vec![Effect::CloseNotification]);
  }

  #[test]
  fn test_push_shows_notification() {
    let config = worker_config(&["/"]);
    let t = transition(&config, WorkerState::Active, &Signal::Push(Some("hi".to_string())));
    assert_eq!(
      t.effects,
      vec![Effect::ShowNotification {
        body: Some("hi".to_string())
      }]
    );
  }

  #[test]
  fn test_redundant_is_terminal() {
    let config = worker_config(&["/"]);
    let t = transition(&config, WorkerState::Active, &Signal::Superseded);
    assert_eq!(t.state, WorkerState::Redundant);

    for signal in [Signal::Install, Signal::Activate, Signal::Push(None)] {
      let t = transition(&config, WorkerState::Redundant, &signal);
      assert_eq!(t.state, WorkerState::Redundant);
      assert!(!t.handled);
      assert!(t.effects.is_empty());
    }
  }
}
