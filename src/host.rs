//! Runtime primitives the controller calls back into.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::info;
use url::Url;

use crate::worker::Notification;

/// The parts of the hosting runtime visible to a worker.
pub trait Host: Send + Sync {
  /// Mark the installing/waiting version as eligible to activate now.
  fn skip_waiting(&self);

  /// Take control of every open client without waiting for a reload.
  fn claim_clients(&self);

  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self);

  fn open_window(&self, url: &Url) -> Result<()>;
}

/// Something the host did on behalf of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
  SkipWaiting,
  ClientsClaimed,
  NotificationShown(Notification),
  NotificationClosed,
  WindowOpened(Url),
}

/// In-process host that logs and records every call.
#[derive(Default)]
pub struct LocalHost {
  skip_waiting: AtomicBool,
  events: Mutex<Vec<HostEvent>>,
}

impl LocalHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Consume the skip-waiting flag set since the last call.
  pub fn take_skip_waiting(&self) -> bool {
    self.skip_waiting.swap(false, Ordering::SeqCst)
  }

  /// Take the events recorded since the last drain.
  pub fn drain_events(&self) -> Vec<HostEvent> {
    match self.events.lock() {
      Ok(mut events) => std::mem::take(&mut *events),
      Err(_) => Vec::new(),
    }
  }

  fn record(&self, event: HostEvent) {
    if let Ok(mut events) = self.events.lock() {
      events.push(event);
    }
  }
}

impl Host for LocalHost {
  fn skip_waiting(&self) {
    info!("Host: skip waiting requested");
    self.skip_waiting.store(true, Ordering::SeqCst);
    self.record(HostEvent::SkipWaiting);
  }

  fn claim_clients(&self) {
    info!("Host: clients claimed");
    self.record(HostEvent::ClientsClaimed);
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    if notification.title.is_empty() {
      return Err(eyre!("Notification title must not be empty"));
    }
    info!(title = %notification.title, body = %notification.body, "Host: showing notification");
    self.record(HostEvent::NotificationShown(notification.clone()));
    Ok(())
  }

  fn close_notification(&self) {
    info!("Host: notification closed");
    self.record(HostEvent::NotificationClosed);
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    info!(%url, "Host: opening window");
    self.record(HostEvent::WindowOpened(url.clone()));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_skip_waiting_flag_is_consumed() {
    let host = LocalHost::new();
    assert!(!host.take_skip_waiting());

    host.skip_waiting();
    assert!(host.take_skip_waiting());
    assert!(!host.take_skip_waiting());
  }

  #[test]
  fn test_drain_events() {
    let host = LocalHost::new();
    host.claim_clients();
    host.close_notification();

    assert_eq!(
      host.drain_events(),
      vec![HostEvent::ClientsClaimed, HostEvent::NotificationClosed]
    );
    assert!(host.drain_events().is_empty());
  }
}
