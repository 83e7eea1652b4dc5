//! Push notification payloads and click actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed parts of the notification shown on push, loaded from config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationTemplate {
  pub title: String,
  /// Body used when the push carries no payload
  pub default_body: String,
  /// Used for the icon, the badge and both action icons
  pub icon: String,
  pub vibrate: Vec<u32>,
}

impl Default for NotificationTemplate {
  fn default() -> Self {
    Self {
      title: "Luccabot".to_string(),
      default_body: "New message from Luccabot".to_string(),
      icon: "/images/hero-1.jpg".to_string(),
      vibrate: vec![100, 50, 100],
    }
  }
}

impl NotificationTemplate {
  /// Build the notification for a push, using the payload text as body.
  pub fn build(&self, payload: Option<&str>, now: DateTime<Utc>) -> Notification {
    Notification {
      title: self.title.clone(),
      body: payload.unwrap_or(&self.default_body).to_string(),
      icon: self.icon.clone(),
      badge: self.icon.clone(),
      vibrate: self.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: now.timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        NotificationButton {
          action: NotificationAction::Explore.as_str().to_string(),
          title: format!("Open {}", self.title),
          icon: self.icon.clone(),
        },
        NotificationButton {
          action: NotificationAction::Close.as_str().to_string(),
          title: "Close".to_string(),
          icon: self.icon.clone(),
        },
      ],
    }
  }
}

/// A notification as handed to the host for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationButton>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationButton {
  pub action: String,
  pub title: String,
  pub icon: String,
}

/// What the user clicked on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationAction {
  /// Open the landing page
  Explore,
  /// Dismiss
  Close,
  /// Click on the notification body (no action button)
  Body,
  Other(String),
}

impl NotificationAction {
  pub fn parse(action: &str) -> Self {
    match action {
      "explore" => NotificationAction::Explore,
      "close" => NotificationAction::Close,
      "" => NotificationAction::Body,
      other => NotificationAction::Other(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      NotificationAction::Explore => "explore",
      NotificationAction::Close => "close",
      NotificationAction::Body => "",
      NotificationAction::Other(action) => action,
    }
  }
}
