//! Push notifications, notification clicks, and cross-context control
//! messages.
//!
//! Everything here is a pure constructor or decision; the platform adapter
//! owns the actual display/close/navigation calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action tag that opens the app's main entry page.
pub const ACTION_EXPLORE: &str = "explore";
/// Action tag that only dismisses the notification.
pub const ACTION_CLOSE: &str = "close";

/// Background-sync tag acknowledged by the worker.
pub const SYNC_POSTS_TAG: &str = "sync-posts";

const DEFAULT_TITLE: &str = "MM Marketplace";
const DEFAULT_BODY: &str = "New activity on MM Marketplace";

/// One button on a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: Option<String>,
}

/// Data carried alongside the notification for later reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
  /// Milliseconds since the epoch at construction time
  pub timestamp: i64,
}

/// A user notification ready to be displayed by the platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub actions: Vec<NotificationAction>,
  pub data: NotificationData,
}

impl Notification {
  /// Build a notification from a push payload. The payload text, if present,
  /// is used verbatim as the body; otherwise a default string is shown.
  pub fn from_push(payload: Option<&str>, now: DateTime<Utc>) -> Self {
    Self {
      title: DEFAULT_TITLE.to_string(),
      body: payload.unwrap_or(DEFAULT_BODY).to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      actions: vec![
        NotificationAction {
          action: ACTION_EXPLORE.to_string(),
          title: "Open app".to_string(),
          icon: Some("/icons/icon-192x192.png".to_string()),
        },
        NotificationAction {
          action: ACTION_CLOSE.to_string(),
          title: "Dismiss".to_string(),
          icon: None,
        },
      ],
      data: NotificationData {
        timestamp: now.timestamp_millis(),
      },
    }
  }
}

/// What the adapter should do after a notification interaction. The
/// notification itself is always closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// Close only
  Dismiss,
  /// Close, then open/focus the app at `url`
  OpenApp { url: String },
}

/// Decide the outcome of a notification click for the given action tag.
pub fn on_click(action: &str) -> ClickOutcome {
  if action == ACTION_EXPLORE {
    ClickOutcome::OpenApp {
      url: "/".to_string(),
    }
  } else {
    ClickOutcome::Dismiss
  }
}

/// Control messages posted by application instances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Supersede any waiting previous worker instance without delay
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Pre-populate the runtime partition with the given URLs
  #[serde(rename = "CACHE_URLS")]
  CacheUrls { payload: Vec<String> },
}

impl ControlMessage {
  /// Parse a raw message object. Unrecognized types are ignored.
  pub fn parse(value: &serde_json::Value) -> Option<Self> {
    serde_json::from_value(value.clone()).ok()
  }
}
