//! Inbound event types pushed by the external focus watcher and the
//! browser bridge. None of these are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::FocusState;

/// A raw focus/idle signal from the operating-system watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub app_identifier: String,
    pub app_name: String,
    pub focus_state: FocusState,
    pub timestamp: DateTime<Utc>,
}

/// Active-tab domain switch pushed by the browser integration side-channel.
///
/// `rich_context` carries freeform page metadata for downstream labeling;
/// it never participates in state-machine decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainChange {
    pub old_domain: Option<String>,
    pub new_domain: String,
    pub title: Option<String>,
    pub rich_context: Option<String>,
    /// The bridge pushes no timestamp; absent on the wire means "stamped at
    /// receipt".
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A not-yet-committed candidate session, owned exclusively by the tracker.
/// Discarded if focus moves on before the commit threshold elapses.
#[derive(Debug, Clone)]
pub struct PendingSegment {
    pub app_identifier: String,
    pub app_name: String,
    pub focus_state: FocusState,
    pub start_time: DateTime<Utc>,
}

impl PendingSegment {
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            app_identifier: obs.app_identifier.clone(),
            app_name: obs.app_name.clone(),
            focus_state: obs.focus_state,
            start_time: obs.timestamp,
        }
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_milliseconds().max(0) as u64
    }
}
