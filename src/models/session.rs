//! Session and browser-visit data models.
//!
//! A `Session` is the unit of all downstream analysis: one committed stretch
//! of engagement with a single app (or, for browsers, a single domain).

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FocusState {
    Active,
    Idle,
    Away,
}

impl FocusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusState::Active => "Active",
            FocusState::Idle => "Idle",
            FocusState::Away => "Away",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "Active" => Ok(FocusState::Active),
            "Idle" => Ok(FocusState::Idle),
            "Away" => Ok(FocusState::Away),
            other => Err(anyhow!("unknown focus state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    FocusedWork,
    Communication,
    Browser,
    Entertainment,
    Admin,
    Reference,
    Idle,
    Away,
    Unknown,
    Meta,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::FocusedWork => "FocusedWork",
            ActivityType::Communication => "Communication",
            ActivityType::Browser => "Browser",
            ActivityType::Entertainment => "Entertainment",
            ActivityType::Admin => "Admin",
            ActivityType::Reference => "Reference",
            ActivityType::Idle => "Idle",
            ActivityType::Away => "Away",
            ActivityType::Unknown => "Unknown",
            ActivityType::Meta => "Meta",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "FocusedWork" => Ok(ActivityType::FocusedWork),
            "Communication" => Ok(ActivityType::Communication),
            "Browser" => Ok(ActivityType::Browser),
            "Entertainment" => Ok(ActivityType::Entertainment),
            "Admin" => Ok(ActivityType::Admin),
            "Reference" => Ok(ActivityType::Reference),
            "Idle" => Ok(ActivityType::Idle),
            "Away" => Ok(ActivityType::Away),
            "Unknown" => Ok(ActivityType::Unknown),
            "Meta" => Ok(ActivityType::Meta),
            other => Err(anyhow!("unknown activity type '{other}'")),
        }
    }

    /// Human-readable name, used as the lowest-priority cluster label.
    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityType::FocusedWork => "Focused Work",
            ActivityType::Communication => "Communication",
            ActivityType::Browser => "Browsing",
            ActivityType::Entertainment => "Entertainment",
            ActivityType::Admin => "Admin",
            ActivityType::Reference => "Reference",
            ActivityType::Idle => "Idle",
            ActivityType::Away => "Away",
            ActivityType::Unknown => "Unknown",
            ActivityType::Meta => "Meta",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UnknownReason {
    UnmappedApp,
    AmbiguousApp,
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownReason::UnmappedApp => "UnmappedApp",
            UnknownReason::AmbiguousApp => "AmbiguousApp",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "UnmappedApp" => Ok(UnknownReason::UnmappedApp),
            "AmbiguousApp" => Ok(UnknownReason::AmbiguousApp),
            other => Err(anyhow!("unknown review reason '{other}'")),
        }
    }
}

/// One in-session visit to a specific browser domain, ordered by start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVisit {
    pub id: String,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub domain: String,
    pub title: Option<String>,
    pub is_distraction: bool,
}

impl BrowserVisit {
    pub fn duration_ms(&self) -> u64 {
        match self.end_time {
            Some(end) => (end - self.start_time).num_milliseconds().max(0) as u64,
            None => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_identifier: String,
    pub app_name: String,
    pub focus_state: FocusState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds accounted for across pause/resume cycles. Authoritative
    /// once the session is closed.
    pub active_ms: u64,
    pub last_resumed_at: Option<DateTime<Utc>>,
    pub activity_type: ActivityType,
    pub confidence: f64,
    pub unknown_reason: Option<UnknownReason>,
    pub needs_review: bool,
    pub primary_domain: Option<String>,
    pub primary_title: Option<String>,
    pub visits: Vec<BrowserVisit>,
    pub task_id: Option<String>,
    pub user_label: Option<String>,
    pub inferred_label: Option<String>,
    pub micro_interruptions: i64,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Live duration: accumulated time plus the currently running stretch.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> u64 {
        match (self.end_time, self.last_resumed_at) {
            (None, Some(resumed)) => {
                let running = (now - resumed).num_milliseconds().max(0) as u64;
                self.active_ms.saturating_add(running)
            }
            _ => self.active_ms,
        }
    }

    pub fn duration_secs(&self, now: DateTime<Utc>) -> f64 {
        self.duration_ms(now) as f64 / 1000.0
    }

    /// Duration of a closed session. Open sessions report accumulated time only.
    pub fn closed_duration_ms(&self) -> u64 {
        self.active_ms
    }

    /// Recompute `primary_domain`/`primary_title` as the domain whose visits
    /// accumulated the greatest total duration.
    pub fn recompute_primary_visit(&mut self) {
        use std::collections::HashMap;

        if self.visits.is_empty() {
            return;
        }

        let mut totals: HashMap<&str, u64> = HashMap::new();
        for visit in &self.visits {
            *totals.entry(visit.domain.as_str()).or_insert(0) += visit.duration_ms();
        }

        let primary = totals
            .into_iter()
            .max_by_key(|(_, total)| *total)
            .map(|(domain, _)| domain.to_string());

        if let Some(domain) = primary {
            self.primary_title = self
                .visits
                .iter()
                .rev()
                .find(|v| v.domain == domain)
                .and_then(|v| v.title.clone());
            self.primary_domain = Some(domain);
        }
    }
}
