//! User-editable classification rules: app-category mapping, distraction
//! allow/deny lists, and the label rule tables used by clustering.
//!
//! `ActivityRules` is the immutable snapshot the tracker, analyzer, and
//! cluster engine consume; `RulesStore` persists it as JSON and hands out
//! snapshots.

use std::collections::HashMap;
use std::{fs, path::PathBuf, sync::RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{ActivityType, FocusState, Session};

/// One app-category mapping entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRule {
    pub activity_type: ActivityType,
    /// Ambiguous rules classify at half confidence and flag for review.
    #[serde(default)]
    pub ambiguous: bool,
}

/// Substring match against a visit domain, mapping to a suggested label.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainLabelRule {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityRules {
    /// app identifier -> category rule
    pub categories: HashMap<String, CategoryRule>,
    pub distraction_domains: Vec<String>,
    pub distraction_apps: Vec<String>,
    pub work_domains: Vec<String>,
    pub communication_domains: Vec<String>,
    pub domain_labels: Vec<DomainLabelRule>,
    /// app identifier -> label, exact match
    pub app_labels: HashMap<String, String>,
}

impl ActivityRules {
    pub fn category_for(&self, app_identifier: &str) -> Option<&CategoryRule> {
        self.categories.get(app_identifier)
    }

    pub fn is_distraction_domain(&self, domain: &str) -> bool {
        self.distraction_domains
            .iter()
            .any(|deny| domain.contains(deny.as_str()))
    }

    pub fn is_work_domain(&self, domain: &str) -> bool {
        self.work_domains
            .iter()
            .any(|allow| domain.contains(allow.as_str()))
    }

    pub fn is_communication_domain(&self, domain: &str) -> bool {
        self.communication_domains
            .iter()
            .any(|entry| domain.contains(entry.as_str()))
    }

    /// The distraction oracle: app deny list, domain deny list, or an
    /// entertainment classification. Idle/away sessions are never
    /// distractions, they are accounted separately.
    pub fn is_distraction(&self, session: &Session) -> bool {
        if session.focus_state != FocusState::Active {
            return false;
        }
        if self
            .distraction_apps
            .iter()
            .any(|app| app == &session.app_identifier)
        {
            return true;
        }
        if let Some(domain) = session.primary_domain.as_deref() {
            if self.is_distraction_domain(domain) {
                return true;
            }
        }
        session.activity_type == ActivityType::Entertainment
    }

    /// Productive = actively focused, not a distraction, and either a work
    /// activity type or a browser session on a work domain.
    pub fn is_productive(&self, session: &Session) -> bool {
        if session.focus_state != FocusState::Active || self.is_distraction(session) {
            return false;
        }
        match session.activity_type {
            ActivityType::FocusedWork | ActivityType::Admin | ActivityType::Reference => true,
            ActivityType::Browser => session
                .primary_domain
                .as_deref()
                .map(|domain| self.is_work_domain(domain))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn is_communication(&self, session: &Session) -> bool {
        if session.activity_type == ActivityType::Communication {
            return true;
        }
        session
            .primary_domain
            .as_deref()
            .map(|domain| self.is_communication_domain(domain))
            .unwrap_or(false)
    }

    pub fn label_for_domain(&self, domain: &str) -> Option<&str> {
        self.domain_labels
            .iter()
            .find(|rule| domain.contains(rule.pattern.as_str()))
            .map(|rule| rule.label.as_str())
    }

    pub fn label_for_app(&self, app_identifier: &str) -> Option<&str> {
        self.app_labels.get(app_identifier).map(String::as_str)
    }
}

/// File-backed rule store. Missing or corrupt files fall back to defaults
/// so a bad edit never blocks tracking.
pub struct RulesStore {
    path: PathBuf,
    data: RwLock<ActivityRules>,
}

impl RulesStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read rules from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ActivityRules::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// In-memory store for tests and embedding callers that manage their own
    /// persistence.
    pub fn in_memory(rules: ActivityRules) -> Self {
        Self {
            path: PathBuf::new(),
            data: RwLock::new(rules),
        }
    }

    pub fn snapshot(&self) -> ActivityRules {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, rules: ActivityRules) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = rules;
            if !self.path.as_os_str().is_empty() {
                self.persist(&guard)?;
            }
        }
        Ok(())
    }

    fn persist(&self, data: &ActivityRules) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write rules to {}", self.path.display()))
    }
}
