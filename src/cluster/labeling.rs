//! Label suggestion for a focus thread: a resolver cascade evaluated in
//! priority order, each resolver independently answering or passing.

use std::collections::HashMap;

use crate::models::Session;
use crate::rules::ActivityRules;

/// A suggested label and how much to trust it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSuggestion {
    pub label: Option<String>,
    pub confidence: f64,
}

type LabelResolver = fn(&[&Session], &ActivityRules) -> Option<LabelSuggestion>;

/// Highest priority first; the first resolver with an answer wins.
const LABEL_RESOLVERS: &[(&str, LabelResolver)] = &[
    ("user_label", user_label),
    ("inferred_label", inferred_label),
    ("domain_rule", domain_rule),
    ("app_rule", app_rule),
    ("plurality_activity", plurality_activity),
];

pub fn suggest_label(members: &[&Session], rules: &ActivityRules) -> LabelSuggestion {
    for (_, resolver) in LABEL_RESOLVERS {
        if let Some(suggestion) = resolver(members, rules) {
            return suggestion;
        }
    }
    LabelSuggestion {
        label: None,
        confidence: 0.0,
    }
}

/// A label the user assigned to any member is taken verbatim.
fn user_label(members: &[&Session], _rules: &ActivityRules) -> Option<LabelSuggestion> {
    members
        .iter()
        .find_map(|s| s.user_label.clone())
        .map(|label| LabelSuggestion {
            label: Some(label),
            confidence: 1.0,
        })
}

/// A label inferred by an external classification pass.
fn inferred_label(members: &[&Session], _rules: &ActivityRules) -> Option<LabelSuggestion> {
    members
        .iter()
        .find_map(|s| s.inferred_label.clone())
        .map(|label| LabelSuggestion {
            label: Some(label),
            confidence: 0.95,
        })
}

/// The most time-weighted member domain, matched against the domain rules.
fn domain_rule(members: &[&Session], rules: &ActivityRules) -> Option<LabelSuggestion> {
    primary_domain(members)
        .and_then(|domain| rules.label_for_domain(&domain))
        .map(|label| LabelSuggestion {
            label: Some(label.to_string()),
            confidence: 0.9,
        })
}

/// The most time-weighted member app, matched against the app rules.
fn app_rule(members: &[&Session], rules: &ActivityRules) -> Option<LabelSuggestion> {
    primary_app(members)
        .and_then(|app| rules.label_for_app(&app))
        .map(|label| LabelSuggestion {
            label: Some(label.to_string()),
            confidence: 0.85,
        })
}

/// Fallback: the duration-weighted plurality activity type's display name.
fn plurality_activity(members: &[&Session], _rules: &ActivityRules) -> Option<LabelSuggestion> {
    let mut totals = HashMap::new();
    for session in members {
        *totals.entry(session.activity_type).or_insert(0u64) += session.active_ms;
    }

    totals
        .into_iter()
        .max_by_key(|(activity, total)| (*total, activity.as_str()))
        .map(|(activity, _)| LabelSuggestion {
            label: Some(activity.display_name().to_string()),
            confidence: 0.5,
        })
}

/// Domain that accumulated the most total member duration.
pub(crate) fn primary_domain(members: &[&Session]) -> Option<String> {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for session in members {
        if let Some(domain) = session.primary_domain.as_deref() {
            *totals.entry(domain).or_insert(0) += session.active_ms;
        }
    }
    totals
        .into_iter()
        .max_by_key(|(domain, total)| (*total, std::cmp::Reverse(*domain)))
        .map(|(domain, _)| domain.to_string())
}

/// App that accumulated the most total member duration.
pub(crate) fn primary_app(members: &[&Session]) -> Option<String> {
    let mut totals: HashMap<&str, u64> = HashMap::new();
    for session in members {
        *totals.entry(session.app_identifier.as_str()).or_insert(0) += session.active_ms;
    }
    totals
        .into_iter()
        .max_by_key(|(app, total)| (*total, std::cmp::Reverse(*app)))
        .map(|(app, _)| app.to_string())
}
