//! Classification applied when a pending segment commits into a session.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ActivityType, FocusState, Session, UnknownReason};
use crate::rules::ActivityRules;

const REVIEW_CONFIDENCE_FLOOR: f64 = 0.8;

/// Resolve activity type, confidence, and review reason for a committing
/// segment. Idle/away states classify directly; active states go through
/// the user's app-category rules and fall back to `Unknown` (an expected,
/// reviewable state, not a fault).
pub fn classification_for(
    app_identifier: &str,
    focus_state: FocusState,
    rules: &ActivityRules,
) -> (ActivityType, f64, Option<UnknownReason>) {
    match focus_state {
        FocusState::Idle => (ActivityType::Idle, 1.0, None),
        FocusState::Away => (ActivityType::Away, 1.0, None),
        FocusState::Active => match rules.category_for(app_identifier) {
            Some(rule) if rule.ambiguous => (
                rule.activity_type,
                0.5,
                Some(UnknownReason::AmbiguousApp),
            ),
            Some(rule) => (rule.activity_type, 1.0, None),
            None => (ActivityType::Unknown, 0.0, Some(UnknownReason::UnmappedApp)),
        },
    }
}

pub fn needs_review(activity_type: ActivityType, confidence: f64) -> bool {
    activity_type == ActivityType::Unknown || confidence < REVIEW_CONFIDENCE_FLOOR
}

/// Build a freshly-opened, classified session starting at `start_time`.
pub fn build_session(
    app_identifier: &str,
    app_name: &str,
    focus_state: FocusState,
    start_time: DateTime<Utc>,
    rules: &ActivityRules,
) -> Session {
    let (activity_type, confidence, unknown_reason) =
        classification_for(app_identifier, focus_state, rules);

    Session {
        id: Uuid::new_v4().to_string(),
        app_identifier: app_identifier.to_string(),
        app_name: app_name.to_string(),
        focus_state,
        start_time,
        end_time: None,
        active_ms: 0,
        last_resumed_at: Some(start_time),
        activity_type,
        confidence,
        unknown_reason,
        needs_review: needs_review(activity_type, confidence),
        primary_domain: None,
        primary_title: None,
        visits: Vec::new(),
        task_id: None,
        user_label: None,
        inferred_label: None,
        micro_interruptions: 0,
    }
}
