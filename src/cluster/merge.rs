//! Merge decision between consecutive sessions.
//!
//! An ordered list of pure rules, evaluated top to bottom; the first rule
//! with an opinion decides whether the later session joins the earlier
//! session's focus thread.

use crate::config::ClusterConfig;
use crate::models::Session;
use crate::rules::ActivityRules;

/// Precomputed facts about an adjacent (earlier, later) session pair.
pub struct MergePair<'a> {
    pub earlier: &'a Session,
    pub later: &'a Session,
    pub gap_ms: i64,
    pub earlier_distraction: bool,
    pub later_distraction: bool,
    pub earlier_productive: bool,
    pub later_productive: bool,
    pub earlier_communication: bool,
    pub later_communication: bool,
}

impl<'a> MergePair<'a> {
    pub fn new(earlier: &'a Session, later: &'a Session, rules: &ActivityRules) -> Self {
        let earlier_end = earlier
            .end_time
            .unwrap_or_else(|| {
                earlier.start_time + chrono::Duration::milliseconds(earlier.active_ms as i64)
            });
        Self {
            earlier,
            later,
            gap_ms: (later.start_time - earlier_end).num_milliseconds(),
            earlier_distraction: rules.is_distraction(earlier),
            later_distraction: rules.is_distraction(later),
            earlier_productive: rules.is_productive(earlier),
            later_productive: rules.is_productive(later),
            earlier_communication: rules.is_communication(earlier),
            later_communication: rules.is_communication(later),
        }
    }
}

type MergeRule = fn(&MergePair<'_>, &ClusterConfig) -> Option<bool>;

/// Evaluated in priority order; first `Some` wins, exhaustion means no merge.
const MERGE_RULES: &[(&str, MergeRule)] = &[
    ("gap_exceeds_max", gap_exceeds_max),
    ("focus_break_boundary", focus_break_boundary),
    ("quick_check_tolerated", quick_check_tolerated),
    ("distraction_streak", distraction_streak),
    ("same_context", same_context),
    ("related_within_minute", related_within_minute),
    ("tight_gap", tight_gap),
];

pub fn should_merge(pair: &MergePair<'_>, config: &ClusterConfig) -> bool {
    for (_, rule) in MERGE_RULES {
        if let Some(decision) = rule(pair, config) {
            return decision;
        }
    }
    false
}

fn gap_exceeds_max(pair: &MergePair<'_>, config: &ClusterConfig) -> Option<bool> {
    (pair.gap_ms > config.max_gap_ms as i64).then_some(false)
}

/// Leaving productive work for a distraction is a hard thread boundary.
fn focus_break_boundary(pair: &MergePair<'_>, _config: &ClusterConfig) -> Option<bool> {
    (pair.earlier_productive && !pair.earlier_distraction && pair.later_distraction)
        .then_some(false)
}

/// A brief non-distracting check doesn't break the thread it interrupted.
fn quick_check_tolerated(pair: &MergePair<'_>, config: &ClusterConfig) -> Option<bool> {
    (pair.earlier.active_ms < config.short_interruption_ms && !pair.later_distraction)
        .then_some(true)
}

fn distraction_streak(pair: &MergePair<'_>, _config: &ClusterConfig) -> Option<bool> {
    (pair.earlier_distraction && pair.later_distraction).then_some(true)
}

fn same_context(pair: &MergePair<'_>, _config: &ClusterConfig) -> Option<bool> {
    if pair.earlier.app_identifier == pair.later.app_identifier {
        return Some(true);
    }
    match (
        pair.earlier.primary_domain.as_deref(),
        pair.later.primary_domain.as_deref(),
    ) {
        (Some(a), Some(b)) if a == b => Some(true),
        _ => None,
    }
}

fn related_within_minute(pair: &MergePair<'_>, config: &ClusterConfig) -> Option<bool> {
    let related = (pair.earlier_productive && pair.later_productive)
        || (pair.earlier_communication && pair.later_communication);
    (pair.gap_ms < config.related_gap_ms as i64 && related).then_some(true)
}

fn tight_gap(pair: &MergePair<'_>, config: &ClusterConfig) -> Option<bool> {
    (pair.gap_ms < config.default_gap_ms as i64).then_some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActivityType, FocusState};
    use crate::rules::CategoryRule;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn rules() -> ActivityRules {
        let mut categories = HashMap::new();
        categories.insert(
            "com.microsoft.VSCode".to_string(),
            CategoryRule {
                activity_type: ActivityType::FocusedWork,
                ambiguous: false,
            },
        );
        categories.insert(
            "com.apple.Terminal".to_string(),
            CategoryRule {
                activity_type: ActivityType::FocusedWork,
                ambiguous: false,
            },
        );
        categories.insert(
            "com.tinyspeck.slackmacgap".to_string(),
            CategoryRule {
                activity_type: ActivityType::Communication,
                ambiguous: false,
            },
        );
        ActivityRules {
            categories,
            distraction_domains: vec!["youtube.com".into()],
            ..ActivityRules::default()
        }
    }

    fn session(
        app: &str,
        activity: ActivityType,
        domain: Option<&str>,
        start_secs: i64,
        duration_secs: i64,
    ) -> Session {
        Session {
            id: format!("{app}-{start_secs}"),
            app_identifier: app.into(),
            app_name: app.into(),
            focus_state: FocusState::Active,
            start_time: ts(start_secs),
            end_time: Some(ts(start_secs + duration_secs)),
            active_ms: (duration_secs * 1000) as u64,
            last_resumed_at: None,
            activity_type: activity,
            confidence: 1.0,
            unknown_reason: None,
            needs_review: false,
            primary_domain: domain.map(Into::into),
            primary_title: None,
            visits: Vec::new(),
            task_id: None,
            user_label: None,
            inferred_label: None,
            micro_interruptions: 0,
        }
    }

    fn decide(a: &Session, b: &Session) -> bool {
        let rules = rules();
        should_merge(&MergePair::new(a, b, &rules), &ClusterConfig::default())
    }

    #[test]
    fn gap_over_max_never_merges_even_same_app() {
        let a = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 0, 600);
        let b = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 1000, 600);
        assert!(!decide(&a, &b));
    }

    #[test]
    fn productive_to_distraction_is_a_hard_boundary() {
        let a = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 0, 600);
        let b = session(
            "com.apple.Safari",
            ActivityType::Browser,
            Some("youtube.com"),
            610,
            600,
        );
        assert!(!decide(&a, &b));
    }

    #[test]
    fn short_non_distracting_interruption_merges() {
        // 90s Slack check followed by more work, different apps.
        let a = session("com.tinyspeck.slackmacgap", ActivityType::Communication, None, 0, 90);
        let b = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 200, 600);
        assert!(decide(&a, &b));
    }

    #[test]
    fn distraction_streaks_stay_together() {
        let a = session(
            "com.apple.Safari",
            ActivityType::Browser,
            Some("youtube.com"),
            0,
            300,
        );
        let b = session(
            "com.apple.Safari",
            ActivityType::Browser,
            Some("news.youtube.com"),
            420,
            300,
        );
        assert!(decide(&a, &b));
    }

    #[test]
    fn same_app_or_domain_merges() {
        let a = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 0, 600);
        let b = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 800, 600);
        assert!(decide(&a, &b));

        let a = session("com.apple.Safari", ActivityType::Browser, Some("github.com"), 0, 600);
        let b = session("com.google.Chrome", ActivityType::Browser, Some("github.com"), 800, 600);
        assert!(decide(&a, &b));
    }

    #[test]
    fn related_pairs_merge_only_under_a_minute() {
        let a = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 0, 600);
        let near = session("com.apple.Terminal", ActivityType::FocusedWork, None, 645, 600);
        let far = session("com.apple.Terminal", ActivityType::FocusedWork, None, 700, 600);
        assert!(decide(&a, &near));
        assert!(!decide(&a, &far));
    }

    #[test]
    fn unrelated_pairs_need_a_tight_gap() {
        let a = session("com.microsoft.VSCode", ActivityType::FocusedWork, None, 0, 600);
        let near = session("com.example.unknown", ActivityType::Unknown, None, 620, 600);
        let far = session("com.example.unknown", ActivityType::Unknown, None, 645, 600);
        assert!(decide(&a, &near));
        assert!(!decide(&a, &far));
    }
}
