//! Cluster engine: groups a chronological, active-only session list into
//! contiguous focus threads and assigns each a best-guess label.
//!
//! Pure function over an immutable snapshot; label write-back is the
//! caller's concern, not part of clustering.

pub mod labeling;
pub mod merge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::models::{FocusState, Session};
use crate::rules::ActivityRules;

use labeling::{primary_app, primary_domain, suggest_label};
use merge::{should_merge, MergePair};

/// One coherent focus thread: a run of merged sessions with a label guess.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub session_ids: Vec<String>,
    pub suggested_label: Option<String>,
    pub confidence: f64,
    pub primary_app: Option<String>,
    pub primary_domain: Option<String>,
}

/// Group sessions into focus threads. Idle/away sessions never participate;
/// runs spanning less than the minimum cluster duration are dropped.
pub fn cluster_sessions(
    sessions: &[Session],
    rules: &ActivityRules,
    config: &ClusterConfig,
) -> Vec<ClusterResult> {
    let mut active: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.focus_state == FocusState::Active)
        .collect();
    active.sort_by_key(|s| s.start_time);

    if active.is_empty() {
        return Vec::new();
    }

    let mut clusters = Vec::new();
    let mut run: Vec<&Session> = vec![active[0]];

    for session in active.into_iter().skip(1) {
        let previous = run[run.len() - 1];
        let pair = MergePair::new(previous, session, rules);
        if should_merge(&pair, config) {
            run.push(session);
        } else {
            if let Some(cluster) = finalize_run(&run, rules, config) {
                clusters.push(cluster);
            }
            run = vec![session];
        }
    }
    if let Some(cluster) = finalize_run(&run, rules, config) {
        clusters.push(cluster);
    }

    clusters
}

fn finalize_run(
    run: &[&Session],
    rules: &ActivityRules,
    config: &ClusterConfig,
) -> Option<ClusterResult> {
    let first = run.first()?;
    let last = run.last()?;

    let end_time = last.end_time.unwrap_or_else(|| {
        last.start_time + chrono::Duration::milliseconds(last.active_ms as i64)
    });
    let span_ms = (end_time - first.start_time).num_milliseconds().max(0) as u64;
    if span_ms < config.min_cluster_ms {
        return None;
    }

    let suggestion = suggest_label(run, rules);

    Some(ClusterResult {
        start_time: first.start_time,
        end_time,
        session_ids: run.iter().map(|s| s.id.clone()).collect(),
        suggested_label: suggestion.label,
        confidence: suggestion.confidence,
        primary_app: primary_app(run),
        primary_domain: primary_domain(run),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use crate::rules::{CategoryRule, DomainLabelRule};
    use chrono::TimeZone;
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
        ActivityRules {
            categories,
            distraction_domains: vec!["youtube.com".into()],
            work_domains: vec!["github.com".into()],
            domain_labels: vec![DomainLabelRule {
                pattern: "github.com".into(),
                label: "Coding".into(),
            }],
            ..ActivityRules::default()
        }
    }

    fn session(
        id: &str,
        app: &str,
        activity: ActivityType,
        domain: Option<&str>,
        start_secs: i64,
        duration_secs: i64,
    ) -> Session {
        Session {
            id: id.into(),
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

    fn work(id: &str, start_secs: i64, duration_secs: i64) -> Session {
        session(
            id,
            "com.microsoft.VSCode",
            ActivityType::FocusedWork,
            None,
            start_secs,
            duration_secs,
        )
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(cluster_sessions(&[], &rules(), &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn contiguous_same_app_sessions_form_one_thread() {
        let sessions = vec![work("a", 0, 300), work("b", 320, 300), work("c", 640, 300)];
        let clusters = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].session_ids, vec!["a", "b", "c"]);
        assert_eq!(clusters[0].start_time, ts(0));
        assert_eq!(clusters[0].end_time, ts(940));
        assert_eq!(
            clusters[0].primary_app.as_deref(),
            Some("com.microsoft.VSCode")
        );
    }

    #[test]
    fn long_gap_splits_threads() {
        let sessions = vec![work("a", 0, 300), work("b", 700, 300)];
        let clusters = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn runs_under_minimum_span_are_dropped() {
        // A lone 100s session spans less than the 3 min minimum.
        let sessions = vec![work("a", 0, 100), work("b", 1000, 300)];
        let clusters = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].session_ids, vec!["b"]);
    }

    #[test]
    fn idle_sessions_never_participate() {
        let mut idle = work("idle", 310, 300);
        idle.focus_state = FocusState::Idle;
        idle.activity_type = ActivityType::Idle;
        let sessions = vec![work("a", 0, 300), idle, work("b", 620, 300)];

        let clusters = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());
        assert!(clusters
            .iter()
            .all(|c| !c.session_ids.contains(&"idle".to_string())));
    }

    #[test]
    fn user_label_wins_over_domain_rule() {
        let mut s = session(
            "a",
            "com.apple.Safari",
            ActivityType::Browser,
            Some("github.com"),
            0,
            600,
        );
        s.user_label = Some("Deep Work".into());

        let clusters = cluster_sessions(&[s], &rules(), &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].suggested_label.as_deref(), Some("Deep Work"));
        assert_eq!(clusters[0].confidence, 1.0);
    }

    #[test]
    fn domain_rule_labels_browser_threads() {
        let a = session(
            "a",
            "com.apple.Safari",
            ActivityType::Browser,
            Some("github.com"),
            0,
            600,
        );
        let b = session(
            "b",
            "com.apple.Safari",
            ActivityType::Browser,
            Some("github.com"),
            620,
            300,
        );

        let clusters = cluster_sessions(&[a, b], &rules(), &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].suggested_label.as_deref(), Some("Coding"));
        assert_eq!(clusters[0].confidence, 0.9);
        assert_eq!(clusters[0].primary_domain.as_deref(), Some("github.com"));
    }

    #[test]
    fn distraction_break_starts_a_new_thread() {
        let work_block = work("w", 0, 900);
        let tube = session(
            "t",
            "com.apple.Safari",
            ActivityType::Browser,
            Some("youtube.com"),
            910,
            400,
        );
        let clusters = cluster_sessions(&[work_block, tube], &rules(), &ClusterConfig::default());

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].session_ids, vec!["w"]);
        assert_eq!(clusters[1].session_ids, vec!["t"]);
    }

    #[test]
    fn cluster_sessions_is_idempotent() {
        let sessions = vec![
            work("a", 0, 300),
            work("b", 320, 300),
            session(
                "c",
                "com.apple.Safari",
                ActivityType::Browser,
                Some("youtube.com"),
                1200,
                400,
            ),
            work("d", 1700, 300),
        ];
        let first = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());
        let second = cluster_sessions(&sessions, &rules(), &ClusterConfig::default());
        assert_eq!(first, second);
    }
}
