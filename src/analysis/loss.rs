//! Daily loss analysis: a pure function from one day's committed sessions
//! to a categorized report of lost time.
//!
//! The five categories are computed independently and unioned; they measure
//! different kinds of cost, not mutually exclusive intervals.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::LossConfig;
use crate::models::{FocusState, Session};
use crate::rules::ActivityRules;

use super::types::{DailyLossReport, LossEvent, LossKind, MicroDistractionStat};

fn minutes(ms: u64) -> f64 {
    ms as f64 / 60_000.0
}

fn session_end(session: &Session) -> DateTime<Utc> {
    session
        .end_time
        .unwrap_or_else(|| session.start_time + chrono::Duration::milliseconds(session.active_ms as i64))
}

/// Analyze one day of sessions. Deterministic for a given session set;
/// empty input yields a zeroed report.
pub fn analyze_day(
    sessions: &[Session],
    date: NaiveDate,
    rules: &ActivityRules,
    config: &LossConfig,
) -> DailyLossReport {
    let mut report = DailyLossReport::empty(date);
    if sessions.is_empty() {
        return report;
    }

    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.start_time);

    let active: Vec<&Session> = ordered
        .iter()
        .copied()
        .filter(|s| s.focus_state == FocusState::Active)
        .collect();
    let productive: Vec<&Session> = active
        .iter()
        .copied()
        .filter(|s| rules.is_productive(s))
        .collect();

    let mut events = Vec::new();

    collect_idle_loss(&ordered, config, &mut events);
    collect_distraction_loss(&active, rules, config, &mut events, &mut report);
    collect_switching_storms(&active, config, &mut events);
    collect_recovery_loss(&ordered, rules, config, &mut events);
    collect_friction_loss(&productive, config, &mut events);

    for event in &events {
        match event.kind {
            LossKind::Idle => report.idle_loss_minutes += event.loss_minutes,
            LossKind::Distraction => report.distraction_loss_minutes += event.loss_minutes,
            LossKind::Switching => report.switching_loss_minutes += event.loss_minutes,
            LossKind::Recovery => report.recovery_loss_minutes += event.loss_minutes,
            LossKind::Friction => report.friction_loss_minutes += event.loss_minutes,
        }
        report.total_loss_minutes += event.loss_minutes;
    }

    events.sort_by_key(|e| e.start_time);
    report.loss_events = events;

    let active_ms: u64 = active.iter().map(|s| s.active_ms).sum();
    let productive_ms: u64 = productive.iter().map(|s| s.active_ms).sum();
    report.active_minutes = minutes(active_ms);
    report.productive_minutes = minutes(productive_ms);

    let active_hours = active_ms as f64 / 3_600_000.0;
    if active.len() > 1 && active_hours > 0.0 {
        report.switching_rate_per_hour = (active.len() - 1) as f64 / active_hours;
    }

    let fragmented_ms: u64 = productive
        .iter()
        .filter(|s| is_fragment(s, config))
        .map(|s| s.active_ms)
        .sum();
    if productive_ms > 0 {
        report.fragmentation_score = fragmented_ms as f64 / productive_ms as f64;
    }

    report.deep_block_count = productive
        .iter()
        .filter(|s| s.active_ms >= config.deep_block_ms)
        .count();

    report
}

fn is_fragment(session: &Session, config: &LossConfig) -> bool {
    session.active_ms >= config.fragment_min_ms && session.active_ms < config.fragment_max_ms
}

/// Idle sessions at or past the idle threshold lose their full duration.
fn collect_idle_loss(ordered: &[&Session], config: &LossConfig, events: &mut Vec<LossEvent>) {
    for session in ordered {
        if session.focus_state != FocusState::Idle || session.active_ms < config.idle_loss_ms {
            continue;
        }
        events.push(LossEvent {
            kind: LossKind::Idle,
            start_time: session.start_time,
            end_time: session_end(session),
            loss_minutes: minutes(session.active_ms),
            explanation: format!("Idle for {:.1} min", minutes(session.active_ms)),
            affected_sessions: vec![session.id.clone()],
        });
    }
}

/// All-or-nothing: crossing the grace period converts the whole visit to
/// loss. Distractions under it are reported as micro-distractions instead.
fn collect_distraction_loss(
    active: &[&Session],
    rules: &ActivityRules,
    config: &LossConfig,
    events: &mut Vec<LossEvent>,
    report: &mut DailyLossReport,
) {
    let mut by_domain: HashMap<String, (usize, u64)> = HashMap::new();

    for session in active {
        if !rules.is_distraction(session) {
            continue;
        }

        let label = session
            .primary_domain
            .clone()
            .unwrap_or_else(|| session.app_name.clone());

        if session.active_ms > config.distraction_grace_ms {
            events.push(LossEvent {
                kind: LossKind::Distraction,
                start_time: session.start_time,
                end_time: session_end(session),
                loss_minutes: minutes(session.active_ms),
                explanation: format!("{:.1} min on {label}", minutes(session.active_ms)),
                affected_sessions: vec![session.id.clone()],
            });
        } else {
            report.micro_distraction_count += 1;
            report.micro_distraction_minutes += minutes(session.active_ms);
            let entry = by_domain.entry(label).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += session.active_ms;
        }
    }

    let mut breakdown: Vec<MicroDistractionStat> = by_domain
        .into_iter()
        .map(|(domain, (count, ms))| MicroDistractionStat {
            domain,
            count,
            minutes: minutes(ms),
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.minutes
            .partial_cmp(&a.minutes)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.domain.cmp(&b.domain))
    });
    report.micro_distractions_by_domain = breakdown;
}

/// Slide a fixed window across active sessions; a window whose switch rate
/// crosses the threshold becomes one storm event covering its actual
/// extent, and the window skips past everything it absorbed.
fn collect_switching_storms(active: &[&Session], config: &LossConfig, events: &mut Vec<LossEvent>) {
    let window = chrono::Duration::milliseconds(config.switching_window_ms as i64);
    let window_hours = config.switching_window_ms as f64 / 3_600_000.0;

    let mut i = 0;
    while i < active.len() {
        let window_start = active[i].start_time;
        let window_end = window_start + window;

        let mut j = i;
        while j + 1 < active.len() && active[j + 1].start_time < window_end {
            j += 1;
        }

        let count = j - i + 1;
        let rate = (count.saturating_sub(1)) as f64 / window_hours;
        if count > 1 && rate >= config.switching_storm_per_hour {
            let extent_end = active[i..=j]
                .iter()
                .map(|s| session_end(s))
                .max()
                .unwrap_or(window_end);
            let span_ms = (extent_end - window_start).num_milliseconds().max(0) as u64;

            events.push(LossEvent {
                kind: LossKind::Switching,
                start_time: window_start,
                end_time: extent_end,
                loss_minutes: minutes(span_ms) * config.storm_charge_ratio,
                explanation: format!(
                    "{count} switches in {:.0} min ({rate:.0}/hr)",
                    minutes(span_ms)
                ),
                affected_sessions: active[i..=j].iter().map(|s| s.id.clone()).collect(),
            });
            i = j + 1;
        } else {
            i += 1;
        }
    }
}

/// After each distraction, time spent before the next productive session is
/// "time to return to work"; the excess over the grace allowance is charged,
/// scanning at most the lookahead cap forward.
fn collect_recovery_loss(
    ordered: &[&Session],
    rules: &ActivityRules,
    config: &LossConfig,
    events: &mut Vec<LossEvent>,
) {
    for (index, session) in ordered.iter().enumerate() {
        if !rules.is_distraction(session) {
            continue;
        }

        let mut accumulated_ms: u64 = 0;
        let mut scanned = Vec::new();
        let mut recovery_end = session_end(session);

        for follower in ordered.iter().skip(index + 1) {
            if rules.is_productive(follower) {
                break;
            }
            accumulated_ms = accumulated_ms.saturating_add(follower.active_ms);
            scanned.push(follower.id.clone());
            recovery_end = session_end(follower);
            if accumulated_ms >= config.recovery_lookahead_ms {
                accumulated_ms = config.recovery_lookahead_ms;
                break;
            }
        }

        if accumulated_ms > config.recovery_grace_ms {
            let excess_ms = accumulated_ms - config.recovery_grace_ms;
            events.push(LossEvent {
                kind: LossKind::Recovery,
                start_time: session_end(session),
                end_time: recovery_end,
                loss_minutes: minutes(excess_ms),
                explanation: format!(
                    "{:.1} min to refocus after {}",
                    minutes(accumulated_ms),
                    session
                        .primary_domain
                        .as_deref()
                        .unwrap_or(&session.app_name)
                ),
                affected_sessions: scanned,
            });
        }
    }
}

/// Enough short productive bursts in one day indicate fractured attention;
/// a share of their combined time is charged as friction.
fn collect_friction_loss(productive: &[&Session], config: &LossConfig, events: &mut Vec<LossEvent>) {
    let fragments: Vec<&&Session> = productive
        .iter()
        .filter(|s| is_fragment(s, config))
        .collect();

    if fragments.len() < config.fragment_min_count {
        return;
    }

    let combined_ms: u64 = fragments.iter().map(|s| s.active_ms).sum();
    let start = fragments.iter().map(|s| s.start_time).min();
    let end = fragments.iter().map(|s| session_end(s)).max();
    let (Some(start), Some(end)) = (start, end) else {
        return;
    };

    events.push(LossEvent {
        kind: LossKind::Friction,
        start_time: start,
        end_time: end,
        loss_minutes: minutes(combined_ms) * config.friction_charge_ratio,
        explanation: format!(
            "{} fragmented work blocks totalling {:.1} min",
            fragments.len(),
            minutes(combined_ms)
        ),
        affected_sessions: fragments.iter().map(|s| s.id.clone()).collect(),
    });
}
