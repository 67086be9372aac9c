//! Session state machine: turns the live observation stream and browser
//! domain-change events into deduplicated, persisted session records.
//!
//! Single-writer actor. Every handler and timer callback serializes
//! through one `tokio::sync::Mutex` over the tracker state, so "at most
//! one open session" holds across observations, delayed commits, and
//! heartbeats. Persistence is best-effort: in-memory state is
//! authoritative, failed writes are logged and recorded as advisory
//! `last_error`, never blocking the stream.

pub mod classify;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::db::Database;
use crate::models::{
    BrowserVisit, DomainChange, FocusState, Observation, PendingSegment, Session,
};
use crate::rules::RulesStore;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

struct RecentClosed {
    closed_at: DateTime<Utc>,
    session: Session,
}

#[derive(Default)]
struct TrackerState {
    open: Option<Session>,
    pending: Option<PendingSegment>,
    /// Delayed recheck for the pending segment; aborted whenever the
    /// pending segment is replaced or discarded.
    pending_task: Option<JoinHandle<()>>,
    recent_closed: Vec<RecentClosed>,
    last_event_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

#[derive(Clone)]
pub struct SessionTracker {
    state: Arc<Mutex<TrackerState>>,
    db: Database,
    rules: Arc<RulesStore>,
    config: TrackerConfig,
    heartbeat: Arc<Mutex<Option<JoinHandle<()>>>>,
    cancel: CancellationToken,
}

impl SessionTracker {
    pub fn new(db: Database, rules: Arc<RulesStore>, config: TrackerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState::default())),
            db,
            rules,
            config,
            heartbeat: Arc::new(Mutex::new(None)),
            cancel: CancellationToken::new(),
        }
    }

    /// Close sessions left open by an ungraceful shutdown. The crash time is
    /// unknown, so each orphan is closed a fixed buffer past its last known
    /// resume point rather than at "now". Call once before `start`.
    pub async fn recover_orphans(&self) -> Result<usize> {
        let orphans = self.db.get_open_sessions().await?;
        let buffer = chrono::Duration::milliseconds(self.config.orphan_close_buffer_ms as i64);
        let count = orphans.len();

        for mut session in orphans {
            let base = session.last_resumed_at.unwrap_or(session.start_time);
            let assumed_end = base + buffer;

            if session.last_resumed_at.is_some() {
                session.active_ms = session
                    .active_ms
                    .saturating_add(self.config.orphan_close_buffer_ms);
            }
            session.end_time = Some(assumed_end);
            session.last_resumed_at = None;

            for visit in session.visits.iter_mut().filter(|v| v.end_time.is_none()) {
                visit.end_time = Some(assumed_end);
                if let Err(err) = self.db.close_visit(&visit.id, assumed_end).await {
                    log_error!("failed to close orphaned visit {}: {err:#}", visit.id);
                }
            }
            session.recompute_primary_visit();

            if session.active_ms < self.config.commit_threshold_ms {
                log_info!("discarding sub-threshold orphan session {}", session.id);
                if let Err(err) = self.db.delete_session(&session.id).await {
                    log_error!("failed to delete orphan session {}: {err:#}", session.id);
                }
            } else {
                log_warn!(
                    "recovered orphan session {} for {}; closed at {}",
                    session.id,
                    session.app_identifier,
                    assumed_end
                );
                if let Err(err) = self.db.close_session(&session, assumed_end).await {
                    log_error!("failed to close orphan session {}: {err:#}", session.id);
                }
            }
        }

        Ok(count)
    }

    /// Spawn the heartbeat: while a session is open, periodically fold
    /// elapsed time into its accumulated total and persist, bounding data
    /// loss on unexpected termination to one interval.
    pub async fn start(&self) {
        let mut guard = self.heartbeat.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let tracker = self.clone();
        let cancel = self.cancel.clone();
        let interval = Duration::from_millis(self.config.heartbeat_interval_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracker.heartbeat_tick(Utc::now()).await;
                    }
                    _ = cancel.cancelled() => {
                        log_info!("heartbeat shutting down");
                        break;
                    }
                }
            }
        });

        *guard = Some(handle);
    }

    /// Handle one focus/idle observation from the OS watcher.
    pub async fn on_observation(&self, obs: Observation) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = obs.timestamp;

        if let Some(last) = state.last_event_at {
            if now < last {
                log_warn!(
                    "rejecting out-of-order observation for {} ({now} < {last})",
                    obs.app_identifier
                );
                return Ok(());
            }
        }
        state.last_event_at = Some(now);
        self.prune_recent(&mut state, now);

        // Already tracking this exact (app, state): the interruption that
        // produced any pending segment was too short to matter.
        let matches_open = state
            .open
            .as_ref()
            .map(|open| {
                open.app_identifier == obs.app_identifier && open.focus_state == obs.focus_state
            })
            .unwrap_or(false);
        if matches_open {
            Self::discard_pending(&mut state);
            return Ok(());
        }

        // Merge-back: a recently closed session for this (app, state) is
        // resumed instead of fragmenting the record. Ties go to the most
        // recently closed candidate.
        if let Some(index) = Self::merge_candidate(&state, &obs) {
            Self::discard_pending(&mut state);
            self.close_open(&mut state, now).await;

            let mut session = state.recent_closed.remove(index).session;
            session.end_time = None;
            session.last_resumed_at = Some(now);
            session.micro_interruptions += 1;

            if let Err(err) = self
                .db
                .reopen_session(&session.id, now, session.micro_interruptions)
                .await
            {
                state.last_error = Some(format!("reopen failed: {err:#}"));
                log_error!("failed to persist merge-back for {}: {err:#}", session.id);
            }

            log_info!(
                "merged back into session {} for {} (interruption #{})",
                session.id,
                session.app_identifier,
                session.micro_interruptions
            );
            state.open = Some(session);
            return Ok(());
        }

        // Pending segment: commit if it held focus long enough, otherwise
        // drop it silently as noise.
        if let Some(pending) = state.pending.take() {
            if let Some(task) = state.pending_task.take() {
                task.abort();
            }
            if pending.elapsed_ms(now) >= self.config.commit_threshold_ms {
                self.commit_pending(&mut state, pending).await;
            }
        }

        // Start the new candidate and schedule the forced-commit recheck in
        // case focus parks here with no further events.
        let pending = PendingSegment::from_observation(&obs);
        let started = pending.start_time;
        state.pending = Some(pending);
        state.pending_task = Some(self.spawn_commit_check(started));

        Ok(())
    }

    /// Handle an active-tab domain switch. Closes the current session and
    /// immediately opens a new one for the same app on the new domain, so
    /// each domain visit is classified and labeled independently.
    pub async fn on_domain_change(&self, change: DomainChange) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = change.timestamp;

        if let Some(last) = state.last_event_at {
            if now < last {
                log_warn!(
                    "rejecting out-of-order domain change to {} ({now} < {last})",
                    change.new_domain
                );
                return Ok(());
            }
        }
        state.last_event_at = Some(now);
        self.prune_recent(&mut state, now);

        let Some(open) = &state.open else {
            log_warn!(
                "domain change to {} with no open session; ignoring",
                change.new_domain
            );
            return Ok(());
        };
        let app_identifier = open.app_identifier.clone();
        let app_name = open.app_name.clone();

        // The user is demonstrably still browsing; any pending segment from
        // a focus flicker is stale.
        Self::discard_pending(&mut state);
        self.close_open(&mut state, now).await;

        let rules = self.rules.snapshot();
        let mut session = classify::build_session(
            &app_identifier,
            &app_name,
            FocusState::Active,
            now,
            &rules,
        );

        let visit = BrowserVisit {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            start_time: now,
            end_time: None,
            domain: change.new_domain.clone(),
            title: change.title.clone(),
            is_distraction: rules.is_distraction_domain(&change.new_domain),
        };
        session.primary_domain = Some(change.new_domain.clone());
        session.primary_title = change.title.clone();
        session.visits.push(visit.clone());

        if let Err(err) = self.db.insert_session(&session).await {
            state.last_error = Some(format!("session insert failed: {err:#}"));
            log_error!("failed to persist domain-split session {}: {err:#}", session.id);
        } else if let Err(err) = self.db.insert_visit(&visit).await {
            state.last_error = Some(format!("visit insert failed: {err:#}"));
            log_error!("failed to persist visit {}: {err:#}", visit.id);
        }

        log_info!(
            "domain split: {} -> {} (session {})",
            change.old_domain.as_deref().unwrap_or("-"),
            change.new_domain,
            session.id
        );
        state.open = Some(session);
        Ok(())
    }

    /// "Set user label L on session X" command from the UI layer.
    pub async fn set_user_label(&self, session_id: &str, label: Option<String>) -> Result<()> {
        self.db.set_user_label(session_id, label.clone()).await?;
        let mut state = self.state.lock().await;
        if let Some(open) = state.open.as_mut() {
            if open.id == session_id {
                open.user_label = label;
            }
        }
        Ok(())
    }

    /// "Link session X to task Y" command from the UI layer.
    pub async fn assign_task(&self, session_id: &str, task_id: Option<String>) -> Result<()> {
        self.db.assign_task(session_id, task_id.clone()).await?;
        let mut state = self.state.lock().await;
        if let Some(open) = state.open.as_mut() {
            if open.id == session_id {
                open.task_id = task_id;
            }
        }
        Ok(())
    }

    pub async fn open_session(&self) -> Option<Session> {
        self.state.lock().await.open.clone()
    }

    /// Advisory failure state; never blocks tracking.
    pub async fn last_error(&self) -> Option<String> {
        self.state.lock().await.last_error.clone()
    }

    /// Cancel timers, fold outstanding time, and close the open session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }

        let mut state = self.state.lock().await;
        Self::discard_pending(&mut state);
        let now = state.last_event_at.map_or_else(Utc::now, |last| last.max(Utc::now()));
        self.close_open(&mut state, now).await;
        log_info!("tracker shut down");
    }

    async fn heartbeat_tick(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let Some(open) = state.open.as_mut() else {
            return;
        };
        let Some(resumed) = open.last_resumed_at else {
            return;
        };

        let elapsed = (now - resumed).num_milliseconds().max(0) as u64;
        open.active_ms = open.active_ms.saturating_add(elapsed);
        open.last_resumed_at = Some(now);

        let session_id = open.id.clone();
        let active_ms = open.active_ms;
        if let Err(err) = self
            .db
            .update_session_progress(&session_id, active_ms, Some(now), now)
            .await
        {
            // Retried implicitly on the next interval.
            state.last_error = Some(format!("heartbeat save failed: {err:#}"));
            log_warn!("heartbeat save failed for {session_id}: {err:#}");
        }
    }

    fn discard_pending(state: &mut TrackerState) {
        state.pending = None;
        if let Some(task) = state.pending_task.take() {
            task.abort();
        }
    }

    fn merge_candidate(state: &TrackerState, obs: &Observation) -> Option<usize> {
        state
            .recent_closed
            .iter()
            .enumerate()
            .filter(|(_, recent)| {
                recent.session.app_identifier == obs.app_identifier
                    && recent.session.focus_state == obs.focus_state
            })
            .max_by_key(|(_, recent)| recent.closed_at)
            .map(|(index, _)| index)
    }

    fn prune_recent(&self, state: &mut TrackerState, now: DateTime<Utc>) {
        let horizon = chrono::Duration::milliseconds(self.config.merge_threshold_ms as i64);
        state.recent_closed.retain(|recent| now - recent.closed_at <= horizon);
    }

    /// Commit a debounced segment: the previous session ends where the
    /// segment began, and a new classified session opens in its place.
    async fn commit_pending(&self, state: &mut TrackerState, pending: PendingSegment) {
        self.close_open(state, pending.start_time).await;

        let rules = self.rules.snapshot();
        let session = classify::build_session(
            &pending.app_identifier,
            &pending.app_name,
            pending.focus_state,
            pending.start_time,
            &rules,
        );

        if let Err(err) = self.db.insert_session(&session).await {
            state.last_error = Some(format!("session insert failed: {err:#}"));
            log_error!("failed to persist session {}: {err:#}", session.id);
        }

        log_info!(
            "committed session {} for {} ({})",
            session.id,
            session.app_identifier,
            session.activity_type.as_str()
        );
        state.open = Some(session);
    }

    /// Closing discipline: stop the open visit, recompute the primary
    /// domain, fold the final active stretch, then either discard the
    /// session as noise or register it for merge-back.
    async fn close_open(&self, state: &mut TrackerState, at: DateTime<Utc>) {
        let Some(mut session) = state.open.take() else {
            return;
        };
        let at = at.max(session.start_time);

        if let Some(visit) = session.visits.iter_mut().find(|v| v.end_time.is_none()) {
            visit.end_time = Some(at);
            if let Err(err) = self.db.close_visit(&visit.id, at).await {
                state.last_error = Some(format!("visit close failed: {err:#}"));
                log_error!("failed to close visit {}: {err:#}", visit.id);
            }
        }
        session.recompute_primary_visit();

        if let Some(resumed) = session.last_resumed_at.take() {
            let elapsed = (at - resumed).num_milliseconds().max(0) as u64;
            session.active_ms = session.active_ms.saturating_add(elapsed);
        }
        session.end_time = Some(at);

        if session.active_ms < self.config.commit_threshold_ms {
            // Too short to be a real session; treat as noise.
            if let Err(err) = self.db.delete_session(&session.id).await {
                state.last_error = Some(format!("session delete failed: {err:#}"));
                log_error!("failed to delete noise session {}: {err:#}", session.id);
            }
            return;
        }

        if let Err(err) = self.db.close_session(&session, at).await {
            state.last_error = Some(format!("session close failed: {err:#}"));
            log_error!("failed to close session {}: {err:#}", session.id);
        }

        state.recent_closed.push(RecentClosed {
            closed_at: at,
            session,
        });
    }

    /// Delayed recheck at the commit threshold: if the same segment is
    /// still pending, force the commit so a parked focus becomes a session
    /// without waiting for the next observation. Idempotent if it fires
    /// after the segment was replaced or the tracker torn down.
    fn spawn_commit_check(&self, started: DateTime<Utc>) -> JoinHandle<()> {
        let tracker = self.clone();
        let delay = Duration::from_millis(self.config.commit_threshold_ms);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = cancel.cancelled() => return,
            }

            let mut state = tracker.state.lock().await;
            let pending = match state.pending.take() {
                Some(p) if p.start_time == started => p,
                other => {
                    state.pending = other;
                    return;
                }
            };
            state.pending_task = None;

            if pending.elapsed_ms(Utc::now()) >= tracker.config.commit_threshold_ms {
                tracker.commit_pending(&mut state, pending).await;
            } else {
                state.pending = Some(pending);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use crate::rules::{ActivityRules, CategoryRule};
    use chrono::TimeZone;
    use std::collections::HashMap;

    const CODE: &str = "com.microsoft.VSCode";
    const SAFARI: &str = "com.apple.Safari";
    const SLACK: &str = "com.tinyspeck.slackmacgap";

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn test_rules() -> ActivityRules {
        let mut categories = HashMap::new();
        categories.insert(
            CODE.to_string(),
            CategoryRule {
                activity_type: ActivityType::FocusedWork,
                ambiguous: false,
            },
        );
        categories.insert(
            SAFARI.to_string(),
            CategoryRule {
                activity_type: ActivityType::Browser,
                ambiguous: false,
            },
        );
        categories.insert(
            SLACK.to_string(),
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

    fn tracker() -> SessionTracker {
        let db = Database::open_in_memory().expect("in-memory db");
        let rules = Arc::new(RulesStore::in_memory(test_rules()));
        SessionTracker::new(db, rules, TrackerConfig::default())
    }

    fn obs(app: &str, focus_state: FocusState, at_secs: i64) -> Observation {
        Observation {
            app_identifier: app.to_string(),
            app_name: app.rsplit('.').next().unwrap_or(app).to_string(),
            focus_state,
            timestamp: ts(at_secs),
        }
    }

    fn active(app: &str, at_secs: i64) -> Observation {
        obs(app, FocusState::Active, at_secs)
    }

    fn domain_change(new_domain: &str, title: Option<&str>, at_secs: i64) -> DomainChange {
        DomainChange {
            old_domain: None,
            new_domain: new_domain.to_string(),
            title: title.map(Into::into),
            rich_context: None,
            timestamp: ts(at_secs),
        }
    }

    async fn open_session_count(db: &Database) -> usize {
        db.get_open_sessions().await.expect("query open").len()
    }

    #[tokio::test]
    async fn commit_happens_after_threshold_and_closes_predecessor() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SAFARI, 10)).await.unwrap();
        tracker.on_observation(active(SLACK, 20)).await.unwrap();

        // Code committed when the Safari candidate arrived; Safari committed
        // when Slack arrived, closing Code at Safari's start.
        let open = tracker.open_session().await.expect("open session");
        assert_eq!(open.app_identifier, SAFARI);
        assert_eq!(open.start_time, ts(10));

        let sessions = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2);
        let code = sessions.iter().find(|s| s.app_identifier == CODE).unwrap();
        assert_eq!(code.end_time, Some(ts(10)));
        assert_eq!(code.active_ms, 10_000);

        assert_eq!(open_session_count(&tracker.db).await, 1);
    }

    #[tokio::test]
    async fn sub_threshold_segment_is_discarded_silently() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        // Slack flicker for 1s, below the 2s commit threshold.
        tracker.on_observation(active(SLACK, 10)).await.unwrap();
        tracker.on_observation(active(CODE, 11)).await.unwrap();
        tracker.on_observation(active(SAFARI, 30)).await.unwrap();

        let sessions = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap();
        assert!(sessions.iter().all(|s| s.app_identifier != SLACK));
    }

    #[tokio::test]
    async fn merge_back_resumes_recent_session_instead_of_fragmenting() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SLACK, 10)).await.unwrap();
        // Slack commits 3s in when the next candidate arrives, closing Code.
        tracker.on_observation(active(SAFARI, 13)).await.unwrap();
        // Back to Code 5s after it closed: merge-back, not a new session.
        tracker.on_observation(active(CODE, 15)).await.unwrap();

        let open = tracker.open_session().await.expect("open session");
        assert_eq!(open.app_identifier, CODE);
        assert_eq!(open.micro_interruptions, 1);
        assert_eq!(open.start_time, ts(0));
        assert_eq!(open.last_resumed_at, Some(ts(15)));

        let code_sessions: Vec<_> = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.app_identifier == CODE)
            .collect();
        assert_eq!(code_sessions.len(), 1, "exactly one Code session");
        assert_eq!(code_sessions[0].micro_interruptions, 1);
        assert_eq!(open_session_count(&tracker.db).await, 1);
    }

    #[tokio::test]
    async fn merge_back_is_skipped_outside_threshold() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SLACK, 10)).await.unwrap();
        tracker.on_observation(active(SAFARI, 15)).await.unwrap();
        // 45s after Code closed at t=10: past the 30s merge threshold.
        tracker.on_observation(active(CODE, 55)).await.unwrap();
        tracker.on_observation(active(SLACK, 70)).await.unwrap();

        let code_sessions: Vec<_> = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.app_identifier == CODE)
            .collect();
        assert_eq!(code_sessions.len(), 2, "two distinct Code sessions");
        assert!(code_sessions.iter().all(|s| s.micro_interruptions == 0));
    }

    #[tokio::test]
    async fn domain_change_splits_browsing_into_per_domain_sessions() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SAFARI, 10)).await.unwrap();
        // Safari commits via the next observation's step-3 evaluation.
        tracker.on_observation(active(SLACK, 13)).await.unwrap();
        tracker.on_observation(active(SAFARI, 60)).await.unwrap();
        tracker.on_observation(active(CODE, 65)).await.unwrap();
        // Safari open from t=60; now browse two domains.
        tracker
            .on_domain_change(domain_change("github.com", Some("PR #7"), 70))
            .await
            .unwrap();
        tracker
            .on_domain_change(domain_change("docs.rs", None, 130))
            .await
            .unwrap();
        // Leave the browser to close the docs.rs session.
        tracker.on_observation(active(CODE, 160)).await.unwrap();
        tracker.on_observation(active(SLACK, 200)).await.unwrap();

        let sessions = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap();
        let github: Vec<_> = sessions
            .iter()
            .filter(|s| s.primary_domain.as_deref() == Some("github.com"))
            .collect();
        let docs: Vec<_> = sessions
            .iter()
            .filter(|s| s.primary_domain.as_deref() == Some("docs.rs"))
            .collect();

        assert_eq!(github.len(), 1);
        assert_eq!(docs.len(), 1);
        assert_eq!(github[0].visits.len(), 1);
        assert_eq!(docs[0].visits.len(), 1);
        assert_eq!(github[0].visits[0].end_time, Some(ts(130)));
        assert_eq!(github[0].active_ms, 60_000);
        assert_eq!(docs[0].active_ms, 30_000);
        // Combined duration equals the whole browsing stretch t=70..160.
        assert_eq!(github[0].active_ms + docs[0].active_ms, 90_000);
        assert_eq!(github[0].primary_title.as_deref(), Some("PR #7"));
    }

    #[tokio::test]
    async fn out_of_order_observation_is_rejected() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 10)).await.unwrap();
        tracker.on_observation(active(SAFARI, 20)).await.unwrap();
        let before = tracker.open_session().await;

        tracker.on_observation(active(SLACK, 5)).await.unwrap();

        let after = tracker.open_session().await;
        assert_eq!(
            before.as_ref().map(|s| s.id.clone()),
            after.as_ref().map(|s| s.id.clone())
        );
        assert_eq!(open_session_count(&tracker.db).await, 1);
    }

    #[tokio::test]
    async fn idle_observation_opens_idle_session() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        // Idle pending commits when the next observation arrives at t=310,
        // closing the active Code session at the idle segment's start.
        tracker
            .on_observation(obs(CODE, FocusState::Idle, 10))
            .await
            .unwrap();
        tracker.on_observation(active(SLACK, 310)).await.unwrap();
        tracker.on_observation(active(CODE, 320)).await.unwrap();

        let sessions = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap();
        let idle = sessions
            .iter()
            .find(|s| s.focus_state == FocusState::Idle)
            .expect("idle session recorded");
        assert_eq!(idle.activity_type, ActivityType::Idle);
        assert_eq!(idle.confidence, 1.0);
        assert_eq!(idle.active_ms, 300_000);
    }

    #[tokio::test]
    async fn heartbeat_folds_elapsed_time_and_moves_anchor() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SAFARI, 10)).await.unwrap();
        // Safari is pending; Code is the open session resumed at t=0.
        tracker.heartbeat_tick(ts(40)).await;

        let open = tracker.open_session().await.expect("open session");
        assert_eq!(open.active_ms, 40_000);
        assert_eq!(open.last_resumed_at, Some(ts(40)));

        let persisted = tracker.db.get_open_sessions().await.unwrap();
        assert_eq!(persisted[0].active_ms, 40_000);
    }

    #[tokio::test]
    async fn orphaned_open_session_closes_at_bounded_time() {
        let db = Database::open_in_memory().unwrap();
        let rules = Arc::new(RulesStore::in_memory(test_rules()));
        let orphan = classify::build_session(
            CODE,
            "VSCode",
            FocusState::Active,
            ts(0),
            &rules.snapshot(),
        );
        let mut orphan = orphan;
        orphan.active_ms = 120_000;
        orphan.last_resumed_at = Some(ts(120));
        db.insert_session(&orphan).await.unwrap();

        let tracker = SessionTracker::new(db, rules, TrackerConfig::default());
        let recovered = tracker.recover_orphans().await.unwrap();
        assert_eq!(recovered, 1);

        let sessions = tracker
            .db
            .get_sessions_in_range(ts(-1), ts(1_000))
            .await
            .unwrap();
        // Closed 60s past the last resume point, not at "now".
        assert_eq!(sessions[0].end_time, Some(ts(180)));
        assert_eq!(sessions[0].active_ms, 180_000);
        assert_eq!(open_session_count(&tracker.db).await, 0);
    }

    #[tokio::test]
    async fn single_open_invariant_holds_across_arbitrary_sequences() {
        let tracker = tracker();
        let apps = [CODE, SAFARI, SLACK];
        let states = [FocusState::Active, FocusState::Idle, FocusState::Active];
        for step in 0..30 {
            let app = apps[step % apps.len()];
            let state = states[step % states.len()];
            tracker
                .on_observation(obs(app, state, (step as i64) * 7))
                .await
                .unwrap();
        }

        assert!(open_session_count(&tracker.db).await <= 1);
    }

    #[tokio::test]
    async fn label_and_task_commands_patch_open_session() {
        let tracker = tracker();
        tracker.on_observation(active(CODE, 0)).await.unwrap();
        tracker.on_observation(active(SAFARI, 10)).await.unwrap();
        let open = tracker.open_session().await.expect("open session");

        tracker
            .set_user_label(&open.id, Some("Deep Work".into()))
            .await
            .unwrap();
        tracker
            .assign_task(&open.id, Some("task-42".into()))
            .await
            .unwrap();

        let open = tracker.open_session().await.expect("open session");
        assert_eq!(open.user_label.as_deref(), Some("Deep Work"));
        assert_eq!(open.task_id.as_deref(), Some("task-42"));
    }
}
