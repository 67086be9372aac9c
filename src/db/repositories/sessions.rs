use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, to_i64, to_u64},
    repositories::visits_for_session,
};
use crate::models::{ActivityType, FocusState, Session, UnknownReason};

const SESSION_COLUMNS: &str = "id, app_identifier, app_name, focus_state, start_time, end_time, \
     active_ms, last_resumed_at, activity_type, confidence, unknown_reason, needs_review, \
     primary_domain, primary_title, task_id, user_label, inferred_label, micro_interruptions";

fn row_to_session(row: &Row) -> Result<Session> {
    let focus_state: String = row.get("focus_state")?;
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let last_resumed_at: Option<String> = row.get("last_resumed_at")?;
    let activity_type: String = row.get("activity_type")?;
    let unknown_reason: Option<String> = row.get("unknown_reason")?;
    let active_ms: i64 = row.get("active_ms")?;

    Ok(Session {
        id: row.get("id")?,
        app_identifier: row.get("app_identifier")?,
        app_name: row.get("app_name")?,
        focus_state: FocusState::parse(&focus_state)?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        active_ms: to_u64(active_ms, "active_ms")?,
        last_resumed_at: parse_optional_datetime(last_resumed_at, "last_resumed_at")?,
        activity_type: ActivityType::parse(&activity_type)?,
        confidence: row.get("confidence")?,
        unknown_reason: unknown_reason
            .as_deref()
            .map(UnknownReason::parse)
            .transpose()?,
        needs_review: row.get("needs_review")?,
        primary_domain: row.get("primary_domain")?,
        primary_title: row.get("primary_title")?,
        visits: Vec::new(),
        task_id: row.get("task_id")?,
        user_label: row.get("user_label")?,
        inferred_label: row.get("inferred_label")?,
        micro_interruptions: row.get("micro_interruptions")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO sessions (id, app_identifier, app_name, focus_state, start_time, end_time,
                     active_ms, last_resumed_at, activity_type, confidence, unknown_reason, needs_review,
                     primary_domain, primary_title, task_id, user_label, inferred_label, micro_interruptions,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                params![
                    record.id,
                    record.app_identifier,
                    record.app_name,
                    record.focus_state.as_str(),
                    record.start_time.to_rfc3339(),
                    record.end_time.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.active_ms)?,
                    record.last_resumed_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.activity_type.as_str(),
                    record.confidence,
                    record.unknown_reason.as_ref().map(|r| r.as_str()),
                    record.needs_review,
                    record.primary_domain,
                    record.primary_title,
                    record.task_id,
                    record.user_label,
                    record.inferred_label,
                    record.micro_interruptions,
                    now,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Heartbeat write: fold accumulated time and move the resume anchor.
    pub async fn update_session_progress(
        &self,
        session_id: &str,
        active_ms: u64,
        last_resumed_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET active_ms = ?1,
                     last_resumed_at = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    to_i64(active_ms)?,
                    last_resumed_at.as_ref().map(|dt| dt.to_rfc3339()),
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn close_session(&self, session: &Session, updated_at: DateTime<Utc>) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET end_time = ?1,
                     active_ms = ?2,
                     last_resumed_at = NULL,
                     primary_domain = ?3,
                     primary_title = ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    record.end_time.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.active_ms)?,
                    record.primary_domain,
                    record.primary_title,
                    updated_at.to_rfc3339(),
                    record.id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Merge-back: clear the end marker and restart duration accounting.
    pub async fn reopen_session(
        &self,
        session_id: &str,
        last_resumed_at: DateTime<Utc>,
        micro_interruptions: i64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET end_time = NULL,
                     last_resumed_at = ?1,
                     micro_interruptions = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    last_resumed_at.to_rfc3339(),
                    micro_interruptions,
                    last_resumed_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Visits are removed via ON DELETE CASCADE.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            Ok(())
        })
        .await
    }

    pub async fn set_user_label(&self, session_id: &str, label: Option<String>) -> Result<()> {
        self.update_text_column(session_id, "user_label", label)
            .await
    }

    pub async fn set_inferred_label(&self, session_id: &str, label: Option<String>) -> Result<()> {
        self.update_text_column(session_id, "inferred_label", label)
            .await
    }

    pub async fn assign_task(&self, session_id: &str, task_id: Option<String>) -> Result<()> {
        self.update_text_column(session_id, "task_id", task_id)
            .await
    }

    async fn update_text_column(
        &self,
        session_id: &str,
        column: &'static str,
        value: Option<String>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let query = format!(
                "UPDATE sessions SET {column} = ?1, updated_at = ?2 WHERE id = ?3"
            );
            let rows_affected = conn.execute(
                &query,
                params![value, Utc::now().to_rfc3339(), session_id],
            )?;

            if rows_affected == 0 {
                return Err(anyhow!("Session not found"));
            }

            Ok(())
        })
        .await
    }

    /// Sessions left open by an ungraceful shutdown.
    pub async fn get_open_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM sessions
                 WHERE end_time IS NULL
                 ORDER BY start_time ASC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                let mut session = row_to_session(row)?;
                session.visits = visits_for_session(conn, &session.id)?;
                sessions.push(session);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn get_sessions_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS}
                 FROM sessions
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC"
            ))?;

            let mut rows = stmt.query(params![start.to_rfc3339(), end.to_rfc3339()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                let mut session = row_to_session(row)?;
                session.visits = visits_for_session(conn, &session.id)?;
                sessions.push(session);
            }

            Ok(sessions)
        })
        .await
    }

    pub async fn get_sessions_for_day(&self, date: NaiveDate) -> Result<Vec<Session>> {
        let start = Utc
            .from_utc_datetime(&date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("invalid date"))?);
        let end = start + chrono::Duration::days(1);
        self.get_sessions_in_range(start, end).await
    }
}
