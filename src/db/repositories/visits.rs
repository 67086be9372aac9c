use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
};
use crate::models::BrowserVisit;

fn row_to_visit(row: &Row) -> Result<BrowserVisit> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;

    Ok(BrowserVisit {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        domain: row.get("domain")?,
        title: row.get("title")?,
        is_distraction: row.get("is_distraction")?,
    })
}

/// Load a session's visits in start order. Runs inside a DB task that
/// already holds the connection.
pub(crate) fn visits_for_session(conn: &Connection, session_id: &str) -> Result<Vec<BrowserVisit>> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, start_time, end_time, domain, title, is_distraction
         FROM browser_visits
         WHERE session_id = ?1
         ORDER BY start_time ASC",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    let mut visits = Vec::new();
    while let Some(row) = rows.next()? {
        visits.push(row_to_visit(row)?);
    }

    Ok(visits)
}

impl Database {
    pub async fn insert_visit(&self, visit: &BrowserVisit) -> Result<()> {
        let record = visit.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO browser_visits (id, session_id, start_time, end_time, domain, title, is_distraction)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.session_id,
                    record.start_time.to_rfc3339(),
                    record.end_time.as_ref().map(|dt| dt.to_rfc3339()),
                    record.domain,
                    record.title,
                    record.is_distraction,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn close_visit(&self, visit_id: &str, ended_at: DateTime<Utc>) -> Result<()> {
        let visit_id = visit_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE browser_visits
                 SET end_time = ?1
                 WHERE id = ?2",
                params![ended_at.to_rfc3339(), visit_id],
            )?;
            Ok(())
        })
        .await
    }
}
