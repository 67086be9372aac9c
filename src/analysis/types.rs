use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LossKind {
    Idle,
    Distraction,
    Switching,
    Recovery,
    Friction,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::Idle => "Idle",
            LossKind::Distraction => "Distraction",
            LossKind::Switching => "Switching",
            LossKind::Recovery => "Recovery",
            LossKind::Friction => "Friction",
        }
    }
}

/// One detected interval of unproductive time, categorized by cause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LossEvent {
    pub kind: LossKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub loss_minutes: f64,
    pub explanation: String,
    pub affected_sessions: Vec<String>,
}

/// Habitual quick-checks too short to individually cross the loss
/// threshold, surfaced per domain (or app when no domain is known).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroDistractionStat {
    pub domain: String,
    pub count: usize,
    pub minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyLossReport {
    pub date: NaiveDate,
    pub active_minutes: f64,
    pub productive_minutes: f64,
    pub idle_loss_minutes: f64,
    pub distraction_loss_minutes: f64,
    pub switching_loss_minutes: f64,
    pub recovery_loss_minutes: f64,
    pub friction_loss_minutes: f64,
    /// Sum across categories. Categories measure different kinds of cost
    /// and may overlap in wall-clock time.
    pub total_loss_minutes: f64,
    pub micro_distraction_count: usize,
    pub micro_distraction_minutes: f64,
    pub micro_distractions_by_domain: Vec<MicroDistractionStat>,
    pub deep_block_count: usize,
    pub switching_rate_per_hour: f64,
    pub fragmentation_score: f64,
    pub loss_events: Vec<LossEvent>,
}

impl DailyLossReport {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            active_minutes: 0.0,
            productive_minutes: 0.0,
            idle_loss_minutes: 0.0,
            distraction_loss_minutes: 0.0,
            switching_loss_minutes: 0.0,
            recovery_loss_minutes: 0.0,
            friction_loss_minutes: 0.0,
            total_loss_minutes: 0.0,
            micro_distraction_count: 0,
            micro_distraction_minutes: 0.0,
            micro_distractions_by_domain: Vec::new(),
            deep_block_count: 0,
            switching_rate_per_hour: 0.0,
            fragmentation_score: 0.0,
            loss_events: Vec::new(),
        }
    }
}
