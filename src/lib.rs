pub mod analysis;
pub mod cluster;
pub mod config;
pub mod db;
pub mod models;
pub mod rules;
pub mod tracker;
mod utils;

pub use analysis::{analyze_day, DailyLossReport, LossEvent, LossKind};
pub use cluster::{cluster_sessions, ClusterResult};
pub use config::{ClusterConfig, LossConfig, TrackerConfig};
pub use db::Database;
pub use models::{
    ActivityType, BrowserVisit, DomainChange, FocusState, Observation, Session, UnknownReason,
};
pub use rules::{ActivityRules, RulesStore};
pub use tracker::SessionTracker;
