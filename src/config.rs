//! Tunable thresholds for tracking, loss analysis, and clustering.
//!
//! Defaults are the shipped behavior; every constant is overridable by
//! constructing the struct directly.

/// Session state machine thresholds.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Minimum time an app must hold focus before a segment becomes a session.
    pub commit_threshold_ms: u64,

    /// Maximum gap after leaving an app during which returning resumes the
    /// same session instead of starting a new one.
    pub merge_threshold_ms: u64,

    /// Cadence at which an open session folds elapsed time into its
    /// accumulated total and persists.
    pub heartbeat_interval_ms: u64,

    /// How far past the last known resume point an orphaned open session is
    /// assumed to have run before an ungraceful shutdown.
    pub orphan_close_buffer_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            commit_threshold_ms: 2_000,
            merge_threshold_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            orphan_close_buffer_ms: 60_000,
        }
    }
}

/// Loss analyzer thresholds.
#[derive(Debug, Clone)]
pub struct LossConfig {
    /// Idle sessions at least this long count as idle loss.
    pub idle_loss_ms: u64,

    /// A distraction session longer than this converts entirely to loss;
    /// at or under it, it is reported as a micro-distraction instead.
    pub distraction_grace_ms: u64,

    /// Sliding window for switching-storm detection.
    pub switching_window_ms: u64,

    /// Switches-per-hour at or above which the window is a storm.
    pub switching_storm_per_hour: f64,

    /// Share of a storm's wall-clock span charged as loss.
    pub storm_charge_ratio: f64,

    /// Forward scan cap when measuring time-to-return after a distraction.
    pub recovery_lookahead_ms: u64,

    /// Return time under this is free; only the excess is charged.
    pub recovery_grace_ms: u64,

    /// Productive sessions in [min, max) count as fragments.
    pub fragment_min_ms: u64,
    pub fragment_max_ms: u64,

    /// Fragments only charge once at least this many exist.
    pub fragment_min_count: usize,

    /// Share of combined fragment time charged as friction loss.
    pub friction_charge_ratio: f64,

    /// Productive sessions at least this long count as deep-work blocks.
    pub deep_block_ms: u64,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            idle_loss_ms: 120_000,
            distraction_grace_ms: 120_000,
            switching_window_ms: 900_000,
            switching_storm_per_hour: 40.0,
            storm_charge_ratio: 0.2,
            recovery_lookahead_ms: 600_000,
            recovery_grace_ms: 120_000,
            fragment_min_ms: 30_000,
            fragment_max_ms: 180_000,
            fragment_min_count: 3,
            friction_charge_ratio: 0.2,
            deep_block_ms: 1_200_000,
        }
    }
}

/// Cluster engine thresholds.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Gaps beyond this never merge.
    pub max_gap_ms: u64,

    /// Sessions under this are tolerated as quick non-distracting checks.
    pub short_interruption_ms: u64,

    /// Gap under which related (productive/communication) pairs merge.
    pub related_gap_ms: u64,

    /// Gap under which any remaining pair merges.
    pub default_gap_ms: u64,

    /// Merged runs spanning less wall-clock time than this are dropped.
    pub min_cluster_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_gap_ms: 300_000,
            short_interruption_ms: 120_000,
            related_gap_ms: 60_000,
            default_gap_ms: 30_000,
            min_cluster_ms: 180_000,
        }
    }
}
