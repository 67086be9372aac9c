pub mod loss;
pub mod types;

pub use loss::analyze_day;
pub use types::{DailyLossReport, LossEvent, LossKind, MicroDistractionStat};
