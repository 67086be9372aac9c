pub mod observation;
pub mod session;

pub use observation::{DomainChange, Observation, PendingSegment};
pub use session::{ActivityType, BrowserVisit, FocusState, Session, UnknownReason};
