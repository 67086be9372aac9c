mod sessions;
mod visits;

pub(crate) use visits::visits_for_session;
