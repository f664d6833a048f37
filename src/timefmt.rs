use chrono::{DateTime, Utc};

/// Every timestamp persisted to the store or a run log uses this shape.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn now_stamp() -> String {
    format_timestamp(Utc::now())
}
