//! Canonical data types. Backend payloads arrive in several shapes; each `Raw*`
//! type absorbs those variations once, at the boundary, and converts into the
//! single canonical type the rest of the crate works with.

pub mod analytics;
pub mod credential;
pub mod job;
pub mod resume;
pub mod user;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accepts string or numeric identifiers and yields their string form.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Lenient RFC 3339 timestamp parse; unparseable dates read as absent.
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
