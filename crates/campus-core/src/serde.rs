// `::serde` is the crate; this module only shares its name.
use ::serde::Serializer;
use chrono::{DateTime, SecondsFormat, Utc};

/// `enrolledAt` wire format: UTC, millisecond precision, `Z` suffix.
/// Sub-millisecond digits from normalized rows are truncated.
pub fn to_rfc3339_ms<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
