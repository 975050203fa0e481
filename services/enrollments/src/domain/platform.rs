//! Declarative per-platform mapping table for legacy user documents.
//!
//! Each platform has one concrete mapping type that knows where the user's
//! external id lives, how to derive status, progress and engagement from the
//! platform sub-object, and which fields hold the enrollment date. The engine
//! only iterates [`PLATFORM_MAPPINGS`]; adding a platform means adding one
//! mapping here.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use campus_domain::enrollment::EnrollmentStatus;
use campus_domain::platform::Platform;

use crate::domain::types::Metrics;

/// Bumped whenever a mapping rule changes meaning.
pub const MAPPING_VERSION: u32 = 1;

static NULL: Value = Value::Null;

/// How a candidate id field is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// A string (or number) value.
    Plain,
    /// An array; its first element is the id.
    FirstOf,
}

/// One place a platform's external id may live, as a key path from the
/// document root (one segment = top-level field).
#[derive(Debug, Clone, Copy)]
pub struct IdCandidate {
    pub path: &'static [&'static str],
    pub shape: IdShape,
}

impl IdCandidate {
    pub const fn plain(path: &'static [&'static str]) -> Self {
        Self {
            path,
            shape: IdShape::Plain,
        }
    }

    pub const fn first_of(path: &'static [&'static str]) -> Self {
        Self {
            path,
            shape: IdShape::FirstOf,
        }
    }

    /// Empty strings and empty arrays resolve to `None`, same as absent fields.
    pub fn resolve(&self, document: &Value) -> Option<String> {
        let value = lookup(document, self.path)?;
        match self.shape {
            IdShape::Plain => non_empty_string(value),
            IdShape::FirstOf => value.as_array()?.first().and_then(non_empty_string),
        }
    }
}

/// Mapping rules for one platform.
pub trait PlatformMapping: Send + Sync {
    fn platform(&self) -> Platform;

    /// Candidate id locations, checked in order.
    fn id_candidates(&self) -> &'static [IdCandidate];

    /// Sub-object paths holding the enrollment date, checked in order.
    fn enrolled_at_candidates(&self) -> &'static [&'static [&'static str]];

    fn derive_metrics(&self, sub: &Value) -> Metrics;

    /// Status of a freshly synthesized legacy enrollment. Active unless the
    /// platform defines an inactivity rule.
    fn derive_status(&self, _sub: &Value) -> EnrollmentStatus {
        EnrollmentStatus::Active
    }

    fn resolve_external_id(&self, document: &Value) -> Option<String> {
        self.id_candidates()
            .iter()
            .find_map(|candidate| candidate.resolve(document))
    }

    /// The platform sub-object, or `null` when absent. A non-object value is
    /// treated as absent so every field falls back to its default.
    fn sub_object<'a>(&self, document: &'a Value) -> &'a Value {
        match document.get(self.platform().as_str()) {
            Some(sub) if sub.is_object() => sub,
            Some(Value::Null) | None => &NULL,
            Some(other) => {
                tracing::debug!(
                    platform = %self.platform(),
                    kind = value_kind(other),
                    "platform sub-object is not an object, using defaults"
                );
                &NULL
            }
        }
    }

    fn derive_enrolled_at(&self, sub: &Value) -> Option<DateTime<Utc>> {
        self.enrolled_at_candidates()
            .iter()
            .find_map(|path| timestamp_at(sub, path))
    }
}

// ── Hotmart ──────────────────────────────────────────────────────────────────

pub struct HotmartMapping;

impl PlatformMapping for HotmartMapping {
    fn platform(&self) -> Platform {
        Platform::Hotmart
    }

    fn id_candidates(&self) -> &'static [IdCandidate] {
        const IDS: &[IdCandidate] = &[
            IdCandidate::plain(&["hotmart", "hotmartUserId"]),
            IdCandidate::plain(&["hotmartUserId"]),
            IdCandidate::plain(&["hotmart", "userId"]),
        ];
        IDS
    }

    fn enrolled_at_candidates(&self) -> &'static [&'static [&'static str]] {
        &[&["purchaseDate"], &["firstAccessDate"]]
    }

    fn derive_metrics(&self, sub: &Value) -> Metrics {
        let progress = ratio(sub, &["progress", "completed"], &["progress", "total"])
            .or_else(|| number_at(sub, &["progress", "completedPercentage"]))
            .or_else(|| number_at(sub, &["progressPercentage"]))
            .unwrap_or(0.0);
        let engagement = number_at(sub, &["engagement", "engagementScore"])
            .or_else(|| number_at(sub, &["engagementScore"]))
            .unwrap_or(0.0);
        bounded(progress, engagement)
    }
}

// ── CursEduca ────────────────────────────────────────────────────────────────

pub struct CursEducaMapping;

impl PlatformMapping for CursEducaMapping {
    fn platform(&self) -> Platform {
        Platform::CursEduca
    }

    fn id_candidates(&self) -> &'static [IdCandidate] {
        const IDS: &[IdCandidate] = &[
            IdCandidate::plain(&["curseduca", "curseducaUserId"]),
            IdCandidate::plain(&["curseducaUserId"]),
        ];
        IDS
    }

    fn enrolled_at_candidates(&self) -> &'static [&'static [&'static str]] {
        &[&["enrollmentDate"], &["joinedDate"]]
    }

    fn derive_metrics(&self, sub: &Value) -> Metrics {
        let progress = ratio(
            sub,
            &["progress", "lessonsCompleted"],
            &["progress", "totalLessons"],
        )
        .or_else(|| number_at(sub, &["progress", "estimatedProgress"]))
        .or_else(|| number_at(sub, &["progressPercentage"]))
        .unwrap_or(0.0);
        let engagement = number_at(sub, &["engagement", "alternativeEngagement"])
            .or_else(|| number_at(sub, &["engagementScore"]))
            .unwrap_or(0.0);
        bounded(progress, engagement)
    }

    /// Inactive when flagged deleted/suspended, or when no login timestamp exists.
    fn derive_status(&self, sub: &Value) -> EnrollmentStatus {
        if flag_at(sub, &["deleted"]) || flag_at(sub, &["suspended"]) {
            return EnrollmentStatus::Inactive;
        }
        let has_login =
            lookup(sub, &["lastLogin"]).is_some() || lookup(sub, &["lastAccess"]).is_some();
        if has_login {
            EnrollmentStatus::Active
        } else {
            EnrollmentStatus::Inactive
        }
    }
}

// ── Discord ──────────────────────────────────────────────────────────────────

/// Discord carries no course progress; engagement is activity based.
pub struct DiscordMapping;

const DISCORD_MESSAGE_CAP: f64 = 100.0;

impl PlatformMapping for DiscordMapping {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn id_candidates(&self) -> &'static [IdCandidate] {
        const IDS: &[IdCandidate] = &[
            IdCandidate::first_of(&["discordIds"]),
            IdCandidate::first_of(&["discord", "discordIds"]),
            IdCandidate::plain(&["discord", "discordId"]),
        ];
        IDS
    }

    fn enrolled_at_candidates(&self) -> &'static [&'static [&'static str]] {
        &[&["joinedAt"]]
    }

    fn derive_metrics(&self, sub: &Value) -> Metrics {
        let engagement = number_at(sub, &["engagementScore"])
            .or_else(|| number_at(sub, &["messageCount"]).map(|n| n.min(DISCORD_MESSAGE_CAP)))
            .unwrap_or(0.0);
        bounded(0.0, engagement)
    }

    fn derive_status(&self, sub: &Value) -> EnrollmentStatus {
        if flag_at(sub, &["isDeleted"]) {
            EnrollmentStatus::Inactive
        } else {
            EnrollmentStatus::Active
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Every supported platform, in synthesis order.
pub static PLATFORM_MAPPINGS: &[&dyn PlatformMapping] =
    &[&HotmartMapping, &CursEducaMapping, &DiscordMapping];

// ── Field helpers ────────────────────────────────────────────────────────────

/// Walk a key path; `null` counts as absent.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| current.get(key))
        .filter(|found| !found.is_null())
}

/// A finite number, also accepting numeric strings.
pub fn number_at(value: &Value, path: &[&str]) -> Option<f64> {
    let n = match lookup(value, path)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn flag_at(value: &Value, path: &[&str]) -> bool {
    match lookup(value, path) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// RFC 3339 string, epoch milliseconds, or an extended-JSON `{"$date": ...}` wrapper.
pub fn timestamp_at(value: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    parse_timestamp(lookup(value, path)?)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<i64>().ok().and_then(from_millis)),
        Value::Number(n) => n.as_i64().and_then(from_millis),
        Value::Object(map) => map
            .get("$date")
            .or_else(|| map.get("$numberLong"))
            .and_then(parse_timestamp),
        _ => None,
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// `numerator / denominator × 100` when the denominator is positive.
fn ratio(value: &Value, numerator: &[&str], denominator: &[&str]) -> Option<f64> {
    let total = number_at(value, denominator)?;
    if total <= 0.0 {
        return None;
    }
    Some(number_at(value, numerator)? / total * 100.0)
}

/// Progress clamped to `[0, 100]`, engagement to `>= 0`; non-finite values become 0.
pub fn bounded(progress: f64, engagement: f64) -> Metrics {
    Metrics {
        progress: if progress.is_finite() { progress.clamp(0.0, 100.0) } else { 0.0 },
        engagement: if engagement.is_finite() { engagement.max(0.0) } else { 0.0 },
    }
}

fn non_empty_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
