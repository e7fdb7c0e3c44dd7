//! Document types stored and returned by the Taskboard API.
//!
//! [`Task`] and [`User`] are independent top-level documents. The assignment
//! relation between them is stored twice: as `Task::assigned_user` and as
//! membership in `User::pending_tasks`. Keeping the two in lockstep is the
//! server's job; these types only describe the wire shape.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Display name stored on a task that has no assignee.
pub const UNASSIGNED_NAME: &str = "unassigned";

/// Store-assigned document identifier, based on UUID v7 for time-ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new time-ordered identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `DocumentId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses an identifier, returning `None` when the text is not valid
    /// identifier syntax.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::try_parse(text).ok().map(Self)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
///
/// Serialized as RFC 3339 with millisecond precision and a `Z` suffix. Years
/// are limited to `0000..=9999`: inside that range the text always has a
/// four-digit year and no sign, so text order and time order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    ///
    /// Returns `None` outside the supported years.
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).and_then(Self::in_range)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parses an RFC 3339 timestamp, a `YYYY-MM-DD` date (midnight UTC), or
    /// a decimal count of epoch milliseconds.
    ///
    /// Returns `None` outside the supported years.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Self::in_range(dt.with_timezone(&Utc).trunc_subsecs(3));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return date
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| Self::in_range(dt.and_utc()));
        }
        text.parse::<i64>().ok().and_then(Self::from_millis)
    }

    /// Interprets a JSON value (string or integer milliseconds) as a
    /// timestamp.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => n.as_i64().and_then(Self::from_millis),
            _ => None,
        }
    }
}

impl Timestamp {
    const YEARS: RangeInclusive<i32> = 0..=9999;

    fn in_range(dt: DateTime<Utc>) -> Option<Self> {
        Self::YEARS.contains(&dt.year()).then_some(Self(dt))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Self::from_json(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// A unit of work, optionally assigned to a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: String,
    pub description: String,
    pub deadline: Timestamp,
    pub completed: bool,
    /// Assignee, serialized as the empty string when unassigned.
    #[serde(with = "assignee")]
    pub assigned_user: Option<DocumentId>,
    /// Denormalized display copy of the assignee's name. Not authoritative.
    pub assigned_user_name: String,
    pub date_created: Timestamp,
}

impl Task {
    /// Returns the user whose `pendingTasks` must list this task, if any.
    ///
    /// A task is pending for its assignee exactly when it is assigned and
    /// not completed.
    #[must_use]
    pub const fn pending_for(&self) -> Option<DocumentId> {
        if self.completed {
            None
        } else {
            self.assigned_user
        }
    }
}

/// A person tasks can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier.
    #[serde(rename = "_id")]
    pub id: DocumentId,
    pub name: String,
    /// Unique across all users.
    pub email: String,
    /// Identifiers of tasks assigned to this user and not yet completed.
    pub pending_tasks: Vec<DocumentId>,
    pub date_created: Timestamp,
}

/// Serde adapter mapping `Option<DocumentId>` to `""` / `"<id>"`.
mod assignee {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DocumentId;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<DocumentId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.collect_str(id),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DocumentId>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        DocumentId::parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid user id: {raw}")))
    }
}
