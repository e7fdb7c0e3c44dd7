//! Request bodies accepted by the create and replace endpoints.
//!
//! Bodies are deserialized leniently (every field optional) and then
//! validated into drafts, so that a missing required field is reported as a
//! validation error rather than a deserialization failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Timestamp;

/// Error returned when a request body fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `name` or `deadline` missing or empty on a task body.
    #[error("'name' and 'deadline' are required fields")]
    TaskFieldsRequired,
    /// `name` or `email` missing or empty on a user body.
    #[error("'name' and 'email' are required fields")]
    UserFieldsRequired,
    /// `deadline` was present but could not be read as a date.
    #[error("'deadline' is not a valid date: {0}")]
    InvalidDeadline(String),
}

/// Body of `POST /tasks` and `PUT /tasks/:id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// RFC 3339 string, `YYYY-MM-DD`, or epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_name: Option<String>,
}

/// A task body that passed validation, with defaults applied.
///
/// The assignee is still raw text: resolving it against the user collection
/// is the server's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub name: String,
    pub description: String,
    pub deadline: Timestamp,
    pub completed: bool,
    /// Empty means unassigned.
    pub assigned_user: String,
    /// `None` when the body omitted it or sent an empty string.
    pub assigned_user_name: Option<String>,
}

impl TaskBody {
    /// Validates the body, applying replacement defaults for every absent
    /// optional field.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TaskFieldsRequired`] if `name` or
    /// `deadline` is missing or empty, or
    /// [`ValidationError::InvalidDeadline`] if the deadline cannot be parsed.
    pub fn validate(self) -> Result<TaskDraft, ValidationError> {
        let name = non_empty(self.name).ok_or(ValidationError::TaskFieldsRequired)?;
        let deadline = match self.deadline {
            None | Some(Value::Null) => return Err(ValidationError::TaskFieldsRequired),
            Some(Value::String(s)) if s.is_empty() => {
                return Err(ValidationError::TaskFieldsRequired);
            }
            Some(raw) => Timestamp::from_json(&raw)
                .ok_or_else(|| ValidationError::InvalidDeadline(raw.to_string()))?,
        };

        Ok(TaskDraft {
            name,
            description: self.description.unwrap_or_default(),
            deadline,
            completed: self.completed.unwrap_or(false),
            assigned_user: self.assigned_user.unwrap_or_default(),
            assigned_user_name: non_empty(self.assigned_user_name),
        })
    }
}

/// Body of `POST /users` and `PUT /users/:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tasks: Option<Vec<String>>,
}

/// A user body that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    /// `None` when the body omitted `pendingTasks`. Entries are kept as sent.
    pub pending_tasks: Option<Vec<String>>,
}

impl UserBody {
    /// Validates the body.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UserFieldsRequired`] if `name` or `email`
    /// is missing or empty.
    pub fn validate(self) -> Result<UserDraft, ValidationError> {
        let name = non_empty(self.name).ok_or(ValidationError::UserFieldsRequired)?;
        let email = non_empty(self.email).ok_or(ValidationError::UserFieldsRequired)?;
        Ok(UserDraft {
            name,
            email,
            pending_tasks: self.pending_tasks,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
