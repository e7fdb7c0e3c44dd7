//! Field schemas for the two document kinds.
//!
//! Query parameters are validated against these before anything reaches the
//! store, so a typo in a `where` or `sort` key is a 400 instead of a silent
//! empty result.

/// How a field's values are typed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A document identifier, as text.
    Id,
    /// Free text (including `assignedUser`, whose empty value means
    /// unassigned).
    Text,
    Bool,
    /// RFC 3339 text on the wire; literals may also be dates or epoch millis.
    Timestamp,
    /// An array of document identifiers.
    IdList,
}

/// The queryable fields of one document kind.
#[derive(Debug)]
pub struct Schema {
    /// Entity name used in error messages.
    pub entity: &'static str,
    fields: &'static [(&'static str, FieldKind)],
}

/// Wire name of the identifier field.
pub const ID_FIELD: &str = "_id";

pub const TASK_SCHEMA: Schema = Schema {
    entity: "task",
    fields: &[
        (ID_FIELD, FieldKind::Id),
        ("name", FieldKind::Text),
        ("description", FieldKind::Text),
        ("deadline", FieldKind::Timestamp),
        ("completed", FieldKind::Bool),
        ("assignedUser", FieldKind::Text),
        ("assignedUserName", FieldKind::Text),
        ("dateCreated", FieldKind::Timestamp),
    ],
};

pub const USER_SCHEMA: Schema = Schema {
    entity: "user",
    fields: &[
        (ID_FIELD, FieldKind::Id),
        ("name", FieldKind::Text),
        ("email", FieldKind::Text),
        ("pendingTasks", FieldKind::IdList),
        ("dateCreated", FieldKind::Timestamp),
    ],
};

impl Schema {
    /// Resolves a field name, accepting `id` as an alias for `_id`.
    ///
    /// Returns the canonical wire name and the field kind.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<(&'static str, FieldKind)> {
        let name = if name == "id" { ID_FIELD } else { name };
        self.fields.iter().copied().find(|(field, _)| *field == name)
    }

    /// Iterates over the canonical field names.
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(name, _)| *name)
    }
}
