//! In-memory document store for tasks and users.
//!
//! The [`DocumentStore`] holds two insertion-ordered collections. Every
//! method takes the collection lock exactly once, so each call is atomic on
//! its own; a sequence of calls is not. Callers that need several writes to
//! agree (the assignment synchronizer) issue them in order and accept that
//! a concurrent request can interleave.

use serde::Serialize;
use serde_json::Value;
use taskboard_proto::model::{DocumentId, Task, User};
use taskboard_proto::query::{Document, ListQuery};
use tokio::sync::RwLock;

/// Default maximum number of documents per collection.
pub const DEFAULT_MAX_DOCUMENTS: usize = 100_000;

/// Errors reported by store writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A unique index already holds this value.
    #[error("duplicate key on {collection}.{field}: {value}")]
    DuplicateKey {
        collection: &'static str,
        field: &'static str,
        value: String,
    },
    /// The collection is full.
    #[error("{collection} collection is full (max {max} documents)")]
    CapacityReached {
        collection: &'static str,
        max: usize,
    },
    /// A document could not be converted to its wire form.
    #[error("failed to encode document: {0}")]
    Encoding(String),
}

/// A storable document with an identifier and optional unique keys.
pub trait Stored: Clone + Serialize {
    fn id(&self) -> DocumentId;

    /// Values that must be unique across the collection, as
    /// `(field, value)` pairs.
    fn unique_keys(&self) -> Vec<(&'static str, &str)> {
        Vec::new()
    }
}

impl Stored for Task {
    fn id(&self) -> DocumentId {
        self.id
    }
}

impl Stored for User {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn unique_keys(&self) -> Vec<(&'static str, &str)> {
        vec![("email", self.email.as_str())]
    }
}

/// One insertion-ordered collection.
pub struct Collection<D> {
    name: &'static str,
    docs: RwLock<Vec<D>>,
    max_documents: usize,
}

impl<D: Stored> Collection<D> {
    fn new(name: &'static str, max_documents: usize) -> Self {
        Self {
            name,
            docs: RwLock::new(Vec::new()),
            max_documents,
        }
    }

    /// Inserts a document, enforcing capacity and unique keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CapacityReached`] if the collection is full, or
    /// [`StoreError::DuplicateKey`] if a unique key is already taken.
    pub async fn insert(&self, doc: D) -> Result<D, StoreError> {
        let mut docs = self.docs.write().await;
        if docs.len() >= self.max_documents {
            return Err(StoreError::CapacityReached {
                collection: self.name,
                max: self.max_documents,
            });
        }
        self.check_unique(&docs, &doc)?;
        docs.push(doc.clone());
        drop(docs);
        Ok(doc)
    }

    /// Returns the document with the given id, if present.
    pub async fn get(&self, id: DocumentId) -> Option<D> {
        let docs = self.docs.read().await;
        docs.iter().find(|d| d.id() == id).cloned()
    }

    /// Returns every document satisfying a predicate, in natural order.
    pub async fn find_where(&self, pred: impl Fn(&D) -> bool) -> Vec<D> {
        let docs = self.docs.read().await;
        docs.iter().filter(|&d| pred(d)).cloned().collect()
    }

    /// Runs a list query and returns the projected wire documents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encoding`] if a document cannot be serialized.
    pub async fn find(&self, query: &ListQuery) -> Result<Vec<Value>, StoreError> {
        let wire = self.snapshot().await?;
        Ok(query.select_documents(wire))
    }

    /// Counts documents matching the query's filter. Sort, paging and
    /// projection do not affect the result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Encoding`] if a document cannot be serialized.
    pub async fn count(&self, query: &ListQuery) -> Result<usize, StoreError> {
        let wire = self.snapshot().await?;
        Ok(query.count_documents(&wire))
    }

    /// Replaces the stored document with the same id.
    ///
    /// Returns `Ok(None)` if no such document exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if the replacement takes a unique
    /// key held by another document.
    pub async fn replace(&self, doc: D) -> Result<Option<D>, StoreError> {
        let mut docs = self.docs.write().await;
        let Some(pos) = docs.iter().position(|d| d.id() == doc.id()) else {
            return Ok(None);
        };
        self.check_unique(&docs, &doc)?;
        docs[pos] = doc.clone();
        drop(docs);
        Ok(Some(doc))
    }

    /// Removes and returns the document with the given id.
    pub async fn delete(&self, id: DocumentId) -> Option<D> {
        let mut docs = self.docs.write().await;
        let pos = docs.iter().position(|d| d.id() == id)?;
        Some(docs.remove(pos))
    }

    /// Applies `update` to every document satisfying `pred`, returning the
    /// number of documents matched.
    pub async fn update_where(&self, pred: impl Fn(&D) -> bool, update: impl Fn(&mut D)) -> usize {
        let mut docs = self.docs.write().await;
        let mut matched = 0;
        for doc in docs.iter_mut() {
            if pred(&*doc) {
                update(doc);
                matched += 1;
            }
        }
        matched
    }

    /// Applies `update` to the document with the given id. Returns `false`
    /// if it does not exist.
    pub async fn update_one(&self, id: DocumentId, update: impl FnOnce(&mut D)) -> bool {
        let mut docs = self.docs.write().await;
        docs.iter_mut().find(|d| d.id() == id).map(update).is_some()
    }

    /// Returns `true` if another document already holds `value` under the
    /// unique key `field`.
    pub async fn is_taken(&self, field: &str, value: &str, except: Option<DocumentId>) -> bool {
        let docs = self.docs.read().await;
        docs.iter().any(|d| {
            Some(d.id()) != except
                && d
                    .unique_keys()
                    .iter()
                    .any(|(f, v)| *f == field && *v == value)
        })
    }

    fn check_unique(&self, docs: &[D], doc: &D) -> Result<(), StoreError> {
        for (field, value) in doc.unique_keys() {
            let clash = docs.iter().any(|other| {
                other.id() != doc.id()
                    && other
                        .unique_keys()
                        .iter()
                        .any(|(f, v)| *f == field && *v == value)
            });
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: self.name,
                    field,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.read().await;
        docs.iter()
            .map(|d| match serde_json::to_value(d) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(StoreError::Encoding(format!("expected an object, got {other}"))),
                Err(e) => Err(StoreError::Encoding(e.to_string())),
            })
            .collect()
    }
}

/// The task and user collections, shared by every request handler.
pub struct DocumentStore {
    pub tasks: Collection<Task>,
    pub users: Collection<User>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// Creates an empty store with the default per-collection capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_documents(DEFAULT_MAX_DOCUMENTS)
    }

    /// Creates an empty store with a custom per-collection capacity.
    #[must_use]
    pub fn with_max_documents(max_documents: usize) -> Self {
        Self {
            tasks: Collection::new("tasks", max_documents),
            users: Collection::new("users", max_documents),
        }
    }

    /// Appends a task id to a user's `pendingTasks` unless already present.
    ///
    /// Returns `false` if the user does not exist (the write is a no-op).
    pub async fn push_pending(&self, user: DocumentId, task: DocumentId) -> bool {
        self.users
            .update_one(user, |u| {
                if !u.pending_tasks.contains(&task) {
                    u.pending_tasks.push(task);
                }
            })
            .await
    }

    /// Removes every occurrence of a task id from a user's `pendingTasks`.
    ///
    /// Returns `false` if the user does not exist (the write is a no-op).
    pub async fn pull_pending(&self, user: DocumentId, task: DocumentId) -> bool {
        self.users
            .update_one(user, |u| u.pending_tasks.retain(|t| *t != task))
            .await
    }
}
