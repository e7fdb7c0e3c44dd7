//! Assignment synchronizer keeping `Task.assignedUser` and
//! `User.pendingTasks` in lockstep.
//!
//! The relation is stored twice, so every write path that changes one side
//! must issue compensating writes against the other:
//!
//! - Task side: compare the task's `(assignedUser, completed)` pair before
//!   and after the write and push/pull its id on at most two users.
//! - User side: diff the old and new `pendingTasks`, release tasks that were
//!   removed, and claim tasks that were added after a conflict check.
//!
//! The delta computations are pure; the `apply_*`/`claim_*`/`release_*`
//! functions issue the writes one by one. There is no transaction around
//! the sequence: if a later write fails the earlier ones stay in place and
//! the gap is logged for reconciliation.

use std::collections::HashSet;

use taskboard_proto::model::{DocumentId, Task, UNASSIGNED_NAME};

use crate::store::DocumentStore;

/// The part of a task the synchronizer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Assignment {
    pub user: Option<DocumentId>,
    pub completed: bool,
}

impl Assignment {
    /// An unassigned, incomplete task.
    pub const NONE: Self = Self {
        user: None,
        completed: false,
    };

    /// Extracts the assignment state of a stored task.
    #[must_use]
    pub const fn of(task: &Task) -> Self {
        Self {
            user: task.assigned_user,
            completed: task.completed,
        }
    }
}

/// A single write against a user's `pendingTasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOp {
    /// Add the task to the user's list.
    Push { user: DocumentId, task: DocumentId },
    /// Remove the task from the user's list.
    Pull { user: DocumentId, task: DocumentId },
}

/// Writes needed after a task is created.
#[must_use]
pub fn on_task_created(task: &Task) -> Vec<PendingOp> {
    task.pending_for()
        .map(|user| PendingOp::Push {
            user,
            task: task.id,
        })
        .into_iter()
        .collect()
}

/// Writes needed after a task is deleted.
#[must_use]
pub fn on_task_deleted(task: &Task) -> Vec<PendingOp> {
    task.pending_for()
        .map(|user| PendingOp::Pull {
            user,
            task: task.id,
        })
        .into_iter()
        .collect()
}

/// Writes needed when a task's assignment changes from `before` to `after`.
///
/// - New assignee: push to the new user unless completed, and pull from the
///   previous assignee (if any).
/// - Unassigned: pull from the previous assignee.
/// - Same assignee: pull when it becomes completed, push when it becomes
///   incomplete again.
#[must_use]
pub fn on_task_replaced(task: DocumentId, before: Assignment, after: Assignment) -> Vec<PendingOp> {
    let mut ops = Vec::with_capacity(2);
    match (before.user, after.user) {
        (None, None) => {}
        (Some(old), None) => ops.push(PendingOp::Pull { user: old, task }),
        (old, Some(user)) if old == Some(user) => match (before.completed, after.completed) {
            (false, true) => ops.push(PendingOp::Pull { user, task }),
            (true, false) => ops.push(PendingOp::Push { user, task }),
            _ => {}
        },
        (old, Some(new)) => {
            if !after.completed {
                ops.push(PendingOp::Push { user: new, task });
            }
            if let Some(old) = old {
                ops.push(PendingOp::Pull { user: old, task });
            }
        }
    }
    ops
}

/// Issues pending-list writes in order.
///
/// Writes against a user that no longer exists are no-ops.
pub async fn apply_pending_ops(store: &DocumentStore, ops: &[PendingOp]) {
    for op in ops {
        let found = match *op {
            PendingOp::Push { user, task } => store.push_pending(user, task).await,
            PendingOp::Pull { user, task } => store.pull_pending(user, task).await,
        };
        tracing::debug!(?op, user_found = found, "applied pending-task write");
    }
}

/// The result of diffing a user's old and new `pendingTasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDiff {
    /// Ids present before but not after, in old-list order.
    pub removed: Vec<DocumentId>,
    /// Ids present after but not before, in new-list order.
    pub added: Vec<DocumentId>,
}

impl PendingDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Diffs two `pendingTasks` lists as sets, keeping list order in the output.
#[must_use]
pub fn diff_pending(old: &[DocumentId], new: &[DocumentId]) -> PendingDiff {
    let old_set: HashSet<_> = old.iter().collect();
    let new_set: HashSet<_> = new.iter().collect();
    PendingDiff {
        removed: old.iter().filter(|id| !new_set.contains(id)).copied().collect(),
        added: new.iter().filter(|id| !old_set.contains(id)).copied().collect(),
    }
}

/// Returns the ids among `added` whose task is assigned to someone other
/// than `user`.
///
/// Must complete before any claim is written, so a conflict late in the list
/// cannot leave earlier tasks half-claimed.
pub async fn find_conflicts(
    store: &DocumentStore,
    user: DocumentId,
    added: &[DocumentId],
) -> Vec<DocumentId> {
    store
        .tasks
        .find_where(|t| added.contains(&t.id) && t.assigned_user.is_some_and(|u| u != user))
        .await
        .into_iter()
        .map(|t| t.id)
        .collect()
}

/// Returns the ids among `ids` that name no stored task.
pub async fn find_missing_tasks(store: &DocumentStore, ids: &[DocumentId]) -> Vec<DocumentId> {
    let found: HashSet<DocumentId> = store
        .tasks
        .find_where(|t| ids.contains(&t.id))
        .await
        .into_iter()
        .map(|t| t.id)
        .collect();
    ids.iter().filter(|id| !found.contains(*id)).copied().collect()
}

/// Unassigns the tasks in `removed` that are still assigned to `user`.
///
/// Tasks reassigned elsewhere in the meantime are left alone. Returns the
/// number of tasks released.
pub async fn release_tasks(
    store: &DocumentStore,
    user: DocumentId,
    removed: &[DocumentId],
) -> usize {
    if removed.is_empty() {
        return 0;
    }
    let released = store
        .tasks
        .update_where(
            |t| removed.contains(&t.id) && t.assigned_user == Some(user),
            unassign,
        )
        .await;
    tracing::debug!(user_id = %user, released, "released removed pending tasks");
    released
}

/// Unassigns every task currently assigned to `user`, regardless of
/// completion. Used when the user is deleted.
pub async fn release_all(store: &DocumentStore, user: DocumentId) -> usize {
    let released = store
        .tasks
        .update_where(|t| t.assigned_user == Some(user), unassign)
        .await;
    tracing::debug!(user_id = %user, released, "released all tasks of deleted user");
    released
}

/// Assigns the tasks in `added` to `user` and clears their completed flag.
///
/// Callers must have run [`find_conflicts`] first. Returns the number of
/// tasks claimed.
pub async fn claim_tasks(
    store: &DocumentStore,
    user: DocumentId,
    user_name: &str,
    added: &[DocumentId],
) -> usize {
    if added.is_empty() {
        return 0;
    }
    let claimed = store
        .tasks
        .update_where(
            |t| added.contains(&t.id),
            |t| {
                t.assigned_user = Some(user);
                t.assigned_user_name = user_name.to_string();
                t.completed = false;
            },
        )
        .await;
    tracing::debug!(user_id = %user, claimed, "claimed added pending tasks");
    claimed
}

/// Refreshes the denormalized `assignedUserName` on every task assigned to
/// `user`.
pub async fn rename_assignee(store: &DocumentStore, user: DocumentId, user_name: &str) -> usize {
    store
        .tasks
        .update_where(
            |t| t.assigned_user == Some(user),
            |t| t.assigned_user_name = user_name.to_string(),
        )
        .await
}

fn unassign(task: &mut Task) {
    task.assigned_user = None;
    task.assigned_user_name = UNASSIGNED_NAME.to_string();
}
