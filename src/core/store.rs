//! # Thread & Message Log Stores
//!
//! Pure CRUD primitives over the two collections the session owns. Every
//! function returns a fresh `Vec`; entries that did not change are the same
//! `Arc` as before, so presentation code can skip re-rendering them with
//! `Arc::ptr_eq`.

use std::sync::Arc;

use chrono::Utc;

use crate::core::model::{Message, Thread, ThreadPatch, UserInfo};

/// Ordered messages of the open thread, oldest first.
pub type MessageLog = Vec<Arc<Message>>;

/// Thread summaries, most recently active first.
pub type ThreadList = Vec<Arc<Thread>>;

// ============================================================================
// Message log
// ============================================================================

/// True if an entry with `id` is already in the log.
pub fn contains(log: &[Arc<Message>], id: &str) -> bool {
    log.iter().any(|m| m.id == id)
}

/// Appends `message` unless an entry with the same id exists.
pub fn append_if_absent(log: &[Arc<Message>], message: Message) -> MessageLog {
    let mut next = log.to_vec();
    if !contains(log, &message.id) {
        next.push(Arc::new(message));
    }
    next
}

/// Rebuilds the matching entry with `patch`; no-op if absent.
pub fn patch_by_id<F>(log: &[Arc<Message>], id: &str, patch: F) -> MessageLog
where
    F: FnOnce(&Message) -> Message,
{
    let mut patch = Some(patch);
    log.iter()
        .map(|m| match patch.take_if(|_| m.id == id) {
            Some(f) => Arc::new(f(&**m)),
            None => Arc::clone(m),
        })
        .collect()
}

/// Drops the matching entry.
pub fn remove_by_id(log: &[Arc<Message>], id: &str) -> MessageLog {
    log.iter().filter(|m| m.id != id).cloned().collect()
}

// ============================================================================
// Thread list
// ============================================================================

/// Merges `patch` into the thread with the same `user_id` (or creates it) and
/// moves the result to the front.
///
/// Per field: incoming wins, else existing, else `fallback_user` (display
/// info only), else now (timestamp only).
pub fn upsert_thread(list: &[Arc<Thread>], patch: ThreadPatch, fallback_user: Option<&UserInfo>) -> ThreadList {
    let existing = list.iter().find(|t| t.user_id == patch.user_id);

    let merged = Thread {
        user: patch
            .user
            .or_else(|| existing.and_then(|t| t.user.clone()))
            .or_else(|| fallback_user.cloned()),
        message: patch.message.or_else(|| existing.and_then(|t| t.message.clone())),
        message_id: patch.message_id.or_else(|| existing.and_then(|t| t.message_id.clone())),
        sender_role: patch.sender_role.or_else(|| existing.and_then(|t| t.sender_role)),
        sender_id: patch.sender_id.or_else(|| existing.and_then(|t| t.sender_id.clone())),
        created_at: patch
            .created_at
            .or_else(|| existing.map(|t| t.created_at))
            .unwrap_or_else(Utc::now),
        delivered_at: patch.delivered_at.or_else(|| existing.and_then(|t| t.delivered_at)),
        seen_at: patch.seen_at.or_else(|| existing.and_then(|t| t.seen_at)),
        unread_count: patch
            .unread_count
            .or_else(|| existing.map(|t| t.unread_count))
            .unwrap_or(0),
        presence: patch.presence.or_else(|| existing.and_then(|t| t.presence.clone())),
        user_id: patch.user_id,
    };

    let mut next = Vec::with_capacity(list.len() + 1);
    next.extend(list.iter().filter(|t| t.user_id != merged.user_id).cloned());
    next.insert(0, Arc::new(merged));
    next
}

/// Replaces the thread with the same `user_id` in place (no reorder).
pub fn replace_thread(list: &[Arc<Thread>], thread: Thread) -> ThreadList {
    let mut thread = Some(thread);
    list.iter()
        .map(|t| match thread.take_if(|new| new.user_id == t.user_id) {
            Some(new) => Arc::new(new),
            None => Arc::clone(t),
        })
        .collect()
}

/// Drops the thread for `user_id`.
pub fn remove_thread(list: &[Arc<Thread>], user_id: &str) -> ThreadList {
    list.iter().filter(|t| t.user_id != user_id).cloned().collect()
}

pub fn find_thread<'a>(list: &'a [Arc<Thread>], user_id: &str) -> Option<&'a Arc<Thread>> {
    list.iter().find(|t| t.user_id == user_id)
}
