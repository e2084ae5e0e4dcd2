//! # Actions
//!
//! Everything that can happen to a chat client becomes an `Action`.
//! REST call returns? That's `Action::ThreadsLoaded(..)`.
//! Socket pushes a frame? That's `Action::Inbound(event)`.
//!
//! `update()` applies an action to the state and returns an `Effect` the
//! session controller carries out. No I/O here.
//!
//! ```text
//! State + Action  →  update()  →  New State + Effect
//! ```
//!
//! A REST ack and its socket echo may arrive in either order. Both paths go
//! through `append_if_absent` and fill-only receipt merging, so they converge
//! on the same log.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::api::ReceiptKind;
use crate::api::types::MessageUpdate;
use crate::core::model::{Message, ReplyReference, Role, Thread, ThreadPatch, UserInfo};
use crate::core::presence::PresenceTracker;
use crate::core::receipts::{apply_receipt, apply_receipt_to_thread};
use crate::core::state::{ChatState, View};
use crate::core::store::{self, MessageLog, find_thread};
use crate::core::viewport::ScrollSample;
use crate::socket::events::{PresenceEvent, ReactionEvent, ReceiptEvent};
use crate::socket::{InboundEvent, ReceiptEmit};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ThreadsRequested,
    ThreadsLoaded(Vec<Thread>),
    OpenThread(String),
    /// Re-fetch the open thread's log without clearing it.
    RefreshMessages,
    GoBackToList,
    /// A message fetch finished. `messages` are newest-first, as served.
    MessagesLoaded {
        thread_id: String,
        generation: u64,
        messages: Vec<Message>,
    },
    /// Server echo of our own send.
    MessageSent(Message),
    MessageEdited(Message),
    MessageRemoved {
        thread_id: String,
        message_id: String,
    },
    ReactionSet {
        thread_id: String,
        message_id: String,
        reaction: Option<String>,
    },
    /// The conversation was cleared from our own view.
    ThreadCleared(String),
    Inbound(InboundEvent),
    MarkSeen(String),
    MarkDelivered,
    /// Reply to the message with this id, or clear with `None`.
    SetReplyTarget(Option<String>),
    ScrollSampled(ScrollSample),
    JumpToLatest,
    RequestFailed(String),
    Unauthorized,
    Reauthenticated,
    ClearError,
}

/// What the session controller should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    FetchMessages { thread_id: String, generation: u64 },
    EmitReceipt(ReceiptEmit),
    /// Fire the session-invalid callback. Returned once per invalidation.
    NotifyUnauthorized,
    /// Reload the thread list and the open log.
    Resync,
}

pub fn update(state: &mut ChatState, action: Action) -> Effect {
    match action {
        Action::ThreadsRequested => {
            state.is_loading_threads = true;
            Effect::None
        }
        Action::ThreadsLoaded(threads) => {
            load_threads(state, threads);
            Effect::None
        }
        Action::OpenThread(thread_id) => open_thread(state, thread_id),
        Action::RefreshMessages => match state.open_thread_id().map(str::to_string) {
            Some(thread_id) => {
                state.generation += 1;
                state.is_loading_messages = true;
                Effect::FetchMessages {
                    thread_id,
                    generation: state.generation,
                }
            }
            None => Effect::None,
        },
        Action::GoBackToList => {
            close_thread(state);
            Effect::None
        }
        Action::MessagesLoaded {
            thread_id,
            generation,
            messages,
        } => {
            messages_loaded(state, &thread_id, generation, messages);
            Effect::None
        }
        Action::MessageSent(message) => {
            message_sent(state, message);
            Effect::None
        }
        Action::MessageEdited(message) => {
            message_edited(state, message);
            Effect::None
        }
        Action::MessageRemoved { thread_id, message_id } => {
            remove_message(state, &thread_id, &message_id);
            Effect::None
        }
        Action::ReactionSet {
            thread_id,
            message_id,
            reaction,
        } => {
            if state.is_open(&thread_id) {
                state.log = store::patch_by_id(&state.log, &message_id, |m| Message {
                    reaction,
                    ..m.clone()
                });
            }
            Effect::None
        }
        Action::ThreadCleared(thread_id) => {
            drop_thread(state, &thread_id);
            Effect::None
        }
        Action::Inbound(event) => inbound(state, event),
        Action::MarkSeen(thread_id) => mark_seen(state, &thread_id),
        Action::MarkDelivered => mark_delivered(state),
        Action::SetReplyTarget(target) => {
            state.reply_target = target.and_then(|id| match state.find_message(&id) {
                Some(m) => Some(ReplyReference::to_message(m)),
                None => {
                    warn!("Reply target {} is not in the open log", id);
                    None
                }
            });
            Effect::None
        }
        Action::ScrollSampled(sample) => {
            state.viewport.on_scroll(sample);
            Effect::None
        }
        Action::JumpToLatest => {
            state.scroll_command = Some(state.viewport.jump_to_latest());
            Effect::None
        }
        Action::RequestFailed(message) => {
            warn!("Chat request failed: {}", message);
            state.error = Some(message);
            state.is_loading_threads = false;
            state.is_loading_messages = false;
            Effect::None
        }
        Action::Unauthorized => {
            state.is_loading_threads = false;
            state.is_loading_messages = false;
            if state.session_invalid {
                return Effect::None;
            }
            warn!("Session invalidated by 401");
            state.session_invalid = true;
            Effect::NotifyUnauthorized
        }
        Action::Reauthenticated => {
            info!("Session re-authenticated");
            state.session_invalid = false;
            state.error = None;
            Effect::Resync
        }
        Action::ClearError => {
            state.error = None;
            Effect::None
        }
    }
}

// ============================================================================
// View transitions
// ============================================================================

fn open_thread(state: &mut ChatState, thread_id: String) -> Effect {
    state.generation += 1;
    info!("Opening thread {} (generation {})", thread_id, state.generation);
    state.view = View::Thread(thread_id.clone());
    state.log = Vec::new();
    state.reply_target = None;
    state.last_delivered_emitted = None;
    state.last_seen_emitted = None;
    state.is_loading_messages = true;
    state.scroll_command = Some(state.viewport.reset(0));
    Effect::FetchMessages {
        thread_id,
        generation: state.generation,
    }
}

fn close_thread(state: &mut ChatState) {
    // Bumping the generation orphans any fetch still in flight.
    state.generation += 1;
    state.view = View::Threads;
    state.log = Vec::new();
    state.reply_target = None;
    state.last_delivered_emitted = None;
    state.last_seen_emitted = None;
    state.is_loading_messages = false;
}

fn drop_thread(state: &mut ChatState, thread_id: &str) {
    state.threads = store::remove_thread(&state.threads, thread_id);
    if state.is_open(thread_id) {
        info!("Open thread {} went away, returning to list", thread_id);
        close_thread(state);
    }
}

// ============================================================================
// Loads
// ============================================================================

fn load_threads(state: &mut ChatState, threads: Vec<Thread>) {
    let open = state.open_thread().cloned();
    let mut next = Vec::with_capacity(threads.len());
    for mut thread in threads {
        if thread.presence.is_none()
            && let Some(open) = open.as_ref().filter(|o| o.user_id == thread.user_id)
        {
            thread.presence = open
                .presence
                .clone()
                .or_else(|| state.presence_for(&thread.user_id).cloned());
        }
        if let Some(presence) = &thread.presence
            && let Some(key) = PresenceTracker::key_for(state.viewer, Some(&thread.user_id))
        {
            state.presence.insert(key, presence.clone());
        }
        next.push(Arc::new(thread));
    }
    info!("Thread list replaced ({} threads)", next.len());
    state.threads = next;
    state.is_loading_threads = false;
}

fn messages_loaded(state: &mut ChatState, thread_id: &str, generation: u64, messages: Vec<Message>) {
    if generation != state.generation || !state.is_open(thread_id) {
        debug!(
            "Discarding stale messages for {} (generation {} != {})",
            thread_id, generation, state.generation
        );
        return;
    }
    let was_empty = state.log.is_empty();
    // Served newest-first; the log is oldest-first.
    state.log = messages.into_iter().rev().map(Arc::new).collect();
    state.is_loading_messages = false;
    if was_empty {
        // First paint of a thread: no visible animation.
        state.scroll_command = Some(state.viewport.reset(state.log.len()));
    } else {
        state.viewport.on_item_count(state.log.len());
        state.scroll_command = Some(state.viewport.force_scroll());
    }
}

// ============================================================================
// Message log + thread preview
// ============================================================================

/// Replaces the log and lets the viewport observe the new size.
fn set_log(state: &mut ChatState, log: MessageLog) {
    state.log = log;
    if let Some(command) = state.viewport.on_item_count(state.log.len()) {
        state.scroll_command = Some(command);
    }
}

/// Upserts the thread preview for `message` and moves the thread to the front.
fn upsert_preview(state: &mut ChatState, message: &Message, count_unread: bool) {
    let existing = find_thread(&state.threads, &message.thread_key);
    let previous_id = existing.and_then(|t| t.message_id.clone());
    let is_new_preview = previous_id.as_deref() != Some(message.id.as_str());

    let mut patch = ThreadPatch::from_message(message);
    if count_unread && is_new_preview {
        patch.unread_count = Some(existing.map_or(0, |t| t.unread_count) + 1);
    }
    let fallback = match state.viewer {
        Role::Admin => Some(UserInfo {
            id: message.thread_key.clone(),
            ..Default::default()
        }),
        Role::User => None,
    };

    let mut threads = store::upsert_thread(&state.threads, patch, fallback.as_ref());
    // Receipts on the preview belong to the previewed message, not its predecessor.
    if is_new_preview && let Some(front) = threads.first_mut() {
        *front = Arc::new(Thread {
            delivered_at: message.delivered_at,
            seen_at: message.seen_at,
            ..(**front).clone()
        });
    }
    state.threads = threads;
}

/// The thread whose preview shows `message_id`.
fn previewing(state: &ChatState, thread_id: Option<&str>, message_id: &str) -> Option<Arc<Thread>> {
    state
        .threads
        .iter()
        .find(|t| t.message_id.as_deref() == Some(message_id) && thread_id.is_none_or(|id| id == t.user_id))
        .cloned()
}

fn message_sent(state: &mut ChatState, message: Message) {
    state.reply_target = None;
    upsert_preview(state, &message, false);
    if state.is_open(&message.thread_key) {
        set_log(state, store::append_if_absent(&state.log, message));
        // The sender always sees their message land.
        state.scroll_command = Some(state.viewport.force_scroll());
    }
}

fn message_edited(state: &mut ChatState, message: Message) {
    if state.is_open(&message.thread_key) {
        state.log = store::patch_by_id(&state.log, &message.id, |old| Message {
            reply_to: message.reply_to.clone().or_else(|| old.reply_to.clone()),
            delivered_at: old.delivered_at.or(message.delivered_at),
            seen_at: old.seen_at.or(message.seen_at),
            ..message.clone()
        });
    }
    if let Some(thread) = previewing(state, Some(&message.thread_key), &message.id) {
        let patch = ThreadPatch {
            user_id: thread.user_id.clone(),
            message: Some(message.body.clone()),
            ..Default::default()
        };
        state.threads = store::upsert_thread(&state.threads, patch, None);
    }
}

fn remove_message(state: &mut ChatState, thread_id: &str, message_id: &str) {
    if state.reply_target.as_ref().is_some_and(|r| r.target_id == message_id) {
        state.reply_target = None;
    }
    if !state.is_open(thread_id) {
        return;
    }
    set_log(state, store::remove_by_id(&state.log, message_id));

    // Re-derive the preview from what is left in the log.
    if let Some(thread) =
        find_thread(&state.threads, thread_id).filter(|t| t.message_id.as_deref() == Some(message_id))
    {
        let latest = state.log.last();
        let updated = Thread {
            message: latest.map(|m| m.body.clone()),
            message_id: latest.map(|m| m.id.clone()),
            sender_role: latest.map(|m| m.sender_role),
            sender_id: latest.and_then(|m| m.sender_id.clone()),
            created_at: latest.map_or(thread.created_at, |m| m.created_at),
            delivered_at: latest.and_then(|m| m.delivered_at),
            seen_at: latest.and_then(|m| m.seen_at),
            ..(**thread).clone()
        };
        state.threads = store::replace_thread(&state.threads, updated);
    }
}

// ============================================================================
// Inbound socket events
// ============================================================================

fn inbound(state: &mut ChatState, event: InboundEvent) -> Effect {
    match event {
        InboundEvent::Connected => {
            state.connected = true;
            let reconnect = std::mem::replace(&mut state.has_connected_once, true);
            if reconnect && !state.session_invalid {
                info!("Socket reconnected, resyncing");
                Effect::Resync
            } else {
                Effect::None
            }
        }
        InboundEvent::Disconnected => {
            state.connected = false;
            Effect::None
        }
        InboundEvent::Message(message) => inbound_message(state, message),
        InboundEvent::Receipt(event) => {
            inbound_receipt(state, event);
            Effect::None
        }
        InboundEvent::MessageUpdated(update) => {
            inbound_update(state, update);
            Effect::None
        }
        InboundEvent::MessageReaction(ReactionEvent { id, user_id, reaction }) => {
            if user_id.as_deref().is_none_or(|t| state.is_open(t)) {
                state.log = store::patch_by_id(&state.log, &id, |m| Message {
                    reaction,
                    ..m.clone()
                });
            }
            Effect::None
        }
        InboundEvent::MessageDeleted(event) => {
            if event.deleted_for.includes(state.viewer) {
                remove_message(state, &event.user_id, &event.id);
            } else {
                debug!("Ignoring delete of {} scoped to {:?}", event.id, event.deleted_for);
            }
            Effect::None
        }
        InboundEvent::ThreadHidden(event) => {
            if event.deleted_for.includes(state.viewer) {
                drop_thread(state, &event.user_id);
            }
            Effect::None
        }
        InboundEvent::Presence(event) => {
            inbound_presence(state, event);
            Effect::None
        }
        InboundEvent::Unknown(name) => {
            debug!("Ignoring socket event '{}'", name);
            Effect::None
        }
    }
}

fn inbound_message(state: &mut ChatState, message: Message) -> Effect {
    let from_counterparty = message.is_from_counterparty(state.viewer);
    let is_open = state.is_open(&message.thread_key);
    upsert_preview(state, &message, from_counterparty && !is_open);

    let emit = (from_counterparty
        && !state.session_invalid
        && message.delivered_at.is_none()
        && state.last_delivered_emitted.as_deref() != Some(message.id.as_str()))
    .then(|| ReceiptEmit {
        kind: ReceiptKind::Delivered,
        user_id: Some(message.thread_key.clone()),
        message_ids: vec![message.id.clone()],
    });

    if is_open {
        set_log(state, store::append_if_absent(&state.log, message));
    }

    match emit {
        Some(emit) => {
            state.last_delivered_emitted = emit.message_ids.last().cloned();
            Effect::EmitReceipt(emit)
        }
        None => Effect::None,
    }
}

fn inbound_receipt(state: &mut ChatState, event: ReceiptEvent) {
    let ReceiptEvent { user_id, receipt } = event;
    if user_id.as_deref().is_none_or(|t| state.is_open(t)) {
        state.log = apply_receipt(&state.log, &receipt);
    }
    state.threads = state
        .threads
        .iter()
        .map(|t| {
            if user_id.as_deref().is_some_and(|id| id != t.user_id) {
                return Arc::clone(t);
            }
            apply_receipt_to_thread(t, &receipt).map_or_else(|| Arc::clone(t), Arc::new)
        })
        .collect();
}

fn inbound_update(state: &mut ChatState, update: MessageUpdate) {
    if update.thread_key.as_deref().is_none_or(|t| state.is_open(t)) {
        state.log = store::patch_by_id(&state.log, &update.id, |m| update.apply(m));
    }
    let Some(thread) = previewing(state, update.thread_key.as_deref(), &update.id) else {
        return;
    };
    let delivered_at = thread.delivered_at.or(update.delivered_at);
    let seen_at = thread.seen_at.or(update.seen_at);
    state.threads = match &update.body {
        // New preview text counts as activity; receipts alone do not reorder.
        Some(body) => {
            let patch = ThreadPatch {
                user_id: thread.user_id.clone(),
                message: Some(body.clone()),
                delivered_at,
                seen_at,
                ..Default::default()
            };
            store::upsert_thread(&state.threads, patch, None)
        }
        None => store::replace_thread(
            &state.threads,
            Thread {
                delivered_at,
                seen_at,
                ..(*thread).clone()
            },
        ),
    };
}

fn inbound_presence(state: &mut ChatState, event: PresenceEvent) {
    let viewer = state.viewer;
    let Some(key) = PresenceTracker::key_for(viewer, event.user_id.as_deref()) else {
        debug!("Ignoring presence event without user id");
        return;
    };
    state.presence.set(key.clone(), event.is_online, event.last_active_at);
    let presence = state.presence.get(&key).cloned();
    state.threads = state
        .threads
        .iter()
        .map(|t| {
            // A visitor's only counterparty is the admin desk.
            if viewer == Role::User || t.user_id == key {
                Arc::new(Thread {
                    presence: presence.clone(),
                    ..(**t).clone()
                })
            } else {
                Arc::clone(t)
            }
        })
        .collect();
}

// ============================================================================
// Receipt emits
// ============================================================================

fn mark_seen(state: &mut ChatState, thread_id: &str) -> Effect {
    let viewer = state.viewer;
    let ids: Vec<String> = if state.is_open(thread_id) {
        state
            .log
            .iter()
            .filter(|m| m.is_from_counterparty(viewer) && m.seen_at.is_none())
            .map(|m| m.id.clone())
            .collect()
    } else {
        find_thread(&state.threads, thread_id)
            .filter(|t| t.sender_role.is_some_and(|r| r != viewer) && t.seen_at.is_none())
            .and_then(|t| t.message_id.clone())
            .into_iter()
            .collect()
    };

    if let Some(thread) = find_thread(&state.threads, thread_id).filter(|t| t.unread_count > 0) {
        let cleared = Thread {
            unread_count: 0,
            ..(**thread).clone()
        };
        state.threads = store::replace_thread(&state.threads, cleared);
    }

    if state.session_invalid {
        debug!("Session invalid, not emitting seen receipts");
        return Effect::None;
    }
    let Some(last) = ids.last() else {
        return Effect::None;
    };
    if state.last_seen_emitted.as_ref() == Some(last) {
        return Effect::None;
    }
    state.last_seen_emitted = Some(last.clone());
    Effect::EmitReceipt(ReceiptEmit {
        kind: ReceiptKind::Seen,
        user_id: Some(thread_id.to_string()),
        message_ids: ids,
    })
}

fn mark_delivered(state: &mut ChatState) -> Effect {
    if state.session_invalid {
        debug!("Session invalid, not emitting delivered receipts");
        return Effect::None;
    }
    let viewer = state.viewer;
    let (user_id, ids): (Option<String>, Vec<String>) = match state.open_thread_id() {
        Some(open) => (
            Some(open.to_string()),
            state
                .log
                .iter()
                .filter(|m| m.is_from_counterparty(viewer) && m.delivered_at.is_none())
                .map(|m| m.id.clone())
                .collect(),
        ),
        None => (
            None,
            state
                .threads
                .iter()
                .filter(|t| t.sender_role.is_some_and(|r| r != viewer) && t.delivered_at.is_none())
                .filter_map(|t| t.message_id.clone())
                .collect(),
        ),
    };

    let Some(last) = ids.last() else {
        return Effect::None;
    };
    if state.last_delivered_emitted.as_ref() == Some(last) {
        return Effect::None;
    }
    state.last_delivered_emitted = Some(last.clone());
    Effect::EmitReceipt(ReceiptEmit {
        kind: ReceiptKind::Delivered,
        user_id,
        message_ids: ids,
    })
}
