//! # Chat State
//!
//! Everything one chat client knows, in one place.
//!
//! ```text
//! ChatState
//! ├── viewer: Role                 // which side of the conversation we are
//! ├── view: View                   // Threads ⇄ Thread(id)
//! ├── threads: ThreadList          // summaries, most recent first
//! ├── log: MessageLog              // open thread only, oldest first
//! ├── presence: PresenceTracker
//! ├── viewport: ViewportController // pinning + pending count
//! ├── scroll_command               // next instruction for the UI
//! ├── reply_target                 // composer "replying to ..."
//! ├── error / is_loading_*         // retained for display
//! ├── session_invalid              // set by the first 401
//! ├── generation                   // bumps on every thread switch
//! └── last_*_emitted               // receipt emit dedup
//! ```
//!
//! State changes only happen through `update(state, action)` in action.rs.

use std::sync::Arc;

use crate::core::model::{Message, Presence, ReplyReference, Role, Thread};
use crate::core::presence::PresenceTracker;
use crate::core::store::{MessageLog, ThreadList, find_thread};
use crate::core::viewport::{ScrollCommand, ViewportController};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum View {
    /// Thread list, nothing open.
    #[default]
    Threads,
    /// One thread open; its log is loaded (or loading).
    Thread(String),
}

#[derive(Debug, Clone)]
pub struct ChatState {
    pub viewer: Role,
    pub view: View,
    pub threads: ThreadList,
    pub log: MessageLog,
    pub presence: PresenceTracker,
    pub viewport: ViewportController,
    /// Set by reducers, drained by the presentation layer.
    pub scroll_command: Option<ScrollCommand>,
    pub reply_target: Option<ReplyReference>,
    pub error: Option<String>,
    pub is_loading_threads: bool,
    pub is_loading_messages: bool,
    /// True after a 401 until re-authenticated. No authenticated calls are made meanwhile.
    pub session_invalid: bool,
    pub connected: bool,
    pub has_connected_once: bool,
    /// Message fetches tagged with an older generation are discarded.
    pub generation: u64,
    pub last_delivered_emitted: Option<String>,
    pub last_seen_emitted: Option<String>,
}

impl ChatState {
    pub fn new(viewer: Role, viewport: ViewportController) -> Self {
        Self {
            viewer,
            view: View::Threads,
            threads: Vec::new(),
            log: Vec::new(),
            presence: PresenceTracker::new(),
            viewport,
            scroll_command: None,
            reply_target: None,
            error: None,
            is_loading_threads: false,
            is_loading_messages: false,
            session_invalid: false,
            connected: false,
            has_connected_once: false,
            generation: 0,
            last_delivered_emitted: None,
            last_seen_emitted: None,
        }
    }

    /// Id of the open thread, if any.
    pub fn open_thread_id(&self) -> Option<&str> {
        match &self.view {
            View::Thread(id) => Some(id),
            View::Threads => None,
        }
    }

    pub fn is_open(&self, thread_id: &str) -> bool {
        self.open_thread_id() == Some(thread_id)
    }

    pub fn open_thread(&self) -> Option<&Arc<Thread>> {
        self.open_thread_id().and_then(|id| find_thread(&self.threads, id))
    }

    pub fn find_message(&self, id: &str) -> Option<&Arc<Message>> {
        self.log.iter().find(|m| m.id == id)
    }

    /// Presence of the counterparty in `thread_id`.
    pub fn presence_for(&self, thread_id: &str) -> Option<&Presence> {
        let key = PresenceTracker::key_for(self.viewer, Some(thread_id))?;
        self.presence.get(&key)
    }

    /// Drains the pending scroll instruction.
    pub fn take_scroll_command(&mut self) -> Option<ScrollCommand> {
        self.scroll_command.take()
    }
}
