//! # Domain Model
//!
//! The chat vocabulary shared by every other module. These are the
//! client's canonical shapes; the JSON the server speaks lives in
//! `api::types` and is converted into these on ingest.
//!
//! ```text
//! Thread (one per counterparty)          Message (one per chat line)
//! ├── user_id                            ├── id
//! ├── user: Option<UserInfo>             ├── thread_key  ──► Thread.user_id
//! ├── message / message_id  (preview)    ├── sender_role / sender_id
//! ├── delivered_at / seen_at (preview)   ├── body + reply_to
//! ├── unread_count                       ├── reaction
//! └── presence                           └── created_at / delivered_at / seen_at
//! ```

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Maximum length (in chars) of a reply preview snapshot.
pub const REPLY_PREVIEW_MAX_CHARS: usize = 96;

/// Which side of the conversation a principal is on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Visibility scope carried by `message_deleted` and `thread_hidden` events.
///
/// Only two participant roles exist, so the scope is a closed enum.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeleteScope {
    Admin,
    User,
    Both,
}

impl DeleteScope {
    /// True if a viewer with `role` should drop the deleted item.
    pub fn includes(self, role: Role) -> bool {
        matches!(
            (self, role),
            (DeleteScope::Both, _) | (DeleteScope::Admin, Role::Admin) | (DeleteScope::User, Role::User)
        )
    }
}

/// A reply pointer with a snapshot of the target's text at reply time.
///
/// The preview is never refreshed if the target is edited later.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReplyReference {
    #[serde(rename = "id")]
    pub target_id: String,
    #[serde(rename = "text")]
    pub preview: String,
}

impl ReplyReference {
    /// Builds a reference from the target message's full body, collapsing
    /// whitespace and truncating the preview.
    pub fn new(target_id: impl Into<String>, target_body: &str) -> Self {
        Self {
            target_id: target_id.into(),
            preview: snapshot_preview(target_body),
        }
    }

    /// Builds a reference pointing at `message`.
    pub fn to_message(message: &Message) -> Self {
        Self::new(message.id.clone(), &message.body)
    }
}

/// Collapses runs of whitespace to single spaces and caps the length.
pub fn snapshot_preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= REPLY_PREVIEW_MAX_CHARS {
        return collapsed;
    }
    collapsed.chars().take(REPLY_PREVIEW_MAX_CHARS).collect()
}

/// One chat message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    /// Counterparty id of the thread this message belongs to.
    pub thread_key: String,
    pub sender_role: Role,
    pub sender_id: Option<String>,
    /// Display text, with any legacy reply prefix already stripped.
    pub body: String,
    pub reply_to: Option<ReplyReference>,
    pub reaction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    /// True if the message was written by the other party from `viewer`'s perspective.
    pub fn is_from_counterparty(&self, viewer: Role) -> bool {
        self.sender_role != viewer
    }
}

/// Display info for a thread's counterparty.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

/// Online status of a participant.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Presence {
    pub is_online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
}

/// One conversation summary in the thread list.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Thread {
    pub user_id: String,
    pub user: Option<UserInfo>,
    /// Preview text of the latest message.
    pub message: Option<String>,
    pub message_id: Option<String>,
    pub sender_role: Option<Role>,
    pub sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
    pub presence: Option<Presence>,
}

/// A sparse update for a thread summary. `None` means "not carried by this event".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreadPatch {
    pub user_id: String,
    pub user: Option<UserInfo>,
    pub message: Option<String>,
    pub message_id: Option<String>,
    pub sender_role: Option<Role>,
    pub sender_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub unread_count: Option<u32>,
    pub presence: Option<Presence>,
}

impl ThreadPatch {
    /// A preview patch describing `message` as the thread's latest message.
    pub fn from_message(message: &Message) -> Self {
        Self {
            user_id: message.thread_key.clone(),
            message: Some(message.body.clone()),
            message_id: Some(message.id.clone()),
            sender_role: Some(message.sender_role),
            sender_id: message.sender_id.clone(),
            created_at: Some(message.created_at),
            delivered_at: message.delivered_at,
            seen_at: message.seen_at,
            ..Default::default()
        }
    }
}
