//! Wire shapes for the chat REST API and socket payloads.
//!
//! The server speaks camelCase JSON with the message text in a single
//! `message` column. Everything here converts into `core::model` types at
//! the boundary, decoding the legacy reply prefix on the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::codec;
use crate::core::model::{Message, Presence, ReplyReference, Role, Thread, UserInfo};

/// Distinguishes "field absent" (`None`) from "field is null" (`Some(None)`).
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    #[serde(alias = "threadKey")]
    pub user_id: String,
    pub sender_role: Role,
    pub sender_id: Option<String>,
    #[serde(default, alias = "body")]
    pub message: String,
    /// Structured reply field from newer servers; wins over the text prefix.
    pub reply_to: Option<ReplyReference>,
    pub reaction: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let decoded = codec::decode(&wire.message);
        Message {
            id: wire.id,
            thread_key: wire.user_id,
            sender_role: wire.sender_role,
            sender_id: wire.sender_id,
            body: decoded.body,
            reply_to: wire.reply_to.or(decoded.reply),
            reaction: wire.reaction.filter(|r| !r.is_empty()),
            created_at: wire.created_at,
            delivered_at: wire.delivered_at,
            seen_at: wire.seen_at,
        }
    }
}

/// `POST` acknowledgements come either bare or wrapped as `{ "message": {...} }`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum MessageEnvelope {
    Wrapped { message: WireMessage },
    Bare(WireMessage),
}

impl MessageEnvelope {
    pub fn into_message(self) -> Message {
        match self {
            MessageEnvelope::Wrapped { message } | MessageEnvelope::Bare(message) => message.into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireThread {
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
    pub is_online: Option<bool>,
    pub last_active_at: Option<DateTime<Utc>>,
}

impl From<WireThread> for Thread {
    fn from(wire: WireThread) -> Self {
        let presence = wire.is_online.map(|is_online| Presence {
            is_online,
            last_active_at: wire.last_active_at,
        });
        Thread {
            user_id: wire.user_id,
            user: wire.user,
            message: wire.message.map(|raw| codec::decode(&raw).body),
            message_id: wire.message_id,
            sender_role: wire.sender_role,
            sender_id: wire.sender_id,
            created_at: wire.created_at.unwrap_or_else(Utc::now),
            delivered_at: wire.delivered_at,
            seen_at: wire.seen_at,
            unread_count: wire.unread_count.unwrap_or(0),
            presence,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct ThreadsResponse {
    #[serde(default)]
    pub threads: Vec<WireThread>,
}

#[derive(Deserialize, Debug)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Serialize, Debug)]
pub struct MessageBody<'a> {
    pub message: &'a str,
}

#[derive(Serialize, Debug)]
pub struct ReactionBody<'a> {
    pub emoji: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct ReactionResponse {
    pub reaction: Option<String>,
}

/// Error payloads use either `message` or `error`.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn text(self) -> Option<String> {
        self.message.or(self.error).filter(|s| !s.trim().is_empty())
    }
}

/// A partial message update pushed as `message_updated`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessageUpdate {
    pub id: String,
    #[serde(alias = "threadKey")]
    pub user_id: Option<String>,
    #[serde(alias = "body")]
    pub message: Option<String>,
    pub reply_to: Option<ReplyReference>,
    #[serde(default, deserialize_with = "double_option")]
    pub reaction: Option<Option<String>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

/// A decoded `message_updated`: only fields present on the wire are `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageUpdate {
    pub id: String,
    pub thread_key: Option<String>,
    pub body: Option<String>,
    pub reply_to: Option<Option<ReplyReference>>,
    pub reaction: Option<Option<String>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl From<WireMessageUpdate> for MessageUpdate {
    fn from(wire: WireMessageUpdate) -> Self {
        let (body, reply_to) = match wire.message {
            Some(raw) => {
                let decoded = codec::decode(&raw);
                (Some(decoded.body), Some(wire.reply_to.or(decoded.reply)))
            }
            None => (None, wire.reply_to.map(Some)),
        };
        MessageUpdate {
            id: wire.id,
            thread_key: wire.user_id,
            body,
            reply_to,
            reaction: wire.reaction.map(|r| r.filter(|r| !r.is_empty())),
            delivered_at: wire.delivered_at,
            seen_at: wire.seen_at,
        }
    }
}

impl MessageUpdate {
    /// Applies the carried fields to `message`. Receipts only fill in.
    pub fn apply(&self, message: &Message) -> Message {
        Message {
            body: self.body.clone().unwrap_or_else(|| message.body.clone()),
            reply_to: self.reply_to.clone().unwrap_or_else(|| message.reply_to.clone()),
            reaction: self.reaction.clone().unwrap_or_else(|| message.reaction.clone()),
            delivered_at: message.delivered_at.or(self.delivered_at),
            seen_at: message.seen_at.or(self.seen_at),
            ..message.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ts;

    #[test]
    fn test_wire_message_decodes_reply_prefix() {
        let json = r#"{
            "id": "m2",
            "userId": "u1",
            "senderRole": "admin",
            "senderId": "a1",
            "message": "[reply:m1:hello%20there] sure thing",
            "createdAt": "2024-01-01T00:00:05Z"
        }"#;
        let wire: WireMessage = serde_json::from_str(json).unwrap();
        let msg: Message = wire.into();
        assert_eq!(msg.body, "sure thing");
        assert_eq!(msg.thread_key, "u1");
        assert_eq!(msg.sender_role, Role::Admin);
        assert_eq!(
            msg.reply_to,
            Some(ReplyReference {
                target_id: "m1".into(),
                preview: "hello there".into()
            })
        );
        assert_eq!(msg.created_at, ts(5));
        assert!(msg.delivered_at.is_none());
    }

    #[test]
    fn test_structured_reply_wins_over_prefix() {
        let json = r#"{
            "id": "m2", "userId": "u1", "senderRole": "user",
            "message": "[reply:old:legacy] text",
            "replyTo": {"id": "new", "text": "structured"},
            "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str::<WireMessage>(json).unwrap().into();
        assert_eq!(msg.reply_to.unwrap().target_id, "new");
        assert_eq!(msg.body, "text");
    }

    #[test]
    fn test_body_alias_accepted() {
        let json = r#"{"id":"m1","userId":"t1","senderRole":"user","body":"hi","createdAt":"2024-01-01T00:00:00Z"}"#;
        let msg: Message = serde_json::from_str::<WireMessage>(json).unwrap().into();
        assert_eq!(msg.body, "hi");
    }

    #[test]
    fn test_envelope_wrapped_and_bare() {
        let bare = r#"{"id":"m1","userId":"t1","senderRole":"user","message":"hi","createdAt":"2024-01-01T00:00:00Z"}"#;
        let wrapped = format!(r#"{{"message":{bare}}}"#);
        let a = serde_json::from_str::<MessageEnvelope>(bare).unwrap().into_message();
        let b = serde_json::from_str::<MessageEnvelope>(&wrapped).unwrap().into_message();
        assert_eq!(a, b);
        assert_eq!(a.body, "hi");
    }

    #[test]
    fn test_wire_thread_embeds_presence() {
        let json = r#"{
            "userId": "u1",
            "user": {"id": "u1", "name": "Ada", "avatarUrl": "https://x/y.png"},
            "message": "[reply:m1:x] latest",
            "messageId": "m9",
            "senderRole": "user",
            "createdAt": "2024-01-01T00:00:09Z",
            "isOnline": true
        }"#;
        let thread: Thread = serde_json::from_str::<WireThread>(json).unwrap().into();
        assert_eq!(thread.message.as_deref(), Some("latest"));
        assert_eq!(thread.presence.as_ref().map(|p| p.is_online), Some(true));
        assert_eq!(thread.user.unwrap().avatar_url.as_deref(), Some("https://x/y.png"));
    }

    #[test]
    fn test_wire_thread_without_presence() {
        let json = r#"{"userId": "u1"}"#;
        let thread: Thread = serde_json::from_str::<WireThread>(json).unwrap().into();
        assert!(thread.presence.is_none());
        assert_eq!(thread.unread_count, 0);
    }

    #[test]
    fn test_update_distinguishes_null_reaction() {
        let cleared: WireMessageUpdate = serde_json::from_str(r#"{"id":"m1","reaction":null}"#).unwrap();
        assert_eq!(cleared.reaction, Some(None));
        let absent: WireMessageUpdate = serde_json::from_str(r#"{"id":"m1"}"#).unwrap();
        assert_eq!(absent.reaction, None);
    }

    #[test]
    fn test_update_apply_keeps_missing_fields() {
        let mut original = crate::test_support::message("m1", "before");
        original.reaction = Some("🔥".into());
        original.seen_at = Some(ts(3));
        let update: MessageUpdate = serde_json::from_str::<WireMessageUpdate>(r#"{"id":"m1","message":"after"}"#)
            .unwrap()
            .into();
        let patched = update.apply(&original);
        assert_eq!(patched.body, "after");
        assert_eq!(patched.reaction.as_deref(), Some("🔥"));
        assert_eq!(patched.seen_at, Some(ts(3)));
        assert!(patched.reply_to.is_none());
    }

    #[test]
    fn test_error_body_prefers_message() {
        let body: ErrorBody = serde_json::from_str(r#"{"message":"Nope","error":"x"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("Nope"));
        let body: ErrorBody = serde_json::from_str(r#"{"error":"Bad"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("Bad"));
    }
}
