//! Socket event vocabulary.
//!
//! Inbound frames arrive as `(name, json)` pairs from the transport and are
//! parsed into [`InboundEvent`]. `connect` / `disconnect` are lifecycle
//! pseudo-events the transport emits itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ReceiptKind;
use crate::api::types::{MessageUpdate, WireMessage, WireMessageUpdate};
use crate::core::model::{DeleteScope, Message};
use crate::core::receipts::Receipt;

/// A raw frame delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEvent {
    pub name: String,
    pub payload: Value,
}

impl SocketEvent {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEvent {
    /// Thread the receipt belongs to, when the server names it.
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub receipt: Receipt,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReactionEvent {
    pub id: String,
    pub user_id: Option<String>,
    pub reaction: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedEvent {
    pub id: String,
    pub user_id: String,
    pub deleted_for: DeleteScope,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadHiddenEvent {
    pub user_id: String,
    pub deleted_for: DeleteScope,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connected,
    Disconnected,
    Message(Message),
    Receipt(ReceiptEvent),
    MessageUpdated(MessageUpdate),
    MessageReaction(ReactionEvent),
    MessageDeleted(MessageDeletedEvent),
    ThreadHidden(ThreadHiddenEvent),
    Presence(PresenceEvent),
    /// An event name this client does not handle.
    Unknown(String),
}

impl InboundEvent {
    pub fn parse(event: &SocketEvent) -> Result<Self, serde_json::Error> {
        let payload = event.payload.clone();
        Ok(match event.name.as_str() {
            "connect" => InboundEvent::Connected,
            "disconnect" => InboundEvent::Disconnected,
            "message" => InboundEvent::Message(serde_json::from_value::<WireMessage>(payload)?.into()),
            "receipt" => InboundEvent::Receipt(serde_json::from_value(payload)?),
            "message_updated" => {
                InboundEvent::MessageUpdated(serde_json::from_value::<WireMessageUpdate>(payload)?.into())
            }
            "message_reaction" => {
                let mut event: ReactionEvent = serde_json::from_value(payload)?;
                event.reaction = event.reaction.filter(|r| !r.is_empty());
                InboundEvent::MessageReaction(event)
            }
            "message_deleted" => InboundEvent::MessageDeleted(serde_json::from_value(payload)?),
            "thread_hidden" => InboundEvent::ThreadHidden(serde_json::from_value(payload)?),
            "presence" => InboundEvent::Presence(serde_json::from_value(payload)?),
            other => InboundEvent::Unknown(other.to_string()),
        })
    }
}

/// An outbound delivered/seen receipt.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEmit {
    #[serde(skip)]
    pub kind: ReceiptKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub message_ids: Vec<String>,
}
