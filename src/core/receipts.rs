//! Delivery/seen receipt merging.
//!
//! Receipt timestamps only ever fill in: a receipt carrying `None` for a
//! field never clears a value the message already has.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::model::{Message, Thread};

/// A receipt event as pushed by the server.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(default)]
    pub message_ids: Vec<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Receipt {
    fn merged_delivered(&self, existing: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        // A seen message is necessarily delivered.
        self.delivered_at.or(existing).or(self.seen_at)
    }

    fn merged_seen(&self, existing: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        self.seen_at.or(existing)
    }
}

/// Applies `receipt` to every message whose id it names.
///
/// Unaffected entries are the same `Arc`s as in the input, so a caller can
/// diff with `Arc::ptr_eq`.
pub fn apply_receipt(messages: &[Arc<Message>], receipt: &Receipt) -> Vec<Arc<Message>> {
    if receipt.message_ids.is_empty() {
        return messages.to_vec();
    }
    let ids: HashSet<&str> = receipt.message_ids.iter().map(String::as_str).collect();

    messages
        .iter()
        .map(|m| {
            if !ids.contains(m.id.as_str()) {
                return Arc::clone(m);
            }
            let delivered_at = receipt.merged_delivered(m.delivered_at);
            let seen_at = receipt.merged_seen(m.seen_at);
            if delivered_at == m.delivered_at && seen_at == m.seen_at {
                return Arc::clone(m);
            }
            Arc::new(Message {
                delivered_at,
                seen_at,
                ..(**m).clone()
            })
        })
        .collect()
}

/// Applies `receipt` to a thread's preview, if the preview shows one of the
/// named messages. Returns `None` when the thread is unaffected.
pub fn apply_receipt_to_thread(thread: &Thread, receipt: &Receipt) -> Option<Thread> {
    let preview_id = thread.message_id.as_deref()?;
    if !receipt.message_ids.iter().any(|id| id == preview_id) {
        return None;
    }
    Some(Thread {
        delivered_at: receipt.merged_delivered(thread.delivered_at),
        seen_at: receipt.merged_seen(thread.seen_at),
        ..thread.clone()
    })
}
