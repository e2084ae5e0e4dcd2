//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

use crate::api::{ApiError, ChatApi};
use crate::core::identity::Identity;
use crate::core::model::{Message, Role, Thread, UserInfo};
use crate::socket::{Ack, Connector, SocketError, SocketEvent, Transport};

// ============================================================================
// Fixtures
// ============================================================================

/// 2024-01-01T00:00:00Z plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200 + secs, 0).expect("fixture timestamp in range")
}

/// A visitor-sent message in thread `t1`.
pub fn message(id: &str, body: &str) -> Message {
    Message {
        id: id.to_string(),
        thread_key: "t1".to_string(),
        sender_role: Role::User,
        sender_id: Some("t1".to_string()),
        body: body.to_string(),
        reply_to: None,
        reaction: None,
        created_at: ts(0),
        delivered_at: None,
        seen_at: None,
    }
}

/// A thread whose preview is message `<user_id>-latest`, active at `ts(secs)`.
pub fn thread(user_id: &str, secs: i64) -> Thread {
    Thread {
        user_id: user_id.to_string(),
        user: Some(UserInfo {
            id: user_id.to_string(),
            ..Default::default()
        }),
        message: Some("latest".to_string()),
        message_id: Some(format!("{user_id}-latest")),
        sender_role: None,
        sender_id: None,
        created_at: ts(secs),
        delivered_at: None,
        seen_at: None,
        unread_count: 0,
        presence: None,
    }
}

// ============================================================================
// MockChatApi
// ============================================================================

type Queue<T> = Mutex<VecDeque<Result<T, ApiError>>>;

fn pop<T>(queue: &Queue<T>, fallback: impl FnOnce() -> Result<T, ApiError>) -> Result<T, ApiError> {
    queue
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .pop_front()
        .unwrap_or_else(fallback)
}

/// Scripted `ChatApi`. Unscripted reads return empty lists; unscripted
/// writes fail with a network error.
#[derive(Default)]
pub struct MockChatApi {
    pub threads: Queue<Vec<Thread>>,
    pub messages: Queue<Vec<Message>>,
    pub sent: Queue<Message>,
    pub edited: Queue<Message>,
    pub deleted: Queue<()>,
    pub reactions: Queue<Option<String>>,
    pub cleared: Queue<()>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<String>>,
    bearer: Mutex<Option<String>>,
}

impl MockChatApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_threads(&self, result: Result<Vec<Thread>, ApiError>) {
        self.threads.lock().unwrap().push_back(result);
    }

    pub fn push_messages(&self, result: Result<Vec<Message>, ApiError>) {
        self.messages.lock().unwrap().push_back(result);
    }

    pub fn push_sent(&self, result: Result<Message, ApiError>) {
        self.sent.lock().unwrap().push_back(result);
    }

    pub fn push_edited(&self, result: Result<Message, ApiError>) {
        self.edited.lock().unwrap().push_back(result);
    }

    pub fn push_deleted(&self, result: Result<(), ApiError>) {
        self.deleted.lock().unwrap().push_back(result);
    }

    pub fn push_reaction(&self, result: Result<Option<String>, ApiError>) {
        self.reactions.lock().unwrap().push_back(result);
    }

    pub fn push_cleared(&self, result: Result<(), ApiError>) {
        self.cleared.lock().unwrap().push_back(result);
    }

    /// Holds the next `list_messages(thread_id)` until the sender fires.
    pub fn gate_messages(&self, thread_id: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(thread_id.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unscripted<T>(op: &str) -> impl FnOnce() -> Result<T, ApiError> + '_ {
    move || Err(ApiError::Network(format!("unscripted {op}")))
}

#[async_trait]
impl ChatApi for MockChatApi {
    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.lock().unwrap() = token;
    }

    async fn list_threads(&self) -> Result<Vec<Thread>, ApiError> {
        self.record("list_threads".into());
        pop(&self.threads, || Ok(Vec::new()))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ApiError> {
        self.record(format!("list_messages:{thread_id}"));
        let gate = self.gates.lock().unwrap().remove(thread_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        pop(&self.messages, || Ok(Vec::new()))
    }

    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message, ApiError> {
        self.record(format!("send_message:{thread_id}:{body}"));
        pop(&self.sent, unscripted("send"))
    }

    async fn edit_message(&self, thread_id: &str, message_id: &str, body: &str) -> Result<Message, ApiError> {
        self.record(format!("edit_message:{thread_id}:{message_id}:{body}"));
        pop(&self.edited, unscripted("edit"))
    }

    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_message:{thread_id}:{message_id}"));
        pop(&self.deleted, unscripted("delete"))
    }

    async fn react_message(&self, thread_id: &str, message_id: &str, emoji: &str) -> Result<Option<String>, ApiError> {
        self.record(format!("react_message:{thread_id}:{message_id}:{emoji}"));
        pop(&self.reactions, unscripted("react"))
    }

    async fn clear_thread(&self, thread_id: &str) -> Result<(), ApiError> {
        self.record(format!("clear_thread:{thread_id}"));
        pop(&self.cleared, unscripted("clear"))
    }
}

// ============================================================================
// MockConnector / MockTransport
// ============================================================================

/// Records emits; acknowledges with queued payloads, else `{ "ok": true }`.
#[derive(Default)]
pub struct MockTransport {
    emits: Mutex<Vec<(String, Value)>>,
    acks: Mutex<VecDeque<Value>>,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn push_ack(&self, ack: Value) {
        self.acks.lock().unwrap().push_back(ack);
    }

    pub fn emits(&self) -> Vec<(String, Value)> {
        self.emits.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn emit(&self, event: &str, payload: Value) -> Result<Ack, SocketError> {
        if self.is_closed() {
            return Err(SocketError::Closed);
        }
        self.emits.lock().unwrap().push((event.to_string(), payload));
        Ok(self.acks.lock().unwrap().pop_front().unwrap_or_else(|| json!({"ok": true})))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Hands out a fresh `MockTransport` per connect and keeps the inbound senders.
#[derive(Default)]
pub struct MockConnector {
    transports: Mutex<Vec<Arc<MockTransport>>>,
    senders: Mutex<Vec<mpsc::Sender<SocketEvent>>>,
    identities: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_count(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        self.transports.lock().unwrap().last().cloned()
    }

    pub fn last_sender(&self) -> Option<mpsc::Sender<SocketEvent>> {
        self.senders.lock().unwrap().last().cloned()
    }

    /// Identity keys in connect order.
    pub fn identities(&self) -> Vec<String> {
        self.identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        identity: &Identity,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<SocketEvent>), SocketError> {
        let transport = Arc::new(MockTransport::default());
        let (tx, rx) = mpsc::channel(64);
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        self.senders.lock().unwrap().push(tx);
        self.identities.lock().unwrap().push(identity.key());
        Ok((transport, rx))
    }
}
