//! # Chat Session Controller
//!
//! One role-parameterized controller for both the admin desk and the visitor
//! widget. It owns the [`ChatState`], runs REST calls and socket emits, and
//! feeds every result back through `update()`.
//!
//! ```text
//!  caller ──► ChatSession op ──► ChatApi / Connection
//!                  │                    │
//!                  ▼                    ▼
//!             dispatch(Action) ◄── result / inbound SocketEvent
//!                  │
//!                  ├──► update(&mut ChatState) ──► Effect ──► follow-up I/O
//!                  └──► revision += 1 (watch) ──► observers re-read snapshot()
//! ```
//!
//! The state lives behind a std `Mutex` that is never held across an
//! `.await`; every suspension point is a network call.

mod error;

pub use error::ChatError;

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::types::MessageEnvelope;
use crate::api::{ApiError, ChatApi, RoleRoutes};
use crate::core::action::{Action, Effect, update};
use crate::core::codec;
use crate::core::identity::Identity;
use crate::core::model::{Message, Role};
use crate::core::state::ChatState;
use crate::core::viewport::{DEFAULT_PIN_THRESHOLD_PX, ScrollCommand, ScrollSample, ViewportController};
use crate::socket::{Connection, Connector, InboundEvent, ReceiptEmit, SocketError, SocketEvent};

/// Invoked once when a 401 invalidates the session.
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    api: Arc<dyn ChatApi>,
    routes: RoleRoutes,
    state: Mutex<ChatState>,
    revision: watch::Sender<u64>,
    connection: Option<Connection>,
    on_unauthorized: Option<UnauthorizedCallback>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().unwrap_or_else(|p| p.into_inner()).take() {
            pump.abort();
        }
    }
}

pub struct ChatSessionBuilder {
    api: Arc<dyn ChatApi>,
    role: Role,
    pin_threshold_px: f32,
    connector: Option<Arc<dyn Connector>>,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl ChatSessionBuilder {
    pub fn pin_threshold(mut self, px: f32) -> Self {
        self.pin_threshold_px = px;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn on_unauthorized(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ChatSession {
        let state = ChatState::new(self.role, ViewportController::new(self.pin_threshold_px));
        let (revision, _) = watch::channel(0);
        ChatSession {
            inner: Arc::new(Inner {
                api: self.api,
                routes: RoleRoutes::for_role(self.role),
                state: Mutex::new(state),
                revision,
                connection: self.connector.map(Connection::new),
                on_unauthorized: self.on_unauthorized,
                pump: Mutex::new(None),
            }),
        }
    }
}

/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn builder(api: Arc<dyn ChatApi>, role: Role) -> ChatSessionBuilder {
        ChatSessionBuilder {
            api,
            role,
            pin_threshold_px: DEFAULT_PIN_THRESHOLD_PX,
            connector: None,
            on_unauthorized: None,
        }
    }

    pub fn role(&self) -> Role {
        self.inner.routes.role
    }

    // ========================================================================
    // State access
    // ========================================================================

    fn lock_state(&self) -> MutexGuard<'_, ChatState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A copy of the current state. Collections share their `Arc`s.
    pub fn snapshot(&self) -> ChatState {
        self.lock_state().clone()
    }

    /// Ticks once per applied action.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn dispatch(&self, action: Action) -> Effect {
        debug!("Dispatch: {:?}", action);
        let effect = {
            let mut state = self.lock_state();
            update(&mut state, action)
        };
        self.inner.revision.send_modify(|r| *r += 1);
        effect
    }

    fn ensure_session(&self) -> Result<(), ChatError> {
        if self.lock_state().session_invalid {
            return Err(ChatError::SessionInvalid);
        }
        Ok(())
    }

    fn reject(&self, message: &str) -> ChatError {
        let error = ChatError::Validation(message.to_string());
        self.dispatch(Action::RequestFailed(error.to_string()));
        error
    }

    /// Records `error` in state. A 401 invalidates the session instead.
    fn fail(&self, error: ApiError) -> ChatError {
        match error {
            ApiError::Unauthorized => {
                if self.dispatch(Action::Unauthorized) == Effect::NotifyUnauthorized {
                    self.notify_unauthorized();
                }
                ChatError::Unauthorized
            }
            other => {
                let error = ChatError::from(other);
                self.dispatch(Action::RequestFailed(error.to_string()));
                error
            }
        }
    }

    fn notify_unauthorized(&self) {
        if let Some(callback) = &self.inner.on_unauthorized {
            callback();
        }
    }

    // ========================================================================
    // Loads
    // ========================================================================

    pub async fn load_threads(&self) -> Result<(), ChatError> {
        self.ensure_session()?;
        self.dispatch(Action::ThreadsRequested);
        match self.inner.api.list_threads().await {
            Ok(threads) => {
                self.dispatch(Action::ThreadsLoaded(threads));
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Switches to `thread_id` and loads its log.
    pub async fn open_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        self.ensure_session()?;
        let effect = self.dispatch(Action::OpenThread(thread_id.to_string()));
        self.fetch_messages(effect).await
    }

    /// Reloads `thread_id` in place if it is open, otherwise opens it.
    pub async fn load_messages(&self, thread_id: &str) -> Result<(), ChatError> {
        self.ensure_session()?;
        let is_open = self.lock_state().is_open(thread_id);
        if !is_open {
            return self.open_thread(thread_id).await;
        }
        let effect = self.dispatch(Action::RefreshMessages);
        self.fetch_messages(effect).await
    }

    async fn fetch_messages(&self, effect: Effect) -> Result<(), ChatError> {
        let Effect::FetchMessages { thread_id, generation } = effect else {
            return Ok(());
        };
        match self.inner.api.list_messages(&thread_id).await {
            Ok(messages) => {
                self.dispatch(Action::MessagesLoaded {
                    thread_id,
                    generation,
                    messages,
                });
                Ok(())
            }
            Err(e) => {
                let stale = self.lock_state().generation != generation;
                if stale && !matches!(e, ApiError::Unauthorized) {
                    debug!("Dropping failure of stale fetch for {}: {}", thread_id, e);
                    return Ok(());
                }
                Err(self.fail(e))
            }
        }
    }

    pub fn go_back_to_list(&self) {
        self.dispatch(Action::GoBackToList);
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Sends `text` over REST, replying to the current reply target if set.
    ///
    /// Nothing is added to the log until the server echoes the message.
    pub async fn send_message(&self, thread_id: &str, text: &str) -> Result<Message, ChatError> {
        let body = self.prepare_send(thread_id, text)?;
        match self.inner.api.send_message(thread_id, &body).await {
            Ok(message) => {
                info!("Sent message {} to {}", message.id, thread_id);
                self.dispatch(Action::MessageSent(message.clone()));
                Ok(message)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Sends `text` as a socket `send` emit and applies the acknowledged message.
    pub async fn send_message_live(&self, thread_id: &str, text: &str) -> Result<Message, ChatError> {
        let body = self.prepare_send(thread_id, text)?;
        let Some(connection) = &self.inner.connection else {
            return Err(self.socket_failed(SocketError::NotConnected));
        };
        let payload = json!({ "userId": thread_id, "message": body });
        let ack = match connection.emit(&self.inner.routes.emit_send(), payload).await {
            Ok(ack) => ack,
            Err(e) => return Err(self.socket_failed(e)),
        };
        let message = match serde_json::from_value::<MessageEnvelope>(ack) {
            Ok(envelope) => envelope.into_message(),
            Err(e) => return Err(self.fail(ApiError::Parse(e.to_string()))),
        };
        self.dispatch(Action::MessageSent(message.clone()));
        Ok(message)
    }

    fn prepare_send(&self, thread_id: &str, text: &str) -> Result<String, ChatError> {
        if thread_id.is_empty() {
            return Err(self.reject("Select a conversation first."));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject("Message cannot be empty."));
        }
        self.ensure_session()?;
        let reply = self.lock_state().reply_target.clone();
        Ok(codec::encode(text, reply.as_ref()))
    }

    fn socket_failed(&self, error: SocketError) -> ChatError {
        let error = ChatError::from(error);
        self.dispatch(Action::RequestFailed(error.to_string()));
        error
    }

    /// Replaces a message's text. An existing reply reference is kept.
    pub async fn edit_message(&self, thread_id: &str, message_id: &str, text: &str) -> Result<Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(self.reject("Message cannot be empty."));
        }
        self.ensure_session()?;
        let reply = self
            .lock_state()
            .find_message(message_id)
            .and_then(|m| m.reply_to.clone());
        let body = codec::encode(text, reply.as_ref());
        match self.inner.api.edit_message(thread_id, message_id, &body).await {
            Ok(message) => {
                self.dispatch(Action::MessageEdited(message.clone()));
                Ok(message)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    pub async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ChatError> {
        self.ensure_session()?;
        match self.inner.api.delete_message(thread_id, message_id).await {
            Ok(()) => {
                self.dispatch(Action::MessageRemoved {
                    thread_id: thread_id.to_string(),
                    message_id: message_id.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Sets our reaction; an empty `emoji` clears it.
    pub async fn react_message(&self, thread_id: &str, message_id: &str, emoji: &str) -> Result<Option<String>, ChatError> {
        self.ensure_session()?;
        match self.inner.api.react_message(thread_id, message_id, emoji).await {
            Ok(reaction) => {
                self.dispatch(Action::ReactionSet {
                    thread_id: thread_id.to_string(),
                    message_id: message_id.to_string(),
                    reaction: reaction.clone(),
                });
                Ok(reaction)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Clears the conversation from our own view only.
    pub async fn delete_thread_messages(&self, thread_id: &str) -> Result<(), ChatError> {
        self.ensure_session()?;
        match self.inner.api.clear_thread(thread_id).await {
            Ok(()) => {
                self.dispatch(Action::ThreadCleared(thread_id.to_string()));
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ========================================================================
    // Receipts
    // ========================================================================

    pub async fn mark_seen(&self, thread_id: &str) {
        let effect = self.dispatch(Action::MarkSeen(thread_id.to_string()));
        self.run_effect(effect).await;
    }

    pub async fn mark_delivered(&self) {
        let effect = self.dispatch(Action::MarkDelivered);
        self.run_effect(effect).await;
    }

    /// Fire-and-forget: a failed receipt is logged and not retried.
    async fn emit_receipt(&self, emit: ReceiptEmit) {
        let Some(connection) = &self.inner.connection else {
            debug!("No socket; dropping {:?} receipt", emit.kind);
            return;
        };
        let event = self.inner.routes.emit_receipt(emit.kind);
        let payload = match serde_json::to_value(&emit) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode receipt: {}", e);
                return;
            }
        };
        if let Err(e) = connection.emit(&event, payload).await {
            debug!("Receipt emit {} failed: {}", event, e);
        }
    }

    // ========================================================================
    // Composer + viewport
    // ========================================================================

    /// Replies to `message_id` in the open log.
    pub fn set_reply_target(&self, message_id: &str) {
        self.dispatch(Action::SetReplyTarget(Some(message_id.to_string())));
    }

    pub fn clear_reply_target(&self) {
        self.dispatch(Action::SetReplyTarget(None));
    }

    pub fn clear_error(&self) {
        self.dispatch(Action::ClearError);
    }

    pub fn on_scroll(&self, sample: ScrollSample) {
        self.dispatch(Action::ScrollSampled(sample));
    }

    pub fn jump_to_latest(&self) {
        self.dispatch(Action::JumpToLatest);
    }

    pub fn take_scroll_command(&self) -> Option<ScrollCommand> {
        self.lock_state().take_scroll_command()
    }

    // ========================================================================
    // Socket lifecycle
    // ========================================================================

    /// Opens the socket for `identity`. A no-op if it is already open for
    /// the same identity key.
    pub async fn connect(&self, identity: &Identity) -> Result<(), ChatError> {
        let Some(connection) = &self.inner.connection else {
            return Err(ChatError::Socket(SocketError::NotConnected));
        };
        self.inner.api.set_bearer(identity.token.clone());
        if let Some(inbound) = connection.connect(identity).await? {
            self.spawn_pump(inbound);
        }
        Ok(())
    }

    /// Tears down the socket and reconnects as `identity`.
    pub async fn reconnect_as(&self, identity: &Identity) -> Result<(), ChatError> {
        let Some(connection) = &self.inner.connection else {
            return Err(ChatError::Socket(SocketError::NotConnected));
        };
        self.inner.api.set_bearer(identity.token.clone());
        let inbound = connection.reconnect_as(identity).await?;
        self.spawn_pump(inbound);
        Ok(())
    }

    /// Installs a fresh credential after a 401 and resyncs.
    pub async fn reauthenticate(&self, identity: &Identity) -> Result<(), ChatError> {
        self.inner.api.set_bearer(identity.token.clone());
        let effect = self.dispatch(Action::Reauthenticated);
        if self.inner.connection.is_some() {
            self.reconnect_as(identity).await?;
        }
        if effect == Effect::Resync {
            self.resync().await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(connection) = &self.inner.connection {
            connection.disconnect().await;
        }
        let pump = self.inner.pump.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.dispatch(Action::Inbound(InboundEvent::Disconnected));
    }

    fn spawn_pump(&self, mut inbound: mpsc::Receiver<SocketEvent>) {
        // Weak so a dropped session stops its pump instead of leaking.
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                ChatSession { inner }.handle_socket_event(event).await;
            }
            debug!("Socket event pump finished");
        });
        let previous = self.inner.pump.lock().unwrap_or_else(|p| p.into_inner()).replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Applies one inbound frame and runs its follow-up.
    pub async fn handle_socket_event(&self, event: SocketEvent) {
        let inbound = match InboundEvent::parse(&event) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!("Malformed '{}' event: {}", event.name, e);
                return;
            }
        };
        let effect = self.dispatch(Action::Inbound(inbound));
        self.run_effect(effect).await;
    }

    async fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::None => {}
            Effect::EmitReceipt(emit) => self.emit_receipt(emit).await,
            Effect::NotifyUnauthorized => self.notify_unauthorized(),
            Effect::FetchMessages { .. } => {
                if let Err(e) = self.fetch_messages(effect).await {
                    warn!("Message fetch failed: {}", e);
                }
            }
            Effect::Resync => {
                if let Err(e) = self.resync().await {
                    warn!("Resync failed: {}", e);
                }
            }
        }
    }

    /// Reloads the thread list and, if a thread is open, its log.
    async fn resync(&self) -> Result<(), ChatError> {
        self.load_threads().await?;
        let effect = self.dispatch(Action::RefreshMessages);
        self.fetch_messages(effect).await
    }
}
