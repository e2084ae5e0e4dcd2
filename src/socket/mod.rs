//! # Socket Connection
//!
//! The duplex channel is a black box behind two traits:
//!
//! - [`Connector`] opens a channel for an [`Identity`], returning the emit
//!   half and a receiver of inbound frames.
//! - [`Transport`] emits and awaits the server's acknowledgement as a typed
//!   result instead of an `ack.ok` callback.
//!
//! [`Connection`] owns at most one live channel, keyed by the identity key.
//! Changing identity goes through [`Connection::reconnect_as`], which always
//! tears down the old channel first so stale credentials are never reused.

pub mod events;

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::identity::Identity;
pub use events::{InboundEvent, ReceiptEmit, SocketEvent};

/// Successful acknowledgement payload.
pub type Ack = Value;

#[derive(Debug, Clone, PartialEq)]
pub enum SocketError {
    /// No channel is open.
    NotConnected,
    /// The channel closed before the server acknowledged.
    Closed,
    /// The server acknowledged with `ok: false`.
    Rejected(String),
    /// Connect or send failure inside the transport.
    Transport(String),
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::NotConnected => write!(f, "Not connected"),
            SocketError::Closed => write!(f, "Connection closed"),
            SocketError::Rejected(msg) => write!(f, "{}", msg),
            SocketError::Transport(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl std::error::Error for SocketError {}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `event` and resolves with the server's acknowledgement.
    async fn emit(&self, event: &str, payload: Value) -> Result<Ack, SocketError>;

    async fn close(&self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, identity: &Identity)
    -> Result<(Arc<dyn Transport>, mpsc::Receiver<SocketEvent>), SocketError>;
}

/// Interprets the `{ ok, error }` acknowledgement convention.
///
/// Payloads without an `ok` field are treated as success.
pub fn ack_result(ack: Value) -> Result<Ack, SocketError> {
    match ack.get("ok").and_then(Value::as_bool) {
        Some(false) => {
            let message = ack
                .get("error")
                .or_else(|| ack.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("Request rejected")
                .to_string();
            Err(SocketError::Rejected(message))
        }
        _ => Ok(ack),
    }
}

struct ActiveSocket {
    key: String,
    transport: Arc<dyn Transport>,
}

/// The process-wide connection resource, owned explicitly.
pub struct Connection {
    connector: Arc<dyn Connector>,
    active: Mutex<Option<ActiveSocket>>,
}

impl Connection {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveSocket>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn identity_key(&self) -> Option<String> {
        self.lock().as_ref().map(|a| a.key.clone())
    }

    /// Opens a channel for `identity` unless one is already open for the same key.
    ///
    /// Returns the inbound receiver when a new channel was opened.
    pub async fn connect(&self, identity: &Identity) -> Result<Option<mpsc::Receiver<SocketEvent>>, SocketError> {
        if self.identity_key().as_deref() == Some(identity.key().as_str()) {
            debug!("Socket already open for {}", identity.key());
            return Ok(None);
        }
        self.reconnect_as(identity).await.map(Some)
    }

    /// Tears down any open channel and opens a fresh one for `identity`.
    pub async fn reconnect_as(&self, identity: &Identity) -> Result<mpsc::Receiver<SocketEvent>, SocketError> {
        self.disconnect().await;
        let key = identity.key();
        info!("Opening socket for {}", key);
        let (transport, inbound) = self.connector.connect(identity).await.inspect_err(|e| {
            warn!("Socket connect failed: {}", e);
        })?;
        *self.lock() = Some(ActiveSocket { key, transport });
        Ok(inbound)
    }

    pub async fn disconnect(&self) {
        let previous = self.lock().take();
        if let Some(active) = previous {
            info!("Closing socket for {}", active.key);
            active.transport.close().await;
        }
    }

    /// Emits on the open channel and maps the acknowledgement.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<Ack, SocketError> {
        let transport = self
            .lock()
            .as_ref()
            .map(|a| Arc::clone(&a.transport))
            .ok_or(SocketError::NotConnected)?;
        debug!("Socket emit: {}", event);
        transport.emit(event, payload).await.and_then(ack_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::IdentityFile;
    use crate::core::model::Role;
    use crate::test_support::MockConnector;
    use serde_json::json;

    fn identity(user: Option<&str>) -> Identity {
        let file = IdentityFile {
            device_id: "dev".into(),
            guest_id: "guest".into(),
        };
        Identity::resolve(Role::User, user.map(String::from), None, &file)
    }

    #[test]
    fn test_ack_result_convention() {
        assert!(ack_result(json!({"ok": true, "message": {}})).is_ok());
        assert!(ack_result(Value::Null).is_ok());
        assert_eq!(
            ack_result(json!({"ok": false, "error": "Too long"})),
            Err(SocketError::Rejected("Too long".into()))
        );
        assert_eq!(
            ack_result(json!({"ok": false})),
            Err(SocketError::Rejected("Request rejected".into()))
        );
    }

    #[tokio::test]
    async fn test_connect_same_identity_is_noop() {
        let connector = Arc::new(MockConnector::new());
        let conn = Connection::new(connector.clone());
        assert!(conn.connect(&identity(None)).await.unwrap().is_some());
        assert!(conn.connect(&identity(None)).await.unwrap().is_none());
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_identity_change_recreates_socket() {
        let connector = Arc::new(MockConnector::new());
        let conn = Connection::new(connector.clone());
        conn.connect(&identity(None)).await.unwrap();
        let guest_transport = connector.last_transport().unwrap();

        conn.connect(&identity(Some("u1"))).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
        assert!(guest_transport.is_closed());
        assert_eq!(conn.identity_key().as_deref(), Some("u1:dev"));
    }

    #[tokio::test]
    async fn test_reconnect_as_always_recreates() {
        let connector = Arc::new(MockConnector::new());
        let conn = Connection::new(connector.clone());
        conn.connect(&identity(Some("u1"))).await.unwrap();
        conn.reconnect_as(&identity(Some("u1"))).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_emit_without_connection() {
        let conn = Connection::new(Arc::new(MockConnector::new()));
        assert_eq!(
            conn.emit("chat:seen", json!({})).await,
            Err(SocketError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_emit_maps_rejection() {
        let connector = Arc::new(MockConnector::new());
        let conn = Connection::new(connector.clone());
        conn.connect(&identity(None)).await.unwrap();
        connector
            .last_transport()
            .unwrap()
            .push_ack(json!({"ok": false, "error": "Slow down"}));
        assert_eq!(
            conn.emit("chat:send", json!({"message": "hi"})).await,
            Err(SocketError::Rejected("Slow down".into()))
        );
    }
}
