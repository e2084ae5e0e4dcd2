use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::routes::RoleRoutes;
use super::types::{
    ErrorBody, MessageBody, MessageEnvelope, MessagesResponse, ReactionBody, ReactionResponse, ThreadsResponse,
};
use crate::core::model::{Message, Role, Thread};

/// Errors that can occur talking to the chat REST API.
#[derive(Debug)]
pub enum ApiError {
    /// HTTP 401. The credential is no longer valid. Never retried.
    Unauthorized,
    /// Network-level failure (timeout, DNS, connection refused).
    Network(String),
    /// Any other non-2xx response, with the server's message when it sent one.
    Server { status: u16, message: String },
    /// The response body did not have the expected shape.
    Parse(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Your session has expired. Please sign in again."),
            ApiError::Network(msg) => write!(f, "Network error: {msg}"),
            ApiError::Server { message, .. } => write!(f, "{message}"),
            ApiError::Parse(msg) => write!(f, "Unexpected response from server: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// The REST half of the chat backend.
///
/// Message lists come back newest-first, exactly as the server sends them.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Replaces the bearer credential used for subsequent calls.
    fn set_bearer(&self, token: Option<String>);

    async fn list_threads(&self) -> Result<Vec<Thread>, ApiError>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ApiError>;

    /// `body` is the wire text, reply prefix included.
    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message, ApiError>;

    async fn edit_message(&self, thread_id: &str, message_id: &str, body: &str) -> Result<Message, ApiError>;

    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ApiError>;

    /// Sets (or, with an empty `emoji`, clears) the caller's reaction.
    async fn react_message(&self, thread_id: &str, message_id: &str, emoji: &str) -> Result<Option<String>, ApiError>;

    /// Clears the conversation from the caller's own view.
    async fn clear_thread(&self, thread_id: &str) -> Result<(), ApiError>;
}

/// `ChatApi` over HTTP with reqwest.
pub struct HttpChatApi {
    base_url: String,
    routes: RoleRoutes,
    client: reqwest::Client,
    bearer: RwLock<Option<String>>,
}

impl HttpChatApi {
    /// Creates a client for `role`.
    ///
    /// # Arguments
    /// * `base_url` - API root, without a trailing slash
    /// * `role` - selects the admin or visitor endpoint family
    /// * `timeout` - per-request timeout
    pub fn new(base_url: impl Into<String>, role: Role, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes: RoleRoutes::for_role(role),
            client,
            bearer: RwLock::new(None),
        })
    }

    pub fn with_bearer(self, token: Option<String>) -> Self {
        self.set_bearer(token);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .bearer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    /// Sends the request and maps transport failures and non-2xx statuses.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        debug!("Chat API response status: {}", status);

        if status == StatusCode::UNAUTHORIZED {
            warn!("Chat API rejected credential (401)");
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let code = status.as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(ErrorBody::text)
                .unwrap_or_else(|| format!("Request failed (HTTP {code})"));
            warn!("Chat API error: {} - {}", code, message);
            return Err(ApiError::Server { status: code, message });
        }
        Ok(response)
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        let text = response.text().await.map_err(|e| ApiError::Network(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    async fn list_threads(&self) -> Result<Vec<Thread>, ApiError> {
        let url = self.url(&self.routes.threads());
        let response: ThreadsResponse = self.execute_json(self.client.get(url)).await?;
        info!("Loaded {} threads", response.threads.len());
        Ok(response.threads.into_iter().map(Thread::from).collect())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, ApiError> {
        let url = self.url(&self.routes.messages(thread_id));
        let response: MessagesResponse = self.execute_json(self.client.get(url)).await?;
        debug!("Loaded {} messages for thread {}", response.messages.len(), thread_id);
        Ok(response.messages.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, thread_id: &str, body: &str) -> Result<Message, ApiError> {
        let url = self.url(&self.routes.messages(thread_id));
        let request = self.client.post(url).json(&MessageBody { message: body });
        let envelope: MessageEnvelope = self.execute_json(request).await?;
        Ok(envelope.into_message())
    }

    async fn edit_message(&self, thread_id: &str, message_id: &str, body: &str) -> Result<Message, ApiError> {
        let url = self.url(&self.routes.message(thread_id, message_id));
        let request = self.client.put(url).json(&MessageBody { message: body });
        let envelope: MessageEnvelope = self.execute_json(request).await?;
        Ok(envelope.into_message())
    }

    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ApiError> {
        let url = self.url(&self.routes.message(thread_id, message_id));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    async fn react_message(&self, thread_id: &str, message_id: &str, emoji: &str) -> Result<Option<String>, ApiError> {
        let url = self.url(&self.routes.reaction(thread_id, message_id));
        let request = self.client.put(url).json(&ReactionBody { emoji });
        let response: ReactionResponse = self.execute_json(request).await?;
        Ok(response.reaction.filter(|r| !r.is_empty()))
    }

    async fn clear_thread(&self, thread_id: &str) -> Result<(), ApiError> {
        let url = self.url(&self.routes.messages(thread_id));
        self.execute(self.client.delete(url)).await?;
        info!("Cleared thread {} from own view", thread_id);
        Ok(())
    }
}
