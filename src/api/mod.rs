pub mod client;
pub mod routes;
pub mod types;

pub use client::{ApiError, ChatApi, HttpChatApi};
pub use routes::{ReceiptKind, RoleRoutes};
