//! Role → endpoint table.
//!
//! Admin and visitor clients share one controller; everything that differs
//! between them on the wire is looked up here instead of branching on the
//! role throughout the session code.

use percent_encoding::utf8_percent_encode;

use crate::core::codec::URI_COMPONENT;
use crate::core::model::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivered,
    Seen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRoutes {
    pub role: Role,
    rest_prefix: &'static str,
    emit_prefix: &'static str,
}

impl RoleRoutes {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Admin => Self {
                role,
                rest_prefix: "/admin/chat",
                emit_prefix: "admin:chat",
            },
            Role::User => Self {
                role,
                rest_prefix: "/chat",
                emit_prefix: "chat",
            },
        }
    }

    pub fn threads(&self) -> String {
        format!("{}/threads", self.rest_prefix)
    }

    pub fn messages(&self, thread_id: &str) -> String {
        format!("{}/threads/{}/messages", self.rest_prefix, segment(thread_id))
    }

    pub fn message(&self, thread_id: &str, message_id: &str) -> String {
        format!("{}/{}", self.messages(thread_id), segment(message_id))
    }

    pub fn reaction(&self, thread_id: &str, message_id: &str) -> String {
        format!("{}/reaction", self.message(thread_id, message_id))
    }

    pub fn emit_send(&self) -> String {
        format!("{}:send", self.emit_prefix)
    }

    pub fn emit_receipt(&self, kind: ReceiptKind) -> String {
        match kind {
            ReceiptKind::Delivered => format!("{}:delivered", self.emit_prefix),
            ReceiptKind::Seen => format!("{}:seen", self.emit_prefix),
        }
    }
}

fn segment(id: &str) -> String {
    utf8_percent_encode(id, URI_COMPONENT).to_string()
}
