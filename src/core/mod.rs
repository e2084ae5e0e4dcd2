//! # Core Chat Logic
//!
//! Everything a chat client decides, with no I/O of its own.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • ChatState            │
//!                    │  • Action (events)      │
//!                    │  • update() (reducer)   │
//!                    │                         │
//!                    │  No I/O. Pure.          │
//!                    └───────────┬─────────────┘
//!                                │ Effect
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │    REST    │      │   Socket   │      │  Observers │
//!     │ (api::*)   │      │ (socket::*)│      │  (watch)   │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! `sync::ChatSession` owns a `ChatState`, feeds it actions and runs the
//! effects `update()` hands back.
//!
//! ## Modules
//!
//! - [`model`]: Message, Thread and friends
//! - [`codec`]: the `[reply:id:preview]` body prefix
//! - [`receipts`]: delivered/seen reducer
//! - [`store`]: immutable thread list and message log updates
//! - [`presence`]: who is online
//! - [`viewport`]: stick-to-bottom scrolling
//! - [`state`]: `ChatState`, all client state in one place
//! - [`action`]: the `Action` enum and `update()`
//! - [`identity`]: device and guest ids
//! - [`config`]: `~/.chatsync/config.toml`

pub mod action;
pub mod codec;
pub mod config;
pub mod identity;
pub mod model;
pub mod presence;
pub mod receipts;
pub mod state;
pub mod store;
pub mod viewport;
