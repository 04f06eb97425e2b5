//! Repository Implementations
//!
//! PostgreSQL implementations of the domain store traits.
//!
//! A single [`PgChatStore`] implements `ChannelStore`, `MessageStore` and
//! `ReportStore` so that channel and message writes can share one
//! transaction. Table names are derived from the configured prefix.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{ChatTables, PgBlockListRepository, PgChatStore};
//!
//! fn setup_repositories(pool: PgPool) {
//!     let store = PgChatStore::new(pool.clone(), ChatTables::new("b_chat"));
//!     let blocks = PgBlockListRepository::new(pool);
//! }
//! ```

mod block_list_repository;
mod channel_repository;
mod chat_store;
mod message_repository;
mod report_repository;

pub use block_list_repository::PgBlockListRepository;
pub use chat_store::{ChatTables, PgChatStore};
