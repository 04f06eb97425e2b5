//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.
//!
//! - **ids**: snowflake id aliases for users, channels, messages and reports
//! - **pagination**: Relay cursors, page requests and connections

mod ids;
pub mod pagination;

pub use ids::*;
pub use pagination::{Connection, Cursor, Edge, Keyset, PageInfo, PageRequest, PaginationDirection};
