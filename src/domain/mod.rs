//! # Domain Layer
//!
//! Chat records, store contracts and collaborator traits. Independent of
//! Postgres, Redis and any transport.
//!
//! - **entities**: channels, participants, messages, actors and their stores
//! - **value_objects**: ids and cursor pagination
//! - **services**: unit of work, block list, notifier and pub/sub contracts

pub mod entities;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use services::*;
pub use value_objects::*;
