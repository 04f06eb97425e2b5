//! # Business Chat
//!
//! Chat-channel and message core for the business chat feature of a
//! matching application:
//! - Channel lifecycle and participant membership
//! - Deduplicated direct channels per matching target, with reactivation
//! - Messages with soft delete, read cursors and unread counts
//! - Real-time delivery over pub/sub with block-list filtering
//! - Relay-style cursor pagination
//! - User reports about channels and messages, handled by admins
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities, store traits and collaborator contracts
//! - **Application Layer**: the chat logic, generic over the stores
//! - **Infrastructure Layer**: Postgres, Redis, in-memory and metrics
//!
//! Transport (GraphQL/REST), authentication and push delivery live in the
//! embedding service.
//!
//! ## Module Structure
//!
//! ```text
//! business_chat/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects and traits
//! +-- application/    Chat logic and inputs
//! +-- infrastructure/ Stores, buses, notifier, metrics
//! +-- shared/         Errors, snowflake ids, clock, validation
//! ```

// Configuration module
pub mod config;

// Domain layer
pub mod domain;

// Application layer
pub mod application;

// Infrastructure layer
pub mod infrastructure;

// Shared utilities
pub mod shared;

// Wiring of the chat core
pub mod startup;

// Telemetry and observability
pub mod telemetry;
