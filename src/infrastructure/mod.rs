//! Infrastructure Layer
//!
//! Implementations of the domain seams:
//! - PostgreSQL stores and the block list
//! - Redis and in-process pub/sub buses
//! - Push notification hand-off
//! - An in-memory store for tests and single-process use
//! - Prometheus metrics

pub mod database;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod pubsub;
pub mod repositories;
