//! # Domain Services
//!
//! Contracts for the collaborators the chat logic depends on. Implementations
//! live in the infrastructure layer.
//!
//! - **UnitOfWork**: transaction boundary of the stores
//! - **BlockListProvider**: who a user has blocked
//! - **Notifier**: push notification hand-off
//! - **PubSub**: real-time broadcast bus

mod block_list;
mod notifier;
mod pubsub;
mod unit_of_work;

pub use block_list::BlockListProvider;
pub use notifier::{Notification, NotificationKind, Notifier};
pub use pubsub::{PayloadStream, PubSub};
pub use unit_of_work::UnitOfWork;

#[cfg(test)]
pub use block_list::MockBlockListProvider;
#[cfg(test)]
pub use notifier::MockNotifier;
