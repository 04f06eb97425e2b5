//! # Domain Entities
//!
//! Core chat records and the store traits that persist them.
//!
//! - **Channel**: a conversation, ACTIVE or INACTIVE, optionally bound to an
//!   external target (e.g. a matching post)
//! - **Participant**: a user's membership in a channel, with read cursor
//! - **Message**: TEXT, FILE or SYSTEM message, soft-deletable
//! - **Actor**: the identity performing an operation
//! - **ChatReport**: a user's report about a channel or message
//!
//! The logic layer is generic over stores whose associated entity types
//! implement [`ChannelLike`] / [`MessageLike`], so embedding products can
//! persist their own record shapes.

mod actor;
mod channel;
mod message;
mod participant;
mod report;

pub use actor::{Actor, UserRole};

pub use channel::{
    Channel, ChannelFilter, ChannelLike, ChannelPatch, ChannelQuery, ChannelSortKey, ChannelState,
    ChannelStore, ChannelWithParticipants, DirectPair, ListedChannel, NewChannel,
};

pub use message::{
    Message, MessageFilter, MessageKind, MessageLike, MessageOrder, MessageQuery, MessageSortKey,
    MessageStore, NewMessage,
};

pub use participant::Participant;

pub use report::{
    ChatReport, NewReport, ReportFilter, ReportPatch, ReportQuery, ReportSortKey, ReportState,
    ReportStore, ReportTargetKind,
};
