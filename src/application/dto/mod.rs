//! Data Transfer Objects
//!
//! Inputs accepted by the chat logic. The transport layer deserializes its
//! requests into these; validation runs inside the logic.

mod channel;
mod message;
mod report;

pub use channel::{ChannelListArgs, CreateChannelInput};
pub use message::{AdminMessageListArgs, MessageListArgs, SendMessageInput};
pub use report::{AdminReportUpdateInput, CreateReportInput, ReportListArgs, UpdateReportInput};
