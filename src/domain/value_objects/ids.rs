/// Snowflake id of a user, owned by the identity domain.
pub type UserId = i64;

/// Snowflake id of a chat channel.
pub type ChannelId = i64;

/// Snowflake id of a chat message.
pub type MessageId = i64;

/// Snowflake id of a chat report.
pub type ReportId = i64;
