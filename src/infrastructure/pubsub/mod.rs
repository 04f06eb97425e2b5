//! Pub/Sub Module
//!
//! Implementations of the domain `PubSub` bus:
//!
//! ```text
//! MessageLogic --publish--> PubSub --stream--> MessageSubscription
//!                             |
//!              +--------------+--------------+
//!              |                             |
//!        RedisPubSub                   LocalPubSub
//!   (ConnectionManager +          (tokio broadcast per topic)
//!    per-subscriber conn)
//! ```

mod local_bus;
mod redis_bus;

pub use local_bus::LocalPubSub;
pub use redis_bus::RedisPubSub;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Open a Redis client and a connection manager with automatic reconnection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<(Client, ConnectionManager), redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client.clone()).await?;
    info!("Redis connection established");
    Ok((client, manager))
}
