//! Startup
//!
//! Wiring of the chat logic. [`ChatCore`] assembles the logic over any
//! store; [`ChatRuntime::build`] connects Postgres and Redis from
//! [`Settings`] and assembles the production core.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::application::services::{
    ChannelLoader, ChannelLogic, MatchChatFlow, MessageLogic, ReportLogic,
};
use crate::config::{ChatSettings, PubSubBackend, Settings};
use crate::domain::{BlockListProvider, ChannelStore, MessageStore, Notifier, PubSub, ReportStore};
use crate::infrastructure::notifier::{LogNotifier, RedisNotifier};
use crate::infrastructure::pubsub::{create_redis_client, LocalPubSub, RedisPubSub};
use crate::infrastructure::repositories::{ChatTables, PgBlockListRepository, PgChatStore};
use crate::infrastructure::database;
use crate::shared::snowflake::SnowflakeGenerator;

/// The chat logic assembled over one store.
pub struct ChatCore<S> {
    pub store: Arc<S>,
    pub channels: ChannelLogic<S>,
    pub messages: MessageLogic<S>,
    pub matching: MatchChatFlow<S>,
    pub reports: ReportLogic<S>,
    settings: Arc<ChatSettings>,
}

impl<S> Clone for ChatCore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            channels: self.channels.clone(),
            messages: self.messages.clone(),
            matching: self.matching.clone(),
            reports: self.reports.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S> ChatCore<S>
where
    S: ChannelStore + MessageStore + ReportStore,
{
    pub fn new(
        store: Arc<S>,
        block_list: Arc<dyn BlockListProvider>,
        bus: Arc<dyn PubSub>,
        notifier: Arc<dyn Notifier>,
        ids: Arc<SnowflakeGenerator>,
        settings: ChatSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let channels = ChannelLogic::new(store.clone(), ids.clone(), &settings);
        let reports = ReportLogic::new(store.clone(), ids.clone(), &settings);
        let messages = MessageLogic::new(
            store.clone(),
            channels.clone(),
            block_list,
            bus,
            notifier.clone(),
            ids,
            settings.clone(),
        );
        let matching = MatchChatFlow::new(store.clone(), channels.clone(), messages.clone(), notifier);

        Self {
            store,
            channels,
            messages,
            matching,
            reports,
            settings,
        }
    }

    /// A fresh loader for one request.
    pub fn loader(&self) -> ChannelLoader<S> {
        ChannelLoader::new(self.store.clone(), self.messages.clone(), &self.settings)
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }
}

/// Production runtime: Postgres stores plus the configured bus.
pub struct ChatRuntime {
    pub pool: PgPool,
    pub core: ChatCore<PgChatStore>,
}

impl ChatRuntime {
    /// Connect to the backing services and assemble the chat core.
    pub async fn build(settings: Settings) -> Result<Self> {
        settings.chat.validate()?;

        let pool = database::create_pool(&settings.database).await?;
        info!("Database connection pool created");
        if settings.database.run_migrations {
            database::run_migrations(&pool).await?;
            info!("Database migrations applied");
        }

        let (bus, notifier): (Arc<dyn PubSub>, Arc<dyn Notifier>) = match settings.chat.pubsub_backend {
            PubSubBackend::Redis => {
                let (client, manager) = create_redis_client(&settings.redis).await?;
                (
                    Arc::new(RedisPubSub::new(client, manager.clone())),
                    Arc::new(RedisNotifier::new(manager, settings.chat.notification_topic.clone())),
                )
            }
            PubSubBackend::Local => {
                info!("Using in-process pub/sub, notifications are only logged");
                (
                    Arc::new(LocalPubSub::new(settings.chat.local_bus_capacity)),
                    Arc::new(LogNotifier),
                )
            }
        };

        let ids = Arc::new(SnowflakeGenerator::new(
            settings.snowflake.machine_id as u64,
            settings.snowflake.epoch,
        ));
        let store = Arc::new(PgChatStore::new(
            pool.clone(),
            ChatTables::new(&settings.chat.table_prefix),
        ));
        let block_list = Arc::new(PgBlockListRepository::new(pool.clone()));

        let core = ChatCore::new(store, block_list, bus, notifier, ids, settings.chat);
        info!(environment = %settings.environment, "Chat core ready");
        Ok(Self { pool, core })
    }
}
