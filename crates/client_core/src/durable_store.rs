use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{CachedConversationRecord, ChannelId};
use storage::ConversationDb;
use tracing::info;

use crate::cache::ConversationStore;
use crate::error::{CoreError, Result};

/// Sqlite-backed [`ConversationStore`], the durable default for real
/// sessions.
pub struct DurableConversationStore {
    db: ConversationDb,
}

impl DurableConversationStore {
    pub async fn initialize(database_url: &str) -> Result<Arc<Self>> {
        let db = ConversationDb::new(database_url)
            .await
            .map_err(cache_error)?;
        db.health_check().await.map_err(cache_error)?;
        info!(database_url, "conversation store ready");
        Ok(Arc::new(Self { db }))
    }

    pub fn db(&self) -> &ConversationDb {
        &self.db
    }
}

fn cache_error(err: anyhow::Error) -> CoreError {
    CoreError::CacheUnavailable(format!("{err:#}"))
}

#[async_trait]
impl ConversationStore for DurableConversationStore {
    async fn get(&self, channel_id: &ChannelId) -> Result<Option<CachedConversationRecord>> {
        self.db.get_record(channel_id).await.map_err(cache_error)
    }

    async fn set(&self, channel_id: &ChannelId, record: &CachedConversationRecord) -> Result<()> {
        self.db
            .put_record(channel_id, record)
            .await
            .map_err(cache_error)
    }

    async fn delete(&self, channel_id: &ChannelId) -> Result<()> {
        self.db.delete_record(channel_id).await.map_err(cache_error)
    }

    async fn clear(&self) -> Result<()> {
        self.db.clear().await.map_err(cache_error)
    }

    async fn list_keys(&self) -> Result<Vec<ChannelId>> {
        self.db.list_channel_ids().await.map_err(cache_error)
    }
}
