use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use shared::domain::{CachedConversationRecord, ChannelId, ChatMessage};
use tokio::sync::Mutex;

use crate::{error::Result, SessionContext};

/// Persistent cache seam, keyed by channel identifier. The cache is the
/// durable source of truth for every channel; all mutations go through
/// [`ConversationCache`] so they are write-through and serialized per
/// channel.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, channel_id: &ChannelId) -> Result<Option<CachedConversationRecord>>;
    async fn set(&self, channel_id: &ChannelId, record: &CachedConversationRecord) -> Result<()>;
    async fn delete(&self, channel_id: &ChannelId) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    async fn list_keys(&self) -> Result<Vec<ChannelId>>;
}

/// Reserved cache key holding the delta-sync watermark, the timestamp of
/// the last frame seen on the wire. Not a real channel.
const SYNC_WATERMARK_KEY: &str = "__sync_watermark__";

/// Unread delta for a message arriving on `channel_id`: zero for the active
/// channel, one for everything else. Pure function of the session context.
pub fn unread_delta(ctx: &SessionContext, channel_id: &ChannelId) -> u32 {
    if ctx.active_channel.as_ref() == Some(channel_id) {
        0
    } else {
        1
    }
}

/// Write-through façade over the conversation store. Read-modify-write
/// cycles for the same channel are serialized through a per-channel mutex;
/// two concurrent updates to one channel's record can never interleave.
pub struct ConversationCache {
    store: Arc<dyn ConversationStore>,
    locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ConversationCache {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, channel_id: &ChannelId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(channel_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub async fn get(&self, channel_id: &ChannelId) -> Result<Option<CachedConversationRecord>> {
        self.store.get(channel_id).await
    }

    /// Folds a newly-arrived message into the channel's cached record and
    /// writes it back before returning. An absent record is treated as a
    /// fresh one, so the very first message to an inactive channel yields
    /// unread = 1. The message list is append-only on this path; callers
    /// are responsible for idempotent identifiers.
    pub async fn apply_incoming(
        &self,
        ctx: &SessionContext,
        channel_id: &ChannelId,
        message: &ChatMessage,
    ) -> Result<(CachedConversationRecord, u32)> {
        let lock = self.lock_for(channel_id).await;
        let _guard = lock.lock().await;

        let mut record = self.store.get(channel_id).await?.unwrap_or_default();
        record.message_list.push(message.clone());
        if !message.text.is_empty() {
            record.last_message = Some(message.text.clone());
        }
        record.updated_at = message.timestamp;

        let delta = unread_delta(ctx, channel_id);
        record.unread += delta;

        self.store.set(channel_id, &record).await?;
        Ok((record, delta))
    }

    /// The only path that decreases an unread count. No-op when the record
    /// is absent or already at zero.
    pub async fn reset_unread(&self, channel_id: &ChannelId) -> Result<()> {
        let lock = self.lock_for(channel_id).await;
        let _guard = lock.lock().await;

        if let Some(mut record) = self.store.get(channel_id).await? {
            if record.unread != 0 {
                record.unread = 0;
                self.store.set(channel_id, &record).await?;
            }
        }
        Ok(())
    }

    /// Replaces the unread count with an externally-computed value (the
    /// offline delta-sync path). Returns the updated record, or `None`
    /// when the channel has no cached record to reconcile against.
    pub async fn overwrite_unread(
        &self,
        channel_id: &ChannelId,
        unread: u32,
    ) -> Result<Option<CachedConversationRecord>> {
        let lock = self.lock_for(channel_id).await;
        let _guard = lock.lock().await;

        match self.store.get(channel_id).await? {
            Some(mut record) => {
                record.unread = unread;
                self.store.set(channel_id, &record).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Advances the persisted delta-sync watermark; it never moves backwards.
    pub async fn record_watermark(&self, timestamp: i64) -> Result<()> {
        let key = ChannelId::from(SYNC_WATERMARK_KEY);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        let mut record = self.store.get(&key).await?.unwrap_or_default();
        if timestamp <= record.updated_at {
            return Ok(());
        }
        record.updated_at = timestamp;
        self.store.set(&key, &record).await
    }

    pub async fn watermark(&self) -> Result<Option<i64>> {
        Ok(self
            .store
            .get(&ChannelId::from(SYNC_WATERMARK_KEY))
            .await?
            .map(|record| record.updated_at))
    }
}
