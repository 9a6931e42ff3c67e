use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{ChannelId, ChannelItem, ChatMessage, MessageId, UserId};
use tokio::sync::{broadcast, Mutex};

pub mod api;
pub mod cache;
mod channels;
pub mod codec;
mod dispatch;
pub mod durable_store;
pub mod error;
mod messages;
pub mod status;

pub use cache::{ConversationCache, ConversationStore};
pub use codec::{JsonWireCodec, WireCodec};
pub use durable_store::DurableConversationStore;
pub use error::{CoreError, Result};
pub use messages::SendOptions;

/// Outbound sink of the wire transport. Connection lifecycle, reconnection,
/// and framing are owned by the transport; the engine only hands it encoded
/// bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, bytes: Vec<u8>) -> Result<()>;
}

pub struct MissingTransport;

#[async_trait]
impl Transport for MissingTransport {
    async fn send(&self, _bytes: Vec<u8>) -> Result<()> {
        Err(CoreError::Transport("wire transport is unavailable".into()))
    }
}

/// The end-to-end encryption and group-membership engine, consumed as an
/// opaque oracle.
#[async_trait]
pub trait GroupOracle: Send + Sync {
    async fn is_group_enabled(&self, channel_id: &ChannelId) -> Result<bool>;
    async fn encrypt(&self, plaintext: &str, channel_id: &ChannelId) -> Result<String>;
    async fn decrypt(
        &self,
        ciphertext: &str,
        sender: &UserId,
        channel_id: &ChannelId,
    ) -> Result<String>;
    async fn can_add_member(&self, target: &UserId) -> Result<bool>;
    async fn create_group(&self, channel_id: &ChannelId) -> Result<()>;
    async fn add_member(&self, member: &UserId, channel_id: &ChannelId) -> Result<()>;
    async fn handle_group_event(&self, payload: &[u8]) -> Result<()>;
    async fn sync_group_state(&self, group_ids: &[ChannelId]) -> Result<()>;
}

/// Default oracle: every call fails with `OracleUnavailable`, so sends that
/// request encryption fail closed instead of leaking plaintext.
pub struct MissingGroupOracle;

impl MissingGroupOracle {
    fn unavailable<T>(channel: &str) -> Result<T> {
        Err(CoreError::OracleUnavailable(format!(
            "no group crypto backend available for {channel}"
        )))
    }
}

#[async_trait]
impl GroupOracle for MissingGroupOracle {
    async fn is_group_enabled(&self, channel_id: &ChannelId) -> Result<bool> {
        Self::unavailable(channel_id.as_str())
    }

    async fn encrypt(&self, _plaintext: &str, channel_id: &ChannelId) -> Result<String> {
        Self::unavailable(channel_id.as_str())
    }

    async fn decrypt(
        &self,
        _ciphertext: &str,
        _sender: &UserId,
        channel_id: &ChannelId,
    ) -> Result<String> {
        Self::unavailable(channel_id.as_str())
    }

    async fn can_add_member(&self, target: &UserId) -> Result<bool> {
        Self::unavailable(target.as_str())
    }

    async fn create_group(&self, channel_id: &ChannelId) -> Result<()> {
        Self::unavailable(channel_id.as_str())
    }

    async fn add_member(&self, _member: &UserId, channel_id: &ChannelId) -> Result<()> {
        Self::unavailable(channel_id.as_str())
    }

    async fn handle_group_event(&self, _payload: &[u8]) -> Result<()> {
        Self::unavailable("group event")
    }

    async fn sync_group_state(&self, _group_ids: &[ChannelId]) -> Result<()> {
        Self::unavailable("group state sync")
    }
}

/// Default cache: every call fails with `CacheUnavailable`; operations that
/// need durable state surface the failure instead of silently dropping it.
pub struct MissingConversationStore;

impl MissingConversationStore {
    fn unavailable<T>() -> Result<T> {
        Err(CoreError::CacheUnavailable(
            "conversation store is not initialized".into(),
        ))
    }
}

#[async_trait]
impl ConversationStore for MissingConversationStore {
    async fn get(
        &self,
        _channel_id: &ChannelId,
    ) -> Result<Option<shared::domain::CachedConversationRecord>> {
        Self::unavailable()
    }

    async fn set(
        &self,
        _channel_id: &ChannelId,
        _record: &shared::domain::CachedConversationRecord,
    ) -> Result<()> {
        Self::unavailable()
    }

    async fn delete(&self, _channel_id: &ChannelId) -> Result<()> {
        Self::unavailable()
    }

    async fn clear(&self) -> Result<()> {
        Self::unavailable()
    }

    async fn list_keys(&self) -> Result<Vec<ChannelId>> {
        Self::unavailable()
    }
}

/// Notifications raised towards the host application after a state change,
/// so it can re-render without polling.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ChannelListUpdated,
    ChannelUpdated { channel_id: ChannelId },
    ActiveChannelChanged { channel_id: Option<ChannelId> },
    MessageListUpdated { channel_id: ChannelId },
    MessageSent { message_id: MessageId },
    MessageDelivered { message_id: MessageId },
}

impl ClientEvent {
    /// The host-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::ChannelListUpdated => "channel.getList",
            ClientEvent::ChannelUpdated { .. } => "channel.updated",
            ClientEvent::ActiveChannelChanged { .. } => "channel.activeChange",
            ClientEvent::MessageListUpdated { .. } => "message.getList",
            ClientEvent::MessageSent { .. } => "message.send",
            ClientEvent::MessageDelivered { .. } => "message.delivered",
        }
    }
}

/// Snapshot of the session threaded into every reconciliation call, so the
/// active-channel-dependent branches are pure functions of
/// `(context, event)` rather than hidden process state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: UserId,
    pub active_channel: Option<ChannelId>,
}

pub(crate) struct ClientState {
    pub(crate) active_channel: Option<ChannelItem>,
    pub(crate) channel_list: Option<Vec<ChannelItem>>,
    /// In-memory list for the active channel only; every other channel's
    /// state lives solely in the cache.
    pub(crate) message_list: Option<Vec<ChatMessage>>,
    /// Arrival watermark for the offline delta-sync call, unix millis of
    /// the last received frame.
    pub(crate) last_frame_at: Option<i64>,
}

/// The conversation-state engine: reconciles live wire frames, paginated
/// REST fetches, and the persistent cache into one consistent view of the
/// channel directory and the active channel's message list.
pub struct ChatClient {
    pub(crate) api: Arc<dyn api::MessagingApi>,
    pub(crate) cache: ConversationCache,
    pub(crate) oracle: Arc<dyn GroupOracle>,
    pub(crate) codec: Arc<dyn WireCodec>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) user_id: UserId,
    pub(crate) inner: Mutex<ClientState>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(
        user_id: UserId,
        api: Arc<dyn api::MessagingApi>,
        store: Arc<dyn ConversationStore>,
    ) -> Arc<Self> {
        Self::new_with_collaborators(
            user_id,
            api,
            store,
            Arc::new(MissingGroupOracle),
            Arc::new(JsonWireCodec),
            Arc::new(MissingTransport),
        )
    }

    pub fn new_with_collaborators(
        user_id: UserId,
        api: Arc<dyn api::MessagingApi>,
        store: Arc<dyn ConversationStore>,
        oracle: Arc<dyn GroupOracle>,
        codec: Arc<dyn WireCodec>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            api,
            cache: ConversationCache::new(store),
            oracle,
            codec,
            transport,
            user_id,
            inner: Mutex::new(ClientState {
                active_channel: None,
                channel_list: None,
                message_list: None,
                last_frame_at: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub async fn session_context(&self) -> SessionContext {
        let guard = self.inner.lock().await;
        SessionContext {
            user_id: self.user_id.clone(),
            active_channel: guard
                .active_channel
                .as_ref()
                .map(|channel| channel.chat_id.clone()),
        }
    }

    pub async fn active_channel(&self) -> Option<ChannelItem> {
        self.inner.lock().await.active_channel.clone()
    }

    pub async fn channel_list(&self) -> Option<Vec<ChannelItem>> {
        self.inner.lock().await.channel_list.clone()
    }

    pub async fn message_list(&self) -> Option<Vec<ChatMessage>> {
        self.inner.lock().await.message_list.clone()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod status_tests;

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod cache_tests;

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod dispatch_tests;

#[cfg(test)]
#[path = "tests/message_tests.rs"]
mod message_tests;

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod channel_tests;

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod api_tests;
