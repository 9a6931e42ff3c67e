#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{
    CachedConversationRecord, ChannelId, ChatMessage, CipherSuite, DeliveryStatus, MessageId,
    UserId,
};
use shared::protocol::{
    ChannelInfo, CreateRoomParams, CreatedRoom, GroupMember, MessageRecord, NewMessageStatuses,
    PageParams, RoomUpdateParams,
};
use tokio::sync::Mutex;

use crate::api::MessagingApi;
use crate::cache::ConversationStore;
use crate::error::{CoreError, Result};
use crate::{ChatClient, GroupOracle, JsonWireCodec, Transport};

pub struct InMemoryStore {
    records: Mutex<HashMap<ChannelId, CachedConversationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(HashMap::new()),
        })
    }

    pub async fn seed(&self, channel_id: &ChannelId, record: CachedConversationRecord) {
        self.records.lock().await.insert(channel_id.clone(), record);
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get(&self, channel_id: &ChannelId) -> Result<Option<CachedConversationRecord>> {
        Ok(self.records.lock().await.get(channel_id).cloned())
    }

    async fn set(&self, channel_id: &ChannelId, record: &CachedConversationRecord) -> Result<()> {
        self.records
            .lock()
            .await
            .insert(channel_id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, channel_id: &ChannelId) -> Result<()> {
        self.records.lock().await.remove(channel_id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records.lock().await.clear();
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<ChannelId>> {
        Ok(self.records.lock().await.keys().cloned().collect())
    }
}

/// Scripted REST collaborator that records what the client asked for.
#[derive(Default)]
pub struct ScriptedApi {
    pub channels: Mutex<Vec<ChannelInfo>>,
    pub groups: Mutex<Vec<ChannelId>>,
    pub history: Mutex<Vec<MessageRecord>>,
    pub offline_statuses: Mutex<NewMessageStatuses>,
    pub created_room: Mutex<Option<CreatedRoom>>,
    pub topics: Mutex<HashMap<UserId, String>>,
    pub invites: Mutex<Vec<(ChannelId, Vec<UserId>)>>,
    pub status_changes: Mutex<Vec<(Vec<MessageId>, String, DeliveryStatus)>>,
    pub sync_calls: Mutex<Vec<i64>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MessagingApi for ScriptedApi {
    async fn channel_list(&self, _page: PageParams) -> Result<Vec<ChannelInfo>> {
        Ok(self.channels.lock().await.clone())
    }

    async fn group_list(&self, _page: PageParams) -> Result<Vec<ChannelId>> {
        Ok(self.groups.lock().await.clone())
    }

    async fn message_history(&self, _topic: &str, _page: PageParams) -> Result<Vec<MessageRecord>> {
        Ok(self.history.lock().await.clone())
    }

    async fn sync_new_messages(&self, since: i64) -> Result<NewMessageStatuses> {
        self.sync_calls.lock().await.push(since);
        Ok(self.offline_statuses.lock().await.clone())
    }

    async fn create_room(&self, _params: &CreateRoomParams) -> Result<CreatedRoom> {
        self.created_room
            .lock()
            .await
            .clone()
            .ok_or_else(|| CoreError::Request("no scripted room".into()))
    }

    async fn join_group(&self, group_id: &ChannelId) -> Result<CreatedRoom> {
        Ok(CreatedRoom {
            groupid: group_id.clone(),
            group_name: "joined".into(),
            avatar_url: None,
        })
    }

    async fn invite_members(&self, group_id: &ChannelId, members: &[UserId]) -> Result<()> {
        self.invites
            .lock()
            .await
            .push((group_id.clone(), members.to_vec()));
        Ok(())
    }

    async fn group_members(
        &self,
        _group_id: &ChannelId,
        _page: PageParams,
    ) -> Result<Vec<GroupMember>> {
        Ok(Vec::new())
    }

    async fn update_room(&self, _params: &RoomUpdateParams) -> Result<()> {
        Ok(())
    }

    async fn change_message_status(
        &self,
        message_ids: &[MessageId],
        topic: &str,
        status: DeliveryStatus,
    ) -> Result<()> {
        self.status_changes
            .lock()
            .await
            .push((message_ids.to_vec(), topic.to_owned(), status));
        Ok(())
    }

    async fn resolve_topic(&self, target: &UserId) -> Result<String> {
        self.topics
            .lock()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| CoreError::Request(format!("unknown user {target}")))
    }
}

/// Oracle fake: `enc:` prefix stands in for real ciphertext.
pub struct FakeOracle {
    pub enabled_groups: Mutex<HashSet<ChannelId>>,
    pub rejected_members: Mutex<HashSet<UserId>>,
    pub created_groups: Mutex<Vec<ChannelId>>,
    pub added_members: Mutex<Vec<(UserId, ChannelId)>>,
    pub group_events: Mutex<Vec<Vec<u8>>>,
    pub synced_groups: Mutex<Vec<Vec<ChannelId>>>,
}

impl FakeOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            enabled_groups: Mutex::new(HashSet::new()),
            rejected_members: Mutex::new(HashSet::new()),
            created_groups: Mutex::new(Vec::new()),
            added_members: Mutex::new(Vec::new()),
            group_events: Mutex::new(Vec::new()),
            synced_groups: Mutex::new(Vec::new()),
        })
    }

    pub async fn enable_group(&self, channel_id: &ChannelId) {
        self.enabled_groups.lock().await.insert(channel_id.clone());
    }

    pub async fn reject_member(&self, member: &UserId) {
        self.rejected_members.lock().await.insert(member.clone());
    }
}

#[async_trait]
impl GroupOracle for FakeOracle {
    async fn is_group_enabled(&self, channel_id: &ChannelId) -> Result<bool> {
        Ok(self.enabled_groups.lock().await.contains(channel_id))
    }

    async fn encrypt(&self, plaintext: &str, _channel_id: &ChannelId) -> Result<String> {
        Ok(format!("enc:{plaintext}"))
    }

    async fn decrypt(
        &self,
        ciphertext: &str,
        _sender: &UserId,
        _channel_id: &ChannelId,
    ) -> Result<String> {
        ciphertext
            .strip_prefix("enc:")
            .map(str::to_owned)
            .ok_or_else(|| CoreError::OracleUnavailable("not ciphertext".into()))
    }

    async fn can_add_member(&self, target: &UserId) -> Result<bool> {
        Ok(!self.rejected_members.lock().await.contains(target))
    }

    async fn create_group(&self, channel_id: &ChannelId) -> Result<()> {
        self.created_groups.lock().await.push(channel_id.clone());
        Ok(())
    }

    async fn add_member(&self, member: &UserId, channel_id: &ChannelId) -> Result<()> {
        self.added_members
            .lock()
            .await
            .push((member.clone(), channel_id.clone()));
        Ok(())
    }

    async fn handle_group_event(&self, payload: &[u8]) -> Result<()> {
        self.group_events.lock().await.push(payload.to_vec());
        Ok(())
    }

    async fn sync_group_state(&self, group_ids: &[ChannelId]) -> Result<()> {
        self.synced_groups.lock().await.push(group_ids.to_vec());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        self.sent.lock().await.push(bytes);
        Ok(())
    }
}

pub struct TestHarness {
    pub client: Arc<ChatClient>,
    pub api: Arc<ScriptedApi>,
    pub store: Arc<InMemoryStore>,
    pub oracle: Arc<FakeOracle>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness(user: &str) -> TestHarness {
    let api = ScriptedApi::new();
    let store = InMemoryStore::new();
    let oracle = FakeOracle::new();
    let transport = RecordingTransport::new();
    let client = ChatClient::new_with_collaborators(
        UserId::from(user),
        Arc::clone(&api) as Arc<dyn MessagingApi>,
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        Arc::clone(&oracle) as Arc<dyn GroupOracle>,
        Arc::new(JsonWireCodec),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    TestHarness {
        client,
        api,
        store,
        oracle,
        transport,
    }
}

pub fn message(id: &str, channel: &str, sender: &str, timestamp: i64) -> ChatMessage {
    ChatMessage {
        id: MessageId::from(id),
        channel_id: ChannelId::from(channel),
        sender: UserId::from(sender),
        text: format!("text of {id}"),
        cipher_suite: CipherSuite::None,
        timestamp,
        status: DeliveryStatus::Delivered,
        status_timestamp: timestamp,
    }
}

pub fn channel_item(id: &str) -> shared::domain::ChannelItem {
    shared::domain::ChannelItem {
        chat_id: ChannelId::from(id),
        chat_name: id.to_owned(),
        avatar_url: None,
        kind: if ChannelId::from(id).is_group() {
            shared::domain::ChannelKind::Group
        } else {
            shared::domain::ChannelKind::Direct
        },
        last_message: None,
        updated_at: 0,
        unread: 0,
        is_encrypted_group: false,
    }
}
