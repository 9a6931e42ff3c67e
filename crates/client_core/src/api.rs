use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::domain::{ChannelId, DeliveryStatus, MessageId, UserId};
use shared::protocol::{
    ChannelInfo, CreateRoomParams, CreatedRoom, GroupMember, MessageRecord, NewMessageStatuses,
    PageParams, RoomUpdateParams, ServiceResponse,
};

use crate::error::{CoreError, Result};
use crate::now_ms;

/// Signs the canonical content string attached to every REST request. The
/// service verifies the signature against the user's registered public key.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    fn user_id(&self) -> &UserId;
    async fn sign(&self, content: &str) -> Result<String>;
}

/// Ed25519 request signer holding the session signing key in memory.
pub struct Ed25519Signer {
    user_id: UserId,
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(user_id: UserId, key: SigningKey) -> Self {
        Self { user_id, key }
    }

    pub fn generate(user_id: UserId) -> Self {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { user_id, key }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_bytes())
    }
}

#[async_trait]
impl RequestSigner for Ed25519Signer {
    fn user_id(&self) -> &UserId {
        &self.user_id
    }

    async fn sign(&self, content: &str) -> Result<String> {
        Ok(hex::encode(self.key.sign(content.as_bytes()).to_bytes()))
    }
}

/// The REST surface of the messaging service, one method per endpoint the
/// engine calls. Implementations return the envelope's `data` payload and
/// surface nonzero service codes as [`CoreError::Request`].
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn channel_list(&self, page: PageParams) -> Result<Vec<ChannelInfo>>;
    async fn group_list(&self, page: PageParams) -> Result<Vec<ChannelId>>;
    async fn message_history(&self, topic: &str, page: PageParams) -> Result<Vec<MessageRecord>>;
    /// Per-channel statuses of messages that arrived after `since`
    /// (unix millis), for unread reconciliation after an offline gap.
    async fn sync_new_messages(&self, since: i64) -> Result<NewMessageStatuses>;
    async fn create_room(&self, params: &CreateRoomParams) -> Result<CreatedRoom>;
    async fn join_group(&self, group_id: &ChannelId) -> Result<CreatedRoom>;
    async fn invite_members(&self, group_id: &ChannelId, members: &[UserId]) -> Result<()>;
    async fn group_members(&self, group_id: &ChannelId, page: PageParams)
        -> Result<Vec<GroupMember>>;
    async fn update_room(&self, params: &RoomUpdateParams) -> Result<()>;
    async fn change_message_status(
        &self,
        message_ids: &[MessageId],
        topic: &str,
        status: DeliveryStatus,
    ) -> Result<()>;
    /// Resolves the destination topic for a direct message to `target`.
    async fn resolve_topic(&self, target: &UserId) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    result: Vec<T>,
}

/// Signature header fields plus the endpoint's own body, serialized flat.
#[derive(Debug, Serialize)]
struct SignedBody<'a, T: Serialize> {
    userid: &'a str,
    web3mq_signature: String,
    timestamp: i64,
    #[serde(flatten)]
    params: T,
}

type QueryPairs = Vec<(&'static str, String)>;

/// reqwest-backed implementation of [`MessagingApi`].
pub struct HttpMessagingApi {
    http: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl HttpMessagingApi {
    pub fn new(base_url: impl Into<String>, signer: Arc<dyn RequestSigner>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            signer,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Canonical signature content: userid, then the request's semantic
    /// fields in endpoint order, then the timestamp.
    async fn sign_content(&self, semantic: &[&str], timestamp: i64) -> Result<String> {
        let mut content = String::from(self.signer.user_id().as_str());
        for field in semantic {
            content.push_str(field);
        }
        content.push_str(&timestamp.to_string());
        self.signer.sign(&content).await
    }

    async fn signed_query(
        &self,
        semantic: &[&str],
        timestamp: i64,
        extra: QueryPairs,
    ) -> Result<QueryPairs> {
        let signature = self.sign_content(semantic, timestamp).await?;
        let mut pairs = vec![
            ("userid", self.signer.user_id().as_str().to_owned()),
            ("web3mq_signature", signature),
            ("timestamp", timestamp.to_string()),
        ];
        pairs.extend(extra);
        Ok(pairs)
    }

    async fn signed_body<T: Serialize>(
        &self,
        semantic: &[&str],
        timestamp: i64,
        params: T,
    ) -> Result<SignedBody<'_, T>> {
        let web3mq_signature = self.sign_content(semantic, timestamp).await?;
        Ok(SignedBody {
            userid: self.signer.user_id().as_str(),
            web3mq_signature,
            timestamp,
            params,
        })
    }

    fn page_pairs(page: PageParams) -> QueryPairs {
        vec![("page", page.page.to_string()), ("size", page.size.to_string())]
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &QueryPairs) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Self::unwrap_envelope(response.json::<ServiceResponse<T>>().await?)
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Self::unwrap_envelope(response.json::<ServiceResponse<T>>().await?)
    }

    fn unwrap_envelope<T>(envelope: ServiceResponse<T>) -> Result<T> {
        if envelope.code != 0 {
            return Err(CoreError::Request(format!(
                "service returned code {}: {}",
                envelope.code, envelope.msg
            )));
        }
        Ok(envelope.data)
    }
}

#[derive(Debug, Serialize)]
struct GroupIdParams<'a> {
    groupid: &'a str,
}

#[derive(Debug, Serialize)]
struct SyncParams {
    sync_timestamp: i64,
}

#[derive(Debug, Serialize)]
struct InviteParams<'a> {
    groupid: &'a str,
    members: &'a [UserId],
}

#[derive(Debug, Serialize)]
struct ChangeStatusParams<'a> {
    messages: &'a [MessageId],
    topic: &'a str,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct ResolvedTopic {
    topic: String,
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn channel_list(&self, page: PageParams) -> Result<Vec<ChannelInfo>> {
        let query = self
            .signed_query(&[], now_ms(), Self::page_pairs(page))
            .await?;
        let data: ListResult<ChannelInfo> = self.get("/api/chats/", &query).await?;
        Ok(data.result)
    }

    async fn group_list(&self, page: PageParams) -> Result<Vec<ChannelId>> {
        let query = self
            .signed_query(&[], now_ms(), Self::page_pairs(page))
            .await?;
        let data: ListResult<CreatedRoom> = self.get("/api/groups/", &query).await?;
        Ok(data.result.into_iter().map(|room| room.groupid).collect())
    }

    async fn message_history(&self, topic: &str, page: PageParams) -> Result<Vec<MessageRecord>> {
        let mut extra = vec![("topic", topic.to_owned())];
        extra.extend(Self::page_pairs(page));
        let query = self.signed_query(&[topic], now_ms(), extra).await?;
        let data: ListResult<MessageRecord> = self.get("/api/messages/history/", &query).await?;
        Ok(data.result)
    }

    async fn sync_new_messages(&self, since: i64) -> Result<NewMessageStatuses> {
        let since_tag = since.to_string();
        let body = self
            .signed_body(
                &[&since_tag],
                now_ms(),
                SyncParams {
                    sync_timestamp: since,
                },
            )
            .await?;
        self.post("/api/messages/sync/", &body).await
    }

    async fn create_room(&self, params: &CreateRoomParams) -> Result<CreatedRoom> {
        let body = self.signed_body(&[], now_ms(), params).await?;
        self.post("/api/groups/", &body).await
    }

    async fn join_group(&self, group_id: &ChannelId) -> Result<CreatedRoom> {
        let body = self
            .signed_body(
                &[group_id.as_str()],
                now_ms(),
                GroupIdParams {
                    groupid: group_id.as_str(),
                },
            )
            .await?;
        self.post("/api/groups/join/", &body).await
    }

    async fn invite_members(&self, group_id: &ChannelId, members: &[UserId]) -> Result<()> {
        let body = self
            .signed_body(
                &[group_id.as_str()],
                now_ms(),
                InviteParams {
                    groupid: group_id.as_str(),
                    members,
                },
            )
            .await?;
        let _: serde_json::Value = self.post("/api/groups/members/invite/", &body).await?;
        Ok(())
    }

    async fn group_members(
        &self,
        group_id: &ChannelId,
        page: PageParams,
    ) -> Result<Vec<GroupMember>> {
        let mut extra = vec![("groupid", group_id.as_str().to_owned())];
        extra.extend(Self::page_pairs(page));
        let query = self
            .signed_query(&[group_id.as_str()], now_ms(), extra)
            .await?;
        let data: ListResult<GroupMember> = self.get("/api/groups/members/", &query).await?;
        Ok(data.result)
    }

    async fn update_room(&self, params: &RoomUpdateParams) -> Result<()> {
        let body = self
            .signed_body(&[&params.topic, &params.topic_type], now_ms(), params)
            .await?;
        let _: serde_json::Value = self.post("/api/chats/update/", &body).await?;
        Ok(())
    }

    async fn change_message_status(
        &self,
        message_ids: &[MessageId],
        topic: &str,
        status: DeliveryStatus,
    ) -> Result<()> {
        let body = self
            .signed_body(
                &[status.as_str()],
                now_ms(),
                ChangeStatusParams {
                    messages: message_ids,
                    topic,
                    status: status.as_str(),
                },
            )
            .await?;
        let _: serde_json::Value = self.post("/api/messages/status/", &body).await?;
        Ok(())
    }

    async fn resolve_topic(&self, target: &UserId) -> Result<String> {
        let query = self
            .signed_query(
                &[target.as_str()],
                now_ms(),
                vec![("target_userid", target.as_str().to_owned())],
            )
            .await?;
        let data: ResolvedTopic = self.get("/api/users/topic/", &query).await?;
        Ok(data.topic)
    }
}
