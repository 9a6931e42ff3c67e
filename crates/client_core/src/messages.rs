use std::sync::Arc;

use shared::domain::{ChannelId, ChatMessage, DeliveryStatus, MessageId, UserId};
use shared::protocol::{MessageRecord, PageParams, SendCommand};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::status::max_cached_status;
use crate::{now_ms, ChatClient, ClientEvent};

/// Per-send options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Opt in to end-to-end encryption. Only honored for group channels the
    /// oracle reports as encryption-enabled; direct channels always send
    /// plaintext.
    pub enable_encryption: bool,
}

impl ChatClient {
    /// Fetches one page of history for the active channel and merges it into
    /// the in-memory list. Page 1 replaces the list; older pages are
    /// prepended. Cached delivery statuses overlay the fetched rows so a
    /// confirmation that raced ahead of the fetch is not lost.
    pub async fn load_messages(self: &Arc<Self>, page: PageParams) -> Result<Vec<ChatMessage>> {
        let ctx = self.session_context().await;
        let channel_id = ctx.active_channel.clone().ok_or(CoreError::NoDestination)?;

        let records = self
            .api
            .message_history(channel_id.as_str(), page)
            .await?;
        let cached = self.cache.get(&channel_id).await?;

        // History arrives newest-first; the list is kept chronological.
        let mut fetched = Vec::with_capacity(records.len());
        for record in records.into_iter().rev() {
            fetched.push(self.history_row_to_message(record, &channel_id).await);
        }

        if let Some(cached) = &cached {
            for message in fetched.iter_mut() {
                if let Some((status, timestamp)) = max_cached_status(cached, &message.id) {
                    if status > message.status {
                        message.status = status;
                        message.status_timestamp = timestamp;
                    }
                }
            }
        }

        let list = {
            let mut guard = self.inner.lock().await;
            match guard.message_list.as_mut() {
                Some(existing) if page.page > 1 => {
                    let mut merged = fetched;
                    merged.append(existing);
                    *existing = merged;
                    existing.clone()
                }
                _ => {
                    guard.message_list = Some(fetched.clone());
                    fetched
                }
            }
        };

        self.emit(ClientEvent::MessageListUpdated { channel_id });
        Ok(list)
    }

    async fn history_row_to_message(
        self: &Arc<Self>,
        record: MessageRecord,
        channel_id: &ChannelId,
    ) -> ChatMessage {
        let text = if record.cipher_suite.is_encrypted() {
            match self
                .oracle
                .decrypt(&record.payload, &record.from, channel_id)
                .await
            {
                Ok(plaintext) => plaintext,
                Err(err) => {
                    warn!(
                        message_id = %record.messageid,
                        channel = %channel_id,
                        error = %err,
                        "cannot decrypt history row, keeping ciphertext"
                    );
                    record.payload.clone()
                }
            }
        } else {
            record.payload.clone()
        };
        ChatMessage {
            id: record.messageid,
            channel_id: channel_id.clone(),
            sender: record.from,
            text,
            cipher_suite: record.cipher_suite,
            timestamp: record.timestamp,
            status: record.message_status.status,
            status_timestamp: record.message_status.timestamp,
        }
    }

    pub(crate) async fn append_live(&self, message: ChatMessage) {
        let mut guard = self.inner.lock().await;
        guard.message_list.get_or_insert_with(Vec::new).push(message);
    }

    /// Sends a message to `recipient`, or to the active channel when no
    /// recipient is given. The optimistic entry is appended with status
    /// `sent` before the bytes are handed to the transport; the delivery
    /// confirmation arrives later as a wire frame and is correlated by the
    /// returned identifier.
    pub async fn send_message(
        self: &Arc<Self>,
        text: &str,
        recipient: Option<&UserId>,
        options: SendOptions,
    ) -> Result<MessageId> {
        let ctx = self.session_context().await;
        let topic = match recipient {
            Some(target) => self.api.resolve_topic(target).await?,
            None => ctx
                .active_channel
                .clone()
                .map(|channel| channel.0)
                .ok_or(CoreError::NoDestination)?,
        };
        let channel_id = ChannelId::new(topic.clone());

        // Encryption is opt-in and group-only; an unavailable oracle fails
        // the send rather than downgrading to plaintext.
        let encrypt = options.enable_encryption
            && channel_id.is_group()
            && self.oracle.is_group_enabled(&channel_id).await?;
        let (payload, cipher_suite) = if encrypt {
            (
                self.oracle.encrypt(text, &channel_id).await?,
                shared::domain::CipherSuite::Mls128DhKemX25519Aes128GcmSha256Ed25519,
            )
        } else {
            (text.to_owned(), shared::domain::CipherSuite::None)
        };

        let message_id = MessageId::new(Uuid::new_v4().simple().to_string());
        let timestamp = now_ms();
        let command = SendCommand {
            message_id: message_id.clone(),
            come_from: self.user_id.clone(),
            content_topic: topic,
            payload: payload.clone(),
            cipher_suite,
            timestamp,
        };
        let bytes = self.codec.encode_send(&command)?;

        self.append_live(ChatMessage {
            id: message_id.clone(),
            channel_id,
            sender: self.user_id.clone(),
            text: payload,
            cipher_suite,
            timestamp,
            status: DeliveryStatus::Sent,
            status_timestamp: timestamp,
        })
        .await;
        self.emit(ClientEvent::MessageSent {
            message_id: message_id.clone(),
        });

        self.transport.send(bytes).await?;
        Ok(message_id)
    }

    /// Reports a status change (typically `read`) for messages in the active
    /// channel. Without an active channel there is nothing to report.
    pub async fn change_message_status(
        self: &Arc<Self>,
        message_ids: &[MessageId],
        status: DeliveryStatus,
    ) -> Result<()> {
        let ctx = self.session_context().await;
        let Some(channel_id) = ctx.active_channel else {
            debug!("no active channel, skipping status change");
            return Ok(());
        };
        if message_ids.is_empty() {
            return Ok(());
        }
        self.api
            .change_message_status(message_ids, channel_id.as_str(), status)
            .await
    }
}
