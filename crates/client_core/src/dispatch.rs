use std::sync::Arc;

use shared::domain::{ChannelId, ChatMessage, DeliveryStatus, UserId};
use shared::protocol::{RequestFrame, StatusFrame, WireFrame, WireKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::{ChatClient, ClientEvent, SessionContext};

/// Maps a frame's addressing fields to the channel it belongs to. Group
/// topics map to themselves; for direct traffic an echo of our own message
/// files under the destination topic, while a peer's message files under
/// the peer.
pub(crate) fn resolve_channel(
    ctx: &SessionContext,
    come_from: &UserId,
    content_topic: &str,
) -> Option<ChannelId> {
    let topic = ChannelId::from(content_topic);
    if topic.is_group() {
        return Some(topic);
    }
    if come_from == &ctx.user_id {
        if content_topic.is_empty() {
            return ctx.active_channel.clone();
        }
        return Some(topic);
    }
    if come_from.as_str().is_empty() {
        return ctx.active_channel.clone();
    }
    Some(ChannelId::from(come_from.as_str()))
}

impl ChatClient {
    /// Entry point for one raw frame off the persistent connection. Decodes
    /// once, then routes on the closed frame enum. Errors are returned to
    /// the caller; the frame loop logs them and keeps going.
    pub async fn receive_frame(self: &Arc<Self>, kind: WireKind, bytes: &[u8]) -> Result<()> {
        match self.codec.decode(kind, bytes)? {
            WireFrame::Request(frame) => self.handle_request_frame(frame).await,
            WireFrame::Status(frame) => self.handle_status_frame(frame).await,
            WireFrame::ChangeStatus(frame) => {
                debug!(
                    message_id = %frame.message_id,
                    status = frame.status.as_str(),
                    "ignoring server-driven status change frame"
                );
                Ok(())
            }
            WireFrame::GroupEvent(frame) => self.oracle.handle_group_event(&frame.payload).await,
        }
    }

    /// Consumes `(kind, bytes)` pairs from the connection reader in arrival
    /// order. A frame that fails to decode or apply is logged and skipped;
    /// it never takes the loop down.
    pub fn spawn_frame_loop(
        self: &Arc<Self>,
        mut frames: mpsc::Receiver<(WireKind, Vec<u8>)>,
    ) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some((kind, bytes)) = frames.recv().await {
                if let Err(err) = client.receive_frame(kind, &bytes).await {
                    warn!(kind = ?kind, error = %err, "dropping wire frame");
                }
            }
            debug!("frame channel closed, dispatcher loop exiting");
        })
    }

    async fn handle_request_frame(self: &Arc<Self>, frame: RequestFrame) -> Result<()> {
        if frame.is_bridge() {
            debug!(message_id = %frame.message_id, "skipping bridge frame");
            return Ok(());
        }
        self.note_frame_arrival(frame.timestamp).await;

        let ctx = self.session_context().await;
        let Some(channel_id) = resolve_channel(&ctx, &frame.come_from, &frame.content_topic)
        else {
            warn!(
                message_id = %frame.message_id,
                come_from = %frame.come_from,
                "cannot resolve a channel for frame, dropping"
            );
            return Ok(());
        };

        let text = if frame.cipher_suite.is_encrypted() {
            match self
                .oracle
                .decrypt(&frame.payload, &frame.come_from, &channel_id)
                .await
            {
                Ok(plaintext) => plaintext,
                Err(err) => {
                    // Keep the ciphertext rather than losing the message.
                    warn!(
                        message_id = %frame.message_id,
                        channel = %channel_id,
                        error = %err,
                        "decryption failed, keeping ciphertext"
                    );
                    frame.payload.clone()
                }
            }
        } else {
            frame.payload.clone()
        };

        let message = ChatMessage {
            id: frame.message_id.clone(),
            channel_id: channel_id.clone(),
            sender: frame.come_from.clone(),
            text,
            cipher_suite: frame.cipher_suite,
            timestamp: frame.timestamp,
            status: DeliveryStatus::Delivered,
            status_timestamp: frame.timestamp,
        };

        if ctx.active_channel.as_ref() == Some(&channel_id) {
            self.append_live(message.clone()).await;
            self.emit(ClientEvent::MessageListUpdated {
                channel_id: channel_id.clone(),
            });
        }

        let (record, _) = self.cache.apply_incoming(&ctx, &channel_id, &message).await?;
        self.update_directory_entry(&channel_id, &record).await;
        self.emit(ClientEvent::ChannelUpdated { channel_id });
        Ok(())
    }

    async fn handle_status_frame(self: &Arc<Self>, frame: StatusFrame) -> Result<()> {
        self.note_frame_arrival(frame.timestamp).await;

        let ctx = self.session_context().await;
        let Some(channel_id) = resolve_channel(&ctx, &frame.come_from, &frame.content_topic)
        else {
            warn!(
                message_id = %frame.message_id,
                "cannot resolve a channel for status frame, dropping"
            );
            return Ok(());
        };

        // Confirmation marker: same id as the confirmed message, no text.
        // The furthest status among same-id entries wins on the next load.
        let marker = ChatMessage {
            id: frame.message_id.clone(),
            channel_id: channel_id.clone(),
            sender: frame.come_from.clone(),
            text: String::new(),
            cipher_suite: shared::domain::CipherSuite::None,
            timestamp: frame.timestamp,
            status: frame.status,
            status_timestamp: frame.timestamp,
        };
        let (record, _) = self.cache.apply_incoming(&ctx, &channel_id, &marker).await?;
        self.update_directory_entry(&channel_id, &record).await;

        {
            let mut guard = self.inner.lock().await;
            if let Some(list) = guard.message_list.as_mut() {
                crate::status::apply_status_to_list(
                    list,
                    &frame.message_id,
                    frame.status,
                    frame.timestamp,
                );
            }
        }

        self.emit(ClientEvent::MessageDelivered {
            message_id: frame.message_id,
        });
        Ok(())
    }

    async fn note_frame_arrival(&self, timestamp: i64) {
        {
            let mut guard = self.inner.lock().await;
            guard.last_frame_at = Some(timestamp.max(guard.last_frame_at.unwrap_or(0)));
        }
        // The watermark survives restarts so the next session can delta-sync.
        if let Err(err) = self.cache.record_watermark(timestamp).await {
            warn!(error = %err, "cannot persist sync watermark");
        }
    }
}
