use std::sync::Arc;

use shared::domain::{
    CachedConversationRecord, ChannelId, ChannelItem, ChannelKind, DeliveryStatus, UserId,
};
use shared::protocol::{ChannelInfo, CreateRoomParams, PageParams, RoomUpdateParams};
use tracing::{debug, warn};

use crate::error::Result;
use crate::{ChatClient, ClientEvent};

impl ChatClient {
    /// Fetches one page of the channel directory and overlays each row with
    /// its cached unread/last-message data. Statuses accumulated while the
    /// client was offline are reconciled through the delta-sync endpoint,
    /// and group channels get their encryption state refreshed in the
    /// oracle. Page 1 replaces the directory; later pages append.
    pub async fn query_channels(self: &Arc<Self>, page: PageParams) -> Result<Vec<ChannelItem>> {
        let infos = self.api.channel_list(page).await?;

        let since = match self.inner.lock().await.last_frame_at {
            Some(since) => Some(since),
            None => self.cache.watermark().await.unwrap_or_else(|err| {
                warn!(error = %err, "cannot read sync watermark");
                None
            }),
        };
        let offline_statuses = match since {
            Some(since) => match self.api.sync_new_messages(since).await {
                Ok(statuses) => statuses,
                Err(err) => {
                    warn!(error = %err, "offline delta sync failed, keeping cached counts");
                    Default::default()
                }
            },
            None => Default::default(),
        };

        if page.page <= 1 {
            self.sync_group_state().await;
        }

        let mut items = Vec::with_capacity(infos.len());
        for info in infos {
            items.push(self.directory_row(info, &offline_statuses).await?);
        }

        let list = {
            let mut guard = self.inner.lock().await;
            match guard.channel_list.as_mut() {
                Some(existing) if page.page > 1 => {
                    existing.extend(items);
                    existing.clone()
                }
                _ => {
                    guard.channel_list = Some(items.clone());
                    items
                }
            }
        };

        self.emit(ClientEvent::ChannelListUpdated);
        Ok(list)
    }

    async fn directory_row(
        self: &Arc<Self>,
        info: ChannelInfo,
        offline_statuses: &shared::protocol::NewMessageStatuses,
    ) -> Result<ChannelItem> {
        let cached = self.cache.get(&info.chatid).await?;
        let mut item = ChannelItem {
            chat_id: info.chatid.clone(),
            chat_name: info.chat_name,
            avatar_url: info.avatar_url,
            kind: info.chat_type,
            last_message: cached.as_ref().and_then(|record| record.last_message.clone()),
            updated_at: cached.as_ref().map(|record| record.updated_at).unwrap_or(0),
            unread: cached.as_ref().map(|record| record.unread).unwrap_or(0),
            is_encrypted_group: false,
        };

        // Messages that arrived while offline and are still unseen override
        // the cached count.
        if let Some(statuses) = offline_statuses.get(&info.chatid) {
            let unseen = statuses
                .values()
                .filter(|status| **status != DeliveryStatus::Read)
                .count() as u32;
            if unseen != 0 {
                item.unread = unseen;
                if let Some(record) = self.cache.overwrite_unread(&info.chatid, unseen).await? {
                    item.last_message = record.last_message;
                    item.updated_at = record.updated_at;
                }
            }
        }
        Ok(item)
    }

    async fn sync_group_state(self: &Arc<Self>) {
        let group_ids = match self.api.group_list(PageParams::default()).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "group list fetch failed, skipping group state sync");
                return;
            }
        };
        if group_ids.is_empty() {
            return;
        }
        if let Err(err) = self.oracle.sync_group_state(&group_ids).await {
            warn!(error = %err, "group state sync failed");
        }
    }

    /// Makes `channel` the active one: the only path that resets its unread
    /// count. Group channels are annotated with the oracle's view of their
    /// encryption state; `None` clears the pointer with no other effect.
    /// Re-activating the already-active channel changes nothing.
    pub async fn set_active_channel(
        self: &Arc<Self>,
        channel: Option<ChannelItem>,
    ) -> Result<()> {
        let Some(mut item) = channel else {
            let mut guard = self.inner.lock().await;
            guard.active_channel = None;
            drop(guard);
            self.emit(ClientEvent::ActiveChannelChanged { channel_id: None });
            return Ok(());
        };

        self.cache.reset_unread(&item.chat_id).await?;
        item.unread = 0;
        item.is_encrypted_group = if item.chat_id.is_group() {
            match self.oracle.is_group_enabled(&item.chat_id).await {
                Ok(enabled) => enabled,
                Err(err) => {
                    debug!(channel = %item.chat_id, error = %err, "oracle annotation unavailable");
                    false
                }
            }
        } else {
            false
        };

        let channel_id = item.chat_id.clone();
        {
            let mut guard = self.inner.lock().await;
            if let Some(list) = guard.channel_list.as_mut() {
                if let Some(entry) = list.iter_mut().find(|entry| entry.chat_id == channel_id) {
                    entry.unread = 0;
                }
            }
            guard.active_channel = Some(item);
        }

        self.emit(ClientEvent::ActiveChannelChanged {
            channel_id: Some(channel_id),
        });
        Ok(())
    }

    /// Creates a new room. The oracle's group state is established only
    /// after the service has confirmed the room exists.
    pub async fn create_channel(
        self: &Arc<Self>,
        params: &CreateRoomParams,
    ) -> Result<ChannelItem> {
        let room = self.api.create_room(params).await?;
        if room.groupid.is_group() {
            if let Err(err) = self.oracle.create_group(&room.groupid).await {
                warn!(group = %room.groupid, error = %err, "group state creation failed");
            }
        }
        let item = ChannelItem {
            chat_id: room.groupid,
            chat_name: room.group_name,
            avatar_url: room.avatar_url,
            kind: ChannelKind::Group,
            last_message: None,
            updated_at: crate::now_ms(),
            unread: 0,
            is_encrypted_group: false,
        };
        self.insert_directory_entry(item.clone()).await;
        Ok(item)
    }

    /// Joins an existing group and adds it to the directory when it is not
    /// already listed.
    pub async fn join_group(self: &Arc<Self>, group_id: &ChannelId) -> Result<ChannelItem> {
        let room = self.api.join_group(group_id).await?;
        let item = ChannelItem {
            chat_id: room.groupid,
            chat_name: room.group_name,
            avatar_url: room.avatar_url,
            kind: ChannelKind::Group,
            last_message: None,
            updated_at: crate::now_ms(),
            unread: 0,
            is_encrypted_group: false,
        };
        self.insert_directory_entry(item.clone()).await;
        Ok(item)
    }

    /// Invites `members` to a group. The list is first filtered to users
    /// the oracle can add; when nobody is left the call is a no-op and no
    /// request goes out. Group membership is registered with the oracle
    /// only after the service confirms the invite.
    pub async fn invite_members(
        self: &Arc<Self>,
        group_id: &ChannelId,
        members: &[UserId],
    ) -> Result<()> {
        let mut accepted = Vec::with_capacity(members.len());
        for member in members {
            if self.oracle.can_add_member(member).await? {
                accepted.push(member.clone());
            } else {
                debug!(group = %group_id, member = %member, "member cannot be added, skipping");
            }
        }
        if accepted.is_empty() {
            debug!(group = %group_id, "no members left to invite");
            return Ok(());
        }

        self.api.invite_members(group_id, &accepted).await?;

        for member in &accepted {
            self.oracle.add_member(member, group_id).await?;
        }
        Ok(())
    }

    pub async fn group_members(
        self: &Arc<Self>,
        group_id: &ChannelId,
        page: PageParams,
    ) -> Result<Vec<shared::protocol::GroupMember>> {
        self.api.group_members(group_id, page).await
    }

    pub async fn update_channel(self: &Arc<Self>, params: &RoomUpdateParams) -> Result<()> {
        self.api.update_room(params).await?;
        self.emit(ClientEvent::ChannelUpdated {
            channel_id: params.chatid.clone(),
        });
        Ok(())
    }

    async fn insert_directory_entry(&self, item: ChannelItem) {
        {
            let mut guard = self.inner.lock().await;
            if let Some(list) = guard.channel_list.as_mut() {
                if !list.iter().any(|entry| entry.chat_id == item.chat_id) {
                    list.insert(0, item);
                }
            } else {
                guard.channel_list = Some(vec![item]);
            }
        }
        self.emit(ClientEvent::ChannelListUpdated);
    }

    /// Refreshes the directory row for `channel_id` from its cached record.
    /// A channel not yet in the directory shows up on the next page fetch.
    pub(crate) async fn update_directory_entry(
        &self,
        channel_id: &ChannelId,
        record: &CachedConversationRecord,
    ) {
        let mut guard = self.inner.lock().await;
        if let Some(list) = guard.channel_list.as_mut() {
            if let Some(entry) = list.iter_mut().find(|entry| &entry.chat_id == channel_id) {
                entry.last_message = record.last_message.clone();
                entry.updated_at = record.updated_at;
                entry.unread = record.unread;
            }
        }
    }
}
