use std::collections::HashMap;

use shared::domain::{
    CachedConversationRecord, ChannelId, ChannelKind, DeliveryStatus, MessageId, UserId,
};
use shared::protocol::{ChannelInfo, CreateRoomParams, CreatedRoom, PageParams, RoomUpdateParams};

use crate::test_support::{channel_item, harness};
use crate::{ClientEvent, CoreError};

fn channel_info(id: &str) -> ChannelInfo {
    ChannelInfo {
        chatid: ChannelId::from(id),
        chat_name: id.to_owned(),
        chat_type: if ChannelId::from(id).is_group() {
            ChannelKind::Group
        } else {
            ChannelKind::Direct
        },
        avatar_url: None,
    }
}

#[tokio::test]
async fn directory_rows_are_overlaid_with_cached_state() {
    let h = harness("user:me");
    h.store
        .seed(
            &ChannelId::from("c1"),
            CachedConversationRecord {
                unread: 2,
                last_message: Some("latest".into()),
                updated_at: 77,
                ..Default::default()
            },
        )
        .await;
    *h.api.channels.lock().await = vec![channel_info("c1"), channel_info("c2")];

    let list = h
        .client
        .query_channels(PageParams::default())
        .await
        .expect("query");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].unread, 2);
    assert_eq!(list[0].last_message.as_deref(), Some("latest"));
    assert_eq!(list[0].updated_at, 77);
    assert_eq!(list[1].unread, 0);
    assert!(list[1].last_message.is_none());
}

#[tokio::test]
async fn page_one_replaces_and_later_pages_append() {
    let h = harness("user:me");
    *h.api.channels.lock().await = vec![channel_info("c1")];
    h.client
        .query_channels(PageParams { page: 1, size: 20 })
        .await
        .expect("page 1");

    *h.api.channels.lock().await = vec![channel_info("c2")];
    let list = h
        .client
        .query_channels(PageParams { page: 2, size: 20 })
        .await
        .expect("page 2");
    assert_eq!(list.len(), 2);

    *h.api.channels.lock().await = vec![channel_info("c3")];
    let list = h
        .client
        .query_channels(PageParams { page: 1, size: 20 })
        .await
        .expect("page 1 again");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].chat_id, ChannelId::from("c3"));
}

#[tokio::test]
async fn offline_statuses_overwrite_unread_when_unseen_messages_exist() {
    let h = harness("user:me");
    h.store
        .seed(
            &ChannelId::from("c1"),
            CachedConversationRecord {
                unread: 9,
                ..Default::default()
            },
        )
        .await;
    *h.api.channels.lock().await = vec![channel_info("c1")];
    {
        let mut statuses = h.api.offline_statuses.lock().await;
        let mut per_message = HashMap::new();
        per_message.insert(MessageId::from("m1"), DeliveryStatus::Delivered);
        per_message.insert(MessageId::from("m2"), DeliveryStatus::Read);
        per_message.insert(MessageId::from("m3"), DeliveryStatus::Sent);
        statuses.insert(ChannelId::from("c1"), per_message);
    }
    // A frame has been seen, so the client knows where to sync from.
    h.client.inner.lock().await.last_frame_at = Some(50);

    let list = h
        .client
        .query_channels(PageParams::default())
        .await
        .expect("query");
    assert_eq!(list[0].unread, 2);
    let record = h
        .client
        .cache
        .get(&ChannelId::from("c1"))
        .await
        .expect("get")
        .expect("record");
    assert_eq!(record.unread, 2);
    assert_eq!(h.api.sync_calls.lock().await.as_slice(), [50]);
}

#[tokio::test]
async fn a_new_session_delta_syncs_from_the_persisted_watermark() {
    let h = harness("user:me");
    let frame = shared::protocol::RequestFrame {
        message_id: MessageId::from("m1"),
        come_from: UserId::from("c1"),
        content_topic: "user:me".into(),
        payload: "hi".into(),
        cipher_suite: shared::domain::CipherSuite::None,
        timestamp: 500,
        message_type: String::new(),
    };
    h.client
        .receive_frame(
            shared::protocol::WireKind::RequestMessage,
            &serde_json::to_vec(&frame).expect("encode"),
        )
        .await
        .expect("dispatch");

    // Same store, fresh client: the watermark outlives the session.
    let restarted = crate::ChatClient::new_with_collaborators(
        UserId::from("user:me"),
        std::sync::Arc::clone(&h.api) as std::sync::Arc<dyn crate::api::MessagingApi>,
        std::sync::Arc::clone(&h.store) as std::sync::Arc<dyn crate::cache::ConversationStore>,
        std::sync::Arc::clone(&h.oracle) as std::sync::Arc<dyn crate::GroupOracle>,
        std::sync::Arc::new(crate::JsonWireCodec),
        std::sync::Arc::clone(&h.transport) as std::sync::Arc<dyn crate::Transport>,
    );
    restarted
        .query_channels(PageParams::default())
        .await
        .expect("query");
    assert_eq!(h.api.sync_calls.lock().await.as_slice(), [500]);
}

#[tokio::test]
async fn delta_sync_is_skipped_without_a_watermark() {
    let h = harness("user:me");
    *h.api.channels.lock().await = vec![channel_info("c1")];
    h.client
        .query_channels(PageParams::default())
        .await
        .expect("query");
    assert!(h.api.sync_calls.lock().await.is_empty());
}

#[tokio::test]
async fn group_state_is_synced_while_querying() {
    let h = harness("user:me");
    *h.api.groups.lock().await = vec![ChannelId::from("group:g1"), ChannelId::from("group:g2")];
    h.client
        .query_channels(PageParams::default())
        .await
        .expect("query");

    let synced = h.oracle.synced_groups.lock().await;
    assert_eq!(synced.len(), 1);
    assert_eq!(
        synced[0],
        [ChannelId::from("group:g1"), ChannelId::from("group:g2")]
    );
}

#[tokio::test]
async fn activation_resets_unread_and_annotates_encryption() {
    let h = harness("user:me");
    h.store
        .seed(
            &ChannelId::from("group:g1"),
            CachedConversationRecord {
                unread: 3,
                ..Default::default()
            },
        )
        .await;
    h.oracle.enable_group(&ChannelId::from("group:g1")).await;
    *h.api.channels.lock().await = vec![channel_info("group:g1")];
    h.client
        .query_channels(PageParams::default())
        .await
        .expect("query");

    h.client
        .set_active_channel(Some(channel_item("group:g1")))
        .await
        .expect("activate");

    let active = h.client.active_channel().await.expect("active");
    assert_eq!(active.unread, 0);
    assert!(active.is_encrypted_group);
    let record = h
        .client
        .cache
        .get(&ChannelId::from("group:g1"))
        .await
        .expect("get")
        .expect("record");
    assert_eq!(record.unread, 0);
    let list = h.client.channel_list().await.expect("list");
    assert_eq!(list[0].unread, 0);
}

#[tokio::test]
async fn reactivating_the_active_channel_changes_nothing() {
    let h = harness("user:me");
    h.client
        .set_active_channel(Some(channel_item("c1")))
        .await
        .expect("activate");
    h.client.append_live(crate::test_support::message("m1", "c1", "c1", 10)).await;

    h.client
        .set_active_channel(Some(channel_item("c1")))
        .await
        .expect("re-activate");

    let record = h.client.cache.get(&ChannelId::from("c1")).await.expect("get");
    assert!(record.is_none());
    assert_eq!(h.client.message_list().await.expect("list").len(), 1);
}

#[tokio::test]
async fn clearing_the_active_channel_has_no_side_effects() {
    let h = harness("user:me");
    h.client
        .set_active_channel(Some(channel_item("c1")))
        .await
        .expect("activate");
    let mut events = h.client.subscribe_events();

    h.client.set_active_channel(None).await.expect("clear");
    assert!(h.client.active_channel().await.is_none());
    let event = events.recv().await.expect("event");
    assert!(matches!(
        event,
        ClientEvent::ActiveChannelChanged { channel_id: None }
    ));
}

#[tokio::test]
async fn room_creation_establishes_group_state_only_after_the_service_confirms() {
    let h = harness("user:me");

    // Service rejects: no group state may be created.
    let err = h
        .client
        .create_channel(&CreateRoomParams::default())
        .await
        .expect_err("scripted failure");
    assert!(matches!(err, CoreError::Request(_)));
    assert!(h.oracle.created_groups.lock().await.is_empty());

    *h.api.created_room.lock().await = Some(CreatedRoom {
        groupid: ChannelId::from("group:g1"),
        group_name: "room".into(),
        avatar_url: None,
    });
    let item = h
        .client
        .create_channel(&CreateRoomParams::default())
        .await
        .expect("create");
    assert_eq!(item.chat_id, ChannelId::from("group:g1"));
    assert_eq!(
        h.oracle.created_groups.lock().await.as_slice(),
        [ChannelId::from("group:g1")]
    );
    let list = h.client.channel_list().await.expect("list");
    assert_eq!(list[0].chat_id, ChannelId::from("group:g1"));
}

#[tokio::test]
async fn joining_a_group_lists_it_once() {
    let h = harness("user:me");
    let group = ChannelId::from("group:g1");
    h.client.join_group(&group).await.expect("join");
    h.client.join_group(&group).await.expect("join again");

    let list = h.client.channel_list().await.expect("list");
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].kind, ChannelKind::Group);
}

#[tokio::test]
async fn invites_are_filtered_by_the_oracle() {
    let h = harness("user:me");
    let group = ChannelId::from("group:g1");
    h.oracle.reject_member(&UserId::from("user:bad")).await;

    h.client
        .invite_members(&group, &[UserId::from("user:good"), UserId::from("user:bad")])
        .await
        .expect("invite");

    let invites = h.api.invites.lock().await;
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].1, [UserId::from("user:good")]);
    let added = h.oracle.added_members.lock().await;
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].0, UserId::from("user:good"));
}

#[tokio::test]
async fn an_invite_with_nobody_left_is_a_no_op() {
    let h = harness("user:me");
    let group = ChannelId::from("group:g1");
    h.oracle.reject_member(&UserId::from("user:bad")).await;

    h.client
        .invite_members(&group, &[UserId::from("user:bad")])
        .await
        .expect("no-op");
    assert!(h.api.invites.lock().await.is_empty());
    assert!(h.oracle.added_members.lock().await.is_empty());
}

#[tokio::test]
async fn topic_updates_notify_the_channel() {
    let h = harness("user:me");
    let mut events = h.client.subscribe_events();
    h.client
        .update_channel(&RoomUpdateParams {
            chatid: ChannelId::from("c1"),
            chat_type: ChannelKind::Direct,
            topic: "renamed".into(),
            topic_type: "text".into(),
        })
        .await
        .expect("update");

    let event = events.recv().await.expect("event");
    assert_eq!(event.name(), "channel.updated");
}
