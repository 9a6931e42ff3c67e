use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{
    ChannelId, ChannelKind, CipherSuite, DeliveryStatus, MessageId, UserId,
};

/// Payload marker carried by system-internal bridge traffic. Frames tagged
/// with it are filtered out by the dispatcher before any state mutation.
pub const BRIDGE_MESSAGE_TYPE: &str = "dapp_bridge";

/// Wire-frame kind tags as carried on the persistent connection. The numeric
/// values are the transport's frame-type discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireKind {
    RequestMessage,
    MessageStatusResponse,
    MessageChangeStatus,
    GroupEvent,
}

impl WireKind {
    pub fn code(&self) -> u16 {
        match self {
            WireKind::RequestMessage => 16,
            WireKind::MessageStatusResponse => 21,
            WireKind::MessageChangeStatus => 20,
            WireKind::GroupEvent => 33,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            16 => Some(WireKind::RequestMessage),
            21 => Some(WireKind::MessageStatusResponse),
            20 => Some(WireKind::MessageChangeStatus),
            33 => Some(WireKind::GroupEvent),
            _ => None,
        }
    }
}

/// An inbound chat message frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub message_id: MessageId,
    pub come_from: UserId,
    /// Destination topic: a group id or the recipient's user id.
    pub content_topic: String,
    pub payload: String,
    #[serde(default)]
    pub cipher_suite: CipherSuite,
    /// Unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub message_type: String,
}

impl RequestFrame {
    pub fn is_bridge(&self) -> bool {
        self.message_type == BRIDGE_MESSAGE_TYPE
    }
}

/// Delivery confirmation for a previously-sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFrame {
    pub message_id: MessageId,
    pub come_from: UserId,
    pub content_topic: String,
    pub status: DeliveryStatus,
    pub timestamp: i64,
}

/// Server-driven status change; informational at this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatusFrame {
    pub message_id: MessageId,
    pub status: DeliveryStatus,
    pub timestamp: i64,
}

/// Opaque group-membership event forwarded to the group oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEventFrame {
    pub payload: Vec<u8>,
}

/// A decoded wire frame. Decoding happens exactly once at the boundary; all
/// downstream routing matches exhaustively on these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Request(RequestFrame),
    Status(StatusFrame),
    ChangeStatus(ChangeStatusFrame),
    GroupEvent(GroupEventFrame),
}

/// The outbound message command handed to the codec and then to the
/// transport sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendCommand {
    pub message_id: MessageId,
    pub come_from: UserId,
    pub content_topic: String,
    pub payload: String,
    pub cipher_suite: CipherSuite,
    pub timestamp: i64,
}

/// Standard REST response envelope; `code != 0` signals a failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageParams {
    pub page: u32,
    pub size: u32,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

/// A channel row as returned by the room-list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub chatid: ChannelId,
    pub chat_name: String,
    pub chat_type: ChannelKind,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatusRecord {
    pub status: DeliveryStatus,
    pub timestamp: i64,
}

/// A history row as returned by the message-list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub messageid: MessageId,
    pub from: UserId,
    pub topic: String,
    #[serde(default)]
    pub cipher_suite: CipherSuite,
    pub payload: String,
    pub timestamp: i64,
    pub message_status: MessageStatusRecord,
}

/// Result of room creation or group join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedRoom {
    pub groupid: ChannelId,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub userid: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRoomParams {
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUpdateParams {
    pub chatid: ChannelId,
    pub chat_type: ChannelKind,
    pub topic: String,
    pub topic_type: String,
}

/// Per-channel map of message statuses accumulated while the client was
/// offline, as returned by the delta-sync endpoint.
pub type NewMessageStatuses = HashMap<ChannelId, HashMap<MessageId, DeliveryStatus>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_kind_codes_round_trip() {
        for kind in [
            WireKind::RequestMessage,
            WireKind::MessageStatusResponse,
            WireKind::MessageChangeStatus,
            WireKind::GroupEvent,
        ] {
            assert_eq!(WireKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(WireKind::from_code(0), None);
    }

    #[test]
    fn bridge_frames_are_detected_by_message_type() {
        let frame = RequestFrame {
            message_id: MessageId::from("m1"),
            come_from: UserId::from("user:a"),
            content_topic: "user:b".into(),
            payload: "hi".into(),
            cipher_suite: CipherSuite::None,
            timestamp: 0,
            message_type: BRIDGE_MESSAGE_TYPE.into(),
        };
        assert!(frame.is_bridge());
    }
}
