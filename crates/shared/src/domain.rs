use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ChannelId);
id_newtype!(MessageId);

/// Group topics carry a `group:` prefix in their identifier; everything else
/// is a direct (one-to-one) topic addressed by the peer's user id.
pub const GROUP_TOPIC_PREFIX: &str = "group:";

impl ChannelId {
    pub fn is_group(&self) -> bool {
        self.0.starts_with(GROUP_TOPIC_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Direct,
    Group,
}

/// Per-message delivery lifecycle. Variant order defines the monotonic
/// ordering `Sent < Delivered < Read` used by status reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

pub const MLS_CIPHER_SUITE: &str = "MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSuite {
    #[default]
    None,
    Mls128DhKemX25519Aes128GcmSha256Ed25519,
}

impl CipherSuite {
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherSuite::None => "None",
            CipherSuite::Mls128DhKemX25519Aes128GcmSha256Ed25519 => MLS_CIPHER_SUITE,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, CipherSuite::None)
    }
}

impl std::str::FromStr for CipherSuite {
    type Err = UnknownCipherSuite;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "" | "None" => Ok(CipherSuite::None),
            MLS_CIPHER_SUITE => Ok(CipherSuite::Mls128DhKemX25519Aes128GcmSha256Ed25519),
            other => Err(UnknownCipherSuite(other.to_owned())),
        }
    }
}

impl Serialize for CipherSuite {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CipherSuite {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown cipher suite tag: {0}")]
pub struct UnknownCipherSuite(pub String);

/// A display-ready message as held in the in-memory list and the cache.
/// For an opted-in encrypted send the `text` field holds the ciphertext the
/// oracle produced, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub sender: UserId,
    pub text: String,
    #[serde(default)]
    pub cipher_suite: CipherSuite,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub status: DeliveryStatus,
    pub status_timestamp: i64,
}

/// The per-channel record persisted in the conversation cache. The cache is
/// the durable source of truth for every channel, active or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedConversationRecord {
    pub message_list: Vec<ChatMessage>,
    pub unread: u32,
    pub last_message: Option<String>,
    /// Unix milliseconds of the newest mutation.
    pub updated_at: i64,
}

/// A channel as shown in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelItem {
    pub chat_id: ChannelId,
    pub chat_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub kind: ChannelKind,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub unread: u32,
    #[serde(default)]
    pub is_encrypted_group: bool,
}
