use shared::protocol::{
    ChangeStatusFrame, GroupEventFrame, RequestFrame, SendCommand, StatusFrame, WireFrame,
    WireKind,
};

use crate::error::{CoreError, Result};

/// Schema codec seam: decodes inbound frame bytes into closed [`WireFrame`]
/// variants and encodes outbound send commands. Decoding happens once, at
/// the boundary.
pub trait WireCodec: Send + Sync {
    fn decode(&self, kind: WireKind, bytes: &[u8]) -> Result<WireFrame>;
    fn encode_send(&self, command: &SendCommand) -> Result<Vec<u8>>;
}

/// JSON rendition of the wire schema.
pub struct JsonWireCodec;

impl JsonWireCodec {
    fn parse<T: serde::de::DeserializeOwned>(kind: WireKind, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|err| CoreError::Decode {
            kind,
            reason: err.to_string(),
        })
    }
}

impl WireCodec for JsonWireCodec {
    fn decode(&self, kind: WireKind, bytes: &[u8]) -> Result<WireFrame> {
        Ok(match kind {
            WireKind::RequestMessage => {
                WireFrame::Request(Self::parse::<RequestFrame>(kind, bytes)?)
            }
            WireKind::MessageStatusResponse => {
                WireFrame::Status(Self::parse::<StatusFrame>(kind, bytes)?)
            }
            WireKind::MessageChangeStatus => {
                WireFrame::ChangeStatus(Self::parse::<ChangeStatusFrame>(kind, bytes)?)
            }
            WireKind::GroupEvent => WireFrame::GroupEvent(GroupEventFrame {
                payload: bytes.to_vec(),
            }),
        })
    }

    fn encode_send(&self, command: &SendCommand) -> Result<Vec<u8>> {
        serde_json::to_vec(command).map_err(|err| CoreError::Decode {
            kind: WireKind::RequestMessage,
            reason: err.to_string(),
        })
    }
}
