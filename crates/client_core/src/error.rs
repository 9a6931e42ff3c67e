use shared::protocol::WireKind;
use thiserror::Error;

/// Error taxonomy of the reconciliation engine. Errors raised while handling
/// a single wire frame never abort the dispatcher loop; errors from public
/// operations propagate to the caller and are never retried here.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A wire frame could not be decoded. The offending frame is skipped.
    #[error("failed to decode {kind:?} frame: {reason}")]
    Decode { kind: WireKind, reason: String },

    /// The conversation cache rejected an operation or is not initialized.
    #[error("conversation cache unavailable: {0}")]
    CacheUnavailable(String),

    /// An external REST call failed or returned a nonzero service code.
    #[error("request failed: {0}")]
    Request(String),

    /// The encryption/group-membership oracle is not ready. Sends that
    /// requested encryption fail closed on this variant.
    #[error("group oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The outbound transport sink rejected a payload.
    #[error("transport send failed: {0}")]
    Transport(String),

    /// No destination topic could be resolved and no channel is active.
    #[error("no destination topic and no active channel")]
    NoDestination,
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::Request(err.to_string())
    }
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
