use thiserror::Error;

/// Failures raised by the bridge core.
///
/// None of these are fatal. The bridge logs and drops the offending
/// request; only `EmbedFailed` surfaces to the caller that creates a window.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid RPC message: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("invalid RPC response: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unknown opcode: {0:?}")]
    UnknownMethod(String),

    #[error("RPC request {id} carries no parameters")]
    MissingParam { id: i64 },

    #[error("dispatch queue drained off its owning thread")]
    ForeignThread,

    #[error("embedded browser failed to attach to the window")]
    EmbedFailed,
}

pub type Result<T> = std::result::Result<T, Error>;
