//! Crate-wide error type.
//!
//! The teacher crate reports failures as plain [`std::io::Error`] at the
//! socket/poller boundary. Above that boundary this runtime has several
//! distinct failure domains (AT timeouts, malformed addresses, oversized
//! modem packets, pipeline stage failures) that callers want to match on, so
//! they are modeled as a `thiserror`-derived enum instead of stringly-typed
//! `io::Error`s.

use thiserror::Error;

/// Every failure an [`crate::action::UpdateStatus::Error`] can carry.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("address resolution failed for {name}")]
    ResolveFailed { name: String },

    #[error("socket connect failed: {0}")]
    ConnectFailed(String),

    #[error("transport send failed: {0}")]
    SendFailed(String),

    #[error("transport recv failed: {0}")]
    RecvFailed(String),

    #[error("AT command timed out waiting for {expected:?}")]
    AtTimeout { expected: String },

    #[error("AT command returned ERROR")]
    AtError,

    #[error("AT response failed to parse: {0}")]
    AtParse(String),

    #[error("modem packet of {size} bytes exceeds MTU {mtu}")]
    OversizedPacket { size: usize, mtu: usize },

    #[error("pipeline stage {stage} failed")]
    PipelineStage {
        stage: usize,
        #[source]
        source: Box<LinkError>,
    },

    #[error("operation was stopped")]
    Stopped,

    #[error("no channel could build a transport for the requested address")]
    NoViableChannel,
}

pub type Result<T> = std::result::Result<T, LinkError>;
