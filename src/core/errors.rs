//! Error taxonomy shared by the codec and the agent runtime.

use std::io;

use thiserror::Error;

/// Rejections produced by the value-type and options codecs. Every codec
/// failure maps to exactly one of these variants.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported field: {0}")]
    BadKey(String),
    #[error("bad value type: {0}")]
    BadType(String),
    #[error("bad value: {0}")]
    BadValue(String),
    #[error("short input: need {needed} octets, have {have}")]
    Short { needed: usize, have: usize },
    #[error("missing value for field: {0}")]
    Missing(String),
}

/// Runtime failures of the agent proper.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    /// A non-blocking send could not complete; the caller drops the frame.
    #[error("send would block")]
    Timeout,
}

impl AgentError {
    pub fn bad_value(msg: impl Into<String>) -> Self {
        AgentError::Codec(CodecError::BadValue(msg.into()))
    }
}
