/// Errors that can occur while encoding or decoding values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The value cannot be represented in the wire format.
    #[error("encoder error: {0}")]
    Encoder(String),

    /// The buffer is not a well-formed encoding.
    #[error("decoder error: {0}")]
    Decoder(String),
}

impl CodecError {
    pub(crate) fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub(crate) fn decoder(msg: impl Into<String>) -> Self {
        Self::Decoder(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
