//! Error types for names and the wire codec.

/// Errors from parsing a router name URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name URI must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("empty name component in URI: {0}")]
    EmptyComponent(String),

    #[error("invalid percent-escape in component: {0}")]
    BadEscape(String),
}

/// Errors from decoding wire-format packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("truncated input: need {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("unexpected TLV type: expected {expected:#x}, found {found:#x}")]
    UnexpectedType { expected: u64, found: u64 },

    #[error("unknown outer packet type: {0:#x}")]
    UnknownPacketType(u64),

    #[error("TLV length {0} exceeds codec limit")]
    LengthOverflow(u64),

    #[error("invalid non-negative integer width: {0}")]
    BadIntegerWidth(usize),

    #[error("invalid nonce width: {0}")]
    BadNonceWidth(usize),

    #[error("unknown nack reason code: {0}")]
    UnknownNackReason(u64),

    #[error("{count} trailing byte(s) after packet")]
    TrailingBytes { count: usize },
}
