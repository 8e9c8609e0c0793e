//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Codec failures carry the underlying serializer's message as a string,
/// so JSON and bincode errors surface through the same variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(String),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed input, missing required fields, or a
    /// payload encoded with a different codec.
    #[error("decode failed: {0}")]
    Decode(String),

    /// A location name outside the fixed set of map regions.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// A rank name other than infantry, cavalry or artillery.
    #[error("invalid rank: {0}")]
    InvalidRank(String),
}
