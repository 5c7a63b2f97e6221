//! Error types for the streamnet runtime

use crate::record::RecordKind;
use crate::stream::StreamId;
use streamnet_types::{EntityKind, InterfaceId, LocationVector, Name};
use thiserror::Error;

/// Errors ending an entity task
#[derive(Debug, Error)]
pub enum EntityError {
    /// A record kind reached an entity that cannot handle it
    #[error("{entity} at '{location}' received unexpected {kind} record")]
    ProtocolViolation {
        entity: EntityKind,
        location: LocationVector,
        kind: RecordKind,
    },

    /// Stream errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Record errors
    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

/// Stream misuse
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream was destroyed by a previous close
    #[error("Stream {0} has been destroyed")]
    Destroyed(StreamId),
}

/// Record access and construction errors
#[derive(Debug, Error)]
pub enum RecordError {
    /// A required tag is absent or consumed
    #[error("Tag {0} is missing")]
    MissingTag(Name),

    /// A required field is absent or consumed
    #[error("Field {0} is missing")]
    MissingField(Name),

    /// An interface could not copy one of its values
    #[error("Interface {interface} failed to copy a value: {reason}")]
    CopyFailed {
        interface: InterfaceId,
        reason: String,
    },

    /// A rename would overwrite a name the record already has
    #[error("Name {0} is already taken")]
    NameTaken(Name),

    /// Emitted values do not fit the declared output variant
    #[error("Emit expected {expected} {what}, got {actual}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors returned by box functions
#[derive(Debug, Error)]
pub enum BoxError {
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("{0}")]
    Failed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),
}

/// Result type using EntityError
pub type Result<T> = std::result::Result<T, EntityError>;

/// Result type using RecordError
pub type RecordResult<T> = std::result::Result<T, RecordError>;
