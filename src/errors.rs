//! Error types shared by the decoder and the session manager.

use thiserror::Error;

/// Result type for client and dispatch operations
pub type Result<T> = std::result::Result<T, OgnError>;

/// Top-level failures surfaced to callers
#[derive(Error, Debug)]
pub enum OgnError {
    /// Bad credentials, a rejected login status or a greeting that is not a login response
    #[error("login failed: {0}")]
    Login(String),

    /// A line (APRS message or login response) could not be decoded
    #[error("unable to parse {raw:?}: {source}")]
    Parse {
        raw: String,
        #[source]
        source: DecodeError,
    },

    /// No decoder registered for the destination token and no default set
    #[error("no decoder for destination {destto:?}; registered: {registered:?}")]
    DecoderNotFound {
        destto: String,
        registered: Vec<String>,
    },

    /// Transport failure during connect or steady-state reads, including an exhausted retry budget
    #[error("connection error: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl OgnError {
    pub fn parse(raw: impl Into<String>, source: DecodeError) -> Self {
        OgnError::Parse {
            raw: raw.into(),
            source,
        }
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        OgnError::Connection {
            reason: reason.into(),
            source: None,
        }
    }

    pub fn transport(reason: impl Into<String>, source: std::io::Error) -> Self {
        OgnError::Connection {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

/// Field-level decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing '>' after origin")]
    MissingOrigin,

    #[error("missing ':/' position marker")]
    MissingPositionMarker,

    #[error("unknown header format: {0}")]
    HeaderFormat(String),

    #[error("malformed position block: {0}")]
    PositionFormat(String),

    #[error("invalid timestamp: {0}")]
    Timestamp(String),

    #[error("invalid coordinate: {0}")]
    Coordinate(String),

    #[error("invalid {field} value: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("unknown aircraft type {0:#x}")]
    UnknownAircraftType(u8),

    #[error("unknown address type {0:#x}")]
    UnknownAddressType(u8),

    #[error("expected {expected} tokens, found {found}")]
    TokenCount { expected: usize, found: usize },

    #[error("malformed login response: {0}")]
    LoginResponse(String),
}

impl DecodeError {
    pub(crate) fn field(field: &'static str, value: impl Into<String>) -> Self {
        DecodeError::InvalidField {
            field,
            value: value.into(),
        }
    }
}
