//! OGN client library
//!
//! Connects to the Open Glider Network APRS-IS servers, authenticates, keeps
//! the session alive and decodes the received position and status lines into
//! typed records.

pub mod aprs_client;
pub mod client_config;
pub mod clock;
pub mod errors;
pub mod log_format;
pub mod ogn;
pub mod ogn_aprs;
pub mod ogn_aprs_aircraft;
pub mod transport;

pub use aprs_client::{
    AprsClient, AprsClientConfig, AprsClientConfigBuilder, LoginStatus, ReceiveOptions, Received,
    SessionState, ShutdownHandle,
};
pub use clock::{Clock, SystemClock};
pub use errors::{DecodeError, OgnError, Result};
pub use ogn::{BeaconType, DecodedMessage, DecoderRegistry, MessageDecoder};
pub use transport::{TcpTransport, Transport};
