//! OGN/APRS line decoding
//!
//! - Field decoders (timestamps, coordinates, routing)
//! - Shared position header grammar
//! - Format decoders (FLARM, Naviter, Spot, server)
//! - Destination-token registry

pub mod decoders;
pub mod fields;
pub mod header;
pub mod message;
pub mod registry;

// Re-export the main types for convenience
pub use decoders::{
    FlarmDecoder, MessageDecoder, NaviterDecoder, ServerDecoder, SpotDecoder, decode_position,
};
pub use header::{PositionHeader, decode_header};
pub use message::{BeaconType, CommentDecode, DecodedMessage, DeviceFlags, Telemetry};
pub use registry::DecoderRegistry;
