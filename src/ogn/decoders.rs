//! Format-specific decoders.
//!
//! Each format shares the header grammar and differs only in how the
//! trailing comment is read. The server decoder also accepts status lines,
//! which carry no position at all.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::DecodeError;
use crate::ogn::fields::{parse_route, parse_timestamp};
use crate::ogn::header::{POSITION_MARKER, decode_header, split_origin};
use crate::ogn::message::{BeaconType, CommentDecode, DecodedMessage, RelayedBeacon, Telemetry};
use crate::ogn_aprs::{IdLayout, TokenSet, decode_comment};

/// Status lines may also use the APRS status marker
const STATUS_MARKER: &str = ":>";

/// `HHMMSSh free text...`
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<time>\d{6})(?P<kind>[hz/])(?:\s+(?P<comment>.*))?$")
        .expect("status pattern is valid")
});

/// A decoder for one message format
pub trait MessageDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decode the text following the position header
    fn decode_comment(&self, comment: &str) -> Result<CommentDecode, DecodeError>;

    /// Decode a full raw line
    fn decode(&self, raw: &str, now: DateTime<Utc>) -> Result<DecodedMessage, DecodeError> {
        decode_position(self, raw, now, BeaconType::AircraftBeacon)
    }
}

/// Header first, then the decoder's comment grammar, then refinements
pub fn decode_position<D: MessageDecoder + ?Sized>(
    decoder: &D,
    raw: &str,
    now: DateTime<Utc>,
    beacon_type: BeaconType,
) -> Result<DecodedMessage, DecodeError> {
    let header = decode_header(raw, now)?;
    let comment = header.comment;
    let mut message = header.into_message(raw, beacon_type);

    if let Some(comment) = comment {
        message.merge(decoder.decode_comment(comment)?);
    }
    Ok(message)
}

/// OGN-flavoured APRS sent by FLARM devices and OGN trackers
#[derive(Debug, Default, Clone, Copy)]
pub struct FlarmDecoder;

impl MessageDecoder for FlarmDecoder {
    fn name(&self) -> &'static str {
        "flarm"
    }

    fn decode_comment(&self, comment: &str) -> Result<CommentDecode, DecodeError> {
        decode_comment(comment, IdLayout::Flarm, TokenSet::Full)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NaviterDecoder;

impl MessageDecoder for NaviterDecoder {
    fn name(&self) -> &'static str {
        "naviter"
    }

    fn decode_comment(&self, comment: &str) -> Result<CommentDecode, DecodeError> {
        decode_comment(comment, IdLayout::Naviter, TokenSet::Motion)
    }
}

/// Satellite trackers relayed as `id model status`
#[derive(Debug, Default, Clone, Copy)]
pub struct SpotDecoder;

impl MessageDecoder for SpotDecoder {
    fn name(&self) -> &'static str {
        "spot"
    }

    fn decode_comment(&self, comment: &str) -> Result<CommentDecode, DecodeError> {
        let tokens: Vec<&str> = comment.split_whitespace().collect();
        let [id, model, status] = tokens[..] else {
            return Err(DecodeError::TokenCount {
                expected: 3,
                found: tokens.len(),
            });
        };

        Ok(CommentDecode {
            telemetry: Telemetry {
                relayed_beacon: Some(RelayedBeacon {
                    id: id.to_string(),
                    model: model.to_string(),
                    status: status.to_string(),
                }),
                ..Default::default()
            },
            ..Default::default()
        })
    }
}

/// Receivers and servers: position beacons and free-text status reports
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerDecoder;

impl ServerDecoder {
    fn decode_status(
        &self,
        raw: &str,
        origin: &str,
        routing: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<DecodedMessage, DecodeError> {
        let route = parse_route(routing)?;
        let caps = STATUS_RE
            .captures(status)
            .ok_or_else(|| DecodeError::Timestamp(status.to_string()))?;

        let digits = caps.name("time").map_or("", |m| m.as_str());
        let kind = caps
            .name("kind")
            .and_then(|m| m.as_str().chars().next())
            .unwrap_or('h');
        let comment = caps
            .name("comment")
            .map(|m| m.as_str().trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(DecodedMessage {
            origin: origin.to_string(),
            destto: route.destto,
            path: route.path,
            receiver: route.receiver,
            relayer: route.relayer,
            timestamp: parse_timestamp(digits, kind, now)?,
            beacon_type: BeaconType::ServerStatus,
            latitude: None,
            longitude: None,
            altitude: None,
            heading: None,
            ground_speed: None,
            comment,
            telemetry: Telemetry::default(),
            raw: raw.to_string(),
        })
    }
}

impl MessageDecoder for ServerDecoder {
    fn name(&self) -> &'static str {
        "server"
    }

    fn decode_comment(&self, comment: &str) -> Result<CommentDecode, DecodeError> {
        Ok(CommentDecode {
            comment: Some(comment.to_string()),
            ..Default::default()
        })
    }

    fn decode(&self, raw: &str, now: DateTime<Utc>) -> Result<DecodedMessage, DecodeError> {
        let (origin, body) = split_origin(raw)?;
        let marker = body.find(':').ok_or(DecodeError::MissingPositionMarker)?;
        let (routing, rest) = body.split_at(marker);

        if let Some(status) = rest.strip_prefix(STATUS_MARKER) {
            return self.decode_status(raw, origin, routing, status, now);
        }

        let position = rest
            .strip_prefix(POSITION_MARKER)
            .ok_or(DecodeError::MissingPositionMarker)?;
        if STATUS_RE.is_match(position) {
            return self.decode_status(raw, origin, routing, position, now);
        }

        decode_position(self, raw, now, BeaconType::ServerBeacon)
    }
}
