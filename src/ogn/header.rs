//! Shared header decoder for position-style messages.
//!
//! `<origin>><destto>,<path...>:/<HHMMSS><kind><lat><table><lon><symbol><hdg>/<spd>/A=<alt> [<comment>]`

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::errors::DecodeError;
use crate::ogn::fields::{
    Route, parse_altitude, parse_coordinate, parse_heading_speed, parse_route, parse_timestamp,
};
use crate::ogn::message::{BeaconType, DecodedMessage, Telemetry};

/// Separates routing information from position information
pub const POSITION_MARKER: &str = ":/";

/// Position block after the marker. Course/speed is optional on receiver beacons.
static POSITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<time>\d{6})(?P<kind>[hz/])
        (?P<lat>\d{4}\.\d{2}[NS])(?P<table>.)
        (?P<lon>\d{5}\.\d{2}[EW])(?P<symbol>.)
        (?:(?P<heading>\d{3})/(?P<speed>\d{3}))?
        /A=(?P<altitude>-?\d{5,6})
        (?:\s+(?P<comment>.*))?$
    ",
    )
    .expect("position pattern is valid")
});

/// Header fields common to every position message
#[derive(Debug, Clone, PartialEq)]
pub struct PositionHeader<'a> {
    pub origin: &'a str,
    pub route: Route,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub course: Option<(u16, f64)>,
    /// Remaining text, `None` when empty
    pub comment: Option<&'a str>,
}

/// Split `origin>rest` on the first `>`
pub fn split_origin(raw: &str) -> Result<(&str, &str), DecodeError> {
    raw.split_once('>').ok_or(DecodeError::MissingOrigin)
}

pub fn decode_header(raw: &str, now: DateTime<Utc>) -> Result<PositionHeader<'_>, DecodeError> {
    let (origin, body) = split_origin(raw)?;
    let (routing, position) = body
        .split_once(POSITION_MARKER)
        .ok_or(DecodeError::MissingPositionMarker)?;

    let route = parse_route(routing)?;

    let caps = POSITION_RE
        .captures(position)
        .ok_or_else(|| DecodeError::PositionFormat(position.to_string()))?;
    let kind = group(&caps, "kind").chars().next().unwrap_or('h');
    let course = match (caps.name("heading"), caps.name("speed")) {
        (Some(heading), Some(speed)) => parse_heading_speed(heading.as_str(), speed.as_str())?,
        _ => None,
    };
    let comment = caps
        .name("comment")
        .map(|m| m.as_str().trim())
        .filter(|c| !c.is_empty());

    Ok(PositionHeader {
        origin,
        route,
        timestamp: parse_timestamp(group(&caps, "time"), kind, now)?,
        latitude: parse_coordinate(group(&caps, "lat"))?,
        longitude: parse_coordinate(group(&caps, "lon"))?,
        altitude: parse_altitude(group(&caps, "altitude"))?,
        course,
        comment,
    })
}

// Groups read through here are mandatory in the pattern
fn group<'h>(caps: &Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map_or("", |m| m.as_str())
}

impl PositionHeader<'_> {
    /// Build the record for this header; format-specific fields are merged later
    pub fn into_message(self, raw: &str, beacon_type: BeaconType) -> DecodedMessage {
        DecodedMessage {
            origin: self.origin.to_string(),
            destto: self.route.destto,
            path: self.route.path,
            receiver: self.route.receiver,
            relayer: self.route.relayer,
            timestamp: self.timestamp,
            beacon_type,
            latitude: Some(self.latitude),
            longitude: Some(self.longitude),
            altitude: Some(self.altitude),
            heading: self.course.map(|(heading, _)| heading),
            ground_speed: self.course.map(|(_, speed)| speed),
            comment: None,
            telemetry: Telemetry::default(),
            raw: raw.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const MESSAGE: &str =
        "FLRDD83BC>APRS,qAS,EDLF:/163148h5124.56N/00634.42E'276/075/A=001551 id0ADD83BC";

    #[test]
    fn test_decode_header() {
        let header = decode_header(MESSAGE, Utc::now()).unwrap();
        assert_eq!(header.origin, "FLRDD83BC");
        assert_eq!(header.route.destto, "APRS");
        assert_eq!(header.route.receiver, "EDLF");
        assert_eq!(header.route.path, vec!["qAS"]);
        assert_eq!(
            (
                header.timestamp.hour(),
                header.timestamp.minute(),
                header.timestamp.second()
            ),
            (16, 31, 48)
        );
        assert!((header.latitude - 51.40933).abs() < 1e-4);
        assert!((header.longitude - 6.57367).abs() < 1e-4);
        assert!((header.altitude - 472.74).abs() < 0.1);
        assert_eq!(header.course.map(|c| c.0), Some(276));
        assert_eq!(header.comment, Some("id0ADD83BC"));
    }

    #[test]
    fn test_header_without_comment() {
        let raw = "FLRDD83BC>APRS,qAS,EDLF:/163148h5124.56N/00634.42E'000/000/A=001551";
        let header = decode_header(raw, Utc::now()).unwrap();
        assert_eq!(header.course, None);
        assert_eq!(header.comment, None);

        let message = header.into_message(raw, BeaconType::AircraftBeacon);
        assert_eq!(message.heading, None);
        assert_eq!(message.ground_speed, None);
        assert_eq!(message.raw, raw);
    }

    #[test]
    fn test_receiver_beacon_without_course() {
        let raw = "LKHS>APRS,TCPIP*,qAC,GLIDERN2:/211635h4902.45NI01429.51E&/A=001689";
        let header = decode_header(raw, Utc::now()).unwrap();
        assert_eq!(header.course, None);
        assert_eq!(header.route.relayer.as_deref(), Some("TCPIP"));
        assert!((header.altitude - 514.8).abs() < 1.0);
    }

    #[test]
    fn test_header_errors() {
        let now = Utc::now();
        assert_eq!(
            decode_header("no origin here", now),
            Err(DecodeError::MissingOrigin)
        );
        assert_eq!(
            decode_header("FLR123456>APRS,", now),
            Err(DecodeError::MissingPositionMarker)
        );
        assert!(matches!(
            decode_header("FLR1>APRS,qAS:/163148h5124.56N/00634.42E'276/075/A=001551", now),
            Err(DecodeError::HeaderFormat(_))
        ));
        assert!(matches!(
            decode_header("FLR1>APRS,qAS,EDLF:/163148h garbage", now),
            Err(DecodeError::PositionFormat(_))
        ));
    }
}
