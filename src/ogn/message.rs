use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ogn::fields::refine_coordinate;
use crate::ogn_aprs_aircraft::{AddressType, AircraftType};

/// What kind of station produced the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconType {
    AircraftBeacon,
    ServerBeacon,
    ServerStatus,
}

/// Device identity and flags decoded from the `id` token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceFlags {
    pub uid: String,
    pub stealth: bool,
    pub do_not_track: bool,
    pub aircraft_type: AircraftType,
    pub address_type: AddressType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GpsQuality {
    pub horizontal: u8,
    pub vertical: u8,
}

/// Terse `id model status` triple sent by relayed satellite trackers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayedBeacon {
    pub id: String,
    pub model: String,
    pub status: String,
}

/// Protocol-specific fields produced by a format decoder.
///
/// Every field is optional; decoders fill in what their comment grammar carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Telemetry {
    #[serde(flatten)]
    pub device: Option<DeviceFlags>,
    /// Vertical speed (fpm scaled by the feet-to-meters factor)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_speed: Option<f64>,
    /// Turn rate in degrees per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flight_level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_to_noise_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u32>,
    /// kHz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_quality: Option<GpsQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flarm_id: Option<String>,
    /// dBm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other_devices: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relayed_beacon: Option<RelayedBeacon>,
}

/// Coordinate a refinement applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

/// Extra precision digit for an already decoded coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refinement {
    pub target: Axis,
    pub digit: u8,
}

impl Refinement {
    pub fn apply(&self, existing: f64) -> f64 {
        refine_coordinate(existing, self.digit)
    }
}

/// Output of a comment decoder: the partial record plus pending refinements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentDecode {
    pub telemetry: Telemetry,
    pub refinements: Vec<Refinement>,
    /// Free text for formats that do not structure their comment
    pub comment: Option<String>,
}

/// A fully decoded APRS line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    pub origin: String,
    pub destto: String,
    pub path: Vec<String>,
    pub receiver: String,
    pub relayer: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub beacon_type: BeaconType,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Meters
    pub altitude: Option<f64>,
    pub heading: Option<u16>,
    /// m/s
    pub ground_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub telemetry: Telemetry,
    pub raw: String,
}

impl DecodedMessage {
    /// Merge a comment decode onto this record, consuming its refinements.
    ///
    /// Refinements targeting an absent coordinate are dropped.
    pub fn merge(&mut self, decoded: CommentDecode) {
        for refinement in &decoded.refinements {
            let slot = match refinement.target {
                Axis::Latitude => &mut self.latitude,
                Axis::Longitude => &mut self.longitude,
            };
            if let Some(value) = slot.as_mut() {
                *value = refinement.apply(*value);
            }
        }

        self.telemetry = decoded.telemetry;
        if decoded.comment.is_some() {
            self.comment = decoded.comment;
        }
    }
}
