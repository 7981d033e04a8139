use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::DecodeError;

/// Kind of address carried in the device id.
///
/// FLARM ids only have room for the first four values (2 bits); Naviter ids
/// use a 6-bit field and add `Naviter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Unknown,
    Icao,
    Flarm,
    OgnTracker,
    Naviter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AircraftType {
    Glider,
    TowPlane,
    Helicopter,
    Parachute,
    DropPlane,
    HangGlider,
    Paraglider,
    PoweredAircraft,
    Jet,
    Unknown,
    Balloon,
    Airship,
    Uav,
    StaticObject,
}

impl TryFrom<u8> for AircraftType {
    type Error = DecodeError;

    // 0x0 and 0xE are reserved by the protocol and never assigned
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x1 => Ok(AircraftType::Glider),
            0x2 => Ok(AircraftType::TowPlane),
            0x3 => Ok(AircraftType::Helicopter),
            0x4 => Ok(AircraftType::Parachute),
            0x5 => Ok(AircraftType::DropPlane),
            0x6 => Ok(AircraftType::HangGlider),
            0x7 => Ok(AircraftType::Paraglider),
            0x8 => Ok(AircraftType::PoweredAircraft),
            0x9 => Ok(AircraftType::Jet),
            0xA => Ok(AircraftType::Unknown),
            0xB => Ok(AircraftType::Balloon),
            0xC => Ok(AircraftType::Airship),
            0xD => Ok(AircraftType::Uav),
            0xF => Ok(AircraftType::StaticObject),
            other => Err(DecodeError::UnknownAircraftType(other)),
        }
    }
}

impl TryFrom<u8> for AddressType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(AddressType::Unknown),
            1 => Ok(AddressType::Icao),
            2 => Ok(AddressType::Flarm),
            3 => Ok(AddressType::OgnTracker),
            4 => Ok(AddressType::Naviter),
            other => Err(DecodeError::UnknownAddressType(other)),
        }
    }
}

impl fmt::Display for AircraftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AircraftType::Glider => "glider",
            AircraftType::TowPlane => "tow plane",
            AircraftType::Helicopter => "helicopter",
            AircraftType::Parachute => "parachute",
            AircraftType::DropPlane => "drop plane",
            AircraftType::HangGlider => "hang glider",
            AircraftType::Paraglider => "paraglider",
            AircraftType::PoweredAircraft => "powered aircraft",
            AircraftType::Jet => "jet",
            AircraftType::Unknown => "unknown",
            AircraftType::Balloon => "balloon",
            AircraftType::Airship => "airship",
            AircraftType::Uav => "uav",
            AircraftType::StaticObject => "static object",
        };
        write!(f, "{}", s)
    }
}

/* ---------------------- Tests ---------------------- */
