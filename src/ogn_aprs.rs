use crate::errors::DecodeError;
use crate::ogn::fields::{FEET_TO_METERS, HPM_TO_DEGS};
use crate::ogn::message::{Axis, CommentDecode, DeviceFlags, GpsQuality, Refinement};
use crate::ogn_aprs_aircraft::{AddressType, AircraftType};

/// Bit layout of the flags prefix of an `id` token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdLayout {
    /// `STttttaa`: 2 hex digits
    Flarm,
    /// `STtttt aaaaaa ----`: 4 hex digits
    Naviter,
}

impl IdLayout {
    fn hex_width(self) -> usize {
        match self {
            IdLayout::Flarm => 2,
            IdLayout::Naviter => 4,
        }
    }

    /// Decode the flags carried in the hex prefix of `uid` (the token without `id`)
    pub fn decode(self, uid: &str) -> Result<DeviceFlags, DecodeError> {
        let width = self.hex_width();
        let prefix = uid
            .get(..width)
            .ok_or_else(|| DecodeError::field("device id", uid))?;
        let flags =
            u16::from_str_radix(prefix, 16).map_err(|_| DecodeError::field("device id", uid))?;

        let (stealth, do_not_track, aircraft, address) = match self {
            IdLayout::Flarm => (
                flags & (1 << 7) != 0,
                flags & (1 << 6) != 0,
                (flags >> 2) & 0x0F,
                flags & 0x03,
            ),
            IdLayout::Naviter => (
                flags & (1 << 15) != 0,
                flags & (1 << 14) != 0,
                (flags >> 10) & 0x0F,
                (flags >> 4) & 0x3F,
            ),
        };

        Ok(DeviceFlags {
            uid: uid.to_string(),
            stealth,
            do_not_track,
            aircraft_type: AircraftType::try_from(aircraft as u8)?,
            address_type: AddressType::try_from(address as u8)?,
        })
    }
}

/// Which tokens of the comment grammar a format understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSet {
    /// Refinement, id, climb rate and turn rate only
    Motion,
    /// Everything, including receiver and hardware details
    Full,
}

/// Decode a space separated OGN comment such as
/// `!W12! id06DF0A52 +020fpm +0.0rot 55.2dB 0e -6.2kHz gps4x6`.
///
/// Tokens are matched by prefix/suffix in a fixed order, so `hear` wins over
/// `h` and `dB` over `e`. Unrecognized tokens are skipped; recognized tokens
/// with malformed values fail the whole comment.
pub fn decode_comment(
    comment: &str,
    layout: IdLayout,
    tokens: TokenSet,
) -> Result<CommentDecode, DecodeError> {
    let mut decoded = CommentDecode::default();
    let telemetry = &mut decoded.telemetry;

    for tok in comment.split(' ').filter(|t| !t.is_empty()) {
        if tok.len() > 1 && tok.starts_with('!') && tok.ends_with('!') {
            let (lat, lon) = parse_precision(tok)?;
            decoded.refinements.push(Refinement {
                target: Axis::Latitude,
                digit: lat,
            });
            decoded.refinements.push(Refinement {
                target: Axis::Longitude,
                digit: lon,
            });
        } else if let Some(uid) = tok.strip_prefix("id") {
            telemetry.device = Some(layout.decode(uid)?);
        } else if tok.ends_with("fpm") {
            let fpm: i32 = parse_number_prefix(tok, 3, "vertical speed")?;
            telemetry.vertical_speed = Some(fpm as f64 * FEET_TO_METERS);
        } else if tok.ends_with("rot") {
            let rot: f64 = parse_number_prefix(tok, 3, "turn rate")?;
            telemetry.turn_rate = Some(rot * HPM_TO_DEGS);
        } else if tokens == TokenSet::Motion {
            continue;
        } else if let Some(level) = tok.strip_prefix("FL") {
            telemetry.flight_level = Some(
                level
                    .parse()
                    .map_err(|_| DecodeError::field("flight level", tok))?,
            );
        } else if tok.ends_with("dB") {
            telemetry.signal_to_noise_ratio = Some(parse_number_prefix(tok, 2, "signal")?);
        } else if tok.ends_with('e') {
            telemetry.error_count = Some(parse_number_prefix(tok, 1, "error count")?);
        } else if tok.ends_with("kHz") {
            telemetry.frequency_offset = Some(parse_number_prefix(tok, 3, "frequency offset")?);
        } else if let Some(quality) = tok.strip_prefix("gps") {
            telemetry.gps_quality = Some(parse_gps_quality(quality, tok)?);
        } else if let Some(version) = tok.strip_prefix('s') {
            telemetry.software_version = Some(version.to_string());
        } else if let Some(id) = tok.strip_prefix('r') {
            telemetry.flarm_id = Some(id.to_string());
        } else if tok.ends_with("dBm") {
            telemetry.power_ratio = Some(parse_number_prefix(tok, 3, "power ratio")?);
        } else if let Some(peer) = tok.strip_prefix("hear") {
            telemetry.other_devices.push(peer.to_string());
        } else if let Some(hw) = tok.strip_prefix('h') {
            telemetry.hardware_version = Some(
                u32::from_str_radix(hw, 16)
                    .map_err(|_| DecodeError::field("hardware version", tok))?,
            );
        }
    }

    Ok(decoded)
}

/// `!W52!` -> (5, 2)
fn parse_precision(tok: &str) -> Result<(u8, u8), DecodeError> {
    let bytes = tok.as_bytes();
    if bytes.len() < 5 || !bytes[2].is_ascii_digit() || !bytes[3].is_ascii_digit() {
        return Err(DecodeError::field("position precision", tok));
    }
    Ok((bytes[2] - b'0', bytes[3] - b'0'))
}

/// `4x6` -> horizontal 4, vertical 6
fn parse_gps_quality(quality: &str, tok: &str) -> Result<GpsQuality, DecodeError> {
    let invalid = || DecodeError::field("gps quality", tok);
    let (horizontal, vertical) = quality.split_once('x').ok_or_else(invalid)?;
    Ok(GpsQuality {
        horizontal: horizontal.parse().map_err(|_| invalid())?,
        vertical: vertical.parse().map_err(|_| invalid())?,
    })
}

/// Parse the numeric prefix of a token that ends with a fixed unit of length `unit_len`.
/// e.g. t="-019fpm", unit_len=3 -> returns -19
fn parse_number_prefix<T>(t: &str, unit_len: usize, field: &'static str) -> Result<T, DecodeError>
where
    T: std::str::FromStr,
{
    t.len()
        .checked_sub(unit_len)
        .and_then(|end| t.get(..end))
        .and_then(|num| num.parse::<T>().ok())
        .ok_or_else(|| DecodeError::field(field, t))
}

/* ---------------------- Tests ---------------------- */
