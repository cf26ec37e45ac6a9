//! EPS and 5GS Non-Access Stratum decoder

use crate::bcd::decode_bcd;
use sigmon_core::{DecodeError, DecodePlugin, Direction, Message, Metadata, PluginInfo, Protocol};
use std::time::Instant;

const EPD_EPS_SM: u8 = 0x02;
const EPD_EPS_MM: u8 = 0x07;
const EPD_5GS_MM: u8 = 0x0F;

/// MAC (4) + sequence number (1) + inner header, skipped when protected
const SECURITY_HEADER_LEN: usize = 7;

const MIN_NAS_LEN: usize = 3;

/// Message types sent by the UE, shared by EMM and 5GMM numbering
const UPLINK_TYPES: [u8; 11] = [0x41, 0x43, 0x45, 0x48, 0x4a, 0x4c, 0x51, 0x53, 0x55, 0x5d, 0x5e];

const IE_GUTI: u8 = 0x50;
const IE_MOBILE_IDENTITY: u8 = 0x52;

/// Decodes plain and integrity-protected NAS messages of one generation
///
/// EPS (4G) and 5GS (5G) are separate instances, each claiming only its
/// own protocol discriminators.
#[derive(Debug, Clone, Copy)]
pub struct NasDecoder {
    generation: Generation,
}

impl NasDecoder {
    /// EPS mobility and session management (EPD 0x07 and 0x02)
    pub fn eps() -> Self {
        Self {
            generation: Generation::Eps,
        }
    }

    /// 5GS mobility management (EPD 0x0F)
    pub fn five_g() -> Self {
        Self {
            generation: Generation::FiveG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Generation {
    Eps,
    FiveG,
}

impl Generation {
    fn owns(&self, epd: u8) -> bool {
        match self {
            Generation::Eps => matches!(epd, EPD_EPS_MM | EPD_EPS_SM),
            Generation::FiveG => epd == EPD_5GS_MM,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Generation::Eps => "4G",
            Generation::FiveG => "5G",
        }
    }

    fn protocol(&self) -> Protocol {
        match self {
            Generation::Eps => Protocol::Nas4g,
            Generation::FiveG => Protocol::Nas5g,
        }
    }

    fn core_node(&self) -> &'static str {
        match self {
            Generation::Eps => "MME",
            Generation::FiveG => "AMF",
        }
    }
}

fn eps_mm_name(message_type: u8) -> Option<&'static str> {
    Some(match message_type {
        0x41 => "AttachRequest",
        0x42 => "AttachAccept",
        0x43 => "AttachComplete",
        0x44 => "AttachReject",
        0x45 => "DetachRequest",
        0x46 => "DetachAccept",
        0x48 => "TrackingAreaUpdateRequest",
        0x49 => "TrackingAreaUpdateAccept",
        0x4a => "TrackingAreaUpdateComplete",
        0x4b => "TrackingAreaUpdateReject",
        0x4c => "ExtendedServiceRequest",
        0x4e => "ServiceReject",
        0x50 => "GUTIReallocationCommand",
        0x51 => "GUTIReallocationComplete",
        0x52 => "AuthenticationRequest",
        0x53 => "AuthenticationResponse",
        0x54 => "AuthenticationReject",
        0x55 => "AuthenticationFailure",
        0x5c => "SecurityModeCommand",
        0x5d => "SecurityModeComplete",
        0x5e => "SecurityModeReject",
        _ => return None,
    })
}

fn fivegs_mm_name(message_type: u8) -> Option<&'static str> {
    Some(match message_type {
        0x41 => "RegistrationRequest",
        0x42 => "RegistrationAccept",
        0x43 => "RegistrationComplete",
        0x44 => "RegistrationReject",
        0x45 => "DeregistrationRequest",
        0x46 => "DeregistrationAccept",
        0x4c => "ServiceRequest",
        0x4d => "ServiceReject",
        0x4e => "ServiceAccept",
        0x54 => "ConfigurationUpdateCommand",
        0x55 => "ConfigurationUpdateComplete",
        0x56 => "AuthenticationRequest",
        0x57 => "AuthenticationResponse",
        0x58 => "AuthenticationReject",
        0x59 => "AuthenticationFailure",
        0x5a => "AuthenticationResult",
        0x5b => "IdentityRequest",
        0x5c => "IdentityResponse",
        0x5d => "SecurityModeCommand",
        0x5e => "SecurityModeComplete",
        0x5f => "SecurityModeReject",
        _ => return None,
    })
}

fn eps_sm_name(message_type: u8) -> Option<&'static str> {
    Some(match message_type {
        0xc1 => "ActivateDefaultEPSBearerContextRequest",
        0xc2 => "ActivateDefaultEPSBearerContextAccept",
        0xc3 => "ActivateDefaultEPSBearerContextReject",
        0xc5 => "ActivateDedicatedEPSBearerContextRequest",
        0xc6 => "ActivateDedicatedEPSBearerContextAccept",
        0xc7 => "ActivateDedicatedEPSBearerContextReject",
        0xcd => "PDNConnectivityRequest",
        0xce => "PDNConnectivityReject",
        0xd0 => "PDNDisconnectRequest",
        0xd1 => "PDNDisconnectReject",
        _ => return None,
    })
}

/// Message name for a discriminator, fallback `Unknown_<hh>`
pub fn message_name(epd: u8, message_type: u8) -> String {
    let name = match epd {
        EPD_EPS_MM => eps_mm_name(message_type),
        EPD_5GS_MM => fivegs_mm_name(message_type),
        EPD_EPS_SM => eps_sm_name(message_type),
        _ => None,
    };
    name.map(str::to_string)
        .unwrap_or_else(|| format!("Unknown_{:02x}", message_type))
}

pub fn ie_name(ie_type: u8) -> String {
    let name = match ie_type {
        IE_GUTI => "GUTI",
        IE_MOBILE_IDENTITY => "MobileIdentity",
        0x53 => "TAI",
        0x58 => "UENetworkCapability",
        0x59 => "ESMMessageContainer",
        0x5a => "NASKeySetIdentifier",
        0x5c => "EMM Cause",
        0x5d => "ESM Cause",
        _ => return format!("IE_{:02x}", ie_type),
    };
    name.to_string()
}

pub fn is_uplink(message_type: u8) -> bool {
    UPLINK_TYPES.contains(&message_type)
}

/// Flat (type, length, value) walk; stops at the first element that overruns
fn parse_ies(data: &[u8]) -> Vec<(u8, &[u8])> {
    let mut ies = Vec::new();
    let mut offset = 0;

    while offset + 2 <= data.len() {
        let ie_type = data[offset];
        let len = usize::from(data[offset + 1]);
        let Some(value) = data.get(offset + 2..offset + 2 + len) else {
            break;
        };
        ies.push((ie_type, value));
        offset += 2 + len;
    }

    ies
}

/// IMSI from a mobile identity value whose type (low 3 bits) is 1
///
/// The first octet carries digit 1 in its high nibble next to the type.
fn imsi_from_identity(value: &[u8]) -> Option<String> {
    let (first, rest) = value.split_first()?;
    if first & 0x07 != 1 {
        return None;
    }
    let mut imsi = String::new();
    if first >> 4 <= 9 {
        imsi.push(char::from(b'0' + (first >> 4)));
    }
    imsi.push_str(&decode_bcd(rest));
    (!imsi.is_empty()).then_some(imsi)
}

impl PluginInfo for NasDecoder {
    fn name(&self) -> &str {
        match self.generation {
            Generation::Eps => "nas4g-decoder",
            Generation::FiveG => "nas5g-decoder",
        }
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        match self.generation {
            Generation::Eps => "EPS (4G) NAS mobility and session management",
            Generation::FiveG => "5GS (5G) NAS mobility management",
        }
    }
}

impl DecodePlugin for NasDecoder {
    fn protocol(&self) -> Protocol {
        self.generation.protocol()
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        payload.len() >= MIN_NAS_LEN && self.generation.owns(payload[0] & 0x0F)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();
        let generation = self.generation;

        if payload.len() < MIN_NAS_LEN {
            return Err(DecodeError::insufficient(
                generation.protocol(),
                MIN_NAS_LEN,
                payload.len(),
            ));
        }

        let epd = payload[0] & 0x0F;
        let security_header = payload[0] >> 4;
        if !generation.owns(epd) {
            return Err(DecodeError::malformed(
                generation.protocol(),
                format!("protocol discriminator {:#04x} is not {} NAS", epd, generation.label()),
            ));
        }

        let mut msg = Message::new(generation.protocol(), payload, metadata);
        msg.detail("security_header_type", security_header);
        msg.detail("generation", generation.label());

        let offset = if security_header != 0 { SECURITY_HEADER_LEN } else { 0 };
        if offset + 2 > payload.len() {
            return Ok(msg.finish(started));
        }

        let message_type = payload[offset + 1];
        msg.message_name = message_name(epd, message_type);
        msg.message_type = format!("NAS_{}_{}", generation.label(), msg.message_name);
        msg.detail("message_type", message_type);

        let core = generation.core_node();
        if is_uplink(message_type) {
            msg.direction = Direction::Request;
            msg.source.element_type = "UE".to_string();
            msg.destination.element_type = core.to_string();
        } else {
            msg.direction = Direction::Response;
            msg.source.element_type = core.to_string();
            msg.destination.element_type = "UE".to_string();
        }

        let mut ies = serde_json::Map::new();
        for (ie_type, value) in parse_ies(&payload[offset + 2..]) {
            match ie_type {
                IE_MOBILE_IDENTITY if msg.imsi.is_none() => msg.imsi = imsi_from_identity(value),
                IE_GUTI => msg.detail("guti", hex::encode(value)),
                _ => {}
            }
            ies.insert(ie_name(ie_type), serde_json::Value::from(hex::encode(value)));
        }
        msg.detail("ies", serde_json::Value::Object(ies));

        Ok(msg.finish(started))
    }
}
