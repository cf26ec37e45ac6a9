//! Packet Forwarding Control Protocol decoder (N4/Sxa/Sxb)

use sigmon_core::dictionary::cause_placeholder;
use sigmon_core::{
    DecodeError, DecodePlugin, Dictionary, Direction, Message, MessageResult, Metadata,
    PluginInfo, Protocol, Transport,
};
use serde_json::{json, Map, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

pub const PFCP_UDP_PORT: u16 = 8805;
pub const MIN_PFCP_LEN: usize = 8;
const SEID_HEADER_LEN: usize = 16;

const FLAG_SEID: u8 = 0x01;
/// Version 1 in the top three bits, spare bits clear
const VERSION_MASK: u8 = 0xF8;
const VERSION_1: u8 = 0x20;

const IE_CAUSE: u16 = 19;
const IE_NODE_ID: u16 = 60;
const IE_F_SEID: u16 = 57;

/// Grouped IEs nested deeper than this are rendered as hex
pub const MAX_IE_DEPTH: usize = 8;

/// Message name and whether it is a request
pub fn message(message_type: u8) -> Option<(&'static str, bool)> {
    Some(match message_type {
        1 => ("HeartbeatRequest", true),
        2 => ("HeartbeatResponse", false),
        3 => ("PFDManagementRequest", true),
        4 => ("PFDManagementResponse", false),
        5 => ("AssociationSetupRequest", true),
        6 => ("AssociationSetupResponse", false),
        7 => ("AssociationUpdateRequest", true),
        8 => ("AssociationUpdateResponse", false),
        9 => ("AssociationReleaseRequest", true),
        10 => ("AssociationReleaseResponse", false),
        11 => ("VersionNotSupportedResponse", false),
        12 => ("NodeReportRequest", true),
        13 => ("NodeReportResponse", false),
        14 => ("SessionSetDeletionRequest", true),
        15 => ("SessionSetDeletionResponse", false),
        50 => ("SessionEstablishmentRequest", true),
        51 => ("SessionEstablishmentResponse", false),
        52 => ("SessionModificationRequest", true),
        53 => ("SessionModificationResponse", false),
        54 => ("SessionDeletionRequest", true),
        55 => ("SessionDeletionResponse", false),
        56 => ("SessionReportRequest", true),
        57 => ("SessionReportResponse", false),
        _ => return None,
    })
}

/// (requester, responder) for a procedure
fn roles(message_type: u8) -> (&'static str, &'static str) {
    match message_type {
        50..=55 => ("SMF", "UPF"),
        56 | 57 => ("UPF", "SMF"),
        _ => ("Unknown", "Unknown"),
    }
}

pub fn ie_name(ie_type: u16) -> Option<&'static str> {
    Some(match ie_type {
        1 => "Create-PDR",
        2 => "PDI",
        3 => "Create-FAR",
        4 => "Forwarding-Parameters",
        6 => "Create-URR",
        7 => "Create-QER",
        8 => "Created-PDR",
        9 => "Update-PDR",
        10 => "Update-FAR",
        IE_CAUSE => "Cause",
        20 => "Source-Interface",
        21 => "F-TEID",
        22 => "Network-Instance",
        29 => "Precedence",
        42 => "Destination-Interface",
        44 => "Apply-Action",
        56 => "PDR-ID",
        IE_F_SEID => "F-SEID",
        IE_NODE_ID => "Node-ID",
        81 => "URR-ID",
        93 => "UE-IP-Address",
        96 => "Recovery-Time-Stamp",
        108 => "FAR-ID",
        109 => "QER-ID",
        _ => return None,
    })
}

fn is_grouped(ie_type: u16) -> bool {
    matches!(ie_type, 1..=10)
}

pub fn cause_text(cause: u8) -> Option<&'static str> {
    Some(match cause {
        1 => "Request accepted",
        64 => "Request rejected",
        65 => "Session context not found",
        66 => "Mandatory IE missing",
        67 => "Conditional IE missing",
        68 => "Invalid length",
        69 => "Mandatory IE incorrect",
        70 => "Invalid Forwarding Policy",
        71 => "Invalid F-TEID allocation option",
        72 => "No established PFCP Association",
        73 => "Rule creation/modification Failure",
        74 => "PFCP entity in congestion",
        75 => "No resources available",
        76 => "Service not supported",
        77 => "System failure",
        _ => return None,
    })
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn be_u64(b: &[u8]) -> u64 {
    b[..8].iter().fold(0u64, |n, x| (n << 8) | u64::from(*x))
}

fn ipv4(b: &[u8]) -> String {
    Ipv4Addr::new(b[0], b[1], b[2], b[3]).to_string()
}

/// One parsed information element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcpIe<'a> {
    pub ie_type: u16,
    pub data: &'a [u8],
}

/// Type (2), length (2), value walk; stops at the first overrun
pub fn parse_ies(data: &[u8]) -> Vec<PfcpIe<'_>> {
    let mut ies = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let ie_type = be_u16(&data[offset..]);
        let len = usize::from(be_u16(&data[offset + 2..]));
        let Some(value) = data.get(offset + 4..offset + 4 + len) else {
            break;
        };
        ies.push(PfcpIe {
            ie_type,
            data: value,
        });
        offset += 4 + len;
    }

    ies
}

/// F-SEID: flags, SEID, then IPv4 when the V4 flag is set
fn f_seid(d: &[u8]) -> Option<(u64, Option<String>)> {
    let seid = be_u64(d.get(1..9)?);
    let ip = (d[0] & 0x02 != 0)
        .then(|| d.get(9..13).map(ipv4))
        .flatten();
    Some((seid, ip))
}

/// Node ID: type nibble 0 is IPv4, 2 is an FQDN
fn node_id(d: &[u8]) -> Option<String> {
    let (kind, rest) = d.split_first()?;
    match kind & 0x0F {
        0 if rest.len() >= 4 => Some(ipv4(rest)),
        2 => Some(crate::bcd::decode_labels(rest)),
        _ => None,
    }
}

/// Decodes PFCP node and session messages
pub struct PfcpDecoder {
    dictionary: Arc<Dictionary>,
}

impl PfcpDecoder {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self { dictionary }
    }

    fn cause_text(&self, vendor: &str, cause: u8) -> String {
        self.dictionary
            .lookup_cause(vendor, i64::from(cause))
            .or_else(|| cause_text(cause).map(str::to_string))
            .unwrap_or_else(|| cause_placeholder(i64::from(cause)))
    }

    fn ie_value(&self, ie: &PfcpIe<'_>, depth: usize) -> Value {
        let d = ie.data;
        match ie.ie_type {
            t if is_grouped(t) && depth < MAX_IE_DEPTH => {
                Value::Object(self.ie_map(&parse_ies(d), depth + 1))
            }
            IE_CAUSE if !d.is_empty() => Value::from(d[0]),
            20 | 42 if !d.is_empty() => Value::from(d[0] & 0x0F),
            56 if d.len() >= 2 => Value::from(be_u16(d)),
            29 | 81 | 96 | 108 | 109 if d.len() >= 4 => Value::from(be_u32(d)),
            IE_F_SEID => match f_seid(d) {
                Some((seid, ip)) => json!({ "seid": seid, "ipv4": ip }),
                None => Value::from(hex::encode(d)),
            },
            IE_NODE_ID => node_id(d)
                .map(Value::from)
                .unwrap_or_else(|| Value::from(hex::encode(d))),
            21 if d.len() >= 9 && d[0] & 0x01 != 0 => json!({
                "teid": be_u32(&d[1..5]),
                "ipv4": ipv4(&d[5..9]),
            }),
            93 if d.len() >= 5 && d[0] & 0x02 != 0 => Value::from(ipv4(&d[1..5])),
            _ => Value::from(hex::encode(d)),
        }
    }

    /// Name -> value; the first occurrence wins
    fn ie_map(&self, ies: &[PfcpIe<'_>], depth: usize) -> Map<String, Value> {
        let mut map = Map::new();
        for ie in ies {
            let name = ie_name(ie.ie_type)
                .map(str::to_string)
                .unwrap_or_else(|| format!("IE_{}", ie.ie_type));
            map.entry(name).or_insert_with(|| self.ie_value(ie, depth));
        }
        map
    }
}

impl PluginInfo for PfcpDecoder {
    fn name(&self) -> &str {
        "pfcp-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "PFCP node and session management (N4/Sxa/Sxb)"
    }
}

impl DecodePlugin for PfcpDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Pfcp
    }

    /// Version 1 with clear spare bits, a known message type and an exact length
    fn can_decode(&self, payload: &[u8]) -> bool {
        if payload.len() < MIN_PFCP_LEN || payload[0] & VERSION_MASK != VERSION_1 {
            return false;
        }
        let header = if payload[0] & FLAG_SEID != 0 {
            SEID_HEADER_LEN
        } else {
            MIN_PFCP_LEN
        };
        let total = 4 + usize::from(be_u16(&payload[2..4]));
        message(payload[1]).is_some() && total >= header && total == payload.len()
    }

    fn accepts(&self, payload: &[u8], metadata: &Metadata) -> bool {
        metadata.transport_proto != Some(Transport::Sctp) && self.can_decode(payload)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        if payload.len() < MIN_PFCP_LEN {
            return Err(DecodeError::insufficient(
                Protocol::Pfcp,
                MIN_PFCP_LEN,
                payload.len(),
            ));
        }
        let version = payload[0] >> 5;
        if version != 1 {
            return Err(DecodeError::malformed(
                Protocol::Pfcp,
                format!("unsupported PFCP version {}", version),
            ));
        }

        let flags = payload[0];
        let message_type = payload[1];
        let length = be_u16(&payload[2..4]);
        let vendor = metadata
            .vendor_hint
            .as_deref()
            .unwrap_or_else(|| self.dictionary.default_vendor());

        let mut msg = Message::new(Protocol::Pfcp, payload, metadata);
        msg.detail("version", version);
        msg.detail("flags", flags);
        msg.detail("length", length);

        let header_len = if flags & FLAG_SEID != 0 {
            if payload.len() < SEID_HEADER_LEN {
                return Err(DecodeError::insufficient(
                    Protocol::Pfcp,
                    SEID_HEADER_LEN,
                    payload.len(),
                ));
            }
            let seid = be_u64(&payload[4..12]);
            msg.detail("seid", seid);
            if seid != 0 {
                msg.session_id = Some(format!("{:016x}", seid));
            }
            msg.sequence_num = Some(be_u32(&payload[12..16]) >> 8);
            SEID_HEADER_LEN
        } else {
            msg.sequence_num = Some(be_u32(&payload[4..8]) >> 8);
            MIN_PFCP_LEN
        };

        let known = message(message_type);
        msg.message_name = match known {
            Some((name, _)) => name.to_string(),
            None => format!("Unknown_{}", message_type),
        };
        msg.message_type = format!("PFCP_{}", msg.message_name);

        let (requester, responder) = roles(message_type);
        let (source, destination) = match known {
            Some((_, true)) => {
                msg.direction = Direction::Request;
                (requester, responder)
            }
            Some((_, false)) => {
                msg.direction = Direction::Response;
                (responder, requester)
            }
            None => ("Unknown", "Unknown"),
        };
        msg.source.element_type = source.to_string();
        msg.destination.element_type = destination.to_string();

        let end = (4 + usize::from(length)).min(payload.len());
        let ies = parse_ies(payload.get(header_len..end).unwrap_or_default());

        for ie in &ies {
            match ie.ie_type {
                IE_CAUSE if !ie.data.is_empty() => {
                    let cause = ie.data[0];
                    let text = self.cause_text(vendor, cause);
                    if cause == 1 {
                        msg.result = MessageResult::Success;
                        msg.cause_code = Some(1);
                        msg.cause_text = Some(text);
                    } else {
                        msg.fail(i64::from(cause), text);
                    }
                }
                IE_F_SEID if msg.session_id.is_none() => {
                    if let Some((seid, _)) = f_seid(ie.data) {
                        msg.session_id = Some(format!("{:016x}", seid));
                    }
                }
                _ => {}
            }
        }

        msg.detail("ies", Value::Object(self.ie_map(&ies, 0)));
        Ok(msg.finish(started))
    }
}
