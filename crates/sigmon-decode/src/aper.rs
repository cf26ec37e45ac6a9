//! Header-level decoding for the APER-encoded RAN application parts
//!
//! S1AP and NGAP share one envelope: a PDU choice byte, the procedure code,
//! the criticality and a length determinant, followed by a protocol IE
//! container. [`ApDecoder`] walks that envelope and its top-level IEs; each
//! protocol supplies its tables through an [`ApProfile`].

use crate::nas::NasDecoder;
use sigmon_core::{
    DecodeError, DecodePlugin, Direction, Message, MessageResult, Metadata, PluginInfo, Protocol,
    Transport,
};
use serde_json::{Map, Value};
use std::time::Instant;

/// Choice byte, procedure code, criticality and a one-byte length
pub const MIN_AP_LEN: usize = 4;

/// Top-level PDU choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    InitiatingMessage,
    SuccessfulOutcome,
    UnsuccessfulOutcome,
}

impl PduKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(PduKind::InitiatingMessage),
            0x20 => Some(PduKind::SuccessfulOutcome),
            0x40 => Some(PduKind::UnsuccessfulOutcome),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PduKind::InitiatingMessage => "InitiatingMessage",
            PduKind::SuccessfulOutcome => "SuccessfulOutcome",
            PduKind::UnsuccessfulOutcome => "UnsuccessfulOutcome",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            PduKind::InitiatingMessage => Direction::Request,
            _ => Direction::Response,
        }
    }
}

/// Criticality field name (two aligned bits)
pub fn criticality_name(b: u8) -> &'static str {
    match b >> 6 {
        0 => "reject",
        1 => "ignore",
        _ => "notify",
    }
}

/// Length determinant: `(length, bytes consumed)`; fragmented forms are rejected
pub fn length_determinant(data: &[u8]) -> Option<(usize, usize)> {
    let first = *data.first()?;
    if first & 0x80 == 0 {
        Some((usize::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        let second = *data.get(1)?;
        Some(((usize::from(first & 0x3F) << 8) | usize::from(second), 2))
    } else {
        None
    }
}

/// Parsed envelope; the value must end exactly at the payload end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApPdu<'a> {
    pub kind: PduKind,
    pub procedure_code: u8,
    pub criticality: u8,
    pub value: &'a [u8],
}

impl<'a> ApPdu<'a> {
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < MIN_AP_LEN {
            return None;
        }
        let kind = PduKind::from_byte(data[0])?;
        let criticality = data[2];
        if criticality & 0x3F != 0 || criticality == 0xC0 {
            return None;
        }
        let (len, consumed) = length_determinant(&data[3..])?;
        let start = 3 + consumed;
        if start + len != data.len() {
            return None;
        }
        Some(Self {
            kind,
            procedure_code: data[1],
            criticality,
            value: &data[start..],
        })
    }
}

/// One entry of a protocol IE container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolIe<'a> {
    pub id: u16,
    pub criticality: u8,
    pub value: &'a [u8],
}

/// IEs of the container opening a message value; stops at the first overrun
///
/// Layout: extension preamble byte, 16-bit IE count, then per IE a 16-bit
/// id, a criticality byte, a length determinant and the open-type value.
pub fn parse_protocol_ies(value: &[u8]) -> Vec<ProtocolIe<'_>> {
    let mut ies = Vec::new();
    let Some(count) = value.get(1..3) else {
        return ies;
    };
    let count = usize::from(u16::from_be_bytes([count[0], count[1]]));
    let mut offset = 3;

    for _ in 0..count {
        let Some(header) = value.get(offset..offset + 3) else {
            break;
        };
        let Some((len, consumed)) = length_determinant(&value[offset + 3..]) else {
            break;
        };
        let start = offset + 3 + consumed;
        let Some(data) = value.get(start..start + len) else {
            break;
        };
        ies.push(ProtocolIe {
            id: u16::from_be_bytes([header[0], header[1]]),
            criticality: header[2],
            value: data,
        });
        offset = start + len;
    }

    ies
}

/// Constrained whole number whose byte count sits in the top `length_bits`
pub fn constrained_uint(value: &[u8], length_bits: u8) -> Option<u64> {
    let first = *value.first()?;
    let count = usize::from(first >> (8 - length_bits)) + 1;
    let bytes = value.get(1..1 + count)?;
    Some(bytes.iter().fold(0u64, |n, b| (n << 8) | u64::from(*b)))
}

/// OCTET STRING contents behind a length determinant
pub fn octet_string(value: &[u8]) -> Option<&[u8]> {
    let (len, consumed) = length_determinant(value)?;
    value.get(consumed..consumed + len)
}

/// Cause CHOICE group from the first octet
pub fn cause_group(value: &[u8]) -> Option<(u8, &'static str)> {
    let group = (value.first()? >> 4) & 0x07;
    let name = match group {
        0 => "RadioNetwork",
        1 => "Transport",
        2 => "Nas",
        3 => "Protocol",
        4 => "Misc",
        _ => "Extension",
    };
    Some((group, name))
}

/// Which side opens a procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Ran,
    Core,
    Unknown,
}

/// IE id paired with the width of its length field
#[derive(Debug, Clone, Copy)]
pub struct UeIdField {
    pub ie: u16,
    pub length_bits: u8,
}

/// Protocol tables plugged into [`ApDecoder`]
pub struct ApProfile {
    pub protocol: Protocol,
    pub label: &'static str,
    pub decoder_name: &'static str,
    pub description: &'static str,
    /// Well-known SCTP port of this protocol
    pub sctp_port: u16,
    /// Port of the protocol sharing the same envelope
    pub sibling_port: u16,
    pub ran_node: &'static str,
    pub core_node: &'static str,
    pub procedure_name: fn(u8) -> Option<&'static str>,
    pub initiator: fn(u8) -> Initiator,
    pub ie_name: fn(u16) -> Option<&'static str>,
    pub core_ue_id: UeIdField,
    pub ran_ue_id: UeIdField,
    pub nas_pdu_ie: u16,
    pub cause_ie: u16,
    pub nas: fn() -> NasDecoder,
}

/// Header-level decoder for one APER application part
pub struct ApDecoder {
    profile: &'static ApProfile,
}

impl ApDecoder {
    pub fn with_profile(profile: &'static ApProfile) -> Self {
        Self { profile }
    }

    fn ie_value(&self, ie: &ProtocolIe<'_>) -> Value {
        let p = self.profile;
        let id = ie.id;
        if id == p.core_ue_id.ie {
            if let Some(n) = constrained_uint(ie.value, p.core_ue_id.length_bits) {
                return Value::from(n);
            }
        } else if id == p.ran_ue_id.ie {
            if let Some(n) = constrained_uint(ie.value, p.ran_ue_id.length_bits) {
                return Value::from(n);
            }
        }
        Value::from(hex::encode(ie.value))
    }

    /// Embedded NAS message: name and subscriber identity
    fn embedded_nas(&self, pdu: &[u8], metadata: &Metadata, msg: &mut Message) {
        let Some(nas) = octet_string(pdu) else {
            return;
        };
        msg.detail("nas_pdu", hex::encode(nas));
        if let Ok(inner) = (self.profile.nas)().decode(nas, metadata) {
            if !inner.message_name.is_empty() {
                msg.detail("nas_message", inner.message_name);
            }
            if msg.imsi.is_none() {
                msg.imsi = inner.imsi;
            }
        }
    }
}

impl PluginInfo for ApDecoder {
    fn name(&self) -> &str {
        self.profile.decoder_name
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        self.profile.description
    }
}

impl DecodePlugin for ApDecoder {
    fn protocol(&self) -> Protocol {
        self.profile.protocol
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        ApPdu::parse(payload).is_some()
    }

    /// The envelope alone cannot tell S1AP from NGAP, so well-known ports
    /// decide when present
    fn accepts(&self, payload: &[u8], metadata: &Metadata) -> bool {
        if metadata.transport_proto.is_some_and(|t| t != Transport::Sctp) {
            return false;
        }
        let ports = [metadata.source_port, metadata.dest_port];
        if !ports.contains(&Some(self.profile.sctp_port))
            && ports.contains(&Some(self.profile.sibling_port))
        {
            return false;
        }
        self.can_decode(payload)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();
        let p = self.profile;

        if payload.len() < MIN_AP_LEN {
            return Err(DecodeError::insufficient(p.protocol, MIN_AP_LEN, payload.len()));
        }
        let pdu = ApPdu::parse(payload).ok_or_else(|| {
            DecodeError::malformed(p.protocol, format!("invalid {} PDU header", p.label))
        })?;

        let code = pdu.procedure_code;
        let mut msg = Message::new(p.protocol, payload, metadata);
        msg.message_name = (p.procedure_name)(code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_Procedure_{}", p.label, code));
        msg.message_type = format!("{}_{}", p.label, pdu.kind.label());
        msg.direction = pdu.kind.direction();
        msg.detail("procedure_code", code);
        msg.detail("criticality", criticality_name(pdu.criticality));

        let (initiator, responder) = match (p.initiator)(code) {
            Initiator::Ran => (p.ran_node, p.core_node),
            Initiator::Core => (p.core_node, p.ran_node),
            Initiator::Unknown => ("Unknown", "Unknown"),
        };
        let (source, destination) = match pdu.kind {
            PduKind::InitiatingMessage => (initiator, responder),
            _ => (responder, initiator),
        };
        msg.source.element_type = source.to_string();
        msg.destination.element_type = destination.to_string();

        let mut ies = Map::new();
        let mut cause = None;
        for ie in parse_protocol_ies(pdu.value) {
            if ie.id == p.nas_pdu_ie {
                self.embedded_nas(ie.value, metadata, &mut msg);
            } else if ie.id == p.cause_ie && cause.is_none() {
                cause = cause_group(ie.value);
            }
            let name = (p.ie_name)(ie.id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("IE_{}", ie.id));
            ies.entry(name).or_insert_with(|| self.ie_value(&ie));
        }
        msg.detail("ies", Value::Object(ies));

        match pdu.kind {
            PduKind::SuccessfulOutcome => msg.result = MessageResult::Success,
            PduKind::UnsuccessfulOutcome => match cause {
                Some((group, name)) => msg.fail(i64::from(group), name),
                None => msg.fail(0, "UnsuccessfulOutcome"),
            },
            PduKind::InitiatingMessage => {}
        }

        Ok(msg.finish(started))
    }
}
