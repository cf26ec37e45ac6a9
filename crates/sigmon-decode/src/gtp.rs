//! GTP control plane decoder (GTPv1-C and GTPv2-C)

use crate::bcd::{decode_bcd, decode_labels, decode_plmn};
use sigmon_core::dictionary::{cause_placeholder, ie_placeholder};
use sigmon_core::{
    DecodeError, DecodePlugin, Dictionary, Direction, Message, MessageResult, Metadata,
    PluginInfo, Protocol,
};
use serde_json::{json, Map, Value};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;

pub const MIN_GTP_LEN: usize = 8;

const V1_FLAG_PT: u8 = 0x10;
const V1_FLAGS_OPTIONAL: u8 = 0x07;
const V1_FLAG_SEQUENCE: u8 = 0x02;
const V2_FLAG_TEID: u8 = 0x08;

/// Bearer contexts nested deeper than this are rendered as hex
pub const MAX_IE_DEPTH: usize = 8;

/// Fixed lengths of GTPv1 TV elements (types below 128)
fn v1_tv_len(ie_type: u8) -> Option<usize> {
    Some(match ie_type {
        1 => 1,   // Cause
        2 => 8,   // IMSI
        3 => 6,   // Routing Area Identity
        14 => 1,  // Recovery
        15 => 1,  // Selection Mode
        16 => 4,  // TEID Data I
        17 => 4,  // TEID Control Plane
        19 => 1,  // Teardown Ind
        20 => 1,  // NSAPI
        26 => 2,  // Charging Characteristics
        127 => 4, // Charging ID
        _ => return None,
    })
}

fn v1_ie_name(ie_type: u8) -> Option<&'static str> {
    Some(match ie_type {
        1 => "Cause",
        2 => "IMSI",
        3 => "RAI",
        14 => "Recovery",
        15 => "SelectionMode",
        16 => "TEID-Data-I",
        17 => "TEID-Control-Plane",
        19 => "TeardownInd",
        20 => "NSAPI",
        26 => "ChargingCharacteristics",
        127 => "ChargingID",
        128 => "EndUserAddress",
        131 => "APN",
        132 => "PCO",
        133 => "GSN-Address",
        134 => "MSISDN",
        135 => "QoS-Profile",
        _ => return None,
    })
}

fn v2_ie_name(ie_type: u8) -> Option<&'static str> {
    Some(match ie_type {
        1 => "IMSI",
        2 => "Cause",
        3 => "Recovery",
        71 => "APN",
        72 => "AMBR",
        73 => "EBI",
        74 => "IP-Address",
        75 => "MEI",
        76 => "MSISDN",
        77 => "Indication",
        78 => "PCO",
        79 => "PAA",
        80 => "Bearer-QoS",
        82 => "RAT-Type",
        83 => "Serving-Network",
        86 => "ULI",
        87 => "F-TEID",
        93 => "Bearer-Context",
        99 => "PDN-Type",
        127 => "APN-Restriction",
        128 => "Selection-Mode",
        _ => return None,
    })
}

/// Message name and whether it is a request
fn v1_message(message_type: u8) -> Option<(&'static str, bool)> {
    Some(match message_type {
        1 => ("EchoRequest", true),
        2 => ("EchoResponse", false),
        16 => ("CreatePDPContextRequest", true),
        17 => ("CreatePDPContextResponse", false),
        18 => ("UpdatePDPContextRequest", true),
        19 => ("UpdatePDPContextResponse", false),
        20 => ("DeletePDPContextRequest", true),
        21 => ("DeletePDPContextResponse", false),
        27 => ("PDUNotificationRequest", true),
        28 => ("PDUNotificationResponse", false),
        _ => return None,
    })
}

fn v2_message(message_type: u8) -> Option<(&'static str, bool)> {
    Some(match message_type {
        1 => ("EchoRequest", true),
        2 => ("EchoResponse", false),
        32 => ("CreateSessionRequest", true),
        33 => ("CreateSessionResponse", false),
        34 => ("ModifyBearerRequest", true),
        35 => ("ModifyBearerResponse", false),
        36 => ("DeleteSessionRequest", true),
        37 => ("DeleteSessionResponse", false),
        95 => ("CreateBearerRequest", true),
        96 => ("CreateBearerResponse", false),
        97 => ("UpdateBearerRequest", true),
        98 => ("UpdateBearerResponse", false),
        99 => ("DeleteBearerRequest", true),
        100 => ("DeleteBearerResponse", false),
        170 => ("ReleaseAccessBearersRequest", true),
        171 => ("ReleaseAccessBearersResponse", false),
        176 => ("DownlinkDataNotification", true),
        177 => ("DownlinkDataNotificationAcknowledge", false),
        _ => return None,
    })
}

/// (requester, responder) for a procedure
fn roles(version: u8, message_type: u8) -> (&'static str, &'static str) {
    match (version, message_type) {
        (1, 16..=21) => ("SGSN", "GGSN"),
        (2, 32..=37) | (2, 170..=171) => ("MME", "SGW"),
        (2, 95..=100) | (2, 176..=177) => ("SGW", "MME"),
        _ => ("Unknown", "Unknown"),
    }
}

fn v1_cause_text(cause: u8) -> Option<&'static str> {
    Some(match cause {
        128 => "Request Accepted",
        192 => "Non-existent",
        193 => "Invalid Message Format",
        194 => "IMSI Not Known",
        195 => "MS is GPRS Detached",
        199 => "No Resources Available",
        201 => "Missing or Unknown APN",
        _ => return None,
    })
}

fn v2_cause_text(cause: u8) -> Option<&'static str> {
    Some(match cause {
        16 => "Request Accepted",
        17 => "Request Accepted Partially",
        64 => "Context Not Found",
        65 => "Invalid Message Format",
        66 => "Version Not Supported",
        67 => "Invalid Length",
        69 => "Mandatory IE Incorrect",
        70 => "Mandatory IE Missing",
        72 => "System Failure",
        73 => "No Resources Available",
        78 => "Missing or Unknown APN",
        _ => return None,
    })
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// One parsed information element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationElement<'a> {
    pub ie_type: u8,
    pub instance: u8,
    pub data: &'a [u8],
}

/// GTPv1 walk: TV elements below 128, TLV with a 2-byte length above
pub fn parse_v1_ies(data: &[u8]) -> Vec<InformationElement<'_>> {
    let mut ies = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let ie_type = data[offset];
        let (start, len) = if ie_type < 128 {
            match v1_tv_len(ie_type) {
                Some(len) => (offset + 1, len),
                None => break,
            }
        } else {
            match data.get(offset + 1..offset + 3) {
                Some(l) => (offset + 3, usize::from(be_u16(l))),
                None => break,
            }
        };
        let Some(value) = data.get(start..start + len) else {
            break;
        };
        ies.push(InformationElement {
            ie_type,
            instance: 0,
            data: value,
        });
        offset = start + len;
    }

    ies
}

/// GTPv2 walk: type, 2-byte length, instance, value
pub fn parse_v2_ies(data: &[u8]) -> Vec<InformationElement<'_>> {
    let mut ies = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let ie_type = data[offset];
        let len = usize::from(be_u16(&data[offset + 1..offset + 3]));
        let instance = data[offset + 3] & 0x0F;
        let Some(value) = data.get(offset + 4..offset + 4 + len) else {
            break;
        };
        ies.push(InformationElement {
            ie_type,
            instance,
            data: value,
        });
        offset += 4 + len;
    }

    ies
}

/// MSISDN octets carry a TON/NPI byte ahead of the digits
fn decode_msisdn(data: &[u8]) -> Option<String> {
    let digits = decode_bcd(data.get(1..)?);
    (!digits.is_empty()).then_some(digits)
}

/// Decodes one GTP-C version using the shared vendor dictionary for IE names
///
/// GTPv1-C and GTPv2-C are separate instances so every message carries the
/// protocol its decoder reports.
pub struct GtpDecoder {
    version: u8,
    dictionary: Arc<Dictionary>,
}

impl GtpDecoder {
    /// GTPv1-C (Gn/Gp)
    pub fn v1(dictionary: Arc<Dictionary>) -> Self {
        Self {
            version: 1,
            dictionary,
        }
    }

    /// GTPv2-C (S11/S5/S8)
    pub fn v2(dictionary: Arc<Dictionary>) -> Self {
        Self {
            version: 2,
            dictionary,
        }
    }

    pub fn gtp_version(&self) -> u8 {
        self.version
    }

    fn ie_name(&self, vendor: &str, version: u8, ie: &InformationElement<'_>) -> String {
        let builtin = if version == 1 {
            v1_ie_name(ie.ie_type)
        } else {
            v2_ie_name(ie.ie_type)
        };
        let name = self
            .dictionary
            .lookup_ie(vendor, ie.ie_type)
            .or_else(|| builtin.map(str::to_string))
            .unwrap_or_else(|| ie_placeholder(ie.ie_type));
        if ie.instance == 0 {
            name
        } else {
            format!("{}#{}", name, ie.instance)
        }
    }

    fn cause_text(&self, vendor: &str, version: u8, cause: u8) -> String {
        let builtin = if version == 1 {
            v1_cause_text(cause)
        } else {
            v2_cause_text(cause)
        };
        self.dictionary
            .lookup_cause(vendor, i64::from(cause))
            .or_else(|| builtin.map(str::to_string))
            .unwrap_or_else(|| cause_placeholder(i64::from(cause)))
    }

    fn v1_value(ie: &InformationElement<'_>) -> Value {
        let d = ie.data;
        match ie.ie_type {
            1 | 14 | 15 | 19 | 20 => Value::from(d[0]),
            2 => Value::from(decode_bcd(d)),
            16 | 17 | 127 => Value::from(be_u32(d)),
            131 => Value::from(decode_labels(d)),
            133 if d.len() == 4 => Value::from(Ipv4Addr::new(d[0], d[1], d[2], d[3]).to_string()),
            134 => decode_msisdn(d).map(Value::from).unwrap_or(Value::Null),
            _ => Value::from(hex::encode(d)),
        }
    }

    fn v2_value(&self, vendor: &str, ie: &InformationElement<'_>, depth: usize) -> Value {
        let d = ie.data;
        match ie.ie_type {
            1 => Value::from(decode_bcd(d)),
            2 | 3 if !d.is_empty() => Value::from(d[0]),
            73 if !d.is_empty() => Value::from(d[0] & 0x0F),
            71 => Value::from(decode_labels(d)),
            72 if d.len() >= 8 => json!({
                "uplink_kbps": be_u32(&d[0..4]),
                "downlink_kbps": be_u32(&d[4..8]),
            }),
            76 => Value::from(decode_bcd(d)),
            83 => decode_plmn(d).map(Value::from).unwrap_or(Value::Null),
            87 if d.len() >= 9 => json!({
                "interface_type": d[0] & 0x3F,
                "teid": be_u32(&d[1..5]),
                "ipv4": Ipv4Addr::new(d[5], d[6], d[7], d[8]).to_string(),
            }),
            93 if depth >= MAX_IE_DEPTH => Value::from(hex::encode(d)),
            93 => Value::Object(self.ie_map(vendor, 2, &parse_v2_ies(d), depth + 1)),
            _ => Value::from(hex::encode(d)),
        }
    }

    /// Name -> value; the first occurrence wins
    fn ie_map(
        &self,
        vendor: &str,
        version: u8,
        ies: &[InformationElement<'_>],
        depth: usize,
    ) -> Map<String, Value> {
        let mut map = Map::new();
        for ie in ies {
            map.entry(self.ie_name(vendor, version, ie)).or_insert_with(|| {
                if version == 1 {
                    Self::v1_value(ie)
                } else {
                    self.v2_value(vendor, ie, depth)
                }
            });
        }
        map
    }

    fn decode_v1(&self, payload: &[u8], vendor: &str, msg: &mut Message) -> u8 {
        let flags = payload[0];
        let message_type = payload[1];
        let length = be_u16(&payload[2..4]);

        msg.teid = Some(be_u32(&payload[4..8]));
        msg.detail("version", 1);
        msg.detail("flags", flags);
        msg.detail("length", length);

        let mut header_len = MIN_GTP_LEN;
        if flags & V1_FLAGS_OPTIONAL != 0 && payload.len() >= 12 {
            if flags & V1_FLAG_SEQUENCE != 0 {
                msg.sequence_num = Some(u32::from(be_u16(&payload[8..10])));
            }
            header_len = 12;
        }

        let end = (MIN_GTP_LEN + usize::from(length)).min(payload.len());
        let ies = parse_v1_ies(payload.get(header_len..end).unwrap_or_default());

        for ie in &ies {
            match ie.ie_type {
                1 => {
                    let cause = ie.data[0];
                    let text = self.cause_text(vendor, 1, cause);
                    if (128..=191).contains(&cause) {
                        msg.result = MessageResult::Success;
                        msg.cause_code = Some(i64::from(cause));
                        msg.cause_text = Some(text);
                    } else if cause >= 192 {
                        msg.fail(i64::from(cause), text);
                    }
                }
                2 => msg.imsi = Some(decode_bcd(ie.data)),
                3 => msg.plmn = decode_plmn(ie.data),
                131 => msg.apn = Some(decode_labels(ie.data)),
                134 => msg.msisdn = decode_msisdn(ie.data),
                _ => {}
            }
        }

        msg.detail("ies", Value::Object(self.ie_map(vendor, 1, &ies, 0)));
        message_type
    }

    fn decode_v2(&self, payload: &[u8], vendor: &str, msg: &mut Message) -> u8 {
        let flags = payload[0];
        let message_type = payload[1];
        let length = be_u16(&payload[2..4]);

        msg.detail("version", 2);
        msg.detail("flags", flags);
        msg.detail("length", length);

        let header_len = if flags & V2_FLAG_TEID != 0 {
            if payload.len() >= 12 {
                msg.teid = Some(be_u32(&payload[4..8]));
                msg.sequence_num = Some(be_u32(&payload[8..12]) >> 8);
            }
            12
        } else {
            msg.sequence_num = Some(be_u32(&payload[4..8]) >> 8);
            MIN_GTP_LEN
        };

        let end = (4 + usize::from(length)).min(payload.len());
        let ies = parse_v2_ies(payload.get(header_len..end).unwrap_or_default());

        for ie in ies.iter().filter(|ie| ie.instance == 0) {
            match ie.ie_type {
                1 => msg.imsi = Some(decode_bcd(ie.data)),
                2 if !ie.data.is_empty() => {
                    let cause = ie.data[0];
                    let text = self.cause_text(vendor, 2, cause);
                    if (16..=63).contains(&cause) {
                        msg.result = MessageResult::Success;
                        msg.cause_code = Some(i64::from(cause));
                        msg.cause_text = Some(text);
                    } else if cause >= 64 {
                        msg.fail(i64::from(cause), text);
                    }
                }
                71 => msg.apn = Some(decode_labels(ie.data)),
                76 => msg.msisdn = Some(decode_bcd(ie.data)),
                83 => msg.plmn = decode_plmn(ie.data),
                _ => {}
            }
        }

        msg.detail("ies", Value::Object(self.ie_map(vendor, 2, &ies, 0)));
        message_type
    }
}

impl PluginInfo for GtpDecoder {
    fn name(&self) -> &str {
        if self.version == 1 {
            "gtpv1-decoder"
        } else {
            "gtpv2-decoder"
        }
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        if self.version == 1 {
            "GTPv1-C control plane (Gn/Gp)"
        } else {
            "GTPv2-C control plane (S11/S5/S8)"
        }
    }
}

impl DecodePlugin for GtpDecoder {
    fn protocol(&self) -> Protocol {
        if self.version == 1 {
            Protocol::GtpV1C
        } else {
            Protocol::GtpV2C
        }
    }

    /// This decoder's version (v1 also needs the protocol-type bit) and a
    /// length that fits
    fn can_decode(&self, payload: &[u8]) -> bool {
        if payload.len() < MIN_GTP_LEN || payload[0] >> 5 != self.version {
            return false;
        }
        let length = usize::from(be_u16(&payload[2..4]));
        match self.version {
            1 => payload[0] & V1_FLAG_PT != 0 && MIN_GTP_LEN + length <= payload.len(),
            _ => 4 + length <= payload.len(),
        }
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        let protocol = self.protocol();
        if payload.len() < MIN_GTP_LEN {
            return Err(DecodeError::insufficient(protocol, MIN_GTP_LEN, payload.len()));
        }

        let version = payload[0] >> 5;
        if version != self.version {
            return Err(DecodeError::malformed(
                protocol,
                format!("GTP version {} on a GTPv{} decoder", version, self.version),
            ));
        }

        let vendor = metadata
            .vendor_hint
            .as_deref()
            .unwrap_or_else(|| self.dictionary.default_vendor());

        let mut msg = Message::new(protocol, payload, metadata);
        let message_type = if version == 1 {
            self.decode_v1(payload, vendor, &mut msg)
        } else {
            self.decode_v2(payload, vendor, &mut msg)
        };

        let known = if version == 1 {
            v1_message(message_type)
        } else {
            v2_message(message_type)
        };
        msg.message_name = match known {
            Some((name, _)) => name.to_string(),
            None => format!("Unknown_{}", message_type),
        };
        msg.message_type = format!("GTPv{}_{}", version, msg.message_name);

        let (requester, responder) = roles(version, message_type);
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

        Ok(msg.finish(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigmon_core::dictionary::{IeDefinition, VendorDictionary};

    fn v2_ie(ie_type: u8, instance: u8, data: &[u8]) -> Vec<u8> {
        let mut out = vec![ie_type];
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        out.push(instance);
        out.extend_from_slice(data);
        out
    }

    fn v2_packet(message_type: u8, teid: Option<u32>, ies: &[Vec<u8>]) -> Vec<u8> {
        let body = ies.concat();
        let mut out = vec![if teid.is_some() { 0x48 } else { 0x40 }, message_type];
        let header_rest = if teid.is_some() { 8 } else { 4 };
        out.extend_from_slice(&((header_rest + body.len()) as u16).to_be_bytes());
        if let Some(teid) = teid {
            out.extend_from_slice(&teid.to_be_bytes());
        }
        out.extend_from_slice(&[0x00, 0x01, 0x02, 0x00]);
        out.extend_from_slice(&body);
        out
    }

    fn v1_packet(message_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0x32, message_type];
        out.extend_from_slice(&((4 + body.len()) as u16).to_be_bytes());
        out.extend_from_slice(&0xdead_beefu32.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x2a, 0x00, 0x00]);
        out.extend_from_slice(body);
        out
    }

    fn v1_decoder() -> GtpDecoder {
        GtpDecoder::v1(Arc::new(Dictionary::empty()))
    }

    fn v2_decoder() -> GtpDecoder {
        GtpDecoder::v2(Arc::new(Dictionary::empty()))
    }

    /// Decode with the decoder matching the header version
    fn decode(data: &[u8]) -> Message {
        let decoder = if data[0] >> 5 == 1 {
            v1_decoder()
        } else {
            v2_decoder()
        };
        let msg = decoder.decode(data, &Metadata::default()).unwrap();
        assert_eq!(msg.protocol, decoder.protocol());
        msg
    }

    const IMSI: [u8; 8] = [0x13, 0x00, 0x14, 0x00, 0x00, 0x21, 0x43, 0xF5];

    #[test]
    fn test_create_session_request() {
        let data = v2_packet(
            32,
            Some(0),
            &[
                v2_ie(1, 0, &IMSI),
                v2_ie(76, 0, &[0x41, 0x51, 0x55, 0x05, 0x10, 0xF0]),
                v2_ie(71, 0, b"\x08internet\x03mnc\x03410"),
                v2_ie(83, 0, &[0x13, 0x00, 0x14]),
                v2_ie(87, 0, &[0x8a, 0x00, 0x00, 0x10, 0x01, 10, 0, 0, 1]),
                v2_ie(87, 1, &[0x87, 0x00, 0x00, 0x20, 0x02, 10, 0, 0, 2]),
            ],
        );
        let msg = decode(&data);

        assert_eq!(msg.protocol, Protocol::GtpV2C);
        assert_eq!(msg.message_name, "CreateSessionRequest");
        assert_eq!(msg.message_type, "GTPv2_CreateSessionRequest");
        assert_eq!(msg.direction, Direction::Request);
        assert_eq!(msg.source.element_type, "MME");
        assert_eq!(msg.destination.element_type, "SGW");
        assert_eq!(msg.teid, Some(0));
        assert_eq!(msg.sequence_num, Some(0x000102));
        assert_eq!(msg.imsi.as_deref(), Some("310041000012345"));
        assert_eq!(msg.msisdn.as_deref(), Some("14155550010"));
        assert_eq!(msg.apn.as_deref(), Some("internet.mnc.410"));
        assert_eq!(msg.plmn.as_deref(), Some("310-410"));

        let ies = &msg.details["ies"];
        assert_eq!(ies["F-TEID"]["teid"], 0x1001);
        assert_eq!(ies["F-TEID"]["ipv4"], "10.0.0.1");
        assert_eq!(ies["F-TEID#1"]["interface_type"], 7);
    }

    #[test]
    fn test_create_session_response_causes() {
        let ok = decode(&v2_packet(33, Some(0x1001), &[v2_ie(2, 0, &[16, 0])]));
        assert_eq!(ok.direction, Direction::Response);
        assert_eq!(ok.source.element_type, "SGW");
        assert_eq!(ok.result, MessageResult::Success);
        assert_eq!(ok.cause_code, Some(16));

        let failed = decode(&v2_packet(33, Some(0x1001), &[v2_ie(2, 0, &[64, 0])]));
        assert_eq!(failed.result, MessageResult::Failure);
        assert_eq!(failed.cause_text.as_deref(), Some("Context Not Found"));

        let unknown = decode(&v2_packet(33, Some(0x1001), &[v2_ie(2, 0, &[120, 0])]));
        assert_eq!(unknown.cause_text.as_deref(), Some("Cause_120"));
    }

    #[test]
    fn test_bearer_context_is_nested() {
        let inner = [v2_ie(73, 0, &[0x05]), v2_ie(2, 0, &[16, 0])].concat();
        let msg = decode(&v2_packet(34, Some(7), &[v2_ie(93, 0, &inner)]));
        assert_eq!(msg.details["ies"]["Bearer-Context"]["EBI"], 5);
        // Nested cause does not drive the result
        assert_eq!(msg.result, MessageResult::Unknown);
    }

    #[test]
    fn test_deeply_nested_bearer_contexts_stop_at_depth_limit() {
        let mut context = v2_ie(73, 0, &[0x05]);
        for _ in 0..16000 {
            context = v2_ie(93, 0, &context);
        }
        let data = v2_packet(32, None, &[context]);
        assert!(v2_decoder().can_decode(&data));

        let msg = decode(&data);
        let mut value = &msg.details["ies"]["Bearer-Context"];
        for _ in 0..MAX_IE_DEPTH {
            value = &value["Bearer-Context"];
        }
        assert!(value.is_string());
    }

    #[test]
    fn test_v2_without_teid() {
        let msg = decode(&v2_packet(1, None, &[v2_ie(3, 0, &[9])]));
        assert_eq!(msg.message_name, "EchoRequest");
        assert_eq!(msg.teid, None);
        assert_eq!(msg.details["ies"]["Recovery"], 9);
    }

    #[test]
    fn test_v1_create_pdp_context() {
        let mut body = vec![0x02];
        body.extend_from_slice(&IMSI);
        body.extend_from_slice(&[0x0e, 0x03]);
        body.extend_from_slice(&[0x10, 0x00, 0x00, 0x00, 0x99]);
        body.extend_from_slice(&[131, 0x00, 0x04, 0x03, b'i', b'm', b's']);
        body.extend_from_slice(&[134, 0x00, 0x03, 0x91, 0x21, 0xF3]);
        let msg = decode(&v1_packet(16, &body));

        assert_eq!(msg.protocol, Protocol::GtpV1C);
        assert_eq!(msg.message_name, "CreatePDPContextRequest");
        assert_eq!(msg.direction, Direction::Request);
        assert_eq!(msg.source.element_type, "SGSN");
        assert_eq!(msg.destination.element_type, "GGSN");
        assert_eq!(msg.teid, Some(0xdead_beef));
        assert_eq!(msg.sequence_num, Some(42));
        assert_eq!(msg.imsi.as_deref(), Some("310041000012345"));
        assert_eq!(msg.apn.as_deref(), Some("ims"));
        assert_eq!(msg.msisdn.as_deref(), Some("123"));
        assert_eq!(msg.details["ies"]["TEID-Data-I"], 0x99);
    }

    #[test]
    fn test_v1_cause() {
        let ok = decode(&v1_packet(17, &[0x01, 128]));
        assert_eq!(ok.result, MessageResult::Success);
        assert_eq!(ok.source.element_type, "GGSN");

        let failed = decode(&v1_packet(17, &[0x01, 194]));
        assert_eq!(failed.result, MessageResult::Failure);
        assert_eq!(failed.cause_text.as_deref(), Some("IMSI Not Known"));
    }

    #[test]
    fn test_v1_unknown_tv_stops_walk() {
        let msg = decode(&v1_packet(16, &[0x01, 128, 0x55, 0x01, 0x02]));
        assert_eq!(msg.details["ies"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_message_type() {
        let msg = decode(&v2_packet(250, Some(1), &[]));
        assert_eq!(msg.message_name, "Unknown_250");
        assert_eq!(msg.message_type, "GTPv2_Unknown_250");
        assert_eq!(msg.direction, Direction::Unknown);
    }

    #[test]
    fn test_can_decode_is_per_version() {
        let v1 = v1_decoder();
        let v2 = v2_decoder();
        assert!(v2.can_decode(&v2_packet(32, Some(0), &[])));
        assert!(!v2.can_decode(&v1_packet(16, &[])));
        assert!(v1.can_decode(&v1_packet(16, &[])));
        assert!(!v1.can_decode(&v2_packet(32, Some(0), &[])));
        // GTP' and PFCP share version 1 but lack the protocol-type bit
        assert!(!v1.can_decode(&[0x20, 1, 0x00, 0x00, 0, 0, 0, 0]));

        for d in [&v1, &v2] {
            // Diameter, TCAP and protected NAS first bytes
            assert!(!d.can_decode(&[0x01, 0, 0, 20, 0x80, 0, 1, 0x18]));
            assert!(!d.can_decode(&[0x62, 0x30, 0x6c, 0x2e, 0xa1, 0x2c, 0x02, 0x01]));
            assert!(!d.can_decode(&[0x27, 0xaa, 0xbb, 0xcc, 0xdd, 0x05, 0x07, 0x41]));
            assert!(!d.can_decode(&[0x48, 32]));
        }
        // Declared length beyond the payload
        assert!(!v2.can_decode(&[0x48, 32, 0x00, 0x40, 0, 0, 0, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn test_names_and_protocols() {
        assert_eq!(v1_decoder().name(), "gtpv1-decoder");
        assert_eq!(v1_decoder().protocol(), Protocol::GtpV1C);
        assert_eq!(v2_decoder().name(), "gtpv2-decoder");
        assert_eq!(v2_decoder().protocol(), Protocol::GtpV2C);
    }

    #[test]
    fn test_foreign_version_is_malformed() {
        let err = v2_decoder()
            .decode(&[0x60, 1, 0, 0, 0, 0, 0, 0], &Metadata::default())
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));

        let err = v2_decoder()
            .decode(&v1_packet(16, &[]), &Metadata::default())
            .unwrap_err();
        assert_eq!(err.protocol(), Some(Protocol::GtpV2C));

        let err = v1_decoder()
            .decode(&v2_packet(1, None, &[]), &Metadata::default())
            .unwrap_err();
        assert_eq!(err.protocol(), Some(Protocol::GtpV1C));
    }

    #[test]
    fn test_vendor_ie_names() {
        let dictionary = Arc::new(Dictionary::empty());
        let mut vendor = VendorDictionary::new("acme");
        vendor.gtp_ies.insert(
            200,
            IeDefinition {
                ie_type: 200,
                name: "Acme-Charging-Rule".to_string(),
                description: String::new(),
            },
        );
        dictionary.insert(vendor);

        let decoder = GtpDecoder::v2(dictionary);
        let data = v2_packet(32, Some(0), &[v2_ie(200, 0, &[1, 2])]);
        let metadata = Metadata {
            vendor_hint: Some("acme".to_string()),
            ..Default::default()
        };
        let msg = decoder.decode(&data, &metadata).unwrap();
        assert_eq!(msg.details["ies"]["Acme-Charging-Rule"], "0102");

        let msg = decoder.decode(&data, &Metadata::default()).unwrap();
        assert_eq!(msg.details["ies"]["IE_200"], "0102");
    }
}
