//! Diameter decoder (base protocol, S6a, Gx, Gy and related applications)
//!
//! AVP names come from the vendor dictionary selected by the packet's
//! vendor hint (or the default vendor), then from the built-in table.

use crate::bcd::{decode_bcd, decode_plmn};
use sigmon_core::dictionary::avp_placeholder;
use sigmon_core::{
    DecodeError, DecodePlugin, Dictionary, Direction, Message, MessageResult, Metadata,
    PluginInfo, Protocol,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;

pub const HEADER_LEN: usize = 20;

const FLAG_REQUEST: u8 = 0x80;
const AVP_FLAG_VENDOR: u8 = 0x80;

/// Grouped AVPs nested deeper than this are rendered as hex
pub const MAX_GROUP_DEPTH: usize = 8;

pub const APP_S6A: u32 = 16_777_251;
pub const APP_S13: u32 = 16_777_252;
pub const APP_SH: u32 = 16_777_217;
pub const APP_GX: u32 = 16_777_238;
pub const APP_GY: u32 = 4;
pub const APP_S6T: u32 = 16_777_345;

const AVP_USER_NAME: u32 = 1;
const AVP_CALLED_STATION_ID: u32 = 30;
const AVP_SESSION_ID: u32 = 263;
const AVP_RESULT_CODE: u32 = 268;
const AVP_EXPERIMENTAL_RESULT: u32 = 297;
const AVP_EXPERIMENTAL_RESULT_CODE: u32 = 298;
const AVP_SUBSCRIPTION_ID: u32 = 443;
const AVP_SUBSCRIPTION_ID_DATA: u32 = 444;
const AVP_SUBSCRIPTION_ID_TYPE: u32 = 450;
const AVP_MSISDN: u32 = 701;
const AVP_VISITED_PLMN_ID: u32 = 1407;

/// Subscription-Id-Type values
const END_USER_E164: u32 = 0;
const END_USER_IMSI: u32 = 1;

/// Fixed part of a Diameter message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiameterHeader {
    pub version: u8,
    pub length: usize,
    pub flags: u8,
    pub command_code: u32,
    pub application_id: u32,
    pub hop_by_hop_id: u32,
    pub end_to_end_id: u32,
}

impl DiameterHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            version: data[0],
            length: (be_u32(&data[0..4]) & 0x00FF_FFFF) as usize,
            flags: data[4],
            command_code: be_u32(&data[4..8]) & 0x00FF_FFFF,
            application_id: be_u32(&data[8..12]),
            hop_by_hop_id: be_u32(&data[12..16]),
            end_to_end_id: be_u32(&data[16..20]),
        })
    }

    pub fn is_request(&self) -> bool {
        self.flags & FLAG_REQUEST != 0
    }
}

/// One attribute-value pair, borrowing its data from the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Avp<'a> {
    pub code: u32,
    pub flags: u8,
    pub vendor_id: Option<u32>,
    pub data: &'a [u8],
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Walk AVPs with 4-byte padding; stops at the first malformed length
pub fn parse_avps(data: &[u8]) -> Vec<Avp<'_>> {
    let mut avps = Vec::new();
    let mut offset = 0;

    while offset + 8 <= data.len() {
        let code = be_u32(&data[offset..offset + 4]);
        let flags = data[offset + 4];
        let length = (be_u32(&data[offset + 4..offset + 8]) & 0x00FF_FFFF) as usize;

        let (vendor_id, header_len) = if flags & AVP_FLAG_VENDOR != 0 {
            match data.get(offset + 8..offset + 12) {
                Some(bytes) => (Some(be_u32(bytes)), 12),
                None => break,
            }
        } else {
            (None, 8)
        };

        if length < header_len || offset + length > data.len() {
            break;
        }

        avps.push(Avp {
            code,
            flags,
            vendor_id,
            data: &data[offset + header_len..offset + length],
        });
        offset += (length + 3) & !3;
    }

    avps
}

/// Command abbreviation for a request or answer, fallback `CMD_<code>`
pub fn command_name(code: u32, request: bool) -> String {
    let (req, ans) = match code {
        257 => ("CER", "CEA"),
        258 => ("RAR", "RAA"),
        265 => ("AAR", "AAA"),
        271 => ("ACR", "ACA"),
        272 => ("CCR", "CCA"),
        274 => ("ASR", "ASA"),
        275 => ("STR", "STA"),
        280 => ("DWR", "DWA"),
        282 => ("DPR", "DPA"),
        306 => ("UDR", "UDA"),
        316 => ("ULR", "ULA"),
        317 => ("CLR", "CLA"),
        318 => ("AIR", "AIA"),
        319 => ("IDR", "IDA"),
        320 => ("DSR", "DSA"),
        321 => ("PUR", "PUA"),
        322 => ("RSR", "RSA"),
        323 => ("NOR", "NOA"),
        324 => ("ECR", "ECA"),
        _ => return format!("CMD_{}", code),
    };
    let name = if request { req } else { ans };
    name.to_string()
}

/// Interface name for an application id
pub fn application_name(app_id: u32) -> Option<&'static str> {
    match app_id {
        0 => Some("Base"),
        APP_GY => Some("Gy"),
        APP_SH => Some("Sh"),
        APP_GX => Some("Gx"),
        APP_S6A => Some("S6a"),
        APP_S13 => Some("S13"),
        APP_S6T => Some("S6t"),
        _ => None,
    }
}

/// (client, server) roles for an application
fn roles(app_id: u32) -> (&'static str, &'static str) {
    match app_id {
        APP_S6A => ("MME", "HSS"),
        APP_S13 => ("MME", "EIR"),
        APP_SH => ("AS", "HSS"),
        APP_GX => ("PCEF", "PCRF"),
        APP_GY => ("PGW", "OCS"),
        APP_S6T => ("SCEF", "HSS"),
        _ => ("Unknown", "Unknown"),
    }
}

fn builtin_avp_name(code: u32) -> Option<&'static str> {
    Some(match code {
        1 => "User-Name",
        25 => "Class",
        27 => "Session-Timeout",
        30 => "Called-Station-Id",
        33 => "Proxy-State",
        44 => "Accounting-Session-Id",
        50 => "Acct-Multi-Session-Id",
        55 => "Event-Timestamp",
        85 => "Acct-Interim-Interval",
        258 => "Auth-Application-Id",
        260 => "Vendor-Specific-Application-Id",
        263 => "Session-Id",
        264 => "Origin-Host",
        265 => "Supported-Vendor-Id",
        266 => "Vendor-Id",
        268 => "Result-Code",
        269 => "Product-Name",
        277 => "Auth-Session-State",
        278 => "Origin-State-Id",
        279 => "Failed-AVP",
        283 => "Destination-Realm",
        293 => "Destination-Host",
        296 => "Origin-Realm",
        297 => "Experimental-Result",
        298 => "Experimental-Result-Code",
        415 => "CC-Request-Number",
        416 => "CC-Request-Type",
        443 => "Subscription-Id",
        444 => "Subscription-Id-Data",
        450 => "Subscription-Id-Type",
        456 => "Multiple-Services-Credit-Control",
        701 => "MSISDN",
        1016 => "QoS-Information",
        1032 => "RAT-Type",
        1400 => "Subscription-Data",
        1401 => "Terminal-Information",
        1402 => "IMEI",
        1405 => "ULR-Flags",
        1406 => "ULA-Flags",
        1407 => "Visited-PLMN-Id",
        1408 => "Requested-EUTRAN-Authentication-Info",
        1413 => "Authentication-Info",
        _ => return None,
    })
}

fn is_string_avp(code: u32) -> bool {
    matches!(code, 1 | 30 | 44 | 50 | 263 | 264 | 269 | 283 | 293 | 296 | 444)
}

fn is_grouped_avp(code: u32) -> bool {
    matches!(code, 260 | 279 | 297 | 443 | 456 | 1016 | 1400 | 1401 | 1413)
}

fn result_text(code: u32) -> Option<&'static str> {
    Some(match code {
        2001 => "Success",
        2002 => "Limited Success",
        3001 => "Command Unsupported",
        3002 => "Unable to Deliver",
        3003 => "Realm Not Served",
        3004 => "Too Busy",
        3007 => "Application Unsupported",
        4001 => "Authentication Rejected",
        4010 => "No Common Application",
        4012 => "Credit Limit Reached",
        5001 => "User Unknown",
        5002 => "Rating Failed",
        5003 => "Authorization Rejected",
        5004 => "Roaming Not Allowed",
        5012 => "Unable to Comply",
        5030 => "User Unknown (Subscriber)",
        5420 => "Unknown EPS Subscription",
        5421 => "RAT Not Allowed",
        _ => return None,
    })
}

/// Decodes Diameter messages using the shared vendor dictionary
pub struct DiameterDecoder {
    dictionary: Arc<Dictionary>,
}

impl DiameterDecoder {
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self { dictionary }
    }

    fn avp_name(&self, vendor: &str, code: u32) -> String {
        self.dictionary
            .lookup_avp(vendor, code)
            .or_else(|| builtin_avp_name(code).map(str::to_string))
            .unwrap_or_else(|| avp_placeholder(code))
    }

    fn result_cause(&self, vendor: &str, code: u32) -> String {
        self.dictionary
            .lookup_cause(vendor, i64::from(code))
            .or_else(|| result_text(code).map(str::to_string))
            .unwrap_or_else(|| format!("Result_{}", code))
    }

    /// Data type declared by the vendor dictionary, if any
    fn declared_type(&self, vendor: &str, code: u32) -> Option<String> {
        self.dictionary
            .get(vendor)
            .and_then(|d| d.diameter_avps.get(&code).map(|a| a.avp_type.clone()))
            .filter(|t| !t.is_empty())
    }

    fn is_string(&self, vendor: &str, code: u32) -> bool {
        match self.declared_type(vendor, code).as_deref() {
            Some("UTF8String" | "DiameterIdentity" | "DiameterURI") => true,
            Some(_) => false,
            None => is_string_avp(code),
        }
    }

    fn is_grouped(&self, vendor: &str, code: u32) -> bool {
        match self.declared_type(vendor, code).as_deref() {
            Some(t) => t == "Grouped",
            None => is_grouped_avp(code),
        }
    }

    fn avp_value(&self, vendor: &str, avp: &Avp<'_>, depth: usize) -> Value {
        if self.is_grouped(vendor, avp.code) {
            if depth >= MAX_GROUP_DEPTH {
                return Value::from(hex::encode(avp.data));
            }
            return Value::Object(self.avp_map(vendor, &parse_avps(avp.data), depth + 1));
        }
        if self.is_string(vendor, avp.code) {
            return Value::from(String::from_utf8_lossy(avp.data).into_owned());
        }
        match avp.data.len() {
            4 => Value::from(be_u32(avp.data)),
            8 => Value::from(u64::from_be_bytes(
                avp.data.try_into().unwrap_or_default(),
            )),
            _ => Value::from(hex::encode(avp.data)),
        }
    }

    /// Name -> value; the first occurrence of a repeated AVP wins
    fn avp_map(&self, vendor: &str, avps: &[Avp<'_>], depth: usize) -> Map<String, Value> {
        let mut map = Map::new();
        for avp in avps {
            map.entry(self.avp_name(vendor, avp.code))
                .or_insert_with(|| self.avp_value(vendor, avp, depth));
        }
        map
    }
}

fn find<'a>(avps: &[Avp<'a>], code: u32) -> Option<&'a [u8]> {
    avps.iter().find(|a| a.code == code).map(|a| a.data)
}

fn find_u32(avps: &[Avp<'_>], code: u32) -> Option<u32> {
    find(avps, code).filter(|d| d.len() == 4).map(be_u32)
}

fn find_string(avps: &[Avp<'_>], code: u32) -> Option<String> {
    find(avps, code).map(|d| String::from_utf8_lossy(d).into_owned())
}

fn correlate(msg: &mut Message, avps: &[Avp<'_>]) {
    msg.session_id = find_string(avps, AVP_SESSION_ID);

    if let Some(user) = find_string(avps, AVP_USER_NAME) {
        if user.len() == 15 && user.bytes().all(|b| b.is_ascii_digit()) {
            msg.imsi = Some(user);
        }
    }

    if let Some(group) = find(avps, AVP_SUBSCRIPTION_ID) {
        let inner = parse_avps(group);
        if let Some(data) = find_string(&inner, AVP_SUBSCRIPTION_ID_DATA) {
            match find_u32(&inner, AVP_SUBSCRIPTION_ID_TYPE) {
                Some(END_USER_IMSI) => msg.imsi = msg.imsi.take().or(Some(data)),
                Some(END_USER_E164) => msg.msisdn = Some(data),
                Some(_) => {}
                None if data.len() == 15 => msg.imsi = msg.imsi.take().or(Some(data)),
                None => msg.msisdn = Some(data),
            }
        }
    }

    if msg.msisdn.is_none() {
        msg.msisdn = find(avps, AVP_MSISDN).map(decode_bcd).filter(|s| !s.is_empty());
    }
    msg.plmn = find(avps, AVP_VISITED_PLMN_ID).and_then(decode_plmn);
    msg.apn = find_string(avps, AVP_CALLED_STATION_ID);
}

/// Result-Code, or the Experimental-Result-Code nested in Experimental-Result
fn result_code(avps: &[Avp<'_>]) -> Option<u32> {
    find_u32(avps, AVP_RESULT_CODE).or_else(|| {
        let group = find(avps, AVP_EXPERIMENTAL_RESULT)?;
        find_u32(&parse_avps(group), AVP_EXPERIMENTAL_RESULT_CODE)
    })
}

impl PluginInfo for DiameterDecoder {
    fn name(&self) -> &str {
        "diameter-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Diameter base protocol with S6a, S13, Sh, Gx, Gy and S6t applications"
    }
}

impl DecodePlugin for DiameterDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Diameter
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        DiameterHeader::parse(payload)
            .map(|h| h.version == 1 && h.length >= HEADER_LEN && h.length <= payload.len())
            .unwrap_or(false)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        let header = DiameterHeader::parse(payload).ok_or_else(|| {
            DecodeError::insufficient(Protocol::Diameter, HEADER_LEN, payload.len())
        })?;
        if header.version != 1 {
            return Err(DecodeError::malformed(
                Protocol::Diameter,
                format!("unsupported version {}", header.version),
            ));
        }
        if header.length < HEADER_LEN || header.length > payload.len() {
            return Err(DecodeError::malformed(
                Protocol::Diameter,
                format!("message length {} outside 20..={}", header.length, payload.len()),
            ));
        }

        let vendor = metadata
            .vendor_hint
            .as_deref()
            .unwrap_or_else(|| self.dictionary.default_vendor());
        let request = header.is_request();

        let mut msg = Message::new(Protocol::Diameter, payload, metadata);
        msg.message_name = match self.dictionary.lookup_message(
            vendor,
            Protocol::Diameter.as_str(),
            header.command_code,
        ) {
            Some(name) if request => format!("{}-Request", name),
            Some(name) => format!("{}-Answer", name),
            None => command_name(header.command_code, request),
        };
        msg.message_type = format!("Diameter_{}", msg.message_name);
        msg.direction = if request {
            Direction::Request
        } else {
            Direction::Response
        };

        msg.detail("version", header.version);
        msg.detail("command_code", header.command_code);
        msg.detail("application_id", header.application_id);
        msg.detail("hop_by_hop_id", header.hop_by_hop_id);
        msg.detail("end_to_end_id", header.end_to_end_id);
        msg.detail("flags", header.flags);
        if let Some(app) = application_name(header.application_id) {
            msg.detail("application", app);
        }

        let avps = parse_avps(&payload[HEADER_LEN..header.length]);
        msg.detail("avps", Value::Object(self.avp_map(vendor, &avps, 0)));
        correlate(&mut msg, &avps);

        if !request {
            if let Some(code) = result_code(&avps) {
                let text = self.result_cause(vendor, code);
                if (2000..3000).contains(&code) {
                    msg.result = MessageResult::Success;
                    msg.cause_code = Some(i64::from(code));
                    msg.cause_text = Some(text);
                } else {
                    msg.fail(i64::from(code), text);
                }
            }
        }

        let (client, server) = roles(header.application_id);
        let (source, destination) = if request {
            (client, server)
        } else {
            (server, client)
        };
        msg.source.element_type = source.to_string();
        msg.destination.element_type = destination.to_string();

        Ok(msg.finish(started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigmon_core::dictionary::{AvpDefinition, VendorDictionary};

    fn avp(code: u32, vendor: Option<u32>, data: &[u8]) -> Vec<u8> {
        let header_len = if vendor.is_some() { 12 } else { 8 };
        let length = (header_len + data.len()) as u32;
        let mut out = code.to_be_bytes().to_vec();
        let mut len_bytes = length.to_be_bytes();
        len_bytes[0] = if vendor.is_some() { 0xc0 } else { 0x40 };
        out.extend_from_slice(&len_bytes);
        if let Some(v) = vendor {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out.extend_from_slice(data);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn message(flags: u8, command: u32, app: u32, avps: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = avps.concat();
        let length = (HEADER_LEN + body.len()) as u32;
        let mut out = length.to_be_bytes().to_vec();
        out[0] = 1;
        let mut cmd = command.to_be_bytes();
        cmd[0] = flags;
        out.extend_from_slice(&cmd);
        out.extend_from_slice(&app.to_be_bytes());
        out.extend_from_slice(&0x1111_2222u32.to_be_bytes());
        out.extend_from_slice(&0x3333_4444u32.to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn decoder() -> DiameterDecoder {
        DiameterDecoder::new(Arc::new(Dictionary::empty()))
    }

    fn decode(data: &[u8]) -> Message {
        decoder().decode(data, &Metadata::default()).unwrap()
    }

    #[test]
    fn test_can_decode() {
        let d = decoder();
        let msg = message(0x80, 280, 0, &[]);
        assert!(d.can_decode(&msg));

        let mut bad_version = msg.clone();
        bad_version[0] = 2;
        assert!(!d.can_decode(&bad_version));

        // Length field larger than the payload
        assert!(!d.can_decode(&msg[..19]));
        let mut long = msg.clone();
        long[3] = 40;
        assert!(!d.can_decode(&long));
        assert!(!d.can_decode(&[0x62, 0x00]));
    }

    #[test]
    fn test_update_location_request() {
        let data = message(
            0xc0,
            316,
            APP_S6A,
            &[
                avp(263, None, b"mme.example.net;1;42"),
                avp(1, None, b"310410123456789"),
                avp(1407, Some(10415), &[0x13, 0x00, 0x14]),
            ],
        );
        let msg = decode(&data);

        assert_eq!(msg.protocol, Protocol::Diameter);
        assert_eq!(msg.message_name, "ULR");
        assert_eq!(msg.message_type, "Diameter_ULR");
        assert_eq!(msg.direction, Direction::Request);
        assert_eq!(msg.source.element_type, "MME");
        assert_eq!(msg.destination.element_type, "HSS");
        assert_eq!(msg.session_id.as_deref(), Some("mme.example.net;1;42"));
        assert_eq!(msg.imsi.as_deref(), Some("310410123456789"));
        assert_eq!(msg.plmn.as_deref(), Some("310-410"));
        assert_eq!(msg.details["command_code"], 316);
        assert_eq!(msg.details["application"], "S6a");
        assert_eq!(msg.details["hop_by_hop_id"], 0x1111_2222u32);
        assert_eq!(msg.details["avps"]["Session-Id"], "mme.example.net;1;42");
        assert_eq!(msg.result, MessageResult::Unknown);
    }

    #[test]
    fn test_answer_result_codes() {
        let ok = decode(&message(0x40, 316, APP_S6A, &[avp(268, None, &2001u32.to_be_bytes())]));
        assert_eq!(ok.message_name, "ULA");
        assert_eq!(ok.direction, Direction::Response);
        assert_eq!(ok.result, MessageResult::Success);
        assert_eq!(ok.source.element_type, "HSS");
        assert_eq!(ok.cause_text.as_deref(), Some("Success"));

        let failed = decode(&message(0x40, 272, APP_GY, &[avp(268, None, &5002u32.to_be_bytes())]));
        assert_eq!(failed.message_name, "CCA");
        assert_eq!(failed.result, MessageResult::Failure);
        assert_eq!(failed.cause_code, Some(5002));
        assert_eq!(failed.cause_text.as_deref(), Some("Rating Failed"));
        assert_eq!(failed.source.element_type, "OCS");

        let unknown = decode(&message(0x40, 272, APP_GX, &[avp(268, None, &3999u32.to_be_bytes())]));
        assert_eq!(unknown.cause_text.as_deref(), Some("Result_3999"));
    }

    #[test]
    fn test_experimental_result() {
        let inner = [avp(266, None, &10415u32.to_be_bytes()), avp(298, None, &5420u32.to_be_bytes())].concat();
        let msg = decode(&message(0x40, 316, APP_S6A, &[avp(297, None, &inner)]));
        assert_eq!(msg.result, MessageResult::Failure);
        assert_eq!(msg.cause_code, Some(5420));
        assert_eq!(msg.details["avps"]["Experimental-Result"]["Experimental-Result-Code"], 5420);
    }

    #[test]
    fn test_subscription_id() {
        let inner = [avp(450, None, &0u32.to_be_bytes()), avp(444, None, b"14155550100")].concat();
        let msg = decode(&message(0xc0, 272, APP_GX, &[avp(443, None, &inner), avp(30, None, b"internet")]));
        assert_eq!(msg.msisdn.as_deref(), Some("14155550100"));
        assert_eq!(msg.apn.as_deref(), Some("internet"));
        assert_eq!(msg.source.element_type, "PCEF");

        // No type: 15 characters is taken as IMSI
        let inner = avp(444, None, b"310410123456789");
        let msg = decode(&message(0xc0, 272, APP_GX, &[avp(443, None, &inner)]));
        assert_eq!(msg.imsi.as_deref(), Some("310410123456789"));
    }

    #[test]
    fn test_unknown_command_and_avp() {
        let msg = decode(&message(0x80, 9999, 77, &[avp(65000, None, &[1, 2, 3])]));
        assert_eq!(msg.message_name, "CMD_9999");
        assert_eq!(msg.details["avps"]["AVP_65000"], "010203");
        assert_eq!(msg.source.element_type, "Unknown");
    }

    #[test]
    fn test_truncated_avp_stops_walk() {
        let mut data = message(0x80, 280, 0, &[avp(264, None, b"peer.example")]);
        // Inflate the AVP length beyond the message
        data[HEADER_LEN + 7] = 0xff;
        let msg = decode(&data);
        assert!(msg.details["avps"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_header_errors() {
        let d = decoder();
        let short = d.decode(&[1, 0, 0, 20], &Metadata::default()).unwrap_err();
        assert!(matches!(short, DecodeError::InsufficientData { .. }));

        let mut data = message(0x80, 280, 0, &[]);
        data[0] = 2;
        let bad = d.decode(&data, &Metadata::default()).unwrap_err();
        assert!(matches!(bad, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_vendor_dictionary_names() {
        let dictionary = Arc::new(Dictionary::empty());
        let mut vendor = VendorDictionary::new("acme");
        vendor.diameter_avps.insert(
            65000,
            AvpDefinition {
                code: 65000,
                vendor_id: 99,
                name: "Acme-Tariff".to_string(),
                avp_type: "UTF8String".to_string(),
                description: String::new(),
            },
        );
        vendor.cause_codes.insert(5999, "Acme Quota Exhausted".to_string());
        vendor
            .message_types
            .insert("diameter:8388620".to_string(), "Acme-Notify".to_string());
        dictionary.insert(vendor);

        let decoder = DiameterDecoder::new(dictionary);
        let metadata = Metadata {
            vendor_hint: Some("acme".to_string()),
            ..Default::default()
        };
        let data = message(
            0x40,
            272,
            APP_GY,
            &[avp(65000, Some(99), b"gold"), avp(268, None, &5999u32.to_be_bytes())],
        );
        let msg = decoder.decode(&data, &metadata).unwrap();
        assert_eq!(msg.details["avps"]["Acme-Tariff"], "gold");
        assert_eq!(msg.cause_text.as_deref(), Some("Acme Quota Exhausted"));

        // Without the hint the default vendor (none loaded) applies
        let msg = decoder.decode(&data, &Metadata::default()).unwrap();
        assert!(msg.details["avps"].get("AVP_65000").is_some());

        let notify = message(0x80, 8388620, 0, &[]);
        let msg = decoder.decode(&notify, &metadata).unwrap();
        assert_eq!(msg.message_name, "Acme-Notify-Request");
        let msg = decoder.decode(&notify, &Metadata::default()).unwrap();
        assert_eq!(msg.message_name, "CMD_8388620");
    }

    #[test]
    fn test_deeply_nested_groups_stop_at_depth_limit() {
        let mut group = avp(444, None, b"14155550100");
        for _ in 0..8000 {
            group = avp(443, None, &group);
        }
        let data = message(0xc0, 272, APP_GY, &[group]);
        assert!(decoder().can_decode(&data));

        let msg = decode(&data);
        let mut value = &msg.details["avps"]["Subscription-Id"];
        for _ in 0..MAX_GROUP_DEPTH {
            value = &value["Subscription-Id"];
        }
        assert!(value.is_string());
    }

    #[test]
    fn test_parse_avps_padding_and_vendor() {
        let body = [avp(1, None, b"abcde"), avp(1407, Some(10415), &[1, 2, 3])].concat();
        let avps = parse_avps(&body);
        assert_eq!(avps.len(), 2);
        assert_eq!(avps[0].data, b"abcde");
        assert_eq!(avps[1].vendor_id, Some(10415));
        assert_eq!(avps[1].data, &[1, 2, 3]);
    }
}
