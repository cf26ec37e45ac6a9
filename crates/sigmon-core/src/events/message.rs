//! Decoded signaling message - the unit handed to storage and correlation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::plugins::Metadata;

/// Signaling protocol carried by a decoded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "MAP")]
    Map,
    #[serde(rename = "CAP")]
    Cap,
    #[serde(rename = "INAP")]
    Inap,
    #[serde(rename = "Diameter")]
    Diameter,
    #[serde(rename = "GTPv1-C")]
    GtpV1C,
    #[serde(rename = "GTPv2-C")]
    GtpV2C,
    #[serde(rename = "PFCP")]
    Pfcp,
    #[serde(rename = "HTTP/2")]
    Http2,
    #[serde(rename = "NGAP")]
    Ngap,
    #[serde(rename = "S1AP")]
    S1ap,
    #[serde(rename = "NAS-4G")]
    Nas4g,
    #[serde(rename = "NAS-5G")]
    Nas5g,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Protocol {
    /// Stable label, identical to the serialized form
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Map => "MAP",
            Protocol::Cap => "CAP",
            Protocol::Inap => "INAP",
            Protocol::Diameter => "Diameter",
            Protocol::GtpV1C => "GTPv1-C",
            Protocol::GtpV2C => "GTPv2-C",
            Protocol::Pfcp => "PFCP",
            Protocol::Http2 => "HTTP/2",
            Protocol::Ngap => "NGAP",
            Protocol::S1ap => "S1AP",
            Protocol::Nas4g => "NAS-4G",
            Protocol::Nas5g => "NAS-5G",
            Protocol::Unknown => "Unknown",
        }
    }

    /// Parse a configuration name (case-insensitive, separators ignored)
    pub fn from_name(name: &str) -> Option<Self> {
        match normalize_name(name).as_str() {
            "map" => Some(Protocol::Map),
            "cap" => Some(Protocol::Cap),
            "inap" => Some(Protocol::Inap),
            "diameter" => Some(Protocol::Diameter),
            "gtpv1c" | "gtpv1" => Some(Protocol::GtpV1C),
            "gtpv2c" | "gtpv2" | "gtp" => Some(Protocol::GtpV2C),
            "pfcp" => Some(Protocol::Pfcp),
            "http2" => Some(Protocol::Http2),
            "ngap" => Some(Protocol::Ngap),
            "s1ap" => Some(Protocol::S1ap),
            "nas4g" => Some(Protocol::Nas4g),
            "nas5g" | "nas" => Some(Protocol::Nas5g),
            _ => None,
        }
    }

    /// Every protocol a configuration name selects
    ///
    /// The family names `gtp` and `nas` select both generations.
    pub fn family_from_name(name: &str) -> Option<Vec<Self>> {
        match normalize_name(name).as_str() {
            "gtp" => Some(vec![Protocol::GtpV1C, Protocol::GtpV2C]),
            "nas" => Some(vec![Protocol::Nas4g, Protocol::Nas5g]),
            _ => Self::from_name(name).map(|p| vec![p]),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message direction relative to the procedure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
    #[default]
    Unknown,
}

/// Procedure outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageResult {
    Success,
    Failure,
    #[default]
    Unknown,
}

/// A network node as seen by one decoded message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkElement {
    /// Logical role (MSC/SSF, gsmSCF, UE, MME, AMF, HSS, ...)
    #[serde(rename = "type")]
    pub element_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl NetworkElement {
    pub fn new(ip: Option<String>, port: Option<u16>) -> Self {
        Self {
            element_type: String::new(),
            ip,
            port,
        }
    }

    pub fn with_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = element_type.into();
        self
    }
}

/// A decoded signaling event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (ULID)
    pub id: String,

    /// Capture time of the packet that carried the message
    pub timestamp: DateTime<Utc>,

    pub protocol: Protocol,

    /// Envelope-level type label (e.g. "CAP_Begin", "NAS_4G_AttachRequest")
    pub message_type: String,

    /// Operation or message name (e.g. "InitialDP", "AttachRequest")
    pub message_name: String,

    pub direction: Direction,

    pub result: MessageResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_code: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_text: Option<String>,

    pub source: NetworkElement,

    pub destination: NetworkElement,

    // Correlation keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub msisdn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub teid: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_num: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apn: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plmn: Option<String>,

    /// Protocol-specific fields, ordered by name
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,

    #[serde(skip)]
    pub raw_payload: Vec<u8>,

    pub payload_size: usize,

    pub processed_at: DateTime<Utc>,

    /// Time spent decoding, in microseconds
    pub decode_time_us: u64,
}

impl Message {
    /// Start a message for `protocol` from the packet metadata
    pub fn new(protocol: Protocol, payload: &[u8], metadata: &Metadata) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            timestamp: metadata.capture_time,
            protocol,
            message_type: String::new(),
            message_name: String::new(),
            direction: Direction::Unknown,
            result: MessageResult::Unknown,
            cause_code: None,
            cause_text: None,
            source: NetworkElement::new(metadata.source_ip.clone(), metadata.source_port),
            destination: NetworkElement::new(metadata.dest_ip.clone(), metadata.dest_port),
            imsi: None,
            msisdn: None,
            session_id: None,
            teid: None,
            sequence_num: None,
            apn: None,
            plmn: None,
            details: BTreeMap::new(),
            raw_payload: payload.to_vec(),
            payload_size: payload.len(),
            processed_at: Utc::now(),
            decode_time_us: 0,
        }
    }

    /// Insert a detail value
    pub fn detail(&mut self, name: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(name.to_string(), value.into());
    }

    /// Mark the message as failed with a protocol cause
    pub fn fail(&mut self, code: i64, text: impl Into<String>) {
        self.result = MessageResult::Failure;
        self.cause_code = Some(code);
        self.cause_text = Some(text.into());
    }

    /// Stamp processing time and decode latency
    pub fn finish(mut self, started: std::time::Instant) -> Self {
        self.processed_at = Utc::now();
        self.decode_time_us = started.elapsed().as_micros() as u64;
        self
    }
}
