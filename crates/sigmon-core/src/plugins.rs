//! Plugin traits for the capture-and-decode pipeline
//!
//! Capture sources produce [`CapturedPacket`]s and fan them out to every
//! registered [`PacketProcessor`]. Protocol decoders implement
//! [`DecodePlugin`] and turn an application payload into a [`Message`].

use crate::events::{Message, Protocol};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Plugin error type
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Plugin operation failed: {0}")]
    OperationFailed(String),

    #[error("Plugin configuration error: {0}")]
    ConfigurationError(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Basic plugin information
pub trait PluginInfo {
    /// Plugin name
    fn name(&self) -> &str;

    /// Plugin version
    fn version(&self) -> &str;

    /// Plugin description
    fn description(&self) -> &str {
        ""
    }
}

// =============================================================================
// CAPTURED PACKETS
// =============================================================================

/// Transport protocol recognized in the IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Tcp,
    Udp,
    Sctp,
}

impl Transport {
    /// Map an IPv4 protocol number
    pub fn from_ip_proto(proto: u8) -> Option<Self> {
        match proto {
            6 => Some(Transport::Tcp),
            17 => Some(Transport::Udp),
            132 => Some(Transport::Sctp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
            Transport::Sctp => "SCTP",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-packet view handed to decoders
///
/// Every address field is optional: a packet that failed a header length
/// check still carries whatever was derived before the failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub capture_time: DateTime<Utc>,
    pub source_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub transport_proto: Option<Transport>,
    pub interface_name: Option<String>,
    /// Vendor whose dictionary should name codes in this packet
    pub vendor_hint: Option<String>,
}

/// A raw frame read from a capture source, after L2-L4 header parsing
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub timestamp: DateTime<Utc>,

    /// Full captured frame
    pub data: Vec<u8>,

    /// Original length on the wire
    pub length: usize,

    pub source_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub transport: Option<Transport>,
    pub interface_name: String,

    pub metadata: Metadata,

    /// Start of the application payload inside `data`
    pub payload_offset: usize,
}

impl CapturedPacket {
    /// Application-layer bytes (everything after the last parsed header)
    pub fn payload(&self) -> &[u8] {
        let start = self.payload_offset.min(self.data.len());
        &self.data[start..]
    }
}

/// Receives every packet produced by the capture engine
#[async_trait]
pub trait PacketProcessor: PluginInfo + Send + Sync {
    /// Process one packet; an error is logged and counted by the caller
    async fn process(&self, packet: Arc<CapturedPacket>) -> PluginResult<()>;
}

// =============================================================================
// DECODE PLUGINS
// =============================================================================

/// Typed failure of a single decode call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{protocol}: insufficient data (need {needed} bytes, have {available})")]
    InsufficientData {
        protocol: Protocol,
        needed: usize,
        available: usize,
    },

    #[error("{protocol}: malformed payload: {reason}")]
    Malformed { protocol: Protocol, reason: String },

    #[error("{protocol}: unsupported operation: {operation}")]
    UnsupportedOperation {
        protocol: Protocol,
        operation: String,
    },

    #[error("no decoder accepted the payload")]
    NoDecoder,
}

impl DecodeError {
    pub fn insufficient(protocol: Protocol, needed: usize, available: usize) -> Self {
        DecodeError::InsufficientData {
            protocol,
            needed,
            available,
        }
    }

    pub fn malformed(protocol: Protocol, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            protocol,
            reason: reason.into(),
        }
    }

    /// Protocol the failing decoder speaks, if any decoder was chosen
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            DecodeError::InsufficientData { protocol, .. }
            | DecodeError::Malformed { protocol, .. }
            | DecodeError::UnsupportedOperation { protocol, .. } => Some(*protocol),
            DecodeError::NoDecoder => None,
        }
    }
}

/// Decode plugin - transforms an application payload into a signaling message
///
/// Implementations hold no per-call state and may be invoked concurrently.
pub trait DecodePlugin: PluginInfo + Send + Sync {
    /// Protocol this decoder produces
    fn protocol(&self) -> Protocol;

    /// Cheap syntactic pre-check; false on garbage, never panics
    fn can_decode(&self, payload: &[u8]) -> bool;

    /// Routing check with transport context; defaults to `can_decode`
    ///
    /// Decoders that share a wire format with another protocol override this
    /// to consult well-known ports.
    fn accepts(&self, payload: &[u8], _metadata: &Metadata) -> bool {
        self.can_decode(payload)
    }

    /// Decode one payload
    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError>;
}
