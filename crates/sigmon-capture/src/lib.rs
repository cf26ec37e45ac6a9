//! Packet capture for SigMon
//!
//! The [`CaptureEngine`] runs one worker per configured source, parses
//! Ethernet/IPv4/transport headers and fans every packet out to the
//! registered [`PacketProcessor`](sigmon_core::PacketProcessor)s.

use thiserror::Error;

pub mod engine;
pub mod headers;
pub mod pcap;
pub mod source;
pub mod synth;

pub use engine::CaptureEngine;
pub use headers::{parse_frame, FrameHeaders};
pub use pcap::{PcapReader, PcapRecord};

/// Capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture engine already running")]
    AlreadyRunning,

    #[error("capture engine not running")]
    NotRunning,

    #[error("invalid pcap magic number: {0:#010x}")]
    InvalidMagic(u32),

    #[error("pcap global header truncated")]
    TruncatedHeader,

    #[error("pcap record of {incl_len} bytes exceeds the {limit}-byte limit")]
    OversizedRecord { incl_len: usize, limit: usize },

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
