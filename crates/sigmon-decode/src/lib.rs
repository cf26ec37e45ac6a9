//! Signaling protocol decoders for SigMon
//!
//! Every decoder implements [`DecodePlugin`](sigmon_core::DecodePlugin):
//!
//! - **CapDecoder**: CAMEL over TCAP, phases 1-4
//! - **InapDecoder**: INAP over TCAP, CS-1 to CS-3
//! - **MapDecoder**: MAP over TCAP
//! - **DiameterDecoder**: Diameter with vendor dictionary naming
//! - **GtpDecoder**: GTPv1-C or GTPv2-C, one instance per version
//! - **PfcpDecoder**: PFCP node and session messages
//! - **ApDecoder**: S1AP or NGAP envelopes with embedded NAS
//! - **NasDecoder**: 4G EMM/ESM or 5G 5GMM, one instance per generation
//!
//! [`DecoderRegistry`] routes a payload to the first decoder that claims it
//! and [`RoutingProcessor`] plugs the registry into the capture engine.

pub mod aper;
pub mod bcd;
pub mod cap;
pub mod diameter;
pub mod gtp;
pub mod inap;
pub mod map;
pub mod nas;
pub mod ngap;
pub mod pfcp;
pub mod registry;
pub mod s1ap;
pub mod tcap;

pub use aper::ApDecoder;
pub use bcd::decode_bcd;
pub use cap::CapDecoder;
pub use diameter::DiameterDecoder;
pub use gtp::GtpDecoder;
pub use inap::InapDecoder;
pub use map::MapDecoder;
pub use nas::NasDecoder;
pub use pfcp::PfcpDecoder;
pub use registry::{DecoderRegistry, RoutingProcessor};
