//! SigMon Core - data model, plugin traits, dictionaries and health
//!
//! This crate provides the foundational types shared by the SigMon crates:
//!
//! - **Events**: the decoded signaling [`Message`] and its enums
//! - **Plugins**: [`DecodePlugin`] and [`PacketProcessor`] traits plus the captured packet model
//! - **Dictionary**: vendor name tables for AVPs, IEs and cause codes
//! - **Health**: component health, counters and the watchdog
//! - **Config**: TOML configuration discovery and validation

pub mod config;
pub mod dictionary;
pub mod events;
pub mod health;
pub mod metrics;
pub mod plugins;

// Re-export commonly used types
pub use config::{ConfigLoader, SensorConfig, SourceConfig, SourceType};
pub use dictionary::Dictionary;
pub use events::{Direction, Message, MessageResult, NetworkElement, Protocol};
pub use health::{HealthCheck, HealthError, Status, WatchdogAlarm};
pub use metrics::{CaptureStats, MetricsCollector, SharedMetrics};
pub use plugins::{
    CapturedPacket, DecodeError, DecodePlugin, Metadata, PacketProcessor, PluginError, PluginInfo,
    PluginResult, Transport,
};

/// Sensor version
pub const SENSOR_VERSION: &str = env!("CARGO_PKG_VERSION");
