//! Pipeline counters for SigMon
//!
//! Capture and decode stages bump lock-free counters; readers take a
//! [`CaptureStats`] / [`DecodeStats`] snapshot or export everything.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Metrics shared by the capture engine and the routing processor
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    pub capture: CaptureMetrics,
    pub decode: DecodeMetrics,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            capture: CaptureMetrics::default(),
            decode: DecodeMetrics::default(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export metrics in Prometheus format
    pub fn to_prometheus(&self) -> String {
        let capture = self.capture.snapshot();
        let decode = self.decode.snapshot();
        let mut output = String::new();

        let mut counter = |name: &str, help: &str, value: u64| {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n\n", name, value));
        };

        counter(
            "sigmon_capture_packets_total",
            "Packets read from capture sources",
            capture.packets_captured,
        );
        counter(
            "sigmon_capture_bytes_total",
            "Bytes read from capture sources",
            capture.bytes_captured,
        );
        counter(
            "sigmon_capture_dropped_total",
            "Packets dropped at the output channel",
            capture.packets_dropped,
        );
        counter(
            "sigmon_capture_files_total",
            "Capture files fully processed",
            capture.files_processed,
        );
        counter(
            "sigmon_capture_file_errors_total",
            "Capture files that failed",
            capture.file_errors,
        );
        counter(
            "sigmon_capture_processor_errors_total",
            "Errors returned by packet processors",
            capture.processor_errors,
        );
        counter(
            "sigmon_decode_messages_total",
            "Payloads decoded into messages",
            decode.messages_decoded,
        );
        counter(
            "sigmon_decode_errors_total",
            "Payloads that failed to decode",
            decode.decode_errors,
        );
        counter(
            "sigmon_decode_dropped_total",
            "Messages dropped at the message channel",
            decode.messages_dropped,
        );

        output.push_str("# HELP sigmon_uptime_seconds Time since sensor started\n");
        output.push_str("# TYPE sigmon_uptime_seconds gauge\n");
        output.push_str(&format!("sigmon_uptime_seconds {}\n", self.uptime_seconds()));

        output
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "capture": self.capture.snapshot(),
            "decode": self.decode.snapshot(),
        })
    }
}

/// Capture-side counters
#[derive(Debug, Default)]
pub struct CaptureMetrics {
    pub packets_captured: AtomicU64,
    pub bytes_captured: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub files_processed: AtomicU64,
    pub file_errors: AtomicU64,
    pub processor_errors: AtomicU64,
}

impl CaptureMetrics {
    pub fn record_packet(&self, bytes: usize) {
        self.packets_captured.fetch_add(1, Ordering::Relaxed);
        self.bytes_captured.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            packets_captured: self.packets_captured.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            file_errors: self.file_errors.load(Ordering::Relaxed),
            processor_errors: self.processor_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time capture statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    pub packets_captured: u64,
    pub bytes_captured: u64,
    pub packets_dropped: u64,
    pub files_processed: u64,
    pub file_errors: u64,
    pub processor_errors: u64,
}

/// Decode-side counters
#[derive(Debug, Default)]
pub struct DecodeMetrics {
    pub messages_decoded: AtomicU64,
    pub decode_errors: AtomicU64,
    pub messages_dropped: AtomicU64,
}

impl DecodeMetrics {
    pub fn snapshot(&self) -> DecodeStats {
        DecodeStats {
            messages_decoded: self.messages_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time decode statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeStats {
    pub messages_decoded: u64,
    pub decode_errors: u64,
    pub messages_dropped: u64,
}

/// Shared metrics instance
pub type SharedMetrics = Arc<MetricsCollector>;

/// Create a new shared metrics collector
pub fn create_metrics() -> SharedMetrics {
    Arc::new(MetricsCollector::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_snapshot() {
        let metrics = MetricsCollector::new();
        metrics.capture.record_packet(100);
        metrics.capture.record_packet(60);
        metrics.capture.packets_dropped.fetch_add(1, Ordering::Relaxed);

        let stats = metrics.capture.snapshot();
        assert_eq!(stats.packets_captured, 2);
        assert_eq!(stats.bytes_captured, 160);
        assert_eq!(stats.packets_dropped, 1);
    }

    #[test]
    fn test_prometheus_and_json_export() {
        let metrics = create_metrics();
        metrics.capture.record_packet(42);
        metrics.decode.decode_errors.fetch_add(3, Ordering::Relaxed);

        let text = metrics.to_prometheus();
        assert!(text.contains("sigmon_capture_packets_total 1"));
        assert!(text.contains("sigmon_capture_bytes_total 42"));
        assert!(text.contains("sigmon_decode_errors_total 3"));

        let json = metrics.to_json();
        assert_eq!(json["capture"]["packets_captured"], 1);
        assert_eq!(json["decode"]["decode_errors"], 3);
    }
}
