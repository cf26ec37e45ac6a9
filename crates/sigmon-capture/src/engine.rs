//! Capture engine: source workers, packet fan-out and lifecycle

use crate::source::run_source;
use crate::CaptureError;
use parking_lot::{Mutex, RwLock};
use sigmon_core::config::CaptureSettings;
use sigmon_core::metrics::{create_metrics, CaptureStats, SharedMetrics};
use sigmon_core::{CapturedPacket, HealthCheck, PacketProcessor, SourceConfig};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

type Processors = Arc<RwLock<Vec<Arc<dyn PacketProcessor>>>>;

/// Hands each packet to every processor, then to the output channel
pub struct Dispatcher {
    processors: Processors,
    output: Option<mpsc::Sender<Arc<CapturedPacket>>>,
    pub(crate) metrics: SharedMetrics,
}

impl Dispatcher {
    pub async fn dispatch(&self, packet: CapturedPacket) {
        self.metrics.capture.record_packet(packet.data.len());
        let packet = Arc::new(packet);

        // Snapshot so registration never waits on a slow processor
        let processors: Vec<Arc<dyn PacketProcessor>> = self.processors.read().clone();
        for processor in &processors {
            if let Err(e) = processor.process(packet.clone()).await {
                self.metrics
                    .capture
                    .processor_errors
                    .fetch_add(1, Ordering::Relaxed);
                debug!("Processor {} failed: {}", processor.name(), e);
            }
        }

        if let Some(output) = &self.output {
            if let Err(e) = output.try_send(packet) {
                self.metrics
                    .capture
                    .packets_dropped
                    .fetch_add(1, Ordering::Relaxed);
                trace!("Output channel dropped packet: {}", e);
            }
        }
    }
}

struct Workers {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Packet capture engine
pub struct CaptureEngine {
    sources: Vec<SourceConfig>,
    poll_interval: Duration,
    processors: Processors,
    output: Option<mpsc::Sender<Arc<CapturedPacket>>>,
    metrics: SharedMetrics,
    health: Option<Arc<HealthCheck>>,
    workers: Mutex<Option<Workers>>,
}

impl CaptureEngine {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            sources: settings.sources.clone(),
            poll_interval: settings.poll_interval(),
            processors: Arc::new(RwLock::new(Vec::new())),
            output: None,
            metrics: create_metrics(),
            health: None,
            workers: Mutex::new(None),
        }
    }

    /// Offer every packet to `tx` without blocking; a full channel drops it
    pub fn with_output(mut self, tx: mpsc::Sender<Arc<CapturedPacket>>) -> Self {
        self.output = Some(tx);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthCheck>) -> Self {
        self.health = Some(health);
        self
    }

    /// Register a processor; it receives every packet dispatched afterwards
    pub fn register_processor(&self, processor: Arc<dyn PacketProcessor>) {
        info!("Registered packet processor: {}", processor.name());
        self.processors.write().push(processor);
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    /// Number of live worker tasks
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .as_ref()
            .map(|w| w.handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CaptureStats {
        self.metrics.capture.snapshot()
    }

    /// Spawn one worker per source
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = Arc::new(Dispatcher {
            processors: self.processors.clone(),
            output: self.output.clone(),
            metrics: self.metrics.clone(),
        });

        let handles = self
            .sources
            .iter()
            .map(|source| {
                info!("Starting capture source {}", source.label());
                tokio::spawn(run_source(
                    source.clone(),
                    self.poll_interval,
                    dispatcher.clone(),
                    stop_rx.clone(),
                ))
            })
            .collect::<Vec<_>>();

        if let Some(health) = &self.health {
            health.update_component_status(
                "capture",
                true,
                format!("{} sources running", handles.len()),
            );
        }

        *workers = Some(Workers { stop_tx, handles });
        Ok(())
    }

    /// Signal every worker and wait for all of them to exit
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let workers = self.workers.lock().take().ok_or(CaptureError::NotRunning)?;

        // Receivers may already be gone if every worker finished
        let _ = workers.stop_tx.send(true);
        Self::join_all(workers.handles).await;

        if let Some(health) = &self.health {
            health.update_component_status("capture", true, "stopped");
        }
        info!("Capture engine stopped");
        Ok(())
    }

    /// Wait for finite sources to finish on their own, then mark stopped
    ///
    /// Live and watch-mode sources never finish; use [`stop`](Self::stop).
    pub async fn wait(&self) -> Result<(), CaptureError> {
        let workers = self.workers.lock().take().ok_or(CaptureError::NotRunning)?;
        Self::join_all(workers.handles).await;
        drop(workers.stop_tx);
        Ok(())
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Capture worker exited abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{FrameBuilder, PcapWriter};
    use async_trait::async_trait;
    use sigmon_core::config::SourceType;
    use sigmon_core::{PluginInfo, PluginResult};
    use std::fs::File;
    use std::path::Path;
    use std::sync::atomic::AtomicU64;
    use tempfile::TempDir;

    struct Counter {
        seen: AtomicU64,
    }

    impl PluginInfo for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn version(&self) -> &str {
            "0.0.0"
        }
    }

    #[async_trait]
    impl PacketProcessor for Counter {
        async fn process(&self, _packet: Arc<CapturedPacket>) -> PluginResult<()> {
            self.seen.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter {
            seen: AtomicU64::new(0),
        })
    }

    fn write_capture(path: &Path, packets: usize) {
        let mut writer = PcapWriter::new(File::create(path).unwrap()).unwrap();
        for i in 0..packets {
            let frame = FrameBuilder::udp([10, 0, 0, 1], 2123, [10, 0, 0, 2], 2123)
                .payload(&[0x48, 0x20, 0x00, 0x04, 0x00, 0x00, 0x00, i as u8])
                .build();
            writer.write_record(1_700_000_000, 0, &frame).unwrap();
        }
    }

    fn settings(dir: &Path) -> CaptureSettings {
        CaptureSettings {
            sources: vec![SourceConfig::file(dir)],
            poll_interval_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_stop_before_start_is_error() {
        let engine = CaptureEngine::new(&CaptureSettings::default());
        assert!(matches!(engine.stop().await, Err(CaptureError::NotRunning)));
        assert!(!engine.is_running());
        assert_eq!(engine.stats(), CaptureStats::default());
    }

    #[tokio::test]
    async fn test_double_start_keeps_one_worker_set() {
        let mut settings = CaptureSettings::default();
        settings.sources.push(SourceConfig::live("eth1"));
        let engine = CaptureEngine::new(&settings);

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(CaptureError::AlreadyRunning)));
        assert_eq!(engine.worker_count(), 1);

        engine.stop().await.unwrap();
        assert!(!engine.is_running());

        // Restart after stop is allowed
        engine.start().unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_packet_count_matches_records() {
        let tmp = TempDir::new().unwrap();
        write_capture(&tmp.path().join("one.pcap"), 5);
        write_capture(&tmp.path().join("two.pcap"), 3);
        std::fs::write(tmp.path().join("bad.pcap"), [0u8; 40]).unwrap();

        let engine = CaptureEngine::new(&settings(tmp.path()));
        let processor = counter();
        engine.register_processor(processor.clone());

        engine.start().unwrap();
        engine.wait().await.unwrap();

        assert_eq!(processor.seen.load(Ordering::Relaxed), 8);
        let stats = engine.stats();
        assert_eq!(stats.packets_captured, 8);
        assert_eq!(stats.files_processed, 2);
        assert_eq!(stats.file_errors, 1);
    }

    #[tokio::test]
    async fn test_full_output_channel_still_reaches_processors() {
        let tmp = TempDir::new().unwrap();
        write_capture(&tmp.path().join("burst.pcap"), 10);

        let (tx, mut rx) = mpsc::channel(2);
        let engine = CaptureEngine::new(&settings(tmp.path())).with_output(tx);
        let processor = counter();
        engine.register_processor(processor.clone());

        engine.start().unwrap();
        engine.wait().await.unwrap();

        assert_eq!(processor.seen.load(Ordering::Relaxed), 10);
        assert_eq!(engine.stats().packets_dropped, 8);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload()[7], 0);
        assert_eq!(first.source_port, Some(2123));
    }

    #[tokio::test]
    async fn test_watch_mode_picks_up_new_files_once() {
        let tmp = TempDir::new().unwrap();
        write_capture(&tmp.path().join("a.pcap"), 2);

        let mut settings = settings(tmp.path());
        settings.sources[0].watch = true;
        let engine = CaptureEngine::new(&settings);
        let processor = counter();
        engine.register_processor(processor.clone());
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Rename into place so a scan never sees a half-written file
        write_capture(&tmp.path().join("b.part"), 3);
        std::fs::rename(tmp.path().join("b.part"), tmp.path().join("b.pcap")).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        engine.stop().await.unwrap();
        assert_eq!(processor.seen.load(Ordering::Relaxed), 5);
        assert_eq!(engine.stats().files_processed, 2);
    }

    #[tokio::test]
    async fn test_live_source_blocks_until_stop() {
        let mut settings = CaptureSettings::default();
        settings.sources.push(SourceConfig {
            source_type: SourceType::Live,
            interface: "eth0".to_string(),
            ..Default::default()
        });
        let engine = CaptureEngine::new(&settings);
        engine.start().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.worker_count(), 1);

        tokio::time::timeout(Duration::from_secs(1), engine.stop())
            .await
            .expect("stop returns promptly")
            .unwrap();
    }
}
