//! Source workers: capture file directories and live interfaces

use crate::engine::Dispatcher;
use crate::headers::parse_frame;
use crate::pcap::{PcapReader, PcapRecord};
use crate::CaptureError;
use sigmon_core::{CapturedPacket, Metadata, SourceConfig, SourceType};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How a file's record loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// All records read; carries the packet count
    Completed(u64),
    /// Stop was signalled between records
    Interrupted,
}

fn stopped(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Build a packet from one pcap record, cut to the source's snaplen
pub fn packet_from_record(mut record: PcapRecord, source: &SourceConfig) -> CapturedPacket {
    let snaplen = source.snaplen as usize;
    if snaplen > 0 && record.data.len() > snaplen {
        record.data.truncate(snaplen);
    }

    let headers = parse_frame(&record.data);
    let interface_name = source.label();

    let metadata = Metadata {
        capture_time: record.timestamp,
        source_ip: headers.source_ip.clone(),
        dest_ip: headers.dest_ip.clone(),
        source_port: headers.source_port,
        dest_port: headers.dest_port,
        transport_proto: headers.transport,
        interface_name: Some(interface_name.clone()),
        vendor_hint: source.vendor.clone(),
    };

    let mut data = record.data;
    // Drop link-layer trailer bytes past the application payload
    if headers.payload_end < data.len() {
        data.truncate(headers.payload_end);
    }

    CapturedPacket {
        timestamp: record.timestamp,
        length: record.orig_len,
        data,
        source_ip: headers.source_ip,
        dest_ip: headers.dest_ip,
        source_port: headers.source_port,
        dest_port: headers.dest_port,
        transport: headers.transport,
        interface_name,
        metadata,
        payload_offset: headers.payload_offset,
    }
}

/// Files under the source path matching its pattern, sorted
pub fn find_capture_files(source: &SourceConfig) -> Result<Vec<PathBuf>, CaptureError> {
    let pattern = glob::Pattern::new(&source.pattern)?;
    let mut files = Vec::new();
    collect_files(&source.path, &pattern, source.recursive, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files(
    dir: &Path,
    pattern: &glob::Pattern,
    recursive: bool,
    out: &mut Vec<PathBuf>,
) -> Result<(), CaptureError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if recursive {
                collect_files(&path, pattern, recursive, out)?;
            }
            continue;
        }

        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| pattern.matches(n))
            .unwrap_or(false);
        if matches {
            out.push(path);
        }
    }
    Ok(())
}

/// Read one capture file to completion (or until stop)
pub async fn process_file(
    path: &Path,
    source: &SourceConfig,
    dispatcher: &Dispatcher,
    stop: &watch::Receiver<bool>,
) -> Result<FileOutcome, CaptureError> {
    let mut reader = PcapReader::open(path).await?;
    let mut packets = 0u64;

    loop {
        if stopped(stop) {
            return Ok(FileOutcome::Interrupted);
        }

        let record = match reader.next_record().await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                // Records already dispatched stand; the rest of the file is lost
                warn!("Read error in {} after {} packets: {}", path.display(), packets, e);
                break;
            }
        };

        dispatcher.dispatch(packet_from_record(record, source)).await;
        packets += 1;
    }

    Ok(FileOutcome::Completed(packets))
}

/// Run one source until it finishes or stop is signalled
pub async fn run_source(
    source: SourceConfig,
    poll_interval: Duration,
    dispatcher: Arc<Dispatcher>,
    stop: watch::Receiver<bool>,
) {
    match source.source_type {
        SourceType::File if source.watch => {
            watch_directory(&source, poll_interval, &dispatcher, stop).await
        }
        SourceType::File => process_directory(&source, &dispatcher, &stop).await,
        SourceType::Live => capture_live(&source, stop).await,
    }
}

async fn process_one(
    path: &Path,
    source: &SourceConfig,
    dispatcher: &Dispatcher,
    stop: &watch::Receiver<bool>,
) -> Option<FileOutcome> {
    match process_file(path, source, dispatcher, stop).await {
        Ok(outcome) => {
            if let FileOutcome::Completed(packets) = outcome {
                dispatcher.metrics.capture.files_processed.fetch_add(1, Ordering::Relaxed);
                debug!("Processed {} ({} packets)", path.display(), packets);
            }
            Some(outcome)
        }
        Err(e) => {
            dispatcher.metrics.capture.file_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to process {}: {}", path.display(), e);
            None
        }
    }
}

async fn process_directory(source: &SourceConfig, dispatcher: &Dispatcher, stop: &watch::Receiver<bool>) {
    let files = match find_capture_files(source) {
        Ok(files) => files,
        Err(e) => {
            warn!("Cannot scan {}: {}", source.path.display(), e);
            return;
        }
    };

    info!("Processing {} capture files from {}", files.len(), source.path.display());

    for file in files {
        if stopped(stop) {
            return;
        }
        if let Some(FileOutcome::Interrupted) = process_one(&file, source, dispatcher, stop).await {
            return;
        }
    }
}

async fn watch_directory(
    source: &SourceConfig,
    poll_interval: Duration,
    dispatcher: &Dispatcher,
    mut stop: watch::Receiver<bool>,
) {
    let mut processed: HashSet<PathBuf> = HashSet::new();
    info!("Watching {} every {:?}", source.path.display(), poll_interval);

    loop {
        if stopped(&stop) {
            return;
        }

        match find_capture_files(source) {
            Ok(files) => {
                for file in files {
                    if processed.contains(&file) {
                        continue;
                    }
                    if stopped(&stop) {
                        return;
                    }
                    match process_one(&file, source, dispatcher, &stop).await {
                        Some(FileOutcome::Interrupted) => return,
                        // Failed files are not retried either
                        _ => {
                            processed.insert(file);
                        }
                    }
                }
            }
            Err(e) => debug!("Scan of {} failed: {}", source.path.display(), e),
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// Live capture backend placeholder: idles until stop
async fn capture_live(source: &SourceConfig, mut stop: watch::Receiver<bool>) {
    info!(
        "Live capture on {} (snaplen {}, promiscuous {}) has no backend; idling",
        source.interface, source.snaplen, source.promiscuous
    );

    while !stopped(&stop) {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
