//! Decoder routing: a fixed-order registry and the packet processor that feeds it

use crate::{
    ApDecoder, CapDecoder, DiameterDecoder, GtpDecoder, InapDecoder, MapDecoder, NasDecoder,
    PfcpDecoder,
};
use async_trait::async_trait;
use sigmon_core::config::DecodeSettings;
use sigmon_core::metrics::{create_metrics, SharedMetrics};
use sigmon_core::{
    CapturedPacket, DecodeError, DecodePlugin, Dictionary, HealthCheck, Message, Metadata,
    PacketProcessor, PluginInfo, PluginResult, Protocol,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Decoders in routing order; the first whose `accepts` is true wins
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<Arc<dyn DecodePlugin>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configured decoders in the configured order
    ///
    /// `gtp` and `nas` expand to both generations; a name with no decoder
    /// is logged and skipped, and repeats are ignored.
    pub fn from_settings(settings: &DecodeSettings, dictionary: Arc<Dictionary>) -> Self {
        let mut registry = Self::new();

        for name in &settings.protocols {
            let Some(protocols) = Protocol::family_from_name(name) else {
                warn!("Unknown protocol '{}'; skipping", name);
                continue;
            };

            for protocol in protocols {
                let Some(decoder) = decoder_for(protocol, &dictionary) else {
                    warn!("No decoder available for {}; skipping", protocol);
                    continue;
                };
                if !registry.contains(decoder.name()) {
                    registry.register(decoder);
                }
            }
        }

        registry
    }

    pub fn register(&mut self, decoder: Arc<dyn DecodePlugin>) {
        info!("Registered decoder: {} ({})", decoder.name(), decoder.protocol());
        self.decoders.push(decoder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.iter().any(|d| d.name() == name)
    }

    /// Decoder names in routing order
    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// First decoder that claims the payload
    pub fn select(&self, payload: &[u8], metadata: &Metadata) -> Option<&Arc<dyn DecodePlugin>> {
        self.decoders.iter().find(|d| d.accepts(payload, metadata))
    }

    pub fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        self.select(payload, metadata)
            .ok_or(DecodeError::NoDecoder)?
            .decode(payload, metadata)
    }
}

fn decoder_for(protocol: Protocol, dictionary: &Arc<Dictionary>) -> Option<Arc<dyn DecodePlugin>> {
    let decoder: Arc<dyn DecodePlugin> = match protocol {
        Protocol::Cap => Arc::new(CapDecoder::new()),
        Protocol::Map => Arc::new(MapDecoder::new()),
        Protocol::Inap => Arc::new(InapDecoder::new()),
        Protocol::Diameter => Arc::new(DiameterDecoder::new(dictionary.clone())),
        Protocol::GtpV1C => Arc::new(GtpDecoder::v1(dictionary.clone())),
        Protocol::GtpV2C => Arc::new(GtpDecoder::v2(dictionary.clone())),
        Protocol::Pfcp => Arc::new(PfcpDecoder::new(dictionary.clone())),
        Protocol::S1ap => Arc::new(ApDecoder::s1ap()),
        Protocol::Ngap => Arc::new(ApDecoder::ngap()),
        Protocol::Nas4g => Arc::new(NasDecoder::eps()),
        Protocol::Nas5g => Arc::new(NasDecoder::five_g()),
        Protocol::Http2 | Protocol::Unknown => return None,
    };
    Some(decoder)
}

/// Decodes every captured packet and forwards messages to a bounded sink
///
/// By default a full sink drops the message rather than stalling live
/// capture. A lossless processor waits for room instead.
pub struct RoutingProcessor {
    registry: Arc<DecoderRegistry>,
    sink: mpsc::Sender<Message>,
    health: Option<Arc<HealthCheck>>,
    metrics: SharedMetrics,
    lossless: bool,
}

impl RoutingProcessor {
    pub fn new(registry: Arc<DecoderRegistry>, sink: mpsc::Sender<Message>) -> Self {
        Self {
            registry,
            sink,
            health: None,
            metrics: create_metrics(),
            lossless: false,
        }
    }

    /// Wait for sink capacity instead of dropping; for one-shot file decoding
    pub fn lossless(mut self) -> Self {
        self.lossless = true;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthCheck>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }
}

impl PluginInfo for RoutingProcessor {
    fn name(&self) -> &str {
        "decode-router"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Routes packet payloads to protocol decoders"
    }
}

#[async_trait]
impl PacketProcessor for RoutingProcessor {
    async fn process(&self, packet: Arc<CapturedPacket>) -> PluginResult<()> {
        let decode = &self.metrics.decode;

        match self.registry.decode(packet.payload(), &packet.metadata) {
            Ok(message) => {
                decode.messages_decoded.fetch_add(1, Ordering::Relaxed);
                if let Some(health) = &self.health {
                    health.record_message();
                }
                trace!(
                    "Decoded {} {} from {}",
                    message.protocol,
                    message.message_type,
                    packet.interface_name
                );
                let sent = if self.lossless {
                    self.sink.send(message).await.map_err(|_| "sink closed")
                } else {
                    self.sink.try_send(message).map_err(|e| match e {
                        mpsc::error::TrySendError::Full(_) => "sink full",
                        mpsc::error::TrySendError::Closed(_) => "sink closed",
                    })
                };
                if let Err(reason) = sent {
                    decode.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    trace!("Message dropped: {}", reason);
                }
            }
            Err(e) => {
                decode.decode_errors.fetch_add(1, Ordering::Relaxed);
                if let Some(health) = &self.health {
                    health.record_error(&e);
                }
                debug!("Decode failed for packet from {}: {}", packet.interface_name, e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigmon_core::config::HealthSettings;

    fn registry() -> DecoderRegistry {
        DecoderRegistry::from_settings(&DecodeSettings::default(), Arc::new(Dictionary::empty()))
    }

    fn packet(payload: &[u8]) -> Arc<CapturedPacket> {
        Arc::new(CapturedPacket {
            timestamp: Utc::now(),
            data: payload.to_vec(),
            length: payload.len(),
            source_ip: None,
            dest_ip: None,
            source_port: None,
            dest_port: None,
            transport: None,
            interface_name: "file:test".to_string(),
            metadata: Metadata::default(),
            payload_offset: 0,
        })
    }

    const CAP_END: [u8; 10] = [0x64, 0x08, 0x49, 0x04, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00];

    #[test]
    fn test_default_order() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                "cap-decoder",
                "map-decoder",
                "diameter-decoder",
                "gtpv1-decoder",
                "gtpv2-decoder",
                "pfcp-decoder",
                "s1ap-decoder",
                "ngap-decoder",
                "nas4g-decoder",
                "nas5g-decoder",
            ]
        );
    }

    #[test]
    fn test_configured_order_decides_tcap_owner() {
        let dictionary = Arc::new(Dictionary::empty());
        let cap_first = registry();
        assert_eq!(cap_first.decode(&CAP_END, &Metadata::default()).unwrap().protocol, Protocol::Cap);

        let settings = DecodeSettings {
            protocols: vec!["map".into(), "cap".into()],
            ..Default::default()
        };
        let map_first = DecoderRegistry::from_settings(&settings, dictionary);
        assert_eq!(map_first.decode(&CAP_END, &Metadata::default()).unwrap().protocol, Protocol::Map);
    }

    #[test]
    fn test_generations_register_separately_and_unknown_names_are_skipped() {
        let settings = DecodeSettings {
            protocols: vec![
                "gtpv2c".into(),
                "gtp".into(),
                "nas5g".into(),
                "inap".into(),
                "http2".into(),
                "bogus".into(),
                "nas".into(),
            ],
            ..Default::default()
        };
        let registry = DecoderRegistry::from_settings(&settings, Arc::new(Dictionary::empty()));
        assert_eq!(
            registry.names(),
            vec![
                "gtpv2-decoder",
                "gtpv1-decoder",
                "nas5g-decoder",
                "inap-decoder",
                "nas4g-decoder",
            ]
        );
    }

    /// One representative payload per decoder, routed through the default registry
    fn samples() -> Vec<(Protocol, Vec<u8>)> {
        let mut diameter = vec![0x01, 0x00, 0x00, 0x14, 0x80, 0x00, 0x01, 0x18];
        diameter.extend_from_slice(&[0u8; 12]);
        let tcap_begin = vec![
            0x62, 0x10, 0x6c, 0x0e, 0xa1, 0x0c, 0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x30, 0x04,
            0x00, 0x00, 0x00, 0x00,
        ];
        vec![
            (Protocol::Cap, CAP_END.to_vec()),
            (Protocol::Cap, tcap_begin),
            (Protocol::Diameter, diameter),
            (Protocol::GtpV1C, vec![0x32, 0x01, 0x00, 0x04, 0, 0, 0, 0, 0x00, 0x01, 0, 0]),
            (Protocol::GtpV2C, vec![0x40, 0x01, 0x00, 0x04, 0x00, 0x00, 0x01, 0x00]),
            (Protocol::Pfcp, vec![0x20, 0x01, 0x00, 0x04, 0x00, 0x00, 0x01, 0x00]),
            (Protocol::S1ap, vec![0x00, 0x0c, 0x40, 0x03, 0x00, 0x00, 0x00]),
            (Protocol::Nas4g, vec![0x07, 0x41, 0x00]),
            (Protocol::Nas4g, vec![0x02, 0xcd, 0x00]),
            (Protocol::Nas5g, vec![0x0F, 0x42, 0x01, 0x00]),
        ]
    }

    #[test]
    fn test_messages_carry_their_decoders_protocol() {
        let registry = registry();
        let meta = Metadata::default();

        for (expected, payload) in samples() {
            let decoder = registry.select(&payload, &meta).unwrap();
            let msg = decoder.decode(&payload, &meta).unwrap();
            assert_eq!(msg.protocol, decoder.protocol(), "{}", decoder.name());
            assert_eq!(msg.protocol, expected, "{}", decoder.name());
        }

        let settings = DecodeSettings {
            protocols: vec!["inap".into()],
            ..Default::default()
        };
        let inap = DecoderRegistry::from_settings(&settings, Arc::new(Dictionary::empty()));
        let decoder = inap.select(&CAP_END, &meta).unwrap();
        assert_eq!(decoder.decode(&CAP_END, &meta).unwrap().protocol, Protocol::Inap);
    }

    #[test]
    fn test_every_decoder_reports_its_own_protocol() {
        let registry = registry();
        let meta = Metadata::default();

        for decoder in &registry.decoders {
            for (_, payload) in samples() {
                if !decoder.can_decode(&payload) {
                    continue;
                }
                if let Ok(msg) = decoder.decode(&payload, &meta) {
                    assert_eq!(msg.protocol, decoder.protocol(), "{}", decoder.name());
                }
            }
        }
    }

    #[test]
    fn test_sctp_port_picks_ngap_over_s1ap() {
        let registry = registry();
        let payload = [0x00, 0x0f, 0x40, 0x03, 0x00, 0x00, 0x00];
        let meta = Metadata {
            dest_port: Some(crate::ngap::NGAP_SCTP_PORT),
            transport_proto: Some(sigmon_core::Transport::Sctp),
            ..Default::default()
        };
        let msg = registry.decode(&payload, &meta).unwrap();
        assert_eq!(msg.protocol, Protocol::Ngap);
        assert_eq!(msg.message_name, "InitialUEMessage");

        let msg = registry.decode(&payload, &Metadata::default()).unwrap();
        assert_eq!(msg.protocol, Protocol::S1ap);
    }

    #[test]
    fn test_routes_by_payload() {
        let registry = registry();
        let meta = Metadata::default();

        let nas = registry.decode(&[0x07, 0x41, 0x00], &meta).unwrap();
        assert_eq!(nas.protocol, Protocol::Nas4g);

        let mut diameter = vec![0x01, 0x00, 0x00, 0x14, 0x80, 0x00, 0x01, 0x18];
        diameter.extend_from_slice(&[0u8; 12]);
        let msg = registry.decode(&diameter, &meta).unwrap();
        assert_eq!(msg.protocol, Protocol::Diameter);
        assert_eq!(msg.message_name, "DWR");
    }

    #[test]
    fn test_no_decoder() {
        let registry = registry();
        let err = registry.decode(&[0x30, 0x00, 0x00], &Metadata::default()).unwrap_err();
        assert_eq!(err, DecodeError::NoDecoder);
        assert!(DecoderRegistry::new().decode(&CAP_END, &Metadata::default()).is_err());
    }

    #[test]
    fn test_claimed_but_short_payload_is_typed_error() {
        let err = registry().decode(&[0x62, 0x01], &Metadata::default()).unwrap_err();
        assert_eq!(err.protocol(), Some(Protocol::Cap));
    }

    #[tokio::test]
    async fn test_processor_forwards_and_counts() {
        let (tx, mut rx) = mpsc::channel(8);
        let health = Arc::new(HealthCheck::new(HealthSettings::default()));
        let processor = RoutingProcessor::new(Arc::new(registry()), tx).with_health(health.clone());

        processor.process(packet(&CAP_END)).await.unwrap();
        processor.process(packet(&[0x30, 0x00, 0x00])).await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.message_type, "CAP_End");

        let stats = processor.metrics().decode.snapshot();
        assert_eq!(stats.messages_decoded, 1);
        assert_eq!(stats.decode_errors, 1);

        let status = health.status();
        assert_eq!(status.messages_processed, 1);
        assert_eq!(status.error_count, 1);
    }

    #[tokio::test]
    async fn test_full_sink_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let processor = RoutingProcessor::new(Arc::new(registry()), tx);

        for _ in 0..3 {
            processor.process(packet(&CAP_END)).await.unwrap();
        }

        let stats = processor.metrics().decode.snapshot();
        assert_eq!(stats.messages_decoded, 3);
        assert_eq!(stats.messages_dropped, 2);
    }

    #[tokio::test]
    async fn test_lossless_sink_waits_for_capacity() {
        let (tx, mut rx) = mpsc::channel(1);
        let lossless = Arc::new(RoutingProcessor::new(Arc::new(registry()), tx).lossless());
        lossless.process(packet(&CAP_END)).await.unwrap();

        let blocked = {
            let lossless = lossless.clone();
            tokio::spawn(async move { lossless.process(packet(&CAP_END)).await })
        };
        assert!(rx.recv().await.is_some());
        blocked.await.unwrap().unwrap();
        assert!(rx.recv().await.is_some());

        let stats = lossless.metrics().decode.snapshot();
        assert_eq!(stats.messages_decoded, 2);
        assert_eq!(stats.messages_dropped, 0);

        drop(rx);
        lossless.process(packet(&CAP_END)).await.unwrap();
        assert_eq!(lossless.metrics().decode.snapshot().messages_dropped, 1);
    }
}
