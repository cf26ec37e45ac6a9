//! CAMEL Application Part decoder

use crate::tcap::{
    find_imsi, find_invoke, find_msisdn, find_return_error, find_service_key, is_tcap, TcapKind,
    MIN_TCAP_LEN,
};
use sigmon_core::{
    DecodeError, DecodePlugin, Message, MessageResult, Metadata, PluginInfo, Protocol,
};
use std::time::Instant;

/// Decodes CAP operations carried in TCAP
#[derive(Debug, Default)]
pub struct CapDecoder;

impl CapDecoder {
    pub fn new() -> Self {
        Self
    }
}

/// Operation name, fallback `CAP_Unknown_<code>`
pub fn operation_name(code: u8) -> String {
    let name = match code {
        0 => "InitialDP",
        1 => "AssistRequestInstructions",
        2 => "EstablishTemporaryConnection",
        3 => "DisconnectForwardConnection",
        4 => "ConnectToResource",
        5 => "Connect",
        6 => "ReleaseCall",
        7 => "RequestReportBCSMEvent",
        8 => "EventReportBCSM",
        9 => "CollectInformation",
        10 => "Continue",
        11 => "InitiateCallAttempt",
        12 => "ApplyCharging",
        13 => "ApplyChargingReport",
        14 => "CallInformationRequest",
        15 => "CallInformationReport",
        16 => "PlayAnnouncement",
        17 => "PromptAndCollectUserInformation",
        18 => "SpecializedResourceReport",
        19 => "Cancel",
        20 => "ActivityTest",
        22 => "InitialDPSMS",
        23 => "FurnishChargingInformation",
        24 => "ConnectSMS",
        25 => "RequestReportSMSEvent",
        26 => "EventReportSMS",
        27 => "ContinueSMS",
        28 => "ReleaseSMS",
        31 => "CallGap",
        32 => "ActivateServiceFiltering",
        33 => "ServiceFilteringResponse",
        _ => return format!("CAP_Unknown_{}", code),
    };
    name.to_string()
}

/// CAMEL phase that introduced an operation code
pub fn phase(code: u8) -> u8 {
    match code {
        0..=8 => 1,
        9..=13 => 2,
        14..=17 => 3,
        _ => 4,
    }
}

/// Error text, fallback `CAP_Error_<code>`
pub fn error_text(code: u8) -> String {
    let text = match code {
        0 => "Canceled",
        1 => "CancelFailed",
        3 => "RequestedInfoError",
        4 => "SystemFailure",
        5 => "TaskRefused",
        6 => "UnavailableResource",
        7 => "UnexpectedComponentSequence",
        8 => "UnexpectedDataValue",
        9 => "UnexpectedParameter",
        10 => "UnknownLegID",
        11 => "UnknownPDPID",
        12 => "UnknownCSID",
        _ => return format!("CAP_Error_{}", code),
    };
    text.to_string()
}

impl PluginInfo for CapDecoder {
    fn name(&self) -> &str {
        "cap-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "CAMEL Application Part (phases 1-4) over TCAP"
    }
}

impl DecodePlugin for CapDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Cap
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        is_tcap(payload)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        if payload.len() < MIN_TCAP_LEN {
            return Err(DecodeError::insufficient(
                Protocol::Cap,
                MIN_TCAP_LEN,
                payload.len(),
            ));
        }

        let kind = TcapKind::from_tag(payload[0]);
        let mut msg = Message::new(Protocol::Cap, payload, metadata);
        msg.message_type = format!("CAP_{}", kind.suffix());
        msg.direction = kind.direction();
        msg.source.element_type = "MSC/SSF".to_string();
        msg.destination.element_type = "gsmSCF".to_string();

        match find_invoke(payload) {
            Some(invoke) => {
                let component = &payload[invoke.offset..];
                msg.message_name = operation_name(invoke.opcode);
                msg.detail("operation_code", invoke.opcode);
                msg.detail("cap_phase", phase(invoke.opcode));

                if let Some(key) = find_service_key(component) {
                    msg.detail("service_key", key);
                }
                msg.imsi = find_imsi(component);
                msg.msisdn = find_msisdn(component);
            }
            None => msg.message_name = msg.message_type.clone(),
        }

        if kind == TcapKind::Abort {
            msg.fail(0, "TC_Abort");
        }

        match find_return_error(payload) {
            Some(code) => msg.fail(i64::from(code), error_text(code)),
            None if kind == TcapKind::End => msg.result = MessageResult::Success,
            None => {}
        }

        Ok(msg.finish(started))
    }
}
