//! Intelligent Network Application Part decoder

use crate::tcap::{
    find_invoke, find_msisdn, find_party_number, find_return_error, find_service_key, is_tcap,
    TcapKind, MIN_TCAP_LEN,
};
use sigmon_core::{
    DecodeError, DecodePlugin, Message, MessageResult, Metadata, PluginInfo, Protocol,
};
use std::time::Instant;

const TAG_CALLING_PARTY: u8 = 0x81;
const TAG_CALLED_PARTY: u8 = 0x82;

/// Decodes INAP (CS-1 to CS-3) operations carried in TCAP
#[derive(Debug, Default)]
pub struct InapDecoder;

impl InapDecoder {
    pub fn new() -> Self {
        Self
    }
}

/// Operation name, fallback `INAP_Unknown_<code>`
pub fn operation_name(code: u8) -> String {
    let name = match code {
        0 => "InitialDP",
        1 => "OriginationAttemptAuthorized",
        2 => "CollectedInformation",
        3 => "AnalyzedInformation",
        4 => "RouteSelectFailure",
        5 => "oCalledPartyBusy",
        6 => "oNoAnswer",
        7 => "oAnswer",
        8 => "oMidCall",
        9 => "oDisconnect",
        10 => "oAbandon",
        11 => "TermAttemptAuthorized",
        12 => "tBusy",
        13 => "tNoAnswer",
        14 => "tAnswer",
        15 => "tMidCall",
        16 => "tDisconnect",
        17 => "tAbandon",
        18 => "Connect",
        19 => "ConnectToResource",
        20 => "EstablishTemporaryConnection",
        21 => "DisconnectForwardConnection",
        22 => "ContinueWithArgument",
        23 => "ReleaseCall",
        24 => "RequestReportBCSMEvent",
        25 => "EventReportBCSM",
        27 => "PlayAnnouncement",
        28 => "PromptAndCollectUserInformation",
        29 => "SpecializedResourceReport",
        30 => "Cancel",
        31 => "ActivityTest",
        32 => "ServiceFilteringResponse",
        33 => "CallGap",
        34 => "CallInformationRequest",
        35 => "CallInformationReport",
        _ => return format!("INAP_Unknown_{}", code),
    };
    name.to_string()
}

/// Capability set that introduced an operation code
pub fn capability_set(code: u8) -> &'static str {
    match code {
        0..=17 => "CS-1",
        18..=26 => "CS-2",
        _ => "CS-3",
    }
}

/// Error text, fallback `INAP_Error_<code>`
pub fn error_text(code: u8) -> String {
    let text = match code {
        0 => "Canceled",
        1 => "CancelFailed",
        2 => "ETCFailed",
        3 => "ImproperCallerResponse",
        4 => "MissingCustomerRecord",
        5 => "MissingParameter",
        6 => "ParameterOutOfRange",
        7 => "RequestedInfoError",
        8 => "SystemFailure",
        9 => "TaskRefused",
        10 => "UnavailableResource",
        11 => "UnexpectedComponentSequence",
        12 => "UnexpectedDataValue",
        13 => "UnexpectedParameter",
        14 => "UnknownLegID",
        15 => "UnknownCSID",
        _ => return format!("INAP_Error_{}", code),
    };
    text.to_string()
}

impl PluginInfo for InapDecoder {
    fn name(&self) -> &str {
        "inap-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Intelligent Network Application Part (CS-1 to CS-3) over TCAP"
    }
}

impl DecodePlugin for InapDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Inap
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        is_tcap(payload)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        if payload.len() < MIN_TCAP_LEN {
            return Err(DecodeError::insufficient(
                Protocol::Inap,
                MIN_TCAP_LEN,
                payload.len(),
            ));
        }

        let kind = TcapKind::from_tag(payload[0]);
        let mut msg = Message::new(Protocol::Inap, payload, metadata);
        msg.message_type = format!("INAP_{}", kind.suffix());
        msg.direction = kind.direction();
        msg.source.element_type = "SSP".to_string();
        msg.destination.element_type = "SCP".to_string();

        match find_invoke(payload) {
            Some(invoke) => {
                let component = &payload[invoke.offset..];
                msg.message_name = operation_name(invoke.opcode);
                msg.detail("operation_code", invoke.opcode);
                msg.detail("capability_set", capability_set(invoke.opcode));

                if let Some(key) = find_service_key(component) {
                    msg.detail("service_key", key);
                }
                msg.msisdn = find_party_number(component, TAG_CALLING_PARTY)
                    .or_else(|| find_msisdn(component));
                if let Some(called) = find_party_number(component, TAG_CALLED_PARTY) {
                    msg.detail("called_party", called);
                }
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
