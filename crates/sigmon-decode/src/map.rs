//! Mobile Application Part decoder

use crate::tcap::{find_imsi, find_invoke, find_msisdn, find_return_error, is_tcap, TcapKind, MIN_TCAP_LEN};
use sigmon_core::{
    DecodeError, DecodePlugin, Message, MessageResult, Metadata, PluginInfo, Protocol,
};
use std::time::Instant;

/// Operation parsing is skipped for payloads this short
const MIN_OPERATION_LEN: usize = 21;

/// Decodes MAP operations carried in TCAP
#[derive(Debug, Default)]
pub struct MapDecoder;

impl MapDecoder {
    pub fn new() -> Self {
        Self
    }
}

pub fn operation_name(code: u8) -> String {
    let name = match code {
        2 => "UpdateLocation",
        3 => "CancelLocation",
        4 => "ProvideRoamingNumber",
        5 => "InsertSubscriberData",
        6 => "DeleteSubscriberData",
        7 => "SendParameters",
        8 => "RegisterSS",
        9 => "EraseSS",
        10 => "ActivateSS",
        11 => "DeactivateSS",
        12 => "InterrogateSS",
        13 => "ProcessUnstructuredSSRequest",
        22 => "SendRoutingInfo",
        23 => "UpdateGprsLocation",
        24 => "SendAuthenticationInfo",
        25 => "RestoreData",
        44 => "SendRoutingInfoForSM",
        45 => "MoForwardSM",
        46 => "MtForwardSM",
        54 => "AnyTimeInterrogation",
        55 => "AnyTimeSubscriptionInterrogation",
        56 => "AnyTimeModification",
        59 => "PrepareHandover",
        68 => "ProcessAccessRequest",
        70 => "SendIMSI",
        _ => return format!("MAP_Unknown_{}", code),
    };
    name.to_string()
}

/// Operation category used to place the two network elements
pub fn category(code: u8) -> &'static str {
    match code {
        2..=7 => "location",
        8..=19 => "supplementary_services",
        20..=30 => "subscriber_management",
        44..=46 => "sms",
        54..=59 => "roaming",
        _ => "other",
    }
}

fn roles(category: &str) -> (&'static str, &'static str) {
    match category {
        "location" => ("VLR", "HLR"),
        "subscriber_management" => ("HLR", "VLR"),
        "sms" => ("MSC", "SMSC"),
        "roaming" => ("MSC_VPLMN", "HLR_HPLMN"),
        _ => ("Unknown", "Unknown"),
    }
}

pub fn error_text(code: u8) -> String {
    let text = match code {
        1 => "Unknown Subscriber",
        3 => "Unknown MSC",
        4 => "Unidentified Subscriber",
        5 => "Absent Subscriber SM",
        6 => "Unknown Equipment",
        7 => "Roaming Not Allowed",
        8 => "Illegal Subscriber",
        9 => "Bearer Service Not Provisioned",
        10 => "Teleservice Not Provisioned",
        11 => "Illegal Equipment",
        12 => "Call Barred",
        21 => "Facility Not Supported",
        27 => "Absent Subscriber",
        34 => "System Failure",
        35 => "Data Missing",
        36 => "Unexpected Data Value",
        _ => return format!("MAP_Error_{}", code),
    };
    text.to_string()
}

impl PluginInfo for MapDecoder {
    fn name(&self) -> &str {
        "map-decoder"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "GSM/UMTS Mobile Application Part over TCAP"
    }
}

impl DecodePlugin for MapDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Map
    }

    fn can_decode(&self, payload: &[u8]) -> bool {
        is_tcap(payload)
    }

    fn decode(&self, payload: &[u8], metadata: &Metadata) -> Result<Message, DecodeError> {
        let started = Instant::now();

        if payload.len() < MIN_TCAP_LEN {
            return Err(DecodeError::insufficient(
                Protocol::Map,
                MIN_TCAP_LEN,
                payload.len(),
            ));
        }

        let kind = TcapKind::from_tag(payload[0]);
        let mut msg = Message::new(Protocol::Map, payload, metadata);
        msg.message_type = format!("TCAP_{}", kind.suffix());
        msg.direction = kind.direction();
        msg.message_name = msg.message_type.clone();

        let invoke = if payload.len() >= MIN_OPERATION_LEN {
            find_invoke(payload)
        } else {
            None
        };

        let category = match invoke {
            Some(invoke) => {
                let category = category(invoke.opcode);
                msg.message_name = operation_name(invoke.opcode);
                msg.detail("operation_code", invoke.opcode);
                msg.detail("operation_type", category);
                msg.imsi = find_imsi(payload);
                msg.msisdn = find_msisdn(payload);
                category
            }
            None => "other",
        };

        let (source, destination) = roles(category);
        msg.source.element_type = source.to_string();
        msg.destination.element_type = destination.to_string();

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
