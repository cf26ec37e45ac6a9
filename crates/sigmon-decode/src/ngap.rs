//! NG Application Protocol (gNB <-> AMF) tables

use crate::aper::{ApDecoder, ApProfile, Initiator, UeIdField};
use crate::nas::NasDecoder;
use sigmon_core::Protocol;

pub const NGAP_SCTP_PORT: u16 = 38412;

pub const IE_AMF_UE_NGAP_ID: u16 = 10;
pub const IE_CAUSE: u16 = 15;
pub const IE_NAS_PDU: u16 = 38;
pub const IE_RAN_UE_NGAP_ID: u16 = 85;

pub fn procedure_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0 => "AMFConfigurationUpdate",
        1 => "AMFStatusIndication",
        2 => "CellTrafficTrace",
        3 => "DeactivateTrace",
        4 => "DownlinkNASTransport",
        5 => "DownlinkNonUEAssociatedNRPPaTransport",
        6 => "DownlinkRANConfigurationTransfer",
        7 => "DownlinkRANStatusTransfer",
        8 => "DownlinkUEAssociatedNRPPaTransport",
        9 => "ErrorIndication",
        10 => "HandoverCancel",
        11 => "HandoverNotification",
        12 => "HandoverPreparation",
        13 => "HandoverResourceAllocation",
        14 => "InitialContextSetup",
        15 => "InitialUEMessage",
        16 => "LocationReportingControl",
        17 => "LocationReportingFailureIndication",
        18 => "LocationReport",
        19 => "NASNonDeliveryIndication",
        20 => "NGReset",
        21 => "NGSetup",
        22 => "OverloadStart",
        23 => "OverloadStop",
        24 => "Paging",
        25 => "PathSwitchRequest",
        26 => "PDUSessionResourceModify",
        27 => "PDUSessionResourceModifyIndication",
        28 => "PDUSessionResourceRelease",
        29 => "PDUSessionResourceSetup",
        30 => "PDUSessionResourceNotify",
        31 => "PrivateMessage",
        32 => "PWSCancel",
        33 => "PWSFailureIndication",
        34 => "PWSRestartIndication",
        35 => "RANConfigurationUpdate",
        36 => "RerouteNASRequest",
        37 => "RRCInactiveTransitionReport",
        38 => "TraceFailureIndication",
        39 => "TraceStart",
        40 => "UEContextModification",
        41 => "UEContextRelease",
        42 => "UEContextReleaseRequest",
        43 => "UERadioCapabilityCheck",
        44 => "UERadioCapabilityInfoIndication",
        45 => "UETNLABindingRelease",
        46 => "UplinkNASTransport",
        47 => "UplinkNonUEAssociatedNRPPaTransport",
        48 => "UplinkRANConfigurationTransfer",
        49 => "UplinkRANStatusTransfer",
        50 => "UplinkUEAssociatedNRPPaTransport",
        51 => "WriteReplaceWarning",
        _ => return None,
    })
}

pub fn initiator(code: u8) -> Initiator {
    match code {
        2 | 10 | 11 | 12 | 15 | 17 | 18 | 19 | 21 | 25 | 27 | 30 | 33 | 34 | 35 | 37 | 38
        | 42 | 44 | 46 | 47 | 48 | 49 | 50 => Initiator::Ran,
        0 | 1 | 3 | 4 | 5 | 6 | 7 | 8 | 13 | 14 | 16 | 22 | 23 | 24 | 26 | 28 | 29 | 32 | 36
        | 39 | 40 | 41 | 43 | 45 | 51 => Initiator::Core,
        _ => Initiator::Unknown,
    }
}

pub fn ie_name(id: u16) -> Option<&'static str> {
    Some(match id {
        0 => "AllowedNSSAI",
        1 => "AMFName",
        IE_AMF_UE_NGAP_ID => "AMF-UE-NGAP-ID",
        IE_CAUSE => "Cause",
        21 => "DefaultPagingDRX",
        26 => "FiveG-S-TMSI",
        27 => "GlobalRANNodeID",
        IE_NAS_PDU => "NAS-PDU",
        80 => "PLMNSupportList",
        82 => "RANNodeName",
        IE_RAN_UE_NGAP_ID => "RAN-UE-NGAP-ID",
        86 => "RelativeAMFCapacity",
        90 => "RRCEstablishmentCause",
        96 => "ServedGUAMIList",
        102 => "SupportedTAList",
        121 => "UserLocationInformation",
        _ => return None,
    })
}

pub static NGAP: ApProfile = ApProfile {
    protocol: Protocol::Ngap,
    label: "NGAP",
    decoder_name: "ngap-decoder",
    description: "NG Application Protocol (gNB-AMF), header level with embedded NAS",
    sctp_port: NGAP_SCTP_PORT,
    sibling_port: crate::s1ap::S1AP_SCTP_PORT,
    ran_node: "gNB",
    core_node: "AMF",
    procedure_name,
    initiator,
    ie_name,
    core_ue_id: UeIdField {
        ie: IE_AMF_UE_NGAP_ID,
        length_bits: 3,
    },
    ran_ue_id: UeIdField {
        ie: IE_RAN_UE_NGAP_ID,
        length_bits: 2,
    },
    nas_pdu_ie: IE_NAS_PDU,
    cause_ie: IE_CAUSE,
    nas: NasDecoder::five_g,
};

impl ApDecoder {
    pub fn ngap() -> Self {
        Self::with_profile(&NGAP)
    }
}
