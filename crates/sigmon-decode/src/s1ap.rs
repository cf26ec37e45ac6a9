//! S1 Application Protocol (eNB <-> MME) tables

use crate::aper::{ApDecoder, ApProfile, Initiator, UeIdField};
use crate::nas::NasDecoder;
use sigmon_core::Protocol;

pub const S1AP_SCTP_PORT: u16 = 36412;

pub const IE_MME_UE_S1AP_ID: u16 = 0;
pub const IE_CAUSE: u16 = 2;
pub const IE_ENB_UE_S1AP_ID: u16 = 8;
pub const IE_NAS_PDU: u16 = 26;

pub fn procedure_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0 => "HandoverPreparation",
        1 => "HandoverResourceAllocation",
        2 => "HandoverNotification",
        3 => "PathSwitchRequest",
        4 => "HandoverCancel",
        5 => "E-RABSetup",
        6 => "E-RABModify",
        7 => "E-RABRelease",
        8 => "E-RABReleaseIndication",
        9 => "InitialContextSetup",
        10 => "Paging",
        11 => "DownlinkNASTransport",
        12 => "InitialUEMessage",
        13 => "UplinkNASTransport",
        14 => "Reset",
        15 => "ErrorIndication",
        16 => "NASNonDeliveryIndication",
        17 => "S1Setup",
        18 => "UEContextReleaseRequest",
        19 => "DownlinkS1cdma2000tunnelling",
        20 => "UplinkS1cdma2000tunnelling",
        21 => "UEContextModification",
        22 => "UECapabilityInfoIndication",
        23 => "UEContextRelease",
        24 => "eNBStatusTransfer",
        25 => "MMEStatusTransfer",
        26 => "DeactivateTrace",
        27 => "TraceStart",
        28 => "TraceFailureIndication",
        29 => "ENBConfigurationUpdate",
        30 => "MMEConfigurationUpdate",
        31 => "LocationReportingControl",
        32 => "LocationReportingFailureIndication",
        33 => "LocationReport",
        34 => "OverloadStart",
        35 => "OverloadStop",
        36 => "WriteReplaceWarning",
        37 => "eNBDirectInformationTransfer",
        38 => "MMEDirectInformationTransfer",
        39 => "PrivateMessage",
        40 => "eNBConfigurationTransfer",
        41 => "MMEConfigurationTransfer",
        42 => "CellTrafficTrace",
        43 => "Kill",
        44 => "DownlinkUEAssociatedLPPaTransport",
        45 => "UplinkUEAssociatedLPPaTransport",
        46 => "DownlinkNonUEAssociatedLPPaTransport",
        47 => "UplinkNonUEAssociatedLPPaTransport",
        _ => return None,
    })
}

pub fn initiator(code: u8) -> Initiator {
    match code {
        0 | 2 | 3 | 4 | 8 | 12 | 13 | 16 | 17 | 18 | 20 | 22 | 24 | 28 | 29 | 32 | 33 | 37
        | 40 | 42 | 45 | 47 => Initiator::Ran,
        1 | 5 | 6 | 7 | 9 | 10 | 11 | 19 | 21 | 23 | 25 | 26 | 27 | 30 | 31 | 34 | 35 | 36
        | 38 | 41 | 43 | 44 | 46 => Initiator::Core,
        _ => Initiator::Unknown,
    }
}

pub fn ie_name(id: u16) -> Option<&'static str> {
    Some(match id {
        IE_MME_UE_S1AP_ID => "MME-UE-S1AP-ID",
        IE_CAUSE => "Cause",
        IE_ENB_UE_S1AP_ID => "eNB-UE-S1AP-ID",
        24 => "E-RABToBeSetupListCtxtSUReq",
        IE_NAS_PDU => "NAS-PDU",
        59 => "Global-ENB-ID",
        60 => "eNBname",
        61 => "MMEname",
        64 => "SupportedTAs",
        66 => "UEAggregateMaximumBitrate",
        67 => "TAI",
        73 => "SecurityKey",
        87 => "RelativeMMECapacity",
        96 => "S-TMSI",
        99 => "UE-S1AP-IDs",
        100 => "EUTRAN-CGI",
        105 => "ServedGUMMEIs",
        107 => "UESecurityCapabilities",
        134 => "RRC-Establishment-Cause",
        137 => "DefaultPagingDRX",
        _ => return None,
    })
}

pub static S1AP: ApProfile = ApProfile {
    protocol: Protocol::S1ap,
    label: "S1AP",
    decoder_name: "s1ap-decoder",
    description: "S1 Application Protocol (eNB-MME), header level with embedded NAS",
    sctp_port: S1AP_SCTP_PORT,
    sibling_port: crate::ngap::NGAP_SCTP_PORT,
    ran_node: "eNB",
    core_node: "MME",
    procedure_name,
    initiator,
    ie_name,
    core_ue_id: UeIdField {
        ie: IE_MME_UE_S1AP_ID,
        length_bits: 2,
    },
    ran_ue_id: UeIdField {
        ie: IE_ENB_UE_S1AP_ID,
        length_bits: 2,
    },
    nas_pdu_ie: IE_NAS_PDU,
    cause_ie: IE_CAUSE,
    nas: NasDecoder::eps,
};

impl ApDecoder {
    pub fn s1ap() -> Self {
        Self::with_profile(&S1AP)
    }
}
