//! Ethernet / IPv4 / transport header parsing
//!
//! Parsing never fails: each layer that passes its length check fills in
//! more fields, and the payload window points after the last layer parsed.

use sigmon_core::Transport;

const ETHERNET_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPV4_MIN_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const TCP_MIN_HEADER_LEN: usize = 20;
const SCTP_COMMON_HEADER_LEN: usize = 12;
const SCTP_DATA_CHUNK_HEADER_LEN: usize = 16;
const SCTP_CHUNK_DATA: u8 = 0;

/// Fields recovered from one frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeaders {
    pub source_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub transport: Option<Transport>,
    /// Application payload window `[payload_offset, payload_end)`
    pub payload_offset: usize,
    pub payload_end: usize,
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn ipv4(bytes: &[u8]) -> String {
    format!("{}.{}.{}.{}", bytes[0], bytes[1], bytes[2], bytes[3])
}

/// Parse an Ethernet II frame
pub fn parse_frame(data: &[u8]) -> FrameHeaders {
    let mut headers = FrameHeaders {
        payload_end: data.len(),
        ..Default::default()
    };

    if data.len() < ETHERNET_LEN {
        return headers;
    }
    headers.payload_offset = ETHERNET_LEN;

    if be16(data, 12) != ETHERTYPE_IPV4 {
        return headers;
    }

    if data.len() < ETHERNET_LEN + IPV4_MIN_LEN {
        return headers;
    }

    let ip = &data[ETHERNET_LEN..];
    if ip[0] >> 4 != 4 {
        return headers;
    }

    let ihl = usize::from(ip[0] & 0x0F) * 4;
    let protocol = ip[9];
    headers.source_ip = Some(ipv4(&ip[12..16]));
    headers.dest_ip = Some(ipv4(&ip[16..20]));

    // Trim Ethernet trailer padding using the IPv4 total length
    let total_len = usize::from(be16(ip, 2));
    if total_len >= ihl.max(IPV4_MIN_LEN) {
        headers.payload_end = data.len().min(ETHERNET_LEN + total_len);
    }

    if ihl < IPV4_MIN_LEN {
        headers.payload_offset = ETHERNET_LEN + IPV4_MIN_LEN;
        return headers;
    }

    let l4 = ETHERNET_LEN + ihl;
    headers.payload_offset = l4.min(data.len());

    if ip.len() < ihl + 8 {
        return headers;
    }

    let transport = match Transport::from_ip_proto(protocol) {
        Some(t) => t,
        None => return headers,
    };

    headers.transport = Some(transport);
    headers.source_port = Some(be16(data, l4));
    headers.dest_port = Some(be16(data, l4 + 2));

    match transport {
        Transport::Udp => {
            headers.payload_offset = l4 + UDP_HEADER_LEN;
            let udp_len = usize::from(be16(data, l4 + 4));
            if udp_len >= UDP_HEADER_LEN {
                headers.payload_end = headers.payload_end.min(l4 + udp_len);
            }
        }
        Transport::Tcp => {
            if data.len() >= l4 + TCP_MIN_HEADER_LEN {
                let data_offset = usize::from(data[l4 + 12] >> 4) * 4;
                if data_offset >= TCP_MIN_HEADER_LEN {
                    headers.payload_offset = (l4 + data_offset).min(data.len());
                }
            }
        }
        Transport::Sctp => {
            let chunk = l4 + SCTP_COMMON_HEADER_LEN;
            if data.len() >= chunk {
                headers.payload_offset = chunk;
            }
            if data.len() >= chunk + SCTP_DATA_CHUNK_HEADER_LEN && data[chunk] == SCTP_CHUNK_DATA {
                headers.payload_offset = chunk + SCTP_DATA_CHUNK_HEADER_LEN;
                let chunk_len = usize::from(be16(data, chunk + 2));
                if chunk_len >= SCTP_DATA_CHUNK_HEADER_LEN {
                    headers.payload_end = headers.payload_end.min(chunk + chunk_len);
                }
            }
        }
    }

    headers.payload_end = headers.payload_end.max(headers.payload_offset);
    headers
}
