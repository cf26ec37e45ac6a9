//! Synthetic frames and capture files
//!
//! Builds Ethernet/IPv4/{UDP,TCP,SCTP} frames around a signaling payload and
//! writes them into classic pcap files, so the pipeline can be exercised
//! without a mirrored interface.

use std::io::{self, Write};

/// Ethernet + IPv4 header for a transport segment of `l4_len` bytes
pub fn ethernet_ipv4(src: [u8; 4], dst: [u8; 4], protocol: u8, l4_len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(34 + l4_len);

    // Ethernet: dst MAC, src MAC, EtherType IPv4
    frame.extend_from_slice(&[0x00, 0x1b, 0x21, 0x00, 0x00, 0x02]);
    frame.extend_from_slice(&[0x00, 0x1b, 0x21, 0x00, 0x00, 0x01]);
    frame.extend_from_slice(&[0x08, 0x00]);

    let total_len = (20 + l4_len) as u16;
    frame.push(0x45);
    frame.push(0x00);
    frame.extend_from_slice(&total_len.to_be_bytes());
    frame.extend_from_slice(&[0x00, 0x01, 0x40, 0x00]); // id, DF
    frame.push(64); // TTL
    frame.push(protocol);
    frame.extend_from_slice(&[0x00, 0x00]); // checksum left zero
    frame.extend_from_slice(&src);
    frame.extend_from_slice(&dst);

    frame
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Udp,
    Tcp,
    Sctp,
}

/// Builder for one synthetic frame
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    kind: Kind,
    src: [u8; 4],
    src_port: u16,
    dst: [u8; 4],
    dst_port: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    fn new(kind: Kind, src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self {
            kind,
            src,
            src_port,
            dst,
            dst_port,
            payload: Vec::new(),
        }
    }

    pub fn udp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self::new(Kind::Udp, src, src_port, dst, dst_port)
    }

    pub fn tcp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self::new(Kind::Tcp, src, src_port, dst, dst_port)
    }

    /// SCTP packet carrying the payload in a single DATA chunk
    pub fn sctp(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Self {
        Self::new(Kind::Sctp, src, src_port, dst, dst_port)
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut l4 = Vec::new();
        l4.extend_from_slice(&self.src_port.to_be_bytes());
        l4.extend_from_slice(&self.dst_port.to_be_bytes());

        let protocol = match self.kind {
            Kind::Udp => {
                let len = (8 + self.payload.len()) as u16;
                l4.extend_from_slice(&len.to_be_bytes());
                l4.extend_from_slice(&[0x00, 0x00]);
                l4.extend_from_slice(&self.payload);
                17
            }
            Kind::Tcp => {
                l4.extend_from_slice(&1u32.to_be_bytes()); // seq
                l4.extend_from_slice(&0u32.to_be_bytes()); // ack
                l4.push(0x50); // data offset 5 words
                l4.push(0x18); // PSH, ACK
                l4.extend_from_slice(&[0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
                l4.extend_from_slice(&self.payload);
                6
            }
            Kind::Sctp => {
                l4.extend_from_slice(&0x0102_0304u32.to_be_bytes()); // verification tag
                l4.extend_from_slice(&0u32.to_be_bytes()); // checksum
                let chunk_len = (16 + self.payload.len()) as u16;
                l4.push(0x00); // DATA
                l4.push(0x03); // B+E flags
                l4.extend_from_slice(&chunk_len.to_be_bytes());
                l4.extend_from_slice(&1u32.to_be_bytes()); // TSN
                l4.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // stream id, seq
                l4.extend_from_slice(&3u32.to_be_bytes()); // PPID M3UA
                l4.extend_from_slice(&self.payload);
                while l4.len() % 4 != 0 {
                    l4.push(0);
                }
                132
            }
        };

        let mut frame = ethernet_ipv4(self.src, self.dst, protocol, l4.len());
        frame.extend_from_slice(&l4);
        frame
    }
}

/// Writer for classic pcap files
pub struct PcapWriter<W: Write> {
    inner: W,
    big_endian: bool,
}

impl<W: Write> PcapWriter<W> {
    /// Little-endian file (magic bytes `d4 c3 b2 a1`)
    pub fn new(inner: W) -> io::Result<Self> {
        Self::with_byte_order(inner, false)
    }

    /// Big-endian file (magic bytes `a1 b2 c3 d4`)
    pub fn new_big_endian(inner: W) -> io::Result<Self> {
        Self::with_byte_order(inner, true)
    }

    fn with_byte_order(inner: W, big_endian: bool) -> io::Result<Self> {
        let mut writer = Self { inner, big_endian };
        writer.put_u32(0xa1b2_c3d4)?;
        writer.put_u16(2)?;
        writer.put_u16(4)?;
        writer.put_u32(0)?; // thiszone
        writer.put_u32(0)?; // sigfigs
        writer.put_u32(65535)?; // snaplen
        writer.put_u32(1)?; // LINKTYPE_ETHERNET
        Ok(writer)
    }

    fn put_u32(&mut self, v: u32) -> io::Result<()> {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.inner.write_all(&bytes)
    }

    fn put_u16(&mut self, v: u16) -> io::Result<()> {
        let bytes = if self.big_endian {
            v.to_be_bytes()
        } else {
            v.to_le_bytes()
        };
        self.inner.write_all(&bytes)
    }

    pub fn write_record(&mut self, ts_sec: u32, ts_usec: u32, frame: &[u8]) -> io::Result<()> {
        self.put_u32(ts_sec)?;
        self.put_u32(ts_usec)?;
        self.put_u32(frame.len() as u32)?;
        self.put_u32(frame.len() as u32)?;
        self.inner.write_all(frame)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
