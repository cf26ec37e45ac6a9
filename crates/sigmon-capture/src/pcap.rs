//! Classic pcap file reader

use crate::CaptureError;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Magic read little-endian from a little-endian file
pub const MAGIC_NATIVE: u32 = 0xa1b2_c3d4;
/// Magic read little-endian from a big-endian file
pub const MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;

/// Upper bound on a record's captured length whatever the header snaplen says
pub const MAX_RECORD_LEN: usize = 262_144;

/// One packet record
#[derive(Debug, Clone)]
pub struct PcapRecord {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
    pub orig_len: usize,
}

/// Streaming reader over a pcap byte source
pub struct PcapReader<R> {
    inner: R,
    big_endian: bool,
    max_record_len: usize,
}

impl PcapReader<BufReader<tokio::fs::File>> {
    /// Open a file and validate its global header
    pub async fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = tokio::fs::File::open(path).await?;
        Self::new(BufReader::new(file)).await
    }
}

impl<R: AsyncRead + Unpin> PcapReader<R> {
    /// Consume and validate the 24-byte global header
    pub async fn new(mut inner: R) -> Result<Self, CaptureError> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        inner.read_exact(&mut header).await.map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                CaptureError::TruncatedHeader
            } else {
                CaptureError::Io(e)
            }
        })?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let big_endian = match magic {
            MAGIC_NATIVE => false,
            MAGIC_SWAPPED => true,
            other => return Err(CaptureError::InvalidMagic(other)),
        };

        let mut reader = Self {
            inner,
            big_endian,
            max_record_len: MAX_RECORD_LEN,
        };
        let snaplen = reader.field(&header[16..20]) as usize;
        if snaplen > 0 {
            reader.max_record_len = snaplen.min(MAX_RECORD_LEN);
        }
        Ok(reader)
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Largest captured length accepted per record
    pub fn max_record_len(&self) -> usize {
        self.max_record_len
    }

    fn field(&self, bytes: &[u8]) -> u32 {
        let b = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        }
    }

    /// Next record; `None` at end of file or on a short read
    pub async fn next_record(&mut self) -> Result<Option<PcapRecord>, CaptureError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        if !read_full(&mut self.inner, &mut header).await? {
            return Ok(None);
        }

        let ts_sec = self.field(&header[0..4]);
        let ts_usec = self.field(&header[4..8]);
        let incl_len = self.field(&header[8..12]) as usize;
        let orig_len = self.field(&header[12..16]) as usize;

        if incl_len > self.max_record_len {
            return Err(CaptureError::OversizedRecord {
                incl_len,
                limit: self.max_record_len,
            });
        }

        let mut data = vec![0u8; incl_len];
        if !read_full(&mut self.inner, &mut data).await? {
            return Ok(None);
        }

        let timestamp = DateTime::<Utc>::from_timestamp(i64::from(ts_sec), ts_usec.saturating_mul(1000))
            .unwrap_or_default();

        Ok(Some(PcapRecord {
            timestamp,
            data,
            orig_len,
        }))
    }
}

/// Fill `buf`; false when the source ends first
async fn read_full<R: AsyncRead + Unpin>(inner: &mut R, buf: &mut [u8]) -> Result<bool, CaptureError> {
    match inner.read_exact(buf).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(CaptureError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::PcapWriter;

    fn capture(big_endian: bool, frames: &[&[u8]]) -> Vec<u8> {
        let mut writer = if big_endian {
            PcapWriter::new_big_endian(Vec::new()).unwrap()
        } else {
            PcapWriter::new(Vec::new()).unwrap()
        };
        for (i, frame) in frames.iter().enumerate() {
            writer.write_record(1_700_000_000 + i as u32, 250, frame).unwrap();
        }
        writer.into_inner()
    }

    async fn count(bytes: Vec<u8>) -> Result<usize, CaptureError> {
        let mut reader = PcapReader::new(bytes.as_slice()).await?;
        let mut n = 0;
        while reader.next_record().await?.is_some() {
            n += 1;
        }
        Ok(n)
    }

    #[tokio::test]
    async fn test_reads_little_endian_records() {
        let bytes = capture(false, &[&[1u8; 60], &[2u8; 80]]);
        let mut reader = PcapReader::new(bytes.as_slice()).await.unwrap();
        assert!(!reader.is_big_endian());

        let first = reader.next_record().await.unwrap().unwrap();
        assert_eq!(first.data.len(), 60);
        assert_eq!(first.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(first.timestamp.timestamp_subsec_micros(), 250);

        let second = reader.next_record().await.unwrap().unwrap();
        assert_eq!(second.data, vec![2u8; 80]);
        assert!(reader.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_big_endian_records() {
        let bytes = capture(true, &[&[7u8; 42]]);
        let mut reader = PcapReader::new(bytes.as_slice()).await.unwrap();
        assert!(reader.is_big_endian());
        let rec = reader.next_record().await.unwrap().unwrap();
        assert_eq!(rec.data.len(), 42);
        assert_eq!(rec.orig_len, 42);
    }

    #[tokio::test]
    async fn test_invalid_magic() {
        let mut bytes = capture(false, &[&[0u8; 20]]);
        bytes[0] = 0x0a;
        bytes[1] = 0x0d;
        bytes[2] = 0x0d;
        bytes[3] = 0x0a;
        let err = PcapReader::new(bytes.as_slice()).await.err().unwrap();
        assert!(matches!(err, CaptureError::InvalidMagic(0x0a0d_0d0a)));
    }

    #[tokio::test]
    async fn test_truncated_last_record_is_not_counted() {
        let mut bytes = capture(false, &[&[1u8; 60], &[2u8; 60], &[3u8; 60]]);
        bytes.truncate(bytes.len() - 10);
        assert_eq!(count(bytes).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_partial_record_header_ends_file() {
        let mut bytes = capture(false, &[&[1u8; 30]]);
        bytes.extend_from_slice(&[0u8; 7]);
        assert_eq!(count(bytes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_record_length_is_rejected() {
        let mut bytes = capture(false, &[&[1u8; 40], &[2u8; 40]]);
        // Second record's incl_len claims 4 GB
        let second = GLOBAL_HEADER_LEN + RECORD_HEADER_LEN + 40;
        bytes[second + 8..second + 12].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut reader = PcapReader::new(bytes.as_slice()).await.unwrap();
        assert_eq!(reader.max_record_len(), 65535);
        assert!(reader.next_record().await.unwrap().is_some());
        let err = reader.next_record().await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::OversizedRecord {
                incl_len: 0xffff_ffff,
                limit: 65535
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_snaplen_falls_back_to_cap() {
        let mut bytes = capture(true, &[&[5u8; 70_000]]);
        bytes[16..20].copy_from_slice(&0u32.to_be_bytes());
        let mut reader = PcapReader::new(bytes.as_slice()).await.unwrap();
        assert_eq!(reader.max_record_len(), MAX_RECORD_LEN);
        assert_eq!(reader.next_record().await.unwrap().unwrap().data.len(), 70_000);
    }

    #[tokio::test]
    async fn test_short_global_header() {
        let bytes = vec![0xd4, 0xc3, 0xb2, 0xa1, 0x02];
        let err = PcapReader::new(bytes.as_slice()).await.err().unwrap();
        assert!(matches!(err, CaptureError::TruncatedHeader));
    }
}
