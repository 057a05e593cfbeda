//! On-disk history entry header and sidecar index record.
//!
//! # Disk Format
//!
//! ```text
//! header (76 bytes, little-endian, packed):
//!   block_num: u32 ∥ block_id: [u8; 32] ∥ previous_id: [u8; 32] ∥ payload_size: u64
//! index record (84 bytes): header ∥ file_position: u64
//! ```
//!
//! Index record K at file offset K * 84 describes block `begin_block + K`;
//! `file_position` is the offset of the entry's header inside the data file.

use crate::codec::{put_u32, put_u64, ByteReader, CodecError};
use crate::ids::BlockId;

/// Serialized size of [`HistoryHeader`] in bytes.
pub const HEADER_SIZE: usize = 76;

/// Serialized size of [`IndexRecord`] in bytes.
pub const INDEX_RECORD_SIZE: usize = HEADER_SIZE + 8;

/// Fixed header written before every history log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryHeader {
    /// Sequential block number.
    pub block_num: u32,
    /// Identifier of this block.
    pub block_id: BlockId,
    /// Identifier of this block's parent.
    pub previous_id: BlockId,
    /// Number of payload bytes following the header in the data file.
    pub payload_size: u64,
}

impl HistoryHeader {
    /// Encode to the packed on-disk layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        put_u32(&mut buf, self.block_num);
        buf.extend_from_slice(self.block_id.as_bytes());
        buf.extend_from_slice(self.previous_id.as_bytes());
        put_u64(&mut buf, self.payload_size);
        buf.try_into().expect("header layout is exactly HEADER_SIZE")
    }

    /// Decode from the packed on-disk layout.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut r = ByteReader::new(buf);
        Self::read(&mut r).expect("fixed-size buffer always decodes")
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            block_num: r.u32()?,
            block_id: BlockId::from_bytes(r.array32()?),
            previous_id: BlockId::from_bytes(r.array32()?),
            payload_size: r.u64()?,
        })
    }
}

/// One sidecar index record: the entry header plus its data-file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Copy of the entry header.
    pub header: HistoryHeader,
    /// Offset of the entry header inside the data file.
    pub file_position: u64,
}

impl IndexRecord {
    /// Encode to the packed on-disk layout.
    pub fn encode(&self) -> [u8; INDEX_RECORD_SIZE] {
        let mut buf = Vec::with_capacity(INDEX_RECORD_SIZE);
        buf.extend_from_slice(&self.header.encode());
        put_u64(&mut buf, self.file_position);
        buf.try_into().expect("record layout is exactly INDEX_RECORD_SIZE")
    }

    /// Decode from the packed on-disk layout.
    pub fn decode(buf: &[u8; INDEX_RECORD_SIZE]) -> Self {
        let mut r = ByteReader::new(buf);
        let header = HistoryHeader::read(&mut r).expect("fixed-size buffer always decodes");
        let file_position = r.u64().expect("fixed-size buffer always decodes");
        Self { header, file_position }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> HistoryHeader {
        HistoryHeader {
            block_num: 100,
            block_id: BlockId::from_bytes([0xaa; 32]),
            previous_id: BlockId::from_bytes([0xbb; 32]),
            payload_size: 1234,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(HistoryHeader::decode(&encoded), header);
    }

    #[test]
    fn test_header_layout_is_little_endian() {
        let encoded = sample_header().encode();
        assert_eq!(&encoded[0..4], &100u32.to_le_bytes());
        assert_eq!(&encoded[4..36], &[0xaa; 32]);
        assert_eq!(&encoded[36..68], &[0xbb; 32]);
        assert_eq!(&encoded[68..76], &1234u64.to_le_bytes());
    }

    #[test]
    fn test_index_record_roundtrip() {
        let record = IndexRecord {
            header: sample_header(),
            file_position: 9876,
        };
        let encoded = record.encode();
        assert_eq!(encoded.len(), INDEX_RECORD_SIZE);
        assert_eq!(IndexRecord::decode(&encoded), record);
    }
}
