//! WAL record codec
//!
//! # Record Layout (little-endian)
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬────────────┬──────────┬────────┬──────────────┬─────────┬──────────┐
//! │ tx_id:u64│ db_id:u64│ coll_len:u16 │ collection │ doc_id:u64│ op:u8 │ payload_len:u32│ payload │ crc32:u32│
//! └──────────┴──────────┴──────────────┴────────────┴──────────┴────────┴──────────────┴─────────┴──────────┘
//! ```
//!
//! The CRC covers every byte before it. Records are self-framing: decode
//! distinguishes "need more bytes" (a torn tail, expected after a crash)
//! from corruption (bad CRC, impossible lengths, unknown op).
//!
//! Sentinel kinds reuse the same layout: `Commit` has doc_id 0 and no
//! payload, `Checkpoint` carries the highest committed tx id in `tx_id`,
//! and the collection ops carry the target name in `collection`.

use quill_core::{DbId, DocId, Error, OpType, Result, TxId};

/// Fixed bytes before the collection name: tx_id + db_id + coll_len.
const PREFIX_LEN: usize = 8 + 8 + 2;
/// Fixed bytes between the collection name and the payload.
const MID_LEN: usize = 8 + 1 + 4;
/// CRC trailer.
const CRC_LEN: usize = 4;

/// Upper bound on collection names; larger values mean corruption.
const MAX_COLLECTION_LEN: usize = 4096;
/// Upper bound on payloads; larger values mean corruption.
const MAX_PAYLOAD_LEN: usize = 256 * 1024 * 1024;

/// One write-ahead log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// Transaction the record belongs to.
    pub tx_id: TxId,
    /// Logical database the record belongs to.
    pub db_id: DbId,
    /// Target collection ("" for Commit/Checkpoint).
    pub collection: String,
    /// Target document (0 for sentinels).
    pub doc_id: DocId,
    /// Operation kind.
    pub op: OpType,
    /// Document payload; empty for Delete and sentinels.
    pub payload: Vec<u8>,
}

impl WalRecord {
    /// Record for a mutating document operation.
    pub fn new(
        tx_id: TxId,
        db_id: DbId,
        collection: &str,
        doc_id: DocId,
        op: OpType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            tx_id,
            db_id,
            collection: collection.to_string(),
            doc_id,
            op,
            payload,
        }
    }

    /// Commit marker: marks `tx_id`'s records durable and applicable.
    pub fn commit(tx_id: TxId, db_id: DbId) -> Self {
        Self::new(tx_id, db_id, "", 0, OpType::Commit, Vec::new())
    }

    /// Checkpoint marker; its position in the log is the replay cut,
    /// `highest_committed` seeds the sequencer.
    pub fn checkpoint(highest_committed: TxId, db_id: DbId) -> Self {
        Self::new(highest_committed, db_id, "", 0, OpType::Checkpoint, Vec::new())
    }

    /// Collection creation record.
    pub fn create_collection(tx_id: TxId, db_id: DbId, name: &str) -> Self {
        Self::new(tx_id, db_id, name, 0, OpType::CreateCollection, Vec::new())
    }

    /// Collection deletion record.
    pub fn delete_collection(tx_id: TxId, db_id: DbId, name: &str) -> Self {
        Self::new(tx_id, db_id, name, 0, OpType::DeleteCollection, Vec::new())
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        PREFIX_LEN + self.collection.len() + MID_LEN + self.payload.len() + CRC_LEN
    }

    /// Encode to the wire layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.tx_id.to_le_bytes());
        buf.extend_from_slice(&self.db_id.to_le_bytes());
        buf.extend_from_slice(&(self.collection.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.collection.as_bytes());
        buf.extend_from_slice(&self.doc_id.to_le_bytes());
        buf.push(self.op.as_u8());
        buf.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode one record from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` holds a prefix of a record (torn
    /// tail), `Ok(Some((record, consumed)))` on success, and an error on
    /// corruption.
    pub fn decode(buf: &[u8]) -> Result<Option<(WalRecord, usize)>> {
        if buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let tx_id = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let db_id = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let coll_len = u16::from_le_bytes(buf[16..18].try_into().unwrap()) as usize;
        if coll_len > MAX_COLLECTION_LEN {
            return Err(Error::Corruption(format!(
                "WAL record claims collection name of {} bytes",
                coll_len
            )));
        }

        let mid_start = PREFIX_LEN + coll_len;
        if buf.len() < mid_start + MID_LEN {
            return Ok(None);
        }
        let collection = std::str::from_utf8(&buf[PREFIX_LEN..mid_start])
            .map_err(|_| Error::Corruption("WAL record collection name is not UTF-8".into()))?
            .to_string();
        let doc_id = u64::from_le_bytes(buf[mid_start..mid_start + 8].try_into().unwrap());
        let op_byte = buf[mid_start + 8];
        let payload_len = u32::from_le_bytes(
            buf[mid_start + 9..mid_start + 13].try_into().unwrap(),
        ) as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::Corruption(format!(
                "WAL record claims payload of {} bytes",
                payload_len
            )));
        }

        let total = mid_start + MID_LEN + payload_len + CRC_LEN;
        if buf.len() < total {
            return Ok(None);
        }
        let body_end = total - CRC_LEN;
        let stored_crc = u32::from_le_bytes(buf[body_end..total].try_into().unwrap());
        let crc = crc32fast::hash(&buf[..body_end]);
        if crc != stored_crc {
            return Err(Error::Corruption(format!(
                "WAL record CRC mismatch: stored {:08x}, computed {:08x}",
                stored_crc, crc
            )));
        }

        let op = match OpType::from_u8(op_byte) {
            Ok(op) => op,
            Err(_) => {
                return Err(Error::Corruption(format!(
                    "WAL record has unknown op type {}",
                    op_byte
                )))
            }
        };
        let payload = buf[mid_start + MID_LEN..body_end].to_vec();

        Ok(Some((
            WalRecord {
                tx_id,
                db_id,
                collection,
                doc_id,
                op,
                payload,
            },
            total,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WalRecord {
        WalRecord::new(7, 3, "users", 42, OpType::Create, br#"{"n":"a"}"#.to_vec())
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let record = sample();
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encoded_len());
        let (decoded, consumed) = WalRecord::decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_sentinels() {
        let commit = WalRecord::commit(9, 1);
        assert_eq!(commit.doc_id, 0);
        assert!(commit.payload.is_empty());
        let (decoded, _) = WalRecord::decode(&commit.encode()).unwrap().unwrap();
        assert_eq!(decoded.op, OpType::Commit);
        assert_eq!(decoded.tx_id, 9);

        let ckpt = WalRecord::checkpoint(100, 1);
        let (decoded, _) = WalRecord::decode(&ckpt.encode()).unwrap().unwrap();
        assert_eq!(decoded.op, OpType::Checkpoint);
        assert_eq!(decoded.tx_id, 100);
    }

    #[test]
    fn test_collection_ops_carry_name() {
        let rec = WalRecord::create_collection(5, 1, "orders");
        let (decoded, _) = WalRecord::decode(&rec.encode()).unwrap().unwrap();
        assert_eq!(decoded.op, OpType::CreateCollection);
        assert_eq!(decoded.collection, "orders");
        assert_eq!(decoded.doc_id, 0);
    }

    #[test]
    fn test_truncated_prefix_needs_more() {
        let encoded = sample().encode();
        for cut in [0, 1, PREFIX_LEN - 1, PREFIX_LEN + 2, encoded.len() - 1] {
            assert!(WalRecord::decode(&encoded[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn test_bit_flip_is_corruption() {
        let mut encoded = sample().encode();
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0x40;
        assert!(matches!(
            WalRecord::decode(&encoded),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_absurd_lengths_are_corruption() {
        let mut encoded = sample().encode();
        // Overwrite coll_len with u16::MAX
        encoded[16] = 0xFF;
        encoded[17] = 0xFF;
        assert!(matches!(
            WalRecord::decode(&encoded),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_back_to_back_records() {
        let a = sample();
        let b = WalRecord::commit(7, 3);
        let mut stream = a.encode();
        stream.extend_from_slice(&b.encode());

        let (first, n) = WalRecord::decode(&stream).unwrap().unwrap();
        assert_eq!(first, a);
        let (second, m) = WalRecord::decode(&stream[n..]).unwrap().unwrap();
        assert_eq!(second, b);
        assert_eq!(n + m, stream.len());
    }

    #[test]
    fn test_empty_buffer() {
        assert!(WalRecord::decode(&[]).unwrap().is_none());
    }
}
