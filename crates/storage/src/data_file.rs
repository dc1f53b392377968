//! Append-only data file
//!
//! Stores document payloads as length-prefixed, checksummed records:
//!
//! ```text
//! ┌────────────────┬───────────────────┬────────────┬──────────────┐
//! │ len (u32 LE)   │ payload (len)     │ crc32 (u32)│ verified (u8)│
//! └────────────────┴───────────────────┴────────────┴──────────────┘
//! ```
//!
//! The verified flag is the last byte of the record; a record whose flag
//! is missing or zero is a crash-torn write and is rejected on read. The
//! CRC covers the payload and is checked on every read. Offsets returned
//! by `append` are stable forever: the file is append-only and superseded
//! payload bytes simply become unreachable.

use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::Mutex;
use quill_core::{Error, Result, RetryPolicy};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Bytes of framing around each payload: length prefix + CRC + flag.
pub const RECORD_OVERHEAD: u64 = 4 + 4 + 1;

const VERIFIED: u8 = 1;

/// Append-only payload store for one logical database.
pub struct DataFile {
    path: PathBuf,
    /// Write handle. Writes seek to the tracked end offset explicitly so
    /// a retried record write lands at the same offset.
    file: Mutex<File>,
    /// End-of-file offset; the offset of the next record.
    size: AtomicU64,
    retry: RetryPolicy,
}

impl DataFile {
    /// Open or create the data file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            file: Mutex::new(file),
            size: AtomicU64::new(size),
            retry: RetryPolicy::default(),
        })
    }

    /// Append one payload record, returning `(offset, payload_len)`.
    ///
    /// The returned offset points at the record's length prefix and is
    /// what the index stores. Transient write failures are retried; the
    /// whole record is rewritten from its start offset on each attempt so
    /// a partial write never survives a successful return.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u32)> {
        let mut record = Vec::with_capacity(payload.len() + RECORD_OVERHEAD as usize);
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(payload);
        record.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        record.push(VERIFIED);

        // The offset is claimed and the new size published under the
        // file lock, so concurrent appenders get disjoint records.
        let mut file = self.file.lock();
        let offset = self.size.load(Ordering::SeqCst);
        self.retry.run(|| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&record)?;
            Ok(())
        })?;
        self.size.store(offset + record.len() as u64, Ordering::SeqCst);
        Ok((offset, payload.len() as u32))
    }

    /// Read the payload of the record at `offset`, verifying length, CRC,
    /// and the verified flag.
    ///
    /// Uses an independent read handle, so readers never contend with the
    /// writer beyond the filesystem itself.
    pub fn read_at(&self, offset: u64, length: u32) -> Result<Vec<u8>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;

        let stored_len = file.read_u32::<LittleEndian>().map_err(torn(offset))?;
        if stored_len != length {
            return Err(Error::Corruption(format!(
                "record at offset {} has length {}, index expected {}",
                offset, stored_len, length
            )));
        }

        let mut payload = vec![0u8; stored_len as usize];
        file.read_exact(&mut payload).map_err(torn(offset))?;
        let stored_crc = file.read_u32::<LittleEndian>().map_err(torn(offset))?;
        let flag = file.read_u8().map_err(torn(offset))?;

        if flag != VERIFIED {
            return Err(Error::Corruption(format!(
                "unverified record at offset {} (torn write)",
                offset
            )));
        }
        let crc = crc32fast::hash(&payload);
        if crc != stored_crc {
            return Err(Error::Corruption(format!(
                "CRC mismatch at offset {}: stored {:08x}, computed {:08x}",
                offset, stored_crc, crc
            )));
        }
        Ok(payload)
    }

    /// Flush and fsync.
    pub fn sync(&self) -> Result<()> {
        let file = self.file.lock();
        self.retry.run(|| file.sync_all().map_err(Error::from))
    }

    /// Current file size; the offset of the next append.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::SeqCst)
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Map a short read to a corruption error: the index pointed inside or
/// past a record the file does not fully contain.
fn torn(offset: u64) -> impl Fn(std::io::Error) -> Error {
    move |e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Corruption(format!("truncated record at offset {}", offset))
        } else {
            Error::Io(e)
        }
    }
}
