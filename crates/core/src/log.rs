//! Append-only content log
//!
//! Records are stored back-to-back with no padding:
//!
//! ```text
//! score    32 bytes
//! type      1 byte
//! length    2 bytes, big-endian
//! payload   `length` bytes
//! ```
//!
//! A record's address is the byte offset of its score field. Records are
//! never rewritten once appended.

use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::{debug, instrument, warn};

use crate::bytestore::ByteStore;
use crate::error::Error;
use crate::score::{Score, SCORE_SIZE};
use crate::Result;

/// Bytes before the payload
pub const RECORD_HEADER_SIZE: usize = SCORE_SIZE + 1 + 2;

/// Largest payload a record can carry
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Caller-defined logical type of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ChunkType(pub u8);

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ChunkType {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Header of one stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub addr: u64,
    pub score: Score,
    pub chunk_type: ChunkType,
    pub len: u16,
}

impl Record {
    /// Total bytes the record occupies in the log
    pub fn size(&self) -> u64 {
        (RECORD_HEADER_SIZE + self.len as usize) as u64
    }
}

/// Append-only store of score-tagged payloads
pub struct ContentLog {
    medium: Box<dyn ByteStore>,
    /// Logical end; everything before it is complete records
    end: u64,
    records: u64,
    sync_on_write: bool,
}

impl ContentLog {
    /// Open a log over `medium`, dropping any torn record at the tail
    pub fn open(mut medium: Box<dyn ByteStore>) -> Result<Self> {
        let physical = medium.len()?;
        let (records, end) = scan(medium.as_mut(), physical)?;
        if end < physical {
            warn!(
                complete = end,
                physical, "content log has a torn tail record, truncating"
            );
            medium.truncate(end)?;
        }
        debug!(records = records.len(), bytes = end, "content log opened");
        Ok(Self {
            medium,
            end,
            records: records.len() as u64,
            sync_on_write: false,
        })
    }

    /// Flush the medium after every append
    pub fn set_sync_on_write(&mut self, sync: bool) {
        self.sync_on_write = sync;
    }

    /// Logical length in bytes
    pub fn len(&self) -> u64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Number of records stored
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Append a record and return its address
    ///
    /// On any write failure the medium is truncated back to its previous
    /// end, so no partial record is ever reachable.
    #[instrument(skip(self, payload), fields(len = payload.len()), level = "debug")]
    pub fn append(&mut self, score: &Score, chunk_type: ChunkType, payload: &[u8]) -> Result<u64> {
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record.extend_from_slice(score.as_bytes());
        record.push(chunk_type.0);
        record.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        record.extend_from_slice(payload);

        let position = self.end;
        let sync = self.sync_on_write;
        let result = self
            .medium
            .seek(SeekFrom::Start(position))
            .and_then(|_| self.medium.write_all(&record))
            .and_then(|_| if sync { self.medium.sync() } else { Ok(()) });

        if let Err(e) = result {
            warn!(error = %e, position, "content log append failed, rolling back");
            if let Err(te) = self.medium.truncate(position) {
                warn!(error = %te, position, "content log rollback failed");
            }
            return Err(e.into());
        }

        self.end = position + record.len() as u64;
        self.records += 1;
        debug!(addr = position, %score, "record appended");
        Ok(position)
    }

    /// Drop the last record, which must start at `addr`
    ///
    /// Used when a freshly appended record could not be indexed.
    pub(crate) fn discard_from(&mut self, addr: u64) -> Result<()> {
        let last = self.read_header(addr)?;
        if addr + last.size() != self.end {
            return Err(Error::InvalidState(format!(
                "record at {} is not the last record of the log",
                addr
            )));
        }
        self.medium.truncate(addr)?;
        self.end = addr;
        self.records -= 1;
        debug!(addr, "record discarded");
        Ok(())
    }

    /// Confirm that the record at `addr` carries `score`, returning its type
    pub fn verify(&mut self, score: &Score, addr: u64) -> Result<ChunkType> {
        let header = self.read_header(addr)?;
        if header.score != *score {
            return Err(Error::NotFound(*score));
        }
        Ok(header.chunk_type)
    }

    /// Fetch the type and payload of the record at `addr`
    pub fn read(&mut self, score: &Score, addr: u64) -> Result<(ChunkType, Vec<u8>)> {
        let header = self.read_header(addr)?;
        if header.score != *score {
            return Err(Error::NotFound(*score));
        }
        if addr + header.size() > self.end {
            return Err(Error::corruption(format!(
                "record at {} runs past the end of the log ({} bytes)",
                addr, self.end
            )));
        }
        let mut payload = vec![0u8; header.len as usize];
        self.medium.read_exact(&mut payload).map_err(eof_is_corruption)?;
        Ok((header.chunk_type, payload))
    }

    /// Headers of every record, in log order
    pub fn records(&mut self) -> Result<Vec<Record>> {
        let (records, end) = scan(self.medium.as_mut(), self.end)?;
        if end != self.end {
            return Err(Error::corruption(format!(
                "content log ends mid-record at {} of {}",
                end, self.end
            )));
        }
        Ok(records)
    }

    /// Flush the medium
    pub fn sync(&mut self) -> Result<()> {
        self.medium.flush()?;
        self.medium.sync()?;
        Ok(())
    }

    /// Flush and release the medium
    pub fn close(mut self) -> Result<()> {
        self.medium.close()?;
        Ok(())
    }

    fn read_header(&mut self, addr: u64) -> Result<Record> {
        if addr + RECORD_HEADER_SIZE as u64 > self.end {
            return Err(Error::corruption(format!(
                "address {} is past the end of the log ({} bytes)",
                addr, self.end
            )));
        }
        read_header_at(self.medium.as_mut(), addr)
    }
}

impl fmt::Debug for ContentLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentLog")
            .field("end", &self.end)
            .field("records", &self.records)
            .finish()
    }
}

fn read_header_at(medium: &mut dyn ByteStore, addr: u64) -> Result<Record> {
    let mut buf = [0u8; RECORD_HEADER_SIZE];
    medium.seek(SeekFrom::Start(addr))?;
    medium.read_exact(&mut buf).map_err(eof_is_corruption)?;

    let mut score = [0u8; SCORE_SIZE];
    score.copy_from_slice(&buf[..SCORE_SIZE]);
    Ok(Record {
        addr,
        score: Score::from_bytes(score),
        chunk_type: ChunkType(buf[SCORE_SIZE]),
        len: u16::from_be_bytes([buf[SCORE_SIZE + 1], buf[SCORE_SIZE + 2]]),
    })
}

/// Walk record headers up to `limit`, returning them and the end of the
/// last complete record
fn scan(medium: &mut dyn ByteStore, limit: u64) -> Result<(Vec<Record>, u64)> {
    let mut records = Vec::new();
    let mut pos = 0u64;
    while pos + RECORD_HEADER_SIZE as u64 <= limit {
        let record = read_header_at(medium, pos)?;
        if pos + record.size() > limit {
            break;
        }
        pos += record.size();
        records.push(record);
    }
    Ok((records, pos))
}

fn eof_is_corruption(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::corruption("content log record truncated")
    } else {
        Error::Io(e)
    }
}
