use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{JournalError, Result};

/// Header size: 4 bytes length + 4 bytes length CRC + 4 bytes payload CRC.
const HEADER_SIZE: u64 = 12;

/// Flush/sync strategy for appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for a [`Journal`].
#[derive(Clone, Debug, Default)]
pub struct JournalConfig {
    pub sync_mode: SyncMode,
}

impl JournalConfig {
    pub fn with_sync_mode(sync_mode: SyncMode) -> Self {
        Self { sync_mode }
    }
}

/// One frame read back from the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    /// Byte offset of the frame header.
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl JournalEntry {
    /// Decode the payload as a bincode record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        bincode::deserialize(&self.payload).map_err(|e| JournalError::Serialization(e.to_string()))
    }
}

struct JournalWriter {
    writer: BufWriter<File>,
    /// Current write offset (end of the last complete frame).
    offset: u64,
}

/// Append-only file of framed records.
///
/// On-disk format, repeated:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of the length bytes (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload]
/// ```
///
/// The length has its own checksum so a damaged length is never mistaken
/// for a frame that runs past the end of the file.
///
/// Appends are serialized by an internal mutex. Reads open their own file
/// handle and only see frames whose append has completed, so readers never
/// wait on a writer.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    /// Length of the file up to the last complete frame, published after
    /// each append.
    len: AtomicU64,
    config: JournalConfig,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    ///
    /// A damaged final frame is treated as a torn write and truncated away.
    /// A damaged frame followed by more data fails with
    /// [`JournalError::Corrupt`].
    pub fn open(path: &Path, config: JournalConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let scan = scan(path, file_len)?;
        if scan.valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                file_len,
                "torn write at journal tail; truncating"
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), frames = scan.entries.len(), len = scan.valid_len, "journal opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset: scan.valid_len,
            }),
            len: AtomicU64::new(scan.valid_len),
            config,
        })
    }

    /// Append a raw payload. Returns the byte offset of the new frame.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        if payload.is_empty() {
            return Err(JournalError::Serialization(
                "refusing to append an empty record".into(),
            ));
        }
        let length = u32::try_from(payload.len()).map_err(|_| {
            JournalError::Serialization(format!("record of {} bytes is too large", payload.len()))
        })?;
        let crc = crc32fast::hash(payload);

        let mut w = self.writer.lock().expect("journal mutex poisoned");
        let entry_offset = w.offset;

        if let Err(e) = self.write_frame(&mut w, length, crc, payload) {
            warn!(path = %self.path.display(), offset = entry_offset, error = %e, "append failed; discarding partial frame");
            if let Err(rewind) = self.discard_partial(&mut w) {
                warn!(path = %self.path.display(), error = %rewind, "could not discard partial frame");
            }
            return Err(e.into());
        }

        w.offset += HEADER_SIZE + payload.len() as u64;
        self.len.store(w.offset, Ordering::Release);

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Serialize `record` with bincode and append it.
    pub fn append_record<T: Serialize>(&self, record: &T) -> Result<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| JournalError::Serialization(e.to_string()))?;
        self.append(&payload)
    }

    /// Read the payload of the frame starting at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Vec<u8>> {
        let len = self.len();
        if offset + HEADER_SIZE > len {
            return Err(JournalError::InvalidOffset { offset, len });
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let (length, expected) = parse_header(&header)
            .filter(|(length, _)| *length != 0 && offset + HEADER_SIZE + *length as u64 <= len)
            .ok_or(JournalError::InvalidOffset { offset, len })?;

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;
        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(JournalError::CrcMismatch {
                offset,
                expected,
                actual,
            });
        }
        Ok(payload)
    }

    /// Read and decode the bincode record at `offset`.
    pub fn read_record<T: DeserializeOwned>(&self, offset: u64) -> Result<T> {
        let payload = self.read_at(offset)?;
        bincode::deserialize(&payload).map_err(|e| JournalError::Serialization(e.to_string()))
    }

    /// All complete frames, front to back.
    pub fn entries(&self) -> Result<Vec<JournalEntry>> {
        let len = self.len();
        let scan = scan(&self.path, len)?;
        if scan.valid_len != len {
            return Err(JournalError::Corrupt {
                path: self.path.clone(),
                offset: scan.valid_len,
                reason: "frame damaged after open".into(),
            });
        }
        Ok(scan.entries)
    }

    /// Flush buffered data and `fsync` the file.
    pub fn sync(&self) -> Result<()> {
        let mut w = self.writer.lock().expect("journal mutex poisoned");
        w.writer.flush()?;
        w.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Length in bytes of all complete frames.
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path to the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_frame(&self, w: &mut JournalWriter, length: u32, crc: u32, payload: &[u8]) -> io::Result<()> {
        let length = length.to_le_bytes();
        w.writer.write_all(&length)?;
        w.writer.write_all(&crc32fast::hash(&length).to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(payload)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Drop buffered bytes of a failed append and cut the file back to the
    /// last complete frame.
    fn discard_partial(&self, w: &mut JournalWriter) -> io::Result<()> {
        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        file.set_len(w.offset)?;
        let failed = std::mem::replace(&mut w.writer, BufWriter::new(file));
        let _ = failed.into_parts();
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

struct Scan {
    entries: Vec<JournalEntry>,
    valid_len: u64,
}

/// Payload length and payload CRC, or `None` if the length fails its
/// checksum.
fn parse_header(header: &[u8; HEADER_SIZE as usize]) -> Option<(u32, u32)> {
    let word = |i: usize| u32::from_le_bytes([header[i], header[i + 1], header[i + 2], header[i + 3]]);
    (crc32fast::hash(&header[..4]) == word(4)).then(|| (word(0), word(8)))
}

/// Read frames front to back up to `limit` bytes.
///
/// Stops at the first damaged frame. If that frame reaches the end of the
/// scanned region it is a torn tail and `valid_len` marks where it starts;
/// otherwise the file is corrupt. A frame only counts as overrunning the
/// region when its length passes the header checksum.
fn scan(path: &Path, limit: u64) -> Result<Scan> {
    let mut file = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    let mut offset: u64 = 0;

    while offset < limit {
        if offset + HEADER_SIZE > limit {
            break;
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let Some((length, expected)) = parse_header(&header) else {
            return Err(JournalError::Corrupt {
                path: path.to_path_buf(),
                offset,
                reason: "frame length fails its checksum".into(),
            });
        };
        let frame_end = offset + HEADER_SIZE + length as u64;

        if frame_end > limit {
            break;
        }

        let mut payload = vec![0u8; length as usize];
        file.read_exact(&mut payload)?;

        let damage = if length == 0 {
            Some("zero-length frame".to_string())
        } else {
            let actual = crc32fast::hash(&payload);
            (actual != expected)
                .then(|| format!("CRC mismatch: expected {expected:#010x}, got {actual:#010x}"))
        };

        if let Some(reason) = damage {
            if frame_end >= limit {
                break;
            }
            return Err(JournalError::Corrupt {
                path: path.to_path_buf(),
                offset,
                reason,
            });
        }

        entries.push(JournalEntry { offset, payload });
        offset = frame_end;
    }

    Ok(Scan {
        entries,
        valid_len: offset,
    })
}
