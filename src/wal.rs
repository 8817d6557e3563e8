use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::limits::MAX_WAL_ENTRY_BYTES;
use crate::model::Event;

/// Bytes around each payload: the length prefix and the CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single event to [len][bincode][crc32] format. Returns bytes written.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(payload.len() as u64 + FRAME_OVERHEAD)
}

/// Read one `[u32][u8; len]` or `[u32]` field, mapping a clean EOF to `None`.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Result of reading a WAL from disk.
#[derive(Debug)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the intact prefix. Anything past it is a torn or
    /// corrupt tail.
    pub valid_len: u64,
}

/// Append-only write-ahead log of reservation engine events.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded on replay via the
///   length prefix and CRC check, and cut off by [`Wal::recover`] so later
///   appends are not hidden behind it.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length covered by the last successful fsync.
    durable_len: u64,
    pending_bytes: u64,
    pending_events: u64,
    /// Set when a failed batch could not be cut back off the file.
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the WAL file at `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            durable_len,
            pending_bytes: 0,
            pending_events: 0,
            poisoned: false,
        })
    }

    /// Replay the WAL, truncate any torn or corrupt tail, then open it for
    /// appending right after the last intact entry.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let Replay { events, valid_len } = Self::replay(path)?;
        if let Ok(meta) = fs::metadata(path)
            && meta.len() > valid_len
        {
            warn!(
                "WAL {}: truncating {} trailing bytes after {} events",
                path.display(),
                meta.len() - valid_len,
                events.len()
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok((Self::open(path)?, events))
    }

    /// Append one event and fsync. Production code batches with
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event without flushing. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(
                "WAL refuses appends after a failed batch could not be rolled back",
            ));
        }
        let written = encode_event(&mut self.writer, event)?;
        self.pending_bytes += written;
        self.pending_events += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len += self.pending_bytes;
        self.pending_bytes = 0;
        self.pending_events = 0;
        Ok(())
    }

    /// Discard everything appended since the last successful `flush_sync`,
    /// whether it is still buffered or already handed to the OS.
    ///
    /// If the file can't be cut back, the WAL is poisoned and every later
    /// append fails until it is reopened or compacted.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.appends_since_compact = self.appends_since_compact.saturating_sub(self.pending_events);
        self.pending_bytes = 0;
        self.pending_events = 0;
        let result = self.truncate_to_durable();
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn truncate_to_durable(&mut self) -> io::Result<()> {
        // Swap the writer out first so its buffer is dropped unwritten.
        let handle = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(handle));
        let (_file, _unflushed) = stale.into_parts();

        let file = self.writer.get_ref();
        file.set_len(self.durable_len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted events to a temp file and fsync.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the temp file over the WAL and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.pending_bytes = 0;
        self.pending_events = 0;
        self.poisoned = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every intact event from disk. Reading stops at the first torn,
    /// oversized, corrupt or undecodable entry; everything before it is
    /// returned along with the byte length it covers.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay {
                    events: Vec::new(),
                    valid_len: 0,
                });
            }
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let mut len_buf = [0u8; 4];
            // Clean EOF, or a partial length prefix that `recover` cuts off.
            if read_exact_or_eof(&mut reader, &mut len_buf)?.is_none() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if len > MAX_WAL_ENTRY_BYTES {
                warn!(
                    "WAL {}: entry length {len} exceeds {MAX_WAL_ENTRY_BYTES} after {} events, discarding tail",
                    path.display(),
                    events.len()
                );
                break;
            }

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if read_exact_or_eof(&mut reader, &mut payload)?.is_none()
                || read_exact_or_eof(&mut reader, &mut crc_buf)?.is_none()
            {
                warn!(
                    "WAL {}: torn entry after {} events, discarding tail",
                    path.display(),
                    events.len()
                );
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                warn!(
                    "WAL {}: CRC mismatch after {} events, discarding tail",
                    path.display(),
                    events.len()
                );
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("WAL {}: undecodable entry: {e}", path.display());
                    break;
                }
            }
            valid_len += len as u64 + FRAME_OVERHEAD;
        }

        Ok(Replay { events, valid_len })
    }
}
