//! Last-value channel backed by a single file, so that a producer in another process
//! can drive the loop.
//!
//! The file `<dir>/<name>.chan` holds exactly one frame:
//!
//! ```text
//! magic "LVCHAN01" | seq: u64 LE | len: u64 LE | payload (len bytes)
//! ```
//!
//! A publisher writes the frame into a uniquely named temporary file next to it and renames it
//! over the channel file, so readers never observe a partially written frame and concurrent
//! publishers never share a temporary file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::channel::{ChannelError, Frame, GetMode, LastValueChannel};

const MAGIC: &[u8; 8] = b"LVCHAN01";
const HEADER_LEN: usize = 24;

/// How often a blocking read looks at the file again.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Channel file of the given name inside `dir`.
pub fn channel_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.chan", name))
}

/// Default directory for channel files: `/dev/shm` where available, the temp directory otherwise.
pub fn default_channel_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

pub struct FileChannel {
    name: String,
    path: PathBuf,
    last_seen: u64,
    next_seq: u64,
}

impl FileChannel {
    /// Creates the channel file (empty frame) unless it already exists.
    pub fn create(dir: &Path, name: &str) -> Result<Self, ChannelError> {
        fs::create_dir_all(dir)?;
        let path = channel_path(dir, name);
        let mut channel = FileChannel { name: name.to_string(), path, last_seen: 0, next_seq: 1 };
        match channel.read_frame() {
            Ok(Some(frame)) => channel.next_seq = frame.seq + 1,
            Ok(None) => {}
            Err(ChannelError::NotFound(_)) => channel.write_frame(0, &[])?,
            Err(err) => return Err(err),
        }
        Ok(channel)
    }

    /// Opens an existing channel file.
    pub fn open(dir: &Path, name: &str) -> Result<Self, ChannelError> {
        let path = channel_path(dir, name);
        if !path.is_file() {
            return Err(ChannelError::NotFound(path.display().to_string()));
        }
        let mut channel = FileChannel { name: name.to_string(), path, last_seen: 0, next_seq: 1 };
        if let Some(frame) = channel.read_frame()? {
            channel.next_seq = frame.seq + 1;
        }
        Ok(channel)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` for the empty frame written at creation.
    fn read_frame(&self) -> Result<Option<Frame>, ChannelError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ChannelError::NotFound(self.path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        parse_frame(&data)
    }

    fn write_frame(&self, seq: u64, payload: &[u8]) -> Result<(), ChannelError> {
        let dir = self.path.parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(MAGIC)?;
        file.write_all(&seq.to_le_bytes())?;
        file.write_all(&(payload.len() as u64).to_le_bytes())?;
        file.write_all(payload)?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn parse_frame(data: &[u8]) -> Result<Option<Frame>, ChannelError> {
    if data.len() < HEADER_LEN || &data[..8] != MAGIC {
        return Err(ChannelError::Corrupt("missing channel header".into()));
    }
    let seq = u64::from_le_bytes(data[8..16].try_into()
        .map_err(|_| ChannelError::Corrupt("bad sequence".into()))?);
    let len = u64::from_le_bytes(data[16..24].try_into()
        .map_err(|_| ChannelError::Corrupt("bad length".into()))?) as usize;
    if data.len() - HEADER_LEN != len {
        return Err(ChannelError::Corrupt(format!(
            "header announces {} bytes, file holds {}", len, data.len() - HEADER_LEN)));
    }
    if seq == 0 {
        return Ok(None);
    }
    Ok(Some(Frame { seq, bytes: data[HEADER_LEN..].to_vec() }))
}

impl LastValueChannel for FileChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        // Another producer may have published meanwhile.
        if let Some(frame) = self.read_frame()? {
            self.next_seq = self.next_seq.max(frame.seq + 1);
        }
        self.write_frame(self.next_seq, bytes)?;
        self.next_seq += 1;
        Ok(())
    }

    fn get(&mut self, mode: GetMode) -> Result<Frame, ChannelError> {
        let frame = match mode {
            GetMode::Last => self.read_frame()?.ok_or(ChannelError::Empty)?,
            GetMode::WaitNext(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    match self.read_frame()? {
                        Some(frame) if frame.seq > self.last_seen => break frame,
                        _ if Instant::now() >= deadline => return Err(ChannelError::Timeout),
                        _ => thread::sleep(POLL_INTERVAL),
                    }
                }
            }
        };
        self.last_seen = frame.seq;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(FileChannel::open(dir.path(), "hubo"), Err(ChannelError::NotFound(_))));
    }

    #[test]
    fn test_publish_and_read_last() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FileChannel::create(dir.path(), "hubo").unwrap();
        let mut reader = FileChannel::open(dir.path(), "hubo").unwrap();

        assert!(matches!(reader.get(GetMode::Last), Err(ChannelError::Empty)));

        writer.publish(&[1, 2, 3]).unwrap();
        writer.publish(&[4, 5]).unwrap();
        let frame = reader.get(GetMode::Last).unwrap();
        assert_eq!(frame.seq, 2);
        assert_eq!(frame.bytes, vec![4, 5]);

        assert!(matches!(reader.get(GetMode::WaitNext(Duration::from_millis(10))), Err(ChannelError::Timeout)));

        // A second producer continues the sequence instead of restarting it.
        let mut other = FileChannel::create(dir.path(), "hubo").unwrap();
        other.publish(&[6]).unwrap();
        let frame = reader.get(GetMode::WaitNext(Duration::from_secs(1))).unwrap();
        assert_eq!(frame, Frame { seq: 3, bytes: vec![6] });
    }

    #[test]
    fn test_concurrent_publishers_in_one_process() {
        let dir = tempfile::tempdir().unwrap();
        FileChannel::create(dir.path(), "hubo").unwrap();

        let publishers: Vec<_> = (0..2u8)
            .map(|id| {
                let mut channel = FileChannel::open(dir.path(), "hubo").unwrap();
                thread::spawn(move || {
                    for i in 0..100u8 {
                        channel.publish(&[id, i]).unwrap();
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().expect("Publishing must not fail");
        }

        let mut reader = FileChannel::open(dir.path(), "hubo").unwrap();
        let frame = reader.get(GetMode::Last).unwrap();
        assert_eq!(frame.bytes.len(), 2);
        assert_eq!(frame.bytes[1], 99);
        assert!(frame.seq >= 100);

        // Only the channel file remains, no temporary leftovers
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(channel_path(dir.path(), "hubo"), b"garbage").unwrap();
        assert!(matches!(FileChannel::open(dir.path(), "hubo"), Err(ChannelError::Corrupt(_))));
    }
}
