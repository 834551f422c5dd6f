//! Last-value channels: readers always get the most recently published frame,
//! there is no queue of older frames.
//!
//! [`LocalHub`] hosts named channels inside one process. The file backed variant used
//! across processes lives in [`crate::file_channel`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

/// How [`LastValueChannel::get`] behaves when nothing new has been published.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GetMode {
    /// Return the most recent frame immediately, even if it was seen before.
    Last,
    /// Block until a frame newer than the last one returned by this handle is published,
    /// or the timeout expires.
    WaitNext(Duration),
}

/// One published frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Publication sequence number, starting at 1.
    pub seq: u64,
    /// Raw record bytes.
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum ChannelError {
    /// The channel has not been created.
    NotFound(String),
    /// Nothing was ever published on the channel.
    Empty,
    /// `WaitNext` expired without a new frame.
    Timeout,
    /// Frame larger than the channel accepts.
    FrameTooLarge { limit: usize, found: usize },
    /// Stored frame is not readable.
    Corrupt(String),
    IoError(io::Error),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ChannelError::NotFound(ref name) =>
                write!(f, "Channel not found: {}", name),
            ChannelError::Empty =>
                write!(f, "Nothing published yet"),
            ChannelError::Timeout =>
                write!(f, "Timed out waiting for a new frame"),
            ChannelError::FrameTooLarge { limit, found } =>
                write!(f, "Frame too large: limit {}, found {}", limit, found),
            ChannelError::Corrupt(ref msg) =>
                write!(f, "Corrupt frame: {}", msg),
            ChannelError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChannelError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        ChannelError::IoError(err)
    }
}

/// Named channel holding only the newest frame.
pub trait LastValueChannel: Send {
    /// Name the channel was opened with.
    fn name(&self) -> &str;

    /// Replaces the current frame.
    fn publish(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Returns the current frame according to `mode`.
    fn get(&mut self, mode: GetMode) -> Result<Frame, ChannelError>;
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
}

struct SharedSlot {
    frame_limit: usize,
    slot: Mutex<Slot>,
    published: Condvar,
}

/// Registry of in-process channels. Handles opened from the same hub share frames.
#[derive(Clone, Default)]
pub struct LocalHub {
    channels: Arc<Mutex<HashMap<String, Arc<SharedSlot>>>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the channel if it does not exist yet and returns a handle to it.
    /// `frame_limit` caps the size of published frames. An existing channel keeps the limit
    /// it was created with, a different `frame_limit` is only reported.
    pub fn create(&self, name: &str, frame_limit: usize) -> LocalChannel {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let shared = channels.entry(name.to_string())
            .or_insert_with(|| Arc::new(SharedSlot {
                frame_limit,
                slot: Mutex::new(Slot::default()),
                published: Condvar::new(),
            }))
            .clone();
        if shared.frame_limit != frame_limit {
            warn!(
                "Channel {} already exists with frame limit {}, requested {} is ignored",
                name, shared.frame_limit, frame_limit
            );
        }
        LocalChannel { name: name.to_string(), shared, last_seen: 0 }
    }

    /// Frame size limit of an existing channel.
    pub fn frame_limit(&self, name: &str) -> Option<usize> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(name).map(|shared| shared.frame_limit)
    }

    /// Opens an existing channel.
    pub fn open(&self, name: &str) -> Result<LocalChannel, ChannelError> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let shared = channels.get(name)
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))?
            .clone();
        Ok(LocalChannel { name: name.to_string(), shared, last_seen: 0 })
    }
}

/// Handle to a channel of a [`LocalHub`].
pub struct LocalChannel {
    name: String,
    shared: Arc<SharedSlot>,
    last_seen: u64,
}

impl LastValueChannel for LocalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn publish(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if bytes.len() > self.shared.frame_limit {
            return Err(ChannelError::FrameTooLarge {
                limit: self.shared.frame_limit,
                found: bytes.len(),
            });
        }
        let mut slot = self.shared.slot.lock().unwrap_or_else(|e| e.into_inner());
        let seq = slot.frame.as_ref().map_or(1, |f| f.seq + 1);
        slot.frame = Some(Frame { seq, bytes: bytes.to_vec() });
        self.shared.published.notify_all();
        Ok(())
    }

    fn get(&mut self, mode: GetMode) -> Result<Frame, ChannelError> {
        let mut slot = self.shared.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let GetMode::WaitNext(timeout) = mode {
            let deadline = Instant::now() + timeout;
            while slot.frame.as_ref().is_none_or(|f| f.seq <= self.last_seen) {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ChannelError::Timeout);
                }
                slot = self.shared.published
                    .wait_timeout(slot, deadline - now)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
        }
        let frame = slot.frame.clone().ok_or(ChannelError::Empty)?;
        self.last_seen = frame.seq;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_open_missing_channel() {
        let hub = LocalHub::new();
        match hub.open("hubo") {
            Err(ChannelError::NotFound(name)) => assert_eq!(name, "hubo"),
            _ => panic!("Opening a missing channel must fail"),
        }
    }

    #[test]
    fn test_last_value_only() {
        let hub = LocalHub::new();
        let mut writer = hub.create("hubo", 16);
        let mut reader = hub.open("hubo").expect("channel exists");

        assert!(matches!(reader.get(GetMode::Last), Err(ChannelError::Empty)));

        writer.publish(&[1, 2]).unwrap();
        writer.publish(&[3, 4]).unwrap();
        let frame = reader.get(GetMode::Last).unwrap();
        assert_eq!(frame, Frame { seq: 2, bytes: vec![3, 4] });

        // Nothing new: last value again.
        assert_eq!(reader.get(GetMode::Last).unwrap().bytes, vec![3, 4]);

        assert!(matches!(writer.publish(&[0; 17]), Err(ChannelError::FrameTooLarge { limit: 16, found: 17 })));
    }

    #[test]
    fn test_recreate_keeps_frame_limit() {
        let hub = LocalHub::new();
        let mut first = hub.create("hubo", 8);
        let mut second = hub.create("hubo", 1024);
        assert_eq!(hub.frame_limit("hubo"), Some(8));
        assert_eq!(hub.frame_limit("other"), None);

        assert!(matches!(second.publish(&[0; 16]), Err(ChannelError::FrameTooLarge { limit: 8, found: 16 })));
        second.publish(&[7; 8]).unwrap();
        assert_eq!(first.get(GetMode::Last).unwrap().bytes, vec![7; 8]);
    }

    #[test]
    fn test_wait_next() {
        let hub = LocalHub::new();
        let mut writer = hub.create("hubo", 8);
        let mut reader = hub.open("hubo").unwrap();

        writer.publish(&[1]).unwrap();
        assert_eq!(reader.get(GetMode::Last).unwrap().seq, 1);
        assert!(matches!(reader.get(GetMode::WaitNext(Duration::from_millis(20))), Err(ChannelError::Timeout)));

        let publisher = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.publish(&[9]).unwrap();
        });
        let frame = reader.get(GetMode::WaitNext(Duration::from_secs(5))).unwrap();
        assert_eq!(frame.bytes, vec![9]);
        publisher.join().unwrap();
    }
}
