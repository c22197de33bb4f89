//! Best-effort line channel to an external recoil device.
//!
//! Each gun side has a fixed well-known channel name. A recoil driver owns
//! the server end; this side connects on demand, writes one token per line
//! and drops lines whenever nobody is listening.

use std::io::{self, Write};
use std::sync::Arc;
#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use std::time::Duration;

use log::{debug, info};

#[cfg(unix)]
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Logical recoil output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    A,
    B,
}

impl ChannelSide {
    /// Physical port to side: even ports drive A, odd ports drive B.
    pub fn for_port(port: u32) -> Self {
        if port % 2 == 0 { Self::A } else { Self::B }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::A => "RecoilGunA",
            Self::B => "RecoilGunB",
        }
    }
}

impl std::str::FromStr for ChannelSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" | "1" => Ok(Self::A),
            "b" | "2" => Ok(Self::B),
            other => Err(format!("unknown channel side '{other}'")),
        }
    }
}

/// OS primitive that opens the client end of a named channel.
pub trait ChannelOpener: Send + Sync {
    fn open(&self, side: ChannelSide) -> io::Result<Box<dyn Write + Send>>;
}

/// Opens the platform's named channel: `\\.\pipe\RecoilGun*` on Windows, a
/// Unix-domain socket in the runtime directory elsewhere.
#[derive(Debug, Clone, Default)]
pub struct NamedChannelOpener {
    #[cfg(unix)]
    dir: Option<PathBuf>,
}

impl NamedChannelOpener {
    #[cfg(unix)]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    #[cfg(unix)]
    pub fn path(&self, side: ChannelSide) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.join(side.name()),
            None => channel_path(side),
        }
    }
}

impl ChannelOpener for NamedChannelOpener {
    #[cfg(unix)]
    fn open(&self, side: ChannelSide) -> io::Result<Box<dyn Write + Send>> {
        let stream = std::os::unix::net::UnixStream::connect(self.path(side))?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    fn open(&self, side: ChannelSide) -> io::Result<Box<dyn Write + Send>> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(format!(r"\\.\pipe\{}", side.name()))?;
        Ok(Box::new(file))
    }

    #[cfg(not(any(unix, windows)))]
    fn open(&self, _side: ChannelSide) -> io::Result<Box<dyn Write + Send>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "named channels are not supported on this platform",
        ))
    }
}

/// Directory holding the channel sockets.
#[cfg(unix)]
pub fn default_channel_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

#[cfg(unix)]
pub fn channel_path(side: ChannelSide) -> PathBuf {
    default_channel_dir().join(side.name())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connected,
}

/// Reconnecting, lossy line sender.
pub struct SignalChannel {
    opener: Arc<dyn ChannelOpener>,
    conn: Option<(ChannelSide, Box<dyn Write + Send>)>,
    dropped: u64,
}

impl SignalChannel {
    pub fn new(opener: Arc<dyn ChannelOpener>) -> Self {
        Self {
            opener,
            conn: None,
            dropped: 0,
        }
    }

    pub fn state(&self) -> ChannelState {
        if self.conn.is_some() {
            ChannelState::Connected
        } else {
            ChannelState::Disconnected
        }
    }

    /// Lines lost to open or write failures so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn close(&mut self) {
        if let Some((side, _)) = self.conn.take() {
            debug!("Signal: closed {}", side.name());
        }
    }

    /// Write `text` plus a newline to `side`, connecting first if needed.
    ///
    /// At most one open attempt is made per call. Returns `false` when the
    /// line was dropped.
    pub fn send_line(&mut self, side: ChannelSide, text: &str) -> bool {
        if matches!(&self.conn, Some((current, _)) if *current != side) {
            self.close();
        }

        if self.conn.is_none() {
            match self.opener.open(side) {
                Ok(writer) => {
                    info!("Signal: connected to {}", side.name());
                    self.conn = Some((side, writer));
                }
                Err(e) => {
                    debug!("Signal: cannot open {}: {e}; dropping '{text}'", side.name());
                    self.dropped += 1;
                    return false;
                }
            }
        }

        let Some((_, writer)) = self.conn.as_mut() else {
            return false;
        };

        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');

        match writer.write_all(&line).and_then(|()| writer.flush()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Signal: write to {} failed: {e}", side.name());
                self.conn = None;
                self.dropped += 1;
                false
            }
        }
    }
}
