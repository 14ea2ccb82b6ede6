//! Wire messages and the newline-delimited JSON codec.
//!
//! Every message is one JSON object on its own line, tagged by `type`.

use crate::RemoteError;
use delaunch_engine::{LogSeverity, RunState};
use delaunch_schema::{GameConfig, GameId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};

/// Rejection reason while provisioning has not finished.
pub const REJECT_NOT_READY: &str = "engine not ready";
/// Rejection reason while a game started by the peer is still running.
pub const REJECT_ALREADY_RUNNING: &str = "game already running";

/// Lines longer than this are a protocol error.
const MAX_LINE: usize = 4 * 1024 * 1024;

/// Commands sent from the peer to the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    Query {
        id: u64,
        name: String,
    },
    Start {
        game: Box<GameConfig>,
        #[serde(default)]
        profile: String,
        #[serde(default)]
        arguments: String,
        /// `module:parameter=value` overrides.
        #[serde(default)]
        parameters: Vec<String>,
    },
    Stop,
    Kill,
}

/// Messages sent from the launcher to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LauncherMessage {
    Hello {
        version: u32,
        name: String,
        data_directory: String,
    },
    QueryReply {
        id: u64,
        name: String,
        values: Vec<String>,
    },
    Rejected {
        reason: String,
        /// Set when the rejection answers a query.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<u64>,
    },
    RunStatus {
        game: GameId,
        state: RunState,
    },
    Log {
        game: GameId,
        severity: LogSeverity,
        message: String,
    },
}

/// Launcher properties a peer can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    PropertyNames,
    ProfileNames,
    DefaultProfile,
}

impl Property {
    pub const ALL: [Property; 3] = [
        Property::PropertyNames,
        Property::ProfileNames,
        Property::DefaultProfile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::PropertyNames => "properties.names",
            Property::ProfileNames => "profiles.names",
            Property::DefaultProfile => "profiles.default",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serialize `message` as one line and flush.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), RemoteError> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Buffered line reader that survives read timeouts.
///
/// Bytes of a partially received line are kept across calls, so a timeout
/// never loses data.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Read the next message. `Ok(None)` at end of stream; blank lines are
    /// skipped. A socket read timeout surfaces as [`RemoteError::Timeout`].
    pub fn read<T: DeserializeOwned>(&mut self) -> Result<Option<T>, RemoteError> {
        loop {
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    if self.line.is_empty() {
                        return Ok(None);
                    }
                    return Err(RemoteError::Protocol(
                        "connection closed inside a message".to_owned(),
                    ));
                }
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(RemoteError::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            if self.line.len() > MAX_LINE {
                self.line.clear();
                return Err(RemoteError::Protocol(format!(
                    "message exceeds {MAX_LINE} bytes"
                )));
            }
            if self.line.last() != Some(&b'\n') {
                // EOF without a trailing newline; the next read reports it.
                continue;
            }
            let line = std::mem::take(&mut self.line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(&line)?));
        }
    }
}
