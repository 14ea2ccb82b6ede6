//! Remote launching for delaunch.
//!
//! A development peer listens for launcher connections. The launcher connects
//! with a [`RemoteSession`], announces itself, answers property queries from
//! its catalog and runs games on the peer's behalf, relaying run state and
//! engine log lines back. Messages are newline-delimited JSON over TCP.

pub mod config;
pub mod peer;
pub mod protocol;
pub mod session;

pub use config::RemoteConfig;
pub use peer::{Peer, PeerListener};
pub use protocol::{
    LauncherMessage, MessageReader, PeerMessage, Property, REJECT_ALREADY_RUNNING,
    REJECT_NOT_READY,
};
pub use session::{ConnectionState, RemoteListener, RemoteSession};

/// Sent in the `hello` handshake. Peers refuse launchers speaking another
/// version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Port the reference peer listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 3413;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("launcher error: {0}")]
    Core(#[from] delaunch_core::CoreError),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("connection to {address} failed: {source}")]
    ConnectionFailure {
        address: String,
        source: std::io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("rejected by launcher: {0}")]
    Rejected(String),
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("timed out waiting for a message")]
    Timeout,
}
