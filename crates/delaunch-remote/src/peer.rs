//! Reference peer: the development-host end of a remote connection.

use crate::protocol::{write_message, LauncherMessage, MessageReader, PeerMessage};
use crate::{RemoteError, PROTOCOL_VERSION};
use delaunch_schema::GameConfig;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Listening socket launchers connect to.
pub struct PeerListener {
    listener: TcpListener,
}

impl PeerListener {
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self, RemoteError> {
        let listener = TcpListener::bind(address)?;
        info!("peer listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RemoteError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for a launcher and complete the handshake.
    pub fn accept(&self) -> Result<Peer, RemoteError> {
        let (stream, remote) = self.listener.accept()?;
        info!("launcher connected from {remote}");
        Peer::handshake(stream, remote)
    }

    /// Accept a launcher if one is already waiting.
    pub fn try_accept(&self) -> Result<Option<Peer>, RemoteError> {
        self.listener.set_nonblocking(true)?;
        let accepted = self.listener.accept();
        self.listener.set_nonblocking(false)?;
        match accepted {
            Ok((stream, remote)) => {
                info!("launcher connected from {remote}");
                Peer::handshake(stream, remote).map(Some)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One connected launcher.
pub struct Peer {
    reader: MessageReader<TcpStream>,
    writer: TcpStream,
    remote: SocketAddr,
    launcher_name: String,
    data_directory: String,
    next_query: u64,
    /// Events read while waiting for a query reply.
    pending: VecDeque<LauncherMessage>,
}

impl Peer {
    fn handshake(stream: TcpStream, remote: SocketAddr) -> Result<Self, RemoteError> {
        // Some platforms hand out accepted sockets in the listener's mode.
        stream.set_nonblocking(false)?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("cannot disable Nagle on peer socket: {e}");
        }
        let writer = stream.try_clone()?;
        let mut reader = MessageReader::new(stream);
        match reader.read::<LauncherMessage>()? {
            Some(LauncherMessage::Hello {
                version,
                name,
                data_directory,
            }) => {
                if version != PROTOCOL_VERSION {
                    return Err(RemoteError::Protocol(format!(
                        "launcher speaks protocol {version}, expected {PROTOCOL_VERSION}"
                    )));
                }
                info!("launcher '{name}' (data in {data_directory})");
                Ok(Self {
                    reader,
                    writer,
                    remote,
                    launcher_name: name,
                    data_directory,
                    next_query: 0,
                    pending: VecDeque::new(),
                })
            }
            Some(other) => Err(RemoteError::Protocol(format!(
                "expected hello, got {other:?}"
            ))),
            None => Err(RemoteError::ConnectionClosed),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn launcher_name(&self) -> &str {
        &self.launcher_name
    }

    pub fn data_directory(&self) -> &str {
        &self.data_directory
    }

    /// Bound how long [`next_event`](Self::next_event) and
    /// [`query`](Self::query) block. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), RemoteError> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    fn send(&mut self, message: &PeerMessage) -> Result<(), RemoteError> {
        write_message(&mut self.writer, message)
    }

    /// Ask the launcher for a property, e.g. `profiles.names`.
    ///
    /// Events arriving before the reply are kept for `next_event`.
    pub fn query(&mut self, name: &str) -> Result<Vec<String>, RemoteError> {
        self.next_query += 1;
        let id = self.next_query;
        self.send(&PeerMessage::Query {
            id,
            name: name.to_owned(),
        })?;
        loop {
            match self.reader.read::<LauncherMessage>()? {
                Some(LauncherMessage::QueryReply {
                    id: reply, values, ..
                }) if reply == id => return Ok(values),
                Some(LauncherMessage::Rejected {
                    reason,
                    query: Some(reply),
                }) if reply == id => return Err(RemoteError::Rejected(reason)),
                Some(other) => self.pending.push_back(other),
                None => return Err(RemoteError::ConnectionClosed),
            }
        }
    }

    pub fn start(
        &mut self,
        game: &GameConfig,
        profile: &str,
        arguments: &str,
        parameters: &[String],
    ) -> Result<(), RemoteError> {
        info!("starting {} on '{}'", game.identifier, self.launcher_name);
        self.send(&PeerMessage::Start {
            game: Box::new(game.clone()),
            profile: profile.to_owned(),
            arguments: arguments.to_owned(),
            parameters: parameters.to_vec(),
        })
    }

    pub fn stop(&mut self) -> Result<(), RemoteError> {
        self.send(&PeerMessage::Stop)
    }

    pub fn kill(&mut self) -> Result<(), RemoteError> {
        self.send(&PeerMessage::Kill)
    }

    /// Next run status, log line or rejection. `Ok(None)` once the launcher
    /// hung up.
    pub fn next_event(&mut self) -> Result<Option<LauncherMessage>, RemoteError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        self.reader.read()
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("remote", &self.remote)
            .field("launcher_name", &self.launcher_name)
            .finish_non_exhaustive()
    }
}
