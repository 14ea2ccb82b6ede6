//! Launcher side of a remote connection.
//!
//! The launcher dials the peer, sends `hello`, then serves peer commands on a
//! reader thread until either side disconnects. At most one game started by
//! the peer runs at a time.

use crate::protocol::{
    write_message, LauncherMessage, MessageReader, PeerMessage, Property, REJECT_ALREADY_RUNNING,
    REJECT_NOT_READY,
};
use crate::{RemoteConfig, RemoteError, PROTOCOL_VERSION};
use delaunch_core::{CoreError, GameRun, LauncherHandle, ListenerId, ListenerSet};
use delaunch_engine::{RunEvent, RunObserver, RunState, SurfaceSize};
use delaunch_schema::{GameConfig, GameId, ProfileName};
use std::fmt;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Observer of a remote session. Callbacks may arrive on the reader thread
/// or on whatever thread the engine reports run events from, and may call
/// back into the session, including [`RemoteSession::disconnect`].
pub trait RemoteListener: Send + Sync {
    fn connection_changed(&self, _session: &RemoteSession, _state: ConnectionState) {}

    fn run_state_changed(&self, _session: &RemoteSession, _game: &GameId, _state: RunState) {}
}

struct Link {
    stream: TcpStream,
    reader: Option<JoinHandle<()>>,
    generation: u64,
}

struct Inner {
    launcher: LauncherHandle,
    config: RemoteConfig,
    state: Mutex<ConnectionState>,
    link: Mutex<Option<Link>>,
    run: Mutex<Option<GameRun>>,
    generation: AtomicU64,
    listeners: ListenerSet<dyn RemoteListener>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let link = self
            .link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(link) = link {
            if let Err(e) = link.stream.shutdown(Shutdown::Both) {
                debug!("closing remote socket: {e}");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remote control of a launcher by a development peer.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RemoteSession {
    inner: Arc<Inner>,
}

impl RemoteSession {
    pub fn new(launcher: LauncherHandle, config: RemoteConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                launcher,
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                link: Mutex::new(None),
                run: Mutex::new(None),
                generation: AtomicU64::new(0),
                listeners: ListenerSet::new(),
            }),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Game started by the peer that is still running.
    pub fn running_game(&self) -> Option<GameId> {
        lock(&self.inner.run)
            .as_ref()
            .filter(|run| run.is_running())
            .map(|run| run.request().game_id().clone())
    }

    pub fn add_listener(&self, listener: Arc<dyn RemoteListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Dial the configured peer and start serving its commands.
    pub fn connect(&self) -> Result<(), RemoteError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != ConnectionState::Disconnected {
                return Err(RemoteError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }
        self.notify_connection(ConnectionState::Connecting);

        match self.open_link() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    fn open_link(&self) -> Result<(), RemoteError> {
        let address = self.inner.config.socket_address();
        info!("connecting to peer {address}");
        let stream = TcpStream::connect(&address)
            .map_err(|source| RemoteError::ConnectionFailure { address, source })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("cannot disable Nagle on remote socket: {e}");
        }
        let reader_stream = stream.try_clone()?;

        let hello = LauncherMessage::Hello {
            version: PROTOCOL_VERSION,
            name: self.inner.config.name.clone(),
            data_directory: self.data_directory(),
        };
        write_message(&mut &stream, &hello)?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.inner.link) = Some(Link {
            stream,
            reader: None,
            generation,
        });
        self.set_state(ConnectionState::Connected);

        let weak = Arc::downgrade(&self.inner);
        let reader = std::thread::Builder::new()
            .name("delaunch-remote".to_owned())
            .spawn(move || serve(&weak, reader_stream, generation));
        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                self.close(Some(generation));
                return Err(e.into());
            }
        };
        if let Some(link) = lock(&self.inner.link)
            .as_mut()
            .filter(|link| link.generation == generation)
        {
            link.reader = Some(reader);
        }
        Ok(())
    }

    fn data_directory(&self) -> String {
        let configured = &self.inner.config.data_directory;
        if configured.as_os_str().is_empty() {
            self.inner
                .launcher
                .layout()
                .launcher_dir()
                .display()
                .to_string()
        } else {
            configured.display().to_string()
        }
    }

    /// Close the connection and stop the game the peer started. Safe to call
    /// repeatedly and from listener callbacks.
    pub fn disconnect(&self) {
        self.close(None);
    }

    /// Tear down the link. With a generation, only that connection is closed.
    fn close(&self, generation: Option<u64>) {
        let link = {
            let mut guard = lock(&self.inner.link);
            let current = match (guard.as_ref(), generation) {
                (None, _) => false,
                (Some(link), Some(g)) => link.generation == g,
                (Some(_), None) => true,
            };
            if !current {
                return;
            }
            guard.take()
        };
        let Some(link) = link else {
            return;
        };
        info!("disconnecting from peer");
        if let Err(e) = link.stream.shutdown(Shutdown::Both) {
            debug!("remote socket shutdown: {e}");
        }

        let run = lock(&self.inner.run).take();
        if let Some(mut run) = run {
            if run.is_running() {
                info!("peer gone, stopping {}", run.request().game_id());
                if let Err(e) = run.stop() {
                    warn!("stopping {} failed: {e}", run.request().game_id());
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);

        if let Some(reader) = link.reader {
            if reader.thread().id() == std::thread::current().id() {
                return;
            }
            if reader.join().is_err() {
                warn!("remote reader thread panicked");
            }
        }
    }

    fn set_state(&self, to: ConnectionState) {
        let from = std::mem::replace(&mut *lock(&self.inner.state), to);
        if from != to {
            debug!("remote connection {from} -> {to}");
            self.notify_connection(to);
        }
    }

    fn notify_connection(&self, state: ConnectionState) {
        self.inner
            .listeners
            .dispatch(|l| l.connection_changed(self, state));
    }

    fn send(&self, message: &LauncherMessage) {
        let guard = lock(&self.inner.link);
        let Some(link) = guard.as_ref() else {
            debug!("not connected, dropping {message:?}");
            return;
        };
        if let Err(e) = write_message(&mut &link.stream, message) {
            warn!("sending to peer failed: {e}");
        }
    }

    fn reject(&self, reason: &str, query: Option<u64>) {
        info!("rejecting peer request: {reason}");
        self.send(&LauncherMessage::Rejected {
            reason: reason.to_owned(),
            query,
        });
    }

    fn handle(&self, message: PeerMessage, generation: u64) {
        debug!("peer message {message:?}");
        match message {
            PeerMessage::Query { id, name } => self.answer_query(id, &name),
            PeerMessage::Start {
                game,
                profile,
                arguments,
                parameters,
            } => self.start(&game, &profile, &arguments, &parameters, generation),
            PeerMessage::Stop => self.end_run(false),
            PeerMessage::Kill => self.end_run(true),
        }
    }

    fn answer_query(&self, id: u64, name: &str) {
        let Some(property) = Property::parse(name) else {
            self.reject(&format!("unknown property {name}"), Some(id));
            return;
        };
        let catalog = self.inner.launcher.catalog();
        let values = match property {
            Property::PropertyNames => Property::ALL.iter().map(|p| p.name().to_owned()).collect(),
            Property::ProfileNames => catalog
                .profile_names()
                .into_iter()
                .map(ProfileName::into_inner)
                .collect(),
            Property::DefaultProfile => catalog
                .default_profile()
                .map(|p| p.name().into_inner())
                .into_iter()
                .collect(),
        };
        self.send(&LauncherMessage::QueryReply {
            id,
            name: name.to_owned(),
            values,
        });
    }

    /// True while a peer-started game runs. A finished run is cleared.
    fn run_active(&self) -> bool {
        let mut slot = lock(&self.inner.run);
        if slot.as_ref().is_some_and(GameRun::is_running) {
            return true;
        }
        let finished = slot.take();
        drop(slot);
        drop(finished);
        false
    }

    /// Whether connection `generation` is still the open one.
    fn link_is_current(&self, generation: u64) -> bool {
        lock(&self.inner.link)
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    fn start(
        &self,
        game: &GameConfig,
        profile: &str,
        arguments: &str,
        parameters: &[String],
        generation: u64,
    ) {
        if !self.inner.launcher.is_ready() {
            self.reject(REJECT_NOT_READY, None);
            return;
        }
        if self.run_active() {
            self.reject(REJECT_ALREADY_RUNNING, None);
            return;
        }

        // The run slot stays unlocked here: the engine reports the first
        // run states from inside the launch call.
        let observer = self.run_observer(game.identifier.clone());
        let result = self.inner.launcher.session().start_game(
            game,
            Some(profile),
            None,
            arguments,
            parameters,
            SurfaceSize::default(),
            observer,
        );
        match result {
            Ok(run) => {
                info!(
                    "peer started {} with profile '{}'",
                    game.identifier,
                    run.request().profile_name()
                );
                // Checked under the run slot: a close that took the link
                // before this point will not see the run, so stop it here.
                let mut slot = lock(&self.inner.run);
                if !self.link_is_current(generation) {
                    drop(slot);
                    self.abandon(run);
                } else if run.is_running() {
                    *slot = Some(run);
                } else {
                    drop(slot);
                    drop(run);
                }
            }
            Err(CoreError::NotReady) => self.reject(REJECT_NOT_READY, None),
            Err(CoreError::GameAlreadyRunning(_)) => self.reject(REJECT_ALREADY_RUNNING, None),
            Err(e) => {
                warn!("peer start of {} failed: {e}", game.identifier);
                self.reject(&e.to_string(), None);
            }
        }
    }

    /// Stop a run whose connection closed while it was starting.
    fn abandon(&self, mut run: GameRun) {
        if !run.is_running() {
            return;
        }
        info!("peer gone while starting, stopping {}", run.request().game_id());
        if let Err(e) = run.stop() {
            warn!("stopping {} failed: {e}", run.request().game_id());
        }
    }

    fn end_run(&self, kill: bool) {
        let run = lock(&self.inner.run).take();
        let Some(mut run) = run else {
            debug!("no peer game running, ignoring {}", if kill { "kill" } else { "stop" });
            return;
        };
        let result = if kill { run.kill() } else { run.stop() };
        if let Err(e) = result {
            warn!("ending {} failed: {e}", run.request().game_id());
        }
        if run.is_running() {
            let mut slot = lock(&self.inner.run);
            if slot.is_none() {
                *slot = Some(run);
            }
        }
    }

    fn run_observer(&self, game: GameId) -> RunObserver {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |event: RunEvent| {
            if let Some(inner) = weak.upgrade() {
                RemoteSession { inner }.relay(&game, event);
            }
        })
    }

    fn relay(&self, game: &GameId, event: RunEvent) {
        match event {
            RunEvent::State(state) => {
                match state {
                    RunState::Running | RunState::Stopped => {
                        self.send(&LauncherMessage::RunStatus {
                            game: game.clone(),
                            state,
                        });
                    }
                    RunState::Starting | RunState::Stopping => {}
                }
                if state == RunState::Stopped {
                    self.clear_finished_run();
                }
                self.inner
                    .listeners
                    .dispatch(|l| l.run_state_changed(self, game, state));
            }
            RunEvent::Log { severity, message } => self.send(&LauncherMessage::Log {
                game: game.clone(),
                severity,
                message,
            }),
        }
    }

    fn clear_finished_run(&self) {
        let finished = {
            let mut slot = lock(&self.inner.run);
            if slot.as_ref().is_some_and(|run| !run.is_running()) {
                slot.take()
            } else {
                None
            }
        };
        drop(finished);
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("address", &self.inner.config.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Reader loop. Holds only a weak reference so dropping the last session
/// closes the socket and ends the loop.
fn serve(weak: &Weak<Inner>, stream: TcpStream, generation: u64) {
    let mut reader = MessageReader::new(stream);
    loop {
        let message = match reader.read::<PeerMessage>() {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("peer closed the connection");
                break;
            }
            Err(RemoteError::Serialization(e)) => {
                warn!("malformed peer message: {e}");
                if let Some(inner) = weak.upgrade() {
                    RemoteSession { inner }.reject(&format!("malformed message: {e}"), None);
                }
                continue;
            }
            Err(e) => {
                debug!("remote connection ended: {e}");
                break;
            }
        };
        let Some(inner) = weak.upgrade() else {
            break;
        };
        RemoteSession { inner }.handle(message, generation);
    }
    if let Some(inner) = weak.upgrade() {
        RemoteSession { inner }.close(Some(generation));
    }
}
