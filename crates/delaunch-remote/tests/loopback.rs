//! Launcher and reference peer talking over real loopback TCP.

mod common;

use common::{demo, engine, launcher, ready_launcher, wait_until};
use delaunch_core::Launcher;
use delaunch_engine::{EngineBoundary, LogSeverity, MockEngine, RunState};
use delaunch_remote::{
    ConnectionState, LauncherMessage, Peer, PeerListener, RemoteConfig, RemoteError,
    RemoteListener, RemoteSession, REJECT_ALREADY_RUNNING, REJECT_NOT_READY,
};
use delaunch_schema::{GameConfig, GameId};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn session_for(launcher: &Launcher, listener: &PeerListener) -> RemoteSession {
    let address = listener.local_addr().unwrap().to_string();
    RemoteSession::new(
        launcher.handle().clone(),
        RemoteConfig::new(&address).with_name("tablet"),
    )
}

fn accept(listener: &PeerListener) -> Peer {
    let peer = listener.accept().unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    peer
}

fn connect(launcher: &Launcher) -> (RemoteSession, Peer, PeerListener) {
    let listener = PeerListener::bind("127.0.0.1:0").unwrap();
    let session = session_for(launcher, &listener);
    session.connect().unwrap();
    let peer = accept(&listener);
    (session, peer, listener)
}

fn next(peer: &mut Peer) -> LauncherMessage {
    peer.next_event().unwrap().expect("launcher hung up")
}

fn status(state: RunState) -> LauncherMessage {
    LauncherMessage::RunStatus {
        game: GameId::new("demo"),
        state,
    }
}

fn rejected(reason: &str) -> LauncherMessage {
    LauncherMessage::Rejected {
        reason: reason.to_owned(),
        query: None,
    }
}

fn game_running(engine: &MockEngine, id: &str) -> bool {
    engine
        .game_handle(id)
        .is_some_and(|game| engine.game_status(game).unwrap().running)
}

#[derive(Default)]
struct States(Mutex<Vec<ConnectionState>>);

impl States {
    fn seen(&self) -> Vec<ConnectionState> {
        self.0.lock().unwrap().clone()
    }
}

impl RemoteListener for States {
    fn connection_changed(&self, _session: &RemoteSession, state: ConnectionState) {
        self.0.lock().unwrap().push(state);
    }
}

#[test]
fn handshake_and_property_queries() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);

    assert!(session.is_connected());
    assert_eq!(peer.launcher_name(), "tablet");
    assert_eq!(
        peer.data_directory(),
        launcher.handle().layout().launcher_dir().display().to_string()
    );
    assert_eq!(
        peer.query("properties.names").unwrap(),
        vec!["properties.names", "profiles.names", "profiles.default"]
    );
    assert_eq!(
        peer.query("profiles.names").unwrap(),
        vec!["Default", "Windowed"]
    );
    assert_eq!(peer.query("profiles.default").unwrap(), vec!["Default"]);
    match peer.query("screen.size") {
        Err(RemoteError::Rejected(reason)) => assert!(reason.contains("screen.size")),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn start_relays_status_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);

    peer.start(&demo(), "", "-dev", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    assert!(wait_until(|| session.running_game().is_some()));
    assert_eq!(engine.launches()[0].arguments(), "-dev");
    assert!(launcher.handle().game_store().exists("demo"));

    assert!(engine.emit_log(&GameId::new("demo"), LogSeverity::Warning, "low memory"));
    assert_eq!(
        next(&mut peer),
        LauncherMessage::Log {
            game: GameId::new("demo"),
            severity: LogSeverity::Warning,
            message: "low memory".to_owned(),
        }
    );

    peer.stop().unwrap();
    assert_eq!(next(&mut peer), status(RunState::Stopped));
    assert!(wait_until(|| session.running_game().is_none()));
    assert!(!game_running(&engine, "demo"));
}

#[test]
fn second_start_is_rejected_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (_session, mut peer, _listener) = connect(&launcher);

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), rejected(REJECT_ALREADY_RUNNING));
    assert_eq!(engine.launches().len(), 1);
}

#[test]
fn start_before_ready_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = launcher(dir.path(), &engine);
    let (_session, mut peer, _listener) = connect(&launcher);

    assert!(peer.query("profiles.names").unwrap().is_empty());
    assert!(peer.query("profiles.default").unwrap().is_empty());
    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), rejected(REJECT_NOT_READY));
    assert!(engine.launches().is_empty());
}

#[test]
fn game_exit_is_relayed_and_allows_restart() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    assert!(engine.finish_game(&GameId::new("demo")));
    assert_eq!(next(&mut peer), status(RunState::Stopped));
    assert!(wait_until(|| session.running_game().is_none()));

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    assert_eq!(engine.launches().len(), 2);
}

#[test]
fn kill_ends_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (_session, mut peer, _listener) = connect(&launcher);

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    peer.kill().unwrap();
    assert_eq!(next(&mut peer), status(RunState::Stopped));
    assert!(!game_running(&engine, "demo"));
}

#[test]
fn stop_without_game_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);

    peer.stop().unwrap();
    peer.kill().unwrap();
    assert_eq!(peer.query("profiles.default").unwrap(), vec!["Default"]);
    assert!(session.is_connected());
}

#[test]
fn explicit_profile_and_parameters_are_used() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (_session, mut peer, _listener) = connect(&launcher);

    peer.start(
        &demo(),
        "Windowed",
        "",
        &["graphic-mod:vsync=1".to_owned()],
    )
    .unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    let launches = engine.launches();
    let launch = &launches[0];
    assert_eq!(launch.profile_name(), "demo (custom)");
    let custom = engine.profile_config(launch.profile()).unwrap();
    assert_eq!(custom.parameters.get("graphic-mod", "vsync"), Some("1"));
}

#[test]
fn unrunnable_game_is_rejected_with_reason() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (_session, mut peer, _listener) = connect(&launcher);

    peer.start(&GameConfig::new("other", "Lua"), "", "", &[])
        .unwrap();
    match next(&mut peer) {
        LauncherMessage::Rejected { reason, query } => {
            assert!(reason.contains("cannot run"), "{reason}");
            assert!(query.is_none());
        }
        other => panic!("unexpected message {other:?}"),
    }
}

#[test]
fn peer_hangup_stops_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    drop(peer);

    assert!(wait_until(|| session.state() == ConnectionState::Disconnected));
    assert!(wait_until(|| !game_running(&engine, "demo")));
    assert!(session.running_game().is_none());
}

#[test]
fn launcher_disconnect_closes_peer_and_can_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let listener = PeerListener::bind("127.0.0.1:0").unwrap();
    let session = session_for(&launcher, &listener);
    let states = Arc::new(States::default());
    session.add_listener(Arc::clone(&states) as Arc<dyn RemoteListener>);

    session.connect().unwrap();
    assert!(matches!(session.connect(), Err(RemoteError::AlreadyConnected)));
    let mut peer = accept(&listener);

    session.disconnect();
    session.disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(peer.next_event().unwrap().is_none());
    assert_eq!(
        states.seen(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected
        ]
    );

    session.connect().unwrap();
    let mut again = accept(&listener);
    assert_eq!(again.query("profiles.default").unwrap(), vec!["Default"]);
}

#[test]
fn unreachable_peer_is_connection_failure() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let listener = PeerListener::bind("127.0.0.1:0").unwrap();
    let session = session_for(&launcher, &listener);
    drop(listener);
    let states = Arc::new(States::default());
    session.add_listener(Arc::clone(&states) as Arc<dyn RemoteListener>);

    assert!(matches!(
        session.connect(),
        Err(RemoteError::ConnectionFailure { .. })
    ));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(
        states.seen(),
        vec![ConnectionState::Connecting, ConnectionState::Disconnected]
    );
}

/// Disconnects from inside the run-state callback.
struct DisconnectOnStop;

impl RemoteListener for DisconnectOnStop {
    fn run_state_changed(&self, session: &RemoteSession, _game: &GameId, state: RunState) {
        if state == RunState::Stopped {
            session.disconnect();
        }
    }
}

#[test]
fn listener_may_disconnect_from_callback() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);
    session.add_listener(Arc::new(DisconnectOnStop));

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    peer.stop().unwrap();
    assert_eq!(next(&mut peer), status(RunState::Stopped));
    assert!(peer.next_event().unwrap().is_none());
    assert!(wait_until(|| session.state() == ConnectionState::Disconnected));
}

/// Disconnects as soon as the started game reports Running.
struct DisconnectOnRunning;

impl RemoteListener for DisconnectOnRunning {
    fn run_state_changed(&self, session: &RemoteSession, _game: &GameId, state: RunState) {
        if state == RunState::Running {
            session.disconnect();
        }
    }
}

#[test]
fn disconnect_while_starting_stops_the_game() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let launcher = ready_launcher(dir.path(), &engine);
    let (session, mut peer, _listener) = connect(&launcher);
    session.add_listener(Arc::new(DisconnectOnRunning));

    peer.start(&demo(), "", "", &[]).unwrap();
    assert_eq!(next(&mut peer), status(RunState::Running));
    assert!(peer.next_event().unwrap().is_none());

    assert!(wait_until(|| session.state() == ConnectionState::Disconnected));
    assert!(wait_until(|| !game_running(&engine, "demo")));
    assert!(session.running_game().is_none());
    assert_eq!(engine.launches().len(), 1);
}
