use clap::Parser;
use delaunch_core::{install_signal_handler, shutdown_requested};
use delaunch_engine::RunState;
use delaunch_remote::{LauncherMessage, Peer, PeerListener, RemoteError, DEFAULT_PORT};
use delaunch_schema::{parse_game_config_str, GameConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "delaunch-peer",
    version,
    about = "Reference peer that drives a delaunch launcher over the network"
)]
struct Cli {
    /// Address to listen on for the launcher.
    #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_PORT}"))]
    listen: String,

    /// Game configuration (JSON) to start once the launcher is connected.
    /// Without it the peer only prints launcher properties and events.
    #[arg(long)]
    game: Option<PathBuf>,

    /// Profile to run the game with. Empty lets the launcher choose.
    #[arg(long, default_value = "")]
    profile: String,

    /// Extra game arguments.
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    arguments: String,

    /// Module parameter override `module:parameter=value`. Repeatable.
    #[arg(long = "param")]
    parameters: Vec<String>,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

const PROPERTIES: [&str; 2] = ["profiles.names", "profiles.default"];

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DELAUNCH_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = install_signal_handler() {
        error!("{e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_game(path: &Path) -> Result<GameConfig, RemoteError> {
    let content = std::fs::read_to_string(path)?;
    parse_game_config_str(&content)
        .map_err(|e| RemoteError::Config(format!("{}: {e}", path.display())))
}

fn run(cli: &Cli) -> Result<(), RemoteError> {
    let game = cli.game.as_deref().map(load_game).transpose()?;
    let listener = PeerListener::bind(cli.listen.as_str())?;

    let Some(mut peer) = wait_for_launcher(&listener)? else {
        return Ok(());
    };
    println!(
        "launcher '{}' at {} (data in {})",
        peer.launcher_name(),
        peer.remote_addr(),
        peer.data_directory()
    );
    for property in PROPERTIES {
        println!("{property}: {}", peer.query(property)?.join(", "));
    }

    if let Some(game) = &game {
        peer.start(game, &cli.profile, &cli.arguments, &cli.parameters)?;
    }
    follow(&mut peer, game.is_some())
}

/// Poll for a launcher so Ctrl-C can interrupt the wait.
fn wait_for_launcher(listener: &PeerListener) -> Result<Option<Peer>, RemoteError> {
    info!("waiting for a launcher on {}", listener.local_addr()?);
    loop {
        if shutdown_requested() {
            return Ok(None);
        }
        if let Some(peer) = listener.try_accept()? {
            return Ok(Some(peer));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Print launcher events until the game ends, the launcher hangs up or the
/// user interrupts. An interrupt kills a started game first.
fn follow(peer: &mut Peer, started: bool) -> Result<(), RemoteError> {
    peer.set_read_timeout(Some(Duration::from_millis(250)))?;
    let mut kill_sent = false;
    loop {
        match peer.next_event() {
            Ok(Some(event)) => {
                if report(&event) && started {
                    return Ok(());
                }
            }
            Ok(None) => {
                info!("launcher disconnected");
                return Ok(());
            }
            Err(RemoteError::Timeout) => {}
            Err(e) => return Err(e),
        }
        if shutdown_requested() {
            if !started {
                return Ok(());
            }
            if !kill_sent {
                peer.kill()?;
                kill_sent = true;
            }
        }
    }
}

/// Print one event. Returns true when it ends the run.
fn report(event: &LauncherMessage) -> bool {
    match event {
        LauncherMessage::RunStatus { game, state } => {
            println!("{game}: {state:?}");
            *state == RunState::Stopped
        }
        LauncherMessage::Log {
            game,
            severity,
            message,
        } => {
            println!("[{game}] {severity:?}: {message}");
            false
        }
        LauncherMessage::Rejected { reason, .. } => {
            println!("rejected: {reason}");
            true
        }
        other => {
            info!("unexpected launcher message {other:?}");
            false
        }
    }
}
