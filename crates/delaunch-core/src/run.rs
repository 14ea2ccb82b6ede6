use crate::registry::GameProxy;
use crate::CoreError;
use delaunch_engine::{RunHandle, RunRequest, RunState};
use std::fs::File;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// A launched game.
///
/// Dropping a `GameRun` whose game is still running kills it.
pub struct GameRun {
    game: GameProxy,
    request: RunRequest,
    handle: Box<dyn RunHandle>,
    state: Arc<Mutex<RunState>>,
    /// Mounted game archive; the engine reads through its descriptor.
    _archive: Option<File>,
}

impl GameRun {
    pub(crate) fn new(
        game: GameProxy,
        request: RunRequest,
        handle: Box<dyn RunHandle>,
        state: Arc<Mutex<RunState>>,
        archive: Option<File>,
    ) -> Self {
        Self {
            game,
            request,
            handle,
            state,
            _archive: archive,
        }
    }

    pub fn game(&self) -> &GameProxy {
        &self.game
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    /// Last state the engine reported.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Ask the game to quit, then kill it if it is still running.
    pub fn stop(&mut self) -> Result<(), CoreError> {
        if !self.handle.is_running() {
            return Ok(());
        }
        info!("stopping game {}", self.request.game_id());
        self.handle.stop()?;
        if self.handle.is_running() {
            warn!(
                "game {} still running after stop, killing",
                self.request.game_id()
            );
            self.handle.kill()?;
        }
        Ok(())
    }

    pub fn kill(&mut self) -> Result<(), CoreError> {
        if !self.handle.is_running() {
            return Ok(());
        }
        info!("killing game {}", self.request.game_id());
        self.handle.kill()?;
        Ok(())
    }
}

impl std::fmt::Debug for GameRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRun")
            .field("game", &self.request.game_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for GameRun {
    fn drop(&mut self) {
        if self.handle.is_running() {
            warn!("dropping running game {}, killing", self.request.game_id());
            if let Err(e) = self.handle.kill() {
                warn!("killing game {} failed: {e}", self.request.game_id());
            }
        }
    }
}
