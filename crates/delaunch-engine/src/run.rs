use crate::handle::NativeHandle;
use crate::EngineError;
use delaunch_schema::{GameId, PatchId, ProfileName};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    pub full_screen: bool,
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            full_screen: true,
        }
    }
}

/// Fully resolved description of one launch.
///
/// Fields are private: a request is assembled by the session controller and
/// read-only from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    game_id: GameId,
    profile: NativeHandle,
    profile_name: ProfileName,
    arguments: String,
    surface: SurfaceSize,
    patches: Vec<PatchId>,
}

impl RunRequest {
    pub fn new(
        game_id: GameId,
        profile: NativeHandle,
        profile_name: ProfileName,
        arguments: String,
        surface: SurfaceSize,
        patches: Vec<PatchId>,
    ) -> Self {
        Self {
            game_id,
            profile,
            profile_name,
            arguments,
            surface,
            patches,
        }
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn profile(&self) -> NativeHandle {
        self.profile
    }

    pub fn profile_name(&self) -> &ProfileName {
        &self.profile_name
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn patches(&self) -> &[PatchId] {
        &self.patches
    }

    /// Copy of this request running with a different profile.
    #[must_use]
    pub fn with_profile(&self, profile: NativeHandle, profile_name: ProfileName) -> Self {
        Self {
            profile,
            profile_name,
            ..self.clone()
        }
    }
}

/// Discrete states a running game reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    State(RunState),
    Log {
        severity: LogSeverity,
        message: String,
    },
}

/// Callback receiving run events. May be invoked from any thread, including
/// synchronously from inside [`crate::EngineBoundary::launch`].
pub type RunObserver = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Control over one launched game.
pub trait RunHandle: Send {
    fn is_running(&self) -> bool;

    /// Ask the game to quit gracefully.
    fn stop(&mut self) -> Result<(), EngineError>;

    /// Terminate the game immediately.
    fn kill(&mut self) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_profile_keeps_everything_else() {
        let a = NativeHandle::from_raw(1).unwrap();
        let b = NativeHandle::from_raw(2).unwrap();
        let req = RunRequest::new(
            GameId::new("g"),
            a,
            ProfileName::new("Default"),
            "--foo".to_owned(),
            SurfaceSize::default(),
            vec![PatchId::new("p1")],
        );
        let custom = req.with_profile(b, ProfileName::new("g (custom)"));
        assert_eq!(custom.profile(), b);
        assert_eq!(custom.profile_name(), &ProfileName::new("g (custom)"));
        assert_eq!(custom.arguments(), "--foo");
        assert_eq!(custom.patches(), req.patches());
        assert_eq!(req.profile(), a);
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LogSeverity::Warning).unwrap(),
            "\"warning\""
        );
    }
}
