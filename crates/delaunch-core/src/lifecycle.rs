use crate::CoreError;
use serde::{Deserialize, Serialize};

/// Provisioning state of the engine runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallationState {
    VerifyInstallation,
    Installing,
    InstallFailed,
    LoadingLibraries,
    LoadFailed,
    CreatingRuntime,
    CreateFailed,
    Ready,
}

impl InstallationState {
    pub fn is_failed(self) -> bool {
        matches!(
            self,
            InstallationState::InstallFailed
                | InstallationState::LoadFailed
                | InstallationState::CreateFailed
        )
    }

    /// States where provisioning makes no further progress on its own.
    pub fn is_settled(self) -> bool {
        self.is_failed() || self == InstallationState::Ready
    }
}

impl std::fmt::Display for InstallationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallationState::VerifyInstallation => write!(f, "verify-installation"),
            InstallationState::Installing => write!(f, "installing"),
            InstallationState::InstallFailed => write!(f, "install-failed"),
            InstallationState::LoadingLibraries => write!(f, "loading-libraries"),
            InstallationState::LoadFailed => write!(f, "load-failed"),
            InstallationState::CreatingRuntime => write!(f, "creating-runtime"),
            InstallationState::CreateFailed => write!(f, "create-failed"),
            InstallationState::Ready => write!(f, "ready"),
        }
    }
}

/// Every state may return to `VerifyInstallation` (retry, cancellation,
/// shutdown); everything else moves strictly forward.
pub fn validate_transition(
    from: InstallationState,
    to: InstallationState,
) -> Result<(), CoreError> {
    use InstallationState::{
        CreateFailed, CreatingRuntime, InstallFailed, Installing, LoadFailed, LoadingLibraries,
        Ready, VerifyInstallation,
    };

    let valid = matches!(
        (from, to),
        (_, VerifyInstallation)
            | (VerifyInstallation, Installing | LoadingLibraries)
            | (Installing, InstallFailed | LoadingLibraries)
            | (LoadingLibraries, LoadFailed | CreatingRuntime)
            | (CreatingRuntime, CreateFailed | Ready)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
