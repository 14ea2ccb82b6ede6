//! Turning a game into a run request and launching it.
//!
//! Profile resolution walks the candidates in precedence order and reports
//! every candidate it had to reject. Patch selection, argument composition
//! and module parameter overrides follow, and the finished request goes to
//! the engine through [`SessionController::launch`].

use crate::catalog::Catalog;
use crate::provisioner::LauncherHandle;
use crate::registry::{GameProxy, ManagedProxy, ProfileProxy};
use crate::run::GameRun;
use crate::CoreError;
use delaunch_engine::{
    LogSeverity, NativeHandle, RunEvent, RunObserver, RunRequest, RunState, SurfaceSize, VfsMount,
};
use delaunch_schema::{
    compare_versions, parse_module_parameter, sort_patches, GameConfig, ModuleDescriptor,
    ModuleErrorCode, ModuleName, ModuleParameters, ModuleType, PatchId, PatchInfo, ProfileConfig,
    ProfileName,
};
use delaunch_store::StoreError;
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Where a profile candidate came from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Explicit,
    GameActive,
    GameCustom,
    LauncherActive,
    LauncherDefault,
}

impl fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProfileSource::Explicit => "requested",
            ProfileSource::GameActive => "game profile",
            ProfileSource::GameCustom => "game custom profile",
            ProfileSource::LauncherActive => "launcher active profile",
            ProfileSource::LauncherDefault => "launcher default profile",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleProblemReason {
    NotSelected,
    Missing,
    WrongType(ModuleType),
    NotReady(ModuleErrorCode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProblem {
    pub module_type: ModuleType,
    pub module: ModuleName,
    pub reason: ModuleProblemReason,
}

impl fmt::Display for ModuleProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (ty, module) = (self.module_type, &self.module);
        match self.reason {
            ModuleProblemReason::NotSelected => write!(f, "no {ty} module selected"),
            ModuleProblemReason::Missing => write!(f, "{ty} module {module} not found"),
            ModuleProblemReason::WrongType(actual) => {
                write!(f, "{module} is a {actual} module, not {ty}")
            }
            ModuleProblemReason::NotReady(code) => {
                write!(f, "{ty} module {module} is not ready: {}", code.describe())
            }
        }
    }
}

/// A profile candidate that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedProfile {
    pub name: ProfileName,
    pub source: ProfileSource,
    pub problems: Vec<ModuleProblem>,
}

impl fmt::Display for RejectedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': ", self.source, self.name)?;
        for (i, problem) in self.problems.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{problem}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub profile: ProfileProxy,
    pub source: ProfileSource,
    /// Higher-precedence candidates that were skipped.
    pub rejected: Vec<RejectedProfile>,
}

fn find_module<'a>(catalog: &'a Catalog, name: &str, version: &str) -> Option<&'a ModuleDescriptor> {
    if version.is_empty() {
        return catalog.module_named(name);
    }
    catalog
        .modules()
        .iter()
        .find(|m| m.name == name && compare_versions(&m.version, version) == Ordering::Equal)
}

/// Check that every system slot of `profile` names a ready module of the
/// right type.
pub fn validate_profile(catalog: &Catalog, profile: &ProfileConfig) -> Vec<ModuleProblem> {
    let mut problems = Vec::new();
    for module_type in ModuleType::PROFILE_TYPES {
        let Some(selection) = profile.module(module_type).filter(|s| !s.name.is_empty()) else {
            problems.push(ModuleProblem {
                module_type,
                module: ModuleName::new(""),
                reason: ModuleProblemReason::NotSelected,
            });
            continue;
        };
        let reason = match find_module(catalog, &selection.name, &selection.version) {
            None => Some(ModuleProblemReason::Missing),
            Some(m) if m.module_type != module_type => {
                Some(ModuleProblemReason::WrongType(m.module_type))
            }
            Some(m) if !m.is_ready() => Some(ModuleProblemReason::NotReady(m.error_code)),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            problems.push(ModuleProblem {
                module_type,
                module: selection.name.clone(),
                reason,
            });
        }
    }
    problems
}

/// A game can run when its script module is available and ready in at least
/// the requested version and every file format it needs has a ready loader.
pub fn validate_game(catalog: &Catalog, game: &GameConfig) -> Result<(), CoreError> {
    let mut problems = Vec::new();

    let script = catalog
        .module_named_at_least(&game.script_module, &game.script_module_version);
    match script {
        None => problems.push(format!(
            "script module {} {} not found",
            game.script_module, game.script_module_version
        )
        .trim_end()
        .to_owned()),
        Some(m) if m.module_type != ModuleType::Script => problems.push(format!(
            "{} is a {} module, not a script module",
            m.name, m.module_type
        )),
        Some(m) if !m.is_ready() => problems.push(format!(
            "script module {} is not ready: {}",
            m.name,
            m.error_code.describe()
        )),
        Some(_) => {}
    }

    for format in &game.file_formats {
        let supported = !format.module_type.is_single_type()
            && catalog
                .modules_of_type(format.module_type)
                .any(|m| m.is_ready() && m.handles_pattern(&format.pattern));
        if !supported {
            problems.push(format!(
                "file format {} ({}) is not supported",
                format.pattern, format.module_type
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::GameNotRunnable {
            game: game.identifier.clone(),
            problems,
        })
    }
}

/// Patches to apply, in application order.
///
/// An explicit patch (or the game's custom patch) is applied together with
/// the chain of patches it requires. Otherwise, with `use_latest_patch`, all
/// of the game's patches are applied ordered by their requirements.
pub fn select_patches(
    game: &GameConfig,
    explicit: Option<&PatchId>,
) -> Result<Vec<PatchId>, CoreError> {
    let patches: Vec<PatchInfo> = game
        .patches
        .iter()
        .filter(|p| p.game_id == game.identifier)
        .cloned()
        .collect();

    if let Some(id) = explicit.or(game.custom_patch.as_ref()) {
        return patch_chain(&patches, id);
    }
    if game.use_latest_patch {
        return Ok(sort_patches(&patches).into_iter().map(|p| p.id).collect());
    }
    Ok(Vec::new())
}

fn patch_chain(patches: &[PatchInfo], id: &PatchId) -> Result<Vec<PatchId>, CoreError> {
    let available = |id: &PatchId| patches.iter().any(|p| &p.id == id);
    let mut chain: Vec<PatchId> = Vec::new();
    let mut current = id.clone();
    loop {
        let patch = patches
            .iter()
            .find(|p| p.id == current)
            .ok_or_else(|| CoreError::PatchNotFound(current.clone()))?;
        if chain.contains(&patch.id) {
            warn!("patch requirements of {} form a cycle", patch.id);
            break;
        }
        chain.push(patch.id.clone());
        match patch
            .required
            .iter()
            .find(|r| available(r))
            .or(patch.required.first())
        {
            Some(next) => current = next.clone(),
            None => break,
        }
    }
    chain.reverse();
    Ok(chain)
}

/// Join game, profile and extra arguments.
///
/// With `replace` the profile arguments stand in for the game's. Every part
/// is trimmed and empty parts are dropped.
pub fn compose_arguments(
    game_arguments: &str,
    profile_arguments: &str,
    replace: bool,
    extra: &str,
) -> String {
    let mut parts = Vec::with_capacity(3);
    if !replace {
        parts.push(game_arguments);
    }
    parts.push(profile_arguments);
    parts.push(extra);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves, prepares and launches games on a provisioned launcher.
#[derive(Clone)]
pub struct SessionController {
    launcher: LauncherHandle,
}

impl SessionController {
    pub fn new(launcher: LauncherHandle) -> Self {
        Self { launcher }
    }

    pub fn launcher(&self) -> &LauncherHandle {
        &self.launcher
    }

    fn root(&self) -> Result<NativeHandle, CoreError> {
        self.launcher.root().ok_or(CoreError::NotReady)
    }

    /// Pick the profile `game` runs with.
    ///
    /// Candidates in order: `explicit`, the game's active profile, the game's
    /// custom profile, the launcher's active profile, the launcher's default
    /// profile. The first one that validates wins; rejected candidates are
    /// returned alongside it.
    pub fn resolve_profile(
        &self,
        game: &GameProxy,
        explicit: Option<&ProfileProxy>,
    ) -> Result<ResolvedProfile, CoreError> {
        let catalog = self.launcher.catalog();
        let candidates = [
            (ProfileSource::Explicit, explicit.cloned()),
            (ProfileSource::GameActive, game.active_profile()?),
            (ProfileSource::GameCustom, game.custom_profile()?),
            (ProfileSource::LauncherActive, catalog.active_profile().cloned()),
            (ProfileSource::LauncherDefault, catalog.default_profile().cloned()),
        ];

        let mut rejected = Vec::new();
        let mut checked = Vec::new();
        for (source, profile) in candidates {
            let Some(profile) = profile else {
                continue;
            };
            if checked.contains(&profile.key()) {
                continue;
            }
            checked.push(profile.key());

            let config = profile.config();
            let problems = validate_profile(&catalog, &config);
            if problems.is_empty() {
                debug!(
                    "game {} uses {source} '{}'",
                    game.identifier(),
                    config.name
                );
                return Ok(ResolvedProfile {
                    profile,
                    source,
                    rejected,
                });
            }
            let candidate = RejectedProfile {
                name: config.name,
                source,
                problems,
            };
            warn!("game {}: rejected {candidate}", game.identifier());
            rejected.push(candidate);
        }

        if rejected.is_empty() {
            Err(CoreError::NoValidProfile(game.identifier()))
        } else {
            Err(CoreError::ProfileResolution {
                game: game.identifier(),
                rejected,
            })
        }
    }

    /// Assemble the run request for `game` with `profile`.
    ///
    /// The profile's window size applies when set; a game window size,
    /// scaled by the display factor, overrides it and forces windowed mode.
    /// `patch` selects a patch explicitly, see [`select_patches`].
    pub fn build_run_request(
        &self,
        game: &GameConfig,
        profile: &ProfileProxy,
        patch: Option<&PatchId>,
        surface: SurfaceSize,
        extra_arguments: &str,
    ) -> Result<RunRequest, CoreError> {
        let config = profile.config();
        let arguments = compose_arguments(
            &game.arguments,
            &config.arguments,
            config.replace_arguments,
            extra_arguments,
        );

        let mut surface = surface;
        if config.width > 0 && config.height > 0 {
            surface = SurfaceSize {
                width: config.width,
                height: config.height,
                full_screen: config.full_screen,
            };
        }
        if !game.window_size.is_zero() {
            let size = game.window_size.scaled(self.launcher.scale_percent());
            surface = SurfaceSize {
                width: size.width,
                height: size.height,
                full_screen: false,
            };
        }

        let patches = select_patches(game, patch)?;
        Ok(RunRequest::new(
            game.identifier.clone(),
            profile.handle(),
            config.name,
            arguments,
            surface,
            patches,
        ))
    }

    /// Run with module parameter overrides.
    ///
    /// The overrides go into the game's custom profile. Unless `resolved` is
    /// the custom profile itself, the custom profile is first reset to a copy
    /// of `resolved`, which is left untouched. A game window size is written
    /// into the custom profile as a windowed mode. Returns `request`
    /// unchanged when there are no overrides.
    pub fn apply_custom_module_parameters(
        &self,
        game: &GameProxy,
        resolved: &ProfileProxy,
        parameters: &ModuleParameters,
        request: RunRequest,
    ) -> Result<RunRequest, CoreError> {
        if parameters.is_empty() {
            return Ok(request);
        }

        let (custom, mut config) = match game.custom_profile()? {
            Some(existing) if existing == *resolved => {
                let config = existing.config();
                (existing, config)
            }
            Some(existing) => {
                let mut config = resolved.config();
                config.name = existing.name();
                debug!("resetting custom profile '{}' from '{}'", config.name, resolved.name());
                (existing, config)
            }
            None => {
                let mut config = resolved.config();
                config.name = ProfileName::custom_for(&game.identifier());
                let handle = self
                    .launcher
                    .boundary()
                    .create_profile(self.root()?, &config)?;
                let custom = self.launcher.registry().adopt_profile(handle)?;
                let active = game.active_profile()?;
                game.bind_profiles(active.as_ref(), Some(&custom))?;
                info!("created custom profile '{}'", config.name);
                (custom, config)
            }
        };

        config.parameters.update(parameters);
        let window = game.config()?.window_size;
        if !window.is_zero() {
            config.full_screen = false;
            config.width = window.width;
            config.height = window.height;
        }
        custom.set_config(&config)?;

        match self
            .launcher
            .game_store()
            .set_custom_profile(&game.identifier(), Some(&config))
        {
            Ok(_) => {}
            Err(StoreError::GameNotFound(id)) => {
                debug!("game {id} is not stored, custom profile lives in the engine only");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(request.with_profile(custom.handle(), config.name))
    }

    /// Create or update the engine game for `config` and persist it.
    ///
    /// A new game enters the catalog through a single snapshot swap, so
    /// readers see either the old or the new game list.
    pub fn materialize_game(&self, config: &GameConfig) -> Result<GameProxy, CoreError> {
        config.validate()?;
        let root = self.root()?;
        let catalog = self.launcher.catalog();

        let game = if let Some(existing) = catalog.game_with_id(&config.identifier) {
            existing.set_config(config)?;
            existing.clone()
        } else {
            let handle = self.launcher.boundary().create_game(root, config)?;
            let game = self.launcher.registry().adopt_game(handle)?;
            self.launcher
                .catalog_mirror()
                .update(|catalog| catalog.with_game(game.clone()));
            info!("added game {} ({})", config.identifier, config.display_name());
            game
        };

        self.launcher.game_store().put(config)?;
        Ok(game)
    }

    /// Hand `request` to the engine.
    ///
    /// The observer sees every run event after it has been logged.
    pub fn launch(
        &self,
        game: &GameProxy,
        request: RunRequest,
        observer: RunObserver,
    ) -> Result<GameRun, CoreError> {
        let root = self.root()?;
        game.refresh()?;
        if game.is_running() {
            return Err(CoreError::GameAlreadyRunning(game.identifier()));
        }

        let config = game.config()?;
        let archive = self.mount_archive(root, &config)?;

        let state = Arc::new(Mutex::new(RunState::Starting));
        let cell = Arc::clone(&state);
        let id = game.identifier();
        let logged: RunObserver = Arc::new(move |event: RunEvent| {
            match &event {
                RunEvent::State(run_state) => {
                    *cell.lock().unwrap_or_else(PoisonError::into_inner) = *run_state;
                    info!("game {id}: {run_state:?}");
                }
                RunEvent::Log { severity, message } => match severity {
                    LogSeverity::Error => error!(game = %id, "{message}"),
                    LogSeverity::Warning => warn!(game = %id, "{message}"),
                    LogSeverity::Info => info!(game = %id, "{message}"),
                    LogSeverity::Debug => debug!(game = %id, "{message}"),
                },
            }
            observer(event);
        });

        info!(
            "launching {} with profile '{}' args '{}' patches {:?}",
            request.game_id(),
            request.profile_name(),
            request.arguments(),
            request.patches()
        );
        let handle = self
            .launcher
            .boundary()
            .launch(root, game.handle(), &request, logged)?;
        Ok(GameRun::new(game.clone(), request, handle, state, archive))
    }

    /// Mount a packaged game archive. The returned file keeps the descriptor
    /// valid for as long as the game runs.
    fn mount_archive(
        &self,
        root: NativeHandle,
        config: &GameConfig,
    ) -> Result<Option<File>, CoreError> {
        if config.archive_file.is_empty() {
            return Ok(None);
        }
        let path = Path::new(&config.game_directory).join(&config.archive_file);
        let file = File::open(&path)?;
        let mount = VfsMount {
            virtual_path: "/".to_owned(),
            fd: raw_fd(&file)?,
            offset: 0,
            length: file.metadata()?.len(),
        };
        self.launcher.boundary().vfs_mount(root, &mount)?;
        debug!("mounted {} ({} bytes)", path.display(), mount.length);
        Ok(Some(file))
    }

    /// Materialize, validate, resolve and launch in one go.
    ///
    /// `profile_name` picks an explicit profile; empty or `None` uses the
    /// precedence order. `patch` picks an explicit patch. `parameters` are
    /// `module:parameter=value` overrides.
    #[allow(clippy::too_many_arguments)]
    pub fn start_game(
        &self,
        config: &GameConfig,
        profile_name: Option<&str>,
        patch: Option<&PatchId>,
        arguments: &str,
        parameters: &[String],
        surface: SurfaceSize,
        observer: RunObserver,
    ) -> Result<GameRun, CoreError> {
        if !self.launcher.is_ready() {
            return Err(CoreError::NotReady);
        }
        let mut overrides = ModuleParameters::new();
        for text in parameters {
            let (module, parameter, value) = parse_module_parameter(text)?;
            overrides.set(&module, &parameter, &value);
        }

        let game = self.materialize_game(config)?;
        game.refresh()?;
        if game.is_running() {
            return Err(CoreError::GameAlreadyRunning(game.identifier()));
        }
        let catalog = self.launcher.catalog();
        validate_game(&catalog, config)?;

        let explicit = match profile_name.filter(|name| !name.is_empty()) {
            Some(name) => Some(
                catalog
                    .profile_named(name)
                    .cloned()
                    .ok_or_else(|| CoreError::ProfileNotFound(ProfileName::new(name)))?,
            ),
            None => None,
        };
        let resolved = self.resolve_profile(&game, explicit.as_ref())?;
        let request =
            self.build_run_request(config, &resolved.profile, patch, surface, arguments)?;
        let request =
            self.apply_custom_module_parameters(&game, &resolved.profile, &overrides, request)?;
        self.launch(&game, request, observer)
    }
}

#[cfg(unix)]
#[allow(clippy::unnecessary_wraps)]
fn raw_fd(file: &File) -> Result<i32, CoreError> {
    use std::os::fd::AsRawFd;
    Ok(file.as_raw_fd())
}

#[cfg(not(unix))]
fn raw_fd(_file: &File) -> Result<i32, CoreError> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "archive mounts need a file descriptor",
    )
    .into())
}
