//! Engine provisioning state machine.
//!
//! [`Launcher`] owns the control side: it performs every state transition and
//! dispatches listeners on the thread that calls [`Launcher::pump`] or
//! [`Launcher::wait`]. Unpacking the bundled payload and loading the runtime
//! libraries run on a worker thread that reports back through a channel and
//! an atomic progress cell. Runtime creation and catalog population happen on
//! the control thread once the libraries are loaded.

use crate::catalog::{Catalog, CatalogMirror};
use crate::concurrency::InstallLock;
use crate::config::LauncherConfig;
use crate::lifecycle::{validate_transition, InstallationState};
use crate::listeners::{ListenerId, ListenerSet};
use crate::registry::{GameProxy, HandleRegistry};
use crate::session::SessionController;
use crate::CoreError;
use delaunch_engine::{EngineBoundary, EngineConfig, NativeHandle};
use delaunch_store::{
    read_version_marker, unpack_archive, versions_match, write_version_marker, Bundle,
    GameRecord, GameStore, LauncherLayout, UnpackOutcome,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observer of launcher state. Every method has an empty default.
///
/// Callbacks run on the control thread after the change is committed and may
/// add or remove listeners.
pub trait LauncherListener: Send + Sync {
    fn state_changed(&self, _launcher: &LauncherHandle, _state: InstallationState) {}

    fn progress_changed(&self, _launcher: &LauncherHandle, _progress: f32) {}

    /// Fired once each time the launcher becomes ready.
    fn catalog_changed(&self, _launcher: &LauncherHandle) {}

    fn install_cancelled(&self, _launcher: &LauncherHandle) {}
}

struct LauncherShared {
    name: String,
    scale_percent: u32,
    layout: LauncherLayout,
    bundle: Bundle,
    boundary: Arc<dyn EngineBoundary>,
    registry: HandleRegistry,
    catalog: CatalogMirror,
    games: GameStore,
    state: Mutex<InstallationState>,
    root: Mutex<Option<NativeHandle>>,
    /// Install progress as `f32` bits. Non-negative floats order like their
    /// bit patterns, so `fetch_max` keeps the value non-decreasing.
    progress: AtomicU32,
    listeners: ListenerSet<dyn LauncherListener>,
}

/// Shared read access to a launcher, handed to listeners, sessions and the
/// remote protocol.
#[derive(Clone)]
pub struct LauncherHandle {
    shared: Arc<LauncherShared>,
}

impl LauncherHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn scale_percent(&self) -> u32 {
        self.shared.scale_percent
    }

    pub fn layout(&self) -> &LauncherLayout {
        &self.shared.layout
    }

    pub fn bundle(&self) -> &Bundle {
        &self.shared.bundle
    }

    pub fn boundary(&self) -> &Arc<dyn EngineBoundary> {
        &self.shared.boundary
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.shared.registry
    }

    pub fn game_store(&self) -> &GameStore {
        &self.shared.games
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.shared.catalog.snapshot()
    }

    pub fn catalog_mirror(&self) -> &CatalogMirror {
        &self.shared.catalog
    }

    pub fn state(&self) -> InstallationState {
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == InstallationState::Ready
    }

    pub fn root(&self) -> Option<NativeHandle> {
        *self.shared.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.shared.progress.load(Ordering::SeqCst))
    }

    pub fn add_listener(&self, listener: Arc<dyn LauncherListener>) -> ListenerId {
        self.shared.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    pub fn session(&self) -> SessionController {
        SessionController::new(self.clone())
    }

    /// Directories handed to the engine when loading and creating the runtime.
    pub fn engine_config(&self) -> EngineConfig {
        let layout = &self.shared.layout;
        EngineConfig {
            install_dir: layout.engine_install_dir().display().to_string(),
            cache_dir: layout.engine_cache_dir().display().to_string(),
            config_dir: layout.engine_config_dir().display().to_string(),
            launcher_dir: layout.launcher_dir().display().to_string(),
            launcher_config_dir: layout.launcher_config_dir().display().to_string(),
            launcher_games_dir: layout.launcher_games_dir().display().to_string(),
        }
    }

    fn store_state(&self, state: InstallationState) {
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn set_root(&self, root: Option<NativeHandle>) {
        *self.shared.root.lock().unwrap_or_else(PoisonError::into_inner) = root;
    }

    fn record_progress(&self, progress: f32) {
        self.shared
            .progress
            .fetch_max(progress.to_bits(), Ordering::SeqCst);
    }

    fn reset_progress(&self) {
        self.shared.progress.store(0f32.to_bits(), Ordering::SeqCst);
    }

    fn dispatch(&self, mut f: impl FnMut(&dyn LauncherListener)) {
        self.shared.listeners.dispatch(|listener| f(listener));
    }

    /// List modules, games and profiles and wrap every handle through the
    /// registry. Games known to the store but not to the engine are recreated.
    fn load_catalog(&self, root: NativeHandle) -> Result<Catalog, CoreError> {
        let boundary = self.boundary();
        let registry = self.registry();

        let modules = boundary.list_modules(root)?;
        let mut games = Vec::new();
        for handle in boundary.list_games(root)? {
            games.extend(registry.acquire_game(Some(handle))?);
        }
        let mut profiles = Vec::new();
        for handle in boundary.list_profiles(root)? {
            profiles.extend(registry.acquire_profile(Some(handle))?);
        }
        let default_profile = registry.acquire_profile(boundary.default_profile(root)?)?;
        self.restore_games(root, &mut games);

        info!(
            "catalog loaded: {} modules, {} games, {} profiles, default profile {}",
            modules.len(),
            games.len(),
            profiles.len(),
            default_profile
                .as_ref()
                .map_or_else(|| "<none>".to_owned(), |p| p.name().to_string())
        );
        Ok(Catalog::new(modules, games, profiles, default_profile))
    }

    fn restore_games(&self, root: NativeHandle, games: &mut Vec<GameProxy>) {
        let records = match self.game_store().list() {
            Ok(records) => records,
            Err(e) => {
                warn!("cannot read stored games: {e}");
                return;
            }
        };
        for record in records {
            if games
                .iter()
                .any(|g| g.identifier() == record.config.identifier)
            {
                continue;
            }
            match self.restore_game(root, &record) {
                Ok(game) => games.push(game),
                Err(e) => warn!("cannot restore game {}: {e}", record.config.identifier),
            }
        }
    }

    fn restore_game(&self, root: NativeHandle, record: &GameRecord) -> Result<GameProxy, CoreError> {
        let boundary = self.boundary();
        let registry = self.registry();
        let game = registry.adopt_game(boundary.create_game(root, &record.config)?)?;
        if let Some(custom) = &record.custom_profile {
            let profile = registry.adopt_profile(boundary.create_profile(root, custom)?)?;
            game.bind_profiles(None, Some(&profile))?;
        }
        debug!("restored stored game {}", record.config.identifier);
        Ok(game)
    }

    /// Release the catalog and destroy the root handle, if any.
    pub(crate) fn teardown_runtime(&self) {
        self.shared.catalog.clear();
        let root = self
            .shared
            .root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(root) = root {
            debug!("destroying launcher root {root}");
            if let Err(e) = self.boundary().destroy_root(root) {
                warn!("destroying launcher root {root} failed: {e}");
            }
        }
    }
}

enum WorkerEvent {
    Progress,
    Installed,
    InstallFailed(String),
    InstallCancelled,
    LibrariesLoaded,
    LoadFailed(String),
}

struct Worker {
    events: Receiver<WorkerEvent>,
    thread: JoinHandle<()>,
}

struct WorkerJob {
    launcher: LauncherHandle,
    install: bool,
    cancel: Arc<AtomicBool>,
    events: Sender<WorkerEvent>,
}

impl WorkerJob {
    fn run(self) {
        if self.install {
            match self.install() {
                Ok(true) => self.send(WorkerEvent::Installed),
                Ok(false) => {
                    self.send(WorkerEvent::InstallCancelled);
                    return;
                }
                Err(e) => {
                    self.send(WorkerEvent::InstallFailed(e.to_string()));
                    return;
                }
            }
        }
        let config = self.launcher.engine_config();
        match self.launcher.boundary().load_libraries(&config) {
            Ok(()) => self.send(WorkerEvent::LibrariesLoaded),
            Err(e) => self.send(WorkerEvent::LoadFailed(e.to_string())),
        }
    }

    fn send(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            debug!("launcher went away, dropping provisioning event");
        }
    }

    /// Returns false when cancelled.
    fn install(&self) -> Result<bool, CoreError> {
        let layout = self.launcher.layout();
        let _lock = InstallLock::acquire(&layout.lock_file())?;

        let bundle = self.launcher.bundle();
        let version = bundle.version()?;
        let total = bundle.install_size()?;
        let outcome = unpack_archive(
            &bundle.archive_path(),
            &layout.engine_install_dir(),
            total,
            &self.cancel,
            |progress| {
                self.launcher.record_progress(progress);
                self.send(WorkerEvent::Progress);
            },
        )?;

        match outcome {
            UnpackOutcome::Completed { bytes } => {
                write_version_marker(&layout.installed_version_file(), &version)?;
                info!("installed engine {} ({bytes} bytes)", version.trim_end());
                Ok(true)
            }
            UnpackOutcome::Cancelled => Ok(false),
        }
    }
}

/// Engine provisioning and runtime owner.
pub struct Launcher {
    handle: LauncherHandle,
    cancel: Arc<AtomicBool>,
    worker: Option<Worker>,
    last_error: Option<String>,
    cancelled: bool,
    reported_progress: f32,
}

impl Launcher {
    pub fn new(config: &LauncherConfig, boundary: Arc<dyn EngineBoundary>) -> Result<Self, CoreError> {
        let layout = config.layout();
        layout.initialize()?;
        let games = GameStore::new(&layout);
        info!(
            "launcher '{}' at {} using engine {}",
            config.name,
            layout.root().display(),
            boundary.name()
        );
        let shared = LauncherShared {
            name: config.name.clone(),
            scale_percent: config.scale_percent,
            layout,
            bundle: config.bundle(),
            registry: HandleRegistry::new(Arc::clone(&boundary)),
            boundary,
            catalog: CatalogMirror::new(),
            games,
            state: Mutex::new(InstallationState::VerifyInstallation),
            root: Mutex::new(None),
            progress: AtomicU32::new(0f32.to_bits()),
            listeners: ListenerSet::new(),
        };
        Ok(Self {
            handle: LauncherHandle {
                shared: Arc::new(shared),
            },
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            last_error: None,
            cancelled: false,
            reported_progress: 0.0,
        })
    }

    pub fn handle(&self) -> &LauncherHandle {
        &self.handle
    }

    pub fn state(&self) -> InstallationState {
        self.handle.state()
    }

    pub fn progress(&self) -> f32 {
        self.handle.progress()
    }

    /// Message of the failure that led to the current failed state.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True when the last install attempt was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True while the worker thread is installing or loading.
    pub fn is_busy(&self) -> bool {
        self.worker.is_some()
    }

    pub fn add_listener(&self, listener: Arc<dyn LauncherListener>) -> ListenerId {
        self.handle.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.handle.remove_listener(id)
    }

    pub fn session(&self) -> SessionController {
        self.handle.session()
    }

    /// Begin provisioning from `VerifyInstallation`. Does nothing in any
    /// other settled state; use [`retry`](Self::retry) after a failure.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.worker.is_some() {
            return Err(CoreError::Busy);
        }
        let state = self.state();
        if state != InstallationState::VerifyInstallation {
            debug!("start ignored in state {state}");
            return Ok(());
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.cancelled = false;
        self.last_error = None;

        if self.installation_current() {
            info!("installed engine matches bundle");
            self.transition(InstallationState::LoadingLibraries);
            self.spawn_worker(false)
        } else {
            info!("engine install required");
            self.handle.reset_progress();
            self.reported_progress = 0.0;
            self.transition(InstallationState::Installing);
            self.spawn_worker(true)
        }
    }

    fn installation_current(&self) -> bool {
        let layout = self.handle.layout();
        let installed = match read_version_marker(&layout.installed_version_file()) {
            Ok(installed) => installed,
            Err(e) => {
                warn!("cannot read installed version: {e}");
                None
            }
        };
        match self.handle.bundle().version() {
            Ok(bundled) => versions_match(installed.as_deref(), &bundled),
            Err(e) => {
                warn!("cannot read bundled version: {e}");
                false
            }
        }
    }

    fn spawn_worker(&mut self, install: bool) -> Result<(), CoreError> {
        let (tx, rx) = mpsc::channel();
        let job = WorkerJob {
            launcher: self.handle.clone(),
            install,
            cancel: Arc::clone(&self.cancel),
            events: tx,
        };
        let thread = std::thread::Builder::new()
            .name("delaunch-provision".to_owned())
            .spawn(move || job.run())?;
        self.worker = Some(Worker { events: rx, thread });
        Ok(())
    }

    /// Request cancellation of a running install. Takes effect between
    /// archive entries. Returns false when nothing is being installed.
    pub fn cancel_install(&self) -> bool {
        if self.state() != InstallationState::Installing {
            return false;
        }
        info!("install cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
        true
    }

    /// Handle every worker event already received without blocking.
    pub fn pump(&mut self) -> InstallationState {
        while let Some(worker) = &self.worker {
            match worker.events.try_recv() {
                Ok(event) => self.handle_event(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.worker_gone(),
            }
        }
        self.state()
    }

    /// Block until the worker is done and the launcher has settled (ready,
    /// failed, or back at `VerifyInstallation` after a cancellation).
    pub fn wait(&mut self) -> InstallationState {
        while let Some(worker) = &self.worker {
            match worker.events.recv() {
                Ok(event) => self.handle_event(event),
                Err(_) => self.worker_gone(),
            }
        }
        self.state()
    }

    /// Restart provisioning after a failure or a cancelled install.
    pub fn retry(&mut self) -> Result<(), CoreError> {
        if self.worker.is_some() {
            return Err(CoreError::Busy);
        }
        let state = self.state();
        let allowed = state.is_failed()
            || (self.cancelled && state == InstallationState::VerifyInstallation);
        if !allowed {
            return Err(CoreError::RetryNotAllowed(state));
        }
        info!("retrying provisioning from {state}");
        self.handle.teardown_runtime();
        self.transition(InstallationState::VerifyInstallation);
        self.start()
    }

    /// Stop any provisioning work, release the catalog, destroy the root and
    /// return to the initial state.
    pub fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            drop(worker.events);
            if worker.thread.join().is_err() {
                warn!("provisioning worker panicked");
            }
        }
        self.handle.teardown_runtime();
        self.transition(InstallationState::VerifyInstallation);
        self.cancelled = false;
    }

    fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Progress => self.report_progress(),
            WorkerEvent::Installed => {
                self.report_progress();
                self.transition(InstallationState::LoadingLibraries);
            }
            WorkerEvent::InstallFailed(message) => {
                self.finish_worker();
                self.fail(
                    InstallationState::InstallFailed,
                    &CoreError::InstallFailure(message),
                );
            }
            WorkerEvent::InstallCancelled => {
                self.finish_worker();
                self.cancelled = true;
                self.transition(InstallationState::VerifyInstallation);
                let handle = self.handle.clone();
                handle.dispatch(|l| l.install_cancelled(&handle));
            }
            WorkerEvent::LibrariesLoaded => {
                self.finish_worker();
                self.transition(InstallationState::CreatingRuntime);
                match self.create_runtime() {
                    Ok(()) => {
                        if self.transition(InstallationState::Ready) {
                            let handle = self.handle.clone();
                            handle.dispatch(|l| l.catalog_changed(&handle));
                        }
                    }
                    Err(e) => self.fail(InstallationState::CreateFailed, &e),
                }
            }
            WorkerEvent::LoadFailed(message) => {
                self.finish_worker();
                self.fail(
                    InstallationState::LoadFailed,
                    &CoreError::LibraryLoadFailure(message),
                );
            }
        }
    }

    fn report_progress(&mut self) {
        let progress = self.handle.progress();
        if progress > self.reported_progress {
            self.reported_progress = progress;
            let handle = self.handle.clone();
            handle.dispatch(|l| l.progress_changed(&handle, progress));
        }
    }

    fn finish_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.thread.join().is_err() {
                warn!("provisioning worker panicked");
            }
        }
    }

    /// The worker hung up without a final event.
    fn worker_gone(&mut self) {
        self.finish_worker();
        let message = "provisioning worker exited unexpectedly".to_owned();
        match self.state() {
            InstallationState::Installing => {
                self.fail(
                    InstallationState::InstallFailed,
                    &CoreError::InstallFailure(message),
                );
            }
            InstallationState::LoadingLibraries => {
                self.fail(
                    InstallationState::LoadFailed,
                    &CoreError::LibraryLoadFailure(message),
                );
            }
            state => debug!("worker finished in state {state}"),
        }
    }

    fn create_runtime(&self) -> Result<(), CoreError> {
        let config = self.handle.engine_config();
        let root = self
            .handle
            .boundary()
            .create_root(&config)
            .map_err(|e| CoreError::RuntimeCreateFailure(e.to_string()))?;
        self.handle.set_root(Some(root));
        match self.handle.load_catalog(root) {
            Ok(catalog) => {
                self.handle.catalog_mirror().replace(catalog);
                Ok(())
            }
            Err(e) => {
                self.handle.teardown_runtime();
                Err(CoreError::RuntimeCreateFailure(e.to_string()))
            }
        }
    }

    fn fail(&mut self, state: InstallationState, err: &CoreError) {
        error!("{err}");
        self.last_error = Some(err.to_string());
        self.transition(state);
    }

    /// Commit a state change and notify listeners. Re-entering the current
    /// state does nothing. Returns whether the state changed.
    fn transition(&self, to: InstallationState) -> bool {
        let from = self.state();
        if from == to {
            return false;
        }
        if let Err(e) = validate_transition(from, to) {
            error!("{e}");
            return false;
        }
        self.handle.store_state(to);
        info!("launcher state {from} -> {to}");
        let handle = self.handle.clone();
        handle.dispatch(|l| l.state_changed(&handle, to));
        true
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
