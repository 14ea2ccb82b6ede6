use crate::boundary::{EngineBoundary, EngineConfig, GameInfo, GameStatus, VfsMount};
use crate::handle::NativeHandle;
use crate::run::{LogSeverity, RunEvent, RunHandle, RunObserver, RunRequest, RunState};
use crate::EngineError;
use delaunch_schema::{GameConfig, GameId, ModuleDescriptor, ProfileConfig, ProfileName};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

enum Object {
    Root,
    Game {
        config: GameConfig,
        active: Option<u64>,
        custom: Option<u64>,
    },
    Profile {
        config: ProfileConfig,
    },
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Object::Root => "launcher",
            Object::Game { .. } => "game",
            Object::Profile { .. } => "profile",
        }
    }
}

struct Slot {
    object: Object,
    refs: u32,
}

struct MockRun {
    game: u64,
    running: AtomicBool,
    observer: RunObserver,
}

impl MockRun {
    fn emit(&self, event: RunEvent) {
        (self.observer)(event);
    }

    /// Emit the final state once, no matter how many paths try to stop it.
    fn finish(&self, graceful: bool) {
        if self.running.swap(false, Ordering::SeqCst) {
            if graceful {
                self.emit(RunEvent::State(RunState::Stopping));
            }
            self.emit(RunEvent::State(RunState::Stopped));
        }
    }
}

struct MockRunHandle {
    run: Arc<MockRun>,
}

impl RunHandle for MockRunHandle {
    fn is_running(&self) -> bool {
        self.run.running.load(Ordering::SeqCst)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.run.finish(true);
        Ok(())
    }

    fn kill(&mut self) -> Result<(), EngineError> {
        self.run.finish(false);
        Ok(())
    }
}

#[derive(Default)]
struct MockState {
    objects: HashMap<u64, Slot>,
    free: Vec<u64>,
    next: u64,
    root: Option<u64>,

    seed_modules: Vec<ModuleDescriptor>,
    seed_games: Vec<GameConfig>,
    seed_profiles: Vec<ProfileConfig>,
    seed_default: Option<ProfileName>,

    games: Vec<u64>,
    profiles: Vec<u64>,
    default_profile: Option<u64>,

    fail_load: bool,
    fail_create_root: bool,
    fail_list_games: bool,
    fail_launch: bool,

    library_loads: usize,
    add_reference_calls: HashMap<u64, usize>,
    release_calls: HashMap<u64, usize>,
    launches: Vec<RunRequest>,
    mounts: Vec<VfsMount>,
    runs: Vec<Arc<MockRun>>,
}

impl MockState {
    /// Lowest freed id first so tests can observe handle value reuse.
    fn allocate(&mut self, object: Object, refs: u32) -> u64 {
        let id = if let Some(pos) = self
            .free
            .iter()
            .enumerate()
            .min_by_key(|(_, id)| **id)
            .map(|(pos, _)| pos)
        {
            self.free.swap_remove(pos)
        } else {
            self.next += 1;
            self.next
        };
        self.objects.insert(id, Slot { object, refs });
        id
    }

    fn slot(&self, handle: NativeHandle) -> Result<&Slot, EngineError> {
        self.objects
            .get(&handle.raw())
            .ok_or(EngineError::InvalidHandle(handle))
    }

    fn slot_mut(&mut self, handle: NativeHandle) -> Result<&mut Slot, EngineError> {
        self.objects
            .get_mut(&handle.raw())
            .ok_or(EngineError::InvalidHandle(handle))
    }

    fn expect_root(&self, handle: NativeHandle) -> Result<(), EngineError> {
        match self.slot(handle)?.object {
            Object::Root => Ok(()),
            _ => Err(EngineError::WrongKind {
                handle,
                expected: "launcher",
            }),
        }
    }

    fn expect_profile(&self, handle: NativeHandle) -> Result<&ProfileConfig, EngineError> {
        match &self.slot(handle)?.object {
            Object::Profile { config } => Ok(config),
            _ => Err(EngineError::WrongKind {
                handle,
                expected: "profile",
            }),
        }
    }

    fn add_ref(&mut self, id: u64) {
        if let Some(slot) = self.objects.get_mut(&id) {
            slot.refs += 1;
        }
    }

    /// Drop one reference, freeing the object and whatever it holds at zero.
    fn drop_ref(&mut self, id: u64) {
        let Some(slot) = self.objects.get_mut(&id) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs > 0 {
            return;
        }
        if let Some(slot) = self.objects.remove(&id) {
            debug!("mock engine: freeing {} {id:#x}", slot.object.kind());
            self.free.push(id);
            if let Object::Game { active, custom, .. } = slot.object {
                for held in [active, custom].into_iter().flatten() {
                    self.drop_ref(held);
                }
            }
        }
    }

    fn running_run(&self, game: u64) -> Option<Arc<MockRun>> {
        self.runs
            .iter()
            .find(|r| r.game == game && r.running.load(Ordering::SeqCst))
            .cloned()
    }
}

fn to_handle(id: u64) -> Result<NativeHandle, EngineError> {
    NativeHandle::from_raw(id).ok_or_else(|| EngineError::CallFailed("null handle".to_owned()))
}

/// In-memory engine with native reference counting.
///
/// Seed modules, games and profiles before the root is created; they are
/// materialized by [`EngineBoundary::create_root`] with one reference held by
/// the root. Launches run synchronously: `Starting` and `Running` are emitted
/// from inside `launch`, `Stopped` when the handle is stopped or killed or the
/// test calls [`MockEngine::finish_game`].
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, EngineError> {
        self.state
            .lock()
            .map_err(|e| EngineError::CallFailed(format!("mutex poisoned: {e}")))
    }

    fn inspect(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_module(self, module: ModuleDescriptor) -> Self {
        self.inspect().seed_modules.push(module);
        self
    }

    pub fn with_game(self, config: GameConfig) -> Self {
        self.inspect().seed_games.push(config);
        self
    }

    pub fn with_profile(self, config: ProfileConfig) -> Self {
        self.inspect().seed_profiles.push(config);
        self
    }

    /// Name the seeded profile reported as the launcher default.
    pub fn with_default_profile(self, name: &str) -> Self {
        self.inspect().seed_default = Some(ProfileName::new(name));
        self
    }

    pub fn set_fail_load_libraries(&self, fail: bool) {
        self.inspect().fail_load = fail;
    }

    pub fn set_fail_create_root(&self, fail: bool) {
        self.inspect().fail_create_root = fail;
    }

    pub fn set_fail_list_games(&self, fail: bool) {
        self.inspect().fail_list_games = fail;
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.inspect().fail_launch = fail;
    }

    pub fn library_loads(&self) -> usize {
        self.inspect().library_loads
    }

    pub fn has_root(&self) -> bool {
        self.inspect().root.is_some()
    }

    /// Native reference count of a live object, `None` once freed.
    pub fn refs(&self, handle: NativeHandle) -> Option<u32> {
        self.inspect().objects.get(&handle.raw()).map(|s| s.refs)
    }

    pub fn live_objects(&self) -> usize {
        self.inspect().objects.len()
    }

    pub fn add_reference_calls(&self, handle: NativeHandle) -> usize {
        self.inspect()
            .add_reference_calls
            .get(&handle.raw())
            .copied()
            .unwrap_or(0)
    }

    pub fn release_calls(&self, handle: NativeHandle) -> usize {
        self.inspect()
            .release_calls
            .get(&handle.raw())
            .copied()
            .unwrap_or(0)
    }

    pub fn game_handle(&self, id: &str) -> Option<NativeHandle> {
        let state = self.inspect();
        state.objects.iter().find_map(|(raw, slot)| match &slot.object {
            Object::Game { config, .. } if config.identifier == id => NativeHandle::from_raw(*raw),
            _ => None,
        })
    }

    pub fn profile_handle(&self, name: &str) -> Option<NativeHandle> {
        let state = self.inspect();
        state.objects.iter().find_map(|(raw, slot)| match &slot.object {
            Object::Profile { config } if config.name == name => NativeHandle::from_raw(*raw),
            _ => None,
        })
    }

    pub fn launches(&self) -> Vec<RunRequest> {
        self.inspect().launches.clone()
    }

    pub fn mounts(&self) -> Vec<VfsMount> {
        self.inspect().mounts.clone()
    }

    /// Let a running game exit on its own. Returns false if it was not running.
    pub fn finish_game(&self, id: &GameId) -> bool {
        let run = {
            let state = self.inspect();
            let game = state.objects.iter().find_map(|(raw, slot)| match &slot.object {
                Object::Game { config, .. } if &config.identifier == id => Some(*raw),
                _ => None,
            });
            game.and_then(|g| state.running_run(g))
        };
        match run {
            Some(run) => {
                run.finish(false);
                true
            }
            None => false,
        }
    }

    /// Emit a log line from a running game.
    pub fn emit_log(&self, id: &GameId, severity: LogSeverity, message: &str) -> bool {
        let run = {
            let state = self.inspect();
            state
                .runs
                .iter()
                .filter(|r| r.running.load(Ordering::SeqCst))
                .find(|r| {
                    matches!(
                        state.objects.get(&r.game).map(|s| &s.object),
                        Some(Object::Game { config, .. }) if &config.identifier == id
                    )
                })
                .cloned()
        };
        match run {
            Some(run) => {
                run.emit(RunEvent::Log {
                    severity,
                    message: message.to_owned(),
                });
                true
            }
            None => false,
        }
    }
}

impl EngineBoundary for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn load_libraries(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.library_loads += 1;
        if state.fail_load {
            return Err(EngineError::LibraryLoad("mock libraries unavailable".to_owned()));
        }
        Ok(())
    }

    fn create_root(&self, config: &EngineConfig) -> Result<NativeHandle, EngineError> {
        let mut state = self.lock()?;
        if state.fail_create_root {
            return Err(EngineError::CreateRuntime("mock root creation failed".to_owned()));
        }
        if state.root.is_some() {
            return Err(EngineError::CreateRuntime("root already exists".to_owned()));
        }
        debug!("mock engine: creating root for {}", config.launcher_dir);
        let root = state.allocate(Object::Root, 1);
        state.root = Some(root);

        let profiles = state.seed_profiles.clone();
        for config in profiles {
            let is_default = state.seed_default.as_ref() == Some(&config.name);
            let id = state.allocate(Object::Profile { config }, 1);
            state.profiles.push(id);
            if is_default {
                state.default_profile = Some(id);
            }
        }
        let games = state.seed_games.clone();
        for config in games {
            let id = state.allocate(
                Object::Game {
                    config,
                    active: None,
                    custom: None,
                },
                1,
            );
            state.games.push(id);
        }
        to_handle(root)
    }

    fn destroy_root(&self, root: NativeHandle) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.expect_root(root)?;
        let mut held = std::mem::take(&mut state.games);
        held.append(&mut state.profiles);
        for id in held {
            state.drop_ref(id);
        }
        state.default_profile = None;
        state.root = None;
        state.drop_ref(root.raw());
        Ok(())
    }

    fn list_modules(&self, root: NativeHandle) -> Result<Vec<ModuleDescriptor>, EngineError> {
        let state = self.lock()?;
        state.expect_root(root)?;
        Ok(state.seed_modules.clone())
    }

    fn list_games(&self, root: NativeHandle) -> Result<Vec<NativeHandle>, EngineError> {
        let state = self.lock()?;
        state.expect_root(root)?;
        if state.fail_list_games {
            return Err(EngineError::CallFailed("mock game listing failed".to_owned()));
        }
        state.games.iter().map(|id| to_handle(*id)).collect()
    }

    fn list_profiles(&self, root: NativeHandle) -> Result<Vec<NativeHandle>, EngineError> {
        let state = self.lock()?;
        state.expect_root(root)?;
        state.profiles.iter().map(|id| to_handle(*id)).collect()
    }

    fn default_profile(&self, root: NativeHandle) -> Result<Option<NativeHandle>, EngineError> {
        let state = self.lock()?;
        state.expect_root(root)?;
        Ok(state.default_profile.and_then(NativeHandle::from_raw))
    }

    fn game_info(&self, game: NativeHandle) -> Result<GameInfo, EngineError> {
        let state = self.lock()?;
        match &state.slot(game)?.object {
            Object::Game {
                config,
                active,
                custom,
            } => Ok(GameInfo {
                identifier: config.identifier.clone(),
                title: config.display_name().to_owned(),
                active_profile: active.and_then(NativeHandle::from_raw),
                custom_profile: custom.and_then(NativeHandle::from_raw),
            }),
            _ => Err(EngineError::WrongKind {
                handle: game,
                expected: "game",
            }),
        }
    }

    fn game_status(&self, game: NativeHandle) -> Result<GameStatus, EngineError> {
        let state = self.lock()?;
        match state.slot(game)?.object {
            Object::Game { .. } => Ok(GameStatus {
                running: state.running_run(game.raw()).is_some(),
            }),
            _ => Err(EngineError::WrongKind {
                handle: game,
                expected: "game",
            }),
        }
    }

    fn game_config(&self, game: NativeHandle) -> Result<GameConfig, EngineError> {
        let state = self.lock()?;
        match &state.slot(game)?.object {
            Object::Game { config, .. } => Ok(config.clone()),
            _ => Err(EngineError::WrongKind {
                handle: game,
                expected: "game",
            }),
        }
    }

    fn set_game_config(&self, game: NativeHandle, config: &GameConfig) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        match &mut state.slot_mut(game)?.object {
            Object::Game { config: current, .. } => {
                *current = config.clone();
                Ok(())
            }
            _ => Err(EngineError::WrongKind {
                handle: game,
                expected: "game",
            }),
        }
    }

    fn set_game_profiles(
        &self,
        game: NativeHandle,
        active: Option<NativeHandle>,
        custom: Option<NativeHandle>,
    ) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        for profile in [active, custom].into_iter().flatten() {
            state.expect_profile(profile)?;
        }
        let (old_active, old_custom) = match &mut state.slot_mut(game)?.object {
            Object::Game {
                active: a,
                custom: c,
                ..
            } => {
                let old = (*a, *c);
                *a = active.map(NativeHandle::raw);
                *c = custom.map(NativeHandle::raw);
                old
            }
            _ => {
                return Err(EngineError::WrongKind {
                    handle: game,
                    expected: "game",
                })
            }
        };
        for id in [active, custom].into_iter().flatten() {
            state.add_ref(id.raw());
        }
        for id in [old_active, old_custom].into_iter().flatten() {
            state.drop_ref(id);
        }
        Ok(())
    }

    fn profile_config(&self, profile: NativeHandle) -> Result<ProfileConfig, EngineError> {
        let state = self.lock()?;
        state.expect_profile(profile).cloned()
    }

    fn set_profile_config(
        &self,
        profile: NativeHandle,
        config: &ProfileConfig,
    ) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.expect_profile(profile)?;
        if let Object::Profile { config: current } = &mut state.slot_mut(profile)?.object {
            *current = config.clone();
        }
        Ok(())
    }

    fn create_game(
        &self,
        root: NativeHandle,
        config: &GameConfig,
    ) -> Result<NativeHandle, EngineError> {
        let mut state = self.lock()?;
        state.expect_root(root)?;
        let id = state.allocate(
            Object::Game {
                config: config.clone(),
                active: None,
                custom: None,
            },
            1,
        );
        to_handle(id)
    }

    fn create_profile(
        &self,
        root: NativeHandle,
        config: &ProfileConfig,
    ) -> Result<NativeHandle, EngineError> {
        let mut state = self.lock()?;
        state.expect_root(root)?;
        let id = state.allocate(
            Object::Profile {
                config: config.clone(),
            },
            1,
        );
        to_handle(id)
    }

    fn add_reference(&self, handle: NativeHandle) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.slot(handle)?;
        *state.add_reference_calls.entry(handle.raw()).or_insert(0) += 1;
        state.add_ref(handle.raw());
        Ok(())
    }

    fn release(&self, handle: NativeHandle) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        *state.release_calls.entry(handle.raw()).or_insert(0) += 1;
        state.slot(handle)?;
        state.drop_ref(handle.raw());
        Ok(())
    }

    fn vfs_mount(&self, root: NativeHandle, mount: &VfsMount) -> Result<(), EngineError> {
        let mut state = self.lock()?;
        state.expect_root(root)?;
        if mount.fd < 0 {
            return Err(EngineError::CallFailed(format!(
                "invalid file descriptor {} for {}",
                mount.fd, mount.virtual_path
            )));
        }
        state.mounts.push(mount.clone());
        Ok(())
    }

    fn launch(
        &self,
        root: NativeHandle,
        game: NativeHandle,
        request: &RunRequest,
        observer: RunObserver,
    ) -> Result<Box<dyn RunHandle>, EngineError> {
        let run = {
            let mut state = self.lock()?;
            state.expect_root(root)?;
            state.expect_profile(request.profile())?;
            if !matches!(state.slot(game)?.object, Object::Game { .. }) {
                return Err(EngineError::WrongKind {
                    handle: game,
                    expected: "game",
                });
            }
            if state.fail_launch {
                return Err(EngineError::CallFailed("mock launch failed".to_owned()));
            }
            if state.running_run(game.raw()).is_some() {
                return Err(EngineError::CallFailed(format!(
                    "game {} is already running",
                    request.game_id()
                )));
            }
            state.launches.push(request.clone());
            let run = Arc::new(MockRun {
                game: game.raw(),
                running: AtomicBool::new(true),
                observer,
            });
            state.runs.retain(|r| r.running.load(Ordering::SeqCst));
            state.runs.push(Arc::clone(&run));
            run
        };
        run.emit(RunEvent::State(RunState::Starting));
        run.emit(RunEvent::State(RunState::Running));
        Ok(Box::new(MockRunHandle { run }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::SurfaceSize;
    use delaunch_schema::{ModuleErrorCode, ModuleStatus, ModuleType, ModuleName};

    fn engine() -> MockEngine {
        MockEngine::new()
            .with_module(ModuleDescriptor {
                name: ModuleName::new("DragonScript"),
                module_type: ModuleType::Script,
                version: "1.0".to_owned(),
                status: ModuleStatus::Ready,
                error_code: ModuleErrorCode::None,
                pattern: String::new(),
            })
            .with_game(GameConfig::new("game-a", "DragonScript"))
            .with_profile(ProfileConfig::new("Default"))
            .with_default_profile("Default")
    }

    fn collector() -> (RunObserver, Arc<Mutex<Vec<RunEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let observer: RunObserver = Arc::new(move |e: RunEvent| sink.lock().unwrap().push(e));
        (observer, events)
    }

    #[test]
    fn root_materializes_seeds() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        assert_eq!(e.list_games(root).unwrap().len(), 1);
        assert_eq!(e.list_profiles(root).unwrap().len(), 1);
        assert_eq!(e.list_modules(root).unwrap().len(), 1);
        let default = e.default_profile(root).unwrap().unwrap();
        assert_eq!(e.profile_config(default).unwrap().name, "Default");
        assert_eq!(e.refs(default), Some(1));
    }

    #[test]
    fn add_reference_and_release_balance() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let game = e.list_games(root).unwrap()[0];
        e.add_reference(game).unwrap();
        assert_eq!(e.refs(game), Some(2));
        e.release(game).unwrap();
        assert_eq!(e.refs(game), Some(1));
        assert_eq!(e.release_calls(game), 1);
    }

    #[test]
    fn destroy_root_frees_everything() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        e.destroy_root(root).unwrap();
        assert_eq!(e.live_objects(), 0);
        assert!(!e.has_root());
    }

    #[test]
    fn freed_ids_are_reused() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let p = e.create_profile(root, &ProfileConfig::new("tmp")).unwrap();
        e.release(p).unwrap();
        assert_eq!(e.refs(p), None);
        let q = e.create_profile(root, &ProfileConfig::new("tmp2")).unwrap();
        assert_eq!(p, q);
    }

    #[test]
    fn wrong_kind_is_reported() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let game = e.list_games(root).unwrap()[0];
        assert!(matches!(
            e.profile_config(game),
            Err(EngineError::WrongKind { expected: "profile", .. })
        ));
    }

    #[test]
    fn game_profiles_hold_references() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let game = e.list_games(root).unwrap()[0];
        let custom = e.create_profile(root, &ProfileConfig::new("custom")).unwrap();
        e.set_game_profiles(game, None, Some(custom)).unwrap();
        assert_eq!(e.refs(custom), Some(2));
        e.release(custom).unwrap();
        assert_eq!(e.game_info(game).unwrap().custom_profile, Some(custom));
        e.set_game_profiles(game, None, None).unwrap();
        assert_eq!(e.refs(custom), None);
    }

    #[test]
    fn launch_emits_states_and_stop_finishes() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let game = e.list_games(root).unwrap()[0];
        let profile = e.default_profile(root).unwrap().unwrap();
        let request = RunRequest::new(
            GameId::new("game-a"),
            profile,
            ProfileName::new("Default"),
            String::new(),
            SurfaceSize::default(),
            Vec::new(),
        );
        let (observer, events) = collector();
        let mut run = e.launch(root, game, &request, observer).unwrap();
        assert!(run.is_running());
        assert!(e.game_status(game).unwrap().running);
        run.stop().unwrap();
        run.kill().unwrap();
        assert!(!run.is_running());
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                RunEvent::State(RunState::Starting),
                RunEvent::State(RunState::Running),
                RunEvent::State(RunState::Stopping),
                RunEvent::State(RunState::Stopped),
            ]
        );
        assert_eq!(e.launches(), vec![request]);
    }

    #[test]
    fn finish_game_and_logs() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let game = e.list_games(root).unwrap()[0];
        let profile = e.default_profile(root).unwrap().unwrap();
        let request = RunRequest::new(
            GameId::new("game-a"),
            profile,
            ProfileName::new("Default"),
            String::new(),
            SurfaceSize::default(),
            Vec::new(),
        );
        let (observer, events) = collector();
        let run = e.launch(root, game, &request, observer).unwrap();
        let id = GameId::new("game-a");
        assert!(e.emit_log(&id, LogSeverity::Info, "hello"));
        assert!(e.finish_game(&id));
        assert!(!run.is_running());
        assert!(!e.finish_game(&id));
        let events = events.lock().unwrap();
        assert!(events.contains(&RunEvent::Log {
            severity: LogSeverity::Info,
            message: "hello".to_owned()
        }));
        assert_eq!(events.last(), Some(&RunEvent::State(RunState::Stopped)));
    }

    #[test]
    fn failure_injection() {
        let e = engine();
        e.set_fail_load_libraries(true);
        assert!(matches!(
            e.load_libraries(&EngineConfig::default()),
            Err(EngineError::LibraryLoad(_))
        ));
        assert_eq!(e.library_loads(), 1);
        e.set_fail_create_root(true);
        assert!(e.create_root(&EngineConfig::default()).is_err());
    }

    #[test]
    fn vfs_mount_is_recorded() {
        let e = engine();
        let root = e.create_root(&EngineConfig::default()).unwrap();
        let mount = VfsMount {
            virtual_path: "/data".to_owned(),
            fd: 3,
            offset: 128,
            length: 4096,
        };
        e.vfs_mount(root, &mount).unwrap();
        assert_eq!(e.mounts(), vec![mount]);
        let bad = VfsMount {
            virtual_path: "/bad".to_owned(),
            fd: -1,
            offset: 0,
            length: 0,
        };
        assert!(e.vfs_mount(root, &bad).is_err());
    }
}
