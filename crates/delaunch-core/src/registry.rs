//! Managed proxies over native engine objects.
//!
//! The registry maps each live [`NativeHandle`] to exactly one entry with its
//! own key and reference count. Proxies carry the key; cloning a proxy retains
//! the entry and dropping it releases. When the count reaches zero the entry is
//! removed and the native reference is released exactly once, all under the
//! registry mutex, so a released handle is never handed out again. A numeric
//! handle value reused by the engine later gets a fresh entry and key.

use crate::CoreError;
use delaunch_engine::{EngineBoundary, EngineError, GameInfo, GameStatus, NativeHandle};
use delaunch_schema::{GameConfig, GameId, ProfileConfig, ProfileName};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, warn};

pub type ProxyKey = u64;

/// Last synchronized view of a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    pub info: GameInfo,
    pub status: GameStatus,
}

#[derive(Clone)]
enum SharedSnapshot {
    Game(Arc<RwLock<GameSnapshot>>),
    Profile(Arc<RwLock<ProfileConfig>>),
}

impl SharedSnapshot {
    fn kind(&self) -> &'static str {
        match self {
            SharedSnapshot::Game(_) => "game",
            SharedSnapshot::Profile(_) => "profile",
        }
    }
}

struct Entry {
    handle: NativeHandle,
    refs: usize,
    snapshot: SharedSnapshot,
}

#[derive(Default)]
struct RegistryState {
    next_key: ProxyKey,
    by_handle: HashMap<NativeHandle, ProxyKey>,
    entries: HashMap<ProxyKey, Entry>,
}

struct Shared {
    boundary: Arc<dyn EngineBoundary>,
    state: Mutex<RegistryState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn retain(&self, key: ProxyKey) {
        if let Some(entry) = self.lock().entries.get_mut(&key) {
            entry.refs += 1;
        }
    }

    fn release(&self, key: ProxyKey) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&key) else {
            warn!("release of unknown proxy key {key}");
            return;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return;
        }
        if let Some(entry) = state.entries.remove(&key) {
            if state.by_handle.get(&entry.handle) == Some(&key) {
                state.by_handle.remove(&entry.handle);
            }
            debug!(
                "disposing {} proxy {key} ({})",
                entry.snapshot.kind(),
                entry.handle
            );
            if let Err(e) = self.boundary.release(entry.handle) {
                warn!("native release of {} failed: {e}", entry.handle);
            }
        }
    }
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Untyped reference-counted registry entry.
pub struct Proxy {
    shared: Arc<Shared>,
    key: ProxyKey,
    handle: NativeHandle,
}

impl Proxy {
    pub fn key(&self) -> ProxyKey {
        self.key
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn boundary(&self) -> &dyn EngineBoundary {
        self.shared.boundary.as_ref()
    }

    fn registry(&self) -> HandleRegistry {
        HandleRegistry {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Clone for Proxy {
    fn clone(&self) -> Self {
        self.shared.retain(self.key);
        Self {
            shared: Arc::clone(&self.shared),
            key: self.key,
            handle: self.handle,
        }
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.shared.release(self.key);
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared) && self.key == other.key
    }
}

impl Eq for Proxy {}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("key", &self.key)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Common surface of the typed proxies.
pub trait ManagedProxy: Clone {
    fn proxy(&self) -> &Proxy;

    fn key(&self) -> ProxyKey {
        self.proxy().key()
    }

    fn handle(&self) -> NativeHandle {
        self.proxy().handle()
    }
}

/// Managed game object.
#[derive(Clone)]
pub struct GameProxy {
    proxy: Proxy,
    snapshot: Arc<RwLock<GameSnapshot>>,
}

impl ManagedProxy for GameProxy {
    fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl PartialEq for GameProxy {
    fn eq(&self, other: &Self) -> bool {
        self.proxy == other.proxy
    }
}

impl Eq for GameProxy {}

impl fmt::Debug for GameProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameProxy")
            .field("key", &self.proxy.key)
            .field("handle", &self.proxy.handle)
            .field("identifier", &self.identifier())
            .finish()
    }
}

fn fetch_game(boundary: &dyn EngineBoundary, handle: NativeHandle) -> Result<GameSnapshot, EngineError> {
    Ok(GameSnapshot {
        info: boundary.game_info(handle)?,
        status: boundary.game_status(handle)?,
    })
}

impl GameProxy {
    pub fn snapshot(&self) -> GameSnapshot {
        read(&self.snapshot)
    }

    pub fn info(&self) -> GameInfo {
        self.snapshot().info
    }

    pub fn identifier(&self) -> GameId {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).info.identifier.clone()
    }

    /// Running flag as of the last refresh.
    pub fn is_running(&self) -> bool {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).status.running
    }

    /// Re-read info and status from the engine.
    pub fn refresh(&self) -> Result<(), CoreError> {
        let snapshot = fetch_game(self.proxy.boundary(), self.proxy.handle)?;
        write(&self.snapshot, snapshot);
        Ok(())
    }

    /// Current configuration, read live from the engine.
    pub fn config(&self) -> Result<GameConfig, CoreError> {
        Ok(self.proxy.boundary().game_config(self.proxy.handle)?)
    }

    pub fn set_config(&self, config: &GameConfig) -> Result<(), CoreError> {
        self.proxy
            .boundary()
            .set_game_config(self.proxy.handle, config)?;
        self.refresh()
    }

    pub fn active_profile(&self) -> Result<Option<ProfileProxy>, CoreError> {
        self.proxy
            .registry()
            .acquire_profile(self.snapshot().info.active_profile)
    }

    pub fn custom_profile(&self) -> Result<Option<ProfileProxy>, CoreError> {
        self.proxy
            .registry()
            .acquire_profile(self.snapshot().info.custom_profile)
    }

    /// Bind the game's active and custom profile.
    pub fn bind_profiles(
        &self,
        active: Option<&ProfileProxy>,
        custom: Option<&ProfileProxy>,
    ) -> Result<(), CoreError> {
        self.proxy.boundary().set_game_profiles(
            self.proxy.handle,
            active.map(ManagedProxy::handle),
            custom.map(ManagedProxy::handle),
        )?;
        self.refresh()
    }
}

/// Managed profile object.
#[derive(Clone)]
pub struct ProfileProxy {
    proxy: Proxy,
    config: Arc<RwLock<ProfileConfig>>,
}

impl ManagedProxy for ProfileProxy {
    fn proxy(&self) -> &Proxy {
        &self.proxy
    }
}

impl PartialEq for ProfileProxy {
    fn eq(&self, other: &Self) -> bool {
        self.proxy == other.proxy
    }
}

impl Eq for ProfileProxy {}

impl fmt::Debug for ProfileProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileProxy")
            .field("key", &self.proxy.key)
            .field("handle", &self.proxy.handle)
            .field("name", &self.name())
            .finish()
    }
}

impl ProfileProxy {
    /// Configuration as of the last refresh.
    pub fn config(&self) -> ProfileConfig {
        read(&self.config)
    }

    pub fn name(&self) -> ProfileName {
        self.config.read().unwrap_or_else(PoisonError::into_inner).name.clone()
    }

    pub fn refresh(&self) -> Result<(), CoreError> {
        let config = self.proxy.boundary().profile_config(self.proxy.handle)?;
        write(&self.config, config);
        Ok(())
    }

    /// Write a new configuration to the engine and cache it.
    pub fn set_config(&self, config: &ProfileConfig) -> Result<(), CoreError> {
        self.proxy
            .boundary()
            .set_profile_config(self.proxy.handle, config)?;
        write(&self.config, config.clone());
        Ok(())
    }
}

/// Registry of managed proxies, one per orchestrator.
#[derive(Clone)]
pub struct HandleRegistry {
    shared: Arc<Shared>,
}

impl HandleRegistry {
    pub fn new(boundary: Arc<dyn EngineBoundary>) -> Self {
        Self {
            shared: Arc::new(Shared {
                boundary,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn boundary(&self) -> &Arc<dyn EngineBoundary> {
        &self.shared.boundary
    }

    /// Find or create the entry for `handle`.
    ///
    /// `owned` marks handles that already carry a reference for the caller
    /// (freshly created objects). For a new entry that reference becomes the
    /// registry's; for a cached one it is surplus and released right away.
    fn acquire_entry(
        &self,
        handle: NativeHandle,
        owned: bool,
        fetch: impl FnOnce(&dyn EngineBoundary) -> Result<SharedSnapshot, EngineError>,
    ) -> Result<(Proxy, SharedSnapshot), CoreError> {
        let boundary = self.shared.boundary.as_ref();
        let mut state = self.shared.lock();

        if let Some(&key) = state.by_handle.get(&handle) {
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.refs += 1;
                let snapshot = entry.snapshot.clone();
                if owned {
                    if let Err(e) = boundary.release(handle) {
                        warn!("releasing surplus reference of {handle} failed: {e}");
                    }
                }
                let proxy = Proxy {
                    shared: Arc::clone(&self.shared),
                    key,
                    handle,
                };
                return Ok((proxy, snapshot));
            }
            state.by_handle.remove(&handle);
        }

        if !owned {
            boundary.add_reference(handle)?;
        }
        let snapshot = match fetch(boundary) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if let Err(release_err) = boundary.release(handle) {
                    warn!("native release of {handle} failed: {release_err}");
                }
                return Err(e.into());
            }
        };

        state.next_key += 1;
        let key = state.next_key;
        state.by_handle.insert(handle, key);
        state.entries.insert(
            key,
            Entry {
                handle,
                refs: 1,
                snapshot: snapshot.clone(),
            },
        );
        debug!("new {} proxy {key} for {handle}", snapshot.kind());
        let proxy = Proxy {
            shared: Arc::clone(&self.shared),
            key,
            handle,
        };
        Ok((proxy, snapshot))
    }

    fn game(&self, handle: NativeHandle, owned: bool) -> Result<GameProxy, CoreError> {
        let (proxy, snapshot) = self.acquire_entry(handle, owned, |boundary| {
            Ok(SharedSnapshot::Game(Arc::new(RwLock::new(fetch_game(
                boundary, handle,
            )?))))
        })?;
        match snapshot {
            SharedSnapshot::Game(snapshot) => Ok(GameProxy { proxy, snapshot }),
            SharedSnapshot::Profile(_) => Err(CoreError::WrongProxyKind {
                handle,
                expected: "game",
            }),
        }
    }

    fn profile(&self, handle: NativeHandle, owned: bool) -> Result<ProfileProxy, CoreError> {
        let (proxy, snapshot) = self.acquire_entry(handle, owned, |boundary| {
            Ok(SharedSnapshot::Profile(Arc::new(RwLock::new(
                boundary.profile_config(handle)?,
            ))))
        })?;
        match snapshot {
            SharedSnapshot::Profile(config) => Ok(ProfileProxy { proxy, config }),
            SharedSnapshot::Game(_) => Err(CoreError::WrongProxyKind {
                handle,
                expected: "profile",
            }),
        }
    }

    /// Proxy for a borrowed game handle. A null handle yields `None`.
    pub fn acquire_game(
        &self,
        handle: Option<NativeHandle>,
    ) -> Result<Option<GameProxy>, CoreError> {
        handle.map(|h| self.game(h, false)).transpose()
    }

    /// Proxy for a game handle that carries a reference owned by the caller.
    pub fn adopt_game(&self, handle: NativeHandle) -> Result<GameProxy, CoreError> {
        self.game(handle, true)
    }

    pub fn acquire_profile(
        &self,
        handle: Option<NativeHandle>,
    ) -> Result<Option<ProfileProxy>, CoreError> {
        handle.map(|h| self.profile(h, false)).transpose()
    }

    pub fn adopt_profile(&self, handle: NativeHandle) -> Result<ProfileProxy, CoreError> {
        self.profile(handle, true)
    }

    pub fn retain<P: ManagedProxy>(&self, proxy: &P) -> P {
        proxy.clone()
    }

    pub fn release<P: ManagedProxy>(&self, proxy: P) {
        drop(proxy);
    }

    /// Reference count of an entry, 0 once disposed.
    pub fn ref_count(&self, key: ProxyKey) -> usize {
        self.shared.lock().entries.get(&key).map_or(0, |e| e.refs)
    }

    pub fn contains(&self, handle: NativeHandle) -> bool {
        self.shared.lock().by_handle.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
