use crate::registry::{GameProxy, ManagedProxy, ProfileProxy};
use delaunch_schema::{compare_versions, ModuleDescriptor, ModuleType, ProfileName};
use std::cmp::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Modules, games and profiles as listed by the engine runtime.
///
/// A catalog is immutable once published; the mirror replaces it as a whole.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: Vec<ModuleDescriptor>,
    games: Vec<GameProxy>,
    profiles: Vec<ProfileProxy>,
    default_profile: Option<ProfileProxy>,
    active_profile: Option<ProfileProxy>,
}

impl Catalog {
    /// The active profile starts out as the default profile.
    pub fn new(
        modules: Vec<ModuleDescriptor>,
        games: Vec<GameProxy>,
        profiles: Vec<ProfileProxy>,
        default_profile: Option<ProfileProxy>,
    ) -> Self {
        Self {
            modules,
            games,
            profiles,
            active_profile: default_profile.clone(),
            default_profile,
        }
    }

    pub fn modules(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    pub fn games(&self) -> &[GameProxy] {
        &self.games
    }

    pub fn profiles(&self) -> &[ProfileProxy] {
        &self.profiles
    }

    pub fn default_profile(&self) -> Option<&ProfileProxy> {
        self.default_profile.as_ref()
    }

    pub fn active_profile(&self) -> Option<&ProfileProxy> {
        self.active_profile.as_ref()
    }

    pub fn profile_named(&self, name: &str) -> Option<&ProfileProxy> {
        self.profiles.iter().find(|p| p.name() == name)
    }

    pub fn profile_names(&self) -> Vec<ProfileName> {
        self.profiles.iter().map(ProfileProxy::name).collect()
    }

    pub fn game_with_id(&self, id: &str) -> Option<&GameProxy> {
        self.games.iter().find(|g| g.identifier() == id)
    }

    /// Highest version of the named module.
    pub fn module_named(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules
            .iter()
            .filter(|m| m.name == name)
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Highest version of the named module that is at least `version`.
    /// An empty version accepts any.
    pub fn module_named_at_least(&self, name: &str, version: &str) -> Option<&ModuleDescriptor> {
        self.module_named(name).filter(|m| {
            version.is_empty() || compare_versions(&m.version, version) != Ordering::Less
        })
    }

    pub fn modules_of_type(
        &self,
        module_type: ModuleType,
    ) -> impl Iterator<Item = &ModuleDescriptor> {
        self.modules
            .iter()
            .filter(move |m| m.module_type == module_type)
    }

    /// Copy of this catalog with `game` added, replacing any game with the
    /// same identifier.
    #[must_use]
    pub fn with_game(&self, game: GameProxy) -> Self {
        let mut next = self.clone();
        let id = game.identifier();
        next.games.retain(|g| g.identifier() != id);
        next.games.push(game);
        next
    }

    #[must_use]
    pub fn with_profile(&self, profile: ProfileProxy) -> Self {
        let mut next = self.clone();
        next.profiles.retain(|p| p.key() != profile.key());
        next.profiles.push(profile);
        next
    }
}

/// Holder of the current catalog.
///
/// Readers take an `Arc` snapshot. Replacement swaps the pointer under the
/// write lock and drops the previous catalog after the lock is released, so
/// proxies that only the old catalog held are released right away while
/// readers still holding the old snapshot keep theirs alive.
#[derive(Debug, Default)]
pub struct CatalogMirror {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, catalog: Catalog) {
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::new(catalog))
        };
        debug!(
            "catalog replaced ({} games, {} profiles dropped)",
            previous.games.len(),
            previous.profiles.len()
        );
        drop(previous);
    }

    /// Apply `f` to a copy of the current catalog and publish the result.
    pub fn update(&self, f: impl FnOnce(&Catalog) -> Catalog) {
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let next = f(&current);
            std::mem::replace(&mut *current, Arc::new(next))
        };
        drop(previous);
    }

    pub fn clear(&self) {
        self.replace(Catalog::default());
    }

    pub fn set_active_profile(&self, profile: Option<ProfileProxy>) {
        self.update(|catalog| {
            let mut next = catalog.clone();
            next.active_profile = profile;
            next
        });
    }
}
