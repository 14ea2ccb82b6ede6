//! Provisioning state machine against the mock engine and real bundles.

mod common;

use common::{config, default_bundle, engine, launcher, ready_launcher, Recorder};
use delaunch_core::{
    CoreError, InstallLock, InstallationState, LauncherHandle, LauncherListener, ListenerId,
    ManagedProxy,
};
use delaunch_schema::{GameConfig, ProfileConfig};
use delaunch_store::{read_version_marker, GameStore};
use std::sync::{Arc, Mutex};

#[test]
fn fresh_install_reaches_ready() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let config = config(dir.path());
    let mut launcher = launcher(&config, &engine);
    let recorder = Arc::new(Recorder::default());
    launcher.add_listener(Arc::clone(&recorder) as Arc<dyn LauncherListener>);

    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);

    assert_eq!(
        recorder.events(),
        vec!["installing", "loading-libraries", "creating-runtime", "ready", "catalog"]
    );
    let progress = recorder.progress.lock().unwrap().clone();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!((progress.last().copied().unwrap() - 1.0).abs() < f32::EPSILON);
    assert!((launcher.progress() - 1.0).abs() < f32::EPSILON);

    let layout = config.layout();
    assert_eq!(
        read_version_marker(&layout.installed_version_file())
            .unwrap()
            .as_deref(),
        Some("1.23\n")
    );
    assert!(layout
        .engine_install_dir()
        .join("lib")
        .join("libdragengine.so")
        .is_file());
    assert_eq!(engine.library_loads(), 1);

    let catalog = launcher.handle().catalog();
    assert_eq!(catalog.profile_names(), vec!["Default", "Fast", "Broken"]);
    assert_eq!(catalog.active_profile().unwrap().name(), "Default");
    assert!(catalog.game_with_id("seeded").is_some());
    assert_eq!(catalog.modules().len(), 11);
}

#[test]
fn matching_marker_skips_install() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    drop(ready_launcher(dir.path(), &engine));
    assert!(!engine.has_root());

    let mut launcher = launcher(&config(dir.path()), &engine);
    let recorder = Arc::new(Recorder::default());
    launcher.add_listener(Arc::clone(&recorder) as Arc<dyn LauncherListener>);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    assert_eq!(
        recorder.events(),
        vec!["loading-libraries", "creating-runtime", "ready", "catalog"]
    );
    assert!(recorder.progress.lock().unwrap().is_empty());
}

#[test]
fn changed_bundle_version_reinstalls() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    drop(ready_launcher(dir.path(), &engine));
    let bundle = dir.path().join("bundle");
    common::create_bundle(&bundle, "1.24", &[("lib/new.so", b"new")]);

    let config = config(dir.path());
    let mut launcher = launcher(&config, &engine);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    let install = config.layout().engine_install_dir();
    assert!(install.join("lib").join("new.so").is_file());
    assert!(!install.join("lib").join("libdragengine.so").exists());
}

#[test]
fn load_failure_then_retry() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let mut launcher = launcher(&config(dir.path()), &engine);

    engine.set_fail_load_libraries(true);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::LoadFailed);
    assert!(launcher
        .last_error()
        .unwrap()
        .contains("mock libraries unavailable"));
    assert!(launcher.handle().catalog().profiles().is_empty());

    engine.set_fail_load_libraries(false);
    launcher.retry().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    assert!(launcher.last_error().is_none());
    assert_eq!(engine.library_loads(), 2);
}

#[test]
fn create_failure_disposes_partial_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let mut launcher = launcher(&config(dir.path()), &engine);
    let recorder = Arc::new(Recorder::default());
    launcher.add_listener(Arc::clone(&recorder) as Arc<dyn LauncherListener>);

    engine.set_fail_list_games(true);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::CreateFailed);
    assert!(!engine.has_root());
    assert!(launcher.handle().root().is_none());
    assert!(launcher.handle().registry().is_empty());
    assert_eq!(engine.live_objects(), 0);
    assert_eq!(recorder.count("catalog"), 0);

    engine.set_fail_list_games(false);
    launcher.retry().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    assert_eq!(recorder.count("catalog"), 1);
}

#[test]
fn failed_root_creation_is_create_failed() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let mut launcher = launcher(&config(dir.path()), &engine);
    engine.set_fail_create_root(true);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::CreateFailed);
    assert!(launcher
        .last_error()
        .unwrap()
        .contains("mock root creation failed"));
}

#[test]
fn cancelled_install_removes_target() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let config = config(dir.path());
    let layout = config.layout();
    let mut launcher = launcher(&config, &engine);
    let recorder = Arc::new(Recorder::default());
    launcher.add_listener(Arc::clone(&recorder) as Arc<dyn LauncherListener>);

    // Hold the install lock so the worker cannot unpack before we cancel.
    let lock = InstallLock::acquire(&layout.lock_file()).unwrap();
    launcher.start().unwrap();
    assert_eq!(launcher.state(), InstallationState::Installing);
    assert!(launcher.cancel_install());
    drop(lock);

    assert_eq!(launcher.wait(), InstallationState::VerifyInstallation);
    assert!(launcher.was_cancelled());
    assert!(!layout.engine_install_dir().exists());
    assert!(read_version_marker(&layout.installed_version_file())
        .unwrap()
        .is_none());
    assert_eq!(recorder.count("cancelled"), 1);
    assert_eq!(engine.library_loads(), 0);

    launcher.retry().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    assert!(!launcher.was_cancelled());
}

#[test]
fn retry_only_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let mut launcher = ready_launcher(dir.path(), &engine);
    assert!(matches!(
        launcher.retry(),
        Err(CoreError::RetryNotAllowed(InstallationState::Ready))
    ));
}

#[test]
fn shutdown_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let mut launcher = ready_launcher(dir.path(), &engine);
    assert!(!launcher.handle().registry().is_empty());

    launcher.shutdown();
    assert_eq!(launcher.state(), InstallationState::VerifyInstallation);
    assert!(launcher.handle().registry().is_empty());
    assert!(!engine.has_root());
    assert_eq!(engine.live_objects(), 0);

    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
}

#[test]
fn stored_games_are_restored() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let config = config(dir.path());
    let layout = config.layout();
    layout.initialize().unwrap();
    let store = GameStore::new(&layout);
    store.put(&GameConfig::new("stored", "DragonScript")).unwrap();
    let mut custom = ProfileConfig::new("stored (custom)");
    custom.parameters.set("graphic-mod", "vsync", "0");
    store.set_custom_profile("stored", Some(&custom)).unwrap();

    let mut launcher = launcher(&config, &engine);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);

    let catalog = launcher.handle().catalog();
    let game = catalog.game_with_id("stored").unwrap();
    let restored = game.custom_profile().unwrap().unwrap();
    assert_eq!(restored.config(), custom);
    assert!(game.active_profile().unwrap().is_none());
    assert!(catalog.game_with_id("seeded").is_some());
    let handle = restored.handle();
    drop(restored);
    // The game keeps its custom profile alive natively.
    assert_eq!(engine.refs(handle), Some(1));
}

/// Removes itself on the first notification it sees.
struct OneShot {
    id: Mutex<Option<ListenerId>>,
    calls: Mutex<usize>,
}

impl LauncherListener for OneShot {
    fn state_changed(&self, launcher: &LauncherHandle, _state: InstallationState) {
        *self.calls.lock().unwrap() += 1;
        if let Some(id) = self.id.lock().unwrap().take() {
            assert!(launcher.remove_listener(id));
        }
    }
}

#[test]
fn listener_can_remove_itself_mid_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    default_bundle(&dir.path().join("bundle"));
    let mut launcher = launcher(&config(dir.path()), &engine);
    let one_shot = Arc::new(OneShot {
        id: Mutex::new(None),
        calls: Mutex::new(0),
    });
    let recorder = Arc::new(Recorder::default());
    let id = launcher.add_listener(Arc::clone(&one_shot) as Arc<dyn LauncherListener>);
    *one_shot.id.lock().unwrap() = Some(id);
    launcher.add_listener(Arc::clone(&recorder) as Arc<dyn LauncherListener>);

    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    assert_eq!(*one_shot.calls.lock().unwrap(), 1);
    assert_eq!(recorder.count("ready"), 1);
}
