#![allow(dead_code)]

use delaunch_core::{InstallationState, Launcher, LauncherConfig, LauncherHandle, LauncherListener};
use delaunch_engine::{EngineBoundary, MockEngine, RunEvent, RunObserver};
use delaunch_schema::{
    GameConfig, ModuleDescriptor, ModuleErrorCode, ModuleName, ModuleStatus, ModuleType,
    ProfileConfig,
};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use zip::write::SimpleFileOptions;

pub fn module(name: &str, module_type: ModuleType) -> ModuleDescriptor {
    ModuleDescriptor {
        name: ModuleName::new(name),
        module_type,
        version: "1.0".to_owned(),
        status: ModuleStatus::Ready,
        error_code: ModuleErrorCode::None,
        pattern: String::new(),
    }
}

/// Profile selecting `<type>-mod` for every system slot.
pub fn full_profile(name: &str) -> ProfileConfig {
    ModuleType::PROFILE_TYPES
        .iter()
        .fold(ProfileConfig::new(name), |p, t| {
            p.with_module(*t, &format!("{t}-mod"))
        })
}

/// Engine with one ready module per system slot, the DragonScript script
/// module and no profiles or games.
pub fn bare_engine() -> MockEngine {
    ModuleType::PROFILE_TYPES
        .iter()
        .fold(MockEngine::new(), |e, t| {
            e.with_module(module(&format!("{t}-mod"), *t))
        })
        .with_module(module("DragonScript", ModuleType::Script))
}

/// Bare engine plus a valid "Default" profile and one seeded game.
pub fn engine() -> Arc<MockEngine> {
    let mut default = full_profile("Default");
    default.arguments = "-prof".to_owned();
    Arc::new(
        bare_engine()
            .with_profile(default)
            .with_profile(full_profile("Fast"))
            .with_profile(ProfileConfig::new("Broken"))
            .with_default_profile("Default")
            .with_game(GameConfig::new("seeded", "DragonScript")),
    )
}

pub fn create_bundle(dir: &Path, version: &str, entries: &[(&str, &[u8])]) {
    fs::create_dir_all(dir).unwrap();
    let mut zip = zip::ZipWriter::new(fs::File::create(dir.join("install.zip")).unwrap());
    let mut total = 0usize;
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
        total += data.len();
    }
    zip.finish().unwrap();
    fs::write(dir.join("install.version"), version).unwrap();
    fs::write(dir.join("install.size"), total.to_string()).unwrap();
}

pub fn default_bundle(dir: &Path) {
    create_bundle(
        dir,
        "1.23\n",
        &[
            ("lib/libdragengine.so", &[7u8; 100_000]),
            ("share/modules.xml", b"<modules/>"),
        ],
    );
}

pub fn config(dir: &Path) -> LauncherConfig {
    LauncherConfig::new(dir.join("root"), dir.join("bundle"))
}

pub fn launcher(config: &LauncherConfig, engine: &Arc<MockEngine>) -> Launcher {
    Launcher::new(config, Arc::clone(engine) as Arc<dyn EngineBoundary>).unwrap()
}

/// Launcher that went through provisioning and is ready.
pub fn ready_launcher(dir: &Path, engine: &Arc<MockEngine>) -> Launcher {
    default_bundle(&dir.join("bundle"));
    let mut launcher = launcher(&config(dir), engine);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    launcher
}

#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<f32>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

impl LauncherListener for Recorder {
    fn state_changed(&self, _launcher: &LauncherHandle, state: InstallationState) {
        self.events.lock().unwrap().push(state.to_string());
    }

    fn progress_changed(&self, _launcher: &LauncherHandle, progress: f32) {
        self.progress.lock().unwrap().push(progress);
    }

    fn catalog_changed(&self, _launcher: &LauncherHandle) {
        self.events.lock().unwrap().push("catalog".to_owned());
    }

    fn install_cancelled(&self, _launcher: &LauncherHandle) {
        self.events.lock().unwrap().push("cancelled".to_owned());
    }
}

pub fn collector() -> (RunObserver, Arc<Mutex<Vec<RunEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let observer: RunObserver = Arc::new(move |e: RunEvent| sink.lock().unwrap().push(e));
    (observer, events)
}
