#![allow(dead_code)]

use delaunch_core::{InstallationState, Launcher, LauncherConfig};
use delaunch_engine::{EngineBoundary, MockEngine};
use delaunch_schema::{
    GameConfig, ModuleDescriptor, ModuleErrorCode, ModuleName, ModuleStatus, ModuleType,
    ProfileConfig,
};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zip::write::SimpleFileOptions;

fn module(name: &str, module_type: ModuleType) -> ModuleDescriptor {
    ModuleDescriptor {
        name: ModuleName::new(name),
        module_type,
        version: "1.0".to_owned(),
        status: ModuleStatus::Ready,
        error_code: ModuleErrorCode::None,
        pattern: String::new(),
    }
}

/// Engine with every system slot filled, a valid "Default" and a valid
/// "Windowed" profile.
pub fn engine() -> Arc<MockEngine> {
    let profile = |name: &str| {
        ModuleType::PROFILE_TYPES
            .iter()
            .fold(ProfileConfig::new(name), |p, t| {
                p.with_module(*t, &format!("{t}-mod"))
            })
    };
    let engine = ModuleType::PROFILE_TYPES
        .iter()
        .fold(MockEngine::new(), |e, t| {
            e.with_module(module(&format!("{t}-mod"), *t))
        })
        .with_module(module("DragonScript", ModuleType::Script))
        .with_profile(profile("Default"))
        .with_profile(profile("Windowed"))
        .with_default_profile("Default");
    Arc::new(engine)
}

pub fn demo() -> GameConfig {
    GameConfig::new("demo", "DragonScript")
}

pub fn launcher(dir: &Path, engine: &Arc<MockEngine>) -> Launcher {
    let bundle = dir.join("bundle");
    fs::create_dir_all(&bundle).unwrap();
    let mut zip = zip::ZipWriter::new(fs::File::create(bundle.join("install.zip")).unwrap());
    zip.start_file("lib/libdragengine.so", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"engine").unwrap();
    zip.finish().unwrap();
    fs::write(bundle.join("install.version"), "1.0").unwrap();
    fs::write(bundle.join("install.size"), "6").unwrap();

    let config = LauncherConfig::new(dir.join("root"), bundle);
    Launcher::new(&config, Arc::clone(engine) as Arc<dyn EngineBoundary>).unwrap()
}

pub fn ready_launcher(dir: &Path, engine: &Arc<MockEngine>) -> Launcher {
    let mut launcher = launcher(dir, engine);
    launcher.start().unwrap();
    assert_eq!(launcher.wait(), InstallationState::Ready);
    launcher
}

/// Poll `condition` for up to five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
