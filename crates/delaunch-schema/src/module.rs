use crate::types::ModuleName;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Engine module categories.
///
/// System types (graphic, audio, script, ...) have exactly one active module
/// per run and are selected by profiles. Loader types handle file formats and
/// any number of them can be active at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Graphic,
    Input,
    Physics,
    Animator,
    Ai,
    CrashRecovery,
    Audio,
    Synthesizer,
    Network,
    Vr,
    Script,
    Image,
    Video,
    Model,
    Rig,
    Skin,
    Animation,
    Font,
    Sound,
    LanguagePack,
    Archive,
}

impl ModuleType {
    /// System types a profile must bind, in the order problems are reported.
    pub const PROFILE_TYPES: [ModuleType; 10] = [
        ModuleType::Graphic,
        ModuleType::Input,
        ModuleType::Physics,
        ModuleType::Animator,
        ModuleType::Ai,
        ModuleType::CrashRecovery,
        ModuleType::Audio,
        ModuleType::Synthesizer,
        ModuleType::Network,
        ModuleType::Vr,
    ];

    /// True for system types where only one module can be active.
    pub fn is_single_type(self) -> bool {
        Self::PROFILE_TYPES.contains(&self) || self == ModuleType::Script
    }

    /// Directory name the engine uses for modules of this type.
    pub fn directory(self) -> &'static str {
        match self {
            ModuleType::Graphic => "graphic",
            ModuleType::Input => "input",
            ModuleType::Physics => "physics",
            ModuleType::Animator => "animator",
            ModuleType::Ai => "ai",
            ModuleType::CrashRecovery => "crashrecovery",
            ModuleType::Audio => "audio",
            ModuleType::Synthesizer => "synthesizer",
            ModuleType::Network => "network",
            ModuleType::Vr => "vr",
            ModuleType::Script => "scripting",
            ModuleType::Image => "image",
            ModuleType::Video => "video",
            ModuleType::Model => "model",
            ModuleType::Rig => "rig",
            ModuleType::Skin => "skin",
            ModuleType::Animation => "animation",
            ModuleType::Font => "font",
            ModuleType::Sound => "sound",
            ModuleType::LanguagePack => "langpack",
            ModuleType::Archive => "archive",
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.directory())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Ready,
    Testing,
    Broken,
}

/// Reason a module failed to load, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleErrorCode {
    #[default]
    None,
    CreateModuleFailed,
    LibFileNotFound,
    LibFileNotRegularFile,
    LibFileSizeMismatch,
    LibFileCheckSumMismatch,
    LibFileOpenFailed,
    LibFileEntryPointNotFound,
    LibFileCreateModuleFailed,
}

impl ModuleErrorCode {
    pub fn describe(self) -> &'static str {
        match self {
            ModuleErrorCode::None => "Unknown problem",
            ModuleErrorCode::CreateModuleFailed => "Creating module failed",
            ModuleErrorCode::LibFileNotFound => "Module library file could not be found",
            ModuleErrorCode::LibFileNotRegularFile => {
                "Module library file is not a regular library file"
            }
            ModuleErrorCode::LibFileSizeMismatch => {
                "Size of the module library file does not match the size in the module definition"
            }
            ModuleErrorCode::LibFileCheckSumMismatch => {
                "Checksum of the module library file does not match the checksum in the module definition"
            }
            ModuleErrorCode::LibFileOpenFailed => "Module library file could not be opened",
            ModuleErrorCode::LibFileEntryPointNotFound => {
                "Entry point function could not be found in the library file"
            }
            ModuleErrorCode::LibFileCreateModuleFailed => {
                "Creating the module using the entry point function failed"
            }
        }
    }
}

/// Snapshot of one engine module as listed by the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: ModuleName,
    pub module_type: ModuleType,
    pub version: String,
    pub status: ModuleStatus,
    #[serde(default)]
    pub error_code: ModuleErrorCode,
    /// Comma separated file patterns handled by loader modules, e.g. `*.png,*.apng`.
    #[serde(default)]
    pub pattern: String,
}

impl ModuleDescriptor {
    pub fn is_ready(&self) -> bool {
        self.status == ModuleStatus::Ready
    }

    /// True if any of this module's patterns accepts the given file pattern.
    pub fn handles_pattern(&self, file_pattern: &str) -> bool {
        self.pattern
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .any(|p| glob_match(p.as_bytes(), file_pattern.as_bytes()))
    }
}

/// Compare dotted version strings component-wise.
///
/// Numeric components compare numerically, anything else lexically. Missing
/// trailing components count as zero, so `1.6` equals `1.6.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => {
                let l = l.unwrap_or("0");
                let r = r.unwrap_or("0");
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p.eq_ignore_ascii_case(t) => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
