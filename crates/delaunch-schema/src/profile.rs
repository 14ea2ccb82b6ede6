use crate::module::ModuleType;
use crate::types::{ModuleName, ProfileName};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Module chosen for one system slot. An empty version means "latest".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub name: ModuleName,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl ModuleSelection {
    pub fn new(name: &str) -> Self {
        Self {
            name: ModuleName::new(name),
            version: String::new(),
        }
    }
}

/// Module parameter overrides keyed by module, then parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleParameters(BTreeMap<ModuleName, BTreeMap<String, String>>);

impl ModuleParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn set(&mut self, module: &str, parameter: &str, value: &str) {
        self.0
            .entry(ModuleName::new(module))
            .or_default()
            .insert(parameter.to_owned(), value.to_owned());
    }

    pub fn get(&self, module: &str, parameter: &str) -> Option<&str> {
        self.0
            .get(&ModuleName::new(module))
            .and_then(|params| params.get(parameter))
            .map(String::as_str)
    }

    /// Overlay `other` on top of `self`; values in `other` win.
    pub fn update(&mut self, other: &ModuleParameters) {
        for (module, params) in &other.0 {
            let target = self.0.entry(module.clone()).or_default();
            for (name, value) in params {
                target.insert(name.clone(), value.clone());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleName, &BTreeMap<String, String>)> {
        self.0.iter()
    }
}

/// A named bundle of module selections and run arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: ProfileName,
    #[serde(default)]
    pub modules: BTreeMap<ModuleType, ModuleSelection>,
    #[serde(default)]
    pub parameters: ModuleParameters,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub replace_arguments: bool,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default = "default_full_screen")]
    pub full_screen: bool,
}

fn default_full_screen() -> bool {
    true
}

impl ProfileConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: ProfileName::new(name),
            modules: BTreeMap::new(),
            parameters: ModuleParameters::new(),
            arguments: String::new(),
            replace_arguments: false,
            width: 0,
            height: 0,
            full_screen: true,
        }
    }

    #[must_use]
    pub fn with_module(mut self, module_type: ModuleType, name: &str) -> Self {
        self.modules.insert(module_type, ModuleSelection::new(name));
        self
    }

    pub fn module(&self, module_type: ModuleType) -> Option<&ModuleSelection> {
        self.modules.get(&module_type)
    }
}

/// Parse a `module:parameter=value` override as given on a command line.
///
/// The value may be empty and may itself contain `:` or `=`.
pub fn parse_module_parameter(text: &str) -> Result<(String, String, String), SchemaError> {
    let invalid = || SchemaError::InvalidModuleParameter(text.to_owned());
    let (module, rest) = text.split_once(':').ok_or_else(invalid)?;
    let (parameter, value) = rest.split_once('=').ok_or_else(invalid)?;
    if module.is_empty() || parameter.is_empty() {
        return Err(invalid());
    }
    Ok((module.to_owned(), parameter.to_owned(), value.to_owned()))
}
