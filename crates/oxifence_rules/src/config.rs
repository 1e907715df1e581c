use anyhow::Result;
use log::{debug, info, trace};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use oxifence_core::{FileSystem, UserError, join, strip_jsonc};

pub const CONFIG_FILE: &str = "oxifence.config.json";
pub const ROOT_TAG: &str = "root";
pub const DEFAULT_BARREL_FILE: &str = "index.ts";
pub const DEFAULT_ENCAPSULATED_FOLDER: &str = "internal";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawConfig {
    pub modules: Option<Map<String, Value>>,
    /// Legacy name of `modules`.
    pub tagging: Option<Map<String, Value>>,
    pub auto_tagging: Option<bool>,
    pub dep_rules: Option<Map<String, Value>>,
    pub exclude_root: Option<bool>,
    pub enable_barrel_less: Option<bool>,
    pub encapsulated_folder_name_for_barrel_less: Option<String>,
    pub encapsulation_pattern: Option<String>,
    pub barrel_file_name: Option<String>,
    pub entry_file: Option<String>,
    pub entry_points: Option<Map<String, Value>>,
    pub ignore_file_extensions: Option<Vec<String>>,
    pub warn_on_barrel_file_less_module: Option<bool>,
    pub tsconfig: Option<String>,
    pub plugins: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRule {
    pub template: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggingMode {
    Explicit(Vec<ModuleRule>),
    /// Every barrel directory becomes a module tagged with its own path.
    Auto,
    /// No configuration file: barrels are modules, nothing is tagged.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encapsulation {
    FolderName(String),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySpec {
    File(PathBuf),
    Points(Vec<(String, PathBuf)>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tagging: TaggingMode,
    /// Rule keys in declaration order with their allow-lists.
    pub dep_rules: Vec<(String, Vec<String>)>,
    pub exclude_root: bool,
    pub enable_barrel_less: bool,
    pub encapsulation: Encapsulation,
    pub barrel_file_name: String,
    pub entry: Option<EntrySpec>,
    pub ignore_file_extensions: Option<Vec<String>>,
    pub warn_on_barrel_file_less_module: bool,
    pub tsconfig: Option<PathBuf>,
    pub plugins: Vec<String>,
    pub is_config_file_missing: bool,
}

impl Config {
    /// The configuration used when no config file exists: encapsulation is
    /// checked, dependency rules are not.
    pub fn missing() -> Self {
        Config {
            tagging: TaggingMode::None,
            dep_rules: Vec::new(),
            exclude_root: false,
            enable_barrel_less: false,
            encapsulation: Encapsulation::FolderName(DEFAULT_ENCAPSULATED_FOLDER.to_string()),
            barrel_file_name: DEFAULT_BARREL_FILE.to_string(),
            entry: None,
            ignore_file_extensions: None,
            warn_on_barrel_file_less_module: false,
            tsconfig: None,
            plugins: Vec::new(),
            is_config_file_missing: true,
        }
    }

    /// Validates `raw` and brings it into canonical shape. `source` names the
    /// configuration file in error messages.
    pub fn from_raw(raw: RawConfig, source: &str) -> Result<Self> {
        let invalid = |reason: String| UserError::InvalidConfig { file: source.to_string(), reason };

        let tagging = match (raw.modules, raw.tagging, raw.auto_tagging.unwrap_or(false)) {
            (Some(_), Some(_), _) => return Err(UserError::TaggingAndModules.into()),
            (Some(_), None, true) | (None, Some(_), true) => {
                return Err(UserError::ModulesAndAutoTagging.into());
            }
            (Some(modules), None, false) | (None, Some(modules), false) => {
                let mut rules = Vec::new();
                flatten_modules("", &modules, &mut rules).map_err(invalid)?;
                TaggingMode::Explicit(rules)
            }
            (None, None, true) => TaggingMode::Auto,
            (None, None, false) => return Err(UserError::NoTaggingMode.into()),
        };

        let mut dep_rules = Vec::new();
        for (tag, value) in raw.dep_rules.unwrap_or_default() {
            let allowed = string_or_list(&value)
                .ok_or_else(|| invalid(format!("depRules['{tag}'] must be a string or a list of strings")))?;
            dep_rules.push((tag, allowed));
        }

        let encapsulation =
            match (raw.encapsulated_folder_name_for_barrel_less, raw.encapsulation_pattern) {
                (Some(_), Some(_)) => return Err(UserError::EncapsulationConflict.into()),
                (Some(folder), None) => Encapsulation::FolderName(folder),
                (None, Some(pattern)) => Encapsulation::Pattern(pattern),
                (None, None) => {
                    Encapsulation::FolderName(DEFAULT_ENCAPSULATED_FOLDER.to_string())
                }
            };

        let entry = match (raw.entry_file, raw.entry_points) {
            (Some(_), Some(_)) => return Err(UserError::EntryFileAndEntryPoints.into()),
            (Some(file), None) => Some(EntrySpec::File(PathBuf::from(file))),
            (None, Some(points)) => {
                let mut entries = Vec::new();
                for (name, value) in points {
                    let path = value
                        .as_str()
                        .ok_or_else(|| invalid(format!("entryPoints['{name}'] must be a path")))?;
                    entries.push((name, PathBuf::from(path)));
                }
                Some(EntrySpec::Points(entries))
            }
            (None, None) => None,
        };

        let config = Config {
            tagging,
            dep_rules,
            exclude_root: raw.exclude_root.unwrap_or(false),
            enable_barrel_less: raw.enable_barrel_less.unwrap_or(false),
            encapsulation,
            barrel_file_name: raw.barrel_file_name.unwrap_or_else(|| DEFAULT_BARREL_FILE.into()),
            entry,
            ignore_file_extensions: raw.ignore_file_extensions,
            warn_on_barrel_file_less_module: raw.warn_on_barrel_file_less_module.unwrap_or(false),
            tsconfig: raw.tsconfig.map(PathBuf::from),
            plugins: raw.plugins.unwrap_or_default(),
            is_config_file_missing: false,
        };
        debug!("Normalized configuration from {}: {:?}", source, config.tagging);
        Ok(config)
    }

    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(&strip_jsonc(content)).map_err(|e| {
            UserError::InvalidConfig { file: source.to_string(), reason: e.to_string() }
        })?;
        Self::from_raw(raw, source)
    }
}

pub fn load_config(fs: &dyn FileSystem, root: &Path, path: Option<&Path>) -> Result<Config> {
    let path = join(root, path.unwrap_or(Path::new(CONFIG_FILE)));
    if !fs.is_file(&path) {
        info!("No configuration at {}, checking encapsulation only", path.display());
        return Ok(Config::missing());
    }
    info!("Using configuration {}", path.display());
    let content = fs.read_to_string(&path)?;
    Config::parse(&content, &path.to_string_lossy())
}

fn flatten_modules(
    prefix: &str,
    modules: &Map<String, Value>,
    out: &mut Vec<ModuleRule>,
) -> std::result::Result<(), String> {
    for (key, value) in modules {
        let key = key.trim_matches('/');
        let template = if prefix.is_empty() { key.to_string() } else { format!("{prefix}/{key}") };
        match value {
            Value::Object(nested) => flatten_modules(&template, nested, out)?,
            other => {
                let tags = string_or_list(other).ok_or_else(|| {
                    format!("modules['{template}'] must be a tag, a list of tags or a nested object")
                })?;
                trace!("Module template '{}' -> {:?}", template, tags);
                out.push(ModuleRule { template, tags });
            }
        }
    }
    Ok(())
}

fn string_or_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        _ => None,
    }
}
