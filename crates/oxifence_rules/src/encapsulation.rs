use anyhow::Result;
use log::{debug, trace};
use std::path::Path;

use oxifence_core::{UserError, to_slash};

use crate::{
    config::{Config, Encapsulation},
    project::ProjectInfo,
    tagging::{ModuleInfo, ModuleType},
};

/// Which files of a barrel-less module are private.
#[derive(Debug, Clone)]
pub enum EncapsulationPolicy {
    /// Everything inside this folder directly beneath the module directory.
    Folder(String),
    /// Everything whose module-relative path matches the glob.
    Pattern(glob::Pattern),
}

impl EncapsulationPolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.encapsulation {
            Encapsulation::FolderName(name) => Ok(Self::Folder(name.trim_matches('/').to_string())),
            Encapsulation::Pattern(pattern) => {
                let compiled = glob::Pattern::new(pattern).map_err(|e| UserError::InvalidConfig {
                    file: "encapsulationPattern".to_string(),
                    reason: format!("'{pattern}' is not a valid glob: {e}"),
                })?;
                Ok(Self::Pattern(compiled))
            }
        }
    }

    /// `relative` is the file's path inside its module, `/`-separated.
    pub fn is_encapsulated(&self, relative: &str) -> bool {
        match self {
            Self::Folder(name) => {
                relative.split('/').next().is_some_and(|first| first == name)
                    && relative.contains('/')
            }
            Self::Pattern(pattern) => {
                pattern.matches(relative)
                    || relative
                        .rsplit_once('/')
                        .is_some_and(|(dir, _)| dir_matches(pattern, dir))
            }
        }
    }
}

// `internal` and `internal/**` should both cover every file below the folder.
fn dir_matches(pattern: &glob::Pattern, dir: &str) -> bool {
    let mut current = Some(dir);
    while let Some(d) = current {
        if pattern.matches(d) {
            return true;
        }
        current = d.rsplit_once('/').map(|(parent, _)| parent);
    }
    false
}

/// Whether `target`, owned by `module`, may be imported from outside it.
fn is_public(target: &Path, module: &ModuleInfo, config: &Config, policy: &EncapsulationPolicy) -> bool {
    match module.module_type {
        ModuleType::Root => true,
        ModuleType::Barrel => module.barrel.as_deref() == Some(target),
        ModuleType::BarrelLess if config.enable_barrel_less => {
            !policy.is_encapsulated(&to_slash(&module.path, target))
        }
        ModuleType::BarrelLess => false,
    }
}

/// Raw import strings of `file_path` that reach into another module's
/// internals. Same-module, external and unresolved imports never count.
pub fn check_encapsulation_violations(file_path: &Path, project: &ProjectInfo) -> Vec<String> {
    let Some(file) = project.graph.file(file_path) else {
        trace!("{} is not part of the graph", file_path.display());
        return Vec::new();
    };
    let from = project.modules.module_of(&file.path);

    let mut violations = Vec::new();
    for (raw, target) in file.resolved_imports() {
        let target_path = &project.graph.get(target).path;
        let to = project.modules.module_of(target_path);
        if to.id == from.id {
            continue;
        }
        if !is_public(target_path, to, &project.config, &project.encapsulation) {
            debug!("{} reaches into {} with '{}'", from.name, to.name, raw);
            violations.push(raw.to_string());
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxifence_core::user_error;

    fn folder(name: &str) -> EncapsulationPolicy {
        EncapsulationPolicy::Folder(name.to_string())
    }

    fn pattern(p: &str) -> EncapsulationPolicy {
        let mut config = Config::missing();
        config.encapsulation = Encapsulation::Pattern(p.to_string());
        EncapsulationPolicy::from_config(&config).unwrap()
    }

    #[test]
    fn test_folder_policy() {
        let policy = folder("internal");
        assert!(policy.is_encapsulated("internal/helper.ts"));
        assert!(policy.is_encapsulated("internal/deep/helper.ts"));
        assert!(!policy.is_encapsulated("public.ts"));
        assert!(!policy.is_encapsulated("feature/internal/helper.ts"));
        // a file merely called like the folder is not inside it
        assert!(!policy.is_encapsulated("internal"));
    }

    #[test]
    fn test_pattern_policy() {
        let policy = pattern("private/**");
        assert!(policy.is_encapsulated("private/a.ts"));
        assert!(policy.is_encapsulated("private/nested/a.ts"));
        assert!(!policy.is_encapsulated("public/a.ts"));

        let by_name = pattern("*.internal.ts");
        assert!(by_name.is_encapsulated("state.internal.ts"));
        assert!(!by_name.is_encapsulated("state.ts"));

        let bare_dir = pattern("impl");
        assert!(bare_dir.is_encapsulated("impl/a/b.ts"));
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let mut config = Config::missing();
        config.encapsulation = Encapsulation::Pattern("[".to_string());
        let err = EncapsulationPolicy::from_config(&config).unwrap_err();
        assert_eq!(user_error(&err).unwrap().code(), "OXF-013");
    }
}
