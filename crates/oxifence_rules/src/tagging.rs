use anyhow::Result;
use log::{debug, trace, warn};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use oxifence_core::{FileSystem, UserError, to_slash};

use crate::{
    config::{Config, ROOT_TAG, TaggingMode},
    template::{PathTemplate, fill},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleType {
    #[serde(rename = "barrel with index")]
    Barrel,
    #[serde(rename = "barrel without index")]
    BarrelLess,
    #[serde(rename = "root")]
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub id: usize,
    pub path: PathBuf,
    /// Root-relative directory with `/` separators, `.` for the root module.
    pub name: String,
    pub tags: Vec<String>,
    pub module_type: ModuleType,
    pub barrel: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ModuleTable {
    root_dir: PathBuf,
    modules: Vec<ModuleInfo>,
    by_dir: HashMap<PathBuf, usize>,
}

struct CompiledRule {
    template: PathTemplate,
    tags: Vec<String>,
}

impl ModuleTable {
    /// Assigns modules and tags for the directories holding `files`.
    ///
    /// `entry_file` never turns its directory into a barrel module, even when
    /// it is named like a barrel.
    pub fn build<'a>(
        fs: &dyn FileSystem,
        config: &Config,
        root_dir: &Path,
        entry_file: &Path,
        files: impl IntoIterator<Item = &'a Path>,
    ) -> Result<Self> {
        let rules = match &config.tagging {
            TaggingMode::Explicit(rules) => rules
                .iter()
                .map(|r| {
                    Ok(CompiledRule { template: PathTemplate::parse(&r.template)?, tags: r.tags.clone() })
                })
                .collect::<Result<Vec<_>>>()?,
            TaggingMode::Auto | TaggingMode::None => Vec::new(),
        };

        // directory -> first file seen below it, for error messages
        let mut candidates: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        for file in files {
            let mut dir = file.parent();
            while let Some(d) = dir {
                if d == root_dir || !d.starts_with(root_dir) {
                    break;
                }
                candidates.entry(d.to_path_buf()).or_insert_with(|| file.to_path_buf());
                dir = d.parent();
            }
        }
        trace!("{} candidate module directories", candidates.len());

        let mut table = ModuleTable {
            root_dir: root_dir.to_path_buf(),
            modules: vec![ModuleInfo {
                id: 0,
                path: root_dir.to_path_buf(),
                name: ".".to_string(),
                tags: vec![ROOT_TAG.to_string()],
                module_type: ModuleType::Root,
                barrel: None,
            }],
            by_dir: HashMap::new(),
        };

        for (dir, sample_file) in candidates {
            let name = to_slash(root_dir, &dir);
            let barrel_path = dir.join(&config.barrel_file_name);
            let barrel = (fs.is_file(&barrel_path) && barrel_path != entry_file).then_some(barrel_path);

            let tags = match &config.tagging {
                TaggingMode::Explicit(_) => match best_rule(&rules, &name) {
                    Some((rule, captures)) => {
                        let mut tags = Vec::with_capacity(rule.tags.len());
                        for tag in &rule.tags {
                            let filled = fill(tag, &captures).map_err(|placeholder| {
                                UserError::PlaceholderNotFound {
                                    placeholder,
                                    tag: tag.clone(),
                                    template: rule.template.as_str().to_string(),
                                    file: to_slash(root_dir, &sample_file),
                                }
                            })?;
                            tags.push(filled);
                        }
                        tags
                    }
                    None if barrel.is_some() => {
                        return Err(UserError::NoAssignedTag { directory: name }.into());
                    }
                    None => continue,
                },
                TaggingMode::Auto if barrel.is_some() => vec![name.clone()],
                TaggingMode::None if barrel.is_some() => Vec::new(),
                TaggingMode::Auto | TaggingMode::None => continue,
            };

            let module_type = if barrel.is_some() { ModuleType::Barrel } else { ModuleType::BarrelLess };
            if module_type == ModuleType::BarrelLess
                && !config.enable_barrel_less
                && config.warn_on_barrel_file_less_module
            {
                warn!("Module {} has no {}; nothing in it can be imported", name, config.barrel_file_name);
            }

            debug!("Module {} ({:?}) tagged {:?}", name, module_type, tags);
            let id = table.modules.len();
            table.by_dir.insert(dir.clone(), id);
            table.modules.push(ModuleInfo { id, path: dir, name, tags, module_type, barrel });
        }

        debug!("Assigned {} modules under {}", table.modules.len() - 1, root_dir.display());
        Ok(table)
    }

    pub fn root(&self) -> &ModuleInfo {
        &self.modules[0]
    }

    /// The deepest module enclosing `file`.
    pub fn module_of(&self, file: &Path) -> &ModuleInfo {
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == self.root_dir {
                break;
            }
            if let Some(id) = self.by_dir.get(d) {
                return &self.modules[*id];
            }
            dir = d.parent();
        }
        self.root()
    }

    pub fn module(&self, dir: &Path) -> Option<&ModuleInfo> {
        self.by_dir.get(dir).map(|id| &self.modules[*id])
    }

    /// All modules, the root module first.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Most specific matching rule; on equal specificity the first declared wins.
fn best_rule<'r>(
    rules: &'r [CompiledRule],
    dir: &str,
) -> Option<(&'r CompiledRule, crate::template::Captures)> {
    let mut best: Option<(&CompiledRule, crate::template::Captures)> = None;
    for rule in rules {
        if let Some(captures) = rule.template.matches(dir) {
            let better = best
                .as_ref()
                .is_none_or(|(b, _)| rule.template.specificity() > b.template.specificity());
            if better {
                best = Some((rule, captures));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ModuleRule};
    use oxifence_core::{MemoryFileSystem, user_error};

    fn explicit(rules: &[(&str, &[&str])]) -> Config {
        let mut config = Config::missing();
        config.is_config_file_missing = false;
        config.tagging = TaggingMode::Explicit(
            rules
                .iter()
                .map(|(t, tags)| ModuleRule {
                    template: t.to_string(),
                    tags: tags.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
        );
        config
    }

    fn project() -> MemoryFileSystem {
        MemoryFileSystem::new("/p")
            .with_file("src/main.ts", "")
            .with_file("src/app/app.component.ts", "")
            .with_file("src/app/customers/index.ts", "")
            .with_file("src/app/customers/data/customer.ts", "")
            .with_file("src/app/holidays/index.ts", "")
            .with_file("src/app/holidays/holiday.ts", "")
            .with_file("src/app/shared/ui/index.ts", "")
            .with_file("src/app/shared/ui/button.ts", "")
    }

    const FILES: &[&str] = &[
        "/p/src/main.ts",
        "/p/src/app/app.component.ts",
        "/p/src/app/customers/index.ts",
        "/p/src/app/customers/data/customer.ts",
        "/p/src/app/holidays/index.ts",
        "/p/src/app/holidays/holiday.ts",
        "/p/src/app/shared/ui/index.ts",
        "/p/src/app/shared/ui/button.ts",
    ];

    fn build(config: &Config) -> Result<ModuleTable> {
        ModuleTable::build(
            &project(),
            config,
            Path::new("/p"),
            Path::new("/p/src/main.ts"),
            FILES.iter().map(Path::new),
        )
    }

    #[test]
    fn test_explicit_templates_with_placeholders() {
        let config = explicit(&[
            ("src/app/<domain>", &["domain:<domain>"]),
            ("src/app/shared/<type>", &["shared", "type:<type>"]),
        ]);
        let table = build(&config).unwrap();

        let customer = table.module_of(Path::new("/p/src/app/customers/data/customer.ts"));
        assert_eq!(customer.name, "src/app/customers");
        assert_eq!(customer.tags, vec!["domain:customers"]);
        assert_eq!(customer.module_type, ModuleType::Barrel);

        let button = table.module_of(Path::new("/p/src/app/shared/ui/button.ts"));
        assert_eq!(button.name, "src/app/shared/ui");
        assert_eq!(button.tags, vec!["shared", "type:ui"]);

        // src/app/shared matches src/app/<domain> but has no files of its own
        let shared = table.module(Path::new("/p/src/app/shared")).unwrap();
        assert_eq!(shared.tags, vec!["domain:shared"]);
        assert_eq!(shared.module_type, ModuleType::BarrelLess);
    }

    #[test]
    fn test_files_outside_modules_belong_to_root() {
        let config = explicit(&[
            ("src/app/<domain>", &["domain:<domain>"]),
            ("src/app/shared/<type>", &["type:<type>"]),
        ]);
        let table = build(&config).unwrap();
        let root = table.module_of(Path::new("/p/src/main.ts"));
        assert_eq!(root.module_type, ModuleType::Root);
        assert_eq!(root.tags, vec!["root"]);
        assert_eq!(table.module_of(Path::new("/p/src/app/app.component.ts")).id, root.id);
    }

    #[test]
    fn test_most_specific_template_wins() {
        let config = explicit(&[
            ("src/app/<domain>", &["domain:<domain>"]),
            ("src/app/holidays", &["holidays"]),
            ("src/app/shared/<type>", &["type:<type>"]),
            ("src/app/shared/ui", &["ui"]),
        ]);
        let table = build(&config).unwrap();
        assert_eq!(table.module(Path::new("/p/src/app/holidays")).unwrap().tags, vec!["holidays"]);
        assert_eq!(table.module(Path::new("/p/src/app/shared/ui")).unwrap().tags, vec!["ui"]);
    }

    #[test]
    fn test_equal_specificity_first_declared_wins() {
        // both have two literal segments and twelve literal characters
        let config = explicit(&[
            ("src/<area>/customers", &["first"]),
            ("<top>/app/customers", &["second"]),
            ("src/app/<name>", &["other"]),
            ("src/app/shared/<type>", &["type:<type>"]),
        ]);
        let table = build(&config).unwrap();
        assert_eq!(table.module(Path::new("/p/src/app/customers")).unwrap().tags, vec!["first"]);
        assert_eq!(table.module(Path::new("/p/src/app/holidays")).unwrap().tags, vec!["other"]);
    }

    #[test]
    fn test_barrel_without_template_is_fatal() {
        let config = explicit(&[("src/app/customers", &["customers"])]);
        let err = build(&config).unwrap_err();
        let user = user_error(&err).unwrap();
        assert_eq!(user.code(), "OXF-003");
        assert!(user.to_string().contains("src/app/holidays"));
    }

    #[test]
    fn test_unknown_placeholder_in_tag_is_fatal() {
        let config = explicit(&[
            ("src/app/<domain>", &["domain:<domain>", "type:<type>"]),
            ("src/app/shared/<type>", &["shared"]),
        ]);
        let err = build(&config).unwrap_err();
        let user = user_error(&err).unwrap();
        assert_eq!(user.code(), "OXF-008");
        let message = user.to_string();
        assert!(message.contains("<type>"));
        assert!(message.contains("src/app/customers"));
    }

    #[test]
    fn test_auto_tagging_uses_directory_path() {
        let mut config = Config::missing();
        config.tagging = TaggingMode::Auto;
        let table = build(&config).unwrap();
        let tags: Vec<_> = table.iter().map(|m| m.tags.join(",")).collect();
        assert_eq!(tags, vec!["root", "src/app/customers", "src/app/holidays", "src/app/shared/ui"]);
        // data/ has no barrel, so it is part of customers
        assert_eq!(
            table.module_of(Path::new("/p/src/app/customers/data/customer.ts")).name,
            "src/app/customers"
        );
    }

    #[test]
    fn test_entry_named_like_barrel_is_not_a_module() {
        let fs = MemoryFileSystem::new("/p")
            .with_file("src/index.ts", "")
            .with_file("src/lib/index.ts", "");
        let mut config = Config::missing();
        config.tagging = TaggingMode::Auto;
        let table = ModuleTable::build(
            &fs,
            &config,
            Path::new("/p"),
            Path::new("/p/src/index.ts"),
            [Path::new("/p/src/index.ts"), Path::new("/p/src/lib/index.ts")],
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.module_of(Path::new("/p/src/index.ts")).module_type, ModuleType::Root);
    }
}
