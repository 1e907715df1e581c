use anyhow::Result;
use log::{debug, info};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use oxifence_core::{
    FileSystem, ImportCache, ImportGraph, Resolver, UserError, join, to_slash, traverse_all_files,
};

use crate::{
    config::{CONFIG_FILE, Config, EntrySpec, load_config},
    dep_rules::DependencyRules,
    encapsulation::EncapsulationPolicy,
    tagging::{ModuleTable, ModuleType},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// The `entryPoints` key, if the entry came from there.
    pub name: Option<String>,
    pub file: PathBuf,
}

pub struct ProjectInfo {
    pub config: Arc<Config>,
    pub root_dir: PathBuf,
    pub entry: EntryPoint,
    pub graph: ImportGraph,
    pub modules: ModuleTable,
    pub rules: Arc<DependencyRules>,
    pub encapsulation: Arc<EncapsulationPolicy>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectDataOptions {
    pub include_external_libraries: bool,
    /// Classify every source file under the root without parsing anything.
    pub skip_import_resolution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub module: String,
    pub module_type: ModuleType,
    pub tags: Vec<String>,
    /// Root-relative paths of the resolved imports.
    pub imports: Vec<String>,
    pub unresolved_imports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_libraries: Option<Vec<String>>,
}

pub type ProjectData = BTreeMap<String, FileData>;

/// Shared state for analysing the entry points of one project. Parse and
/// resolution caches are reused across entry points; visited-state is not.
pub struct Analyzer<'fs> {
    fs: &'fs dyn FileSystem,
    config: Arc<Config>,
    root_dir: PathBuf,
    resolver: Resolver,
    import_cache: ImportCache,
    rules: Arc<DependencyRules>,
    encapsulation: Arc<EncapsulationPolicy>,
}

impl<'fs> Analyzer<'fs> {
    pub fn new(fs: &'fs dyn FileSystem, config: Config, root_dir: &Path) -> Result<Self> {
        let mut resolver = Resolver::load(fs, root_dir, config.tsconfig.as_deref())?;
        if let Some(extensions) = &config.ignore_file_extensions {
            resolver = resolver.with_ignored_extensions(extensions.clone());
        }
        let rules = DependencyRules::compile(&config.dep_rules)?;
        let encapsulation = EncapsulationPolicy::from_config(&config)?;

        Ok(Self {
            fs,
            config: Arc::new(config),
            root_dir: root_dir.to_path_buf(),
            resolver,
            import_cache: ImportCache::new(),
            rules: Arc::new(rules),
            encapsulation: Arc::new(encapsulation),
        })
    }

    pub fn load(fs: &'fs dyn FileSystem, root_dir: &Path, config_path: Option<&Path>) -> Result<Self> {
        let config = load_config(fs, root_dir, config_path)?;
        Self::new(fs, config, root_dir)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The entry points to analyse. `requested` is an `entryPoints` key or a
    /// path relative to the root; without it every configured entry is used.
    pub fn entries(&self, requested: Option<&str>) -> Result<Vec<EntryPoint>> {
        let configured = match &self.config.entry {
            Some(EntrySpec::File(file)) => {
                vec![EntryPoint { name: None, file: join(&self.root_dir, file) }]
            }
            Some(EntrySpec::Points(points)) => points
                .iter()
                .map(|(name, file)| EntryPoint {
                    name: Some(name.clone()),
                    file: join(&self.root_dir, file),
                })
                .collect(),
            None => Vec::new(),
        };

        let Some(requested) = requested else {
            if configured.is_empty() {
                return Err(UserError::MissingEntry.into());
            }
            return Ok(configured);
        };

        if let Some(entry) = configured.iter().find(|e| e.name.as_deref() == Some(requested)) {
            return Ok(vec![entry.clone()]);
        }
        let file = join(&self.root_dir, Path::new(requested));
        if !self.fs.is_file(&file) && matches!(self.config.entry, Some(EntrySpec::Points(_))) {
            return Err(UserError::InvalidConfig {
                file: CONFIG_FILE.to_string(),
                reason: format!("'{requested}' is neither an entry point nor a file"),
            }
            .into());
        }
        Ok(vec![EntryPoint { name: None, file }])
    }

    /// Builds the import graph of `entry` and tags every file in it. Fails on
    /// configuration errors only; unresolved imports are part of the result.
    pub fn build_project_info(&self, entry: &EntryPoint) -> Result<ProjectInfo> {
        info!("Analysing entry {}", entry.file.display());
        let graph = ImportGraph::build(self.fs, &self.resolver, &entry.file, &self.import_cache)?;
        let modules = ModuleTable::build(
            self.fs,
            &self.config,
            &self.root_dir,
            &entry.file,
            graph.files().map(|f| f.path.as_path()),
        )?;

        Ok(ProjectInfo {
            config: Arc::clone(&self.config),
            root_dir: self.root_dir.clone(),
            entry: entry.clone(),
            graph,
            modules,
            rules: Arc::clone(&self.rules),
            encapsulation: Arc::clone(&self.encapsulation),
        })
    }

    /// Module, type, tags and imports of every file reachable from `entry`,
    /// or of every source file under the root with `skip_import_resolution`.
    pub fn get_project_data(&self, entry: &EntryPoint, options: ProjectDataOptions) -> Result<ProjectData> {
        let mut data = ProjectData::new();

        if options.skip_import_resolution {
            let files = self.fs.source_files(&self.root_dir)?;
            debug!("Classifying {} files without resolving imports", files.len());
            let modules = ModuleTable::build(
                self.fs,
                &self.config,
                &self.root_dir,
                &entry.file,
                files.iter().map(PathBuf::as_path),
            )?;
            for file in &files {
                let module = modules.module_of(file);
                data.insert(
                    to_slash(&self.root_dir, file),
                    FileData {
                        module: module.name.clone(),
                        module_type: module.module_type,
                        tags: module.tags.clone(),
                        imports: Vec::new(),
                        unresolved_imports: Vec::new(),
                        external_libraries: options.include_external_libraries.then(Vec::new),
                    },
                );
            }
            return Ok(data);
        }

        let project = self.build_project_info(entry)?;
        for file in traverse_all_files(&project.graph) {
            let module = project.modules.module_of(&file.path);
            let imports = file
                .resolved_imports()
                .map(|(_, id)| to_slash(&self.root_dir, &project.graph.get(id).path))
                .collect();
            let external_libraries = options.include_external_libraries.then(|| {
                let mut seen = HashSet::new();
                file.external_imports().filter(|lib| seen.insert(*lib)).map(str::to_string).collect()
            });
            data.insert(
                to_slash(&self.root_dir, &file.path),
                FileData {
                    module: module.name.clone(),
                    module_type: module.module_type,
                    tags: module.tags.clone(),
                    imports,
                    unresolved_imports: file.unresolved_imports().map(str::to_string).collect(),
                    external_libraries,
                },
            );
        }
        Ok(data)
    }
}

pub fn build_project_info(fs: &dyn FileSystem, root_dir: &Path, entry_file: &Path) -> Result<ProjectInfo> {
    let analyzer = Analyzer::load(fs, root_dir, None)?;
    analyzer.build_project_info(&EntryPoint { name: None, file: join(root_dir, entry_file) })
}
