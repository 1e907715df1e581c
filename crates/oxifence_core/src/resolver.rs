use anyhow::Result;
use dashmap::DashMap;
use log::{debug, info, trace};
use std::path::{Path, PathBuf};

use crate::{
    constants::{DEFAULT_IGNORED_EXTENSIONS, INDEX_FILES, NODE_BUILTINS, RESOLVE_EXTENSIONS, TSCONFIG_FILE},
    fs::{FileSystem, find_upwards, join},
    tsconfig::{PathAliasTable, load_path_aliases},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    File(PathBuf),
    /// Library import; holds the package name (`@scope/pkg`, `rxjs`, `node:fs`).
    External(String),
    Unresolved,
}

/// Maps import specifiers to files using relative paths, tsconfig aliases,
/// `baseUrl` and `node_modules`.
///
/// Resolution of a given `(directory, specifier)` pair is computed once and
/// memoized, so repeated calls always agree.
pub struct Resolver {
    root: PathBuf,
    aliases: PathAliasTable,
    ignored_extensions: Vec<String>,
    cache: DashMap<(PathBuf, String), Resolution>,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>, aliases: PathAliasTable) -> Self {
        Self {
            root: root.into(),
            aliases,
            ignored_extensions: DEFAULT_IGNORED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            cache: DashMap::new(),
        }
    }

    /// Builds a resolver from the given tsconfig, or the nearest
    /// `tsconfig.json` at or above `root` when none is given.
    pub fn load(fs: &dyn FileSystem, root: &Path, tsconfig: Option<&Path>) -> Result<Self> {
        let tsconfig = match tsconfig {
            Some(p) => Some(join(root, p)),
            None => find_upwards(fs, root, TSCONFIG_FILE),
        };
        let aliases = match &tsconfig {
            Some(path) => {
                info!("Using tsconfig {}", path.display());
                load_path_aliases(fs, path)?
            }
            None => {
                debug!("No tsconfig.json found, resolving relative imports only");
                PathAliasTable::default()
            }
        };
        Ok(Self::new(root, aliases))
    }

    pub fn with_ignored_extensions(mut self, extensions: Vec<String>) -> Self {
        self.ignored_extensions =
            extensions.into_iter().map(|e| e.trim_start_matches('.').to_string()).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn aliases(&self) -> &PathAliasTable {
        &self.aliases
    }

    pub fn is_ignored(&self, specifier: &str) -> bool {
        let path = specifier.split(['?', '#']).next().unwrap_or(specifier);
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.ignored_extensions.iter().any(|i| i == ext))
    }

    pub fn resolve(&self, fs: &dyn FileSystem, specifier: &str, from_file: &Path) -> Resolution {
        let from_dir = from_file.parent().unwrap_or(&self.root).to_path_buf();
        let key = (from_dir, specifier.to_string());
        if let Some(v) = self.cache.get(&key) {
            trace!("Cache hit for resolve: '{}' from {}", specifier, from_file.display());
            return v.clone();
        }

        let resolved = self.resolve_uncached(fs, specifier, &key.0);
        debug!("Resolved '{}' from {} to {:?}", specifier, from_file.display(), resolved);
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, fs: &dyn FileSystem, specifier: &str, from_dir: &Path) -> Resolution {
        if specifier.starts_with('.') || specifier.starts_with('/') {
            trace!("Resolving as relative import: '{}'", specifier);
            return to_resolution(find_source_file(fs, &join(from_dir, Path::new(specifier))));
        }

        if let Some((alias, captured)) = self.aliases.find(specifier) {
            trace!("Matched alias '{}' for request '{}'", alias.pattern, specifier);
            let found = alias.targets.iter().find_map(|target| {
                let candidate = PathBuf::from(target.to_string_lossy().replace('*', captured));
                find_source_file(fs, &candidate)
            });
            return to_resolution(found);
        }

        if let Some(base_url) = &self.aliases.base_url
            && let Some(found) = find_source_file(fs, &join(base_url, Path::new(specifier)))
        {
            trace!("Resolved '{}' through baseUrl", specifier);
            return Resolution::File(found);
        }

        let package = package_name(specifier);
        if specifier.starts_with("node:") || NODE_BUILTINS.contains(&package) {
            return Resolution::External(package.to_string());
        }
        if self.has_node_module(fs, from_dir, package) {
            return Resolution::External(package.to_string());
        }

        trace!("Failed to resolve '{}'", specifier);
        Resolution::Unresolved
    }

    fn has_node_module(&self, fs: &dyn FileSystem, start_dir: &Path, package: &str) -> bool {
        trace!("Walking up from {:?} to find node_modules for '{}'", start_dir, package);
        let mut current = Some(start_dir);
        while let Some(dir) = current {
            if fs.is_dir(&dir.join("node_modules").join(package)) {
                return true;
            }
            if dir == self.root {
                break;
            }
            current = dir.parent();
        }
        false
    }
}

fn to_resolution(found: Option<PathBuf>) -> Resolution {
    found.map_or(Resolution::Unresolved, Resolution::File)
}

fn package_name(specifier: &str) -> &str {
    let mut cut = specifier.match_indices('/').map(|(i, _)| i);
    let end = if specifier.starts_with('@') {
        cut.nth(1)
    } else {
        cut.next()
    };
    &specifier[..end.unwrap_or(specifier.len())]
}

/// Locates the source file behind `p`: the exact file, `p` plus a known
/// extension, or an index file inside directory `p`.
pub fn find_source_file(fs: &dyn FileSystem, p: &Path) -> Option<PathBuf> {
    if fs.is_file(p) {
        return Some(p.to_path_buf());
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{}.{}", p.display(), ext));
        if fs.is_file(&candidate) {
            return Some(candidate);
        }
    }

    for index_file in INDEX_FILES {
        let candidate = p.join(index_file);
        if fs.is_file(&candidate) {
            return Some(candidate);
        }
    }

    None
}
