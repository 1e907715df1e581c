use anyhow::{Context, Result, anyhow};
use ignore::WalkBuilder;
use log::{debug, trace};
use path_clean::clean;
use std::{
    collections::{BTreeMap, BTreeSet},
    env, fs,
    path::{Component, Path, PathBuf},
};

use crate::constants::JS_TS_EXTENSIONS;

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn cwd(&self) -> Result<PathBuf>;

    /// Every TS/JS source below `root`, sorted, skipping `node_modules`.
    fn source_files(&self, root: &Path) -> Result<Vec<PathBuf>>;

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn cwd(&self) -> Result<PathBuf> {
        Ok(env::current_dir()?)
    }

    fn source_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        debug!("Walking directory tree from root: {}", root.display());
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .filter_entry(|e| e.file_name() != "node_modules")
            .build();

        let mut files = Vec::new();
        for res in walker {
            let dent = res?;
            let p = dent.path();
            if dent.file_type().is_some_and(|t| t.is_file()) && is_source_file(p) {
                trace!("Found source file: {}", p.display());
                files.push(p.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// In-memory tree keyed by absolute path. Directories exist implicitly as
/// ancestors of the stored files.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    cwd: PathBuf,
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryFileSystem {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into(), files: BTreeMap::new(), dirs: BTreeSet::new() }
    }

    /// Adds a file; relative paths are taken from the working directory.
    pub fn with_file(mut self, path: impl AsRef<Path>, content: &str) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: &str) {
        let path = join(&self.cwd, path.as_ref());
        let mut dir = path.parent();
        while let Some(d) = dir {
            if !self.dirs.insert(d.to_path_buf()) {
                break;
            }
            dir = d.parent();
        }
        self.files.insert(path, content.to_string());
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files.get(path).cloned().ok_or_else(|| anyhow!("Failed to read {}", path.display()))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn cwd(&self) -> Result<PathBuf> {
        Ok(self.cwd.clone())
    }

    fn source_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        Ok(self
            .files
            .keys()
            .filter(|p| p.starts_with(root) && is_source_file(p))
            .filter(|p| !p.components().any(|c| c.as_os_str() == "node_modules"))
            .cloned()
            .collect())
    }
}

fn is_source_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|ext| JS_TS_EXTENSIONS.contains(&ext))
}

pub fn join(base: &Path, path: &Path) -> PathBuf {
    PathBuf::from(clean(base.join(path).to_string_lossy().to_string()))
}

pub fn find_upwards(fs: &dyn FileSystem, start: &Path, name: &str) -> Option<PathBuf> {
    debug!("Searching for {} from {}", name, start.display());
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(name);
        trace!("Checking for {} at: {:?}", name, candidate);
        if fs.is_file(&candidate) {
            debug!("Found {} at {}", name, candidate.display());
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

/// Create a relative path from `base` to `target`
pub fn relative_path(base: &Path, target: &Path) -> Option<PathBuf> {
    let mut target_components = target.components().peekable();
    let mut base_components = base.components().peekable();

    let mut shared = 0;
    while let (Some(t), Some(b)) = (target_components.peek(), base_components.peek()) {
        if t != b {
            break;
        }
        target_components.next();
        base_components.next();
        shared += 1;
    }

    if shared == 0 && target.has_root() != base.has_root() {
        return None;
    }

    let mut result = PathBuf::new();
    for _ in base_components {
        result.push("..");
    }
    for component in target_components {
        match component {
            Component::Normal(p) => result.push(p),
            Component::ParentDir => result.push(".."),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if result.as_os_str().is_empty() { Some(PathBuf::from(".")) } else { Some(result) }
}

pub fn to_slash(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
