use anyhow::Result;
use log::{debug, info, trace, warn};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use crate::{
    fs::FileSystem,
    parser::{ImportCache, imports_for},
    resolver::{Resolution, Resolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    File(FileId),
    External(String),
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// The specifier exactly as written in the source.
    pub raw: String,
    pub target: ImportTarget,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub id: FileId,
    pub path: PathBuf,
    pub imports: Vec<Import>,
}

impl FileInfo {
    pub fn resolved_imports(&self) -> impl Iterator<Item = (&str, FileId)> {
        self.imports.iter().filter_map(|i| match i.target {
            ImportTarget::File(id) => Some((i.raw.as_str(), id)),
            _ => None,
        })
    }

    pub fn unresolved_imports(&self) -> impl Iterator<Item = &str> {
        self.imports
            .iter()
            .filter(|i| i.target == ImportTarget::Unresolved)
            .map(|i| i.raw.as_str())
    }

    pub fn external_imports(&self) -> impl Iterator<Item = &str> {
        self.imports.iter().filter_map(|i| match &i.target {
            ImportTarget::External(pkg) => Some(pkg.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ImportGraph {
    files: Vec<FileInfo>,
    index: HashMap<PathBuf, FileId>,
    root: FileId,
}

impl ImportGraph {
    /// Discovers every file reachable from `entry`, depth first. Each file is
    /// parsed and each of its imports classified exactly once.
    pub fn build(
        fs: &dyn FileSystem,
        resolver: &Resolver,
        entry: &Path,
        import_cache: &ImportCache,
    ) -> Result<Self> {
        info!("Building import graph from {}", entry.display());
        let mut graph =
            ImportGraph { files: Vec::new(), index: HashMap::new(), root: FileId(0) };
        graph.root = graph.intern(entry);

        // The entry itself has to be readable; everything below it is best effort.
        fs.read_to_string(entry)?;

        let mut stack = vec![graph.root];
        let mut visited: HashSet<FileId> = HashSet::new();
        while let Some(cur) = stack.pop() {
            if !visited.insert(cur) {
                continue;
            }
            let path = graph.files[cur.0].path.clone();
            trace!("Visiting file: {}", path.display());

            let specs = match imports_for(fs, &path, import_cache) {
                Ok(specs) => specs,
                Err(e) => {
                    warn!("Error parsing imports for {}: {}", path.display(), e);
                    Vec::new()
                }
            };

            let mut imports = Vec::with_capacity(specs.len());
            let mut discovered = Vec::new();
            for raw in specs {
                if resolver.is_ignored(&raw) {
                    trace!("Ignoring asset import '{}'", raw);
                    continue;
                }
                let target = match resolver.resolve(fs, &raw, &path) {
                    Resolution::File(p) => {
                        let id = graph.intern(&p);
                        if !visited.contains(&id) {
                            discovered.push(id);
                        }
                        ImportTarget::File(id)
                    }
                    Resolution::External(pkg) => ImportTarget::External(pkg),
                    Resolution::Unresolved => ImportTarget::Unresolved,
                };
                imports.push(Import { raw, target });
            }
            graph.files[cur.0].imports = imports;

            // reversed so the first import is explored first
            stack.extend(discovered.into_iter().rev());
        }

        debug!("Import graph from {} has {} files", entry.display(), graph.files.len());
        Ok(graph)
    }

    fn intern(&mut self, path: &Path) -> FileId {
        if let Some(id) = self.index.get(path) {
            return *id;
        }
        let id = FileId(self.files.len());
        self.files.push(FileInfo { id, path: path.to_path_buf(), imports: Vec::new() });
        self.index.insert(path.to_path_buf(), id);
        id
    }

    pub fn root(&self) -> &FileInfo {
        &self.files[self.root.0]
    }

    pub fn get(&self, id: FileId) -> &FileInfo {
        &self.files[id.0]
    }

    pub fn file(&self, path: &Path) -> Option<&FileInfo> {
        self.index.get(path).map(|id| &self.files[id.0])
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = (&FileInfo, &str)> {
        self.files.iter().flat_map(|f| f.unresolved_imports().map(move |raw| (f, raw)))
    }
}

/// Lazy depth-first walk over every file reachable from the graph root.
/// Each call starts a fresh walk; no file is yielded twice, so cycles
/// terminate.
pub fn traverse_all_files(graph: &ImportGraph) -> Traversal<'_> {
    Traversal { graph, stack: vec![graph.root], seen: HashSet::new() }
}

pub struct Traversal<'a> {
    graph: &'a ImportGraph,
    stack: Vec<FileId>,
    seen: HashSet<FileId>,
}

impl<'a> Iterator for Traversal<'a> {
    type Item = &'a FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if !self.seen.insert(id) {
                continue;
            }
            let file = self.graph.get(id);
            let children: Vec<FileId> = file
                .resolved_imports()
                .map(|(_, child)| child)
                .filter(|child| !self.seen.contains(child))
                .collect();
            self.stack.extend(children.into_iter().rev());
            return Some(file);
        }
        None
    }
}
