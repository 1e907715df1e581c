use anyhow::{Context, Result};
use log::{debug, trace};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{
    error::UserError,
    fs::{FileSystem, join},
    resolver::find_source_file,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlias {
    pub pattern: String,
    pub targets: Vec<PathBuf>,
}

impl PathAlias {
    fn prefix(&self) -> &str {
        self.pattern.split('*').next().unwrap_or(&self.pattern)
    }

    fn is_wildcard(&self) -> bool {
        self.pattern.contains('*')
    }

    /// Text captured by the wildcard, or `""` for an exact match.
    pub fn matches<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        match self.pattern.split_once('*') {
            Some((prefix, suffix)) => specifier
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
                .filter(|captured| !captured.is_empty() || specifier.len() == prefix.len()),
            None if self.pattern == specifier => Some(""),
            None => None,
        }
    }
}

/// Aliases merged along the `extends` chain, ordered for matching: exact
/// patterns first, then wildcard patterns by descending prefix length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathAliasTable {
    aliases: Vec<PathAlias>,
    pub base_url: Option<PathBuf>,
}

impl PathAliasTable {
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathAlias> {
        self.aliases.iter()
    }

    pub fn find<'s>(&self, specifier: &'s str) -> Option<(&PathAlias, &'s str)> {
        self.aliases.iter().find_map(|alias| alias.matches(specifier).map(|m| (alias, m)))
    }

    fn sort(&mut self) {
        // stable: among equal prefixes the declaration order is kept
        self.aliases.sort_by(|a, b| {
            a.is_wildcard().cmp(&b.is_wildcard()).then(b.prefix().len().cmp(&a.prefix().len()))
        });
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    extends: Option<Extends>,
    compiler_options: Option<RawCompilerOptions>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompilerOptions {
    base_url: Option<String>,
    paths: Option<serde_json::Map<String, serde_json::Value>>,
}

/// `paths` entry before anchoring, with the directory of the declaring config.
struct DeclaredAlias {
    pattern: String,
    targets: Vec<String>,
    dir: PathBuf,
}

#[derive(Default)]
struct MergedConfig {
    aliases: Vec<DeclaredAlias>,
    base_url: Option<PathBuf>,
    chain: Vec<PathBuf>,
}

/// Loads `tsconfig_path` and everything it extends into a validated alias
/// table. Every alias target must exist.
///
/// Targets are anchored once the whole chain is merged: at the effective
/// `baseUrl` when any config sets one, else at the declaring config's directory.
pub fn load_path_aliases(fs: &dyn FileSystem, tsconfig_path: &Path) -> Result<PathAliasTable> {
    debug!("Reading tsconfig paths from {}", tsconfig_path.display());
    let mut merged = MergedConfig::default();
    merge_config(fs, tsconfig_path, &mut merged)?;

    let mut table = PathAliasTable { aliases: Vec::new(), base_url: merged.base_url };
    for declared in merged.aliases {
        let anchor = table.base_url.as_deref().unwrap_or(&declared.dir);
        let targets: Vec<PathBuf> =
            declared.targets.iter().map(|t| join(anchor, Path::new(t))).collect();
        for target in &targets {
            if !target_exists(fs, target) {
                return Err(UserError::InvalidPath {
                    alias: declared.pattern.clone(),
                    target: target.clone(),
                    config: tsconfig_path.to_path_buf(),
                }
                .into());
            }
        }
        trace!("Found tsconfig path alias: '{}' -> {:?}", declared.pattern, targets);
        table.aliases.push(PathAlias { pattern: declared.pattern, targets });
    }

    table.sort();
    debug!("Loaded {} tsconfig path aliases", table.len());
    Ok(table)
}

fn merge_config(fs: &dyn FileSystem, path: &Path, merged: &mut MergedConfig) -> Result<()> {
    if merged.chain.iter().any(|p| p == path) {
        trace!("Skipping already merged tsconfig {}", path.display());
        return Ok(());
    }
    merged.chain.push(path.to_path_buf());

    let content = fs.read_to_string(path)?;
    let raw: RawTsConfig = serde_json::from_str(&strip_jsonc(&content))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let dir = path.parent().unwrap_or(Path::new("/"));

    let parents = match raw.extends {
        Some(Extends::One(p)) => vec![p],
        Some(Extends::Many(ps)) => ps,
        None => vec![],
    };
    for parent in parents {
        let parent_path = resolve_extends(fs, dir, &parent).ok_or_else(|| {
            UserError::UnresolvedExtends { target: parent.clone(), config: path.to_path_buf() }
        })?;
        trace!("{} extends {}", path.display(), parent_path.display());
        merge_config(fs, &parent_path, merged)?;
    }

    let Some(options) = raw.compiler_options else {
        return Ok(());
    };
    if let Some(base_url) = &options.base_url {
        merged.base_url = Some(join(dir, Path::new(base_url)));
    }

    for (pattern, targets) in options.paths.unwrap_or_default() {
        let targets: Vec<String> = targets
            .as_array()
            .map(|arr| arr.iter().filter_map(|t| t.as_str()).map(str::to_string).collect())
            .unwrap_or_default();
        if targets.is_empty() {
            continue;
        }
        // later configs in the chain override earlier ones key by key
        match merged.aliases.iter_mut().find(|a| a.pattern == pattern) {
            Some(existing) => {
                existing.targets = targets;
                existing.dir = dir.to_path_buf();
            }
            None => merged.aliases.push(DeclaredAlias { pattern, targets, dir: dir.to_path_buf() }),
        }
    }
    Ok(())
}

fn resolve_extends(fs: &dyn FileSystem, dir: &Path, target: &str) -> Option<PathBuf> {
    let with_json = |p: PathBuf| {
        if fs.is_file(&p) {
            return Some(p);
        }
        let json = PathBuf::from(format!("{}.json", p.display()));
        fs.is_file(&json).then_some(json)
    };

    if target.starts_with('.') || Path::new(target).is_absolute() {
        return with_json(join(dir, Path::new(target)));
    }

    // package config, e.g. "@tsconfig/strictest/tsconfig.json"
    let mut current = Some(dir);
    while let Some(d) = current {
        let candidate = d.join("node_modules").join(target);
        if let Some(found) = with_json(candidate.clone()) {
            return Some(found);
        }
        let nested = candidate.join("tsconfig.json");
        if fs.is_file(&nested) {
            return Some(nested);
        }
        current = d.parent();
    }
    None
}

fn target_exists(fs: &dyn FileSystem, target: &Path) -> bool {
    let text = target.to_string_lossy();
    match text.split_once('*') {
        // "src/app/*" needs the directory, "src/*.ts" the directory too
        Some((prefix, _)) => {
            let dir = prefix.trim_end_matches('/');
            let dir = if prefix.ends_with('/') {
                PathBuf::from(dir)
            } else {
                Path::new(dir).parent().map(Path::to_path_buf).unwrap_or_default()
            };
            fs.is_dir(&dir)
        }
        None => fs.exists(target) || find_source_file(fs, target).is_some(),
    }
}

pub fn strip_jsonc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    remove_trailing_commas(&out)
}

fn remove_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
