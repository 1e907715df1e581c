use anyhow::{Context, Result};
use log::{debug, trace};
use regex::{Captures, Regex};
use serde::Serialize;
use std::path::Path;

use oxifence_core::UserError;

use crate::{project::ProjectInfo, tagging::ModuleType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRuleViolation {
    pub from_tag: String,
    pub to_tags: Vec<String>,
    pub raw_import: String,
}

#[derive(Debug)]
struct Rule {
    key: String,
    matcher: Regex,
    allowed: Vec<AllowedTag>,
}

#[derive(Debug)]
enum AllowedTag {
    Fixed(Regex),
    /// Depends on the key's captures, so the regex is built per source tag.
    Captured(Vec<Piece>),
}

#[derive(Debug)]
enum Piece {
    Pattern(String),
    Capture(usize),
}

impl AllowedTag {
    fn compile(value: &str, placeholders: &[String]) -> Result<Self> {
        let mut pieces = Vec::new();
        let mut pattern = String::new();
        for token in tokenize(value) {
            match token {
                Token::Star => pattern.push_str(".*"),
                Token::Placeholder(name) => match placeholders.iter().position(|p| p == name) {
                    Some(i) => {
                        pieces.push(Piece::Pattern(std::mem::take(&mut pattern)));
                        pieces.push(Piece::Capture(i));
                    }
                    None => pattern.push_str(&regex::escape(&format!("<{name}>"))),
                },
                Token::Literal(text) => pattern.push_str(&regex::escape(text)),
            }
        }
        if pieces.is_empty() {
            let re = Regex::new(&format!("^{pattern}$"))
                .with_context(|| format!("Invalid allowed tag '{}'", value))?;
            return Ok(Self::Fixed(re));
        }
        pieces.push(Piece::Pattern(pattern));
        Ok(Self::Captured(pieces))
    }

    fn matches_any(&self, caps: &Captures<'_>, to_tags: &[String]) -> Result<bool> {
        let re = match self {
            Self::Fixed(re) => return Ok(to_tags.iter().any(|to| re.is_match(to))),
            Self::Captured(pieces) => {
                let mut pattern = String::from("^");
                for piece in pieces {
                    match piece {
                        Piece::Pattern(p) => pattern.push_str(p),
                        Piece::Capture(i) => pattern
                            .push_str(&regex::escape(caps.get(i + 1).map_or("", |m| m.as_str()))),
                    }
                }
                pattern.push('$');
                Regex::new(&pattern)?
            }
        };
        Ok(to_tags.iter().any(|to| re.is_match(to)))
    }
}

/// Compiled `depRules`.
///
/// Keys may use `*` for any run of characters and `<name>` to capture part of
/// the source tag; captured values are substituted into the allowed tags.
/// Every key matching a source tag contributes its allow-list, so `*` applies
/// on top of a tag's own entry.
#[derive(Debug, Default)]
pub struct DependencyRules {
    rules: Vec<Rule>,
}

impl DependencyRules {
    pub fn compile(raw: &[(String, Vec<String>)]) -> Result<Self> {
        let mut rules = Vec::with_capacity(raw.len());
        for (key, allowed) in raw {
            let (pattern, placeholders) = key_to_regex(key);
            let matcher = Regex::new(&pattern)
                .with_context(|| format!("Invalid dependency rule key '{}'", key))?;
            trace!("Rule '{}' compiled to {}", key, pattern);
            let allowed = allowed
                .iter()
                .map(|value| AllowedTag::compile(value, &placeholders))
                .collect::<Result<Vec<_>>>()?;
            rules.push(Rule { key: key.clone(), matcher, allowed });
        }
        debug!("Compiled {} dependency rules", rules.len());
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a module tagged `from` may import a module carrying `to_tags`.
    /// One allowed target tag is enough. Fails if no rule covers `from`.
    pub fn is_allowed(&self, from: &str, to_tags: &[String]) -> Result<bool> {
        let mut covered = false;
        for rule in &self.rules {
            let Some(caps) = rule.matcher.captures(from) else {
                continue;
            };
            covered = true;
            for allowed in &rule.allowed {
                if allowed.matches_any(&caps, to_tags)? {
                    trace!("'{}' may import {:?} through rule '{}'", from, to_tags, rule.key);
                    return Ok(true);
                }
            }
        }
        if !covered {
            return Err(UserError::NoDependencyRuleForTag { tag: from.to_string() }.into());
        }
        Ok(false)
    }
}

enum Token<'a> {
    Star,
    Placeholder(&'a str),
    Literal(&'a str),
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('*') {
            tokens.push(Token::Star);
            rest = after;
        } else if rest.starts_with('<')
            && let Some(close) = rest.find('>')
            && close > 1
        {
            tokens.push(Token::Placeholder(&rest[1..close]));
            rest = &rest[close + 1..];
        } else {
            let first = rest.chars().next().map_or(1, char::len_utf8);
            let end = rest[first..].find(['*', '<']).map_or(rest.len(), |i| i + first);
            tokens.push(Token::Literal(&rest[..end]));
            rest = &rest[end..];
        }
    }
    tokens
}

fn key_to_regex(key: &str) -> (String, Vec<String>) {
    let mut pattern = String::from("^");
    let mut placeholders = Vec::new();
    for token in tokenize(key) {
        match token {
            Token::Star => pattern.push_str(".*"),
            Token::Placeholder(name) => {
                placeholders.push(name.to_string());
                pattern.push_str("(.+?)");
            }
            Token::Literal(text) => pattern.push_str(&regex::escape(text)),
        }
    }
    pattern.push('$');
    (pattern, placeholders)
}

pub fn check_dependency_rule_violations(
    file_path: &Path,
    project: &ProjectInfo,
) -> Result<Vec<DependencyRuleViolation>> {
    let Some(file) = project.graph.file(file_path) else {
        trace!("{} is not part of the graph", file_path.display());
        return Ok(Vec::new());
    };
    if project.config.is_config_file_missing || project.rules.is_empty() {
        return Ok(Vec::new());
    }

    let from = project.modules.module_of(&file.path);
    if from.module_type == ModuleType::Root && project.config.exclude_root {
        return Ok(Vec::new());
    }

    let mut violations = Vec::new();
    for (raw, target) in file.resolved_imports() {
        let to = project.modules.module_of(&project.graph.get(target).path);
        if to.id == from.id {
            continue;
        }
        for from_tag in &from.tags {
            if !project.rules.is_allowed(from_tag, &to.tags)? {
                debug!("{} -> {}: '{}' may not import {:?}", from.name, to.name, from_tag, to.tags);
                violations.push(DependencyRuleViolation {
                    from_tag: from_tag.clone(),
                    to_tags: to.tags.clone(),
                    raw_import: raw.to_string(),
                });
            }
        }
    }
    Ok(violations)
}
