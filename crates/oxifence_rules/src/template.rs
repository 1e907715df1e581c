use anyhow::Result;
use std::collections::BTreeMap;

use oxifence_core::UserError;

pub type Captures = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Vec<Piece>>,
}

impl PathTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let segments: Vec<Vec<Piece>> = source
            .trim_start_matches("./")
            .split('/')
            .filter(|s| !s.is_empty())
            .map(tokenize)
            .collect();

        let mut seen: Vec<&str> = Vec::new();
        for piece in segments.iter().flatten() {
            if let Piece::Placeholder(name) = piece {
                if seen.contains(&name.as_str()) {
                    return Err(UserError::DuplicatePlaceholder {
                        placeholder: name.clone(),
                        template: source.to_string(),
                    }
                    .into());
                }
                seen.push(name);
            }
        }

        Ok(Self { source: source.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder values if `dir` (root-relative, `/`-separated) matches.
    pub fn matches(&self, dir: &str) -> Option<Captures> {
        let parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut captures = Captures::new();
        for (pieces, part) in self.segments.iter().zip(parts) {
            if !match_pieces(pieces, part, &mut captures) {
                return None;
            }
        }
        Some(captures)
    }

    /// Higher is more specific: fully literal segments first, then the
    /// number of literal characters.
    pub fn specificity(&self) -> (usize, usize) {
        let literal_segments = self
            .segments
            .iter()
            .filter(|s| s.iter().all(|p| matches!(p, Piece::Literal(_))))
            .count();
        let literal_chars = self
            .segments
            .iter()
            .flatten()
            .map(|p| match p {
                Piece::Literal(l) => l.len(),
                Piece::Placeholder(_) => 0,
            })
            .sum();
        (literal_segments, literal_chars)
    }
}

fn tokenize(segment: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut rest = segment;
    while !rest.is_empty() {
        match rest.find('<').and_then(|open| rest[open..].find('>').map(|close| (open, open + close))) {
            Some((open, close)) if close > open + 1 => {
                if open > 0 {
                    pieces.push(Piece::Literal(rest[..open].to_string()));
                }
                pieces.push(Piece::Placeholder(rest[open + 1..close].to_string()));
                rest = &rest[close + 1..];
            }
            _ => {
                pieces.push(Piece::Literal(rest.to_string()));
                rest = "";
            }
        }
    }
    pieces
}

fn match_pieces(pieces: &[Piece], text: &str, captures: &mut Captures) -> bool {
    match pieces.split_first() {
        None => text.is_empty(),
        Some((Piece::Literal(lit), rest)) => {
            text.strip_prefix(lit.as_str()).is_some_and(|remaining| match_pieces(rest, remaining, captures))
        }
        Some((Piece::Placeholder(name), rest)) => {
            // longest capture first, backtracking on failure
            let mut ends: Vec<usize> =
                text.char_indices().map(|(i, c)| i + c.len_utf8()).collect();
            ends.reverse();
            for end in ends {
                if match_pieces(rest, &text[end..], captures) {
                    captures.insert(name.clone(), text[..end].to_string());
                    return true;
                }
            }
            false
        }
    }
}

/// Replaces every `<name>` in `template` with its captured value. Returns
/// the name of the first placeholder without a value as the error.
pub fn fill(template: &str, captures: &Captures) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open..].find('>').map(|c| open + c) else {
            break;
        };
        let name = &rest[open + 1..close];
        out.push_str(&rest[..open]);
        match captures.get(name) {
            Some(value) => out.push_str(value),
            None => return Err(name.to_string()),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
