//! Action selection.
//!
//! Matches the names a user asked for against the actions of one kind.
//! A name containing `*`, `?` or `[` is a wildcard; anything else must
//! match exactly.

use crate::error::{ErrorDetail, NotFoundError};
use regex::Regex;
use stagehand_core::{
    ActionKind, ConfigGraph, DeclaredAction, ExecutedAction, LogSink, ResolvedAction,
};
use std::collections::HashSet;

/// Anything selectable by name.
pub trait Named {
    /// The name matched against requested tokens.
    fn name(&self) -> &str;
}

impl Named for str {
    fn name(&self) -> &str {
        self
    }
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

impl Named for DeclaredAction {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for ResolvedAction {
    fn name(&self) -> &str {
        &self.declared().name
    }
}

impl Named for ExecutedAction {
    fn name(&self) -> &str {
        &self.resolved().declared().name
    }
}

impl<T: Named + ?Sized> Named for &T {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Whether `token` should be treated as a wildcard pattern.
pub fn is_wildcard(token: &str) -> bool {
    token.contains(['*', '?', '['])
}

/// A requested name, compiled.
enum Token<'a> {
    Exact(&'a str),
    Pattern { raw: &'a str, regex: Regex },
}

impl<'a> Token<'a> {
    fn parse(raw: &'a str) -> Self {
        if is_wildcard(raw) {
            if let Some(regex) = glob_regex(raw) {
                return Token::Pattern { raw, regex };
            }
        }
        Token::Exact(raw)
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Token::Exact(raw) => *raw == name,
            Token::Pattern { regex, .. } => regex.is_match(name),
        }
    }
}

/// Translate a shell glob into an anchored regex.
///
/// An unterminated `[` matches itself. Returns `None` if the result still
/// isn't a valid regex, e.g. a reversed range like `[z-a]`.
fn glob_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                let rest: String = chars.clone().collect();
                match rest.find(']') {
                    Some(end) if end > 0 => {
                        let class = &rest[..end];
                        pattern.push('[');
                        let body = match class.strip_prefix('!') {
                            Some(negated) => {
                                pattern.push('^');
                                negated
                            }
                            None => class,
                        };
                        for ch in body.chars() {
                            if matches!(ch, '\\' | '[' | '&' | '~') {
                                pattern.push('\\');
                            }
                            pattern.push(ch);
                        }
                        pattern.push(']');
                        for _ in 0..=class.chars().count() {
                            chars.next();
                        }
                    }
                    _ => pattern.push_str(r"\["),
                }
            }
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// Pick the candidates of `kind` that the requested `names` refer to.
///
/// With no names every candidate is returned; if there are none, a warning
/// is logged and the result is empty. An exact name with no match is an
/// error, checked before any wildcard. Wildcards that match nothing are
/// tolerated as long as something was selected overall. Results keep the
/// candidates' order and contain no duplicates.
pub fn select_actions<T: Named + Clone>(
    kind: ActionKind,
    candidates: &[T],
    names: Option<&[String]>,
    log: &dyn LogSink,
    detail: ErrorDetail,
) -> Result<Vec<T>, NotFoundError> {
    let names = names.unwrap_or_default();

    if names.is_empty() {
        if candidates.is_empty() {
            log.warn(&format!("No {kind} actions were found. Aborting."));
        }
        return Ok(candidates.to_vec());
    }

    let tokens: Vec<Token<'_>> = names.iter().map(|n| Token::parse(n)).collect();

    for token in &tokens {
        if let Token::Exact(name) = token {
            if !candidates.iter().any(|c| c.name() == *name) {
                return Err(NotFoundError::missing_action(kind, name, detail));
            }
        }
    }

    let mut seen = HashSet::new();
    let selected: Vec<T> = candidates
        .iter()
        .filter(|c| tokens.iter().any(|t| t.matches(c.name())))
        .filter(|c| seen.insert(c.name().to_string()))
        .cloned()
        .collect();

    if selected.is_empty() {
        // Every exact token matched something, so only wildcards are left here.
        let patterns = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Pattern { raw, .. } => Some(raw.to_string()),
                Token::Exact(_) => None,
            })
            .collect();
        return Err(NotFoundError::no_matches(kind, patterns, detail));
    }

    Ok(selected)
}

/// Select actions of `kind` from a graph, in declaration order.
pub fn select_from_graph<'g>(
    graph: &'g ConfigGraph,
    kind: ActionKind,
    names: Option<&[String]>,
    log: &dyn LogSink,
) -> Result<Vec<&'g ResolvedAction>, NotFoundError> {
    let candidates = graph.get_by_kind(kind);
    let mut detail = ErrorDetail::new();
    detail.insert(
        "available".to_string(),
        candidates.iter().map(|a| a.name().to_string()).collect(),
    );
    select_actions(kind, &candidates, names, log, detail)
}
