use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single include or exclude glob, kept as source text until a sync
/// compiles its filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern(pub String);

/// Id filter applied to both inventories ahead of the diff. An id takes
/// part when no exclude pattern matches it and either some include pattern
/// does or no includes were given at all.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl KeyFilter {
    pub fn new(include: &[Pattern], exclude: &[Pattern]) -> Self {
        let include = if include.is_empty() {
            None
        } else {
            Some(compile(include))
        };
        Self {
            include,
            exclude: compile(exclude),
        }
    }

    pub fn check(&self, id: &str) -> bool {
        if self.exclude.is_match(id) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(id),
            None => true,
        }
    }
}

/// Patterns that fail to compile are dropped with a warning rather than
/// failing the whole sync.
fn compile(patterns: &[Pattern]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for Pattern(text) in patterns {
        match Glob::new(text) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!("ignoring malformed pattern `{text}`: {err}"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}
