use serde::{Deserialize, Serialize};

/// A `(source_prefix, target_prefix)` rewrite rule for ids. Either side may
/// be empty; an empty source prefix matches every id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub source_prefix: String,
    pub target_prefix: String,
}

impl Relocation {
    pub fn new(source_prefix: impl Into<String>, target_prefix: impl Into<String>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            target_prefix: target_prefix.into(),
        }
    }

    /// Apply the rule to one id. Returns `None` when the rule does not match.
    ///
    /// An id equal to the source prefix is an object, not a folder, and is
    /// left as-is (the rule still counts as matched).
    pub fn apply(&self, id: &str) -> Option<String> {
        if id == self.source_prefix {
            return Some(id.to_string());
        }
        let suffix = if self.source_prefix.is_empty() {
            id
        } else {
            match id
                .strip_prefix(self.source_prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => return None,
            }
        };
        Some(join_id(&self.target_prefix, suffix))
    }
}

/// Rewrite `id` through an ordered rule list; the first matching rule applies
/// and ids no rule matches pass through unchanged.
pub fn relocate(id: &str, rules: &[Relocation]) -> String {
    for rule in rules {
        if let Some(rewritten) = rule.apply(id) {
            return rewritten;
        }
    }
    id.to_string()
}

fn join_id(prefix: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        suffix.to_string()
    } else if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{suffix}")
    }
}
