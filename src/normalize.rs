use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static NON_IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Canonical form of a column name: trimmed, whitespace runs turned into a
/// single `_`, anything outside `[A-Za-z0-9_]` dropped, lowercased.
///
/// `canonical_name(canonical_name(x)) == canonical_name(x)` for every input.
pub fn canonical_name(raw: &str) -> String {
    let underscored = WHITESPACE.replace_all(raw.trim(), "_");
    NON_IDENT.replace_all(&underscored, "").to_lowercase()
}

/// Normalize a whole header row, keeping length and order.
///
/// Two distinct raw names landing on the same canonical name is an error; the
/// second column would otherwise shadow the first.
pub fn normalize_columns<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());
    for name in raw {
        let name = name.as_ref();
        let canonical = canonical_name(name);
        if let Some(first) = seen.get(&canonical) {
            return Err(PipelineError::SchemaConflict {
                first: first.to_string(),
                second: name.to_string(),
                canonical,
            });
        }
        seen.insert(canonical.clone(), name);
        out.push(canonical);
    }
    Ok(out)
}

/// Join-key normalization, applied identically to both sides of a join.
pub fn join_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}
