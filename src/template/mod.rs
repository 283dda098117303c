//! `{{token}}` interpolation against the execution context.
//!
//! Unresolved tokens are never errors; they pass through verbatim, so
//! partially-populated contexts are always safe to render.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::context::ExecutionContext;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("valid token regex"));

/// Resolve every `{{token}}` occurrence in `template`.
///
/// Resolution order per token: the raw token content as an exact
/// `context.variables` key (names containing whitespace stay
/// reachable); else the trimmed token, so editor-padded `{{ name }}`
/// still resolves; else the trimmed prefix before the first `.` is
/// treated as a node id and the matching result's `output` is
/// substituted (the suffix is not re-resolved here; field-level
/// variables are produced only by structured-output flattening); else
/// the token is left verbatim.
pub fn substitute(template: &str, context: &ExecutionContext) -> String {
    TOKEN_RE
        .replace_all(template, |caps: &Captures| {
            let raw = &caps[1];
            if let Some(value) = context.variables.get(raw) {
                return value.clone();
            }
            let token = raw.trim();
            if let Some(value) = context.variables.get(token) {
                return value.clone();
            }
            let prefix = token.split('.').next().unwrap_or(token);
            if let Some(result) = context.results.get(prefix) {
                return result.output.clone();
            }
            caps[0].to_string()
        })
        .into_owned()
}

/// All token contents appearing in `text`, verbatim, in order,
/// duplicates retained. Used for pre-flight checks such as
/// context-window estimation.
pub fn extract_tokens(text: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(text)
        .map(|cap| cap[1].to_string())
        .collect()
}
