//! Version specifier normalization.
//!
//! Every ecosystem reduces a declared specifier to the bare version token it
//! names: leading comparison/range operators are stripped, and for range
//! lists only the first bound is kept. This is inventory extraction, not range
//! resolution: `^1.2`, `~1.2` and `=1.2` all normalize to `1.2`.

use crate::models::Ecosystem;

/// Cargo requirement operators, longest first.
const CARGO_OPERATORS: &[&str] = &[">=", "<=", "^", "~", ">", "<", "="];

/// npm semver range operators.
const NPM_OPERATORS: &[&str] = &[">=", "<=", "^", "~", ">", "<", "="];

/// PEP 440 operators plus Poetry's caret and tilde.
const PEP440_OPERATORS: &[&str] = &["===", "==", "~=", "!=", ">=", "<=", "^", "~", ">", "<"];

/// Normalize `raw` using the operator set of `ecosystem`.
pub fn normalize(ecosystem: Ecosystem, raw: &str) -> String {
    match ecosystem {
        Ecosystem::Cargo => cargo(raw),
        Ecosystem::Go => go(raw),
        Ecosystem::Npm => npm(raw),
        Ecosystem::Nuget => nuget(raw),
        Ecosystem::Maven => maven(raw),
        Ecosystem::Pypi => pypi(raw),
    }
}

pub fn cargo(raw: &str) -> String {
    strip_operators(first_bound(raw), CARGO_OPERATORS)
}

pub fn npm(raw: &str) -> String {
    let token = strip_operators(first_bound(raw), NPM_OPERATORS);
    // `v1.2.3` and `=v1.2.3` are valid npm versions
    match token.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest.to_string(),
        _ => token,
    }
}

/// `!=` clauses exclude a version rather than bound a range, so they are
/// never chosen as the first bound.
pub fn pypi(raw: &str) -> String {
    let alternative = raw.split("||").next().unwrap_or(raw);
    let clause = alternative
        .split(',')
        .map(str::trim)
        .find(|clause| !clause.starts_with("!="))
        .unwrap_or("");
    strip_operators(clause, PEP440_OPERATORS)
}

/// Go module versions are already exact; only whitespace is removed.
pub fn go(raw: &str) -> String {
    raw.trim().to_string()
}

/// NuGet accepts bare versions and interval notation such as `[1.0,2.0)`.
pub fn nuget(raw: &str) -> String {
    interval_lower_bound(raw)
}

/// Maven accepts bare versions and interval notation such as `[1.0,2.0)`.
pub fn maven(raw: &str) -> String {
    interval_lower_bound(raw)
}

/// First alternative of an `||` union, first clause of a `,` list.
fn first_bound(raw: &str) -> &str {
    let alternative = raw.split("||").next().unwrap_or(raw);
    alternative.split(',').next().unwrap_or(alternative).trim()
}

fn strip_operators(spec: &str, operators: &[&str]) -> String {
    let spec = spec.trim();
    let rest = operators
        .iter()
        .find_map(|op| spec.strip_prefix(op))
        .unwrap_or(spec)
        .trim_start();

    // `>=1.0 <2.0` and hyphen ranges `1.0 - 2.0` keep the first token
    let token = rest.split_whitespace().next().unwrap_or("");
    if is_wildcard(token) {
        String::new()
    } else {
        token.to_string()
    }
}

fn interval_lower_bound(raw: &str) -> String {
    let spec = raw.trim();
    if !spec.starts_with(['[', '(']) {
        return if is_wildcard(spec) {
            String::new()
        } else {
            spec.to_string()
        };
    }

    let inner = spec
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')']);
    // `(,2.0]` has no lower bound; fall back to the upper one
    inner
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
        .unwrap_or("")
        .to_string()
}

fn is_wildcard(token: &str) -> bool {
    matches!(token, "" | "*" | "x" | "X")
}
