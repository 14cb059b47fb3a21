//! Structural and semantic checks over canonical pairs.
//!
//! Every rule runs over the whole input and appends its findings, so one call
//! reports every problem. Rules never look at `strict`; strictness is applied
//! once, when the verdict is computed from the collected issues.

use std::collections::HashMap;

use crate::flat;
use crate::types::{CanonicalPair, Issue, Severity, ValidateOptions, ValidationResult};

type Rule = fn(&[CanonicalPair], &ValidateOptions, &mut Vec<Issue>);

/// Rules in reporting order.
const RULES: [Rule; 6] = [
    check_key_format,
    check_key_characters,
    check_values,
    check_flat_values,
    check_url_schemes,
    check_duplicates,
];

/// Validate with default limits.
pub fn validate(pairs: &[CanonicalPair], strict: bool) -> ValidationResult {
    validate_with(pairs, &ValidateOptions::strict(strict))
}

/// Validate with explicit limits. Pure: no I/O, no side effects.
pub fn validate_with(pairs: &[CanonicalPair], opts: &ValidateOptions) -> ValidationResult {
    let mut issues = Vec::new();
    for rule in RULES {
        rule(pairs, opts, &mut issues);
    }
    let valid = verdict(&issues, opts.strict);
    ValidationResult { valid, issues }
}

fn verdict(issues: &[Issue], strict: bool) -> bool {
    let errors = issues.iter().any(|i| i.level == Severity::Error);
    let warnings = issues.iter().any(|i| i.level == Severity::Warning);
    !errors && (!strict || !warnings)
}

fn check_key_format(pairs: &[CanonicalPair], opts: &ValidateOptions, issues: &mut Vec<Issue>) {
    for pair in pairs {
        if !pair.key.starts_with('/') {
            issues.push(Issue::error(&pair.key, "key must start with '/'"));
        }
        if pair.key.len() > opts.max_key_len {
            issues.push(Issue::error(
                &pair.key,
                format!(
                    "key is {} bytes, exceeds maximum of {}",
                    pair.key.len(),
                    opts.max_key_len
                ),
            ));
        }
    }
}

fn check_key_characters(pairs: &[CanonicalPair], _: &ValidateOptions, issues: &mut Vec<Issue>) {
    for pair in pairs {
        if pair.key.chars().any(char::is_control) {
            issues.push(Issue::warning(&pair.key, "key contains control characters"));
        }
        if pair.key.contains("//") {
            issues.push(Issue::warning(&pair.key, "key contains an empty segment ('//')"));
        }
    }
}

fn check_values(pairs: &[CanonicalPair], opts: &ValidateOptions, issues: &mut Vec<Issue>) {
    for pair in pairs {
        if pair.value.is_null() {
            issues.push(Issue::error(&pair.key, "value is null"));
            continue;
        }
        let size = pair.value.display_string().len();
        if size > opts.max_value_bytes {
            issues.push(Issue::warning(
                &pair.key,
                format!(
                    "value is {size} bytes, exceeds recommended maximum of {}",
                    opts.max_value_bytes
                ),
            ));
        }
    }
}

/// Values a snapshot file or `convert --to flat` would refuse.
fn check_flat_values(pairs: &[CanonicalPair], _: &ValidateOptions, issues: &mut Vec<Issue>) {
    for pair in pairs.iter().filter(|p| !p.value.is_null()) {
        if let Some(reason) = flat::value_problem(&pair.value.display_string()) {
            issues.push(Issue::warning(
                &pair.key,
                format!("{reason}, which the flat format cannot hold"),
            ));
        }
    }
}

/// Best effort: values that don't parse as a URL are ignored.
fn check_url_schemes(pairs: &[CanonicalPair], _: &ValidateOptions, issues: &mut Vec<Issue>) {
    for pair in pairs {
        if !pair.key.to_ascii_lowercase().contains("url") {
            continue;
        }
        let Some(value) = pair.value.as_str() else {
            continue;
        };
        if let Ok(url) = url::Url::parse(value.trim())
            && url.scheme() == "http"
        {
            issues.push(Issue::warning(
                &pair.key,
                "URL uses insecure http:// scheme, consider https://",
            ));
        }
    }
}

fn check_duplicates(pairs: &[CanonicalPair], _: &ValidateOptions, issues: &mut Vec<Issue>) {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for pair in pairs {
        let count = counts.entry(pair.key.as_str()).or_insert(0);
        if *count == 0 {
            order.push(&pair.key);
        }
        *count += 1;
    }
    for key in order {
        let count = counts[key];
        if count > 1 {
            issues.push(Issue::error(key, format!("key appears {count} times")));
        }
    }
}
