//! Action handling: parse, validate, diff, convert and sync, plus the
//! [`Outcome`] enum callers use to display results.
//!
//! This is the seam between the pure engine and its collaborators: file bytes
//! come from a [`ByteSource`], remote pairs from a [`Store`], defaults from
//! [`Settings`].

use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::diff::diff;
use crate::error::EtcdcfgError;
use crate::flat;
use crate::format;
use crate::settings::Settings;
use crate::source::ByteSource;
use crate::sync::{self, Store, SyncPlan, SyncReport};
use crate::tree;
use crate::types::{
    Action, CanonicalPair, DiffOptions, DiffResult, DiffScope, Format, ParseOptions,
    ValidationResult,
};
use crate::validate::validate_with;

/// Result of an action. Returned to the caller for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Parsed pairs and the format they were read as.
    Pairs {
        format: Format,
        pairs: Vec<CanonicalPair>,
    },
    /// Parsed pairs rendered as a nested YAML tree.
    Tree(String),
    Validation(ValidationResult),
    Diff(DiffResult),
    /// A document converted to another format.
    Converted { format: Format, text: String },
    Synced { diff: DiffResult, report: SyncReport },
}

impl Outcome {
    /// False only for a failed validation; callers map this to an exit code.
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::Validation(result) => result.valid,
            _ => true,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pairs { pairs, .. } => {
                for (i, pair) in pairs.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{} = {}", pair.key, pair.value)?;
                }
                Ok(())
            }
            Outcome::Tree(text) => write!(f, "{}", text.trim_end()),
            Outcome::Validation(result) => write!(f, "{result}"),
            Outcome::Diff(result) => write!(f, "{result}"),
            Outcome::Converted { text, .. } => write!(f, "{}", text.trim_end()),
            Outcome::Synced { diff, report } => {
                for entry in &diff.entries {
                    writeln!(f, "{} {}", entry.status.symbol(), entry.key)?;
                }
                write!(f, "{report}")
            }
        }
    }
}

/// Run `action` against the given collaborators.
pub fn handle<B, S>(
    action: &Action,
    settings: &Settings,
    source: &B,
    store: &mut S,
) -> Result<Outcome, EtcdcfgError>
where
    B: ByteSource + ?Sized,
    S: Store + ?Sized,
{
    match action {
        Action::Parse { path, format, tree } => {
            let (format, pairs) = load(source, path, format.as_deref(), settings)?;
            if *tree {
                let node = tree::unflatten_for_display(&pairs)?;
                return Ok(Outcome::Tree(tree::render(&node, Format::Yaml)?));
            }
            Ok(Outcome::Pairs { format, pairs })
        }
        Action::Validate {
            path,
            format,
            strict,
        } => {
            let (_, pairs) = load(source, path, format.as_deref(), settings)?;
            let mut opts = settings.validate_options();
            if let Some(strict) = strict {
                opts.strict = *strict;
            }
            Ok(Outcome::Validation(validate_with(&pairs, &opts)))
        }
        Action::Diff {
            path,
            format,
            scope,
            prefix,
            show_unchanged,
        } => {
            let (_, local) = load(source, path, format.as_deref(), settings)?;
            let opts = diff_options(settings, *scope, prefix.as_deref(), *show_unchanged)?;
            let remote = fetch_remote(&*store, &local, &opts)?;
            Ok(Outcome::Diff(diff(&local, &remote, &opts)))
        }
        Action::Convert { path, format, to } => {
            let target: Format = to.parse()?;
            let (_, pairs) = load(source, path, format.as_deref(), settings)?;
            let text = match target {
                Format::Flat => flat::render(&pairs)?,
                _ => tree::render(&tree::unflatten(&pairs)?, target)?,
            };
            Ok(Outcome::Converted {
                format: target,
                text,
            })
        }
        Action::Sync {
            path,
            format,
            scope,
            prefix,
            dry_run,
        } => {
            let (_, local) = load(source, path, format.as_deref(), settings)?;
            let validation = validate_with(&local, &settings.validate_options());
            if !validation.valid {
                debug!(path = %path.display(), "refusing to sync an invalid file");
                return Ok(Outcome::Validation(validation));
            }
            let opts = diff_options(settings, *scope, prefix.as_deref(), false)?;
            let remote = fetch_remote(&*store, &local, &opts)?;
            let diff = diff(&local, &remote, &opts);
            let plan = SyncPlan::from_diff(&diff);
            let report = sync::apply(&plan, store, *dry_run)?;
            Ok(Outcome::Synced { diff, report })
        }
    }
}

fn load<B: ByteSource + ?Sized>(
    source: &B,
    path: &Path,
    token: Option<&str>,
    settings: &Settings,
) -> Result<(Format, Vec<CanonicalPair>), EtcdcfgError> {
    let opts: ParseOptions = match token {
        Some(t) => format::parse_options(Some(t))?,
        None => settings.parse_options()?,
    };
    format::load(source, path, &opts)
}

/// Merge action flags over settings. A full-scope diff without a prefix would
/// mean scanning the whole store, so it is rejected here as a usage error.
fn diff_options(
    settings: &Settings,
    scope: Option<DiffScope>,
    prefix: Option<&str>,
    show_unchanged: bool,
) -> Result<DiffOptions, EtcdcfgError> {
    let mut opts = settings.diff_options();
    if let Some(scope) = scope {
        opts.scope = scope;
    }
    if let Some(prefix) = prefix {
        opts.prefix = Some(prefix.to_string());
    }
    opts.show_unchanged |= show_unchanged;

    if opts.scope == DiffScope::Full && opts.prefix.as_deref().is_none_or(str::is_empty) {
        return Err(EtcdcfgError::Usage(
            "a full-scope diff requires a non-empty --prefix".into(),
        ));
    }
    Ok(opts)
}

/// Fetch the remote side: the whole prefix for full scope, only the local keys
/// otherwise.
fn fetch_remote<S: Store + ?Sized>(
    store: &S,
    local: &[CanonicalPair],
    opts: &DiffOptions,
) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    match opts.scope {
        DiffScope::Full => {
            let mut remote = store.fetch_pairs(opts.prefix.as_deref())?;
            // Local keys outside the prefix still need their remote values.
            let outside: Vec<&str> = local
                .iter()
                .map(|p| p.key.as_str())
                .filter(|k| !k.starts_with(opts.prefix.as_deref().unwrap_or("")))
                .collect();
            if !outside.is_empty() {
                remote.extend(store.fetch_keys(&outside)?);
            }
            Ok(remote)
        }
        DiffScope::FileScoped => {
            let keys: Vec<&str> = local.iter().map(|p| p.key.as_str()).collect();
            store.fetch_keys(&keys)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{FLAT_DOC, YAML_DOC};
    use crate::settings;
    use crate::source::MemorySource;
    use crate::sync::MemoryStore;
    use crate::types::{DiffStatus, Scalar};
    use std::path::PathBuf;

    fn settings() -> Settings {
        settings::resolve(None, false).unwrap()
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with_file("app.yaml", YAML_DOC)
            .with_file("dump", FLAT_DOC)
            .with_file("insecure.json", r#"{"svc": {"url": "http://example.com"}}"#)
            .with_file("null.json", r#"{"svc": {"token": null}}"#)
    }

    fn remote() -> MemoryStore {
        MemoryStore::from_pairs(&[
            CanonicalPair::new("/app/name", "myapp"),
            CanonicalPair::new("/app/config/port", "9090"),
            CanonicalPair::new("/app/stale", "old"),
            CanonicalPair::new("/elsewhere", "x"),
        ])
    }

    fn run(action: Action) -> Result<Outcome, EtcdcfgError> {
        handle(&action, &settings(), &source(), &mut remote())
    }

    #[test]
    fn parse_detects_and_lists() {
        let outcome = run(Action::Parse {
            path: PathBuf::from("dump"),
            format: None,
            tree: false,
        })
        .unwrap();
        match outcome {
            Outcome::Pairs { format, pairs } => {
                assert_eq!(format, Format::Flat);
                assert_eq!(pairs.len(), 3);
                assert_eq!(pairs[2].value, Scalar::from("welcome\nto myapp"));
            }
            other => panic!("Expected Pairs, got {other:?}"),
        }
    }

    #[test]
    fn parse_tree_renders_yaml() {
        let outcome = run(Action::Parse {
            path: PathBuf::from("dump"),
            format: Some("flat".into()),
            tree: true,
        })
        .unwrap();
        match outcome {
            Outcome::Tree(text) => {
                assert!(text.starts_with("app:\n"));
                assert!(text.contains("  name: myapp"));
            }
            other => panic!("Expected Tree, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_format_token() {
        let err = run(Action::Parse {
            path: PathBuf::from("dump"),
            format: Some("ini".into()),
            tree: false,
        })
        .unwrap_err();
        assert!(matches!(err, EtcdcfgError::UnsupportedFormat { .. }));
    }

    #[test]
    fn parse_missing_file() {
        let err = run(Action::Parse {
            path: PathBuf::from("missing.yaml"),
            format: None,
            tree: false,
        })
        .unwrap_err();
        assert!(matches!(err, EtcdcfgError::NotFound { .. }));
    }

    #[test]
    fn validate_strict_flag_overrides_settings() {
        let lenient = run(Action::Validate {
            path: PathBuf::from("insecure.json"),
            format: None,
            strict: None,
        })
        .unwrap();
        assert!(lenient.is_success());

        let strict = run(Action::Validate {
            path: PathBuf::from("insecure.json"),
            format: None,
            strict: Some(true),
        })
        .unwrap();
        assert!(!strict.is_success());
    }

    #[test]
    fn no_strict_overrides_strict_settings() {
        let mut strict_settings = settings();
        strict_settings.validation.strict = true;
        let action = |strict| Action::Validate {
            path: PathBuf::from("insecure.json"),
            format: None,
            strict,
        };

        let from_settings = handle(&action(None), &strict_settings, &source(), &mut remote()).unwrap();
        assert!(!from_settings.is_success());

        let relaxed = handle(&action(Some(false)), &strict_settings, &source(), &mut remote()).unwrap();
        assert!(relaxed.is_success());
    }

    #[test]
    fn diff_file_scoped_ignores_remote_only() {
        let outcome = run(Action::Diff {
            path: PathBuf::from("app.yaml"),
            format: None,
            scope: None,
            prefix: None,
            show_unchanged: false,
        })
        .unwrap();
        let Outcome::Diff(result) = outcome else {
            panic!("Expected Diff");
        };
        assert_eq!(result.get("/app/config/port").unwrap().status, DiffStatus::Modified);
        assert_eq!(result.get("/app/config/host").unwrap().status, DiffStatus::Added);
        assert!(result.get("/app/name").is_none());
        assert!(result.get("/app/stale").is_none());
        assert_eq!(result.counts.unchanged, 1);
    }

    #[test]
    fn diff_full_scope_reports_deleted_under_prefix() {
        let outcome = run(Action::Diff {
            path: PathBuf::from("app.yaml"),
            format: None,
            scope: Some(DiffScope::Full),
            prefix: Some("/app/".into()),
            show_unchanged: false,
        })
        .unwrap();
        let Outcome::Diff(result) = outcome else {
            panic!("Expected Diff");
        };
        assert_eq!(result.get("/app/stale").unwrap().status, DiffStatus::Deleted);
        assert!(result.get("/elsewhere").is_none());
    }

    #[test]
    fn diff_full_scope_without_prefix_is_usage_error() {
        let err = run(Action::Diff {
            path: PathBuf::from("app.yaml"),
            format: None,
            scope: Some(DiffScope::Full),
            prefix: None,
            show_unchanged: false,
        })
        .unwrap_err();
        assert!(matches!(err, EtcdcfgError::Usage(_)));
    }

    #[test]
    fn convert_yaml_to_flat_and_json() {
        let flat = run(Action::Convert {
            path: PathBuf::from("app.yaml"),
            format: None,
            to: "flat".into(),
        })
        .unwrap();
        match flat {
            Outcome::Converted { format, text } => {
                assert_eq!(format, Format::Flat);
                assert!(text.contains("/app/config/port\n8080\n"));
            }
            other => panic!("Expected Converted, got {other:?}"),
        }

        let json = run(Action::Convert {
            path: PathBuf::from("dump"),
            format: None,
            to: "json".into(),
        })
        .unwrap();
        let Outcome::Converted { text, .. } = json else {
            panic!("Expected Converted");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["app"]["config"]["port"], "8080");
    }

    #[test]
    fn convert_to_auto_is_rejected() {
        let err = run(Action::Convert {
            path: PathBuf::from("dump"),
            format: None,
            to: "auto".into(),
        })
        .unwrap_err();
        assert!(matches!(err, EtcdcfgError::UnsupportedFormat { .. }));
    }

    #[test]
    fn sync_applies_plan() {
        let mut store = remote();
        let action = Action::Sync {
            path: PathBuf::from("app.yaml"),
            format: None,
            scope: Some(DiffScope::Full),
            prefix: Some("/app/".into()),
            dry_run: false,
        };
        let outcome = handle(&action, &settings(), &source(), &mut store).unwrap();
        let Outcome::Synced { report, .. } = outcome else {
            panic!("Expected Synced");
        };
        assert_eq!(report.deleted, 1);
        assert_eq!(store.get("/app/config/port"), Some("8080"));
        assert_eq!(store.get("/app/config/ratio"), Some("0.75"));
        assert_eq!(store.get("/app/stale"), None);
        assert_eq!(store.get("/elsewhere"), Some("x"));
    }

    #[test]
    fn sync_dry_run_writes_nothing() {
        let mut store = remote();
        let before = store.clone();
        let action = Action::Sync {
            path: PathBuf::from("app.yaml"),
            format: None,
            scope: None,
            prefix: None,
            dry_run: true,
        };
        let outcome = handle(&action, &settings(), &source(), &mut store).unwrap();
        assert!(matches!(outcome, Outcome::Synced { report, .. } if report.dry_run));
        assert_eq!(store, before);
    }

    #[test]
    fn sync_refuses_invalid_file() {
        let mut store = remote();
        let before = store.clone();
        let action = Action::Sync {
            path: PathBuf::from("null.json"),
            format: None,
            scope: None,
            prefix: None,
            dry_run: false,
        };
        let outcome = handle(&action, &settings(), &source(), &mut store).unwrap();
        assert!(!outcome.is_success());
        assert_eq!(store, before);
    }

    #[test]
    fn pairs_display_format() {
        let outcome = Outcome::Pairs {
            format: Format::Flat,
            pairs: vec![
                CanonicalPair::new("/host", "localhost"),
                CanonicalPair::new("/port", 8080i64),
            ],
        };
        assert_eq!(outcome.to_string(), "/host = localhost\n/port = 8080");
    }
}
