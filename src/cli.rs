//! Clap adapter for etcdcfg.
//!
//! Compiled only with the `clap` Cargo feature (on by default). The only
//! bridge to the core is [`Cli::into_action()`], which converts parsed
//! arguments into an [`Action`]. Everything after that flows through the
//! clap-free [`ops::handle`](crate::ops::handle).

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::types::{Action, DiffScope};

/// Parse, validate, diff and sync etcd configuration files.
#[derive(Debug, Parser)]
#[command(name = "etcdcfg", version)]
pub struct Cli {
    /// Settings file to use instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Log more detail to stderr (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Input file plus an optional format override, shared by every subcommand.
#[derive(Debug, Args)]
pub struct InputArgs {
    /// Configuration file to read.
    pub file: PathBuf,

    /// Input format: auto, flat, json, yaml or toml. Defaults to the settings
    /// file, then auto-detection.
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Remote side of a diff or sync.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Snapshot file standing in for the store (`etcdctl get --prefix` dump).
    #[arg(long, value_name = "SNAPSHOT")]
    pub remote: PathBuf,

    /// Also report remote keys under --prefix that the file doesn't have.
    #[arg(long)]
    pub full: bool,

    /// Key prefix bounding a full comparison, e.g. "/app/".
    #[arg(long)]
    pub prefix: Option<String>,
}

impl RemoteArgs {
    fn scope(&self) -> Option<DiffScope> {
        self.full.then_some(DiffScope::Full)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the canonical key/value pairs of a file.
    Parse {
        #[command(flatten)]
        input: InputArgs,
        /// Show the nested tree instead of flat pairs.
        #[arg(long)]
        tree: bool,
    },
    /// Check a file for invalid keys and suspicious values.
    Validate {
        #[command(flatten)]
        input: InputArgs,
        /// Fail on warnings too.
        #[arg(long, conflicts_with = "no_strict")]
        strict: bool,
        /// Pass despite warnings, even if the settings file enables strict mode.
        #[arg(long)]
        no_strict: bool,
    },
    /// Compare a file against the remote snapshot.
    Diff {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Include unchanged keys.
        #[arg(long)]
        show_unchanged: bool,
    },
    /// Rewrite a file in another format.
    Convert {
        #[command(flatten)]
        input: InputArgs,
        /// Target format: flat, json, yaml or toml.
        #[arg(long)]
        to: String,
    },
    /// Apply a file to the remote snapshot.
    Sync {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        remote: RemoteArgs,
        /// Show what would change without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    /// The snapshot path for subcommands that talk to a store.
    pub fn remote(&self) -> Option<&PathBuf> {
        match &self.command {
            Command::Diff { remote, .. } | Command::Sync { remote, .. } => Some(&remote.remote),
            _ => None,
        }
    }

    /// Convert clap-parsed args into a framework-agnostic [`Action`].
    ///
    /// `--strict` maps to `Some(true)`, `--no-strict` to `Some(false)`, and
    /// neither to `None` so the settings file decides. `--full` works the same
    /// way for scope.
    pub fn into_action(self) -> Action {
        match self.command {
            Command::Parse { input, tree } => Action::Parse {
                path: input.file,
                format: input.format,
                tree,
            },
            Command::Validate {
                input,
                strict,
                no_strict,
            } => Action::Validate {
                path: input.file,
                format: input.format,
                strict: match (strict, no_strict) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            },
            Command::Diff {
                input,
                remote,
                show_unchanged,
            } => Action::Diff {
                path: input.file,
                format: input.format,
                scope: remote.scope(),
                prefix: remote.prefix,
                show_unchanged,
            },
            Command::Convert { input, to } => Action::Convert {
                path: input.file,
                format: input.format,
                to,
            },
            Command::Sync {
                input,
                remote,
                dry_run,
            } => Action::Sync {
                path: input.file,
                format: input.format,
                scope: remote.scope(),
                prefix: remote.prefix,
                dry_run,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn parse_defaults() {
        let action = parse(&["etcdcfg", "parse", "app.yaml"]).into_action();
        assert_eq!(
            action,
            Action::Parse {
                path: PathBuf::from("app.yaml"),
                format: None,
                tree: false,
            }
        );
    }

    #[test]
    fn parse_with_format_and_tree() {
        let action = parse(&["etcdcfg", "parse", "dump.txt", "-f", "flat", "--tree"]).into_action();
        assert_eq!(
            action,
            Action::Parse {
                path: PathBuf::from("dump.txt"),
                format: Some("flat".into()),
                tree: true,
            }
        );
    }

    #[test]
    fn validate_strict_flag() {
        let lenient = parse(&["etcdcfg", "validate", "a.json"]).into_action();
        assert!(matches!(lenient, Action::Validate { strict: None, .. }));

        let strict = parse(&["etcdcfg", "validate", "a.json", "--strict"]).into_action();
        assert!(matches!(strict, Action::Validate { strict: Some(true), .. }));

        let relaxed = parse(&["etcdcfg", "validate", "a.json", "--no-strict"]).into_action();
        assert!(matches!(relaxed, Action::Validate { strict: Some(false), .. }));
    }

    #[test]
    fn strict_and_no_strict_conflict() {
        assert!(Cli::try_parse_from(["etcdcfg", "validate", "a.json", "--strict", "--no-strict"]).is_err());
    }

    #[test]
    fn diff_requires_remote() {
        assert!(Cli::try_parse_from(["etcdcfg", "diff", "a.json"]).is_err());
    }

    #[test]
    fn diff_full_with_prefix() {
        let cli = parse(&[
            "etcdcfg",
            "diff",
            "a.json",
            "--remote",
            "snap.txt",
            "--full",
            "--prefix",
            "/app/",
            "--show-unchanged",
        ]);
        assert_eq!(cli.remote(), Some(&PathBuf::from("snap.txt")));
        assert_eq!(
            cli.into_action(),
            Action::Diff {
                path: PathBuf::from("a.json"),
                format: None,
                scope: Some(DiffScope::Full),
                prefix: Some("/app/".into()),
                show_unchanged: true,
            }
        );
    }

    #[test]
    fn diff_without_full_leaves_scope_to_settings() {
        let action = parse(&["etcdcfg", "diff", "a.json", "--remote", "s"]).into_action();
        assert!(matches!(action, Action::Diff { scope: None, .. }));
    }

    #[test]
    fn convert_target() {
        let action = parse(&["etcdcfg", "convert", "a.toml", "--to", "yaml"]).into_action();
        assert_eq!(
            action,
            Action::Convert {
                path: PathBuf::from("a.toml"),
                format: None,
                to: "yaml".into(),
            }
        );
    }

    #[test]
    fn sync_dry_run() {
        let action =
            parse(&["etcdcfg", "sync", "a.yaml", "--remote", "s", "--dry-run"]).into_action();
        assert!(matches!(action, Action::Sync { dry_run: true, scope: None, .. }));
    }

    #[test]
    fn global_flags_anywhere() {
        let cli = parse(&["etcdcfg", "-vv", "parse", "a.json", "--settings", "s.toml"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.settings, Some(PathBuf::from("s.toml")));
        assert_eq!(cli.remote(), None);
    }

    #[test]
    fn unknown_subcommand_errors() {
        assert!(Cli::try_parse_from(["etcdcfg", "nope"]).is_err());
    }
}
