//! Parse, validate, diff and sync etcd configuration files.
//!
//! etcd stores a flat keyspace of `/`-separated keys mapped to strings.
//! Humans prefer to write that configuration as nested JSON, YAML or TOML, or
//! keep the `etcdctl get --prefix` dump around. etcdcfg reads all of them into
//! one canonical form, a list of [`CanonicalPair`]s, and works on that:
//!
//! ```ignore
//! let source = FsSource;
//! let (format, pairs) = format::load(&source, Path::new("app.yaml"), &ParseOptions::default())?;
//! let report = validate(&pairs, false);
//! let delta = diff(&pairs, &store.fetch_keys(&keys)?, &DiffOptions::default());
//! ```
//!
//! # Canonical pairs
//!
//! Nested documents are flattened by joining map keys with `/` and prefixing a
//! single `/`, so `{"app": {"port": 8080}}` becomes `/app/port = 8080`. Leaves
//! keep their scalar type ([`Scalar`]) until they reach the store, where
//! everything becomes a string. Arrays have no canonical form and are
//! rejected, as is any document whose keys would collide (one key being a
//! prefix path of another).
//!
//! [`tree::unflatten`] rebuilds the nested form, which is how `convert`
//! renders pairs back into JSON, YAML or TOML.
//!
//! # Formats
//!
//! | Token | Format |
//! |-------|--------|
//! | `flat` (`etcdctl`, `txt`) | alternating key and value lines, blank-line separated |
//! | `json` | nested object |
//! | `yaml` (`yml`) | nested mapping |
//! | `toml` | nested table |
//! | `auto` | extension first, then content sniffing |
//!
//! Detection never guesses TOML from content; name the file `.toml` or pass
//! the token.
//!
//! # Validation and diff
//!
//! [`validate`] runs every rule and collects all issues. Errors always fail
//! the result; warnings fail it only in strict mode.
//!
//! [`diff`] compares local pairs with remote pairs by their display string. A
//! file-scoped diff looks only at keys present locally. A full diff also
//! reports remote keys under a prefix as deleted.
//!
//! # Sync
//!
//! The store is a trait ([`Store`]). [`SnapshotStore`] keeps the remote in a
//! flat dump on disk and [`MemoryStore`] is an in-memory map for tests;
//! neither talks to a live cluster.
//!
//! # Settings
//!
//! Tool defaults live in an optional `etcdcfg.toml` and `ETCDCFG_*`
//! environment variables, loaded through confique. See [`settings`].
//!
//! # Clap adapter
//!
//! The `cli` module (behind the `clap` feature, on by default) parses the
//! `etcdcfg` command line into an [`Action`]; [`ops::handle`] runs it. Both
//! the library and the binary work without clap if you construct actions
//! directly.

pub mod error;
pub mod types;

#[cfg(feature = "clap")]
pub mod cli;
pub mod diff;
mod document;
pub mod flat;
mod flatten;
pub mod format;
pub mod ops;
pub mod settings;
pub mod source;
pub mod sync;
pub mod tree;
pub mod validate;

#[cfg(test)]
mod fixtures;

#[cfg(feature = "clap")]
pub use cli::Cli;
pub use diff::diff;
pub use error::EtcdcfgError;
pub use flatten::flatten;
pub use ops::{Outcome, handle};
pub use settings::Settings;
pub use source::{ByteSource, FsSource, MemorySource};
pub use sync::{MemoryStore, SnapshotStore, Store, SyncPlan, SyncReport};
pub use tree::{Node, unflatten};
pub use types::{
    Action, CanonicalPair, DiffEntry, DiffOptions, DiffResult, DiffScope, DiffStatus, Format,
    Issue, ParseOptions, Scalar, Severity, ValidateOptions, ValidationResult,
};
pub use validate::{validate, validate_with};
