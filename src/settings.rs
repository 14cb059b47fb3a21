//! Tool settings: defaults for format selection, validation limits and diff
//! scope.
//!
//! Layers, lowest to highest priority:
//!
//! ```text
//! Compiled defaults     #[config(default = ...)]
//!        ↑ overridden by
//! Settings file         <platform config dir>/etcdcfg.toml, or --settings PATH
//!        ↑ overridden by
//! Environment vars      ETCDCFG_FORMAT, ETCDCFG_STRICT, ...
//! ```
//!
//! Unknown keys in the settings file are rejected with their line number, so a
//! typo like `stirct = true` fails loudly instead of being ignored.
//!
//! Settings are only read at the edges. The engine itself takes the immutable
//! option structs produced by [`Settings::parse_options`],
//! [`Settings::validate_options`] and [`Settings::diff_options`].

use std::path::{Path, PathBuf};

use confique::Config;

use crate::error::EtcdcfgError;
use crate::format;
use crate::types::{DiffOptions, DiffScope, ParseOptions, ValidateOptions};

pub const APP_NAME: &str = "etcdcfg";

#[derive(Config, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Input format: auto, flat, json, yaml or toml.
    #[config(default = "auto", env = "ETCDCFG_FORMAT")]
    pub format: String,

    /// Validation limits.
    #[config(nested)]
    pub validation: ValidationSettings,

    /// Diff and sync defaults.
    #[config(nested)]
    pub diff: DiffSettings,
}

#[derive(Config, Debug, Clone, PartialEq)]
pub struct ValidationSettings {
    /// Treat warnings as failures.
    #[config(default = false, env = "ETCDCFG_STRICT")]
    pub strict: bool,

    /// Maximum key length in bytes.
    #[config(default = 1536)]
    pub max_key_len: usize,

    /// Values above this many bytes are flagged.
    #[config(default = 10240)]
    pub max_value_bytes: usize,
}

#[derive(Config, Debug, Clone, PartialEq)]
pub struct DiffSettings {
    /// `file` compares only keys in the local file; `full` also reports
    /// remote-only keys under `prefix` as deleted.
    #[config(default = "file", env = "ETCDCFG_DIFF_SCOPE")]
    pub scope: DiffScope,

    /// Include unchanged keys in diff output.
    #[config(default = false)]
    pub show_unchanged: bool,

    /// Key prefix for full-scope diffs.
    #[config(env = "ETCDCFG_PREFIX")]
    pub prefix: Option<String>,
}

impl Settings {
    /// Platform settings file, e.g. `~/.config/etcdcfg/etcdcfg.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("", "", APP_NAME)?;
        Some(proj.config_dir().join(format!("{APP_NAME}.toml")))
    }

    /// Load settings from `path` (must exist) or from the platform default
    /// path (skipped when missing), with environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self, EtcdcfgError> {
        let file = match path {
            Some(p) => Some((p.to_path_buf(), read_settings_file(p)?)),
            None => match Self::default_path() {
                Some(p) => match read_settings_file(&p) {
                    Ok(content) => Some((p, content)),
                    Err(EtcdcfgError::NotFound { .. }) => None,
                    Err(e) => return Err(e),
                },
                None => None,
            },
        };
        resolve(file, true)
    }

    pub fn parse_options(&self) -> Result<ParseOptions, EtcdcfgError> {
        format::parse_options(Some(&self.format))
    }

    pub fn validate_options(&self) -> ValidateOptions {
        ValidateOptions {
            strict: self.validation.strict,
            max_key_len: self.validation.max_key_len,
            max_value_bytes: self.validation.max_value_bytes,
        }
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            scope: self.diff.scope,
            prefix: self.diff.prefix.clone(),
            show_unchanged: self.diff.show_unchanged,
        }
    }
}

fn read_settings_file(path: &Path) -> Result<String, EtcdcfgError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EtcdcfgError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            EtcdcfgError::IoError {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

/// Resolve settings from pre-loaded file content. No I/O happens here.
///
/// confique gives earlier sources priority, so env is registered before the
/// file layer.
pub fn resolve(file: Option<(PathBuf, String)>, use_env: bool) -> Result<Settings, EtcdcfgError> {
    let mut builder = Settings::builder();
    if use_env {
        builder = builder.env();
    }
    if let Some((path, content)) = file {
        validate_unknown_keys(&content, &path)?;
        let layer: <Settings as Config>::Layer =
            toml::from_str(&content).map_err(|e| EtcdcfgError::SettingsParse { path, source: e })?;
        builder = builder.preloaded(layer);
    }
    Ok(builder.load()?)
}

/// Reject settings keys that `Settings` doesn't know.
fn validate_unknown_keys(content: &str, path: &Path) -> Result<(), EtcdcfgError> {
    let mut unknown_keys: Vec<String> = Vec::new();

    let deserializer = toml::Deserializer::new(content);
    let _layer: <Settings as Config>::Layer =
        serde_ignored::deserialize(deserializer, |ignored_path| {
            unknown_keys.push(ignored_path.to_string());
        })
        .map_err(|e| EtcdcfgError::SettingsParse {
            path: path.to_path_buf(),
            source: e,
        })?;

    if unknown_keys.is_empty() {
        return Ok(());
    }

    let errors = unknown_keys
        .into_iter()
        .map(|key| EtcdcfgError::UnknownSetting {
            line: find_key_line(content, &key),
            key,
            path: path.to_path_buf(),
        })
        .collect();
    Err(EtcdcfgError::UnknownSettings(errors))
}

/// 1-indexed line of a dotted key, tracking `[section]` headers. Returns 0
/// when the key can't be located (quoted keys, inline tables).
fn find_key_line(content: &str, dotted_key: &str) -> usize {
    let segments: Vec<&str> = dotted_key.split('.').collect();
    let Some((leaf, expected_section)) = segments.split_last() else {
        return 0;
    };

    let mut current_section: Vec<String> = Vec::new();

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with('[') && !trimmed.starts_with("[[") {
            let header = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            current_section = header.split('.').map(|s| s.trim().to_string()).collect();
            continue;
        }

        let in_section = expected_section.len() == current_section.len()
            && expected_section
                .iter()
                .zip(&current_section)
                .all(|(a, b)| *a == b);

        if in_section
            && let Some(after_key) = trimmed.strip_prefix(leaf)
            && after_key.trim_start().starts_with('=')
        {
            return i + 1;
        }
    }
    0
}
