//! Value types shared by every part of the engine.
//!
//! All of these are plain values: produced per invocation from input bytes or
//! from two snapshots, held for the duration of one command and dropped. None
//! of them carry interior mutability.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize, Serializer};

/// Maximum key length accepted by the validator, in bytes.
pub const DEFAULT_MAX_KEY_LEN: usize = 1536;

/// Values larger than this (in bytes of their display form) are flagged.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 10 * 1024;

/// A typed leaf value.
///
/// The store itself is untyped, so every scalar has a single canonical
/// display string (see [`Scalar::display_string`]). Tree formats keep the
/// native type they were written with.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl Scalar {
    /// The string the store would hold for this value.
    ///
    /// Floats with no fractional part keep a trailing `.0` so `1.0` does not
    /// collapse into the integer `1`.
    pub fn display_string(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => format_float(*f),
            Scalar::Boolean(b) => b.to_string(),
            Scalar::Null => "null".to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in listings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::String(_) => "string",
            Scalar::Integer(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Boolean(_) => "boolean",
            Scalar::Null => "null",
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::String(s) => serializer.serialize_str(s),
            Scalar::Integer(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) => serializer.serialize_f64(*f),
            Scalar::Boolean(b) => serializer.serialize_bool(*b),
            Scalar::Null => serializer.serialize_unit(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

/// One `(key, value)` unit: the common currency between parsers, the
/// hierarchical transform, the validator and the diff engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalPair {
    pub key: String,
    pub value: Scalar,
}

impl CanonicalPair {
    pub fn new(key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Supported input/output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// `key\nvalue\n\n` blocks, as printed by `etcdctl get --prefix`.
    Flat,
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub const ALL: [Format; 4] = [Format::Flat, Format::Json, Format::Yaml, Format::Toml];

    /// The canonical token for this format.
    pub fn token(self) -> &'static str {
        match self {
            Format::Flat => "flat",
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        }
    }

    /// Whether this format encodes a nested tree (and thus goes through flatten).
    pub fn is_tree(self) -> bool {
        !matches!(self, Format::Flat)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Parser options. `format: None` means auto-detect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOptions {
    pub format: Option<Format>,
}

// --- Validation -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub message: String,
    pub level: Severity,
}

impl Issue {
    pub fn error(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            message: message.into(),
            level: Severity::Error,
        }
    }

    pub fn warning(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: Some(key.to_string()),
            message: message.into(),
            level: Severity::Warning,
        }
    }
}

/// Validator knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidateOptions {
    /// Count warnings toward invalidity at verdict time.
    pub strict: bool,
    pub max_key_len: usize,
    pub max_value_bytes: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

impl ValidateOptions {
    pub fn strict(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<Issue>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.level == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.level == Severity::Warning)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (heading, level) in [("Errors", Severity::Error), ("Warnings", Severity::Warning)] {
            let group: Vec<&Issue> = self.issues.iter().filter(|i| i.level == level).collect();
            if group.is_empty() {
                continue;
            }
            writeln!(f, "{heading}:")?;
            for issue in group {
                match &issue.key {
                    Some(key) => writeln!(f, "  {key}: {}", issue.message)?,
                    None => writeln!(f, "  {}", issue.message)?,
                }
            }
        }
        if self.valid {
            write!(f, "Validation passed")
        } else {
            write!(f, "Validation failed")
        }
    }
}

// --- Diff -------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
    Unchanged,
}

impl DiffStatus {
    /// Single-character marker for line-oriented output.
    pub fn symbol(self) -> char {
        match self {
            DiffStatus::Added => '+',
            DiffStatus::Modified => '~',
            DiffStatus::Deleted => '-',
            DiffStatus::Unchanged => '=',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub key: String,
    pub status: DiffStatus,
    /// Value on the remote side.
    pub old_value: Option<Scalar>,
    /// Value on the local side.
    pub new_value: Option<Scalar>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl DiffCounts {
    pub(crate) fn bump(&mut self, status: DiffStatus) {
        match status {
            DiffStatus::Added => self.added += 1,
            DiffStatus::Modified => self.modified += 1,
            DiffStatus::Deleted => self.deleted += 1,
            DiffStatus::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiffResult {
    /// Sorted by key, byte-wise ascending.
    pub entries: Vec<DiffEntry>,
    /// Counted over every classified key, including hidden unchanged ones.
    pub counts: DiffCounts,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.counts.added + self.counts.modified + self.counts.deleted > 0
    }

    pub fn get(&self, key: &str) -> Option<&DiffEntry> {
        self.entries.iter().find(|e| e.key == key)
    }
}

impl fmt::Display for DiffResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let sym = entry.status.symbol();
            match (&entry.old_value, &entry.new_value) {
                (Some(old), Some(new)) if entry.status == DiffStatus::Modified => {
                    writeln!(f, "{sym} {} = {old} -> {new}", entry.key)?
                }
                (_, Some(new)) => writeln!(f, "{sym} {} = {new}", entry.key)?,
                (Some(old), None) => writeln!(f, "{sym} {} = {old}", entry.key)?,
                (None, None) => writeln!(f, "{sym} {}", entry.key)?,
            }
        }
        let c = &self.counts;
        write!(
            f,
            "{} added, {} modified, {} deleted, {} unchanged",
            c.added, c.modified, c.deleted, c.unchanged
        )
    }
}

/// Which side-only keys a diff reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffScope {
    /// Only keys present in the local file are classified.
    #[default]
    #[serde(rename = "file")]
    FileScoped,
    /// Remote-only keys (under the prefix) are reported as deleted.
    Full,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffOptions {
    pub scope: DiffScope,
    pub prefix: Option<String>,
    pub show_unchanged: bool,
}

// --- Actions ----------------------------------------------------------------

/// An operation, independent of any CLI framework.
/// The CLI layer converts parsed clap args into this.
///
/// `format` fields carry the raw token (`auto`, `json`, ...) so an unknown
/// token surfaces as an error from the format registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Parse {
        path: PathBuf,
        format: Option<String>,
        tree: bool,
    },
    Validate {
        path: PathBuf,
        format: Option<String>,
        strict: Option<bool>,
    },
    Diff {
        path: PathBuf,
        format: Option<String>,
        scope: Option<DiffScope>,
        prefix: Option<String>,
        show_unchanged: bool,
    },
    Convert {
        path: PathBuf,
        format: Option<String>,
        to: String,
    },
    Sync {
        path: PathBuf,
        format: Option<String>,
        scope: Option<DiffScope>,
        prefix: Option<String>,
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_string_per_variant() {
        assert_eq!(Scalar::from("x").display_string(), "x");
        assert_eq!(Scalar::Integer(8080).display_string(), "8080");
        assert_eq!(Scalar::Float(1.5).display_string(), "1.5");
        assert_eq!(Scalar::Float(2.0).display_string(), "2.0");
        assert_eq!(Scalar::Boolean(true).display_string(), "true");
        assert_eq!(Scalar::Null.display_string(), "null");
    }

    #[test]
    fn scalar_serializes_untagged() {
        let pairs = vec![
            CanonicalPair::new("/a", 1i64),
            CanonicalPair::new("/b", "x"),
            CanonicalPair::new("/c", Scalar::Null),
        ];
        let json = serde_json::to_string(&pairs).unwrap();
        assert_eq!(
            json,
            r#"[{"key":"/a","value":1},{"key":"/b","value":"x"},{"key":"/c","value":null}]"#
        );
    }

    #[test]
    fn diff_scope_tokens() {
        let s: DiffScope = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(s, DiffScope::FileScoped);
        let s: DiffScope = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(s, DiffScope::Full);
    }

    #[test]
    fn diff_status_symbols() {
        assert_eq!(DiffStatus::Added.symbol(), '+');
        assert_eq!(DiffStatus::Modified.symbol(), '~');
        assert_eq!(DiffStatus::Deleted.symbol(), '-');
        assert_eq!(DiffStatus::Unchanged.symbol(), '=');
    }

    #[test]
    fn validation_display_groups_errors_first() {
        let result = ValidationResult {
            valid: false,
            issues: vec![
                Issue::warning("/a", "insecure"),
                Issue::error("/b", "null value"),
            ],
        };
        let out = result.to_string();
        let errors_at = out.find("Errors:").unwrap();
        let warnings_at = out.find("Warnings:").unwrap();
        assert!(errors_at < warnings_at);
        assert!(out.ends_with("Validation failed"));
    }

    #[test]
    fn diff_display_lists_entries_and_counts() {
        let mut counts = DiffCounts::default();
        counts.bump(DiffStatus::Modified);
        let result = DiffResult {
            entries: vec![DiffEntry {
                key: "/x".into(),
                status: DiffStatus::Modified,
                old_value: Some("1".into()),
                new_value: Some("2".into()),
            }],
            counts,
        };
        assert_eq!(
            result.to_string(),
            "~ /x = 1 -> 2\n0 added, 1 modified, 0 deleted, 0 unchanged"
        );
    }
}
