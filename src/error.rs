use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtcdcfgError {
    #[error("Could not determine the format of {path}")]
    FormatDetection { path: PathBuf },

    #[error("Unsupported format '{requested}' (supported: {})", .supported.join(", "))]
    UnsupportedFormat {
        requested: String,
        supported: Vec<String>,
    },

    #[error("Failed to parse {path} (line {line}): {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Key collision between '{first}' and '{second}'")]
    KeyCollision { first: String, second: String },

    #[error("Unsupported structure at '{path}': {reason}")]
    Structural { path: String, reason: String },

    #[error("Invalid {format} document: {reason}")]
    Syntax { format: String, reason: String },

    #[error("File not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store error: {reason}")]
    Store { reason: String },

    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Unknown setting '{key}' in {path} (line {line})")]
    UnknownSetting {
        key: String,
        path: PathBuf,
        line: usize,
    },

    #[error("{} unknown key(s) in settings file", .0.len())]
    UnknownSettings(Vec<EtcdcfgError>),

    #[error("Failed to parse settings file {path}: {source}")]
    SettingsParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Settings error: {0}")]
    Settings(#[from] confique::Error),
}

impl EtcdcfgError {
    pub(crate) fn syntax(format: crate::types::Format, reason: impl ToString) -> Self {
        EtcdcfgError::Syntax {
            format: format.token().to_string(),
            reason: reason.to_string(),
        }
    }
}
