//! Format registry: pick a parser for a file and run it.
//!
//! An explicit format is used verbatim. Otherwise the extension decides
//! (`.json`, `.yaml`/`.yml`, `.toml`); failing that, the content is sniffed:
//!
//! 1. parses as a JSON object → JSON
//! 2. first non-blank line starts with `/` (or the file is blank) → flat
//! 3. parses as a YAML mapping → YAML
//!
//! Only absolute keys are recognized when sniffing: a flat dump whose first
//! key lacks the leading `/` is not detected as flat and needs `--format flat`.
//! The flat parser itself accepts such keys and leaves them to the validator.
//!
//! Sniffing works on the already-read buffer, and the same buffer is handed
//! to the chosen parser, so nothing is read twice.

use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::document;
use crate::error::EtcdcfgError;
use crate::flat;
use crate::flatten::flatten;
use crate::source::ByteSource;
use crate::types::{CanonicalPair, Format, ParseOptions};

/// Token meaning "detect the format".
pub const AUTO: &str = "auto";

/// Tokens accepted wherever a format can be named.
pub fn supported_tokens() -> Vec<String> {
    std::iter::once(AUTO)
        .chain(Format::ALL.iter().map(|f| f.token()))
        .map(String::from)
        .collect()
}

impl FromStr for Format {
    type Err = EtcdcfgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "etcdctl" | "txt" => Ok(Format::Flat),
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            _ => Err(EtcdcfgError::UnsupportedFormat {
                requested: s.to_string(),
                supported: supported_tokens(),
            }),
        }
    }
}

/// Resolve an optional format token into parse options. `None` and `"auto"`
/// both mean auto-detect.
pub fn parse_options(token: Option<&str>) -> Result<ParseOptions, EtcdcfgError> {
    let format = match token {
        None => None,
        Some(t) if t.eq_ignore_ascii_case(AUTO) => None,
        Some(t) => Some(t.parse()?),
    };
    Ok(ParseOptions { format })
}

/// Choose the format for `path`, honoring an explicit override.
pub fn select(path: &Path, bytes: &[u8], opts: &ParseOptions) -> Result<Format, EtcdcfgError> {
    match opts.format {
        Some(format) => Ok(format),
        None => detect(path, bytes),
    }
}

/// Auto-detect the format from the extension, then the content.
pub fn detect(path: &Path, bytes: &[u8]) -> Result<Format, EtcdcfgError> {
    if let Some(format) = from_extension(path) {
        debug!(path = %path.display(), %format, "format selected by extension");
        return Ok(format);
    }

    let detection_error = || EtcdcfgError::FormatDetection {
        path: path.to_path_buf(),
    };
    let text = std::str::from_utf8(bytes).map_err(|_| detection_error())?;
    let format = sniff(text).ok_or_else(detection_error)?;
    debug!(path = %path.display(), %format, "format selected by content");
    Ok(format)
}

fn from_extension(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some(Format::Json),
        "yaml" | "yml" => Some(Format::Yaml),
        "toml" => Some(Format::Toml),
        _ => None,
    }
}

fn sniff(text: &str) -> Option<Format> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(first) = first else {
        return Some(Format::Flat);
    };

    if first.starts_with('{')
        && let Ok(serde_json::Value::Object(_)) = serde_json::from_str(text)
    {
        return Some(Format::Json);
    }
    if first.starts_with('/') {
        return Some(Format::Flat);
    }
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(serde_yaml::Value::Mapping(_)) => Some(Format::Yaml),
        _ => None,
    }
}

/// Parse `bytes` with an already-chosen format.
pub fn parse_as(
    format: Format,
    bytes: &[u8],
    path: &Path,
) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let pairs = match format {
        Format::Flat => return flat::parse_bytes(bytes, path),
        Format::Json => {
            let mut de = serde_json::Deserializer::from_slice(bytes);
            let pairs = document::flatten_from(&mut de, format)?;
            de.end().map_err(|e| EtcdcfgError::syntax(format, e))?;
            pairs
        }
        // An empty YAML document is null and flattens to nothing.
        Format::Yaml => document::flatten_from(serde_yaml::Deserializer::from_slice(bytes), format)?,
        Format::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|e| EtcdcfgError::syntax(format, e))?;
            let doc: toml::Table = toml::from_str(text).map_err(|e| EtcdcfgError::syntax(format, e))?;
            flatten(&doc)?
        }
    };
    debug!(path = %path.display(), %format, pairs = pairs.len(), "parsed tree document");
    Ok(pairs)
}

/// Select a parser for `path` and parse `bytes` with it.
pub fn parse_bytes(
    path: &Path,
    bytes: &[u8],
    opts: &ParseOptions,
) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let format = select(path, bytes, opts)?;
    parse_as(format, bytes, path)
}

/// Read `path` from `source` and parse it.
pub fn load<B: ByteSource + ?Sized>(
    source: &B,
    path: &Path,
    opts: &ParseOptions,
) -> Result<(Format, Vec<CanonicalPair>), EtcdcfgError> {
    let bytes = source.read(path)?;
    let format = select(path, &bytes, opts)?;
    let pairs = parse_as(format, &bytes, path)?;
    Ok((format, pairs))
}
