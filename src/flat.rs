//! The flat "etcdctl-style" format: blocks separated by blank lines, where a
//! block's first line is the key and the remaining lines are the value.
//!
//! ```text
//! /app/name
//! myapp
//!
//! /app/motd
//! line one
//! line two
//! ```
//!
//! There is no escaping, so a value cannot contain a blank line. Keys are taken
//! verbatim; whether they are well formed is the validator's business.
//! [`render`] refuses pairs that would not parse back unchanged.
//!
//! Duplicate keys overwrite: the pair keeps the position of the first
//! occurrence and takes the value of the last. A key with no value lines
//! (mid-file or at EOF) gets an empty string.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::EtcdcfgError;
use crate::types::{CanonicalPair, Scalar};

/// Parse raw bytes. `path` is only used in error messages.
pub fn parse_bytes(bytes: &[u8], path: &Path) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count() + 1;
        EtcdcfgError::Parse {
            path: path.to_path_buf(),
            line,
            reason: "invalid UTF-8".into(),
        }
    })?;
    parse(text, path)
}

/// Parse flat text into canonical pairs, in file order.
pub fn parse(text: &str, path: &Path) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let mut builder = PairBuilder::default();
    let mut block: Option<(&str, Vec<&str>)> = None;

    for (idx, raw) in text.split('\n').enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.trim().is_empty() {
            if let Some((key, values)) = block.take() {
                builder.push(key, &values);
            }
            continue;
        }

        match block.as_mut() {
            Some((_, values)) => values.push(line),
            None => {
                if line.starts_with(char::is_whitespace) {
                    return Err(EtcdcfgError::Parse {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        reason: "value line without a preceding key".into(),
                    });
                }
                block = Some((line, Vec::new()));
            }
        }
    }
    if let Some((key, values)) = block.take() {
        builder.push(key, &values);
    }

    debug!(
        path = %path.display(),
        pairs = builder.pairs.len(),
        duplicates = builder.duplicates,
        "parsed flat document"
    );
    Ok(builder.pairs)
}

#[derive(Default)]
struct PairBuilder {
    pairs: Vec<CanonicalPair>,
    index: HashMap<String, usize>,
    duplicates: usize,
}

impl PairBuilder {
    fn push(&mut self, key: &str, values: &[&str]) {
        let value = Scalar::String(values.join("\n"));
        match self.index.get(key) {
            Some(&pos) => {
                self.duplicates += 1;
                self.pairs[pos].value = value;
            }
            None => {
                self.index.insert(key.to_string(), self.pairs.len());
                self.pairs.push(CanonicalPair {
                    key: key.to_string(),
                    value,
                });
            }
        }
    }
}

/// Render pairs as flat text. Values are written in their display form.
///
/// Fails with [`EtcdcfgError::Structural`] naming the first pair whose key or
/// value the parser would read back differently.
pub fn render(pairs: &[CanonicalPair]) -> Result<String, EtcdcfgError> {
    let mut blocks = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let value = pair.value.display_string();
        check(&pair.key, &value)?;
        blocks.push(format!("{}\n{value}\n", pair.key));
    }
    Ok(blocks.join("\n"))
}

/// Whether a `(key, value)` block survives a render/parse round trip.
pub fn check(key: &str, value: &str) -> Result<(), EtcdcfgError> {
    match key_problem(key).or_else(|| value_problem(value)) {
        Some(reason) => Err(EtcdcfgError::Structural {
            path: key.to_string(),
            reason: format!("not representable in the flat format: {reason}"),
        }),
        None => Ok(()),
    }
}

pub fn key_problem(key: &str) -> Option<&'static str> {
    if key.trim().is_empty() {
        Some("key is blank")
    } else if key.starts_with(char::is_whitespace) {
        Some("key starts with whitespace")
    } else if key.contains('\n') {
        Some("key contains a line break")
    } else if key.ends_with('\r') {
        Some("key ends with a carriage return")
    } else {
        None
    }
}

/// An empty value is fine (a key line with nothing after it); any line of a
/// non-empty value must be non-blank.
pub fn value_problem(value: &str) -> Option<&'static str> {
    if value.is_empty() {
        return None;
    }
    value.split('\n').find_map(|line| {
        if line.trim().is_empty() {
            Some("value contains a blank or whitespace-only line")
        } else if line.ends_with('\r') {
            Some("value line ends with a carriage return")
        } else {
            None
        }
    })
}
