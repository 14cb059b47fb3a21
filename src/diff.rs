//! Classify differences between a local (file) snapshot and a remote (store)
//! snapshot.
//!
//! Values are compared by display string, because the store holds only
//! strings: a local integer `8080` equals a remote `"8080"`.
//!
//! Under [`DiffScope::FileScoped`] only local keys are classified. Under
//! [`DiffScope::Full`] remote-only keys are reported as deleted, restricted to
//! `prefix` when one is given. Requiring a prefix for full scans is the
//! caller's policy; this module computes whatever it is handed.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{
    CanonicalPair, DiffCounts, DiffEntry, DiffOptions, DiffResult, DiffScope, DiffStatus, Scalar,
};

/// Compute the classified delta between `local` and `remote`.
pub fn diff(local: &[CanonicalPair], remote: &[CanonicalPair], opts: &DiffOptions) -> DiffResult {
    let local_map = index(local);
    let remote_map = index(remote);

    let mut entries = Vec::new();
    let mut counts = DiffCounts::default();

    for (key, new) in &local_map {
        let (status, old) = match remote_map.get(key) {
            None => (DiffStatus::Added, None),
            Some(old) if old.display_string() != new.display_string() => {
                (DiffStatus::Modified, Some(*old))
            }
            Some(old) => (DiffStatus::Unchanged, Some(*old)),
        };
        counts.bump(status);
        if status == DiffStatus::Unchanged && !opts.show_unchanged {
            continue;
        }
        entries.push(DiffEntry {
            key: key.to_string(),
            status,
            old_value: old.cloned(),
            new_value: Some((*new).clone()),
        });
    }

    if opts.scope == DiffScope::Full {
        let prefix = opts.prefix.as_deref().unwrap_or("");
        for (key, old) in &remote_map {
            if local_map.contains_key(key) || !key.starts_with(prefix) {
                continue;
            }
            counts.bump(DiffStatus::Deleted);
            entries.push(DiffEntry {
                key: key.to_string(),
                status: DiffStatus::Deleted,
                old_value: Some((*old).clone()),
                new_value: None,
            });
        }
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    debug!(
        added = counts.added,
        modified = counts.modified,
        deleted = counts.deleted,
        unchanged = counts.unchanged,
        "computed diff"
    );
    DiffResult { entries, counts }
}

/// Key → value, last write wins.
fn index(pairs: &[CanonicalPair]) -> BTreeMap<&str, &Scalar> {
    pairs.iter().map(|p| (p.key.as_str(), &p.value)).collect()
}
