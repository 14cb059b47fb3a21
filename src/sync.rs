//! Turn a diff into store writes.
//!
//! [`SyncPlan::from_diff`] maps added and modified keys to puts and deleted
//! keys to deletes. [`apply`] runs a plan against any [`Store`]. Store access
//! (network, auth, retries) lives behind the trait; the two implementations
//! here are an in-memory map and a flat-format snapshot file for offline use.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::EtcdcfgError;
use crate::flat;
use crate::types::{CanonicalPair, DiffResult, DiffStatus, Scalar};

/// The remote side of a diff or sync.
pub trait Store {
    /// All pairs under `prefix`, or the whole store for `None`.
    fn fetch_pairs(&self, prefix: Option<&str>) -> Result<Vec<CanonicalPair>, EtcdcfgError>;

    /// Pairs for exactly these keys; missing keys are omitted.
    fn fetch_keys(&self, keys: &[&str]) -> Result<Vec<CanonicalPair>, EtcdcfgError>;

    fn put(&mut self, key: &str, value: &str) -> Result<(), EtcdcfgError>;

    fn delete(&mut self, key: &str) -> Result<(), EtcdcfgError>;
}

/// Writes needed to make the store match the local file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Values as the store will hold them (display strings).
    pub puts: Vec<CanonicalPair>,
    pub deletes: Vec<String>,
}

impl SyncPlan {
    pub fn from_diff(diff: &DiffResult) -> Self {
        let mut plan = SyncPlan::default();
        for entry in &diff.entries {
            match (entry.status, &entry.new_value) {
                (DiffStatus::Added | DiffStatus::Modified, Some(value)) => {
                    plan.puts.push(CanonicalPair {
                        key: entry.key.clone(),
                        value: Scalar::String(value.display_string()),
                    });
                }
                (DiffStatus::Deleted, _) => plan.deletes.push(entry.key.clone()),
                _ => {}
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub put: usize,
    pub deleted: usize,
    pub dry_run: bool,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            write!(f, "Would put {} key(s), delete {} key(s)", self.put, self.deleted)
        } else {
            write!(f, "Put {} key(s), deleted {} key(s)", self.put, self.deleted)
        }
    }
}

/// Execute `plan` against `store`. Stops at the first store error.
pub fn apply<S: Store + ?Sized>(
    plan: &SyncPlan,
    store: &mut S,
    dry_run: bool,
) -> Result<SyncReport, EtcdcfgError> {
    let report = SyncReport {
        put: plan.puts.len(),
        deleted: plan.deletes.len(),
        dry_run,
    };
    if dry_run {
        debug!(puts = report.put, deletes = report.deleted, "dry run, store untouched");
        return Ok(report);
    }

    for pair in &plan.puts {
        trace!(key = %pair.key, "put");
        store.put(&pair.key, &pair.value.display_string())?;
    }
    for key in &plan.deletes {
        trace!(%key, "delete");
        store.delete(key)?;
    }
    debug!(puts = report.put, deletes = report.deleted, "sync applied");
    Ok(report)
}

/// A store held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    data: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[CanonicalPair]) -> Self {
        let data = pairs
            .iter()
            .map(|p| (p.key.clone(), p.value.display_string()))
            .collect();
        Self { data }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn pairs(&self) -> Vec<CanonicalPair> {
        self.data
            .iter()
            .map(|(k, v)| CanonicalPair::new(k.clone(), v.clone()))
            .collect()
    }
}

impl Store for MemoryStore {
    fn fetch_pairs(&self, prefix: Option<&str>) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        let prefix = prefix.unwrap_or("");
        Ok(self
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| CanonicalPair::new(k.clone(), v.clone()))
            .collect())
    }

    fn fetch_keys(&self, keys: &[&str]) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        Ok(keys
            .iter()
            .filter_map(|k| self.data.get(*k).map(|v| CanonicalPair::new(*k, v.clone())))
            .collect())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), EtcdcfgError> {
        self.data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), EtcdcfgError> {
        self.data.remove(key);
        Ok(())
    }
}

/// A store snapshot kept in a flat-format file, e.g. the saved output of
/// `etcdctl get --prefix /`. Changes are written back by [`save`](Self::save).
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl SnapshotStore {
    /// Load the snapshot; a missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, EtcdcfgError> {
        let pairs = match std::fs::read(path) {
            Ok(bytes) => flat::parse_bytes(&bytes, path)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(EtcdcfgError::IoError {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        debug!(path = %path.display(), keys = pairs.len(), "opened snapshot store");
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::from_pairs(&pairs),
            dirty: false,
        })
    }

    /// Write pending changes back to the snapshot file.
    pub fn save(&mut self) -> Result<(), EtcdcfgError> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| EtcdcfgError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let text = flat::render(&self.inner.pairs())?;
        std::fs::write(&self.path, text).map_err(|e| {
            EtcdcfgError::IoError {
                path: self.path.clone(),
                source: e,
            }
        })?;
        self.dirty = false;
        Ok(())
    }
}

impl Store for SnapshotStore {
    fn fetch_pairs(&self, prefix: Option<&str>) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        self.inner.fetch_pairs(prefix)
    }

    fn fetch_keys(&self, keys: &[&str]) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        self.inner.fetch_keys(keys)
    }

    /// Values the flat file can't hold are refused before anything changes.
    fn put(&mut self, key: &str, value: &str) -> Result<(), EtcdcfgError> {
        flat::check(key, value)?;
        self.dirty = true;
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<(), EtcdcfgError> {
        self.dirty = true;
        self.inner.delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::types::{DiffOptions, DiffScope};

    struct FailingStore;

    impl Store for FailingStore {
        fn fetch_pairs(&self, _: Option<&str>) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
            Ok(vec![])
        }
        fn fetch_keys(&self, _: &[&str]) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
            Ok(vec![])
        }
        fn put(&mut self, _: &str, _: &str) -> Result<(), EtcdcfgError> {
            Err(EtcdcfgError::Store {
                reason: "connection refused".into(),
            })
        }
        fn delete(&mut self, _: &str) -> Result<(), EtcdcfgError> {
            Ok(())
        }
    }

    fn full(prefix: &str) -> DiffOptions {
        DiffOptions {
            scope: DiffScope::Full,
            prefix: Some(prefix.into()),
            show_unchanged: true,
        }
    }

    #[test]
    fn plan_from_diff() {
        let local = vec![
            CanonicalPair::new("/app/a", "same"),
            CanonicalPair::new("/app/b", 2i64),
            CanonicalPair::new("/app/new", true),
        ];
        let remote = vec![
            CanonicalPair::new("/app/a", "same"),
            CanonicalPair::new("/app/b", "1"),
            CanonicalPair::new("/app/gone", "x"),
        ];
        let plan = SyncPlan::from_diff(&diff(&local, &remote, &full("/app")));
        assert_eq!(
            plan.puts,
            vec![
                CanonicalPair::new("/app/b", "2"),
                CanonicalPair::new("/app/new", "true"),
            ]
        );
        assert_eq!(plan.deletes, vec!["/app/gone".to_string()]);
    }

    #[test]
    fn apply_makes_store_match() {
        let mut store = MemoryStore::from_pairs(&[
            CanonicalPair::new("/app/b", "1"),
            CanonicalPair::new("/app/gone", "x"),
            CanonicalPair::new("/other", "keep"),
        ]);
        let local = vec![
            CanonicalPair::new("/app/b", 2i64),
            CanonicalPair::new("/app/new", "n"),
        ];
        let remote = store.fetch_pairs(Some("/app")).unwrap();
        let plan = SyncPlan::from_diff(&diff(&local, &remote, &full("/app")));
        let report = apply(&plan, &mut store, false).unwrap();

        assert_eq!(report.put, 2);
        assert_eq!(report.deleted, 1);
        assert_eq!(store.get("/app/b"), Some("2"));
        assert_eq!(store.get("/app/new"), Some("n"));
        assert_eq!(store.get("/app/gone"), None);
        assert_eq!(store.get("/other"), Some("keep"));

        let again = diff(&local, &store.fetch_pairs(Some("/app")).unwrap(), &full("/app"));
        assert!(!again.has_changes());
    }

    #[test]
    fn dry_run_leaves_store_untouched() {
        let mut store = MemoryStore::new();
        let plan = SyncPlan {
            puts: vec![CanonicalPair::new("/a", "1")],
            deletes: vec![],
        };
        let report = apply(&plan, &mut store, true).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.put, 1);
        assert!(store.is_empty());
        assert_eq!(report.to_string(), "Would put 1 key(s), delete 0 key(s)");
    }

    #[test]
    fn store_error_stops_apply() {
        let plan = SyncPlan {
            puts: vec![CanonicalPair::new("/a", "1")],
            deletes: vec!["/b".into()],
        };
        let err = apply(&plan, &mut FailingStore, false).unwrap_err();
        assert!(matches!(err, EtcdcfgError::Store { .. }));
    }

    #[test]
    fn memory_store_prefix_fetch() {
        let store = MemoryStore::from_pairs(&[
            CanonicalPair::new("/a/x", "1"),
            CanonicalPair::new("/a/y", "2"),
            CanonicalPair::new("/ab", "3"),
            CanonicalPair::new("/b", "4"),
        ]);
        let under_a: Vec<String> = store
            .fetch_pairs(Some("/a/"))
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(under_a, vec!["/a/x", "/a/y"]);
        assert_eq!(store.fetch_pairs(None).unwrap().len(), 4);
        assert_eq!(store.fetch_keys(&["/b", "/missing"]).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_store_refuses_values_it_cannot_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.txt");
        std::fs::write(&path, "/keep\nme\n").unwrap();

        let mut store = SnapshotStore::open(&path).unwrap();
        let plan = SyncPlan {
            puts: vec![CanonicalPair::new("/motd", "para one\n\npara two")],
            deletes: vec!["/keep".into()],
        };
        match apply(&plan, &mut store, false).unwrap_err() {
            EtcdcfgError::Structural { path: key, .. } => assert_eq!(key, "/motd"),
            other => panic!("Expected Structural, got {other:?}"),
        }
        assert_eq!(store.fetch_keys(&["/keep"]).unwrap().len(), 1);
        store.save().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "/keep\nme\n");
    }

    #[test]
    fn snapshot_store_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap").join("remote.txt");

        let mut store = SnapshotStore::open(&path).unwrap();
        assert!(store.fetch_pairs(None).unwrap().is_empty());
        store.put("/app/name", "myapp").unwrap();
        store.put("/app/port", "8080").unwrap();
        store.save().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "/app/name\nmyapp\n\n/app/port\n8080\n");

        let mut reopened = SnapshotStore::open(&path).unwrap();
        reopened.delete("/app/name").unwrap();
        reopened.save().unwrap();
        let pairs = SnapshotStore::open(&path).unwrap().fetch_pairs(None).unwrap();
        assert_eq!(pairs, vec![CanonicalPair::new("/app/port", "8080")]);
    }
}
