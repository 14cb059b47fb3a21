//! Nested tree representation and the unflatten half of the hierarchical
//! transform.
//!
//! `unflatten` splits each key on `/` and inserts its scalar at the leaf
//! segment, building a map-of-maps. Feeding the result back through
//! [`flatten`](crate::flatten::flatten) yields the original pair set for any
//! input without colliding keys.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::error::EtcdcfgError;
use crate::flat;
use crate::flatten::flatten;
use crate::types::{CanonicalPair, Format, Scalar};

/// A node of the nested configuration tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Scalar),
    Branch(BTreeMap<String, Node>),
}

impl Node {
    pub fn empty() -> Self {
        Node::Branch(BTreeMap::new())
    }

    /// Look up a node by `/`-separated path (leading `/` optional).
    pub fn get(&self, path: &str) -> Option<&Node> {
        let mut current = self;
        for segment in segments(path) {
            match current {
                Node::Branch(map) => current = map.get(segment)?,
                Node::Leaf(_) => return None,
            }
        }
        Some(current)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Leaf(scalar) => scalar.serialize(serializer),
            Node::Branch(map) => serializer.collect_map(map),
        }
    }
}

fn segments(key: &str) -> std::str::Split<'_, char> {
    key.strip_prefix('/').unwrap_or(key).split('/')
}

/// Build a nested tree from canonical pairs.
///
/// Keys must be absolute: `app/x` would land on the same node as `/app/x`, so
/// it is a [`Structural`](EtcdcfgError::Structural) error instead.
///
/// Fails with [`KeyCollision`](EtcdcfgError::KeyCollision) as soon as a key
/// needs to descend through a segment that already holds a scalar, or a
/// scalar would replace a populated branch. Repeated identical keys overwrite
/// (last wins).
pub fn unflatten(pairs: &[CanonicalPair]) -> Result<Node, EtcdcfgError> {
    let mut root = BTreeMap::new();
    for pair in pairs {
        insert(&mut root, &pair.key, pair.value.clone())?;
    }
    Ok(Node::Branch(root))
}

/// Like [`unflatten`], but drops pairs whose value is an empty string.
///
/// Used only for tree/YAML display; never feed its output to diff or
/// validation.
pub fn unflatten_for_display(pairs: &[CanonicalPair]) -> Result<Node, EtcdcfgError> {
    let kept: Vec<CanonicalPair> = pairs
        .iter()
        .filter(|p| p.value.as_str() != Some(""))
        .cloned()
        .collect();
    unflatten(&kept)
}

fn insert(root: &mut BTreeMap<String, Node>, key: &str, value: Scalar) -> Result<(), EtcdcfgError> {
    let Some(rest) = key.strip_prefix('/') else {
        return Err(EtcdcfgError::Structural {
            path: key.to_string(),
            reason: "key must start with '/' to be placed in a tree".into(),
        });
    };
    let parts: Vec<&str> = rest.split('/').collect();
    let (leaf, parents) = match parts.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let node = current
            .entry(segment.to_string())
            .or_insert_with(Node::empty);
        current = match node {
            Node::Branch(map) => map,
            Node::Leaf(_) => {
                return Err(EtcdcfgError::KeyCollision {
                    first: format!("/{}", parts[..=depth].join("/")),
                    second: key.to_string(),
                });
            }
        };
    }

    if let Some(Node::Branch(children)) = current.get(*leaf)
        && let Some(descendant) = first_leaf_path(children)
    {
        let rooted = format!("/{}", parts.join("/"));
        return Err(EtcdcfgError::KeyCollision {
            second: format!("{rooted}/{descendant}"),
            first: rooted,
        });
    }
    current.insert(leaf.to_string(), Node::Leaf(value));
    Ok(())
}

/// Relative path of the first leaf beneath a branch, in key order.
fn first_leaf_path(map: &BTreeMap<String, Node>) -> Option<String> {
    for (name, node) in map {
        match node {
            Node::Leaf(_) => return Some(name.clone()),
            Node::Branch(children) => {
                if let Some(rest) = first_leaf_path(children) {
                    return Some(format!("{name}/{rest}"));
                }
            }
        }
    }
    None
}

/// Render a tree in the given format.
pub fn render(node: &Node, format: Format) -> Result<String, EtcdcfgError> {
    match format {
        Format::Flat => flat::render(&flatten(node)?),
        Format::Json => serde_json::to_string_pretty(node).map_err(|e| EtcdcfgError::syntax(format, e)),
        Format::Yaml => serde_yaml::to_string(node).map_err(|e| EtcdcfgError::syntax(format, e)),
        Format::Toml => {
            if let Some(path) = first_null_path(node, "") {
                return Err(EtcdcfgError::Structural {
                    path,
                    reason: "TOML cannot represent null values".into(),
                });
            }
            toml::to_string(node).map_err(|e| EtcdcfgError::syntax(format, e))
        }
    }
}

fn first_null_path(node: &Node, prefix: &str) -> Option<String> {
    match node {
        Node::Leaf(Scalar::Null) => Some(prefix.to_string()),
        Node::Leaf(_) => None,
        Node::Branch(map) => map
            .iter()
            .find_map(|(name, child)| first_null_path(child, &format!("{prefix}/{name}"))),
    }
}
