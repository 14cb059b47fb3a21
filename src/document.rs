//! Flatten JSON and YAML straight from their deserializers.
//!
//! `serde_json::Value` keeps only the last of a repeated member name and
//! `serde_yaml::Mapping` rejects one with a plain message. Walking the
//! deserializer sees every member, so a repeated name is reported as a
//! [`KeyCollision`](EtcdcfgError::KeyCollision) naming the first leaf written
//! under each occurrence.
//!
//! Visitors can only return the deserializer's own error type. Failures that
//! belong to our taxonomy are parked in a shared slot and win over whatever
//! message the deserializer wraps around them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use serde::de::{self, DeserializeSeed, Deserializer, EnumAccess, MapAccess, SeqAccess, Visitor};

use crate::error::EtcdcfgError;
use crate::flatten::{check_collisions, child, display_path};
use crate::types::{CanonicalPair, Format, Scalar};

type Failure = RefCell<Option<EtcdcfgError>>;

/// Flatten the document read by `de`. Deserializer errors become
/// [`EtcdcfgError::Syntax`] for `format`.
pub(crate) fn flatten_from<'de, D: Deserializer<'de>>(
    de: D,
    format: Format,
) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let failure = Failure::default();
    let mut out = Vec::new();
    let seed = NodeSeed {
        path: String::new(),
        out: &mut out,
        failure: &failure,
    };
    if let Err(e) = seed.deserialize(de) {
        return Err(failure
            .into_inner()
            .unwrap_or_else(|| EtcdcfgError::syntax(format, e)));
    }
    check_collisions(&out)?;
    Ok(out)
}

/// Park `error` (first one wins) and hand the deserializer a matching message.
fn record<E: de::Error>(failure: &Failure, error: EtcdcfgError) -> E {
    let message = error.to_string();
    failure.borrow_mut().get_or_insert(error);
    E::custom(message)
}

struct NodeSeed<'a> {
    path: String,
    out: &'a mut Vec<CanonicalPair>,
    failure: &'a Failure,
}

impl NodeSeed<'_> {
    fn leaf<E: de::Error>(self, value: Scalar) -> Result<(), E> {
        if self.path.is_empty() {
            return Err(record(
                self.failure,
                EtcdcfgError::Structural {
                    path: "/".into(),
                    reason: "document root must be a mapping".into(),
                },
            ));
        }
        self.out.push(CanonicalPair {
            key: self.path,
            value,
        });
        Ok(())
    }

    /// Null: an empty document at the root, a null leaf elsewhere.
    fn null<E: de::Error>(self) -> Result<(), E> {
        if self.path.is_empty() {
            return Ok(());
        }
        self.leaf(Scalar::Null)
    }

    fn unsupported<E: de::Error>(self, reason: &str) -> Result<(), E> {
        Err(record(
            self.failure,
            EtcdcfgError::Structural {
                path: display_path(&self.path),
                reason: reason.into(),
            },
        ))
    }
}

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for NodeSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping or a scalar")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<(), E> {
        self.leaf(Scalar::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<(), E> {
        self.leaf(Scalar::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<(), E> {
        match i64::try_from(v) {
            Ok(i) => self.leaf(Scalar::Integer(i)),
            Err(_) => self.leaf(Scalar::Float(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<(), E> {
        self.leaf(Scalar::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<(), E> {
        self.leaf(Scalar::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<(), E> {
        self.leaf(Scalar::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.null()
    }

    fn visit_none<E: de::Error>(self) -> Result<(), E> {
        self.null()
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<(), A::Error> {
        self.unsupported("arrays are not supported")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, _data: A) -> Result<(), A::Error> {
        self.unsupported("tagged values are not supported")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let NodeSeed { path, out, failure } = self;
        // Member name -> range of `out` its value produced.
        let mut members: HashMap<String, (usize, usize)> = HashMap::new();

        while let Some(name) = map.next_key_seed(KeySeed {
            path: &path,
            failure,
        })? {
            let member = child(&path, &name);
            let start = out.len();
            map.next_value_seed(NodeSeed {
                path: member.clone(),
                out: &mut *out,
                failure,
            })?;
            let end = out.len();

            if let Some(&(first_start, first_end)) = members.get(&name) {
                let first = if first_end > first_start {
                    out[first_start].key.clone()
                } else {
                    member.clone()
                };
                let second = if end > start {
                    out[start].key.clone()
                } else {
                    member
                };
                return Err(record(failure, EtcdcfgError::KeyCollision { first, second }));
            }
            members.insert(name, (start, end));
        }
        Ok(())
    }
}

/// Map keys become path segments; YAML allows any scalar there.
struct KeySeed<'a> {
    path: &'a str,
    failure: &'a Failure,
}

impl KeySeed<'_> {
    fn not_scalar<E: de::Error>(self) -> Result<String, E> {
        Err(record(
            self.failure,
            EtcdcfgError::Structural {
                path: display_path(self.path),
                reason: "map keys must be scalars".into(),
            },
        ))
    }
}

impl<'de> DeserializeSeed<'de> for KeySeed<'_> {
    type Value = String;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<String, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for KeySeed<'_> {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar map key")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        self.not_scalar()
    }

    fn visit_none<E: de::Error>(self) -> Result<String, E> {
        self.not_scalar()
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<String, A::Error> {
        self.not_scalar()
    }

    fn visit_map<A: MapAccess<'de>>(self, _map: A) -> Result<String, A::Error> {
        self.not_scalar()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        let mut de = serde_json::Deserializer::from_str(text);
        flatten_from(&mut de, Format::Json)
    }

    fn yaml(text: &str) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
        flatten_from(serde_yaml::Deserializer::from_str(text), Format::Yaml)
    }

    fn collision(result: Result<Vec<CanonicalPair>, EtcdcfgError>) -> (String, String) {
        match result.unwrap_err() {
            EtcdcfgError::KeyCollision { first, second } => (first, second),
            other => panic!("Expected KeyCollision, got {other:?}"),
        }
    }

    #[test]
    fn json_repeated_member_scalar_then_object() {
        let got = collision(json(r#"{"a": "scalar", "a": {"b": "x"}}"#));
        assert_eq!(got, ("/a".to_string(), "/a/b".to_string()));
    }

    #[test]
    fn json_repeated_member_object_then_scalar() {
        let got = collision(json(r#"{"a": {"b": "x"}, "a": "scalar"}"#));
        assert_eq!(got, ("/a/b".to_string(), "/a".to_string()));
    }

    #[test]
    fn json_repeated_nested_scalar() {
        let got = collision(json(r#"{"app": {"port": 1, "port": 2}}"#));
        assert_eq!(got, ("/app/port".to_string(), "/app/port".to_string()));
    }

    #[test]
    fn same_name_in_sibling_maps_is_fine() {
        let pairs = json(r#"{"a": {"x": 1}, "b": {"x": 2}}"#).unwrap();
        assert_eq!(
            pairs,
            vec![CanonicalPair::new("/a/x", 1i64), CanonicalPair::new("/b/x", 2i64)]
        );
    }

    #[test]
    fn yaml_repeated_key_is_collision() {
        let got = collision(yaml("a: scalar\na:\n  b: x\n"));
        assert_eq!(got, ("/a".to_string(), "/a/b".to_string()));
    }

    #[test]
    fn slash_in_member_name_still_checked() {
        let got = collision(json(r#"{"a": "scalar", "a/b": "x"}"#));
        assert_eq!(got, ("/a".to_string(), "/a/b".to_string()));
    }

    #[test]
    fn array_names_its_path() {
        match json(r#"{"app": {"hosts": ["a", "b"]}}"#).unwrap_err() {
            EtcdcfgError::Structural { path, .. } => assert_eq!(path, "/app/hosts"),
            other => panic!("Expected Structural, got {other:?}"),
        }
    }

    #[test]
    fn non_scalar_yaml_key_names_its_map() {
        match yaml("app:\n  ? [a, b]\n  : x\n").unwrap_err() {
            EtcdcfgError::Structural { path, reason } => {
                assert_eq!(path, "/app");
                assert!(reason.contains("scalar"));
            }
            other => panic!("Expected Structural, got {other:?}"),
        }
    }

    #[test]
    fn scalar_root_is_structural() {
        match json("\"just a string\"").unwrap_err() {
            EtcdcfgError::Structural { path, .. } => assert_eq!(path, "/"),
            other => panic!("Expected Structural, got {other:?}"),
        }
    }

    #[test]
    fn null_root_is_empty() {
        assert!(yaml("~\n").unwrap().is_empty());
        assert!(json("null").unwrap().is_empty());
    }

    #[test]
    fn yaml_scalar_keys_stringified() {
        let pairs = yaml("ports:\n  8080: open\n  true: on\n").unwrap();
        assert_eq!(pairs[0], CanonicalPair::new("/ports/8080", "open"));
        assert_eq!(pairs[1], CanonicalPair::new("/ports/true", "on"));
    }

    #[test]
    fn malformed_input_is_syntax() {
        assert!(matches!(json("{\"a\": "), Err(EtcdcfgError::Syntax { .. })));
    }
}
