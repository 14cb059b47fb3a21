//! Custom serde Serializer that flattens any `Serialize` tree into canonical
//! `/`-joined key-value pairs.
//!
//! Anything that implements `Serialize` can go through here: TOML tables, our
//! own [`Node`](crate::tree::Node), or an already-built `serde_json::Value`.
//! JSON and YAML files are read with [`document`](crate::document) instead,
//! which sees repeated member names before a `Value` would merge them.
//!
//! Maps and structs are recursed into; scalars become leaves. Sequences are
//! rejected with a structural error naming the path, since the store has no
//! array representation. After traversal, keys are checked for collisions: a
//! leaf at `/a` alongside a leaf at `/a/b` (possible when a member name itself
//! contains `/`) is a [`KeyCollision`](EtcdcfgError::KeyCollision).

use std::collections::HashSet;

use serde::ser::{self, Serialize};

use crate::error::EtcdcfgError;
use crate::types::{CanonicalPair, Scalar};

/// toml serializes datetimes as a struct with a single field of this name.
const TOML_DATETIME_FIELD: &str = "$__toml_private_datetime";

/// Flatten a `Serialize` tree into canonical pairs, in traversal order.
///
/// `{"app": {"port": 8080}}` → `[("/app/port", Integer(8080))]`
pub fn flatten<S: Serialize + ?Sized>(source: &S) -> Result<Vec<CanonicalPair>, EtcdcfgError> {
    let mut out = Vec::new();
    let serializer = FlattenSerializer {
        prefix: String::new(),
        out: &mut out,
    };
    source.serialize(serializer).map_err(FlattenError::into_error)?;
    check_collisions(&out)?;
    Ok(out)
}

/// Fail if any key equals another, or is a strict `/`-prefix of another.
pub(crate) fn check_collisions(pairs: &[CanonicalPair]) -> Result<(), EtcdcfgError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(pairs.len());
    for pair in pairs {
        if !seen.insert(pair.key.as_str()) {
            return Err(EtcdcfgError::KeyCollision {
                first: pair.key.clone(),
                second: pair.key.clone(),
            });
        }
    }
    for pair in pairs {
        for (idx, _) in pair.key.match_indices('/').skip(1) {
            let ancestor = &pair.key[..idx];
            if seen.contains(ancestor) {
                return Err(EtcdcfgError::KeyCollision {
                    first: ancestor.to_string(),
                    second: pair.key.clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
enum FlattenError {
    Array(String),
    TopLevel,
    Unsupported { path: String, reason: String },
    Custom(String),
}

impl FlattenError {
    fn into_error(self) -> EtcdcfgError {
        match self {
            FlattenError::Array(path) => EtcdcfgError::Structural {
                path: display_path(&path),
                reason: "arrays are not supported".into(),
            },
            FlattenError::TopLevel => EtcdcfgError::Structural {
                path: "/".into(),
                reason: "document root must be a mapping".into(),
            },
            FlattenError::Unsupported { path, reason } => EtcdcfgError::Structural {
                path: display_path(&path),
                reason,
            },
            FlattenError::Custom(reason) => EtcdcfgError::Structural {
                path: "/".into(),
                reason,
            },
        }
    }

    /// Pin a bare custom error to the path where it surfaced.
    fn at(self, path: &str) -> Self {
        match self {
            FlattenError::Custom(reason) => FlattenError::Unsupported {
                path: path.to_string(),
                reason,
            },
            other => other,
        }
    }
}

pub(crate) fn display_path(prefix: &str) -> String {
    if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.to_string()
    }
}

impl std::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlattenError::Array(path) => write!(f, "array at {}", display_path(path)),
            FlattenError::TopLevel => write!(f, "document root must be a mapping"),
            FlattenError::Unsupported { path, reason } => {
                write!(f, "{reason} at {}", display_path(path))
            }
            FlattenError::Custom(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FlattenError {}

impl ser::Error for FlattenError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        FlattenError::Custom(msg.to_string())
    }
}

struct FlattenSerializer<'a> {
    prefix: String,
    out: &'a mut Vec<CanonicalPair>,
}

impl<'a> FlattenSerializer<'a> {
    fn emit(self, value: Scalar) -> Result<(), FlattenError> {
        if self.prefix.is_empty() {
            return Err(FlattenError::TopLevel);
        }
        self.out.push(CanonicalPair {
            key: self.prefix,
            value,
        });
        Ok(())
    }
}

pub(crate) fn child(prefix: &str, key: &str) -> String {
    format!("{prefix}/{key}")
}

impl<'a> ser::Serializer for FlattenSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;
    type SerializeSeq = ser::Impossible<(), FlattenError>;
    type SerializeTuple = ser::Impossible<(), FlattenError>;
    type SerializeTupleStruct = ser::Impossible<(), FlattenError>;
    type SerializeTupleVariant = ser::Impossible<(), FlattenError>;
    type SerializeMap = FlattenMapSerializer<'a>;
    type SerializeStruct = FlattenStructSerializer<'a>;
    type SerializeStructVariant = FlattenStructSerializer<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), Self::Error> {
        self.emit(Scalar::Boolean(v))
    }

    fn serialize_i8(self, v: i8) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<(), Self::Error> {
        self.emit(Scalar::Integer(v))
    }

    fn serialize_u8(self, v: u8) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u16(self, v: u16) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u32(self, v: u32) -> Result<(), Self::Error> {
        self.serialize_i64(v as i64)
    }

    fn serialize_u64(self, v: u64) -> Result<(), Self::Error> {
        match i64::try_from(v) {
            Ok(i) => self.serialize_i64(i),
            Err(_) => self.serialize_f64(v as f64),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        self.emit(Scalar::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<(), Self::Error> {
        self.serialize_str(&v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<(), Self::Error> {
        self.emit(Scalar::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<(), Self::Error> {
        Err(FlattenError::Unsupported {
            path: self.prefix,
            reason: "byte strings are not supported".into(),
        })
    }

    fn serialize_none(self) -> Result<(), Self::Error> {
        self.emit(Scalar::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        self.emit(Scalar::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<(), Self::Error> {
        self.emit(Scalar::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), Self::Error> {
        self.serialize_str(variant)
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(FlattenError::Array(self.prefix))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(FlattenError::Array(self.prefix))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(FlattenError::Array(self.prefix))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(FlattenError::Array(self.prefix))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Ok(FlattenMapSerializer {
            prefix: self.prefix,
            out: self.out,
            current_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Ok(FlattenStructSerializer {
            prefix: self.prefix,
            out: self.out,
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Ok(FlattenStructSerializer {
            prefix: self.prefix,
            out: self.out,
        })
    }
}

// --- SerializeStruct ---

struct FlattenStructSerializer<'a> {
    prefix: String,
    out: &'a mut Vec<CanonicalPair>,
}

impl<'a> ser::SerializeStruct for FlattenStructSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        // Datetimes stay a single leaf at the struct's own path.
        let prefix = if key == TOML_DATETIME_FIELD {
            self.prefix.clone()
        } else {
            child(&self.prefix, key)
        };
        value
            .serialize(FlattenSerializer {
                prefix: prefix.clone(),
                out: self.out,
            })
            .map_err(|e| e.at(&prefix))
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<'a> ser::SerializeStructVariant for FlattenStructSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        ser::SerializeStruct::serialize_field(self, key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// --- SerializeMap ---

struct FlattenMapSerializer<'a> {
    prefix: String,
    out: &'a mut Vec<CanonicalPair>,
    current_key: Option<String>,
}

impl<'a> ser::SerializeMap for FlattenMapSerializer<'a> {
    type Ok = ();
    type Error = FlattenError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        let key = key
            .serialize(KeySerializer)
            .map_err(|e| e.at(&self.prefix))?;
        self.current_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .current_key
            .take()
            .ok_or_else(|| FlattenError::Unsupported {
                path: self.prefix.clone(),
                reason: "map value without a key".into(),
            })?;
        let path = child(&self.prefix, &key);
        value
            .serialize(FlattenSerializer {
                prefix: path.clone(),
                out: self.out,
            })
            .map_err(|e| e.at(&path))
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// --- Key serializer ---

/// Turns map keys into path segments. YAML allows scalar keys of any type
/// (`8080: open`), so numbers and booleans are stringified.
struct KeySerializer;

fn key_error() -> FlattenError {
    FlattenError::Custom("map keys must be scalars".into())
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = FlattenError;
    type SerializeSeq = ser::Impossible<String, FlattenError>;
    type SerializeTuple = ser::Impossible<String, FlattenError>;
    type SerializeTupleStruct = ser::Impossible<String, FlattenError>;
    type SerializeTupleVariant = ser::Impossible<String, FlattenError>;
    type SerializeMap = ser::Impossible<String, FlattenError>;
    type SerializeStruct = ser::Impossible<String, FlattenError>;
    type SerializeStructVariant = ser::Impossible<String, FlattenError>;

    fn serialize_str(self, v: &str) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_bool(self, v: bool) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i8(self, v: i8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i16(self, v: i16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i32(self, v: i32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_i64(self, v: i64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u8(self, v: u8) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u16(self, v: u16) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u32(self, v: u32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_u64(self, v: u64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_f32(self, v: f32) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_f64(self, v: f64) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_char(self, v: char) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_none(self) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_some<T: Serialize + ?Sized>(self, v: &T) -> Result<String, Self::Error> {
        v.serialize(self)
    }
    fn serialize_unit(self) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        v: &'static str,
    ) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        v: &T,
    ) -> Result<String, Self::Error> {
        v.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, Self::Error> {
        Err(key_error())
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(key_error())
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(key_error())
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(key_error())
    }
    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(key_error())
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(key_error())
    }
}
