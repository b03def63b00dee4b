// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Value tree for attribution payloads (event arguments, launch options,
//! purchase attributes).
//!
//! A [`Value`] is a closed tagged union: the caller decides each leaf's kind
//! when building the tree, so the encoder never inspects runtime types.
//! Leaves map onto the primitive [`ScalarKind`]s accepted by the native
//! boundary; containers are [`Value::Array`] and [`Value::Dict`].
//!
//! Invariants:
//!
//! - The model is a tree. Ownership makes cycles unrepresentable.
//! - [`Dictionary`] preserves insertion order, but equality ignores it.
//! - `Null` is a value, not an absent key.

mod dictionary;
pub mod format;
pub mod json;

use serde::{Deserialize, Serialize};

pub use dictionary::Dictionary;
pub use format::{format_f32, format_f64, format_scalar, parse_scalar, ParseScalarError, Scalar};
pub use json::JsonError;

/// Primitive kinds accepted by the native boundary for leaf values.
///
/// Discriminants are the wire tags the native engine expects next to each
/// textual payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ScalarKind {
    /// UTF-8 text; also the fallback for types without a dedicated kind.
    String = 0,
    /// 32-bit signed integer.
    Int32 = 1,
    /// 64-bit signed integer.
    Int64 = 2,
    /// 32-bit float.
    Float32 = 3,
    /// 64-bit float.
    Float64 = 4,
    /// Explicit null; pushed with an empty payload.
    Null = 5,
}

impl ScalarKind {
    /// Wire tag sent across the boundary.
    pub const fn wire_tag(self) -> i32 {
        self as i32
    }

    /// Inverse of [`ScalarKind::wire_tag`].
    pub const fn from_wire_tag(tag: i32) -> Option<Self> {
        Some(match tag {
            0 => Self::String,
            1 => Self::Int32,
            2 => Self::Int64,
            3 => Self::Float32,
            4 => Self::Float64,
            5 => Self::Null,
            _ => return None,
        })
    }
}

/// Payload value.
///
/// Serialized as `{ "kind": "...", "value": ... }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    /// Explicit null (distinct from a missing key).
    Null,
    /// Text.
    Str(String),
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Ordered list.
    Array(Vec<Value>),
    /// String-keyed map.
    Dict(Dictionary),
}

/// How the encoder treats a value: a leaf scalar or a container to recurse into.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape<'a> {
    /// Leaf, already formatted for the boundary.
    Leaf(Scalar),
    /// Array container.
    Array(&'a [Value]),
    /// Dictionary container.
    Dict(&'a Dictionary),
}

impl Value {
    /// Resolve the boundary shape of this value.
    pub fn shape(&self) -> Shape<'_> {
        match self {
            Self::Array(items) => Shape::Array(items),
            Self::Dict(dict) => Shape::Dict(dict),
            leaf => Shape::Leaf(Scalar::of_leaf(leaf)),
        }
    }

    /// Scalar kind of a leaf, `None` for containers.
    pub const fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Self::Null => Some(ScalarKind::Null),
            Self::Str(_) => Some(ScalarKind::String),
            Self::I32(_) => Some(ScalarKind::Int32),
            Self::I64(_) => Some(ScalarKind::Int64),
            Self::F32(_) => Some(ScalarKind::Float32),
            Self::F64(_) => Some(ScalarKind::Float64),
            Self::Array(_) | Self::Dict(_) => None,
        }
    }

    /// True for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text of a [`Value::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the map of a [`Value::Dict`].
    pub const fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Borrow the items of a [`Value::Array`].
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::F32(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

/// Booleans have no boundary kind; they travel as `String` text
/// (`"True"` / `"False"`), the same text the native side has always received.
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Str(if value { "True" } else { "False" }.to_owned())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Self::Dict(value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn wire_tags_match_native_enum() {
        let kinds = [
            ScalarKind::String,
            ScalarKind::Int32,
            ScalarKind::Int64,
            ScalarKind::Float32,
            ScalarKind::Float64,
            ScalarKind::Null,
        ];
        for (expected, kind) in kinds.into_iter().enumerate() {
            assert_eq!(kind.wire_tag(), i32::try_from(expected).unwrap());
            assert_eq!(ScalarKind::from_wire_tag(kind.wire_tag()), Some(kind));
        }
        assert_eq!(ScalarKind::from_wire_tag(6), None);
    }

    #[test]
    fn bool_falls_back_to_string_kind() {
        let v = Value::from(true);
        assert_eq!(v.scalar_kind(), Some(ScalarKind::String));
        assert_eq!(v.as_str(), Some("True"));
    }

    #[test]
    fn none_becomes_null() {
        let v = Value::from(None::<i32>);
        assert!(v.is_null());
        assert_eq!(v.scalar_kind(), Some(ScalarKind::Null));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&Value::I64(7)).expect("serialize");
        assert_eq!(json, r#"{"kind":"I64","value":7}"#);
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Value::I64(7));
    }
}
