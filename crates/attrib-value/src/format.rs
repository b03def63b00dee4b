// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Locale-invariant scalar text for the boundary.
//!
//! The native side parses numeric payloads back out of text, so the text must
//! never depend on host regional settings: `.` is the only decimal separator,
//! there is no digit grouping, and floats use the shortest representation that
//! round-trips (`1.235` stays `"1.235"`, `2.0` becomes `"2"`).

use thiserror::Error;

use crate::{ScalarKind, Value};

/// A formatted leaf: kind tag plus textual payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scalar {
    /// Boundary kind.
    pub kind: ScalarKind,
    /// Payload text (empty for [`ScalarKind::Null`]).
    pub text: String,
}

impl Scalar {
    /// Format a leaf value. Containers never reach this; they are handled by
    /// [`Value::shape`].
    pub(crate) fn of_leaf(value: &Value) -> Self {
        let (kind, text) = match value {
            Value::Null => (ScalarKind::Null, String::new()),
            Value::Str(s) => (ScalarKind::String, s.clone()),
            Value::I32(n) => (ScalarKind::Int32, n.to_string()),
            Value::I64(n) => (ScalarKind::Int64, n.to_string()),
            Value::F32(f) => (ScalarKind::Float32, format_f32(*f)),
            Value::F64(f) => (ScalarKind::Float64, format_f64(*f)),
            Value::Array(_) | Value::Dict(_) => {
                debug_assert!(false, "containers are not scalars");
                (ScalarKind::String, String::new())
            }
        };
        Self { kind, text }
    }
}

/// Format `value` if it is a leaf; `None` for arrays and dictionaries.
pub fn format_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Array(_) | Value::Dict(_) => None,
        leaf => Some(Scalar::of_leaf(leaf)),
    }
}

/// Render an `f64` for the boundary.
pub fn format_f64(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "Infinity".to_owned()
        } else {
            "-Infinity".to_owned()
        }
    } else {
        value.to_string()
    }
}

/// Render an `f32` for the boundary (shortest text that round-trips as `f32`).
pub fn format_f32(value: f32) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "Infinity".to_owned()
        } else {
            "-Infinity".to_owned()
        }
    } else {
        value.to_string()
    }
}

/// Failure to read a scalar payload back into a [`Value`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot parse {text:?} as {kind:?}")]
pub struct ParseScalarError {
    /// Kind the payload claimed to be.
    pub kind: ScalarKind,
    /// Offending text.
    pub text: String,
}

/// Reconstruct a leaf from its kind tag and payload, as the native side does.
pub fn parse_scalar(kind: ScalarKind, text: &str) -> Result<Value, ParseScalarError> {
    let err = || ParseScalarError {
        kind,
        text: text.to_owned(),
    };
    Ok(match kind {
        ScalarKind::Null => Value::Null,
        ScalarKind::String => Value::Str(text.to_owned()),
        ScalarKind::Int32 => Value::I32(text.parse().map_err(|_| err())?),
        ScalarKind::Int64 => Value::I64(text.parse().map_err(|_| err())?),
        ScalarKind::Float32 => Value::F32(
            parse_float(text, f32::NAN, f32::INFINITY, f32::NEG_INFINITY).ok_or_else(err)?,
        ),
        ScalarKind::Float64 => Value::F64(
            parse_float(text, f64::NAN, f64::INFINITY, f64::NEG_INFINITY).ok_or_else(err)?,
        ),
    })
}

fn parse_float<T: core::str::FromStr>(text: &str, nan: T, inf: T, neg_inf: T) -> Option<T> {
    match text {
        "NaN" => Some(nan),
        "Infinity" => Some(inf),
        "-Infinity" => Some(neg_inf),
        // Grouped or comma-decimal text is rejected rather than guessed at.
        _ if text.contains(',') => None,
        _ => text.parse().ok(),
    }
}
