// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Payloads reported by the native layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default deferred deep-link TTL in seconds.
pub const DEFAULT_DDL_TIMEOUT_SECS: i64 = 60;

/// Rich attribution result for a resolved link.
///
/// Arrives as camelCase JSON from the native layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkParams {
    /// Deep link to route to, if any. This is the only field a deferred
    /// consumer ever sees.
    pub deeplink: Option<String>,
    /// Opaque passthrough string attached to the link.
    pub passthrough: Option<String>,
    /// True when the link was resolved for a fresh install.
    pub is_deferred: bool,
    /// Query parameters of the opening URL.
    pub url_parameters: BTreeMap<String, String>,
}

/// Outcome of a short-link request (`data` is the short link on success).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortLinkParams {
    /// Generated short link.
    #[serde(alias = "Data")]
    pub data: Option<String>,
    /// Failure description.
    #[serde(alias = "Error")]
    pub error: Option<String>,
}

impl ShortLinkParams {
    /// Empty strings mean "absent".
    pub(crate) fn normalized(self) -> Self {
        Self {
            data: self.data.filter(|s| !s.is_empty()),
            error: self.error.filter(|s| !s.is_empty()),
        }
    }
}

/// Ad-network conversion values reported by the native layer
/// (`{"value": …, "coarse": …, "lock": …}`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionValues {
    /// Fine conversion value.
    #[serde(alias = "Value")]
    pub value: i32,
    /// Coarse conversion value.
    #[serde(alias = "Coarse")]
    pub coarse: i32,
    /// True once the window is locked.
    #[serde(alias = "Lock")]
    pub lock: bool,
}

/// Deferred deep-link time-to-live.
///
/// Non-positive or unset values mean [`DEFAULT_DDL_TIMEOUT_SECS`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DdlTimeout(Option<i64>);

impl DdlTimeout {
    /// Timeout of `secs` seconds (`<= 0` selects the default).
    pub const fn from_secs(secs: i64) -> Self {
        Self(Some(secs))
    }

    /// No configured timeout.
    pub const fn unset() -> Self {
        Self(None)
    }

    /// Seconds actually enforced.
    pub const fn effective_secs(self) -> i64 {
        match self.0 {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_DDL_TIMEOUT_SECS,
        }
    }

    /// True while `elapsed` is strictly inside the window.
    pub const fn admits(self, elapsed: i64) -> bool {
        elapsed < self.effective_secs()
    }
}
