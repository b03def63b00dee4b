// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deferred deep-link delivery.
//!
//! Attribution results come back from the native engine at an unpredictable
//! time, often before the application has registered anyone to receive them.
//! [`LinkResolver`] holds such results in single-slot caches and delivers each
//! one to at most one consumer, at most once, subject to a TTL
//! ([`DdlTimeout`], 60 s by default) evaluated lazily at delivery time.
//!
//! Resolution problems (stale result, nobody listening) are silent by design
//! of the attribution contract; the only errors surfaced are malformed
//! payloads from the native layer ([`LinkError`]).

pub mod cache;
pub mod clock;
pub mod params;
pub mod registry;
mod resolver;

use thiserror::Error;

pub use cache::{PendingLinkCache, ResolvedLinkRecord};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use params::{
    ConversionValues, DdlTimeout, LinkParams, ShortLinkParams, DEFAULT_DDL_TIMEOUT_SECS,
};
pub use registry::{
    ConsumerRole, ConversionValueConsumer, ConversionValuesConsumer, DeferredLinkConsumer,
    DeviceAttributionConsumer, HandlerRegistry, SdidConsumer, SdidEvent, ShortLinkCallback,
    SingularLinkConsumer,
};
pub use resolver::LinkResolver;

/// Errors from inbound native payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The payload did not parse.
    #[error("malformed {what}: {detail}")]
    Malformed {
        /// Which callback the payload belonged to.
        what: &'static str,
        /// Parser message.
        detail: String,
    },
}

impl LinkError {
    fn malformed(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |err| Self::Malformed {
            what,
            detail: err.to_string(),
        }
    }
}
