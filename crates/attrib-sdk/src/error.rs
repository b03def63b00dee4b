// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error type for SDK calls.

use attrib_bridge::EncodeError;
use attrib_links::LinkError;
use thiserror::Error;

use crate::config::ConfigError;

/// Failures surfaced by [`SdkContext`](crate::SdkContext).
#[derive(Debug, Error)]
pub enum SdkError {
    /// The context was torn down and refuses further calls.
    #[error("sdk context has been torn down")]
    TornDown,
    /// The native engine refused to start a session.
    #[error("native engine rejected the session start")]
    SessionRejected,
    /// A payload could not be marshalled across the boundary.
    #[error(transparent)]
    Encode(#[from] EncodeError),
    /// Event arguments must come in key/value pairs.
    #[error("event arguments must be key/value pairs, got {count} values")]
    UnpairedArguments {
        /// Number of values supplied.
        count: usize,
    },
    /// An event argument key has no text form (null or container).
    #[error("event argument {index} cannot be used as a key")]
    InvalidEventKey {
        /// Position of the key in the argument list.
        index: usize,
    },
    /// Global property keys must have visible text.
    #[error("global property key is blank")]
    BlankPropertyKey,
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Inbound native payload was malformed.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// JSON serialization failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
