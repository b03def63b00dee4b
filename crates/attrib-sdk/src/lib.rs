// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attribution SDK glue.
//!
//! [`SdkContext`] is the one handle an application holds: it owns the
//! [`SdkConfig`], the [`NativeEngine`] the calls go to, and the
//! deferred-link resolver that native callbacks feed. Structured payloads
//! (event arguments, launch options) are marshalled through
//! [`attrib_bridge`] and are released before each call returns.
//!
//! ```
//! use attrib_sdk::{ArenaEngine, Dispatch, SdkConfig, SdkContext};
//! use attrib_value::Dictionary;
//!
//! let config = SdkConfig::new("key", "secret");
//! let mut sdk = SdkContext::with_system_clock(config, ArenaEngine::new());
//! sdk.init().unwrap();
//! let mut args = Dictionary::new();
//! args.insert("level", 3);
//! assert_eq!(sdk.send_event_with_args("level_up", &args).unwrap(), Dispatch::Sent);
//! ```

pub mod config;
pub mod config_fs;
mod context;
pub mod engine;
mod error;
pub mod logging;

pub use config::{
    ConfigError, ConfigService, ConfigStore, GlobalProperty, MemoryConfigStore, SdkConfig,
};
pub use config_fs::FsConfigStore;
pub use context::{Dispatch, Lifecycle, SdkContext};
pub use engine::{ArenaEngine, EngineCall, NativeEngine, ShortLinkRequest};
pub use error::SdkError;
