// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Developer tooling for the attribution SDK.
//!
//! - `attrib encode` shows exactly which flat boundary calls a JSON payload
//!   becomes, or the tree the native side rebuilds from them.
//! - `attrib simulate-ddl` replays a deferred-link timeline against the
//!   resolver with a hand-driven clock.
//! - `attrib config` reads and writes the stored SDK config.

pub mod cli;
pub mod timeline;
