// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The native engine port and an in-process stand-in.
//!
//! A [`NativeEngine`] is a [`BoundaryPort`] plus the handful of commands that
//! consume whatever was encoded into the session's root dictionary. Commands
//! that take structured arguments (`send_event_with_args`,
//! `start_session_with_launch_options`) read the root dictionary and must be
//! called while the encode session is still open.

use std::collections::BTreeMap;

use attrib_bridge::{
    AllocationError, ArenaBoundary, BoundaryPort, ContainerHandle, ContainerKind, Slot,
};
use attrib_value::{Dictionary, ScalarKind};
use serde::{Deserialize, Serialize};

/// Parameters of a referrer short-link request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortLinkRequest {
    /// Tracking link the short link points at.
    pub base_link: String,
    /// Display name of the referring user.
    pub referrer_name: String,
    /// Id of the referring user.
    pub referrer_id: String,
    /// Extra parameters carried through the link.
    pub passthrough: BTreeMap<String, String>,
}

/// Command surface of the native attribution engine.
///
/// Commands returning `bool` report whether the engine accepted them; the
/// rest are fire-and-forget on the native side too.
pub trait NativeEngine: BoundaryPort {
    /// Start the attribution session with the native config JSON.
    fn start_session(&mut self, config_json: &str) -> bool;

    /// Start a session whose launch options are the current root dictionary.
    fn start_session_with_launch_options(&mut self, api_key: &str, api_secret: &str) -> bool;

    /// Send an event with no arguments.
    fn send_event(&mut self, name: &str) -> bool;

    /// Send an event whose arguments are the current root dictionary.
    fn send_event_with_args(&mut self, name: &str) -> bool;

    /// Request a referrer short link; the result comes back asynchronously
    /// as a short-link callback.
    fn create_referrer_short_link(&mut self, request: &ShortLinkRequest) -> bool;

    /// Attach `key = value` to every later event.
    fn set_global_property(&mut self, key: &str, value: &str, override_existing: bool) -> bool;

    /// Stop attaching `key`.
    fn unset_global_property(&mut self, key: &str);

    /// Stop attaching every global property.
    fn clear_global_properties(&mut self);
}

/// A command received by an [`ArenaEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    /// `start_session`.
    StartSession {
        /// Parsed config object.
        config: serde_json::Value,
    },
    /// `start_session_with_launch_options`.
    LaunchOptions {
        /// API key.
        api_key: String,
        /// Options rebuilt from the boundary calls.
        options: Dictionary,
    },
    /// `send_event` / `send_event_with_args`.
    Event {
        /// Event name.
        name: String,
        /// Arguments rebuilt from the boundary calls, if any were sent.
        args: Option<Dictionary>,
    },
    /// `create_referrer_short_link`.
    ShortLink(ShortLinkRequest),
    /// `set_global_property`.
    SetGlobalProperty {
        /// Property name.
        key: String,
        /// Property value.
        value: String,
        /// Replace an existing value.
        override_existing: bool,
    },
    /// `unset_global_property`.
    UnsetGlobalProperty {
        /// Property name.
        key: String,
    },
    /// `clear_global_properties`.
    ClearGlobalProperties,
}

/// In-process engine over an [`ArenaBoundary`]: rebuilds every payload and
/// records the commands it receives.
#[derive(Debug, Default)]
pub struct ArenaEngine {
    arena: ArenaBoundary,
    calls: Vec<EngineCall>,
    reject_sessions: bool,
}

impl ArenaEngine {
    /// Engine that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine whose arena holds at most `capacity` containers per session.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            arena: ArenaBoundary::with_capacity_limit(capacity),
            ..Self::default()
        }
    }

    /// Engine that refuses to start sessions.
    pub fn rejecting_sessions() -> Self {
        Self {
            reject_sessions: true,
            ..Self::default()
        }
    }

    /// Commands received so far.
    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// The underlying arena (for leak checks).
    pub fn arena(&self) -> &ArenaBoundary {
        &self.arena
    }
}

impl BoundaryPort for ArenaEngine {
    fn begin_session(&mut self) {
        self.arena.begin_session();
    }

    fn allocate_container(
        &mut self,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, AllocationError> {
        self.arena.allocate_container(kind)
    }

    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str) {
        self.arena.push_scalar(slot, kind, text);
    }

    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle) {
        self.arena.link_child(slot, child);
    }

    fn release_all_session_containers(&mut self) {
        self.arena.release_all_session_containers();
    }
}

impl NativeEngine for ArenaEngine {
    fn start_session(&mut self, config_json: &str) -> bool {
        let Ok(config) = serde_json::from_str(config_json) else {
            return false;
        };
        self.calls.push(EngineCall::StartSession { config });
        !self.reject_sessions
    }

    fn start_session_with_launch_options(&mut self, api_key: &str, _api_secret: &str) -> bool {
        self.calls.push(EngineCall::LaunchOptions {
            api_key: api_key.to_owned(),
            options: self.arena.root().clone(),
        });
        !self.reject_sessions
    }

    fn send_event(&mut self, name: &str) -> bool {
        self.calls.push(EngineCall::Event {
            name: name.to_owned(),
            args: None,
        });
        true
    }

    fn send_event_with_args(&mut self, name: &str) -> bool {
        self.calls.push(EngineCall::Event {
            name: name.to_owned(),
            args: Some(self.arena.root().clone()),
        });
        true
    }

    fn create_referrer_short_link(&mut self, request: &ShortLinkRequest) -> bool {
        self.calls.push(EngineCall::ShortLink(request.clone()));
        true
    }

    fn set_global_property(&mut self, key: &str, value: &str, override_existing: bool) -> bool {
        self.calls.push(EngineCall::SetGlobalProperty {
            key: key.to_owned(),
            value: value.to_owned(),
            override_existing,
        });
        true
    }

    fn unset_global_property(&mut self, key: &str) {
        self.calls.push(EngineCall::UnsetGlobalProperty {
            key: key.to_owned(),
        });
    }

    fn clear_global_properties(&mut self) {
        self.calls.push(EngineCall::ClearGlobalProperties);
    }
}
