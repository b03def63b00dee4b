// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port that records the call sequence instead of building anything.

use core::fmt;

use attrib_value::ScalarKind;

use crate::{AllocationError, BoundaryPort, ContainerHandle, ContainerKind, Slot};

/// Owned form of a [`Slot`], as recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Root dictionary entry.
    Root(String),
    /// Dictionary container entry.
    Entry(ContainerHandle, String),
    /// Array container append.
    Append(ContainerHandle),
}

impl From<Slot<'_>> for Target {
    fn from(slot: Slot<'_>) -> Self {
        match slot {
            Slot::Root { key } => Self::Root(key.to_owned()),
            Slot::Entry { dict, key } => Self::Entry(dict, key.to_owned()),
            Slot::Append { array } => Self::Append(array),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root(key) => write!(f, "root[{key:?}]"),
            Self::Entry(dict, key) => write!(f, "{dict}[{key:?}]"),
            Self::Append(array) => write!(f, "{array}[+]"),
        }
    }
}

/// One call made against a [`BoundaryPort`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundaryCall {
    /// `begin_session`.
    BeginSession,
    /// `allocate_container` and the handle it returned.
    Allocate {
        /// Requested kind.
        kind: ContainerKind,
        /// Handle handed out.
        handle: ContainerHandle,
    },
    /// `push_scalar`.
    PushScalar {
        /// Destination.
        target: Target,
        /// Kind tag.
        kind: ScalarKind,
        /// Payload text.
        text: String,
    },
    /// `link_child`.
    LinkChild {
        /// Destination.
        target: Target,
        /// Linked container.
        child: ContainerHandle,
    },
    /// `release_all_session_containers`.
    ReleaseAll,
}

impl BoundaryCall {
    /// Shorthand for a scalar pushed under a root key.
    pub fn push_root(key: &str, kind: ScalarKind, text: &str) -> Self {
        Self::PushScalar {
            target: Target::Root(key.to_owned()),
            kind,
            text: text.to_owned(),
        }
    }
}

impl fmt::Display for BoundaryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginSession => f.write_str("begin_session"),
            Self::Allocate { kind, handle } => write!(f, "allocate {kind:?} -> {handle}"),
            Self::PushScalar { target, kind, text } => {
                write!(f, "push {target} = {kind:?}({text:?})")
            }
            Self::LinkChild { target, child } => write!(f, "link {target} <- {child}"),
            Self::ReleaseAll => f.write_str("release_all"),
        }
    }
}

/// Records every call; hands out handles `0, 1, 2, …` per session.
#[derive(Debug, Default)]
pub struct RecordingBoundary {
    calls: Vec<BoundaryCall>,
    next_handle: i32,
    fail_at: Option<i32>,
}

impl RecordingBoundary {
    /// Recorder whose allocation number `n` (0-based, per session) fails.
    pub fn failing_at(n: i32) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::default()
        }
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> &[BoundaryCall] {
        &self.calls
    }
}

impl BoundaryPort for RecordingBoundary {
    fn begin_session(&mut self) {
        self.next_handle = 0;
        self.calls.push(BoundaryCall::BeginSession);
    }

    fn allocate_container(
        &mut self,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, AllocationError> {
        if self.fail_at == Some(self.next_handle) {
            return Err(AllocationError {
                reason: format!("allocation {} refused", self.next_handle),
            });
        }
        let handle = ContainerHandle::from_raw(self.next_handle);
        self.next_handle += 1;
        self.calls.push(BoundaryCall::Allocate { kind, handle });
        Ok(handle)
    }

    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str) {
        self.calls.push(BoundaryCall::PushScalar {
            target: slot.into(),
            kind,
            text: text.to_owned(),
        });
    }

    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle) {
        self.calls.push(BoundaryCall::LinkChild {
            target: slot.into(),
            child,
        });
    }

    fn release_all_session_containers(&mut self) {
        self.calls.push(BoundaryCall::ReleaseAll);
    }
}
