// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Value-tree marshalling across a scalar-only native boundary.
//!
//! The native attribution engine cannot receive nested structures. It exposes
//! a handful of flat calls instead: allocate an array or dictionary and get an
//! integer handle back, push a scalar (kind tag + text) into a container, and
//! link one container into another. [`encode_with`] walks a
//! [`Dictionary`](attrib_value::Dictionary) depth-first and replays it as
//! that call sequence through a [`BoundaryPort`].
//!
//! Handles are session-scoped. Every walk runs inside an [`EncodeSession`],
//! which releases all containers allocated during the session when it is
//! dropped, whether the walk succeeded, failed, or unwound.
//!
//! Two in-process ports ship with the crate:
//!
//! - [`ArenaBoundary`] rebuilds the tree from the calls (an arena of
//!   containers keyed by handle), for round-trip checks.
//! - [`RecordingBoundary`] records the raw call sequence for traces.

mod arena;
mod encoder;
mod recording;

use core::fmt;

use attrib_value::ScalarKind;
use thiserror::Error;

pub use arena::ArenaBoundary;
pub use encoder::{encode_pairs, encode_with, EncodeSession};
pub use recording::{BoundaryCall, RecordingBoundary, Target};

/// Opaque, session-scoped index of a native container.
///
/// Only meaningful between the `begin_session` / `release_all_session_containers`
/// pair that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContainerHandle(i32);

impl ContainerHandle {
    /// Wrap a raw index handed out by a port.
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Raw index for the native call.
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Container shapes the native side can allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Ordered list; children are appended.
    Array,
    /// String-keyed map; children are stored under a key.
    Dictionary,
}

impl ContainerKind {
    /// Wire tag, continuing the [`ScalarKind`] numbering.
    pub const fn wire_tag(self) -> i32 {
        match self {
            Self::Array => 6,
            Self::Dictionary => 7,
        }
    }
}

/// Where a scalar or child container lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot<'a> {
    /// Under `key` in the session's root dictionary (no handle).
    Root {
        /// Entry key.
        key: &'a str,
    },
    /// Under `key` in a dictionary container.
    Entry {
        /// Parent dictionary.
        dict: ContainerHandle,
        /// Entry key.
        key: &'a str,
    },
    /// Appended to an array container.
    Append {
        /// Parent array.
        array: ContainerHandle,
    },
}

impl<'a> Slot<'a> {
    /// Entry key, if the slot is keyed.
    pub const fn key(&self) -> Option<&'a str> {
        match *self {
            Self::Root { key } | Self::Entry { key, .. } => Some(key),
            Self::Append { .. } => None,
        }
    }
}

/// Native allocation failure reported by a port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("native container allocation failed: {reason}")]
pub struct AllocationError {
    /// Port-provided detail.
    pub reason: String,
}

/// Errors that abort an encode session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The native side ran out of room for a new container. Everything
    /// allocated in the session has already been released.
    #[error("container allocation failed for {kind:?} at depth {depth}")]
    ContainerAllocation {
        /// Kind of container being allocated.
        kind: ContainerKind,
        /// Nesting depth of the container (root entries are depth 1).
        depth: usize,
        /// Port error.
        #[source]
        source: AllocationError,
    },
}

/// The flat call surface of the native engine.
///
/// Implementations live on the far side of an FFI (see `attrib-ffi`) or in
/// process for tests and tooling. Calls other than allocation are
/// fire-and-forget, mirroring the native API.
pub trait BoundaryPort {
    /// Open a session: create the transient root dictionary and the registry
    /// of containers to free at the end.
    fn begin_session(&mut self);

    /// Allocate an empty container and return its handle.
    fn allocate_container(&mut self, kind: ContainerKind)
        -> Result<ContainerHandle, AllocationError>;

    /// Store a scalar payload in `slot`.
    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str);

    /// Attach a filled `child` container at `slot`.
    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle);

    /// Free the root dictionary and every container allocated this session.
    fn release_all_session_containers(&mut self);
}

impl<P: BoundaryPort + ?Sized> BoundaryPort for &mut P {
    fn begin_session(&mut self) {
        (**self).begin_session();
    }

    fn allocate_container(
        &mut self,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, AllocationError> {
        (**self).allocate_container(kind)
    }

    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str) {
        (**self).push_scalar(slot, kind, text);
    }

    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle) {
        (**self).link_child(slot, child);
    }

    fn release_all_session_containers(&mut self) {
        (**self).release_all_session_containers();
    }
}
