// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference port: rebuilds the value tree on "the other side".
//!
//! Containers live in an arena indexed by handle. A container is filled while
//! open and moved into its parent when linked; the root dictionary is the
//! session's output. This mirrors what the native engine does with the same
//! call sequence, so `encode → rebuild` must be the identity (up to key order).

use attrib_value::{parse_scalar, Dictionary, ScalarKind, Value};
use tracing::warn;

use crate::{AllocationError, BoundaryPort, ContainerHandle, ContainerKind, Slot};

#[derive(Debug)]
enum Cell {
    Open(Value),
    Linked,
}

/// In-process [`BoundaryPort`] that reconstructs what it receives.
#[derive(Debug, Default)]
pub struct ArenaBoundary {
    root: Dictionary,
    arena: Vec<Cell>,
    capacity: Option<usize>,
    in_session: bool,
    sessions: u64,
    violations: Vec<String>,
}

impl ArenaBoundary {
    /// Unbounded arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena that refuses to hold more than `capacity` containers per session,
    /// standing in for native resource exhaustion.
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Root dictionary built so far in the current session.
    pub fn root(&self) -> &Dictionary {
        &self.root
    }

    /// Move the current root out, leaving an empty one.
    pub fn take_root(&mut self) -> Dictionary {
        core::mem::take(&mut self.root)
    }

    /// Containers still held by the arena (zero after a release).
    pub fn live_containers(&self) -> usize {
        self.arena.len()
    }

    /// True between `begin_session` and `release_all_session_containers`.
    pub const fn in_session(&self) -> bool {
        self.in_session
    }

    /// Completed sessions.
    pub const fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Protocol misuse observed (bad handles, double links, bad payloads).
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    fn violation(&mut self, msg: String) {
        warn!(%msg, "boundary protocol violation");
        self.violations.push(msg);
    }

    fn open_cell(&mut self, handle: ContainerHandle) -> Option<&mut Value> {
        let idx = usize::try_from(handle.raw()).ok()?;
        match self.arena.get_mut(idx) {
            Some(Cell::Open(value)) => Some(value),
            _ => None,
        }
    }

    fn place(&mut self, slot: Slot<'_>, value: Value) {
        match slot {
            Slot::Root { key } => {
                self.root.insert(key, value);
            }
            Slot::Entry { dict, key } => match self.open_cell(dict) {
                Some(Value::Dict(d)) => {
                    d.insert(key, value);
                }
                _ => self.violation(format!("{dict} is not an open dictionary")),
            },
            Slot::Append { array } => match self.open_cell(array) {
                Some(Value::Array(items)) => items.push(value),
                _ => self.violation(format!("{array} is not an open array")),
            },
        }
    }
}

impl BoundaryPort for ArenaBoundary {
    fn begin_session(&mut self) {
        if self.in_session {
            self.violation("session opened twice".to_owned());
        }
        self.in_session = true;
        self.root = Dictionary::new();
        self.arena.clear();
    }

    fn allocate_container(
        &mut self,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, AllocationError> {
        if self.capacity.is_some_and(|cap| self.arena.len() >= cap) {
            return Err(AllocationError {
                reason: format!("arena full ({} containers)", self.arena.len()),
            });
        }
        let raw = i32::try_from(self.arena.len()).map_err(|_| AllocationError {
            reason: "handle space exhausted".to_owned(),
        })?;
        self.arena.push(Cell::Open(match kind {
            ContainerKind::Array => Value::Array(Vec::new()),
            ContainerKind::Dictionary => Value::Dict(Dictionary::new()),
        }));
        Ok(ContainerHandle::from_raw(raw))
    }

    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str) {
        let value = match parse_scalar(kind, text) {
            Ok(v) => v,
            Err(err) => {
                self.violation(err.to_string());
                Value::Str(text.to_owned())
            }
        };
        self.place(slot, value);
    }

    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle) {
        let taken = usize::try_from(child.raw())
            .ok()
            .and_then(|idx| self.arena.get_mut(idx))
            .map(|cell| core::mem::replace(cell, Cell::Linked));
        match taken {
            Some(Cell::Open(value)) => self.place(slot, value),
            Some(Cell::Linked) => self.violation(format!("{child} linked twice")),
            None => self.violation(format!("{child} was never allocated")),
        }
    }

    fn release_all_session_containers(&mut self) {
        self.arena.clear();
        self.root = Dictionary::new();
        if self.in_session {
            self.sessions += 1;
        }
        self.in_session = false;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;
    use crate::{encode_with, EncodeError};

    fn sample() -> Dictionary {
        let nested: Dictionary = [("deep", Value::from(vec![Value::Null, Value::F32(0.25)]))]
            .into_iter()
            .collect();
        [
            ("name", Value::from("purchase")),
            ("qty", Value::I32(2)),
            ("meta", Value::Dict(nested)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn rebuilds_the_encoded_tree() {
        let mut arena = ArenaBoundary::new();
        let root = sample();
        let rebuilt = encode_with(&mut arena, &root, ArenaBoundary::take_root).expect("encode");
        assert_eq!(rebuilt, root);
        assert!(arena.violations().is_empty(), "{:?}", arena.violations());
    }

    #[test]
    fn release_clears_everything() {
        let mut arena = ArenaBoundary::new();
        encode_with(&mut arena, &sample(), |_| ()).expect("encode");
        assert_eq!(arena.live_containers(), 0);
        assert!(arena.root().is_empty());
        assert!(!arena.in_session());
        assert_eq!(arena.sessions(), 1);
    }

    #[test]
    fn exhaustion_aborts_and_releases() {
        let mut arena = ArenaBoundary::with_capacity_limit(1);
        let mut dispatched = false;
        let err = encode_with(&mut arena, &sample(), |_| dispatched = true).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::ContainerAllocation {
                kind: ContainerKind::Array,
                depth: 2,
                ..
            }
        ));
        assert!(!dispatched, "dispatch must not run after a failed encode");
        assert_eq!(arena.live_containers(), 0);
        assert!(!arena.in_session());
    }

    #[test]
    fn stale_handle_from_previous_session_is_rejected() {
        let mut arena = ArenaBoundary::new();
        arena.begin_session();
        let h = arena
            .allocate_container(ContainerKind::Dictionary)
            .expect("alloc");
        arena.release_all_session_containers();

        arena.begin_session();
        arena.push_scalar(Slot::Entry { dict: h, key: "k" }, ScalarKind::Int32, "1");
        assert_eq!(arena.violations().len(), 1);
        arena.release_all_session_containers();
    }
}
