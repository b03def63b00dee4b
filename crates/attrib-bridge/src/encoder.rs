// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Depth-first, pre-order tree encoder.

use attrib_value::{Dictionary, Shape, Value};
use tracing::{debug, trace};

use crate::{BoundaryPort, ContainerHandle, ContainerKind, EncodeError, Slot};

/// One Init…Free bracket on a [`BoundaryPort`].
///
/// Opening the session calls [`BoundaryPort::begin_session`]; dropping it
/// calls [`BoundaryPort::release_all_session_containers`], so partial state is
/// freed on every exit path.
pub struct EncodeSession<'p, P: BoundaryPort + ?Sized> {
    port: &'p mut P,
    containers: usize,
}

impl<'p, P: BoundaryPort + ?Sized> EncodeSession<'p, P> {
    /// Begin a session on `port`.
    pub fn open(port: &'p mut P) -> Self {
        port.begin_session();
        Self {
            port,
            containers: 0,
        }
    }

    /// Encode every entry of `root` under the session's root dictionary.
    pub fn encode_root(&mut self, root: &Dictionary) -> Result<(), EncodeError> {
        for (key, value) in root.iter() {
            self.encode_value(Slot::Root { key }, value, 1)?;
        }
        Ok(())
    }

    /// Encode a single root entry.
    pub fn encode_entry(&mut self, key: &str, value: &Value) -> Result<(), EncodeError> {
        self.encode_value(Slot::Root { key }, value, 1)
    }

    /// Containers allocated so far in this session.
    pub const fn containers_allocated(&self) -> usize {
        self.containers
    }

    /// The port, for the call that consumes the encoded root (e.g. sending an
    /// event) before the session is released.
    pub fn port_mut(&mut self) -> &mut P {
        self.port
    }

    fn encode_value(
        &mut self,
        slot: Slot<'_>,
        value: &Value,
        depth: usize,
    ) -> Result<(), EncodeError> {
        match value.shape() {
            Shape::Leaf(scalar) => {
                trace!(key = ?slot.key(), kind = ?scalar.kind, "push scalar");
                self.port.push_scalar(slot, scalar.kind, &scalar.text);
            }
            Shape::Dict(dict) => {
                let handle = self.allocate(ContainerKind::Dictionary, depth)?;
                for (key, child) in dict.iter() {
                    self.encode_value(Slot::Entry { dict: handle, key }, child, depth + 1)?;
                }
                self.port.link_child(slot, handle);
            }
            Shape::Array(items) => {
                let handle = self.allocate(ContainerKind::Array, depth)?;
                for child in items {
                    self.encode_value(Slot::Append { array: handle }, child, depth + 1)?;
                }
                self.port.link_child(slot, handle);
            }
        }
        Ok(())
    }

    fn allocate(
        &mut self,
        kind: ContainerKind,
        depth: usize,
    ) -> Result<ContainerHandle, EncodeError> {
        let handle = self
            .port
            .allocate_container(kind)
            .map_err(|source| EncodeError::ContainerAllocation {
                kind,
                depth,
                source,
            })?;
        self.containers += 1;
        trace!(%handle, ?kind, depth, "allocated container");
        Ok(handle)
    }
}

impl<P: BoundaryPort + ?Sized> Drop for EncodeSession<'_, P> {
    fn drop(&mut self) {
        self.port.release_all_session_containers();
    }
}

impl<P: BoundaryPort + ?Sized> core::fmt::Debug for EncodeSession<'_, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncodeSession")
            .field("containers", &self.containers)
            .finish_non_exhaustive()
    }
}

/// Encode `root`, then hand the port to `dispatch` while the encoded tree is
/// still live, then release the session.
///
/// `dispatch` runs only if encoding succeeded. Either way every container
/// allocated during the walk is released before this returns.
pub fn encode_with<P, R>(
    port: &mut P,
    root: &Dictionary,
    dispatch: impl FnOnce(&mut P) -> R,
) -> Result<R, EncodeError>
where
    P: BoundaryPort + ?Sized,
{
    let mut session = EncodeSession::open(port);
    if let Err(err) = session.encode_root(root) {
        debug!(error = %err, "encode session aborted");
        return Err(err);
    }
    debug!(
        entries = root.len(),
        containers = session.containers_allocated(),
        "encoded payload"
    );
    Ok(dispatch(session.port_mut()))
}

/// Encode a flat list of `(key, value)` parameters as root entries.
///
/// Later duplicates are pushed after earlier ones; the native root dictionary
/// keeps the last write.
pub fn encode_pairs<P, R>(
    port: &mut P,
    pairs: &[(String, Value)],
    dispatch: impl FnOnce(&mut P) -> R,
) -> Result<R, EncodeError>
where
    P: BoundaryPort + ?Sized,
{
    let mut session = EncodeSession::open(port);
    for (key, value) in pairs {
        session.encode_entry(key, value)?;
    }
    Ok(dispatch(session.port_mut()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    use super::*;
    use crate::{BoundaryCall, RecordingBoundary, Target};
    use attrib_value::ScalarKind;

    #[test]
    fn scalar_root_entries_push_without_containers() {
        let mut rec = RecordingBoundary::default();
        let root: Dictionary = [("n", Value::I32(3)), ("s", Value::from("x"))]
            .into_iter()
            .collect();
        encode_with(&mut rec, &root, |_| ()).expect("encode");
        assert_eq!(
            rec.calls(),
            [
                BoundaryCall::BeginSession,
                BoundaryCall::push_root("n", ScalarKind::Int32, "3"),
                BoundaryCall::push_root("s", ScalarKind::String, "x"),
                BoundaryCall::ReleaseAll,
            ]
        );
    }

    #[test]
    fn nested_containers_fill_before_link() {
        let mut rec = RecordingBoundary::default();
        let inner: Dictionary = [("k", Value::Null)].into_iter().collect();
        let root: Dictionary = [("list", Value::Array(vec![Value::Dict(inner)]))]
            .into_iter()
            .collect();
        encode_with(&mut rec, &root, |_| ()).expect("encode");

        let arr = ContainerHandle::from_raw(0);
        let dict = ContainerHandle::from_raw(1);
        assert_eq!(
            rec.calls(),
            [
                BoundaryCall::BeginSession,
                BoundaryCall::Allocate {
                    kind: ContainerKind::Array,
                    handle: arr
                },
                BoundaryCall::Allocate {
                    kind: ContainerKind::Dictionary,
                    handle: dict
                },
                BoundaryCall::PushScalar {
                    target: Target::Entry(dict, "k".into()),
                    kind: ScalarKind::Null,
                    text: String::new(),
                },
                BoundaryCall::LinkChild {
                    target: Target::Append(arr),
                    child: dict
                },
                BoundaryCall::LinkChild {
                    target: Target::Root("list".into()),
                    child: arr
                },
                BoundaryCall::ReleaseAll,
            ]
        );
    }

    #[test]
    fn dispatch_runs_inside_the_session() {
        let mut rec = RecordingBoundary::default();
        let root: Dictionary = [("a", 1)].into_iter().collect();
        let seen = encode_with(&mut rec, &root, |port| port.calls().len()).expect("encode");
        // BeginSession + one push, release not yet recorded.
        assert_eq!(seen, 2);
        assert_eq!(rec.calls().last(), Some(&BoundaryCall::ReleaseAll));
    }

    #[test]
    fn pairs_encode_in_given_order() {
        let mut rec = RecordingBoundary::default();
        let pairs = vec![
            ("b".to_owned(), Value::I64(2)),
            ("a".to_owned(), Value::F64(0.5)),
        ];
        encode_pairs(&mut rec, &pairs, |_| ()).expect("encode");
        assert_eq!(rec.calls()[1], BoundaryCall::push_root("b", ScalarKind::Int64, "2"));
        assert_eq!(rec.calls()[2], BoundaryCall::push_root("a", ScalarKind::Float64, "0.5"));
    }

    #[test]
    fn unwinding_dispatch_still_releases() {
        let mut rec = RecordingBoundary::default();
        let root: Dictionary = [("a", 1)].into_iter().collect();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            encode_with(&mut rec, &root, |_| panic!("host blew up"))
        }));
        assert!(outcome.is_err());
        assert_eq!(rec.calls().last(), Some(&BoundaryCall::ReleaseAll));
    }
}
