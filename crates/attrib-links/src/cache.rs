// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Single-slot holders for results that arrived before a consumer.
//!
//! Both slots are last-write-wins and are emptied by `take`, so whatever the
//! resolver does with a taken entry (deliver or drop) happens at most once.

use crate::clock::Timestamp;
use crate::params::LinkParams;

/// Bare deep-link string waiting for a deferred consumer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingLinkCache {
    message: Option<String>,
    cached_at: Option<Timestamp>,
}

/// Entry taken out of a [`PendingLinkCache`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingLink {
    /// Link text; `None` is an explicit "no link".
    pub message: Option<String>,
    /// When it was cached.
    pub cached_at: Timestamp,
}

impl PendingLinkCache {
    /// Store `message`, replacing any uncollected entry.
    pub fn store(&mut self, message: Option<String>, now: Timestamp) {
        self.message = message;
        self.cached_at = Some(now);
    }

    /// Empty the slot, returning what it held.
    pub fn take(&mut self) -> Option<PendingLink> {
        let cached_at = self.cached_at.take()?;
        Some(PendingLink {
            message: self.message.take(),
            cached_at,
        })
    }

    /// True while an entry is waiting.
    pub const fn is_occupied(&self) -> bool {
        self.cached_at.is_some()
    }

    /// Drop any entry.
    pub fn clear(&mut self) {
        self.message = None;
        self.cached_at = None;
    }
}

/// Rich link record waiting for a consumer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedLinkRecord {
    full_params: Option<LinkParams>,
    resolved_at: Option<Timestamp>,
}

/// Entry taken out of a [`ResolvedLinkRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLink {
    /// The attribution record.
    pub params: LinkParams,
    /// When it arrived.
    pub resolved_at: Timestamp,
}

impl ResolvedLinkRecord {
    /// Store `params`, replacing any unconsumed record.
    pub fn store(&mut self, params: LinkParams, now: Timestamp) {
        self.full_params = Some(params);
        self.resolved_at = Some(now);
    }

    /// Empty the slot, returning what it held.
    pub fn take(&mut self) -> Option<ResolvedLink> {
        let params = self.full_params.take()?;
        let resolved_at = self.resolved_at.take().unwrap_or_default();
        Some(ResolvedLink {
            params,
            resolved_at,
        })
    }

    /// True while a record is waiting.
    pub const fn is_occupied(&self) -> bool {
        self.full_params.is_some()
    }

    /// Drop any record.
    pub fn clear(&mut self) {
        self.full_params = None;
        self.resolved_at = None;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn pending_is_last_write_wins() {
        let mut cache = PendingLinkCache::default();
        cache.store(Some("first".into()), 1);
        cache.store(Some("second".into()), 2);
        let taken = cache.take().expect("occupied");
        assert_eq!(taken.message.as_deref(), Some("second"));
        assert_eq!(taken.cached_at, 2);
        assert!(cache.take().is_none());
    }

    #[test]
    fn pending_no_link_still_occupies() {
        let mut cache = PendingLinkCache::default();
        cache.store(None, 5);
        assert!(cache.is_occupied());
        assert_eq!(cache.take().map(|p| p.message), Some(None));
    }

    #[test]
    fn record_take_empties_slot() {
        let mut rec = ResolvedLinkRecord::default();
        rec.store(LinkParams::default(), 3);
        assert!(rec.is_occupied());
        assert_eq!(rec.take().map(|r| r.resolved_at), Some(3));
        assert!(!rec.is_occupied());
    }
}
