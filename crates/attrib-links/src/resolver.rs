// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arrival-order reconciliation between native results and app consumers.
//!
//! Two independent tracks:
//!
//! - **Record track**: [`LinkResolver::on_link_resolved`] stores a full
//!   [`LinkParams`] and tries to deliver. A singular consumer gets the whole
//!   record with no TTL. Otherwise a deferred consumer gets only the deep-link
//!   field, and only while the record is younger than the TTL. The slot is
//!   cleared on any delivery attempt that finds a consumer.
//! - **String track**: [`LinkResolver::on_simple_deep_link`] delivers a bare
//!   link to the deferred consumer immediately or caches it. The TTL is
//!   checked when a deferred consumer registers, and the slot is cleared then,
//!   delivered or not.
//!
//! Device attribution, device-id and conversion-value notifications are
//! forwarded to their consumers as they arrive and never cached.
//!
//! Everything runs on the caller's thread; no timers, no locks.

use attrib_value::Dictionary;
use tracing::{debug, trace, warn};

use crate::cache::{PendingLinkCache, ResolvedLinkRecord};
use crate::clock::{Clock, SystemClock};
use crate::params::{ConversionValues, DdlTimeout, LinkParams, ShortLinkParams};
use crate::registry::{
    ConsumerRole, ConversionValueConsumer, ConversionValuesConsumer, DeferredLinkConsumer,
    DeviceAttributionConsumer, HandlerRegistry, SdidConsumer, SdidEvent, ShortLinkCallback,
    SingularLinkConsumer, Slot,
};
use crate::LinkError;

/// Deferred-link state machine plus the small one-shot callbacks that ride
/// along with it.
pub struct LinkResolver<C = SystemClock> {
    clock: C,
    ddl_timeout: DdlTimeout,
    resolved: ResolvedLinkRecord,
    pending: PendingLinkCache,
    registry: HandlerRegistry,
    short_link: Option<Box<dyn ShortLinkCallback>>,
}

impl LinkResolver<SystemClock> {
    /// Resolver on the system clock.
    pub fn with_system_clock(ddl_timeout: DdlTimeout) -> Self {
        Self::new(SystemClock, ddl_timeout)
    }
}

impl<C: Clock> LinkResolver<C> {
    /// Empty resolver.
    pub fn new(clock: C, ddl_timeout: DdlTimeout) -> Self {
        Self {
            clock,
            ddl_timeout,
            resolved: ResolvedLinkRecord::default(),
            pending: PendingLinkCache::default(),
            registry: HandlerRegistry::default(),
            short_link: None,
        }
    }

    /// Change the TTL. Applies to every later delivery attempt, including
    /// entries already cached.
    pub fn set_ddl_timeout(&mut self, ddl_timeout: DdlTimeout) {
        self.ddl_timeout = ddl_timeout;
    }

    /// Current TTL.
    pub const fn ddl_timeout(&self) -> DdlTimeout {
        self.ddl_timeout
    }

    // ── inbound from the native layer ──────────────────────────────────

    /// A full link record resolved.
    pub fn on_link_resolved(&mut self, params: LinkParams) {
        let now = self.clock.now_secs();
        if self.resolved.is_occupied() {
            debug!("replacing unconsumed link record");
        }
        self.resolved.store(params, now);
        self.resolve_record();
    }

    /// [`Self::on_link_resolved`] for the native JSON form.
    pub fn on_link_resolved_json(&mut self, json: &str) -> Result<(), LinkError> {
        let params: LinkParams =
            serde_json::from_str(json).map_err(LinkError::malformed("link record"))?;
        self.on_link_resolved(params);
        Ok(())
    }

    /// A bare deep-link string arrived. Empty text means "no link".
    pub fn on_simple_deep_link(&mut self, message: Option<&str>) {
        let message = message.filter(|m| !m.is_empty());
        if lend_to(&mut self.registry.deferred, |c| c.on_deep_link(message)) {
            trace!("delivered deep link immediately");
            return;
        }
        let now = self.clock.now_secs();
        if self.pending.is_occupied() {
            debug!("overwriting uncollected deep link");
        }
        self.pending.store(message.map(str::to_owned), now);
    }

    /// Device attribution data arrived (JSON object). Not cached: without a
    /// consumer it is dropped.
    pub fn on_device_attribution(&mut self, json: &str) -> Result<(), LinkError> {
        let attributes =
            Dictionary::from_json_str(json).map_err(|e| LinkError::Malformed {
                what: "device attribution",
                detail: e.to_string(),
            })?;
        if !lend_to(&mut self.registry.attribution, |c| c.on_attribution(&attributes)) {
            debug!("device attribution dropped: no consumer");
        }
        Ok(())
    }

    /// The custom device id from the config was applied.
    pub fn on_sdid_set(&mut self, sdid: &str) {
        self.notify_sdid(SdidEvent::Set(sdid));
    }

    /// The server assigned a device id.
    pub fn on_sdid_received(&mut self, sdid: &str) {
        self.notify_sdid(SdidEvent::Received(sdid));
    }

    /// A fine conversion value arrived as decimal text.
    pub fn on_conversion_value(&mut self, text: &str) -> Result<(), LinkError> {
        let value: i32 = text.trim().parse().map_err(|e: core::num::ParseIntError| {
            LinkError::Malformed {
                what: "conversion value",
                detail: e.to_string(),
            }
        })?;
        if !lend_to(&mut self.registry.conversion_value, |c| c.on_conversion_value(value)) {
            debug!(value, "conversion value dropped: no consumer");
        }
        Ok(())
    }

    /// Combined conversion values arrived (`{"value", "coarse", "lock"}`).
    /// A JSON `null` carries nothing and is ignored.
    pub fn on_conversion_values(&mut self, json: &str) -> Result<(), LinkError> {
        let values: Option<ConversionValues> =
            serde_json::from_str(json).map_err(LinkError::malformed("conversion values"))?;
        let Some(values) = values else {
            debug!("empty conversion values ignored");
            return Ok(());
        };
        if !lend_to(&mut self.registry.conversion_values, |c| c.on_conversion_values(values)) {
            debug!(?values, "conversion values dropped: no consumer");
        }
        Ok(())
    }

    /// A short-link request completed (`{"data": …, "error": …}`).
    pub fn on_short_link_resolved(&mut self, json: &str) -> Result<(), LinkError> {
        let params: ShortLinkParams =
            serde_json::from_str(json).map_err(LinkError::malformed("short link result"))?;
        match self.short_link.take() {
            Some(callback) => callback.on_short_link(params.normalized()),
            None => debug!("short link result with no pending request"),
        }
        Ok(())
    }

    // ── consumer registration ─────────────────────────────────────────

    /// Register the singular-link consumer and flush a waiting record to it.
    pub fn set_singular_link_consumer(&mut self, consumer: impl SingularLinkConsumer + 'static) {
        if self.registry.set_singular(Box::new(consumer)) {
            debug!(role = ?ConsumerRole::SingularLink, "consumer replaced");
        }
        self.resolve_record();
    }

    /// Register the deferred-link consumer. A cached bare link is delivered if
    /// still inside the TTL (checked now) and the cache is cleared either way;
    /// then a waiting record, if any, gets a delivery attempt.
    pub fn set_deferred_link_consumer(&mut self, consumer: impl DeferredLinkConsumer + 'static) {
        if self.registry.set_deferred(Box::new(consumer)) {
            debug!(role = ?ConsumerRole::DeferredLink, "consumer replaced");
        }
        self.flush_pending();
        self.resolve_record();
    }

    /// Register the device-attribution consumer.
    pub fn set_device_attribution_consumer(
        &mut self,
        consumer: impl DeviceAttributionConsumer + 'static,
    ) {
        self.registry.set_attribution(Box::new(consumer));
    }

    /// Register the device-id consumer.
    pub fn set_sdid_consumer(&mut self, consumer: impl SdidConsumer + 'static) {
        self.registry.set_sdid(Box::new(consumer));
    }

    /// Register the fine conversion-value consumer.
    pub fn set_conversion_value_consumer(
        &mut self,
        consumer: impl ConversionValueConsumer + 'static,
    ) {
        self.registry.set_conversion_value(Box::new(consumer));
    }

    /// Register the combined conversion-values consumer.
    pub fn set_conversion_values_consumer(
        &mut self,
        consumer: impl ConversionValuesConsumer + 'static,
    ) {
        self.registry.set_conversion_values(Box::new(consumer));
    }

    /// Store the one-shot callback for the next short-link result,
    /// replacing any earlier one that never fired.
    pub fn expect_short_link(&mut self, callback: impl ShortLinkCallback + 'static) {
        if self.short_link.replace(Box::new(callback)).is_some() {
            warn!("previous short link request abandoned");
        }
    }

    /// Unregister the consumer for `role`. Cached results stay cached.
    pub fn clear_consumer(&mut self, role: ConsumerRole) {
        self.registry.clear(role);
    }

    /// Drop all cached state and consumers.
    pub fn reset(&mut self) {
        self.resolved.clear();
        self.pending.clear();
        self.registry.clear_all();
        self.short_link = None;
    }

    // ── introspection ─────────────────────────────────────────────────

    /// True while a bare deep link waits in the cache.
    pub const fn has_pending_link(&self) -> bool {
        self.pending.is_occupied()
    }

    /// True while a link record waits for a consumer.
    pub const fn has_resolved_record(&self) -> bool {
        self.resolved.is_occupied()
    }

    /// True when a consumer is registered for `role`.
    pub const fn is_registered(&self, role: ConsumerRole) -> bool {
        self.registry.is_registered(role)
    }

    // ── delivery ──────────────────────────────────────────────────────

    fn resolve_record(&mut self) {
        if !self.resolved.is_occupied() {
            return;
        }
        let now = self.clock.now_secs();
        let ttl = self.ddl_timeout;

        if self.registry.is_registered(ConsumerRole::SingularLink) {
            let Some(record) = self.resolved.take() else {
                return;
            };
            trace!("delivering link record to singular consumer");
            lend_to(&mut self.registry.singular, |c| c.on_resolved(record.params));
        } else if self.registry.is_registered(ConsumerRole::DeferredLink) {
            let Some(record) = self.resolved.take() else {
                return;
            };
            let elapsed = now.saturating_sub(record.resolved_at);
            if ttl.admits(elapsed) {
                trace!(elapsed, "delivering record deep link to deferred consumer");
                let link = record.params.deeplink.as_deref();
                lend_to(&mut self.registry.deferred, |c| c.on_deep_link(link));
            } else {
                debug!(elapsed, ttl = ttl.effective_secs(), "stale link record dropped");
            }
        } else {
            trace!("link record pending: no consumer");
        }
    }

    fn flush_pending(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let elapsed = self.clock.now_secs().saturating_sub(pending.cached_at);
        if !self.ddl_timeout.admits(elapsed) {
            debug!(elapsed, ttl = self.ddl_timeout.effective_secs(), "stale deep link dropped");
            return;
        }
        let Some(message) = pending.message else {
            debug!("cached \"no link\" result cleared");
            return;
        };
        trace!(elapsed, "delivering cached deep link");
        lend_to(&mut self.registry.deferred, |c| c.on_deep_link(Some(&message)));
    }

    fn notify_sdid(&mut self, event: SdidEvent<'_>) {
        if !lend_to(&mut self.registry.sdid, |c| c.on_sdid(event)) {
            debug!(?event, "device id notification dropped: no consumer");
        }
    }
}

/// Run `call` on the consumer in `slot`, which stays out of the slot for the
/// duration. Returns false when nobody is registered.
fn lend_to<T: ?Sized>(slot: &mut Slot<T>, call: impl FnOnce(&mut T)) -> bool {
    let Some(mut lent) = slot.lend() else {
        return false;
    };
    call(&mut *lent.consumer);
    if !slot.give_back(lent) {
        debug!("consumer replaced during its own delivery");
    }
    true
}

impl<C> core::fmt::Debug for LinkResolver<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkResolver")
            .field("ddl_timeout", &self.ddl_timeout)
            .field("resolved", &self.resolved)
            .field("pending", &self.pending)
            .field("registry", &self.registry)
            .field("short_link_pending", &self.short_link.is_some())
            .finish_non_exhaustive()
    }
}
