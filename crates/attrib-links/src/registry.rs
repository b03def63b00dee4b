// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Consumer roles and the one-handler-per-role registry.
//!
//! A consumer is lent out of its slot while it runs. If it is replaced or
//! cleared during its own call (possible when the host re-enters through a
//! foreign interface), the running box stays alive until the call returns and
//! the newer registration wins.

use core::fmt;

use attrib_value::Dictionary;

use crate::params::{ConversionValues, LinkParams, ShortLinkParams};

/// Receives full link records. Takes priority over [`DeferredLinkConsumer`].
pub trait SingularLinkConsumer {
    /// A link record resolved.
    fn on_resolved(&mut self, params: LinkParams);
}

/// Receives only the deep-link string of a deferred result.
pub trait DeferredLinkConsumer {
    /// A deferred deep link arrived; `None` means the install had no link.
    fn on_deep_link(&mut self, link: Option<&str>);
}

/// Receives device-level attribution data.
pub trait DeviceAttributionConsumer {
    /// Attribution attributes for this device.
    fn on_attribution(&mut self, attributes: &Dictionary);
}

/// What the native side reported about the device id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdidEvent<'a> {
    /// The custom id from the config was applied.
    Set(&'a str),
    /// The server assigned an id.
    Received(&'a str),
}

/// Receives device-id notifications.
pub trait SdidConsumer {
    /// A device-id notification arrived.
    fn on_sdid(&mut self, event: SdidEvent<'_>);
}

/// Receives single conversion-value updates.
pub trait ConversionValueConsumer {
    /// The fine conversion value changed.
    fn on_conversion_value(&mut self, value: i32);
}

/// Receives combined conversion-value updates.
pub trait ConversionValuesConsumer {
    /// Fine value, coarse value, and lock state changed.
    fn on_conversion_values(&mut self, values: ConversionValues);
}

/// One-shot completion for a short-link request.
pub trait ShortLinkCallback {
    /// Invoked once with the generated link or an error.
    fn on_short_link(self: Box<Self>, result: ShortLinkParams);
}

impl<F: FnMut(LinkParams)> SingularLinkConsumer for F {
    fn on_resolved(&mut self, params: LinkParams) {
        self(params);
    }
}

impl<F: FnMut(Option<&str>)> DeferredLinkConsumer for F {
    fn on_deep_link(&mut self, link: Option<&str>) {
        self(link);
    }
}

impl<F: FnMut(&Dictionary)> DeviceAttributionConsumer for F {
    fn on_attribution(&mut self, attributes: &Dictionary) {
        self(attributes);
    }
}

impl<F: FnMut(SdidEvent<'_>)> SdidConsumer for F {
    fn on_sdid(&mut self, event: SdidEvent<'_>) {
        self(event);
    }
}

impl<F: FnMut(i32)> ConversionValueConsumer for F {
    fn on_conversion_value(&mut self, value: i32) {
        self(value);
    }
}

impl<F: FnMut(ConversionValues)> ConversionValuesConsumer for F {
    fn on_conversion_values(&mut self, values: ConversionValues) {
        self(values);
    }
}

impl<F: FnOnce(ShortLinkParams)> ShortLinkCallback for F {
    fn on_short_link(self: Box<Self>, result: ShortLinkParams) {
        (*self)(result);
    }
}

/// Consumer role, for logs and registration bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConsumerRole {
    /// [`SingularLinkConsumer`].
    SingularLink,
    /// [`DeferredLinkConsumer`].
    DeferredLink,
    /// [`DeviceAttributionConsumer`].
    DeviceAttribution,
    /// [`SdidConsumer`].
    Sdid,
    /// [`ConversionValueConsumer`].
    ConversionValue,
    /// [`ConversionValuesConsumer`].
    ConversionValues,
}

/// A consumer taken out of its slot for the duration of one call.
pub(crate) struct Lent<T: ?Sized> {
    pub(crate) consumer: Box<T>,
    revision: u64,
}

/// One registration slot. `revision` moves on every set or clear so a lent
/// consumer can tell whether it was superseded while out.
pub(crate) struct Slot<T: ?Sized> {
    consumer: Option<Box<T>>,
    revision: u64,
}

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self {
            consumer: None,
            revision: 0,
        }
    }
}

impl<T: ?Sized> Slot<T> {
    fn set(&mut self, consumer: Box<T>) -> bool {
        self.revision = self.revision.wrapping_add(1);
        self.consumer.replace(consumer).is_some()
    }

    fn clear(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.consumer = None;
    }

    const fn is_set(&self) -> bool {
        self.consumer.is_some()
    }

    pub(crate) fn lend(&mut self) -> Option<Lent<T>> {
        let consumer = self.consumer.take()?;
        Some(Lent {
            consumer,
            revision: self.revision,
        })
    }

    /// Put `lent` back unless the slot changed while it was out. Returns
    /// whether it went back.
    pub(crate) fn give_back(&mut self, lent: Lent<T>) -> bool {
        if self.revision == lent.revision && self.consumer.is_none() {
            self.consumer = Some(lent.consumer);
            true
        } else {
            false
        }
    }
}

/// At most one consumer per role. Registering again replaces the previous one.
#[derive(Default)]
pub struct HandlerRegistry {
    pub(crate) singular: Slot<dyn SingularLinkConsumer>,
    pub(crate) deferred: Slot<dyn DeferredLinkConsumer>,
    pub(crate) attribution: Slot<dyn DeviceAttributionConsumer>,
    pub(crate) sdid: Slot<dyn SdidConsumer>,
    pub(crate) conversion_value: Slot<dyn ConversionValueConsumer>,
    pub(crate) conversion_values: Slot<dyn ConversionValuesConsumer>,
}

impl HandlerRegistry {
    /// Install the singular-link consumer; returns true if one was replaced.
    pub fn set_singular(&mut self, consumer: Box<dyn SingularLinkConsumer>) -> bool {
        self.singular.set(consumer)
    }

    /// Install the deferred-link consumer; returns true if one was replaced.
    pub fn set_deferred(&mut self, consumer: Box<dyn DeferredLinkConsumer>) -> bool {
        self.deferred.set(consumer)
    }

    /// Install the device-attribution consumer; returns true if one was replaced.
    pub fn set_attribution(&mut self, consumer: Box<dyn DeviceAttributionConsumer>) -> bool {
        self.attribution.set(consumer)
    }

    /// Install the device-id consumer; returns true if one was replaced.
    pub fn set_sdid(&mut self, consumer: Box<dyn SdidConsumer>) -> bool {
        self.sdid.set(consumer)
    }

    /// Install the conversion-value consumer; returns true if one was replaced.
    pub fn set_conversion_value(&mut self, consumer: Box<dyn ConversionValueConsumer>) -> bool {
        self.conversion_value.set(consumer)
    }

    /// Install the conversion-values consumer; returns true if one was replaced.
    pub fn set_conversion_values(&mut self, consumer: Box<dyn ConversionValuesConsumer>) -> bool {
        self.conversion_values.set(consumer)
    }

    /// Remove the consumer for `role`.
    pub fn clear(&mut self, role: ConsumerRole) {
        match role {
            ConsumerRole::SingularLink => self.singular.clear(),
            ConsumerRole::DeferredLink => self.deferred.clear(),
            ConsumerRole::DeviceAttribution => self.attribution.clear(),
            ConsumerRole::Sdid => self.sdid.clear(),
            ConsumerRole::ConversionValue => self.conversion_value.clear(),
            ConsumerRole::ConversionValues => self.conversion_values.clear(),
        }
    }

    /// Remove every consumer.
    pub fn clear_all(&mut self) {
        self.singular.clear();
        self.deferred.clear();
        self.attribution.clear();
        self.sdid.clear();
        self.conversion_value.clear();
        self.conversion_values.clear();
    }

    /// True when `role` has a consumer.
    pub const fn is_registered(&self, role: ConsumerRole) -> bool {
        match role {
            ConsumerRole::SingularLink => self.singular.is_set(),
            ConsumerRole::DeferredLink => self.deferred.is_set(),
            ConsumerRole::DeviceAttribution => self.attribution.is_set(),
            ConsumerRole::Sdid => self.sdid.is_set(),
            ConsumerRole::ConversionValue => self.conversion_value.is_set(),
            ConsumerRole::ConversionValues => self.conversion_values.is_set(),
        }
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("singular", &self.singular.is_set())
            .field("deferred", &self.deferred.is_set())
            .field("attribution", &self.attribution.is_set())
            .field("sdid", &self.sdid.is_set())
            .field("conversion_value", &self.conversion_value.is_set())
            .field("conversion_values", &self.conversion_values.is_set())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    fn noop_deferred() -> Box<dyn DeferredLinkConsumer> {
        Box::new(|_: Option<&str>| {})
    }

    #[test]
    fn lent_consumer_returns_to_an_untouched_slot() {
        let mut reg = HandlerRegistry::default();
        reg.set_deferred(noop_deferred());
        let lent = reg.deferred.lend().expect("registered");
        assert!(!reg.is_registered(ConsumerRole::DeferredLink));
        assert!(reg.deferred.give_back(lent));
        assert!(reg.is_registered(ConsumerRole::DeferredLink));
    }

    #[test]
    fn replacement_while_lent_wins() {
        let mut reg = HandlerRegistry::default();
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        reg.set_deferred(noop_deferred());
        let lent = reg.deferred.lend().expect("registered");

        let counter = std::rc::Rc::clone(&seen);
        reg.set_deferred(Box::new(move |_: Option<&str>| counter.set(counter.get() + 1)));
        assert!(!reg.deferred.give_back(lent));

        let mut current = reg.deferred.lend().expect("replacement kept");
        current.consumer.on_deep_link(None);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn clear_while_lent_sticks() {
        let mut reg = HandlerRegistry::default();
        reg.set_deferred(noop_deferred());
        let lent = reg.deferred.lend().expect("registered");
        reg.clear(ConsumerRole::DeferredLink);
        assert!(!reg.deferred.give_back(lent));
        assert!(!reg.is_registered(ConsumerRole::DeferredLink));
    }

    #[test]
    fn clear_all_empties_every_role() {
        let mut reg = HandlerRegistry::default();
        reg.set_deferred(noop_deferred());
        reg.set_conversion_value(Box::new(|_: i32| {}));
        reg.set_sdid(Box::new(|_: SdidEvent<'_>| {}));
        reg.clear_all();
        assert!(!reg.is_registered(ConsumerRole::DeferredLink));
        assert!(!reg.is_registered(ConsumerRole::ConversionValue));
        assert!(!reg.is_registered(ConsumerRole::Sdid));
    }
}
