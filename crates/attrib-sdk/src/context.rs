// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The process-scoped SDK handle.

use attrib_bridge::{encode_pairs, encode_with};
use attrib_links::{
    Clock, ConversionValueConsumer, ConversionValuesConsumer, DdlTimeout, DeferredLinkConsumer,
    DeviceAttributionConsumer, LinkError, LinkResolver, SdidConsumer, ShortLinkCallback,
    SingularLinkConsumer, SystemClock,
};
use attrib_value::{format_scalar, Dictionary, ScalarKind, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::{GlobalProperty, SdkConfig};
use crate::engine::{NativeEngine, ShortLinkRequest};
use crate::error::SdkError;

/// Lifecycle of an [`SdkContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built but no session started; outbound calls are ignored.
    Created,
    /// Session running.
    Initialized,
    /// Shut down; outbound calls fail with [`SdkError::TornDown`].
    TornDown,
}

/// What happened to an outbound call that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The engine accepted it.
    Sent,
    /// The engine reported failure.
    Declined,
    /// Not sent because the context is not initialized yet.
    Skipped,
    /// Held in the config and sent when the session starts.
    Staged,
}

impl Dispatch {
    const fn from_accepted(accepted: bool) -> Self {
        if accepted {
            Self::Sent
        } else {
            Self::Declined
        }
    }
}

/// Owns the config, the native engine, and the deferred-link resolver.
///
/// Everything runs on the caller's thread. Native callbacks
/// (`on_*` methods) must be delivered on the same thread as consumer
/// registration.
pub struct SdkContext<E, C = SystemClock> {
    config: SdkConfig,
    engine: E,
    links: LinkResolver<C>,
    state: Lifecycle,
}

impl<E: NativeEngine> SdkContext<E, SystemClock> {
    /// Context on the system clock.
    pub fn with_system_clock(config: SdkConfig, engine: E) -> Self {
        Self::new(config, engine, SystemClock)
    }
}

impl<E: NativeEngine, C: Clock> SdkContext<E, C> {
    /// New context in [`Lifecycle::Created`].
    pub fn new(config: SdkConfig, engine: E, clock: C) -> Self {
        let links = LinkResolver::new(clock, config.ddl_timeout());
        Self {
            config,
            engine,
            links,
            state: Lifecycle::Created,
        }
    }

    /// Validate the config and start the native session. A second call on an
    /// initialized context does nothing.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), SdkError> {
        match self.state {
            Lifecycle::Initialized => return Ok(()),
            Lifecycle::TornDown => return Err(SdkError::TornDown),
            Lifecycle::Created => {}
        }
        self.config.validate()?;
        let json = serde_json::to_string(&self.config.to_native_json())?;
        if !self.engine.start_session(&json) {
            warn!("native engine rejected session start");
            return Err(SdkError::SessionRejected);
        }
        self.state = Lifecycle::Initialized;
        info!("attribution session started");
        Ok(())
    }

    /// Drop all cached link state and consumers and refuse further calls.
    pub fn teardown(&mut self) {
        self.links.reset();
        self.state = Lifecycle::TornDown;
        info!("sdk context torn down");
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> Lifecycle {
        self.state
    }

    /// Active configuration.
    pub const fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// The native engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// The native engine, mutably.
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// The deferred-link resolver.
    pub const fn links(&self) -> &LinkResolver<C> {
        &self.links
    }

    /// The deferred-link resolver, mutably.
    pub fn links_mut(&mut self) -> &mut LinkResolver<C> {
        &mut self.links
    }

    /// Change the deferred deep-link TTL for this and later deliveries.
    pub fn set_ddl_timeout(&mut self, secs: i64) {
        self.config.ddl_timeout_sec = Some(secs);
        self.links.set_ddl_timeout(DdlTimeout::from_secs(secs));
    }

    // ── outbound ──────────────────────────────────────────────────────

    /// Send an event with no arguments.
    pub fn send_event(&mut self, name: &str) -> Result<Dispatch, SdkError> {
        if !self.ready("send_event")? {
            return Ok(Dispatch::Skipped);
        }
        Ok(Dispatch::from_accepted(self.engine.send_event(name)))
    }

    /// Send an event with structured arguments.
    pub fn send_event_with_args(
        &mut self,
        name: &str,
        args: &Dictionary,
    ) -> Result<Dispatch, SdkError> {
        if !self.ready("send_event_with_args")? {
            return Ok(Dispatch::Skipped);
        }
        let accepted = encode_with(&mut self.engine, args, |engine| {
            engine.send_event_with_args(name)
        })?;
        Ok(Dispatch::from_accepted(accepted))
    }

    /// Send an event whose arguments are a flat `key, value, key, value, …`
    /// list. Keys are rendered as text; an odd count sends nothing.
    pub fn send_event_with_pairs(
        &mut self,
        name: &str,
        args: &[Value],
    ) -> Result<Dispatch, SdkError> {
        if !self.ready("send_event_with_pairs")? {
            return Ok(Dispatch::Skipped);
        }
        if args.len() % 2 != 0 {
            warn!(
                count = args.len(),
                "event arguments must be key/value pairs; nothing sent"
            );
            return Err(SdkError::UnpairedArguments { count: args.len() });
        }
        let pairs = args
            .chunks_exact(2)
            .enumerate()
            .map(|(i, pair)| {
                let key = key_text(&pair[0]).ok_or(SdkError::InvalidEventKey { index: i * 2 })?;
                Ok((key, pair[1].clone()))
            })
            .collect::<Result<Vec<_>, SdkError>>()?;
        let accepted = encode_pairs(&mut self.engine, &pairs, |engine| {
            engine.send_event_with_args(name)
        })?;
        Ok(Dispatch::from_accepted(accepted))
    }

    /// Start a session carrying launch options. Works before [`Self::init`];
    /// an accepted start initializes the context.
    pub fn start_with_launch_options(
        &mut self,
        options: &Dictionary,
    ) -> Result<Dispatch, SdkError> {
        if self.state == Lifecycle::TornDown {
            return Err(SdkError::TornDown);
        }
        self.config.validate()?;
        let (key, secret) = (&self.config.api_key, &self.config.api_secret);
        let accepted = encode_with(&mut self.engine, options, |engine| {
            engine.start_session_with_launch_options(key, secret)
        })?;
        if accepted && self.state == Lifecycle::Created {
            self.state = Lifecycle::Initialized;
            info!(options = options.len(), "attribution session started with launch options");
        }
        Ok(Dispatch::from_accepted(accepted))
    }

    /// Ask the engine for a referrer short link. `callback` fires once when
    /// the result arrives through [`Self::on_short_link_resolved`].
    pub fn create_referrer_short_link(
        &mut self,
        request: &ShortLinkRequest,
        callback: impl ShortLinkCallback + 'static,
    ) -> Result<Dispatch, SdkError> {
        if !self.ready("create_referrer_short_link")? {
            return Ok(Dispatch::Skipped);
        }
        self.links.expect_short_link(callback);
        Ok(Dispatch::from_accepted(
            self.engine.create_referrer_short_link(request),
        ))
    }

    /// Attach `key = value` to every later event. Before [`Self::init`] the
    /// property is staged in the config and travels with the session start.
    pub fn set_global_property(
        &mut self,
        key: &str,
        value: &str,
        override_existing: bool,
    ) -> Result<Dispatch, SdkError> {
        if self.state == Lifecycle::TornDown {
            return Err(SdkError::TornDown);
        }
        if key.trim().is_empty() {
            warn!("global property with a blank key refused");
            return Err(SdkError::BlankPropertyKey);
        }
        if self.state == Lifecycle::Created {
            debug!(key, "global property staged");
            let property = GlobalProperty {
                key: key.to_owned(),
                value: value.to_owned(),
                override_existing,
            };
            self.config.global_properties.insert(key.to_owned(), property);
            return Ok(Dispatch::Staged);
        }
        Ok(Dispatch::from_accepted(
            self.engine.set_global_property(key, value, override_existing),
        ))
    }

    /// Stop attaching `key` (or drop it from the staged set before init).
    pub fn unset_global_property(&mut self, key: &str) -> Result<Dispatch, SdkError> {
        match self.state {
            Lifecycle::TornDown => Err(SdkError::TornDown),
            Lifecycle::Created => {
                self.config.global_properties.remove(key);
                Ok(Dispatch::Staged)
            }
            Lifecycle::Initialized => {
                self.engine.unset_global_property(key);
                Ok(Dispatch::Sent)
            }
        }
    }

    /// Stop attaching every global property (or drop the staged set).
    pub fn clear_global_properties(&mut self) -> Result<Dispatch, SdkError> {
        match self.state {
            Lifecycle::TornDown => Err(SdkError::TornDown),
            Lifecycle::Created => {
                self.config.global_properties.clear();
                Ok(Dispatch::Staged)
            }
            Lifecycle::Initialized => {
                self.engine.clear_global_properties();
                Ok(Dispatch::Sent)
            }
        }
    }

    // ── consumers ─────────────────────────────────────────────────────

    /// Register the consumer for full link records.
    pub fn set_singular_link_consumer(&mut self, consumer: impl SingularLinkConsumer + 'static) {
        self.links.set_singular_link_consumer(consumer);
    }

    /// Register the consumer for deferred deep links.
    pub fn set_deferred_link_consumer(&mut self, consumer: impl DeferredLinkConsumer + 'static) {
        self.links.set_deferred_link_consumer(consumer);
    }

    /// Register the consumer for device attribution data.
    pub fn set_device_attribution_consumer(
        &mut self,
        consumer: impl DeviceAttributionConsumer + 'static,
    ) {
        self.links.set_device_attribution_consumer(consumer);
    }

    /// Register the consumer for device-id notifications.
    pub fn set_sdid_consumer(&mut self, consumer: impl SdidConsumer + 'static) {
        self.links.set_sdid_consumer(consumer);
    }

    /// Register the consumer for fine conversion-value updates.
    pub fn set_conversion_value_consumer(
        &mut self,
        consumer: impl ConversionValueConsumer + 'static,
    ) {
        self.links.set_conversion_value_consumer(consumer);
    }

    /// Register the consumer for combined conversion-value updates.
    pub fn set_conversion_values_consumer(
        &mut self,
        consumer: impl ConversionValuesConsumer + 'static,
    ) {
        self.links.set_conversion_values_consumer(consumer);
    }

    // ── inbound from the native layer ─────────────────────────────────

    /// Native link-record callback (JSON). Malformed payloads are logged and
    /// dropped; the error is returned for the caller's benefit only.
    pub fn on_link_resolved(&mut self, json: &str) -> Result<(), SdkError> {
        if self.state == Lifecycle::TornDown {
            debug!("link record after teardown ignored");
            return Ok(());
        }
        self.links.on_link_resolved_json(json).map_err(dropped)
    }

    /// Native bare deep-link callback.
    pub fn on_simple_deep_link(&mut self, message: Option<&str>) {
        if self.state == Lifecycle::TornDown {
            debug!("deep link after teardown ignored");
            return;
        }
        self.links.on_simple_deep_link(message);
    }

    /// Native short-link callback (JSON).
    pub fn on_short_link_resolved(&mut self, json: &str) -> Result<(), SdkError> {
        if self.state == Lifecycle::TornDown {
            return Ok(());
        }
        self.links.on_short_link_resolved(json).map_err(dropped)
    }

    /// Native device-attribution callback (JSON object).
    pub fn on_device_attribution(&mut self, json: &str) -> Result<(), SdkError> {
        if self.state == Lifecycle::TornDown {
            return Ok(());
        }
        self.links.on_device_attribution(json).map_err(dropped)
    }

    /// Native callback: the custom device id was applied.
    pub fn on_sdid_set(&mut self, sdid: &str) {
        if self.state != Lifecycle::TornDown {
            self.links.on_sdid_set(sdid);
        }
    }

    /// Native callback: the server assigned a device id.
    pub fn on_sdid_received(&mut self, sdid: &str) {
        if self.state != Lifecycle::TornDown {
            self.links.on_sdid_received(sdid);
        }
    }

    /// Native callback: fine conversion value as decimal text. Text that is
    /// not an integer is logged and dropped.
    pub fn on_conversion_value(&mut self, text: &str) -> Result<(), SdkError> {
        if self.state == Lifecycle::TornDown {
            return Ok(());
        }
        self.links.on_conversion_value(text).map_err(dropped)
    }

    /// Native callback: combined conversion values (JSON).
    pub fn on_conversion_values(&mut self, json: &str) -> Result<(), SdkError> {
        if self.state == Lifecycle::TornDown {
            return Ok(());
        }
        self.links.on_conversion_values(json).map_err(dropped)
    }

    fn ready(&self, op: &'static str) -> Result<bool, SdkError> {
        match self.state {
            Lifecycle::Initialized => Ok(true),
            Lifecycle::Created => {
                debug!(op, "ignored before init");
                Ok(false)
            }
            Lifecycle::TornDown => Err(SdkError::TornDown),
        }
    }
}

fn dropped(err: LinkError) -> SdkError {
    warn!(error = %err, "dropping native payload");
    SdkError::Link(err)
}

/// Text form of an event key; null and containers have none.
fn key_text(value: &Value) -> Option<String> {
    format_scalar(value)
        .filter(|s| s.kind != ScalarKind::Null)
        .map(|s| s.text)
}

impl<E, C> core::fmt::Debug for SdkContext<E, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SdkContext")
            .field("state", &self.state)
            .field("links", &self.links)
            .finish_non_exhaustive()
    }
}
