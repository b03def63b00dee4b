// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! C-compatible bindings for the attribution SDK.
//!
//! A host creates one [`AttribContext`] per process, handing over the JSON
//! config and an [`attrib_engine_vtable`] for its native engine. Outbound
//! calls (events, launch options, short links, global properties) are
//! marshalled through the vtable; the native engine's asynchronous results
//! come back in through the `attrib_on_*` functions and reach the host's
//! registered callbacks.
//!
//! All functions must be called from the host's main thread. Strings are
//! NUL-terminated UTF-8; strings passed to callbacks are only valid for the
//! duration of the call.
//!
//! # Reentrancy
//!
//! A context runs one call at a time. Host callbacks and vtable entries run
//! inside a call, so any `attrib_*` function they make on the same context is
//! refused: it logs a warning and returns false (or does nothing). That
//! includes [`attrib_context_free`]. Registrations, events, and teardown
//! have to wait until the outer call has returned.
#![allow(unsafe_code)]
#![allow(non_camel_case_types)]

mod engine;

use std::cell::{Cell, UnsafeCell};
use std::ffi::{c_char, c_void, CStr};
use std::ptr;

use attrib_links::{ConsumerRole, ConversionValues, LinkParams, SdidEvent, ShortLinkParams};
use attrib_sdk::{Dispatch, SdkConfig, SdkContext, SdkError, ShortLinkRequest};
use attrib_value::{Dictionary, Value};
use tracing::warn;

pub use engine::{attrib_engine_vtable, VtableEngine};
use engine::c_text;

type Sdk = SdkContext<VtableEngine>;

/// Opaque SDK context exposed over the C ABI.
pub struct AttribContext {
    busy: Cell<bool>,
    inner: UnsafeCell<Sdk>,
}

/// Clears the busy flag when a call leaves the context, unwinding included.
struct Busy<'a>(&'a Cell<bool>);

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl AttribContext {
    fn new(inner: Sdk) -> Self {
        Self {
            busy: Cell::new(false),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Run `f` on the SDK, or refuse with `None` when a call on this context
    /// is already in progress further up the stack.
    fn enter<R>(&self, call: &'static str, f: impl FnOnce(&mut Sdk) -> R) -> Option<R> {
        if self.busy.replace(true) {
            warn!(call, "re-entrant call on a busy context refused");
            return None;
        }
        let _busy = Busy(&self.busy);
        // SAFETY: `busy` was clear, so no other reference into `inner` is live,
        // and it stays set until this borrow ends.
        Some(f(unsafe { &mut *self.inner.get() }))
    }
}

/// Deferred deep-link callback: `(user_data, link)`; `link` is null when the
/// install had no link.
pub type attrib_deep_link_cb = unsafe extern "C" fn(*mut c_void, *const c_char);

/// Callback receiving a JSON document: `(user_data, json)`.
pub type attrib_json_cb = unsafe extern "C" fn(*mut c_void, *const c_char);

/// Device-id callback: `(user_data, sdid)`.
pub type attrib_sdid_cb = unsafe extern "C" fn(*mut c_void, *const c_char);

/// Fine conversion-value callback: `(user_data, value)`.
pub type attrib_conversion_value_cb = unsafe extern "C" fn(*mut c_void, i32);

/// Combined conversion-values callback: `(user_data, value, coarse, lock)`.
pub type attrib_conversion_values_cb = unsafe extern "C" fn(*mut c_void, i32, i32, bool);

/// Short-link completion: `(user_data, link, error)`; either may be null.
pub type attrib_short_link_cb =
    unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char);

/// Borrow a C string argument. Null or non-UTF-8 reads as `None`.
unsafe fn str_arg<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(p) }.to_str().ok()
}

unsafe fn context<'a>(ctx: *mut AttribContext) -> Option<&'a AttribContext> {
    unsafe { ctx.cast_const().as_ref() }
}

fn sent(result: Result<Dispatch, SdkError>) -> bool {
    match result {
        Ok(dispatch) => dispatch == Dispatch::Sent,
        Err(err) => {
            warn!(error = %err, "sdk call failed");
            false
        }
    }
}

/// Like [`sent`], but a property staged for the session start also counts.
fn accepted(result: Result<Dispatch, SdkError>) -> bool {
    match result {
        Ok(dispatch) => matches!(dispatch, Dispatch::Sent | Dispatch::Staged),
        Err(err) => {
            warn!(error = %err, "sdk call failed");
            false
        }
    }
}

fn parsed(result: Result<(), SdkError>) -> bool {
    result.is_ok()
}

/// Creates a context from a JSON config (camelCase `SdkConfig` fields) and the
/// host's engine vtable. Returns null if the config does not parse.
///
/// # Safety
/// `config_json` must be null or a valid NUL-terminated string. Every non-null
/// vtable entry must remain callable with `vtable.user_data` until the context
/// is freed.
#[no_mangle]
pub unsafe extern "C" fn attrib_context_new(
    config_json: *const c_char,
    vtable: attrib_engine_vtable,
) -> *mut AttribContext {
    let config = match unsafe { str_arg(config_json) } {
        None => SdkConfig::default(),
        Some(json) => match serde_json::from_str::<SdkConfig>(json) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "rejecting malformed sdk config");
                return ptr::null_mut();
            }
        },
    };
    let inner = SdkContext::with_system_clock(config, VtableEngine::new(vtable));
    Box::into_raw(Box::new(AttribContext::new(inner)))
}

/// Releases the context. Refused (the context stays alive) when called from
/// inside one of the context's own callbacks.
///
/// # Safety
/// `ctx` must be null or a pointer returned by [`attrib_context_new`] that
/// has not already been freed.
#[no_mangle]
pub unsafe extern "C" fn attrib_context_free(ctx: *mut AttribContext) {
    let Some(shared) = (unsafe { context(ctx) }) else {
        return;
    };
    if shared.busy.get() {
        warn!("context freed from inside its own callback; ignoring");
        return;
    }
    unsafe {
        drop(Box::from_raw(ctx));
    }
}

/// Starts the native session. Returns false if the config is invalid, the
/// engine refused, or the call re-entered a busy context.
///
/// # Safety
/// `ctx` must be a valid context pointer.
#[no_mangle]
pub unsafe extern "C" fn attrib_context_init(ctx: *mut AttribContext) -> bool {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return false;
    };
    ctx.enter("init", |sdk| match sdk.init() {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "sdk init failed");
            false
        }
    })
    .unwrap_or(false)
}

/// Drops cached link state and callbacks; later outbound calls fail.
///
/// # Safety
/// `ctx` must be a valid context pointer.
#[no_mangle]
pub unsafe extern "C" fn attrib_context_teardown(ctx: *mut AttribContext) {
    if let Some(ctx) = unsafe { context(ctx) } {
        ctx.enter("teardown", Sdk::teardown);
    }
}

/// Sets the deferred deep-link TTL in seconds (non-positive selects 60).
///
/// # Safety
/// `ctx` must be a valid context pointer.
#[no_mangle]
pub unsafe extern "C" fn attrib_set_ddl_timeout(ctx: *mut AttribContext, secs: i64) {
    if let Some(ctx) = unsafe { context(ctx) } {
        ctx.enter("set_ddl_timeout", |sdk| sdk.set_ddl_timeout(secs));
    }
}

/// Sends an event with no arguments.
///
/// # Safety
/// `ctx` must be a valid context pointer; `name` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_send_event(ctx: *mut AttribContext, name: *const c_char) -> bool {
    let (Some(ctx), Some(name)) = (unsafe { context(ctx) }, unsafe { str_arg(name) }) else {
        return false;
    };
    ctx.enter("send_event", |sdk| sent(sdk.send_event(name)))
        .unwrap_or(false)
}

/// Sends an event whose arguments are the JSON object `args_json`.
///
/// # Safety
/// `ctx` must be a valid context pointer; `name` and `args_json` valid strings.
#[no_mangle]
pub unsafe extern "C" fn attrib_send_event_json(
    ctx: *mut AttribContext,
    name: *const c_char,
    args_json: *const c_char,
) -> bool {
    let (Some(ctx), Some(name), Some(json)) = (
        unsafe { context(ctx) },
        unsafe { str_arg(name) },
        unsafe { str_arg(args_json) },
    ) else {
        return false;
    };
    let args = match Dictionary::from_json_str(json) {
        Ok(args) => args,
        Err(err) => {
            warn!(error = %err, "event arguments are not a JSON object");
            return false;
        }
    };
    ctx.enter("send_event_json", |sdk| sent(sdk.send_event_with_args(name, &args)))
        .unwrap_or(false)
}

/// Starts the session with launch options given as a JSON object.
///
/// # Safety
/// `ctx` must be a valid context pointer; `options_json` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_start_with_launch_options_json(
    ctx: *mut AttribContext,
    options_json: *const c_char,
) -> bool {
    let (Some(ctx), Some(json)) = (unsafe { context(ctx) }, unsafe { str_arg(options_json) })
    else {
        return false;
    };
    let options = match Dictionary::from_json_str(json) {
        Ok(options) => options,
        Err(err) => {
            warn!(error = %err, "launch options are not a JSON object");
            return false;
        }
    };
    ctx.enter("start_with_launch_options", |sdk| {
        sent(sdk.start_with_launch_options(&options))
    })
    .unwrap_or(false)
}

/// Attaches `key = value` to every later event. Before init the property is
/// staged and travels with the session start; both cases return true. A
/// blank key is refused.
///
/// # Safety
/// `ctx` must be a valid context pointer; `key` and `value` valid strings.
#[no_mangle]
pub unsafe extern "C" fn attrib_set_global_property(
    ctx: *mut AttribContext,
    key: *const c_char,
    value: *const c_char,
    override_existing: bool,
) -> bool {
    let (Some(ctx), Some(key), Some(value)) = (
        unsafe { context(ctx) },
        unsafe { str_arg(key) },
        unsafe { str_arg(value) },
    ) else {
        return false;
    };
    ctx.enter("set_global_property", |sdk| {
        accepted(sdk.set_global_property(key, value, override_existing))
    })
    .unwrap_or(false)
}

/// Stops attaching the global property `key`.
///
/// # Safety
/// `ctx` must be a valid context pointer; `key` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_unset_global_property(
    ctx: *mut AttribContext,
    key: *const c_char,
) -> bool {
    let (Some(ctx), Some(key)) = (unsafe { context(ctx) }, unsafe { str_arg(key) }) else {
        return false;
    };
    ctx.enter("unset_global_property", |sdk| {
        accepted(sdk.unset_global_property(key))
    })
    .unwrap_or(false)
}

/// Stops attaching every global property.
///
/// # Safety
/// `ctx` must be a valid context pointer.
#[no_mangle]
pub unsafe extern "C" fn attrib_clear_global_properties(ctx: *mut AttribContext) -> bool {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return false;
    };
    ctx.enter("clear_global_properties", |sdk| {
        accepted(sdk.clear_global_properties())
    })
    .unwrap_or(false)
}

/// Requests a referrer short link; `callback` fires once with the result.
///
/// # Safety
/// `ctx` must be a valid context pointer; string arguments valid strings
/// (`passthrough_json` may be null); `callback` must stay callable with
/// `user_data` until it fires or the context is freed.
#[no_mangle]
pub unsafe extern "C" fn attrib_create_referrer_short_link(
    ctx: *mut AttribContext,
    base_link: *const c_char,
    referrer_name: *const c_char,
    referrer_id: *const c_char,
    passthrough_json: *const c_char,
    callback: Option<attrib_short_link_cb>,
    user_data: *mut c_void,
) -> bool {
    let (Some(ctx), Some(base), Some(name), Some(id), Some(callback)) = (
        unsafe { context(ctx) },
        unsafe { str_arg(base_link) },
        unsafe { str_arg(referrer_name) },
        unsafe { str_arg(referrer_id) },
        callback,
    ) else {
        return false;
    };
    let passthrough = match unsafe { str_arg(passthrough_json) } {
        None => Default::default(),
        Some(json) => match serde_json::from_str(json) {
            Ok(map) => map,
            Err(err) => {
                warn!(error = %err, "short link passthrough is not a string map");
                return false;
            }
        },
    };
    let request = ShortLinkRequest {
        base_link: base.to_owned(),
        referrer_name: name.to_owned(),
        referrer_id: id.to_owned(),
        passthrough,
    };
    let on_result = move |result: ShortLinkParams| {
        let data = result.data.as_deref().map(c_text);
        let error = result.error.as_deref().map(c_text);
        unsafe {
            callback(
                user_data,
                data.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
                error.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
            );
        }
    };
    ctx.enter("create_referrer_short_link", |sdk| {
        sent(sdk.create_referrer_short_link(&request, on_result))
    })
    .unwrap_or(false)
}

/// Registers (or, with a null `callback`, removes) the deferred deep-link
/// callback. A cached link still inside the TTL is delivered immediately.
///
/// # Safety
/// `ctx` must be a valid context pointer; `callback` must stay callable with
/// `user_data` until replaced or the context is freed. Calling this from
/// inside a callback of the same context is refused and changes nothing.
#[no_mangle]
pub unsafe extern "C" fn attrib_set_deferred_link_callback(
    ctx: *mut AttribContext,
    callback: Option<attrib_deep_link_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_deferred_link_callback", |sdk| {
        let Some(callback) = callback else {
            sdk.links_mut().clear_consumer(ConsumerRole::DeferredLink);
            return;
        };
        sdk.set_deferred_link_consumer(move |link: Option<&str>| {
            let text = link.map(c_text);
            unsafe { callback(user_data, text.as_ref().map_or(ptr::null(), |s| s.as_ptr())) }
        });
    });
}

/// Registers (or removes) the link-record callback; it receives the record
/// as camelCase JSON and takes priority over the deferred callback.
///
/// # Safety
/// As for [`attrib_set_deferred_link_callback`].
#[no_mangle]
pub unsafe extern "C" fn attrib_set_singular_link_callback(
    ctx: *mut AttribContext,
    callback: Option<attrib_json_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_singular_link_callback", |sdk| {
        let Some(callback) = callback else {
            sdk.links_mut().clear_consumer(ConsumerRole::SingularLink);
            return;
        };
        sdk.set_singular_link_consumer(move |params: LinkParams| {
            match serde_json::to_string(&params) {
                Ok(json) => {
                    let json = c_text(&json);
                    unsafe { callback(user_data, json.as_ptr()) }
                }
                Err(err) => warn!(error = %err, "link record not serializable"),
            }
        });
    });
}

/// Registers (or removes) the device-attribution callback (JSON object).
///
/// # Safety
/// As for [`attrib_set_deferred_link_callback`].
#[no_mangle]
pub unsafe extern "C" fn attrib_set_device_attribution_callback(
    ctx: *mut AttribContext,
    callback: Option<attrib_json_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_device_attribution_callback", |sdk| {
        let Some(callback) = callback else {
            sdk.links_mut().clear_consumer(ConsumerRole::DeviceAttribution);
            return;
        };
        sdk.set_device_attribution_consumer(move |attributes: &Dictionary| {
            let json = c_text(&Value::Dict(attributes.clone()).to_json().to_string());
            unsafe { callback(user_data, json.as_ptr()) }
        });
    });
}

/// Registers the device-id callbacks. `did_set` fires when the custom id
/// from the config was applied, `received` when the server assigned one.
/// Either may be null; both null removes the registration.
///
/// # Safety
/// As for [`attrib_set_deferred_link_callback`].
#[no_mangle]
pub unsafe extern "C" fn attrib_set_sdid_callbacks(
    ctx: *mut AttribContext,
    did_set: Option<attrib_sdid_cb>,
    received: Option<attrib_sdid_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_sdid_callbacks", |sdk| {
        if did_set.is_none() && received.is_none() {
            sdk.links_mut().clear_consumer(ConsumerRole::Sdid);
            return;
        }
        sdk.set_sdid_consumer(move |event: SdidEvent<'_>| {
            let (callback, sdid) = match event {
                SdidEvent::Set(sdid) => (did_set, sdid),
                SdidEvent::Received(sdid) => (received, sdid),
            };
            if let Some(callback) = callback {
                let sdid = c_text(sdid);
                unsafe { callback(user_data, sdid.as_ptr()) }
            }
        });
    });
}

/// Registers (or removes) the fine conversion-value callback.
///
/// # Safety
/// As for [`attrib_set_deferred_link_callback`].
#[no_mangle]
pub unsafe extern "C" fn attrib_set_conversion_value_callback(
    ctx: *mut AttribContext,
    callback: Option<attrib_conversion_value_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_conversion_value_callback", |sdk| {
        let Some(callback) = callback else {
            sdk.links_mut().clear_consumer(ConsumerRole::ConversionValue);
            return;
        };
        sdk.set_conversion_value_consumer(move |value: i32| unsafe {
            callback(user_data, value);
        });
    });
}

/// Registers (or removes) the combined conversion-values callback.
///
/// # Safety
/// As for [`attrib_set_deferred_link_callback`].
#[no_mangle]
pub unsafe extern "C" fn attrib_set_conversion_values_callback(
    ctx: *mut AttribContext,
    callback: Option<attrib_conversion_values_cb>,
    user_data: *mut c_void,
) {
    let Some(ctx) = (unsafe { context(ctx) }) else {
        return;
    };
    ctx.enter("set_conversion_values_callback", |sdk| {
        let Some(callback) = callback else {
            sdk.links_mut().clear_consumer(ConsumerRole::ConversionValues);
            return;
        };
        sdk.set_conversion_values_consumer(move |v: ConversionValues| unsafe {
            callback(user_data, v.value, v.coarse, v.lock);
        });
    });
}

/// Native callback: a link record resolved (camelCase JSON). Returns false
/// if the payload was malformed and dropped.
///
/// # Safety
/// `ctx` must be a valid context pointer; `json` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_link_resolved(
    ctx: *mut AttribContext,
    json: *const c_char,
) -> bool {
    let (Some(ctx), Some(json)) = (unsafe { context(ctx) }, unsafe { str_arg(json) }) else {
        return false;
    };
    ctx.enter("on_link_resolved", |sdk| parsed(sdk.on_link_resolved(json)))
        .unwrap_or(false)
}

/// Native callback: a bare deep link arrived. Null or empty means "no link".
///
/// # Safety
/// `ctx` must be a valid context pointer; `message` null or a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_simple_deep_link(
    ctx: *mut AttribContext,
    message: *const c_char,
) {
    if let Some(ctx) = unsafe { context(ctx) } {
        let message = unsafe { str_arg(message) };
        ctx.enter("on_simple_deep_link", |sdk| sdk.on_simple_deep_link(message));
    }
}

/// Native callback: a short-link request completed (`{"data", "error"}`).
///
/// # Safety
/// `ctx` must be a valid context pointer; `json` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_short_link_resolved(
    ctx: *mut AttribContext,
    json: *const c_char,
) -> bool {
    let (Some(ctx), Some(json)) = (unsafe { context(ctx) }, unsafe { str_arg(json) }) else {
        return false;
    };
    ctx.enter("on_short_link_resolved", |sdk| {
        parsed(sdk.on_short_link_resolved(json))
    })
    .unwrap_or(false)
}

/// Native callback: device attribution data (JSON object).
///
/// # Safety
/// `ctx` must be a valid context pointer; `json` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_device_attribution(
    ctx: *mut AttribContext,
    json: *const c_char,
) -> bool {
    let (Some(ctx), Some(json)) = (unsafe { context(ctx) }, unsafe { str_arg(json) }) else {
        return false;
    };
    ctx.enter("on_device_attribution", |sdk| {
        parsed(sdk.on_device_attribution(json))
    })
    .unwrap_or(false)
}

/// Native callback: the custom device id from the config was applied.
///
/// # Safety
/// `ctx` must be a valid context pointer; `sdid` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_sdid_set(ctx: *mut AttribContext, sdid: *const c_char) {
    let (Some(ctx), Some(sdid)) = (unsafe { context(ctx) }, unsafe { str_arg(sdid) }) else {
        return;
    };
    ctx.enter("on_sdid_set", |sdk| sdk.on_sdid_set(sdid));
}

/// Native callback: the server assigned a device id.
///
/// # Safety
/// `ctx` must be a valid context pointer; `sdid` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_sdid_received(ctx: *mut AttribContext, sdid: *const c_char) {
    let (Some(ctx), Some(sdid)) = (unsafe { context(ctx) }, unsafe { str_arg(sdid) }) else {
        return;
    };
    ctx.enter("on_sdid_received", |sdk| sdk.on_sdid_received(sdid));
}

/// Native callback: fine conversion value as decimal text. Returns false if
/// the text is not an integer and was dropped.
///
/// # Safety
/// `ctx` must be a valid context pointer; `text` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_conversion_value(
    ctx: *mut AttribContext,
    text: *const c_char,
) -> bool {
    let (Some(ctx), Some(text)) = (unsafe { context(ctx) }, unsafe { str_arg(text) }) else {
        return false;
    };
    ctx.enter("on_conversion_value", |sdk| parsed(sdk.on_conversion_value(text)))
        .unwrap_or(false)
}

/// Native callback: combined conversion values (`{"value","coarse","lock"}`).
///
/// # Safety
/// `ctx` must be a valid context pointer; `json` a valid string.
#[no_mangle]
pub unsafe extern "C" fn attrib_on_conversion_values(
    ctx: *mut AttribContext,
    json: *const c_char,
) -> bool {
    let (Some(ctx), Some(json)) = (unsafe { context(ctx) }, unsafe { str_arg(json) }) else {
        return false;
    };
    ctx.enter("on_conversion_values", |sdk| parsed(sdk.on_conversion_values(json)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;
    use std::ffi::CString;

    /// Host-side engine recording every call as text.
    #[derive(Default)]
    struct Host {
        log: Vec<String>,
        next: i32,
        links: Vec<Option<String>>,
        records: Vec<String>,
        values: Vec<(i32, i32, bool)>,
        ctx: Option<*mut AttribContext>,
        nested_sends: Vec<bool>,
    }

    unsafe fn host<'a>(ud: *mut c_void) -> &'a mut Host {
        unsafe { &mut *ud.cast::<Host>() }
    }

    unsafe fn text(p: *const c_char) -> String {
        if p.is_null() {
            return "<null>".into();
        }
        unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
    }

    unsafe extern "C" fn begin(ud: *mut c_void) {
        let h = unsafe { host(ud) };
        h.next = 0;
        h.log.push("begin".into());
    }

    unsafe extern "C" fn new_container(ud: *mut c_void, kind: i32) -> i32 {
        let h = unsafe { host(ud) };
        let idx = h.next;
        h.next += 1;
        h.log.push(format!("new {kind} -> {idx}"));
        idx
    }

    unsafe extern "C" fn push_root(
        ud: *mut c_void,
        key: *const c_char,
        v: *const c_char,
        kind: i32,
    ) {
        let line = unsafe { format!("root {}={} ({kind})", text(key), text(v)) };
        unsafe { host(ud) }.log.push(line);
    }

    unsafe extern "C" fn push_to_dictionary(
        ud: *mut c_void,
        dict: i32,
        key: *const c_char,
        v: *const c_char,
        kind: i32,
    ) {
        let line = unsafe { format!("dict {dict} {}={} ({kind})", text(key), text(v)) };
        unsafe { host(ud) }.log.push(line);
    }

    unsafe extern "C" fn push_to_array(ud: *mut c_void, array: i32, v: *const c_char, kind: i32) {
        let line = unsafe { format!("array {array} += {} ({kind})", text(v)) };
        unsafe { host(ud) }.log.push(line);
    }

    unsafe extern "C" fn link_root(ud: *mut c_void, key: *const c_char, child: i32) {
        let line = unsafe { format!("link root {} <- {child}", text(key)) };
        unsafe { host(ud) }.log.push(line);
    }

    unsafe extern "C" fn release(ud: *mut c_void) {
        unsafe { host(ud) }.log.push("release".into());
    }

    unsafe extern "C" fn start(ud: *mut c_void, json: *const c_char) -> bool {
        let line = unsafe { format!("start {}", text(json)) };
        unsafe { host(ud) }.log.push(line);
        true
    }

    unsafe extern "C" fn event(ud: *mut c_void, name: *const c_char) -> bool {
        let line = unsafe { format!("event {}", text(name)) };
        unsafe { host(ud) }.log.push(line);
        true
    }

    unsafe extern "C" fn set_prop(
        ud: *mut c_void,
        key: *const c_char,
        value: *const c_char,
        override_existing: bool,
    ) -> bool {
        let line = unsafe { format!("prop {}={} ({override_existing})", text(key), text(value)) };
        unsafe { host(ud) }.log.push(line);
        true
    }

    unsafe extern "C" fn unset_prop(ud: *mut c_void, key: *const c_char) {
        let line = unsafe { format!("unset {}", text(key)) };
        unsafe { host(ud) }.log.push(line);
    }

    unsafe extern "C" fn clear_props(ud: *mut c_void) {
        unsafe { host(ud) }.log.push("clear props".into());
    }

    unsafe extern "C" fn on_link(ud: *mut c_void, link: *const c_char) {
        let h = unsafe { host(ud) };
        let link = (!link.is_null()).then(|| unsafe { text(link) });
        h.links.push(link);
    }

    unsafe extern "C" fn on_record(ud: *mut c_void, json: *const c_char) {
        let json = unsafe { text(json) };
        unsafe { host(ud) }.records.push(json);
    }

    unsafe extern "C" fn on_sdid_set(ud: *mut c_void, sdid: *const c_char) {
        let line = unsafe { format!("set:{}", text(sdid)) };
        unsafe { host(ud) }.records.push(line);
    }

    unsafe extern "C" fn on_values(ud: *mut c_void, value: i32, coarse: i32, lock: bool) {
        unsafe { host(ud) }.values.push((value, coarse, lock));
    }

    /// Deferred-link callback that calls back into its own context: it
    /// re-registers itself, sends an event, and tries to free the context.
    /// The host record is only touched between those calls.
    unsafe extern "C" fn reenter(ud: *mut c_void, link: *const c_char) {
        let h = ud.cast::<Host>();
        let link = unsafe { text(link) };
        let ctx = unsafe { (*h).ctx }.expect("context recorded");
        unsafe { (*h).links.push(Some(link)) };

        let name = CString::new("nested").unwrap();
        let nested = unsafe { attrib_send_event(ctx, name.as_ptr()) };
        unsafe {
            attrib_set_deferred_link_callback(ctx, Some(reenter), ud);
            attrib_set_deferred_link_callback(ctx, None, ud);
            attrib_context_free(ctx);
        }
        unsafe { (*h).nested_sends.push(nested) };
    }

    fn vtable(host: *mut Host) -> attrib_engine_vtable {
        attrib_engine_vtable {
            user_data: host.cast(),
            begin_session: Some(begin),
            new_container: Some(new_container),
            push_root: Some(push_root),
            push_to_dictionary: Some(push_to_dictionary),
            push_to_array: Some(push_to_array),
            link_root: Some(link_root),
            release_all: Some(release),
            start_session: Some(start),
            send_event: Some(event),
            send_event_with_args: Some(event),
            set_global_property: Some(set_prop),
            unset_global_property: Some(unset_prop),
            clear_global_properties: Some(clear_props),
            ..attrib_engine_vtable::default()
        }
    }

    fn cstr(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    const CONFIG: &str = r#"{"apiKey":"k","apiSecret":"s"}"#;

    #[test]
    fn event_json_replays_as_flat_calls() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let config = cstr(CONFIG);
            let ctx = attrib_context_new(config.as_ptr(), vtable(hp));
            assert!(!ctx.is_null());
            assert!(attrib_context_init(ctx));
            let name = cstr("purchase");
            let args = cstr(r#"{"price":1.5,"item":{"sku":"gem"},"tags":["a"],"note":null}"#);
            assert!(attrib_send_event_json(ctx, name.as_ptr(), args.as_ptr()));
            attrib_context_free(ctx);
        }

        assert!(h.log[0].starts_with("start {"));
        assert!(h.log[0].contains("\"apiKey\":\"k\""));
        assert_eq!(
            h.log[1..],
            [
                "begin",
                "root price=1.5 (4)",
                "new 7 -> 0",
                "dict 0 sku=gem (0)",
                "link root item <- 0",
                "new 6 -> 1",
                "array 1 += a (0)",
                "link root tags <- 1",
                "root note= (5)",
                "event purchase",
                "release",
            ]
        );
    }

    #[test]
    fn deferred_callback_receives_cached_link() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let ctx = attrib_context_new(ptr::null(), vtable(hp));
            let link = cstr("app://promo");
            attrib_on_simple_deep_link(ctx, link.as_ptr());
            attrib_set_deferred_link_callback(ctx, Some(on_link), hp.cast());
            attrib_on_simple_deep_link(ctx, ptr::null());
            attrib_context_free(ctx);
        }
        assert_eq!(h.links, vec![Some("app://promo".to_owned()), None]);
    }

    #[test]
    fn callback_calling_into_its_own_context_is_refused() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let config = cstr(CONFIG);
            let ctx = attrib_context_new(config.as_ptr(), vtable(hp));
            (*hp).ctx = Some(ctx);
            assert!(attrib_context_init(ctx));
            attrib_set_deferred_link_callback(ctx, Some(reenter), hp.cast());

            let first = cstr("app://one");
            attrib_on_simple_deep_link(ctx, first.as_ptr());
            let second = cstr("app://two");
            attrib_on_simple_deep_link(ctx, second.as_ptr());

            let name = cstr("after");
            assert!(attrib_send_event(ctx, name.as_ptr()));
            attrib_context_free(ctx);
        }
        assert_eq!(
            h.links,
            vec![Some("app://one".to_owned()), Some("app://two".to_owned())]
        );
        assert_eq!(h.nested_sends, vec![false, false]);
        assert!(!h.log.iter().any(|line| line == "event nested"));
        assert_eq!(h.log.last().map(String::as_str), Some("event after"));
    }

    #[test]
    fn singular_callback_gets_record_json() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let ctx = attrib_context_new(ptr::null(), vtable(hp));
            attrib_set_singular_link_callback(ctx, Some(on_record), hp.cast());
            let json = cstr(r#"{"deeplink":"app://x","passthrough":"p"}"#);
            assert!(attrib_on_link_resolved(ctx, json.as_ptr()));
            let bad = cstr("{");
            assert!(!attrib_on_link_resolved(ctx, bad.as_ptr()));
            attrib_context_free(ctx);
        }
        assert_eq!(h.records.len(), 1);
        let record: serde_json::Value = serde_json::from_str(&h.records[0]).unwrap();
        assert_eq!(record["deeplink"], "app://x");
        assert_eq!(record["passthrough"], "p");
    }

    #[test]
    fn global_properties_stage_then_forward() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let config = cstr(CONFIG);
            let ctx = attrib_context_new(config.as_ptr(), vtable(hp));
            let (key, value, blank) = (cstr("tier"), cstr("gold"), cstr(" "));
            assert!(attrib_set_global_property(ctx, key.as_ptr(), value.as_ptr(), true));
            assert!(!attrib_set_global_property(ctx, blank.as_ptr(), value.as_ptr(), true));
            assert!(attrib_context_init(ctx));
            assert!(attrib_set_global_property(ctx, key.as_ptr(), value.as_ptr(), false));
            assert!(attrib_unset_global_property(ctx, key.as_ptr()));
            assert!(attrib_clear_global_properties(ctx));
            attrib_context_free(ctx);
        }

        let start = h.log[0].strip_prefix("start ").expect("session start");
        let config: serde_json::Value = serde_json::from_str(start).unwrap();
        let tier = &config["globalProperties"]["tier"];
        assert_eq!(tier["Value"], "gold");
        assert_eq!(tier["OverrideExisting"], true);
        assert_eq!(h.log[1..], ["prop tier=gold (false)", "unset tier", "clear props"]);
    }

    #[test]
    fn device_id_and_conversion_values_reach_the_host() {
        let mut h = Host::default();
        let hp: *mut Host = &mut h;
        unsafe {
            let ctx = attrib_context_new(ptr::null(), vtable(hp));
            attrib_set_sdid_callbacks(ctx, Some(on_sdid_set), None, hp.cast());
            attrib_set_conversion_values_callback(ctx, Some(on_values), hp.cast());

            let (custom, assigned) = (cstr("custom-1"), cstr("srv-9"));
            attrib_on_sdid_set(ctx, custom.as_ptr());
            attrib_on_sdid_received(ctx, assigned.as_ptr());

            let values = cstr(r#"{"value":5,"coarse":2,"lock":false}"#);
            assert!(attrib_on_conversion_values(ctx, values.as_ptr()));
            assert!(attrib_on_conversion_values(ctx, values.as_ptr()));
            let (fine, junk) = (cstr("5"), cstr("x"));
            assert!(attrib_on_conversion_value(ctx, fine.as_ptr()));
            assert!(!attrib_on_conversion_value(ctx, junk.as_ptr()));

            attrib_set_conversion_values_callback(ctx, None, hp.cast());
            assert!(attrib_on_conversion_values(ctx, values.as_ptr()));
            attrib_context_free(ctx);
        }
        assert_eq!(h.records, vec!["set:custom-1"]);
        assert_eq!(h.values, vec![(5, 2, false), (5, 2, false)]);
    }

    #[test]
    fn null_pointers_are_refused() {
        unsafe {
            assert!(!attrib_context_init(ptr::null_mut()));
            assert!(!attrib_send_event(ptr::null_mut(), ptr::null()));
            assert!(!attrib_clear_global_properties(ptr::null_mut()));
            attrib_context_free(ptr::null_mut());
            let bad = cstr("not json");
            assert!(attrib_context_new(bad.as_ptr(), attrib_engine_vtable::default()).is_null());
        }
    }

    #[test]
    fn missing_engine_entries_report_failure() {
        unsafe {
            let config = cstr(CONFIG);
            let ctx = attrib_context_new(config.as_ptr(), attrib_engine_vtable::default());
            assert!(!attrib_context_init(ctx));
            attrib_context_free(ctx);
        }
    }

    #[test]
    fn interior_nul_is_truncated() {
        assert_eq!(c_text("ab\0cd").as_bytes(), b"ab");
    }
}
