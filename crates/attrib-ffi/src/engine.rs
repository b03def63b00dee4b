// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Native engine reached through a table of C function pointers.

use std::ffi::{c_char, c_void, CString};
use std::ptr;

use attrib_bridge::{AllocationError, BoundaryPort, ContainerHandle, ContainerKind, Slot};
use attrib_sdk::{NativeEngine, ShortLinkRequest};
use attrib_value::ScalarKind;
use tracing::warn;

/// Entry points of the host's native engine.
///
/// Every entry receives `user_data` first. Missing (null) entries make the
/// corresponding command report failure; missing push/link entries drop the
/// call. Container indices are non-negative; `new_container` returns a
/// negative value when the engine cannot allocate.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct attrib_engine_vtable {
    /// Opaque host pointer passed back to every entry.
    pub user_data: *mut c_void,
    /// Create the session's root dictionary.
    pub begin_session: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Allocate a container of wire kind 6 (array) or 7 (dictionary).
    pub new_container: Option<unsafe extern "C" fn(*mut c_void, i32) -> i32>,
    /// `(key, text, kind)` into the root dictionary.
    pub push_root:
        Option<unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char, i32)>,
    /// `(dict, key, text, kind)` into a child dictionary.
    pub push_to_dictionary:
        Option<unsafe extern "C" fn(*mut c_void, i32, *const c_char, *const c_char, i32)>,
    /// `(array, text, kind)` appended to a child array.
    pub push_to_array: Option<unsafe extern "C" fn(*mut c_void, i32, *const c_char, i32)>,
    /// `(key, child)` into the root dictionary.
    pub link_root: Option<unsafe extern "C" fn(*mut c_void, *const c_char, i32)>,
    /// `(dict, key, child)` into a child dictionary.
    pub link_to_dictionary:
        Option<unsafe extern "C" fn(*mut c_void, i32, *const c_char, i32)>,
    /// `(array, child)` appended to a child array.
    pub link_to_array: Option<unsafe extern "C" fn(*mut c_void, i32, i32)>,
    /// Free the root dictionary and every container of the session.
    pub release_all: Option<unsafe extern "C" fn(*mut c_void)>,
    /// Start the session with a config JSON object.
    pub start_session: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> bool>,
    /// Start the session with `(api_key, secret)`; options are the root
    /// dictionary.
    pub start_session_with_launch_options:
        Option<unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> bool>,
    /// Send an event by name.
    pub send_event: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> bool>,
    /// Send an event whose arguments are the root dictionary.
    pub send_event_with_args: Option<unsafe extern "C" fn(*mut c_void, *const c_char) -> bool>,
    /// `(base_link, referrer_name, referrer_id, passthrough_json)`.
    pub create_referrer_short_link: Option<
        unsafe extern "C" fn(
            *mut c_void,
            *const c_char,
            *const c_char,
            *const c_char,
            *const c_char,
        ) -> bool,
    >,
    /// `(key, value, override_existing)` attached to every later event.
    pub set_global_property: Option<
        unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char, bool) -> bool,
    >,
    /// Stop attaching the property named by `key`.
    pub unset_global_property: Option<unsafe extern "C" fn(*mut c_void, *const c_char)>,
    /// Stop attaching every global property.
    pub clear_global_properties: Option<unsafe extern "C" fn(*mut c_void)>,
}

impl Default for attrib_engine_vtable {
    fn default() -> Self {
        Self {
            user_data: ptr::null_mut(),
            begin_session: None,
            new_container: None,
            push_root: None,
            push_to_dictionary: None,
            push_to_array: None,
            link_root: None,
            link_to_dictionary: None,
            link_to_array: None,
            release_all: None,
            start_session: None,
            start_session_with_launch_options: None,
            send_event: None,
            send_event_with_args: None,
            create_referrer_short_link: None,
            set_global_property: None,
            unset_global_property: None,
            clear_global_properties: None,
        }
    }
}

/// [`NativeEngine`] that forwards every call through an
/// [`attrib_engine_vtable`].
pub struct VtableEngine {
    vt: attrib_engine_vtable,
}

impl VtableEngine {
    /// Wrap a host vtable. The host keeps `user_data` alive for as long as the
    /// engine exists.
    pub const fn new(vt: attrib_engine_vtable) -> Self {
        Self { vt }
    }
}

/// C copy of `s`. Text after an interior NUL cannot cross the boundary and
/// is cut off.
pub(crate) fn c_text(s: &str) -> CString {
    CString::new(s).unwrap_or_else(|err| {
        warn!(at = err.nul_position(), "interior NUL truncates boundary text");
        let end = err.nul_position();
        let mut bytes = err.into_vec();
        bytes.truncate(end);
        CString::new(bytes).unwrap_or_default()
    })
}

// SAFETY (all blocks below): the host that built the vtable guarantees each
// non-null entry is callable with its own `user_data`, and only reads the
// string arguments for the duration of the call.
impl BoundaryPort for VtableEngine {
    fn begin_session(&mut self) {
        if let Some(f) = self.vt.begin_session {
            unsafe { f(self.vt.user_data) }
        }
    }

    fn allocate_container(
        &mut self,
        kind: ContainerKind,
    ) -> Result<ContainerHandle, AllocationError> {
        let Some(f) = self.vt.new_container else {
            return Err(AllocationError {
                reason: "engine has no new_container entry".into(),
            });
        };
        let raw = unsafe { f(self.vt.user_data, kind.wire_tag()) };
        if raw < 0 {
            return Err(AllocationError {
                reason: format!("native engine returned {raw}"),
            });
        }
        Ok(ContainerHandle::from_raw(raw))
    }

    fn push_scalar(&mut self, slot: Slot<'_>, kind: ScalarKind, text: &str) {
        let ud = self.vt.user_data;
        let text = c_text(text);
        let tag = kind.wire_tag();
        match slot {
            Slot::Root { key } => {
                if let Some(f) = self.vt.push_root {
                    let key = c_text(key);
                    unsafe { f(ud, key.as_ptr(), text.as_ptr(), tag) }
                }
            }
            Slot::Entry { dict, key } => {
                if let Some(f) = self.vt.push_to_dictionary {
                    let key = c_text(key);
                    unsafe { f(ud, dict.raw(), key.as_ptr(), text.as_ptr(), tag) }
                }
            }
            Slot::Append { array } => {
                if let Some(f) = self.vt.push_to_array {
                    unsafe { f(ud, array.raw(), text.as_ptr(), tag) }
                }
            }
        }
    }

    fn link_child(&mut self, slot: Slot<'_>, child: ContainerHandle) {
        let ud = self.vt.user_data;
        match slot {
            Slot::Root { key } => {
                if let Some(f) = self.vt.link_root {
                    let key = c_text(key);
                    unsafe { f(ud, key.as_ptr(), child.raw()) }
                }
            }
            Slot::Entry { dict, key } => {
                if let Some(f) = self.vt.link_to_dictionary {
                    let key = c_text(key);
                    unsafe { f(ud, dict.raw(), key.as_ptr(), child.raw()) }
                }
            }
            Slot::Append { array } => {
                if let Some(f) = self.vt.link_to_array {
                    unsafe { f(ud, array.raw(), child.raw()) }
                }
            }
        }
    }

    fn release_all_session_containers(&mut self) {
        if let Some(f) = self.vt.release_all {
            unsafe { f(self.vt.user_data) }
        }
    }
}

impl NativeEngine for VtableEngine {
    fn start_session(&mut self, config_json: &str) -> bool {
        let Some(f) = self.vt.start_session else {
            return false;
        };
        let json = c_text(config_json);
        unsafe { f(self.vt.user_data, json.as_ptr()) }
    }

    fn start_session_with_launch_options(&mut self, api_key: &str, api_secret: &str) -> bool {
        let Some(f) = self.vt.start_session_with_launch_options else {
            return false;
        };
        let (key, secret) = (c_text(api_key), c_text(api_secret));
        unsafe { f(self.vt.user_data, key.as_ptr(), secret.as_ptr()) }
    }

    fn send_event(&mut self, name: &str) -> bool {
        let Some(f) = self.vt.send_event else {
            return false;
        };
        let name = c_text(name);
        unsafe { f(self.vt.user_data, name.as_ptr()) }
    }

    fn send_event_with_args(&mut self, name: &str) -> bool {
        let Some(f) = self.vt.send_event_with_args else {
            return false;
        };
        let name = c_text(name);
        unsafe { f(self.vt.user_data, name.as_ptr()) }
    }

    fn create_referrer_short_link(&mut self, request: &ShortLinkRequest) -> bool {
        let Some(f) = self.vt.create_referrer_short_link else {
            return false;
        };
        let passthrough = match serde_json::to_string(&request.passthrough) {
            Ok(json) => c_text(&json),
            Err(err) => {
                warn!(error = %err, "short link passthrough not serializable");
                return false;
            }
        };
        let base = c_text(&request.base_link);
        let name = c_text(&request.referrer_name);
        let id = c_text(&request.referrer_id);
        unsafe {
            f(
                self.vt.user_data,
                base.as_ptr(),
                name.as_ptr(),
                id.as_ptr(),
                passthrough.as_ptr(),
            )
        }
    }
    fn set_global_property(&mut self, key: &str, value: &str, override_existing: bool) -> bool {
        let Some(f) = self.vt.set_global_property else {
            return false;
        };
        let (key, value) = (c_text(key), c_text(value));
        unsafe { f(self.vt.user_data, key.as_ptr(), value.as_ptr(), override_existing) }
    }

    fn unset_global_property(&mut self, key: &str) {
        if let Some(f) = self.vt.unset_global_property {
            let key = c_text(key);
            unsafe { f(self.vt.user_data, key.as_ptr()) }
        }
    }

    fn clear_global_properties(&mut self) {
        if let Some(f) = self.vt.clear_global_properties {
            unsafe { f(self.vt.user_data) }
        }
    }
}
