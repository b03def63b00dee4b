// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! SDK configuration, its native JSON form, and the storage port.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use attrib_links::DdlTimeout;
use attrib_value::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use thiserror::Error;

/// Seconds the native side waits for a short link to resolve when unset.
pub const DEFAULT_SHORT_LINK_RESOLVE_TIMEOUT_SECS: i64 = 10;

/// Profile used when none is named.
pub const DEFAULT_PROFILE: &str = "attrib-sdk";

/// A property attached to every event the native engine sends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GlobalProperty {
    /// Property name.
    pub key: String,
    /// Property value.
    pub value: String,
    /// Replace a value the engine already holds for `key`.
    pub override_existing: bool,
}

/// Settings handed to the native engine at session start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConfig {
    /// Account API key.
    pub api_key: String,
    /// Account API secret.
    pub api_secret: String,
    /// Deferred deep-link TTL; non-positive or absent means 60 s.
    pub ddl_timeout_sec: Option<i64>,
    /// Native session timeout.
    pub session_timeout_sec: Option<i64>,
    /// Short-link resolve timeout; `0` means the default.
    pub short_link_resolve_timeout_sec: i64,
    /// Ask the native side to resolve deferred deep links.
    pub enable_deferred_deep_links: bool,
    /// Turn on native logging.
    pub enable_logging: bool,
    /// Native log level (2 = verbose … 6 = error).
    pub log_level: Option<i32>,
    /// App-specific user id.
    pub custom_user_id: Option<String>,
    /// Device id chosen by the app instead of the server-assigned one.
    pub custom_sdid: Option<String>,
    /// Keep advertising identifiers out of attribution requests.
    pub limit_advertising_identifiers: bool,
    /// Global properties staged before the session starts, by key.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub global_properties: BTreeMap<String, GlobalProperty>,
    /// Domains the native side treats as the app's own links.
    pub branded_domains: Vec<String>,
    /// `/`-delimited key paths to the link inside push payloads.
    pub push_notification_link_paths: Vec<String>,
    /// Extra native settings, passed through verbatim.
    #[serde(skip_serializing_if = "Dictionary::is_empty")]
    pub extra: Dictionary,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            ddl_timeout_sec: None,
            session_timeout_sec: None,
            short_link_resolve_timeout_sec: DEFAULT_SHORT_LINK_RESOLVE_TIMEOUT_SECS,
            enable_deferred_deep_links: true,
            enable_logging: false,
            log_level: None,
            custom_user_id: None,
            custom_sdid: None,
            limit_advertising_identifiers: false,
            global_properties: BTreeMap::new(),
            branded_domains: Vec::new(),
            push_notification_link_paths: Vec::new(),
            extra: Dictionary::new(),
        }
    }
}

impl SdkConfig {
    /// Config for `api_key` / `api_secret` with everything else defaulted.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// TTL for the link resolver.
    pub fn ddl_timeout(&self) -> DdlTimeout {
        self.ddl_timeout_sec
            .map_or_else(DdlTimeout::unset, DdlTimeout::from_secs)
    }

    /// Short-link timeout actually sent (`0` selects the default).
    pub fn effective_short_link_timeout(&self) -> i64 {
        match self.short_link_resolve_timeout_sec {
            0 => DEFAULT_SHORT_LINK_RESOLVE_TIMEOUT_SECS,
            secs => secs,
        }
    }

    /// Add a pass-through setting. Blank keys and null values are ignored;
    /// returns whether the value was stored.
    pub fn set_value(&mut self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if key.trim().is_empty() || value.is_null() {
            return false;
        }
        self.extra.insert(key, value);
        true
    }

    /// Check the fields the native engine cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("api key is empty".into()));
        }
        if self.api_secret.trim().is_empty() {
            return Err(ConfigError::Invalid("api secret is empty".into()));
        }
        Ok(())
    }

    /// JSON object the native engine's session start expects. Absent values
    /// are omitted; pass-through settings override built-in keys.
    pub fn to_native_json(&self) -> serde_json::Value {
        let mut out = Map::new();
        out.insert("apiKey".into(), self.api_key.clone().into());
        out.insert("secret".into(), self.api_secret.clone().into());
        out.insert(
            "shortlinkResolveTimeout".into(),
            self.effective_short_link_timeout().into(),
        );
        put(&mut out, "sessionTimeoutSec", self.session_timeout_sec);
        put(&mut out, "ddlTimeoutSec", self.ddl_timeout_sec);
        out.insert(
            "enableDeferredDeepLinks".into(),
            self.enable_deferred_deep_links.into(),
        );
        out.insert("enableLogging".into(), self.enable_logging.into());
        put(&mut out, "logLevel", self.log_level);
        put(&mut out, "customUserId", self.custom_user_id.clone());
        put(&mut out, "customSdid", self.custom_sdid.clone());
        out.insert(
            "limitAdvertisingIdentifiers".into(),
            self.limit_advertising_identifiers.into(),
        );
        if !self.global_properties.is_empty() {
            let props: Map<String, serde_json::Value> = self
                .global_properties
                .iter()
                .map(|(key, p)| {
                    let entry = json!({
                        "Key": p.key,
                        "Value": p.value,
                        "OverrideExisting": p.override_existing,
                    });
                    (key.clone(), entry)
                })
                .collect();
            out.insert("globalProperties".into(), props.into());
        }
        if !self.branded_domains.is_empty() {
            out.insert("brandedDomains".into(), self.branded_domains.clone().into());
        }
        if !self.push_notification_link_paths.is_empty() {
            let paths: Vec<Vec<String>> = self
                .push_notification_link_paths
                .iter()
                .map(|p| split_link_path(p))
                .collect();
            out.insert("pushNotificationLinkPath".into(), paths.into());
        }
        for (key, value) in self.extra.iter() {
            if key.trim().is_empty() || value.is_null() {
                continue;
            }
            out.insert(key.to_owned(), value.to_json());
        }
        serde_json::Value::Object(out)
    }
}

fn put<T: Into<serde_json::Value>>(
    out: &mut Map<String, serde_json::Value>,
    key: &str,
    v: Option<T>,
) {
    if let Some(v) = v {
        out.insert(key.to_owned(), v.into());
    }
}

fn split_link_path(path: &str) -> Vec<String> {
    path.split('/')
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Where named config profiles live. Profiles are stored as JSON text.
pub trait ConfigStore {
    /// JSON saved under `profile`, or `None` if it was never written.
    fn read_profile(&self, profile: &str) -> Result<Option<String>, ConfigError>;
    /// Replace whatever is saved under `profile`.
    fn write_profile(&self, profile: &str, json: &str) -> Result<(), ConfigError>;
}

/// Errors loading, saving, or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Storage failed.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    /// Stored text is not a config.
    #[error("config json: {0}")]
    Serde(#[from] serde_json::Error),
    /// Config is structurally fine but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Profile names are plain file-safe words.
    #[error("bad profile name {0:?}")]
    BadProfile(String),
}

/// Loads and saves [`SdkConfig`] profiles through a [`ConfigStore`].
#[derive(Debug)]
pub struct ConfigService<S> {
    store: S,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Service over `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Config saved under `profile`; the default config if nothing (or only
    /// whitespace) was saved.
    pub fn load(&self, profile: &str) -> Result<SdkConfig, ConfigError> {
        check_profile(profile)?;
        match self.store.read_profile(profile)? {
            Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(&text)?),
            _ => Ok(SdkConfig::default()),
        }
    }

    /// Validate `config` and save it under `profile`. Nothing is written
    /// for an invalid config.
    pub fn save(&self, profile: &str, config: &SdkConfig) -> Result<(), ConfigError> {
        check_profile(profile)?;
        config.validate()?;
        let text = serde_json::to_string_pretty(config)?;
        self.store.write_profile(profile, &text)
    }
}

fn check_profile(profile: &str) -> Result<(), ConfigError> {
    let ok = !profile.is_empty()
        && !profile.starts_with('.')
        && profile
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ConfigError::BadProfile(profile.to_owned()))
    }
}

/// In-memory store, for tests and hosts that inject config directly.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    profiles: RefCell<HashMap<String, String>>,
}

impl ConfigStore for MemoryConfigStore {
    fn read_profile(&self, profile: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.profiles.borrow().get(profile).cloned())
    }

    fn write_profile(&self, profile: &str, json: &str) -> Result<(), ConfigError> {
        self.profiles
            .borrow_mut()
            .insert(profile.to_owned(), json.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn native_json_omits_absent_values() {
        let cfg = SdkConfig::new("key", "secret");
        let json = cfg.to_native_json();
        assert_eq!(json["apiKey"], "key");
        assert_eq!(json["secret"], "secret");
        assert_eq!(json["shortlinkResolveTimeout"], 10);
        assert!(json.get("ddlTimeoutSec").is_none());
        assert!(json.get("logLevel").is_none());
        assert!(json.get("brandedDomains").is_none());
    }

    #[test]
    fn zero_short_link_timeout_means_default() {
        let mut cfg = SdkConfig::new("k", "s");
        cfg.short_link_resolve_timeout_sec = 0;
        assert_eq!(cfg.to_native_json()["shortlinkResolveTimeout"], 10);
        cfg.short_link_resolve_timeout_sec = 25;
        assert_eq!(cfg.to_native_json()["shortlinkResolveTimeout"], 25);
    }

    #[test]
    fn push_link_paths_split_on_slash() {
        let mut cfg = SdkConfig::new("k", "s");
        cfg.push_notification_link_paths = vec!["data/link".into(), "sng_link".into()];
        assert_eq!(
            cfg.to_native_json()["pushNotificationLinkPath"],
            serde_json::json!([["data", "link"], ["sng_link"]])
        );
    }

    #[test]
    fn set_value_skips_blank_keys_and_nulls() {
        let mut cfg = SdkConfig::new("k", "s");
        assert!(!cfg.set_value("  ", 1));
        assert!(!cfg.set_value("facebookAppId", Value::Null));
        assert!(cfg.set_value("facebookAppId", "fb-123"));
        assert_eq!(cfg.to_native_json()["facebookAppId"], "fb-123");
    }

    #[test]
    fn ddl_timeout_follows_config() {
        let mut cfg = SdkConfig::new("k", "s");
        assert_eq!(cfg.ddl_timeout().effective_secs(), 60);
        cfg.ddl_timeout_sec = Some(30);
        assert_eq!(cfg.ddl_timeout().effective_secs(), 30);
    }

    #[test]
    fn blank_credentials_are_invalid() {
        assert!(matches!(
            SdkConfig::default().validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(SdkConfig::new("k", "s").validate().is_ok());
    }

    #[test]
    fn service_round_trips_through_memory_store() {
        let svc = ConfigService::new(MemoryConfigStore::default());
        assert_eq!(svc.load(DEFAULT_PROFILE).unwrap(), SdkConfig::default());

        let mut cfg = SdkConfig::new("k", "s");
        cfg.ddl_timeout_sec = Some(45);
        cfg.custom_sdid = Some("abc".into());
        cfg.set_value("facebookAppId", "fb");
        svc.save(DEFAULT_PROFILE, &cfg).unwrap();
        assert_eq!(svc.load(DEFAULT_PROFILE).unwrap(), cfg);
    }

    #[test]
    fn blank_profile_text_loads_defaults() {
        let store = MemoryConfigStore::default();
        store.write_profile("staging", "  \n").unwrap();
        let svc = ConfigService::new(store);
        assert_eq!(svc.load("staging").unwrap(), SdkConfig::default());
    }

    #[test]
    fn invalid_config_is_not_saved() {
        let svc = ConfigService::new(MemoryConfigStore::default());
        assert!(matches!(
            svc.save("prod", &SdkConfig::new("", "s")),
            Err(ConfigError::Invalid(_))
        ));
        assert_eq!(svc.store().read_profile("prod").unwrap(), None);
    }

    #[test]
    fn profile_names_cannot_escape_the_store() {
        let svc = ConfigService::new(MemoryConfigStore::default());
        for name in ["", "../up", ".hidden", "a/b"] {
            assert!(matches!(svc.load(name), Err(ConfigError::BadProfile(_))), "{name}");
        }
        assert!(svc.load("prod-eu_1.v2").is_ok());
    }

    #[test]
    fn native_json_carries_device_and_property_settings() {
        let mut cfg = SdkConfig::new("k", "s");
        let json = cfg.to_native_json();
        assert_eq!(json["limitAdvertisingIdentifiers"], false);
        assert!(json.get("customSdid").is_none());
        assert!(json.get("globalProperties").is_none());

        cfg.custom_sdid = Some("sdid-1".into());
        cfg.limit_advertising_identifiers = true;
        cfg.global_properties.insert(
            "tier".into(),
            GlobalProperty {
                key: "tier".into(),
                value: "gold".into(),
                override_existing: true,
            },
        );
        let json = cfg.to_native_json();
        assert_eq!(json["customSdid"], "sdid-1");
        assert_eq!(json["limitAdvertisingIdentifiers"], true);
        assert_eq!(
            json["globalProperties"],
            serde_json::json!({"tier": {"Key": "tier", "Value": "gold", "OverrideExisting": true}})
        );
    }

    #[test]
    fn persisted_form_is_camel_case_with_defaults() {
        let cfg: SdkConfig = serde_json::from_str(r#"{"apiKey":"k","ddlTimeoutSec":5}"#)
            .expect("parse");
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.ddl_timeout_sec, Some(5));
        assert_eq!(cfg.short_link_resolve_timeout_sec, 10);
        assert!(cfg.enable_deferred_deep_links);
    }
}
