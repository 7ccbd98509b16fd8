//! Persisted settings document
//!
//! The document is a flat key-value object. [`Snapshot`] wraps whatever subset
//! of it was read and decodes the well-known keys on demand; [`Update`] builds
//! a partial write.

use crate::presets::{self, FALLBACK_PRESET};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Raw settings document
pub type Document = serde_json::Map<String, Value>;

/// Domain pattern to User-Agent key
pub type DomainRules = IndexMap<String, String>;

/// Named User-Agent entries (preset overrides or customs)
pub type UserAgentEntries = IndexMap<String, UserAgentEntry>;

/// Well-known keys of the settings document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Enabled,
    ActiveUa,
    UserAgents,
    CustomUserAgents,
    DomainRules,
    AutoApply,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::Enabled,
        SettingKey::ActiveUa,
        SettingKey::UserAgents,
        SettingKey::CustomUserAgents,
        SettingKey::DomainRules,
        SettingKey::AutoApply,
    ];

    /// Keys whose change requires the rule set to be rebuilt
    pub const RULE_INPUTS: [SettingKey; 3] = [
        SettingKey::ActiveUa,
        SettingKey::Enabled,
        SettingKey::DomainRules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Enabled => "enabled",
            SettingKey::ActiveUa => "activeUA",
            SettingKey::UserAgents => "userAgents",
            SettingKey::CustomUserAgents => "customUserAgents",
            SettingKey::DomainRules => "domainRules",
            SettingKey::AutoApply => "autoApply",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether a change to the named key should trigger a resync
    pub fn triggers_resync(name: &str) -> bool {
        Self::RULE_INPUTS.iter().any(|k| k.as_str() == name)
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored User-Agent, either a bare string or a named entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserAgentEntry {
    Plain(String),
    Named { name: String, value: String },
}

impl UserAgentEntry {
    pub fn named(name: impl Into<String>, value: impl Into<String>) -> Self {
        UserAgentEntry::Named {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The header value
    pub fn value(&self) -> &str {
        match self {
            UserAgentEntry::Plain(value) => value,
            UserAgentEntry::Named { value, .. } => value,
        }
    }

    /// Display name, if the entry carries one
    pub fn name(&self) -> Option<&str> {
        match self {
            UserAgentEntry::Plain(_) => None,
            UserAgentEntry::Named { name, .. } => Some(name),
        }
    }
}

/// Derive the storage key for a custom User-Agent from its display name
///
/// `"My Phone"` becomes `"custom_my_phone"`.
pub fn custom_key(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    format!("custom_{}", slug)
}

/// Values written on first-ever use
pub fn default_document() -> Document {
    let user_agents: UserAgentEntries = presets::preset_map()
        .into_iter()
        .map(|(k, v)| (k, UserAgentEntry::Plain(v)))
        .collect();

    Update::new()
        .enabled(true)
        .active_ua(FALLBACK_PRESET)
        .user_agents(&user_agents)
        .custom_user_agents(&UserAgentEntries::new())
        .domain_rules(&DomainRules::new())
        .auto_apply(true)
        .into_document()
}

/// Values read from the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: Document,
}

impl Snapshot {
    pub fn new(values: Document) -> Self {
        Self { values }
    }

    pub fn document(&self) -> &Document {
        &self.values
    }

    pub fn into_document(self) -> Document {
        self.values
    }

    pub fn get(&self, key: SettingKey) -> Option<&Value> {
        self.values.get(key.as_str())
    }

    pub fn contains(&self, key: SettingKey) -> bool {
        self.values.contains_key(key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn enabled(&self) -> Option<bool> {
        self.decode(SettingKey::Enabled)
    }

    pub fn active_ua(&self) -> Option<String> {
        self.decode(SettingKey::ActiveUa)
    }

    pub fn auto_apply(&self) -> Option<bool> {
        self.decode(SettingKey::AutoApply)
    }

    /// Stored preset overrides; empty when unset
    pub fn user_agents(&self) -> UserAgentEntries {
        self.decode(SettingKey::UserAgents).unwrap_or_default()
    }

    /// User-defined entries; empty when unset
    pub fn custom_user_agents(&self) -> UserAgentEntries {
        self.decode(SettingKey::CustomUserAgents)
            .unwrap_or_default()
    }

    /// Per-domain selections; empty when unset
    pub fn domain_rules(&self) -> DomainRules {
        self.decode(SettingKey::DomainRules).unwrap_or_default()
    }

    /// Presets, overridden by stored `userAgents`, overridden by customs
    pub fn merged_user_agents(&self) -> IndexMap<String, String> {
        let mut merged = presets::preset_map();
        for (key, entry) in self.user_agents() {
            merged.insert(key, entry.value().to_string());
        }
        for (key, entry) in self.custom_user_agents() {
            merged.insert(key, entry.value().to_string());
        }
        merged
    }

    fn decode<T: DeserializeOwned>(&self, key: SettingKey) -> Option<T> {
        let value = self.values.get(key.as_str())?;
        match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::warn!("Ignoring malformed setting {}: {}", key, e);
                None
            }
        }
    }
}

/// A partial write to the settings document
#[derive(Debug, Clone, Default)]
pub struct Update {
    values: Document,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: SettingKey, value: Value) -> Self {
        self.values.insert(key.as_str().to_string(), value);
        self
    }

    pub fn enabled(self, enabled: bool) -> Self {
        self.set(SettingKey::Enabled, Value::Bool(enabled))
    }

    pub fn active_ua(self, key: &str) -> Self {
        self.set(SettingKey::ActiveUa, Value::String(key.to_string()))
    }

    pub fn auto_apply(self, auto_apply: bool) -> Self {
        self.set(SettingKey::AutoApply, Value::Bool(auto_apply))
    }

    pub fn user_agents(self, entries: &UserAgentEntries) -> Self {
        self.set(SettingKey::UserAgents, to_value(entries))
    }

    pub fn custom_user_agents(self, entries: &UserAgentEntries) -> Self {
        self.set(SettingKey::CustomUserAgents, to_value(entries))
    }

    pub fn domain_rules(self, rules: &DomainRules) -> Self {
        self.set(SettingKey::DomainRules, to_value(rules))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_document(self) -> Document {
        self.values
    }
}

impl From<Document> for Update {
    fn from(values: Document) -> Self {
        Self { values }
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    // Maps of strings always serialize
    serde_json::to_value(value).unwrap_or(Value::Null)
}
