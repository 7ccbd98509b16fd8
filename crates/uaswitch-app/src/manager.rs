//! User-facing settings operations
//!
//! Each operation updates the store, asks the background service to reapply
//! where needed, and reports a [`StatusMessage`] for display.

use crate::background::Background;
use crate::ipc::Message;
use crate::transfer::ExportDocument;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uaswitch_core::presets::{self, FALLBACK_PRESET};
use uaswitch_core::settings::{custom_key, UserAgentEntry};
use uaswitch_core::{SettingKey, UaError, UaResult, Update};
use uaswitch_rules::resolve;
use uaswitch_store::SettingsStore;

/// Placeholder written by [`Manager::add_domain_rule`]
pub const PLACEHOLDER_DOMAIN: &str = "example.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Success,
    Error,
    Info,
}

/// Outcome text shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

impl From<&UaError> for StatusMessage {
    fn from(err: &UaError) -> Self {
        StatusMessage::error(format!("Error: {}", err))
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One row of the User-Agent list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAgentListing {
    pub key: String,
    pub name: String,
    pub value: String,
    pub is_preset: bool,
    pub is_active: bool,
}

pub struct Manager {
    background: Arc<Background>,
}

impl Manager {
    pub fn new(background: Arc<Background>) -> Self {
        Self { background }
    }

    fn store(&self) -> &SettingsStore {
        self.background.store()
    }

    /// Every selectable User-Agent: presets first, then stored and custom entries
    pub fn list_user_agents(&self) -> UaResult<Vec<UserAgentListing>> {
        let snapshot = self.store().get(&[
            SettingKey::ActiveUa,
            SettingKey::UserAgents,
            SettingKey::CustomUserAgents,
        ])?;
        let active = snapshot.active_ua();
        let stored = snapshot.user_agents();
        let customs = snapshot.custom_user_agents();

        let listings = snapshot
            .merged_user_agents()
            .into_iter()
            .map(|(key, value)| {
                let name = customs
                    .get(&key)
                    .and_then(UserAgentEntry::name)
                    .or_else(|| stored.get(&key).and_then(UserAgentEntry::name))
                    .or_else(|| presets::preset(&key).map(|p| p.name))
                    .unwrap_or(&key)
                    .to_string();

                UserAgentListing {
                    is_preset: presets::is_preset(&key),
                    is_active: active.as_deref() == Some(key.as_str()),
                    key,
                    name,
                    value,
                }
            })
            .collect();

        Ok(listings)
    }

    /// Make `key` the active User-Agent and install rules for it
    pub fn activate(&self, key: &str) -> UaResult<StatusMessage> {
        let snapshot = self.store().get(&[
            SettingKey::UserAgents,
            SettingKey::CustomUserAgents,
            SettingKey::DomainRules,
        ])?;
        let merged = snapshot.merged_user_agents();
        let user_agent = resolve(&merged, key)
            .ok_or_else(|| UaError::not_found(format!("User-Agent not found: {}", key)))?;

        self.background
            .handle_message(Message::ApplyUserAgent {
                ua_key: key.to_string(),
                user_agent: user_agent.to_string(),
                domain_rules: snapshot.domain_rules(),
            })
            .into_result()?;

        Ok(StatusMessage::success("User-Agent activated successfully!"))
    }

    pub fn reset_to_default(&self) -> UaResult<StatusMessage> {
        self.activate(FALLBACK_PRESET)
    }

    /// Store a named custom User-Agent under a key derived from its name
    pub fn add_custom(&self, name: &str, value: &str) -> UaResult<StatusMessage> {
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return Ok(StatusMessage::error(
                "Please fill in both name and User-Agent string!",
            ));
        }

        let mut customs = self
            .store()
            .get(&[SettingKey::CustomUserAgents])?
            .custom_user_agents();
        let key = custom_key(name);
        customs.insert(key.clone(), UserAgentEntry::named(name, value));
        self.store()
            .set(Update::new().custom_user_agents(&customs))?;

        info!("Added custom User-Agent {}", key);
        Ok(StatusMessage::success("Custom User-Agent added successfully!"))
    }

    /// Delete a custom entry; presets cannot be deleted
    ///
    /// Deleting the active entry switches back to the default preset.
    pub fn delete_custom(&self, key: &str) -> UaResult<StatusMessage> {
        if presets::is_preset(key) {
            return Ok(StatusMessage::error("Preset User-Agents cannot be deleted"));
        }

        let snapshot = self
            .store()
            .get(&[SettingKey::CustomUserAgents, SettingKey::ActiveUa])?;
        let mut customs = snapshot.custom_user_agents();
        if customs.shift_remove(key).is_none() {
            return Err(UaError::not_found(format!("User-Agent not found: {}", key)));
        }
        self.store()
            .set(Update::new().custom_user_agents(&customs))?;
        info!("Deleted custom User-Agent {}", key);

        if snapshot.active_ua().as_deref() == Some(key) {
            self.activate(FALLBACK_PRESET)?;
        }

        Ok(StatusMessage::success("User-Agent deleted successfully!"))
    }

    /// Insert the placeholder rule for the user to edit
    pub fn add_domain_rule(&self) -> UaResult<StatusMessage> {
        let mut rules = self.store().get(&[SettingKey::DomainRules])?.domain_rules();
        rules.insert(PLACEHOLDER_DOMAIN.to_string(), FALLBACK_PRESET.to_string());
        self.store().set(Update::new().domain_rules(&rules))?;

        Ok(StatusMessage::info("Domain rule added! Edit the domain and UA."))
    }

    /// Point `new_domain` at `ua_key`, renaming the rule from `old_domain`
    pub fn update_domain_rule(
        &self,
        old_domain: &str,
        new_domain: &str,
        ua_key: &str,
    ) -> UaResult<StatusMessage> {
        let new_domain = new_domain.trim();
        if new_domain.is_empty() {
            return Ok(StatusMessage::error("Domain cannot be empty"));
        }

        let mut rules = self.store().get(&[SettingKey::DomainRules])?.domain_rules();
        if old_domain != new_domain {
            rules.shift_remove(old_domain);
        }
        rules.insert(new_domain.to_string(), ua_key.to_string());
        self.store().set(Update::new().domain_rules(&rules))?;

        self.reapply_if_auto()?;
        Ok(StatusMessage::success("Domain rule updated!"))
    }

    pub fn remove_domain_rule(&self, domain: &str) -> UaResult<StatusMessage> {
        let mut rules = self.store().get(&[SettingKey::DomainRules])?.domain_rules();
        if rules.shift_remove(domain).is_none() {
            return Err(UaError::not_found(format!("No domain rule for {}", domain)));
        }
        self.store().set(Update::new().domain_rules(&rules))?;

        self.reapply_if_auto()?;
        Ok(StatusMessage::success("Domain rule removed!"))
    }

    /// Persist the master switch and install or clear rules to match
    pub fn set_enabled(&self, enabled: bool) -> UaResult<StatusMessage> {
        self.store().set(Update::new().enabled(enabled))?;

        if enabled {
            self.background.handle_message(Message::Enable).into_result()?;
            Ok(StatusMessage::success("Extension enabled!"))
        } else {
            self.background.handle_message(Message::Disable).into_result()?;
            Ok(StatusMessage::info("Extension disabled"))
        }
    }

    pub fn set_auto_apply(&self, auto_apply: bool) -> UaResult<StatusMessage> {
        self.store().set(Update::new().auto_apply(auto_apply))?;
        Ok(StatusMessage::success("Auto-apply setting saved!"))
    }

    /// Reinstall the rules for the current selection
    pub fn refresh_rules(&self) -> UaResult<StatusMessage> {
        self.reapply()?;
        Ok(StatusMessage::success("Rules refreshed!"))
    }

    pub fn export(&self) -> UaResult<ExportDocument> {
        ExportDocument::capture(self.store())
    }

    /// Replace every setting with the imported document and resync
    pub fn import(&self, document: ExportDocument) -> UaResult<StatusMessage> {
        document.restore(self.store())?;
        self.background.engine().resync()?;
        Ok(StatusMessage::success("Settings imported successfully!"))
    }

    /// Wipe every setting, clear the rules and start over from defaults
    pub fn reset_all(&self) -> UaResult<StatusMessage> {
        self.store().clear()?;
        self.background.handle_message(Message::Disable).into_result()?;

        self.store().seed_defaults()?;
        self.background.engine().mark_seeded();
        self.background.engine().resync()?;

        Ok(StatusMessage::success("All settings reset to default!"))
    }

    fn reapply_if_auto(&self) -> UaResult<()> {
        let auto_apply = self.store().get(&[SettingKey::AutoApply])?.auto_apply();
        if auto_apply == Some(false) {
            return Ok(());
        }
        self.reapply()
    }

    // Re-activating would also switch a disabled service back on
    fn reapply(&self) -> UaResult<()> {
        let snapshot = self
            .store()
            .get(&[SettingKey::ActiveUa, SettingKey::Enabled])?;
        match snapshot.active_ua() {
            Some(key) if snapshot.enabled() == Some(true) => {
                self.activate(&key)?;
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uaswitch_core::DomainRules;
    use uaswitch_rules::{MemoryRuleHost, RuleHost};
    use uaswitch_store::MemoryBackend;

    fn manager() -> (Arc<SettingsStore>, Arc<MemoryRuleHost>, Manager) {
        let store = Arc::new(SettingsStore::in_memory());
        store.seed_defaults().unwrap();
        let host = Arc::new(MemoryRuleHost::new());
        let background = Arc::new(Background::new(Arc::clone(&store), host.clone()));
        (store, host, Manager::new(background))
    }

    #[test]
    fn test_list_marks_presets_and_active() {
        let (_store, _host, manager) = manager();
        manager.add_custom("My Phone", "Phone/1").unwrap();
        let listings = manager.list_user_agents().unwrap();

        assert_eq!(listings.len(), presets::PRESETS.len() + 1);
        let chrome = &listings[0];
        assert_eq!(chrome.key, "chrome_latest");
        assert_eq!(chrome.name, "Chrome Latest");
        assert!(chrome.is_preset && chrome.is_active);

        let custom = listings.last().unwrap();
        assert_eq!(custom.key, "custom_my_phone");
        assert_eq!(custom.name, "My Phone");
        assert!(!custom.is_preset && !custom.is_active);
    }

    #[test]
    fn test_activate_unknown_key() {
        let (_store, host, manager) = manager();
        let err = manager.activate("nope").unwrap_err();
        assert!(matches!(err, UaError::NotFound(_)));
        assert!(host.is_empty());
        assert!(StatusMessage::from(&err).text.contains("nope"));
    }

    #[test]
    fn test_activate_custom_with_domain_rules() {
        let (store, host, manager) = manager();
        manager.add_custom("Bot", "Bot/2").unwrap();
        let mut rules = DomainRules::new();
        rules.insert("a.com".to_string(), "edge_latest".to_string());
        store.set(Update::new().domain_rules(&rules)).unwrap();

        let status = manager.activate("custom_bot").unwrap();
        assert_eq!(status.kind, StatusKind::Success);

        let installed = host.rules().unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].user_agent(), Some("Bot/2"));
        assert_eq!(store.get_all().unwrap().active_ua().as_deref(), Some("custom_bot"));
    }

    #[test]
    fn test_add_custom_requires_both_fields() {
        let (store, _host, manager) = manager();
        let status = manager.add_custom("  ", "X/1").unwrap();
        assert!(status.is_error());
        let status = manager.add_custom("Name", "").unwrap();
        assert!(status.is_error());
        assert!(store.get_all().unwrap().custom_user_agents().is_empty());
    }

    #[test]
    fn test_presets_cannot_be_deleted() {
        let (_store, _host, manager) = manager();
        let status = manager.delete_custom("chrome_latest").unwrap();
        assert!(status.is_error());
        assert!(manager
            .list_user_agents()
            .unwrap()
            .iter()
            .any(|l| l.key == "chrome_latest"));
    }

    #[test]
    fn test_delete_active_custom_falls_back() {
        let (store, host, manager) = manager();
        manager.add_custom("Temp", "Temp/1").unwrap();
        manager.activate("custom_temp").unwrap();

        manager.delete_custom("custom_temp").unwrap();
        let snapshot = store.get_all().unwrap();
        assert_eq!(snapshot.active_ua().as_deref(), Some("chrome_latest"));
        assert!(snapshot.custom_user_agents().is_empty());
        assert_eq!(
            host.rules().unwrap()[0].user_agent(),
            Some(presets::fallback_user_agent())
        );
    }

    #[test]
    fn test_delete_missing_custom() {
        let (_store, _host, manager) = manager();
        assert!(matches!(
            manager.delete_custom("custom_ghost"),
            Err(UaError::NotFound(_))
        ));
    }

    #[test]
    fn test_domain_rule_lifecycle() {
        let (store, host, manager) = manager();
        let status = manager.add_domain_rule().unwrap();
        assert_eq!(status.kind, StatusKind::Info);
        assert_eq!(
            store.get_all().unwrap().domain_rules().get(PLACEHOLDER_DOMAIN).map(String::as_str),
            Some("chrome_latest")
        );

        manager
            .update_domain_rule(PLACEHOLDER_DOMAIN, " site.org ", "firefox_latest")
            .unwrap();
        let rules = store.get_all().unwrap().domain_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("site.org").map(String::as_str), Some("firefox_latest"));

        let installed = host.rules().unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[1].condition.url_filter, "*://site.org/*");

        manager.remove_domain_rule("site.org").unwrap();
        assert!(store.get_all().unwrap().domain_rules().is_empty());
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_update_rejects_empty_domain() {
        let (store, _host, manager) = manager();
        manager.add_domain_rule().unwrap();
        let status = manager
            .update_domain_rule(PLACEHOLDER_DOMAIN, "   ", "edge_latest")
            .unwrap();
        assert!(status.is_error());
        assert!(store
            .get_all()
            .unwrap()
            .domain_rules()
            .contains_key(PLACEHOLDER_DOMAIN));
    }

    #[test]
    fn test_auto_apply_off_defers_reapply() {
        let (_store, host, manager) = manager();
        manager.refresh_rules().unwrap();
        manager.set_auto_apply(false).unwrap();
        let adds = host.calls().adds;

        manager.add_domain_rule().unwrap();
        manager
            .update_domain_rule(PLACEHOLDER_DOMAIN, "b.com", "edge_latest")
            .unwrap();
        assert_eq!(host.calls().adds, adds);
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_disable_then_enable() {
        let (store, host, manager) = manager();
        manager.refresh_rules().unwrap();
        assert_eq!(host.len(), 1);

        let status = manager.set_enabled(false).unwrap();
        assert_eq!(status.kind, StatusKind::Info);
        assert!(host.is_empty());
        assert_eq!(store.get_all().unwrap().enabled(), Some(false));

        // Edits while disabled do not switch the service back on
        manager.add_domain_rule().unwrap();
        manager
            .update_domain_rule(PLACEHOLDER_DOMAIN, "c.com", "edge_latest")
            .unwrap();
        assert!(host.is_empty());
        assert_eq!(store.get_all().unwrap().enabled(), Some(false));

        manager.set_enabled(true).unwrap();
        assert_eq!(host.installed_rule_ids().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_reset_to_default() {
        let (store, host, manager) = manager();
        manager.activate("electron_13").unwrap();
        manager.reset_to_default().unwrap();
        assert_eq!(store.get_all().unwrap().active_ua().as_deref(), Some("chrome_latest"));
        assert_eq!(
            host.rules().unwrap()[0].user_agent(),
            Some(presets::fallback_user_agent())
        );
    }

    #[test]
    fn test_reset_all_restores_defaults() {
        let (store, host, manager) = manager();
        manager.add_custom("Gone", "Gone/1").unwrap();
        manager.activate("custom_gone").unwrap();

        manager.reset_all().unwrap();
        let snapshot = store.get_all().unwrap();
        assert!(snapshot.custom_user_agents().is_empty());
        assert_eq!(snapshot.active_ua().as_deref(), Some("chrome_latest"));
        assert_eq!(host.len(), 1);
        assert_eq!(
            host.rules().unwrap()[0].user_agent(),
            Some(presets::fallback_user_agent())
        );
    }

    #[test]
    fn test_import_of_export_reproduces_state() {
        let (store, _host, manager) = manager();
        manager.add_custom("Tablet", "Tablet/5").unwrap();
        manager.add_domain_rule().unwrap();
        manager.set_auto_apply(false).unwrap();
        let before = store.get_all().unwrap();

        let export = manager.export().unwrap();
        store.clear().unwrap();
        manager.import(export).unwrap();

        assert_eq!(store.get_all().unwrap(), before);
    }

    #[test]
    fn test_export_then_import() {
        let (store, host, manager) = manager();
        manager.activate("edge_latest").unwrap();
        let export = manager.export().unwrap();

        manager.activate("firefox_latest").unwrap();
        manager.import(export).unwrap();

        assert_eq!(store.get_all().unwrap().active_ua().as_deref(), Some("edge_latest"));
        assert_eq!(
            host.rules().unwrap()[0].user_agent(),
            Some(presets::preset("edge_latest").unwrap().value)
        );
    }

    #[test]
    fn test_failed_import_keeps_current_settings() {
        let store = Arc::new(SettingsStore::new(Arc::new(MemoryBackend::with_quota(7))));
        store.seed_defaults().unwrap();
        let host = Arc::new(MemoryRuleHost::new());
        let background = Arc::new(Background::new(Arc::clone(&store), host.clone()));
        let manager = Manager::new(background);
        manager.activate("firefox_latest").unwrap();
        let before = store.get_all().unwrap();

        let oversized = ExportDocument::from_value(json!({
            "data": {
                "enabled": true,
                "activeUA": "edge_latest",
                "userAgents": {},
                "customUserAgents": {},
                "domainRules": {},
                "autoApply": true,
                "theme": "dark",
                "fontSize": 14
            }
        }))
        .unwrap();
        let err = manager.import(oversized).unwrap_err();

        assert!(matches!(err, UaError::Storage(_)));
        assert_eq!(store.get_all().unwrap(), before);
        assert_eq!(
            host.rules().unwrap()[0].user_agent(),
            Some(presets::preset("firefox_latest").unwrap().value)
        );
    }
}
