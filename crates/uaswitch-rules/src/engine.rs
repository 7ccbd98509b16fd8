//! Rule materialization and installation

use crate::host::RuleHost;
use crate::rule::{domain_url_filter, Rule, DOMAIN_PRIORITY, GLOBAL_PRIORITY, GLOBAL_URL_FILTER};
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uaswitch_core::presets::{self, FALLBACK_PRESET};
use uaswitch_core::{DomainRules, SettingKey, Snapshot, UaError, UaResult};
use uaswitch_store::SettingsStore;

/// Keys read by a full resync
const RESYNC_KEYS: [SettingKey; 5] = [
    SettingKey::Enabled,
    SettingKey::ActiveUa,
    SettingKey::UserAgents,
    SettingKey::CustomUserAgents,
    SettingKey::DomainRules,
];

/// Lifecycle of the engine within one process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Loaded, defaults not yet written
    Uninitialized,
    /// Defaults written, no successful resync yet
    Seeded,
    /// At least one successful resync or apply
    Synced,
}

/// Resolve `key` against a merged User-Agent map
pub fn resolve<'a>(merged: &'a IndexMap<String, String>, key: &str) -> Option<&'a str> {
    merged.get(key).map(String::as_str)
}

/// The active User-Agent for a snapshot, falling back to the `chrome_latest` preset
pub fn resolve_active(snapshot: &Snapshot) -> String {
    let merged = snapshot.merged_user_agents();
    let active = snapshot.active_ua();

    match active.as_deref().and_then(|key| resolve(&merged, key)) {
        Some(value) => value.to_string(),
        None => {
            log::warn!(
                "Active User-Agent {:?} not found, falling back to {}",
                active,
                FALLBACK_PRESET
            );
            presets::fallback_user_agent().to_string()
        }
    }
}

/// Build the rule batch: the global rule first, then one rule per domain
///
/// Domains whose key does not resolve use `global_ua`.
pub fn build_rules(
    global_ua: &str,
    domain_rules: &DomainRules,
    merged: &IndexMap<String, String>,
) -> UaResult<Vec<Rule>> {
    let mut rules = Vec::with_capacity(domain_rules.len() + 1);
    let mut next_id = 1u32;

    rules.push(Rule::set_user_agent(
        next_id,
        GLOBAL_PRIORITY,
        GLOBAL_URL_FILTER.to_string(),
        global_ua,
    ));
    next_id += 1;

    for (domain, key) in domain_rules {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(UaError::rule_apply("domain pattern cannot be empty"));
        }

        let user_agent = match resolve(merged, key) {
            Some(value) => value,
            None => {
                log::warn!(
                    "User-Agent {:?} for {} not found, using the global value",
                    key,
                    domain
                );
                global_ua
            }
        };

        log::debug!("Domain rule {} for {} -> {}", next_id, domain, key);
        rules.push(Rule::set_user_agent(
            next_id,
            DOMAIN_PRIORITY,
            domain_url_filter(domain),
            user_agent,
        ));
        next_id += 1;
    }

    Ok(rules)
}

/// Keeps the host's dynamic rules in step with the settings store
///
/// Every remove-then-add sequence runs under one lock, and the settings are
/// read inside it, so overlapping calls cannot interleave their phases.
pub struct RuleEngine {
    store: Arc<SettingsStore>,
    host: Arc<dyn RuleHost>,
    state: Mutex<EngineState>,
}

impl RuleEngine {
    pub fn new(store: Arc<SettingsStore>, host: Arc<dyn RuleHost>) -> Self {
        Self {
            store,
            host,
            state: Mutex::new(EngineState::Uninitialized),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.lock()
    }

    /// Record that defaults have been written
    pub fn mark_seeded(&self) {
        let mut state = self.lock();
        if *state == EngineState::Uninitialized {
            *state = EngineState::Seeded;
        }
    }

    /// Recompute every rule from the stored settings and install them
    ///
    /// Returns the number of rules installed; zero when disabled.
    pub fn resync(&self) -> UaResult<usize> {
        let mut state = self.lock();
        let snapshot = self.store.get(&RESYNC_KEYS)?;

        if snapshot.enabled() != Some(true) {
            log::info!("User-Agent override disabled, clearing rules");
            self.remove_installed()?;
            *state = EngineState::Synced;
            return Ok(0);
        }

        let global_ua = resolve_active(&snapshot);
        let merged = snapshot.merged_user_agents();
        let batch = build_rules(&global_ua, &snapshot.domain_rules(), &merged)?;

        log::info!(
            "Applying User-Agent {}",
            snapshot.active_ua().as_deref().unwrap_or(FALLBACK_PRESET)
        );
        let count = self.swap(batch)?;
        *state = EngineState::Synced;
        Ok(count)
    }

    /// Install rules for a pre-resolved global User-Agent and domain map
    ///
    /// Domain keys are still resolved against the stored User-Agent maps.
    pub fn apply(
        &self,
        active_key: &str,
        user_agent: &str,
        domain_rules: &DomainRules,
    ) -> UaResult<usize> {
        let mut state = self.lock();
        let snapshot = self
            .store
            .get(&[SettingKey::UserAgents, SettingKey::CustomUserAgents])?;
        let merged = snapshot.merged_user_agents();
        let batch = build_rules(user_agent, domain_rules, &merged)?;

        log::info!("Applying User-Agent {}", active_key);
        let count = self.swap(batch)?;
        *state = EngineState::Synced;
        Ok(count)
    }

    /// Remove every installed rule regardless of the stored enabled flag
    pub fn disable(&self) -> UaResult<()> {
        let _state = self.lock();
        self.remove_installed()
    }

    /// Rules currently registered with the host
    pub fn installed_rules(&self) -> UaResult<Vec<Rule>> {
        self.host.rules()
    }

    fn swap(&self, batch: Vec<Rule>) -> UaResult<usize> {
        self.remove_installed()?;

        // From here on a failure leaves the host empty, never half old and half new
        if let Err(e) = self.host.add_rules(&batch) {
            log::error!("Failed to add {} rules: {}", batch.len(), e);
            return Err(into_rule_error(e));
        }

        log::info!("User-Agent rules applied. Total rules: {}", batch.len());
        Ok(batch.len())
    }

    fn remove_installed(&self) -> UaResult<()> {
        let ids = self.host.installed_rule_ids().map_err(into_rule_error)?;
        if ids.is_empty() {
            return Ok(());
        }

        self.host.remove_rules(&ids).map_err(|e| {
            log::error!("Failed to remove {} rules: {}", ids.len(), e);
            into_rule_error(e)
        })?;
        log::debug!("Removed {} rules", ids.len());
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn into_rule_error(err: UaError) -> UaError {
    match err {
        UaError::RuleApply(_) => err,
        other => UaError::rule_apply(other.to_string()),
    }
}
