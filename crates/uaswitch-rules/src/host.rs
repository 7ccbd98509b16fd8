//! Boundary to the browser's dynamic rule store

use crate::rule::{HeaderOperation, ResourceType, Rule};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uaswitch_core::config::DEFAULT_MAX_RULES;
use uaswitch_core::{UaError, UaResult};
use url::Url;

/// Capability supplied by the host environment
///
/// Removal and addition are independent calls; callers sequence them.
pub trait RuleHost: Send + Sync {
    /// Identifiers of every currently installed dynamic rule
    fn installed_rule_ids(&self) -> UaResult<Vec<u32>>;

    /// Remove the given identifiers
    fn remove_rules(&self, ids: &[u32]) -> UaResult<()>;

    /// Add a batch of rules
    fn add_rules(&self, rules: &[Rule]) -> UaResult<()>;

    /// Every installed rule, ordered by id
    fn rules(&self) -> UaResult<Vec<Rule>>;
}

/// Number of calls a [`MemoryRuleHost`] has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCalls {
    pub removes: u64,
    pub adds: u64,
}

/// In-process rule store that validates batches like the browser does and
/// can evaluate which `User-Agent` a request would carry
pub struct MemoryRuleHost {
    rules: Mutex<BTreeMap<u32, Rule>>,
    max_rules: usize,
    fail_adds: AtomicBool,
    fail_removes: AtomicBool,
    removes: AtomicU64,
    adds: AtomicU64,
}

impl MemoryRuleHost {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_RULES)
    }

    /// Host that refuses to hold more than `max_rules` rules
    pub fn with_limit(max_rules: usize) -> Self {
        Self {
            rules: Mutex::new(BTreeMap::new()),
            max_rules,
            fail_adds: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
            removes: AtomicU64::new(0),
            adds: AtomicU64::new(0),
        }
    }

    /// Reject every subsequent add call
    pub fn set_fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    /// Reject every subsequent remove call
    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> HostCalls {
        HostCalls {
            removes: self.removes.load(Ordering::SeqCst),
            adds: self.adds.load(Ordering::SeqCst),
        }
    }

    pub fn len(&self) -> usize {
        self.installed().len()
    }

    pub fn is_empty(&self) -> bool {
        self.installed().is_empty()
    }

    /// The `User-Agent` a request would be sent with, or `None` for the browser default
    ///
    /// The highest-priority matching rule wins; equal priorities go to the lowest id.
    pub fn effective_user_agent(
        &self,
        url: &str,
        resource_type: ResourceType,
    ) -> UaResult<Option<String>> {
        let url = Url::parse(url)?;
        let rules = self.installed();

        let winner = rules
            .values()
            .filter(|rule| rule.user_agent_operation().is_some())
            .filter(|rule| rule.condition.resource_types.contains(&resource_type))
            .filter(|rule| url_filter_matches(&rule.condition.url_filter, &url))
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        Ok(winner.and_then(|rule| match rule.user_agent_operation() {
            Some(HeaderOperation::Set) => rule.user_agent().map(str::to_string),
            _ => None,
        }))
    }

    fn installed(&self) -> MutexGuard<'_, BTreeMap<u32, Rule>> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryRuleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleHost for MemoryRuleHost {
    fn installed_rule_ids(&self) -> UaResult<Vec<u32>> {
        Ok(self.installed().keys().copied().collect())
    }

    fn remove_rules(&self, ids: &[u32]) -> UaResult<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(UaError::rule_apply("permission denied"));
        }

        let mut rules = self.installed();
        for id in ids {
            rules.remove(id);
        }
        Ok(())
    }

    fn add_rules(&self, batch: &[Rule]) -> UaResult<()> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(UaError::rule_apply("permission denied"));
        }

        let mut rules = self.installed();

        let mut seen = HashSet::new();
        for rule in batch {
            if rule.id == 0 {
                return Err(UaError::rule_apply("rule id must be at least 1"));
            }
            if rules.contains_key(&rule.id) || !seen.insert(rule.id) {
                return Err(UaError::rule_apply(format!("duplicate rule id {}", rule.id)));
            }
            if rule.condition.url_filter.trim().is_empty() {
                return Err(UaError::rule_apply(format!(
                    "rule {} has an empty url filter",
                    rule.id
                )));
            }
            if rule.condition.resource_types.is_empty() {
                return Err(UaError::rule_apply(format!(
                    "rule {} has no resource types",
                    rule.id
                )));
            }
        }
        if rules.len() + batch.len() > self.max_rules {
            return Err(UaError::rule_apply(format!(
                "too many rules ({} installed, {} added, limit {})",
                rules.len(),
                batch.len(),
                self.max_rules
            )));
        }

        for rule in batch {
            rules.insert(rule.id, rule.clone());
        }
        Ok(())
    }

    fn rules(&self) -> UaResult<Vec<Rule>> {
        Ok(self.installed().values().cloned().collect())
    }
}

/// Match a `urlFilter` against a URL
///
/// `*` matches any run of characters. The filter may match anywhere in the URL
/// unless anchored with a leading or trailing `|`.
pub fn url_filter_matches(filter: &str, url: &Url) -> bool {
    let (anchored_start, rest) = match filter.strip_prefix('|') {
        Some(rest) => (true, rest),
        None => (false, filter),
    };
    let (anchored_end, body) = match rest.strip_suffix('|') {
        Some(body) => (true, body),
        None => (false, rest),
    };

    let mut pattern = String::new();
    if !anchored_start {
        pattern.push('*');
    }
    pattern.push_str(&body.to_ascii_lowercase());
    if !anchored_end {
        pattern.push('*');
    }

    // Url already lowercases the scheme and host
    glob_match(pattern.as_bytes(), url.as_str().as_bytes())
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}
