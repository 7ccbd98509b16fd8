//! User-Agent rewrite rules for UA Switch
//!
//! Turns the stored settings into header-rewrite rules and installs them in a
//! [`RuleHost`]: one catch-all rule for the active User-Agent and one
//! higher-priority rule per domain override.

pub mod engine;
pub mod host;
pub mod rule;

pub use engine::{build_rules, resolve, resolve_active, EngineState, RuleEngine};
pub use host::{url_filter_matches, HostCalls, MemoryRuleHost, RuleHost};
pub use rule::{
    domain_url_filter, HeaderModification, HeaderOperation, ResourceType, Rule, RuleAction,
    RuleCondition, DOMAIN_PRIORITY, GLOBAL_PRIORITY, GLOBAL_URL_FILTER, USER_AGENT_HEADER,
};
