//! Header-rewrite rule descriptors
//!
//! Serialized in the shape the browser's declarative request engine accepts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uaswitch_core::UaError;

/// Header every rule rewrites
pub const USER_AGENT_HEADER: &str = "User-Agent";

/// Priority of the catch-all rule
pub const GLOBAL_PRIORITY: u32 = 1;

/// Priority of every per-domain rule; always above [`GLOBAL_PRIORITY`]
pub const DOMAIN_PRIORITY: u32 = 10;

/// Filter matching every scheme, host and path
pub const GLOBAL_URL_FILTER: &str = "*://*/*";

/// Resource types a User-Agent rule applies to
pub const REWRITTEN_RESOURCE_TYPES: [ResourceType; 6] = [
    ResourceType::MainFrame,
    ResourceType::SubFrame,
    ResourceType::Xhr,
    ResourceType::Script,
    ResourceType::Image,
    ResourceType::Stylesheet,
];

/// Url filter for a single domain pattern
pub fn domain_url_filter(domain: &str) -> String {
    format!("*://{}/*", domain)
}

/// Type of resource being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    #[serde(rename = "xmlhttprequest")]
    Xhr,
    Websocket,
    Media,
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::MainFrame => "main_frame",
            ResourceType::SubFrame => "sub_frame",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Xhr => "xmlhttprequest",
            ResourceType::Websocket => "websocket",
            ResourceType::Media => "media",
            ResourceType::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            ResourceType::MainFrame,
            ResourceType::SubFrame,
            ResourceType::Stylesheet,
            ResourceType::Script,
            ResourceType::Image,
            ResourceType::Font,
            ResourceType::Xhr,
            ResourceType::Websocket,
            ResourceType::Media,
            ResourceType::Other,
        ];
        all.into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UaError::config(format!("Unknown resource type: {}", s)))
    }
}

/// How a header is modified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderOperation {
    Set,
    Remove,
}

/// One request-header modification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderModification {
    pub header: String,
    pub operation: HeaderOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// What a matching rule does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RuleAction {
    ModifyHeaders {
        #[serde(rename = "requestHeaders")]
        request_headers: Vec<HeaderModification>,
    },
}

/// Which requests a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// A rule descriptor `{id, priority, action, condition}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    /// Rule setting the `User-Agent` header for requests matching `url_filter`
    pub fn set_user_agent(id: u32, priority: u32, url_filter: String, user_agent: &str) -> Self {
        Self {
            id,
            priority,
            action: RuleAction::ModifyHeaders {
                request_headers: vec![HeaderModification {
                    header: USER_AGENT_HEADER.to_string(),
                    operation: HeaderOperation::Set,
                    value: Some(user_agent.to_string()),
                }],
            },
            condition: RuleCondition {
                url_filter,
                resource_types: REWRITTEN_RESOURCE_TYPES.to_vec(),
            },
        }
    }

    /// Whether this is the catch-all rule
    pub fn is_global(&self) -> bool {
        self.condition.url_filter == GLOBAL_URL_FILTER
    }

    /// The `User-Agent` value this rule sets, if any
    pub fn user_agent(&self) -> Option<&str> {
        let RuleAction::ModifyHeaders { request_headers } = &self.action;
        request_headers
            .iter()
            .find(|h| h.header.eq_ignore_ascii_case(USER_AGENT_HEADER))
            .and_then(|h| match h.operation {
                HeaderOperation::Set => h.value.as_deref(),
                HeaderOperation::Remove => None,
            })
    }

    /// Effect on the `User-Agent` header, if this rule touches it
    pub fn user_agent_operation(&self) -> Option<HeaderOperation> {
        let RuleAction::ModifyHeaders { request_headers } = &self.action;
        request_headers
            .iter()
            .find(|h| h.header.eq_ignore_ascii_case(USER_AGENT_HEADER))
            .map(|h| h.operation)
    }
}
