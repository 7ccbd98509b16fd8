//! Control messages between the manager UI and the background service
//!
//! Messages are JSON objects `{"action": "...", "data": {...}}`. The `data`
//! field may be omitted for actions that take no arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uaswitch_core::{DomainRules, UaError, UaResult};

/// Message sent to the background service
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Activate `ua_key` and install rules for it
    ApplyUserAgent {
        ua_key: String,
        user_agent: String,
        domain_rules: DomainRules,
    },
    /// Remove every installed rule
    Disable,
    /// Recompute rules from the stored settings
    Enable,
    /// Ask for the resolved active User-Agent
    GetCurrentUa,
}

#[derive(Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyData {
    ua_key: String,
    user_agent: String,
    #[serde(default)]
    domain_rules: Option<DomainRules>,
}

impl Message {
    /// Parse a message from its JSON text
    pub fn from_json(text: &str) -> UaResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> UaResult<Self> {
        let envelope: Envelope = serde_json::from_value(value)?;

        match envelope.action.as_str() {
            "applyUserAgent" => {
                let data: ApplyData = serde_json::from_value(envelope.data)?;
                Ok(Message::ApplyUserAgent {
                    ua_key: data.ua_key,
                    user_agent: data.user_agent,
                    domain_rules: data.domain_rules.unwrap_or_default(),
                })
            }
            "disable" => Ok(Message::Disable),
            "enable" => Ok(Message::Enable),
            "getCurrentUA" => Ok(Message::GetCurrentUa),
            other => Err(UaError::not_found(format!("Unknown action: {}", other))),
        }
    }

    /// Name of the action on the wire
    pub fn action(&self) -> &'static str {
        match self {
            Message::ApplyUserAgent { .. } => "applyUserAgent",
            Message::Disable => "disable",
            Message::Enable => "enable",
            Message::GetCurrentUa => "getCurrentUA",
        }
    }
}

/// Reply to a [`Message`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            user_agent: None,
            error: None,
        }
    }

    pub fn user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..Self::ok()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user_agent: None,
            error: Some(message.into()),
        }
    }

    /// Convert back into a result, keeping the reported reason
    pub fn into_result(self) -> UaResult<Option<String>> {
        if self.success {
            Ok(self.user_agent)
        } else {
            Err(UaError::Other(anyhow::anyhow!(
                "{}",
                self.error.unwrap_or_else(|| "Unknown error".to_string())
            )))
        }
    }
}

impl From<UaResult<()>> for Response {
    fn from(result: UaResult<()>) -> Self {
        match result {
            Ok(()) => Response::ok(),
            Err(e) => Response::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_apply() {
        let message = Message::from_json(
            r#"{"action":"applyUserAgent","data":{"uaKey":"edge_latest","userAgent":"UA","domainRules":{"a.com":"chrome_latest"}}}"#,
        )
        .unwrap();

        match message {
            Message::ApplyUserAgent {
                ua_key,
                user_agent,
                domain_rules,
            } => {
                assert_eq!(ua_key, "edge_latest");
                assert_eq!(user_agent, "UA");
                assert_eq!(domain_rules.get("a.com").map(String::as_str), Some("chrome_latest"));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_without_data() {
        assert_eq!(Message::from_json(r#"{"action":"disable"}"#).unwrap(), Message::Disable);
        assert_eq!(
            Message::from_json(r#"{"action":"enable","data":{}}"#).unwrap(),
            Message::Enable
        );
        assert_eq!(
            Message::from_json(r#"{"action":"getCurrentUA"}"#).unwrap(),
            Message::GetCurrentUa
        );
    }

    #[test]
    fn test_apply_without_domain_rules() {
        let message = Message::from_value(json!({
            "action": "applyUserAgent",
            "data": {"uaKey": "k", "userAgent": "v"}
        }))
        .unwrap();
        assert!(matches!(message, Message::ApplyUserAgent { domain_rules, .. } if domain_rules.is_empty()));
    }

    #[test]
    fn test_unknown_action() {
        let err = Message::from_json(r#"{"action":"reboot"}"#).unwrap_err();
        assert!(err.to_string().contains("reboot"));
    }

    #[test]
    fn test_response_shape() {
        assert_eq!(serde_json::to_value(Response::ok()).unwrap(), json!({"success": true}));
        assert_eq!(
            serde_json::to_value(Response::user_agent("UA/1")).unwrap(),
            json!({"success": true, "userAgent": "UA/1"})
        );
        assert_eq!(
            serde_json::to_value(Response::error("boom")).unwrap(),
            json!({"success": false, "error": "boom"})
        );
    }
}
