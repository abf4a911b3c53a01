use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::enums::ChannelType;

pub const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";
const DEFAULT_IRC_PORT: u16 = 6697;

fn default_ntfy_server() -> String {
    DEFAULT_NTFY_SERVER.to_string()
}

fn default_irc_port() -> u16 {
    DEFAULT_IRC_PORT
}

/// Type-specific channel configuration. The shape must match the channel type:
/// parsing a Slack config as PagerDuty fails on the missing `routingKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Email {
        email: String,
    },
    #[serde(rename_all = "camelCase")]
    Slack {
        webhook_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Discord {
        webhook_url: String,
    },
    #[serde(rename_all = "camelCase")]
    Webhook {
        url: String,
        #[serde(default)]
        method: Option<String>, // defaults to POST
        #[serde(default)]
        headers: HashMap<String, String>,
        /// May be stored encrypted (`enc:v1:`).
        #[serde(default)]
        signing_key: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Teams {
        webhook_url: String,
    },
    #[serde(rename = "pagerduty", rename_all = "camelCase")]
    PagerDuty {
        routing_key: String,
    },
    #[serde(rename_all = "camelCase")]
    Ntfy {
        #[serde(default = "default_ntfy_server")]
        server_url: String,
        topic: String,
        #[serde(default)]
        priority: Option<u8>,
        #[serde(default)]
        signing_key: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Sms {
        phone_number: String,
    },
    #[serde(rename_all = "camelCase")]
    Irc {
        server: String,
        #[serde(default = "default_irc_port")]
        port: u16,
        channel: String,
        #[serde(default)]
        nickname: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Twitter {
        handle: String,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelConfigError {
    #[error("config does not match the {channel_type} shape: {source}")]
    Shape {
        channel_type: ChannelType,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

impl ChannelConfig {
    /// Parses the stored JSON config of a channel of type `channel_type` and
    /// checks the values a job cannot do without.
    pub fn parse(
        channel_type: ChannelType,
        raw: &serde_json::Value,
    ) -> Result<Self, ChannelConfigError> {
        let mut tagged = match raw {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(ChannelConfigError::Invalid(
                    "config must be a JSON object".to_string(),
                ))
            }
        };
        tagged.insert(
            "type".to_string(),
            serde_json::Value::String(channel_type.as_str().to_string()),
        );

        let config: ChannelConfig = serde_json::from_value(serde_json::Value::Object(tagged))
            .map_err(|source| ChannelConfigError::Shape {
                channel_type,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Email { .. } => ChannelType::Email,
            ChannelConfig::Slack { .. } => ChannelType::Slack,
            ChannelConfig::Discord { .. } => ChannelType::Discord,
            ChannelConfig::Webhook { .. } => ChannelType::Webhook,
            ChannelConfig::Teams { .. } => ChannelType::Teams,
            ChannelConfig::PagerDuty { .. } => ChannelType::PagerDuty,
            ChannelConfig::Ntfy { .. } => ChannelType::Ntfy,
            ChannelConfig::Sms { .. } => ChannelType::Sms,
            ChannelConfig::Irc { .. } => ChannelType::Irc,
            ChannelConfig::Twitter { .. } => ChannelType::Twitter,
        }
    }

    fn validate(&self) -> Result<(), ChannelConfigError> {
        match self {
            ChannelConfig::Email { email } => {
                if !email.contains('@') {
                    return Err(invalid(format!("'{email}' is not an email address")));
                }
            }
            ChannelConfig::Slack { webhook_url }
            | ChannelConfig::Discord { webhook_url }
            | ChannelConfig::Teams { webhook_url } => check_url("webhookUrl", webhook_url)?,
            ChannelConfig::Webhook { url, .. } => check_url("url", url)?,
            ChannelConfig::PagerDuty { routing_key } => require("routingKey", routing_key)?,
            ChannelConfig::Ntfy {
                server_url, topic, ..
            } => {
                check_url("serverUrl", server_url)?;
                require("topic", topic)?;
            }
            ChannelConfig::Sms { phone_number } => require("phoneNumber", phone_number)?,
            ChannelConfig::Irc {
                server, channel, ..
            } => {
                require("server", server)?;
                require("channel", channel)?;
            }
            ChannelConfig::Twitter { handle } => require("handle", handle)?,
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ChannelConfigError {
    ChannelConfigError::Invalid(reason)
}

fn require(field: &str, value: &str) -> Result<(), ChannelConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<(), ChannelConfigError> {
    require(field, value)?;
    let url = Url::parse(value).map_err(|e| invalid(format!("{field} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("{field} must be an http(s) URL")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_config_for_its_type() {
        let config = ChannelConfig::parse(
            ChannelType::Slack,
            &json!({"webhookUrl": "https://hooks.slack.com/services/T/B/X"}),
        )
        .unwrap();
        assert_eq!(config.channel_type(), ChannelType::Slack);
    }

    #[test]
    fn mismatched_shape_is_rejected() {
        let err = ChannelConfig::parse(
            ChannelType::PagerDuty,
            &json!({"webhookUrl": "https://hooks.slack.com/services/T/B/X"}),
        )
        .unwrap_err();
        assert!(matches!(err, ChannelConfigError::Shape { .. }));
    }

    #[test]
    fn empty_url_is_rejected() {
        let err = ChannelConfig::parse(ChannelType::Webhook, &json!({"url": ""})).unwrap_err();
        assert!(err.to_string().contains("url must not be empty"));
    }

    #[test]
    fn ntfy_defaults_to_public_server() {
        let config = ChannelConfig::parse(ChannelType::Ntfy, &json!({"topic": "ops"})).unwrap();
        match config {
            ChannelConfig::Ntfy { server_url, .. } => assert_eq!(server_url, DEFAULT_NTFY_SERVER),
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn stored_type_field_is_overridden_by_channel_type() {
        let config = ChannelConfig::parse(
            ChannelType::Email,
            &json!({"type": "slack", "email": "ops@example.com"}),
        )
        .unwrap();
        assert_eq!(config.channel_type(), ChannelType::Email);
    }
}
