use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::enums::{ChannelType, ParseEnumError};

/// Named delivery queues the worker can publish to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    Email,
    Slack,
    Discord,
    Webhook,
    Sms,
    Irc,
    Twitter,
}

impl QueueName {
    pub const ALL: [QueueName; 7] = [
        QueueName::Email,
        QueueName::Slack,
        QueueName::Discord,
        QueueName::Webhook,
        QueueName::Sms,
        QueueName::Irc,
        QueueName::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Email => "email",
            QueueName::Slack => "slack",
            QueueName::Discord => "discord",
            QueueName::Webhook => "webhook",
            QueueName::Sms => "sms",
            QueueName::Irc => "irc",
            QueueName::Twitter => "twitter",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("queue", s))
    }
}

/// Primary queue for a channel type plus where to go when it is not provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub primary: QueueName,
    pub fallback: Option<QueueName>,
}

pub fn route_for(channel_type: ChannelType) -> Route {
    let (primary, fallback) = match channel_type {
        ChannelType::Email => (QueueName::Email, None),
        ChannelType::Slack => (QueueName::Slack, None),
        ChannelType::Discord => (QueueName::Discord, None),
        ChannelType::Webhook | ChannelType::Teams | ChannelType::PagerDuty | ChannelType::Ntfy => {
            (QueueName::Webhook, None)
        }
        ChannelType::Sms => (QueueName::Sms, Some(QueueName::Email)),
        ChannelType::Irc => (QueueName::Irc, Some(QueueName::Webhook)),
        ChannelType::Twitter => (QueueName::Twitter, Some(QueueName::Webhook)),
    };
    Route { primary, fallback }
}
