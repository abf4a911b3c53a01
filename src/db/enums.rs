use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Derived availability state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Active,
    Degraded,
    Down,
    Paused,
    Pending,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Active => "active",
            MonitorStatus::Degraded => "degraded",
            MonitorStatus::Down => "down",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Pending => "pending",
        }
    }
}

impl FromStr for MonitorStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MonitorStatus::Active),
            "degraded" => Ok(MonitorStatus::Degraded),
            "down" => Ok(MonitorStatus::Down),
            "paused" => Ok(MonitorStatus::Paused),
            "pending" => Ok(MonitorStatus::Pending),
            _ => Err(ParseEnumError::new("monitor status", s)),
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CheckOutcome> for MonitorStatus {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Success => MonitorStatus::Active,
            CheckOutcome::Degraded => MonitorStatus::Degraded,
            CheckOutcome::Failure => MonitorStatus::Down,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Https,
    Tcp,
    Ssl,
    Ping,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Https => "https",
            MonitorType::Tcp => "tcp",
            MonitorType::Ssl => "ssl",
            MonitorType::Ping => "ping",
        }
    }

    /// Whether certificate inspection applies to this type at all.
    pub fn supports_certificate_check(&self) -> bool {
        matches!(self, MonitorType::Https | MonitorType::Ssl)
    }
}

impl FromStr for MonitorType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(MonitorType::Http),
            "https" => Ok(MonitorType::Https),
            "tcp" => Ok(MonitorType::Tcp),
            "ssl" => Ok(MonitorType::Ssl),
            "ping" | "icmp" => Ok(MonitorType::Ping),
            _ => Err(ParseEnumError::new("monitor type", s)),
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Success,
    Degraded,
    Failure,
}

impl CheckOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcome::Success => "success",
            CheckOutcome::Degraded => "degraded",
            CheckOutcome::Failure => "failure",
        }
    }
}

impl FromStr for CheckOutcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(CheckOutcome::Success),
            "degraded" => Ok(CheckOutcome::Degraded),
            "failure" => Ok(CheckOutcome::Failure),
            _ => Err(ParseEnumError::new("check outcome", s)),
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status carried by notifications and alert history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Down,
    Degraded,
    Recovered,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Down => "down",
            AlertStatus::Degraded => "degraded",
            AlertStatus::Recovered => "recovered",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AlertStatus::Down => Severity::Critical,
            AlertStatus::Degraded => Severity::Warning,
            AlertStatus::Recovered => Severity::Info,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertStatus::Down => "🔴",
            AlertStatus::Degraded => "🟡",
            AlertStatus::Recovered => "🟢",
        }
    }

    /// RGB colour used by chat payloads.
    pub fn color(&self) -> u32 {
        match self {
            AlertStatus::Down => 0xE01E5A,
            AlertStatus::Degraded => 0xECB22E,
            AlertStatus::Recovered => 0x2EB67D,
        }
    }
}

impl From<CheckOutcome> for AlertStatus {
    fn from(outcome: CheckOutcome) -> Self {
        match outcome {
            CheckOutcome::Success => AlertStatus::Recovered,
            CheckOutcome::Degraded => AlertStatus::Degraded,
            CheckOutcome::Failure => AlertStatus::Down,
        }
    }
}

impl FromStr for AlertStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(AlertStatus::Down),
            "degraded" => Ok(AlertStatus::Degraded),
            "recovered" => Ok(AlertStatus::Recovered),
            _ => Err(ParseEnumError::new("alert status", s)),
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Email,
    Slack,
    Discord,
    Webhook,
    Teams,
    #[serde(rename = "pagerduty")]
    PagerDuty,
    Ntfy,
    Sms,
    Irc,
    Twitter,
}

impl ChannelType {
    pub const ALL: [ChannelType; 10] = [
        ChannelType::Email,
        ChannelType::Slack,
        ChannelType::Discord,
        ChannelType::Webhook,
        ChannelType::Teams,
        ChannelType::PagerDuty,
        ChannelType::Ntfy,
        ChannelType::Sms,
        ChannelType::Irc,
        ChannelType::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "email",
            ChannelType::Slack => "slack",
            ChannelType::Discord => "discord",
            ChannelType::Webhook => "webhook",
            ChannelType::Teams => "teams",
            ChannelType::PagerDuty => "pagerduty",
            ChannelType::Ntfy => "ntfy",
            ChannelType::Sms => "sms",
            ChannelType::Irc => "irc",
            ChannelType::Twitter => "twitter",
        }
    }
}

impl FromStr for ChannelType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("channel type", s))
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
