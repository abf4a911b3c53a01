use reqwest::Url;
use thiserror::Error;

use crate::db::enums::MonitorType;

const DEFAULT_TLS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid target '{target}': {reason}")]
pub struct InvalidTarget {
    pub target: String,
    pub reason: String,
}

impl InvalidTarget {
    pub fn new(target: &str, reason: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// A monitor target parsed into the shape its probe needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Url(Url),
    Endpoint { host: String, port: u16 },
    Host(String),
}

impl ProbeTarget {
    pub fn parse(monitor_type: MonitorType, raw: &str) -> Result<Self, InvalidTarget> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(InvalidTarget::new(raw, "target is empty"));
        }

        match monitor_type {
            MonitorType::Http | MonitorType::Https => {
                let url = Url::parse(raw).map_err(|e| InvalidTarget::new(raw, e.to_string()))?;
                match (monitor_type, url.scheme()) {
                    (MonitorType::Https, "https") | (MonitorType::Http, "http" | "https") => {}
                    (MonitorType::Https, _) => {
                        return Err(InvalidTarget::new(raw, "scheme must be https"));
                    }
                    _ => return Err(InvalidTarget::new(raw, "scheme must be http or https")),
                }
                if url.host_str().is_none() {
                    return Err(InvalidTarget::new(raw, "URL has no host"));
                }
                Ok(ProbeTarget::Url(url))
            }
            MonitorType::Tcp => match split_host_port(raw)? {
                (host, Some(port)) => Ok(ProbeTarget::Endpoint { host, port }),
                (_, None) => Err(InvalidTarget::new(raw, "expected host:port")),
            },
            MonitorType::Ssl => {
                let (host, port) = split_host_port(raw)?;
                Ok(ProbeTarget::Endpoint {
                    host,
                    port: port.unwrap_or(DEFAULT_TLS_PORT),
                })
            }
            MonitorType::Ping => match split_host_port(raw)? {
                (host, None) => Ok(ProbeTarget::Host(host)),
                (_, Some(_)) => Err(InvalidTarget::new(raw, "ping targets take no port")),
            },
        }
    }

    /// Host and port a TLS handshake should go to, if the target speaks TLS.
    pub fn tls_endpoint(&self) -> Option<(&str, u16)> {
        match self {
            ProbeTarget::Url(url) if url.scheme() == "https" => {
                let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
                Some((host, url.port_or_known_default()?))
            }
            ProbeTarget::Endpoint { host, port } => Some((host.as_str(), *port)),
            _ => None,
        }
    }
}

/// Splits `host`, `host:port` or `[v6]:port`.
fn split_host_port(raw: &str) -> Result<(String, Option<u16>), InvalidTarget> {
    if raw.contains("://") || raw.contains('/') {
        return Err(InvalidTarget::new(raw, "expected a bare host, not a URL"));
    }

    let parse_port = |p: &str| {
        p.parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| InvalidTarget::new(raw, format!("invalid port '{p}'")))
    };

    if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| InvalidTarget::new(raw, "unterminated IPv6 literal"))?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host.to_string(), Some(parse_port(port)?))),
            None if tail.is_empty() => Ok((host.to_string(), None)),
            None => Err(InvalidTarget::new(raw, "unexpected text after IPv6 literal")),
        };
    }

    // Bare IPv6 addresses carry several colons and no port.
    if raw.matches(':').count() > 1 {
        return Ok((raw.to_string(), None));
    }

    match raw.split_once(':') {
        Some((host, _)) if host.is_empty() => Err(InvalidTarget::new(raw, "host is empty")),
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((raw.to_string(), None)),
    }
}
