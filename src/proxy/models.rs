//! Proxy config data models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport scheme of a proxy config link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    ShadowsocksR,
    Hysteria,
    Hysteria2,
    Tuic,
}

impl Scheme {
    /// All recognized schemes
    pub const ALL: [Scheme; 8] = [
        Scheme::Vmess,
        Scheme::Vless,
        Scheme::Trojan,
        Scheme::Shadowsocks,
        Scheme::ShadowsocksR,
        Scheme::Hysteria,
        Scheme::Hysteria2,
        Scheme::Tuic,
    ];

    /// Lowercase URI scheme name
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Vmess => "vmess",
            Scheme::Vless => "vless",
            Scheme::Trojan => "trojan",
            Scheme::Shadowsocks => "ss",
            Scheme::ShadowsocksR => "ssr",
            Scheme::Hysteria => "hysteria",
            Scheme::Hysteria2 => "hysteria2",
            Scheme::Tuic => "tuic",
        }
    }

    /// Whether the payload is an encoded blob with no readable host:port.
    ///
    /// vmess links carry a base64 JSON document after the scheme.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Scheme::Vmess)
    }

    /// Detect the scheme from the prefix of a config link (case-insensitive)
    pub fn detect(link: &str) -> Option<Scheme> {
        let (scheme, _) = link.split_once("://")?;
        scheme.parse().ok()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str() == lower)
            .ok_or_else(|| anyhow::anyhow!("Unknown scheme: {}", s))
    }
}

/// A normalized config link with its display label applied.
///
/// Identity is the full link text, label included. Only built through
/// [`ConnectionRecord::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionRecord {
    link: String,
    scheme: Scheme,
}

impl ConnectionRecord {
    /// Build a record from an already-normalized link.
    ///
    /// Returns `None` when the link does not start with a recognized scheme.
    pub fn new(link: impl Into<String>) -> Option<Self> {
        let link = link.into();
        let scheme = Scheme::detect(&link)?;
        Some(Self { link, scheme })
    }

    pub fn as_str(&self) -> &str {
        &self.link
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn into_string(self) -> String {
        self.link
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.link)
    }
}

/// Host and port a liveness probe connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub host: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Outcome of a liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessStatus {
    /// TCP connect completed within the timeout
    Alive,
    /// Timeout, refusal, resolution failure or any other I/O error
    Dead,
    /// No probe target could be derived, record is kept
    Untested,
}

/// Probe result for a single record
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub record: ConnectionRecord,
    pub status: LivenessStatus,
    pub response_time_ms: Option<u64>,
}

impl ProbeResult {
    pub fn alive(record: ConnectionRecord, response_time_ms: u64) -> Self {
        Self {
            record,
            status: LivenessStatus::Alive,
            response_time_ms: Some(response_time_ms),
        }
    }

    pub fn dead(record: ConnectionRecord) -> Self {
        Self {
            record,
            status: LivenessStatus::Dead,
            response_time_ms: None,
        }
    }

    pub fn untested(record: ConnectionRecord) -> Self {
        Self {
            record,
            status: LivenessStatus::Untested,
            response_time_ms: None,
        }
    }

    /// Only provably dead records fail
    pub fn passes(&self) -> bool {
        !matches!(self.status, LivenessStatus::Dead)
    }
}
