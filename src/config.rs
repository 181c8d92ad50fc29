//! Connection settings derived from the caller's input.

use std::time::Duration;

use url::{Host, Url};

use crate::error::Error;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SECURE_PORT: u16 = 443;
pub const DEFAULT_PLAIN_PORT: u16 = 8123;

/// Where the hub lives. Derived once from the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Bare host name or IP literal (IPv6 without brackets).
    pub host: String,
    pub port: u16,
    /// Wrap the TCP stream in TLS.
    pub secure: bool,
}

impl Endpoint {
    /// Parse a hub base URL.
    ///
    /// `https`/`wss` select TLS with default port 443; `http`/`ws` select
    /// plaintext with default port 8123. Any path on the URL is ignored.
    pub fn from_url(raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|error| Error::InvalidUrl(format!("{raw}: {error}")))?;

        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(Error::InvalidUrl(format!(
                    "{raw}: unsupported scheme `{other}`"
                )));
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::InvalidUrl(format!("{raw}: missing host"))),
        };

        let default_port = if secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PLAIN_PORT
        };
        let port = url
            .port()
            .or_else(|| explicit_default_port(&url, raw))
            .unwrap_or(default_port);

        Ok(Self { host, port, secure })
    }

    /// `host:port` for the `Host` header, bracketing IPv6 literals.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// `Url` drops a port equal to the scheme's registered default, so an
/// explicit `http://hub:80` would otherwise fall back to 8123.
fn explicit_default_port(url: &Url, raw: &str) -> Option<u16> {
    let known = url.port_or_known_default()?;
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let (_, port) = host_port.rsplit_once(':')?;
    if port.ends_with(']') {
        return None;
    }
    (port.parse::<u16>() == Ok(known)).then_some(known)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Per-read limit once connected. `None` blocks until the peer answers.
    pub read: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read: None,
        }
    }
}

/// Everything needed to open and authenticate one session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub token: String,
    pub timeouts: Timeouts,
}

impl SessionConfig {
    /// Build a config with default timeouts.
    pub fn new(url: &str, token: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            endpoint: Endpoint::from_url(url)?,
            token: token.into(),
            timeouts: Timeouts::default(),
        })
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

// Hand-written so the token never reaches logs.
impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
