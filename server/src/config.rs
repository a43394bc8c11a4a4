//! Relay configuration parsed from environment variables.
//!
//! All values have defaults; a bare `chat-relay` listens on `0.0.0.0:3000`
//! and keeps the last 100 messages. Unparseable numbers fall back to their
//! default, zero capacities are rejected.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_MESSAGES: usize = 100;
pub const DEFAULT_CLIENT_BUFFER: usize = 256;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid bind address '{0}'")]
    BindAddr(String),
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Messages retained in the relay's log.
    pub max_messages: usize,
    /// Outbound frames buffered per connection before broadcasts skip it.
    pub client_buffer: usize,
    /// Static site served for non-API routes, if any.
    pub website_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_messages: DEFAULT_MAX_MESSAGES,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            website_dir: None,
        }
    }
}

impl RelayConfig {
    /// Build typed relay config from environment variables.
    ///
    /// Optional:
    /// - `RELAY_BIND_ADDR`: default `0.0.0.0`
    /// - `PORT`: default 3000
    /// - `RELAY_MAX_MESSAGES`: default 100
    /// - `RELAY_CLIENT_BUFFER`: default 256
    /// - `WEBSITE_DIR`: static site root, unset disables static serving
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparseable bind address or zero
    /// capacities.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RelayConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = match lookup("RELAY_BIND_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::BindAddr(raw))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };
        let max_messages = parse_or(&lookup, "RELAY_MAX_MESSAGES", DEFAULT_MAX_MESSAGES);
        if max_messages == 0 {
            return Err(ConfigError::Zero { var: "RELAY_MAX_MESSAGES" });
        }
        let client_buffer = parse_or(&lookup, "RELAY_CLIENT_BUFFER", DEFAULT_CLIENT_BUFFER);
        if client_buffer == 0 {
            return Err(ConfigError::Zero { var: "RELAY_CLIENT_BUFFER" });
        }
        let website_dir = lookup("WEBSITE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            max_messages,
            client_buffer,
            website_dir,
        })
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
