//! Where the analysis server lives and how hard to try starting it
use std::time::Duration;

use eyre::WrapErr;
use transport::{DEFAULT_HOST, DEFAULT_PORT};

pub const HOST_VAR: &str = "TETHER_HOST";
pub const PORT_VAR: &str = "TETHER_PORT";
pub const SERVER_VAR: &str = "TETHER_SERVER";

/// Program started when no server is reachable
pub const DEFAULT_SERVER_PROGRAM: &str = "tether";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub host: String,
    pub port: u16,
    /// Timeout of a single reachability probe
    pub probe_timeout: Duration,
    /// Reachability polls after launching the server before giving up
    pub startup_attempts: u32,
    pub startup_backoff: Duration,
    pub server_program: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            probe_timeout: Duration::from_secs(1),
            startup_attempts: 10,
            startup_backoff: Duration::from_millis(500),
            server_program: DEFAULT_SERVER_PROGRAM.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Resolve the configuration from the process environment
    pub fn from_env() -> eyre::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration through `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> eyre::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_VAR) {
            let host = host.trim();
            if host.is_empty() {
                eyre::bail!("{HOST_VAR} is set but empty");
            }
            config.host = host.to_string();
        }

        if let Some(port) = lookup(PORT_VAR) {
            config.port = port
                .trim()
                .parse()
                .wrap_err_with(|| format!("parsing {PORT_VAR}={port:?}"))?;
        }

        if let Some(program) = lookup(SERVER_VAR).filter(|p| !p.trim().is_empty()) {
            config.server_program = program;
        }

        tracing::debug!(?config, "resolved bridge configuration");
        Ok(config)
    }

    /// `host:port` of the server
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.address(), "127.0.0.1:9001");
        assert_eq!(config.startup_attempts, 10);
    }

    #[test]
    fn overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            (HOST_VAR, "10.0.0.2"),
            (PORT_VAR, " 4000 "),
            (SERVER_VAR, "/opt/tether/bin/tether"),
        ]))
        .unwrap();
        assert_eq!(config.address(), "10.0.0.2:4000");
        assert_eq!(config.server_program, "/opt/tether/bin/tether");
    }

    #[test]
    fn invalid_values() {
        let err = BridgeConfig::from_lookup(lookup(&[(PORT_VAR, "ninety")])).unwrap_err();
        assert!(err.to_string().contains(PORT_VAR), "{err}");

        assert!(BridgeConfig::from_lookup(lookup(&[(PORT_VAR, "70000")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[(HOST_VAR, "  ")])).is_err());
    }
}
