//! Gateway configuration.
//!
//! # Environment Variables
//!
//! - `WALLET_GATEWAY_URL`: base URL of the external wallet service
//! - `WALLET_GATEWAY_CONNECT_TIMEOUT_MS`: connect timeout in milliseconds
//! - `WALLET_GATEWAY_TIMEOUT_MS`: whole-request timeout in milliseconds

use crate::error::{EngineError, Result};
use std::env;
use std::time::Duration;

pub const URL_VAR: &str = "WALLET_GATEWAY_URL";
pub const CONNECT_TIMEOUT_VAR: &str = "WALLET_GATEWAY_CONNECT_TIMEOUT_MS";
pub const TIMEOUT_VAR: &str = "WALLET_GATEWAY_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: "http://localhost:8081".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        GatewayConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    /// Reads the configuration from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GatewayConfig::default();

        if let Some(url) = lookup(URL_VAR) {
            let url = url.trim().trim_end_matches('/').to_string();
            if url.is_empty() {
                return Err(EngineError::Config(format!("{} is empty", URL_VAR)));
            }
            config.base_url = url;
        }
        if let Some(ms) = lookup(CONNECT_TIMEOUT_VAR) {
            config.connect_timeout = parse_millis(CONNECT_TIMEOUT_VAR, &ms)?;
        }
        if let Some(ms) = lookup(TIMEOUT_VAR) {
            config.request_timeout = parse_millis(TIMEOUT_VAR, &ms)?;
        }

        Ok(config)
    }
}

fn parse_millis(var: &str, value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(EngineError::Config(format!("{} must be greater than zero", var))),
        Ok(ms) => Ok(Duration::from_millis(ms)),
        Err(e) => Err(EngineError::Config(format!("{}: {}", var, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_reads_all_variables() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (URL_VAR, "https://wallets.example.com/"),
            (CONNECT_TIMEOUT_VAR, "250"),
            (TIMEOUT_VAR, "1500"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://wallets.example.com");
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_rejects_bad_timeouts() {
        let err = GatewayConfig::from_lookup(lookup(&[(TIMEOUT_VAR, "soon")])).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let err = GatewayConfig::from_lookup(lookup(&[(CONNECT_TIMEOUT_VAR, "0")])).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
