//! Client configuration

use crate::{
    constants::{
        DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_ESL_PASSWORD, DEFAULT_ESL_PORT,
        DEFAULT_RECONNECT_CEILING_MS, DEFAULT_RECONNECT_FLOOR_MS, DEFAULT_TIMEOUT_MS,
        MAX_EVENT_QUEUE_SIZE,
    },
    error::{EslError, EslResult},
    event::EventFormat,
};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Connection settings for one switch.
///
/// Deserializable so the embedding service can load it from its own config
/// file; missing fields take the defaults below.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EslConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// Dial and handshake bound.
    pub connect_timeout_ms: u64,
    /// Per-command reply bound.
    pub command_timeout_ms: u64,
    /// First reconnect delay; doubles after each failed attempt.
    pub reconnect_floor_ms: u64,
    pub reconnect_ceiling_ms: u64,
    /// End the session after this long without inbound bytes. 0 disables.
    pub liveness_timeout_ms: u64,
    pub event_format: EventFormat,
    /// Per-handler event queue capacity.
    pub event_queue_size: usize,
}

impl Default for EslConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_ESL_PORT,
            password: DEFAULT_ESL_PASSWORD.to_string(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            reconnect_floor_ms: DEFAULT_RECONNECT_FLOOR_MS,
            reconnect_ceiling_ms: DEFAULT_RECONNECT_CEILING_MS,
            liveness_timeout_ms: 0,
            event_format: EventFormat::Plain,
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
        }
    }
}

impl fmt::Debug for EslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("reconnect_floor_ms", &self.reconnect_floor_ms)
            .field("reconnect_ceiling_ms", &self.reconnect_ceiling_ms)
            .field("liveness_timeout_ms", &self.liveness_timeout_ms)
            .field("event_format", &self.event_format)
            .field("event_queue_size", &self.event_queue_size)
            .finish()
    }
}

impl EslConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Self::default()
        }
    }

    /// Build from `ESL_*` environment variables.
    ///
    /// Recognized: `ESL_HOST`, `ESL_PORT`, `ESL_PASSWORD`,
    /// `ESL_CONNECT_TIMEOUT_MS`, `ESL_COMMAND_TIMEOUT_MS`,
    /// `ESL_RECONNECT_FLOOR_MS`, `ESL_RECONNECT_CEILING_MS`,
    /// `ESL_LIVENESS_TIMEOUT_MS`, `ESL_EVENT_FORMAT`, `ESL_EVENT_QUEUE_SIZE`.
    /// Unset variables keep their default.
    pub fn from_env() -> EslResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_lookup<F>(lookup: F) -> EslResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup("ESL_HOST") {
            config.host = host;
        }
        if let Some(password) = lookup("ESL_PASSWORD") {
            config.password = password;
        }
        parse_var(&lookup, "ESL_PORT", &mut config.port)?;
        parse_var(&lookup, "ESL_CONNECT_TIMEOUT_MS", &mut config.connect_timeout_ms)?;
        parse_var(&lookup, "ESL_COMMAND_TIMEOUT_MS", &mut config.command_timeout_ms)?;
        parse_var(&lookup, "ESL_RECONNECT_FLOOR_MS", &mut config.reconnect_floor_ms)?;
        parse_var(
            &lookup,
            "ESL_RECONNECT_CEILING_MS",
            &mut config.reconnect_ceiling_ms,
        )?;
        parse_var(
            &lookup,
            "ESL_LIVENESS_TIMEOUT_MS",
            &mut config.liveness_timeout_ms,
        )?;
        parse_var(&lookup, "ESL_EVENT_FORMAT", &mut config.event_format)?;
        parse_var(&lookup, "ESL_EVENT_QUEUE_SIZE", &mut config.event_queue_size)?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> EslResult<()> {
        if self
            .host
            .trim()
            .is_empty()
        {
            return Err(EslError::invalid_argument("host must not be empty"));
        }
        if self.port == 0 {
            return Err(EslError::invalid_argument("port must not be 0"));
        }
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err(EslError::invalid_argument("timeouts must be non-zero"));
        }
        if self.reconnect_floor_ms == 0 || self.reconnect_floor_ms > self.reconnect_ceiling_ms {
            return Err(EslError::invalid_argument(format!(
                "reconnect floor {}ms must be non-zero and not above ceiling {}ms",
                self.reconnect_floor_ms, self.reconnect_ceiling_ms
            )));
        }
        if self.event_queue_size == 0 {
            return Err(EslError::invalid_argument("event_queue_size must be non-zero"));
        }
        if self
            .password
            .contains(['\r', '\n'])
        {
            return Err(EslError::invalid_argument("password must not contain newlines"));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, slot: &mut T) -> EslResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| EslError::invalid_argument(format!("{}: cannot parse {:?}", key, raw)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map
            .get(key)
            .cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EslConfig::default();
        assert_eq!(config.port, 8021);
        assert_eq!(config.password, "ClueCon");
        assert_eq!(config.command_timeout_ms, 5000);
        assert_eq!(config.liveness_timeout_ms, 0);
        assert_eq!(config.event_format, EventFormat::Plain);
        assert!(config
            .validate()
            .is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = EslConfig::new("fs1", 8021, "hunter2");
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("REDACTED"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EslConfig::from_lookup(lookup_from(&[
            ("ESL_HOST", "10.0.0.5"),
            ("ESL_PORT", "8022"),
            ("ESL_PASSWORD", "secret"),
            ("ESL_EVENT_FORMAT", "json"),
            ("ESL_RECONNECT_CEILING_MS", "60000"),
        ]))
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 8022);
        assert_eq!(config.password, "secret");
        assert_eq!(config.event_format, EventFormat::Json);
        assert_eq!(config.reconnect_ceiling_ms, 60000);
        assert_eq!(config.reconnect_floor_ms, 500);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = EslConfig::from_lookup(lookup_from(&[("ESL_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, EslError::InvalidArgument(ref m) if m.contains("ESL_PORT")));
    }

    #[test]
    fn test_validate() {
        let mut config = EslConfig::default();
        config.reconnect_floor_ms = 60_000;
        assert!(config
            .validate()
            .is_err());

        let mut config = EslConfig::default();
        config.host = "  ".into();
        assert!(config
            .validate()
            .is_err());

        let mut config = EslConfig::default();
        config.command_timeout_ms = 0;
        assert!(config
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EslConfig =
            serde_json::from_str(r#"{"host": "fs2", "event_format": "xml"}"#).unwrap();
        assert_eq!(config.host, "fs2");
        assert_eq!(config.port, 8021);
        assert_eq!(config.event_format, EventFormat::Xml);
    }
}
