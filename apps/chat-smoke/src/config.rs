//! Environment-backed configuration for `chat-smoke`.

use std::{env, time::Duration};

use chat_core::{DEFAULT_POLL_INTERVAL, OverwritePolicy, SessionConfig};
use thiserror::Error;

const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Runtime configuration used by the smoke binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Base URL of the chat REST API.
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Register the account instead of logging in.
    pub create_account: bool,
    /// Optional message sent once connected.
    pub message: Option<String>,
    /// Tuning forwarded to the chat session.
    pub session: SessionConfig,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_url = optional_trimmed_env("CHAT_API_URL", &mut lookup)
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let username = optional_trimmed_env("CHAT_USER", &mut lookup)
            .ok_or(ConfigError::Missing { key: "CHAT_USER" })?;
        let password = lookup("CHAT_PASSWORD").ok_or(ConfigError::Missing {
            key: "CHAT_PASSWORD",
        })?;
        let create_account = parse_bool("CHAT_CREATE_ACCOUNT", false, &mut lookup)?;
        let message = optional_trimmed_env("CHAT_SMOKE_MESSAGE", &mut lookup);

        let poll_interval_ms = parse_optional_u64("CHAT_POLL_INTERVAL_MS", &mut lookup)?
            .unwrap_or(DEFAULT_POLL_INTERVAL.as_millis() as u64);
        if poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHAT_POLL_INTERVAL_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        let replay_history = parse_bool("CHAT_REPLAY_HISTORY", true, &mut lookup)?;
        let overwrite_policy = if parse_bool("CHAT_OVERWRITE_EVERY_TICK", false, &mut lookup)? {
            OverwritePolicy::EveryTick
        } else {
            OverwritePolicy::Once
        };

        Ok(Self {
            api_url,
            username,
            password,
            create_account,
            message,
            session: SessionConfig::default()
                .with_poll_interval(Duration::from_millis(poll_interval_ms))
                .with_replay_history(replay_history)
                .with_overwrite_policy(overwrite_policy),
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required environment variable is unset or blank.
    #[error("missing required {key}")]
    Missing { key: &'static str },
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_bool<F>(key: &'static str, default: bool, lookup: &mut F) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<SmokeConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        SmokeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn parses_credentials_and_defaults() {
        let cfg = config_from_pairs(&[("CHAT_USER", " Usuario1 "), ("CHAT_PASSWORD", "P2ssw0rd!")])
            .expect("config should parse");

        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.username, "Usuario1");
        assert_eq!(cfg.password, "P2ssw0rd!");
        assert!(!cfg.create_account);
        assert_eq!(cfg.message, None);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn credentials_are_required() {
        let err = config_from_pairs(&[("CHAT_PASSWORD", "x")]).expect_err("user is required");
        assert_eq!(err, ConfigError::Missing { key: "CHAT_USER" });

        let err = config_from_pairs(&[("CHAT_USER", "Usuario1")]).expect_err("password required");
        assert_eq!(
            err,
            ConfigError::Missing {
                key: "CHAT_PASSWORD"
            }
        );
    }

    #[test]
    fn parses_session_tuning_when_present() {
        let cfg = config_from_pairs(&[
            ("CHAT_USER", "Usuario1"),
            ("CHAT_PASSWORD", "P2ssw0rd!"),
            ("CHAT_API_URL", "https://chat.example.org"),
            ("CHAT_CREATE_ACCOUNT", "yes"),
            ("CHAT_POLL_INTERVAL_MS", "250"),
            ("CHAT_REPLAY_HISTORY", "false"),
            ("CHAT_OVERWRITE_EVERY_TICK", "1"),
            ("CHAT_SMOKE_MESSAGE", "hola"),
        ])
        .expect("config should parse");

        assert_eq!(cfg.api_url, "https://chat.example.org");
        assert!(cfg.create_account);
        assert_eq!(cfg.message.as_deref(), Some("hola"));
        assert_eq!(cfg.session.poll_interval, Duration::from_millis(250));
        assert!(!cfg.session.replay_history);
        assert_eq!(cfg.session.overwrite_policy, OverwritePolicy::EveryTick);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = config_from_pairs(&[
            ("CHAT_USER", "Usuario1"),
            ("CHAT_PASSWORD", "x"),
            ("CHAT_POLL_INTERVAL_MS", "soon"),
        ])
        .expect_err("invalid interval should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_POLL_INTERVAL_MS",
                ..
            }
        ));

        let err = config_from_pairs(&[
            ("CHAT_USER", "Usuario1"),
            ("CHAT_PASSWORD", "x"),
            ("CHAT_POLL_INTERVAL_MS", "0"),
        ])
        .expect_err("zero interval should fail");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = config_from_pairs(&[
            ("CHAT_USER", "Usuario1"),
            ("CHAT_PASSWORD", "x"),
            ("CHAT_REPLAY_HISTORY", "maybe"),
        ])
        .expect_err("invalid bool should fail");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_REPLAY_HISTORY",
                ..
            }
        ));
    }
}
