//! # Settings
//!
//! Values the core needs from its host, read through a narrow
//! [`ConfigSource`] so that production reads the environment and tests pass
//! a map.
//!
//! | Key | Default |
//! |-----|---------|
//! | `JWT_SECRET` | required |
//! | `JWT_ISSUER` | `blog-platform` |
//! | `JWT_AUDIENCE` | `blog-platform-api` |
//! | `TOKEN_DURATION_SECS` | `7200` |
//! | `RATE_LIMIT_DEFAULT_RPS` / `RATE_LIMIT_DEFAULT_BURST` | `10` / `20` |
//! | `RATE_LIMIT_AUTH_RPS` / `RATE_LIMIT_AUTH_BURST` | `2` / `5` |
//! | `RATE_LIMIT_IDLE_SECS` | `3600` |
//! | `RATE_LIMIT_SWEEP_SECS` | `60` |
//!
//! Unset or blank keys take their default. A value that is set but does not
//! parse is an error, never a silent fallback.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{ConfigError, TokenError};
use crate::rate_limiter::{
    Limiters, RateLimitPolicy, RegistryConfig, AUTH_BURST, AUTH_REQUESTS_PER_SECOND,
    DEFAULT_BURST, DEFAULT_IDLE_THRESHOLD, DEFAULT_REQUESTS_PER_SECOND, DEFAULT_SWEEP_INTERVAL,
};
use crate::token::{
    TokenService, DEFAULT_AUDIENCE, DEFAULT_ISSUER, DEFAULT_TOKEN_DURATION, MAX_TOKEN_DURATION,
};

/// A source of raw configuration values.
pub trait ConfigSource {
    /// The raw value for `key`, if set.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for &S {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Validated settings for the token service and both rate limiters.
#[derive(Clone, PartialEq)]
pub struct Settings {
    /// HMAC signing secret.
    pub jwt_secret: String,

    /// `iss` claim.
    pub jwt_issuer: String,

    /// `aud` claim.
    pub jwt_audience: String,

    /// Lifetime of standard and refreshed tokens.
    pub token_duration: Duration,

    /// Policy applied to every route.
    pub default_policy: RateLimitPolicy,

    /// Policy applied to login and registration.
    pub auth_policy: RateLimitPolicy,

    /// Idle eviction threshold and sweep interval, shared by both registries.
    pub registry: RegistryConfig,
}

impl Settings {
    /// Loads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource)
    }

    /// Loads and validates settings from `source`.
    ///
    /// ```rust
    /// use std::collections::HashMap;
    /// use warden::Settings;
    ///
    /// let mut values = HashMap::new();
    /// values.insert("JWT_SECRET".to_string(), "s3cret".to_string());
    /// values.insert("RATE_LIMIT_AUTH_BURST".to_string(), "3".to_string());
    ///
    /// let settings = Settings::from_source(&values).unwrap();
    /// assert_eq!(settings.auth_policy.capacity, 3);
    /// assert_eq!(settings.default_policy.capacity, 20);
    /// ```
    pub fn from_source(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let jwt_secret = lookup(source, "JWT_SECRET")
            .ok_or(ConfigError::MissingParameter { name: "JWT_SECRET" })?;

        let settings = Self {
            jwt_secret,
            jwt_issuer: lookup(source, "JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_owned()),
            jwt_audience: lookup(source, "JWT_AUDIENCE")
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_owned()),
            token_duration: secs_or(source, "TOKEN_DURATION_SECS", DEFAULT_TOKEN_DURATION)?,
            default_policy: RateLimitPolicy::new(
                parse_or(source, "RATE_LIMIT_DEFAULT_BURST", DEFAULT_BURST)?,
                parse_or(source, "RATE_LIMIT_DEFAULT_RPS", DEFAULT_REQUESTS_PER_SECOND)?,
            ),
            auth_policy: RateLimitPolicy::new(
                parse_or(source, "RATE_LIMIT_AUTH_BURST", AUTH_BURST)?,
                parse_or(source, "RATE_LIMIT_AUTH_RPS", AUTH_REQUESTS_PER_SECOND)?,
            ),
            registry: RegistryConfig::new(
                secs_or(source, "RATE_LIMIT_IDLE_SECS", DEFAULT_IDLE_THRESHOLD)?,
                secs_or(source, "RATE_LIMIT_SWEEP_SECS", DEFAULT_SWEEP_INTERVAL)?,
            ),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Checks every value. Errors name the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingParameter { name: "JWT_SECRET" });
        }
        if self.token_duration.is_zero() {
            return Err(ConfigError::invalid(
                "TOKEN_DURATION_SECS",
                "token duration must be greater than 0",
            ));
        }
        if self.token_duration > MAX_TOKEN_DURATION {
            return Err(ConfigError::invalid(
                "TOKEN_DURATION_SECS",
                format!(
                    "token duration must not exceed {} seconds",
                    MAX_TOKEN_DURATION.as_secs()
                ),
            ));
        }

        self.default_policy
            .validate()
            .map_err(|err| rename(err, "RATE_LIMIT_DEFAULT_BURST", "RATE_LIMIT_DEFAULT_RPS"))?;
        self.auth_policy
            .validate()
            .map_err(|err| rename(err, "RATE_LIMIT_AUTH_BURST", "RATE_LIMIT_AUTH_RPS"))?;
        self.registry.validate().map_err(|err| match err {
            ConfigError::InvalidParameter { name: "idle_threshold", message } => {
                ConfigError::InvalidParameter { name: "RATE_LIMIT_IDLE_SECS", message }
            }
            ConfigError::InvalidParameter { message, .. } => {
                ConfigError::InvalidParameter { name: "RATE_LIMIT_SWEEP_SECS", message }
            }
            other => other,
        })?;

        Ok(())
    }

    /// Builds the token service.
    pub fn token_service(&self, clock: Arc<dyn Clock>) -> Result<TokenService, ConfigError> {
        TokenService::builder(&self.jwt_secret)
            .issuer(self.jwt_issuer.clone())
            .audience(self.jwt_audience.clone())
            .standard_duration(self.token_duration)
            .clock(clock)
            .build()
            .map_err(|err| match err {
                TokenError::InvalidDuration => {
                    ConfigError::invalid("TOKEN_DURATION_SECS", err.to_string())
                }
                _ => ConfigError::invalid("JWT_SECRET", err.to_string()),
            })
    }

    /// Builds the default and auth limiters, each with its own registry.
    pub fn limiters(&self, clock: Arc<dyn Clock>) -> Result<Limiters, ConfigError> {
        Limiters::new(self.default_policy, self.auth_policy, self.registry, clock)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("token_duration", &self.token_duration)
            .field("default_policy", &self.default_policy)
            .field("auth_policy", &self.auth_policy)
            .field("registry", &self.registry)
            .finish()
    }
}

fn lookup(source: &impl ConfigSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(
    source: &impl ConfigSource,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(source, key) {
        Some(raw) => raw
            .parse()
            .map_err(|err| ConfigError::invalid(key, format!("cannot parse {raw:?}: {err}"))),
        None => Ok(default),
    }
}

fn secs_or(
    source: &impl ConfigSource,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(source, key) {
        Some(_) => parse_or(source, key, 0u64).map(Duration::from_secs),
        None => Ok(default),
    }
}

fn rename(err: ConfigError, capacity_key: &'static str, rate_key: &'static str) -> ConfigError {
    match err {
        ConfigError::InvalidParameter { name: "capacity", message } => {
            ConfigError::InvalidParameter { name: capacity_key, message }
        }
        ConfigError::InvalidParameter { message, .. } => {
            ConfigError::InvalidParameter { name: rate_key, message }
        }
        other => other,
    }
}
