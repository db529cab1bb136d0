//! Initialization and session policy settings.
//!
//! Pure configuration types with defaults, validation and environment
//! overrides. Wire names are camelCase with millisecond fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-attempt timeout for one server.
pub const DEFAULT_PER_SERVER_TIMEOUT_MS: u64 = 20_000;

/// Default deadline for a whole initialization pass.
pub const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 60_000;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default timeout for one health probe.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 3_000;

/// Default delay between attempts (doubled for connection failures on network servers).
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default idle time after which a session is evicted.
pub const DEFAULT_SESSION_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1_000;

/// Default interval between idle-session sweeps.
pub const DEFAULT_SESSION_SWEEP_INTERVAL_MS: u64 = 10 * 60 * 1_000;

const MAX_RETRIES_LIMIT: u32 = 10;

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("perServerTimeoutMs ({per_server}) cannot exceed totalTimeoutMs ({total})")]
    PerServerExceedsTotal { per_server: u64, total: u64 },

    #[error("maxRetries must be at most 10, got {0}")]
    TooManyRetries(u32),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },
}

/// Policy for one progressive initialization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InitPolicy {
    /// Upper bound on a single connect-and-discover attempt.
    pub per_server_timeout_ms: u64,

    /// Deadline for the whole pass, probing included.
    pub total_timeout_ms: u64,

    /// Retries after the first attempt (2 means up to 3 attempts).
    pub max_retries: u32,

    /// Skip probing entirely and attempt every server in input order.
    pub skip_health_checks: bool,

    /// Upper bound on a single health probe.
    pub health_check_timeout_ms: u64,

    /// Baseline delay between failed attempts.
    pub retry_delay_ms: u64,
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            per_server_timeout_ms: DEFAULT_PER_SERVER_TIMEOUT_MS,
            total_timeout_ms: DEFAULT_TOTAL_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            skip_health_checks: false,
            health_check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl InitPolicy {
    /// Create a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_per_server_timeout(mut self, timeout: Duration) -> Self {
        self.per_server_timeout_ms = duration_to_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout_ms = duration_to_ms(timeout);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_skip_health_checks(mut self, skip: bool) -> Self {
        self.skip_health_checks = skip;
        self
    }

    #[must_use]
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout_ms = duration_to_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = duration_to_ms(delay);
        self
    }

    pub const fn per_server_timeout(&self) -> Duration {
        Duration::from_millis(self.per_server_timeout_ms)
    }

    pub const fn total_timeout(&self) -> Duration {
        Duration::from_millis(self.total_timeout_ms)
    }

    pub const fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Maximum number of attempts per server.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate the policy.
    pub const fn validate(&self) -> Result<(), SettingsError> {
        if self.per_server_timeout_ms == 0 {
            return Err(SettingsError::ZeroDuration("perServerTimeoutMs"));
        }
        if self.total_timeout_ms == 0 {
            return Err(SettingsError::ZeroDuration("totalTimeoutMs"));
        }
        if self.health_check_timeout_ms == 0 {
            return Err(SettingsError::ZeroDuration("healthCheckTimeoutMs"));
        }
        if self.per_server_timeout_ms > self.total_timeout_ms {
            return Err(SettingsError::PerServerExceedsTotal {
                per_server: self.per_server_timeout_ms,
                total: self.total_timeout_ms,
            });
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(SettingsError::TooManyRetries(self.max_retries));
        }
        Ok(())
    }

    /// Apply `MCPHUB_*` overrides from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `MCPHUB_*` overrides read through `lookup`, then validate.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = env_u64(&lookup, "MCPHUB_PER_SERVER_TIMEOUT_MS")? {
            self.per_server_timeout_ms = ms;
        }
        if let Some(ms) = env_u64(&lookup, "MCPHUB_TOTAL_TIMEOUT_MS")? {
            self.total_timeout_ms = ms;
        }
        if let Some(retries) = env_u64(&lookup, "MCPHUB_MAX_RETRIES")? {
            self.max_retries = u32::try_from(retries).unwrap_or(u32::MAX);
        }
        if let Some(skip) = env_bool(&lookup, "MCPHUB_SKIP_HEALTH_CHECKS")? {
            self.skip_health_checks = skip;
        }
        if let Some(ms) = env_u64(&lookup, "MCPHUB_HEALTH_CHECK_TIMEOUT_MS")? {
            self.health_check_timeout_ms = ms;
        }
        if let Some(ms) = env_u64(&lookup, "MCPHUB_RETRY_DELAY_MS")? {
            self.retry_delay_ms = ms;
        }

        self.validate()?;
        Ok(self)
    }
}

/// Policy for the session lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionPolicy {
    /// Sessions idle for longer than this are cleaned up and evicted.
    pub idle_timeout_ms: u64,

    /// How often the sweeper looks for idle sessions.
    pub sweep_interval_ms: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_SESSION_IDLE_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SESSION_SWEEP_INTERVAL_MS,
        }
    }
}

impl SessionPolicy {
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = duration_to_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = duration_to_ms(interval);
        self
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub const fn validate(&self) -> Result<(), SettingsError> {
        if self.idle_timeout_ms == 0 {
            return Err(SettingsError::ZeroDuration("idleTimeoutMs"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(SettingsError::ZeroDuration("sweepIntervalMs"));
        }
        Ok(())
    }

    /// Apply `MCPHUB_SESSION_*` overrides read through `lookup`, then validate.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = env_u64(&lookup, "MCPHUB_SESSION_IDLE_TIMEOUT_MS")? {
            self.idle_timeout_ms = ms;
        }
        if let Some(ms) = env_u64(&lookup, "MCPHUB_SESSION_SWEEP_INTERVAL_MS")? {
            self.sweep_interval_ms = ms;
        }

        self.validate()?;
        Ok(self)
    }
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn env_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| SettingsError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            })
        })
        .transpose()
}

fn env_bool<F>(lookup: &F, key: &str) -> Result<Option<bool>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(SettingsError::InvalidEnv {
            key: key.to_string(),
            value: raw,
        }),
    }
}
