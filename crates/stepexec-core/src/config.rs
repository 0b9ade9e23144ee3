//! Unified configuration layer.
//!
//! All environment-variable reads are centralized here; business code goes
//! through the structured configs instead of calling `std::env::var`.

use std::env;

/// Default wall-clock timeout for a step subprocess, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default cap on combined stdout+stderr size, in MiB.
pub const DEFAULT_MAX_OUTPUT_MB: u64 = 10;

/// Read an env var, falling back to `default` when unset or empty.
pub fn env_or<F>(key: &str, default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read an env var as a u64, warning on unparsable values.
pub fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}, using default ({})", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Read an env var as a boolean (`1`/`true`/`yes`, case-insensitive).
pub fn env_bool(key: &str) -> bool {
    env::var(key).is_ok_and(|v| {
        let v = v.trim().to_lowercase();
        v == "1" || v == "true" || v == "yes"
    })
}

/// Logging/observability knobs.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Suppress INFO-level logs (daemon/benchmark mode).
    pub quiet: bool,
    /// Tracing filter directive, e.g. `stepexec=info`.
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self {
            quiet: env_bool("STEPEXEC_QUIET"),
            log_level: env_or("STEPEXEC_LOG_LEVEL", || "stepexec=info".to_string()),
            log_json: env_bool("STEPEXEC_LOG_JSON"),
        }
    }
}

/// Resource limits for step subprocess execution.
///
/// Defaults are `DEFAULT_TIMEOUT_SECS` (5 minutes) and
/// `DEFAULT_MAX_OUTPUT_MB` (10 MiB of combined stdout+stderr).
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// Execution timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum combined output size in MiB.
    pub max_output_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ResourceLimits {
    /// Output cap in bytes.
    pub fn max_output_bytes(&self) -> u64 {
        self.max_output_mb * 1024 * 1024
    }

    /// Load limits from `STEPEXEC_TIMEOUT_SECS` / `STEPEXEC_MAX_OUTPUT_MB`.
    pub fn from_env() -> Self {
        Self {
            timeout_secs: env_u64("STEPEXEC_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            max_output_mb: env_u64("STEPEXEC_MAX_OUTPUT_MB", DEFAULT_MAX_OUTPUT_MB),
        }
    }

    /// Override with CLI parameters.
    pub fn with_cli_overrides(mut self, cli_timeout: Option<u64>, cli_max_output: Option<u64>) -> Self {
        if let Some(timeout) = cli_timeout {
            self.timeout_secs = timeout;
        }
        if let Some(max_output) = cli_max_output {
            self.max_output_mb = max_output;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ResourceLimits {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_mb: DEFAULT_MAX_OUTPUT_MB,
        };
        assert_eq!(limits.timeout_secs, 300);
        assert_eq!(limits.max_output_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_cli_overrides() {
        let limits = ResourceLimits {
            timeout_secs: 300,
            max_output_mb: 10,
        }
        .with_cli_overrides(Some(60), None);
        assert_eq!(limits.timeout_secs, 60);
        assert_eq!(limits.max_output_mb, 10);
    }
}
