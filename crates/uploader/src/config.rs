//! Uploader configuration.

use std::num::{NonZeroU64, NonZeroUsize};
use std::time::Duration;

use blobup_protocol::constants::DEFAULT_REQUEST_TYPE;
use blobup_transfer::DEFAULT_PART_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Tunables for one upload session.
///
/// Every field has a default, so a partial TOML/JSON document is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Part size in bytes. Only the last part may differ.
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Maximum number of parts in flight at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Attempts per part before the whole upload fails.
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Hash each part body and send the digest to the signer.
    #[serde(default)]
    pub hash_content: bool,

    /// Per-attempt deadline in seconds (0 disables it).
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// Delay between attempts of the same part.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Upload-type hint sent with the completion request.
    #[serde(default = "default_request_type")]
    pub request_type: String,
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_tries() -> u32 {
    3
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_request_type() -> String {
    DEFAULT_REQUEST_TYPE.into()
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            part_size: default_part_size(),
            max_concurrency: default_max_concurrency(),
            max_tries: default_max_tries(),
            hash_content: false,
            attempt_timeout_secs: default_attempt_timeout_secs(),
            retry: RetryConfig::default(),
            request_type: default_request_type(),
        }
    }
}

impl UploaderConfig {
    /// Rejects values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.part_size == 0 {
            return Err(UploadError::InvalidConfig("part_size must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(UploadError::InvalidConfig(
                "max_concurrency must be > 0".into(),
            ));
        }
        if self.max_tries == 0 {
            return Err(UploadError::InvalidConfig("max_tries must be > 0".into()));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(UploadError::InvalidConfig(
                "retry.backoff_factor must be >= 1.0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn part_size_nonzero(&self) -> Result<NonZeroU64, UploadError> {
        NonZeroU64::new(self.part_size)
            .ok_or_else(|| UploadError::InvalidConfig("part_size must be > 0".into()))
    }

    pub(crate) fn concurrency_nonzero(&self) -> Result<NonZeroUsize, UploadError> {
        NonZeroUsize::new(self.max_concurrency)
            .ok_or_else(|| UploadError::InvalidConfig("max_concurrency must be > 0".into()))
    }

    /// Per-attempt deadline, if enabled.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_secs > 0).then(|| Duration::from_secs(self.attempt_timeout_secs))
    }
}

/// Backoff between attempts of the same part.
///
/// The default initial delay is zero: a failed part is re-signed and retried
/// immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Backoff cap, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for each subsequent retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exp = retry.saturating_sub(1).min(63) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp);
        let capped = ms.min(self.max_delay_ms as f64);
        Duration::from_secs_f64(capped / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = UploaderConfig::default();
        assert_eq!(config.part_size, 5 * 1024 * 1024);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.max_tries, 3);
        assert!(!config.hash_content);
        assert_eq!(config.attempt_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.request_type, "blob");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: UploaderConfig =
            serde_json::from_str(r#"{"max_concurrency": 8, "retry": {"initial_delay_ms": 100}}"#)
                .unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.max_tries, 3);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert_eq!(config.retry.max_delay_ms, 15_000);
    }

    #[test]
    fn validate_rejects_zero_values() {
        for config in [
            UploaderConfig {
                part_size: 0,
                ..Default::default()
            },
            UploaderConfig {
                max_concurrency: 0,
                ..Default::default()
            },
            UploaderConfig {
                max_tries: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(UploadError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let config = UploaderConfig {
            retry: RetryConfig {
                backoff_factor: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = UploaderConfig {
            attempt_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.attempt_timeout(), None);
    }

    #[test]
    fn default_retry_is_immediate() {
        let retry = RetryConfig::default();
        for n in 1..5 {
            assert_eq!(retry.delay_for_retry(n), Duration::ZERO);
        }
    }

    #[test]
    fn retry_backoff_is_capped() {
        let retry = RetryConfig {
            initial_delay_ms: 250,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
        };
        assert_eq!(retry.delay_for_retry(1), Duration::from_millis(250));
        assert_eq!(retry.delay_for_retry(2), Duration::from_millis(500));
        assert_eq!(retry.delay_for_retry(3), Duration::from_millis(1_000));
        assert_eq!(retry.delay_for_retry(10), Duration::from_millis(1_000));
    }
}
