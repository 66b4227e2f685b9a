use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::Rate;
use crate::retry::RetryPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{name} must be between 0 and 1, got {value}")]
    RateOutOfRange { name: &'static str, value: Rate },

    #[error("{name} must be between 1 and 8760 hours, got {hours}")]
    CutoffOutOfRange { name: &'static str, hours: i64 },
}

/// Longest accepted cancellation cutoff: one year.
pub const MAX_CANCELLATION_CUTOFF_HOURS: i64 = 24 * 365;

const CUTOFF_VAR: &str = "SETTLE_CANCELLATION_CUTOFF_HOURS";

/// What to do with a payment confirmed after its offer closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateConfirmationPolicy {
    /// Keep the charge, record a reconciliation flag and reject the confirmation.
    #[default]
    RejectAndFlag,
    /// Refund the charge at the provider and record a reconciliation flag.
    RefundAndFlag,
}

impl FromStr for LateConfirmationPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" | "reject_and_flag" => Ok(Self::RejectAndFlag),
            "refund" | "refund_and_flag" => Ok(Self::RefundAndFlag),
            _ => Err(()),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Share of the gross kept by the platform.
    pub platform_fee_rate: Rate,
    /// Share of the platform fee paid to the campaign creator.
    pub creator_share_rate: Rate,
    /// Cancellations close this long before the offer deadline.
    pub cancellation_cutoff: chrono::Duration,
    pub late_confirmation: LateConfirmationPolicy,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: Rate::new(rust_decimal::Decimal::new(3, 2)),
            creator_share_rate: Rate::new(rust_decimal::Decimal::new(10, 2)),
            cancellation_cutoff: chrono::Duration::hours(24),
            late_confirmation: LateConfirmationPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `SETTLE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let platform_fee_rate =
            parse_or(&lookup, "SETTLE_PLATFORM_FEE_RATE", defaults.platform_fee_rate)?;
        let creator_share_rate =
            parse_or(&lookup, "SETTLE_CREATOR_SHARE_RATE", defaults.creator_share_rate)?;
        let cutoff_hours: i64 = parse_or(&lookup, CUTOFF_VAR, defaults.cancellation_cutoff.num_hours())?;
        let cancellation_cutoff = chrono::Duration::try_hours(cutoff_hours).ok_or(
            ConfigError::CutoffOutOfRange {
                name: CUTOFF_VAR,
                hours: cutoff_hours,
            },
        )?;
        let late_confirmation =
            parse_or(&lookup, "SETTLE_LATE_CONFIRMATION", defaults.late_confirmation)?;
        let max_attempts: u32 = parse_or(
            &lookup,
            "SETTLE_RETRY_MAX_ATTEMPTS",
            defaults.retry.max_attempts,
        )?;
        let initial_delay_ms: u64 = parse_or(
            &lookup,
            "SETTLE_RETRY_INITIAL_DELAY_MS",
            defaults.retry.initial_delay.as_millis() as u64,
        )?;

        let config = Self {
            platform_fee_rate,
            creator_share_rate,
            cancellation_cutoff,
            late_confirmation,
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                initial_delay: Duration::from_millis(initial_delay_ms),
                ..defaults.retry
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("SETTLE_PLATFORM_FEE_RATE", self.platform_fee_rate),
            ("SETTLE_CREATOR_SHARE_RATE", self.creator_share_rate),
        ] {
            if !value.is_fraction() {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }

        let cutoff = self.cancellation_cutoff;
        if cutoff <= chrono::Duration::zero()
            || cutoff > chrono::Duration::hours(MAX_CANCELLATION_CUTOFF_HOURS)
        {
            return Err(ConfigError::CutoffOutOfRange {
                name: CUTOFF_VAR,
                hours: cutoff.num_hours(),
            });
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
