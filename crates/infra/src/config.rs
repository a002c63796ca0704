//! Runtime knobs for the order core.

use std::str::FromStr;
use std::time::Duration;

use storefront_orders::TransitionPolicy;

/// Order core configuration.
///
/// Every field has a default; `from_env` only overrides what is set and
/// parses cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// How many times placement mints a fresh set of ids after the store
    /// rejects an insert for a duplicate order or line id.
    pub id_mint_attempts: u32,
    /// Attempts (including the first) for idempotent reads that fail with a
    /// persistence error.
    pub read_retry_attempts: u32,
    /// Base delay between read attempts; grows linearly per attempt.
    pub read_retry_backoff: Duration,
    /// Attempts for a status change that keeps losing the optimistic
    /// concurrency race.
    pub conflict_retry_attempts: u32,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    pub transition_policy: TransitionPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            id_mint_attempts: 5,
            read_retry_attempts: 3,
            read_retry_backoff: Duration::from_millis(25),
            conflict_retry_attempts: 3,
            store_timeout: Duration::from_secs(5),
            transition_policy: TransitionPolicy::Permissive,
        }
    }
}

impl CoreConfig {
    /// Load from `ORDER_ID_MINT_ATTEMPTS`, `READ_RETRY_ATTEMPTS`,
    /// `READ_RETRY_BACKOFF_MS`, `CONFLICT_RETRY_ATTEMPTS`, `STORE_TIMEOUT_MS`
    /// and `TRANSITION_POLICY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            id_mint_attempts: parse_or(&lookup, "ORDER_ID_MINT_ATTEMPTS", defaults.id_mint_attempts)
                .max(1),
            read_retry_attempts: parse_or(&lookup, "READ_RETRY_ATTEMPTS", defaults.read_retry_attempts)
                .max(1),
            read_retry_backoff: Duration::from_millis(parse_or(
                &lookup,
                "READ_RETRY_BACKOFF_MS",
                defaults.read_retry_backoff.as_millis() as u64,
            )),
            conflict_retry_attempts: parse_or(
                &lookup,
                "CONFLICT_RETRY_ATTEMPTS",
                defaults.conflict_retry_attempts,
            )
            .max(1),
            store_timeout: Duration::from_millis(
                parse_or(
                    &lookup,
                    "STORE_TIMEOUT_MS",
                    defaults.store_timeout.as_millis() as u64,
                )
                .max(1),
            ),
            transition_policy: parse_or(&lookup, "TRANSITION_POLICY", defaults.transition_policy),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Debug,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, fallback = ?default, "invalid config value; using default");
                default
            }
        },
    }
}
