//! # coreason-budget
//!
//! Hierarchical daily spend quotas for metered LLM usage.
//!
//! This crate enforces per-user, per-project, and global USD limits over
//! shared atomic counters. Enforcement is two-phase: a read-only
//! pre-flight **check** before the metered call, then an unconditional
//! **charge** with the actual cost afterwards. Counters live in Redis (or
//! an in-process store), keyed by scope and UTC day, and expire on their
//! own at the next UTC midnight.
//!
//! The posture is fail-closed: when the counter store cannot be read, a
//! check reports an error rather than an allowance.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coreason_budget::{BudgetConfig, BudgetManager};
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), coreason_budget::BudgetError> {
//!     let config = BudgetConfig::from_env()?;
//!     let manager = BudgetManager::connect(config).await?;
//!
//!     manager.ensure_available("u1", Some("p1"), dec!(0.25)).await?;
//!     // ... run the metered call ...
//!     manager
//!         .record_spend("u1", dec!(0.19), Some("p1"), Some("claude-sonnet-4-5"))
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## In-process enforcement
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use coreason_budget::{BudgetConfig, BudgetManager, MemoryStore};
//! use rust_decimal_macros::dec;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), coreason_budget::BudgetError> {
//! let config = BudgetConfig::new("redis://unused").with_user_limit(dec!(5));
//! let manager = BudgetManager::with_store(config, Arc::new(MemoryStore::new()));
//!
//! manager.record_spend("u1", dec!(4.80), None, None).await?;
//! let verdict = manager.check_availability("u1", None, dec!(0.50)).await?;
//! assert!(!verdict.is_allowed());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod guard;
pub mod ledger;
pub mod manager;
pub mod prelude;
pub mod pricing;
#[cfg(feature = "server")]
pub mod server;

// Re-exports for convenience
pub use config::{BudgetConfig, ConfigError, ConfigResult, ENV_PREFIX};
pub use guard::{
    BudgetBreach, BudgetGuard, ChargeReceipt, CheckResult, FailedCharge, ScopeTotal, ScopedLimit,
};
pub use ledger::{
    CounterStore, DEFAULT_NAMESPACE, Ledger, MemoryStore, Scope, ScopeKey, ScopeKind, StoreError,
    StoreResult,
};
#[cfg(feature = "redis-backend")]
pub use ledger::{RedisCounterStore, RedisStoreConfig};
pub use manager::{BudgetManager, StoreHealth, SyncBudgetManager};
pub use pricing::{ModelPrice, PricingEngine};

/// Error type for budget operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BudgetError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The counter store could not be reached or timed out.
    ///
    /// On the check path this blocks the request outright: with no
    /// readable ledger there is no spend headroom to grant.
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(#[from] ledger::StoreError),

    /// A scope's daily limit was reached.
    #[error("Budget exceeded: {0}")]
    Exceeded(guard::BudgetBreach),

    /// Caller input rejected before any store round-trip.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A charge reached some scopes but not others. Retrying would
    /// double-charge the scopes that already recorded it.
    #[error(
        "Partial charge: {} of {} scope increments recorded",
        .recorded.len(),
        .recorded.len() + .failed.len()
    )]
    PartialCharge {
        recorded: Vec<guard::ScopeTotal>,
        failed: Vec<guard::FailedCharge>,
    },

    /// Runtime or listener construction failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Startup configuration problems
    Configuration,
    /// Store connectivity or timeout; may clear on its own
    Unavailable,
    /// Caller-supplied input rejected
    Validation,
    /// A budget limit doing its job
    Policy,
    /// Internal errors (IO, mixed charge outcomes)
    Internal,
}

impl BudgetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BudgetError::Config(_) => ErrorCategory::Configuration,
            BudgetError::StoreUnavailable(_) => ErrorCategory::Unavailable,
            BudgetError::Exceeded(_) => ErrorCategory::Policy,
            BudgetError::InvalidInput(_) => ErrorCategory::Validation,
            BudgetError::PartialCharge { .. } | BudgetError::Io(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, BudgetError::StoreUnavailable(_))
    }

    /// Whether waiting and re-issuing the same call could succeed.
    /// Advisory only; nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Unavailable
    }

    /// The violated scope, when this error is a denial.
    pub fn breach(&self) -> Option<&guard::BudgetBreach> {
        match self {
            BudgetError::Exceeded(breach) => Some(breach),
            _ => None,
        }
    }
}

pub type BudgetResult<T> = std::result::Result<T, BudgetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_display() {
        let err = BudgetError::Exceeded(guard::BudgetBreach {
            scope: Scope::user("u1"),
            current: dec!(9.5),
            limit: dec!(10),
            estimated: dec!(0.6),
        });
        let rendered = err.to_string();
        assert!(rendered.contains("User u1"));
        assert!(rendered.contains("$10"));
    }

    #[test]
    fn test_error_categories_drive_retry_advice() {
        let unavailable = BudgetError::StoreUnavailable(StoreError::Unavailable("down".into()));
        assert_eq!(unavailable.category(), ErrorCategory::Unavailable);
        assert!(unavailable.is_retryable());
        assert!(unavailable.is_store_unavailable());

        let invalid = BudgetError::InvalidInput("negative cost".into());
        assert_eq!(invalid.category(), ErrorCategory::Validation);
        assert!(!invalid.is_retryable());

        let partial = BudgetError::PartialCharge {
            recorded: vec![],
            failed: vec![],
        };
        assert_eq!(partial.category(), ErrorCategory::Internal);
        assert!(!partial.is_retryable());
    }

    #[test]
    fn test_partial_charge_display_counts_scopes() {
        let err = BudgetError::PartialCharge {
            recorded: vec![ScopeTotal {
                scope: Scope::user("u1"),
                total: dec!(1),
            }],
            failed: vec![
                FailedCharge {
                    scope: Scope::project("p1"),
                    error: StoreError::Unavailable("down".into()),
                },
                FailedCharge {
                    scope: Scope::global(),
                    error: StoreError::Unavailable("down".into()),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Partial charge: 1 of 3 scope increments recorded"
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = ConfigError::NotFound {
            key: "COREASON_BUDGET_REDIS_URL".to_string(),
        };
        let err: BudgetError = config_err.into();
        assert!(matches!(err, BudgetError::Config(_)));
        assert!(err.to_string().contains("Key not found"));
    }
}
