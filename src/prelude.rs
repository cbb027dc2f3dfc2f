//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits
//! for enforcing spend budgets.
//!
//! # Usage
//!
//! ```rust
//! use coreason_budget::prelude::*;
//! ```

// Core types
pub use crate::BudgetError;
pub use crate::BudgetResult;
pub use crate::ErrorCategory;

// Manager
pub use crate::manager::{BudgetManager, StoreHealth, SyncBudgetManager};

// Configuration
pub use crate::config::{BudgetConfig, ConfigError};

// Enforcement
pub use crate::guard::{BudgetBreach, ChargeReceipt, CheckResult, ScopedLimit};

// Ledger
pub use crate::ledger::{CounterStore, Ledger, MemoryStore, Scope, ScopeKind, StoreError};
#[cfg(feature = "redis-backend")]
pub use crate::ledger::{RedisCounterStore, RedisStoreConfig};

// Pricing
pub use crate::pricing::{ModelPrice, PricingEngine};
