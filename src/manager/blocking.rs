//! Synchronous facade over [`BudgetManager`].
//!
//! For callers without an async runtime of their own. Owns a private
//! current-thread `tokio` runtime and drives every call to completion on
//! it; business logic lives only in the async manager.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use crate::BudgetResult;
use crate::config::BudgetConfig;
use crate::guard::{ChargeReceipt, CheckResult};
use crate::ledger::{CounterStore, Scope};
use crate::manager::{BudgetManager, StoreHealth};

/// Blocking counterpart of [`BudgetManager`].
///
/// Each method blocks the calling thread until the store round-trip
/// finishes. Do not construct or call this inside an async context; use
/// the async manager there instead.
pub struct SyncBudgetManager {
    runtime: Runtime,
    inner: BudgetManager,
}

impl SyncBudgetManager {
    /// Build a blocking manager over an injected store.
    pub fn with_store(config: BudgetConfig, store: Arc<dyn CounterStore>) -> BudgetResult<Self> {
        let runtime = build_runtime()?;
        let inner = BudgetManager::with_store(config, store);
        Ok(Self { runtime, inner })
    }

    /// Connect to the Redis store named by `config`, blocking until the
    /// connection is established.
    #[cfg(feature = "redis-backend")]
    pub fn connect(config: BudgetConfig) -> BudgetResult<Self> {
        let runtime = build_runtime()?;
        let inner = runtime.block_on(BudgetManager::connect(config))?;
        Ok(Self { runtime, inner })
    }

    /// The wrapped async manager.
    pub fn as_async(&self) -> &BudgetManager {
        &self.inner
    }

    pub fn check_availability(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated: Decimal,
    ) -> BudgetResult<CheckResult> {
        self.runtime
            .block_on(self.inner.check_availability(user_id, project_id, estimated))
    }

    pub fn ensure_available(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated: Decimal,
    ) -> BudgetResult<()> {
        self.runtime
            .block_on(self.inner.ensure_available(user_id, project_id, estimated))
    }

    pub fn record_spend(
        &self,
        user_id: &str,
        cost: Decimal,
        project_id: Option<&str>,
        model: Option<&str>,
    ) -> BudgetResult<ChargeReceipt> {
        self.runtime
            .block_on(self.inner.record_spend(user_id, cost, project_id, model))
    }

    pub fn record_usage(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> BudgetResult<Decimal> {
        self.runtime.block_on(self.inner.record_usage(
            user_id,
            project_id,
            model,
            input_tokens,
            output_tokens,
        ))
    }

    pub fn current_spend(&self, scope: &Scope) -> BudgetResult<Decimal> {
        self.runtime.block_on(self.inner.current_spend(scope))
    }

    pub fn store_health(&self) -> StoreHealth {
        self.runtime.block_on(self.inner.store_health())
    }
}

fn build_runtime() -> BudgetResult<Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BudgetError;
    use crate::ledger::MemoryStore;
    use rust_decimal_macros::dec;

    fn manager() -> SyncBudgetManager {
        let config = BudgetConfig::new("redis://unused").with_user_limit(dec!(10));
        SyncBudgetManager::with_store(config, Arc::new(MemoryStore::new())).unwrap()
    }

    #[test]
    fn blocking_check_and_charge_round_trip() {
        let manager = manager();

        manager.ensure_available("u1", None, dec!(9.50)).unwrap();
        manager
            .record_spend("u1", dec!(9.50), None, Some("gpt-4o"))
            .unwrap();

        let denied = manager.check_availability("u1", None, dec!(0.60)).unwrap();
        assert!(!denied.is_allowed());

        let err = manager.ensure_available("u1", None, dec!(0.60)).unwrap_err();
        assert!(matches!(err, BudgetError::Exceeded(_)));
    }

    #[test]
    fn blocking_usage_recording_and_health() {
        let manager = manager();

        let cost = manager
            .record_usage("u1", Some("p1"), "gpt-4o-mini", 100_000, 10_000)
            .unwrap();
        assert_eq!(cost, dec!(0.021));

        assert_eq!(
            manager.current_spend(&Scope::project("p1")).unwrap(),
            dec!(0.021)
        );
        assert!(manager.store_health().is_connected());
    }
}
