//! Behavior when the counter store misbehaves.
//!
//! The enforcement path fails closed: an unreachable ledger means no
//! spend headroom can be granted. The charge path never invents or
//! drops spend, but it does report exactly which scopes recorded a
//! cost when the store fails partway through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coreason_budget::{
    BudgetConfig, BudgetError, BudgetManager, CounterStore, ErrorCategory, MemoryStore, Scope,
    StoreError, StoreHealth, StoreResult,
};
use rust_decimal_macros::dec;

/// Refuses every operation, as if the backend were unreachable.
#[derive(Debug, Default)]
struct DownStore;

#[async_trait]
impl CounterStore for DownStore {
    fn name(&self) -> &str {
        "down"
    }

    async fn incr_by(&self, _key: &str, _delta: i64, _ttl: Duration) -> StoreResult<i64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn fetch(&self, _key: &str) -> StoreResult<i64> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Delegates to an in-memory store but times out increments whose key
/// contains the scripted fragment.
#[derive(Debug)]
struct SelectiveStore {
    inner: MemoryStore,
    poisoned_fragment: &'static str,
}

impl SelectiveStore {
    fn poisoning(fragment: &'static str) -> Self {
        Self {
            inner: MemoryStore::new(),
            poisoned_fragment: fragment,
        }
    }
}

#[async_trait]
impl CounterStore for SelectiveStore {
    fn name(&self) -> &str {
        "selective"
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> StoreResult<i64> {
        if key.contains(self.poisoned_fragment) {
            return Err(StoreError::Timeout(Duration::from_millis(500)));
        }
        self.inner.incr_by(key, delta, ttl).await
    }

    async fn fetch(&self, key: &str) -> StoreResult<i64> {
        self.inner.fetch(key).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

fn manager_over(store: Arc<dyn CounterStore>) -> BudgetManager {
    BudgetManager::with_store(BudgetConfig::new("redis://unused"), store)
}

// ============================================================================
// Fail-closed checks
// ============================================================================

#[tokio::test]
async fn check_fails_closed_when_the_store_is_down() {
    let manager = manager_over(Arc::new(DownStore));

    let err = manager
        .check_availability("u1", None, dec!(0.10))
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());
    assert!(err.is_retryable());
    assert_eq!(err.category(), ErrorCategory::Unavailable);

    // The strict form refuses the same way; it never falls through to
    // an allow.
    let err = manager
        .ensure_available("u1", None, dec!(0.10))
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());
}

#[tokio::test]
async fn reads_surface_the_outage_rather_than_a_zero() {
    let manager = manager_over(Arc::new(DownStore));

    let err = manager
        .current_spend(&Scope::user("u1"))
        .await
        .unwrap_err();
    assert!(err.is_store_unavailable());
}

// ============================================================================
// Partial and total charge failures
// ============================================================================

#[tokio::test]
async fn partial_charge_names_recorded_and_failed_scopes() {
    let store = Arc::new(SelectiveStore::poisoning(":project:"));
    let manager = manager_over(store);

    let err = manager
        .record_spend("u1", dec!(1.00), Some("p1"), None)
        .await
        .unwrap_err();

    match &err {
        BudgetError::PartialCharge { recorded, failed } => {
            let recorded_scopes: Vec<&Scope> = recorded.iter().map(|t| &t.scope).collect();
            assert_eq!(recorded_scopes, vec![&Scope::user("u1"), &Scope::global()]);
            assert_eq!(recorded[0].total, dec!(1.00));

            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].scope, Scope::project("p1"));
            assert!(failed[0].error.to_string().contains("timed out"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        err.to_string(),
        "Partial charge: 2 of 3 scope increments recorded"
    );

    // Retrying would double-charge the scopes that already recorded
    // the cost, so this is deliberately not flagged retryable.
    assert!(!err.is_retryable());
    assert_eq!(err.category(), ErrorCategory::Internal);

    // The scopes that did record keep the spend.
    assert_eq!(
        manager.current_spend(&Scope::user("u1")).await.unwrap(),
        dec!(1.00)
    );
    assert_eq!(
        manager.current_spend(&Scope::global()).await.unwrap(),
        dec!(1.00)
    );
    assert_eq!(
        manager.current_spend(&Scope::project("p1")).await.unwrap(),
        dec!(0)
    );
}

#[tokio::test]
async fn all_scope_failures_collapse_to_store_unavailable() {
    let manager = manager_over(Arc::new(DownStore));

    let err = manager
        .record_spend("u1", dec!(1.00), Some("p1"), None)
        .await
        .unwrap_err();

    assert!(err.is_store_unavailable());
    assert!(err.is_retryable());
    assert!(err.to_string().contains("all 3 scope increments failed"));
}

#[tokio::test]
async fn charge_without_project_reports_two_failed_scopes() {
    let manager = manager_over(Arc::new(DownStore));

    let err = manager
        .record_spend("u1", dec!(1.00), None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("all 2 scope increments failed"));
}

// ============================================================================
// Health probes
// ============================================================================

#[tokio::test]
async fn health_probe_reports_degradation() {
    let healthy = manager_over(Arc::new(MemoryStore::new()));
    assert_eq!(healthy.store_health().await, StoreHealth::Connected);
    assert!(healthy.store_health().await.is_connected());

    let degraded = manager_over(Arc::new(DownStore));
    assert_eq!(degraded.store_health().await, StoreHealth::Disconnected);
    assert!(!degraded.store_health().await.is_connected());
}
