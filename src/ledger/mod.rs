//! Hierarchical spend ledger: scope keys, UTC-day buckets, and the atomic
//! counter interface over the backing store.

pub mod scope;
pub mod store;
#[cfg(feature = "redis-backend")]
pub mod store_redis;

pub use scope::{Scope, ScopeKey, ScopeKind};
pub use store::{CounterStore, MemoryStore, StoreError, StoreResult};
#[cfg(feature = "redis-backend")]
pub use store_redis::{RedisCounterStore, RedisStoreConfig};

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;

use crate::{BudgetError, BudgetResult};

/// Scale factor between USD amounts and the integer nanodollar counters
/// kept in the store (9 decimal places of precision).
pub(crate) const NANOS_PER_DOLLAR: Decimal = dec!(1_000_000_000);

/// Default key namespace; versioned so a future layout change can roll
/// out next to live counters.
pub const DEFAULT_NAMESPACE: &str = "spend:v1";

/// Convert a USD amount into integer nanodollars for storage.
///
/// Sub-nanodollar digits round half away from zero; amounts that do not
/// fit the counter range are rejected rather than truncated.
pub(crate) fn to_nanos(amount: Decimal) -> BudgetResult<i64> {
    amount
        .checked_mul(NANOS_PER_DOLLAR)
        .map(|n| n.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|n| n.to_i64())
        .ok_or_else(|| BudgetError::InvalidInput(format!("amount {amount} outside counter range")))
}

/// Convert a stored nanodollar total back into a USD amount. Exact.
pub(crate) fn from_nanos(nanos: i64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(nanos), 9).normalize()
}

/// Policy layer between scopes and raw counters.
///
/// Owns key naming, UTC day stamping, TTL-to-midnight computation, and
/// the Decimal/nanodollar conversion. Holds no counter state of its own:
/// every call reaches the store or fails, which is what keeps multiple
/// service instances consistent.
pub struct Ledger {
    store: Arc<dyn CounterStore>,
    namespace: String,
}

impl Ledger {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Replace the key namespace (`spend:v1` by default).
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> BudgetResult<Self> {
        let namespace = namespace.into();
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '-'));
        if !valid {
            return Err(BudgetError::InvalidInput(format!(
                "invalid ledger namespace '{namespace}': only ASCII alphanumeric, '_', ':', '-' allowed"
            )));
        }
        self.namespace = namespace;
        Ok(self)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Label of the backing store.
    pub fn backend(&self) -> &str {
        self.store.name()
    }

    /// Atomically add `amount` to `scope`'s counter for the current UTC
    /// day and return the new daily total. Refreshes the counter's TTL to
    /// the next UTC midnight.
    pub async fn add(&self, scope: &Scope, amount: Decimal) -> BudgetResult<Decimal> {
        let now = Utc::now();
        let key = ScopeKey::new(scope.clone(), scope::utc_day(now)).storage_key(&self.namespace);
        let ttl = scope::ttl_until_next_utc_midnight(now);
        let delta = to_nanos(amount)?;

        let total = self.store.incr_by(&key, delta, ttl).await?;
        Ok(from_nanos(total))
    }

    /// Current UTC-day total for `scope`. A scope with no recorded spend
    /// today reads as zero, not as an error.
    pub async fn current(&self, scope: &Scope) -> BudgetResult<Decimal> {
        let now = Utc::now();
        let key = ScopeKey::new(scope.clone(), scope::utc_day(now)).storage_key(&self.namespace);

        let total = self.store.fetch(&key).await?;
        Ok(from_nanos(total))
    }

    /// Reachability probe for health reporting.
    pub async fn probe(&self) -> BudgetResult<()> {
        Ok(self.store.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanodollar_conversion_is_exact_for_cents() {
        assert_eq!(to_nanos(dec!(9.50)).unwrap(), 9_500_000_000);
        assert_eq!(to_nanos(dec!(0)).unwrap(), 0);
        assert_eq!(from_nanos(9_500_000_000), dec!(9.5));
        assert_eq!(from_nanos(1), dec!(0.000000001));
    }

    #[test]
    fn sub_nanodollar_digits_round_half_away_from_zero() {
        assert_eq!(to_nanos(dec!(0.0000000005)).unwrap(), 1);
        assert_eq!(to_nanos(dec!(0.0000000004)).unwrap(), 0);
    }

    #[test]
    fn amounts_outside_counter_range_are_rejected() {
        let err = to_nanos(dec!(99_999_999_999)).unwrap_err();
        assert!(matches!(err, BudgetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn add_then_current_round_trips() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let scope = Scope::user("u1");

        assert_eq!(ledger.current(&scope).await.unwrap(), dec!(0));
        assert_eq!(ledger.add(&scope, dec!(1.25)).await.unwrap(), dec!(1.25));
        assert_eq!(ledger.add(&scope, dec!(0.75)).await.unwrap(), dec!(2));
        assert_eq!(ledger.current(&scope).await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn scopes_do_not_share_counters() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));

        ledger.add(&Scope::user("u1"), dec!(3)).await.unwrap();
        assert_eq!(ledger.current(&Scope::user("u2")).await.unwrap(), dec!(0));
        assert_eq!(ledger.current(&Scope::global()).await.unwrap(), dec!(0));
    }

    #[test]
    fn namespace_validation() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());

        let ok = Ledger::new(store.clone()).with_namespace("spend:v2").unwrap();
        assert_eq!(ok.namespace(), "spend:v2");

        assert!(Ledger::new(store.clone()).with_namespace("").is_err());
        assert!(Ledger::new(store).with_namespace("spend v1!").is_err());
    }
}
