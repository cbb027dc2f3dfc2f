//! Orchestration surface: configuration, scope resolution, enforcement,
//! and pricing behind one handle.

pub mod blocking;

pub use blocking::SyncBudgetManager;

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::BudgetConfig;
use crate::guard::{BudgetGuard, ChargeReceipt, CheckResult, ScopedLimit};
use crate::ledger::{CounterStore, Ledger, Scope, ScopeKind};
use crate::pricing::PricingEngine;
use crate::{BudgetError, BudgetResult};

/// Reachability of the backing counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreHealth {
    Connected,
    Disconnected,
}

impl StoreHealth {
    pub fn is_connected(&self) -> bool {
        matches!(self, StoreHealth::Connected)
    }
}

/// Front door for budget enforcement.
///
/// Owns the resolved configuration, the ledger over an injected
/// [`CounterStore`], and the pricing engine. Cheap to share behind an
/// `Arc`; all methods take `&self`.
///
/// The enforcement protocol is two-phase: call
/// [`check_availability`](Self::check_availability) (or
/// [`ensure_available`](Self::ensure_available)) before running metered
/// work, then [`record_spend`](Self::record_spend) or
/// [`record_usage`](Self::record_usage) with the actual cost afterwards.
pub struct BudgetManager {
    config: BudgetConfig,
    guard: BudgetGuard,
    pricing: PricingEngine,
}

impl BudgetManager {
    /// Build a manager over an injected store.
    pub fn with_store(config: BudgetConfig, store: Arc<dyn CounterStore>) -> Self {
        let pricing = PricingEngine::with_overrides(config.custom_model_prices().clone());
        let guard = BudgetGuard::new(Ledger::new(store));
        Self {
            config,
            guard,
            pricing,
        }
    }

    /// Connect to the Redis store named by `config` and build a manager
    /// over it. Fails fast if the store does not answer a PING.
    #[cfg(feature = "redis-backend")]
    pub async fn connect(config: BudgetConfig) -> BudgetResult<Self> {
        use secrecy::ExposeSecret;

        use crate::ledger::{RedisCounterStore, RedisStoreConfig};

        let store_config = RedisStoreConfig::new(config.redis_url().expose_secret())
            .response_timeout(config.store_timeout());
        let store = RedisCounterStore::connect(store_config).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// Scopes that apply to one request, most specific first: the user,
    /// the project when one is supplied, then the global ceiling. Limits
    /// come from per-identifier overrides where configured, otherwise the
    /// scope-kind default.
    pub fn resolve_scopes(&self, user_id: &str, project_id: Option<&str>) -> Vec<ScopedLimit> {
        let mut scopes = Vec::with_capacity(3);
        scopes.push(ScopedLimit::new(
            Scope::user(user_id),
            self.config.limit_for(ScopeKind::User, user_id),
        ));
        if let Some(project) = project_id {
            scopes.push(ScopedLimit::new(
                Scope::project(project),
                self.config.limit_for(ScopeKind::Project, project),
            ));
        }
        scopes.push(ScopedLimit::new(
            Scope::global(),
            self.config.default_limit(ScopeKind::Global),
        ));
        scopes
    }

    /// Pre-flight check: would spending `estimated` breach any applicable
    /// scope today?
    ///
    /// A store failure is an error, not an allowance; callers must deny
    /// the request in that case.
    pub async fn check_availability(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated: Decimal,
    ) -> BudgetResult<CheckResult> {
        validate_identifier("user_id", user_id)?;
        if let Some(project) = project_id {
            validate_identifier("project_id", project)?;
        }
        let scopes = self.resolve_scopes(user_id, project_id);
        self.guard.check(&scopes, estimated).await
    }

    /// [`check_availability`](Self::check_availability) folded into a
    /// `Result`: a denial becomes [`BudgetError::Exceeded`].
    pub async fn ensure_available(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        estimated: Decimal,
    ) -> BudgetResult<()> {
        self.check_availability(user_id, project_id, estimated)
            .await?
            .into_result()
    }

    /// Post-flight charge: record `cost` against every applicable scope.
    ///
    /// Never re-validates limits; spend that already happened is recorded
    /// even past a limit. `model` is informational and only feeds the
    /// spend metric.
    pub async fn record_spend(
        &self,
        user_id: &str,
        cost: Decimal,
        project_id: Option<&str>,
        model: Option<&str>,
    ) -> BudgetResult<ChargeReceipt> {
        validate_identifier("user_id", user_id)?;
        if let Some(project) = project_id {
            validate_identifier("project_id", project)?;
        }
        if let Some(model) = model {
            validate_identifier("model", model)?;
        }

        let scopes = self.resolve_scopes(user_id, project_id);
        let receipt = self.guard.charge(&scopes, cost).await?;

        tracing::info!(
            metric = "finops.spend.total",
            amount = %cost,
            model = model.unwrap_or("unknown"),
            project = project_id.unwrap_or("none"),
            user = user_id,
            "spend recorded"
        );
        Ok(receipt)
    }

    /// Price a token usage via the pricing engine, then record it as a
    /// charge. Returns the computed cost.
    pub async fn record_usage(
        &self,
        user_id: &str,
        project_id: Option<&str>,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> BudgetResult<Decimal> {
        validate_identifier("model", model)?;
        let cost = self.pricing.calculate(model, input_tokens, output_tokens)?;
        self.record_spend(user_id, cost, project_id, Some(model))
            .await?;
        Ok(cost)
    }

    /// Today's recorded total for one scope.
    pub async fn current_spend(&self, scope: &Scope) -> BudgetResult<Decimal> {
        self.guard.ledger().current(scope).await
    }

    /// Ping the backing store for health reporting.
    pub async fn store_health(&self) -> StoreHealth {
        match self.guard.ledger().probe().await {
            Ok(()) => StoreHealth::Connected,
            Err(error) => {
                tracing::error!(
                    backend = self.guard.ledger().backend(),
                    error = %error,
                    "store health probe failed"
                );
                StoreHealth::Disconnected
            }
        }
    }
}

fn validate_identifier(field: &str, value: &str) -> BudgetResult<()> {
    if value.trim().is_empty() {
        return Err(BudgetError::InvalidInput(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}
