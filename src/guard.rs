//! Budget enforcement: multi-scope evaluation and multi-scope charging.

use std::fmt;

use futures::future::join_all;
use rust_decimal::Decimal;

use crate::ledger::{Ledger, Scope, ScopeKind, StoreError};
use crate::{BudgetError, BudgetResult};

/// A scope paired with the limit that applies to it for one call.
///
/// Limits are resolved once, up front; configuration changes take effect
/// on subsequent calls only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedLimit {
    pub scope: Scope,
    pub limit: Decimal,
}

impl ScopedLimit {
    pub fn new(scope: Scope, limit: Decimal) -> Self {
        Self { scope, limit }
    }
}

/// A scope whose projected spend went over its limit.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetBreach {
    pub scope: Scope,
    pub current: Decimal,
    pub limit: Decimal,
    pub estimated: Decimal,
}

impl fmt::Display for BudgetBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} daily limit of ${} reached (spent ${}, estimated ${})",
            self.scope, self.limit, self.current, self.estimated
        )
    }
}

/// Outcome of a pre-flight check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckResult {
    /// Every applicable scope has room for the estimated cost.
    Allowed,
    /// The first violated scope, most specific first.
    Denied(BudgetBreach),
}

impl CheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CheckResult::Allowed)
    }

    pub fn breach(&self) -> Option<&BudgetBreach> {
        match self {
            CheckResult::Allowed => None,
            CheckResult::Denied(breach) => Some(breach),
        }
    }

    /// Fold the tag into a `Result`, turning a denial into
    /// [`BudgetError::Exceeded`].
    pub fn into_result(self) -> BudgetResult<()> {
        match self {
            CheckResult::Allowed => Ok(()),
            CheckResult::Denied(breach) => Err(BudgetError::Exceeded(breach)),
        }
    }
}

/// New daily total for one scope after a successful increment.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTotal {
    pub scope: Scope,
    pub total: Decimal,
}

/// A scope whose increment did not reach the store.
#[derive(Debug, Clone)]
pub struct FailedCharge {
    pub scope: Scope,
    pub error: StoreError,
}

/// Receipt for a fully recorded charge.
#[derive(Debug, Clone)]
pub struct ChargeReceipt {
    /// Post-increment totals, in scope order (most specific first).
    pub recorded: Vec<ScopeTotal>,
}

/// The enforcement brain.
///
/// `check` is read-only and advisory; `charge` is unconditional. The gap
/// between them is a real race: two requests can both pass a check
/// against the same nearly-exhausted limit and then both charge,
/// overshooting the limit by at most the sum of the in-flight costs.
/// That bound is accepted; closing it would require holding a
/// cross-request lock for the duration of the metered work.
pub struct BudgetGuard {
    ledger: Ledger,
}

impl BudgetGuard {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Evaluate `scopes` in the given order (most specific first) against
    /// `estimated`. The first violated scope is reported; later scopes are
    /// not read once one is violated. `estimated == 0` asks "is there any
    /// room at all".
    ///
    /// A store failure propagates as [`BudgetError::StoreUnavailable`];
    /// callers must treat that as a denial, never as room to spend.
    pub async fn check(
        &self,
        scopes: &[ScopedLimit],
        estimated: Decimal,
    ) -> BudgetResult<CheckResult> {
        if estimated < Decimal::ZERO {
            return Err(BudgetError::InvalidInput(format!(
                "estimated cost cannot be negative (got {estimated})"
            )));
        }

        for scoped in scopes {
            let current = self.ledger.current(&scoped.scope).await?;

            let exhausted = current >= scoped.limit;
            // An absurdly large estimate that overflows the projection
            // exceeds any finite limit.
            let would_exceed = estimated > Decimal::ZERO
                && current
                    .checked_add(estimated)
                    .is_none_or(|projected| projected > scoped.limit);

            if exhausted || would_exceed {
                tracing::warn!(
                    scope = %scoped.scope,
                    used = %current,
                    estimated = %estimated,
                    limit = %scoped.limit,
                    "budget exceeded"
                );
                return Ok(CheckResult::Denied(BudgetBreach {
                    scope: scoped.scope.clone(),
                    current,
                    limit: scoped.limit,
                    estimated,
                }));
            }

            if scoped.scope.kind() == ScopeKind::User {
                tracing::info!(
                    scope = %scoped.scope,
                    used = %current,
                    estimated = %estimated,
                    limit = %scoped.limit,
                    "budget check passed"
                );
            }
        }

        Ok(CheckResult::Allowed)
    }

    /// Record `amount` against every scope in `scopes`.
    ///
    /// No limit is re-validated: once metered work has run, its cost is
    /// recorded even past a limit. Each increment is atomic per key;
    /// there is no cross-scope transaction and no rollback. A mixed
    /// outcome surfaces as [`BudgetError::PartialCharge`] naming exactly
    /// which scopes landed and which did not.
    pub async fn charge(
        &self,
        scopes: &[ScopedLimit],
        amount: Decimal,
    ) -> BudgetResult<ChargeReceipt> {
        if amount < Decimal::ZERO {
            return Err(BudgetError::InvalidInput(format!(
                "charge amount cannot be negative (got {amount})"
            )));
        }
        // Reject unrepresentable amounts before any increment goes out.
        crate::ledger::to_nanos(amount)?;

        let increments = scopes.iter().map(|scoped| {
            let scope = scoped.scope.clone();
            async move {
                let outcome = self.ledger.add(&scope, amount).await;
                (scope, outcome)
            }
        });
        let outcomes = join_all(increments).await;

        let mut recorded = Vec::with_capacity(outcomes.len());
        let mut failed = Vec::new();
        for (scope, outcome) in outcomes {
            match outcome {
                Ok(total) => recorded.push(ScopeTotal { scope, total }),
                Err(BudgetError::StoreUnavailable(error)) => {
                    tracing::error!(scope = %scope, error = %error, "scope increment failed");
                    failed.push(FailedCharge { scope, error });
                }
                Err(other) => return Err(other),
            }
        }

        if failed.is_empty() {
            Ok(ChargeReceipt { recorded })
        } else if recorded.is_empty() {
            let reasons = failed
                .iter()
                .map(|f| format!("{}: {}", f.scope, f.error))
                .collect::<Vec<_>>()
                .join("; ");
            Err(BudgetError::StoreUnavailable(StoreError::Unavailable(
                format!("all {} scope increments failed: {reasons}", failed.len()),
            )))
        } else {
            Err(BudgetError::PartialCharge { recorded, failed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn guard() -> BudgetGuard {
        BudgetGuard::new(Ledger::new(Arc::new(MemoryStore::new())))
    }

    fn scopes() -> Vec<ScopedLimit> {
        vec![
            ScopedLimit::new(Scope::user("u1"), dec!(10)),
            ScopedLimit::new(Scope::project("p1"), dec!(500)),
            ScopedLimit::new(Scope::global(), dec!(5000)),
        ]
    }

    #[tokio::test]
    async fn near_limit_estimate_is_denied_and_smaller_one_allowed() {
        let guard = guard();
        let scopes = scopes();
        guard.charge(&scopes, dec!(9.50)).await.unwrap();

        let denied = guard.check(&scopes, dec!(0.60)).await.unwrap();
        let breach = denied.breach().expect("9.50 + 0.60 > 10.00");
        assert_eq!(breach.scope, Scope::user("u1"));
        assert_eq!(breach.current, dec!(9.5));
        assert_eq!(breach.limit, dec!(10));

        let allowed = guard.check(&scopes, dec!(0.40)).await.unwrap();
        assert!(allowed.is_allowed());
    }

    #[tokio::test]
    async fn zero_estimate_asks_for_any_room_at_all() {
        let guard = guard();
        let scopes = vec![ScopedLimit::new(Scope::user("u1"), dec!(1))];

        assert!(guard.check(&scopes, dec!(0)).await.unwrap().is_allowed());

        guard.charge(&scopes, dec!(1)).await.unwrap();
        let denied = guard.check(&scopes, dec!(0)).await.unwrap();
        assert!(!denied.is_allowed());
    }

    #[tokio::test]
    async fn estimate_landing_exactly_on_the_limit_is_allowed() {
        let guard = guard();
        let scopes = vec![ScopedLimit::new(Scope::user("u1"), dec!(10))];
        guard.charge(&scopes, dec!(9)).await.unwrap();

        assert!(guard.check(&scopes, dec!(1)).await.unwrap().is_allowed());
        assert!(!guard.check(&scopes, dec!(1.01)).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn first_violated_scope_in_order_is_reported() {
        let guard = guard();
        // User has room; project and global are both exhausted.
        let scopes = vec![
            ScopedLimit::new(Scope::user("u1"), dec!(100)),
            ScopedLimit::new(Scope::project("p1"), dec!(1)),
            ScopedLimit::new(Scope::global(), dec!(1)),
        ];
        guard.charge(&scopes, dec!(2)).await.unwrap();

        let denied = guard.check(&scopes, dec!(0.50)).await.unwrap();
        let breach = denied.breach().expect("project is exhausted");
        assert_eq!(breach.scope.kind(), ScopeKind::Project);
    }

    #[tokio::test]
    async fn negative_inputs_are_rejected_before_the_store() {
        let guard = guard();
        let scopes = scopes();

        let check_err = guard.check(&scopes, dec!(-0.01)).await.unwrap_err();
        assert!(matches!(check_err, BudgetError::InvalidInput(_)));

        let charge_err = guard.charge(&scopes, dec!(-1)).await.unwrap_err();
        assert!(matches!(charge_err, BudgetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn charge_updates_every_scope_and_reports_totals_in_order() {
        let guard = guard();
        let scopes = scopes();

        let receipt = guard.charge(&scopes, dec!(0.25)).await.unwrap();
        assert_eq!(receipt.recorded.len(), 3);
        assert_eq!(receipt.recorded[0].scope, Scope::user("u1"));
        assert_eq!(receipt.recorded[1].scope, Scope::project("p1"));
        assert_eq!(receipt.recorded[2].scope, Scope::global());
        for entry in &receipt.recorded {
            assert_eq!(entry.total, dec!(0.25));
        }
    }

    #[tokio::test]
    async fn charge_is_not_idempotent() {
        let guard = guard();
        let scopes = vec![ScopedLimit::new(Scope::user("u1"), dec!(10))];

        guard.charge(&scopes, dec!(0.40)).await.unwrap();
        let receipt = guard.charge(&scopes, dec!(0.40)).await.unwrap();
        assert_eq!(receipt.recorded[0].total, dec!(0.8));
    }

    #[tokio::test]
    async fn charge_ignores_limits() {
        let guard = guard();
        let scopes = vec![ScopedLimit::new(Scope::user("u1"), dec!(1))];

        let receipt = guard.charge(&scopes, dec!(5)).await.unwrap();
        assert_eq!(receipt.recorded[0].total, dec!(5));
    }
}
