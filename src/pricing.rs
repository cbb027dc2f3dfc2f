//! Model pricing for post-flight cost calculation.
//!
//! Prices are exact `Decimal` USD per token. Built-in entries cover the
//! common production models; configuration overrides extend the table and
//! win over built-ins. An unknown model is an error, never a zero cost.

use std::collections::HashMap;
use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{BudgetError, BudgetResult};

const TOKENS_PER_MTOK: Decimal = dec!(1_000_000);

/// Per-token USD prices for one model.
///
/// Field names match the configuration JSON
/// (`COREASON_BUDGET_CUSTOM_MODEL_PRICES`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_cost_per_token: Decimal,
    pub output_cost_per_token: Decimal,
}

impl ModelPrice {
    pub const fn new(input_cost_per_token: Decimal, output_cost_per_token: Decimal) -> Self {
        Self {
            input_cost_per_token,
            output_cost_per_token,
        }
    }

    /// Published rates are quoted per million tokens; this converts them
    /// to the per-token form used internally.
    pub fn per_million(input_per_mtok: Decimal, output_per_mtok: Decimal) -> Self {
        Self {
            input_cost_per_token: input_per_mtok / TOKENS_PER_MTOK,
            output_cost_per_token: output_per_mtok / TOKENS_PER_MTOK,
        }
    }
}

static BUILTIN_PRICES: LazyLock<HashMap<&'static str, ModelPrice>> = LazyLock::new(|| {
    HashMap::from([
        (
            "claude-opus-4-6",
            ModelPrice::per_million(dec!(15), dec!(75)),
        ),
        (
            "claude-sonnet-4-5",
            ModelPrice::per_million(dec!(3), dec!(15)),
        ),
        (
            "claude-haiku-4-5",
            ModelPrice::per_million(dec!(0.80), dec!(4)),
        ),
        ("gpt-4o", ModelPrice::per_million(dec!(2.50), dec!(10))),
        (
            "gpt-4o-mini",
            ModelPrice::per_million(dec!(0.15), dec!(0.60)),
        ),
    ])
});

/// Dated snapshots, provider-prefixed ids, and vendor aliases all map to
/// one family entry in the built-in table.
fn family_alias(model: &str) -> Option<&'static str> {
    let lowered = model.to_lowercase();
    if lowered.contains("opus") {
        Some("claude-opus-4-6")
    } else if lowered.contains("sonnet") {
        Some("claude-sonnet-4-5")
    } else if lowered.contains("haiku") {
        Some("claude-haiku-4-5")
    } else {
        None
    }
}

/// Calculates the cost of LLM transactions.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    overrides: HashMap<String, ModelPrice>,
}

impl PricingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides from configuration; these win over built-in entries.
    pub fn with_overrides(overrides: HashMap<String, ModelPrice>) -> Self {
        Self { overrides }
    }

    /// Look up the price for a model name.
    ///
    /// Resolution order: exact name, then the name with any provider
    /// prefix stripped (`openai/gpt-4o` reads as `gpt-4o`), then the
    /// model family alias. Overrides are consulted before built-ins at
    /// every step.
    pub fn resolve(&self, model: &str) -> Option<ModelPrice> {
        let stripped = model.rsplit_once('/').map(|(_, name)| name);
        let candidates = [Some(model), stripped, family_alias(model)];

        for candidate in candidates.into_iter().flatten() {
            if let Some(price) = self.overrides.get(candidate) {
                return Some(*price);
            }
            if let Some(price) = BUILTIN_PRICES.get(candidate) {
                return Some(*price);
            }
        }
        None
    }

    /// Cost in USD for one transaction.
    ///
    /// An unknown model is [`BudgetError::InvalidInput`]: charging zero
    /// for usage that plainly happened would corrupt the ledger.
    pub fn calculate(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> BudgetResult<Decimal> {
        let price = self.resolve(model).ok_or_else(|| {
            BudgetError::InvalidInput(format!("no pricing known for model {model:?}"))
        })?;

        let cost = Decimal::from(input_tokens)
            .checked_mul(price.input_cost_per_token)
            .zip(Decimal::from(output_tokens).checked_mul(price.output_cost_per_token))
            .and_then(|(input, output)| input.checked_add(output))
            .ok_or_else(|| {
                BudgetError::InvalidInput(format!("cost out of range for model {model:?}"))
            })?;

        if self.overrides.contains_key(model) {
            tracing::debug!(model, cost = %cost, "using override pricing");
        }
        Ok(cost)
    }
}
