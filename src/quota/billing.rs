//! Billing port: the source of truth for an account's tier.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::Tier;

#[derive(Debug, Clone, Error)]
pub enum BillingError {
    #[error("Billing provider unavailable: {0}")]
    Unavailable(String),
}

/// Port for reading subscription tiers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn tier_for(&self, user_id: &str) -> Result<Tier, BillingError>;
}

/// Tiers from configuration: explicit per-account entries, otherwise a default
#[derive(Debug, Clone, Default)]
pub struct StaticBilling {
    default_tier: Tier,
    accounts: HashMap<String, Tier>,
}

impl StaticBilling {
    pub fn new(default_tier: Tier) -> Self {
        Self {
            default_tier,
            accounts: HashMap::new(),
        }
    }

    pub fn with_accounts(default_tier: Tier, accounts: HashMap<String, Tier>) -> Self {
        Self {
            default_tier,
            accounts,
        }
    }

    pub fn set_tier(&mut self, user_id: impl Into<String>, tier: Tier) {
        self.accounts.insert(user_id.into(), tier);
    }
}

#[async_trait]
impl BillingProvider for StaticBilling {
    async fn tier_for(&self, user_id: &str) -> Result<Tier, BillingError> {
        Ok(self
            .accounts
            .get(user_id)
            .copied()
            .unwrap_or(self.default_tier))
    }
}
