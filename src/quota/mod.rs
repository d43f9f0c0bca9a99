//! Subscription tiers and the monthly quota gate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::store::{DocumentStore, StoreError, UsageCounter, UsagePeriod};

pub mod billing;
pub mod usage;

pub use billing::{BillingError, BillingProvider, StaticBilling};
pub use usage::UsageRecorder;

/// Subscription level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

pub const ALL_TIERS: &[Tier] = &[Tier::Free, Tier::Pro, Tier::Enterprise];

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }

    pub fn limits(&self) -> SubscriptionLimits {
        SubscriptionLimits::for_tier(*self)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!(
                "Invalid tier: \"{}\". Valid tiers are: free, pro, enterprise",
                other
            )),
        }
    }
}

/// Features unlocked by a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierFeatures {
    pub custom_styles: bool,
    pub export_formats: bool,
    pub priority_processing: bool,
}

/// Limits derived from a tier. Not stored; always computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubscriptionLimits {
    /// `None` means unlimited documents
    pub documents_per_month: Option<u64>,
    /// Monthly duration budget for metered tiers, per-video ceiling for unlimited ones
    pub max_video_duration_seconds: u64,
    pub features: TierFeatures,
}

impl SubscriptionLimits {
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Free => Self {
                documents_per_month: Some(5),
                max_video_duration_seconds: 600,
                features: TierFeatures {
                    custom_styles: false,
                    export_formats: false,
                    priority_processing: false,
                },
            },
            Tier::Pro => Self {
                documents_per_month: Some(50),
                max_video_duration_seconds: 18_000,
                features: TierFeatures {
                    custom_styles: true,
                    export_formats: true,
                    priority_processing: false,
                },
            },
            Tier::Enterprise => Self {
                documents_per_month: None,
                max_video_duration_seconds: 14_400,
                features: TierFeatures {
                    custom_styles: true,
                    export_formats: true,
                    priority_processing: true,
                },
            },
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.documents_per_month.is_none()
    }
}

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDenial {
    DurationLimit {
        used_seconds: u64,
        proposed_seconds: u64,
        limit_seconds: u64,
    },
    DocumentLimit {
        used: u64,
        limit: u64,
    },
    DurationCeiling {
        proposed_seconds: u64,
        ceiling_seconds: u64,
    },
}

impl fmt::Display for QuotaDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaDenial::DurationLimit {
                used_seconds,
                proposed_seconds,
                limit_seconds,
            } => write!(
                f,
                "Monthly video duration limit exceeded: {}s used + {}s requested > {}s allowed",
                used_seconds, proposed_seconds, limit_seconds
            ),
            QuotaDenial::DocumentLimit { used, limit } => write!(
                f,
                "Monthly document limit reached: {} of {} documents processed",
                used, limit
            ),
            QuotaDenial::DurationCeiling {
                proposed_seconds,
                ceiling_seconds,
            } => write!(
                f,
                "Video duration limit exceeded: {}s is longer than the {}s maximum",
                proposed_seconds, ceiling_seconds
            ),
        }
    }
}

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied(QuotaDenial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            QuotaDecision::Allowed => None,
            QuotaDecision::Denied(denial) => Some(denial.to_string()),
        }
    }
}

/// Decides a request against limits and current usage. Duration is checked
/// before the document count.
pub fn evaluate(
    limits: &SubscriptionLimits,
    usage: &UsageCounter,
    proposed_seconds: u64,
) -> QuotaDecision {
    let Some(documents_per_month) = limits.documents_per_month else {
        if proposed_seconds > limits.max_video_duration_seconds {
            return QuotaDecision::Denied(QuotaDenial::DurationCeiling {
                proposed_seconds,
                ceiling_seconds: limits.max_video_duration_seconds,
            });
        }
        return QuotaDecision::Allowed;
    };

    if usage
        .total_video_duration_seconds
        .saturating_add(proposed_seconds)
        > limits.max_video_duration_seconds
    {
        return QuotaDecision::Denied(QuotaDenial::DurationLimit {
            used_seconds: usage.total_video_duration_seconds,
            proposed_seconds,
            limit_seconds: limits.max_video_duration_seconds,
        });
    }

    if usage.documents_processed >= documents_per_month {
        return QuotaDecision::Denied(QuotaDenial::DocumentLimit {
            used: usage.documents_processed,
            limit: documents_per_month,
        });
    }

    QuotaDecision::Allowed
}

/// Errors reading the inputs of a quota decision
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Usage lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error("Tier lookup failed: {0}")]
    Billing(#[from] BillingError),
}

/// Read-only quota gate. Makes no reservation: two concurrent submissions can
/// both pass and jointly overshoot the limit by one document.
#[derive(Clone)]
pub struct QuotaEvaluator {
    store: Arc<dyn DocumentStore>,
    billing: Arc<dyn BillingProvider>,
}

impl QuotaEvaluator {
    pub fn new(store: Arc<dyn DocumentStore>, billing: Arc<dyn BillingProvider>) -> Self {
        Self { store, billing }
    }

    pub async fn can_process(
        &self,
        user_id: &str,
        proposed_seconds: u64,
    ) -> Result<QuotaDecision, QuotaError> {
        self.can_process_at(user_id, proposed_seconds, Utc::now()).await
    }

    pub async fn can_process_at(
        &self,
        user_id: &str,
        proposed_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<QuotaDecision, QuotaError> {
        let tier = self.billing.tier_for(user_id).await?;
        let usage = self
            .store
            .usage(user_id, &UsagePeriod::containing(now))
            .await?;

        let decision = evaluate(&tier.limits(), &usage, proposed_seconds);
        tracing::debug!(
            user_id,
            %tier,
            documents_processed = usage.documents_processed,
            total_seconds = usage.total_video_duration_seconds,
            proposed_seconds,
            allowed = decision.is_allowed(),
            "Quota evaluated"
        );
        Ok(decision)
    }
}
