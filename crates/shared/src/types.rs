//! Common types used across Atelier

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Subscription plan for billing
///
/// Current lineup: Free (40 credits) → Pro (700) → Studio (2000).
/// Starter, Professional and Enterprise are legacy plans kept so that
/// grandfathered subscriptions keep resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Studio,
    Starter,
    Professional,
    Enterprise,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

impl Plan {
    /// Monthly credit allotment for this plan
    pub fn monthly_credits(&self) -> i32 {
        match self {
            Self::Free => 40,
            Self::Starter => 200, // Legacy plan
            Self::Pro => 700,
            Self::Professional => 700, // Legacy plan - same as Pro
            Self::Studio => 2_000,
            Self::Enterprise => 5_000, // Legacy plan
        }
    }

    /// Maximum credit-pack refills per billing cycle
    pub fn max_refills_per_month(&self) -> i32 {
        match self {
            Self::Free => 0,
            Self::Starter => 1,
            Self::Pro | Self::Professional => 3,
            Self::Studio | Self::Enterprise => 10,
        }
    }

    /// Whether this plan can be purchased through checkout
    /// Legacy plans resolve from existing subscriptions but are not sold
    pub fn is_purchasable(&self) -> bool {
        matches!(self, Self::Pro | Self::Studio)
    }

    /// Whether this is a paid plan (anything but Free)
    pub fn is_paid(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Studio => write!(f, "studio"),
            Self::Starter => write!(f, "starter"),
            Self::Professional => write!(f, "professional"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "studio" => Ok(Self::Studio),
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(format!("Invalid subscription plan: {}", s)),
        }
    }
}

/// Billing cycle for paid subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    #[default]
    Monthly,
    Yearly,
}

impl BillingCycle {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" | "month" => Some(Self::Monthly),
            "yearly" | "year" | "annual" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Free,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Trialing,
    Incomplete,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Free
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Active => write!(f, "active"),
            Self::PastDue => write!(f, "past_due"),
            Self::Canceled => write!(f, "canceled"),
            Self::Unpaid => write!(f, "unpaid"),
            Self::Trialing => write!(f, "trialing"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Kind of credit transaction in the append-only ledger log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Usage,
    Grant,
    Purchase,
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Grant => "grant",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
        }
    }

    /// Whether this type increases the balance
    pub fn is_credit(&self) -> bool {
        !matches!(self, Self::Usage)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "usage" => Ok(Self::Usage),
            "grant" => Ok(Self::Grant),
            "purchase" => Ok(Self::Purchase),
            "refund" => Ok(Self::Refund),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// User credit record (one per user)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserCredits {
    pub user_id: Uuid,
    pub monthly_credits: i32,
    pub extra_credits: i32,
    pub credit_balance: i32,
    pub credits_used: i64,
    pub subscription_plan: String,
    pub billing_cycle: Option<String>,
    pub subscription_status: String,
    pub subscription_ends_at: Option<OffsetDateTime>,
    pub refills_this_month: i32,
    pub stripe_customer_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserCredits {
    /// Parse the stored plan column, defaulting to Free on unknown values
    pub fn plan(&self) -> Plan {
        self.subscription_plan.parse().unwrap_or_default()
    }
}

/// Credit transaction log entry (immutable once written)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i32,
    pub transaction_type: String,
    pub description: Option<String>,
    pub balance_after: i32,
    pub created_at: OffsetDateTime,
}

/// Ledger balance snapshot returned by the credit procedures
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub monthly_credits: i32,
    pub extra_credits: i32,
    pub credit_balance: i32,
    pub refills_this_month: i32,
}

/// Result of reconciling a user's subscription against the billing provider,
/// merged with the live ledger fields. This is the wire shape the UI consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub subscribed: bool,
    pub plan: Plan,
    pub billing_cycle: Option<BillingCycle>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_end: Option<OffsetDateTime>,
    pub monthly_credits: i32,
    pub extra_credits: i32,
    pub credit_balance: i32,
    pub refills_this_month: i32,
}

impl SubscriptionSummary {
    /// Free-tier summary with the given ledger fields
    pub fn free(snapshot: BalanceSnapshot) -> Self {
        Self {
            subscribed: false,
            plan: Plan::Free,
            billing_cycle: None,
            subscription_end: None,
            monthly_credits: snapshot.monthly_credits,
            extra_credits: snapshot.extra_credits,
            credit_balance: snapshot.credit_balance,
            refills_this_month: snapshot.refills_this_month,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_default() {
        assert_eq!(Plan::default(), Plan::Free);
    }

    #[test]
    fn test_plan_monthly_credits() {
        assert_eq!(Plan::Free.monthly_credits(), 40);
        assert_eq!(Plan::Starter.monthly_credits(), 200); // Legacy
        assert_eq!(Plan::Pro.monthly_credits(), 700);
        assert_eq!(Plan::Professional.monthly_credits(), 700); // Legacy
        assert_eq!(Plan::Studio.monthly_credits(), 2_000);
        assert_eq!(Plan::Enterprise.monthly_credits(), 5_000); // Legacy
    }

    #[test]
    fn test_plan_refill_caps() {
        assert_eq!(Plan::Free.max_refills_per_month(), 0);
        assert_eq!(Plan::Starter.max_refills_per_month(), 1);
        assert_eq!(Plan::Pro.max_refills_per_month(), 3);
        assert_eq!(Plan::Studio.max_refills_per_month(), 10);
    }

    #[test]
    fn test_plan_purchasable() {
        assert!(Plan::Pro.is_purchasable());
        assert!(Plan::Studio.is_purchasable());
        assert!(!Plan::Free.is_purchasable());
        assert!(!Plan::Starter.is_purchasable());
        assert!(!Plan::Professional.is_purchasable());
        assert!(!Plan::Enterprise.is_purchasable());
    }

    #[test]
    fn test_plan_display_and_parse() {
        assert_eq!(format!("{}", Plan::Pro), "pro");
        assert_eq!(format!("{}", Plan::Studio), "studio");
        assert_eq!("pro".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!("STUDIO".parse::<Plan>().unwrap(), Plan::Studio);
        assert_eq!("Professional".parse::<Plan>().unwrap(), Plan::Professional);
        assert!("platinum".parse::<Plan>().is_err());
    }

    #[test]
    fn test_billing_cycle_from_str() {
        assert_eq!(BillingCycle::from_str("monthly"), Some(BillingCycle::Monthly));
        assert_eq!(BillingCycle::from_str("month"), Some(BillingCycle::Monthly));
        assert_eq!(BillingCycle::from_str("yearly"), Some(BillingCycle::Yearly));
        assert_eq!(BillingCycle::from_str("annual"), Some(BillingCycle::Yearly));
        assert_eq!(BillingCycle::from_str("weekly"), None);
    }

    #[test]
    fn test_transaction_type_direction() {
        assert!(!TransactionType::Usage.is_credit());
        assert!(TransactionType::Grant.is_credit());
        assert!(TransactionType::Purchase.is_credit());
        assert!(TransactionType::Refund.is_credit());
    }

    #[test]
    fn test_transaction_type_roundtrip() {
        for t in [
            TransactionType::Usage,
            TransactionType::Grant,
            TransactionType::Purchase,
            TransactionType::Refund,
        ] {
            assert_eq!(t.as_str().parse::<TransactionType>().unwrap(), t);
        }
        assert!("chargeback".parse::<TransactionType>().is_err());
    }

    #[test]
    fn test_user_credits_plan_fallback() {
        let record = UserCredits {
            user_id: Uuid::new_v4(),
            monthly_credits: 40,
            extra_credits: 0,
            credit_balance: 40,
            credits_used: 0,
            subscription_plan: "not-a-plan".to_string(),
            billing_cycle: None,
            subscription_status: "free".to_string(),
            subscription_ends_at: None,
            refills_this_month: 0,
            stripe_customer_id: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(record.plan(), Plan::Free);
    }

    #[test]
    fn test_balance_snapshot_serializes_camel_case() {
        let snapshot = BalanceSnapshot {
            monthly_credits: 700,
            extra_credits: 100,
            credit_balance: 650,
            refills_this_month: 1,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["monthlyCredits"], 700);
        assert_eq!(json["extraCredits"], 100);
        assert_eq!(json["creditBalance"], 650);
        assert_eq!(json["refillsThisMonth"], 1);
    }
}
