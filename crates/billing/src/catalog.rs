//! Plan catalog
//!
//! Compiled-in mapping from Stripe price IDs to plan metadata, plus the
//! credit packs sold through the refill flow. The table must be kept in
//! lockstep with the prices configured in the Stripe dashboard.

use atelier_shared::{BillingCycle, Plan};

/// Catalog entry for a paid plan price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanPrice {
    pub price_id: &'static str,
    pub plan: Plan,
    pub cycle: BillingCycle,
}

/// All recognized subscription prices, legacy plans included.
/// An active subscription on a price id missing from this table does NOT
/// fail reconciliation; it degrades to [`DEFAULT_PAID_PLAN`] so that a
/// dashboard-side misconfiguration never locks out already-paid access.
pub const PLAN_PRICES: &[PlanPrice] = &[
    PlanPrice {
        price_id: "price_1QhTacCkXHLcUKyq7vPnBz4M",
        plan: Plan::Pro,
        cycle: BillingCycle::Monthly,
    },
    PlanPrice {
        price_id: "price_1QhTb8CkXHLcUKyqR2mEwD1f",
        plan: Plan::Pro,
        cycle: BillingCycle::Yearly,
    },
    PlanPrice {
        price_id: "price_1QhTbxCkXHLcUKyqLk5vWu9T",
        plan: Plan::Studio,
        cycle: BillingCycle::Monthly,
    },
    PlanPrice {
        price_id: "price_1QhTcNCkXHLcUKyqXb3qAo2H",
        plan: Plan::Studio,
        cycle: BillingCycle::Yearly,
    },
    // Legacy prices, no longer sold but still resolving for grandfathered
    // subscriptions
    PlanPrice {
        price_id: "price_1P2jQlCkXHLcUKyqTfHs0w6d",
        plan: Plan::Starter,
        cycle: BillingCycle::Monthly,
    },
    PlanPrice {
        price_id: "price_1P2jRYCkXHLcUKyqVn8cJq3x",
        plan: Plan::Professional,
        cycle: BillingCycle::Monthly,
    },
    PlanPrice {
        price_id: "price_1P2jSGCkXHLcUKyqBw4pDm7r",
        plan: Plan::Enterprise,
        cycle: BillingCycle::Monthly,
    },
];

/// Plan assumed when an active subscription carries an unrecognized price id
pub const DEFAULT_PAID_PLAN: Plan = Plan::Pro;

/// Resolve a price id to its catalog entry
pub fn resolve_price(price_id: &str) -> Option<&'static PlanPrice> {
    PLAN_PRICES.iter().find(|p| p.price_id == price_id)
}

/// Price id for a plan/cycle combination (purchasable plans only)
pub fn price_for(plan: Plan, cycle: BillingCycle) -> Option<&'static str> {
    if !plan.is_purchasable() {
        return None;
    }
    PLAN_PRICES
        .iter()
        .find(|p| p.plan == plan && p.cycle == cycle)
        .map(|p| p.price_id)
}

/// A purchasable credit pack (refill)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditPack {
    pub id: &'static str,
    pub credits: i32,
    pub amount_cents: i64,
    pub label: &'static str,
}

/// Credit packs sold via payment-mode checkout
pub const CREDIT_PACKS: &[CreditPack] = &[
    CreditPack {
        id: "small",
        credits: 100,
        amount_cents: 900,
        label: "100 credits",
    },
    CreditPack {
        id: "medium",
        credits: 500,
        amount_cents: 3_900,
        label: "500 credits",
    },
    CreditPack {
        id: "large",
        credits: 1_500,
        amount_cents: 9_900,
        label: "1,500 credits",
    },
];

/// Look up a credit pack by id
pub fn find_pack(pack_id: &str) -> Option<&'static CreditPack> {
    CREDIT_PACKS.iter().find(|p| p.id == pack_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_prices() {
        let pro_monthly = resolve_price("price_1QhTacCkXHLcUKyq7vPnBz4M").unwrap();
        assert_eq!(pro_monthly.plan, Plan::Pro);
        assert_eq!(pro_monthly.cycle, BillingCycle::Monthly);

        let studio_yearly = resolve_price("price_1QhTcNCkXHLcUKyqXb3qAo2H").unwrap();
        assert_eq!(studio_yearly.plan, Plan::Studio);
        assert_eq!(studio_yearly.cycle, BillingCycle::Yearly);
    }

    #[test]
    fn test_resolve_legacy_prices() {
        let starter = resolve_price("price_1P2jQlCkXHLcUKyqTfHs0w6d").unwrap();
        assert_eq!(starter.plan, Plan::Starter);
        assert!(!starter.plan.is_purchasable());
    }

    #[test]
    fn test_unknown_price_resolves_to_none() {
        assert!(resolve_price("price_000unknown").is_none());
    }

    #[test]
    fn test_price_for_purchasable_plans_only() {
        assert!(price_for(Plan::Pro, BillingCycle::Monthly).is_some());
        assert!(price_for(Plan::Pro, BillingCycle::Yearly).is_some());
        assert!(price_for(Plan::Studio, BillingCycle::Monthly).is_some());
        // Legacy plans have catalog entries but are not sold
        assert!(price_for(Plan::Enterprise, BillingCycle::Monthly).is_none());
        assert!(price_for(Plan::Starter, BillingCycle::Monthly).is_none());
        assert!(price_for(Plan::Free, BillingCycle::Monthly).is_none());
    }

    #[test]
    fn test_catalog_price_ids_are_unique() {
        for (i, a) in PLAN_PRICES.iter().enumerate() {
            for b in &PLAN_PRICES[i + 1..] {
                assert_ne!(a.price_id, b.price_id);
            }
        }
    }

    #[test]
    fn test_find_pack() {
        let medium = find_pack("medium").unwrap();
        assert_eq!(medium.credits, 500);
        assert_eq!(medium.amount_cents, 3_900);
        assert!(find_pack("jumbo").is_none());
    }
}
