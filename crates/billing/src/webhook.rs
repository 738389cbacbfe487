//! Stripe webhook verification and application
//!
//! Signature verification is done by hand (HMAC-SHA256 over the raw body,
//! `Stripe-Signature: t=...,v1=...`) because async-stripe's event parsing is
//! pinned to a Stripe API version we don't run. Events are read as raw JSON
//! for the same reason; unhandled types are acknowledged and ignored.
//!
//! This is where checkout metadata is finally consumed: the ledger moves
//! here, never in the checkout initiators or the reconciler.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use atelier_shared::{BillingCycle, Plan, TransactionType};

use crate::error::{BillingError, BillingResult};
use crate::ledger::CreditLedger;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed webhook, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verify a `Stripe-Signature` header against the raw request body
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => {
                if let Ok(sig) = hex::decode(value) {
                    signatures.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    if signatures.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid);
    }
    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::WebhookSignatureInvalid)?;
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let expected = mac.finalize().into_bytes();

    let valid = signatures
        .iter()
        .any(|sig| sig.as_slice().ct_eq(expected.as_slice()).into());

    if valid {
        Ok(())
    } else {
        Err(BillingError::WebhookSignatureInvalid)
    }
}

/// A credit-pack purchase carried in checkout session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackPurchase {
    pub user_id: Uuid,
    pub pack_id: String,
    pub credits: i32,
}

/// A plan subscription carried in checkout session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanActivation {
    pub user_id: Uuid,
    pub plan: Plan,
    pub billing_cycle: BillingCycle,
    pub monthly_credits: i32,
}

/// Parse pack-purchase metadata from a checkout session object
pub fn parse_pack_purchase(metadata: &Value) -> Option<PackPurchase> {
    let user_id = metadata.get("user_id")?.as_str()?.parse().ok()?;
    let pack_id = metadata.get("pack_id")?.as_str()?.to_string();
    let credits = metadata.get("credits")?.as_str()?.parse().ok()?;
    Some(PackPurchase {
        user_id,
        pack_id,
        credits,
    })
}

/// Parse plan-activation metadata from a checkout session object
pub fn parse_plan_activation(metadata: &Value) -> Option<PlanActivation> {
    let user_id = metadata.get("user_id")?.as_str()?.parse().ok()?;
    let plan: Plan = metadata.get("plan")?.as_str()?.parse().ok()?;
    let billing_cycle = BillingCycle::from_str(metadata.get("billing_cycle")?.as_str()?)?;
    let monthly_credits = metadata.get("monthly_credits")?.as_str()?.parse().ok()?;
    Some(PlanActivation {
        user_id,
        plan,
        billing_cycle,
        monthly_credits,
    })
}

/// Webhook application service
pub struct WebhookService {
    ledger: CreditLedger,
    pool: PgPool,
}

impl WebhookService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: CreditLedger::new(pool.clone()),
            pool,
        }
    }

    /// Apply a verified webhook payload
    pub async fn handle_event(&self, payload: &str) -> BillingResult<()> {
        let event: Value = serde_json::from_str(payload)
            .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))?;

        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BillingError::WebhookPayloadInvalid("missing event type".to_string()))?;
        let object = event
            .pointer("/data/object")
            .ok_or_else(|| BillingError::WebhookPayloadInvalid("missing data.object".to_string()))?;

        match event_type {
            "checkout.session.completed" => self.handle_checkout_completed(object).await,
            "invoice.paid" => self.handle_invoice_paid(object).await,
            other => {
                tracing::debug!(event_type = %other, "Ignoring unhandled webhook event");
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, session: &Value) -> BillingResult<()> {
        let null = Value::Null;
        let metadata = session.get("metadata").unwrap_or(&null);

        if let Some(purchase) = parse_pack_purchase(metadata) {
            let snapshot = self
                .ledger
                .add(
                    purchase.user_id,
                    purchase.credits,
                    TransactionType::Purchase,
                    Some(&format!("Credit pack: {}", purchase.pack_id)),
                )
                .await?;
            self.ledger.record_refill(purchase.user_id).await?;

            tracing::info!(
                user_id = %purchase.user_id,
                pack_id = %purchase.pack_id,
                credits = purchase.credits,
                balance = snapshot.credit_balance,
                "Applied credit pack purchase"
            );
            return Ok(());
        }

        if let Some(activation) = parse_plan_activation(metadata) {
            sqlx::query(
                r#"
                UPDATE user_credits
                SET subscription_plan = $2,
                    billing_cycle = $3,
                    subscription_status = 'active',
                    updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(activation.user_id)
            .bind(activation.plan.to_string())
            .bind(activation.billing_cycle.as_str())
            .execute(&self.pool)
            .await?;

            self.ledger
                .add(
                    activation.user_id,
                    activation.monthly_credits,
                    TransactionType::Grant,
                    Some(&format!("Plan activation: {}", activation.plan)),
                )
                .await?;

            tracing::info!(
                user_id = %activation.user_id,
                plan = %activation.plan,
                "Applied plan activation"
            );
            return Ok(());
        }

        tracing::warn!("checkout.session.completed without recognizable metadata");
        Ok(())
    }

    /// Cycle renewal: re-grant the plan allotment and reset the refill
    /// counter. Initial invoices are skipped; the activation grant already
    /// ran on `checkout.session.completed`.
    async fn handle_invoice_paid(&self, invoice: &Value) -> BillingResult<()> {
        let billing_reason = invoice
            .get("billing_reason")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if billing_reason != "subscription_cycle" {
            tracing::debug!(billing_reason = %billing_reason, "Skipping non-renewal invoice");
            return Ok(());
        }

        let customer_id = invoice
            .get("customer")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BillingError::WebhookPayloadInvalid("invoice without customer".to_string())
            })?;

        let record: Option<(Uuid, String)> = sqlx::query_as(
            "SELECT user_id, subscription_plan FROM user_credits WHERE stripe_customer_id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        let (user_id, plan) = match record {
            Some((user_id, plan)) => (user_id, plan.parse::<Plan>().unwrap_or_default()),
            None => {
                tracing::warn!(customer_id = %customer_id, "Renewal invoice for unknown customer");
                return Ok(());
            }
        };

        self.ledger.reset_cycle(user_id).await?;
        self.ledger
            .add(
                user_id,
                plan.monthly_credits(),
                TransactionType::Grant,
                Some(&format!("Monthly renewal: {}", plan)),
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            "Applied cycle renewal"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, sig)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"type":"invoice.paid"}"#;
        let header = sign(payload, "whsec_test", 1_700_000_000);
        assert!(verify_signature(payload, &header, "whsec_test", 1_700_000_000).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign(r#"{"amount":1}"#, "whsec_test", 1_700_000_000);
        let result = verify_signature(r#"{"amount":9999}"#, &header, "whsec_test", 1_700_000_000);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = r#"{"type":"invoice.paid"}"#;
        let header = sign(payload, "whsec_other", 1_700_000_000);
        let result = verify_signature(payload, &header, "whsec_test", 1_700_000_000);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = r#"{"type":"invoice.paid"}"#;
        let header = sign(payload, "whsec_test", 1_700_000_000);
        let result = verify_signature(
            payload,
            &header,
            "whsec_test",
            1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1,
        );
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_malformed_header_rejected() {
        let result = verify_signature("{}", "v1=deadbeef", "whsec_test", 0);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
        let result = verify_signature("{}", "t=12345", "whsec_test", 12345);
        assert!(matches!(result, Err(BillingError::WebhookSignatureInvalid)));
    }

    #[test]
    fn test_parse_pack_purchase_metadata() {
        let user_id = Uuid::new_v4();
        let metadata = json!({
            "user_id": user_id.to_string(),
            "pack_id": "medium",
            "credits": "500",
        });
        let purchase = parse_pack_purchase(&metadata).unwrap();
        assert_eq!(purchase.user_id, user_id);
        assert_eq!(purchase.pack_id, "medium");
        assert_eq!(purchase.credits, 500);
    }

    #[test]
    fn test_parse_plan_activation_metadata() {
        let user_id = Uuid::new_v4();
        let metadata = json!({
            "user_id": user_id.to_string(),
            "plan": "studio",
            "billing_cycle": "yearly",
            "monthly_credits": "2000",
        });
        let activation = parse_plan_activation(&metadata).unwrap();
        assert_eq!(activation.plan, Plan::Studio);
        assert_eq!(activation.billing_cycle, BillingCycle::Yearly);
        assert_eq!(activation.monthly_credits, 2000);
    }

    #[test]
    fn test_metadata_parsers_reject_incomplete_metadata() {
        let metadata = json!({ "user_id": Uuid::new_v4().to_string() });
        assert!(parse_pack_purchase(&metadata).is_none());
        assert!(parse_plan_activation(&metadata).is_none());
        // A pack purchase is not a plan activation and vice versa
        let pack = json!({
            "user_id": Uuid::new_v4().to_string(),
            "pack_id": "small",
            "credits": "100",
        });
        assert!(parse_plan_activation(&pack).is_none());
    }
}
