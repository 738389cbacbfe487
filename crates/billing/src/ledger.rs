//! Credit ledger procedures
//!
//! The two balance mutations (`deduct`, `add`) are the only code paths
//! allowed to touch `credit_balance`. Each runs as a single database
//! transaction that updates the balance and appends one row to the
//! append-only `credit_transactions` log, so the log can be replayed as an
//! audit trail independent of the live balance column.

use sqlx::PgPool;
use uuid::Uuid;

use atelier_shared::{BalanceSnapshot, CreditTransaction, TransactionType};

use crate::error::{BillingError, BillingResult};

/// Row shape returned by the balance-mutating statements
type SnapshotRow = (i32, i32, i32, i32);

fn snapshot_from(row: SnapshotRow) -> BalanceSnapshot {
    BalanceSnapshot {
        monthly_credits: row.0,
        extra_credits: row.1,
        credit_balance: row.2,
        refills_this_month: row.3,
    }
}

/// Atomic credit ledger over the `user_credits` table
#[derive(Clone)]
pub struct CreditLedger {
    pool: PgPool,
}

impl CreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Deduct credits for usage
    ///
    /// Fails with `InsufficientCredits` when `amount > credit_balance` and
    /// leaves both the balance and the transaction log untouched. The
    /// conditional UPDATE makes concurrent deductions for the same user
    /// safe: the WHERE clause re-checks the balance under the row lock, so
    /// two simultaneous requests can never both drain the same credits.
    pub async fn deduct(
        &self,
        user_id: Uuid,
        amount: i32,
        description: Option<&str>,
    ) -> BillingResult<BalanceSnapshot> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "deduction must be positive, got {}",
                amount
            )));
        }

        let mut tx = self.pool.begin().await?;

        let updated: Option<SnapshotRow> = sqlx::query_as(
            r#"
            UPDATE user_credits
            SET credit_balance = credit_balance - $2,
                credits_used = credits_used + $2,
                updated_at = NOW()
            WHERE user_id = $1 AND credit_balance >= $2
            RETURNING monthly_credits, extra_credits, credit_balance, refills_this_month
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;

        let snapshot = match updated {
            Some(row) => snapshot_from(row),
            None => {
                // Transaction drops without commit; nothing was applied
                let existing: Option<(i32,)> =
                    sqlx::query_as("SELECT credit_balance FROM user_credits WHERE user_id = $1")
                        .bind(user_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return match existing {
                    Some((available,)) => Err(BillingError::InsufficientCredits {
                        required: amount,
                        available,
                    }),
                    None => Err(BillingError::UnknownUser(user_id)),
                };
            }
        };

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, amount, transaction_type, description, balance_after)
            VALUES ($1, $2, 'usage', $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(-amount)
        .bind(description)
        .bind(snapshot.credit_balance)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            amount = amount,
            balance = snapshot.credit_balance,
            "Deducted credits"
        );

        Ok(snapshot)
    }

    /// Add credits (grant, purchase, or refund)
    ///
    /// Creates the credit record with free-tier defaults if the user has
    /// none yet. `purchase` also raises `extra_credits`; `grant` raises
    /// `monthly_credits` when the granted allotment exceeds it.
    pub async fn add(
        &self,
        user_id: Uuid,
        amount: i32,
        transaction_type: TransactionType,
        description: Option<&str>,
    ) -> BillingResult<BalanceSnapshot> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "credit amount must be positive, got {}",
                amount
            )));
        }
        if transaction_type == TransactionType::Usage {
            return Err(BillingError::InvalidAmount(
                "usage entries are written by deduct, not add".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO user_credits (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let row: SnapshotRow = match transaction_type {
            TransactionType::Purchase => {
                sqlx::query_as(
                    r#"
                    UPDATE user_credits
                    SET credit_balance = credit_balance + $2,
                        extra_credits = extra_credits + $2,
                        updated_at = NOW()
                    WHERE user_id = $1
                    RETURNING monthly_credits, extra_credits, credit_balance, refills_this_month
                    "#,
                )
                .bind(user_id)
                .bind(amount)
                .fetch_one(&mut *tx)
                .await?
            }
            TransactionType::Grant => {
                sqlx::query_as(
                    r#"
                    UPDATE user_credits
                    SET credit_balance = credit_balance + $2,
                        monthly_credits = GREATEST(monthly_credits, $2),
                        updated_at = NOW()
                    WHERE user_id = $1
                    RETURNING monthly_credits, extra_credits, credit_balance, refills_this_month
                    "#,
                )
                .bind(user_id)
                .bind(amount)
                .fetch_one(&mut *tx)
                .await?
            }
            // Usage is rejected above; anything else only moves the balance
            _ => {
                sqlx::query_as(
                    r#"
                    UPDATE user_credits
                    SET credit_balance = credit_balance + $2,
                        updated_at = NOW()
                    WHERE user_id = $1
                    RETURNING monthly_credits, extra_credits, credit_balance, refills_this_month
                    "#,
                )
                .bind(user_id)
                .bind(amount)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        let snapshot = snapshot_from(row);

        sqlx::query(
            r#"
            INSERT INTO credit_transactions (user_id, amount, transaction_type, description, balance_after)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(transaction_type.as_str())
        .bind(description)
        .bind(snapshot.credit_balance)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            amount = amount,
            transaction_type = %transaction_type,
            balance = snapshot.credit_balance,
            "Added credits"
        );

        Ok(snapshot)
    }

    /// Current balance snapshot, creating the record with free defaults on
    /// first access
    pub async fn balance(&self, user_id: Uuid) -> BillingResult<BalanceSnapshot> {
        self.ensure_record(user_id).await?;

        let row: SnapshotRow = sqlx::query_as(
            r#"
            SELECT monthly_credits, extra_credits, credit_balance, refills_this_month
            FROM user_credits
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(snapshot_from(row))
    }

    /// Recent ledger transactions, newest first
    pub async fn transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<CreditTransaction>> {
        let rows: Vec<CreditTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, amount, transaction_type, description, balance_after, created_at
            FROM credit_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Create the credit record with free-tier defaults if missing
    pub async fn ensure_record(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query("INSERT INTO user_credits (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count a completed refill purchase against this cycle's cap
    pub async fn record_refill(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE user_credits SET refills_this_month = refills_this_month + 1, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset the per-cycle refill counter (invoked on billing-cycle renewal)
    pub async fn reset_cycle(&self, user_id: Uuid) -> BillingResult<()> {
        sqlx::query(
            "UPDATE user_credits SET refills_this_month = 0, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
