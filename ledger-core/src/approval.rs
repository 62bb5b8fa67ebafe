//! Admin settlement workflow for pending deposits and withdrawals
//!
//! [`ApprovalWorkflow::decide`] drives the transaction status machine.
//! Completion re-reads the *live* balance rather than trusting the values
//! captured at creation: a deposit credits whatever the balance is now, and
//! a withdrawal re-validates sufficiency because the balance may have
//! drifted while the request sat in the queue. A withdrawal that no longer
//! covers its amount flips to `Failed` with a recorded reason instead of
//! completing.
//!
//! Every outcome notifies the transaction's owner; delivery never affects
//! the decision result.

use crate::{
    config::LedgerConfig,
    error::{Error, Result},
    metrics::Metrics,
    notify::{Notification, NotificationKind, NotificationPriority, Notifier},
    store::{AccountStore, PaymentMethodStore, TransactionStore},
    types::{Transaction, TransactionKind, TransactionStatus, UserId},
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Admin-facing settlement service
pub struct ApprovalWorkflow {
    /// Account port
    accounts: Arc<dyn AccountStore>,

    /// Transaction port
    transactions: Arc<dyn TransactionStore>,

    /// Payment method port
    payment_methods: Arc<dyn PaymentMethodStore>,

    /// Notification collaborator
    notifier: Arc<dyn Notifier>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: LedgerConfig,
}

impl ApprovalWorkflow {
    /// Create a workflow over the given ports
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        payment_methods: Arc<dyn PaymentMethodStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
        config: LedgerConfig,
    ) -> Self {
        Self {
            accounts,
            transactions,
            payment_methods,
            notifier,
            metrics,
            config,
        }
    }

    /// Move a pending deposit/withdrawal through the status machine.
    ///
    /// The acting account must hold an admin role. `actual_amount` records
    /// a fee-adjusted net: completion moves that amount and books the
    /// difference against `amount` as a fee.
    pub async fn decide(
        &self,
        tx_id: Uuid,
        next: TransactionStatus,
        admin: &UserId,
        reason: Option<String>,
        actual_amount: Option<Decimal>,
    ) -> Result<Transaction> {
        let admin_account = self.accounts.get_account(admin).await?;
        if !admin_account.role.is_admin() {
            return Err(Error::AuthorizationDenied(format!(
                "{} may not settle transactions",
                admin
            )));
        }

        let tx = self.transactions.get_transaction(tx_id).await?;

        if !matches!(
            tx.kind,
            TransactionKind::Deposit | TransactionKind::Withdrawal
        ) {
            return Err(Error::Validation(format!(
                "{:?} transactions do not settle through approval",
                tx.kind
            )));
        }

        if !tx.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: tx.status,
                to: next,
            });
        }

        if let Some(actual) = actual_amount {
            if actual <= Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "actual amount must be positive, got {}",
                    actual
                )));
            }
            if actual > tx.amount {
                return Err(Error::Validation(format!(
                    "actual amount {} exceeds requested {}",
                    actual, tx.amount
                )));
            }
        }

        tracing::info!(
            tx_id = %tx.id,
            admin = %admin,
            from = ?tx.status,
            to = ?next,
            "settlement decision"
        );

        match next {
            TransactionStatus::Processing => self.mark_processing(tx, admin).await,
            TransactionStatus::Completed => match tx.kind {
                TransactionKind::Deposit => {
                    self.complete_deposit(tx, admin, actual_amount).await
                }
                TransactionKind::Withdrawal => {
                    self.complete_withdrawal(tx, admin, actual_amount).await
                }
                _ => unreachable!("kind checked above"),
            },
            TransactionStatus::Failed | TransactionStatus::Cancelled => {
                self.mark_terminal(tx, next, admin, reason).await
            }
            TransactionStatus::Pending => Err(Error::InvalidTransition {
                from: tx.status,
                to: next,
            }),
        }
    }

    async fn mark_processing(
        &self,
        mut tx: Transaction,
        admin: &UserId,
    ) -> Result<Transaction> {
        tx.status = TransactionStatus::Processing;
        tx.reviewed_by = Some(admin.clone());
        self.transactions.update_transaction(tx.clone()).await?;

        self.notifier
            .notify(
                Notification::new(
                    tx.user_id.clone(),
                    NotificationKind::TransactionUpdate,
                    "Request in review",
                    format!("Your {:?} of {} is being processed", tx.kind, tx.amount),
                    NotificationPriority::Low,
                )
                .with_action_ref(tx.id.to_string()),
            )
            .await;

        Ok(tx)
    }

    async fn complete_deposit(
        &self,
        mut tx: Transaction,
        admin: &UserId,
        actual_amount: Option<Decimal>,
    ) -> Result<Transaction> {
        let effective = actual_amount.unwrap_or(tx.amount);

        let (before, after) = self
            .apply_balance_delta(&tx.user_id, effective)
            .await?;

        let now = Utc::now();
        tx.status = TransactionStatus::Completed;
        tx.balance_before = before;
        tx.balance_after = after;
        tx.actual_amount = actual_amount;
        tx.fee = actual_amount
            .map(|a| tx.amount - a)
            .filter(|f| !f.is_zero());
        tx.reviewed_by = Some(admin.clone());
        tx.completed_at = Some(now);
        self.transactions.update_transaction(tx.clone()).await?;

        if let Some(method_id) = tx.payment_method_id {
            // First completed deposit vouches for the method
            let prior_completed = self
                .transactions
                .transactions_for_user(&tx.user_id)
                .await?
                .iter()
                .filter(|t| {
                    t.id != tx.id
                        && t.kind == TransactionKind::Deposit
                        && t.status == TransactionStatus::Completed
                })
                .count();
            if prior_completed == 0 {
                self.payment_methods.set_verified(method_id, true).await?;
                tracing::info!(method = %method_id, user = %tx.user_id, "payment method auto-verified");
            }
            self.payment_methods.touch_last_used(method_id, now).await?;
        }

        self.metrics
            .record_completed(effective.to_f64().unwrap_or(0.0));

        self.notifier
            .notify(
                Notification::new(
                    tx.user_id.clone(),
                    NotificationKind::TransactionUpdate,
                    "Deposit completed",
                    format!("{} is now available", effective),
                    NotificationPriority::High,
                )
                .with_action_ref(tx.id.to_string()),
            )
            .await;

        Ok(tx)
    }

    async fn complete_withdrawal(
        &self,
        mut tx: Transaction,
        admin: &UserId,
        actual_amount: Option<Decimal>,
    ) -> Result<Transaction> {
        let effective = actual_amount.unwrap_or(tx.amount);
        let now = Utc::now();

        let mut attempts = 0u32;
        let (before, after) = loop {
            let account = self.accounts.get_account(&tx.user_id).await?;
            let before = account.balance;

            if before < effective {
                // Balance drifted below the requested amount since the
                // pending pre-check; fail instead of overdrawing.
                tx.status = TransactionStatus::Failed;
                tx.failure_reason = Some(format!(
                    "insufficient funds at settlement: available {}, required {}",
                    before, effective
                ));
                tx.reviewed_by = Some(admin.clone());
                tx.completed_at = Some(now);
                self.transactions.update_transaction(tx.clone()).await?;
                self.metrics.record_failed();

                tracing::warn!(
                    tx_id = %tx.id,
                    user = %tx.user_id,
                    available = %before,
                    required = %effective,
                    "withdrawal failed at settlement"
                );

                self.notifier
                    .notify(
                        Notification::new(
                            tx.user_id.clone(),
                            NotificationKind::TransactionUpdate,
                            "Withdrawal failed",
                            tx.failure_reason.clone().unwrap_or_default(),
                            NotificationPriority::High,
                        )
                        .with_action_ref(tx.id.to_string()),
                    )
                    .await;

                return Ok(tx);
            }

            let after = before - effective;
            if self
                .accounts
                .compare_and_swap_balance(&tx.user_id, before, after)
                .await?
            {
                break (before, after);
            }

            attempts += 1;
            if attempts >= self.config.balance_retry_limit {
                return Err(Error::Conflict(format!(
                    "balance update for {} lost {} races",
                    tx.user_id, attempts
                )));
            }
        };

        tx.status = TransactionStatus::Completed;
        tx.balance_before = before;
        tx.balance_after = after;
        tx.actual_amount = actual_amount;
        tx.fee = actual_amount
            .map(|a| tx.amount - a)
            .filter(|f| !f.is_zero());
        tx.reviewed_by = Some(admin.clone());
        tx.completed_at = Some(now);
        self.transactions.update_transaction(tx.clone()).await?;

        if let Some(method_id) = tx.payment_method_id {
            self.payment_methods.touch_last_used(method_id, now).await?;
        }

        self.metrics
            .record_completed(effective.to_f64().unwrap_or(0.0));

        self.notifier
            .notify(
                Notification::new(
                    tx.user_id.clone(),
                    NotificationKind::TransactionUpdate,
                    "Withdrawal completed",
                    format!("{} is on its way", effective),
                    NotificationPriority::High,
                )
                .with_action_ref(tx.id.to_string()),
            )
            .await;

        Ok(tx)
    }

    async fn mark_terminal(
        &self,
        mut tx: Transaction,
        next: TransactionStatus,
        admin: &UserId,
        reason: Option<String>,
    ) -> Result<Transaction> {
        tx.status = next;
        tx.failure_reason = reason;
        tx.reviewed_by = Some(admin.clone());
        tx.completed_at = Some(Utc::now());
        self.transactions.update_transaction(tx.clone()).await?;

        if next == TransactionStatus::Failed {
            self.metrics.record_failed();
        }

        let title = match next {
            TransactionStatus::Failed => "Request rejected",
            _ => "Request cancelled",
        };
        self.notifier
            .notify(
                Notification::new(
                    tx.user_id.clone(),
                    NotificationKind::TransactionUpdate,
                    title,
                    tx.failure_reason.clone().unwrap_or_default(),
                    NotificationPriority::Normal,
                )
                .with_action_ref(tx.id.to_string()),
            )
            .await;

        Ok(tx)
    }

    /// Credit `delta` onto the live balance with bounded CAS retries
    async fn apply_balance_delta(
        &self,
        user: &UserId,
        delta: Decimal,
    ) -> Result<(Decimal, Decimal)> {
        let mut attempts = 0u32;
        loop {
            let account = self.accounts.get_account(user).await?;
            let before = account.balance;
            let after = before + delta;

            if self
                .accounts
                .compare_and_swap_balance(user, before, after)
                .await?
            {
                return Ok((before, after));
            }

            attempts += 1;
            if attempts >= self.config.balance_retry_limit {
                return Err(Error::Conflict(format!(
                    "balance update for {} lost {} races",
                    user, attempts
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryStore;
    use crate::types::{Account, NewTransaction, PaymentMethod};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        notifier: Arc<MemoryNotifier>,
        ledger: Ledger,
        workflow: ApprovalWorkflow,
        admin: UserId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let ledger = Ledger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Metrics::default(),
            LedgerConfig::default(),
        );
        let workflow = ApprovalWorkflow::new(
            store.clone(),
            store.clone(),
            store.clone(),
            notifier.clone(),
            Metrics::default(),
            LedgerConfig::default(),
        );
        let admin = UserId::new("admin");
        store
            .create_account(Account::admin(admin.clone()))
            .await
            .unwrap();
        Fixture {
            store,
            notifier,
            ledger,
            workflow,
            admin,
        }
    }

    async fn seed_user(fx: &Fixture, name: &str, balance: Decimal) -> (UserId, Uuid) {
        let user = UserId::new(name);
        fx.store
            .create_account(Account::new(user.clone(), balance))
            .await
            .unwrap();
        let method = PaymentMethod::new(user.clone(), "Visa ···4242");
        let method_id = method.id;
        fx.store.create_payment_method(method).await.unwrap();
        (user, method_id)
    }

    #[tokio::test]
    async fn test_non_admin_denied() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "alice", dec!(0.00)).await;
        let tx = fx.ledger.create_deposit(&user, dec!(25.00), method_id).await.unwrap();

        let result = fx
            .workflow
            .decide(tx.id, TransactionStatus::Completed, &user, None, None)
            .await;
        assert!(matches!(result, Err(Error::AuthorizationDenied(_))));
    }

    #[tokio::test]
    async fn test_deposit_completion_credits_live_balance() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "bob", dec!(0.00)).await;
        let tx = fx.ledger.create_deposit(&user, dec!(25.00), method_id).await.unwrap();

        // Balance drifts between request and approval
        fx.store
            .compare_and_swap_balance(&user, dec!(0.00), dec!(40.00))
            .await
            .unwrap();

        let settled = fx
            .workflow
            .decide(tx.id, TransactionStatus::Completed, &fx.admin, None, None)
            .await
            .unwrap();

        assert_eq!(settled.status, TransactionStatus::Completed);
        assert_eq!(settled.balance_before, dec!(40.00));
        assert_eq!(settled.balance_after, dec!(65.00));
        assert_eq!(fx.ledger.balance_of(&user).await.unwrap(), dec!(65.00));
    }

    #[tokio::test]
    async fn test_first_deposit_auto_verifies_method() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "carol", dec!(0.00)).await;
        assert!(!fx.store.get_payment_method(method_id).await.unwrap().verified);

        let tx = fx.ledger.create_deposit(&user, dec!(10.00), method_id).await.unwrap();
        fx.workflow
            .decide(tx.id, TransactionStatus::Completed, &fx.admin, None, None)
            .await
            .unwrap();

        let method = fx.store.get_payment_method(method_id).await.unwrap();
        assert!(method.verified);
        assert!(method.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_withdrawal_fee_adjusted_actual_amount() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "dave", dec!(100.00)).await;
        fx.store.set_verified(method_id, true).await.unwrap();

        let tx = fx.ledger.create_withdrawal(&user, dec!(50.00), method_id).await.unwrap();
        let settled = fx
            .workflow
            .decide(
                tx.id,
                TransactionStatus::Completed,
                &fx.admin,
                None,
                Some(dec!(48.00)),
            )
            .await
            .unwrap();

        // Debited using the net 48; the $2 difference is booked as fee
        assert_eq!(settled.status, TransactionStatus::Completed);
        assert_eq!(settled.actual_amount, Some(dec!(48.00)));
        assert_eq!(settled.fee, Some(dec!(2.00)));
        assert_eq!(fx.ledger.balance_of(&user).await.unwrap(), dec!(52.00));
    }

    #[tokio::test]
    async fn test_withdrawal_flips_to_failed_on_drift() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "erin", dec!(60.00)).await;
        fx.store.set_verified(method_id, true).await.unwrap();

        let tx = fx.ledger.create_withdrawal(&user, dec!(50.00), method_id).await.unwrap();

        // Spend most of the balance while the request is pending
        fx.store
            .compare_and_swap_balance(&user, dec!(60.00), dec!(20.00))
            .await
            .unwrap();

        let settled = fx
            .workflow
            .decide(tx.id, TransactionStatus::Completed, &fx.admin, None, None)
            .await
            .unwrap();

        assert_eq!(settled.status, TransactionStatus::Failed);
        assert!(settled
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("insufficient funds"));
        // Nothing moved
        assert_eq!(fx.ledger.balance_of(&user).await.unwrap(), dec!(20.00));

        let notes = fx.notifier.sent_to(&user).await;
        assert!(notes.iter().any(|n| n.title == "Withdrawal failed"));
    }

    #[tokio::test]
    async fn test_terminal_states_cannot_move() {
        let fx = fixture().await;
        let (user, method_id) = seed_user(&fx, "frank", dec!(0.00)).await;
        let tx = fx.ledger.create_deposit(&user, dec!(25.00), method_id).await.unwrap();

        fx.workflow
            .decide(
                tx.id,
                TransactionStatus::Cancelled,
                &fx.admin,
                Some("user asked".to_string()),
                None,
            )
            .await
            .unwrap();

        let again = fx
            .workflow
            .decide(tx.id, TransactionStatus::Completed, &fx.admin, None, None)
            .await;
        assert!(matches!(again, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_settlement_restricted_to_deposits_and_withdrawals() {
        let fx = fixture().await;
        let (user, _) = seed_user(&fx, "grace", dec!(100.00)).await;
        let tx = fx
            .ledger
            .create_transaction(NewTransaction::completed(
                user,
                TransactionKind::BetPlaced,
                dec!(10.00),
                "stake",
            ))
            .await
            .unwrap();

        let result = fx
            .workflow
            .decide(tx.id, TransactionStatus::Completed, &fx.admin, None, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
