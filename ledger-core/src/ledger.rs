//! Ledger service
//!
//! Every balance change in the platform passes through [`Ledger`]: it writes
//! the audit-trail transaction and applies the balance effect as one atomic
//! compare-and-swap against the balance it read, retried a bounded number of
//! times under contention. Two debits can therefore never both consume the
//! same funds, and `balance_after - balance_before` always equals the signed
//! effective amount for completed transactions.
//!
//! Deposits and withdrawals are created `Pending` and settle through
//! [`crate::ApprovalWorkflow`].

use crate::{
    config::LedgerConfig,
    error::{Error, Result},
    metrics::Metrics,
    store::{AccountStore, PaymentMethodStore, TransactionStore},
    types::{
        Direction, NewTransaction, Transaction, TransactionKind, TransactionStatus, UserId,
    },
};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Balance and audit-log service
pub struct Ledger {
    /// Account port
    accounts: Arc<dyn AccountStore>,

    /// Transaction port
    transactions: Arc<dyn TransactionStore>,

    /// Payment method port
    payment_methods: Arc<dyn PaymentMethodStore>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: LedgerConfig,
}

impl Ledger {
    /// Create a ledger over the given ports
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        transactions: Arc<dyn TransactionStore>,
        payment_methods: Arc<dyn PaymentMethodStore>,
        metrics: Metrics,
        config: LedgerConfig,
    ) -> Self {
        Self {
            accounts,
            transactions,
            payment_methods,
            metrics,
            config,
        }
    }

    /// Record a transaction and, when created `Completed`, apply its
    /// balance effect.
    ///
    /// A debit that would take the balance negative fails with
    /// [`Error::InsufficientFunds`] before anything is written. Contention
    /// on the balance retries up to the configured budget, then surfaces
    /// [`Error::Conflict`].
    pub async fn create_transaction(&self, new: NewTransaction) -> Result<Transaction> {
        if new.amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "amount must be positive, got {}",
                new.amount
            )));
        }

        let direction = new.kind.direction();
        let apply_now = new.status == TransactionStatus::Completed;
        let mut attempts = 0u32;

        let (balance_before, balance_after) = loop {
            let account = self.accounts.get_account(&new.user_id).await?;
            let before = account.balance;
            let after = match direction {
                Direction::Credit => before + new.amount,
                Direction::Debit => before - new.amount,
            };

            if direction == Direction::Debit && after < Decimal::ZERO {
                return Err(Error::InsufficientFunds {
                    available: before,
                    required: new.amount,
                });
            }

            if !apply_now {
                // Pending transactions record the prospective values only;
                // the live balance is re-read at settlement.
                break (before, after);
            }

            if self
                .accounts
                .compare_and_swap_balance(&new.user_id, before, after)
                .await?
            {
                break (before, after);
            }

            attempts += 1;
            if attempts >= self.config.balance_retry_limit {
                return Err(Error::Conflict(format!(
                    "balance update for {} lost {} races",
                    new.user_id, attempts
                )));
            }
        };

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            kind: new.kind,
            status: new.status,
            amount: new.amount,
            balance_before,
            balance_after,
            actual_amount: None,
            fee: None,
            related_id: new.related_id,
            payment_method_id: new.payment_method_id,
            description: new.description,
            failure_reason: None,
            reviewed_by: None,
            created_at: now,
            completed_at: apply_now.then_some(now),
        };

        self.transactions.insert_transaction(tx.clone()).await?;

        self.metrics.record_created();
        if apply_now {
            self.metrics
                .record_completed(tx.amount.to_f64().unwrap_or(0.0));
        }

        tracing::info!(
            tx_id = %tx.id,
            user = %tx.user_id,
            kind = ?tx.kind,
            status = ?tx.status,
            amount = %tx.amount,
            balance_after = %tx.balance_after,
            "transaction recorded"
        );

        Ok(tx)
    }

    /// Create a `Pending` deposit awaiting admin settlement
    pub async fn create_deposit(
        &self,
        user: &UserId,
        amount: Decimal,
        payment_method_id: Uuid,
    ) -> Result<Transaction> {
        if amount < self.config.min_deposit {
            return Err(Error::Validation(format!(
                "deposit {} below minimum {}",
                amount, self.config.min_deposit
            )));
        }

        // Account must exist before funds can be attributed to it
        self.accounts.get_account(user).await?;

        let method = self.payment_methods.get_payment_method(payment_method_id).await?;
        if &method.user_id != user {
            return Err(Error::Validation(format!(
                "payment method {} does not belong to {}",
                payment_method_id, user
            )));
        }

        self.create_transaction(
            NewTransaction::pending(
                user.clone(),
                TransactionKind::Deposit,
                amount,
                format!("Deposit via {}", method.label),
            )
            .with_payment_method(payment_method_id),
        )
        .await
    }

    /// Create a `Pending` withdrawal awaiting admin settlement
    ///
    /// Requires a verified payment method and a balance sufficient at
    /// request time. The balance is re-validated at settlement since it may
    /// drift while the request sits in the queue.
    pub async fn create_withdrawal(
        &self,
        user: &UserId,
        amount: Decimal,
        payment_method_id: Uuid,
    ) -> Result<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "withdrawal must be positive, got {}",
                amount
            )));
        }
        if amount > self.config.max_withdrawal {
            return Err(Error::Validation(format!(
                "withdrawal {} above maximum {}",
                amount, self.config.max_withdrawal
            )));
        }

        let method = self.payment_methods.get_payment_method(payment_method_id).await?;
        if &method.user_id != user {
            return Err(Error::Validation(format!(
                "payment method {} does not belong to {}",
                payment_method_id, user
            )));
        }
        if !method.verified {
            return Err(Error::Validation(format!(
                "payment method {} is not verified",
                payment_method_id
            )));
        }

        let account = self.accounts.get_account(user).await?;
        if account.balance < amount {
            return Err(Error::InsufficientFunds {
                available: account.balance,
                required: amount,
            });
        }

        self.create_transaction(
            NewTransaction::pending(
                user.clone(),
                TransactionKind::Withdrawal,
                amount,
                format!("Withdrawal to {}", method.label),
            )
            .with_payment_method(payment_method_id),
        )
        .await
    }

    /// Apply a manual admin credit or debit, recorded against the admin
    pub async fn admin_adjustment(
        &self,
        user: &UserId,
        kind: TransactionKind,
        amount: Decimal,
        admin: &UserId,
        reason: impl Into<String>,
    ) -> Result<Transaction> {
        if !matches!(
            kind,
            TransactionKind::AdminCredit | TransactionKind::AdminDebit
        ) {
            return Err(Error::Validation(format!(
                "admin adjustment cannot use kind {:?}",
                kind
            )));
        }

        let admin_account = self.accounts.get_account(admin).await?;
        if !admin_account.role.is_admin() {
            return Err(Error::AuthorizationDenied(format!(
                "{} is not an admin",
                admin
            )));
        }

        let mut tx = self
            .create_transaction(NewTransaction::completed(
                user.clone(),
                kind,
                amount,
                reason.into(),
            ))
            .await?;

        tx.reviewed_by = Some(admin.clone());
        self.transactions.update_transaction(tx.clone()).await?;
        Ok(tx)
    }

    /// Current balance of an account
    pub async fn balance_of(&self, user: &UserId) -> Result<Decimal> {
        Ok(self.accounts.get_account(user).await?.balance)
    }

    /// Fetch a transaction
    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction> {
        self.transactions.get_transaction(id).await
    }

    /// All transactions for a user, oldest first
    pub async fn transactions_for_user(&self, user: &UserId) -> Result<Vec<Transaction>> {
        self.transactions.transactions_for_user(user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{Account, PaymentMethod};
    use rust_decimal_macros::dec;

    fn test_ledger(store: Arc<MemoryStore>) -> Ledger {
        Ledger::new(
            store.clone(),
            store.clone(),
            store,
            Metrics::default(),
            LedgerConfig::default(),
        )
    }

    async fn seed_account(store: &MemoryStore, user: &str, balance: Decimal) -> UserId {
        let user = UserId::new(user);
        store
            .create_account(Account::new(user.clone(), balance))
            .await
            .unwrap();
        user
    }

    #[tokio::test]
    async fn test_completed_debit_applies_balance() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "alice", dec!(100.00)).await;

        let tx = ledger
            .create_transaction(NewTransaction::completed(
                user.clone(),
                TransactionKind::BetPlaced,
                dec!(30.00),
                "stake",
            ))
            .await
            .unwrap();

        assert_eq!(tx.balance_before, dec!(100.00));
        assert_eq!(tx.balance_after, dec!(70.00));
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(70.00));
        assert!(tx.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_overdebit_rejected_without_write() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "bob", dec!(5.00)).await;

        let result = ledger
            .create_transaction(NewTransaction::completed(
                user.clone(),
                TransactionKind::SquaresPurchase,
                dec!(10.00),
                "one square",
            ))
            .await;

        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(5.00));
        assert!(ledger.transactions_for_user(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_deposit_has_no_balance_effect() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "carol", dec!(0.00)).await;

        let method = PaymentMethod::new(user.clone(), "Visa ···4242");
        let method_id = method.id;
        store.create_payment_method(method).await.unwrap();

        let tx = ledger
            .create_deposit(&user, dec!(25.00), method_id)
            .await
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(0.00));
    }

    #[tokio::test]
    async fn test_withdrawal_requires_verified_method() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "dave", dec!(100.00)).await;

        let method = PaymentMethod::new(user.clone(), "Checking ···9001");
        let method_id = method.id;
        store.create_payment_method(method).await.unwrap();

        let unverified = ledger.create_withdrawal(&user, dec!(50.00), method_id).await;
        assert!(matches!(unverified, Err(Error::Validation(_))));

        store.set_verified(method_id, true).await.unwrap();
        let tx = ledger
            .create_withdrawal(&user, dec!(50.00), method_id)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        // Pre-check only; nothing moved yet
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(100.00));
    }

    #[tokio::test]
    async fn test_withdrawal_precheck_insufficient() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "erin", dec!(10.00)).await;

        let mut method = PaymentMethod::new(user.clone(), "Visa ···1111");
        method.verified = true;
        let method_id = method.id;
        store.create_payment_method(method).await.unwrap();

        let result = ledger.create_withdrawal(&user, dec!(50.00), method_id).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    }

    #[tokio::test]
    async fn test_admin_adjustment_gated_by_role() {
        let store = Arc::new(MemoryStore::new());
        let ledger = test_ledger(store.clone());
        let user = seed_account(&store, "frank", dec!(10.00)).await;
        let peer = seed_account(&store, "grace", dec!(10.00)).await;
        let admin = UserId::new("admin");
        store
            .create_account(Account::admin(admin.clone()))
            .await
            .unwrap();

        let denied = ledger
            .admin_adjustment(
                &user,
                TransactionKind::AdminCredit,
                dec!(5.00),
                &peer,
                "goodwill",
            )
            .await;
        assert!(matches!(denied, Err(Error::AuthorizationDenied(_))));

        let tx = ledger
            .admin_adjustment(
                &user,
                TransactionKind::AdminCredit,
                dec!(5.00),
                &admin,
                "goodwill",
            )
            .await
            .unwrap();
        assert_eq!(tx.reviewed_by.as_ref(), Some(&admin));
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(15.00));
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(test_ledger(store.clone()));
        let user = seed_account(&store, "heidi", dec!(50.00)).await;

        // Ten concurrent $10 debits against $50: exactly five may land.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_transaction(NewTransaction::completed(
                        user,
                        TransactionKind::BetPlaced,
                        dec!(10.00),
                        "stake",
                    ))
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(ledger.balance_of(&user).await.unwrap(), dec!(0.00));
    }
}
