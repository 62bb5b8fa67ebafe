//! Persistence ports and the in-memory store
//!
//! The ledger talks to storage through three narrow traits injected at
//! construction. `compare_and_swap_balance` is the only balance mutation
//! primitive: the caller supplies the balance it read and the write fails
//! when another writer got there first, so concurrent debits can never both
//! pass a sufficiency check and land.
//!
//! `MemoryStore` implements all three ports over `tokio::sync::RwLock` maps
//! and backs the test suites and the demo binary.

use crate::{
    error::{Error, Result},
    types::{Account, PaymentMethod, Transaction, UserId},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Account persistence port
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch an account
    async fn get_account(&self, user: &UserId) -> Result<Account>;

    /// Create an account; fails if the user already has one
    async fn create_account(&self, account: Account) -> Result<()>;

    /// Atomically set the balance to `new` iff it still equals `expected`.
    ///
    /// Returns `false` (without writing) when the stored balance has
    /// drifted from `expected`.
    async fn compare_and_swap_balance(
        &self,
        user: &UserId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool>;
}

/// Transaction persistence port (append plus status updates, never deletes)
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Append a transaction record
    async fn insert_transaction(&self, tx: Transaction) -> Result<()>;

    /// Fetch a transaction
    async fn get_transaction(&self, id: Uuid) -> Result<Transaction>;

    /// Overwrite a transaction record (status/settlement fields)
    async fn update_transaction(&self, tx: Transaction) -> Result<()>;

    /// All transactions for a user, oldest first
    async fn transactions_for_user(&self, user: &UserId) -> Result<Vec<Transaction>>;
}

/// Payment method persistence port
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    /// Fetch a payment method
    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod>;

    /// Register a payment method
    async fn create_payment_method(&self, method: PaymentMethod) -> Result<()>;

    /// Mark a method verified/unverified
    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<()>;

    /// Stamp the last successful use
    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
}

/// In-memory implementation of all three ports
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<UserId, Account>>,
    transactions: RwLock<HashMap<Uuid, Transaction>>,
    payment_methods: RwLock<HashMap<Uuid, PaymentMethod>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, user: &UserId) -> Result<Account> {
        self.accounts
            .read()
            .await
            .get(user)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(user.to_string()))
    }

    async fn create_account(&self, account: Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.user_id) {
            return Err(Error::Store(format!(
                "account already exists: {}",
                account.user_id
            )));
        }
        accounts.insert(account.user_id.clone(), account);
        Ok(())
    }

    async fn compare_and_swap_balance(
        &self,
        user: &UserId,
        expected: Decimal,
        new: Decimal,
    ) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(user)
            .ok_or_else(|| Error::AccountNotFound(user.to_string()))?;

        if account.balance != expected {
            return Ok(false);
        }
        account.balance = new;
        account.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(Error::Store(format!("duplicate transaction id: {}", tx.id)));
        }
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Transaction> {
        self.transactions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    async fn update_transaction(&self, tx: Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if !transactions.contains_key(&tx.id) {
            return Err(Error::TransactionNotFound(tx.id.to_string()));
        }
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn transactions_for_user(&self, user: &UserId) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut out: Vec<Transaction> = transactions
            .values()
            .filter(|tx| &tx.user_id == user)
            .cloned()
            .collect();
        // UUIDv7 ids are time-ordered
        out.sort_by_key(|tx| tx.id);
        Ok(out)
    }
}

#[async_trait]
impl PaymentMethodStore for MemoryStore {
    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod> {
        self.payment_methods
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::PaymentMethodNotFound(id.to_string()))
    }

    async fn create_payment_method(&self, method: PaymentMethod) -> Result<()> {
        let mut methods = self.payment_methods.write().await;
        if methods.contains_key(&method.id) {
            return Err(Error::Store(format!(
                "payment method already exists: {}",
                method.id
            )));
        }
        methods.insert(method.id, method);
        Ok(())
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<()> {
        let mut methods = self.payment_methods.write().await;
        let method = methods
            .get_mut(&id)
            .ok_or_else(|| Error::PaymentMethodNotFound(id.to_string()))?;
        method.verified = verified;
        Ok(())
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let mut methods = self.payment_methods.write().await;
        let method = methods
            .get_mut(&id)
            .ok_or_else(|| Error::PaymentMethodNotFound(id.to_string()))?;
        method.last_used_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_account_roundtrip() {
        let store = MemoryStore::new();
        let user = UserId::new("alice");

        store
            .create_account(Account::new(user.clone(), dec!(100.00)))
            .await
            .unwrap();

        let account = store.get_account(&user).await.unwrap();
        assert_eq!(account.balance, dec!(100.00));

        // Duplicate creation rejected
        let dup = store
            .create_account(Account::new(user.clone(), dec!(0)))
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_expected() {
        let store = MemoryStore::new();
        let user = UserId::new("bob");
        store
            .create_account(Account::new(user.clone(), dec!(50.00)))
            .await
            .unwrap();

        // Fresh read swaps
        let ok = store
            .compare_and_swap_balance(&user, dec!(50.00), dec!(40.00))
            .await
            .unwrap();
        assert!(ok);

        // Stale read does not
        let stale = store
            .compare_and_swap_balance(&user, dec!(50.00), dec!(30.00))
            .await
            .unwrap();
        assert!(!stale);
        assert_eq!(store.get_account(&user).await.unwrap().balance, dec!(40.00));
    }

    #[tokio::test]
    async fn test_payment_method_verify_and_touch() {
        let store = MemoryStore::new();
        let user = UserId::new("carol");
        let method = PaymentMethod::new(user, "Visa ···4242");
        let id = method.id;

        store.create_payment_method(method).await.unwrap();
        assert!(!store.get_payment_method(id).await.unwrap().verified);

        store.set_verified(id, true).await.unwrap();
        store.touch_last_used(id, Utc::now()).await.unwrap();

        let method = store.get_payment_method(id).await.unwrap();
        assert!(method.verified);
        assert!(method.last_used_at.is_some());
    }
}
