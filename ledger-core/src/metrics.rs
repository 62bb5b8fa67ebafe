//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_transactions_created_total` - Transactions appended to the log
//! - `ledger_transactions_completed_total` - Transactions settled with a balance effect
//! - `ledger_transactions_failed_total` - Transactions that ended in FAILED
//! - `ledger_volume_total` - Absolute monetary volume applied to balances

use prometheus::{Counter, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions appended
    pub transactions_created: IntCounter,

    /// Transactions settled
    pub transactions_completed: IntCounter,

    /// Transactions failed
    pub transactions_failed: IntCounter,

    /// Monetary volume applied
    pub volume: Counter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create a collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_created = IntCounter::with_opts(Opts::new(
            "ledger_transactions_created_total",
            "Transactions appended to the log",
        ))?;
        registry.register(Box::new(transactions_created.clone()))?;

        let transactions_completed = IntCounter::with_opts(Opts::new(
            "ledger_transactions_completed_total",
            "Transactions settled with a balance effect",
        ))?;
        registry.register(Box::new(transactions_completed.clone()))?;

        let transactions_failed = IntCounter::with_opts(Opts::new(
            "ledger_transactions_failed_total",
            "Transactions that ended in FAILED",
        ))?;
        registry.register(Box::new(transactions_failed.clone()))?;

        let volume = Counter::with_opts(Opts::new(
            "ledger_volume_total",
            "Absolute monetary volume applied to balances",
        ))?;
        registry.register(Box::new(volume.clone()))?;

        Ok(Self {
            transactions_created,
            transactions_completed,
            transactions_failed,
            volume,
            registry,
        })
    }

    /// Record a transaction append
    pub fn record_created(&self) {
        self.transactions_created.inc();
    }

    /// Record a settled transaction and the volume it moved
    pub fn record_completed(&self, amount: f64) {
        self.transactions_completed.inc();
        self.volume.inc_by(amount.abs());
    }

    /// Record a failed transaction
    pub fn record_failed(&self) {
        self.transactions_failed.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("metrics registry construction cannot fail")
    }
}
