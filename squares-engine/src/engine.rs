//! Squares game engine
//!
//! Owns the game lifecycle and delegates every balance effect to the
//! ledger, so the audit trail stays single-sourced. The purchase path is a
//! small saga: purchase rows are inserted first (each one an atomic
//! insert-if-vacant), then the buyer is debited once for the whole batch;
//! a failed debit deletes the rows again.
//!
//! Pot and sold counts are re-derived from the purchase rows on every
//! update rather than incremented in place, so the "pot equals the sum of
//! purchases" invariant holds structurally.

use crate::{
    config::SquaresConfig,
    error::{Error, Result},
    resolver,
    store::GameStore,
    types::{
        GameInvitation, GameStatus, InvitationStatus, NewGame, Period, Square, SquaresGame,
        SquaresPayout, SquaresPurchase, TOTAL_SQUARES,
    },
};
use chrono::Utc;
use ledger_core::{
    Ledger, NewTransaction, Notification, NotificationKind, NotificationPriority, Notifier,
    Transaction, TransactionKind, UserId,
};
use rand::seq::SliceRandom;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Result of a successful purchase
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    /// The purchase rows written
    pub purchases: Vec<SquaresPurchase>,

    /// The consolidated debit
    pub transaction: Transaction,

    /// The game after the purchase
    pub game: SquaresGame,
}

/// Game lifecycle service
pub struct SquaresEngine {
    /// Game persistence port
    store: Arc<dyn GameStore>,

    /// Balance service; the only writer of money
    ledger: Arc<Ledger>,

    /// Notification collaborator
    notifier: Arc<dyn Notifier>,

    /// Configuration
    config: SquaresConfig,
}

impl SquaresEngine {
    /// Create an engine over the given collaborators
    pub fn new(
        store: Arc<dyn GameStore>,
        ledger: Arc<Ledger>,
        notifier: Arc<dyn Notifier>,
        config: SquaresConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            config,
        }
    }

    /// Create a game in `Setup`
    ///
    /// Rejects a payout structure whose fractions do not sum to 1.0 within
    /// the configured tolerance. Callers arm the grid-lock deadline with
    /// [`SquaresEngine::spawn_lock_scheduler`].
    pub async fn create_game(&self, new: NewGame) -> Result<SquaresGame> {
        if new.price_per_square <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "price per square must be positive, got {}",
                new.price_per_square
            )));
        }
        if !new.payout_structure.is_valid(self.config.payout_tolerance) {
            return Err(Error::Validation(format!(
                "payout fractions must sum to 1.0 ± {}, got {}",
                self.config.payout_tolerance,
                new.payout_structure.total()
            )));
        }

        let game = SquaresGame {
            id: Uuid::new_v4(),
            title: new.title,
            price_per_square: new.price_per_square,
            total_pot: Decimal::ZERO,
            squares_sold: 0,
            payout_structure: new.payout_structure,
            status: GameStatus::Setup,
            numbers_assigned: false,
            row_numbers: None,
            col_numbers: None,
            starts_at: new.starts_at,
            cancel_reason: None,
            created_at: Utc::now(),
        };

        self.store.insert_game(game.clone()).await?;
        tracing::info!(game_id = %game.id, title = %game.title, "game created");
        Ok(game)
    }

    /// Open a `Setup` game for purchases
    pub async fn open_game(&self, game_id: Uuid) -> Result<SquaresGame> {
        let mut game = self.store.get_game(game_id).await?;
        if game.status != GameStatus::Setup {
            return Err(Error::InvalidTransition {
                from: game.status,
                to: GameStatus::Active,
            });
        }
        game.status = GameStatus::Active;
        self.store.update_game(game.clone()).await?;
        Ok(game)
    }

    /// Buy a batch of squares for one buyer
    ///
    /// The whole batch settles as one debit. Any unavailable cell fails
    /// the entire request; rows inserted for this request are removed
    /// again, as they are when the debit itself fails.
    pub async fn purchase_squares(
        &self,
        game_id: Uuid,
        buyer: &UserId,
        owner_name: &str,
        picks: &[Square],
    ) -> Result<PurchaseReceipt> {
        if picks.is_empty() {
            return Err(Error::Validation("no squares selected".to_string()));
        }
        let mut seen = HashSet::new();
        for pick in picks {
            if !pick.in_bounds() {
                return Err(Error::Validation(format!(
                    "square ({},{}) is off the board",
                    pick.row, pick.col
                )));
            }
            if !seen.insert((pick.row, pick.col)) {
                return Err(Error::Validation(format!(
                    "square ({},{}) selected twice",
                    pick.row, pick.col
                )));
            }
        }

        let game = self.store.get_game(game_id).await?;
        if !game.status.accepts_purchases() {
            return Err(Error::GameClosed {
                status: game.status,
                reason: "purchases are closed".to_string(),
            });
        }

        let total_cost = game.price_per_square * Decimal::from(picks.len() as u64);

        // Pre-check so an obviously underfunded request never writes rows.
        // The debit below re-checks atomically.
        let balance = self.ledger.balance_of(buyer).await?;
        if balance < total_cost {
            return Err(ledger_core::Error::InsufficientFunds {
                available: balance,
                required: total_cost,
            }
            .into());
        }

        let now = Utc::now();
        let mut inserted: Vec<SquaresPurchase> = Vec::with_capacity(picks.len());
        for pick in picks {
            let purchase = SquaresPurchase {
                id: Uuid::now_v7(),
                game_id,
                user_id: buyer.clone(),
                owner_name: owner_name.to_string(),
                square: *pick,
                amount: game.price_per_square,
                created_at: now,
            };
            if !self.store.insert_purchase_if_vacant(purchase.clone()).await? {
                self.compensate_purchases(&inserted).await;
                return Err(Error::SquareTaken(*pick));
            }
            inserted.push(purchase);
        }

        // One consolidated debit for the whole batch
        let debit = NewTransaction::completed(
            buyer.clone(),
            TransactionKind::SquaresPurchase,
            total_cost,
            format!("{} square(s) in {}", picks.len(), game.title),
        )
        .with_related(game_id);

        let transaction = match self.ledger.create_transaction(debit).await {
            Ok(tx) => tx,
            Err(e) => {
                // Saga compensation: the rows must not outlive the debit
                self.compensate_purchases(&inserted).await;
                tracing::warn!(
                    game_id = %game_id,
                    buyer = %buyer,
                    error = %e,
                    "purchase debit failed, rows compensated"
                );
                return Err(e.into());
            }
        };

        let mut game = self.refresh_game_totals(game).await?;

        if let Some(mut invitation) = self.store.pending_invitation(game_id, buyer).await? {
            invitation.status = InvitationStatus::Accepted;
            self.store.update_invitation(invitation).await?;
        }

        tracing::info!(
            game_id = %game_id,
            buyer = %buyer,
            squares = picks.len(),
            total_cost = %total_cost,
            pot = %game.total_pot,
            "squares purchased"
        );

        if game.squares_sold >= TOTAL_SQUARES {
            game = self.lock_grid(game_id).await?;
        }

        Ok(PurchaseReceipt {
            purchases: inserted,
            transaction,
            game,
        })
    }

    /// Assign numbers and lock the grid
    ///
    /// Idempotent: a game whose numbers are already assigned is returned
    /// unchanged and nobody is re-notified.
    pub async fn lock_grid(&self, game_id: Uuid) -> Result<SquaresGame> {
        let mut game = self.store.get_game(game_id).await?;

        if game.numbers_assigned {
            return Ok(game);
        }
        if game.status.is_terminal() {
            return Err(Error::GameClosed {
                status: game.status,
                reason: "cannot lock".to_string(),
            });
        }

        game.row_numbers = Some(random_permutation());
        game.col_numbers = Some(random_permutation());
        game.numbers_assigned = true;
        game.status = GameStatus::Locked;
        self.store.update_game(game.clone()).await?;

        tracing::info!(
            game_id = %game_id,
            rows = ?game.row_numbers,
            cols = ?game.col_numbers,
            "grid locked"
        );

        // Notify each distinct buyer once
        let purchases = self.store.purchases_for_game(game_id).await?;
        let buyers: BTreeSet<UserId> = purchases.iter().map(|p| p.user_id.clone()).collect();
        for buyer in buyers {
            self.notifier
                .notify(
                    Notification::new(
                        buyer,
                        NotificationKind::GameUpdate,
                        "Grid locked",
                        format!("Numbers are in for {}", game.title),
                        NotificationPriority::Normal,
                    )
                    .with_action_ref(game_id.to_string()),
                )
                .await;
        }

        Ok(game)
    }

    /// Settle one period against a score pair
    ///
    /// Idempotent per `(game, period)`: once a payout exists further calls
    /// return `None`. An unassigned grid or an unowned winning cell also
    /// yields `None`; that share of the pot stays with the house.
    pub async fn process_period_scores(
        &self,
        game_id: Uuid,
        period: Period,
        home_score: u32,
        away_score: u32,
    ) -> Result<Option<SquaresPayout>> {
        let game = self.store.get_game(game_id).await?;
        if game.status == GameStatus::Cancelled {
            return Err(Error::GameClosed {
                status: game.status,
                reason: "cannot settle a cancelled game".to_string(),
            });
        }

        if self.store.payout_for_period(game_id, period).await?.is_some() {
            tracing::debug!(game_id = %game_id, period = ?period, "period already settled");
            return Ok(None);
        }

        if !game.numbers_assigned {
            tracing::warn!(game_id = %game_id, period = ?period, "scores before grid lock; no payout");
            return Ok(None);
        }

        let purchases = self.store.purchases_for_game(game_id).await?;
        let winner = resolver::resolve_winner(&game, &purchases, home_score, away_score).cloned();

        let settled = match winner {
            None => {
                tracing::info!(
                    game_id = %game_id,
                    period = ?period,
                    home = home_score,
                    away = away_score,
                    "winning cell unowned; pot share stays with the house"
                );
                None
            }
            Some(winner) => {
                let gross = game.total_pot * game.payout_structure.fraction_for(period);
                let fee = gross * self.config.platform_fee_rate;
                let net = (gross - fee)
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

                let payout = SquaresPayout {
                    id: Uuid::now_v7(),
                    game_id,
                    period,
                    purchase_id: winner.id,
                    user_id: winner.user_id.clone(),
                    amount: net,
                    home_score,
                    away_score,
                    created_at: Utc::now(),
                };

                // The conditional insert is the idempotency authority; a
                // concurrent settle of the same period loses here.
                if !self.store.insert_payout_if_absent(payout.clone()).await? {
                    return Ok(None);
                }

                let credit = NewTransaction::completed(
                    winner.user_id.clone(),
                    TransactionKind::SquaresPayout,
                    net,
                    format!("{:?} period win in {}", period, game.title),
                )
                .with_related(payout.id);

                if let Err(e) = self.ledger.create_transaction(credit).await {
                    // Release the period so settlement can be retried
                    self.store.delete_payout(payout.id).await?;
                    return Err(e.into());
                }

                tracing::info!(
                    game_id = %game_id,
                    period = ?period,
                    winner = %winner.user_id,
                    net = %net,
                    "period settled"
                );

                self.notifier
                    .notify(
                        Notification::new(
                            winner.user_id.clone(),
                            NotificationKind::Payout,
                            "You won!",
                            format!("{} landed for the {:?} period of {}", net, period, game.title),
                            NotificationPriority::High,
                        )
                        .with_action_ref(game_id.to_string()),
                    )
                    .await;

                Some(payout)
            }
        };

        self.advance_after_period(game, period).await?;
        Ok(settled)
    }

    /// Cancel a game and refund every buyer
    ///
    /// Each buyer's spend across all their squares aggregates into one
    /// refund transaction. Already-refunded buyers are skipped, so a
    /// partially-failed cancellation can be retried safely.
    pub async fn cancel_game(
        &self,
        game_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<SquaresGame> {
        let mut game = self.store.get_game(game_id).await?;
        if game.status.is_terminal() {
            return Err(Error::InvalidTransition {
                from: game.status,
                to: GameStatus::Cancelled,
            });
        }
        let reason = reason.into();

        let purchases = self.store.purchases_for_game(game_id).await?;
        let mut totals: BTreeMap<UserId, Decimal> = BTreeMap::new();
        for purchase in &purchases {
            *totals.entry(purchase.user_id.clone()).or_default() += purchase.amount;
        }

        for (buyer, total) in &totals {
            let already_refunded = self
                .ledger
                .transactions_for_user(buyer)
                .await?
                .iter()
                .any(|tx| {
                    tx.kind == TransactionKind::SquaresRefund && tx.related_id == Some(game_id)
                });
            if already_refunded {
                continue;
            }

            self.ledger
                .create_transaction(
                    NewTransaction::completed(
                        buyer.clone(),
                        TransactionKind::SquaresRefund,
                        *total,
                        format!("Refund for cancelled game {}", game.title),
                    )
                    .with_related(game_id),
                )
                .await?;

            self.notifier
                .notify(
                    Notification::new(
                        buyer.clone(),
                        NotificationKind::Refund,
                        "Game cancelled",
                        format!("{} refunded for {}: {}", total, game.title, reason),
                        NotificationPriority::High,
                    )
                    .with_action_ref(game_id.to_string()),
                )
                .await;
        }

        game.status = GameStatus::Cancelled;
        game.cancel_reason = Some(reason);
        self.store.update_game(game.clone()).await?;

        tracing::info!(
            game_id = %game_id,
            buyers_refunded = totals.len(),
            "game cancelled"
        );

        Ok(game)
    }

    /// Invite a user to a game
    pub async fn invite(&self, game_id: Uuid, user: &UserId) -> Result<GameInvitation> {
        let game = self.store.get_game(game_id).await?;
        if game.status.is_terminal() {
            return Err(Error::GameClosed {
                status: game.status,
                reason: "cannot invite".to_string(),
            });
        }

        let invitation = GameInvitation {
            id: Uuid::new_v4(),
            game_id,
            user_id: user.clone(),
            status: InvitationStatus::Pending,
            created_at: Utc::now(),
        };
        self.store.insert_invitation(invitation.clone()).await?;

        self.notifier
            .notify(
                Notification::new(
                    user.clone(),
                    NotificationKind::Invitation,
                    "You're invited",
                    format!("Join {}", game.title),
                    NotificationPriority::Normal,
                )
                .with_action_ref(game_id.to_string()),
            )
            .await;

        Ok(invitation)
    }

    /// Arm a task that locks the grid at the game's start time
    pub fn spawn_lock_scheduler(
        self: &Arc<Self>,
        game: &SquaresGame,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        let game_id = game.id;
        let starts_at = game.starts_at;

        tokio::spawn(async move {
            let delay = (starts_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;
            match engine.lock_grid(game_id).await {
                Ok(_) => tracing::info!(game_id = %game_id, "scheduled grid lock fired"),
                Err(e) => tracing::error!(game_id = %game_id, error = %e, "scheduled grid lock failed"),
            }
        })
    }

    /// Fetch a game
    pub async fn get_game(&self, game_id: Uuid) -> Result<SquaresGame> {
        self.store.get_game(game_id).await
    }

    /// Best-effort removal of rows written before a failed step
    async fn compensate_purchases(&self, inserted: &[SquaresPurchase]) {
        for purchase in inserted {
            if let Err(e) = self.store.delete_purchase(purchase.id).await {
                tracing::error!(
                    purchase_id = %purchase.id,
                    error = %e,
                    "purchase compensation failed"
                );
            }
        }
    }

    /// Re-derive sold count and pot from the purchase rows
    async fn refresh_game_totals(&self, mut game: SquaresGame) -> Result<SquaresGame> {
        let purchases = self.store.purchases_for_game(game.id).await?;
        game.squares_sold = purchases.len() as u32;
        game.total_pot = purchases.iter().map(|p| p.amount).sum();
        self.store.update_game(game.clone()).await?;
        Ok(game)
    }

    /// Move the lifecycle along after a settled (or house-kept) period
    async fn advance_after_period(&self, mut game: SquaresGame, period: Period) -> Result<()> {
        let mut changed = false;
        if game.status == GameStatus::Locked {
            game.status = GameStatus::Live;
            changed = true;
        }
        if period.is_final() && !game.status.is_terminal() {
            game.status = GameStatus::Resolved;
            changed = true;
        }
        if changed {
            self.store.update_game(game).await?;
        }
        Ok(())
    }
}

/// Fisher–Yates shuffle of the digits 0-9
fn random_permutation() -> [u8; 10] {
    let mut digits: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
    digits.shuffle(&mut rand::thread_rng());
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_permutation_is_complete() {
        for _ in 0..100 {
            let mut perm = random_permutation();
            perm.sort_unstable();
            assert_eq!(perm, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        }
    }

    #[test]
    fn test_permutations_are_independent() {
        // 200 draws of two permutations each; if rows and columns were
        // correlated the pairs would always match.
        let mut any_different = false;
        for _ in 0..200 {
            if random_permutation() != random_permutation() {
                any_different = true;
                break;
            }
        }
        assert!(any_different);
    }
}
