//! Game persistence port and the in-memory store
//!
//! The uniqueness rules the game depends on live here as conditional
//! inserts: `insert_purchase_if_vacant` keyed by `(game, row, col)` and
//! `insert_payout_if_absent` keyed by `(game, period)`. Concurrent callers
//! racing for the same cell or the same period see exactly one winner.

use crate::{
    error::{Error, Result},
    types::{GameInvitation, InvitationStatus, Period, SquaresGame, SquaresPayout, SquaresPurchase},
};
use async_trait::async_trait;
use ledger_core::UserId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Game persistence port
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Insert a game
    async fn insert_game(&self, game: SquaresGame) -> Result<()>;

    /// Fetch a game
    async fn get_game(&self, id: Uuid) -> Result<SquaresGame>;

    /// Overwrite a game record
    async fn update_game(&self, game: SquaresGame) -> Result<()>;

    /// Insert a purchase iff its cell is vacant in its game.
    ///
    /// Returns `false` (without writing) when the cell is already owned.
    async fn insert_purchase_if_vacant(&self, purchase: SquaresPurchase) -> Result<bool>;

    /// Remove a purchase row (compensation path only)
    async fn delete_purchase(&self, id: Uuid) -> Result<()>;

    /// All purchases in a game, oldest first
    async fn purchases_for_game(&self, game_id: Uuid) -> Result<Vec<SquaresPurchase>>;

    /// Insert a payout iff none exists for its `(game, period)`.
    ///
    /// Returns `false` (without writing) when the period is already settled.
    async fn insert_payout_if_absent(&self, payout: SquaresPayout) -> Result<bool>;

    /// Remove a payout row (compensation path only)
    async fn delete_payout(&self, id: Uuid) -> Result<()>;

    /// Payout for one period, if settled
    async fn payout_for_period(&self, game_id: Uuid, period: Period)
        -> Result<Option<SquaresPayout>>;

    /// All payouts in a game
    async fn payouts_for_game(&self, game_id: Uuid) -> Result<Vec<SquaresPayout>>;

    /// Record an invitation
    async fn insert_invitation(&self, invitation: GameInvitation) -> Result<()>;

    /// Pending invitation for a user in a game, if any
    async fn pending_invitation(
        &self,
        game_id: Uuid,
        user: &UserId,
    ) -> Result<Option<GameInvitation>>;

    /// Overwrite an invitation record
    async fn update_invitation(&self, invitation: GameInvitation) -> Result<()>;
}

/// In-memory implementation of [`GameStore`]
#[derive(Default)]
pub struct MemoryGameStore {
    games: RwLock<HashMap<Uuid, SquaresGame>>,
    purchases: RwLock<HashMap<Uuid, SquaresPurchase>>,
    /// Occupancy index: (game, row, col) -> purchase
    cells: RwLock<HashMap<(Uuid, u8, u8), Uuid>>,
    payouts: RwLock<HashMap<Uuid, SquaresPayout>>,
    /// Settlement index: (game, period) -> payout
    settled_periods: RwLock<HashMap<(Uuid, Period), Uuid>>,
    invitations: RwLock<HashMap<Uuid, GameInvitation>>,
}

impl MemoryGameStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn insert_game(&self, game: SquaresGame) -> Result<()> {
        let mut games = self.games.write().await;
        if games.contains_key(&game.id) {
            return Err(Error::Store(format!("duplicate game id: {}", game.id)));
        }
        games.insert(game.id, game);
        Ok(())
    }

    async fn get_game(&self, id: Uuid) -> Result<SquaresGame> {
        self.games
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::GameNotFound(id.to_string()))
    }

    async fn update_game(&self, game: SquaresGame) -> Result<()> {
        let mut games = self.games.write().await;
        if !games.contains_key(&game.id) {
            return Err(Error::GameNotFound(game.id.to_string()));
        }
        games.insert(game.id, game);
        Ok(())
    }

    async fn insert_purchase_if_vacant(&self, purchase: SquaresPurchase) -> Result<bool> {
        // Take the cell index lock first; it is the uniqueness authority
        let mut cells = self.cells.write().await;
        let key = (purchase.game_id, purchase.square.row, purchase.square.col);
        if cells.contains_key(&key) {
            return Ok(false);
        }
        cells.insert(key, purchase.id);
        self.purchases.write().await.insert(purchase.id, purchase);
        Ok(true)
    }

    async fn delete_purchase(&self, id: Uuid) -> Result<()> {
        let mut cells = self.cells.write().await;
        let mut purchases = self.purchases.write().await;
        let purchase = purchases
            .remove(&id)
            .ok_or_else(|| Error::PurchaseNotFound(id.to_string()))?;
        cells.remove(&(purchase.game_id, purchase.square.row, purchase.square.col));
        Ok(())
    }

    async fn purchases_for_game(&self, game_id: Uuid) -> Result<Vec<SquaresPurchase>> {
        let purchases = self.purchases.read().await;
        let mut out: Vec<SquaresPurchase> = purchases
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn insert_payout_if_absent(&self, payout: SquaresPayout) -> Result<bool> {
        let mut settled = self.settled_periods.write().await;
        let key = (payout.game_id, payout.period);
        if settled.contains_key(&key) {
            return Ok(false);
        }
        settled.insert(key, payout.id);
        self.payouts.write().await.insert(payout.id, payout);
        Ok(true)
    }

    async fn delete_payout(&self, id: Uuid) -> Result<()> {
        let mut settled = self.settled_periods.write().await;
        let mut payouts = self.payouts.write().await;
        let payout = payouts
            .remove(&id)
            .ok_or_else(|| Error::Store(format!("payout not found: {}", id)))?;
        settled.remove(&(payout.game_id, payout.period));
        Ok(())
    }

    async fn payout_for_period(
        &self,
        game_id: Uuid,
        period: Period,
    ) -> Result<Option<SquaresPayout>> {
        let settled = self.settled_periods.read().await;
        let Some(payout_id) = settled.get(&(game_id, period)) else {
            return Ok(None);
        };
        Ok(self.payouts.read().await.get(payout_id).cloned())
    }

    async fn payouts_for_game(&self, game_id: Uuid) -> Result<Vec<SquaresPayout>> {
        let payouts = self.payouts.read().await;
        let mut out: Vec<SquaresPayout> = payouts
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.id);
        Ok(out)
    }

    async fn insert_invitation(&self, invitation: GameInvitation) -> Result<()> {
        self.invitations
            .write()
            .await
            .insert(invitation.id, invitation);
        Ok(())
    }

    async fn pending_invitation(
        &self,
        game_id: Uuid,
        user: &UserId,
    ) -> Result<Option<GameInvitation>> {
        Ok(self
            .invitations
            .read()
            .await
            .values()
            .find(|i| {
                i.game_id == game_id
                    && &i.user_id == user
                    && i.status == InvitationStatus::Pending
            })
            .cloned())
    }

    async fn update_invitation(&self, invitation: GameInvitation) -> Result<()> {
        let mut invitations = self.invitations.write().await;
        if !invitations.contains_key(&invitation.id) {
            return Err(Error::Store(format!(
                "invitation not found: {}",
                invitation.id
            )));
        }
        invitations.insert(invitation.id, invitation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Square;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn purchase(game_id: Uuid, row: u8, col: u8) -> SquaresPurchase {
        SquaresPurchase {
            id: Uuid::now_v7(),
            game_id,
            user_id: UserId::new("buyer"),
            owner_name: "Buyer".to_string(),
            square: Square::new(row, col),
            amount: dec!(10.00),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cell_occupancy_is_exclusive() {
        let store = MemoryGameStore::new();
        let game_id = Uuid::new_v4();

        assert!(store
            .insert_purchase_if_vacant(purchase(game_id, 3, 4))
            .await
            .unwrap());
        // Same cell, second buyer
        assert!(!store
            .insert_purchase_if_vacant(purchase(game_id, 3, 4))
            .await
            .unwrap());
        // Same cell in a different game is independent
        assert!(store
            .insert_purchase_if_vacant(purchase(Uuid::new_v4(), 3, 4))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_purchase_frees_cell() {
        let store = MemoryGameStore::new();
        let game_id = Uuid::new_v4();

        let p = purchase(game_id, 1, 1);
        let id = p.id;
        assert!(store.insert_purchase_if_vacant(p).await.unwrap());
        store.delete_purchase(id).await.unwrap();
        assert!(store
            .insert_purchase_if_vacant(purchase(game_id, 1, 1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_payout_per_period_is_exclusive() {
        let store = MemoryGameStore::new();
        let game_id = Uuid::new_v4();
        let purchase_id = Uuid::new_v4();

        let payout = SquaresPayout {
            id: Uuid::now_v7(),
            game_id,
            period: Period::First,
            purchase_id,
            user_id: UserId::new("winner"),
            amount: dec!(145.50),
            home_score: 7,
            away_score: 3,
            created_at: Utc::now(),
        };

        assert!(store.insert_payout_if_absent(payout.clone()).await.unwrap());
        assert!(!store
            .insert_payout_if_absent(SquaresPayout {
                id: Uuid::now_v7(),
                ..payout
            })
            .await
            .unwrap());

        let settled = store
            .payout_for_period(game_id, Period::First)
            .await
            .unwrap();
        assert!(settled.is_some());
        assert!(store
            .payout_for_period(game_id, Period::Second)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_purchasers_one_winner() {
        let store = std::sync::Arc::new(MemoryGameStore::new());
        let game_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_purchase_if_vacant(purchase(game_id, 5, 5)).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.purchases_for_game(game_id).await.unwrap().len(), 1);
    }
}
