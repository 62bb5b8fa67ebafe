//! End-to-end walkthrough of the money and game flow
//!
//! Seeds accounts, settles a deposit through the approval workflow, runs a
//! squares game from purchase to payout, and cancels a second game with
//! refunds. Run with `RUST_LOG=info` to watch every state transition.

use anyhow::Result;
use chrono::{Duration, Utc};
use ledger_core::{
    Account, AccountStore, ApprovalWorkflow, Ledger, LedgerConfig, MemoryStore, Metrics,
    NullNotifier, PaymentMethod, PaymentMethodStore, TransactionStatus, UserId,
};
use rust_decimal_macros::dec;
use squares_engine::{
    GameStore, MemoryGameStore, NewGame, PayoutStructure, Period, Square, SquaresConfig,
    SquaresEngine,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("GridPot walkthrough starting");

    // Wire the core the way the platform embeds it
    let store = Arc::new(MemoryStore::new());
    let games = Arc::new(MemoryGameStore::new());
    let notifier = Arc::new(NullNotifier);
    let metrics = Metrics::default();
    let ledger_config = LedgerConfig::from_env()?;
    let squares_config = SquaresConfig::from_env()?;

    let ledger = Arc::new(Ledger::new(
        store.clone(),
        store.clone(),
        store.clone(),
        metrics.clone(),
        ledger_config.clone(),
    ));
    let workflow = ApprovalWorkflow::new(
        store.clone(),
        store.clone(),
        store.clone(),
        notifier.clone(),
        metrics.clone(),
        ledger_config,
    );
    let engine = Arc::new(SquaresEngine::new(
        games.clone(),
        ledger.clone(),
        notifier,
        squares_config,
    ));

    // Accounts and a payment method
    let admin = UserId::new("admin");
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    store.create_account(Account::admin(admin.clone())).await?;
    store.create_account(Account::new(alice.clone(), dec!(0.00))).await?;
    store.create_account(Account::new(bob.clone(), dec!(40.00))).await?;

    let card = PaymentMethod::new(alice.clone(), "Visa ···4242");
    let card_id = card.id;
    store.create_payment_method(card).await?;

    // Deposit: pending, then admin-settled; first deposit verifies the card
    let deposit = ledger.create_deposit(&alice, dec!(100.00), card_id).await?;
    workflow
        .decide(deposit.id, TransactionStatus::Completed, &admin, None, None)
        .await?;
    tracing::info!(balance = %ledger.balance_of(&alice).await?, "alice funded");

    // A game: create, open, sell squares
    let game = engine
        .create_game(NewGame {
            title: "Week 12: Home vs Away".to_string(),
            price_per_square: dec!(10.00),
            payout_structure: PayoutStructure::standard(),
            starts_at: Utc::now() + Duration::milliseconds(250),
        })
        .await?;
    engine.open_game(game.id).await?;
    let lock_task = engine.spawn_lock_scheduler(&game);

    engine
        .purchase_squares(
            game.id,
            &alice,
            "Alice",
            &[Square::new(0, 0), Square::new(4, 7), Square::new(7, 3)],
        )
        .await?;
    engine
        .purchase_squares(game.id, &bob, "Bob's office pool", &[Square::new(3, 3)])
        .await?;

    // The scheduler locks the grid at kickoff
    lock_task.await?;
    let locked = engine.get_game(game.id).await?;
    tracing::info!(rows = ?locked.row_numbers, cols = ?locked.col_numbers, "kickoff");

    // Scores come in period by period
    for (period, home, away) in [
        (Period::First, 7, 3),
        (Period::Second, 14, 10),
        (Period::Third, 17, 17),
        (Period::Final, 24, 20),
    ] {
        match engine.process_period_scores(game.id, period, home, away).await? {
            Some(payout) => tracing::info!(
                ?period,
                winner = %payout.user_id,
                amount = %payout.amount,
                "period paid"
            ),
            None => tracing::info!(?period, "no winner; house keeps the share"),
        }
    }

    tracing::info!(
        alice = %ledger.balance_of(&alice).await?,
        bob = %ledger.balance_of(&bob).await?,
        "final balances"
    );

    // A second game gets rained out
    let rained_out = engine
        .create_game(NewGame {
            title: "Week 13: Rain Bowl".to_string(),
            price_per_square: dec!(5.00),
            payout_structure: PayoutStructure::standard(),
            starts_at: Utc::now() + Duration::hours(4),
        })
        .await?;
    engine.open_game(rained_out.id).await?;
    engine
        .purchase_squares(rained_out.id, &bob, "Bob", &[Square::new(1, 1), Square::new(2, 2)])
        .await?;
    engine.cancel_game(rained_out.id, "weather").await?;
    tracing::info!(bob = %ledger.balance_of(&bob).await?, "refunded after cancellation");

    let payouts = games.payouts_for_game(game.id).await?;
    tracing::info!(settled_periods = payouts.len(), "walkthrough complete");

    Ok(())
}
