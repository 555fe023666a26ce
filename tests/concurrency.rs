//! Racing stake placement, cancellation and settlement from plain threads.

mod common;

use common::Harness;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stakebook_backend::{
    error::LedgerError,
    models::{Currency, EntryKind, OrderStatus, Outcome},
    orders::PlaceStake,
};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_stakes_cannot_overdraw_wallet() {
    let h = Arc::new(Harness::new());
    let market = h.market("Overdraw race");
    let (user, wallet) = h.user_with_wallet(Currency::Inr, dec!(1000));
    let (market_id, wallet_id) = (market.id, wallet.id);

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let h = h.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                h.orders.place_stake(
                    &user,
                    PlaceStake {
                        market_id,
                        wallet_id,
                        amount: dec!(600),
                        outcome: Outcome::Yes,
                    },
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, LedgerError::InsufficientFunds { .. })));

    let wallet = h.wallet(wallet_id);
    assert_eq!(wallet.locked_balance, dec!(600));
    assert!(wallet.is_consistent());
}

#[test]
fn test_cancel_racing_settle_releases_once() {
    let h = Arc::new(Harness::new());

    for round in 0..20 {
        let market = h.market(&format!("Race round {}", round));
        let (racer, racer_wallet) = h.user_with_wallet(Currency::Usd, dec!(100));
        let (other, other_wallet) = h.user_with_wallet(Currency::Usd, dec!(100));
        let raced = h.stake(&racer, &racer_wallet, &market, dec!(40), Outcome::Yes).id;
        h.stake(&other, &other_wallet, &market, dec!(25), Outcome::No);

        let barrier = Arc::new(Barrier::new(2));
        let cancel = {
            let h = h.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                h.orders.cancel_stake(&racer, raced)
            })
        };
        let settle = {
            let h = h.clone();
            let barrier = barrier.clone();
            let market_id = market.id;
            thread::spawn(move || {
                barrier.wait();
                h.engine.settle(&h.admin, market_id, Outcome::Yes)
            })
        };

        let cancelled = cancel.join().unwrap();
        settle.join().unwrap().expect("settlement must succeed");

        let order = h.order(raced);
        match cancelled {
            Ok(_) => assert_eq!(order.status, OrderStatus::Cancelled),
            Err(e) => {
                assert!(matches!(
                    e,
                    LedgerError::Conflict { .. } | LedgerError::MarketNotOpen
                ));
                assert_eq!(order.status, OrderStatus::Settled);
            }
        }

        let entries = h.store.read(|uow| uow.entries_for_order(raced)).unwrap();
        let releases = entries.iter().filter(|e| e.kind != EntryKind::Lock).count();
        assert_eq!(releases, 1, "round {}: {:?}", round, entries);

        let wallet = h.wallet(racer_wallet.id);
        assert_eq!(wallet.locked_balance, Decimal::ZERO);
        assert!(wallet.is_consistent());
    }
}
