//! End-to-end settlement scenarios against an in-memory ledger.

mod common;

use common::Harness;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stakebook_backend::{
    error::LedgerError,
    models::{Currency, EntryKind, OrderStatus, Outcome, MAX_AMOUNT},
};

#[test]
fn test_contested_market_pays_winner_and_takes_fee() {
    let h = Harness::new();
    let market = h.market("Final: home win?");
    let (winner, w_wallet) = h.user_with_wallet(Currency::Inr, dec!(1000));
    let (loser, l_wallet) = h.user_with_wallet(Currency::Inr, dec!(1000));

    let winning = h.stake(&winner, &w_wallet, &market, dec!(400), Outcome::Yes);
    assert_eq!(h.wallet(w_wallet.id).locked_balance, dec!(400));

    let second = h.orders.place_stake(
        &winner,
        stakebook_backend::orders::PlaceStake {
            market_id: market.id,
            wallet_id: w_wallet.id,
            amount: dec!(700),
            outcome: Outcome::Yes,
        },
    );
    match second {
        Err(LedgerError::InsufficientFunds { available, requested }) => {
            assert_eq!(available, dec!(600));
            assert_eq!(requested, dec!(700));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    let losing = h.stake(&loser, &l_wallet, &market, dec!(600), Outcome::No);

    let report = h.engine.settle(&h.admin, market.id, Outcome::Yes).unwrap();
    let pool = &report.pools[0];
    assert_eq!(pool.platform_fee, dec!(12));
    assert_eq!(pool.distributable_pool, dec!(588));

    let winning = h.order(winning.id);
    assert_eq!(winning.status, OrderStatus::Settled);
    assert_eq!(winning.payout, Some(dec!(988)));

    let w = h.wallet(w_wallet.id);
    assert_eq!(w.locked_balance, Decimal::ZERO);
    assert_eq!(w.balance, dec!(1588));

    let l = h.wallet(l_wallet.id);
    assert_eq!(l.locked_balance, Decimal::ZERO);
    assert_eq!(l.balance, dec!(400));
    assert_eq!(h.order(losing.id).payout, Some(Decimal::ZERO));

    // Money leaving the losers is exactly what the winners and the platform received
    let revenue = h.engine.revenue(&h.admin, Some(market.id)).unwrap();
    assert_eq!(revenue.len(), 1);
    assert_eq!(revenue[0].revenue, dec!(12));
    assert_eq!(revenue[0].fee_percentage, dec!(0.02));
    assert_eq!(w.balance + l.balance + revenue[0].revenue, dec!(2000));
}

#[test]
fn test_one_sided_market_is_refunded_without_fee() {
    let h = Harness::new();
    let market = h.market("Everyone says no");
    let mut stakes = Vec::new();
    for amount in [dec!(150), dec!(250.50), dec!(99.99)] {
        let (user, wallet) = h.user_with_wallet(Currency::Inr, dec!(500));
        let order = h.stake(&user, &wallet, &market, amount, Outcome::No);
        stakes.push((wallet, order));
    }

    let report = h.engine.settle(&h.admin, market.id, Outcome::Yes).unwrap();
    assert!(!report.pools[0].contested);
    assert_eq!(report.pools[0].orders_refunded, 3);

    for (wallet, order) in &stakes {
        let order = h.order(order.id);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payout, None);
        let wallet = h.wallet(wallet.id);
        assert_eq!(wallet.balance, dec!(500));
        assert_eq!(wallet.locked_balance, Decimal::ZERO);
    }
    assert!(h.engine.revenue(&h.admin, Some(market.id)).unwrap().is_empty());
}

#[test]
fn test_second_settle_moves_nothing() {
    let h = Harness::new();
    let market = h.market("Settled twice?");
    let (a, a_wallet) = h.user_with_wallet(Currency::Usd, dec!(100));
    let (b, b_wallet) = h.user_with_wallet(Currency::Usd, dec!(100));
    h.stake(&a, &a_wallet, &market, dec!(30), Outcome::Yes);
    h.stake(&b, &b_wallet, &market, dec!(70), Outcome::No);

    h.engine.settle(&h.admin, market.id, Outcome::No).unwrap();
    let after_first = (h.wallet(a_wallet.id), h.wallet(b_wallet.id));
    let entries_first = h.store.read(|uow| uow.entries_for_wallet(b_wallet.id)).unwrap();

    assert!(matches!(
        h.engine.settle(&h.admin, market.id, Outcome::Yes),
        Err(LedgerError::AlreadySettled)
    ));
    assert_eq!((h.wallet(a_wallet.id), h.wallet(b_wallet.id)), after_first);
    assert_eq!(
        h.store.read(|uow| uow.entries_for_wallet(b_wallet.id)).unwrap(),
        entries_first
    );
    assert_eq!(h.engine.revenue(&h.admin, Some(market.id)).unwrap().len(), 1);
}

#[test]
fn test_many_winners_split_distributable_pool_exactly() {
    let h = Harness::new();
    let market = h.market("Odd split");
    let mut winners = Vec::new();
    for amount in [dec!(33.33), dec!(10), dec!(7.01), dec!(0.01), dec!(123.45)] {
        let (user, wallet) = h.user_with_wallet(Currency::Inr, dec!(200));
        winners.push(h.stake(&user, &wallet, &market, amount, Outcome::Yes));
    }
    for amount in [dec!(101), dec!(55.55)] {
        let (user, wallet) = h.user_with_wallet(Currency::Inr, dec!(200));
        h.stake(&user, &wallet, &market, amount, Outcome::No);
    }

    let report = h.engine.settle(&h.admin, market.id, Outcome::Yes).unwrap();
    let pool = &report.pools[0];
    assert_eq!(pool.losing_pool, dec!(156.55));
    assert_eq!(pool.platform_fee + pool.distributable_pool, pool.losing_pool);

    let mut shares = Decimal::ZERO;
    let mut rates = Vec::new();
    for order in &winners {
        let settled = h.order(order.id);
        let share = settled.payout.unwrap() - settled.amount;
        assert_eq!(share.round_dp(2), share);
        shares += share;
        rates.push(share / settled.amount);
    }
    assert_eq!(shares, pool.distributable_pool);

    // Per-unit returns agree up to one cent of rounding per order
    let exact = pool.distributable_pool / pool.winning_pool;
    for (order, rate) in winners.iter().zip(&rates) {
        assert!(((rate - exact) * order.amount).abs() < dec!(0.01));
    }
}

#[test]
fn test_settled_market_leaves_consistent_journal() {
    let h = Harness::new();
    let market = h.market("Journal");
    let (a, a_wallet) = h.user_with_wallet(Currency::Inr, dec!(300));
    let (b, b_wallet) = h.user_with_wallet(Currency::Inr, dec!(300));
    let a_order = h.stake(&a, &a_wallet, &market, dec!(100), Outcome::Yes);
    let b_order = h.stake(&b, &b_wallet, &market, dec!(200), Outcome::No);
    h.engine.settle(&h.admin, market.id, Outcome::Yes).unwrap();

    let kinds = |order_id| {
        h.store
            .read(|uow| uow.entries_for_order(order_id))
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect::<Vec<_>>()
    };
    assert_eq!(kinds(a_order.id), vec![EntryKind::Lock, EntryKind::Credit]);
    assert_eq!(kinds(b_order.id), vec![EntryKind::Lock, EntryKind::Debit]);

    for wallet_id in [a_wallet.id, b_wallet.id] {
        let entries = h.store.read(|uow| uow.entries_for_wallet(wallet_id)).unwrap();
        let balance: Decimal = entries.iter().map(|e| e.balance_delta).sum();
        let locked: Decimal = entries.iter().map(|e| e.locked_delta).sum();
        let wallet = h.wallet(wallet_id);
        assert_eq!(balance, wallet.balance);
        assert_eq!(locked, wallet.locked_balance);
    }
}

#[test]
fn test_settlement_at_amount_ceiling_conserves() {
    let h = Harness::new();
    let market = h.market("Whales");

    // Enough maximum-size losers that a winner's stake times the distributable pool
    // leaves the Decimal range
    let mut losers = Vec::new();
    for _ in 0..810 {
        let (user, wallet) = h.user_with_wallet(Currency::Usd, MAX_AMOUNT);
        h.stake(&user, &wallet, &market, MAX_AMOUNT, Outcome::No);
        losers.push(wallet);
    }
    let (whale, whale_wallet) = h.user_with_wallet(Currency::Usd, MAX_AMOUNT);
    let whale_order = h.stake(&whale, &whale_wallet, &market, MAX_AMOUNT, Outcome::Yes);
    let (minnow, minnow_wallet) = h.user_with_wallet(Currency::Usd, dec!(1));
    let minnow_order = h.stake(&minnow, &minnow_wallet, &market, dec!(0.01), Outcome::Yes);

    let report = h.engine.settle(&h.admin, market.id, Outcome::Yes).unwrap();
    let pool = &report.pools[0];
    assert!(pool.contested);
    assert_eq!(pool.losing_pool, MAX_AMOUNT * dec!(810));

    let shares: Decimal = [whale_order.id, minnow_order.id]
        .into_iter()
        .map(|id| {
            let settled = h.order(id);
            settled.payout.unwrap() - settled.amount
        })
        .sum();
    assert_eq!(shares + pool.platform_fee, pool.losing_pool);

    let before = MAX_AMOUNT * dec!(811) + dec!(1);
    let after: Decimal = losers
        .iter()
        .chain([&whale_wallet, &minnow_wallet])
        .map(|w| h.wallet(w.id).balance)
        .sum();
    assert_eq!(after + pool.platform_fee, before);
    assert!(losers.iter().all(|w| h.wallet(w.id).balance.is_zero()));
}

#[test]
fn test_stake_above_ceiling_rejected() {
    let h = Harness::new();
    let market = h.market("Too big");
    let (user, wallet) = h.user_with_wallet(Currency::Inr, MAX_AMOUNT);
    h.wallets.deposit(&user, wallet.id, MAX_AMOUNT).unwrap();

    let result = h.orders.place_stake(
        &user,
        stakebook_backend::orders::PlaceStake {
            market_id: market.id,
            wallet_id: wallet.id,
            amount: MAX_AMOUNT + dec!(0.01),
            outcome: Outcome::Yes,
        },
    );
    assert!(matches!(result, Err(LedgerError::Validation(_))));
    assert_eq!(h.wallet(wallet.id).locked_balance, Decimal::ZERO);
}
