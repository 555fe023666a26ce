//! Portfolio Reporting
//! Mission: Read-only views over wallets and orders, totals reported in INR

use crate::error::LedgerResult;
use crate::fx::FxTable;
use crate::ledger::LedgerStore;
use crate::models::{
    checked_total, validate_page, Actor, Currency, Order, OrderStatus, Page, Wallet,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

pub const REPORTING_CURRENCY: Currency = Currency::Inr;

const VOLUME_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioOverview {
    pub currency: Currency,
    pub total_balance: Decimal,
    pub total_locked_balance: Decimal,
    pub total_available: Decimal,
    /// Net result of every settled stake
    pub total_pnl: Decimal,
    /// Percentage of decided stakes that won, 2 dp
    pub win_rate: Decimal,
    pub total_orders: usize,
    pub won_orders: usize,
    pub lost_orders: usize,
    pub pending_orders: usize,
    pub cancelled_orders: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub overview: PortfolioOverview,
    pub wallets: Vec<Wallet>,
    pub orders: Page<Order>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyVolume {
    pub day: String,
    pub date: NaiveDate,
    pub volume: Decimal,
    pub markets: usize,
}

#[derive(Clone)]
pub struct PortfolioReporter {
    store: LedgerStore,
    fx: FxTable,
}

impl PortfolioReporter {
    pub fn new(store: LedgerStore, fx: FxTable) -> Self {
        Self { store, fx }
    }

    pub fn portfolio(&self, actor: &Actor, page: u32, page_size: u32) -> LedgerResult<Portfolio> {
        validate_page(page, page_size)?;
        let offset = (page - 1).saturating_mul(page_size);

        let (wallets, all_orders, items) = self.store.read(|uow| {
            Ok((
                uow.wallets_for_user(actor.user_id)?,
                uow.orders_for_user(actor.user_id, None, u32::MAX, 0)?,
                uow.orders_for_user(actor.user_id, None, page_size, offset)?,
            ))
        })?;

        let overview = self.overview(&wallets, &all_orders)?;
        let orders = Page::new(items, page, page_size, all_orders.len() as u64);
        Ok(Portfolio {
            overview,
            wallets,
            orders,
        })
    }

    fn overview(&self, wallets: &[Wallet], orders: &[Order]) -> LedgerResult<PortfolioOverview> {
        let to_inr = |amount: Decimal, currency: Currency| {
            self.fx.convert(amount, currency, REPORTING_CURRENCY)
        };

        let balances = wallets
            .iter()
            .map(|w| to_inr(w.balance, w.currency))
            .collect::<LedgerResult<Vec<_>>>()?;
        let locked = wallets
            .iter()
            .map(|w| to_inr(w.locked_balance, w.currency))
            .collect::<LedgerResult<Vec<_>>>()?;
        let total_balance = checked_total("portfolio balance", balances)?;
        let total_locked_balance = checked_total("portfolio locked balance", locked)?;

        let won_orders = orders.iter().filter(|o| o.is_won()).count();
        let lost_orders = orders.iter().filter(|o| o.is_lost()).count();
        let pending_orders = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Locked)
            .count();
        let cancelled_orders = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Cancelled)
            .count();
        let pnl = orders
            .iter()
            .map(|o| to_inr(o.pnl(), o.currency))
            .collect::<LedgerResult<Vec<_>>>()?;
        let total_pnl = checked_total("portfolio pnl", pnl)?;

        Ok(PortfolioOverview {
            currency: REPORTING_CURRENCY,
            total_balance,
            total_locked_balance,
            total_available: total_balance - total_locked_balance,
            total_pnl,
            win_rate: win_rate(won_orders, lost_orders),
            total_orders: orders.len(),
            won_orders,
            lost_orders,
            pending_orders,
            cancelled_orders,
        })
    }

    /// Staked volume per UTC day over the last seven days, today included.
    pub fn weekly_volume(&self) -> LedgerResult<Vec<DailyVolume>> {
        self.weekly_volume_at(Utc::now())
    }

    pub fn weekly_volume_at(&self, now: DateTime<Utc>) -> LedgerResult<Vec<DailyVolume>> {
        let today = now.date_naive();
        let first_day = today - Duration::days(VOLUME_WINDOW_DAYS - 1);
        let since = first_day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(now);

        let orders = self.store.read(|uow| uow.orders_created_since(since))?;

        let mut per_day: BTreeMap<NaiveDate, (Decimal, HashSet<Uuid>)> = BTreeMap::new();
        for order in orders {
            let slot = per_day.entry(order.created_at.date_naive()).or_default();
            let volume = self.fx.convert(order.amount, order.currency, REPORTING_CURRENCY)?;
            slot.0 = checked_total("daily volume", [slot.0, volume])?;
            slot.1.insert(order.market_id);
        }

        Ok(first_day
            .iter_days()
            .take(VOLUME_WINDOW_DAYS as usize)
            .map(|date| {
                let (volume, markets) = per_day
                    .get(&date)
                    .map(|(v, m)| (*v, m.len()))
                    .unwrap_or((Decimal::ZERO, 0));
                DailyVolume {
                    day: date.format("%a").to_string(),
                    date,
                    volume,
                    markets,
                }
            })
            .collect())
    }
}

fn win_rate(won: usize, lost: usize) -> Decimal {
    let decided = won + lost;
    if decided == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(won as u64) * Decimal::ONE_HUNDRED / Decimal::from(decided as u64))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::{MarketBook, NewMarket};
    use crate::models::{Outcome, Role};
    use crate::orders::{OrderLifecycleManager, PlaceStake};
    use crate::settlement::SettlementEngine;
    use crate::wallets::WalletBook;
    use rust_decimal_macros::dec;

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(0, 0), dec!(0));
        assert_eq!(win_rate(1, 2), dec!(33.33));
        assert_eq!(win_rate(2, 1), dec!(66.67));
        assert_eq!(win_rate(3, 0), dec!(100));
    }

    #[test]
    fn test_portfolio_overview_in_inr() {
        let store = LedgerStore::in_memory().unwrap();
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        let alice = Actor::new(Uuid::new_v4(), Role::User);
        let bob = Actor::new(Uuid::new_v4(), Role::User);

        let markets = MarketBook::new(store.clone());
        let wallets = WalletBook::new(store.clone());
        let orders = OrderLifecycleManager::new(store.clone());
        let engine = SettlementEngine::new(store.clone(), dec!(0.02)).unwrap();
        let reporter = PortfolioReporter::new(store, FxTable::default());

        let new_market = |title: &str| {
            markets
                .create(
                    &admin,
                    NewMarket {
                        title: title.to_string(),
                        description: "d".to_string(),
                        category: "c".to_string(),
                        end_date: Utc::now() + Duration::days(2),
                    },
                )
                .unwrap()
        };
        let settled = new_market("Settled market");
        let pending = new_market("Pending market");

        let alice_inr = wallets.open(&alice, Currency::Inr, dec!(1000)).unwrap();
        let alice_usd = wallets.open(&alice, Currency::Usd, dec!(10)).unwrap();
        let bob_inr = wallets.open(&bob, Currency::Inr, dec!(1000)).unwrap();

        let place = |actor: &Actor, market: Uuid, wallet: Uuid, amount: Decimal, outcome: Outcome| {
            orders
                .place_stake(
                    actor,
                    PlaceStake {
                        market_id: market,
                        wallet_id: wallet,
                        amount,
                        outcome,
                    },
                )
                .unwrap()
        };
        place(&alice, settled.id, alice_inr.id, dec!(400), Outcome::Yes);
        place(&bob, settled.id, bob_inr.id, dec!(600), Outcome::No);
        place(&alice, pending.id, alice_usd.id, dec!(2), Outcome::No);
        engine.settle(&admin, settled.id, Outcome::Yes).unwrap();

        let portfolio = reporter.portfolio(&alice, 1, 10).unwrap();
        let overview = &portfolio.overview;
        // 1588 INR + 10 USD * 83
        assert_eq!(overview.total_balance, dec!(2418));
        assert_eq!(overview.total_locked_balance, dec!(166));
        assert_eq!(overview.total_available, dec!(2252));
        assert_eq!(overview.total_pnl, dec!(588));
        assert_eq!(overview.won_orders, 1);
        assert_eq!(overview.pending_orders, 1);
        assert_eq!(overview.win_rate, dec!(100));
        assert_eq!(portfolio.wallets.len(), 2);
        assert_eq!(portfolio.orders.total, 2);

        let bob_view = reporter.portfolio(&bob, 1, 10).unwrap();
        assert_eq!(bob_view.overview.total_pnl, dec!(-600));
        assert_eq!(bob_view.overview.lost_orders, 1);
        assert_eq!(bob_view.overview.win_rate, dec!(0));
    }

    #[test]
    fn test_weekly_volume_fills_missing_days() {
        let store = LedgerStore::in_memory().unwrap();
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);
        let user = Actor::new(Uuid::new_v4(), Role::User);
        let market = MarketBook::new(store.clone())
            .create(
                &admin,
                NewMarket {
                    title: "Volume".to_string(),
                    description: "d".to_string(),
                    category: "c".to_string(),
                    end_date: Utc::now() + Duration::days(2),
                },
            )
            .unwrap();
        let wallet = WalletBook::new(store.clone())
            .open(&user, Currency::Usd, dec!(100))
            .unwrap();
        let order = OrderLifecycleManager::new(store.clone())
            .place_stake(
                &user,
                PlaceStake {
                    market_id: market.id,
                    wallet_id: wallet.id,
                    amount: dec!(1.5),
                    outcome: Outcome::Yes,
                },
            )
            .unwrap();

        let reporter = PortfolioReporter::new(store, FxTable::default());
        // Pin the clock to the stake so the window cannot roll over mid-test
        let days = reporter.weekly_volume_at(order.created_at).unwrap();
        assert_eq!(days.len(), 7);
        assert_eq!(days[6].date, order.created_at.date_naive());
        assert_eq!(days[6].volume, dec!(124.5));
        assert_eq!(days[6].markets, 1);
        assert!(days[..6].iter().all(|d| d.volume.is_zero() && d.markets == 0));

        let next_day = reporter
            .weekly_volume_at(order.created_at + Duration::days(1))
            .unwrap();
        assert_eq!(next_day[5].date, order.created_at.date_naive());
        assert_eq!(next_day[5].volume, dec!(124.5));
        assert!(next_day[6].volume.is_zero());
    }
}
