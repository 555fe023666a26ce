#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use stakebook_backend::{
    ledger::LedgerStore,
    markets::{MarketBook, NewMarket},
    models::{Actor, Currency, Market, Order, Outcome, Role, Wallet},
    orders::{OrderLifecycleManager, PlaceStake},
    settlement::SettlementEngine,
    wallets::WalletBook,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

pub struct Harness {
    pub store: LedgerStore,
    pub wallets: WalletBook,
    pub orders: OrderLifecycleManager,
    pub markets: MarketBook,
    pub engine: SettlementEngine,
    pub admin: Actor,
}

impl Harness {
    pub fn new() -> Self {
        let store = LedgerStore::in_memory().expect("Failed to create ledger");
        Self {
            wallets: WalletBook::new(store.clone()),
            orders: OrderLifecycleManager::new(store.clone()),
            markets: MarketBook::new(store.clone()),
            engine: SettlementEngine::new(store.clone(), dec!(0.02)).expect("valid fee"),
            admin: Actor::new(Uuid::new_v4(), Role::Admin),
            store,
        }
    }

    pub fn market(&self, title: &str) -> Market {
        self.markets
            .create(
                &self.admin,
                NewMarket {
                    title: title.to_string(),
                    description: "Test market".to_string(),
                    category: "sports".to_string(),
                    end_date: Utc::now() + Duration::days(3),
                },
            )
            .expect("Failed to create market")
    }

    pub fn user_with_wallet(&self, currency: Currency, balance: Decimal) -> (Actor, Wallet) {
        let user = Actor::new(Uuid::new_v4(), Role::User);
        let wallet = self
            .wallets
            .open(&user, currency, balance)
            .expect("Failed to open wallet");
        (user, wallet)
    }

    pub fn stake(
        &self,
        user: &Actor,
        wallet: &Wallet,
        market: &Market,
        amount: Decimal,
        outcome: Outcome,
    ) -> Order {
        self.orders
            .place_stake(
                user,
                PlaceStake {
                    market_id: market.id,
                    wallet_id: wallet.id,
                    amount,
                    outcome,
                },
            )
            .expect("Failed to place stake")
    }

    pub fn wallet(&self, id: Uuid) -> Wallet {
        self.store.read(|uow| uow.wallet(id)).expect("wallet")
    }

    pub fn order(&self, id: Uuid) -> Order {
        self.store.read(|uow| uow.order(id)).expect("order")
    }
}
