//! Wallet Book
//! Mission: One wallet per (user, currency); balances only ever move through the ledger

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::LedgerStore;
use crate::models::{validate_money, Actor, Currency, LedgerEntry, Wallet, MINOR_UNIT};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

/// Top-ups below one whole unit are rejected.
pub const MIN_DEPOSIT: Decimal = Decimal::ONE;

#[derive(Clone)]
pub struct WalletBook {
    store: LedgerStore,
}

impl WalletBook {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    pub fn open(
        &self,
        actor: &Actor,
        currency: Currency,
        opening_balance: Decimal,
    ) -> LedgerResult<Wallet> {
        let opening_balance = validate_money("balance", opening_balance, MINOR_UNIT)?;

        let wallet = self
            .store
            .unit_of_work(|uow| uow.open_wallet(actor.user_id, currency, opening_balance))?;

        info!(
            wallet_id = %wallet.id,
            user_id = %actor.user_id,
            currency = %currency,
            balance = %opening_balance,
            "Wallet opened"
        );
        Ok(wallet)
    }

    pub fn list(&self, actor: &Actor) -> LedgerResult<Vec<Wallet>> {
        self.store.read(|uow| uow.wallets_for_user(actor.user_id))
    }

    /// Someone else's wallet is reported as missing.
    pub fn get(&self, actor: &Actor, wallet_id: Uuid) -> LedgerResult<Wallet> {
        self.store.read(|uow| owned_wallet(uow.find_wallet(wallet_id)?, actor))
    }

    pub fn deposit(&self, actor: &Actor, wallet_id: Uuid, amount: Decimal) -> LedgerResult<Wallet> {
        let amount = validate_money("amount", amount, MIN_DEPOSIT)?;

        let wallet = self.store.unit_of_work(|uow| {
            owned_wallet(uow.find_wallet(wallet_id)?, actor)?;
            uow.deposit(wallet_id, amount)
        })?;

        info!(
            wallet_id = %wallet_id,
            amount = %amount,
            balance = %wallet.balance,
            "Deposit credited"
        );
        Ok(wallet)
    }

    /// Movement history of one wallet, oldest first.
    pub fn entries(&self, actor: &Actor, wallet_id: Uuid) -> LedgerResult<Vec<LedgerEntry>> {
        self.store.read(|uow| {
            owned_wallet(uow.find_wallet(wallet_id)?, actor)?;
            uow.entries_for_wallet(wallet_id)
        })
    }
}

fn owned_wallet(wallet: Option<Wallet>, actor: &Actor) -> LedgerResult<Wallet> {
    wallet
        .filter(|w| w.user_id == actor.user_id)
        .ok_or(LedgerError::WalletNotFound)
}
