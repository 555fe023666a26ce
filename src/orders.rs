//! Order Lifecycle Manager
//! Mission: Place and cancel stakes without ever locking or releasing funds twice
//!
//! Both operations run as one unit of work: every precondition is checked against the
//! state the write will see, and any failure leaves no trace.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{EntryLink, LedgerStore};
use crate::markets::market_status;
use crate::models::{
    validate_money, validate_page, Actor, Order, OrderStatus, Outcome, Page, MINOR_UNIT,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceStake {
    pub market_id: Uuid,
    pub wallet_id: Uuid,
    pub amount: Decimal,
    pub outcome: Outcome,
}

#[derive(Clone)]
pub struct OrderLifecycleManager {
    store: LedgerStore,
}

impl OrderLifecycleManager {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Lock `amount` in the actor's wallet and record a `locked` order.
    ///
    /// Checked in order: market exists, market is open, wallet exists and belongs to the
    /// actor, available funds cover the stake.
    pub fn place_stake(&self, actor: &Actor, request: PlaceStake) -> LedgerResult<Order> {
        let amount = validate_money("amount", request.amount, MINOR_UNIT)?;

        let result = self.store.unit_of_work(|uow| {
            if !market_status(uow, request.market_id)?.accepts_stakes() {
                return Err(LedgerError::MarketNotOpen);
            }

            let wallet = uow
                .find_wallet(request.wallet_id)?
                .filter(|w| w.user_id == actor.user_id)
                .ok_or(LedgerError::WalletNotFound)?;

            let now = uow.now();
            let order = Order {
                id: Uuid::new_v4(),
                market_id: request.market_id,
                user_id: actor.user_id,
                wallet_id: wallet.id,
                currency: wallet.currency,
                amount,
                outcome: request.outcome,
                status: OrderStatus::Locked,
                payout: None,
                created_at: now,
                updated_at: now,
            };

            uow.lock_funds(wallet.id, amount, EntryLink::order(&order))?;
            uow.insert_order(&order)?;
            Ok(order)
        });

        match &result {
            Ok(order) => info!(
                order_id = %order.id,
                market_id = %order.market_id,
                wallet_id = %order.wallet_id,
                amount = %order.amount,
                outcome = %order.outcome,
                "Stake placed"
            ),
            Err(e) => warn!(
                market_id = %request.market_id,
                wallet_id = %request.wallet_id,
                amount = %amount,
                error = %e,
                "Stake rejected"
            ),
        }
        result
    }

    /// Cancel a `locked` stake and release its funds.
    ///
    /// The status flip is conditional on `locked`; a cancel that loses to settlement (or
    /// to another cancel) gets `Conflict` and moves no money.
    pub fn cancel_stake(&self, actor: &Actor, order_id: Uuid) -> LedgerResult<Order> {
        let result = self.store.unit_of_work(|uow| {
            let order = uow
                .find_order(order_id)?
                .filter(|o| o.user_id == actor.user_id)
                .ok_or(LedgerError::OrderNotFound)?;

            if order.status != OrderStatus::Locked {
                return Err(LedgerError::Conflict {
                    order_id,
                    current: order.status,
                });
            }
            if !market_status(uow, order.market_id)?.accepts_stakes() {
                return Err(LedgerError::MarketNotOpen);
            }

            let cancelled =
                uow.set_order_status(order_id, OrderStatus::Locked, OrderStatus::Cancelled, None)?;
            uow.unlock_funds(order.wallet_id, order.amount, EntryLink::order(&order))?;
            Ok(cancelled)
        });

        match &result {
            Ok(order) => info!(
                order_id = %order.id,
                wallet_id = %order.wallet_id,
                amount = %order.amount,
                "Stake cancelled"
            ),
            Err(e) => warn!(order_id = %order_id, error = %e, "Cancel rejected"),
        }
        result
    }

    /// Someone else's order is reported as missing.
    pub fn order(&self, actor: &Actor, order_id: Uuid) -> LedgerResult<Order> {
        self.store.read(|uow| {
            uow.find_order(order_id)?
                .filter(|o| o.user_id == actor.user_id)
                .ok_or(LedgerError::OrderNotFound)
        })
    }

    /// The actor's orders, newest first, optionally for one market.
    pub fn orders(
        &self,
        actor: &Actor,
        market_id: Option<Uuid>,
        page: u32,
        page_size: u32,
    ) -> LedgerResult<Page<Order>> {
        validate_page(page, page_size)?;
        let offset = (page - 1).saturating_mul(page_size);

        self.store.read(|uow| {
            let items = uow.orders_for_user(actor.user_id, market_id, page_size, offset)?;
            let total = uow.count_orders_for_user(actor.user_id, market_id)?;
            Ok(Page::new(items, page, page_size, total))
        })
    }
}
