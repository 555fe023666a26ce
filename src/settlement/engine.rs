use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{EntryLink, LedgerStore, UnitOfWork};
use crate::markets::{market_status, set_market_settled};
use crate::models::{
    Actor, Currency, Market, MarketStatus, Order, OrderStatus, Outcome, PlatformRevenue,
};
use crate::settlement::payout::{plan_pool, Movement, PoolPlan};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Per-currency outcome of a settlement.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolReport {
    pub currency: Currency,
    pub contested: bool,
    pub winning_pool: Decimal,
    pub losing_pool: Decimal,
    pub platform_fee: Decimal,
    pub distributable_pool: Decimal,
    pub orders_settled: usize,
    pub orders_refunded: usize,
}

impl From<&PoolPlan> for PoolReport {
    fn from(plan: &PoolPlan) -> Self {
        let refunded = plan
            .movements
            .iter()
            .filter(|m| matches!(m, Movement::Refund { .. }))
            .count();
        Self {
            currency: plan.currency,
            contested: plan.is_contested(),
            winning_pool: plan.winning_pool,
            losing_pool: plan.losing_pool,
            platform_fee: plan.platform_fee,
            distributable_pool: plan.distributable_pool,
            orders_settled: plan.movements.len() - refunded,
            orders_refunded: refunded,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub market: Market,
    pub pools: Vec<PoolReport>,
}

/// Resolves every locked order of a market in one unit of work.
#[derive(Clone)]
pub struct SettlementEngine {
    store: LedgerStore,
    fee_rate: Decimal,
}

impl SettlementEngine {
    /// `fee_rate` must lie in `[0, 1)`.
    pub fn new(store: LedgerStore, fee_rate: Decimal) -> LedgerResult<Self> {
        if fee_rate < Decimal::ZERO || fee_rate >= Decimal::ONE {
            return Err(LedgerError::validation(format!(
                "fee rate {} outside [0, 1)",
                fee_rate
            )));
        }
        Ok(Self { store, fee_rate })
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Settle `market_id` with `winning` as the resolved outcome.
    ///
    /// The market transition, every order status flip, every wallet movement and the
    /// revenue records commit together or not at all. Orders are pooled per currency;
    /// a pool with no stake on one side is refunded without a fee.
    pub fn settle(
        &self,
        actor: &Actor,
        market_id: Uuid,
        winning: Outcome,
    ) -> LedgerResult<SettlementReport> {
        actor.require_admin()?;

        let result = self.store.unit_of_work(|uow| {
            if market_status(uow, market_id)? == MarketStatus::Settled {
                return Err(LedgerError::AlreadySettled);
            }
            let market = set_market_settled(uow, market_id, winning)?;

            let mut pools: BTreeMap<Currency, Vec<Order>> = BTreeMap::new();
            for order in uow.locked_orders_for_market(market_id)? {
                pools.entry(order.currency).or_default().push(order);
            }

            let mut reports = Vec::with_capacity(pools.len());
            for (currency, orders) in &pools {
                let plan = plan_pool(*currency, orders, winning, self.fee_rate)?;
                self.apply_plan(uow, &market, &plan)?;
                reports.push(PoolReport::from(&plan));
            }

            Ok(SettlementReport {
                market,
                pools: reports,
            })
        });

        match &result {
            Ok(report) => {
                for pool in &report.pools {
                    info!(
                        market_id = %market_id,
                        winning = %winning,
                        currency = %pool.currency,
                        contested = pool.contested,
                        winning_pool = %pool.winning_pool,
                        losing_pool = %pool.losing_pool,
                        platform_fee = %pool.platform_fee,
                        settled = pool.orders_settled,
                        refunded = pool.orders_refunded,
                        "Market pool settled"
                    );
                }
                info!(market_id = %market_id, winning = %winning, "Market settled");
            }
            Err(LedgerError::Invariant(msg)) => {
                error!(market_id = %market_id, error = %msg, "Settlement aborted on invariant breach");
            }
            Err(e) => warn!(market_id = %market_id, error = %e, "Settlement rejected"),
        }
        result
    }

    fn apply_plan(
        &self,
        uow: &mut UnitOfWork<'_>,
        market: &Market,
        plan: &PoolPlan,
    ) -> LedgerResult<()> {
        if plan.platform_fee > Decimal::ZERO {
            uow.insert_revenue(&PlatformRevenue {
                id: Uuid::new_v4(),
                market_id: market.id,
                revenue: plan.platform_fee,
                fee_percentage: self.fee_rate,
                currency: plan.currency,
                settlement_date: uow.now(),
            })?;
        }

        for movement in &plan.movements {
            let link = EntryLink::for_order(movement.order_id(), market.id);
            match *movement {
                Movement::Refund {
                    order_id,
                    wallet_id,
                    amount,
                } => {
                    uow.set_order_status(order_id, OrderStatus::Locked, OrderStatus::Cancelled, None)?;
                    uow.unlock_funds(wallet_id, amount, link)?;
                    debug!(order_id = %order_id, amount = %amount, "Refunded no-contest stake");
                }
                Movement::Forfeit {
                    order_id,
                    wallet_id,
                    amount,
                } => {
                    uow.set_order_status(
                        order_id,
                        OrderStatus::Locked,
                        OrderStatus::Settled,
                        Some(Decimal::ZERO),
                    )?;
                    uow.debit_and_unlock(wallet_id, amount, amount, link)?;
                    debug!(order_id = %order_id, amount = %amount, "Forfeited losing stake");
                }
                Movement::Payout {
                    order_id,
                    wallet_id,
                    amount,
                    share,
                } => {
                    let payout = amount.checked_add(share).ok_or_else(|| {
                        LedgerError::Invariant(format!("payout of order {} overflowed", order_id))
                    })?;
                    uow.set_order_status(
                        order_id,
                        OrderStatus::Locked,
                        OrderStatus::Settled,
                        Some(payout),
                    )?;
                    uow.credit_and_unlock(wallet_id, share, amount, link)?;
                    debug!(
                        order_id = %order_id,
                        amount = %amount,
                        share = %share,
                        "Paid winning stake"
                    );
                }
            }
        }
        Ok(())
    }

    /// Fee records, newest first. Admin only.
    pub fn revenue(
        &self,
        actor: &Actor,
        market_id: Option<Uuid>,
    ) -> LedgerResult<Vec<PlatformRevenue>> {
        actor.require_admin()?;
        self.store.read(|uow| uow.revenues(market_id))
    }
}
