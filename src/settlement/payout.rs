//! Pool math for one currency of one market. Pure: no store access.

use crate::error::{LedgerError, LedgerResult};
use crate::models::{checked_total, Currency, Order, Outcome, MINOR_UNIT, MONEY_SCALE};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

/// Fee on the losing pool, rounded to the minor unit (half away from zero).
pub fn platform_fee(losing_pool: Decimal, fee_rate: Decimal) -> Decimal {
    (losing_pool * fee_rate)
        .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Split `distributable` across `stakes` pro rata, in minor units.
///
/// Each share is floored to the minor unit; leftover cents go one at a time to the
/// largest fractional remainders, earlier stakes first on ties. The result always sums
/// to `distributable` exactly.
pub fn allocate_shares(stakes: &[Decimal], distributable: Decimal) -> LedgerResult<Vec<Decimal>> {
    let pool = checked_total("winning pool", stakes.iter().copied())?;
    if stakes.is_empty() || pool <= Decimal::ZERO || distributable <= Decimal::ZERO {
        return Ok(vec![Decimal::ZERO; stakes.len()]);
    }

    let mut shares = Vec::with_capacity(stakes.len());
    let mut remainders = Vec::with_capacity(stakes.len());
    for stake in stakes {
        // Divide first when stake * distributable leaves the Decimal range
        let exact = stake
            .checked_mul(distributable)
            .and_then(|product| product.checked_div(pool))
            .or_else(|| {
                distributable
                    .checked_div(pool)
                    .and_then(|ratio| ratio.checked_mul(*stake))
            })
            .ok_or_else(|| {
                LedgerError::Invariant(format!("share of stake {} overflowed", stake))
            })?;
        let floored = exact.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero);
        shares.push(floored);
        remainders.push(exact - floored);
    }

    let mut ranked: Vec<usize> = (0..stakes.len()).collect();
    // Stable sort keeps earlier stakes ahead on equal remainders
    ranked.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]));

    let mut leftover = distributable - checked_total("allocated shares", shares.iter().copied())?;
    for idx in ranked.iter().cycle() {
        if leftover < MINOR_UNIT {
            break;
        }
        shares[*idx] += MINOR_UNIT;
        leftover -= MINOR_UNIT;
    }
    // The divide-first ratio rounds at 28 digits and can overshoot by a cent
    for idx in ranked.iter().rev().cycle() {
        if leftover >= Decimal::ZERO {
            break;
        }
        if shares[*idx] >= MINOR_UNIT {
            shares[*idx] -= MINOR_UNIT;
            leftover += MINOR_UNIT;
        }
    }

    Ok(shares)
}

/// What settlement does to one locked order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Movement {
    /// No-contest: order cancelled, stake released untouched
    Refund { order_id: Uuid, wallet_id: Uuid, amount: Decimal },
    /// Losing stake forfeited in full
    Forfeit { order_id: Uuid, wallet_id: Uuid, amount: Decimal },
    /// Winning stake released plus `share` of the distributable pool
    Payout {
        order_id: Uuid,
        wallet_id: Uuid,
        amount: Decimal,
        share: Decimal,
    },
}

impl Movement {
    pub fn order_id(&self) -> Uuid {
        match self {
            Movement::Refund { order_id, .. }
            | Movement::Forfeit { order_id, .. }
            | Movement::Payout { order_id, .. } => *order_id,
        }
    }
}

/// Settlement plan for the locked orders of one currency.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolPlan {
    pub currency: Currency,
    pub winning_pool: Decimal,
    pub losing_pool: Decimal,
    pub platform_fee: Decimal,
    pub distributable_pool: Decimal,
    pub movements: Vec<Movement>,
}

impl PoolPlan {
    /// Both sides staked something: money changes hands.
    pub fn is_contested(&self) -> bool {
        self.winning_pool > Decimal::ZERO && self.losing_pool > Decimal::ZERO
    }

    pub fn total_payout(&self) -> Decimal {
        self.movements
            .iter()
            .map(|m| match m {
                Movement::Payout { share, .. } => *share,
                _ => Decimal::ZERO,
            })
            .sum()
    }
}

/// Build the plan for `orders`, which must all be locked and share `currency`.
pub fn plan_pool(
    currency: Currency,
    orders: &[Order],
    winning: Outcome,
    fee_rate: Decimal,
) -> LedgerResult<PoolPlan> {
    let (winners, losers): (Vec<&Order>, Vec<&Order>) =
        orders.iter().partition(|o| o.outcome == winning);

    let winning_pool = checked_total("winning pool", winners.iter().map(|o| o.amount))?;
    let losing_pool = checked_total("losing pool", losers.iter().map(|o| o.amount))?;

    if winning_pool.is_zero() || losing_pool.is_zero() {
        return Ok(PoolPlan {
            currency,
            winning_pool,
            losing_pool,
            platform_fee: Decimal::ZERO,
            distributable_pool: Decimal::ZERO,
            movements: orders
                .iter()
                .map(|o| Movement::Refund {
                    order_id: o.id,
                    wallet_id: o.wallet_id,
                    amount: o.amount,
                })
                .collect(),
        });
    }

    let platform_fee = platform_fee(losing_pool, fee_rate);
    let distributable_pool = losing_pool - platform_fee;

    let stakes: Vec<Decimal> = winners.iter().map(|o| o.amount).collect();
    let shares = allocate_shares(&stakes, distributable_pool)?;

    let mut movements = Vec::with_capacity(orders.len());
    movements.extend(losers.iter().map(|o| Movement::Forfeit {
        order_id: o.id,
        wallet_id: o.wallet_id,
        amount: o.amount,
    }));
    movements.extend(winners.iter().zip(shares).map(|(o, share)| Movement::Payout {
        order_id: o.id,
        wallet_id: o.wallet_id,
        amount: o.amount,
        share,
    }));

    Ok(PoolPlan {
        currency,
        winning_pool,
        losing_pool,
        platform_fee,
        distributable_pool,
        movements,
    })
}
