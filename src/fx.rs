//! Static FX table
//! Mission: Cross-currency reporting only; funds never change currency

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Currency, MONEY_SCALE};
use rust_decimal::{Decimal, RoundingStrategy};

/// Default USD -> INR rate.
pub const DEFAULT_USD_INR: Decimal = Decimal::from_parts(83, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxTable {
    usd_inr: Decimal,
}

impl Default for FxTable {
    fn default() -> Self {
        Self {
            usd_inr: DEFAULT_USD_INR,
        }
    }
}

impl FxTable {
    /// Returns `None` unless the rate is positive.
    pub fn new(usd_inr: Decimal) -> Option<Self> {
        (usd_inr > Decimal::ZERO).then_some(Self { usd_inr })
    }

    /// Units of `to` per one unit of `from`.
    pub fn rate(&self, from: Currency, to: Currency) -> Decimal {
        match (from, to) {
            (Currency::Usd, Currency::Inr) => self.usd_inr,
            (Currency::Inr, Currency::Usd) => Decimal::ONE / self.usd_inr,
            _ => Decimal::ONE,
        }
    }

    /// Converted amount, rounded to the minor unit.
    pub fn convert(&self, amount: Decimal, from: Currency, to: Currency) -> LedgerResult<Decimal> {
        if from == to {
            return Ok(amount);
        }
        amount
            .checked_mul(self.rate(from, to))
            .map(|v| v.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
            .ok_or_else(|| {
                LedgerError::Invariant(format!("{} {} does not fit in {}", amount, from, to))
            })
    }
}
