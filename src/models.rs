//! Ledger Data Models
//! Mission: Typed wallets, stakes and markets with forward-only state machines

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Smallest representable amount in every supported currency (2 decimal places).
pub const MINOR_UNIT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);
pub const MONEY_SCALE: u32 = 2;
/// Ceiling for any single opening balance, deposit or stake: 10^13 whole units (10^15 minor units).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x4E72_A000, 0x918, 0, false, 0);

/// Text-backed enums: string form for JSON, SQLite and logs.
macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Currency {
    #[serde(rename = "INR")]
    Inr,
    #[serde(rename = "USD")]
    Usd,
}

text_enum!(Currency { Inr => "INR", Usd => "USD" });

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Outcome {
    Yes,
    No,
}

text_enum!(Outcome { Yes => "Yes", No => "No" });

/// Order state machine: `locked -> cancelled` or `locked -> settled`, both terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Locked,
    Cancelled,
    Settled,
}

text_enum!(OrderStatus { Locked => "locked", Cancelled => "cancelled", Settled => "settled" });

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Locked)
    }

    /// Returns the target status if the move is legal.
    pub fn transition(self, next: OrderStatus) -> LedgerResult<OrderStatus> {
        match (self, next) {
            (OrderStatus::Locked, OrderStatus::Cancelled)
            | (OrderStatus::Locked, OrderStatus::Settled) => Ok(next),
            (from, to) => Err(LedgerError::Invariant(format!(
                "illegal order transition {} -> {}",
                from, to
            ))),
        }
    }
}

/// Market state machine: `open -> closed -> settled`, `open -> settled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
    Settled,
}

text_enum!(MarketStatus { Open => "open", Closed => "closed", Settled => "settled" });

impl MarketStatus {
    pub fn accepts_stakes(&self) -> bool {
        matches!(self, MarketStatus::Open)
    }

    pub fn close(self) -> LedgerResult<MarketStatus> {
        match self {
            MarketStatus::Open => Ok(MarketStatus::Closed),
            MarketStatus::Closed => Err(LedgerError::MarketNotOpen),
            MarketStatus::Settled => Err(LedgerError::AlreadySettled),
        }
    }

    pub fn settle(self) -> LedgerResult<MarketStatus> {
        match self {
            MarketStatus::Open | MarketStatus::Closed => Ok(MarketStatus::Settled),
            MarketStatus::Settled => Err(LedgerError::AlreadySettled),
        }
    }
}

/// Roles for RBAC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

text_enum!(Role { Admin => "admin", User => "user" });

/// Identity supplied by the auth collaborator for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn require_admin(&self) -> LedgerResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(LedgerError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub balance: Decimal,
    pub locked_balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn available(&self) -> Decimal {
        self.balance - self.locked_balance
    }

    /// `0 <= locked_balance <= balance`
    pub fn is_consistent(&self) -> bool {
        self.locked_balance >= Decimal::ZERO && self.locked_balance <= self.balance
    }
}

/// A stake on one outcome of a market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub market_id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub amount: Decimal,
    pub outcome: Outcome,
    pub status: OrderStatus,
    /// Amount released back to available funds at settlement (0 for a losing stake)
    pub payout: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_won(&self) -> bool {
        self.status == OrderStatus::Settled && self.payout.is_some_and(|p| p > Decimal::ZERO)
    }

    pub fn is_lost(&self) -> bool {
        self.status == OrderStatus::Settled && self.payout.is_some_and(|p| p.is_zero())
    }

    /// Net result of a settled stake.
    pub fn pnl(&self) -> Decimal {
        match (self.status, self.payout) {
            (OrderStatus::Settled, Some(payout)) => payout - self.amount,
            _ => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: MarketStatus,
    pub end_date: DateTime<Utc>,
    pub winning_outcome: Option<Outcome>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fee taken from one currency pool of a contested settlement. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformRevenue {
    pub id: Uuid,
    pub market_id: Uuid,
    pub revenue: Decimal,
    pub fee_percentage: Decimal,
    pub currency: Currency,
    pub settlement_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Deposit,
    Lock,
    Unlock,
    Credit,
    Debit,
}

text_enum!(EntryKind {
    Deposit => "deposit",
    Lock => "lock",
    Unlock => "unlock",
    Credit => "credit",
    Debit => "debit",
});

/// Journal line written alongside every balance movement.
///
/// Replaying the deltas of a wallet's entries reproduces its balance and locked balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub seq: i64,
    pub wallet_id: Uuid,
    pub order_id: Option<Uuid>,
    pub market_id: Option<Uuid>,
    pub kind: EntryKind,
    pub balance_delta: Decimal,
    pub locked_delta: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One page of a listing plus enough to request the next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total: u64) -> Self {
        let seen = u64::from(page.saturating_sub(1)) * u64::from(page_size) + items.len() as u64;
        Self {
            items,
            page,
            page_size,
            total,
            has_more: seen < total,
        }
    }
}

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 100;

pub fn validate_page(page: u32, page_size: u32) -> LedgerResult<()> {
    if page == 0 {
        return Err(LedgerError::validation("page: must be at least 1"));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(LedgerError::validation(format!(
            "pageSize: must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

/// Ensure a monetary amount is positive and representable in minor units.
pub fn validate_money(field: &str, amount: Decimal, minimum: Decimal) -> LedgerResult<Decimal> {
    if amount < minimum {
        return Err(LedgerError::validation(format!(
            "{}: must be at least {}",
            field, minimum
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::validation(format!(
            "{}: must be at most {}",
            field, MAX_AMOUNT
        )));
    }
    let normalized = amount.normalize();
    if normalized.scale() > MONEY_SCALE {
        return Err(LedgerError::validation(format!(
            "{}: at most {} decimal places allowed",
            field, MONEY_SCALE
        )));
    }
    Ok(normalized)
}

/// Sum `amounts`, reporting an invariant breach instead of overflowing.
pub fn checked_total<I>(what: &str, amounts: I) -> LedgerResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    amounts.into_iter().try_fold(Decimal::ZERO, |total, amount| {
        total
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Invariant(format!("{} overflowed", what)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_transitions_are_forward_only() {
        assert_eq!(
            OrderStatus::Locked.transition(OrderStatus::Cancelled).unwrap(),
            OrderStatus::Cancelled
        );
        assert_eq!(
            OrderStatus::Locked.transition(OrderStatus::Settled).unwrap(),
            OrderStatus::Settled
        );
        assert!(OrderStatus::Cancelled.transition(OrderStatus::Settled).is_err());
        assert!(OrderStatus::Settled.transition(OrderStatus::Cancelled).is_err());
        assert!(OrderStatus::Locked.transition(OrderStatus::Locked).is_err());
    }

    #[test]
    fn test_market_transitions() {
        assert_eq!(MarketStatus::Open.close().unwrap(), MarketStatus::Closed);
        assert!(matches!(
            MarketStatus::Closed.close(),
            Err(LedgerError::MarketNotOpen)
        ));
        assert_eq!(MarketStatus::Closed.settle().unwrap(), MarketStatus::Settled);
        assert!(matches!(
            MarketStatus::Settled.settle(),
            Err(LedgerError::AlreadySettled)
        ));
        assert!(MarketStatus::Open.accepts_stakes());
        assert!(!MarketStatus::Closed.accepts_stakes());
    }

    #[test]
    fn test_enum_text_round_trip() {
        assert_eq!("INR".parse::<Currency>().unwrap(), Currency::Inr);
        assert_eq!(Outcome::No.as_str(), "No");
        assert!("maybe".parse::<Outcome>().is_err());

        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, r#""cancelled""#);
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_validate_money() {
        assert_eq!(
            validate_money("amount", dec!(400.00), MINOR_UNIT).unwrap(),
            dec!(400)
        );
        assert!(validate_money("amount", dec!(0), MINOR_UNIT).is_err());
        assert!(validate_money("amount", dec!(-5), MINOR_UNIT).is_err());
        assert!(validate_money("amount", dec!(1.005), MINOR_UNIT).is_err());
        assert!(validate_money("amount", dec!(0.5), Decimal::ONE).is_err());
    }

    #[test]
    fn test_amount_ceiling() {
        assert_eq!(MAX_AMOUNT, dec!(10000000000000));
        assert_eq!(
            validate_money("amount", MAX_AMOUNT, MINOR_UNIT).unwrap(),
            MAX_AMOUNT
        );
        let err = validate_money("amount", MAX_AMOUNT + MINOR_UNIT, MINOR_UNIT).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert!(matches!(
            validate_money("balance", Decimal::MAX, MINOR_UNIT),
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_checked_total_reports_overflow() {
        assert_eq!(
            checked_total("pool", [dec!(1.50), dec!(2.25)]).unwrap(),
            dec!(3.75)
        );
        assert_eq!(checked_total("pool", []).unwrap(), Decimal::ZERO);
        assert!(matches!(
            checked_total("pool", [Decimal::MAX, Decimal::ONE]),
            Err(LedgerError::Invariant(_))
        ));
    }

    #[test]
    fn test_page_has_more() {
        let page = Page::new(vec![1, 2], 1, 2, 5);
        assert!(page.has_more);
        let last = Page::new(vec![5], 3, 2, 5);
        assert!(!last.has_more);
        assert!(validate_page(0, 10).is_err());
        assert!(validate_page(1, MAX_PAGE_SIZE + 1).is_err());
    }

    #[test]
    fn test_wallet_available_and_consistency() {
        let now = Utc::now();
        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency: Currency::Inr,
            balance: dec!(1000),
            locked_balance: dec!(400),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(wallet.available(), dec!(600));
        assert!(wallet.is_consistent());
    }

    #[test]
    fn test_order_pnl() {
        let now = Utc::now();
        let mut order = Order {
            id: Uuid::new_v4(),
            market_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            currency: Currency::Inr,
            amount: dec!(400),
            outcome: Outcome::Yes,
            status: OrderStatus::Locked,
            payout: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(order.pnl(), Decimal::ZERO);

        order.status = OrderStatus::Settled;
        order.payout = Some(dec!(988));
        assert!(order.is_won());
        assert_eq!(order.pnl(), dec!(588));

        order.payout = Some(Decimal::ZERO);
        assert!(order.is_lost());
        assert_eq!(order.pnl(), dec!(-400));
    }
}
