use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Currency, EntryKind, LedgerEntry, Market, MarketStatus, Order, OrderStatus, Outcome,
    PlatformRevenue, Wallet,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, error};
use uuid::Uuid;

const WALLET_COLUMNS: &str =
    "id, user_id, currency, balance, locked_balance, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, market_id, user_id, wallet_id, currency, amount, outcome, \
     status, payout, created_at, updated_at";

const MARKET_COLUMNS: &str =
    "id, title, description, category, status, end_date, winning_outcome, settled_at, created_at";

/// Order/market a journal entry belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryLink {
    pub order_id: Option<Uuid>,
    pub market_id: Option<Uuid>,
}

impl EntryLink {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_order(order_id: Uuid, market_id: Uuid) -> Self {
        Self {
            order_id: Some(order_id),
            market_id: Some(market_id),
        }
    }

    pub fn order(order: &Order) -> Self {
        Self::for_order(order.id, order.market_id)
    }
}

/// Market listing filter. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketQuery {
    pub category: Option<String>,
    pub status: Option<MarketStatus>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for MarketQuery {
    fn default() -> Self {
        Self {
            category: None,
            status: None,
            page: 1,
            page_size: 10,
        }
    }
}

impl MarketQuery {
    fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// Primitives available inside one ledger transaction.
///
/// Every balance movement re-checks `0 <= locked <= balance` before it is written and
/// appends one journal entry. A failed check returns `LedgerError::Invariant`, which
/// rolls the whole unit back.
pub struct UnitOfWork<'c> {
    conn: &'c Connection,
    now: DateTime<Utc>,
}

impl<'c> UnitOfWork<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self {
            conn,
            now: Utc::now(),
        }
    }

    /// Timestamp shared by every row written in this unit.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        self.conn
    }

    // ---------------------------------------------------------------
    // Wallets
    // ---------------------------------------------------------------

    pub fn open_wallet(
        &mut self,
        user_id: Uuid,
        currency: Currency,
        opening_balance: Decimal,
    ) -> LedgerResult<Wallet> {
        if opening_balance < Decimal::ZERO {
            return Err(LedgerError::Invariant(format!(
                "opening balance {} is negative",
                opening_balance
            )));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            currency,
            balance: opening_balance,
            locked_balance: Decimal::ZERO,
            created_at: self.now,
            updated_at: self.now,
        };

        self.conn
            .execute(
                "INSERT INTO wallets (id, user_id, currency, balance, locked_balance, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    wallet.id.to_string(),
                    user_id.to_string(),
                    currency,
                    money(opening_balance),
                    money(Decimal::ZERO),
                    timestamp(self.now),
                ],
            )
            .map_err(|e| unique_violation(e, LedgerError::WalletExists))?;

        if opening_balance > Decimal::ZERO {
            self.journal(
                wallet.id,
                EntryKind::Deposit,
                opening_balance,
                Decimal::ZERO,
                EntryLink::none(),
            )?;
        }

        Ok(wallet)
    }

    pub fn find_wallet(&self, wallet_id: Uuid) -> LedgerResult<Option<Wallet>> {
        let sql = format!("SELECT {} FROM wallets WHERE id = ?1", WALLET_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![wallet_id.to_string()], wallet_from_row)
            .optional()?)
    }

    pub fn wallet(&self, wallet_id: Uuid) -> LedgerResult<Wallet> {
        self.find_wallet(wallet_id)?
            .ok_or(LedgerError::WalletNotFound)
    }

    pub fn wallets_for_user(&self, user_id: Uuid) -> LedgerResult<Vec<Wallet>> {
        let sql = format!(
            "SELECT {} FROM wallets WHERE user_id = ?1 ORDER BY currency",
            WALLET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let wallets = stmt
            .query_map(params![user_id.to_string()], wallet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(wallets)
    }

    pub fn deposit(&mut self, wallet_id: Uuid, amount: Decimal) -> LedgerResult<Wallet> {
        require_positive("deposit", amount)?;
        self.move_funds(
            wallet_id,
            EntryKind::Deposit,
            amount,
            Decimal::ZERO,
            EntryLink::none(),
        )
    }

    /// Reserve `amount` of available funds. Fails if `balance - locked < amount`.
    pub fn lock_funds(
        &mut self,
        wallet_id: Uuid,
        amount: Decimal,
        link: EntryLink,
    ) -> LedgerResult<Wallet> {
        require_positive("lock", amount)?;
        let wallet = self.wallet(wallet_id)?;
        if wallet.available() < amount {
            return Err(LedgerError::InsufficientFunds {
                available: wallet.available(),
                requested: amount,
            });
        }
        self.move_funds(wallet_id, EntryKind::Lock, Decimal::ZERO, amount, link)
    }

    pub fn unlock_funds(
        &mut self,
        wallet_id: Uuid,
        amount: Decimal,
        link: EntryLink,
    ) -> LedgerResult<Wallet> {
        require_positive("unlock", amount)?;
        self.move_funds(wallet_id, EntryKind::Unlock, Decimal::ZERO, -amount, link)
    }

    /// Winning settlement: add `credit` to the balance and release `unlock` of locked funds.
    pub fn credit_and_unlock(
        &mut self,
        wallet_id: Uuid,
        credit: Decimal,
        unlock: Decimal,
        link: EntryLink,
    ) -> LedgerResult<Wallet> {
        if credit < Decimal::ZERO {
            return Err(LedgerError::Invariant(format!("negative credit {}", credit)));
        }
        require_positive("unlock", unlock)?;
        self.move_funds(wallet_id, EntryKind::Credit, credit, -unlock, link)
    }

    /// Losing settlement: remove `debit` from the balance and release `unlock` of locked funds.
    pub fn debit_and_unlock(
        &mut self,
        wallet_id: Uuid,
        debit: Decimal,
        unlock: Decimal,
        link: EntryLink,
    ) -> LedgerResult<Wallet> {
        require_positive("debit", debit)?;
        require_positive("unlock", unlock)?;
        self.move_funds(wallet_id, EntryKind::Debit, -debit, -unlock, link)
    }

    fn move_funds(
        &mut self,
        wallet_id: Uuid,
        kind: EntryKind,
        balance_delta: Decimal,
        locked_delta: Decimal,
        link: EntryLink,
    ) -> LedgerResult<Wallet> {
        let mut wallet = self.wallet(wallet_id)?;
        let (balance, locked) = match (
            wallet.balance.checked_add(balance_delta),
            wallet.locked_balance.checked_add(locked_delta),
        ) {
            (Some(balance), Some(locked)) => (balance, locked),
            _ => {
                error!(
                    wallet_id = %wallet_id,
                    kind = %kind,
                    balance_delta = %balance_delta,
                    locked_delta = %locked_delta,
                    "Refusing movement that overflows the wallet"
                );
                return Err(LedgerError::Invariant(format!(
                    "{} on wallet {} overflows balance={} locked={}",
                    kind, wallet_id, wallet.balance, wallet.locked_balance
                )));
            }
        };

        if locked < Decimal::ZERO || locked > balance {
            error!(
                wallet_id = %wallet_id,
                kind = %kind,
                balance = %balance,
                locked = %locked,
                order_id = ?link.order_id,
                "Refusing movement that breaks 0 <= locked <= balance"
            );
            return Err(LedgerError::Invariant(format!(
                "{} on wallet {} would leave balance={} locked={}",
                kind, wallet_id, balance, locked
            )));
        }

        self.conn.execute(
            "UPDATE wallets SET balance = ?1, locked_balance = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                money(balance),
                money(locked),
                timestamp(self.now),
                wallet_id.to_string()
            ],
        )?;
        self.journal(wallet_id, kind, balance_delta, locked_delta, link)?;

        debug!(
            wallet_id = %wallet_id,
            kind = %kind,
            balance = %balance,
            locked = %locked,
            "Wallet movement applied"
        );

        wallet.balance = balance;
        wallet.locked_balance = locked;
        wallet.updated_at = self.now;
        Ok(wallet)
    }

    fn journal(
        &self,
        wallet_id: Uuid,
        kind: EntryKind,
        balance_delta: Decimal,
        locked_delta: Decimal,
        link: EntryLink,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO ledger_entries (wallet_id, order_id, market_id, kind, balance_delta, locked_delta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                wallet_id.to_string(),
                link.order_id.map(|id| id.to_string()),
                link.market_id.map(|id| id.to_string()),
                kind,
                money(balance_delta),
                money(locked_delta),
                timestamp(self.now),
            ],
        )?;
        Ok(())
    }

    pub fn entries_for_wallet(&self, wallet_id: Uuid) -> LedgerResult<Vec<LedgerEntry>> {
        self.entries_where("wallet_id = ?1", wallet_id)
    }

    pub fn entries_for_order(&self, order_id: Uuid) -> LedgerResult<Vec<LedgerEntry>> {
        self.entries_where("order_id = ?1", order_id)
    }

    fn entries_where(&self, filter: &str, id: Uuid) -> LedgerResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT seq, wallet_id, order_id, market_id, kind, balance_delta, locked_delta, created_at
             FROM ledger_entries WHERE {} ORDER BY seq",
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![id.to_string()], |row| {
                Ok(LedgerEntry {
                    seq: row.get(0)?,
                    wallet_id: parse_col(row, 1)?,
                    order_id: parse_opt_col(row, 2)?,
                    market_id: parse_opt_col(row, 3)?,
                    kind: row.get(4)?,
                    balance_delta: parse_col(row, 5)?,
                    locked_delta: parse_col(row, 6)?,
                    created_at: parse_col(row, 7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ---------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------

    pub fn insert_order(&mut self, order: &Order) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO orders (id, market_id, user_id, wallet_id, currency, amount, outcome, status, payout, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                order.id.to_string(),
                order.market_id.to_string(),
                order.user_id.to_string(),
                order.wallet_id.to_string(),
                order.currency,
                money(order.amount),
                order.outcome,
                order.status,
                order.payout.map(money),
                timestamp(order.created_at),
                timestamp(order.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn find_order(&self, order_id: Uuid) -> LedgerResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![order_id.to_string()], order_from_row)
            .optional()?)
    }

    pub fn order(&self, order_id: Uuid) -> LedgerResult<Order> {
        self.find_order(order_id)?.ok_or(LedgerError::OrderNotFound)
    }

    /// Conditional status update: only applies if the stored status is still `expected`.
    ///
    /// Losing the race yields `Conflict` carrying the status that won.
    pub fn set_order_status(
        &mut self,
        order_id: Uuid,
        expected: OrderStatus,
        next: OrderStatus,
        payout: Option<Decimal>,
    ) -> LedgerResult<Order> {
        expected.transition(next)?;

        let changed = self.conn.execute(
            "UPDATE orders SET status = ?1, payout = ?2, updated_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![
                next,
                payout.map(money),
                timestamp(self.now),
                order_id.to_string(),
                expected
            ],
        )?;

        if changed == 0 {
            let current = self.order(order_id)?;
            debug!(
                order_id = %order_id,
                expected = %expected,
                current = %current.status,
                "Conditional order update lost"
            );
            return Err(LedgerError::Conflict {
                order_id,
                current: current.status,
            });
        }

        self.order(order_id)
    }

    /// Locked orders of a market in placement order.
    pub fn locked_orders_for_market(&self, market_id: Uuid) -> LedgerResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE market_id = ?1 AND status = ?2 ORDER BY created_at, rowid",
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let orders = stmt
            .query_map(
                params![market_id.to_string(), OrderStatus::Locked],
                order_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    /// Newest first.
    pub fn orders_for_user(
        &self,
        user_id: Uuid,
        market_id: Option<Uuid>,
        limit: u32,
        offset: u32,
    ) -> LedgerResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders
             WHERE user_id = ?1 AND (?2 IS NULL OR market_id = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4",
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let orders = stmt
            .query_map(
                params![
                    user_id.to_string(),
                    market_id.map(|id| id.to_string()),
                    limit,
                    offset
                ],
                order_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    pub fn count_orders_for_user(&self, user_id: Uuid, market_id: Option<Uuid>) -> LedgerResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE user_id = ?1 AND (?2 IS NULL OR market_id = ?2)",
            params![user_id.to_string(), market_id.map(|id| id.to_string())],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Every order placed at or after `since`, oldest first.
    pub fn orders_created_since(&self, since: DateTime<Utc>) -> LedgerResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders WHERE created_at >= ?1 ORDER BY created_at, rowid",
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let orders = stmt
            .query_map(params![timestamp(since)], order_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    // ---------------------------------------------------------------
    // Markets
    // ---------------------------------------------------------------

    pub fn insert_market(&mut self, market: &Market) -> LedgerResult<()> {
        self.conn
            .execute(
                "INSERT INTO markets (id, title, description, category, status, end_date, winning_outcome, settled_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    market.id.to_string(),
                    market.title,
                    market.description,
                    market.category,
                    market.status,
                    timestamp(market.end_date),
                    market.winning_outcome,
                    market.settled_at.map(timestamp),
                    timestamp(market.created_at),
                ],
            )
            .map_err(|e| unique_violation(e, LedgerError::MarketExists))?;
        Ok(())
    }

    pub fn find_market(&self, market_id: Uuid) -> LedgerResult<Option<Market>> {
        let sql = format!("SELECT {} FROM markets WHERE id = ?1", MARKET_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![market_id.to_string()], market_from_row)
            .optional()?)
    }

    pub fn market(&self, market_id: Uuid) -> LedgerResult<Market> {
        self.find_market(market_id)?
            .ok_or(LedgerError::MarketNotFound)
    }

    /// One page of markets, newest first, plus the total matching the filter.
    pub fn markets(&self, query: &MarketQuery) -> LedgerResult<(Vec<Market>, u64)> {
        let category = query.category.as_deref();

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM markets
             WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR status = ?2)",
            params![category, query.status],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM markets
             WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3 OFFSET ?4",
            MARKET_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let markets = stmt
            .query_map(
                params![category, query.status, query.page_size, query.offset()],
                market_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((markets, total as u64))
    }

    /// Conditional market close: `open -> closed`.
    pub fn close_market(&mut self, market_id: Uuid) -> LedgerResult<Market> {
        let market = self.market(market_id)?;
        let next = market.status.close()?;
        self.update_market_status(market_id, market.status, next, None)
    }

    /// Conditional market settle: `open|closed -> settled`, recording the winner.
    pub fn settle_market(&mut self, market_id: Uuid, winning: Outcome) -> LedgerResult<Market> {
        let market = self.market(market_id)?;
        let next = market.status.settle()?;
        self.update_market_status(market_id, market.status, next, Some(winning))
    }

    fn update_market_status(
        &mut self,
        market_id: Uuid,
        expected: MarketStatus,
        next: MarketStatus,
        winning: Option<Outcome>,
    ) -> LedgerResult<Market> {
        let settled_at = (next == MarketStatus::Settled).then(|| timestamp(self.now));

        let changed = self.conn.execute(
            "UPDATE markets SET status = ?1,
                 winning_outcome = COALESCE(?2, winning_outcome),
                 settled_at = COALESCE(?3, settled_at)
             WHERE id = ?4 AND status = ?5",
            params![next, winning, settled_at, market_id.to_string(), expected],
        )?;

        if changed == 0 {
            return Err(match self.market(market_id)?.status {
                MarketStatus::Settled => LedgerError::AlreadySettled,
                _ => LedgerError::MarketNotOpen,
            });
        }

        self.market(market_id)
    }

    // ---------------------------------------------------------------
    // Revenue
    // ---------------------------------------------------------------

    pub fn insert_revenue(&mut self, revenue: &PlatformRevenue) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO platform_revenue (id, market_id, revenue, fee_percentage, currency, settlement_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                revenue.id.to_string(),
                revenue.market_id.to_string(),
                money(revenue.revenue),
                money(revenue.fee_percentage),
                revenue.currency,
                timestamp(revenue.settlement_date),
            ],
        )?;
        Ok(())
    }

    /// Newest first, optionally limited to one market.
    pub fn revenues(&self, market_id: Option<Uuid>) -> LedgerResult<Vec<PlatformRevenue>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, market_id, revenue, fee_percentage, currency, settlement_date
             FROM platform_revenue
             WHERE (?1 IS NULL OR market_id = ?1)
             ORDER BY settlement_date DESC, rowid DESC",
        )?;
        let revenues = stmt
            .query_map(params![market_id.map(|id| id.to_string())], |row| {
                Ok(PlatformRevenue {
                    id: parse_col(row, 0)?,
                    market_id: parse_col(row, 1)?,
                    revenue: parse_col(row, 2)?,
                    fee_percentage: parse_col(row, 3)?,
                    currency: row.get(4)?,
                    settlement_date: parse_col(row, 5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(revenues)
    }
}

// -------------------------------------------------------------------
// Row mapping
// -------------------------------------------------------------------

fn wallet_from_row(row: &Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: parse_col(row, 0)?,
        user_id: parse_col(row, 1)?,
        currency: row.get(2)?,
        balance: parse_col(row, 3)?,
        locked_balance: parse_col(row, 4)?,
        created_at: parse_col(row, 5)?,
        updated_at: parse_col(row, 6)?,
    })
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: parse_col(row, 0)?,
        market_id: parse_col(row, 1)?,
        user_id: parse_col(row, 2)?,
        wallet_id: parse_col(row, 3)?,
        currency: row.get(4)?,
        amount: parse_col(row, 5)?,
        outcome: row.get(6)?,
        status: row.get(7)?,
        payout: parse_opt_col(row, 8)?,
        created_at: parse_col(row, 9)?,
        updated_at: parse_col(row, 10)?,
    })
}

fn market_from_row(row: &Row<'_>) -> rusqlite::Result<Market> {
    Ok(Market {
        id: parse_col(row, 0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        status: row.get(4)?,
        end_date: parse_col(row, 5)?,
        winning_outcome: row.get(6)?,
        settled_at: parse_opt_col(row, 7)?,
        created_at: parse_col(row, 8)?,
    })
}

/// Money, ids and timestamps are stored as TEXT so no precision is lost.
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn money(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Fixed-width UTC so lexical order matches chronological order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn require_positive(op: &str, amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::Invariant(format!(
            "{} amount must be positive, got {}",
            op, amount
        )));
    }
    Ok(())
}

fn unique_violation(err: rusqlite::Error, on_duplicate: LedgerError) -> LedgerError {
    if let rusqlite::Error::SqliteFailure(code, _) = &err {
        if code.code == ErrorCode::ConstraintViolation {
            return on_duplicate;
        }
    }
    LedgerError::Storage(err)
}
