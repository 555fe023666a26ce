use crate::error::LedgerResult;
use crate::ledger::UnitOfWork;
use anyhow::{Context, Result};
use parking_lot::Mutex; // Faster than std::sync::Mutex
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Wallets, orders, markets, revenue and the movement journal share one database so a
/// settlement can span all of them in a single transaction.
const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS wallets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    currency TEXT NOT NULL,
    balance TEXT NOT NULL,
    locked_balance TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, currency)
);

CREATE TABLE IF NOT EXISTS markets (
    id TEXT PRIMARY KEY,
    title TEXT UNIQUE NOT NULL,
    description TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    end_date TEXT NOT NULL,
    winning_outcome TEXT,
    settled_at TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_markets_category_status
    ON markets(category, status);

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    market_id TEXT NOT NULL REFERENCES markets(id),
    user_id TEXT NOT NULL,
    wallet_id TEXT NOT NULL REFERENCES wallets(id),
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    outcome TEXT NOT NULL,
    status TEXT NOT NULL,
    payout TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Settlement fetch: all locked orders of one market
CREATE INDEX IF NOT EXISTS idx_orders_market_status
    ON orders(market_id, status);

CREATE INDEX IF NOT EXISTS idx_orders_user_created
    ON orders(user_id, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_orders_created
    ON orders(created_at);

CREATE TABLE IF NOT EXISTS platform_revenue (
    id TEXT PRIMARY KEY,
    market_id TEXT NOT NULL REFERENCES markets(id),
    revenue TEXT NOT NULL,
    fee_percentage TEXT NOT NULL,
    currency TEXT NOT NULL,
    settlement_date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    wallet_id TEXT NOT NULL REFERENCES wallets(id),
    order_id TEXT,
    market_id TEXT,
    kind TEXT NOT NULL,
    balance_delta TEXT NOT NULL,
    locked_delta TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_wallet
    ON ledger_entries(wallet_id, seq);

CREATE INDEX IF NOT EXISTS idx_ledger_entries_order
    ON ledger_entries(order_id, seq);
"#;

/// Durable record of wallets and orders.
///
/// A single connection behind a mutex: concurrent operations on the same wallet or order
/// serialize, and every check-then-write happens inside one immediate transaction.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("Failed to open ledger database at {}", db_path))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize ledger schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();

        // In-memory databases report "memory"
        if db_path != ":memory:" && journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let wallets: i64 = conn
            .query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))
            .unwrap_or(0);

        info!(path = db_path, wallets, "Ledger store initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    /// Run `work` as one atomic unit: commit on `Ok`, roll back on `Err`.
    ///
    /// A panic inside `work` drops the transaction, which also rolls back.
    pub fn unit_of_work<T, F>(&self, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> LedgerResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let outcome = {
            let mut uow = UnitOfWork::new(&tx);
            work(&mut uow)
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    error!(error = %rollback_err, cause = %e, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Read-only access outside a write transaction.
    pub fn read<T, F>(&self, query: F) -> LedgerResult<T>
    where
        F: FnOnce(&UnitOfWork<'_>) -> LedgerResult<T>,
    {
        let conn = self.conn.lock();
        let uow = UnitOfWork::new(&conn);
        query(&uow)
    }
}
