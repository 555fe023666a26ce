//! Ledger Store
//! Mission: Sole mutator of wallet and order state; every mutation group is all-or-nothing
//!
//! - `LedgerStore` owns the SQLite connection and hands out serialized units of work
//! - `UnitOfWork` carries the lock/unlock/credit/debit primitives and the conditional
//!   order status update, all inside one `BEGIN IMMEDIATE` transaction

pub mod store;
pub mod unit_of_work;

pub use store::LedgerStore;
pub use unit_of_work::{EntryLink, MarketQuery, UnitOfWork};
