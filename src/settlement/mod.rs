//! Settlement Engine
//! Mission: Resolve a market's locked stakes in one atomic pass, conserving every unit
//!
//! - `payout`: pure pool partitioning, fee and pro-rata share allocation
//! - `engine`: applies a plan through the ledger inside a single unit of work

pub mod engine;
pub mod payout;

pub use engine::{PoolReport, SettlementEngine, SettlementReport};
pub use payout::{allocate_shares, plan_pool, platform_fee, Movement, PoolPlan};
