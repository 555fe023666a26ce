//! Stakebook Backend Library
//!
//! Custody and settlement for binary prediction markets: wallets, stakes, market
//! lifecycle and pari-mutuel settlement over a single SQLite ledger, served over HTTP.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fx;
pub mod ledger;
pub mod markets;
pub mod middleware;
pub mod models;
pub mod orders;
pub mod portfolio;
pub mod settlement;
pub mod wallets;

pub use error::{LedgerError, LedgerResult};
