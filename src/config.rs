//! Service Configuration
//! Mission: One typed view of env vars and CLI flags, validated before anything starts

use crate::fx::FxTable;
use anyhow::{ensure, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use std::net::SocketAddr;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

#[derive(Parser, Debug, Clone)]
#[command(name = "stakebook")]
#[command(about = "Stake custody and settlement service for binary prediction markets")]
pub struct Config {
    /// Ledger database (wallets, orders, markets, revenue)
    #[arg(long, env = "STAKEBOOK_DB_PATH", default_value = "stakebook_ledger.db")]
    pub db_path: String,

    /// User accounts database
    #[arg(long, env = "AUTH_DB_PATH", default_value = "stakebook_auth.db")]
    pub auth_db_path: String,

    /// HMAC secret for session tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// HTTP listen address
    #[arg(long, env = "STAKEBOOK_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// Share of each contested losing pool kept as platform revenue
    #[arg(long, env = "STAKEBOOK_FEE_RATE", default_value = "0.02")]
    pub fee_rate: Decimal,

    /// INR per USD, used for reporting only
    #[arg(long, env = "STAKEBOOK_USD_INR", default_value = "83")]
    pub usd_inr: Decimal,
}

impl Config {
    /// Parse flags (falling back to env vars) and validate.
    pub fn from_env() -> Result<Self> {
        let config = Self::try_parse().context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.fee_rate >= Decimal::ZERO && self.fee_rate < Decimal::ONE,
            "STAKEBOOK_FEE_RATE must be in [0, 1), got {}",
            self.fee_rate
        );
        ensure!(
            self.usd_inr > Decimal::ZERO,
            "STAKEBOOK_USD_INR must be positive, got {}",
            self.usd_inr
        );
        ensure!(!self.jwt_secret.trim().is_empty(), "JWT_SECRET must not be empty");

        if self.jwt_secret == DEV_JWT_SECRET {
            warn!("JWT_SECRET not set, using the development secret");
        }
        Ok(())
    }

    pub fn fx(&self) -> Result<FxTable> {
        FxTable::new(self.usd_inr).context("STAKEBOOK_USD_INR must be positive")
    }
}
