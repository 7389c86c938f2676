use crate::types::Amount;
use anyhow::Context;
use rust_decimal_macros::dec;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "p2p-escrow.db";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct MarketConfig {
    pub db_path: PathBuf,
    /// Slack allowed on either side of an ad's fiat order limits.
    pub bound_tolerance: Amount,
    /// How often expired pending trades are swept. Zero disables the sweep.
    pub sweep_interval: Duration,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            bound_tolerance: Amount::new(dec!(0.01)),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl MarketConfig {
    /// Reads `P2P_DB_PATH`, `P2P_BOUND_TOLERANCE` and
    /// `P2P_SWEEP_INTERVAL_SECS`, falling back to the defaults for anything
    /// unset. A `.env` file is honoured if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`MarketConfig::from_env`] with the variables supplied by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let db_path = lookup("P2P_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let bound_tolerance = match lookup("P2P_BOUND_TOLERANCE") {
            Some(raw) => {
                let tolerance: Amount = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("P2P_BOUND_TOLERANCE is not a decimal: {raw}"))?;
                anyhow::ensure!(
                    tolerance >= Amount::ZERO,
                    "P2P_BOUND_TOLERANCE cannot be negative"
                );
                tolerance
            }
            None => defaults.bound_tolerance,
        };

        let sweep_interval = match lookup("P2P_SWEEP_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("P2P_SWEEP_INTERVAL_SECS must be a number: {raw}"))?,
            ),
            None => defaults.sweep_interval,
        };

        Ok(Self {
            db_path,
            bound_tolerance,
            sweep_interval,
        })
    }

    pub fn with_bound_tolerance(mut self, tolerance: Amount) -> Self {
        self.bound_tolerance = tolerance;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
