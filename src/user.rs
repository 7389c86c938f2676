//! The wallet and reputation slice of a user account
use crate::error::{Result, TradeError};
use crate::ledger;
use crate::types::{Amount, TimeStamp, UserId};
use chrono::Utc;
use rust_decimal::Decimal;

/// Rating shown for users nobody has reviewed yet.
pub const DEFAULT_RATING: u8 = 5;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct UserAccount {
    #[n(0)]
    id: UserId,
    #[n(1)]
    display_name: String,
    #[n(2)]
    wallet_balance: Amount,
    #[n(3)]
    total_trades: u64,
    #[n(4)]
    completed_trades: u64,
    #[n(5)]
    rating_sum: u64,
    #[n(6)]
    rating_count: u64,
    #[n(7)]
    created_at: TimeStamp<Utc>,
}

impl UserAccount {
    pub(crate) fn new(id: UserId, display_name: &str, now: TimeStamp<Utc>) -> Result<Self> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(TradeError::Validation("display name cannot be empty".into()));
        }
        Ok(Self {
            id,
            display_name: display_name.to_string(),
            wallet_balance: Amount::ZERO,
            total_trades: 0,
            completed_trades: 0,
            rating_sum: 0,
            rating_count: 0,
            created_at: now,
        })
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
    pub fn wallet_balance(&self) -> Amount {
        self.wallet_balance
    }
    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }
    pub fn completed_trades(&self) -> u64 {
        self.completed_trades
    }
    pub fn rating_count(&self) -> u64 {
        self.rating_count
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }

    /// Mean of every rating received, two decimal places.
    pub fn rating(&self) -> Decimal {
        if self.rating_count == 0 {
            return Decimal::from(DEFAULT_RATING);
        }
        (Decimal::from(self.rating_sum) / Decimal::from(self.rating_count)).round_dp(2)
    }

    pub(crate) fn record_opened_trade(&mut self) {
        self.total_trades += 1;
    }

    pub(crate) fn record_completed_trade(&mut self) {
        self.completed_trades += 1;
    }

    pub(crate) fn credit(&mut self, quantity: Amount) -> Result<()> {
        self.wallet_balance = ledger::credit_wallet(self.wallet_balance, quantity)?;
        Ok(())
    }

    pub(crate) fn record_rating(&mut self, rating: u8) {
        self.rating_sum += u64::from(rating);
        self.rating_count += 1;
    }
}
