//! Advertisements and the liquidity they expose to trades
use crate::error::{Result, TradeError};
use crate::ledger;
use crate::types::{ASSET_DECIMALS, AdId, Amount, Direction, PaymentMethod, TimeStamp, UserId};
use chrono::Utc;

pub const DEFAULT_ASSET: &str = "USDT";
pub const DEFAULT_FIAT: &str = "INR";
pub const DEFAULT_TIME_LIMIT_MINUTES: u32 = 15;
/// One day. Longer payment windows are refused up front.
pub const MAX_TIME_LIMIT_MINUTES: u32 = 24 * 60;

/// Draft of a new advertisement, filled in with the setter chain and checked by
/// [`AdDetails::validate_and_finalise`].
#[derive(Debug, Clone, Default)]
pub struct AdDetails {
    direction: Option<Direction>,
    asset: Option<String>,
    fiat_currency: Option<String>,
    price: Option<Amount>,
    min_order_amount: Option<Amount>,
    max_order_amount: Option<Amount>,
    total_amount: Option<Amount>,
    payment_methods: Vec<PaymentMethod>,
    time_limit_minutes: Option<u32>,
    terms: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Advertisement {
    #[n(0)]
    id: AdId,
    #[n(1)]
    advertiser: UserId,
    #[n(2)]
    direction: Direction,
    #[n(3)]
    asset: String,
    #[n(4)]
    fiat_currency: String,
    #[n(5)]
    price: Amount, // fiat per unit of asset
    #[n(6)]
    min_order_amount: Amount, // fiat
    #[n(7)]
    max_order_amount: Amount, // fiat
    #[n(8)]
    available_amount: Amount, // asset
    #[n(9)]
    total_amount: Amount, // asset
    #[n(10)]
    payment_methods: Vec<PaymentMethod>,
    #[n(11)]
    time_limit_minutes: u32,
    #[n(12)]
    terms: String,
    #[n(13)]
    is_active: bool,
    #[n(14)]
    is_removed: bool,
    #[n(15)]
    completed_orders: u64,
    #[n(16)]
    created_at: TimeStamp<Utc>,
    #[n(17)]
    updated_at: TimeStamp<Utc>,
}

/// Advertiser edits to the non-quantity fields of an ad.
#[derive(Debug, Clone, Default)]
pub struct AdUpdate {
    pub price: Option<Amount>,
    pub min_order_amount: Option<Amount>,
    pub max_order_amount: Option<Amount>,
    pub payment_methods: Option<Vec<PaymentMethod>>,
    pub time_limit_minutes: Option<u32>,
    pub terms: Option<String>,
}

impl AdDetails {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn set_asset(mut self, asset: &str) -> Self {
        self.asset = Some(asset.to_string());
        self
    }
    pub fn set_fiat_currency(mut self, fiat: &str) -> Self {
        self.fiat_currency = Some(fiat.to_string());
        self
    }
    pub fn set_price(mut self, price: Amount) -> Self {
        self.price = Some(price);
        self
    }
    pub fn set_order_limits(mut self, min: Amount, max: Amount) -> Self {
        self.min_order_amount = Some(min);
        self.max_order_amount = Some(max);
        self
    }
    pub fn set_total_amount(mut self, amount: Amount) -> Self {
        self.total_amount = Some(amount);
        self
    }
    pub fn add_payment_method(mut self, method: PaymentMethod) -> Self {
        if !self.payment_methods.contains(&method) {
            self.payment_methods.push(method);
        }
        self
    }
    pub fn set_time_limit(mut self, minutes: u32) -> Self {
        self.time_limit_minutes = Some(minutes);
        self
    }
    pub fn set_terms(mut self, terms: &str) -> Self {
        self.terms = terms.to_string();
        self
    }

    /// Checks every field and produces the stored advertisement, fully liquid
    /// and active.
    pub fn validate_and_finalise(
        self,
        id: AdId,
        advertiser: UserId,
        now: TimeStamp<Utc>,
    ) -> Result<Advertisement> {
        let direction = self
            .direction
            .ok_or_else(|| TradeError::Validation("direction is not set".into()))?;
        let price = self
            .price
            .ok_or_else(|| TradeError::Validation("price is not set".into()))?;
        let min_order_amount = self
            .min_order_amount
            .ok_or_else(|| TradeError::Validation("minimum order amount is not set".into()))?;
        let max_order_amount = self
            .max_order_amount
            .ok_or_else(|| TradeError::Validation("maximum order amount is not set".into()))?;
        let total_amount = self
            .total_amount
            .ok_or_else(|| TradeError::Validation("available amount is not set".into()))?;

        if !price.is_positive() {
            return Err(TradeError::Validation("price must be positive".into()));
        }
        if !total_amount.is_positive() {
            return Err(TradeError::Validation("available amount must be positive".into()));
        }
        if total_amount.scale() > ASSET_DECIMALS {
            return Err(TradeError::Validation(format!(
                "available amount allows at most {ASSET_DECIMALS} decimal places"
            )));
        }
        validate_limits(min_order_amount, max_order_amount)?;
        if self.payment_methods.is_empty() {
            return Err(TradeError::Validation(
                "at least one payment method is required".into(),
            ));
        }
        let time_limit_minutes = self.time_limit_minutes.unwrap_or(DEFAULT_TIME_LIMIT_MINUTES);
        validate_time_limit(time_limit_minutes)?;

        Ok(Advertisement {
            id,
            advertiser,
            direction,
            asset: self.asset.unwrap_or_else(|| DEFAULT_ASSET.to_string()),
            fiat_currency: self.fiat_currency.unwrap_or_else(|| DEFAULT_FIAT.to_string()),
            price,
            min_order_amount,
            max_order_amount,
            available_amount: total_amount,
            total_amount,
            payment_methods: self.payment_methods,
            time_limit_minutes,
            terms: self.terms,
            is_active: true,
            is_removed: false,
            completed_orders: 0,
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

fn validate_time_limit(minutes: u32) -> Result<()> {
    if !(1..=MAX_TIME_LIMIT_MINUTES).contains(&minutes) {
        return Err(TradeError::Validation(format!(
            "time limit must be between 1 and {MAX_TIME_LIMIT_MINUTES} minutes, got {minutes}"
        )));
    }
    Ok(())
}

fn validate_limits(min: Amount, max: Amount) -> Result<()> {
    if min < Amount::ZERO {
        return Err(TradeError::Validation("minimum order amount cannot be negative".into()));
    }
    if !max.is_positive() {
        return Err(TradeError::Validation("maximum order amount must be positive".into()));
    }
    if min > max {
        return Err(TradeError::Validation(format!(
            "minimum order amount {min} exceeds maximum {max}"
        )));
    }
    Ok(())
}

impl Advertisement {
    pub fn id(&self) -> &AdId {
        &self.id
    }
    pub fn advertiser(&self) -> &UserId {
        &self.advertiser
    }
    pub fn direction(&self) -> Direction {
        self.direction
    }
    pub fn asset(&self) -> &str {
        &self.asset
    }
    pub fn fiat_currency(&self) -> &str {
        &self.fiat_currency
    }
    pub fn price(&self) -> Amount {
        self.price
    }
    pub fn min_order_amount(&self) -> Amount {
        self.min_order_amount
    }
    pub fn max_order_amount(&self) -> Amount {
        self.max_order_amount
    }
    pub fn available_amount(&self) -> Amount {
        self.available_amount
    }
    pub fn total_amount(&self) -> Amount {
        self.total_amount
    }
    pub fn payment_methods(&self) -> &[PaymentMethod] {
        &self.payment_methods
    }
    pub fn accepts(&self, method: PaymentMethod) -> bool {
        self.payment_methods.contains(&method)
    }
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }
    pub fn terms(&self) -> &str {
        &self.terms
    }
    pub fn is_active(&self) -> bool {
        self.is_active
    }
    pub fn is_removed(&self) -> bool {
        self.is_removed
    }
    pub fn completed_orders(&self) -> u64 {
        self.completed_orders
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn updated_at(&self) -> &TimeStamp<Utc> {
        &self.updated_at
    }

    /// Whether the ad can take a new trade right now.
    pub fn is_open(&self) -> bool {
        self.is_active && !self.is_removed
    }

    /// Take `quantity` out of the ad's liquidity for a new trade.
    ///
    /// Deactivates the ad once nothing tradable is left.
    pub fn reserve(&mut self, quantity: Amount) -> Result<()> {
        if !self.is_open() {
            return Err(TradeError::AdInactive(self.id.clone()));
        }
        self.available_amount = ledger::debit_liquidity(self.available_amount, quantity)?;
        if ledger::is_dust(self.available_amount) {
            self.is_active = false;
        }
        Ok(())
    }

    /// Give a cancelled trade's quantity back and reactivate the ad.
    ///
    /// A removed ad is reactivated too but stays closed, since
    /// [`Advertisement::is_open`] also checks removal.
    pub fn restore(&mut self, quantity: Amount) -> Result<()> {
        self.available_amount =
            ledger::credit_liquidity(self.available_amount, quantity, self.total_amount)?;
        self.is_active = true;
        Ok(())
    }

    pub(crate) fn record_completed_order(&mut self) {
        self.completed_orders += 1;
    }

    pub(crate) fn apply_update(&mut self, update: AdUpdate, now: TimeStamp<Utc>) -> Result<()> {
        let min = update.min_order_amount.unwrap_or(self.min_order_amount);
        let max = update.max_order_amount.unwrap_or(self.max_order_amount);
        validate_limits(min, max)?;

        if let Some(price) = update.price {
            if !price.is_positive() {
                return Err(TradeError::Validation("price must be positive".into()));
            }
        }
        if let Some(methods) = &update.payment_methods {
            if methods.is_empty() {
                return Err(TradeError::Validation(
                    "at least one payment method is required".into(),
                ));
            }
        }
        if let Some(minutes) = update.time_limit_minutes {
            validate_time_limit(minutes)?;
        }

        self.min_order_amount = min;
        self.max_order_amount = max;
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(mut methods) = update.payment_methods {
            methods.sort();
            methods.dedup();
            self.payment_methods = methods;
        }
        if let Some(minutes) = update.time_limit_minutes {
            self.time_limit_minutes = minutes;
        }
        if let Some(terms) = update.terms {
            self.terms = terms;
        }
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn mark_removed(&mut self, now: TimeStamp<Utc>) {
        self.is_removed = true;
        self.is_active = false;
        self.updated_at = now;
    }
}
