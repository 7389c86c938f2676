//! Shared value types: timestamps, exact amounts, identifiers and enums
use super::error::TradeError;
use super::utils::new_uuid_to_bech32;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;

/// Decimal places allowed on an asset quantity.
pub const ASSET_DECIMALS: u32 = 8;
/// Decimal places a fiat total is rounded to.
pub const FIAT_DECIMALS: u32 = 2;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// ordered by instant; `Utc` has no `Ord` of its own
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_else(Utc::now)
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    pub fn plus_minutes(&self, minutes: u32) -> Self {
        Self(self.0 + Duration::minutes(i64::from(minutes)))
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// An exact quantity of asset or fiat.
///
/// Stored in CBOR as the 16-byte `rust_decimal` wire form so no precision is
/// lost between writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }
    pub fn value(&self) -> Decimal {
        self.0
    }
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
    pub fn scale(&self) -> u32 {
        self.0.normalize().scale()
    }
    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
    pub fn checked_mul(&self, other: Amount) -> Option<Amount> {
        self.0.checked_mul(other.0).map(Amount)
    }
    /// Half-up rounding, as used for fiat totals.
    pub fn round_dp(&self, dp: u32) -> Amount {
        Amount(
            self.0
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount(value)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str_exact(s.trim())
            .map(Amount)
            .map_err(|e| TradeError::Validation(format!("invalid amount {s:?}: {e}")))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl<C> minicbor::Encode<C> for Amount {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.bytes(&self.0.serialize())?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Amount {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw: [u8; 16] = d
            .bytes()?
            .try_into()
            .map_err(|_| minicbor::decode::Error::message("amount must be 16 bytes"))?;

        Ok(Amount(Decimal::deserialize(raw)))
    }
}

// bech32m encoded uuid7, prefixed with `user_`
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(#[n(0)] String);

// bech32m encoded uuid7, prefixed with `ad_`
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AdId(#[n(0)] String);

// bech32m encoded uuid7, prefixed with `trade_`
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TradeId(#[n(0)] String);

impl UserId {
    pub fn generate() -> Result<Self, TradeError> {
        new_uuid_to_bech32("user_").map(Self)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AdId {
    pub fn generate() -> Result<Self, TradeError> {
        new_uuid_to_bech32("ad_").map(Self)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TradeId {
    pub fn generate() -> Result<Self, TradeError> {
        new_uuid_to_bech32("trade_").map(Self)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for AdId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for TradeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side the advertiser takes.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub enum Direction {
    #[n(0)]
    Buy,
    #[n(1)]
    Sell,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum PaymentMethod {
    #[n(0)]
    Upi,
    #[n(1)]
    Bank,
    #[n(2)]
    Paytm,
    #[n(3)]
    GooglePay,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for Direction {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            other => Err(TradeError::Validation(format!("unknown direction {other}"))),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentMethod::Upi => "UPI",
            PaymentMethod::Bank => "BANK",
            PaymentMethod::Paytm => "PAYTM",
            PaymentMethod::GooglePay => "GOOGLEPAY",
        };
        f.write_str(name)
    }
}

impl FromStr for PaymentMethod {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UPI" => Ok(PaymentMethod::Upi),
            "BANK" => Ok(PaymentMethod::Bank),
            "PAYTM" => Ok(PaymentMethod::Paytm),
            "GOOGLEPAY" => Ok(PaymentMethod::GooglePay),
            other => Err(TradeError::Validation(format!(
                "unknown payment method {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn timestamps_order_by_instant() {
        let early = TimeStamp::new_with(2025, 1, 1, 0, 0, 0);
        let late = early.plus_minutes(15);
        assert!(early < late);
        assert_eq!(late.cmp(&early), std::cmp::Ordering::Greater);

        let mut stamps = vec![late.clone(), early.clone()];
        stamps.sort();
        assert_eq!(stamps, vec![early, late]);
    }

    #[test]
    fn amount_keeps_scale_through_cbor() {
        let original = Amount::new(dec!(0.00000001));

        let encoding = minicbor::to_vec(original).unwrap();
        let decode: Amount = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
        assert_eq!(decode.scale(), 8);
    }

    #[test]
    fn fiat_rounding_is_half_up() {
        assert_eq!(Amount::new(dec!(10.005)).round_dp(FIAT_DECIMALS), Amount::new(dec!(10.01)));
        assert_eq!(Amount::new(dec!(10.004)).round_dp(FIAT_DECIMALS), Amount::new(dec!(10.00)));
    }

    #[test]
    fn ids_carry_their_prefix() {
        assert!(UserId::generate().unwrap().as_str().starts_with("user_1"));
        assert!(AdId::generate().unwrap().as_str().starts_with("ad_1"));
        assert!(TradeId::generate().unwrap().as_str().starts_with("trade_1"));
    }

    #[test]
    fn payment_method_parses_case_insensitively() {
        assert_eq!("upi".parse::<PaymentMethod>().unwrap(), PaymentMethod::Upi);
        assert_eq!("GOOGLEPAY".parse::<PaymentMethod>().unwrap(), PaymentMethod::GooglePay);
        assert!("cash".parse::<PaymentMethod>().is_err());
    }
}
