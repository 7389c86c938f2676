//! Identifier generation helpers

use super::error::TradeError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique, time-ordered id then encode using bech32m
pub fn new_uuid_to_bech32(hrp: &str) -> Result<String, TradeError> {
    let hrp = bech32::Hrp::parse(hrp).map_err(|e| TradeError::Identifier(e.to_string()))?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())
        .map_err(|e| TradeError::Identifier(e.to_string()))?;
    Ok(encode)
}
