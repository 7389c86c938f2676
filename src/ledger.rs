//! Accounting primitives applied to ad liquidity and wallet balances.
//!
//! Every function here is pure: it takes the current quantity and returns the
//! adjusted one, or an error when the adjustment would break an invariant.
//! Persisting the result atomically is the store's job.
use crate::error::{Result, TradeError};
use crate::types::Amount;

/// Remaining liquidity at or below this deactivates an ad.
///
/// Quantities are exact decimals so no floating point residue can be left
/// behind; only a fully drained ad is treated as empty.
pub const DUST_THRESHOLD: Amount = Amount::ZERO;

/// Subtract `quantity` from `available`, refusing to go below zero.
pub fn debit_liquidity(available: Amount, quantity: Amount) -> Result<Amount> {
    if !quantity.is_positive() {
        return Err(TradeError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    if quantity > available {
        return Err(TradeError::InsufficientLiquidity {
            requested: quantity,
            available,
        });
    }
    available
        .checked_sub(quantity)
        .ok_or_else(|| TradeError::Validation("liquidity underflow".into()))
}

/// Add `quantity` back to `available`, capped at `total`.
pub fn credit_liquidity(available: Amount, quantity: Amount, total: Amount) -> Result<Amount> {
    let restored = available
        .checked_add(quantity)
        .ok_or_else(|| TradeError::Validation("liquidity overflow".into()))?;

    Ok(restored.min(total))
}

pub fn is_dust(remaining: Amount) -> bool {
    remaining <= DUST_THRESHOLD
}

/// Credit a wallet. Balances only ever grow inside the engine.
pub fn credit_wallet(balance: Amount, quantity: Amount) -> Result<Amount> {
    if !quantity.is_positive() {
        return Err(TradeError::Validation(format!(
            "wallet credit must be positive, got {quantity}"
        )));
    }
    balance
        .checked_add(quantity)
        .ok_or_else(|| TradeError::Validation("wallet balance overflow".into()))
}
