use crate::trade::TradeStatus;
use crate::types::{AdId, Amount, TradeId, UserId};

/// Coarse classification of [`TradeError`], used by callers to decide whether
/// to retry, prompt the user or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Precondition,
    Authorization,
    Conflict,
    Storage,
}

#[derive(thiserror::Error, Debug)]
pub enum TradeError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Failed to generate identifier: {0}")]
    Identifier(String),

    #[error("Ad {0} not found")]
    AdNotFound(AdId),
    #[error("Trade {0} not found")]
    TradeNotFound(TradeId),
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Ad {0} is no longer active")]
    AdInactive(AdId),
    #[error("Trade value {total} is outside the order limits {min} - {max}")]
    AmountOutOfRange { total: Amount, min: Amount, max: Amount },
    #[error("Insufficient available amount: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },
    #[error("Cannot trade with yourself")]
    SelfTrade,
    #[error("Payment method {0} is not accepted by this ad")]
    PaymentMethodNotAccepted(crate::types::PaymentMethod),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Trade has already been finalized as {0}")]
    TradeFinalized(TradeStatus),
    #[error("Cannot move a trade from {from} to {to}")]
    InvalidTransition { from: TradeStatus, to: TradeStatus },
    #[error("Only completed trades can be rated")]
    NotCompleted,
    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("This side of the trade has already been rated")]
    AlreadyRated,

    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode or decode a record: {0}")]
    Codec(String),
    #[error("Internal failure: {0}")]
    Internal(String),
}

impl TradeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TradeError::Validation(_) | TradeError::InvalidRating(_) => ErrorKind::Validation,
            TradeError::AdNotFound(_) | TradeError::TradeNotFound(_) | TradeError::UserNotFound(_) => {
                ErrorKind::NotFound
            }
            TradeError::AdInactive(_)
            | TradeError::AmountOutOfRange { .. }
            | TradeError::InsufficientLiquidity { .. }
            | TradeError::SelfTrade
            | TradeError::PaymentMethodNotAccepted(_)
            | TradeError::NotCompleted => ErrorKind::Precondition,
            TradeError::NotAuthorized(_) => ErrorKind::Authorization,
            TradeError::TradeFinalized(_)
            | TradeError::InvalidTransition { .. }
            | TradeError::AlreadyRated => ErrorKind::Conflict,
            TradeError::Identifier(_)
            | TradeError::Storage(_)
            | TradeError::Codec(_)
            | TradeError::Internal(_) => ErrorKind::Storage,
        }
    }
}

impl From<sled::transaction::TransactionError<TradeError>> for TradeError {
    fn from(value: sled::transaction::TransactionError<TradeError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(err) => err,
            sled::transaction::TransactionError::Storage(err) => TradeError::Storage(err),
        }
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for TradeError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        TradeError::Codec(value.to_string())
    }
}

impl From<minicbor::decode::Error> for TradeError {
    fn from(value: minicbor::decode::Error) -> Self {
        TradeError::Codec(value.to_string())
    }
}

pub type Result<T, E = TradeError> = std::result::Result<T, E>;
