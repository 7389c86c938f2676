//! Trade state machine.
//!
//! ```text
//! PENDING --mark paid (buyer)--> PAYMENT_SENT --release (seller)--> COMPLETED
//!    |                               |
//!    +--------cancel (either)--------+--> CANCELLED
//! ```
//!
//! `DISPUTED` exists in the record format but nothing moves a trade into it.
//! This module is the only place that decides a trade's next status; the
//! service applies the returned [`Transition`] and its [`SideEffect`] in one
//! store transaction.
use crate::error::{Result, TradeError};
use crate::trade::TradeStatus;

/// Who is acting on a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
    /// The expiry sweep.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeEvent {
    MarkPaid,
    Release,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    /// Credit the buyer's wallet with the trade quantity and bump both
    /// parties' completed trade counters.
    CreditBuyer,
    /// Give the trade quantity back to the ad.
    RestoreLiquidity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TradeStatus,
    pub to: TradeStatus,
    pub event: TradeEvent,
    pub side_effect: SideEffect,
}

impl TradeEvent {
    /// The event that moves a trade into `target`, for callers that speak in
    /// target statuses.
    pub fn for_target(target: TradeStatus) -> Option<Self> {
        match target {
            TradeStatus::PaymentSent => Some(TradeEvent::MarkPaid),
            TradeStatus::Completed => Some(TradeEvent::Release),
            TradeStatus::Cancelled => Some(TradeEvent::Cancel),
            TradeStatus::Pending | TradeStatus::Disputed => None,
        }
    }

    pub fn target(&self) -> TradeStatus {
        match self {
            TradeEvent::MarkPaid => TradeStatus::PaymentSent,
            TradeEvent::Release => TradeStatus::Completed,
            TradeEvent::Cancel => TradeStatus::Cancelled,
        }
    }

    fn permits(&self, role: Role, from: TradeStatus) -> bool {
        match (self, role) {
            (TradeEvent::MarkPaid, Role::Buyer) => true,
            (TradeEvent::Release, Role::Seller) => true,
            (TradeEvent::Cancel, Role::Buyer | Role::Seller) => true,
            // the sweep never cancels a trade the buyer claims to have paid
            (TradeEvent::Cancel, Role::System) => from == TradeStatus::Pending,
            _ => false,
        }
    }
}

/// Decide the outcome of `event` fired by `role` on a trade in `current`.
///
/// Checks run in a fixed order: terminal state, then actor, then whether the
/// event is legal from `current`.
pub fn transition(current: TradeStatus, event: TradeEvent, role: Role) -> Result<Transition> {
    if current.is_terminal() {
        return Err(TradeError::TradeFinalized(current));
    }
    if !event.permits(role, current) {
        return Err(TradeError::NotAuthorized(format!(
            "{event:?} as {role:?} while {current}"
        )));
    }

    let side_effect = match (current, event) {
        (TradeStatus::Pending, TradeEvent::MarkPaid) => SideEffect::None,
        (TradeStatus::PaymentSent, TradeEvent::Release) => SideEffect::CreditBuyer,
        (TradeStatus::Pending | TradeStatus::PaymentSent, TradeEvent::Cancel) => {
            SideEffect::RestoreLiquidity
        }
        _ => {
            return Err(TradeError::InvalidTransition {
                from: current,
                to: event.target(),
            });
        }
    };

    Ok(Transition {
        from: current,
        to: event.target(),
        event,
        side_effect,
    })
}

/// Like [`transition`] but addressed by target status.
pub fn transition_to(current: TradeStatus, target: TradeStatus, role: Role) -> Result<Transition> {
    if current.is_terminal() {
        return Err(TradeError::TradeFinalized(current));
    }
    let event = TradeEvent::for_target(target).ok_or(TradeError::InvalidTransition {
        from: current,
        to: target,
    })?;
    transition(current, event, role)
}
