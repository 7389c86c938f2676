//! Trade records, their chat log and status audit trail
use crate::error::{Result, TradeError};
use crate::lifecycle::{Role, Transition};
use crate::types::{AdId, Amount, PaymentMethod, TimeStamp, TradeId, UserId};
use chrono::Utc;
use std::fmt;
use std::str::FromStr;

pub const MAX_MESSAGE_LEN: usize = 2_000;
pub const MAX_REVIEW_LEN: usize = 1_000;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    PaymentSent,
    #[n(2)]
    Completed,
    #[n(3)]
    Cancelled,
    // reserved for arbitration, nothing transitions here yet
    #[n(4)]
    Disputed,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TradeStatus::Completed | TradeStatus::Cancelled)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::PaymentSent => "PAYMENT_SENT",
            TradeStatus::Completed => "COMPLETED",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Disputed => "DISPUTED",
        };
        f.write_str(name)
    }
}

impl FromStr for TradeStatus {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TradeStatus::Pending),
            "PAYMENT_SENT" => Ok(TradeStatus::PaymentSent),
            "COMPLETED" => Ok(TradeStatus::Completed),
            "CANCELLED" => Ok(TradeStatus::Cancelled),
            "DISPUTED" => Ok(TradeStatus::Disputed),
            other => Err(TradeError::Validation(format!("unknown trade status {other}"))),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    #[n(0)]
    pub sender: UserId,
    #[n(1)]
    pub message: String,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
}

/// One entry of the status audit trail. `actor` is `None` when the expiry
/// sweep made the change.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct StatusChange {
    #[n(0)]
    pub actor: Option<UserId>,
    #[n(1)]
    pub from: TradeStatus,
    #[n(2)]
    pub to: TradeStatus,
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Trade {
    #[n(0)]
    id: TradeId,
    #[n(1)]
    ad_id: AdId,
    #[n(2)]
    buyer: UserId,
    #[n(3)]
    seller: UserId,
    #[n(4)]
    quantity: Amount, // asset
    #[n(5)]
    price: Amount, // frozen at creation
    #[n(6)]
    total_price: Amount, // fiat, frozen at creation
    #[n(7)]
    payment_method: PaymentMethod,
    #[n(8)]
    status: TradeStatus,
    #[n(9)]
    chat_history: Vec<ChatMessage>,
    #[n(10)]
    buyer_rating: Option<u8>, // given to the buyer by the seller
    #[n(11)]
    buyer_review: Option<String>,
    #[n(12)]
    seller_rating: Option<u8>, // given to the seller by the buyer
    #[n(13)]
    seller_review: Option<String>,
    #[n(14)]
    created_at: TimeStamp<Utc>,
    #[n(15)]
    expires_at: TimeStamp<Utc>,
    #[n(16)]
    completed_at: Option<TimeStamp<Utc>>,
    #[n(17)]
    cancelled_at: Option<TimeStamp<Utc>>,
    #[n(18)]
    history: Vec<StatusChange>,
}

/// Everything the factory decided about a new trade.
pub(crate) struct NewTrade {
    pub id: TradeId,
    pub ad_id: AdId,
    pub buyer: UserId,
    pub seller: UserId,
    pub quantity: Amount,
    pub price: Amount,
    pub total_price: Amount,
    pub payment_method: PaymentMethod,
    pub created_at: TimeStamp<Utc>,
    pub expires_at: TimeStamp<Utc>,
}

impl Trade {
    pub(crate) fn open(new: NewTrade) -> Self {
        Self {
            id: new.id,
            ad_id: new.ad_id,
            buyer: new.buyer,
            seller: new.seller,
            quantity: new.quantity,
            price: new.price,
            total_price: new.total_price,
            payment_method: new.payment_method,
            status: TradeStatus::Pending,
            chat_history: vec![],
            buyer_rating: None,
            buyer_review: None,
            seller_rating: None,
            seller_review: None,
            created_at: new.created_at,
            expires_at: new.expires_at,
            completed_at: None,
            cancelled_at: None,
            history: vec![],
        }
    }

    pub fn id(&self) -> &TradeId {
        &self.id
    }
    pub fn ad_id(&self) -> &AdId {
        &self.ad_id
    }
    pub fn buyer(&self) -> &UserId {
        &self.buyer
    }
    pub fn seller(&self) -> &UserId {
        &self.seller
    }
    pub fn quantity(&self) -> Amount {
        self.quantity
    }
    pub fn price(&self) -> Amount {
        self.price
    }
    pub fn total_price(&self) -> Amount {
        self.total_price
    }
    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }
    pub fn status(&self) -> TradeStatus {
        self.status
    }
    pub fn chat_history(&self) -> &[ChatMessage] {
        &self.chat_history
    }
    pub fn buyer_rating(&self) -> Option<u8> {
        self.buyer_rating
    }
    pub fn buyer_review(&self) -> Option<&str> {
        self.buyer_review.as_deref()
    }
    pub fn seller_rating(&self) -> Option<u8> {
        self.seller_rating
    }
    pub fn seller_review(&self) -> Option<&str> {
        self.seller_review.as_deref()
    }
    pub fn created_at(&self) -> &TimeStamp<Utc> {
        &self.created_at
    }
    pub fn expires_at(&self) -> &TimeStamp<Utc> {
        &self.expires_at
    }
    pub fn completed_at(&self) -> Option<&TimeStamp<Utc>> {
        self.completed_at.as_ref()
    }
    pub fn cancelled_at(&self) -> Option<&TimeStamp<Utc>> {
        self.cancelled_at.as_ref()
    }
    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    /// The caller's side of this trade, if they are a party to it.
    pub fn role_of(&self, user: &UserId) -> Option<Role> {
        if *user == self.buyer {
            Some(Role::Buyer)
        } else if *user == self.seller {
            Some(Role::Seller)
        } else {
            None
        }
    }

    pub fn is_party(&self, user: &UserId) -> bool {
        self.role_of(user).is_some()
    }

    pub fn counterparty_of(&self, user: &UserId) -> Option<&UserId> {
        match self.role_of(user)? {
            Role::Buyer => Some(&self.seller),
            Role::Seller => Some(&self.buyer),
            Role::System => None,
        }
    }

    pub fn is_expired(&self, now: &TimeStamp<Utc>) -> bool {
        self.status == TradeStatus::Pending && self.expires_at < *now
    }

    /// Record an already validated transition. Only the lifecycle decides
    /// what `transition` is.
    pub(crate) fn apply(&mut self, transition: &Transition, actor: Option<UserId>, now: TimeStamp<Utc>) {
        self.history.push(StatusChange {
            actor,
            from: transition.from,
            to: transition.to,
            timestamp: now.clone(),
        });
        self.status = transition.to;
        match transition.to {
            TradeStatus::Completed => self.completed_at = Some(now),
            TradeStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
    }

    pub(crate) fn push_message(&mut self, sender: UserId, text: &str, now: TimeStamp<Utc>) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(TradeError::Validation("message cannot be empty".into()));
        }
        if message.len() > MAX_MESSAGE_LEN {
            return Err(TradeError::Validation(format!(
                "message exceeds {MAX_MESSAGE_LEN} bytes"
            )));
        }
        self.chat_history.push(ChatMessage {
            sender,
            message: message.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// Store a rating given by `rater_role` about the other side. Returns the
    /// rated user.
    pub(crate) fn rate(&mut self, rater_role: Role, rating: u8, review: Option<String>) -> Result<UserId> {
        if self.status != TradeStatus::Completed {
            return Err(TradeError::NotCompleted);
        }
        if !(1..=5).contains(&rating) {
            return Err(TradeError::InvalidRating(rating));
        }
        if review.as_ref().is_some_and(|r| r.len() > MAX_REVIEW_LEN) {
            return Err(TradeError::Validation(format!(
                "review exceeds {MAX_REVIEW_LEN} bytes"
            )));
        }

        match rater_role {
            Role::Buyer => {
                if self.seller_rating.is_some() {
                    return Err(TradeError::AlreadyRated);
                }
                self.seller_rating = Some(rating);
                self.seller_review = review;
                Ok(self.seller.clone())
            }
            Role::Seller => {
                if self.buyer_rating.is_some() {
                    return Err(TradeError::AlreadyRated);
                }
                self.buyer_rating = Some(rating);
                self.buyer_review = review;
                Ok(self.buyer.clone())
            }
            Role::System => Err(TradeError::Validation("the system cannot rate a trade".into())),
        }
    }
}
