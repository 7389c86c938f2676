//! Service layer API for the marketplace trade workflow
use crate::ad::{AdDetails, AdUpdate, Advertisement};
use crate::config::MarketConfig;
use crate::error::{Result, TradeError};
use crate::lifecycle::{self, Role, SideEffect, TradeEvent, Transition};
use crate::store::{Store, Tx, TxView, check};
use crate::trade::{NewTrade, Trade, TradeStatus};
use crate::types::{
    ASSET_DECIMALS, AdId, Amount, Direction, FIAT_DECIMALS, PaymentMethod, TimeStamp, TradeId,
    UserId,
};
use crate::user::UserAccount;
use chrono::Utc;
use sled::transaction::abort;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

pub struct MarketService {
    store: Store,
    config: MarketConfig,
}

/// Filter and paging for [`MarketService::list_trades_for_user`].
#[derive(Debug, Clone, Default)]
pub struct ListTradesQuery {
    pub status: Option<TradeStatus>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// One page of a user's trades plus the totals needed to page through the
/// rest.
#[derive(Debug, Clone)]
pub struct TradePage {
    pub trades: Vec<Trade>,
    /// Matching trades across all pages.
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

impl MarketService {
    pub fn new(instance: Arc<sled::Db>, config: MarketConfig) -> Result<Self> {
        Ok(Self {
            store: Store::open(instance)?,
            config,
        })
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Create the wallet record for a newly signed up user.
    pub fn register_user(&self, display_name: &str) -> Result<UserAccount> {
        let user = UserAccount::new(UserId::generate()?, display_name, TimeStamp::new())?;
        self.store.transaction(|tx| tx.put_user(&user))?;

        info!(user_id = %user.id(), "user registered");
        Ok(user)
    }

    pub fn get_user(&self, id: &UserId) -> Result<UserAccount> {
        self.store
            .user(id)?
            .ok_or_else(|| TradeError::UserNotFound(id.clone()))
    }

    /// Publish a new advertisement owned by `advertiser`.
    pub fn post_ad(&self, advertiser: &UserId, details: AdDetails) -> Result<Advertisement> {
        let ad = details.validate_and_finalise(AdId::generate()?, advertiser.clone(), TimeStamp::new())?;

        self.store.transaction(|tx| {
            tx.require_user(advertiser)?;
            tx.put_ad(&ad)
        })?;

        info!(
            ad_id = %ad.id(),
            advertiser = %advertiser,
            direction = %ad.direction(),
            price = %ad.price(),
            total = %ad.total_amount(),
            "ad posted"
        );
        Ok(ad)
    }

    pub fn get_ad(&self, id: &AdId) -> Result<Advertisement> {
        self.store
            .ad(id)?
            .ok_or_else(|| TradeError::AdNotFound(id.clone()))
    }

    /// Edit an ad's price, limits, payment methods, time limit or terms.
    /// Trades already open keep the price they were created with.
    pub fn update_ad(&self, ad_id: &AdId, advertiser: &UserId, update: AdUpdate) -> Result<Advertisement> {
        let now = TimeStamp::new();
        let ad = self.store.transaction(|tx| {
            let mut ad = tx.require_ad(ad_id)?;
            check(ensure_owner(&ad, advertiser))?;
            if ad.is_removed() {
                return abort(TradeError::AdInactive(ad_id.clone()));
            }
            check(ad.apply_update(update.clone(), now.clone()))?;
            tx.put_ad(&ad)?;
            Ok(ad)
        })?;

        info!(ad_id = %ad_id, "ad updated");
        Ok(ad)
    }

    /// Logically delete an ad. Open trades against it run to completion or
    /// cancellation as usual.
    pub fn remove_ad(&self, ad_id: &AdId, advertiser: &UserId) -> Result<Advertisement> {
        let now = TimeStamp::new();
        let ad = self.store.transaction(|tx| {
            let mut ad = tx.require_ad(ad_id)?;
            check(ensure_owner(&ad, advertiser))?;
            ad.mark_removed(now.clone());
            tx.put_ad(&ad)?;
            Ok(ad)
        })?;

        info!(ad_id = %ad_id, "ad removed");
        Ok(ad)
    }

    /// Open a trade against an ad, reserving its quantity in the same
    /// transaction that writes the trade.
    pub fn create_trade(
        &self,
        ad_id: &AdId,
        quantity: Amount,
        payment_method: PaymentMethod,
        requester: &UserId,
    ) -> Result<Trade> {
        if !quantity.is_positive() {
            return Err(TradeError::Validation(format!(
                "quantity must be positive, got {quantity}"
            )));
        }
        if quantity.scale() > ASSET_DECIMALS {
            return Err(TradeError::Validation(format!(
                "quantity allows at most {ASSET_DECIMALS} decimal places"
            )));
        }

        let trade_id = TradeId::generate()?;
        let now = TimeStamp::new();

        let res = self.store.transaction(|tx| {
            let mut ad = tx.require_ad(ad_id)?;
            if !ad.is_open() {
                return abort(TradeError::AdInactive(ad_id.clone()));
            }
            if !ad.accepts(payment_method) {
                return abort(TradeError::PaymentMethodNotAccepted(payment_method));
            }

            let total_price = check(self.order_value(&ad, quantity))?;
            if quantity > ad.available_amount() {
                return abort(TradeError::InsufficientLiquidity {
                    requested: quantity,
                    available: ad.available_amount(),
                });
            }

            let (buyer, seller) = match ad.direction() {
                Direction::Sell => (requester.clone(), ad.advertiser().clone()),
                Direction::Buy => (ad.advertiser().clone(), requester.clone()),
            };
            if buyer == seller {
                return abort(TradeError::SelfTrade);
            }

            let mut buyer_account = tx.require_user(&buyer)?;
            let mut seller_account = tx.require_user(&seller)?;

            check(ad.reserve(quantity))?;

            let trade = Trade::open(NewTrade {
                id: trade_id.clone(),
                ad_id: ad_id.clone(),
                buyer,
                seller,
                quantity,
                price: ad.price(),
                total_price,
                payment_method,
                created_at: now.clone(),
                expires_at: now.plus_minutes(ad.time_limit_minutes()),
            });

            buyer_account.record_opened_trade();
            seller_account.record_opened_trade();

            tx.put_ad(&ad)?;
            tx.put_trade(&trade)?;
            tx.put_user(&buyer_account)?;
            tx.put_user(&seller_account)?;
            Ok((trade, ad))
        });

        match res {
            Ok((trade, ad)) => {
                info!(
                    trade_id = %trade.id(),
                    ad_id = %ad_id,
                    buyer = %trade.buyer(),
                    seller = %trade.seller(),
                    quantity = %trade.quantity(),
                    total = %trade.total_price(),
                    remaining = %ad.available_amount(),
                    "trade opened"
                );
                if !ad.is_active() {
                    info!(ad_id = %ad_id, "ad fully reserved and deactivated");
                }
                Ok(trade)
            }
            Err(err) => {
                debug!(ad_id = %ad_id, requester = %requester, error = %err, "trade rejected");
                Err(err)
            }
        }
    }

    /// Move a trade to `target` on behalf of `actor`.
    pub fn transition_trade_status(
        &self,
        trade_id: &TradeId,
        target: TradeStatus,
        actor: &UserId,
    ) -> Result<Trade> {
        let now = TimeStamp::new();

        let res = self.store.transaction(|tx| {
            let mut trade = tx.require_trade(trade_id)?;
            let role = match trade.role_of(actor) {
                Some(role) => role,
                None => {
                    return abort(TradeError::NotAuthorized(format!(
                        "{actor} is not a party to trade {trade_id}"
                    )));
                }
            };
            let transition = check(lifecycle::transition_to(trade.status(), target, role))?;
            apply_transition(tx, &mut trade, &transition, Some(actor.clone()), now.clone())?;
            Ok(trade)
        });

        match res {
            Ok(trade) => {
                info!(
                    trade_id = %trade_id,
                    actor = %actor,
                    status = %trade.status(),
                    "trade status changed"
                );
                Ok(trade)
            }
            Err(err) => {
                debug!(trade_id = %trade_id, actor = %actor, to = %target, error = %err, "transition rejected");
                Err(err)
            }
        }
    }

    /// Append to a trade's chat. Either party may post in any status.
    pub fn append_chat_message(&self, trade_id: &TradeId, sender: &UserId, text: &str) -> Result<Trade> {
        let now = TimeStamp::new();
        self.store.transaction(|tx| {
            let mut trade = tx.require_trade(trade_id)?;
            if !trade.is_party(sender) {
                return abort(TradeError::NotAuthorized(format!(
                    "{sender} cannot message in trade {trade_id}"
                )));
            }
            check(trade.push_message(sender.clone(), text, now.clone()))?;
            tx.put_trade(&trade)?;
            Ok(trade)
        })
    }

    /// Read a trade. Only its buyer and seller may see it.
    pub fn get_trade(&self, trade_id: &TradeId, requester: &UserId) -> Result<Trade> {
        let trade = self
            .store
            .trade(trade_id)?
            .ok_or_else(|| TradeError::TradeNotFound(trade_id.clone()))?;

        if !trade.is_party(requester) {
            return Err(TradeError::NotAuthorized(format!(
                "{requester} cannot view trade {trade_id}"
            )));
        }
        Ok(trade)
    }

    /// Rate the other side of a completed trade and fold the score into
    /// their aggregate rating.
    pub fn rate_trade(
        &self,
        trade_id: &TradeId,
        rater: &UserId,
        rating: u8,
        review: Option<String>,
    ) -> Result<Trade> {
        let trade = self.store.transaction(|tx| {
            let mut trade = tx.require_trade(trade_id)?;
            let role = match trade.role_of(rater) {
                Some(role) => role,
                None => {
                    return abort(TradeError::NotAuthorized(format!(
                        "{rater} cannot rate trade {trade_id}"
                    )));
                }
            };
            let rated = check(trade.rate(role, rating, review.clone()))?;
            let mut rated_account = tx.require_user(&rated)?;
            rated_account.record_rating(rating);

            tx.put_trade(&trade)?;
            tx.put_user(&rated_account)?;
            Ok(trade)
        })?;

        info!(trade_id = %trade_id, rater = %rater, rating, "trade rated");
        Ok(trade)
    }

    /// Trades `user` is a party to, newest first.
    pub fn list_trades_for_user(&self, user: &UserId, query: ListTradesQuery) -> Result<TradePage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

        let mut trades = Vec::new();
        for id in self.store.trade_ids_for_user(user)? {
            match self.store.trade(&id)? {
                Some(trade) if query.status.is_none_or(|s| s == trade.status()) => trades.push(trade),
                Some(_) => {}
                None => warn!(trade_id = %id, "user index points at a missing trade"),
            }
        }
        trades.sort_by(|a, b| b.created_at().cmp(a.created_at()));

        let total = trades.len();
        let trades = trades
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(TradePage {
            trades,
            total,
            page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Cancel every `PENDING` trade that expired before `now`, giving its
    /// quantity back to the ad. Returns the ids that were cancelled.
    pub fn sweep_expired(&self, now: TimeStamp<Utc>) -> Result<Vec<TradeId>> {
        let mut cancelled = Vec::new();

        for trade_id in self.store.expired_pending(&now)? {
            let res = self.store.transaction(|tx| {
                let mut trade = tx.require_trade(&trade_id)?;
                // another request may have moved it since the index scan
                if !trade.is_expired(&now) {
                    return Ok(false);
                }
                let transition = check(lifecycle::transition(
                    trade.status(),
                    TradeEvent::Cancel,
                    Role::System,
                ))?;
                apply_transition(tx, &mut trade, &transition, None, now.clone())?;
                Ok(true)
            });

            match res {
                Ok(true) => {
                    info!(trade_id = %trade_id, "expired trade cancelled");
                    cancelled.push(trade_id);
                }
                Ok(false) => {}
                Err(err @ TradeError::Storage(_)) => return Err(err),
                Err(err) => warn!(trade_id = %trade_id, error = %err, "could not cancel expired trade"),
            }
        }

        Ok(cancelled)
    }

    /// Fiat value of `quantity` at the ad's price, checked against its order
    /// limits widened by the configured tolerance.
    fn order_value(&self, ad: &Advertisement, quantity: Amount) -> Result<Amount> {
        let total = quantity
            .checked_mul(ad.price())
            .ok_or_else(|| TradeError::Validation("order value overflows".into()))?
            .round_dp(FIAT_DECIMALS);

        let tolerance = self.config.bound_tolerance;
        let lower = ad.min_order_amount() - tolerance;
        let upper = ad.max_order_amount() + tolerance;
        if total < lower || total > upper {
            return Err(TradeError::AmountOutOfRange {
                total,
                min: ad.min_order_amount(),
                max: ad.max_order_amount(),
            });
        }
        Ok(total)
    }
}

fn ensure_owner(ad: &Advertisement, user: &UserId) -> Result<()> {
    if ad.advertiser() != user {
        return Err(TradeError::NotAuthorized(format!(
            "{user} does not own ad {}",
            ad.id()
        )));
    }
    Ok(())
}

/// Write a validated transition and its side effects. Runs inside the
/// caller's transaction so the status, the ad and both wallets move together.
fn apply_transition(
    tx: &TxView<'_>,
    trade: &mut Trade,
    transition: &Transition,
    actor: Option<UserId>,
    now: TimeStamp<Utc>,
) -> Tx<()> {
    match transition.side_effect {
        SideEffect::None => {}
        SideEffect::CreditBuyer => {
            let mut buyer = tx.require_user(trade.buyer())?;
            let mut seller = tx.require_user(trade.seller())?;
            let mut ad = tx.require_ad(trade.ad_id())?;

            check(buyer.credit(trade.quantity()))?;
            buyer.record_completed_trade();
            seller.record_completed_trade();
            ad.record_completed_order();

            tx.put_user(&buyer)?;
            tx.put_user(&seller)?;
            tx.put_ad(&ad)?;
        }
        SideEffect::RestoreLiquidity => {
            let mut ad = tx.require_ad(trade.ad_id())?;
            check(ad.restore(trade.quantity()))?;
            tx.put_ad(&ad)?;
        }
    }

    trade.apply(transition, actor, now);
    tx.put_trade(trade)
}
