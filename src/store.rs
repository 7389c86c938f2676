//! sled persistence for ads, trades and users.
//!
//! Each collection lives in its own tree keyed by id with a CBOR value. Two
//! index trees support the read paths the engine needs:
//!
//! * `pending_by_expiry` - `expires_at` nanos (big endian) followed by the
//!   trade id, for every trade still `PENDING`
//! * `user_trades` - `<user id>/<trade id>` for both parties of every trade
//!
//! Every multi-record write goes through [`Store::transaction`], which runs the
//! closure inside one serializable sled transaction over all five trees. sled
//! re-runs the closure on conflict, so the closure must only depend on what it
//! reads through the [`TxView`].
use crate::ad::Advertisement;
use crate::error::{Result, TradeError};
use crate::trade::Trade;
use crate::types::{AdId, TimeStamp, TradeId, UserId};
use crate::user::UserAccount;
use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use std::sync::Arc;

pub type Tx<T> = ConflictableTransactionResult<T, TradeError>;

const ADS_TREE: &str = "ads";
const TRADES_TREE: &str = "trades";
const USERS_TREE: &str = "users";
const EXPIRY_TREE: &str = "pending_by_expiry";
const USER_TRADES_TREE: &str = "user_trades";

pub struct Store {
    instance: Arc<sled::Db>,
    ads: sled::Tree,
    trades: sled::Tree,
    users: sled::Tree,
    pending_by_expiry: sled::Tree,
    user_trades: sled::Tree,
}

/// Typed access to the trees from inside a transaction.
pub struct TxView<'a> {
    ads: &'a TransactionalTree,
    trades: &'a TransactionalTree,
    users: &'a TransactionalTree,
    pending_by_expiry: &'a TransactionalTree,
    user_trades: &'a TransactionalTree,
}

/// Lift a domain result into a transaction result, aborting on error.
pub fn check<T>(res: Result<T>) -> Tx<T> {
    res.map_err(ConflictableTransactionError::Abort)
}

fn decode<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

fn expiry_key(expires_at: &TimeStamp<Utc>, trade_id: &TradeId) -> Vec<u8> {
    let mut key = expiry_prefix(expires_at).to_vec();
    key.extend_from_slice(trade_id.as_str().as_bytes());
    key
}

fn expiry_prefix(at: &TimeStamp<Utc>) -> [u8; 8] {
    let nanos = at.to_datetime_utc().timestamp_nanos_opt().unwrap_or(i64::MAX);
    (nanos.max(0) as u64).to_be_bytes()
}

fn user_trade_key(user: &UserId, trade_id: &TradeId) -> String {
    format!("{user}/{trade_id}")
}

fn id_from_bytes(bytes: &[u8]) -> Result<TradeId> {
    let id = std::str::from_utf8(bytes)
        .map_err(|e| TradeError::Codec(format!("trade id is not utf-8: {e}")))?;
    Ok(TradeId::from(id))
}

impl Store {
    pub fn open(instance: Arc<sled::Db>) -> Result<Self> {
        Ok(Self {
            ads: instance.open_tree(ADS_TREE)?,
            trades: instance.open_tree(TRADES_TREE)?,
            users: instance.open_tree(USERS_TREE)?,
            pending_by_expiry: instance.open_tree(EXPIRY_TREE)?,
            user_trades: instance.open_tree(USER_TRADES_TREE)?,
            instance,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.instance.flush()?;
        Ok(())
    }

    pub fn ad(&self, id: &AdId) -> Result<Option<Advertisement>> {
        self.ads
            .get(id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn trade(&self, id: &TradeId) -> Result<Option<Trade>> {
        self.trades
            .get(id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    pub fn user(&self, id: &UserId) -> Result<Option<UserAccount>> {
        self.users
            .get(id.as_str().as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Ids of trades that are still indexed as pending and expired before `now`.
    pub fn expired_pending(&self, now: &TimeStamp<Utc>) -> Result<Vec<TradeId>> {
        self.pending_by_expiry
            .range(..expiry_prefix(now))
            .values()
            .map(|value| id_from_bytes(&value?))
            .collect()
    }

    /// Ids of every trade `user` is a party to, in key order.
    pub fn trade_ids_for_user(&self, user: &UserId) -> Result<Vec<TradeId>> {
        self.user_trades
            .scan_prefix(format!("{user}/").as_bytes())
            .values()
            .map(|value| id_from_bytes(&value?))
            .collect()
    }

    /// Run `f` atomically over all trees. A [`TradeError`] returned from the
    /// closure aborts the transaction and is handed back unchanged.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&TxView<'_>) -> Tx<R>,
    {
        let res = (
            &self.ads,
            &self.trades,
            &self.users,
            &self.pending_by_expiry,
            &self.user_trades,
        )
            .transaction(|(ads, trades, users, pending_by_expiry, user_trades)| {
                let view = TxView {
                    ads,
                    trades,
                    users,
                    pending_by_expiry,
                    user_trades,
                };
                f(&view)
            });

        Ok(res?)
    }
}

impl TxView<'_> {
    fn load<T>(tree: &TransactionalTree, key: &str) -> Tx<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match tree.get(key.as_bytes())? {
            Some(bytes) => check(decode(&bytes)).map(Some),
            None => Ok(None),
        }
    }

    fn save<T: minicbor::Encode<()>>(tree: &TransactionalTree, key: &str, value: &T) -> Tx<()> {
        let bytes = check(encode(value))?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn ad(&self, id: &AdId) -> Tx<Option<Advertisement>> {
        Self::load(self.ads, id.as_str())
    }

    pub fn require_ad(&self, id: &AdId) -> Tx<Advertisement> {
        self.ad(id)?
            .map_or_else(|| sled::transaction::abort(TradeError::AdNotFound(id.clone())), Ok)
    }

    pub fn put_ad(&self, ad: &Advertisement) -> Tx<()> {
        Self::save(self.ads, ad.id().as_str(), ad)
    }

    pub fn trade(&self, id: &TradeId) -> Tx<Option<Trade>> {
        Self::load(self.trades, id.as_str())
    }

    pub fn require_trade(&self, id: &TradeId) -> Tx<Trade> {
        self.trade(id)?
            .map_or_else(|| sled::transaction::abort(TradeError::TradeNotFound(id.clone())), Ok)
    }

    /// Persist a trade and keep both indexes in line with its status.
    pub fn put_trade(&self, trade: &Trade) -> Tx<()> {
        Self::save(self.trades, trade.id().as_str(), trade)?;

        let expiry = expiry_key(trade.expires_at(), trade.id());
        if trade.status() == crate::trade::TradeStatus::Pending {
            self.pending_by_expiry
                .insert(expiry, trade.id().as_str().as_bytes())?;
        } else {
            self.pending_by_expiry.remove(expiry)?;
        }

        for party in [trade.buyer(), trade.seller()] {
            self.user_trades.insert(
                user_trade_key(party, trade.id()).as_bytes(),
                trade.id().as_str().as_bytes(),
            )?;
        }
        Ok(())
    }

    pub fn user(&self, id: &UserId) -> Tx<Option<UserAccount>> {
        Self::load(self.users, id.as_str())
    }

    pub fn require_user(&self, id: &UserId) -> Tx<UserAccount> {
        self.user(id)?
            .map_or_else(|| sled::transaction::abort(TradeError::UserNotFound(id.clone())), Ok)
    }

    pub fn put_user(&self, user: &UserAccount) -> Tx<()> {
        Self::save(self.users, user.id().as_str(), user)
    }
}
