//! Trade lifecycle and escrow accounting for a peer-to-peer stablecoin
//! marketplace.
//!
//! [`service::MarketService`] is the entry point: it opens trades against
//! advertisements, reserving the ad's liquidity, and walks them through the
//! [`lifecycle`] state machine to release or cancellation. All state lives in
//! sled and every operation commits as one transaction.

pub mod ad;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod trade;
pub mod types;
pub mod user;
pub mod utils;

pub use error::{ErrorKind, Result, TradeError};
