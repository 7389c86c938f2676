//! Walks one SELL ad through a completed trade and a cancelled one, with the
//! expiry sweeper running in the background.
//!
//! `cargo run --example marketplace`, with `RUST_LOG=info` to see the
//! service logs.
use anyhow::Context;
use p2p_escrow::{
    ad::AdDetails,
    config::MarketConfig,
    service::{ListTradesQuery, MarketService},
    sweeper::ExpirySweeper,
    trade::TradeStatus,
    types::{Amount, Direction, PaymentMethod},
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = MarketConfig::from_env()?;
    let db = sled::open(&config.db_path)
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let service = Arc::new(MarketService::new(Arc::new(db), config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::from_config(Arc::clone(&service)).spawn(shutdown_rx);

    let seller = service.register_user("alice")?;
    let buyer = service.register_user("bob")?;

    let ad = service.post_ad(
        seller.id(),
        AdDetails::new()
            .set_direction(Direction::Sell)
            .set_price("85".parse()?)
            .set_order_limits("1000".parse()?, "50000".parse()?)
            .set_total_amount("1000".parse()?)
            .add_payment_method(PaymentMethod::Upi)
            .add_payment_method(PaymentMethod::Bank)
            .set_terms("Pay from an account in your own name"),
    )?;

    let trade = service.create_trade(ad.id(), "100".parse()?, PaymentMethod::Upi, buyer.id())?;
    service.append_chat_message(trade.id(), buyer.id(), "Paid 8500 INR over UPI")?;
    service.transition_trade_status(trade.id(), TradeStatus::PaymentSent, buyer.id())?;
    service.transition_trade_status(trade.id(), TradeStatus::Completed, seller.id())?;
    service.rate_trade(trade.id(), buyer.id(), 5, Some("Quick release".into()))?;

    let second = service.create_trade(ad.id(), Amount::from(250), PaymentMethod::Bank, buyer.id())?;
    service.transition_trade_status(second.id(), TradeStatus::Cancelled, buyer.id())?;

    let ad = service.get_ad(ad.id())?;
    println!(
        "ad {}: {} of {} {} available, {} completed orders",
        ad.id(),
        ad.available_amount(),
        ad.total_amount(),
        ad.asset(),
        ad.completed_orders()
    );

    let buyer = service.get_user(buyer.id())?;
    println!(
        "{}: wallet {} {}, {} completed trades",
        buyer.display_name(),
        buyer.wallet_balance(),
        ad.asset(),
        buyer.completed_trades()
    );

    let page = service.list_trades_for_user(buyer.id(), ListTradesQuery::default())?;
    println!("page {} of {}, {} trades in total", page.page, page.pages, page.total);
    for trade in page.trades {
        println!("{:#?}", trade);
    }

    shutdown_tx.send(true)?;
    sweeper.await?;
    service.flush()?;
    Ok(())
}
