//! Racing requests against one ad and one trade from many threads.
use p2p_escrow::{
    TradeError,
    ad::{AdDetails, Advertisement},
    config::MarketConfig,
    service::MarketService,
    trade::TradeStatus,
    types::{Amount, Direction, PaymentMethod, UserId},
};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::{TempDir, tempdir};

const THREADS: usize = 16;

fn setup(name: &str) -> anyhow::Result<(TempDir, Arc<MarketService>)> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join(name))?;
    let service = MarketService::new(Arc::new(db), MarketConfig::default())?;
    Ok((temp_dir, Arc::new(service)))
}

fn post_sell_ad(service: &MarketService, advertiser: &UserId, total: u64) -> anyhow::Result<Advertisement> {
    let details = AdDetails::new()
        .set_direction(Direction::Sell)
        .set_price(Amount::from(85))
        .set_order_limits(Amount::from(1_000), Amount::from(50_000))
        .set_total_amount(Amount::from(total))
        .add_payment_method(PaymentMethod::Upi);
    Ok(service.post_ad(advertiser, details)?)
}

#[test]
fn concurrent_orders_never_over_reserve() -> anyhow::Result<()> {
    let (_dir, service) = setup("over_reserve.db")?;

    let advertiser = service.register_user("seller")?;
    // room for five orders of 100 with 50 left over
    let ad = post_sell_ad(&service, advertiser.id(), 550)?;

    let mut buyers = Vec::with_capacity(THREADS);
    for i in 0..THREADS {
        buyers.push(service.register_user(&format!("buyer-{i}"))?);
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = buyers
        .into_iter()
        .map(|buyer| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let ad_id = ad.id().clone();
            thread::spawn(move || {
                barrier.wait();
                service.create_trade(&ad_id, Amount::from(100), PaymentMethod::Upi, buyer.id())
            })
        })
        .collect();

    let mut opened = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.join().expect("order thread panicked") {
            Ok(trade) => opened.push(trade),
            Err(TradeError::InsufficientLiquidity { .. }) => rejected += 1,
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    assert_eq!(opened.len(), 5);
    assert_eq!(rejected, THREADS - 5);

    let ad_after = service.get_ad(ad.id())?;
    assert_eq!(ad_after.available_amount(), Amount::from(50));
    assert!(ad_after.is_active());

    let reserved = opened
        .iter()
        .fold(Amount::ZERO, |acc, trade| acc + trade.quantity());
    assert_eq!(reserved + ad_after.available_amount(), ad_after.total_amount());
    Ok(())
}

#[test]
fn draining_race_deactivates_exactly_once() -> anyhow::Result<()> {
    let (_dir, service) = setup("drain.db")?;

    let advertiser = service.register_user("seller")?;
    let ad = post_sell_ad(&service, advertiser.id(), 300)?;

    let mut buyers = Vec::with_capacity(THREADS);
    for i in 0..THREADS {
        buyers.push(service.register_user(&format!("buyer-{i}"))?);
    }

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = buyers
        .into_iter()
        .map(|buyer| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let ad_id = ad.id().clone();
            thread::spawn(move || {
                barrier.wait();
                service.create_trade(&ad_id, Amount::from(100), PaymentMethod::Upi, buyer.id())
            })
        })
        .collect();

    let mut opened = 0;
    for handle in handles {
        match handle.join().expect("order thread panicked") {
            Ok(_) => opened += 1,
            // once the third order lands the ad is closed
            Err(TradeError::AdInactive(_)) | Err(TradeError::InsufficientLiquidity { .. }) => {}
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    assert_eq!(opened, 3);
    let ad_after = service.get_ad(ad.id())?;
    assert!(ad_after.available_amount().is_zero());
    assert!(!ad_after.is_active());
    Ok(())
}

#[test]
fn concurrent_releases_credit_once() -> anyhow::Result<()> {
    let (_dir, service) = setup("release_race.db")?;

    let advertiser = service.register_user("seller")?;
    let buyer = service.register_user("buyer")?;
    let ad = post_sell_ad(&service, advertiser.id(), 1_000)?;
    let trade = service.create_trade(ad.id(), Amount::from(100), PaymentMethod::Upi, buyer.id())?;
    service.transition_trade_status(trade.id(), TradeStatus::PaymentSent, buyer.id())?;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let trade_id = trade.id().clone();
            let seller = advertiser.id().clone();
            thread::spawn(move || {
                barrier.wait();
                service.transition_trade_status(&trade_id, TradeStatus::Completed, &seller)
            })
        })
        .collect();

    let mut released = 0;
    for handle in handles {
        match handle.join().expect("release thread panicked") {
            Ok(_) => released += 1,
            Err(TradeError::TradeFinalized(TradeStatus::Completed)) => {}
            Err(other) => panic!("unexpected rejection: {other}"),
        }
    }

    assert_eq!(released, 1);
    let buyer_after = service.get_user(buyer.id())?;
    assert_eq!(buyer_after.wallet_balance(), Amount::from(100));
    assert_eq!(buyer_after.completed_trades(), 1);
    assert_eq!(service.get_ad(ad.id())?.completed_orders(), 1);
    Ok(())
}

#[test]
fn cancel_and_release_race_has_one_winner() -> anyhow::Result<()> {
    let (_dir, service) = setup("cancel_release.db")?;

    let advertiser = service.register_user("seller")?;
    let buyer = service.register_user("buyer")?;
    let ad = post_sell_ad(&service, advertiser.id(), 1_000)?;

    for _ in 0..8 {
        let trade = service.create_trade(ad.id(), Amount::from(100), PaymentMethod::Upi, buyer.id())?;
        service.transition_trade_status(trade.id(), TradeStatus::PaymentSent, buyer.id())?;

        let wallet_before = service.get_user(buyer.id())?.wallet_balance();
        let available_before = service.get_ad(ad.id())?.available_amount();

        let barrier = Arc::new(Barrier::new(2));
        let cancel = {
            let (service, barrier) = (Arc::clone(&service), Arc::clone(&barrier));
            let (trade_id, actor) = (trade.id().clone(), buyer.id().clone());
            thread::spawn(move || {
                barrier.wait();
                service.transition_trade_status(&trade_id, TradeStatus::Cancelled, &actor)
            })
        };
        let release = {
            let (service, barrier) = (Arc::clone(&service), Arc::clone(&barrier));
            let (trade_id, actor) = (trade.id().clone(), advertiser.id().clone());
            thread::spawn(move || {
                barrier.wait();
                service.transition_trade_status(&trade_id, TradeStatus::Completed, &actor)
            })
        };

        let cancelled = cancel.join().expect("cancel thread panicked").is_ok();
        let completed = release.join().expect("release thread panicked").is_ok();
        assert!(cancelled ^ completed);

        let wallet_after = service.get_user(buyer.id())?.wallet_balance();
        let available_after = service.get_ad(ad.id())?.available_amount();
        if completed {
            assert_eq!(wallet_after, wallet_before + Amount::from(100));
            assert_eq!(available_after, available_before);
        } else {
            assert_eq!(wallet_after, wallet_before);
            assert_eq!(available_after, available_before + Amount::from(100));
        }
    }
    Ok(())
}
