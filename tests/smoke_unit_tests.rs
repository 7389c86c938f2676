//! Smoke Screen Unit tests for the escrow engine's building blocks
//!
//! These tests exercise each public component in isolation from the
//! integration scenarios. They are intended as a smoke screen and mostly
//! cover the happy path.

use p2p_escrow::{
    ErrorKind, TradeError,
    ad::{AdDetails, DEFAULT_TIME_LIMIT_MINUTES},
    config::MarketConfig,
    ledger,
    lifecycle::{Role, SideEffect, TradeEvent, transition, transition_to},
    service::MarketService,
    sweeper::ExpirySweeper,
    trade::TradeStatus,
    types::{AdId, Amount, Direction, PaymentMethod, TimeStamp, TradeId, UserId},
    utils::new_uuid_to_bech32,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Generated ids carry their human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("trade_").unwrap();
        assert!(encoded.starts_with("trade_1"));
        assert!(encoded.len() > 10);
    }

    #[test]
    fn typed_ids_use_their_prefix() {
        assert!(UserId::generate().unwrap().as_str().starts_with("user_1"));
        assert!(AdId::generate().unwrap().as_str().starts_with("ad_1"));
        assert!(TradeId::generate().unwrap().as_str().starts_with("trade_1"));
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = TradeId::generate().unwrap();
        let id2 = TradeId::generate().unwrap();
        assert_ne!(id1, id2);
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn amounts_parse_exactly() {
        let amount: Amount = "100.12345678".parse().unwrap();
        assert_eq!(amount.value(), dec!(100.12345678));
        assert_eq!(amount.scale(), 8);

        let err = "12,5".parse::<Amount>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn enums_round_trip_through_text() {
        assert_eq!("sell".parse::<Direction>().unwrap(), Direction::Sell);
        assert_eq!(Direction::Buy.to_string(), "BUY");
        assert_eq!("upi".parse::<PaymentMethod>().unwrap(), PaymentMethod::Upi);
        assert_eq!(
            "PAYMENT_SENT".parse::<TradeStatus>().unwrap(),
            TradeStatus::PaymentSent
        );
        assert!("WIRE".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn timestamps_add_minutes() {
        let start = TimeStamp::new_with(2025, 1, 1, 12, 0, 0);
        let later = start.plus_minutes(15);
        assert_eq!(later, TimeStamp::new_with(2025, 1, 1, 12, 15, 0));
        assert!(start < later);
    }
}

// LEDGER MODULE TESTS
#[cfg(test)]
mod ledger_tests {
    use super::*;

    #[test]
    fn debit_then_credit_is_identity() {
        let total = Amount::from(1_000);
        let after_debit = ledger::debit_liquidity(total, Amount::new(dec!(123.45))).unwrap();
        assert_eq!(after_debit, Amount::new(dec!(876.55)));

        let restored = ledger::credit_liquidity(after_debit, Amount::new(dec!(123.45)), total).unwrap();
        assert_eq!(restored, total);
    }

    #[test]
    fn debit_past_zero_is_refused() {
        let err = ledger::debit_liquidity(Amount::from(10), Amount::from(11)).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientLiquidity { .. }));
    }

    #[test]
    fn only_an_empty_ad_is_dust() {
        assert!(ledger::is_dust(Amount::ZERO));
        assert!(!ledger::is_dust(Amount::new(dec!(0.00000001))));
    }
}

// AD BUILDER TESTS
#[cfg(test)]
mod ad_tests {
    use super::*;

    #[test]
    fn complete_details_validate() {
        let ad = AdDetails::new()
            .set_direction(Direction::Sell)
            .set_price(Amount::from(85))
            .set_order_limits(Amount::from(1_000), Amount::from(50_000))
            .set_total_amount(Amount::from(1_000))
            .add_payment_method(PaymentMethod::Upi)
            .validate_and_finalise(AdId::from("ad_smoke"), UserId::from("user_smoke"), TimeStamp::new())
            .unwrap();

        assert!(ad.is_active());
        assert_eq!(ad.available_amount(), ad.total_amount());
        assert_eq!(ad.asset(), "USDT");
        assert_eq!(ad.fiat_currency(), "INR");
        assert_eq!(ad.time_limit_minutes(), DEFAULT_TIME_LIMIT_MINUTES);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = AdDetails::new()
            .set_direction(Direction::Buy)
            .validate_and_finalise(AdId::from("ad_smoke"), UserId::from("user_smoke"), TimeStamp::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// LIFECYCLE MODULE TESTS
#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let paid = transition(TradeStatus::Pending, TradeEvent::MarkPaid, Role::Buyer).unwrap();
        assert_eq!(paid.to, TradeStatus::PaymentSent);
        assert_eq!(paid.side_effect, SideEffect::None);

        let released = transition(paid.to, TradeEvent::Release, Role::Seller).unwrap();
        assert_eq!(released.to, TradeStatus::Completed);
        assert_eq!(released.side_effect, SideEffect::CreditBuyer);
    }

    #[test]
    fn cancellation_restores_from_both_open_states() {
        for from in [TradeStatus::Pending, TradeStatus::PaymentSent] {
            for role in [Role::Buyer, Role::Seller] {
                let t = transition_to(from, TradeStatus::Cancelled, role).unwrap();
                assert_eq!(t.side_effect, SideEffect::RestoreLiquidity);
            }
        }
    }

    #[test]
    fn system_only_cancels_pending() {
        assert!(transition(TradeStatus::Pending, TradeEvent::Cancel, Role::System).is_ok());
        let err = transition(TradeStatus::PaymentSent, TradeEvent::Cancel, Role::System).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn terminal_states_report_finalized() {
        let err = transition_to(TradeStatus::Completed, TradeStatus::Cancelled, Role::Buyer).unwrap_err();
        assert_eq!(err.to_string(), "Trade has already been finalized as COMPLETED");
    }
}

// SWEEPER TESTS
#[cfg(test)]
mod sweeper_tests {
    use super::*;
    use tokio::sync::watch;

    fn service() -> (tempfile::TempDir, Arc<MarketService>) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("sweeper.db")).unwrap();
        let service = MarketService::new(Arc::new(db), MarketConfig::default()).unwrap();
        (temp_dir, Arc::new(service))
    }

    #[tokio::test]
    async fn sweep_once_with_nothing_expired() {
        let (_dir, service) = service();
        let sweeper = ExpirySweeper::new(service, Duration::from_millis(10));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (_dir, service) = service();
        let (tx, rx) = watch::channel(false);
        let handle = ExpirySweeper::new(service, Duration::from_millis(10)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn zero_period_returns_immediately() {
        let (_dir, service) = service();
        let (_tx, rx) = watch::channel(false);
        ExpirySweeper::new(service, Duration::ZERO).run(rx).await;
    }

    #[tokio::test]
    async fn configured_interval_drives_the_sweeper() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("configured.db")).unwrap();
        let config = MarketConfig::default().with_sweep_interval(Duration::ZERO);
        let service = Arc::new(MarketService::new(Arc::new(db), config).unwrap());
        let (_tx, rx) = watch::channel(false);

        // a disabled interval must return without waiting for shutdown
        tokio::time::timeout(
            Duration::from_secs(5),
            ExpirySweeper::from_config(service).run(rx),
        )
        .await
        .expect("configured interval was ignored");
    }
}
