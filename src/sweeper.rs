//! Background reconciliation of expired trades.
//!
//! A trade left `PENDING` past its `expires_at` still holds liquidity on its
//! ad. The sweeper periodically cancels such trades through the regular
//! cancellation path so the reservation is returned.
use crate::error::TradeError;
use crate::service::MarketService;
use crate::types::TimeStamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

pub struct ExpirySweeper {
    service: Arc<MarketService>,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<MarketService>, period: Duration) -> Self {
        Self { service, period }
    }

    /// Uses the configured sweep interval.
    pub fn from_config(service: Arc<MarketService>) -> Self {
        let period = service.config().sweep_interval;
        Self::new(service, period)
    }

    /// One pass over the expiry index. Runs the blocking store work on the
    /// blocking pool.
    pub async fn sweep_once(&self) -> Result<usize, TradeError> {
        let service = Arc::clone(&self.service);
        let cancelled = tokio::task::spawn_blocking(move || service.sweep_expired(TimeStamp::new()))
            .await
            .map_err(|e| TradeError::Internal(format!("sweep task failed: {e}")))??;

        Ok(cancelled.len())
    }

    /// Sweep on every tick until `shutdown` flips to true or its sender is
    /// dropped. A zero period disables the loop.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.period.is_zero() {
            info!("expiry sweep disabled");
            return;
        }

        info!(period_secs = self.period.as_secs_f64(), "expiry sweeper started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "expired trades cancelled"),
                        Err(err) => error!(error = %err, "expiry sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("expiry sweeper stopped");
    }

    /// Spawn [`ExpirySweeper::run`] on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
