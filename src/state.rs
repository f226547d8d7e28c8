use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::clock::{Clock, SystemClock};
use crate::srs::ReviewScheduler;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    scheduler: Arc<ReviewScheduler>,
    clock: Arc<dyn Clock>,
    rate_limiter: Arc<RateLimiter>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<Store>, config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::with_clock(store, config, shutdown_tx, Arc::new(SystemClock))
    }

    /// Same as `new` with an injected time source.
    pub fn with_clock(
        store: Arc<Store>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            scheduler: Arc::new(ReviewScheduler::new(config.srs.clone())),
            clock,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
