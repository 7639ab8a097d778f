//! Bot runner: the poll-decide-act loop.
//!
//! Each iteration fetches the mid, hands it to the position engine and
//! publishes the resulting snapshot. A failed iteration leaves the engine
//! untouched and waits a randomized, bounded delay before the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{error, info, warn};

use crate::api::{OrderGateway, PriceFeed};
use crate::clock::Clock;
use crate::telemetry::{Snapshot, TelemetrySink};
use crate::trading::PositionEngine;

/// Loop timing.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Delay between successful iterations
    pub poll_interval: Duration,

    /// Upper bound on the delay after a failed iteration
    pub max_backoff: Duration,

    /// Random extra delay added to the poll interval after a failure
    pub backoff_jitter: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
            backoff_jitter: Duration::from_secs(3),
        }
    }
}

/// Main bot runner.
pub struct Bot<F, G, C, T> {
    config: BotConfig,
    engine: PositionEngine,
    feed: F,
    gateway: G,
    clock: C,
    sink: T,
    consecutive_errors: u32,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl<F, G, C, T> Bot<F, G, C, T>
where
    F: PriceFeed,
    G: OrderGateway,
    C: Clock,
    T: TelemetrySink,
{
    pub fn new(config: BotConfig, engine: PositionEngine, feed: F, gateway: G, clock: C, sink: T) -> Self {
        Self {
            config,
            engine,
            feed,
            gateway,
            clock,
            sink,
            consecutive_errors: 0,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown signal for external control.
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    #[cfg(test)]
    pub fn engine(&self) -> &PositionEngine {
        &self.engine
    }

    /// Main run loop. Returns once the shutdown flag is set.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            max_backoff_ms = self.config.max_backoff.as_millis() as u64,
            "Starting bot run loop"
        );

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            let delay = self.step().await;
            self.clock.sleep(delay).await;
        }

        let ledger = self.engine.ledger();
        info!(
            equity = %ledger.equity().round_dp(2),
            high_water = %ledger.high_water().round_dp(2),
            day_pnl = %ledger.day_pnl().round_dp(4),
            "Bot stopped\n{}",
            self.engine.stats()
        );
        if let Some(position) = self.engine.position() {
            warn!(
                side = position.side.label(),
                entry = %position.entry,
                remaining = %position.remaining_size,
                "Stopped with an open position"
            );
        }
        if let Some(pending) = self.engine.pending() {
            warn!(cloid = %pending.request.correlation_id, "Stopped with an unreconciled order");
        }
        Ok(())
    }

    /// Run one iteration and return how long to wait before the next.
    pub async fn step(&mut self) -> Duration {
        match self.tick().await {
            Ok(snapshot) => {
                self.consecutive_errors = 0;
                self.sink.publish(&snapshot);
                self.config.poll_interval
            }
            Err(e) => {
                self.consecutive_errors += 1;
                let delay = self.backoff_delay();
                error!(
                    error = %format!("{e:#}"),
                    consecutive = self.consecutive_errors,
                    backoff_ms = delay.as_millis() as u64,
                    "Error in bot tick"
                );
                let snapshot = self.engine.error_snapshot(
                    self.clock.now(),
                    format!("ERROR {e:#} | backoff {:.1}s", delay.as_secs_f64()),
                );
                self.sink.publish(&snapshot);
                delay
            }
        }
    }

    /// Single iteration of the main loop.
    async fn tick(&mut self) -> Result<Snapshot> {
        let price = self.feed.mid().await.context("Failed to fetch mid price")?;
        Ok(self.engine.on_price(price, &mut self.gateway, &self.clock).await)
    }

    fn backoff_delay(&self) -> Duration {
        let jitter = self
            .config
            .backoff_jitter
            .mul_f64(rand::thread_rng().gen::<f64>());
        (self.config.poll_interval + jitter).min(self.config.max_backoff)
    }
}
