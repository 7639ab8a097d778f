//! Position state machine: FLAT -> LONG/SHORT -> FLAT, one decision per price.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{AssetMeta, OrderGateway, OrderOutcome, OrderRequest, OrderSide, TimeInForce};
use crate::clock::Clock;
use crate::metrics::SessionStats;
use crate::models::{ClosedTrade, ExitReason, Position, Side};
use crate::telemetry::{EngineStatus, Snapshot};

use super::{
    EngineConfig, EntryMode, EquityLedger, RiskSizer, Strategy, TargetPlanner, VolatilityRegime,
};

/// State change waiting on an order whose outcome was unknown.
#[derive(Debug, Clone)]
pub enum PendingAction {
    Entry(Position),
    Partial { size: Decimal, price: Decimal, taker_ratio: Decimal },
    Close { reason: ExitReason, size: Decimal, price: Decimal, taker_ratio: Decimal },
}

/// An order parked for reconciliation.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub request: OrderRequest,
    pub action: PendingAction,
}

/// A priced order plus the share of it expected to fill as taker.
struct Leg {
    request: OrderRequest,
    taker_ratio: Decimal,
}

/// Single-symbol position engine.
pub struct PositionEngine {
    config: EngineConfig,
    asset: AssetMeta,
    regime: VolatilityRegime,
    planner: TargetPlanner,
    sizer: RiskSizer,
    strategy: Strategy,
    ledger: EquityLedger,
    position: Option<Position>,
    pending: Option<PendingOrder>,
    cooldown_until: Option<DateTime<Utc>>,
    stats: SessionStats,
    last_event: String,
}

impl PositionEngine {
    /// Create a flat engine. Fails on an invalid configuration.
    pub fn new(config: EngineConfig, asset: AssetMeta, today: NaiveDate) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            regime: VolatilityRegime::new(&config),
            planner: TargetPlanner::new(&config),
            sizer: RiskSizer::new(&config),
            strategy: Strategy::new(&config),
            ledger: EquityLedger::new(&config, today),
            config,
            asset,
            position: None,
            pending: None,
            cooldown_until: None,
            stats: SessionStats::default(),
            last_event: "started".to_string(),
        })
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingOrder> {
        self.pending.as_ref()
    }

    pub fn ledger(&self) -> &EquityLedger {
        &self.ledger
    }

    #[cfg(test)]
    pub fn regime(&self) -> &VolatilityRegime {
        &self.regime
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    /// Process one mid price and return the resulting snapshot.
    pub async fn on_price<G, C>(&mut self, price: Decimal, gateway: &mut G, clock: &C) -> Snapshot
    where
        G: OrderGateway + ?Sized,
        C: Clock + ?Sized,
    {
        self.ledger.roll_day(clock.now().date_naive());
        self.regime.update(price);

        if self.pending.is_some() && !self.reconcile(gateway, clock).await {
            return self.snapshot(clock.now(), Some(price));
        }

        if self.position.is_some() {
            self.manage_position(price, gateway, clock).await;
        } else {
            self.try_enter(price, gateway, clock).await;
        }

        self.snapshot(clock.now(), Some(price))
    }

    /// Snapshot for an iteration that failed before reaching the engine.
    pub fn error_snapshot(&self, at: DateTime<Utc>, event: String) -> Snapshot {
        let mut snapshot = self.snapshot(at, None);
        snapshot.status = EngineStatus::Error;
        snapshot.event = event;
        snapshot
    }

    /// Ask the gateway about the parked order. Returns true once it is resolved.
    async fn reconcile<G, C>(&mut self, gateway: &mut G, clock: &C) -> bool
    where
        G: OrderGateway + ?Sized,
        C: Clock + ?Sized,
    {
        let Some(pending) = self.pending.take() else {
            return true;
        };

        match gateway.status(&pending.request.correlation_id).await {
            OrderOutcome::Accepted { order_id } => {
                info!(
                    cloid = %pending.request.correlation_id,
                    order_id = ?order_id,
                    "Pending order resolved as accepted"
                );
                let now = clock.now();
                match pending.action {
                    PendingAction::Entry(position) => {
                        self.commit_entry(position);
                    }
                    PendingAction::Partial { size, price, taker_ratio } => {
                        self.commit_partial(size, price, taker_ratio, now);
                    }
                    PendingAction::Close { reason, size, price, taker_ratio } => {
                        self.commit_close(reason, size, price, taker_ratio, now);
                    }
                }
                true
            }
            OrderOutcome::Rejected { reason } => {
                warn!(cloid = %pending.request.correlation_id, reason = %reason, "Pending order resolved as rejected");
                self.stats.record_rejected();
                self.last_event = format!("RECONCILED REJECT: {reason}");
                true
            }
            OrderOutcome::Unknown { reason } => {
                debug!(cloid = %pending.request.correlation_id, reason = %reason, "Order still unresolved");
                self.last_event = format!("RECONCILE {}: {reason}", pending.request.correlation_id);
                self.pending = Some(pending);
                false
            }
        }
    }

    async fn try_enter<G, C>(&mut self, price: Decimal, gateway: &mut G, clock: &C)
    where
        G: OrderGateway + ?Sized,
        C: Clock + ?Sized,
    {
        let now = clock.now();

        if self.ledger.is_paused() {
            self.last_event = format!(
                "PAUSE: daily drawdown {:.2}% >= {}%",
                self.ledger.daily_dd_pct(),
                self.config.daily_dd_limit_pct
            );
            return;
        }

        if let Some(until) = self.cooldown_until.filter(|until| now < *until) {
            self.last_event = format!("COOLDOWN {}s", (until - now).num_seconds().max(1));
            return;
        }

        let validation = self.strategy.evaluate_entry(price, &self.regime);
        let Some(side) = validation.side.filter(|_| validation.allowed) else {
            self.last_event = validation.reason;
            return;
        };

        let volatility = self.regime.volatility();
        let plan = self.planner.plan_position(price, side, volatility);
        let raw_size = self
            .sizer
            .size(self.ledger.equity(), price, plan.stop_loss, self.config.max_size);
        let size = self.asset.format_size(raw_size);
        if size <= Decimal::ZERO {
            self.last_event = format!("SKIP: size {raw_size} below lot size");
            return;
        }

        let leg = self.entry_leg(side, price, size);
        let position = Position {
            side,
            size,
            remaining_size: size,
            entry: price,
            stop_loss: plan.stop_loss,
            tp1: plan.tp1,
            tp2: plan.tp2,
            trail_steps: 0,
            partial_done: false,
            entry_taker_ratio: leg.taker_ratio,
            opened_at: now,
        };

        info!(
            side = side.label(),
            mid = %price,
            limit = %leg.request.price,
            size = %size,
            tp1 = %plan.tp1.round_dp(2),
            tp2 = %plan.tp2.round_dp(2),
            sl = %plan.stop_loss.round_dp(2),
            reason = %validation.reason,
            "Submitting entry"
        );

        match gateway.submit(&leg.request).await {
            OrderOutcome::Accepted { .. } => self.commit_entry(position),
            OrderOutcome::Rejected { reason } => {
                warn!(side = side.label(), reason = %reason, "Entry rejected");
                self.stats.record_rejected();
                self.last_event = format!("ENTRY REJECTED: {reason}");
            }
            OrderOutcome::Unknown { reason } => {
                self.park(leg.request, PendingAction::Entry(position), &reason);
            }
        }
    }

    async fn manage_position<G, C>(&mut self, price: Decimal, gateway: &mut G, clock: &C)
    where
        G: OrderGateway + ?Sized,
        C: Clock + ?Sized,
    {
        let volatility = self.regime.volatility();

        if let Some(position) = self.position.as_mut() {
            if let Some(update) = self.strategy.trailing_update(position, price, volatility) {
                position.trail_steps = update.step;
                if let Some(stop) = update.stop {
                    position.stop_loss = stop;
                    self.last_event = format!("TRAIL SL -> {:.2}", stop);
                    debug!(step = update.step, stop = %stop, "Trailing stop tightened");
                }
            }
        }

        let Some(position) = self.position.clone() else {
            return;
        };

        if self.strategy.partial_due(&position, price) {
            let size = self.asset.format_size(position.size * self.config.partial_ratio);
            if size <= Decimal::ZERO || size >= position.remaining_size {
                if let Some(open) = self.position.as_mut() {
                    open.partial_done = true;
                }
                self.last_event = format!("PARTIAL SKIPPED: size {size} not tradable");
            } else {
                let leg = self.exit_leg(position.side, price, size);
                match gateway.submit(&leg.request).await {
                    OrderOutcome::Accepted { .. } => {
                        self.commit_partial(size, price, leg.taker_ratio, clock.now());
                        clock
                            .sleep(Duration::from_millis(self.config.partial_settle_ms))
                            .await;
                    }
                    OrderOutcome::Rejected { reason } => {
                        warn!(reason = %reason, "Partial exit rejected");
                        self.stats.record_rejected();
                        self.last_event = format!("PARTIAL REJECTED: {reason}");
                    }
                    OrderOutcome::Unknown { reason } => {
                        let action = PendingAction::Partial {
                            size,
                            price,
                            taker_ratio: leg.taker_ratio,
                        };
                        self.park(leg.request, action, &reason);
                        return;
                    }
                }
            }
        }

        let Some(position) = self.position.clone() else {
            return;
        };
        let Some(reason) = self.strategy.check_exit(&position, price) else {
            return;
        };

        let size = self.asset.format_size(position.remaining_size);
        if size <= Decimal::ZERO {
            // Nothing left on the venue to close
            self.commit_close(reason, Decimal::ZERO, price, Decimal::ZERO, clock.now());
            return;
        }

        let leg = self.exit_leg(position.side, price, size);
        match gateway.submit(&leg.request).await {
            OrderOutcome::Accepted { .. } => {
                self.commit_close(reason, size, price, leg.taker_ratio, clock.now());
            }
            OrderOutcome::Rejected { reason: why } => {
                warn!(exit = reason.label(), reason = %why, "Exit rejected");
                self.stats.record_rejected();
                self.last_event = format!("{} EXIT REJECTED: {why}", reason.label());
            }
            OrderOutcome::Unknown { reason: why } => {
                let action = PendingAction::Close {
                    reason,
                    size,
                    price,
                    taker_ratio: leg.taker_ratio,
                };
                self.park(leg.request, action, &why);
            }
        }
    }

    fn park(&mut self, request: OrderRequest, action: PendingAction, reason: &str) {
        warn!(
            cloid = %request.correlation_id,
            reason = %reason,
            "Order outcome unknown, reconciling before trading further"
        );
        self.stats.record_unknown();
        self.last_event = format!("UNKNOWN ORDER {}: {reason}", request.correlation_id);
        self.pending = Some(PendingOrder { request, action });
    }

    fn commit_entry(&mut self, position: Position) {
        let notional = position.notional(position.size);
        let fee = self.ledger.charge_fee(notional, position.entry_taker_ratio);
        self.stats.record_entry(fee);

        self.last_event = format!(
            "ENTER {} px={} size={}",
            position.side.label(),
            position.entry,
            position.size
        );
        info!(
            side = position.side.label(),
            entry = %position.entry,
            size = %position.size,
            fee = %fee.round_dp(4),
            "Position opened"
        );
        self.position = Some(position);
    }

    fn commit_partial(&mut self, size: Decimal, price: Decimal, taker_ratio: Decimal, now: DateTime<Utc>) {
        let Some(trade) = self.book(ExitReason::Partial, size, price, taker_ratio, now) else {
            return;
        };
        if let Some(position) = self.position.as_mut() {
            position.remaining_size -= size;
            position.partial_done = true;
        }
        self.last_event = format!("PARTIAL TP1 {}@{} (net≈{:.3}%)", size, price, trade.net_pct);
        self.stats.record_close(trade);
    }

    fn commit_close(
        &mut self,
        reason: ExitReason,
        size: Decimal,
        price: Decimal,
        taker_ratio: Decimal,
        now: DateTime<Utc>,
    ) {
        let booked = self.book(reason, size, price, taker_ratio, now);
        self.position = None;

        let cooldown = match reason {
            ExitReason::StopLoss => self.config.stop_cooldown(),
            _ => self.config.profit_cooldown(),
        };
        self.cooldown_until = Some(now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC));

        let label = match reason {
            ExitReason::StopLoss => "STOP LOSS",
            _ => "TAKE PROFIT",
        };
        match booked {
            Some(trade) => {
                self.last_event = format!("{label} {}@{} (net≈{:.3}%)", size, price, trade.net_pct);
                self.stats.record_close(trade);
            }
            None => self.last_event = label.to_string(),
        }
    }

    /// Book a closed leg against the ledger.
    fn book(
        &mut self,
        reason: ExitReason,
        size: Decimal,
        price: Decimal,
        taker_ratio: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let position = self.position.as_ref()?;
        if size <= Decimal::ZERO {
            return None;
        }

        let roe = self.strategy.roe_pct(position, price);
        let realized_pct = roe / self.config.leverage;
        let booked = self
            .ledger
            .book_trade(position.notional(size), realized_pct, taker_ratio);

        info!(
            exit = reason.label(),
            side = position.side.label(),
            size = %size,
            price = %price,
            roe_pct = %roe.round_dp(2),
            pnl = %booked.pnl.round_dp(4),
            equity = %self.ledger.equity().round_dp(2),
            "Booked close"
        );

        Some(ClosedTrade {
            side: position.side,
            reason,
            entry: position.entry,
            exit: price,
            size,
            roe_pct: roe,
            net_pct: booked.net_pct,
            pnl: booked.pnl,
            closed_at: now,
        })
    }

    fn entry_leg(&self, side: Side, mid: Decimal, size: Decimal) -> Leg {
        let order_side = side.entry_order_side();
        match self.config.entry_mode {
            EntryMode::Taker => Leg {
                request: OrderRequest::new(
                    order_side,
                    self.limit_price(order_side, mid, true),
                    size,
                    self.config.entry_tif,
                    false,
                ),
                taker_ratio: Decimal::ONE,
            },
            EntryMode::Maker => Leg {
                request: OrderRequest::new(
                    order_side,
                    self.limit_price(order_side, mid, false),
                    size,
                    TimeInForce::Gtc,
                    false,
                ),
                taker_ratio: Decimal::ZERO,
            },
        }
    }

    fn exit_leg(&self, side: Side, mid: Decimal, size: Decimal) -> Leg {
        let order_side = side.exit_order_side();
        let taker = self.config.exit_taker;
        let tif = if taker { self.config.exit_tif } else { TimeInForce::Gtc };
        Leg {
            request: OrderRequest::new(order_side, self.limit_price(order_side, mid, taker), size, tif, true),
            taker_ratio: if taker { Decimal::ONE } else { Decimal::ZERO },
        }
    }

    /// Crossing limits sit through the mid, resting limits away from it.
    fn limit_price(&self, side: OrderSide, mid: Decimal, taker: bool) -> Decimal {
        let raw = match (side, taker) {
            (OrderSide::Buy, true) => mid * (Decimal::ONE + self.config.entry_slippage_pct),
            (OrderSide::Sell, true) => mid * (Decimal::ONE - self.config.exit_cross_pct),
            (OrderSide::Buy, false) => mid * (Decimal::ONE - self.config.maker_offset_pct),
            (OrderSide::Sell, false) => mid * (Decimal::ONE + self.config.maker_offset_pct),
        };
        self.asset.format_price(raw)
    }

    fn status(&self, now: DateTime<Utc>) -> EngineStatus {
        if self.pending.is_some() {
            return EngineStatus::Reconcile;
        }
        match &self.position {
            Some(p) if p.side == Side::Long => EngineStatus::Long,
            Some(_) => EngineStatus::Short,
            None if self.ledger.is_paused() => EngineStatus::Pause,
            None if self.cooldown_until.is_some_and(|until| now < until) => EngineStatus::Cooldown,
            None => EngineStatus::Flat,
        }
    }

    fn snapshot(&self, at: DateTime<Utc>, price: Option<Decimal>) -> Snapshot {
        let position = self.position.as_ref();
        Snapshot {
            at,
            status: self.status(at),
            price,
            entry: position.map(|p| p.entry),
            roe_pct: position.zip(price).map(|(p, px)| self.strategy.roe_pct(p, px)),
            tp1: position.map(|p| p.tp1),
            tp2: position.map(|p| p.tp2),
            stop_loss: position.map(|p| p.stop_loss),
            size: position.map(|p| p.remaining_size),
            trend: self.regime.trend_label().to_string(),
            volatility: self.regime.volatility(),
            range: self.regime.range(),
            event: self.last_event.clone(),
            equity: self.ledger.equity(),
            drawdown_pct: self.ledger.daily_dd_pct(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    /// Gateway that replays scripted outcomes and accepts once the script runs out.
    #[derive(Default)]
    struct ScriptedGateway {
        submit_script: VecDeque<OrderOutcome>,
        status_script: VecDeque<OrderOutcome>,
        submitted: Vec<OrderRequest>,
        queried: Vec<String>,
    }

    impl ScriptedGateway {
        fn with_submits(outcomes: Vec<OrderOutcome>) -> Self {
            Self {
                submit_script: outcomes.into(),
                ..Default::default()
            }
        }
    }

    fn accepted() -> OrderOutcome {
        OrderOutcome::Accepted { order_id: None }
    }

    #[async_trait]
    impl OrderGateway for ScriptedGateway {
        async fn submit(&mut self, order: &OrderRequest) -> OrderOutcome {
            self.submitted.push(order.clone());
            self.submit_script.pop_front().unwrap_or_else(accepted)
        }

        async fn status(&mut self, correlation_id: &str) -> OrderOutcome {
            self.queried.push(correlation_id.to_string());
            self.status_script.pop_front().unwrap_or_else(accepted)
        }
    }

    fn asset() -> AssetMeta {
        AssetMeta {
            name: "BTC".to_string(),
            index: 0,
            px_decimals: 1,
            sz_decimals: 5,
        }
    }

    fn clock() -> ManualClock {
        ManualClock::at("2024-03-01T12:00:00Z")
    }

    fn engine(config: EngineConfig, clock: &ManualClock) -> PositionEngine {
        PositionEngine::new(config, asset(), clock.now().date_naive()).unwrap()
    }

    /// Warm up with one tick, then enter LONG at 100.05.
    async fn enter_long(engine: &mut PositionEngine, gateway: &mut ScriptedGateway, clock: &ManualClock) {
        let snapshot = engine.on_price(dec!(100), gateway, clock).await;
        assert_eq!(snapshot.status, EngineStatus::Flat);
        assert!(gateway.submitted.is_empty());

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(100.05), gateway, clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
    }

    fn short_config() -> EngineConfig {
        EngineConfig {
            allow_long: false,
            allow_short: true,
            ..Default::default()
        }
    }

    /// Warm up with one tick, then enter SHORT at 99.95.
    ///
    /// Targets: tp1 = 99.85005, tp2 = 99.84205, stop = 99.999975.
    async fn enter_short(engine: &mut PositionEngine, gateway: &mut ScriptedGateway, clock: &ManualClock) {
        engine.on_price(dec!(100), gateway, clock).await;
        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.95), gateway, clock).await;
        assert_eq!(snapshot.status, EngineStatus::Short);
    }

    #[tokio::test]
    async fn test_entry_order_and_position() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        let order = &gateway.submitted[0];
        assert_eq!(order.side, OrderSide::Buy);
        // 100.05 * 1.002 = 100.2501 rounded down to one decimal
        assert_eq!(order.price, dec!(100.2));
        assert_eq!(order.size, dec!(0.01));
        assert_eq!(order.tif, TimeInForce::Gtc);
        assert!(!order.reduce_only);

        let position = engine.position().unwrap();
        assert_eq!(position.entry, dec!(100.05));
        assert!(position.tp2 > position.tp1 && position.tp1 > position.entry);
        assert!(position.stop_loss < position.entry);

        // Entry fee: 100.05 * 0.01 * 5 bps
        assert_eq!(engine.ledger().equity(), dec!(5000) - dec!(0.00050025));
        assert_eq!(engine.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_full_cycle_returns_to_flat_with_cooldown() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        // Through TP1: trailing stop moves up and half the position closes
        clock.advance(chrono::Duration::seconds(1));
        let before = clock.now();
        let snapshot = engine.on_price(dec!(100.152), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
        let position = engine.position().unwrap();
        assert!(position.partial_done);
        assert_eq!(position.remaining_size, dec!(0.005));
        assert!(position.stop_loss >= position.entry);
        assert!(position.trail_steps >= 2);
        assert_eq!(clock.now() - before, chrono::Duration::milliseconds(400));

        let partial = &gateway.submitted[1];
        assert_eq!(partial.side, OrderSide::Sell);
        assert_eq!(partial.size, dec!(0.005));
        assert_eq!(partial.tif, TimeInForce::Ioc);
        assert!(partial.reduce_only);

        // Through TP2: the rest closes
        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(100.2), &mut gateway, &clock).await;
        assert!(engine.position().is_none());
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert_eq!(snapshot.entry, None);
        assert!(engine.cooldown_until().unwrap() > clock.now());
        assert_eq!(gateway.submitted[2].size, dec!(0.005));

        let stats = engine.stats();
        assert_eq!(stats.partials, 1);
        assert_eq!(stats.take_profits, 1);
        assert!(engine.ledger().equity() > dec!(5000));

        // No re-entry while cooling down
        let snapshot = engine.on_price(dec!(100.3), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert_eq!(gateway.submitted.len(), 3);
    }

    #[tokio::test]
    async fn test_stop_loss_arms_full_cooldown() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let config = EngineConfig {
            cooldown_secs: 60,
            ..Default::default()
        };
        let mut engine = engine(config, &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        // Planned stop is the ROE floor, 100.05 * (1 - 0.0005) = 99.999975
        clock.advance(chrono::Duration::seconds(1));
        engine.on_price(dec!(100), &mut gateway, &clock).await;
        assert!(engine.position().is_some());

        clock.advance(chrono::Duration::seconds(1));
        engine.on_price(dec!(99.99), &mut gateway, &clock).await;
        assert!(engine.position().is_none());
        assert_eq!(engine.stats().stop_losses, 1);
        let exit = &gateway.submitted[1];
        assert_eq!(exit.side, OrderSide::Sell);
        assert_eq!(exit.size, dec!(0.01));
        assert!(exit.reduce_only);
        assert_eq!(
            engine.cooldown_until(),
            Some(clock.now() + chrono::Duration::seconds(60))
        );
        assert!(engine.ledger().equity() < dec!(5000));
    }

    #[tokio::test]
    async fn test_drawdown_limit_pauses_entries() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let mut engine = engine(EngineConfig::default(), &clock);
        engine.ledger.book_trade(dec!(5000), dec!(-3), Decimal::ZERO);
        assert_eq!(engine.ledger().daily_dd_pct(), dec!(3));

        engine.on_price(dec!(100), &mut gateway, &clock).await;
        let snapshot = engine.on_price(dec!(100.05), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Pause);
        assert!(snapshot.event.starts_with("PAUSE"));
        assert!(gateway.submitted.is_empty());

        // The next UTC day resets the high-water mark and lifts the pause
        clock.advance(chrono::Duration::days(1));
        let snapshot = engine.on_price(dec!(100.1), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
    }

    #[tokio::test]
    async fn test_rejected_entry_stays_flat() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![OrderOutcome::Rejected {
            reason: "insufficient margin".to_string(),
        }]);
        let mut engine = engine(EngineConfig::default(), &clock);

        engine.on_price(dec!(100), &mut gateway, &clock).await;
        let snapshot = engine.on_price(dec!(100.05), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Flat);
        assert!(engine.position().is_none());
        assert_eq!(engine.stats().rejected_orders, 1);
        assert_eq!(engine.ledger().equity(), dec!(5000));
        assert!(snapshot.event.contains("insufficient margin"));
    }

    #[tokio::test]
    async fn test_unknown_entry_reconciles_to_accepted() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![OrderOutcome::Unknown {
            reason: "timeout".to_string(),
        }]);
        gateway.status_script.push_back(OrderOutcome::Unknown {
            reason: "not found yet".to_string(),
        });
        let mut engine = engine(EngineConfig::default(), &clock);

        engine.on_price(dec!(100), &mut gateway, &clock).await;
        let snapshot = engine.on_price(dec!(100.05), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert!(engine.position().is_none());
        let cloid = engine.pending().unwrap().request.correlation_id.clone();

        // Still unknown: keep waiting, submit nothing new
        let snapshot = engine.on_price(dec!(100.06), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert_eq!(gateway.submitted.len(), 1);

        // Resolved: the parked entry is committed at its decision price
        let snapshot = engine.on_price(dec!(100.07), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
        assert_eq!(engine.position().unwrap().entry, dec!(100.05));
        assert_eq!(gateway.queried, vec![cloid.clone(), cloid]);
        assert_eq!(engine.stats().unknown_orders, 1);
    }

    #[tokio::test]
    async fn test_unknown_entry_reconciles_to_rejected() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![OrderOutcome::Unknown {
            reason: "connection reset".to_string(),
        }]);
        gateway.status_script.push_back(OrderOutcome::Rejected {
            reason: "never reached venue".to_string(),
        });
        let mut engine = engine(EngineConfig::default(), &clock);

        engine.on_price(dec!(100), &mut gateway, &clock).await;
        engine.on_price(dec!(100.05), &mut gateway, &clock).await;
        assert!(engine.pending().is_some());

        engine.on_price(dec!(100.06), &mut gateway, &clock).await;
        assert!(engine.pending().is_none());
        assert_eq!(engine.stats().rejected_orders, 1);
        // Dropped entry leaves the engine free to evaluate again on this tick
        assert_eq!(gateway.submitted.len(), 2);
    }

    #[tokio::test]
    async fn test_maker_entry_and_short_side() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let config = EngineConfig {
            entry_mode: EntryMode::Maker,
            allow_long: false,
            allow_short: true,
            ..Default::default()
        };
        let mut engine = engine(config, &clock);

        engine.on_price(dec!(100), &mut gateway, &clock).await;
        let snapshot = engine.on_price(dec!(99.95), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Short);

        let order = &gateway.submitted[0];
        assert_eq!(order.side, OrderSide::Sell);
        // 99.95 * 1.0002 = 99.96999 rounded down
        assert_eq!(order.price, dec!(99.9));
        assert_eq!(order.tif, TimeInForce::Gtc);

        let position = engine.position().unwrap();
        assert_eq!(position.entry_taker_ratio, Decimal::ZERO);
        assert!(position.tp2 < position.tp1 && position.tp1 < position.entry);
        assert!(position.stop_loss > position.entry);
        // Maker fee is zero
        assert_eq!(engine.ledger().equity(), dec!(5000));
    }

    #[tokio::test]
    async fn test_short_cycle_partial_then_take_profit() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let mut engine = engine(short_config(), &clock);
        enter_short(&mut engine, &mut gateway, &clock).await;

        let position = engine.position().unwrap();
        assert_eq!(position.tp1, dec!(99.85005));
        assert_eq!(position.tp2, dec!(99.84205));
        assert_eq!(position.stop_loss, dec!(99.999975));
        assert_eq!(gateway.submitted[0].side, OrderSide::Sell);

        // Through TP1 only: half is bought back and the stop trails down
        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.848), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Short);
        let position = engine.position().unwrap();
        assert!(position.partial_done);
        assert_eq!(position.remaining_size, dec!(0.005));
        assert!(position.stop_loss < position.entry);

        let partial = &gateway.submitted[1];
        assert_eq!(partial.side, OrderSide::Buy);
        assert_eq!(partial.size, dec!(0.005));
        assert!(partial.reduce_only);

        // Through TP2: the rest is bought back
        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.8), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert!(engine.position().is_none());

        let close = &gateway.submitted[2];
        assert_eq!(close.side, OrderSide::Buy);
        assert_eq!(close.size, dec!(0.005));
        assert!(close.reduce_only);

        let stats = engine.stats();
        assert_eq!(stats.partials, 1);
        assert_eq!(stats.take_profits, 1);
        assert!(engine.ledger().equity() > dec!(5000));
    }

    #[tokio::test]
    async fn test_short_stop_loss() {
        let clock = clock();
        let mut gateway = ScriptedGateway::default();
        let mut engine = engine(short_config(), &clock);
        enter_short(&mut engine, &mut gateway, &clock).await;

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(100.01), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert!(engine.position().is_none());
        assert_eq!(engine.stats().stop_losses, 1);

        let close = &gateway.submitted[1];
        assert_eq!(close.side, OrderSide::Buy);
        assert_eq!(close.size, dec!(0.01));
        assert!(close.reduce_only);
        assert_eq!(
            engine.cooldown_until(),
            Some(clock.now() + chrono::Duration::seconds(5))
        );
        assert!(engine.ledger().equity() < dec!(5000));
    }

    #[tokio::test]
    async fn test_rejected_partial_retries_next_tick() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![
            accepted(),
            OrderOutcome::Rejected {
                reason: "reduce only would increase".to_string(),
            },
        ]);
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(100.152), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
        assert!(snapshot.event.contains("PARTIAL REJECTED"));
        let position = engine.position().unwrap();
        assert!(!position.partial_done);
        assert_eq!(position.remaining_size, dec!(0.01));
        assert_eq!(engine.stats().rejected_orders, 1);
        assert_eq!(engine.stats().partials, 0);

        // Still above TP1 and below TP2: the partial goes out again
        clock.advance(chrono::Duration::seconds(1));
        engine.on_price(dec!(100.153), &mut gateway, &clock).await;
        assert_eq!(gateway.submitted.len(), 3);
        let position = engine.position().unwrap();
        assert!(position.partial_done);
        assert_eq!(position.remaining_size, dec!(0.005));
        assert_eq!(engine.stats().partials, 1);
    }

    #[tokio::test]
    async fn test_rejected_exit_keeps_position_and_retries() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![
            accepted(),
            OrderOutcome::Rejected {
                reason: "price band".to_string(),
            },
        ]);
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.99), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
        assert!(snapshot.event.contains("EXIT REJECTED"));
        assert_eq!(engine.position().unwrap().remaining_size, dec!(0.01));
        assert_eq!(engine.stats().stop_losses, 0);
        assert_eq!(engine.stats().rejected_orders, 1);
        assert_eq!(engine.cooldown_until(), None);

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.98), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert!(engine.position().is_none());
        assert_eq!(engine.stats().stop_losses, 1);
        assert_eq!(gateway.submitted.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_partial_reconciles() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![
            accepted(),
            OrderOutcome::Unknown {
                reason: "timeout".to_string(),
            },
        ]);
        gateway.status_script.push_back(OrderOutcome::Unknown {
            reason: "not found yet".to_string(),
        });
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(100.152), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert!(matches!(
            engine.pending().unwrap().action,
            PendingAction::Partial { .. }
        ));
        assert_eq!(engine.position().unwrap().remaining_size, dec!(0.01));

        // Still unknown: nothing new is submitted
        let snapshot = engine.on_price(dec!(100.153), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert_eq!(gateway.submitted.len(), 2);

        // Accepted: the partial is booked at its decision price
        let snapshot = engine.on_price(dec!(100.153), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Long);
        assert!(engine.pending().is_none());
        let position = engine.position().unwrap();
        assert!(position.partial_done);
        assert_eq!(position.remaining_size, dec!(0.005));
        assert_eq!(engine.stats().partials, 1);
        assert_eq!(engine.stats().unknown_orders, 1);
        assert_eq!(gateway.submitted.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_close_reconciles() {
        let clock = clock();
        let mut gateway = ScriptedGateway::with_submits(vec![
            accepted(),
            OrderOutcome::Unknown {
                reason: "connection reset".to_string(),
            },
        ]);
        gateway.status_script.push_back(OrderOutcome::Unknown {
            reason: "not found yet".to_string(),
        });
        let mut engine = engine(EngineConfig::default(), &clock);
        enter_long(&mut engine, &mut gateway, &clock).await;

        clock.advance(chrono::Duration::seconds(1));
        let snapshot = engine.on_price(dec!(99.99), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert!(matches!(
            engine.pending().unwrap().action,
            PendingAction::Close { reason: ExitReason::StopLoss, .. }
        ));
        assert!(engine.position().is_some());

        let snapshot = engine.on_price(dec!(99.98), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Reconcile);
        assert_eq!(gateway.submitted.len(), 2);

        let snapshot = engine.on_price(dec!(99.97), &mut gateway, &clock).await;
        assert_eq!(snapshot.status, EngineStatus::Cooldown);
        assert!(engine.position().is_none());
        assert_eq!(engine.stats().stop_losses, 1);
        assert_eq!(gateway.submitted.len(), 2);
    }

    #[test]
    fn test_new_rejects_unbounded_cooldown() {
        let config = EngineConfig {
            cooldown_secs: 10_000_000_000_000,
            ..Default::default()
        };
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(PositionEngine::new(config, asset(), today).is_err());
    }
}
