//! Perpetual-futures trend bot
//!
//! Trades one symbol with volatility-adaptive take-profit/stop-loss targets,
//! a ratcheting trailing stop, a one-shot partial exit and a daily drawdown
//! pause driven by an equity ledger.

mod api;
mod bot;
mod clock;
mod metrics;
mod models;
mod telemetry;
mod trading;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{AssetMeta, InfoClient, PaperGateway, TimeInForce};
use crate::bot::{Bot, BotConfig};
use crate::clock::SystemClock;
use crate::models::Side;
use crate::telemetry::LogSink;
use crate::trading::{
    DrawdownBasis, EngineConfig, EntryMode, HighWaterPolicy, PositionEngine, RiskSizer, TargetPlanner,
};

/// Perpetual-futures trend bot CLI.
#[derive(Parser)]
#[command(name = "perp-trend-bot")]
#[command(about = "Single-symbol leveraged futures bot with adaptive targets and a drawdown pause", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence when set
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop against the live price feed (orders are simulated)
    Run {
        /// Info API base URL
        #[arg(long, env = "BASE_URL", default_value = "https://api.hyperliquid.xyz")]
        info_url: String,

        /// Polling interval in milliseconds
        #[arg(long, env = "POLL_INTERVAL_MS", default_value = "2000")]
        poll_ms: u64,

        /// Maximum delay after a failed iteration, in milliseconds
        #[arg(long, env = "MAX_BACKOFF_MS", default_value = "10000")]
        max_backoff_ms: u64,

        /// Random extra delay after a failed iteration, in milliseconds
        #[arg(long, env = "BACKOFF_JITTER_MS", default_value = "3000")]
        jitter_ms: u64,

        /// Share of paper orders whose acknowledgement is dropped (0 to 1)
        #[arg(long, env = "PAPER_ACK_LOSS", default_value = "0")]
        paper_ack_loss: f64,
    },

    /// Print the targets and size the engine would use for an entry
    Plan {
        /// Entry price
        #[arg(short, long)]
        price: Decimal,

        /// Volatility estimate (smoothed absolute price change)
        #[arg(short, long, default_value = "0")]
        volatility: Decimal,

        /// Position side (long or short)
        #[arg(short, long, default_value = "long")]
        side: Side,
    },

    /// Show the effective configuration as JSON
    Config,
}

/// Engine overrides. Anything left unset keeps its default.
#[derive(Args, Debug, Default)]
struct EngineArgs {
    #[arg(long, env = "SYMBOL", global = true)]
    symbol: Option<String>,
    #[arg(long, env = "LEVERAGE", global = true)]
    leverage: Option<Decimal>,

    #[arg(long, env = "TP_ROE_PCT", global = true)]
    tp_roe_pct: Option<Decimal>,
    #[arg(long, env = "SL_ROE_PCT", global = true)]
    sl_roe_pct: Option<Decimal>,
    #[arg(long, env = "TP_VOL_MULT", global = true)]
    tp_vol_mult: Option<Decimal>,
    #[arg(long, env = "SL_VOL_MULT", global = true)]
    sl_vol_mult: Option<Decimal>,
    #[arg(long, env = "TP2_EXTRA_MULT", global = true)]
    tp2_extra_mult: Option<Decimal>,
    #[arg(long, env = "RR_MIN", global = true)]
    rr_min: Option<Decimal>,

    #[arg(long, env = "EMA_FAST", global = true)]
    ema_fast: Option<u32>,
    #[arg(long, env = "EMA_SLOW", global = true)]
    ema_slow: Option<u32>,
    #[arg(long, env = "VOL_WINDOW", global = true)]
    vol_window: Option<usize>,

    #[arg(long, env = "TRAIL_START_ROE", global = true)]
    trail_start_roe: Option<Decimal>,
    #[arg(long, env = "TRAIL_STEP_PCT", global = true)]
    trail_step_pct: Option<Decimal>,
    #[arg(long, env = "TRAIL_BUFFER_VOL_MULT", global = true)]
    trail_buffer_vol_mult: Option<Decimal>,
    #[arg(long, env = "PARTIAL_TP_RATIO", global = true)]
    partial_ratio: Option<Decimal>,
    #[arg(long, env = "PARTIAL_SETTLE_MS", global = true)]
    partial_settle_ms: Option<u64>,

    #[arg(long, env = "RISK_PER_TRADE_PCT", global = true)]
    risk_per_trade_pct: Option<Decimal>,
    /// Size cap in base units
    #[arg(long, env = "SIZE", global = true)]
    max_size: Option<Decimal>,
    #[arg(long, env = "MIN_SIZE", global = true)]
    min_size: Option<Decimal>,

    #[arg(long, env = "START_EQUITY_USDT", global = true)]
    start_equity: Option<Decimal>,
    #[arg(long, env = "MAKER_BPS", global = true)]
    maker_bps: Option<Decimal>,
    #[arg(long, env = "TAKER_BPS", global = true)]
    taker_bps: Option<Decimal>,
    #[arg(long, env = "DAILY_DD_LIMIT_PCT", global = true)]
    daily_dd_limit_pct: Option<Decimal>,
    /// high_water or day_loss
    #[arg(long, env = "DRAWDOWN_BASIS", global = true)]
    drawdown_basis: Option<DrawdownBasis>,
    /// reset or keep
    #[arg(long, env = "HIGH_WATER_ON_DAY_ROLL", global = true)]
    high_water_on_day_roll: Option<HighWaterPolicy>,

    #[arg(long, env = "COOLDOWN_SEC", global = true)]
    cooldown_secs: Option<u64>,
    #[arg(long, env = "PROFIT_COOLDOWN_FRACTION", global = true)]
    profit_cooldown_fraction: Option<Decimal>,
    #[arg(long, env = "MIN_COOLDOWN_SEC", global = true)]
    min_cooldown_secs: Option<u64>,

    #[arg(long, env = "ALLOW_LONG", global = true)]
    allow_long: Option<bool>,
    #[arg(long, env = "ALLOW_SHORT", global = true)]
    allow_short: Option<bool>,
    #[arg(long, env = "SKIP_TREND", global = true)]
    skip_trend: Option<bool>,
    #[arg(long, env = "USE_PULLBACK", global = true)]
    use_pullback: Option<bool>,

    /// taker or maker
    #[arg(long, env = "ENTRY_MODE", global = true)]
    entry_mode: Option<EntryMode>,
    #[arg(long, env = "ENTRY_SLIPPAGE_PCT", global = true)]
    entry_slippage_pct: Option<Decimal>,
    #[arg(long, env = "EXIT_CROSS_PCT", global = true)]
    exit_cross_pct: Option<Decimal>,
    #[arg(long, env = "MAKER_OFFSET_PCT", global = true)]
    maker_offset_pct: Option<Decimal>,
    #[arg(long, env = "EXIT_FALLBACK_TAKER", global = true)]
    exit_taker: Option<bool>,
    #[arg(long, env = "TIF", global = true)]
    entry_tif: Option<TimeInForce>,
    #[arg(long, env = "EXIT_TIF", global = true)]
    exit_tif: Option<TimeInForce>,
}

impl EngineArgs {
    /// Overlay the set arguments onto the default configuration and validate the result.
    fn into_config(self) -> Result<EngineConfig> {
        let mut config = EngineConfig::default();

        macro_rules! overlay {
            ($($arg:ident => $field:ident),* $(,)?) => {
                $(if let Some(value) = self.$arg {
                    config.$field = value;
                })*
            };
        }

        overlay!(
            leverage => leverage,
            tp_roe_pct => tp_floor_roe_pct,
            sl_roe_pct => sl_floor_roe_pct,
            tp_vol_mult => tp_vol_mult,
            sl_vol_mult => sl_vol_mult,
            tp2_extra_mult => tp2_extra_mult,
            rr_min => rr_min,
            ema_fast => ema_fast,
            ema_slow => ema_slow,
            vol_window => vol_window,
            trail_start_roe => trail_start_roe,
            trail_step_pct => trail_step_pct,
            trail_buffer_vol_mult => trail_buffer_vol_mult,
            partial_ratio => partial_ratio,
            partial_settle_ms => partial_settle_ms,
            risk_per_trade_pct => risk_per_trade_pct,
            max_size => max_size,
            min_size => min_size,
            start_equity => start_equity,
            maker_bps => maker_bps,
            taker_bps => taker_bps,
            daily_dd_limit_pct => daily_dd_limit_pct,
            drawdown_basis => drawdown_basis,
            high_water_on_day_roll => high_water_on_day_roll,
            cooldown_secs => cooldown_secs,
            profit_cooldown_fraction => profit_cooldown_fraction,
            min_cooldown_secs => min_cooldown_secs,
            allow_long => allow_long,
            allow_short => allow_short,
            skip_trend => skip_trend,
            use_pullback => use_pullback,
            entry_mode => entry_mode,
            entry_slippage_pct => entry_slippage_pct,
            exit_cross_pct => exit_cross_pct,
            maker_offset_pct => maker_offset_pct,
            exit_taker => exit_taker,
            entry_tif => entry_tif,
            exit_tif => exit_tif,
        );

        if let Some(symbol) = self.symbol {
            config.symbol = symbol.trim().to_uppercase().replace("-PERP", "");
        }

        config.validate().context("Invalid engine configuration")?;
        Ok(config)
    }
}

fn init_logging(level: &str) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
        return Ok(());
    }

    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = cli.engine.into_config()?;

    match cli.command {
        Commands::Run {
            info_url,
            poll_ms,
            max_backoff_ms,
            jitter_ms,
            paper_ack_loss,
        } => {
            anyhow::ensure!(
                (0.0..=1.0).contains(&paper_ack_loss),
                "paper_ack_loss must be between 0 and 1, got {}",
                paper_ack_loss
            );

            let mut feed = InfoClient::with_base_url(info_url.clone())?;
            let asset = feed
                .resolve_asset(&config.symbol)
                .await
                .with_context(|| format!("Failed to resolve {} on {}", config.symbol, info_url))?;

            info!(
                symbol = %asset.name,
                leverage = %config.leverage,
                entry_mode = ?config.entry_mode,
                allow_short = config.allow_short,
                start_equity = %config.start_equity,
                "Engine configured"
            );
            warn!("No signing gateway configured: orders go to the paper gateway and never reach the venue");

            let bot_config = BotConfig {
                poll_interval: Duration::from_millis(poll_ms),
                max_backoff: Duration::from_millis(max_backoff_ms.max(poll_ms)),
                backoff_jitter: Duration::from_millis(jitter_ms),
            };
            let engine = PositionEngine::new(config, asset, Utc::now().date_naive())?;
            let gateway = PaperGateway::new().with_ack_loss(paper_ack_loss);
            let mut bot = Bot::new(bot_config, engine, feed, gateway, SystemClock, LogSink);
            bot.run().await?;
        }

        Commands::Plan {
            price,
            volatility,
            side,
        } => {
            anyhow::ensure!(price > Decimal::ZERO, "price must be positive, got {}", price);

            let planner = TargetPlanner::new(&config);
            let sizer = RiskSizer::new(&config);
            let plan = planner.plan_position(price, side, volatility);
            let size = sizer.size(config.start_equity, price, plan.stop_loss, config.max_size);
            let rr = planner.plan(price, side, volatility).reward_risk(price);
            let risk = (price - plan.stop_loss).abs() * size;
            let asset = AssetMeta {
                name: config.symbol.clone(),
                index: 0,
                px_decimals: 6,
                sz_decimals: 8,
            };

            println!("\n=== {} {} @ {} ===\n", side.label(), config.symbol, price);
            println!("  Volatility:   {}", volatility);
            println!("  TP1:          {}", asset.format_price(plan.tp1));
            println!("  TP2:          {}", asset.format_price(plan.tp2));
            println!("  Stop:         {}", asset.format_price(plan.stop_loss));
            println!("  Reward:Risk:  {:.2}", rr);
            println!("  Size:         {}", asset.format_size(size));
            println!("  Risk:         ${:.2} of ${}", risk, config.start_equity);
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_overrides_apply_on_defaults() {
        let args = EngineArgs {
            symbol: Some("eth-perp".to_string()),
            leverage: Some(dec!(10)),
            allow_short: Some(true),
            entry_mode: Some(EntryMode::Maker),
            ..Default::default()
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.symbol, "ETH");
        assert_eq!(config.leverage, dec!(10));
        assert!(config.allow_short);
        assert_eq!(config.entry_mode, EntryMode::Maker);
        assert_eq!(config.rr_min, EngineConfig::default().rr_min);
    }

    #[test]
    fn test_invalid_override_is_fatal() {
        let args = EngineArgs {
            partial_ratio: Some(dec!(1.5)),
            ..Default::default()
        };
        let err = args.into_config().unwrap_err();
        assert!(format!("{err:#}").contains("partial_ratio"));
    }

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::try_parse_from([
            "perp-trend-bot", "--leverage", "25", "plan", "--price", "64000", "--side", "short",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Plan { side: Side::Short, .. }));
        assert_eq!(cli.engine.leverage, Some(dec!(25)));
    }

    #[test]
    fn test_cli_parses_run_options() {
        let cli = Cli::try_parse_from([
            "perp-trend-bot", "run", "--poll-ms", "500", "--paper-ack-loss", "0.25",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { poll_ms, paper_ack_loss, .. } => {
                assert_eq!(poll_ms, 500);
                assert_eq!(paper_ack_loss, 0.25);
            }
            _ => panic!("expected run"),
        }
    }
}
