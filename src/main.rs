use alor::config::fetch_config;
use alor::credentials::populate_env_from_keychain;
use alor::models::{Interval, SubscribeOptions};
use alor::{AlorClient, AlorError};
use tracing::info;

/// Usage: `alor [SYMBOL] [TIMEFRAME]`, e.g. `alor SBER 60`.
fn main() -> Result<(), AlorError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    // Must run before the runtime starts its worker threads.
    populate_env_from_keychain();

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| AlorError::Config(format!("failed to start runtime: {e}")))?;
    runtime.block_on(run())
}

async fn run() -> Result<(), AlorError> {
    let mut args = std::env::args().skip(1);
    let symbol = args.next().unwrap_or_else(|| "SBER".to_string());
    let tf: Interval = match args.next() {
        Some(code) => code
            .parse()
            .map_err(|e| AlorError::Config(format!("{e}")))?,
        None => Interval::M1,
    };

    let config = fetch_config()?;
    info!(?config, "Loaded configuration");
    let client = AlorClient::new(config)?;

    let server_time = client.rest().get_time().await?;
    info!(?server_time, "Connected to ALOR");

    client.events().on_candle_closed(|candle| {
        info!(
            symbol = %candle.symbol,
            time = candle.time,
            open = %candle.open,
            high = %candle.high,
            low = %candle.low,
            close = %candle.close,
            volume = candle.volume,
            "Candle closed"
        );
    });
    client.events().on_quote(|quote| {
        info!(
            symbol = %quote.symbol,
            last = ?quote.last_price,
            bid = ?quote.bid,
            ask = ?quote.ask,
            "Quote"
        );
    });

    let candles = client
        .subscribe_candles(&symbol, tf, SubscribeOptions::default())
        .await?;
    let quotes = client
        .subscribe_quotes(&symbol, SubscribeOptions::default())
        .await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            }
        }
        reason = candles.closed() => info!(?reason, "Candle subscription ended"),
        reason = quotes.closed() => info!(?reason, "Quote subscription ended"),
    }

    client.shutdown();
    candles.closed().await;
    quotes.closed().await;

    Ok(())
}
