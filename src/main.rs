use coinflip_client::config::{
    ClientConfig,
    DEFAULT_CONNECT_URL,
    DEFAULT_LOG_DIR,
    DEFAULT_REVEAL_DELAY_MS,
    FlipMode,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::sync::OnceLock;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod app;
mod ui;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: coinflip [--config <path>] [--contract <address>] [--origin <url>]\n\
         [--reveal-delay-ms <ms>] [--log-dir <path>] [--fake-flip win|lose]\n\
         \n\
         Flags:\n\
           --config <path>          JSON config file (~ is expanded)\n\
           --contract <address>     Coin-flip contract address\n\
           --origin <url>           Wallet frame origin (default {})\n\
           --reveal-delay-ms <ms>   Wait before the automatic reveal (default {})\n\
           --log-dir <path>         Directory for rolling log files (default {})\n\
           --fake-flip win|lose     Force every simulated flip to the given result",
        DEFAULT_CONNECT_URL, DEFAULT_REVEAL_DELAY_MS, DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<ClientConfig> {
    let mut args = std::env::args().skip(1);
    let mut config_path: Option<String> = None;
    let mut contract: Option<String> = None;
    let mut origin: Option<String> = None;
    let mut reveal_delay_ms: Option<u64> = None;
    let mut log_dir: Option<String> = None;
    let mut fake_flip: Option<FlipMode> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--config requires a path argument"))?;
                if config_path.is_some() {
                    return Err(eyre!("--config may only be specified once"));
                }
                config_path = Some(path);
            }
            "--contract" => {
                let address = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                contract = Some(address);
            }
            "--origin" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--origin requires a URL argument"))?;
                origin = Some(url);
            }
            "--reveal-delay-ms" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--reveal-delay-ms requires a number"))?;
                let ms = raw
                    .parse::<u64>()
                    .wrap_err_with(|| format!("invalid --reveal-delay-ms value {raw}"))?;
                reveal_delay_ms = Some(ms);
            }
            "--log-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--log-dir requires a path argument"))?;
                log_dir = Some(dir);
            }
            "--fake-flip" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--fake-flip requires win or lose"))?;
                fake_flip = Some(match raw.as_str() {
                    "win" => FlipMode::Fixed(true),
                    "lose" => FlipMode::Fixed(false),
                    other => return Err(eyre!("--fake-flip expects win or lose, got {other}")),
                });
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let mut config = match config_path {
        Some(path) => ClientConfig::load(&path)?,
        None => ClientConfig::default(),
    };
    if let Some(contract) = contract {
        config.contract_address = contract;
    }
    if let Some(origin) = origin {
        config.connect_url = origin;
    }
    if let Some(ms) = reveal_delay_ms {
        config.reveal_delay_ms = ms;
    }
    if let Some(dir) = log_dir {
        config.log_dir = dir;
    }
    if let Some(flip) = fake_flip {
        config.sim.flip = flip;
    }
    config.validate()?;
    Ok(config)
}

/// Logs go to a daily rolling file; the terminal belongs to the TUI.
fn init_tracing(config: &ClientConfig) -> Result<()> {
    let dir = config.log_dir();
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, "coinflip.log"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;
    let _ = LOG_GUARD.set(guard);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = parse_cli_args()?;
    init_tracing(&config)?;
    tracing::info!(frame = %config.connect_frame_url(), "starting coinflip client");
    app::run_app(config).await
}
