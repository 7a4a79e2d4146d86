mod cli;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::CliArgs;
use mpd_remote::Settings;

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let result = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .try_init();
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);

    let settings = Settings::load();
    debug!("Loaded settings: {:?}", settings);

    cli::run(args, settings).await
}
