//! palaver-traders: fetch TornExchange active traders and write snapshot files.

use clap::Parser;
use palaver_traders::{
    build_client, refresh_snapshot, summary_lines, SavedFiles, DEFAULT_TIMEOUT_SECS, DEFAULT_URL,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "palaver-traders",
    version,
    about = "TornExchange active traders fetcher"
)]
struct Cli {
    /// Active-traders endpoint
    #[arg(long, env = "TRADERS_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Directory for trader_ids.json and trader_ids.txt
    #[arg(long, default_value = ".")]
    out_dir: String,

    /// How many recent traders to list
    #[arg(long, default_value_t = 10)]
    top: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!("TornExchange Active Traders Fetcher");
    println!("===================================");

    let client = build_client(cli.timeout_secs)?;
    let files = SavedFiles::in_dir(&cli.out_dir);

    let refresh = refresh_snapshot(&client, &cli.url, &files).await;

    if refresh.snapshot.is_empty() {
        println!("No trader data was fetched.");
        return Ok(());
    }

    let traders = refresh.snapshot.traders();
    match &refresh.save_error {
        Some(e) => {
            tracing::error!(error = %e, "Failed to save trader snapshot");
            eprintln!("Error saving data: {}", e);
        }
        None => {
            println!("Saved {} trader IDs to {}", traders.len(), files.json.display());
            println!("Also saved IDs only to {}", files.txt.display());
        }
    }

    for line in summary_lines(traders, cli.top) {
        println!("{}", line);
    }

    Ok(())
}
