use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use shopping_scraper::api::{self, AppState};
use shopping_scraper::browser::{ChromeLauncher, SessionManager};
use shopping_scraper::config::{ScrapeConfig, Settings};
use shopping_scraper::output;
use shopping_scraper::scraper::ShoppingScraper;
use shopping_scraper::scrapers::google_shopping;

#[derive(Parser, Debug)]
#[command(name = "shopping-scraper")]
#[command(about = "Scrapes product listings from shopping search results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one or more queries and write a JSON file per query
    Scrape {
        /// Search queries, run one after another
        #[arg(required = true)]
        queries: Vec<String>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,

        /// Shorten every wait
        #[arg(long)]
        fast: bool,

        /// Reuse one browser across all queries
        #[arg(long)]
        keep_browser: bool,

        /// Stop after this many products per query
        #[arg(long)]
        max_results: Option<usize>,

        /// Save the final page HTML for each query
        #[arg(long)]
        debug: bool,

        /// Directory the result files are written to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Run the HTTP API
    Serve {
        #[arg(long, env = "SCRAPER_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "SCRAPER_PORT", default_value = "8000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let launcher = Arc::new(ChromeLauncher::new(&settings));
    let sessions = Arc::new(SessionManager::new(launcher));
    let scraper = Arc::new(ShoppingScraper::new(
        sessions,
        google_shopping::profile(),
        &settings,
    )?);

    match cli.command {
        Command::Scrape {
            queries,
            headless,
            fast,
            keep_browser,
            max_results,
            debug,
            output_dir,
        } => {
            let outcome = async {
                for query in queries {
                    let config = ScrapeConfig::new(query)
                        .headless(headless)
                        .fast(fast)
                        .keep_session(keep_browser)
                        .max_results(max_results)
                        .debug(debug);
                    run_query(&scraper, &config, &output_dir).await?;
                }
                Ok::<_, anyhow::Error>(())
            }
            .await;

            scraper.sessions().shutdown().await;
            outcome
        }
        Command::Serve { host, port } => {
            let listener = tokio::net::TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("binding {host}:{port}"))?;
            info!("Starting shopping scraper API");

            api::serve(listener, AppState::new(scraper), shutdown_signal()).await
        }
    }
}

async fn run_query(
    scraper: &ShoppingScraper,
    config: &ScrapeConfig,
    output_dir: &std::path::Path,
) -> Result<()> {
    let result = scraper
        .scrape(config)
        .await
        .with_context(|| format!("scraping '{}'", config.query))?;
    let path = output::write_result(&result, output_dir).await?;

    println!(
        "{}: {} products in {:.2}s -> {}",
        result.query,
        result.count,
        result.elapsed_seconds,
        path.display()
    );
    for warning in &result.warnings {
        println!("  warning: {}", serde_json::to_string(warning)?);
    }
    for (i, product) in result.results.iter().take(3).enumerate() {
        println!(
            "  {}. {} | {} | {}",
            i + 1,
            product.title,
            product.price.as_deref().unwrap_or("-"),
            product.seller.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
