use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;

use wallet_bridge::scoring::ScoreClient;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Diagnostics CLI for the wallet bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "BRIDGE_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bridge status (provider, guard, broker)
    Status,
    /// Current connection state
    State,
    /// Error statistics and recent records
    Errors,
    /// Look up a score from the scoring service
    Score {
        id: String,

        #[arg(long, default_value = "http://localhost:3000")]
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match cli.command {
        Commands::Status => "status",
        Commands::State => "state",
        Commands::Errors => "errors",
        Commands::Score { id, service } => {
            let client = ScoreClient::new(service, Duration::from_secs(5))?;
            match client.fetch(&id).await {
                Ok(score) => println!("{}", serde_json::to_string_pretty(&score)?),
                Err(e) => eprintln!("Error: {}", e),
            }
            return Ok(());
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = reqwest::Client::new()
        .get(format!("{}/admin/{}", cli.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
