use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "flowgate-cli")]
#[command(about = "Management CLI for the Flowgate reverse proxy", long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current configuration
    Config,
    /// List backends of an upstream
    Backends {
        upstream: String,
    },
    /// Show the proxy's sampler stats
    Stats,
    /// Update a backend's connection limit
    Limit {
        upstream: String,
        backend: String,
        max_conn: i64,
    },
    /// Drain a backend out of rotation
    Disconnect {
        upstream: String,
        backend: String,
    },
    /// Verify the TLS material on disk
    ReloadSsl,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let response = match cli.command {
        Commands::Config => {
            client
                .get(format!("{}/api/v1/config", cli.url))
                .send()
                .await?
        }
        Commands::Backends { upstream } => {
            client
                .get(format!("{}/api/v1/backends?upstream={}", cli.url, upstream))
                .send()
                .await?
        }
        Commands::Stats => {
            client
                .get(format!("{}/api/v1/stats/server", cli.url))
                .send()
                .await?
        }
        Commands::Limit {
            upstream,
            backend,
            max_conn,
        } => {
            client
                .put(format!("{}/api/v1/backends/update", cli.url))
                .json(&json!({
                    "upstream_id": upstream,
                    "backend_id": backend,
                    "max_conn": max_conn,
                }))
                .send()
                .await?
        }
        Commands::Disconnect { upstream, backend } => {
            client
                .post(format!("{}/api/v1/backends/disconnect", cli.url))
                .json(&json!({
                    "upstream_id": upstream,
                    "backend_id": backend,
                }))
                .send()
                .await?
        }
        Commands::ReloadSsl => {
            client
                .post(format!("{}/api/v1/config/reload-ssl", cli.url))
                .send()
                .await?
        }
    };

    let status = response.status();
    let body: Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
