use clap::{Args, Parser, Subcommand};
use reqwest::{Client, Response};
use serde_json::{json, Map, Value};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "logdash-cli")]
#[command(about = "Log dashboard CLI", long_about = None)]
struct Cli {
    #[arg(short, long, env = "LOGDASH_ENDPOINT", default_value = "http://localhost:5000")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dashboard statistics
    Stats,

    /// Search logs
    Search {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short = 'n', long, default_value = "50")]
        per_page: u32,

        /// timestamp, level, endpoint, status_code, response_time, server or relevance
        #[arg(long)]
        sort_field: Option<String>,

        /// asc or desc
        #[arg(long)]
        sort_order: Option<String>,
    },

    /// Record counts per level
    Levels,

    /// Distinct endpoints
    Endpoints,

    /// Export matching logs as CSV
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check server and dependency health
    Health,
}

#[derive(Args)]
struct FilterArgs {
    /// Free-text query
    #[arg(short, long)]
    query: Option<String>,

    /// DEBUG, INFO, WARNING, ERROR, CRITICAL or ALL
    #[arg(short, long)]
    level: Option<String>,

    /// Lower time bound (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Upper time bound (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    /// Exact code or 2xx/4xx/5xx
    #[arg(short, long)]
    status: Option<String>,

    #[arg(long)]
    server: Option<String>,
}

impl FilterArgs {
    fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        let fields = [
            ("q", &self.query),
            ("level", &self.level),
            ("date_from", &self.from),
            ("date_to", &self.to),
            ("endpoint", &self.endpoint),
            ("status_code", &self.status),
            ("server", &self.server),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                body.insert(name.to_string(), json!(value));
            }
        }
        body
    }
}

async fn print_json(response: Response) -> Result<(), Box<dyn Error>> {
    let body: Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let client = Client::new();

    match cli.command {
        Commands::Stats => {
            let response = client
                .get(format!("{}/api/stats", cli.endpoint))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Search {
            filters,
            page,
            per_page,
            sort_field,
            sort_order,
        } => {
            let mut body = filters.to_body();
            body.insert("page".to_string(), json!(page));
            body.insert("per_page".to_string(), json!(per_page));
            if let Some(sort_field) = sort_field {
                body.insert("sort_field".to_string(), json!(sort_field));
            }
            if let Some(sort_order) = sort_order {
                body.insert("sort_order".to_string(), json!(sort_order));
            }

            let response = client
                .post(format!("{}/api/search", cli.endpoint))
                .json(&body)
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Levels => {
            let response = client
                .get(format!("{}/api/logs/stats/by-level", cli.endpoint))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Endpoints => {
            let response = client
                .get(format!("{}/api/search/endpoints", cli.endpoint))
                .send()
                .await?;
            print_json(response).await?;
        }

        Commands::Export { filters, output } => {
            let response = client
                .post(format!("{}/api/logs/export", cli.endpoint))
                .json(&filters.to_body())
                .send()
                .await?;

            if !response.status().is_success() {
                eprintln!("Export failed with status {}", response.status());
                print_json(response).await?;
                std::process::exit(1);
            }

            let csv = response.bytes().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &csv)?;
                    eprintln!("Wrote {} bytes to {}", csv.len(), path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&csv)),
            }
        }

        Commands::Health => {
            let response = client
                .get(format!("{}/api/health", cli.endpoint))
                .send()
                .await?;
            print_json(response).await?;
        }
    }

    Ok(())
}
