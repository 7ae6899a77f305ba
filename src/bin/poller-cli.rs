use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "poller-cli")]
#[command(about = "Management CLI for the service poller", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8090")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered services and their last status
    List,
    /// Register a new service
    Add { name: String, url: String },
    /// Change a service's name and URL
    Update { id: i64, name: String, url: String },
    /// Remove a service
    Remove { id: i64 },
    /// Show circuit breaker state per service
    Breakers,
    /// Show poller status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::List => client.get(format!("{base}/services")).send().await?,
        Commands::Add { name, url } => {
            client
                .post(format!("{base}/services"))
                .json(&json!({ "name": name, "url": url }))
                .send()
                .await?
        }
        Commands::Update { id, name, url } => {
            client
                .put(format!("{base}/services"))
                .json(&json!({ "id": id, "name": name, "url": url }))
                .send()
                .await?
        }
        Commands::Remove { id } => client.delete(format!("{base}/services/{id}")).send().await?,
        Commands::Breakers => client.get(format!("{base}/breakers")).send().await?,
        Commands::Status => client.get(format!("{base}/status")).send().await?,
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: poller API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
