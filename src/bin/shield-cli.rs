use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Management CLI for the Safety Shield", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "SHIELD_URL")]
    url: String,

    #[arg(short, long, env = "SHIELD_ADMIN_KEY")]
    key: String,

    /// Name recorded in the audit log for changes made by this call.
    #[arg(short, long, default_value = "shield-cli")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Circuit state, quota and scheduler counters
    Status,
    /// Last observed upstream quota
    Quota,
    /// Recent audit entries, most recent first
    Audit {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show or change live shield settings
    Settings {
        #[arg(long)]
        low_water: Option<f64>,
        #[arg(long)]
        hard_ttl: Option<u64>,
        #[arg(long)]
        soft_ttl: Option<u64>,
    },
    /// Force-clear the hard and soft locks
    ClearLocks,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    headers.insert("x-shield-actor", HeaderValue::from_str(&cli.actor)?);

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Quota => client.get(format!("{}/admin/quota", base)),
        Commands::Audit { limit } => {
            let request = client.get(format!("{}/admin/audit", base));
            match limit {
                Some(limit) => request.query(&[("limit", limit)]),
                None => request,
            }
        }
        Commands::Settings {
            low_water,
            hard_ttl,
            soft_ttl,
        } => {
            let mut update = Map::new();
            if let Some(v) = low_water {
                update.insert("lowWaterFraction".into(), json!(v));
            }
            if let Some(v) = hard_ttl {
                update.insert("hardLockTtlSecs".into(), json!(v));
            }
            if let Some(v) = soft_ttl {
                update.insert("softLockTtlSecs".into(), json!(v));
            }
            if update.is_empty() {
                client.get(format!("{}/admin/settings", base))
            } else {
                client
                    .put(format!("{}/admin/settings", base))
                    .json(&Value::Object(update))
            }
        }
        Commands::ClearLocks => client.post(format!("{}/admin/locks/clear", base)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
