use std::collections::BTreeMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

use platform_gateway::security::webhook::hmac_sha256;
use platform_gateway::security::CredentialCipher;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the platform gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key.
    #[arg(short, long, default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List platforms, limits and credential presence
    Platforms,
    /// Show the credential schema of a platform
    Schema { platform: String },
    /// Show security metrics and recent events of a platform
    Metrics { platform: String },
    /// Authenticate against a platform with the stored credentials
    Test { platform: String },
    /// Show stored credentials with secrets masked
    Credentials { platform: String },
    /// Store or rotate credentials, given as name=value pairs
    SetCredentials {
        platform: String,
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Delete stored credentials
    DeleteCredentials { platform: String },
    /// Show circuit breaker state
    Circuits,
    /// Show credential rotation status
    Rotation,
    /// Generate the security report
    Report,
    /// Show connector factory statistics
    Stats,
    /// Generate a new base64 credential encryption key (offline)
    GenKey,
    /// Sign a payload file like a platform webhook would (offline)
    SignWebhook {
        #[arg(short, long)]
        secret: String,
        file: PathBuf,
    },
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
    let base = cli.url.trim_end_matches('/').to_string();

    let path = match cli.command {
        Commands::GenKey => {
            println!("{}", CredentialCipher::generate_key());
            return Ok(());
        }
        Commands::SignWebhook { secret, file } => {
            let payload = std::fs::read(file)?;
            let digest = hmac_sha256(secret.as_bytes(), &[payload.as_slice()])?;
            println!("hex:    {}", hex::encode(&digest));
            println!("base64: {}", STANDARD.encode(&digest));
            return Ok(());
        }
        Commands::Status => "/admin/status".to_string(),
        Commands::Platforms => "/admin/platforms".to_string(),
        Commands::Schema { platform } => format!("/admin/platforms/{platform}/schema"),
        Commands::Metrics { platform } => format!("/admin/platforms/{platform}/metrics"),
        Commands::Test { platform } => format!("/admin/platforms/{platform}/test"),
        Commands::Credentials { platform } => format!("/admin/platforms/{platform}/credentials"),
        Commands::SetCredentials { platform, fields } => {
            let fields: BTreeMap<String, String> = fields.into_iter().collect();
            let res = client
                .put(format!("{base}/admin/platforms/{platform}/credentials"))
                .headers(headers)
                .json(&json!({ "fields": fields }))
                .send()
                .await?;
            return print_response(res).await;
        }
        Commands::DeleteCredentials { platform } => {
            let res = client
                .delete(format!("{base}/admin/platforms/{platform}/credentials"))
                .headers(headers)
                .send()
                .await?;
            return print_response(res).await;
        }
        Commands::Circuits => "/admin/circuits".to_string(),
        Commands::Rotation => "/admin/credentials/rotation".to_string(),
        Commands::Report => "/admin/security/report".to_string(),
        Commands::Stats => "/admin/statistics".to_string(),
    };
    let is_post = path.ends_with("/test");

    let url = format!("{base}{path}");
    let request = if is_post { client.post(url) } else { client.get(url) };
    let res = request.headers(headers).send().await?;
    print_response(res).await
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got {raw:?}"))
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
