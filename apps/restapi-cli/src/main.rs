use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::Method;
use restapi_http::parse_response;
use restapi_sdk::{
    ClientConfig, PayClient, Region, RequestOptions, Router, ServiceClient, ServiceKind,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// RestAPI command-line tool
#[derive(Parser)]
#[command(name = "restapi-cli")]
#[command(version, about = "Decode raw HTTP responses and call the RestAPI backends")]
struct Cli {
    /// Path to a YAML client configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a raw response dump and print status, headers and body
    Decode {
        /// File holding the raw response bytes
        file: PathBuf,
    },
    /// Print the route table of a service in a region
    Routes {
        /// sso, service or pay
        #[arg(long, default_value = "service")]
        kind: String,
        /// Region name or code; defaults to `RESTAPI_REGION`
        #[arg(long)]
        region: Option<String>,
    },
    /// Send a signed request and print the JSON answer
    Request {
        /// HTTP method (GET, POST, PUT, DELETE)
        method: String,
        /// Path starting with `/`
        path: String,
        /// JSON payload
        #[arg(long)]
        data: Option<String>,
        /// Use the payment client
        #[arg(long)]
        pay: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = cli.config.as_deref()
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    match cli.command {
        Commands::Decode { file } => decode(&file),
        Commands::Routes { kind, region } => routes(&kind, region.as_deref()),
        Commands::Request {
            method,
            path,
            data,
            pay,
        } => request(cli.config.as_deref(), &method, &path, data.as_deref(), pay).await,
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn decode(file: &Path) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed = parse_response(&raw)
        .with_context(|| format!("malformed response in {}", file.display()))?;
    tracing::info!(status = parsed.status, bytes = raw.len(), "decoded response");

    println!("HTTP/{} {}", parsed.version, parsed.status);
    for (name, value) in &parsed.headers {
        println!("{name}: {value}");
    }
    println!();
    println!("{}", String::from_utf8_lossy(&parsed.body));
    Ok(())
}

fn routes(kind: &str, region: Option<&str>) -> Result<()> {
    let kind: ServiceKind = kind.parse()?;
    let router = match region {
        Some(region) => {
            let region: Region = region.parse()?;
            Router::new(kind, region, restapi_sdk::private_zone_from_env())
        }
        None => Router::from_env(kind)?,
    };
    let table = router.routes()?;

    println!("kind: {kind}");
    println!("region: {}", router.region());
    println!("api_server: {}", table.api_server);
    println!("iv: {}", table.iv);
    println!("ttl: {}", table.ttl.as_secs());
    println!("private_zone: {}", table.is_private_zone);
    Ok(())
}

async fn request(
    config: Option<&Path>,
    method: &str,
    path: &str,
    data: Option<&str>,
    pay: bool,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method: {method}"))?;
    let data = data
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--data is not valid JSON")?;
    let config = ClientConfig::load(config)?;
    let options = RequestOptions::default();

    let answer = if pay {
        PayClient::new(config)?
            .request(method, path, data.as_ref(), &options)
            .await?
    } else {
        ServiceClient::new(config)?
            .request(method, path, data.as_ref(), &options)
            .await?
    };
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
