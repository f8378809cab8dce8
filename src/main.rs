use anyhow::{Context, Result};
use clap::Parser;
use feedsift::feed::{FeedParser, FeedSource, HttpFetcher, ParseSettings};
use feedsift::Config;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "feedsift", about = "Fetch a feed and print its normalized posts as JSON")]
struct Args {
    /// Feed URL (http or https)
    url: String,

    /// ETag from the previous fetch
    #[arg(long)]
    etag: Option<String>,

    /// Unix timestamp of the newest post already seen
    #[arg(long, value_name = "TIMESTAMP")]
    modified: Option<i64>,

    /// Path to a TOML config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn validate_feed_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid feed URL: {}", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => anyhow::bail!("Unsupported scheme: {} (only http/https allowed)", scheme),
    }
}

/// Builds the source from the arguments. The URL is validated but kept as
/// given, since the feed hash is computed from that exact string.
fn feed_source(args: &Args) -> Result<FeedSource> {
    validate_feed_url(&args.url)?;
    let mut source = FeedSource::new(args.url.as_str());
    if let Some(etag) = &args.etag {
        source = source.with_etag(etag.as_str());
    }
    if let Some(modified) = args.modified {
        source = source.with_modified(modified);
    }
    Ok(source)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let source = feed_source(&args)?;

    let client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let parser = FeedParser::new(HttpFetcher::new(client, &config))
        .with_settings(ParseSettings::from(&config));

    match parser.parse(&source).await {
        Ok(result) => {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
            println!("{}", json);
            Ok(())
        }
        Err(e) if e.is_not_modified() => {
            eprintln!("Not modified: {}", source.url());
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to parse feed {}", source.url())),
    }
}
