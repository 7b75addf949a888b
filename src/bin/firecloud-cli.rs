use std::path::PathBuf;

use axum::http::{HeaderName, HeaderValue, Method, Request};
use clap::{Parser, Subcommand};
use url::Url;

use firecloud::cache::{cache_key, vary_hash};
use firecloud::config::{load_config, validation};
use firecloud::firebase::{ExtraOptions, Firebase};

#[derive(Parser)]
#[command(name = "firecloud-cli")]
#[command(about = "Inspect how firecloud routes and caches requests", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "firecloud.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print a summary
    Check,
    /// Show the upstream and rewritten URL for a request URL
    Resolve { url: String },
    /// Show the vary hash and cache key for a request
    Key {
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header as `name: value`, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Check => {
            println!("project:   {}", config.firebase.project_id);
            println!("rewrites:  {}", config.firebase.rewrites.len());
            for rewrite in &config.firebase.rewrites {
                let target = match (&rewrite.function, &rewrite.destination) {
                    (Some(name), _) => format!("function {}", name),
                    (_, Some(path)) => format!("destination {}", path),
                    _ => "-".to_string(),
                };
                println!("  {:<40} → {}", rewrite.source, target);
            }
            println!("cache:     {}", if config.cache.enabled { "on" } else { "off" });
        }
        Commands::Resolve { url } => {
            let firebase = &config.firebase;
            let extra = ExtraOptions {
                public_endpoint: validation::public_endpoint(firebase)?,
                cache: None,
                ..ExtraOptions::default()
            };
            let resolver = Firebase::new(&firebase.project_id, &validation::hosting_config(firebase)?, extra)?;

            let url = Url::parse(&url)?;
            let request = Request::builder().uri(url.as_str()).body(())?;
            println!("upstream:  {}", resolver.endpoint(&request));
            println!("rewritten: {}", resolver.rewrite_url(url));
        }
        Commands::Key { url, method, headers } => {
            let mut builder = Request::builder().method(Method::from_bytes(method.as_bytes())?).uri(url);
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("header '{}' is not 'name: value'", header))?;
                builder = builder.header(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }
            let request = builder.body(())?;

            println!("vary hash: {}", vary_hash(&request, &config.cache.seed));
            println!("cache key: {}", cache_key(&request, &config.cache.seed)?);
        }
    }

    Ok(())
}
