use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use trawl_client::ReqwestTransport;
use trawl_core::{
    BodyEncoding, Engine, EngineDefaults, Job, JobRequest, Method, Observers, Outcome, Scraper,
    Script, TracingPageObserver, Validation,
};

#[derive(Parser)]
#[command(name = "trawl", version, about = "Static page fetcher and scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a page and optionally run a declarative scraper against it
    Fetch {
        /// Target URL
        url: String,

        /// Declarative scraper file (JSON: {"iterator": ..., "data": ...})
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Type expression the extracted data must match (e.g. "array|object")
        #[arg(long)]
        validate: Option<String>,

        /// JSON Schema file the extracted data must satisfy
        #[arg(long, conflicts_with = "validate")]
        schema: Option<PathBuf>,

        /// Engine defaults file (JSON); falls back to TRAWL_* env vars
        #[arg(short, long, env = "TRAWL_DEFAULTS")]
        defaults: Option<PathBuf>,

        /// HTTP method for this job
        #[arg(short = 'X', long)]
        method: Option<Method>,

        /// Extra header, as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Request body; parsed as JSON when possible
        #[arg(long)]
        data: Option<String>,

        /// Send the body as JSON instead of form-encoded
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Per-request timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Allow requests to private/reserved IP ranges
        #[arg(long, default_value_t = false)]
        allow_private: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            url,
            script,
            validate,
            schema,
            defaults,
            method,
            headers,
            data,
            json,
            timeout,
            allow_private,
        } => {
            let defaults = load_defaults(defaults.as_ref())?;
            let scraper = build_scraper(script.as_ref(), validate.as_deref(), schema.as_ref())?;

            let mut request = JobRequest::new(url);
            if let Some(method) = method {
                request = request.with_method(method);
            }
            for (name, value) in &headers {
                request = request.with_header(name, value.as_str());
            }
            if let Some(data) = data {
                request = match serde_json::from_str::<serde_json::Value>(&data) {
                    Ok(value) => request.with_body(value),
                    Err(_) => request.with_body(data),
                };
            }
            if json {
                request = request.with_body_encoding(BodyEncoding::Json);
            }
            if let Some(millis) = timeout {
                request = request.with_timeout(Duration::from_millis(millis));
            }

            cmd_fetch(Job::new(request), &scraper, defaults, allow_private).await?;
        }
    }

    Ok(())
}

/// Defaults file if given, otherwise TRAWL_* environment variables.
fn load_defaults(path: Option<&PathBuf>) -> Result<EngineDefaults> {
    let defaults = match path {
        Some(path) => EngineDefaults::from_json_file(path)?,
        None => EngineDefaults::from_env()?,
    };
    Ok(defaults)
}

fn build_scraper(
    script: Option<&PathBuf>,
    validate: Option<&str>,
    schema: Option<&PathBuf>,
) -> Result<Scraper> {
    let mut scraper = Scraper::new();

    if let Some(path) = script {
        scraper = scraper.inject(Script::from_file(path)?);
    }

    if let Some(expr) = validate {
        scraper = scraper.validate(Validation::types(expr)?);
    } else if let Some(path) = schema {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        let schema: serde_json::Value =
            serde_json::from_str(&raw).context("Invalid JSON in schema file")?;
        scraper = scraper.validate(Validation::schema(&schema)?);
    }

    Ok(scraper)
}

async fn cmd_fetch(
    mut job: Job,
    scraper: &Scraper,
    defaults: EngineDefaults,
    allow_private: bool,
) -> Result<()> {
    let mut transport = ReqwestTransport::new().context("Failed to create HTTP client")?;
    if allow_private {
        transport = transport.allow_private_urls();
    }

    let observers = Observers::new();
    observers.subscribe(Arc::new(TracingPageObserver));
    let engine = Engine::with_observers(transport, defaults, observers);

    tracing::info!(id = %job.id, url = %job.url(), "Fetching");

    let outcome = engine
        .fetch(&mut job, scraper)
        .await
        .with_context(|| format!("Job {} failed", job.url()))?;

    // Output JSON to stdout
    let output = match outcome {
        Outcome::Page => json!({
            "url": job.url(),
            "result": job.result,
            "body": job.result.text(),
        }),
        Outcome::Data(data) => data.unwrap_or(serde_json::Value::Null),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Parse a `Name: value` header flag.
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("Invalid header '{raw}': expected 'Name: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid header '{raw}': empty name"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
