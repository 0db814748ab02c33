use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use prism_contracts::events::EventWriter;
use prism_contracts::extract::OutputExtractor;
use prism_contracts::models::{ModelRegistry, Provider};
use prism_contracts::poller::{CancelToken, PollPolicy, SystemScheduler};
use prism_engine::batch::{run_batch, BatchOptions};
use prism_engine::client::{ProxyClient, DEFAULT_SERVER_URL};
use prism_engine::config::ProxyConfig;
use prism_engine::{build_state, server};
use reqwest::blocking::Client as HttpClient;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "prism=info,prism_engine=info,prism_contracts=info";

#[derive(Debug, Parser)]
#[command(name = "prism", version, about = "Image generation proxy and client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP proxy.
    Serve(ServeArgs),
    /// List registered models by category.
    Models,
    /// Generate images through a running proxy.
    Generate(GenerateArgs),
    /// Fetch one prediction status from a running proxy.
    Status(StatusArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 3000)]
    port: u16,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    model: String,
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value_t = 1)]
    count: usize,
    /// Extra model input as a JSON object; `--prompt` wins over its `prompt`.
    #[arg(long)]
    input: Option<String>,
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server: String,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct StatusArgs {
    id: String,
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server: String,
    #[arg(long)]
    wait: Option<u32>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("prism error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Models => run_models(),
        Command::Generate(args) => run_generate(args),
        Command::Status(args) => run_status(args),
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let config = ProxyConfig::from_env();
    if !config.has_replicate() {
        tracing::warn!("REPLICATE_API_TOKEN is not set; /predict and /status will fail");
    }
    if !config.has_openai() {
        tracing::warn!("OPENAI_API_KEY is not set; /generate will fail");
    }
    // Blocking upstream clients must be created and dropped outside the runtime.
    let state = Arc::new(build_state(&config)?);
    let bind_address = format!("{}:{}", args.host, args.port);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&bind_address)
            .await
            .with_context(|| format!("failed to bind {bind_address}"))?;
        tracing::info!(address = %listener.local_addr()?, "prism proxy listening");
        server::serve(listener, state.clone()).await
    })?;
    drop(runtime);
    drop(state);
    Ok(0)
}

fn run_models() -> Result<i32> {
    let registry = ModelRegistry::default();
    for (category, models) in registry.list_by_category() {
        println!("{category}");
        for model in models {
            println!(
                "  {:<20} {:<9} {:>5.1}¢  {}",
                model.key,
                model.provider.as_str(),
                model.metadata.cost_per_image_cents,
                model.metadata.display_name
            );
        }
    }
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }
    let registry = ModelRegistry::default();
    let descriptor = registry.descriptor(&args.model)?;
    let input = build_input(args.input.as_deref(), &args.prompt)?;
    let client = ProxyClient::new(&args.server, Duration::from_secs(300))?;

    if descriptor.provider == Provider::OpenAi {
        let response = client.generate(&args.model, &input)?;
        for (index, image) in response.images.iter().enumerate() {
            if let Some(revised) = image.revised_prompt.as_deref() {
                println!("revised prompt: {revised}");
            }
            match args.out.as_deref() {
                Some(out) => {
                    let bytes = BASE64
                        .decode(image.b64_json.as_bytes())
                        .context("generated image base64 decode failed")?;
                    let path = artifact_path(out, response.created, index, "png");
                    write_artifact(&path, &bytes)?;
                    println!("{}", path.display());
                }
                None => println!("image {index}: {} base64 bytes", image.b64_json.len()),
            }
        }
        return Ok(0);
    }

    let events = args.events.as_ref().map(|path| {
        let batch_id = uuid::Uuid::new_v4().to_string();
        EventWriter::new(path, batch_id)
    });
    let inputs = vec![input; args.count];
    let scheduler = SystemScheduler::default();
    let options = BatchOptions {
        policy: PollPolicy::default(),
        extractor: OutputExtractor::default(),
        scheduler: &scheduler,
        cancel: CancelToken::new(),
        events,
    };
    let report = run_batch(&client, &args.model, &inputs, &options)?;

    let downloader = match args.out {
        Some(_) => Some(
            HttpClient::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .context("failed to build download client")?,
        ),
        None => None,
    };
    let stamp = unix_millis();
    for (index, url) in report.image_urls().enumerate() {
        match (args.out.as_deref(), downloader.as_ref()) {
            (Some(out), Some(http)) => {
                let (bytes, ext) = fetch_image(http, url)?;
                let path = artifact_path(out, stamp, index, &ext);
                write_artifact(&path, &bytes)?;
                println!("{}", path.display());
            }
            _ => println!("{url}"),
        }
    }
    for failure in &report.failures {
        eprintln!("generation {} failed: {}", failure.index + 1, failure.error);
    }
    if let Some(notice) = report.notice() {
        eprintln!("{notice}");
    }
    Ok(0)
}

fn run_status(args: StatusArgs) -> Result<i32> {
    let client = ProxyClient::new(&args.server, Duration::from_secs(90))?;
    let report = client.status(&args.id, args.wait)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

fn build_input(raw: Option<&str>, prompt: &str) -> Result<Value> {
    let mut input = match raw {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("--input is not valid JSON")? {
            Value::Object(map) => map,
            _ => bail!("--input must be a JSON object"),
        },
        None => Map::new(),
    };
    input.insert("prompt".to_string(), Value::String(prompt.to_string()));
    Ok(Value::Object(input))
}

fn fetch_image(http: &HttpClient, url: &str) -> Result<(Vec<u8>, String)> {
    if let Some((mime, bytes)) = decode_data_uri(url)? {
        return Ok((bytes, extension_for_mime(&mime).to_string()));
    }
    let response = http
        .get(url)
        .send()
        .with_context(|| format!("failed downloading image ({url})"))?;
    if !response.status().is_success() {
        bail!("image download failed ({}): {url}", response.status().as_u16());
    }
    let bytes = response
        .bytes()
        .context("failed reading image bytes")?
        .to_vec();
    Ok((bytes, extension_for_url(url).to_string()))
}

fn decode_data_uri(uri: &str) -> Result<Option<(String, Vec<u8>)>> {
    let Some(rest) = uri.strip_prefix("data:") else {
        return Ok(None);
    };
    let Some((header, payload)) = rest.split_once(',') else {
        bail!("malformed data URI");
    };
    let mime = header.trim_end_matches(";base64").to_string();
    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("data URI base64 decode failed")?;
    Ok(Some((mime, bytes)))
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn extension_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "jpg",
        "webp" => "webp",
        "gif" => "gif",
        _ => "png",
    }
}

fn artifact_path(out: &Path, stamp: impl std::fmt::Display, index: usize, ext: &str) -> PathBuf {
    out.join(format!("prism-{stamp}-{index:02}.{ext}"))
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
