use clap::{Parser, Subcommand};
use http::{HeaderMap, HeaderName, HeaderValue};
use imgpipe::config::{self, ProxyConfig};
use imgpipe::imaging::{ImageData, RustBackend};
use imgpipe::options::{PresetTable, parse_query};
use imgpipe::processing::process_image;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgpipe")]
#[command(about = "Parse image proxy URLs and render them against local files")]
#[command(long_about = "\
Parse image proxy URLs and render them against local files

A request path is the source locator, options go in the query string:

  /<base64 url>.webp?rs=fill:300:200&q=70&wm=0.5:soea
  /plain/http://example.com/cat.jpg@png?width=640

Option arguments are colon-separated. Named presets from config.toml are
applied with `preset=name`; a preset called `default` applies to every
request.

Run 'imgpipe gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding config.toml
    #[arg(long, default_value = ".", global = true)]
    config: PathBuf,

    /// Request header as `Name: value`, used for format and DPR negotiation
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the options and source URL a request path resolves to, as JSON
    Parse {
        /// Request path, including any query string
        path: String,
    },
    /// Run the full pipeline on a local source image
    Render {
        /// Request path, including any query string
        path: String,
        /// Source image file
        #[arg(long)]
        source: PathBuf,
        /// Watermark image file (defaults to `watermark.path` from config)
        #[arg(long)]
        watermark: Option<PathBuf>,
        /// Where to write the encoded result
        #[arg(long)]
        out: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("imgpipe=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Parse { ref path } => {
            let config = config::load_config(&cli.config)?;
            let presets = PresetTable::from_config(&config)?;
            let headers = parse_headers(&cli.headers)?;
            let (options, url) = parse_query(path, &headers, &config, &presets)?;
            let json = serde_json::json!({ "options": options, "url": url });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        Command::Render {
            ref path,
            ref source,
            ref watermark,
            ref out,
        } => {
            let config = config::load_config(&cli.config)?;
            let presets = PresetTable::from_config(&config)?;
            let headers = parse_headers(&cli.headers)?;
            let (options, url) = parse_query(path, &headers, &config, &presets)?;
            debug!(%url, "resolved source url");

            let source_data = ImageData::new(std::fs::read(source)?);
            let watermark_data = match resolve_watermark(watermark.as_deref(), &config, &cli.config)
            {
                Some(p) => Some(ImageData::new(std::fs::read(p)?)),
                None => None,
            };

            let output = process_image(
                &RustBackend::new(),
                &config,
                &options,
                &source_data,
                watermark_data.as_ref(),
                &CancellationToken::new(),
            )?;
            std::fs::write(out, &output.data)?;
            info!(
                format = %output.format,
                width = output.width,
                height = output.height,
                bytes = output.data.len(),
                "rendered"
            );
            println!(
                "{} ({} {}x{}, {} bytes)",
                out.display(),
                output.format,
                output.width,
                output.height,
                output.data.len()
            );
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Parse `Name: value` strings into a header map.
fn parse_headers(raw: &[String]) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    for line in raw {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| format!("header must be `Name: value`, got `{line}`"))?;
        headers.append(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }
    Ok(headers)
}

/// The CLI flag wins; a configured path is relative to the config dir.
fn resolve_watermark(
    flag: Option<&Path>,
    config: &ProxyConfig,
    config_dir: &Path,
) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or_else(|| {
        config
            .watermark
            .path
            .as_ref()
            .map(|p| config_dir.join(p))
    })
}
