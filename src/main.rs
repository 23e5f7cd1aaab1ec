use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use sigpad::codec::{self, ImageFile};
use sigpad::config::{parse_config, PadConfig, BASE_ORIGIN_ENV};
use sigpad::errors::{find_pad_error, ErrorEnvelope, PadError};
use sigpad::loader::HttpImageLoader;
use sigpad::locator::Locator;
use sigpad::pad::PadController;
use sigpad::placement::{Point, Size};
use sigpad::stroke::PointerEvent;
use sigpad::upload::{DirectoryUploader, HttpUploader, SignatureUploader};
use tiny_skia::Pixmap;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SIGPAD_LOG";

#[derive(Debug, Parser)]
#[command(name = "sigpad")]
#[command(about = "Signature capture, document stamping and signature reference tools")]
struct Cli {
    /// YAML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long = "base-origin", global = true)]
    base_origin: Option<String>,
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    /// Print results and errors as JSON on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the display URL for each signature reference.
    Resolve {
        #[arg(required = true)]
        locators: Vec<String>,
    },
    /// Replay recorded pointer events onto a blank pad.
    Sign {
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(short = 'o', long)]
        output: PathBuf,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Draw ink, a saved signature and text onto a document page.
    Stamp {
        #[arg(long)]
        page: PathBuf,
        #[arg(long)]
        events: Option<PathBuf>,
        /// On-screen size the events were recorded at, as WxH.
        #[arg(long, value_parser = parse_size)]
        container: Option<Size>,
        /// Signature reference or local image file.
        #[arg(long, requires = "at")]
        signature: Option<String>,
        #[arg(long, value_parser = parse_point)]
        at: Option<Point>,
        #[arg(long, value_parser = parse_size, requires = "signature")]
        size: Option<Size>,
        #[arg(long)]
        text: Vec<String>,
        #[arg(long = "text-at", value_parser = parse_point)]
        text_at: Vec<Point>,
        #[arg(short = 'o', long)]
        output: PathBuf,
        #[command(flatten)]
        save: SaveArgs,
    },
}

#[derive(Debug, Args)]
struct SaveArgs {
    /// Upload to `<base-origin><upload_path>`.
    #[arg(long, conflicts_with = "store")]
    upload: bool,
    /// Store under a local directory using the server's path layout.
    #[arg(long)]
    store: Option<PathBuf>,
}

enum CliUploader {
    Http(HttpUploader),
    Directory(DirectoryUploader),
    Disabled,
}

impl SignatureUploader for CliUploader {
    async fn upload(&self, file: &ImageFile) -> Result<String, PadError> {
        match self {
            Self::Http(uploader) => uploader.upload(file).await,
            Self::Directory(uploader) => uploader.upload(file).await,
            Self::Disabled => Err(PadError::upload_rejected(
                "no upload destination configured; pass --upload or --store",
            )),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json_output = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error, json_output);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn report_error(error: &anyhow::Error, json_output: bool) {
    let pad_error = find_pad_error(error);
    if json_output {
        let envelope = pad_error.map_or_else(|| ErrorEnvelope::usage(error), PadError::envelope);
        match serde_json::to_string_pretty(&envelope) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
        return;
    }
    match pad_error {
        Some(pad_error) => {
            eprintln!("{}", pad_error.notification());
            eprintln!("error: {error:#}");
        }
        None => eprintln!("error: {error:#}"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.base_origin.as_deref())?;
    debug!(
        base_origin = config.base_origin.as_str(),
        upload_prefix = config.upload_prefix.as_str(),
        "configuration loaded"
    );

    match cli.command {
        Commands::Resolve { locators } => run_resolve(&config, &locators, cli.json),
        Commands::Sign {
            events,
            width,
            height,
            output,
            save,
        } => run_sign(&config, &events, width, height, &output, &save, cli.json).await,
        Commands::Stamp {
            page,
            events,
            container,
            signature,
            at,
            size,
            text,
            text_at,
            output,
            save,
        } => {
            let request = StampRequest {
                page,
                events,
                container,
                signature: signature.zip(at).map(|(source, at)| (source, at, size)),
                texts: pair_texts(text, text_at)?,
                output,
            };
            run_stamp(&config, request, &save, cli.json).await
        }
    }
}

/// Config file, then `SIGPAD_BASE_ORIGIN`, then `--base-origin`.
fn resolve_config(path: Option<&Path>, flag_origin: Option<&str>) -> Result<PadConfig> {
    let env_origin = env::var(BASE_ORIGIN_ENV).ok().filter(|value| !value.trim().is_empty());
    let override_origin = flag_origin.map(str::to_owned).or(env_origin);

    let config = match (path, override_origin) {
        (Some(path), Some(origin)) => parse_config(path)?.with_base_origin(origin),
        (Some(path), None) => parse_config(path)?,
        (None, Some(origin)) => PadConfig::new(origin),
        (None, None) => bail!(
            "no base origin configured; pass --base-origin, set {BASE_ORIGIN_ENV}, or use --config"
        ),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn run_resolve(config: &PadConfig, locators: &[String], json_output: bool) -> Result<()> {
    let origin = config.origin()?;
    let mut resolved = Vec::with_capacity(locators.len());
    for raw in locators {
        let locator = Locator::classify(raw, &config.upload_prefix)
            .with_context(|| format!("failed to classify '{raw}'"))?;
        resolved.push((raw, locator.kind(), locator.display_url(&origin)));
    }

    if json_output {
        let entries = resolved
            .iter()
            .map(|(raw, kind, url)| json!({ "input": raw, "kind": kind, "display_url": url }))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&json!({ "ok": true, "resolved": entries }))?);
    } else {
        for (_, kind, url) in resolved {
            println!("{kind}\t{url}");
        }
    }
    Ok(())
}

async fn run_sign(
    config: &PadConfig,
    events_path: &Path,
    width: u32,
    height: u32,
    output: &Path,
    save: &SaveArgs,
    json_output: bool,
) -> Result<()> {
    let events = read_events(events_path)?;
    let mut pad = PadController::standalone(
        config,
        width,
        height,
        build_uploader(config, save)?,
        build_loader(config)?,
    )?;
    for event in &events {
        pad.pointer(event);
    }
    debug!(events = events.len(), state = pad.state().label(), "events replayed");

    finish(&mut pad, output, save, json_output).await
}

struct StampRequest {
    page: PathBuf,
    events: Option<PathBuf>,
    container: Option<Size>,
    signature: Option<(String, Point, Option<Size>)>,
    texts: Vec<(String, Point)>,
    output: PathBuf,
}

async fn run_stamp(
    config: &PadConfig,
    request: StampRequest,
    save: &SaveArgs,
    json_output: bool,
) -> Result<()> {
    let page = read_raster(&request.page)?;

    let mut pad = PadController::document(
        config,
        page,
        request.container.unwrap_or_default(),
        build_uploader(config, save)?,
        build_loader(config)?,
    )?;

    if let Some(path) = &request.events {
        for event in &read_events(path)? {
            pad.pointer(event);
        }
    }
    if let Some((source, at, size)) = request.signature {
        let locator = signature_source(config, &source)?;
        pad.place_signature(locator, at, size.unwrap_or_default())
            .await
            .with_context(|| format!("failed to place signature '{source}'"))?;
    }
    for (content, at) in request.texts {
        pad.add_text(content, at);
    }
    debug!(
        overlays = pad.overlays().len(),
        state = pad.state().label(),
        "document prepared"
    );

    finish(&mut pad, &request.output, save, json_output).await
}

/// Writes the composed image, then saves it when asked.
async fn finish(
    pad: &mut PadController<CliUploader, HttpImageLoader>,
    output: &Path,
    save: &SaveArgs,
    json_output: bool,
) -> Result<()> {
    let composed = pad.compose().await.context("failed to compose image")?;
    let encoded = codec::encode(&composed)?;
    fs::write(output, encoded.bytes())
        .with_context(|| format!("failed to write {}", output.display()))?;

    let saved = if wants_save(save) {
        let locator = pad
            .save_composed(&composed)
            .await
            .context("failed to save signature")?;
        Some((locator.kind(), pad.display_url().unwrap_or_default()))
    } else {
        None
    };

    if json_output {
        let mut body = json!({
            "ok": true,
            "output": output.display().to_string(),
            "width": composed.width(),
            "height": composed.height(),
        });
        if let Some((kind, display_url)) = &saved {
            body["saved"] = json!({ "kind": kind, "display_url": display_url });
        }
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!(
            "Wrote {} ({}x{})",
            output.display(),
            composed.width(),
            composed.height()
        );
        if let Some((_, display_url)) = saved {
            println!("Saved {display_url}");
        }
    }
    Ok(())
}

fn wants_save(save: &SaveArgs) -> bool {
    save.upload || save.store.is_some()
}

fn build_uploader(config: &PadConfig, save: &SaveArgs) -> Result<CliUploader> {
    if let Some(root) = &save.store {
        return Ok(CliUploader::Directory(DirectoryUploader::new(
            root,
            config.upload_prefix.clone(),
        )));
    }
    if save.upload {
        let uploader = HttpUploader::with_timeout(
            config.upload_endpoint()?,
            config.upload_field.clone(),
            config.request_timeout(),
        )?;
        return Ok(CliUploader::Http(uploader));
    }
    Ok(CliUploader::Disabled)
}

fn build_loader(config: &PadConfig) -> Result<HttpImageLoader> {
    Ok(HttpImageLoader::with_timeout(
        config.origin()?,
        config.request_timeout(),
    )?)
}

/// A local image file becomes an inline reference; anything else is
/// classified as a stored reference.
fn signature_source(config: &PadConfig, source: &str) -> Result<Locator> {
    let path = Path::new(source);
    if path.is_file() {
        let raster = read_raster(path)?;
        return Ok(Locator::Inline(codec::encode(&raster)?));
    }
    Ok(Locator::classify(source, &config.upload_prefix)?)
}

fn read_events(path: &Path) -> Result<Vec<PointerEvent>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read events {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse pointer events in {}", path.display()))
}

fn read_raster(path: &Path) -> Result<Pixmap> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    codec::decode_raster(&bytes).with_context(|| format!("failed to decode {}", path.display()))
}

fn pair_texts(texts: Vec<String>, positions: Vec<Point>) -> Result<Vec<(String, Point)>> {
    if texts.len() != positions.len() {
        bail!(
            "every --text needs a matching --text-at (got {} texts and {} positions)",
            texts.len(),
            positions.len()
        );
    }
    Ok(texts.into_iter().zip(positions).collect())
}

fn parse_point(raw: &str) -> Result<Point> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| anyhow!("expected X,Y, got '{raw}'"))?;
    Ok(Point::new(parse_number(x)?, parse_number(y)?))
}

fn parse_size(raw: &str) -> Result<Size> {
    let (width, height) = raw
        .split_once(&['x', 'X'][..])
        .ok_or_else(|| anyhow!("expected WxH, got '{raw}'"))?;
    let size = Size::new(parse_number(width)?, parse_number(height)?);
    if size.is_empty() {
        bail!("size must be positive, got '{raw}'");
    }
    Ok(size)
}

fn parse_number(raw: &str) -> Result<f32> {
    let value = raw
        .trim()
        .parse::<f32>()
        .with_context(|| format!("'{raw}' is not a number"))?;
    if !value.is_finite() {
        bail!("'{raw}' is not a finite number");
    }
    Ok(value)
}
