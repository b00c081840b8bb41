use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use skinscope::config::{self, AnalysisConfig, ConfigError};
use skinscope::pipeline::analysis::{
    decode_photo, AnalysisError, BandName, CanonicalSize, SkinAnalyzer, TracingObserver,
};

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

struct Options {
    input: PathBuf,
    size: Option<CanonicalSize>,
    config: Option<PathBuf>,
    bands: bool,
    pretty: bool,
}

fn print_usage(program: &str) {
    eprintln!("{} {} - skin photo analysis", config::APP_NAME, config::APP_VERSION);
    eprintln!();
    eprintln!("Usage: {} <image> [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --size <capture|analysis>  Canonical size (default: capture, 640x480)");
    eprintln!("  --config <file.json>       Load analysis settings from JSON");
    eprintln!("  --bands                    Also report synthetic spectral band views");
    eprintln!("  --pretty                   Pretty-print the JSON report");
    eprintln!();
    eprintln!("Logging: set {} or RUST_LOG (e.g. skinscope=debug)", config::LOG_ENV_VAR);
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(config::LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_args(args: &[String]) -> Result<Options, CliError> {
    let program = args.first().map(String::as_str).unwrap_or("skinscope");
    if args.len() < 2 {
        print_usage(program);
        return Err(CliError::Usage("Missing required <image> argument".into()));
    }

    let mut options = Options {
        input: PathBuf::from(&args[1]),
        size: None,
        config: None,
        bands: false,
        pretty: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--size" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| CliError::Usage("--size requires a value".into()))?;
                options.size = Some(value.parse().map_err(CliError::Usage)?);
                i += 2;
            }
            "--config" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| CliError::Usage("--config requires a path".into()))?;
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--bands" => {
                options.bands = true;
                i += 1;
            }
            "--pretty" => {
                options.pretty = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(program);
                process::exit(0);
            }
            other => {
                print_usage(program);
                return Err(CliError::Usage(format!("Unknown option: {}", other)));
            }
        }
    }

    Ok(options)
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args)?;

    let mut analysis_config = match &options.config {
        Some(path) => AnalysisConfig::from_json_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(size) = options.size {
        analysis_config.canonical_size = size;
    }

    tracing::info!(
        input = %options.input.display(),
        size = %analysis_config.canonical_size,
        "{} v{} starting",
        config::APP_NAME,
        config::APP_VERSION
    );

    let bytes = std::fs::read(&options.input)?;
    let raw = decode_photo(&bytes)?;

    let analyzer = SkinAnalyzer::from_config(&analysis_config, Arc::new(TracingObserver));
    let report = analyzer.analyze(&raw)?;

    let mut output = serde_json::to_value(&report)?;
    if options.bands {
        let views = analyzer.spectral_views(&raw, &BandName::ALL)?;
        let bands: Vec<_> = views
            .iter()
            .map(|(name, view)| {
                json!({
                    "band": name,
                    "width": view.width(),
                    "height": view.height(),
                })
            })
            .collect();
        output["bands"] = json!(bands);
    }

    let text = if options.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}
