use clap::{Parser, Subcommand};
use img_convert::admin::{AdminResponse, Caller, Method, SettingsController};
use img_convert::config::{self, CONFIG_FILENAME, HostConfig};
use img_convert::imaging::{ImageFormatKind, RustBackend};
use img_convert::output;
use img_convert::pipeline::{BreakpointTable, InputImage};
use img_convert::settings::{Settings, SettingsService};
use img_convert::store::JsonFileStore;
use img_convert::upload::{FileInfo, UploadConverter, UploadedFile};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "img-convert")]
#[command(about = "Convert uploaded images to WebP or AVIF with responsive variants")]
#[command(long_about = "\
Convert uploaded images to WebP or AVIF with responsive variants

Each input is treated like one uploaded file. JPEG, PNG and TIFF sources are
re-encoded into the configured target format; everything else passes through
untouched. With responsive dimensions enabled, smaller variants are produced
for every breakpoint narrower than the source.

Conversion settings (target format, per-format quality, feature toggles) live
in the settings store and are managed with 'img-convert settings'. Deployment
options (store location, worker count, breakpoints) live in img-convert.toml.

Run 'img-convert gen-config' to generate a documented img-convert.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Host config file (defaults to ./img-convert.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Settings store directory (overrides store.path from the config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert files or directories of images
    Convert {
        /// Files or directories to convert
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Directory receiving the converted files and variants
        #[arg(long, default_value = "converted")]
        out: PathBuf,
        /// Print the processed upload records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what would be produced for a file without writing anything
    Plan {
        file: PathBuf,
    },
    /// Read or update the conversion settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print a stock img-convert.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Print the current settings
    Get {
        /// Print the raw response body instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Replace the settings with a JSON object
    Set {
        /// Settings object, e.g. '{"convertTo":"avif"}'
        body: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let host = load_host_config(cli.config.as_deref())?;
    let store_dir = cli.store.clone().unwrap_or_else(|| host.store_dir());
    debug!(store = %store_dir.display(), "Opening settings store");
    let settings = SettingsService::new(Arc::new(JsonFileStore::open(&store_dir)));
    settings.bootstrap()?;

    match cli.command {
        Command::Convert { paths, out, json } => {
            init_thread_pool(&host.processing);
            let converter = UploadConverter::new(
                RustBackend::new(),
                settings,
                BreakpointTable::resolve(host.breakpoints.as_ref()),
            );
            let inputs = collect_inputs(&paths);
            if inputs.is_empty() {
                return Err("no input files found".into());
            }
            let (names, uploads) = stage_uploads(&inputs, &out)?;
            info!(count = uploads.len(), out = %out.display(), "Converting");
            let processed = converter.convert_all(uploads);
            if json {
                println!("{}", serde_json::to_string_pretty(&processed)?);
            } else {
                output::print_convert_output(&names, &processed);
            }
        }
        Command::Plan { file } => {
            let converter = UploadConverter::new(
                RustBackend::new(),
                settings,
                BreakpointTable::resolve(host.breakpoints.as_ref()),
            );
            let upload = UploadedFile::from_path(&file);
            let mut image = InputImage::new(upload.source, upload.name);
            image.mime = upload.mime;
            let snapshot = converter.settings().settings();
            let plan = converter.plan(&image, &snapshot);
            output::print_plan(&image.name, image.cached_metadata().as_ref(), &plan);
        }
        Command::Settings(SettingsCommand::Get { json }) => {
            let controller = SettingsController::new(settings);
            let response = controller.handle(Method::Get, "/settings", &Caller::operator(), None);
            print_settings_response(&response, json)?;
        }
        Command::Settings(SettingsCommand::Set { body }) => {
            let body: serde_json::Value = serde_json::from_str(&body)?;
            let controller = SettingsController::new(settings);
            let response =
                controller.handle(Method::Put, "/settings", &Caller::operator(), Some(&body));
            print_settings_response(&response, false)?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `-v` raises the default `warn` level.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// An explicit `--config` must exist; the implicit one is optional.
fn load_host_config(explicit: Option<&Path>) -> Result<HostConfig, Box<dyn std::error::Error>> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("config file not found: {}", path.display()).into());
            }
            path.to_path_buf()
        }
        None => PathBuf::from(CONFIG_FILENAME),
    };
    Ok(config::load_config(&path)?)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Explicit files are always taken; directories contribute image files only.
fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            warn!(path = %path.display(), "Skipping missing input");
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| ImageFormatKind::from_path(p).is_some())
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

/// Copy every input into `out` and describe the copies as uploads.
///
/// Conversion consumes its source, so the originals are never handed over.
/// Returns the display names alongside the uploads, in the same order.
fn stage_uploads(
    inputs: &[PathBuf],
    out: &Path,
) -> Result<(Vec<String>, Vec<(UploadedFile, FileInfo)>), std::io::Error> {
    fs::create_dir_all(out)?;
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    let mut uploads = Vec::new();
    for input in inputs {
        let Some(name) = input.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            warn!(file = %input.display(), "Skipping input with duplicate file name");
            continue;
        }
        let staged = out.join(&name);
        if staged.canonicalize().ok() == input.canonicalize().ok() {
            warn!(file = %input.display(), "Skipping input already inside the output directory");
            continue;
        }
        fs::copy(input, &staged)?;
        let mut upload = UploadedFile::from_path(&staged);
        upload.tmp_working_directory = Some(out.to_path_buf());
        let info = FileInfo {
            name: Some(name.clone()),
            ..FileInfo::default()
        };
        names.push(input.display().to_string());
        uploads.push((upload, info));
    }
    Ok((names, uploads))
}

fn print_settings_response(
    response: &AdminResponse,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match response {
        AdminResponse::Ok(data) if !json => {
            let settings: Settings = serde_json::from_value(data.clone())?;
            output::print_settings(&settings);
            Ok(())
        }
        AdminResponse::Ok(_) => {
            println!("{}", serde_json::to_string_pretty(&response.body())?);
            Ok(())
        }
        AdminResponse::BadRequest(errors) => {
            for error in errors {
                eprintln!("{error}");
            }
            Err("settings were not saved".into())
        }
        other => Err(format!("settings request failed with status {}", other.status()).into()),
    }
}
