use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_core::{list_enrollment_files, Config, ImageSource, VerificationResult};
use std::path::PathBuf;
use std::process::ExitCode;

mod dbus_client;

#[derive(Parser)]
#[command(name = "facegate", about = "facegate face authorization CLI")]
struct Cli {
    /// Directory of authorized face images (overrides config)
    #[arg(long, global = true)]
    gallery_dir: Option<PathBuf>,
    /// Maximum match distance, lower is stricter (overrides config)
    #[arg(long, global = true)]
    tolerance: Option<f32>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a photo against the authorized faces
    Verify {
        /// Image to verify (jpg, jpeg or png)
        image: PathBuf,
        /// Ask a running facegated instead of loading models locally
        #[arg(long)]
        daemon: bool,
    },
    /// List the enrollment images and why any of them were rejected
    List {
        /// Query a running facegated
        #[arg(long)]
        daemon: bool,
    },
    /// Show configuration and the number of authorized faces
    Status {
        /// Query a running facegated
        #[arg(long)]
        daemon: bool,
    },
    /// Create the gallery directory
    Init,
}

impl Commands {
    fn uses_daemon(&self) -> bool {
        match self {
            Commands::Verify { daemon, .. }
            | Commands::List { daemon }
            | Commands::Status { daemon } => *daemon,
            Commands::Init => false,
        }
    }
}

/// The daemon answers from its own configuration, so local overrides
/// would be silently ignored.
fn check_daemon_flags(cli: &Cli) -> Result<()> {
    if cli.command.uses_daemon() && (cli.gallery_dir.is_some() || cli.tolerance.is_some()) {
        bail!(
            "--gallery-dir and --tolerance do not apply with --daemon; \
             configure facegated through FACEGATE_* or its config file instead"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    check_daemon_flags(&cli)?;

    let mut config = Config::load()?;
    if let Some(dir) = cli.gallery_dir {
        config.gallery_dir = dir;
    }
    if let Some(t) = cli.tolerance {
        if !config.set_tolerance(t) {
            bail!("tolerance must be a non-negative number, got {t}");
        }
    }

    match cli.command {
        Commands::Verify { image, daemon } => {
            if !image.is_file() {
                bail!("file does not exist: {}", image.display());
            }
            let result = if daemon {
                let path = image
                    .canonicalize()
                    .with_context(|| format!("cannot resolve {}", image.display()))?;
                let proxy = dbus_client::connect(&config).await?;
                dbus_client::verify(&proxy, &path.to_string_lossy()).await?
            } else {
                verify_local(&config, image)?
            };
            print_result(&result, cli.json)?;
            return Ok(if result.authorized {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            });
        }
        Commands::List { daemon } => {
            if daemon {
                let proxy = dbus_client::connect(&config).await?;
                let listing: serde_json::Value = serde_json::from_str(&proxy.list_gallery().await?)?;
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                list_local(&config, cli.json)?;
            }
        }
        Commands::Status { daemon } => {
            if daemon {
                let proxy = dbus_client::connect(&config).await?;
                let status: serde_json::Value = serde_json::from_str(&proxy.status().await?)?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                status_local(&config, cli.json)?;
            }
        }
        Commands::Init => {
            std::fs::create_dir_all(&config.gallery_dir).with_context(|| {
                format!("cannot create {}", config.gallery_dir.display())
            })?;
            println!("Gallery directory ready: {}", config.gallery_dir.display());
            println!("Add one photo per authorized person (jpg, jpeg or png).");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn verify_local(config: &Config, image: PathBuf) -> Result<VerificationResult> {
    let analyzer = facegate_core::default_analyzer(config)
        .context("failed to initialize face analyzer")?;
    if let Some(hint) = config.arcface_tolerance_hint() {
        tracing::warn!("{hint}");
    }
    let mut authorizer = config.authorizer(analyzer);
    let load = authorizer.load_gallery(&config.gallery_dir);
    tracing::info!(authorized_faces = load.gallery.len(), "gallery loaded");
    Ok(authorizer.verify(&ImageSource::path(image), &load.gallery))
}

fn list_local(config: &Config, json: bool) -> Result<()> {
    let files = list_enrollment_files(&config.gallery_dir);
    // Warnings need the analyzer; without it only the file listing is available.
    let warnings = match facegate_core::default_analyzer(config) {
        Ok(analyzer) => Some(config.authorizer(analyzer).load_gallery(&config.gallery_dir).warnings),
        Err(e) => {
            tracing::warn!(error = %e, "face analyzer unavailable; skipping gallery checks");
            None
        }
    };

    if json {
        let listing = serde_json::json!({ "files": files, "warnings": warnings });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if !config.gallery_dir.is_dir() {
        println!("Authorized faces directory not found: {}", config.gallery_dir.display());
        return Ok(());
    }
    if files.is_empty() {
        println!("No enrollment images in {}", config.gallery_dir.display());
    }
    for (i, name) in files.iter().enumerate() {
        println!("{:>3}  {name}", i + 1);
    }
    for warning in warnings.iter().flatten() {
        println!("  ⚠ {warning}");
    }
    Ok(())
}

fn status_local(config: &Config, json: bool) -> Result<()> {
    let enrollment_files = list_enrollment_files(&config.gallery_dir).len();
    let (authorized_faces, analyzer, tolerance_hint) =
        match facegate_core::default_analyzer(config) {
            Ok(analyzer) => {
                let load = config.authorizer(analyzer).load_gallery(&config.gallery_dir);
                let hint = config.arcface_tolerance_hint();
                (Some(load.gallery.len()), "loaded".to_string(), hint)
            }
            Err(e) => (None, format!("unavailable: {e}"), None),
        };

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "config": config,
            "enrollment_files": enrollment_files,
            "authorized_faces": authorized_faces,
            "analyzer": analyzer,
            "tolerance_hint": tolerance_hint,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("facegate {}", env!("CARGO_PKG_VERSION"));
    println!("  gallery dir:      {}", config.gallery_dir.display());
    println!("  model dir:        {}", config.model_dir.display());
    println!("  tolerance:        {}", config.tolerance);
    if let Some(hint) = &tolerance_hint {
        println!("                    ⚠ {hint}");
    }
    println!("  min dimension:    {}px", config.min_dimension);
    println!("  analyzer:         {analyzer}");
    println!("  enrollment files: {enrollment_files}");
    match authorized_faces {
        Some(n) => println!("  authorized faces: {n}"),
        None => println!("  authorized faces: unknown"),
    }
    Ok(())
}

fn print_result(result: &VerificationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.authorized {
        println!("✅ {}", result.message);
    } else {
        println!("❌ {}", result.message);
    }
    Ok(())
}
