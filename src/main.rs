use anyhow::{Context, Result};
use clap::Parser;
use meshnode::{MeshConfig, MeshError, NodeOrchestrator, RoleKind};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "meshnode")]
#[command(about = "Radio-mesh node: retry/ack messaging, role state machines and hub bridge")]
#[command(version)]
#[command(long_about = "Runs one node of a battery-powered radio mesh (coordinator, camera, \
router, sensor or remote control). Nodes exchange reports and commands over a lossy radio \
link with retries and acknowledgements; the coordinator bridges the mesh to a line-based hub \
on stdin/stdout. The radio is simulated over UDP.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "meshnode.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the configured node role
    #[arg(long, value_name = "ROLE", help = "Node role: coordinator, camera, router, sensor or remote")]
    role: Option<RoleKind>,

    /// Drive the simulated sensor and buttons from the keyboard
    #[arg(short, long, help = "Enable keyboard control of the simulated panel")]
    keyboard: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the node")]
    validate_config: bool,

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the effective configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't join the mesh
    #[arg(long, help = "Perform dry run - bind the radio and arm the watchdog, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to daily files in this directory instead of stderr
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = MeshConfig::load_from_file(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(role) = args.role {
        config.node.role = role;
    }

    // Handle special modes that don't require logging or the radio
    if args.print_config {
        println!("# Meshnode configuration ({})", args.config);
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let log_guard = init_logging(&args)?;

    info!("Starting meshnode v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut orchestrator = NodeOrchestrator::new(config).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;
    orchestrator.set_keyboard_enabled(args.keyboard);

    let exit_code = match orchestrator.initialize().await {
        Ok(()) if args.dry_run => {
            info!("Dry run mode - node initialized but not started");
            println!("✓ Dry run completed successfully - radio bound and watchdog armed");
            return Ok(());
        }
        Ok(()) => orchestrator.run().await.map_err(|e| {
            error!("Node error during execution: {}", e);
            e
        })?,
        Err(e @ MeshError::FatalInit { .. }) => orchestrator.halt_safely(&e).await?,
        Err(e) => {
            error!("Failed to initialize node: {}", e);
            return Err(e.into());
        }
    };

    info!("Meshnode exited with code: {}", exit_code);
    drop(log_guard);

    // Non-zero exit lets the service manager restart the node
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meshnode={}", log_level)));

    // The coordinator's stdout carries hub lines, so logs never go there
    let (writer, guard) = match &args.log_dir {
        Some(dir) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            dir,
            "meshnode.log",
        )),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let ansi = args.log_dir.is_none();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
