//! coderun service and CLI
//!
//! Serves the code execution HTTP API, and runs single files from the command
//! line through the same engine.

use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coderun::{Config, EXAMPLE_CONFIG, ExecutionRequest, Runner};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::EnvFilter;

mod app;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(about = "A service for time-bounded remote code execution")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run a source file once and print its output
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, java, c)
        #[arg(short, long)]
        language: String,

        /// File whose content is fed to standard input
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,

    /// Initialize a new configuration file
    Init {
        /// Output path (default: coderun.toml)
        #[arg(short, long, default_value = "coderun.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    set_panic_hook();

    let command = cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
    });

    let config_path = cli.config.as_deref();
    match command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Serve { port, bind } => serve(load_config(config_path)?, port, bind).await,
        Commands::Run {
            source,
            language,
            input,
        } => run_file(load_config(config_path)?, &source, &language, input.as_deref()).await,
        Commands::Languages => {
            list_languages(&load_config(config_path)?);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&load_config(config_path)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        info!(?path, "loading configuration");
    } else {
        debug!("using built-in configuration with environment overrides");
    }
    Config::load(path).context("failed to load configuration")
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(message = "panic occurred", panic = %panic_info);
    }));
}

async fn serve(mut config: Config, port: Option<u16>, bind: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let bind = config.server.bind.clone();
    let port = config.server.port;

    if config.allow_privileged {
        let privileged: Vec<_> = config
            .language_ids()
            .into_iter()
            .filter(|id| config.languages[*id].privileged)
            .collect();
        if !privileged.is_empty() {
            warn!(
                languages = ?privileged,
                "privileged languages are enabled: any client can run shell commands as this user"
            );
        }
    }

    let runner = Runner::prepare(config)
        .await
        .context("failed to prepare scratch directory")?;
    info!(
        scratch = %runner.scratch().root().display(),
        languages = runner.config().languages.len(),
        "runner ready"
    );

    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    let addr = listener.local_addr().context("failed to read local address")?;
    info!("Code execution server running on http://{addr}");

    axum::serve(listener, app::router(runner))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

async fn run_file(
    config: Config,
    source: &Path,
    language_id: &str,
    input: Option<&Path>,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(language_id, code);
    if let Some(input_path) = input {
        let input = tokio::fs::read_to_string(input_path)
            .await
            .context("failed to read input file")?;
        request = request.with_input(input);
    }

    let runner = Runner::prepare(config)
        .await
        .context("failed to prepare scratch directory")?;

    info!(language = language_id, "running program");
    let response = runner.execute(&request).await?;

    // Output goes to stdout and errors to stderr, keeping stdout clean for piping
    print!("{}", response.output);
    match response.error {
        Some(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
        None => Ok(()),
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let lang = &config.languages[id];
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        let disabled = if lang.privileged && !config.allow_privileged {
            ", disabled"
        } else {
            ""
        };
        println!("  {:<15} {} ({lang_type}{disabled})", id, lang.name);
    }
}

fn show_config(config: &Config) {
    println!("Server:");
    println!("  Bind: {}:{}", config.server.bind, config.server.port);
    println!("  CORS: {}", config.server.cors);
    println!();
    println!("Default resource limits:");
    println!(
        "  Wall time limit: {:?} s",
        config.default_limits.wall_time_limit
    );
    println!("  Max output: {:?} KB", config.default_limits.max_output);
    println!();
    println!("Scratch directory: {}", config.scratch_dir.display());
    println!("Privileged languages allowed: {}", config.allow_privileged);
    match config.max_concurrent_executions {
        Some(n) => println!("Max concurrent executions: {n}"),
        None => println!("Max concurrent executions: unbounded"),
    }
    println!();

    let mut tools: Vec<_> = config.toolchains.keys().collect();
    tools.sort();
    println!("Toolchains: {}", tools.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "));
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
