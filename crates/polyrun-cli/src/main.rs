//! polyrun CLI - sandboxed runner for Python, C, C++ and Java snippets.

mod colors;
mod run;
mod serve;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use polyrun_core::{ExecutionConfig, Language, Toolchains};
use polyrun_server::ServerConfig;

#[derive(Parser)]
#[command(name = "polyrun")]
#[command(about = "Sandboxed build-and-run for Python, C, C++ and Java")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and run a source file
    Run {
        /// Path to the source file
        file: PathBuf,

        /// Language (inferred from the file extension when omitted)
        #[arg(short, long)]
        language: Option<String>,

        /// Wall-clock budget per compile or run, in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Print the buffered JSON response instead of streaming
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP and WebSocket server
    Serve {
        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Wall-clock budget per compile or run, in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,

        /// Directory for per-request workspaces
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },

    /// Print the starter template for a language
    Template {
        /// python, c, cpp or java
        language: String,
    },

    /// List detected toolchain binaries
    Toolchains,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            file,
            language,
            timeout_ms,
            json,
        } => {
            let config = ExecutionConfig::default().with_timeout(Duration::from_millis(timeout_ms));
            let success = run::execute(&file, language.as_deref(), config, json).await?;
            if !success {
                std::process::exit(1);
            }
        }

        Commands::Serve {
            host,
            port,
            timeout_ms,
            workspace_root,
        } => {
            let mut execution =
                ExecutionConfig::default().with_timeout(Duration::from_millis(timeout_ms));
            if let Some(root) = workspace_root {
                execution = execution.with_workspace_root(root);
            }
            serve::execute(ServerConfig { host, port }, execution).await?;
        }

        Commands::Template { language } => {
            let language: Language = language.parse()?;
            println!("{}", polyrun_core::templates::template(language));
        }

        Commands::Toolchains => print_toolchains(),
    }

    Ok(())
}

fn print_toolchains() {
    println!("\n{}Toolchains{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));

    for descriptor in Toolchains::default().descriptors() {
        let (mark, color) = if descriptor.is_available() {
            ("✓", colors::GREEN)
        } else {
            ("✗", colors::YELLOW)
        };
        let binaries: Vec<String> = descriptor
            .compiler
            .iter()
            .chain(descriptor.runtime.iter())
            .map(|p| p.display().to_string())
            .collect();

        println!(
            "{}  {}{} {:<8} {}{}{}",
            color,
            mark,
            colors::RESET,
            descriptor.language.display_name(),
            colors::DIM,
            binaries.join(", "),
            colors::RESET
        );
    }
    println!();
}
