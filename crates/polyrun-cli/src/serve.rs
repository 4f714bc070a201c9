//! Serve command implementation for polyrun CLI.

use polyrun_core::ExecutionConfig;
use polyrun_server::ServerConfig;

use crate::colors;

/// Start the HTTP and WebSocket server.
pub async fn execute(config: ServerConfig, execution: ExecutionConfig) -> anyhow::Result<()> {
    println!("\n{}polyrun server{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));
    println!(
        "{}  ◆ HTTP:{} http://{}:{}/api/execute",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ WebSocket:{} ws://{}:{}/ws",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ Timeout:{} {} ms",
        colors::CYAN,
        colors::RESET,
        execution.timeout.as_millis()
    );
    println!(
        "{}  ◆ Workspaces:{} {}",
        colors::CYAN,
        colors::RESET,
        execution.workspace_root.display()
    );
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    polyrun_server::serve(config, execution).await?;

    Ok(())
}
