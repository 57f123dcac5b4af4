//! `hz start` - boot the proxy.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::TcpListener;

use crate::cli::{resolve_config_path, CliError};
use crate::config;
use crate::lifecycle::{shutdown_signal, App, AppOptions, Shutdown};
use crate::observability::logging;

pub(crate) async fn run(
    config_flag: &Option<PathBuf>,
    port: Option<u16>,
    no_tunnel: bool,
    watch: bool,
    inspect: bool,
    inspect_port: u16,
) -> Result<(), CliError> {
    let path = resolve_config_path(config_flag)?;
    println!("Loading config: {}", path.display());

    let manager = config::Manager::new(&path)?;
    let mut snapshot = (*manager.get()).clone();
    if let Some(port) = port {
        snapshot.server.port = port;
    }

    logging::init(&snapshot.logging);

    let addr: SocketAddr = format!("{}:{}", snapshot.server.host, snapshot.server.port)
        .parse()
        .map_err(|e| CliError::msg(format!("invalid listen address: {e}")))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::msg(format!("failed to bind {addr}: {e}")))?;

    let app = App::new(
        manager,
        AppOptions {
            watch,
            inspect,
            inspect_port,
            no_tunnel,
        },
    )?;

    println!();
    println!("hz proxy starting");
    println!("  Local:  http://{addr}");
    println!();
    println!("Services:");
    for service in &snapshot.services {
        let default_mark = if service.default { " (default)" } else { "" };
        println!("  - {} -> {}{}", service.name, service.target, default_mark);
    }
    if inspect {
        println!();
        println!("Inspector: http://127.0.0.1:{inspect_port}/inspect/http");
    }
    println!();
    println!("Ready! Press Ctrl+C to stop");
    println!();

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    app.run(listener, shutdown).await?;
    Ok(())
}
