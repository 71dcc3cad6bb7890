//! The webtab server.  Hosts terminal tabs for websocket clients.
//!
//! Each accepted socket gets a [ConnectionSession], which decodes commands from the client,
//! spawns a shell on a fresh pseudo-terminal for every opened tab, and streams the output of
//! each tab back over the same socket.  When the socket ends, every tab is killed and reaped.

use anyhow::Context;
use log::{info, LevelFilter};
use simplelog::{CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, signal::ctrl_c};
use tokio_util::sync::CancellationToken;
use webtab_api::{config::ServerConfig, log::get_level_or};
use webtab_pty_process::unix::UnixPtySystem;

pub mod config;
mod outbound;
pub mod service;
pub mod state;

#[cfg(test)]
mod test_pty;

pub use outbound::{OutboundWriter, WriteError};
pub use service::{
    connection::ConnectionSession,
    dispatch::{ConnectionError, DispatchExit, Dispatcher},
    listener::serve,
};

pub fn server_main(config: ServerConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("failed to build the tokio runtime")?;

    let result = runtime.block_on(async { main_async(config).await });

    runtime.shutdown_timeout(Duration::from_millis(25));

    result
}

fn init_logging(config: &ServerConfig) -> anyhow::Result<()> {
    let log_config = simplelog::ConfigBuilder::new()
        .set_time_format_str("%H:%M:%S%.3f")
        .build();

    let level = get_level_or(LevelFilter::Info);
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )];

    if let Some(ref log_file) = config.log_file {
        let file = std::fs::File::create(log_file)
            .with_context(|| format!("failed to create log file {:?}", log_file))?;
        loggers.push(WriteLogger::new(level, log_config, file));
    }

    CombinedLogger::init(loggers)?;
    log_panics::init();

    Ok(())
}

async fn main_async(config: ServerConfig) -> anyhow::Result<()> {
    init_logging(&config)?;

    let address = config.socket_addr();
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    info!("webtab started.");
    info!("Listening on ws://{}{}", listener.local_addr()?, config.path);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            info!("Received ctrl-c, shutting down.");
        }
        signal.cancel();
    });

    let pty = Arc::new(UnixPtySystem::new());
    serve(listener, pty, Arc::new(config), shutdown).await?;

    info!("webtab shutdown.");
    Ok(())
}
