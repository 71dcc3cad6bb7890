use crate::{config::ConnectionConfig, service::connection::ConnectionSession};
use futures::future::join_all;
use log::{debug, error, info, warn};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use webtab_api::config::ServerConfig;
use webtab_pty_process::PtySystem;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accepts websocket connections until `shutdown` fires, running one session per socket.
///
/// On shutdown, every session is cancelled, and the listener waits for their tabs to be reaped.
pub async fn serve<P: PtySystem>(
    listener: TcpListener,
    pty: Arc<P>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut connections: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let accepted = select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                info!("connection opened from {}", addr);
                connections.retain(|handle| !handle.is_finished());

                let connection = accept_connection(
                    stream,
                    addr,
                    pty.clone(),
                    config.clone(),
                    shutdown.child_token(),
                );
                connections.push(tokio::spawn(connection));
            }
            Err(e) => {
                error!("tcp connection failed: {}", e);
            }
        }
    }

    info!("listener shutting down, draining {} connections", connections.len());
    if timeout(SHUTDOWN_GRACE, join_all(connections)).await.is_err() {
        warn!("connections did not drain within {:?}", SHUTDOWN_GRACE);
    }

    Ok(())
}

async fn accept_connection<P: PtySystem>(
    stream: TcpStream,
    addr: SocketAddr,
    pty: Arc<P>,
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
) {
    let bound = select! {
        _ = cancel.cancelled() => return,
        bound = webtab_websocket::bind(stream, config.path.as_str()) => bound,
    };

    let websocket = match bound {
        Ok(websocket) => websocket,
        Err(e) => {
            warn!("websocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (inbound, outbound) = webtab_websocket::split(websocket);
    let session = ConnectionSession::new(
        pty,
        ConnectionConfig::from(config.as_ref()),
        outbound,
        cancel,
    );

    let status = session.run(inbound).await;
    debug!("connection from {} closed with {:?}", addr, status);
}
