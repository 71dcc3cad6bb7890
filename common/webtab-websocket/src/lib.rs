//! The websocket hosting layer: handshake, request routing, and the mapping between websocket
//! messages and the byte-oriented transport used by connection sessions.

mod common;
mod route;
mod transport;

pub use common::{close_frame, transport_error};
pub use route::RouteHandler;
pub use transport::{split, WebsocketInbound, WebsocketOutbound};

use async_tungstenite::{tokio::TokioAdapter, WebSocketStream};
use log::debug;
use tokio::net::TcpStream;

/// An established server-side websocket
pub type WebsocketConnection = WebSocketStream<TokioAdapter<TcpStream>>;

/// Performs the websocket handshake on an accepted tcp stream.
///
/// Requests for any path other than `path` are rejected with a 404.
pub async fn bind(tcp: TcpStream, path: &str) -> anyhow::Result<WebsocketConnection> {
    let handler = RouteHandler::new(path);
    let websocket = async_tungstenite::tokio::accept_hdr_async(tcp, handler).await?;
    Ok(websocket)
}

/// Connects to a websocket server, and splits the socket into transport halves
pub async fn connect(url: &str) -> anyhow::Result<(WebsocketInbound, WebsocketOutbound)> {
    let (websocket, response) = async_tungstenite::tokio::connect_async(url).await?;
    debug!("connected to {}, status {}", url, response.status());

    Ok(split(websocket))
}

#[cfg(test)]
mod tests {
    use super::{bind, connect, split};
    use futures::{SinkExt, StreamExt};
    use lifeline::assert_completes;
    use tokio::net::TcpListener;
    use webtab_api::transport::{CloseStatus, Outgoing};

    #[tokio::test]
    async fn frames_cross_the_socket() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("ws://{}/ws", listener.local_addr()?);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            let websocket = bind(stream, "/ws").await?;
            let (mut inbound, mut outbound) = split(websocket);

            // echo a single frame, then close normally
            if let Some(frame) = inbound.next().await {
                outbound.send(Outgoing::Frame(frame?)).await?;
            }
            outbound.send(Outgoing::Close(CloseStatus::Normal)).await?;

            Ok::<(), anyhow::Error>(())
        });

        let (mut inbound, mut outbound) = connect(url.as_str()).await?;
        outbound.send(Outgoing::Frame(vec![0, 159, 255])).await?;

        let echoed = assert_completes!(inbound.next(), 1000);
        assert_eq!(Some(Ok(vec![0, 159, 255])), echoed);

        let end = assert_completes!(inbound.next(), 1000);
        assert!(end.is_none());

        assert_completes!(server, 1000)??;

        Ok(())
    }
}
