use crate::common::{close_frame, transport_error};
use futures::{
    future::ready,
    stream::{BoxStream, StreamExt},
    Sink, SinkExt, Stream,
};
use log::trace;
use std::pin::Pin;
use tungstenite::{Error, Message};
use webtab_api::transport::{Outgoing, TransportError};

/// Inbound frame bytes received from the peer
pub type WebsocketInbound = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Outbound frames and close indicators sent to the peer
pub type WebsocketOutbound = Pin<Box<dyn Sink<Outgoing, Error = TransportError> + Send>>;

/// Splits a websocket into the inbound byte stream and the outbound sink.
///
/// Binary and text messages carry frame bytes, and ping & pong are absorbed.  A close message
/// ends the inbound stream.
pub fn split<W>(websocket: W) -> (WebsocketInbound, WebsocketOutbound)
where
    W: Stream<Item = Result<Message, Error>> + Sink<Message, Error = Error> + Send + 'static,
{
    let (sink, stream) = websocket.split::<Message>();

    let inbound = stream
        .take_while(|message| ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| ready(inbound_bytes(message)))
        .boxed();

    let outbound = sink
        .sink_map_err(transport_error)
        .with(|outgoing| ready(Ok::<_, TransportError>(outbound_message(outgoing))));

    (inbound, Box::pin(outbound))
}

fn inbound_bytes(message: Result<Message, Error>) -> Option<Result<Vec<u8>, TransportError>> {
    match message {
        Ok(Message::Binary(data)) => Some(Ok(data)),
        Ok(Message::Text(text)) => Some(Ok(text.into_bytes())),
        Ok(message) => {
            trace!("ignoring message: {:?}", message);
            None
        }
        Err(e) => Some(Err(transport_error(e))),
    }
}

fn outbound_message(outgoing: Outgoing) -> Message {
    match outgoing {
        Outgoing::Frame(frame) => Message::Binary(frame),
        Outgoing::Close(status) => Message::Close(Some(close_frame(status))),
    }
}
