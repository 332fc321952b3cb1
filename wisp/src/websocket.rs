// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XMPP over WebSocket (RFC 7395).
//!
//! Every WebSocket text frame carries one complete XML document; the
//! stream header is `<open/>` and the footer `<close/>`, both in the
//! framing namespace, negotiated under the `xmpp` subprotocol.

use core::pin::Pin;
use core::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{ready, Sink, Stream};
use http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use microdom::{Element, Framing};

use crate::error::Error;
use crate::ns;
use crate::socket::BoxSocket;
use crate::transport::{SocketParams, Transport};

/// The WebSocket subprotocol registered for XMPP.
pub const SUBPROTOCOL: &str = "xmpp";

/// RFC 7395 transport for `ws://` and `wss://` services.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn probe(&self, service: &str) -> Option<SocketParams> {
        if service.starts_with("ws://") || service.starts_with("wss://") {
            Some(SocketParams {
                uri: service.to_owned(),
            })
        } else {
            None
        }
    }

    fn framing(&self) -> Framing {
        Framing::Framed
    }

    fn open_header(&self, domain: &str, lang: Option<&str>) -> Element {
        let mut header = Element::new("open")
            .with_attr("xmlns", ns::FRAMING)
            .with_attr("version", "1.0")
            .with_attr("to", domain);
        if let Some(lang) = lang {
            header.set_attr("xml:lang", lang);
        }
        header
    }

    fn footer(&self) -> Element {
        Element::new("close").with_attr("xmlns", ns::FRAMING)
    }

    fn connect<'a>(&'a self, params: &'a SocketParams) -> BoxFuture<'a, Result<BoxSocket, Error>> {
        Box::pin(async move {
            let mut request = params.uri.as_str().into_client_request()?;
            request.headers_mut().insert(
                SEC_WEBSOCKET_PROTOCOL,
                http::HeaderValue::from_static(SUBPROTOCOL),
            );
            let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
            log::debug!("websocket connected to {}", params.uri);
            Ok(Box::pin(WsFrames { inner: stream }) as BoxSocket)
        })
    }
}

/// Adapter from a tungstenite WebSocket to the frame socket contract:
/// text frames pass through, control frames are handled below us,
/// binary frames are dropped.
struct WsFrames {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Stream for WsFrames {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(Message::Text(text))) => {
                    return Poll::Ready(Some(Ok(text.as_str().to_owned())))
                }
                Some(Ok(Message::Close(_))) => return Poll::Ready(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Poll::Ready(Some(Err(Error::Websocket(e)))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Sink<String> for WsFrames {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(Error::Websocket)
    }

    fn start_send(mut self: Pin<&mut Self>, item: String) -> Result<(), Error> {
        Pin::new(&mut self.inner)
            .start_send(Message::text(item))
            .map_err(Error::Websocket)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(Error::Websocket)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(Error::Websocket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_websocket_uris_only() {
        let transport = WebSocketTransport;
        assert!(transport.probe("wss://example.com:5281/xmpp-websocket").is_some());
        assert!(transport.probe("ws://localhost:5280/ws").is_some());
        assert!(transport.probe("xmpp://example.com").is_none());
        assert!(transport.probe("example.com").is_none());
    }

    #[test]
    fn header_shape_matches_rfc7395() {
        let transport = WebSocketTransport;
        let header = transport.open_header("capulet.lit", Some("en"));
        assert_eq!(
            header.to_string(),
            "<open xmlns=\"urn:ietf:params:xml:ns:xmpp-framing\" version=\"1.0\" to=\"capulet.lit\" xml:lang=\"en\"/>"
        );
        assert_eq!(
            transport.footer().to_string(),
            "<close xmlns=\"urn:ietf:params:xml:ns:xmpp-framing\"/>"
        );
    }
}
