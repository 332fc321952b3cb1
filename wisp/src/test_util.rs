// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory pipe transport for protocol tests: the test plays the
//! server on the other end of a pair of channels.

use core::pin::Pin;
use core::task::{Context, Poll};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::BoxFuture;
use futures::{Sink, Stream};
use tokio::sync::mpsc;

use microdom::{Element, Framing};

use crate::connection::Connection;
use crate::error::Error;
use crate::ns;
use crate::socket::BoxSocket;
use crate::transport::{SocketParams, Transport};

pub(crate) struct PipeSocket {
    rx: mpsc::UnboundedReceiver<String>,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl Stream for PipeSocket {
    type Item = Result<String, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

impl Sink<String> for PipeSocket {
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: String) -> Result<(), Error> {
        match &self.get_mut().tx {
            Some(tx) => tx.send(item).map_err(|_| Error::Disconnected),
            None => Err(Error::Disconnected),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.get_mut().tx = None;
        Poll::Ready(Ok(()))
    }
}

/// The server end of a pipe.
pub(crate) struct PipeServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl PipeServer {
    /// Next frame from the client, `None` once the client closed.
    pub(crate) async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Next frame, parsed.
    pub(crate) async fn recv_element(&mut self) -> Element {
        self.recv()
            .await
            .expect("client closed the pipe")
            .parse()
            .expect("client frame parses")
    }

    /// Push a frame to the client.
    pub(crate) fn send(&self, frame: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(frame.to_owned());
        }
    }

    /// Close the server side of the socket.
    pub(crate) fn close(&mut self) {
        self.tx = None;
    }

    /// Drain frames until the client side closes.
    pub(crate) async fn drain(&mut self) {
        while self.recv().await.is_some() {}
    }

    /// A frame, if one is already queued.
    pub(crate) fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

pub(crate) fn pipe() -> (PipeSocket, PipeServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        PipeSocket {
            rx: client_rx,
            tx: Some(client_tx),
        },
        PipeServer {
            rx: server_rx,
            tx: Some(server_tx),
        },
    )
}

/// Transport handing out pre-built pipe sockets for `pipe://`
/// services, one per `connect()` call.
pub(crate) struct PipeTransport {
    sockets: StdMutex<VecDeque<PipeSocket>>,
}

impl PipeTransport {
    pub(crate) fn with_servers(count: usize) -> (Arc<PipeTransport>, Vec<PipeServer>) {
        let mut sockets = VecDeque::new();
        let mut servers = Vec::new();
        for _ in 0..count {
            let (socket, server) = pipe();
            sockets.push_back(socket);
            servers.push(server);
        }
        (
            Arc::new(PipeTransport {
                sockets: StdMutex::new(sockets),
            }),
            servers,
        )
    }
}

impl Transport for PipeTransport {
    fn probe(&self, service: &str) -> Option<SocketParams> {
        if service.starts_with("pipe://") {
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

    fn connect<'a>(&'a self, _params: &'a SocketParams) -> BoxFuture<'a, Result<BoxSocket, Error>> {
        Box::pin(async move {
            let socket = self
                .sockets
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(Error::Disconnected)?;
            Ok(Box::pin(socket) as BoxSocket)
        })
    }
}

/// A bare connection over `count` queued pipe sockets.
pub(crate) fn pipe_connection(count: usize) -> (Connection, Vec<PipeServer>) {
    let (transport, servers) = PipeTransport::with_servers(count);
    let connection = Connection::new();
    connection.register_transport(transport);
    (connection, servers)
}

/// The header reply every scripted server sends.
pub(crate) const OPEN_REPLY: &str =
    "<open xmlns=\"urn:ietf:params:xml:ns:xmpp-framing\" from=\"capulet.lit\" id=\"s1\" version=\"1.0\"/>";
