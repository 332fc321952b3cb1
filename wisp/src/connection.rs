// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The stream-lifecycle state machine.
//!
//! A [`Connection`] owns at most one socket and one parser at a time;
//! both are replaced wholesale on reconnect or stream restart, and the
//! previous read pump is fully detached before a new one is attached.
//! Status only ever changes through one transition point, which also
//! publishes it on the event channel.

use core::fmt;
use core::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use jid::Jid;
use microdom::{Element, Framing, StreamEvent, TreeBuilder};

use crate::context::{Identity, StanzaContext};
use crate::error::{Error, StreamError};
use crate::middleware::{Decision, Middleware};
use crate::ns;
use crate::socket::BoxSocket;
use crate::transport::Transport;

/// How long `open()` waits for the peer's stream header.
pub const OPEN_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default bound for `close()` and `disconnect()` waits.
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// The connection lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing going on; the initial and final state.
    Offline,
    /// Building the transport socket.
    Connecting,
    /// The socket is up.
    Connect,
    /// The stream header was sent, awaiting the peer's.
    Opening,
    /// The stream is open; negotiation may still be in progress.
    Open,
    /// Negotiation finished; stanzas flow freely.
    Online,
    /// Our stream footer was written, awaiting the peer's.
    Closing,
    /// The stream closed cleanly.
    Close,
    /// The socket is being torn down.
    Disconnecting,
    /// The socket is gone, cleanly or not. The reconnect supervisor
    /// keys off this state.
    Disconnect,
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Status::Offline => "offline",
            Status::Connecting => "connecting",
            Status::Connect => "connect",
            Status::Opening => "opening",
            Status::Open => "open",
            Status::Online => "online",
            Status::Closing => "closing",
            Status::Close => "close",
            Status::Disconnecting => "disconnecting",
            Status::Disconnect => "disconnect",
        };
        fmt.write_str(name)
    }
}

/// Typed connection events, one broadcast channel for all concerns.
#[derive(Debug, Clone)]
pub enum Event {
    /// The status changed.
    Status(Status),
    /// The peer's stream header arrived.
    StreamStart(Element),
    /// An inbound top-level element, in wire arrival order.
    Element(Element),
    /// An element was written out through `send`.
    Sent(Element),
    /// The stream ended (peer footer or root close).
    StreamEnd(Element),
    /// Negotiation finished; the stream is ready for stanzas.
    Online(Jid),
    /// A fault surfaced somewhere in the pipeline.
    Error(Arc<Error>),
}

type Writer = SplitSink<BoxSocket, String>;

#[derive(Default)]
struct State {
    service: Option<String>,
    domain: Option<String>,
    lang: Option<String>,
    jid: Option<Jid>,
    authenticated: bool,
    transport: Option<Arc<dyn Transport>>,
    root: Option<Element>,
}

struct Core {
    transports: StdMutex<Vec<Arc<dyn Transport>>>,
    status: watch::Sender<Status>,
    events: broadcast::Sender<Event>,
    root_watch: watch::Sender<Option<Element>>,
    state: StdMutex<State>,
    parser: StdMutex<Option<TreeBuilder>>,
    writer: AsyncMutex<Option<Writer>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
    inbound: StdMutex<Vec<Arc<dyn Middleware>>>,
    outbound: StdMutex<Vec<Arc<dyn Middleware>>>,
}

/// An XMPP client connection: one socket, one parser, one status.
///
/// Cheap to clone; clones share the same underlying connection.
#[derive(Clone)]
pub struct Connection {
    core: Arc<Core>,
}

impl Default for Connection {
    fn default() -> Connection {
        Connection::new()
    }
}

impl Connection {
    /// Create an offline connection with no transports registered.
    pub fn new() -> Connection {
        let (status, _) = watch::channel(Status::Offline);
        let (events, _) = broadcast::channel(256);
        let (root_watch, _) = watch::channel(None);
        Connection {
            core: Arc::new(Core {
                transports: StdMutex::new(Vec::new()),
                status,
                events,
                root_watch,
                state: StdMutex::new(State::default()),
                parser: StdMutex::new(None),
                writer: AsyncMutex::new(None),
                pump: StdMutex::new(None),
                inbound: StdMutex::new(Vec::new()),
                outbound: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Register a transport; transports are probed in registration
    /// order at connect time.
    pub fn register_transport(&self, transport: Arc<dyn Transport>) {
        self.core.transports.lock().unwrap().push(transport);
    }

    /// Append a handler to the inbound pipeline.
    pub fn use_inbound(&self, middleware: Arc<dyn Middleware>) {
        self.core.inbound.lock().unwrap().push(middleware);
    }

    /// Append a handler to the outbound pipeline.
    pub fn use_outbound(&self, middleware: Arc<dyn Middleware>) {
        self.core.outbound.lock().unwrap().push(middleware);
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.core.events.subscribe()
    }

    /// The current status.
    pub fn status(&self) -> Status {
        *self.core.status.borrow()
    }

    /// A watch on the status, for supervisors.
    pub fn status_watch(&self) -> watch::Receiver<Status> {
        self.core.status.subscribe()
    }

    /// The JID this connection is bound to, if any.
    pub fn jid(&self) -> Option<Jid> {
        self.core.state.lock().unwrap().jid.clone()
    }

    /// The open stream header element, while a stream is open.
    pub fn root(&self) -> Option<Element> {
        self.core.state.lock().unwrap().root.clone()
    }

    /// Whether SASL completed on the current stream.
    pub fn is_authenticated(&self) -> bool {
        self.core.state.lock().unwrap().authenticated
    }

    pub(crate) fn set_jid(&self, jid: Jid) {
        self.core.state.lock().unwrap().jid = Some(jid);
    }

    pub(crate) fn set_authenticated(&self) {
        self.core.state.lock().unwrap().authenticated = true;
    }

    pub(crate) fn identity(&self) -> Identity {
        let state = self.core.state.lock().unwrap();
        Identity {
            jid: state.jid.clone(),
            domain: state.domain.clone(),
        }
    }

    pub(crate) fn last_known(&self) -> Option<(String, String, Option<String>)> {
        let state = self.core.state.lock().unwrap();
        Some((state.service.clone()?, state.domain.clone()?, state.lang.clone()))
    }

    pub(crate) fn go_online(&self, jid: Jid) {
        self.set_status(Status::Online);
        self.emit(Event::Online(jid));
    }

    /// The single status transition point.
    fn set_status(&self, status: Status) {
        let changed = self.core.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            log::debug!("status {}", status);
            self.emit(Event::Status(status));
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.core.events.send(event);
    }

    pub(crate) fn emit_error(&self, error: Error) {
        log::warn!("connection error: {}", error);
        self.emit(Event::Error(Arc::new(error)));
    }

    fn framing(&self) -> Framing {
        self.core
            .state
            .lock()
            .unwrap()
            .transport
            .as_ref()
            .map(|transport| transport.framing())
            .unwrap_or(Framing::Stream)
    }

    /// Build a transport socket for `service` and attach the read
    /// pump. Resolves once the socket is connected.
    pub async fn connect(&self, service: &str) -> Result<(), Error> {
        let probed = {
            let transports = self.core.transports.lock().unwrap();
            transports
                .iter()
                .find_map(|transport| {
                    transport
                        .probe(service)
                        .map(|params| (transport.clone(), params))
                })
        };
        let Some((transport, params)) = probed else {
            return Err(Error::NoTransport(service.to_owned()));
        };
        self.detach().await;
        self.set_status(Status::Connecting);
        let socket = match transport.connect(&params).await {
            Ok(socket) => socket,
            Err(e) => {
                // Leave the connection in `disconnect` so a supervisor
                // can retry.
                self.set_status(Status::Disconnect);
                return Err(e);
            }
        };
        let (writer, reader) = socket.split();
        {
            let mut state = self.core.state.lock().unwrap();
            state.service = Some(service.to_owned());
            state.transport = Some(transport);
            state.authenticated = false;
            state.root = None;
        }
        *self.core.writer.lock().await = Some(writer);
        let pump = tokio::spawn(pump(self.clone(), reader));
        *self.core.pump.lock().unwrap() = Some(pump);
        self.set_status(Status::Connect);
        Ok(())
    }

    /// Write the stream header, attach a fresh parser and race the
    /// peer's header against [`OPEN_TIMEOUT`]. Returns the peer
    /// header.
    pub async fn open(&self, domain: &str, lang: Option<&str>) -> Result<Element, Error> {
        let transport = self
            .core
            .state
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(Error::InvalidState("open() before connect()"))?;
        {
            let mut state = self.core.state.lock().unwrap();
            state.domain = Some(domain.to_owned());
            state.lang = lang.map(str::to_owned);
            state.root = None;
        }
        // The parser is per-stream: replaced wholesale here and on
        // restart.
        *self.core.parser.lock().unwrap() = Some(TreeBuilder::new(transport.framing()));
        self.core.root_watch.send_replace(None);
        let mut root_rx = self.core.root_watch.subscribe();
        self.set_status(Status::Opening);
        self.write_raw(transport.open_header(domain, lang).to_string())
            .await?;
        let header = tokio::time::timeout(OPEN_TIMEOUT, async move {
            match root_rx.wait_for(Option::is_some).await {
                Ok(root) => root.as_ref().cloned().ok_or(Error::Disconnected),
                Err(_) => Err(Error::Disconnected),
            }
        })
        .await
        .map_err(|_| Error::Timeout)??;
        self.set_status(Status::Open);
        Ok(header)
    }

    /// Detach the parser and reopen the stream on the same socket, as
    /// required after SASL success.
    pub async fn restart(&self) -> Result<Element, Error> {
        let (domain, lang) = {
            let state = self.core.state.lock().unwrap();
            (
                state
                    .domain
                    .clone()
                    .ok_or(Error::InvalidState("restart() before open()"))?,
                state.lang.clone(),
            )
        };
        self.open(&domain, lang.as_deref()).await
    }

    /// Send one element through the outbound pipeline.
    pub async fn send(&self, element: Element) -> Result<(), Error> {
        self.send_many(vec![element]).await
    }

    /// Send several elements with a single atomic write: either the
    /// whole batch is handed to the socket in order, or nothing is.
    pub async fn send_many(&self, elements: Vec<Element>) -> Result<(), Error> {
        if self.status() == Status::Closing {
            return Err(Error::Closing);
        }
        let identity = self.identity();
        let outbound = self.core.outbound.lock().unwrap().clone();
        let framed = self.framing() == Framing::Framed;
        let mut outgoing = Vec::with_capacity(elements.len());
        for mut element in elements {
            // On framed transports every stanza is its own document
            // and must carry the content namespace.
            if framed
                && matches!(element.name(), "iq" | "message" | "presence")
                && element.attr("xmlns").is_none()
            {
                element.set_attr("xmlns", ns::CLIENT);
            }
            let ctx = StanzaContext::outgoing(&identity, &element);
            let mut dropped = false;
            for middleware in &outbound {
                match middleware.handle(&ctx, &element).await? {
                    Decision::Continue | Decision::Reply(_) => (),
                    Decision::Stop => {
                        dropped = true;
                        break;
                    }
                }
            }
            if !dropped {
                outgoing.push(element);
            }
        }
        let mut writer = self.core.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(Error::Disconnected);
        };
        for element in &outgoing {
            sink.feed(element.to_string()).await?;
        }
        sink.flush().await?;
        drop(writer);
        for element in outgoing {
            self.emit(Event::Sent(element));
        }
        Ok(())
    }

    /// Parse and send a raw XML snippet, for console-style
    /// collaborators that work in text.
    pub async fn send_raw(&self, xml: &str) -> Result<(), Error> {
        let element = Element::from_str(xml)?;
        self.send(element).await
    }

    /// Send an element and race the next inbound top-level element
    /// against `timeout`. A one-shot correlation primitive for
    /// negotiation steps that predate IQ correlation.
    pub async fn send_receive(&self, element: Element, timeout: Duration) -> Result<Element, Error> {
        let mut events = self.subscribe();
        self.send(element).await?;
        tokio::time::timeout(timeout, async move {
            loop {
                match events.recv().await {
                    Ok(Event::Element(el)) => return Ok(el),
                    Ok(Event::Error(e)) => return Err(Error::Fault(e.to_string())),
                    Ok(Event::StreamEnd(_)) => return Err(Error::Disconnected),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Disconnected),
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout)?
    }

    /// Write the stream footer and wait for the peer's, bounded by
    /// `timeout`. Sending is refused while the close is in flight.
    pub async fn close(&self, timeout: Duration) -> Result<Element, Error> {
        let transport = self
            .core
            .state
            .lock()
            .unwrap()
            .transport
            .clone()
            .ok_or(Error::InvalidState("close() before connect()"))?;
        let mut events = self.subscribe();
        self.set_status(Status::Closing);
        self.write_raw(transport.footer().to_string()).await?;
        let footer = tokio::time::timeout(timeout, async move {
            loop {
                match events.recv().await {
                    Ok(Event::StreamEnd(el)) => return Ok(el),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Disconnected),
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout)??;
        self.set_status(Status::Close);
        Ok(footer)
    }

    /// Close the socket and wait until the pump observes it going
    /// away, bounded by `timeout`.
    pub async fn disconnect(&self, timeout: Duration) -> Result<(), Error> {
        self.set_status(Status::Disconnecting);
        let had_writer = {
            let mut writer = self.core.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => {
                    let _ = sink.close().await;
                    true
                }
                None => false,
            }
        };
        if !had_writer {
            self.teardown().await;
            return Ok(());
        }
        let mut status_rx = self.core.status.subscribe();
        let observed = tokio::time::timeout(timeout, async move {
            loop {
                if *status_rx.borrow_and_update() == Status::Disconnect {
                    return;
                }
                if status_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        if observed.is_err() {
            // The peer never closed its side; drop it.
            self.detach().await;
            self.set_status(Status::Disconnect);
        }
        Ok(())
    }

    /// Orderly shutdown: close the stream, drop the socket, end up
    /// offline.
    pub async fn stop(&self) -> Result<(), Error> {
        if self.status() == Status::Offline {
            return Ok(());
        }
        let _ = self.close(CLOSE_TIMEOUT).await;
        let _ = self.disconnect(CLOSE_TIMEOUT).await;
        self.set_status(Status::Offline);
        Ok(())
    }

    async fn write_raw(&self, data: String) -> Result<(), Error> {
        let mut writer = self.core.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(Error::Disconnected);
        };
        sink.send(data).await
    }

    /// Fully detach the current socket and parser without touching the
    /// status, before attaching replacements.
    async fn detach(&self) {
        if let Some(pump) = self.core.pump.lock().unwrap().take() {
            pump.abort();
        }
        self.core.writer.lock().await.take();
        *self.core.parser.lock().unwrap() = None;
        self.core.root_watch.send_replace(None);
    }

    /// The socket went away: drop what depended on it and flag
    /// `disconnect`.
    async fn teardown(&self) {
        self.core.writer.lock().await.take();
        *self.core.parser.lock().unwrap() = None;
        self.core.root_watch.send_replace(None);
        self.core.state.lock().unwrap().root = None;
        self.set_status(Status::Disconnect);
    }

    /// Feed one socket frame through the parser and dispatch whatever
    /// completes. Parse errors are fatal for the stream.
    fn ingest(&self, frame: &str) -> Result<(), Error> {
        let mut events = Vec::new();
        {
            let mut parser = self.core.parser.lock().unwrap();
            let Some(parser) = parser.as_mut() else {
                // No stream open on this connection; drop the frame.
                return Ok(());
            };
            parser.push(frame)?;
            while let Some(event) = parser.next_event() {
                events.push(event);
            }
        }
        let framed = self.framing() == Framing::Framed;
        for event in events {
            match event {
                StreamEvent::Start(header) => self.handle_stream_start(header),
                StreamEvent::End(el) => self.handle_stream_end(el),
                StreamEvent::Element(el) => {
                    if framed && el.is("open", ns::FRAMING) {
                        self.handle_stream_start(el);
                    } else if framed && el.is("close", ns::FRAMING) {
                        self.handle_stream_end(el);
                    } else if el.name() == "stream:error" || el.is("error", ns::STREAM) {
                        self.handle_stream_error(el);
                    } else {
                        self.emit(Event::Element(el.clone()));
                        self.dispatch_inbound(el);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_stream_start(&self, header: Element) {
        self.core.state.lock().unwrap().root = Some(header.clone());
        self.core.root_watch.send_replace(Some(header.clone()));
        self.emit(Event::StreamStart(header));
    }

    fn handle_stream_end(&self, footer: Element) {
        self.core.state.lock().unwrap().root = None;
        self.emit(Event::StreamEnd(footer));
    }

    /// Stream errors are fatal. `see-other-host` gets a managed
    /// failover; everything else surfaces and forces teardown.
    fn handle_stream_error(&self, el: Element) {
        let error = StreamError::from_element(&el);
        if error.condition == "see-other-host" {
            if let Some(target) = error.condition_data.clone() {
                log::info!("see-other-host: moving to {}", target);
                let conn = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = conn.failover(&target).await {
                        conn.emit_error(e);
                    }
                });
                return;
            }
        }
        self.emit_error(Error::Stream(error));
        let conn = self.clone();
        tokio::spawn(async move {
            let _ = conn.disconnect(CLOSE_TIMEOUT).await;
        });
    }

    /// Reconnect to the host the peer redirected us to, preserving
    /// scheme, path, domain and language.
    async fn failover(&self, authority: &str) -> Result<(), Error> {
        let (service, domain, lang) = self
            .last_known()
            .ok_or(Error::InvalidState("redirect without an open stream"))?;
        let service = rewrite_authority(&service, authority)?;
        let _ = self.disconnect(CLOSE_TIMEOUT).await;
        self.connect(&service).await?;
        self.open(&domain, lang.as_deref()).await?;
        Ok(())
    }

    /// Run the inbound pipeline for one element in its own task; a
    /// concurrent element gets its own, independent invocation.
    fn dispatch_inbound(&self, element: Element) {
        let handlers = self.core.inbound.lock().unwrap().clone();
        let conn = self.clone();
        tokio::spawn(async move {
            let identity = conn.identity();
            let ctx = StanzaContext::incoming(&identity, &element);
            for middleware in handlers {
                match middleware.handle(&ctx, &element).await {
                    Ok(Decision::Continue) => continue,
                    Ok(Decision::Reply(reply)) => {
                        if let Err(e) = conn.send(reply).await {
                            conn.emit_error(e);
                        }
                        break;
                    }
                    Ok(Decision::Stop) => break,
                    Err(e) => {
                        conn.emit_error(e);
                        break;
                    }
                }
            }
        });
    }
}

/// Rewrite the authority of a service URI, for `see-other-host`.
fn rewrite_authority(service: &str, authority: &str) -> Result<String, Error> {
    let uri: http::Uri = service
        .parse()
        .map_err(|_| Error::InvalidState("service is not a valid URI"))?;
    let mut builder = http::Uri::builder().authority(authority);
    if let Some(scheme) = uri.scheme_str() {
        builder = builder.scheme(scheme);
    }
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let rewritten = builder
        .path_and_query(path_and_query)
        .build()
        .map_err(|_| Error::InvalidState("redirect target is not a valid authority"))?;
    Ok(rewritten.to_string())
}

/// The read pump: feeds socket frames into the parser until the socket
/// goes away, then tears the connection down.
async fn pump(conn: Connection, mut reader: SplitStream<BoxSocket>) {
    loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                log::trace!("<< {}", frame);
                if let Err(e) = conn.ingest(&frame) {
                    conn.emit_error(e);
                    break;
                }
            }
            Some(Err(e)) => {
                conn.emit_error(e);
                break;
            }
            None => break,
        }
    }
    conn.teardown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_authority_preserves_scheme_and_path() {
        assert_eq!(
            rewrite_authority("wss://old.example:5281/xmpp-websocket", "new.example:5282").unwrap(),
            "wss://new.example:5282/xmpp-websocket"
        );
    }

    #[test]
    fn status_displays_lowercase() {
        assert_eq!(Status::Disconnect.to_string(), "disconnect");
        assert_eq!(Status::Online.to_string(), "online");
    }
}
