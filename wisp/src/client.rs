// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The wired-up client: a connection with the standard pipeline and
//! negotiators attached.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use jid::Jid;
use microdom::Element;
use sasl::common::Credentials;

use crate::auth::{CredentialsHook, SaslNegotiator};
use crate::bind::BindNegotiator;
use crate::connection::{Connection, Event};
use crate::discovery::{sort_endpoints, EndpointResolver};
use crate::error::Error;
use crate::features::{FeatureNegotiator, StreamFeatures};
use crate::iq::{IqCallee, IqCaller};
use crate::reconnect::{Reconnect, RECONNECT_DELAY};
use crate::session::SessionNegotiator;
use crate::sm::StreamManagement;
use crate::transport::Transport;
use crate::websocket::WebSocketTransport;

/// Per-instance client configuration. Nothing here is shared between
/// instances; every knob is explicit.
pub struct ClientOptions {
    /// Service address: a `ws://`/`wss://` URI, or a bare domain to be
    /// resolved through `resolver`.
    pub service: String,
    /// Stream `to` domain; derived from the service when absent.
    pub domain: Option<String>,
    /// Resource to request at binding; the server may override it.
    pub resource: Option<String>,
    /// Stream language (`xml:lang`).
    pub lang: Option<String>,
    /// Fixed credentials for SASL.
    pub credentials: Option<Credentials>,
    /// Asynchronous credentials callback; wins over `credentials`.
    pub credentials_hook: Option<CredentialsHook>,
    /// Ask for a resumable stream (XEP-0198).
    pub resume: bool,
    /// Preferred maximum resumption time, in seconds.
    pub preferred_maximum: Option<u32>,
    /// Supervise the connection and retry after disconnects.
    pub reconnect: bool,
    /// Delay between disconnect and retry.
    pub reconnect_delay: Duration,
    /// Endpoint resolver for bare-domain services.
    pub resolver: Option<Arc<dyn EndpointResolver>>,
}

impl ClientOptions {
    /// Options for a service with defaults everywhere else.
    pub fn new(service: impl Into<String>) -> ClientOptions {
        ClientOptions {
            service: service.into(),
            domain: None,
            resource: None,
            lang: None,
            credentials: None,
            credentials_hook: None,
            resume: true,
            preferred_maximum: None,
            reconnect: true,
            reconnect_delay: RECONNECT_DELAY,
            resolver: None,
        }
    }
}

/// An XMPP client over the WebSocket transport, with IQ correlation,
/// stream-features negotiation (SASL, bind, session), stream
/// management and a reconnect supervisor wired in.
pub struct Client {
    connection: Connection,
    caller: IqCaller,
    callee: IqCallee,
    sm: StreamManagement,
    reconnect: Reconnect,
    service: String,
    domain: Option<String>,
    lang: Option<String>,
    reconnect_enabled: bool,
    resolver: Option<Arc<dyn EndpointResolver>>,
}

impl Client {
    /// Wire a client from its options.
    pub fn new(options: ClientOptions) -> Client {
        Self::with_transport(options, Arc::new(WebSocketTransport))
    }

    /// Wire a client on a specific transport (the WebSocket transport
    /// is the default).
    pub fn with_transport(options: ClientOptions, transport: Arc<dyn Transport>) -> Client {
        let connection = Connection::new();
        connection.register_transport(transport);
        let caller = IqCaller::new(connection.clone());
        let callee = IqCallee::new(connection.clone());
        let sm = StreamManagement::new(
            connection.clone(),
            options.resume,
            options.preferred_maximum,
        );

        // Inbound order: accounting first, then correlation, then
        // query dispatch, then negotiation.
        connection.use_inbound(Arc::new(sm.clone()));
        connection.use_inbound(Arc::new(caller.clone()));
        connection.use_inbound(Arc::new(callee.clone()));
        let negotiators: Vec<Arc<dyn FeatureNegotiator>> = vec![
            Arc::new(SaslNegotiator::new(
                options.credentials.clone(),
                options.credentials_hook.clone(),
            )),
            Arc::new(sm.clone()),
            Arc::new(BindNegotiator::new(
                caller.clone(),
                options.resource.clone(),
            )),
            Arc::new(SessionNegotiator::new(caller.clone())),
        ];
        connection.use_inbound(Arc::new(StreamFeatures::new(
            connection.clone(),
            negotiators,
        )));
        connection.use_outbound(sm.outbound_counter());
        sm.spawn_supervisor();

        Client {
            connection,
            caller,
            callee,
            sm,
            reconnect: Reconnect::new(options.reconnect_delay),
            service: options.service,
            domain: options.domain,
            lang: options.lang,
            reconnect_enabled: options.reconnect,
            resolver: options.resolver,
        }
    }

    /// Connect, open the stream and wait until negotiation finishes.
    /// Resolves with the bound JID.
    pub async fn start(&self) -> Result<Jid, Error> {
        let service = self.resolve_service().await?;
        let domain = match &self.domain {
            Some(domain) => domain.clone(),
            None => host_of(&service).ok_or(Error::InvalidState(
                "cannot derive a domain from the service address",
            ))?,
        };
        if self.reconnect_enabled {
            self.reconnect.start(&self.connection);
        }
        let mut events = self.connection.subscribe();
        self.connection.connect(&service).await?;
        self.connection.open(&domain, self.lang.as_deref()).await?;
        loop {
            match events.recv().await {
                Ok(Event::Online(jid)) => return Ok(jid),
                Ok(Event::Error(e)) => return Err(Error::Fault(e.to_string())),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(Error::Disconnected),
            }
        }
    }

    /// Orderly shutdown: detach the supervisor, close the stream,
    /// drop the socket.
    pub async fn stop(&self) -> Result<(), Error> {
        self.reconnect.stop();
        self.connection.stop().await
    }

    /// Send a stanza.
    pub async fn send(&self, element: Element) -> Result<(), Error> {
        self.connection.send(element).await
    }

    /// Subscribe to connection events.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.connection.subscribe()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The IQ request side.
    pub fn iq_caller(&self) -> &IqCaller {
        &self.caller
    }

    /// The IQ answering side.
    pub fn iq_callee(&self) -> &IqCallee {
        &self.callee
    }

    /// The stream-management engine.
    pub fn stream_management(&self) -> &StreamManagement {
        &self.sm
    }

    async fn resolve_service(&self) -> Result<String, Error> {
        if self.service.contains("://") {
            return Ok(self.service.clone());
        }
        // A bare domain: ask the discovery collaborator for
        // alternative endpoints and take the most preferred one.
        let Some(resolver) = &self.resolver else {
            return Err(Error::NoTransport(self.service.clone()));
        };
        let mut endpoints = resolver.resolve(&self.service).await?;
        sort_endpoints(&mut endpoints);
        endpoints
            .into_iter()
            .next()
            .map(|endpoint| endpoint.uri)
            .ok_or_else(|| Error::NoTransport(self.service.clone()))
    }
}

fn host_of(service: &str) -> Option<String> {
    service
        .parse::<http::Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_owned))
}
