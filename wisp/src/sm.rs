// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Stream Management (XEP-0198): stanza counters, acknowledgement and
//! session resumption.
//!
//! Counters are `u32` and wrap, as the XEP's mod-2^32 arithmetic
//! wants. The inbound counter counts every received iq, message and
//! presence stanza; the outbound counter counts sent stanzas and is
//! overwritten (not incremented) by the peer's `<a h=.../>`.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use microdom::Element;

use crate::connection::{Connection, Event, Status};
use crate::context::StanzaContext;
use crate::error::Error;
use crate::features::{FeatureNegotiator, Negotiation};
use crate::middleware::{Decision, Middleware};
use crate::ns;

/// Bound for the enable/resume handshakes.
const SM_TIMEOUT: Duration = Duration::from_millis(30_000);

#[derive(Debug, Default)]
struct SmState {
    allow_resume: bool,
    preferred_maximum: Option<u32>,
    enabled: bool,
    id: Option<String>,
    outbound: u32,
    inbound: u32,
    max: Option<u32>,
    offered: bool,
    resumed: bool,
}

/// The stream-management engine for one connection.
///
/// Register a clone as inbound middleware (accounting and ack
/// handling), [`outbound_counter`][`StreamManagement::outbound_counter`]
/// as outbound middleware, the engine itself as a feature negotiator
/// (resumption), and call
/// [`spawn_supervisor`][`StreamManagement::spawn_supervisor`] once to
/// enable the feature whenever the connection goes online.
#[derive(Clone)]
pub struct StreamManagement {
    connection: Connection,
    state: Arc<StdMutex<SmState>>,
}

impl StreamManagement {
    /// Create the engine. `allow_resume` asks the server to make the
    /// session resumable; `preferred_maximum` is the advertised
    /// maximum resumption time.
    pub fn new(
        connection: Connection,
        allow_resume: bool,
        preferred_maximum: Option<u32>,
    ) -> StreamManagement {
        StreamManagement {
            connection,
            state: Arc::new(StdMutex::new(SmState {
                allow_resume,
                preferred_maximum,
                ..SmState::default()
            })),
        }
    }

    /// The inbound stanza counter.
    pub fn inbound(&self) -> u32 {
        self.state.lock().unwrap().inbound
    }

    /// The outbound stanza counter.
    pub fn outbound(&self) -> u32 {
        self.state.lock().unwrap().outbound
    }

    /// Whether stream management is enabled on the current stream.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    /// The resumption token, when the server granted one.
    pub fn resumption_id(&self) -> Option<String> {
        self.state.lock().unwrap().id.clone()
    }

    /// Outbound middleware counting sent stanzas.
    pub fn outbound_counter(&self) -> Arc<dyn Middleware> {
        Arc::new(OutboundCounter {
            state: self.state.clone(),
        })
    }

    /// Watch the status channel and run the enable handshake whenever
    /// a fresh (non-resumed) stream goes online.
    pub fn spawn_supervisor(&self) -> JoinHandle<()> {
        let sm = self.clone();
        tokio::spawn(async move {
            let mut status_rx = sm.connection.status_watch();
            loop {
                if status_rx.changed().await.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                if status == Status::Online {
                    sm.on_online().await;
                }
            }
        })
    }

    async fn on_online(&self) {
        let enable = {
            let mut state = self.state.lock().unwrap();
            if state.resumed {
                // Counters survive a resumption.
                state.resumed = false;
                false
            } else {
                state.inbound = 0;
                state.outbound = 0;
                state.enabled = false;
                state.offered
            }
        };
        if enable {
            if let Err(e) = self.enable().await {
                self.connection.emit_error(e);
            }
        }
    }

    /// Send `<enable/>` and await the verdict. The outbound counter is
    /// reset right after the request is written; counting starts
    /// there, not at `<enabled/>`. A refusal is not an error.
    pub async fn enable(&self) -> Result<(), Error> {
        let (resume, max) = {
            let state = self.state.lock().unwrap();
            (state.allow_resume, state.preferred_maximum)
        };
        let mut request = Element::new("enable").with_attr("xmlns", ns::SM);
        if resume {
            request.set_attr("resume", "true");
        }
        if let Some(max) = max {
            request.set_attr("max", max.to_string());
        }
        let mut events = self.connection.subscribe();
        self.connection.send(request).await?;
        self.state.lock().unwrap().outbound = 0;
        let outcome = tokio::time::timeout(SM_TIMEOUT, async move {
            loop {
                match events.recv().await {
                    Ok(Event::Element(el)) if el.is("enabled", ns::SM) => return Some(el),
                    Ok(Event::Element(el)) if el.is("failed", ns::SM) => return None,
                    Ok(_) => (),
                    Err(RecvError::Lagged(_)) => (),
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .await;
        let mut state = self.state.lock().unwrap();
        match outcome {
            Ok(Some(enabled)) => {
                state.enabled = true;
                state.id = enabled.attr("id").map(str::to_owned);
                state.max = enabled.attr("max").and_then(|max| max.parse().ok());
                log::debug!("stream management enabled, id {:?}", state.id);
            }
            Ok(None) | Err(_) => {
                state.enabled = false;
                log::debug!("stream management not enabled");
            }
        }
        Ok(())
    }

    /// Try to resume the previous session. Only `<resumed/>` counts as
    /// success; any other outcome clears the token and reports `false`
    /// so a fresh session is negotiated instead.
    pub async fn resume(&self) -> Result<bool, Error> {
        let (h, previd) = {
            let state = self.state.lock().unwrap();
            match &state.id {
                Some(id) => (state.inbound, id.clone()),
                None => return Ok(false),
            }
        };
        let mut events = self.connection.subscribe();
        self.connection
            .send(
                Element::new("resume")
                    .with_attr("xmlns", ns::SM)
                    .with_attr("h", h.to_string())
                    .with_attr("previd", previd),
            )
            .await?;
        let outcome = tokio::time::timeout(SM_TIMEOUT, async move {
            loop {
                match events.recv().await {
                    Ok(Event::Element(el)) if el.is("resumed", ns::SM) => return Some(el),
                    Ok(Event::Element(el)) if el.is("failed", ns::SM) => return None,
                    Ok(_) => (),
                    Err(RecvError::Lagged(_)) => (),
                    Err(RecvError::Closed) => return None,
                }
            }
        })
        .await;
        let mut state = self.state.lock().unwrap();
        match outcome {
            Ok(Some(resumed)) => {
                state.enabled = true;
                state.resumed = true;
                if let Some(h) = resumed.attr("h").and_then(|h| h.parse().ok()) {
                    state.outbound = h;
                }
                log::debug!("stream resumed");
                Ok(true)
            }
            Ok(None) | Err(_) => {
                state.enabled = false;
                state.id = None;
                log::debug!("resumption refused, negotiating a fresh session");
                Ok(false)
            }
        }
    }
}

impl Middleware for StreamManagement {
    fn handle<'a>(
        &'a self,
        ctx: &'a StanzaContext,
        stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>> {
        Box::pin(async move {
            if ctx.is_stanza() {
                let mut state = self.state.lock().unwrap();
                state.inbound = state.inbound.wrapping_add(1);
                return Ok(Decision::Continue);
            }
            if stanza.is("r", ns::SM) {
                // Best effort: the reply is sent by the dispatcher.
                let h = self.state.lock().unwrap().inbound;
                return Ok(Decision::Reply(
                    Element::new("a")
                        .with_attr("xmlns", ns::SM)
                        .with_attr("h", h.to_string()),
                ));
            }
            if stanza.is("a", ns::SM) {
                if let Some(h) = stanza.attr("h").and_then(|h| h.parse().ok()) {
                    // The peer's count replaces ours.
                    self.state.lock().unwrap().outbound = h;
                }
                return Ok(Decision::Stop);
            }
            Ok(Decision::Continue)
        })
    }
}

impl FeatureNegotiator for StreamManagement {
    fn feature(&self) -> (&'static str, &'static str) {
        ("sm", ns::SM)
    }

    fn priority(&self) -> u32 {
        1500
    }

    fn negotiate<'a>(
        &'a self,
        connection: &'a Connection,
        _features: &'a Element,
        _feature: &'a Element,
    ) -> BoxFuture<'a, Result<Negotiation, Error>> {
        Box::pin(async move {
            self.state.lock().unwrap().offered = true;
            if !connection.is_authenticated() {
                return Ok(Negotiation::Done);
            }
            let resumable = {
                let state = self.state.lock().unwrap();
                state.allow_resume && state.id.is_some()
            };
            if resumable && self.resume().await? {
                // Resumption skips binding; the previous JID is still
                // ours.
                if let Some(jid) = connection.jid() {
                    connection.go_online(jid);
                }
                return Ok(Negotiation::Resumed);
            }
            Ok(Negotiation::Done)
        })
    }
}

struct OutboundCounter {
    state: Arc<StdMutex<SmState>>,
}

impl Middleware for OutboundCounter {
    fn handle<'a>(
        &'a self,
        ctx: &'a StanzaContext,
        _stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>> {
        Box::pin(async move {
            if ctx.is_stanza() {
                let mut state = self.state.lock().unwrap();
                state.outbound = state.outbound.wrapping_add(1);
            }
            Ok(Decision::Continue)
        })
    }
}
