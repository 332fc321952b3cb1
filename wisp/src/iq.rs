// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! IQ request/response correlation and inbound query dispatch.

use core::future::Future;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::BoxFuture;
use rand::{thread_rng, Rng};
use tokio::sync::oneshot;

use microdom::Element;

use crate::connection::Connection;
use crate::context::{StanzaContext, StanzaKind};
use crate::error::{Error, StanzaError};
use crate::middleware::{Decision, Middleware};
use crate::ns;

/// Default bound for awaiting an IQ response.
pub const IQ_TIMEOUT: Duration = Duration::from_millis(30_000);

pub(crate) fn make_id() -> String {
    let id: u64 = thread_rng().gen();
    format!("{}", id)
}

type Pending = Arc<StdMutex<HashMap<String, oneshot::Sender<Result<Element, StanzaError>>>>>;

/// Sends `get`/`set` IQ requests and correlates the replies by stanza
/// id.
///
/// Doubles as the inbound middleware that routes `result`/`error` IQs
/// back to their pending requests; register a clone with
/// [`Connection::use_inbound`].
#[derive(Clone)]
pub struct IqCaller {
    connection: Connection,
    pending: Pending,
}

impl IqCaller {
    /// Create a caller for `connection`.
    pub fn new(connection: Connection) -> IqCaller {
        IqCaller {
            connection,
            pending: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Send an IQ request and await its reply, bounded by `timeout`.
    ///
    /// A non-empty random id is assigned when the stanza has none. The
    /// pending entry is removed on every exit path, so an unanswered
    /// id never leaks and a late duplicate reply falls through
    /// unhandled.
    pub async fn request(&self, mut stanza: Element, timeout: Duration) -> Result<Element, Error> {
        let id = match stanza.attr("id") {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => {
                let id = make_id();
                stanza.set_attr("id", id.clone());
                id
            }
        };
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);
        if let Err(e) = self.connection.send(stanza).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(Error::Timeout)
            }
            Ok(Err(_)) => {
                self.pending.lock().unwrap().remove(&id);
                Err(Error::Disconnected)
            }
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(stanza_error))) => Err(Error::Stanza(stanza_error)),
        }
    }

    /// Number of requests still awaiting a reply.
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl Middleware for IqCaller {
    fn handle<'a>(
        &'a self,
        ctx: &'a StanzaContext,
        stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>> {
        Box::pin(async move {
            if ctx.kind != StanzaKind::Iq
                || (ctx.stanza_type != "result" && ctx.stanza_type != "error")
                || ctx.id.is_empty()
            {
                return Ok(Decision::Continue);
            }
            let Some(tx) = self.pending.lock().unwrap().remove(&ctx.id) else {
                // Unmatched ids fall through; not an error.
                return Ok(Decision::Continue);
            };
            let outcome = if ctx.stanza_type == "error" {
                let stanza_error = stanza
                    .children()
                    .find(|child| child.local_name() == "error")
                    .map(StanzaError::from_element)
                    .unwrap_or_else(|| StanzaError {
                        condition: "undefined-condition".to_owned(),
                        error_type: None,
                        text: None,
                        application: None,
                    });
                Err(stanza_error)
            } else {
                Ok(stanza.clone())
            };
            let _ = tx.send(outcome);
            Ok(Decision::Stop)
        })
    }
}

/// The outcome of an inbound query handler: the payload of the
/// `result` reply, or `None` for an empty refusal.
pub type IqHandlerResult = Result<Option<Element>, Error>;

type IqHandler = Arc<dyn Fn(StanzaContext, Element) -> BoxFuture<'static, IqHandlerResult> + Send + Sync>;
type Handlers = Arc<StdMutex<HashMap<(String, String), IqHandler>>>;

/// Answers inbound `get`/`set` IQ queries from registered handlers.
///
/// A valid query gets exactly one reply: the handler's element as the
/// `result` payload, an `<error/>` return forwarded verbatim,
/// `service-unavailable` when the handler returns nothing or no
/// handler is registered, `internal-server-error` when it fails.
/// Malformed queries (zero or several children, or a type that is not
/// a request) are answered `bad-request` without consulting any
/// handler.
#[derive(Clone)]
pub struct IqCallee {
    connection: Connection,
    get: Handlers,
    set: Handlers,
}

impl IqCallee {
    /// Create a callee for `connection`; register a clone with
    /// [`Connection::use_inbound`].
    pub fn new(connection: Connection) -> IqCallee {
        IqCallee {
            connection,
            get: Arc::new(StdMutex::new(HashMap::new())),
            set: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Register a handler for `get` queries whose single child matches
    /// `(name, ns)`.
    pub fn get<F, Fut>(&self, ns: &str, name: &str, handler: F)
    where
        F: Fn(StanzaContext, Element) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IqHandlerResult> + Send + 'static,
    {
        Self::insert(&self.get, ns, name, handler);
    }

    /// Register a handler for `set` queries whose single child matches
    /// `(name, ns)`.
    pub fn set<F, Fut>(&self, ns: &str, name: &str, handler: F)
    where
        F: Fn(StanzaContext, Element) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IqHandlerResult> + Send + 'static,
    {
        Self::insert(&self.set, ns, name, handler);
    }

    fn insert<F, Fut>(handlers: &Handlers, ns: &str, name: &str, handler: F)
    where
        F: Fn(StanzaContext, Element) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = IqHandlerResult> + Send + 'static,
    {
        handlers.lock().unwrap().insert(
            (ns.to_owned(), name.to_owned()),
            Arc::new(move |ctx, el| Box::pin(handler(ctx, el))),
        );
    }

    fn reply(ctx: &StanzaContext, iq_type: &str) -> Element {
        let mut reply = Element::new("iq")
            .with_attr("type", iq_type)
            .with_attr("id", ctx.id.clone());
        if let Some(from) = &ctx.from {
            reply.set_attr("to", from.to_string());
        }
        reply
    }

    fn error_reply(ctx: &StanzaContext, error_type: &str, condition: &str) -> Element {
        Self::reply(ctx, "error").with_child(
            Element::new("error").with_attr("type", error_type).with_child(
                Element::new(condition).with_attr("xmlns", ns::STANZAS),
            ),
        )
    }
}

impl Middleware for IqCallee {
    fn handle<'a>(
        &'a self,
        ctx: &'a StanzaContext,
        stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>> {
        Box::pin(async move {
            if ctx.kind != StanzaKind::Iq {
                return Ok(Decision::Continue);
            }
            let handlers = match ctx.stanza_type.as_str() {
                "get" => &self.get,
                "set" => &self.set,
                // Responses belong to the caller.
                "result" | "error" => return Ok(Decision::Continue),
                _ => {
                    return Ok(Decision::Reply(Self::error_reply(
                        ctx,
                        "modify",
                        "bad-request",
                    )))
                }
            };
            let children: Vec<&Element> = stanza.children().collect();
            if children.len() != 1 {
                return Ok(Decision::Reply(Self::error_reply(
                    ctx,
                    "modify",
                    "bad-request",
                )));
            }
            let child = children[0];
            let key = (
                child.namespace().unwrap_or("").to_owned(),
                child.local_name().to_owned(),
            );
            let handler = handlers.lock().unwrap().get(&key).cloned();
            let Some(handler) = handler else {
                return Ok(Decision::Reply(Self::error_reply(
                    ctx,
                    "cancel",
                    "service-unavailable",
                )));
            };
            match handler(ctx.clone(), child.clone()).await {
                Ok(Some(el)) if el.local_name() == "error" => {
                    // An error element from the handler is forwarded
                    // as-is.
                    Ok(Decision::Reply(Self::reply(ctx, "error").with_child(el)))
                }
                Ok(Some(el)) => Ok(Decision::Reply(Self::reply(ctx, "result").with_child(el))),
                Ok(None) => Ok(Decision::Reply(Self::error_reply(
                    ctx,
                    "cancel",
                    "service-unavailable",
                ))),
                Err(e) => {
                    self.connection.emit_error(e);
                    Ok(Decision::Reply(Self::error_reply(
                        ctx,
                        "cancel",
                        "internal-server-error",
                    )))
                }
            }
        })
    }
}
