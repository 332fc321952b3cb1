// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The middleware pipeline.
//!
//! Inbound and outbound stanzas run through an ordered chain of
//! handlers, each of which may pass the stanza on, answer it, or end
//! the chain. The chain is composed by a fixed dispatcher in the
//! connection: every inbound element gets its own independent chain
//! invocation (no global serialization), handler errors are caught
//! there and surfaced as an `error` event, and a [`Decision::Reply`]
//! is sent automatically.

use futures::future::BoxFuture;
use microdom::Element;

use crate::context::StanzaContext;
use crate::error::Error;

/// What a handler decided about a stanza.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Not interested; hand the stanza to the next handler.
    Continue,
    /// Answer with the given element and end the chain.
    Reply(Element),
    /// Consumed; end the chain without an answer.
    Stop,
}

/// One handler in the pipeline.
pub trait Middleware: Send + Sync {
    /// Inspect one stanza. Shared state behind a handler must tolerate
    /// interleaving: chain invocations for concurrently arriving
    /// elements overlap freely, only the observation order of elements
    /// is fixed.
    fn handle<'a>(
        &'a self,
        ctx: &'a StanzaContext,
        stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>>;
}
