// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Routes `<stream:features/>` children to registered negotiators.

use futures::future::BoxFuture;
use microdom::Element;

use crate::connection::Connection;
use crate::context::StanzaContext;
use crate::error::Error;
use crate::middleware::{Decision, Middleware};
use crate::ns;

/// How a negotiator left the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The feature was handled (or skipped); keep routing.
    Done,
    /// The stream was restarted; stop routing, fresh features are on
    /// their way.
    Restarted,
    /// A previous session was resumed; stop routing, the stream is
    /// already online.
    Resumed,
}

/// One stream-feature negotiator, selected by the `(name, ns)` of the
/// feature child it handles.
pub trait FeatureNegotiator: Send + Sync {
    /// `(name, namespace)` of the feature child this negotiator
    /// claims.
    fn feature(&self) -> (&'static str, &'static str);

    /// Routing priority; higher runs earlier.
    fn priority(&self) -> u32;

    /// Negotiate the claimed feature.
    fn negotiate<'a>(
        &'a self,
        connection: &'a Connection,
        features: &'a Element,
        feature: &'a Element,
    ) -> BoxFuture<'a, Result<Negotiation, Error>>;
}

/// Middleware routing each `<stream:features/>` nonza through the
/// registered negotiators in priority order. When routing completes
/// with the stream authenticated and bound, the connection goes
/// online.
pub struct StreamFeatures {
    connection: Connection,
    negotiators: Vec<std::sync::Arc<dyn FeatureNegotiator>>,
}

impl StreamFeatures {
    /// Wire a router for `connection`; register it with
    /// [`Connection::use_inbound`].
    pub fn new(
        connection: Connection,
        mut negotiators: Vec<std::sync::Arc<dyn FeatureNegotiator>>,
    ) -> StreamFeatures {
        negotiators.sort_by(|a, b| b.priority().cmp(&a.priority()));
        StreamFeatures {
            connection,
            negotiators,
        }
    }
}

impl Middleware for StreamFeatures {
    fn handle<'a>(
        &'a self,
        _ctx: &'a StanzaContext,
        stanza: &'a Element,
    ) -> BoxFuture<'a, Result<Decision, Error>> {
        Box::pin(async move {
            if !stanza.is("features", ns::STREAM) {
                return Ok(Decision::Continue);
            }
            for negotiator in &self.negotiators {
                let (name, feature_ns) = negotiator.feature();
                let Some(feature) = stanza.get_child(name, feature_ns) else {
                    continue;
                };
                match negotiator
                    .negotiate(&self.connection, stanza, feature)
                    .await?
                {
                    Negotiation::Done => (),
                    Negotiation::Restarted | Negotiation::Resumed => {
                        return Ok(Decision::Stop);
                    }
                }
            }
            // Routing ran to completion on this stream: it is ready
            // once authenticated and bound.
            if self.connection.is_authenticated() {
                if let Some(jid) = self.connection.jid() {
                    self.connection.go_online(jid);
                }
            }
            Ok(Decision::Stop)
        })
    }
}
