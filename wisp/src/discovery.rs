// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Alternative connection endpoints (XEP-0156).
//!
//! Discovery I/O (host-meta lookups) is a collaborator concern; this
//! module only defines the contract: the endpoint type, the resolver
//! trait consumed when a bare domain is given, and the preference
//! order applied to whatever the resolver returns.

use futures::future::BoxFuture;

use crate::error::Error;

/// A discovered connection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// RFC 7395 WebSocket endpoint.
    Websocket,
    /// XEP-0206 BOSH endpoint.
    Xbosh,
    /// Legacy HTTP polling endpoint.
    Httppoll,
}

impl Method {
    /// Map an XEP-0156 link relation to a method.
    pub fn from_rel(rel: &str) -> Option<Method> {
        match rel {
            "urn:xmpp:alt-connections:websocket" => Some(Method::Websocket),
            "urn:xmpp:alt-connections:xbosh" => Some(Method::Xbosh),
            "urn:xmpp:alt-connections:httppoll" => Some(Method::Httppoll),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Method::Websocket => 0,
            Method::Xbosh => 1,
            Method::Httppoll => 2,
        }
    }
}

/// One alternative endpoint for a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltEndpoint {
    /// The connection method.
    pub method: Method,
    /// The endpoint URI.
    pub uri: String,
}

impl AltEndpoint {
    /// Whether the endpoint URI uses a secure scheme.
    pub fn is_secure(&self) -> bool {
        self.uri.starts_with("wss://") || self.uri.starts_with("https://")
    }
}

/// Order endpoints secure-first, then websocket > xbosh > httppoll.
pub fn sort_endpoints(endpoints: &mut [AltEndpoint]) {
    endpoints.sort_by_key(|endpoint| (!endpoint.is_secure(), endpoint.method.rank()));
}

/// Resolves a bare domain into alternative endpoints. Implemented by a
/// collaborator owning the actual lookup I/O.
pub trait EndpointResolver: Send + Sync {
    /// Look up the endpoints advertised for `domain`.
    fn resolve<'a>(&'a self, domain: &'a str) -> BoxFuture<'a, Result<Vec<AltEndpoint>, Error>>;
}
