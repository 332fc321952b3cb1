// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The transport seam: header/footer framing and the socket factory.
//!
//! Transports are registered on a connection and probed in order at
//! connect time; the first transport whose [`Transport::probe`]
//! accepts the service address wins.

use futures::future::BoxFuture;
use microdom::{Element, Framing};

use crate::error::Error;
use crate::socket::BoxSocket;

/// Parameters a transport derived from a service address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketParams {
    /// The connection URI.
    pub uri: String,
}

/// A stream transport: knows how to reach a service and how the XML
/// stream is framed on it.
pub trait Transport: Send + Sync {
    /// Whether this transport can serve the given service address, and
    /// with which parameters.
    fn probe(&self, service: &str) -> Option<SocketParams>;

    /// How top-level elements are framed on this transport.
    fn framing(&self) -> Framing;

    /// The stream header element for this transport.
    fn open_header(&self, domain: &str, lang: Option<&str>) -> Element;

    /// The stream footer element for this transport.
    fn footer(&self) -> Element;

    /// Build a connected socket.
    fn connect<'a>(&'a self, params: &'a SocketParams) -> BoxFuture<'a, Result<BoxSocket, Error>>;
}
