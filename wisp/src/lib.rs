// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Asynchronous, WebSocket-first [XMPP](https://xmpp.org/) client core
//! with [tokio](https://tokio.rs/).
//!
//! The crate implements the client side of the RFC 6120 wire protocol
//! over an abstract frame socket: stream lifecycle
//! ([`Connection`]), RFC 7395 WebSocket framing
//! ([`websocket::WebSocketTransport`]), a middleware pipeline over
//! inbound and outbound stanzas, IQ request/response correlation
//! ([`iq::IqCaller`]/[`iq::IqCallee`]), stream-features negotiation
//! (SASL, resource binding, session establishment), XEP-0198 Stream
//! Management ([`sm::StreamManagement`]) and a reconnect supervisor
//! ([`reconnect::Reconnect`]).
//!
//! # Getting started
//!
//! In most cases you want a [`Client`], which wires all of the above
//! onto one connection:
//!
//! ```no_run
//! use sasl::common::Credentials;
//! use wisp::{Client, ClientOptions};
//!
//! # async fn run() -> Result<(), wisp::Error> {
//! let mut options = ClientOptions::new("wss://xmpp.example.com:5281/xmpp-websocket");
//! options.credentials =
//!     Some(Credentials::default().with_username("juliet").with_password("secret"));
//! options.resource = Some("balcony".to_owned());
//! let client = Client::new(options);
//! let jid = client.start().await?;
//! println!("online as {}", jid);
//! # Ok(())
//! # }
//! ```
//!
//! Supported:
//! - [x] Clients
//! - [ ] Servers
//!
//! Supported transports:
//! - [x] WebSocket (RFC 7395)
//! - [x] Custom transports via the [`transport::Transport`] trait
//! - [ ] BOSH

#![deny(unsafe_code, bare_trait_objects)]
#![warn(missing_docs)]

pub mod auth;
pub mod bind;
pub mod client;
pub mod connection;
pub mod context;
pub mod discovery;
pub mod error;
pub mod features;
pub mod iq;
pub mod middleware;
pub mod ns;
pub mod reconnect;
pub mod session;
pub mod sm;
pub mod socket;
pub mod transport;
pub mod websocket;

pub use client::{Client, ClientOptions};
pub use connection::{Connection, Event, Status};
pub use error::Error;

// Re-exports
pub use jid;
pub use microdom;

#[cfg(test)]
mod test_util;
#[cfg(test)]
mod tests;
