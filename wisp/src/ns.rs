// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XML namespace constants used by the protocol core.

/// RFC 6120: `<stream:stream>` and `<stream:features>`.
pub const STREAM: &str = "http://etherx.jabber.org/streams";
/// RFC 6120: stream error conditions.
pub const STREAMS: &str = "urn:ietf:params:xml:ns:xmpp-streams";
/// RFC 6120: client stanzas.
pub const CLIENT: &str = "jabber:client";
/// RFC 6120: SASL negotiation.
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
/// RFC 6120: resource binding.
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
/// RFC 3921: legacy session establishment.
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// XEP-0198: stream management.
pub const SM: &str = "urn:xmpp:sm:3";
/// RFC 6120: stanza error conditions.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// RFC 7395: websocket framing.
pub const FRAMING: &str = "urn:ietf:params:xml:ns:xmpp-framing";
