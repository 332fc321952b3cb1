// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-stanza context handed to middleware.

use core::str::FromStr;

use jid::Jid;
use microdom::Element;

/// The connection identity used to fill in absent addresses.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// The bound JID, once resource binding completed.
    pub jid: Option<Jid>,
    /// The domain the stream was opened to.
    pub domain: Option<String>,
}

/// The classification of a top-level stream element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaKind {
    /// `<iq/>` request/response stanza.
    Iq,
    /// `<message/>` stanza.
    Message,
    /// `<presence/>` stanza.
    Presence,
    /// Any other stream child (features, SASL, SM acks, ...).
    Nonza,
}

/// A transient snapshot of one stanza, computed once per chain
/// invocation.
///
/// An absent `to` (inbound) or `from` (outbound) is filled in from the
/// connection's own identity; `local`/`domain`/`resource` are split
/// out of the counterpart address.
#[derive(Debug, Clone)]
pub struct StanzaContext {
    /// Classification of the element.
    pub kind: StanzaKind,
    /// The element name.
    pub name: String,
    /// The `type` attribute, defaulted per stanza kind: `normal` for
    /// messages, `available` for presence, empty otherwise.
    pub stanza_type: String,
    /// The `id` attribute, or empty.
    pub id: String,
    /// The sender.
    pub from: Option<Jid>,
    /// The recipient.
    pub to: Option<Jid>,
    /// Local part of the counterpart address.
    pub local: Option<String>,
    /// Domain part of the counterpart address.
    pub domain: Option<String>,
    /// Resource part of the counterpart address.
    pub resource: Option<String>,
}

impl StanzaContext {
    /// Context for an inbound stanza: `to` defaults to our own JID,
    /// `from` to the peer domain.
    pub fn incoming(identity: &Identity, stanza: &Element) -> StanzaContext {
        let kind = classify(stanza.name());
        let to = parse_jid(stanza.attr("to")).or_else(|| identity.jid.clone());
        let from = parse_jid(stanza.attr("from")).or_else(|| domain_jid(identity));
        let (local, domain, resource) = split(from.as_ref());
        StanzaContext {
            kind,
            name: stanza.name().to_owned(),
            stanza_type: stanza_type(kind, stanza.attr("type")),
            id: stanza.attr("id").unwrap_or("").to_owned(),
            from,
            to,
            local,
            domain,
            resource,
        }
    }

    /// Context for an outbound stanza: `from` defaults to our own JID,
    /// `to` to the peer domain.
    pub fn outgoing(identity: &Identity, stanza: &Element) -> StanzaContext {
        let kind = classify(stanza.name());
        let from = parse_jid(stanza.attr("from")).or_else(|| identity.jid.clone());
        let to = parse_jid(stanza.attr("to")).or_else(|| domain_jid(identity));
        let (local, domain, resource) = split(to.as_ref());
        StanzaContext {
            kind,
            name: stanza.name().to_owned(),
            stanza_type: stanza_type(kind, stanza.attr("type")),
            id: stanza.attr("id").unwrap_or("").to_owned(),
            from,
            to,
            local,
            domain,
            resource,
        }
    }

    /// Whether the element is an iq, message or presence stanza rather
    /// than a nonza.
    pub fn is_stanza(&self) -> bool {
        self.kind != StanzaKind::Nonza
    }
}

fn classify(name: &str) -> StanzaKind {
    match name {
        "iq" => StanzaKind::Iq,
        "message" => StanzaKind::Message,
        "presence" => StanzaKind::Presence,
        _ => StanzaKind::Nonza,
    }
}

fn stanza_type(kind: StanzaKind, attr: Option<&str>) -> String {
    match attr {
        Some(value) if !value.is_empty() => value.to_owned(),
        _ => match kind {
            StanzaKind::Message => "normal".to_owned(),
            StanzaKind::Presence => "available".to_owned(),
            _ => String::new(),
        },
    }
}

fn parse_jid(attr: Option<&str>) -> Option<Jid> {
    attr.and_then(|value| Jid::from_str(value).ok())
}

fn domain_jid(identity: &Identity) -> Option<Jid> {
    identity
        .domain
        .as_deref()
        .and_then(|domain| Jid::from_str(domain).ok())
}

fn split(jid: Option<&Jid>) -> (Option<String>, Option<String>, Option<String>) {
    match jid {
        Some(jid) => (
            jid.local().map(str::to_owned),
            Some(jid.domain().to_owned()),
            jid.resource().map(str::to_owned),
        ),
        None => (None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            jid: Some(Jid::from_str("juliet@capulet.lit/balcony").unwrap()),
            domain: Some("capulet.lit".to_owned()),
        }
    }

    #[test]
    fn type_defaults_per_kind() {
        let message: Element = "<message/>".parse().unwrap();
        let presence: Element = "<presence/>".parse().unwrap();
        let iq: Element = "<iq/>".parse().unwrap();
        let identity = identity();
        assert_eq!(
            StanzaContext::incoming(&identity, &message).stanza_type,
            "normal"
        );
        assert_eq!(
            StanzaContext::incoming(&identity, &presence).stanza_type,
            "available"
        );
        assert_eq!(StanzaContext::incoming(&identity, &iq).stanza_type, "");
    }

    #[test]
    fn inbound_fills_absent_to_from_identity() {
        let stanza: Element = "<iq from=\"romeo@montague.lit/home\" type=\"get\"/>"
            .parse()
            .unwrap();
        let ctx = StanzaContext::incoming(&identity(), &stanza);
        assert_eq!(ctx.to.unwrap().to_string(), "juliet@capulet.lit/balcony");
        assert_eq!(ctx.local.as_deref(), Some("romeo"));
        assert_eq!(ctx.domain.as_deref(), Some("montague.lit"));
        assert_eq!(ctx.resource.as_deref(), Some("home"));
    }

    #[test]
    fn inbound_from_defaults_to_peer_domain() {
        let stanza: Element = "<iq type=\"result\"/>".parse().unwrap();
        let ctx = StanzaContext::incoming(&identity(), &stanza);
        assert_eq!(ctx.from.unwrap().to_string(), "capulet.lit");
    }

    #[test]
    fn outbound_fills_absent_from_from_identity() {
        let stanza: Element = "<message to=\"romeo@montague.lit\"/>".parse().unwrap();
        let ctx = StanzaContext::outgoing(&identity(), &stanza);
        assert_eq!(ctx.from.unwrap().to_string(), "juliet@capulet.lit/balcony");
        assert_eq!(ctx.local.as_deref(), Some("romeo"));
    }

    #[test]
    fn nonzas_are_not_stanzas() {
        let features: Element =
            "<stream:features xmlns:stream=\"http://etherx.jabber.org/streams\"/>"
                .parse()
                .unwrap();
        let ctx = StanzaContext::incoming(&identity(), &features);
        assert_eq!(ctx.kind, StanzaKind::Nonza);
        assert!(!ctx.is_stanza());
    }
}
