// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Represents XMPP addresses, also known as JIDs (Jabber IDs), of the
//! form `local@domain/resource`, where both the local and the resource
//! part are optional.
//!
//! The local part is automatically escaped according to
//! [XEP-0106](https://xmpp.org/extensions/xep-0106.html) when it
//! contains unescaped reserved characters, so that addresses such as
//! `call me@example.com` can be represented on the wire.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

use core::fmt;
use core::str::FromStr;

use memchr::memchr;

mod escape;
pub use escape::{escape_local, needs_escaping, unescape_local};

/// An error that can occur when parsing or constructing a [`Jid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The domain part is missing or empty; a JID cannot exist without
    /// a domain.
    InvalidDomain,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidDomain => write!(fmt, "domain part is mandatory and must not be empty"),
        }
    }
}

impl std::error::Error for Error {}

/// An XMPP address.
///
/// Equality compares all three parts exactly; two JIDs differing only
/// in resource are not equal (use [`Jid::bare`] to compare bare
/// addresses).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// Construct a JID out of its parts.
    ///
    /// The domain is mandatory and lower-cased. The local part is
    /// lower-cased as well, and escaped per XEP-0106 when it contains
    /// unescaped reserved characters. The resource is kept verbatim.
    pub fn new(
        local: Option<&str>,
        domain: &str,
        resource: Option<&str>,
    ) -> Result<Jid, Error> {
        if domain.is_empty() {
            return Err(Error::InvalidDomain);
        }
        let local = local.map(|local| {
            let local = if needs_escaping(local) {
                escape_local(local)
            } else {
                local.to_owned()
            };
            local.to_lowercase()
        });
        Ok(Jid {
            local,
            domain: domain.to_lowercase(),
            resource: resource.map(str::to_owned),
        })
    }

    /// Construct a bare JID (`local@domain`).
    pub fn bare_new(local: Option<&str>, domain: &str) -> Result<Jid, Error> {
        Jid::new(local, domain, None)
    }

    /// The local part, if any, in its escaped form.
    pub fn local(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// The domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The resource part, if any.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Whether this JID carries no resource.
    pub fn is_bare(&self) -> bool {
        self.resource.is_none()
    }

    /// This JID without its resource; returns a clone of `self` when it
    /// is already bare.
    pub fn bare(&self) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Replace the resource part.
    pub fn with_resource(&self, resource: &str) -> Jid {
        Jid {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: Some(resource.to_owned()),
        }
    }

    /// Render the JID with the local part unescaped, for display to
    /// humans. The wire form is produced by [`fmt::Display`].
    pub fn to_unescaped_string(&self) -> String {
        let mut out = String::new();
        if let Some(local) = &self.local {
            out.push_str(&unescape_local(local));
            out.push('@');
        }
        out.push_str(&self.domain);
        if let Some(resource) = &self.resource {
            out.push('/');
            out.push_str(resource);
        }
        out
    }
}

impl FromStr for Jid {
    type Err = Error;

    /// Parse a JID from its string form. The resource is everything
    /// after the first `/`; the local part is everything before the
    /// first `@` of the remainder.
    fn from_str(s: &str) -> Result<Jid, Error> {
        let bytes = s.as_bytes();
        let (rest, resource) = match memchr(b'/', bytes) {
            Some(pos) => (&s[..pos], Some(&s[pos + 1..])),
            None => (s, None),
        };
        let (local, domain) = match memchr(b'@', rest.as_bytes()) {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };
        Jid::new(local, domain, resource)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(local) = &self.local {
            write!(fmt, "{}@", local)?;
        }
        fmt.write_str(&self.domain)?;
        if let Some(resource) = &self.resource {
            write!(fmt, "/{}", resource)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> Jid {
        Jid::from_str(s).unwrap()
    }

    #[test]
    fn parses_all_forms() {
        let full = jid("juliet@capulet.lit/balcony");
        assert_eq!(full.local(), Some("juliet"));
        assert_eq!(full.domain(), "capulet.lit");
        assert_eq!(full.resource(), Some("balcony"));

        let bare = jid("juliet@capulet.lit");
        assert_eq!(bare.resource(), None);
        assert!(bare.is_bare());

        let domain = jid("capulet.lit");
        assert_eq!(domain.local(), None);
        assert_eq!(domain.domain(), "capulet.lit");
    }

    #[test]
    fn resource_splits_at_first_slash_only() {
        let j = jid("juliet@capulet.lit/peer/balcony");
        assert_eq!(j.resource(), Some("peer/balcony"));
    }

    #[test]
    fn local_splits_at_first_at_only() {
        let j = jid("here\\40there@capulet.lit");
        assert_eq!(j.local(), Some("here\\40there"));
        assert_eq!(j.domain(), "capulet.lit");
    }

    #[test]
    fn empty_domain_is_rejected() {
        assert_eq!(Jid::from_str(""), Err(Error::InvalidDomain));
        assert_eq!(Jid::from_str("juliet@"), Err(Error::InvalidDomain));
        assert_eq!(Jid::new(None, "", None), Err(Error::InvalidDomain));
    }

    #[test]
    fn local_and_domain_are_lowercased() {
        let j = jid("JULIET@Capulet.LIT/Balcony");
        assert_eq!(j.local(), Some("juliet"));
        assert_eq!(j.domain(), "capulet.lit");
        // The resource is case-sensitive.
        assert_eq!(j.resource(), Some("Balcony"));
    }

    #[test]
    fn local_is_auto_escaped() {
        let j = Jid::new(Some("call me"), "example.com", None).unwrap();
        assert_eq!(j.local(), Some("call\\20me"));
        assert_eq!(j.to_string(), "call\\20me@example.com");
        assert_eq!(j.to_unescaped_string(), "call me@example.com");
    }

    #[test]
    fn escaped_local_is_not_escaped_twice() {
        let j = Jid::new(Some("call\\20me"), "example.com", None).unwrap();
        assert_eq!(j.local(), Some("call\\20me"));
    }

    #[test]
    fn display_round_trips() {
        for s in [
            "juliet@capulet.lit/balcony",
            "juliet@capulet.lit",
            "capulet.lit",
            "capulet.lit/balcony",
            "call\\20me@example.com",
        ] {
            let j = jid(s);
            assert_eq!(Jid::from_str(&j.to_string()).unwrap(), j);
        }
    }

    #[test]
    fn bare_drops_resource() {
        let j = jid("juliet@capulet.lit/balcony");
        assert_eq!(j.bare(), jid("juliet@capulet.lit"));
        // Identity on an already-bare JID.
        assert_eq!(j.bare().bare(), j.bare());
    }

    #[test]
    fn equality_is_exact() {
        assert_eq!(jid("a@b/c"), jid("a@b/c"));
        assert_ne!(jid("a@b/c"), jid("a@b"));
        assert_ne!(jid("a@b"), jid("b"));
        assert_ne!(jid("a@b/c"), jid("a@b/d"));
    }
}
