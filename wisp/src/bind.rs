// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Resource binding (RFC 6120 §7), built on the IQ caller.

use core::str::FromStr;

use futures::future::BoxFuture;

use jid::Jid;
use microdom::Element;

use crate::connection::Connection;
use crate::error::Error;
use crate::features::{FeatureNegotiator, Negotiation};
use crate::iq::{IqCaller, IQ_TIMEOUT};
use crate::ns;

/// Negotiates the `bind` feature: requests a resource (the server may
/// override it) and records the resulting JID on the connection.
pub struct BindNegotiator {
    caller: IqCaller,
    resource: Option<String>,
}

impl BindNegotiator {
    /// Build with the resource to ask for; `None` lets the server
    /// pick.
    pub fn new(caller: IqCaller, resource: Option<String>) -> BindNegotiator {
        BindNegotiator { caller, resource }
    }
}

impl FeatureNegotiator for BindNegotiator {
    fn feature(&self) -> (&'static str, &'static str) {
        ("bind", ns::BIND)
    }

    fn priority(&self) -> u32 {
        1000
    }

    fn negotiate<'a>(
        &'a self,
        connection: &'a Connection,
        _features: &'a Element,
        _feature: &'a Element,
    ) -> BoxFuture<'a, Result<Negotiation, Error>> {
        Box::pin(async move {
            let mut bind = Element::new("bind").with_attr("xmlns", ns::BIND);
            if let Some(resource) = &self.resource {
                bind.append(Element::new("resource").with_text(resource.clone()));
            }
            let request = Element::new("iq").with_attr("type", "set").with_child(bind);
            let reply = self.caller.request(request, IQ_TIMEOUT).await?;
            let jid = reply
                .get_child("bind", ns::BIND)
                .and_then(|bind| bind.get_child("jid", ns::BIND))
                .map(|jid| jid.text())
                .ok_or(Error::InvalidBindResponse)?;
            let jid = Jid::from_str(jid.trim())?;
            log::debug!("bound to {}", jid);
            connection.set_jid(jid);
            Ok(Negotiation::Done)
        })
    }
}
