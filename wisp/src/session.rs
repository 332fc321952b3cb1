// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Legacy session establishment (RFC 3921 §3).
//!
//! Modern servers advertise the feature with `<optional/>`, in which
//! case nothing needs to be sent.

use futures::future::BoxFuture;
use microdom::Element;

use crate::connection::Connection;
use crate::error::Error;
use crate::features::{FeatureNegotiator, Negotiation};
use crate::iq::{IqCaller, IQ_TIMEOUT};
use crate::ns;

/// Negotiates the `session` feature when it is mandatory.
pub struct SessionNegotiator {
    caller: IqCaller,
}

impl SessionNegotiator {
    /// Build on the shared IQ caller.
    pub fn new(caller: IqCaller) -> SessionNegotiator {
        SessionNegotiator { caller }
    }
}

impl FeatureNegotiator for SessionNegotiator {
    fn feature(&self) -> (&'static str, &'static str) {
        ("session", ns::SESSION)
    }

    fn priority(&self) -> u32 {
        500
    }

    fn negotiate<'a>(
        &'a self,
        _connection: &'a Connection,
        _features: &'a Element,
        feature: &'a Element,
    ) -> BoxFuture<'a, Result<Negotiation, Error>> {
        Box::pin(async move {
            if feature.get_child("optional", ns::SESSION).is_some() {
                return Ok(Negotiation::Done);
            }
            let request = Element::new("iq")
                .with_attr("type", "set")
                .with_child(Element::new("session").with_attr("xmlns", ns::SESSION));
            self.caller.request(request, IQ_TIMEOUT).await?;
            Ok(Negotiation::Done)
        })
    }
}
