// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! SASL authentication over the `mechanisms` stream feature.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;

use sasl::client::mechanisms::{Anonymous, Plain};
use sasl::client::Mechanism;
use sasl::common::Credentials;

use microdom::Element;

use crate::connection::{Connection, Event};
use crate::error::{Error, SaslError};
use crate::features::{FeatureNegotiator, Negotiation};
use crate::ns;

/// Bound for each SASL round trip.
const SASL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Asynchronous credentials source: called with the mechanism names
/// offered by the server (in server order) to choose or confirm
/// credentials.
pub type CredentialsHook =
    Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, Result<Credentials, Error>> + Send + Sync>;

/// Negotiates the `mechanisms` feature.
///
/// The mechanism is the first mutually supported name in
/// server-advertised order, so server preference wins; that is not
/// necessarily strongest-first. Without credentials the negotiator
/// falls back to ANONYMOUS when offered.
pub struct SaslNegotiator {
    credentials: Option<Credentials>,
    hook: Option<CredentialsHook>,
}

impl SaslNegotiator {
    /// Build from fixed credentials and/or an asynchronous hook; the
    /// hook wins when both are given.
    pub fn new(credentials: Option<Credentials>, hook: Option<CredentialsHook>) -> SaslNegotiator {
        SaslNegotiator { credentials, hook }
    }

    async fn pick_credentials(&self, offered: &[String]) -> Result<Credentials, Error> {
        match &self.hook {
            Some(hook) => hook(offered.to_vec()).await,
            None => Ok(self.credentials.clone().unwrap_or_default()),
        }
    }
}

fn supported(credentials: &Credentials) -> Vec<&'static str> {
    if credentials.is_complete() {
        vec!["PLAIN"]
    } else {
        vec!["ANONYMOUS"]
    }
}

/// First offered name that we also support, in server order.
fn intersect(offered: &[String], supported: &[&str]) -> Option<String> {
    offered
        .iter()
        .find(|name| supported.contains(&name.as_str()))
        .cloned()
}

fn encode(payload: &[u8]) -> String {
    if payload.is_empty() {
        // An empty initial response is transmitted as "=".
        "=".to_owned()
    } else {
        BASE64.encode(payload)
    }
}

fn decode(text: &str) -> Result<Vec<u8>, Error> {
    if text.is_empty() || text == "=" {
        Ok(Vec::new())
    } else {
        Ok(BASE64.decode(text)?)
    }
}

impl FeatureNegotiator for SaslNegotiator {
    fn feature(&self) -> (&'static str, &'static str) {
        ("mechanisms", ns::SASL)
    }

    fn priority(&self) -> u32 {
        3000
    }

    fn negotiate<'a>(
        &'a self,
        connection: &'a Connection,
        _features: &'a Element,
        feature: &'a Element,
    ) -> BoxFuture<'a, Result<Negotiation, Error>> {
        Box::pin(async move {
            if connection.is_authenticated() {
                return Ok(Negotiation::Done);
            }
            let offered: Vec<String> = feature
                .get_children("mechanism", ns::SASL)
                .map(|mechanism| mechanism.text())
                .collect();
            let credentials = self.pick_credentials(&offered).await?;
            let Some(name) = intersect(&offered, &supported(&credentials)) else {
                return Err(Error::NoMechanism);
            };
            let mut mechanism: Box<dyn Mechanism + Send> = match name.as_str() {
                "PLAIN" => Box::new(Plain::from_credentials(credentials)?),
                "ANONYMOUS" => Box::new(Anonymous::new()?),
                _ => return Err(Error::NoMechanism),
            };

            // Subscribe before sending so no reply can be missed.
            let mut events = connection.subscribe();
            let auth = Element::new("auth")
                .with_attr("xmlns", ns::SASL)
                .with_attr("mechanism", name.clone())
                .with_text(encode(&mechanism.initial()));
            connection.send(auth).await?;

            tokio::time::timeout(SASL_TIMEOUT, async {
                loop {
                    match events.recv().await {
                        Ok(Event::Element(el)) => {
                            if el.is("challenge", ns::SASL) {
                                let challenge = decode(&el.text())?;
                                let response = mechanism.response(&challenge)?;
                                connection
                                    .send(
                                        Element::new("response")
                                            .with_attr("xmlns", ns::SASL)
                                            .with_text(encode(&response)),
                                    )
                                    .await?;
                            } else if el.is("success", ns::SASL) {
                                mechanism.success(&decode(&el.text())?)?;
                                return Ok(());
                            } else if el.is("failure", ns::SASL) {
                                return Err(Error::Sasl(SaslError::from_element(&el)));
                            }
                        }
                        Ok(_) => (),
                        Err(RecvError::Lagged(_)) => (),
                        Err(RecvError::Closed) => return Err(Error::Disconnected),
                    }
                }
            })
            .await
            .map_err(|_| Error::Timeout)??;

            log::debug!("authenticated via {}", name);
            connection.set_authenticated();
            // RFC 6120: the stream restarts after SASL success.
            connection.restart().await?;
            Ok(Negotiation::Restarted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_follows_server_order() {
        let offered = vec![
            "SCRAM-SHA-1".to_owned(),
            "ANONYMOUS".to_owned(),
            "PLAIN".to_owned(),
        ];
        assert_eq!(
            intersect(&offered, &["PLAIN", "ANONYMOUS"]),
            Some("ANONYMOUS".to_owned())
        );
        assert_eq!(intersect(&offered, &["PLAIN"]), Some("PLAIN".to_owned()));
        assert_eq!(intersect(&offered, &["EXTERNAL"]), None);
    }

    #[test]
    fn empty_payload_encodes_as_equals() {
        assert_eq!(encode(b""), "=");
        assert_eq!(encode(b"\0u\0p"), "AHUAcA==");
        assert_eq!(decode("=").unwrap(), b"");
        assert_eq!(decode("AHUAcA==").unwrap(), b"\0u\0p");
    }

    #[test]
    fn credentials_pick_the_mechanism_set() {
        let full = Credentials::default().with_username("u").with_password("p");
        assert_eq!(supported(&full), ["PLAIN"]);
        assert_eq!(supported(&Credentials::default()), ["ANONYMOUS"]);
    }
}
