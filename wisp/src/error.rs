// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Detailed error types.

use core::fmt;
use std::error::Error as StdError;
use std::io::Error as IoError;

use microdom::Element;

/// Top-level error type.
#[derive(Debug)]
pub enum Error {
    /// I/O error.
    Io(IoError),
    /// Error parsing a Jabber-Id.
    Jid(jid::Error),
    /// XML parser error; fatal for the current stream.
    Xml(microdom::Error),
    /// Local SASL mechanism error.
    Mechanism(sasl::client::MechanismError),
    /// Base64 decoding error in a SASL exchange.
    Base64(base64::DecodeError),
    /// WebSocket transport error.
    Websocket(tokio_tungstenite::tungstenite::Error),
    /// A bounded wait elapsed.
    Timeout,
    /// Connection closed.
    Disconnected,
    /// The stream is closing; nothing can be sent anymore.
    Closing,
    /// An operation was attempted in a state that does not support it.
    InvalidState(&'static str),
    /// No registered transport claims the given service address.
    NoTransport(String),
    /// No matching SASL mechanism available.
    NoMechanism,
    /// Invalid response to resource binding.
    InvalidBindResponse,
    /// `<stream:error/>` from the peer; fatal for the current stream.
    Stream(StreamError),
    /// `<error/>` reply to an IQ request; local to that request.
    Stanza(StanzaError),
    /// `<failure/>` from the peer during SASL negotiation.
    Sasl(SaslError),
    /// An error event observed while awaiting something else.
    Fault(String),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(fmt, "IO error: {}", e),
            Error::Jid(e) => write!(fmt, "jid parse error: {}", e),
            Error::Xml(e) => write!(fmt, "XML error: {}", e),
            Error::Mechanism(e) => write!(fmt, "SASL mechanism error: {}", e),
            Error::Base64(e) => write!(fmt, "base64 error: {}", e),
            Error::Websocket(e) => write!(fmt, "websocket error: {}", e),
            Error::Timeout => write!(fmt, "timed out"),
            Error::Disconnected => write!(fmt, "disconnected"),
            Error::Closing => write!(fmt, "the connection is closing"),
            Error::InvalidState(what) => write!(fmt, "invalid state: {}", what),
            Error::NoTransport(service) => {
                write!(fmt, "no transport found for service {}", service)
            }
            Error::NoMechanism => write!(fmt, "no matching SASL mechanism available"),
            Error::InvalidBindResponse => write!(fmt, "invalid response to resource binding"),
            Error::Stream(e) => write!(fmt, "{}", e),
            Error::Stanza(e) => write!(fmt, "{}", e),
            Error::Sasl(e) => write!(fmt, "{}", e),
            Error::Fault(what) => write!(fmt, "{}", what),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Jid(e) => Some(e),
            Error::Xml(e) => Some(e),
            Error::Mechanism(e) => Some(e),
            Error::Base64(e) => Some(e),
            Error::Websocket(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<jid::Error> for Error {
    fn from(e: jid::Error) -> Self {
        Error::Jid(e)
    }
}

impl From<microdom::Error> for Error {
    fn from(e: microdom::Error) -> Self {
        Error::Xml(e)
    }
}

impl From<sasl::client::MechanismError> for Error {
    fn from(e: sasl::client::MechanismError) -> Self {
        Error::Mechanism(e)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Base64(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Websocket(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

impl From<StanzaError> for Error {
    fn from(e: StanzaError) -> Self {
        Error::Stanza(e)
    }
}

impl From<SaslError> for Error {
    fn from(e: SaslError) -> Self {
        Error::Sasl(e)
    }
}

/// A `<stream:error/>` received from the peer. Always fatal for the
/// stream it arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    /// The defined condition, e.g. `system-shutdown`.
    pub condition: String,
    /// Human-readable `<text/>`, if any.
    pub text: Option<String>,
    /// Character data of the condition element itself; carries the
    /// redirect target for `see-other-host`.
    pub condition_data: Option<String>,
}

impl StreamError {
    /// Parse from the `<stream:error/>` element. The condition is the
    /// first child that is not `<text/>`; a condition-less error maps
    /// to `undefined-condition`.
    pub fn from_element(el: &Element) -> StreamError {
        let mut condition = None;
        let mut text = None;
        for child in el.children() {
            if child.local_name() == "text" {
                text = Some(child.text());
            } else if condition.is_none() {
                condition = Some(child);
            }
        }
        let (condition, condition_data) = match condition {
            Some(child) => {
                let data = child.text();
                (
                    child.local_name().to_owned(),
                    if data.is_empty() { None } else { Some(data) },
                )
            }
            None => ("undefined-condition".to_owned(), None),
        };
        StreamError {
            condition,
            text,
            condition_data,
        }
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "stream error: {}", self.condition)?;
        if let Some(text) = &self.text {
            write!(fmt, " ({})", text)?;
        }
        Ok(())
    }
}

impl StdError for StreamError {}

/// An `<error/>` child of an IQ reply. Local to the request that
/// triggered it; the stream stays usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaError {
    /// The defined condition, e.g. `item-not-found`.
    pub condition: String,
    /// The `type` attribute of `<error/>` (`cancel`, `modify`, ...).
    pub error_type: Option<String>,
    /// Human-readable `<text/>`, if any.
    pub text: Option<String>,
    /// An application-specific condition element, if any.
    pub application: Option<Element>,
}

impl StanzaError {
    /// Parse from the `<error/>` element.
    ///
    /// The children are read positionally, as the original protocol
    /// does: the first is the condition, the second is `<text/>` or an
    /// application element, the third an application element. Servers
    /// that order children differently may be misread; kept as
    /// observed.
    pub fn from_element(el: &Element) -> StanzaError {
        let children: Vec<&Element> = el.children().collect();
        let condition = children
            .first()
            .map(|child| child.local_name().to_owned())
            .unwrap_or_else(|| "undefined-condition".to_owned());
        let mut text = None;
        let mut application = None;
        if let Some(second) = children.get(1) {
            if second.local_name() == "text" {
                text = Some(second.text());
            } else {
                application = Some((*second).clone());
            }
        }
        if let Some(third) = children.get(2) {
            if application.is_none() {
                application = Some((*third).clone());
            }
        }
        StanzaError {
            condition,
            error_type: el.attr("type").map(str::to_owned),
            text,
            application,
        }
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "stanza error: {}", self.condition)?;
        if let Some(text) = &self.text {
            write!(fmt, " ({})", text)?;
        }
        Ok(())
    }
}

impl StdError for StanzaError {}

/// A `<failure/>` received during SASL negotiation. Recoverable:
/// another attempt may be made with different credentials or another
/// mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslError {
    /// The defined condition, e.g. `not-authorized`.
    pub condition: String,
    /// Human-readable `<text/>`, if any.
    pub text: Option<String>,
}

impl SaslError {
    /// Parse from the `<failure/>` element.
    pub fn from_element(el: &Element) -> SaslError {
        let mut condition = None;
        let mut text = None;
        for child in el.children() {
            if child.local_name() == "text" {
                text = Some(child.text());
            } else if condition.is_none() {
                condition = Some(child.local_name().to_owned());
            }
        }
        SaslError {
            condition: condition.unwrap_or_else(|| "not-authorized".to_owned()),
            text,
        }
    }
}

impl fmt::Display for SaslError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "SASL failure: {}", self.condition)?;
        if let Some(text) = &self.text {
            write!(fmt, " ({})", text)?;
        }
        Ok(())
    }
}

impl StdError for SaslError {}
