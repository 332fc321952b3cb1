// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client-side mechanisms.

use core::fmt;

use crate::common::Credentials;

pub mod mechanisms;

/// An error which may arise inside a mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MechanismError {
    /// The mechanism requires a username which was not supplied.
    MissingUsername,
    /// The mechanism requires a password which was not supplied.
    MissingPassword,
    /// The peer sent a challenge this mechanism cannot answer.
    UnexpectedChallenge,
    /// The random generator failed while producing a trace string.
    RandomFailure,
}

impl fmt::Display for MechanismError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MechanismError::MissingUsername => write!(fmt, "the username is missing"),
            MechanismError::MissingPassword => write!(fmt, "the password is missing"),
            MechanismError::UnexpectedChallenge => {
                write!(fmt, "the mechanism cannot answer a challenge")
            }
            MechanismError::RandomFailure => {
                write!(fmt, "failed to generate random trace data")
            }
        }
    }
}

impl std::error::Error for MechanismError {}

/// A trait which defines the behaviour of a SASL mechanism from the
/// client side.
pub trait Mechanism {
    /// The name of the mechanism, as advertised by servers.
    fn name(&self) -> &str;

    /// Construct this mechanism from the supplied credentials.
    fn from_credentials(credentials: Credentials) -> Result<Self, MechanismError>
    where
        Self: Sized;

    /// The initial payload for client-first mechanisms; empty when the
    /// mechanism has nothing to say before the first challenge.
    fn initial(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Answer a server challenge.
    fn response(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, MechanismError> {
        Err(MechanismError::UnexpectedChallenge)
    }

    /// Inspect the additional data sent along a success notification.
    fn success(&mut self, _data: &[u8]) -> Result<(), MechanismError> {
        Ok(())
    }
}
