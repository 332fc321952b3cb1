// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::client::{Mechanism, MechanismError};
use crate::common::Credentials;

/// The PLAIN mechanism (RFC 4616): the credentials travel in clear,
/// `NUL authcid NUL passwd`, as the initial response.
pub struct Plain {
    username: String,
    password: String,
}

impl Plain {
    /// Construct from a username and password pair.
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Plain {
        Plain {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &str {
        "PLAIN"
    }

    fn from_credentials(credentials: Credentials) -> Result<Plain, MechanismError> {
        let username = credentials
            .username
            .ok_or(MechanismError::MissingUsername)?;
        let password = credentials
            .password
            .ok_or(MechanismError::MissingPassword)?;
        Ok(Plain::new(username, password))
    }

    fn initial(&mut self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.username.len() + self.password.len() + 2);
        payload.push(0);
        payload.extend_from_slice(self.username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.password.as_bytes());
        payload
    }
}
