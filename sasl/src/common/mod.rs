// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Types shared by mechanisms.

/// Credentials offered for authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// The authentication identity, if any.
    pub username: Option<String>,
    /// The corresponding secret, if any.
    pub password: Option<String>,
}

impl Credentials {
    /// Set the username.
    pub fn with_username<U: Into<String>>(mut self, username: U) -> Credentials {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn with_password<P: Into<String>>(mut self, password: P) -> Credentials {
        self.password = Some(password.into());
        self
    }

    /// Whether both a username and a password are present.
    pub fn is_complete(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}
