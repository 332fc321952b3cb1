// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use getrandom::getrandom;

use crate::client::{Mechanism, MechanismError};
use crate::common::Credentials;

/// The ANONYMOUS mechanism (RFC 4505): no credentials, a random trace
/// string as the initial response.
pub struct Anonymous {
    trace: String,
}

impl Anonymous {
    /// Construct with a freshly generated trace string.
    pub fn new() -> Result<Anonymous, MechanismError> {
        let mut rand = [0u8; 16];
        getrandom(&mut rand).map_err(|_| MechanismError::RandomFailure)?;
        let mut trace = String::with_capacity(32);
        for byte in rand {
            trace.push_str(&format!("{:02x}", byte));
        }
        Ok(Anonymous { trace })
    }
}

impl Mechanism for Anonymous {
    fn name(&self) -> &str {
        "ANONYMOUS"
    }

    fn from_credentials(_credentials: Credentials) -> Result<Anonymous, MechanismError> {
        Anonymous::new()
    }

    fn initial(&mut self) -> Vec<u8> {
        self.trace.as_bytes().to_vec()
    }
}
