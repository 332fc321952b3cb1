// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! This crate provides the client side of SASL authentication
//! exchanges: credentials, the [`client::Mechanism`] trait, and the
//! PLAIN and ANONYMOUS mechanisms.
//!
//! The crate is transport-agnostic; mechanisms consume and produce raw
//! octet strings, and whatever encoding the protocol requires (base64
//! for XMPP) is applied by the caller.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

pub mod client;
pub mod common;
