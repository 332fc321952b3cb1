// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides client-side mechanism implementations.

#[cfg(feature = "anonymous")]
mod anonymous;
mod plain;

#[cfg(feature = "anonymous")]
pub use anonymous::Anonymous;
pub use plain::Plain;
