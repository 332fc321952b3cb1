// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The abstract socket capability consumed by the connection.
//!
//! The core never opens raw TCP or TLS sockets itself: a transport
//! hands it an object that yields inbound text frames and accepts
//! outbound ones. Closing the sink ends the connection; the stream
//! ending signals the peer went away.

use core::pin::Pin;

use futures::{Sink, Stream};

use crate::error::Error;

/// A bidirectional, frame-oriented socket.
pub trait FrameSocket:
    Stream<Item = Result<String, Error>> + Sink<String, Error = Error> + Send
{
}

impl<T> FrameSocket for T where
    T: Stream<Item = Result<String, Error>> + Sink<String, Error = Error> + Send
{
}

/// A boxed [`FrameSocket`], as produced by transports.
pub type BoxSocket = Pin<Box<dyn FrameSocket>>;
