// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small, simple DOM for the subset of XML useful for XMPP, with an
//! incremental SAX tokenizer.
//!
//! The crate has three layers:
//!
//! - [`Element`]/[`Node`]: an owned tree with insertion-ordered
//!   attributes. Elements hold no parent references; the namespace
//!   bindings of their ancestors are captured in an [`NsScope`] when
//!   an element is produced by the parser, so `namespace()` and
//!   `find_ns()` behave as if the ancestor chain were walked.
//! - [`Tokenizer`]: a chunk-fed, resumable SAX state machine emitting
//!   [`SaxEvent`]s. Feeding a document in arbitrarily small chunks
//!   yields the same event sequence as feeding it whole.
//! - [`TreeBuilder`]: a stack-based builder over the tokenizer which
//!   emits [`StreamEvent`]s: the stream header, each completed
//!   top-level payload element, and the terminal stream end.
//!
//! One tokenizer/builder instance serves exactly one stream; a fatal
//! parse error (such as a mismatched close tag) poisons it for good.

#![deny(unsafe_code, missing_docs, bare_trait_objects)]

mod builder;
mod element;
mod error;
mod tokenizer;

pub use builder::{Framing, StreamEvent, TreeBuilder};
pub use element::{escape_attribute, escape_text, Element, Node, NsScope};
pub use error::{Error, Result};
pub use tokenizer::{SaxEvent, Tokenizer};
