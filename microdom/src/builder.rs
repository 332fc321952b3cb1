// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A stack-based tree builder on top of the [`Tokenizer`], producing
//! stream-level events.
//!
//! In [`Framing::Stream`] mode the first element is the stream root:
//! its open tag is reported as [`StreamEvent::Start`] (the stream
//! header), each completed direct child is reported once as
//! [`StreamEvent::Element`] — the unit of stanza dispatch — and the
//! root's own close tag is the terminal [`StreamEvent::End`]. Children
//! are never accumulated into the root, so the stream can run
//! unbounded.
//!
//! In [`Framing::Framed`] mode every top-level element is a complete
//! document of its own and is reported as [`StreamEvent::Element`];
//! framed transports map their open/close frames themselves.

use std::collections::VecDeque;

use crate::element::{Element, NsScope};
use crate::error::{Error, Result};
use crate::tokenizer::{SaxEvent, Tokenizer};

/// How top-level elements relate to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One outer document element whose children are the stream units
    /// (RFC 6120 `<stream:stream>`).
    Stream,
    /// Every top-level element is its own document (RFC 7395 frames).
    Framed,
}

/// A stream-level parse event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The stream root opened; carries the header element (stream mode
    /// only).
    Start(Element),
    /// A complete top-level payload element.
    Element(Element),
    /// The stream root closed; carries the (childless) root element
    /// (stream mode only).
    End(Element),
}

/// Incremental parser producing [`StreamEvent`]s from chunks of XML.
///
/// Like the tokenizer it wraps, a builder serves exactly one stream
/// and refuses input after a fatal error.
#[derive(Debug)]
pub struct TreeBuilder {
    tokenizer: Tokenizer,
    framing: Framing,
    root: Option<Element>,
    base_scope: NsScope,
    stack: Vec<Element>,
    scopes: Vec<NsScope>,
    events: VecDeque<StreamEvent>,
    closed: bool,
    failed: bool,
}

impl TreeBuilder {
    /// Create a builder for one stream.
    pub fn new(framing: Framing) -> TreeBuilder {
        TreeBuilder {
            tokenizer: Tokenizer::new(),
            framing,
            root: None,
            base_scope: NsScope::default(),
            stack: Vec::new(),
            scopes: Vec::new(),
            events: VecDeque::new(),
            closed: false,
            failed: false,
        }
    }

    /// Feed a chunk of the stream and process every token it
    /// completes.
    pub fn push(&mut self, chunk: &str) -> Result<()> {
        if self.failed {
            return Err(Error::ParserDone);
        }
        if let Err(e) = self.push_inner(chunk) {
            self.failed = true;
            return Err(e);
        }
        Ok(())
    }

    fn push_inner(&mut self, chunk: &str) -> Result<()> {
        self.tokenizer.push(chunk)?;
        while let Some(event) = self.tokenizer.next_event() {
            self.handle(event)?;
        }
        Ok(())
    }

    /// Pop the next queued stream event, if any.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    /// The stream header, while a stream is open (stream mode).
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    fn inherited(&self) -> NsScope {
        match self.scopes.last() {
            Some(scope) => scope.clone(),
            None => self.base_scope.clone(),
        }
    }

    fn handle(&mut self, event: SaxEvent) -> Result<()> {
        if self.closed {
            return match event {
                // Trailing whitespace after the footer is harmless.
                SaxEvent::Text(text) if text.trim().is_empty() => Ok(()),
                _ => Err(Error::InvalidMarkup("content after end of stream")),
            };
        }
        match event {
            SaxEvent::StartTag { name, attrs } => {
                let mut el = Element::new(name);
                for (attr, value) in attrs {
                    el.set_attr(attr, value);
                }
                if self.framing == Framing::Stream && self.root.is_none() && self.stack.is_empty()
                {
                    // The stream root. Not kept on the stack: its
                    // children are emitted individually instead of
                    // being collected.
                    el.set_scope(NsScope::default());
                    self.base_scope = NsScope::default().for_child_of(&el);
                    self.root = Some(el.clone());
                    self.events.push_back(StreamEvent::Start(el));
                    return Ok(());
                }
                let inherited = self.inherited();
                el.set_scope(inherited.clone());
                self.scopes.push(inherited.for_child_of(&el));
                self.stack.push(el);
            }

            SaxEvent::EndTag { name } => {
                match self.stack.pop() {
                    None => {
                        // No open element: in stream mode this may be
                        // the root's close tag.
                        match self.root.take() {
                            Some(root) if root.name() == name => {
                                self.closed = true;
                                self.events.push_back(StreamEvent::End(root));
                            }
                            Some(root) => {
                                return Err(Error::MismatchedCloseTag {
                                    expected: root.name().to_owned(),
                                    found: name,
                                });
                            }
                            None => return Err(Error::UnexpectedCloseTag(name)),
                        }
                    }
                    Some(el) => {
                        if el.name() != name {
                            return Err(Error::MismatchedCloseTag {
                                expected: el.name().to_owned(),
                                found: name,
                            });
                        }
                        self.scopes.pop();
                        match self.stack.last_mut() {
                            Some(parent) => parent.append(el),
                            None => self.events.push_back(StreamEvent::Element(el)),
                        }
                    }
                }
            }

            SaxEvent::Text(text) => match self.stack.last_mut() {
                Some(el) => el.append_text(text),
                // Between stanzas: whitespace keepalives and stray
                // text are dropped.
                None => (),
            },
        }
        Ok(())
    }
}
