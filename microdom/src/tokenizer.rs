// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The incremental SAX tokenizer.
//!
//! The tokenizer is fed chunks of arbitrary size via
//! [`Tokenizer::push`] and queues [`SaxEvent`]s as tokens complete; an
//! incomplete trailing token is buffered until the next chunk. A
//! tokenizer serves exactly one stream: after an error it refuses
//! further input.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// A low-level markup event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaxEvent {
    /// An open tag. A self-closing tag yields `StartTag` immediately
    /// followed by the matching `EndTag`.
    StartTag {
        /// Qualified tag name.
        name: String,
        /// Attributes in document order, entity-decoded.
        attrs: Vec<(String, String)>,
    },
    /// A close tag.
    EndTag {
        /// Qualified tag name.
        name: String,
    },
    /// Character data, entity-decoded (raw for CDATA sections).
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    TagName,
    Tag,
    AttrName,
    AttrEq,
    AttrQuot,
    AttrValue,
    Cdata,
    IgnoreComment,
    IgnoreInstruction,
}

/// The incremental tokenizer state machine.
#[derive(Debug)]
pub struct Tokenizer {
    state: State,
    buf: String,
    tag_name: String,
    end_tag: bool,
    self_closing: bool,
    attrs: Vec<(String, String)>,
    attr_name: String,
    quote: char,
    events: VecDeque<SaxEvent>,
    failed: bool,
}

impl Default for Tokenizer {
    fn default() -> Tokenizer {
        Tokenizer::new()
    }
}

impl Tokenizer {
    /// Create a tokenizer in its initial state.
    pub fn new() -> Tokenizer {
        Tokenizer {
            state: State::Text,
            buf: String::new(),
            tag_name: String::new(),
            end_tag: false,
            self_closing: false,
            attrs: Vec::new(),
            attr_name: String::new(),
            quote: '"',
            events: VecDeque::new(),
            failed: false,
        }
    }

    /// Feed a chunk of the stream. Completed tokens become events
    /// retrievable through [`next_event`][`Tokenizer::next_event`]; an
    /// error poisons the tokenizer for good.
    pub fn push(&mut self, chunk: &str) -> Result<()> {
        if self.failed {
            return Err(Error::ParserDone);
        }
        for c in chunk.chars() {
            if let Err(e) = self.feed(c) {
                self.failed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Pop the next queued event, if any.
    pub fn next_event(&mut self) -> Option<SaxEvent> {
        self.events.pop_front()
    }

    fn feed(&mut self, c: char) -> Result<()> {
        match self.state {
            State::Text => match c {
                '<' => {
                    if !self.buf.is_empty() {
                        let text = decode_entities(&self.buf)?;
                        self.buf.clear();
                        self.events.push_back(SaxEvent::Text(text));
                    }
                    self.tag_name.clear();
                    self.end_tag = false;
                    self.self_closing = false;
                    self.attrs.clear();
                    self.state = State::TagName;
                }
                c => self.buf.push(c),
            },

            State::TagName => {
                if self.buf.is_empty() && !self.end_tag {
                    match c {
                        '/' => {
                            self.end_tag = true;
                            return Ok(());
                        }
                        '!' => {
                            self.buf.push('!');
                            return Ok(());
                        }
                        '?' => {
                            self.state = State::IgnoreInstruction;
                            return Ok(());
                        }
                        _ => (),
                    }
                }
                if self.buf.starts_with('!') {
                    // Could still become a comment, a CDATA section or
                    // some declaration we drop on the floor.
                    self.buf.push(c);
                    if self.buf == "!--" {
                        self.buf.clear();
                        self.state = State::IgnoreComment;
                    } else if self.buf == "![CDATA[" {
                        self.buf.clear();
                        self.state = State::Cdata;
                    } else if c == '>' {
                        self.buf.clear();
                        self.state = State::Text;
                    }
                    return Ok(());
                }
                match c {
                    '>' => {
                        if self.buf.is_empty() {
                            return Err(Error::InvalidMarkup("empty tag name"));
                        }
                        self.tag_name = core::mem::take(&mut self.buf);
                        self.finish_tag();
                    }
                    '/' => {
                        if self.buf.is_empty() {
                            return Err(Error::InvalidMarkup("empty tag name"));
                        }
                        self.self_closing = true;
                        self.tag_name = core::mem::take(&mut self.buf);
                        self.state = State::Tag;
                    }
                    c if is_xml_whitespace(c) => {
                        if self.buf.is_empty() {
                            return Err(Error::InvalidMarkup("whitespace before tag name"));
                        }
                        self.tag_name = core::mem::take(&mut self.buf);
                        self.state = State::Tag;
                    }
                    '<' => return Err(Error::InvalidMarkup("unexpected '<' inside tag")),
                    c => self.buf.push(c),
                }
            }

            State::Tag => match c {
                c if is_xml_whitespace(c) => (),
                '>' => self.finish_tag(),
                '/' => self.self_closing = true,
                '<' => return Err(Error::InvalidMarkup("unexpected '<' inside tag")),
                c => {
                    if self.end_tag {
                        // Tolerate (and drop) trailing junk in a close
                        // tag like `</name  >`.
                        return Ok(());
                    }
                    self.buf.push(c);
                    self.state = State::AttrName;
                }
            },

            State::AttrName => match c {
                '=' => {
                    self.attr_name = core::mem::take(&mut self.buf);
                    self.state = State::AttrQuot;
                }
                c if is_xml_whitespace(c) => {
                    self.attr_name = core::mem::take(&mut self.buf);
                    self.state = State::AttrEq;
                }
                '>' => {
                    let name = core::mem::take(&mut self.buf);
                    self.attrs.push((name, String::new()));
                    self.finish_tag();
                }
                '/' => {
                    let name = core::mem::take(&mut self.buf);
                    self.attrs.push((name, String::new()));
                    self.self_closing = true;
                    self.state = State::Tag;
                }
                c => self.buf.push(c),
            },

            State::AttrEq => match c {
                c if is_xml_whitespace(c) => (),
                '=' => self.state = State::AttrQuot,
                '>' => {
                    let name = core::mem::take(&mut self.attr_name);
                    self.attrs.push((name, String::new()));
                    self.finish_tag();
                }
                c => {
                    // The previous attribute had no value; a new one
                    // starts here.
                    let name = core::mem::take(&mut self.attr_name);
                    self.attrs.push((name, String::new()));
                    self.buf.push(c);
                    self.state = State::AttrName;
                }
            },

            State::AttrQuot => match c {
                c if is_xml_whitespace(c) => (),
                '"' | '\'' => {
                    self.quote = c;
                    self.buf.clear();
                    self.state = State::AttrValue;
                }
                _ => return Err(Error::InvalidMarkup("unquoted attribute value")),
            },

            State::AttrValue => {
                if c == self.quote {
                    let value = decode_entities(&self.buf)?;
                    self.buf.clear();
                    let name = core::mem::take(&mut self.attr_name);
                    self.attrs.push((name, value));
                    self.state = State::Tag;
                } else {
                    self.buf.push(c);
                }
            }

            State::Cdata => {
                self.buf.push(c);
                if self.buf.ends_with("]]>") {
                    self.buf.truncate(self.buf.len() - 3);
                    if !self.buf.is_empty() {
                        let text = core::mem::take(&mut self.buf);
                        self.events.push_back(SaxEvent::Text(text));
                    }
                    self.state = State::Text;
                }
            }

            State::IgnoreComment => {
                self.buf.push(c);
                if self.buf.ends_with("-->") {
                    self.buf.clear();
                    self.state = State::Text;
                }
            }

            State::IgnoreInstruction => {
                self.buf.push(c);
                if self.buf.ends_with("?>") {
                    self.buf.clear();
                    self.state = State::Text;
                }
            }
        }
        Ok(())
    }

    fn finish_tag(&mut self) {
        let name = core::mem::take(&mut self.tag_name);
        if self.end_tag {
            self.events.push_back(SaxEvent::EndTag { name });
        } else {
            self.events.push_back(SaxEvent::StartTag {
                name: name.clone(),
                attrs: core::mem::take(&mut self.attrs),
            });
            if self.self_closing {
                self.events.push_back(SaxEvent::EndTag { name });
            }
        }
        self.state = State::Text;
    }
}

fn is_xml_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Whether a code point is a legal XML `Char`.
fn is_xml_char(cp: u32) -> bool {
    matches!(cp, 0x9 | 0xA | 0xD)
        || (0x20..=0xD7FF).contains(&cp)
        || (0xE000..=0xFFFD).contains(&cp)
        || (0x1_0000..=0x10_FFFF).contains(&cp)
}

/// Decode the five predefined entities and numeric character
/// references. Unknown entities and references to illegal code points
/// fail the parse.
fn decode_entities(s: &str) -> Result<String> {
    if !s.contains('&') {
        return Ok(s.to_owned());
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let semi = match after.find(';') {
            Some(semi) => semi,
            None => return Err(Error::IllegalEntity(after.to_owned())),
        };
        let entity = &after[..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let parsed = if let Some(hex) =
                    entity.strip_prefix("#x").or(entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>()
                } else {
                    return Err(Error::IllegalEntity(entity.to_owned()));
                };
                let cp = parsed.map_err(|_| Error::IllegalEntity(entity.to_owned()))?;
                if !is_xml_char(cp) {
                    return Err(Error::IllegalCharacter(cp));
                }
                match char::from_u32(cp) {
                    Some(c) => out.push(c),
                    None => return Err(Error::IllegalCharacter(cp)),
                }
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
