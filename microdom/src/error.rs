// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Provides an error type for this crate.

use core::fmt;

/// Our main error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A character reference resolved to a code point which is not a
    /// legal XML character.
    IllegalCharacter(u32),

    /// An entity reference which is neither one of the five predefined
    /// entities nor a character reference.
    IllegalEntity(String),

    /// A close tag did not match the currently open element.
    MismatchedCloseTag {
        /// Name of the element that is currently open.
        expected: String,
        /// Name found in the close tag.
        found: String,
    },

    /// A close tag appeared with no element open.
    UnexpectedCloseTag(String),

    /// Markup the tokenizer cannot make sense of.
    InvalidMarkup(&'static str),

    /// The parser already failed or finished; it cannot be fed again.
    /// One parser instance serves exactly one stream.
    ParserDone,
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IllegalCharacter(cp) => {
                write!(fmt, "character reference to illegal code point {:#x}", cp)
            }
            Error::IllegalEntity(entity) => write!(fmt, "unknown entity &{};", entity),
            Error::MismatchedCloseTag { expected, found } => write!(
                fmt,
                "close tag </{}> does not match open element <{}>",
                found, expected
            ),
            Error::UnexpectedCloseTag(name) => {
                write!(fmt, "close tag </{}> with no open element", name)
            }
            Error::InvalidMarkup(what) => write!(fmt, "invalid markup: {}", what),
            Error::ParserDone => write!(fmt, "parser has already failed or finished"),
        }
    }
}

impl std::error::Error for Error {}

/// Our simplified Result type.
pub type Result<T> = core::result::Result<T, Error>;
