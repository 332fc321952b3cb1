// Copyright (c) 2025 wisp contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XEP-0106 (JID Escaping) transformations for the local part.

/// The escapable characters and their escape sequences, in application
/// order. Backslash must come first when escaping and last when
/// unescaping, otherwise sequences produced by the other rules would be
/// rewritten a second time.
const SEQUENCES: &[(char, &str)] = &[
    ('\\', "\\5c"),
    (' ', "\\20"),
    ('"', "\\22"),
    ('&', "\\26"),
    ('\'', "\\27"),
    ('/', "\\2f"),
    (':', "\\3a"),
    ('<', "\\3c"),
    ('>', "\\3e"),
    ('@', "\\40"),
];

/// Escape the reserved characters of a local part as defined by
/// XEP-0106.
pub fn escape_local(local: &str) -> String {
    let mut escaped = local.to_owned();
    for (ch, seq) in SEQUENCES {
        if escaped.contains(*ch) {
            escaped = escaped.replace(*ch, seq);
        }
    }
    escaped
}

/// Reverse [`escape_local`].
pub fn unescape_local(local: &str) -> String {
    let mut unescaped = local.to_owned();
    for (ch, seq) in SEQUENCES.iter().rev() {
        if unescaped.contains(seq) {
            unescaped = unescaped.replace(seq, &ch.to_string());
        }
    }
    unescaped
}

/// Whether a local part contains unescaped reserved characters and
/// therefore needs to go through [`escape_local`] before use.
///
/// Already-escaped input (only `\20`-style sequences, no bare reserved
/// characters) is left alone, so feeding a JID back into itself does
/// not double-escape.
pub fn needs_escaping(local: &str) -> bool {
    let mut stripped = local.to_owned();
    for (_, seq) in SEQUENCES {
        if stripped.contains(seq) {
            stripped = stripped.replace(seq, "");
        }
    }
    stripped
        .chars()
        .any(|c| matches!(c, '\\' | ' ' | '"' | '&' | '\'' | '/' | ':' | '<' | '>' | '@'))
}
