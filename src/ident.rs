//! Identifier validation and field-name helpers
//! --------------------------------------------
//! Single source of truth for what may be spliced into SQL text as a name,
//! and for splitting dictionary-qualified field names (`<field>__<attr>`).

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator between a flow field and a dictionary attribute.
pub const DICT_SEPARATOR: &str = "__";

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// True if `s` is a bare SQL identifier that is safe to emit unquoted.
pub fn is_safe_identifier(s: &str) -> bool {
    IDENT_RE.is_match(s)
}

/// Split a logical field name on the first `__`.
/// Returns `(field, None)` when there is no separator.
pub fn split_dict_field(name: &str) -> (&str, Option<&str>) {
    match name.split_once(DICT_SEPARATOR) {
        Some((base, sub)) => (base, Some(sub)),
        None => (name, None),
    }
}

/// Uppercase the first letter of every word; `_` does not start a new word.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in s.chars() {
        if at_word_start && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !(ch.is_alphanumeric() || ch == '_');
    }
    out
}

/// Render a single-quoted SQL string literal, escaping quotes and backslashes.
/// Only used for trusted catalog names (dictionary names, attribute names).
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}
