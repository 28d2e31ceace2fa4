//! Esperanto-aware code point ordering.
//!
//! Index tries and the language list are sorted so that the circumflex and
//! breve letters (ĉ ĝ ĥ ĵ ŝ ŭ) collate immediately after their Latin base
//! letters instead of after `z`. Every code point maps to a numeric sort
//! value; comparison is code-point-wise on that value, case-insensitively.

use std::cmp::Ordering;

/// Sort value for a single code point: lower-case it, then hat letters get
/// `base * 2 + 1` so they land just after their base letter, everything
/// else gets `codepoint * 2`.
pub fn sort_value(ch: char) -> u32 {
    let ch = ch.to_lowercase().next().unwrap_or(ch);

    match ch {
        '\u{109}' => 'c' as u32 * 2 + 1,
        '\u{11d}' => 'g' as u32 * 2 + 1,
        '\u{125}' => 'h' as u32 * 2 + 1,
        '\u{135}' => 'j' as u32 * 2 + 1,
        '\u{15d}' => 's' as u32 * 2 + 1,
        '\u{16d}' => 'u' as u32 * 2 + 1,
        _ => ch as u32 * 2,
    }
}

pub fn cmp_chars(a: char, b: char) -> Ordering {
    sort_value(a).cmp(&sort_value(b))
}

/// Compares two strings using Esperanto orthography. A shorter prefix
/// sorts first.
pub fn cmp_strs(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        match (a_chars.next(), b_chars.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ac), Some(bc)) => match cmp_chars(ac, bc) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}
