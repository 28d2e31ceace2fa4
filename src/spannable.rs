//! Spannable strings: text plus typed, possibly nested range annotations.
//!
//! A spannable string pairs a UTF-8 text buffer with an ordered list of
//! spans. Span coordinates count UTF-16 code units over the text — not
//! bytes, not scalar values — because that is the coordinate space of the
//! reading side. The serialized form keeps the same asymmetry: the length
//! prefix counts UTF-16 units while the payload is raw UTF-8, so a reader
//! decodes code points until the unit count is exhausted and then owns a
//! ready-made coordinate domain for the spans that follow.

use crate::error::PrevoError;

/// Span kinds as stored in article blobs. The discriminants are part of
/// the binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpanKind {
    Reference = 0,
    Superscript = 1,
    Italic = 2,
    Note = 3,
    Bold = 4,
    None = 5,
}

impl SpanKind {
    pub fn from_u8(val: u8) -> Option<SpanKind> {
        match val {
            0 => Some(SpanKind::Reference),
            1 => Some(SpanKind::Superscript),
            2 => Some(SpanKind::Italic),
            3 => Some(SpanKind::Note),
            4 => Some(SpanKind::Bold),
            5 => Some(SpanKind::None),
            _ => None,
        }
    }
}

/// A single contiguous annotated range. `start` and `length` are UTF-16
/// code unit counts; the meaning of `data1`/`data2` depends on `kind`
/// (for [`SpanKind::Reference`] they hold the target article and section
/// numbers after link resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u16,
    pub length: u16,
    pub data1: u16,
    pub data2: u16,
    pub kind: SpanKind,
}

/// UTF-16 code unit count of a string.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpannableString {
    pub text: String,
    pub spans: Vec<Span>,
}

impl SpannableString {
    pub fn plain(text: impl Into<String>) -> SpannableString {
        SpannableString {
            text: text.into(),
            spans: Vec::new(),
        }
    }

    pub fn utf16_len(&self) -> usize {
        utf16_len(&self.text)
    }

    /// Serializes into `out`. Empty spans are permitted in memory but are
    /// omitted on the wire; a zero length field terminates the span list.
    pub fn write(&self, out: &mut Vec<u8>) -> Result<(), PrevoError> {
        let units = self.utf16_len();

        if units > u16::MAX as usize {
            return Err(PrevoError::BadFormat(format!(
                "String too long for article blob ({units} UTF-16 units)"
            )));
        }

        out.extend_from_slice(&(units as u16).to_le_bytes());
        out.extend_from_slice(self.text.as_bytes());

        for span in &self.spans {
            if span.length == 0 {
                continue;
            }

            out.extend_from_slice(&span.length.to_le_bytes());
            out.extend_from_slice(&span.start.to_le_bytes());
            out.extend_from_slice(&span.data1.to_le_bytes());
            out.extend_from_slice(&span.data2.to_le_bytes());
            out.push(span.kind as u8);
        }

        // Zero-length span terminates the list
        out.extend_from_slice(&0u16.to_le_bytes());

        Ok(())
    }

    /// Decodes one spannable string from the front of `data`, returning it
    /// together with the number of bytes consumed. Used by the dump tool
    /// and by round-trip tests.
    pub fn read(data: &[u8]) -> Result<(SpannableString, usize), PrevoError> {
        if data.len() < 2 {
            return Err(PrevoError::BadFormat(
                "Truncated blob: no string length".to_string(),
            ));
        }

        let units = u16::from_le_bytes([data[0], data[1]]) as usize;
        let mut pos = 2;

        // The length prefix counts UTF-16 units; walk UTF-8 sequences
        // until the count is exhausted to find the byte length.
        let mut seen_units = 0;
        let mut text_end = pos;
        while seen_units < units {
            let rest = data
                .get(text_end..)
                .filter(|rest| !rest.is_empty())
                .ok_or_else(|| {
                    PrevoError::BadFormat(format!(
                        "Truncated blob: expected {units} UTF-16 units, got {seen_units}"
                    ))
                })?;
            let seq_len = utf8_sequence_len(rest[0]).ok_or_else(|| {
                PrevoError::BadFormat("Invalid UTF-8 in blob text".to_string())
            })?;
            if rest.len() < seq_len {
                return Err(PrevoError::BadFormat(
                    "Truncated UTF-8 sequence in blob text".to_string(),
                ));
            }
            seen_units += if seq_len == 4 { 2 } else { 1 };
            text_end += seq_len;
        }
        if seen_units != units {
            return Err(PrevoError::BadFormat(
                "UTF-16 length does not fall on a character boundary".to_string(),
            ));
        }

        let text = std::str::from_utf8(&data[pos..text_end])
            .map_err(|e| PrevoError::BadFormat(format!("Invalid UTF-8 in blob text: {e}")))?
            .to_string();
        pos = text_end;

        let mut spans = Vec::new();
        loop {
            if data.len() < pos + 2 {
                return Err(PrevoError::BadFormat(
                    "Truncated blob: no span length".to_string(),
                ));
            }
            let length = u16::from_le_bytes([data[pos], data[pos + 1]]);
            pos += 2;

            if length == 0 {
                break;
            }

            if data.len() < pos + 7 {
                return Err(PrevoError::BadFormat(
                    "Truncated blob: incomplete span record".to_string(),
                ));
            }
            let start = u16::from_le_bytes([data[pos], data[pos + 1]]);
            let data1 = u16::from_le_bytes([data[pos + 2], data[pos + 3]]);
            let data2 = u16::from_le_bytes([data[pos + 4], data[pos + 5]]);
            let kind = SpanKind::from_u8(data[pos + 6]).ok_or_else(|| {
                PrevoError::BadFormat(format!("Unknown span kind {}", data[pos + 6]))
            })?;
            pos += 7;

            if start as usize + length as usize > units {
                return Err(PrevoError::BadFormat(format!(
                    "Span {start}+{length} exceeds text length {units}"
                )));
            }

            spans.push(Span {
                start,
                length,
                data1,
                data2,
                kind,
            });
        }

        Ok((SpannableString { text, spans }, pos))
    }
}

fn utf8_sequence_len(first: u8) -> Option<usize> {
    match first {
        0x00..=0x7f => Some(1),
        0xc0..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf7 => Some(4),
        _ => None,
    }
}
