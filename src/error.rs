use std::{io, str::Utf8Error, string::FromUtf8Error};

use quick_xml::Error as XmlError;
use thiserror::Error;

/// Error type shared by every stage of the build.
///
/// Positioned errors (bad source structure, tokenizer failures) carry a
/// `file:line:column` prefix in their message, built by the XML session at
/// the point of failure. Handler-raised errors propagate unchanged through
/// the event loop, so the top-level report always shows the underlying
/// cause rather than a generic tokenizer error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrevoError {
    /// Unexpected structure in the source XML, e.g. a `<drv>` with no
    /// `<kap>` or a `<ref>` without `cel`.
    #[error("{0}")]
    BadFormat(String),
    /// Tokenizer-level failure.
    #[error("{0}")]
    Parse(String),
    /// The external `unzip` tool exited non-zero or produced unusable
    /// output; the message carries the first line of its stderr.
    #[error("{0}")]
    Unzip(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<io::Error> for PrevoError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => PrevoError::NotFound(format!("{x}")),
            _ => PrevoError::Io(format!("{x}")),
        }
    }
}

impl From<XmlError> for PrevoError {
    fn from(x: XmlError) -> Self {
        PrevoError::Parse(format!("{x}"))
    }
}

impl From<Utf8Error> for PrevoError {
    fn from(x: Utf8Error) -> Self {
        PrevoError::Parse(format!("Invalid UTF-8 in source: {x}"))
    }
}

impl From<FromUtf8Error> for PrevoError {
    fn from(x: FromUtf8Error) -> Self {
        PrevoError::Parse(format!("Invalid UTF-8 in source: {x}"))
    }
}
