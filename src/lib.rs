//! # prevodb
//!
//! Compiles the ReVo XML dictionary corpus (Reta Vortaro, an
//! Esperanto-centric multilingual dictionary) into a compact, random-access
//! binary database suitable for shipping to constrained devices.
//!
//! Given a ZIP archive or an unpacked directory of the ReVo sources, the
//! compiler produces:
//!
//! - one binary blob per article, containing the article title and its
//!   sections as *spannable strings* — UTF-8 text plus typed formatting and
//!   cross-reference spans addressed in UTF-16 code units;
//! - one compressed prefix-trie index per translation language, mapping
//!   search terms to article and section positions with
//!   Esperanto-orthography ordering;
//! - a language manifest, or (in single-file mode) one `PRDB` database file
//!   containing everything.
//!
//! ## Pipeline
//!
//! 1. [`source::RevoSource`] lists and streams files from the archive or
//!    directory.
//! 2. [`xml::XmlSession`] turns each file into events, resolving external
//!    DTD entities relative to the file's base path, and [`doc::Doc`]
//!    captures the tree for random traversal.
//! 3. [`article`] walks every `<art>` tree, emitting normalized text with
//!    nested spans, registering index terms, marks and deferred links.
//! 4. [`db::PrevoDb`] resolves collected links against the mark table and
//!    writes the article blobs, the per-language indices built by
//!    [`trie::TrieBuilder`] via [`lang::LanguageRegistry`], and the output
//!    layout (multi-file or single `PRDB` file).
//!
//! The build is strictly single-threaded and batch-oriented: a fatal error
//! aborts the current run, and partial outputs may be left on disk.
//!
//! ## Binaries
//!
//! - `prevodb -i <input> -o <output> [-s]` — run the compiler.
//! - `pdbdump article|index <file>` — decode and validate produced blobs.

pub mod article;
pub mod db;
pub mod doc;
pub mod error;
pub mod lang;
pub mod orth;
pub mod roman;
pub mod source;
pub mod spannable;
pub mod trie;
pub mod xml;

pub use error::PrevoError;
