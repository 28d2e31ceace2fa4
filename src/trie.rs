//! Search index trie: builder and compressed encoding.
//!
//! The compressed trie is a single recursive variable-length structure.
//! Each node consists of:
//!
//! - a 32 bit little-endian number whose least significant 31 bits give
//!   the offset in bytes to just past this whole subtree (including the
//!   four offset bytes themselves); bit 31 is set iff at least one entry
//!   terminates at this node;
//! - the UTF-8 encoding of the node's code point;
//! - if bit 31 was set, the entry list: per entry two little-endian bytes
//!   packing the article number (low 14 bits), a has-more-entries flag
//!   (bit 15) and a has-display-form flag (bit 14); one byte of section
//!   number; and, when flagged, one length byte followed by the display
//!   form in UTF-8;
//! - the encoded child subtrees in sorted order.
//!
//! Children are kept sorted by the Esperanto orthography comparator so a
//! depth-first traversal of the encoded bytes enumerates completions in
//! collation order. The root's code point is a sentinel (`[`, the next
//! character after `Z`) that readers skip.
//!
//! The packing caps an index at 16,383 articles and 255 sections per
//! article; exceeding either is a fatal build error.
//!
//! The builder does not interpret its reference payloads. They are
//! resolved to (article, section) pairs by a caller-supplied function at
//! compression time, once article numbers are final.

use std::cmp::Ordering;

use crate::{error::PrevoError, orth};

const ROOT_SENTINEL: char = '[';

/// Largest article number representable in an entry record.
pub const MAX_ARTICLE_NUM: u32 = 0x3fff;
/// Largest section number representable in an entry record.
pub const MAX_SECTION_NUM: u32 = 0xff;

const HAS_NEXT: u16 = 0x8000;
const HAS_DISPLAY: u16 = 0x4000;

#[derive(Debug)]
struct TrieEntry<R> {
    reference: R,
    /// Set when the form to display differs from the search key stored in
    /// the trie, e.g. the original casing of a lower-cased index term.
    display: Option<String>,
}

#[derive(Debug)]
struct TrieNode<R> {
    letter: char,
    entries: Vec<TrieEntry<R>>,
    children: Vec<TrieNode<R>>,
}

impl<R> TrieNode<R> {
    fn new(letter: char) -> TrieNode<R> {
        TrieNode {
            letter,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct TrieBuilder<R> {
    root: TrieNode<R>,
    entry_count: usize,
}

impl<R> Default for TrieBuilder<R> {
    fn default() -> Self {
        TrieBuilder::new()
    }
}

impl<R> TrieBuilder<R> {
    pub fn new() -> TrieBuilder<R> {
        TrieBuilder {
            root: TrieNode::new(ROOT_SENTINEL),
            entry_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Adds a search term. Multiple entries on the same term keep their
    /// insertion order; the first inserted is the first emitted.
    pub fn add_word(&mut self, word: &str, display: Option<&str>, reference: R) {
        let mut node = &mut self.root;

        for ch in word.chars() {
            let pos = match node.children.iter().position(|c| c.letter == ch) {
                Some(pos) => pos,
                None => {
                    // Insert keeping children sorted by collation value
                    let pos = node
                        .children
                        .iter()
                        .position(|c| orth::cmp_chars(ch, c.letter) != Ordering::Greater)
                        .unwrap_or(node.children.len());
                    node.children.insert(pos, TrieNode::new(ch));
                    pos
                }
            };
            node = &mut node.children[pos];
        }

        node.entries.push(TrieEntry {
            reference,
            display: display.map(str::to_string),
        });
        self.entry_count += 1;
    }

    /// Emits the compressed byte representation. `resolve` maps each
    /// stored reference to its final (article, section) pair.
    pub fn compress<F>(&self, resolve: F) -> Result<Vec<u8>, PrevoError>
    where
        F: Fn(&R) -> (u32, u32),
    {
        let mut data = Vec::new();
        compress_node(&self.root, &resolve, &mut data)?;
        Ok(data)
    }
}

fn compress_node<R, F>(
    node: &TrieNode<R>,
    resolve: &F,
    data: &mut Vec<u8>,
) -> Result<(), PrevoError>
where
    F: Fn(&R) -> (u32, u32),
{
    let node_start = data.len();

    // Offset patched once the subtree size is known
    data.extend_from_slice(&[0u8; 4]);

    let mut utf8 = [0u8; 4];
    data.extend_from_slice(node.letter.encode_utf8(&mut utf8).as_bytes());

    for (index, entry) in node.entries.iter().enumerate() {
        let (article, section) = resolve(&entry.reference);

        if article > MAX_ARTICLE_NUM {
            return Err(PrevoError::BadFormat(format!(
                "Article number {article} exceeds the index limit of {MAX_ARTICLE_NUM}"
            )));
        }
        if section > MAX_SECTION_NUM {
            return Err(PrevoError::BadFormat(format!(
                "Section number {section} exceeds the index limit of {MAX_SECTION_NUM}"
            )));
        }

        let mut packed = article as u16;
        if index + 1 < node.entries.len() {
            packed |= HAS_NEXT;
        }
        if entry.display.is_some() {
            packed |= HAS_DISPLAY;
        }

        data.extend_from_slice(&packed.to_le_bytes());
        data.push(section as u8);

        if let Some(display) = &entry.display {
            let bytes = display.as_bytes();
            if bytes.len() > u8::MAX as usize {
                return Err(PrevoError::BadFormat(format!(
                    "Display form too long for the index: {display:?}"
                )));
            }
            data.push(bytes.len() as u8);
            data.extend_from_slice(bytes);
        }
    }

    for child in &node.children {
        compress_node(child, resolve, data)?;
    }

    let size = data.len() - node_start;
    if size > 0x7fffffff {
        return Err(PrevoError::BadFormat(
            "Index subtree exceeds the 31-bit offset limit".to_string(),
        ));
    }
    let mut offset = size as u32;
    if !node.entries.is_empty() {
        offset |= 1 << 31;
    }
    data[node_start..node_start + 4].copy_from_slice(&offset.to_le_bytes());

    Ok(())
}

/// One entry recovered from a compressed trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEntry {
    pub word: String,
    pub display: Option<String>,
    pub article: u16,
    pub section: u8,
}

/// Walks a compressed trie depth-first, returning every entry in encoded
/// (= collation) order. Validates the self-delimiting structure: every
/// node's offset field must exactly cover its subtree.
pub fn decode_entries(data: &[u8]) -> Result<Vec<DecodedEntry>, PrevoError> {
    let mut out = Vec::new();
    let mut prefix = String::new();
    decode_node(data, &mut prefix, true, &mut out)?;
    Ok(out)
}

fn decode_node(
    data: &[u8],
    prefix: &mut String,
    is_root: bool,
    out: &mut Vec<DecodedEntry>,
) -> Result<(), PrevoError> {
    if data.len() < 4 {
        return Err(PrevoError::BadFormat("Unexpected end of trie".to_string()));
    }

    let offset = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let mut has_entries = offset & (1 << 31) != 0;
    let size = (offset & 0x7fffffff) as usize;

    if size != data.len() {
        return Err(PrevoError::BadFormat(format!(
            "Trie node offset {size} does not match subtree size {}",
            data.len()
        )));
    }

    let mut rest = &data[4..];

    let ch_len = match rest.first() {
        Some(&b) if b < 0x80 => 1,
        Some(&b) if b >= 0xc0 && b < 0xe0 => 2,
        Some(&b) if (0xe0..0xf0).contains(&b) => 3,
        Some(&b) if (0xf0..0xf8).contains(&b) => 4,
        _ => return Err(PrevoError::BadFormat("Invalid trie node label".to_string())),
    };
    if rest.len() < ch_len {
        return Err(PrevoError::BadFormat("Unexpected end of trie".to_string()));
    }
    let label = std::str::from_utf8(&rest[..ch_len])
        .map_err(|e| PrevoError::BadFormat(format!("Invalid trie node label: {e}")))?;

    let prefix_len = prefix.len();
    if !is_root {
        prefix.push_str(label);
    }
    rest = &rest[ch_len..];

    while has_entries {
        if rest.len() < 3 {
            return Err(PrevoError::BadFormat("Unexpected end of trie".to_string()));
        }
        let packed = u16::from_le_bytes([rest[0], rest[1]]);
        let section = rest[2];
        rest = &rest[3..];

        has_entries = packed & HAS_NEXT != 0;
        let has_display = packed & HAS_DISPLAY != 0;

        let display = if has_display {
            let len = *rest.first().ok_or_else(|| {
                PrevoError::BadFormat("Unexpected end of trie".to_string())
            })? as usize;
            if rest.len() < 1 + len {
                return Err(PrevoError::BadFormat("Unexpected end of trie".to_string()));
            }
            let display = std::str::from_utf8(&rest[1..1 + len])
                .map_err(|e| PrevoError::BadFormat(format!("Invalid display form: {e}")))?
                .to_string();
            rest = &rest[1 + len..];
            Some(display)
        } else {
            None
        };

        out.push(DecodedEntry {
            word: prefix.clone(),
            display,
            article: packed & MAX_ARTICLE_NUM as u16,
            section,
        });
    }

    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(PrevoError::BadFormat("Unexpected end of trie".to_string()));
        }
        let child_offset = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let child_size = (child_offset & 0x7fffffff) as usize;
        if child_size < 4 || child_size > rest.len() {
            return Err(PrevoError::BadFormat("Child node is too big".to_string()));
        }
        decode_node(&rest[..child_size], prefix, false, out)?;
        rest = &rest[child_size..];
    }

    prefix.truncate(prefix_len);
    Ok(())
}
