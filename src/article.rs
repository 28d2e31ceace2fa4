//! The article compiler.
//!
//! Walks one `<art>` document tree and produces an [`Article`]: a title
//! plus ordered [`Section`]s, each a spannable string. Along the way it
//! registers search-index entries with the [`LanguageRegistry`], records
//! named marks, and collects [`Link`]s whose spans are filled in after
//! every article has been parsed and mark targets are known.
//!
//! The walk uses an explicit work stack instead of recursion. Besides
//! plain nodes the stack carries three bookkeeping entries: closing a
//! span at the current text offset, queuing a paragraph break, and
//! appending a single closing character such as `]`. A queued paragraph
//! only materializes as `"\n\n"` once real content follows it, so empty
//! constructs never leave stray blank lines.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::{
    doc::{Doc, NodeId},
    error::PrevoError,
    lang::LanguageRegistry,
    orth, roman,
    spannable::{utf16_len, Span, SpanKind, SpannableString},
};

/// One dictionary entry: the compiled form of a single `<art>`.
#[derive(Debug, Default)]
pub struct Article {
    pub title: SpannableString,
    pub sections: Vec<Section>,
}

/// A sub-unit of an article: a derivation, a subarticle, or an
/// aggregated translation listing.
#[derive(Debug, Default)]
pub struct Section {
    pub title: SpannableString,
    pub body: SpannableString,
}

/// Target of an index entry or a link: either a mark name resolved after
/// all articles are parsed, or pre-resolved article/section numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Mark(String),
    Direct { article: u32, section: u32 },
}

/// A span awaiting its target: once marks are known, the span's data
/// fields receive the resolved article and section numbers.
#[derive(Debug, Clone)]
pub struct Link {
    pub article: usize,
    pub section: usize,
    pub span: usize,
    pub target: Reference,
}

/// Process-wide mapping from mark name to (article, section).
pub type MarkMap = HashMap<String, (u32, u32)>;

/// Sections per article are capped by the one-byte section number in the
/// index format.
const MAX_SECTIONS: usize = crate::trie::MAX_SECTION_NUM as usize + 1;

/// Reference icons by `tip` attribute. Types without an icon (`lst`) are
/// simply absent.
static REF_ICONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("vid", "→"),
        ("hom", "→"),
        ("dif", "="),
        ("sin", "⇒"),
        ("ant", "⇝"),
        ("super", "↗"),
        ("sub", "↘"),
        ("prt", "↘"),
        ("malprt", "↗"),
        ("ekz", "●"),
    ])
});

/// Parents whose context already conveys the reference kind, so the icon
/// is suppressed.
const ICON_SUPPRESSING_PARENTS: &[&str] = &["dif", "rim", "ekz", "klr"];

/// Elements whose whole subtree is ignored in body text.
const SKIPPED_ELEMENTS: &[&str] = &["fnt", "adm", "bld"];

/// Compiles one article document. `article_num` is the number the article
/// will occupy in the final sequence; `file` is the virtual source path,
/// used for error messages and for the automatic filename mark.
pub fn compile_article(
    doc: &Doc,
    file: &str,
    article_num: u32,
    lang: &mut LanguageRegistry,
    marks: &mut MarkMap,
    links: &mut Vec<Link>,
) -> Result<Article, PrevoError> {
    let compiler = ArticleCompiler {
        doc,
        file,
        article_num,
        lang,
        marks,
        links,
        word_root: "~".to_string(),
        article_tilded: String::new(),
        section_tilded: String::new(),
        sections: Vec::new(),
        translations: BTreeMap::new(),
    };
    compiler.run()
}

/// Work stack entries for the body walker.
enum WorkItem {
    Node(NodeId),
    CloseSpan(usize),
    AddParagraph,
    ClosingCharacter(char),
}

struct ArticleCompiler<'a> {
    doc: &'a Doc,
    file: &'a str,
    article_num: u32,
    lang: &'a mut LanguageRegistry,
    marks: &'a mut MarkMap,
    links: &'a mut Vec<Link>,
    /// Content of the `<rad>` in the main `<kap>`, substituted for
    /// `<tld>` during text emission. Valid only while this article is
    /// being compiled.
    word_root: String,
    article_tilded: String,
    /// Tilded headword of the section currently being built; used as the
    /// back-reference prefix of translation entries.
    section_tilded: String,
    sections: Vec<Section>,
    /// Per-language scratch buffers for translations, flushed into
    /// trailing sections once all regular sections exist.
    translations: BTreeMap<String, SpannableBuilder>,
}

impl<'a> ArticleCompiler<'a> {
    fn run(mut self) -> Result<Article, PrevoError> {
        let doc = self.doc;
        let art = doc.find_element(doc.root(), "art").ok_or_else(|| {
            PrevoError::BadFormat(format!("{}: No <art> element found", self.file))
        })?;

        // The mark named after the file resolves to the first section.
        // Explicit declarations win over it because later wins.
        if let Some(auto_mark) = filename_mark(self.file) {
            self.add_mark(&auto_mark, 0);
        }
        if let Some(mark) = doc.attribute(art, "mrk") {
            self.add_mark(mark, 0);
        }

        let kap = doc.child_element(art, "kap").ok_or_else(|| {
            PrevoError::BadFormat(format!("{}: <art> with no <kap>", self.file))
        })?;
        let (display, tilded) = self.process_kap(kap, 0, false)?;
        let title = SpannableString::plain(display.clone());
        self.article_tilded = tilded;

        // Loose content (senses or definitions directly under <art>) is
        // gathered into one leading section titled with the headword.
        let mut loose: Vec<NodeId> = Vec::new();

        for &child in doc.children(art) {
            if let Some(name) = doc.name(child) {
                match name {
                    "kap" => {}
                    "drv" => {
                        self.flush_loose(&mut loose, &display)?;
                        self.build_drv_section(child)?;
                    }
                    "subart" => {
                        self.flush_loose(&mut loose, &display)?;
                        self.build_subart_sections(child)?;
                    }
                    "trd" | "trdgrp" => self.handle_translation(child, 0, None)?,
                    _ if SKIPPED_ELEMENTS.contains(&name) => {}
                    _ => loose.push(child),
                }
            } else if let Some(text) = doc.text(child) {
                if !text.chars().all(|c| c.is_ascii_whitespace()) {
                    loose.push(child);
                }
            }
        }
        self.flush_loose(&mut loose, &display)?;

        self.flush_translations()?;

        Ok(Article {
            title,
            sections: self.sections,
        })
    }

    fn flush_loose(
        &mut self,
        loose: &mut Vec<NodeId>,
        headword: &str,
    ) -> Result<(), PrevoError> {
        if loose.is_empty() {
            return Ok(());
        }

        let nodes = std::mem::take(loose);
        let section = self.sections.len() as u32;
        self.section_tilded = self.article_tilded.clone();

        let mut body = SpannableBuilder::default();
        self.walk(&mut body, &nodes, section)?;
        self.push_section(SpannableString::plain(headword), body)?;
        Ok(())
    }

    fn build_drv_section(&mut self, drv: NodeId) -> Result<(), PrevoError> {
        let doc = self.doc;
        let section = self.sections.len() as u32;

        let kap = doc.child_element(drv, "kap").ok_or_else(|| {
            PrevoError::BadFormat(format!("{}: <drv> with no <kap>", self.file))
        })?;

        if let Some(mark) = doc.attribute(drv, "mrk") {
            self.add_mark(mark, section);
        }

        let (display, tilded) = self.process_kap(kap, section, true)?;
        self.section_tilded = tilded;

        let children: Vec<NodeId> = doc
            .children(drv)
            .iter()
            .copied()
            .filter(|&child| child != kap)
            .collect();

        let mut body = SpannableBuilder::default();
        self.walk(&mut body, &children, section)?;
        self.push_section(SpannableString::plain(display), body)?;
        Ok(())
    }

    fn build_subart_sections(&mut self, subart: NodeId) -> Result<(), PrevoError> {
        let doc = self.doc;

        let ordinal = doc
            .parent(subart)
            .map(|parent| {
                doc.children(parent)
                    .iter()
                    .take_while(|&&sib| sib != subart)
                    .filter(|&&sib| doc.is_element(sib, "subart"))
                    .count()
            })
            .unwrap_or(0) as u32
            + 1;
        let title = format!("{}.", roman::roman_ordinal(ordinal));

        if let Some(mark) = doc.attribute(subart, "mrk") {
            self.add_mark(mark, self.sections.len() as u32);
        }

        let drvs: Vec<NodeId> = doc.child_elements(subart, "drv").collect();

        if drvs.is_empty() {
            // A subarticle without derivations is one spannable section
            let section = self.sections.len() as u32;
            self.section_tilded = self.article_tilded.clone();

            let children: Vec<NodeId> = doc
                .children(subart)
                .iter()
                .copied()
                .filter(|&child| !self.doc.is_element(child, "kap"))
                .collect();

            let mut body = SpannableBuilder::default();
            self.walk(&mut body, &children, section)?;
            self.push_section(SpannableString::plain(title), body)?;
            return Ok(());
        }

        for &child in doc.children(subart) {
            if let Some(text) = doc.text(child) {
                if !text.chars().all(|c| c.is_ascii_whitespace()) {
                    return Err(PrevoError::BadFormat(format!(
                        "{}: Unexpected bare text in a subarticle of derivations",
                        self.file
                    )));
                }
            }
        }

        // An introductory definition becomes its own section under the
        // Roman-numeral title
        if let Some(dif) = doc.child_element(subart, "dif") {
            let section = self.sections.len() as u32;
            self.section_tilded = self.article_tilded.clone();

            let mut body = SpannableBuilder::default();
            self.walk(&mut body, &[dif], section)?;
            self.push_section(SpannableString::plain(title), body)?;
        }

        for drv in drvs {
            self.build_drv_section(drv)?;
        }

        Ok(())
    }

    fn push_section(
        &mut self,
        title: SpannableString,
        body: SpannableBuilder,
    ) -> Result<usize, PrevoError> {
        if self.sections.len() >= MAX_SECTIONS {
            return Err(PrevoError::BadFormat(format!(
                "{}: Too many sections in one article (limit {MAX_SECTIONS})",
                self.file
            )));
        }

        let section = self.sections.len();
        let (body, pending) = body.finish();

        for (span, target) in pending {
            self.links.push(Link {
                article: self.article_num as usize,
                section,
                span,
                target,
            });
        }

        self.sections.push(Section { title, body });
        Ok(section)
    }

    /// Drives the explicit work stack over a list of root nodes.
    fn walk(
        &mut self,
        sb: &mut SpannableBuilder,
        roots: &[NodeId],
        section: u32,
    ) -> Result<(), PrevoError> {
        let mut stack: Vec<WorkItem> = roots.iter().rev().map(|&n| WorkItem::Node(n)).collect();

        while let Some(item) = stack.pop() {
            match item {
                WorkItem::CloseSpan(span) => sb.close_span(span),
                WorkItem::AddParagraph => sb.queue_paragraph(),
                WorkItem::ClosingCharacter(ch) => {
                    let mut buf = [0u8; 4];
                    sb.push_str(ch.encode_utf8(&mut buf));
                }
                WorkItem::Node(node) => self.dispatch(sb, &mut stack, node, section)?,
            }
        }

        Ok(())
    }

    fn dispatch(
        &mut self,
        sb: &mut SpannableBuilder,
        stack: &mut Vec<WorkItem>,
        node: NodeId,
        section: u32,
    ) -> Result<(), PrevoError> {
        let doc = self.doc;

        if let Some(text) = doc.text(node) {
            sb.push_cdata(text);
            return Ok(());
        }

        let name = doc.name(node).unwrap_or_default().to_string();

        if SKIPPED_ELEMENTS.contains(&name.as_str()) {
            return Ok(());
        }

        if let Some(mark) = doc.attribute(node, "mrk") {
            self.add_mark(mark, section);
        }

        match name.as_str() {
            "tld" => {
                let expansion = self.tld_text(node);
                sb.push_str(&expansion);
            }
            "rad" => {
                let mut root = String::new();
                doc.append_text(node, &mut root, &[]);
                let root = collapse_whitespace(&root);
                sb.push_str(&root);
                self.word_root = root;
            }
            "trd" | "trdgrp" => self.handle_translation(node, section, None)?,
            "kap" => {
                // Section headwords are handled by the kap walker
            }
            "ekz" => {
                let span = sb.open_span(SpanKind::Italic);
                stack.push(WorkItem::CloseSpan(span));
                push_children(doc, stack, node);
            }
            "ofc" => {
                let span = sb.open_span(SpanKind::Superscript);
                stack.push(WorkItem::CloseSpan(span));
                push_children(doc, stack, node);
            }
            "em" => {
                let span = sb.open_span(SpanKind::Bold);
                stack.push(WorkItem::CloseSpan(span));
                push_children(doc, stack, node);
            }
            "rim" => {
                sb.queue_paragraph();
                let bold = sb.open_span(SpanKind::Bold);
                sb.push_str("Rim. ");
                sb.close_span(bold);

                let note = sb.open_span(SpanKind::Note);
                stack.push(WorkItem::AddParagraph);
                stack.push(WorkItem::CloseSpan(note));
                push_children(doc, stack, node);
            }
            "aut" => {
                sb.push_str("[");
                stack.push(WorkItem::ClosingCharacter(']'));
                push_children(doc, stack, node);
            }
            "subdrv" => {
                sb.queue_paragraph();
                if let Some(ordinal) = sibling_ordinal(doc, node) {
                    sb.push_str(&format!("{}. ", (b'A' + ordinal as u8) as char));
                }
                push_children(doc, stack, node);
            }
            "snc" => {
                sb.queue_paragraph();
                if let Some(ordinal) = sibling_ordinal(doc, node) {
                    sb.push_str(&format!("{}. ", ordinal + 1));
                }
                push_children(doc, stack, node);
            }
            "subsnc" => {
                sb.queue_paragraph();
                if let Some(ordinal) = sibling_ordinal(doc, node) {
                    sb.push_str(&format!("{}) ", (b'a' + ordinal as u8) as char));
                }
                push_children(doc, stack, node);
            }
            "ref" => {
                let target = doc
                    .attribute(node, "cel")
                    .ok_or_else(|| {
                        PrevoError::BadFormat(format!(
                            "{}: <ref> tag found with no cel attribute",
                            self.file
                        ))
                    })?
                    .to_string();

                // The span covers the icon too, so even an empty <ref/>
                // leaves a tappable range
                let span = sb.open_span(SpanKind::Reference);
                sb.add_link(span, Reference::Mark(target));
                self.emit_ref_icon(sb, node);
                stack.push(WorkItem::CloseSpan(span));
                push_children(doc, stack, node);
            }
            "refgrp" => {
                self.emit_ref_icon(sb, node);
                push_children(doc, stack, node);
            }
            _ => push_children(doc, stack, node),
        }

        Ok(())
    }

    fn emit_ref_icon(&self, sb: &mut SpannableBuilder, node: NodeId) {
        let doc = self.doc;

        let Some(tip) = doc.attribute(node, "tip") else {
            return;
        };

        if let Some(parent) = doc.parent(node) {
            if let Some(parent_name) = doc.name(parent) {
                if ICON_SUPPRESSING_PARENTS.contains(&parent_name) {
                    return;
                }
            }
        }

        if let Some(icon) = REF_ICONS.get(tip) {
            sb.push_str(icon);
        }
    }

    /// Processes a headword `<kap>`: returns the display string and the
    /// tilded form in which `<tld>`/`<rad>` render as `~`. With
    /// `register` set, the display form (and any `<var>` variants) are
    /// added to the Esperanto index against `section`.
    fn process_kap(
        &mut self,
        kap: NodeId,
        section: u32,
        register: bool,
    ) -> Result<(String, String), PrevoError> {
        let doc = self.doc;
        let mut display = String::new();
        let mut tilded = String::new();

        for &child in doc.children(kap) {
            if let Some(text) = doc.text(child) {
                display.push_str(text);
                tilded.push_str(text);
                continue;
            }

            match doc.name(child) {
                Some("tld") => {
                    display.push_str(&self.tld_text(child));
                    tilded.push('~');
                }
                Some("rad") => {
                    let mut root = String::new();
                    doc.append_text(child, &mut root, &[]);
                    let root = collapse_whitespace(&root);
                    display.push_str(&root);
                    tilded.push('~');
                    self.word_root = root;
                }
                Some("var") => {
                    // Variant headwords index against the same section
                    if register {
                        if let Some(var_kap) = doc.child_element(child, "kap") {
                            self.process_kap(var_kap, section, true)?;
                        }
                    }
                }
                _ => {}
            }
        }

        let display = trim_headword(&collapse_whitespace(&display));
        let tilded = trim_headword(&collapse_whitespace(&tilded));

        if register && !display.is_empty() {
            self.add_headword_entry(&display, section);
        }

        Ok((display, tilded))
    }

    /// A headword starting with `-` (a suffix entry) is searched without
    /// the dash but displayed with it.
    fn add_headword_entry(&mut self, display: &str, section: u32) {
        let reference = Reference::Direct {
            article: self.article_num,
            section,
        };

        if let Some(stripped) = display.strip_prefix('-') {
            self.lang
                .add_entry("eo", stripped, Some(display), reference);
        } else {
            self.lang.add_entry("eo", display, None, reference);
        }
    }

    fn tld_text(&self, node: NodeId) -> String {
        let root = &self.word_root;

        match self.doc.attribute(node, "lit") {
            Some(lit) => {
                let mut out = lit.to_string();
                let mut chars = root.chars();
                chars.next();
                out.push_str(chars.as_str());
                out
            }
            None => root.clone(),
        }
    }

    fn add_mark(&mut self, name: &str, section: u32) {
        let target = (self.article_num, section);
        if let Some(previous) = self.marks.insert(name.to_string(), target) {
            if previous != target {
                tracing::warn!(
                    "Duplicate mark \"{name}\": {previous:?} replaced by {target:?}"
                );
            }
        }
    }

    /// Collects a `<trd>` or `<trdgrp>` into the per-language scratch
    /// buffers and the language's search index. Translations of examples
    /// are ignored.
    fn handle_translation(
        &mut self,
        node: NodeId,
        section: u32,
        group_lang: Option<&str>,
    ) -> Result<(), PrevoError> {
        let doc = self.doc;

        if doc.has_ancestor(node, "ekz") {
            return Ok(());
        }

        if doc.is_element(node, "trdgrp") {
            let lang = doc
                .attribute(node, "lng")
                .ok_or_else(|| {
                    PrevoError::BadFormat(format!(
                        "{}: <trdgrp> tag found with no lng attribute",
                        self.file
                    ))
                })?
                .to_string();

            for child in doc.child_elements(node, "trd").collect::<Vec<_>>() {
                self.handle_translation(child, section, Some(&lang))?;
            }
            return Ok(());
        }

        let lang = match doc.attribute(node, "lng").or(group_lang) {
            Some(lang) => lang.to_string(),
            None => {
                return Err(PrevoError::BadFormat(format!(
                    "{}: <trd> tag found with no lng attribute",
                    self.file
                )))
            }
        };

        let mut content = String::new();
        doc.append_text(node, &mut content, &[]);
        let content = collapse_whitespace(&content);

        // Translations that are only whitespace are silently dropped
        if content.is_empty() {
            return Ok(());
        }

        let prefix = format!("{}{}", self.section_tilded, self.sense_suffix(node));
        let reference = Reference::Direct {
            article: self.article_num,
            section,
        };

        let bag = self.translations.entry(lang.clone()).or_default();
        if !bag.is_empty() {
            bag.push_str("; ");
        }

        let span = bag.open_span(SpanKind::Reference);
        bag.add_link(span, reference.clone());
        bag.push_str(&prefix);
        bag.close_span(span);
        bag.push_str(": ");
        bag.push_str(&content);

        // The index term may be overridden by an <ind> child; otherwise
        // the content without markers and clarifications is used.
        let term = match doc.find_element(node, "ind") {
            Some(ind) => {
                let mut term = String::new();
                doc.append_text(ind, &mut term, &[]);
                collapse_whitespace(&term)
            }
            None => {
                let mut term = String::new();
                doc.append_text(node, &mut term, &["ofc", "klr"]);
                collapse_whitespace(&term)
            }
        };

        if !term.is_empty() {
            self.lang.add_entry(&lang, &term, None, reference);
        }

        Ok(())
    }

    /// `" N"` or `" N.a"` after a translation's back-reference headword,
    /// from the ordinals of the enclosing sense and sub-sense. Senses
    /// without siblings carry no number.
    fn sense_suffix(&self, node: NodeId) -> String {
        let doc = self.doc;

        let mut snc_ordinal = None;
        let mut subsnc_ordinal = None;

        let mut cur = doc.parent(node);
        while let Some(ancestor) = cur {
            match doc.name(ancestor) {
                Some("subsnc") if subsnc_ordinal.is_none() => {
                    subsnc_ordinal = sibling_ordinal(doc, ancestor);
                }
                Some("snc") if snc_ordinal.is_none() => {
                    snc_ordinal = sibling_ordinal(doc, ancestor);
                }
                _ => {}
            }
            cur = doc.parent(ancestor);
        }

        match (snc_ordinal, subsnc_ordinal) {
            (Some(n), Some(m)) => format!(" {}.{}", n + 1, (b'a' + m as u8) as char),
            (Some(n), None) => format!(" {}", n + 1),
            (None, Some(m)) => format!(" {}", (b'a' + m as u8) as char),
            (None, None) => String::new(),
        }
    }

    /// Turns the translation scratch buffers into trailing sections, one
    /// per language, ordered by the orthography of the language name.
    fn flush_translations(&mut self) -> Result<(), PrevoError> {
        let bags = std::mem::take(&mut self.translations);

        let mut flushed: Vec<(String, SpannableBuilder)> = Vec::new();
        for (code, bag) in bags {
            if bag.is_empty() {
                continue;
            }
            let name = match self.lang.name(&code) {
                Some(name) => name.to_string(),
                None => {
                    tracing::warn!(
                        "{}: Translation language \"{code}\" is not in the language list",
                        self.file
                    );
                    code
                }
            };
            flushed.push((name, bag));
        }

        flushed.sort_by(|a, b| orth::cmp_strs(&a.0, &b.0));

        for (name, bag) in flushed {
            self.push_section(SpannableString::plain(name), bag)?;
        }

        Ok(())
    }
}

fn push_children(doc: &Doc, stack: &mut Vec<WorkItem>, node: NodeId) {
    for &child in doc.children(node).iter().rev() {
        stack.push(WorkItem::Node(child));
    }
}

/// Ordinal of `node` among same-named siblings, or `None` when it has no
/// same-named siblings at all (numbering is suppressed for singletons).
fn sibling_ordinal(doc: &Doc, node: NodeId) -> Option<usize> {
    let name = doc.name(node)?;
    let parent = doc.parent(node)?;

    let mut before = 0;
    let mut after = 0;
    let mut seen = false;

    for &sibling in doc.children(parent) {
        if sibling == node {
            seen = true;
            continue;
        }
        if doc.name(sibling) == Some(name) {
            if seen {
                after += 1;
            } else {
                before += 1;
            }
        }
    }

    if before == 0 && after == 0 {
        None
    } else {
        Some(before)
    }
}

/// Collapses ASCII whitespace runs to single spaces and trims the ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for ch in text.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Strips trailing whitespace and a trailing comma from a headword.
fn trim_headword(text: &str) -> String {
    let mut end = text.len();
    let bytes = text.as_bytes();

    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end > 0 && bytes[end - 1] == b',' {
        end -= 1;
    }
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }

    text[..end].to_string()
}

/// Mark name derived from the source file: the base name with its
/// extension stripped.
fn filename_mark(file: &str) -> Option<String> {
    let base = file.rsplit('/').next()?;
    let name = base.strip_suffix(".xml").unwrap_or(base);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Spannable string under construction: text, spans, the deferred
/// paragraph flag, and links pending their final span address.
#[derive(Debug, Default)]
struct SpannableBuilder {
    text: String,
    utf16_len: usize,
    spans: Vec<Span>,
    paragraph_queued: bool,
    links: Vec<(usize, Reference)>,
}

impl SpannableBuilder {
    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn queue_paragraph(&mut self) {
        self.paragraph_queued = true;
    }

    /// Materializes a queued paragraph break. Trailing inter-word spaces
    /// are dropped so a break never follows a space.
    fn flush_paragraph(&mut self) {
        if !self.paragraph_queued {
            return;
        }
        self.paragraph_queued = false;

        if self.text.is_empty() {
            return;
        }

        while self.text.ends_with(' ') {
            self.text.pop();
            self.utf16_len -= 1;
        }
        self.clamp_spans();

        if !self.text.is_empty() {
            self.text.push_str("\n\n");
            self.utf16_len += 2;
        }
    }

    /// Appends literal content (numbering prefixes, icons, expansions).
    fn push_str(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.flush_paragraph();
        self.text.push_str(s);
        self.utf16_len += utf16_len(s);
    }

    /// Appends character data with whitespace normalization: runs of
    /// ASCII whitespace collapse to one space, leading whitespace is
    /// suppressed, and a space is never emitted after a space or a
    /// newline.
    fn push_cdata(&mut self, s: &str) {
        for ch in s.chars() {
            if ch.is_ascii_whitespace() {
                if self.text.is_empty() {
                    continue;
                }
                if self.text.ends_with(' ') || self.text.ends_with('\n') {
                    continue;
                }
                self.text.push(' ');
                self.utf16_len += 1;
            } else {
                self.flush_paragraph();
                self.text.push(ch);
                self.utf16_len += ch.len_utf16();
            }
        }
    }

    fn open_span(&mut self, kind: SpanKind) -> usize {
        // A queued paragraph belongs before the span, not inside it
        self.flush_paragraph();
        self.spans.push(Span {
            start: self.utf16_len as u16,
            length: 0,
            data1: 0,
            data2: 0,
            kind,
        });
        self.spans.len() - 1
    }

    fn close_span(&mut self, span: usize) {
        let span = &mut self.spans[span];
        span.length = (self.utf16_len as u16).saturating_sub(span.start);
    }

    fn add_link(&mut self, span: usize, target: Reference) {
        self.links.push((span, target));
    }

    fn clamp_spans(&mut self) {
        let limit = self.utf16_len as u16;
        for span in &mut self.spans {
            if span.start > limit {
                span.start = limit;
                span.length = 0;
            } else if span.start + span.length > limit {
                span.length = limit - span.start;
            }
        }
    }

    fn finish(mut self) -> (SpannableString, Vec<(usize, Reference)>) {
        while self.text.ends_with(' ') {
            self.text.pop();
            self.utf16_len -= 1;
        }
        self.clamp_spans();

        (
            SpannableString {
                text: self.text,
                spans: self.spans,
            },
            self.links,
        )
    }
}
