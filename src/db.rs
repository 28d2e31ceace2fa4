//! Database assembly: drives parsing, resolves links, emits output.
//!
//! [`PrevoDb::build`] loads the language list, compiles every article
//! under `xml/*.xml` in order (the order defines article numbers), then
//! rewrites every collected link span with the resolved article and
//! section numbers. The result can be written either as the multi-file
//! layout used on devices or as one self-contained `PRDB` file.
//!
//! ## Single-file layout
//!
//! 1. 4 bytes magic `"PRDB"`;
//! 2. `u32` article count, then one `u32` absolute offset per article;
//! 3. per article: `u32` blob size, then the blob — the title followed by
//!    each section's title and body as serialized spannable strings;
//! 4. `u32` language count, then 8-byte entries (language code padded
//!    with `\0` to four bytes, `u32` absolute offset of the trie block),
//!    sorted ascending by code;
//! 5. per language: the NUL-terminated display name, a `u32` trie size
//!    (high bit reserved for readers), and the compressed trie bytes.
//!
//! All integers little-endian.

use std::{fs, path::Path};

use crate::{
    article::{compile_article, Article, Link, MarkMap, Reference},
    error::PrevoError,
    lang::LanguageRegistry,
    source::RevoSource,
    xml::XmlSession,
};

pub const DB_MAGIC: &[u8; 4] = b"PRDB";

/// Language codes are stored padded to this many bytes plus a NUL.
pub const MAX_LANGUAGE_CODE_LEN: usize = 3;

#[derive(Debug)]
pub struct PrevoDb {
    articles: Vec<Article>,
    lang: LanguageRegistry,
    marks: MarkMap,
}

impl PrevoDb {
    /// Parses the whole corpus and resolves references.
    pub fn build(source: &RevoSource) -> Result<PrevoDb, PrevoError> {
        let session = XmlSession::new(source);
        let mut lang = LanguageRegistry::load(&session)?;

        let files = source.list_files("xml/*.xml")?;
        tracing::info!("Compiling {} articles", files.len());

        let mut articles: Vec<Article> = Vec::with_capacity(files.len());
        let mut marks = MarkMap::new();
        let mut links: Vec<Link> = Vec::new();

        for file in &files {
            tracing::debug!("Parsing {file}");
            let doc = session.load_doc(file)?;
            let article_num = articles.len() as u32;
            let article =
                compile_article(&doc, file, article_num, &mut lang, &mut marks, &mut links)?;
            articles.push(article);
        }

        resolve_links(&mut articles, &links, &marks);

        Ok(PrevoDb {
            articles,
            lang,
            marks,
        })
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.lang
    }

    pub fn marks(&self) -> &MarkMap {
        &self.marks
    }

    /// Writes the multi-file layout: the language manifest and indices,
    /// then `assets/articles/article-<N>.bin` per article.
    pub fn save(&self, dir: &Path) -> Result<(), PrevoError> {
        self.lang
            .save(dir, |reference| resolve_reference(&self.marks, reference))?;

        let articles_dir = dir.join("assets").join("articles");
        fs::create_dir_all(&articles_dir)?;

        for (num, article) in self.articles.iter().enumerate() {
            let blob = article_blob(article)?;
            let path = articles_dir.join(format!("article-{num}.bin"));
            fs::write(&path, blob)
                .map_err(|e| PrevoError::Io(format!("{}: {e}", path.display())))?;
        }

        tracing::info!(
            "Wrote {} articles to {}",
            self.articles.len(),
            articles_dir.display()
        );

        Ok(())
    }

    /// Writes everything into one `PRDB` file.
    pub fn save_single(&self, path: &Path) -> Result<(), PrevoError> {
        let blobs: Vec<Vec<u8>> = self
            .articles
            .iter()
            .map(article_blob)
            .collect::<Result<_, _>>()?;

        // Non-empty language indices, sorted ascending by code for the
        // reader's binary search
        let mut tries: Vec<(&str, &str, Vec<u8>)> = Vec::new();
        for language in self.lang.languages() {
            if language.trie.is_empty() {
                continue;
            }
            if language.code.len() > MAX_LANGUAGE_CODE_LEN {
                return Err(PrevoError::BadFormat(format!(
                    "Language code {:?} does not fit the {MAX_LANGUAGE_CODE_LEN}-byte table entry",
                    language.code
                )));
            }
            let data = language
                .trie
                .compress(|reference| resolve_reference(&self.marks, reference))?;
            tries.push((&language.code, &language.name, data));
        }
        tries.sort_by(|a, b| a.0.cmp(b.0));

        let mut out: Vec<u8> = Vec::new();
        out.extend_from_slice(DB_MAGIC);
        out.extend_from_slice(&(self.articles.len() as u32).to_le_bytes());

        // Article offset table, then the length-framed blobs
        let mut pos = out.len() + blobs.len() * 4;
        for blob in &blobs {
            out.extend_from_slice(&(pos as u32).to_le_bytes());
            pos += 4 + blob.len();
        }
        for blob in &blobs {
            out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
            out.extend_from_slice(blob);
        }

        out.extend_from_slice(&(tries.len() as u32).to_le_bytes());

        let entry_size = MAX_LANGUAGE_CODE_LEN + 1 + 4;
        let mut block_pos = out.len() + tries.len() * entry_size;
        for (code, name, data) in &tries {
            let mut padded = [0u8; MAX_LANGUAGE_CODE_LEN + 1];
            padded[..code.len()].copy_from_slice(code.as_bytes());
            out.extend_from_slice(&padded);
            out.extend_from_slice(&(block_pos as u32).to_le_bytes());
            block_pos += name.len() + 1 + 4 + data.len();
        }

        for (_code, name, data) in &tries {
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }

        fs::write(path, out).map_err(|e| PrevoError::Io(format!("{}: {e}", path.display())))?;

        tracing::info!("Wrote single-file database to {}", path.display());
        Ok(())
    }
}

/// One article blob: the title, then each section's title and body.
/// Sections carry no outer framing; the database framing bounds them.
pub fn article_blob(article: &Article) -> Result<Vec<u8>, PrevoError> {
    let mut out = Vec::new();
    article.title.write(&mut out)?;
    for section in &article.sections {
        section.title.write(&mut out)?;
        section.body.write(&mut out)?;
    }
    Ok(out)
}

/// Maps a reference to final (article, section) numbers. Unresolved mark
/// names are reported and fall back to (0, 0); the span is kept.
pub fn resolve_reference(marks: &MarkMap, reference: &Reference) -> (u32, u32) {
    match reference {
        Reference::Direct { article, section } => (*article, *section),
        Reference::Mark(name) => match marks.get(name) {
            Some(&target) => target,
            None => {
                tracing::warn!("Unresolved reference \"{name}\"");
                (0, 0)
            }
        },
    }
}

fn resolve_links(articles: &mut [Article], links: &[Link], marks: &MarkMap) {
    for link in links {
        let (article_num, section_num) = resolve_reference(marks, &link.target);

        let span =
            &mut articles[link.article].sections[link.section].body.spans[link.span];
        span.data1 = article_num.min(u16::MAX as u32) as u16;
        span.data2 = section_num.min(u16::MAX as u32) as u16;
    }
}
