//! Language registry and per-language search indices.
//!
//! `cfg/lingvoj.xml` names every language a translation may carry. Each
//! recognized code gets its own [`TrieBuilder`]; the list is kept sorted
//! by the orthography comparator on the display name, which is also the
//! order of the saved manifest.

use std::{collections::HashMap, fs, path::Path};

use crate::{
    article::Reference,
    doc::{Doc, NodeId},
    error::PrevoError,
    orth,
    trie::TrieBuilder,
    xml::XmlSession,
};

const LANGUAGE_LIST_PATH: &str = "cfg/lingvoj.xml";

#[derive(Debug)]
pub struct Language {
    pub code: String,
    pub name: String,
    pub trie: TrieBuilder<Reference>,
}

#[derive(Debug)]
pub struct LanguageRegistry {
    /// Sorted by orthography on the display name.
    languages: Vec<Language>,
    by_code: HashMap<String, usize>,
}

impl LanguageRegistry {
    /// Parses `cfg/lingvoj.xml` and allocates an empty trie per language.
    pub fn load(session: &XmlSession<'_>) -> Result<LanguageRegistry, PrevoError> {
        let doc = session.load_doc(LANGUAGE_LIST_PATH)?;

        let mut languages = Vec::new();
        collect_languages(&doc, doc.root(), &mut languages)?;

        languages.sort_by(|a, b| orth::cmp_strs(&a.name, &b.name));

        let by_code = languages
            .iter()
            .enumerate()
            .map(|(idx, lang)| (lang.code.clone(), idx))
            .collect();

        tracing::debug!("Loaded {} languages from {LANGUAGE_LIST_PATH}", languages.len());

        Ok(LanguageRegistry { languages, by_code })
    }

    #[cfg(test)]
    pub(crate) fn with_languages(pairs: &[(&str, &str)]) -> LanguageRegistry {
        let mut languages: Vec<Language> = pairs
            .iter()
            .map(|(code, name)| Language {
                code: code.to_string(),
                name: name.to_string(),
                trie: TrieBuilder::new(),
            })
            .collect();
        languages.sort_by(|a, b| orth::cmp_strs(&a.name, &b.name));
        let by_code = languages
            .iter()
            .enumerate()
            .map(|(idx, lang)| (lang.code.clone(), idx))
            .collect();
        LanguageRegistry { languages, by_code }
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn name(&self, code: &str) -> Option<&str> {
        self.by_code
            .get(code)
            .map(|&idx| self.languages[idx].name.as_str())
    }

    pub fn trie(&self, code: &str) -> Option<&TrieBuilder<Reference>> {
        self.by_code.get(code).map(|&idx| &self.languages[idx].trie)
    }

    /// Adds a search entry to a language's index. Unknown language codes
    /// are ignored, matching the behavior of the original data set where
    /// only listed languages are searchable.
    ///
    /// Case-insensitive search falls out here: a term containing an
    /// upper-case character is additionally stored lower-cased with the
    /// original form as its display, so readers can match without
    /// folding.
    pub fn add_entry(
        &mut self,
        code: &str,
        name: &str,
        display: Option<&str>,
        reference: Reference,
    ) {
        let Some(&idx) = self.by_code.get(code) else {
            return;
        };
        let trie = &mut self.languages[idx].trie;

        trie.add_word(name, display, reference.clone());

        if name.chars().any(char::is_uppercase) {
            let lowered = name.to_lowercase();
            trie.add_word(&lowered, Some(display.unwrap_or(name)), reference);
        }
    }

    /// Writes `res/xml/languages.xml` and one `assets/indices/index-<code>.bin`
    /// per language with a non-empty index. `resolve` maps trie references
    /// to final (article, section) numbers.
    pub fn save<F>(&self, dir: &Path, resolve: F) -> Result<(), PrevoError>
    where
        F: Fn(&Reference) -> (u32, u32),
    {
        self.save_language_list(dir)?;
        self.save_indices(dir, resolve)
    }

    fn save_language_list(&self, dir: &Path) -> Result<(), PrevoError> {
        let res_dir = dir.join("res").join("xml");
        fs::create_dir_all(&res_dir)?;

        let mut out = String::from("<?xml version=\"1.0\"?>\n<languages>\n");
        for lang in &self.languages {
            if lang.trie.is_empty() {
                continue;
            }
            out.push_str("<lang code=\"");
            push_escaped(&mut out, &lang.code);
            out.push_str("\">");
            push_escaped(&mut out, &lang.name);
            out.push_str("</lang>\n");
        }
        out.push_str("</languages>\n");

        let path = res_dir.join("languages.xml");
        fs::write(&path, out).map_err(|e| PrevoError::Io(format!("{}: {e}", path.display())))
    }

    fn save_indices<F>(&self, dir: &Path, resolve: F) -> Result<(), PrevoError>
    where
        F: Fn(&Reference) -> (u32, u32),
    {
        let indices_dir = dir.join("assets").join("indices");
        fs::create_dir_all(&indices_dir)?;

        for lang in &self.languages {
            if lang.trie.is_empty() {
                continue;
            }
            let data = lang.trie.compress(&resolve)?;
            let path = indices_dir.join(format!("index-{}.bin", lang.code));
            tracing::debug!(
                "Writing {} ({} entries, {} bytes)",
                path.display(),
                lang.trie.entry_count(),
                data.len()
            );
            fs::write(&path, data)
                .map_err(|e| PrevoError::Io(format!("{}: {e}", path.display())))?;
        }

        Ok(())
    }
}

fn collect_languages(
    doc: &Doc,
    node: NodeId,
    out: &mut Vec<Language>,
) -> Result<(), PrevoError> {
    if doc.is_element(node, "lingvo") {
        let code = doc.attribute(node, "kodo").ok_or_else(|| {
            PrevoError::BadFormat(format!(
                "{LANGUAGE_LIST_PATH}: Missing attribute \u{201c}kodo\u{201d} on element \u{201c}lingvo\u{201d}"
            ))
        })?;

        let mut name = String::new();
        doc.append_text(node, &mut name, &[]);
        let name = name.split_ascii_whitespace().collect::<Vec<_>>().join(" ");

        out.push(Language {
            code: code.to_string(),
            name,
            trie: TrieBuilder::new(),
        });
        return Ok(());
    }

    for &child in doc.children(node) {
        collect_languages(doc, child, out)?;
    }

    Ok(())
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
