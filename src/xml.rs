//! XML event source.
//!
//! Wraps a streaming `quick_xml` reader and layers on the pieces the
//! corpus needs: documents are fetched through the [`RevoSource`], the
//! external DTD subset named by `<!DOCTYPE … SYSTEM "…">` is resolved
//! relative to the current document's base path (nested loads go through
//! the same source reader), general entities declared there are expanded
//! in character data and attribute values, and every failure is reported
//! with a `file:line:column` prefix.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{
    doc::{Doc, DocBuilder},
    error::PrevoError,
    source::RevoSource,
};

/// Recursion guard for entities defined in terms of other entities.
const MAX_ENTITY_DEPTH: u8 = 16;

pub struct XmlSession<'s> {
    source: &'s RevoSource,
}

impl<'s> XmlSession<'s> {
    pub fn new(source: &'s RevoSource) -> XmlSession<'s> {
        XmlSession { source }
    }

    /// Loads one document into an in-memory tree.
    pub fn load_doc(&self, path: &str) -> Result<Doc, PrevoError> {
        let content = self.source.read_to_string(path)?;
        let base = match path.rfind('/') {
            Some(idx) => &path[..idx],
            None => "",
        };

        let mut reader = Reader::from_str(&content);
        let mut builder = DocBuilder::new();
        let mut entities: HashMap<String, String> = HashMap::new();

        loop {
            let event = reader.read_event().map_err(|e| {
                parse_error(path, &content, reader.buffer_position() as usize, &e.to_string())
            })?;

            match event {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) => {}
                Event::DocType(t) => {
                    let raw = String::from_utf8(t.into_inner().into_owned())?;
                    self.collect_doctype_entities(&raw, base, &mut entities)?;
                }
                Event::Start(e) => {
                    let (name, atts) = self.decode_element(path, &content, &reader, &e, &entities)?;
                    builder.start_element(name, atts);
                }
                Event::Empty(e) => {
                    let (name, atts) = self.decode_element(path, &content, &reader, &e, &entities)?;
                    builder.start_element(name, atts);
                    builder.end_element();
                }
                Event::End(_) => builder.end_element(),
                Event::Text(t) => {
                    let raw = std::str::from_utf8(&t.into_inner())?.to_string();
                    let expanded = expand_entities(&raw, &entities, 0).map_err(|msg| {
                        parse_error(path, &content, reader.buffer_position() as usize, &msg)
                    })?;
                    builder.text(&expanded);
                }
                Event::CData(t) => {
                    let raw = std::str::from_utf8(&t.into_inner())?.to_string();
                    builder.text(&raw);
                }
                Event::Eof => break,
            }
        }

        builder.finish().map_err(|e| match e {
            PrevoError::BadFormat(msg) => PrevoError::BadFormat(format!("{path}: {msg}")),
            other => other,
        })
    }

    fn decode_element(
        &self,
        path: &str,
        content: &str,
        reader: &Reader<&[u8]>,
        element: &BytesStart<'_>,
        entities: &HashMap<String, String>,
    ) -> Result<(String, Vec<(String, String)>), PrevoError> {
        let name = std::str::from_utf8(element.name().as_ref())?.to_string();

        let mut atts = Vec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| {
                parse_error(path, content, reader.buffer_position() as usize, &e.to_string())
            })?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let raw = std::str::from_utf8(&attr.value)?;
            let value = expand_entities(raw, entities, 0).map_err(|msg| {
                parse_error(path, content, reader.buffer_position() as usize, &msg)
            })?;
            atts.push((key, value));
        }

        Ok((name, atts))
    }

    /// Pulls entity declarations out of a `<!DOCTYPE …>` payload: first
    /// from the external subset named after `SYSTEM` (loaded relative to
    /// `base`), then from the internal `[ … ]` subset, which overrides.
    fn collect_doctype_entities(
        &self,
        doctype: &str,
        base: &str,
        entities: &mut HashMap<String, String>,
    ) -> Result<(), PrevoError> {
        let internal = doctype
            .find('[')
            .and_then(|open| doctype.rfind(']').map(|close| &doctype[open + 1..close]));
        let external_part = match doctype.find('[') {
            Some(open) => &doctype[..open],
            None => doctype,
        };

        if let Some(system_id) = find_system_id(external_part) {
            let dtd_path = if base.is_empty() {
                system_id.to_string()
            } else {
                format!("{base}/{system_id}")
            };
            let dtd = self.source.read_to_string(&dtd_path)?;
            let dtd_base = match dtd_path.rfind('/') {
                Some(idx) => &dtd_path[..idx],
                None => "",
            };
            self.collect_dtd_entities(&dtd, dtd_base, &dtd_path, entities)?;
        }

        if let Some(subset) = internal {
            self.collect_dtd_entities(subset, base, "internal subset", entities)?;
        }

        Ok(())
    }

    /// Scans a DTD fragment for `<!ENTITY>` declarations. Parameter
    /// entities with external system identifiers are loaded through the
    /// source reader (relative to `base`) and their `%name;` inclusions
    /// substituted before the general entities are collected.
    fn collect_dtd_entities(
        &self,
        dtd: &str,
        base: &str,
        context: &str,
        entities: &mut HashMap<String, String>,
    ) -> Result<(), PrevoError> {
        let mut params: HashMap<String, String> = HashMap::new();
        for decl in EntityDecls::new(dtd) {
            let decl = decl?;
            if !decl.parameter {
                continue;
            }
            let value = match decl.value {
                EntityValue::Literal(v) => v,
                EntityValue::System(id) => {
                    let include_path = if base.is_empty() {
                        id
                    } else {
                        format!("{base}/{id}")
                    };
                    self.source.read_to_string(&include_path)?
                }
            };
            params.insert(decl.name, value);
        }

        let mut text = dtd.to_string();
        for (name, value) in &params {
            text = text.replace(&format!("%{name};"), value);
        }

        for decl in EntityDecls::new(&text) {
            let decl = decl?;
            if decl.parameter {
                continue;
            }
            match decl.value {
                EntityValue::Literal(value) => {
                    entities.insert(decl.name, value);
                }
                EntityValue::System(id) => {
                    tracing::warn!(
                        "Ignoring external general entity &{}; (SYSTEM {id:?}) in {context}",
                        decl.name
                    );
                }
            }
        }

        Ok(())
    }
}

fn parse_error(file: &str, content: &str, offset: usize, message: &str) -> PrevoError {
    let (line, column) = position_at(content, offset);
    PrevoError::Parse(format!("{file}:{line}:{column}: {message}"))
}

/// 1-based line and column for a byte offset.
fn position_at(content: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(content.len());
    while offset > 0 && !content.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &content[..offset];
    let line = before.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

enum EntityValue {
    Literal(String),
    System(String),
}

struct EntityDecl {
    parameter: bool,
    name: String,
    value: EntityValue,
}

/// Iterator over `<!ENTITY …>` declarations in a DTD fragment. Comments
/// are skipped; anything else unparseable is reported as bad format.
struct EntityDecls<'a> {
    rest: &'a str,
}

impl<'a> EntityDecls<'a> {
    fn new(dtd: &'a str) -> EntityDecls<'a> {
        EntityDecls { rest: dtd }
    }
}

impl Iterator for EntityDecls<'_> {
    type Item = Result<EntityDecl, PrevoError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Drop comments so commented-out declarations are not seen
            if let Some(comment) = self.rest.find("<!--") {
                if self.rest[..comment].find("<!ENTITY").is_none() {
                    match self.rest[comment..].find("-->") {
                        Some(end) => {
                            self.rest = &self.rest[comment + end + 3..];
                            continue;
                        }
                        None => {
                            self.rest = "";
                            return None;
                        }
                    }
                }
            }

            let start = self.rest.find("<!ENTITY")?;
            let after = &self.rest[start + "<!ENTITY".len()..];
            let close = match after.find('>') {
                Some(idx) => idx,
                None => {
                    self.rest = "";
                    return Some(Err(PrevoError::BadFormat(
                        "Unterminated <!ENTITY> declaration".to_string(),
                    )));
                }
            };
            let body = after[..close].trim();
            self.rest = &after[close + 1..];

            match parse_entity_body(body) {
                Some(decl) => return Some(Ok(decl)),
                None => {
                    return Some(Err(PrevoError::BadFormat(format!(
                        "Malformed entity declaration: <!ENTITY {body}>"
                    ))))
                }
            }
        }
    }
}

fn parse_entity_body(body: &str) -> Option<EntityDecl> {
    let mut rest = body;

    let parameter = rest.starts_with('%');
    if parameter {
        rest = rest[1..].trim_start();
    }

    let name_end = rest.find(|c: char| c.is_ascii_whitespace())?;
    let name = rest[..name_end].to_string();
    rest = rest[name_end..].trim_start();

    if let Some(after_system) = rest.strip_prefix("SYSTEM") {
        let id = parse_quoted(after_system.trim_start())?;
        return Some(EntityDecl {
            parameter,
            name,
            value: EntityValue::System(id),
        });
    }

    let value = parse_quoted(rest)?;
    Some(EntityDecl {
        parameter,
        name,
        value: EntityValue::Literal(value),
    })
}

fn parse_quoted(text: &str) -> Option<String> {
    let quote = text.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let inner = &text[1..];
    let end = inner.find(quote)?;
    Some(inner[..end].to_string())
}

fn find_system_id(doctype: &str) -> Option<String> {
    let idx = doctype.find("SYSTEM")?;
    parse_quoted(doctype[idx + "SYSTEM".len()..].trim_start())
}

/// Expands character references and general entity references. Standard
/// XML entities are built in; everything else must come from the
/// document's DTD. Entity replacement text may itself contain references.
pub fn expand_entities(
    raw: &str,
    entities: &HashMap<String, String>,
    depth: u8,
) -> Result<String, String> {
    if depth > MAX_ENTITY_DEPTH {
        return Err("Entity references nested too deeply".to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let Some(semi) = after.find(';') else {
            return Err(format!("Unterminated entity reference near {:?}", &rest[amp..]));
        };
        let name = &after[..semi];

        if let Some(code) = name.strip_prefix('#') {
            let value = if let Some(hex) = code.strip_prefix('x').or_else(|| code.strip_prefix('X'))
            {
                u32::from_str_radix(hex, 16)
            } else {
                code.parse::<u32>()
            };
            let ch = value
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| format!("Invalid character reference &{name};"))?;
            out.push(ch);
        } else {
            match name {
                "amp" => out.push('&'),
                "lt" => out.push('<'),
                "gt" => out.push('>'),
                "apos" => out.push('\''),
                "quot" => out.push('"'),
                _ => match entities.get(name) {
                    Some(replacement) => {
                        out.push_str(&expand_entities(replacement, entities, depth + 1)?)
                    }
                    None => return Err(format!("Undefined entity &{name};")),
                },
            }
        }

        rest = &after[semi + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dir_source(files: &[(&str, &str)]) -> (tempfile::TempDir, RevoSource) {
        let tmp = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = tmp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        let source = RevoSource::new(tmp.path()).unwrap();
        (tmp, source)
    }

    #[test]
    fn loads_simple_document() {
        let (_tmp, source) = dir_source(&[(
            "xml/a.xml",
            "<?xml version=\"1.0\"?><art><kap>kato</kap></art>",
        )]);
        let session = XmlSession::new(&source);
        let doc = session.load_doc("xml/a.xml").unwrap();

        assert_eq!(doc.name(doc.root()), Some("art"));
        let kap = doc.child_element(doc.root(), "kap").unwrap();
        let mut text = String::new();
        doc.append_text(kap, &mut text, &[]);
        assert_eq!(text, "kato");
    }

    #[test]
    fn expands_entities_from_external_dtd() {
        let (_tmp, source) = dir_source(&[
            (
                "xml/a.xml",
                "<?xml version=\"1.0\"?>\n\
                 <!DOCTYPE vortaro SYSTEM \"../dtd/vokoxml.dtd\">\n\
                 <vortaro><art><kap>&ccirc;evalo</kap></art></vortaro>",
            ),
            (
                "dtd/vokoxml.dtd",
                "<!-- voko entities -->\n<!ENTITY ccirc \"&#265;\">\n<!ENTITY gcirc \"&#285;\">\n",
            ),
        ]);
        let session = XmlSession::new(&source);
        let doc = session.load_doc("xml/a.xml").unwrap();

        let art = doc.find_element(doc.root(), "art").unwrap();
        let kap = doc.child_element(art, "kap").unwrap();
        let mut text = String::new();
        doc.append_text(kap, &mut text, &[]);
        assert_eq!(text, "ĉevalo");
    }

    #[test]
    fn internal_subset_overrides_external() {
        let (_tmp, source) = dir_source(&[
            (
                "xml/a.xml",
                "<!DOCTYPE vortaro SYSTEM \"../dtd/v.dtd\" [<!ENTITY nomo \"loka\">]>\n\
                 <vortaro>&nomo;</vortaro>",
            ),
            ("dtd/v.dtd", "<!ENTITY nomo \"ekstera\">"),
        ]);
        let session = XmlSession::new(&source);
        let doc = session.load_doc("xml/a.xml").unwrap();

        let mut text = String::new();
        doc.append_text(doc.root(), &mut text, &[]);
        assert_eq!(text, "loka");
    }

    #[test]
    fn parameter_entity_includes_are_resolved() {
        let (_tmp, source) = dir_source(&[
            (
                "xml/a.xml",
                "<!DOCTYPE vortaro SYSTEM \"../dtd/v.dtd\">\n<vortaro>&hato;</vortaro>",
            ),
            (
                "dtd/v.dtd",
                "<!ENTITY % agordoj SYSTEM \"agordoj.ent\">\n%agordoj;\n",
            ),
            ("dtd/agordoj.ent", "<!ENTITY hato \"&#349;\">"),
        ]);
        let session = XmlSession::new(&source);
        let doc = session.load_doc("xml/a.xml").unwrap();

        let mut text = String::new();
        doc.append_text(doc.root(), &mut text, &[]);
        assert_eq!(text, "ŝ");
    }

    #[test]
    fn entities_in_attribute_values() {
        let (_tmp, source) = dir_source(&[(
            "xml/a.xml",
            "<!DOCTYPE x [<!ENTITY kaj \"&amp;\">]><x nomo=\"a&kaj;b\"/>",
        )]);
        let session = XmlSession::new(&source);
        let doc = session.load_doc("xml/a.xml").unwrap();
        assert_eq!(doc.attribute(doc.root(), "nomo"), Some("a&b"));
    }

    #[test]
    fn undefined_entity_reports_position() {
        let (_tmp, source) = dir_source(&[("xml/a.xml", "<x>line one\n&mankas;</x>")]);
        let session = XmlSession::new(&source);
        let err = session.load_doc("xml/a.xml").unwrap_err();

        match err {
            PrevoError::Parse(msg) => {
                assert!(msg.starts_with("xml/a.xml:"), "message was {msg:?}");
                assert!(msg.contains("mankas"), "message was {msg:?}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_xml_reports_position() {
        let (_tmp, source) = dir_source(&[("xml/a.xml", "<art><kap>x</wrong></art>")]);
        let session = XmlSession::new(&source);
        let err = session.load_doc("xml/a.xml").unwrap_err();
        assert!(matches!(err, PrevoError::Parse(msg) if msg.starts_with("xml/a.xml:")));
    }

    #[test]
    fn position_math() {
        let content = "abc\ndef\nghi";
        assert_eq!(position_at(content, 0), (1, 1));
        assert_eq!(position_at(content, 5), (2, 2));
        assert_eq!(position_at(content, 8), (3, 1));
    }

    #[test]
    fn character_references() {
        let entities = HashMap::new();
        assert_eq!(
            expand_entities("a&#265;b&#x109;c", &entities, 0).unwrap(),
            "aĉbĉc"
        );
        assert!(expand_entities("&#xZZ;", &entities, 0).is_err());
        assert!(expand_entities("&broken", &entities, 0).is_err());
    }
}
