//! End-to-end tests over the full pipeline: corpus tree in, binary
//! artifacts out, decoded and checked against the format contracts.

mod common;

use std::fs;

use common::{article, Corpus};
use prevodb::{
    db::article_blob,
    spannable::{utf16_len, SpanKind, SpannableString},
    trie::decode_entries,
};

fn read_blob_strings(blob: &[u8]) -> Vec<SpannableString> {
    let mut strings = Vec::new();
    let mut pos = 0;
    while pos < blob.len() {
        let (s, used) = SpannableString::read(&blob[pos..]).expect("valid spannable string");
        strings.push(s);
        pos += used;
    }
    strings
}

#[test]
fn minimal_article_end_to_end() {
    let corpus = Corpus::new();
    corpus.add_article(
        "abc.xml",
        "<vortaro><art><kap><rad>abc</rad></kap>\
         <drv mrk=\"abc.drv\"><kap><tld/></kap><snc><dif>X</dif></snc></drv>\
         </art></vortaro>",
    );
    let db = corpus.build();

    assert_eq!(db.articles().len(), 1);
    assert_eq!(db.articles()[0].sections.len(), 1);
    assert_eq!(db.articles()[0].sections[0].title.text, "abc");
    assert_eq!(db.articles()[0].sections[0].body.text, "X");
    assert_eq!(db.marks().get("abc.drv"), Some(&(0, 0)));

    let out = tempfile::tempdir().unwrap();
    db.save(out.path()).unwrap();

    let index = fs::read(out.path().join("assets/indices/index-eo.bin")).unwrap();
    let entries = decode_entries(&index).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].word, "abc");
    assert_eq!((entries[0].article, entries[0].section), (0, 0));
}

#[test]
fn tilde_expansion_variants() {
    let corpus = Corpus::new();
    corpus.add_article(
        "kat.xml",
        &article(
            "kat",
            "<drv><kap><tld/>oj</kap><snc><dif><tld/>oj kaj <tld lit=\"K\"/>oj</dif></snc></drv>",
        ),
    );
    let db = corpus.build();

    let section = &db.articles()[0].sections[0];
    assert_eq!(section.title.text, "katoj");
    assert_eq!(section.body.text, "katoj kaj Katoj");
}

#[test]
fn reference_resolution_across_articles() {
    let corpus = Corpus::new();
    corpus.add_article(
        "alfa.xml",
        &article(
            "alfa",
            "<drv mrk=\"a.0\"><kap><tld/></kap><snc><dif>unua</dif></snc></drv>",
        ),
    );
    corpus.add_article(
        "beta.xml",
        &article(
            "beta",
            "<drv><kap><tld/></kap>\
             <snc><ref tip=\"vid\" cel=\"a.0\">alfa</ref></snc>\
             <snc><ref tip=\"vid\" cel=\"missing\">nenio</ref></snc></drv>",
        ),
    );
    let db = corpus.build();

    let body = &db.articles()[1].sections[0].body;
    assert!(body.text.starts_with("1. →"), "body was {:?}", body.text);

    let spans: Vec<_> = body
        .spans
        .iter()
        .filter(|s| s.kind == SpanKind::Reference)
        .collect();
    assert_eq!(spans.len(), 2);

    // Resolved: article 0 (alfa), section 0. Unresolved: warned and (0,0).
    assert_eq!((spans[0].data1, spans[0].data2), (0, 0));
    assert_eq!((spans[1].data1, spans[1].data2), (0, 0));
    assert_eq!(db.marks().get("a.0"), Some(&(0, 0)));
    assert!(db.marks().get("missing").is_none());
}

#[test]
fn esperanto_collation_in_emitted_index() {
    let corpus = Corpus::new();
    corpus.add_article(
        "cx.xml",
        &article("ĉar", "<drv><kap><tld/></kap><snc><dif>d</dif></snc></drv>"),
    );
    corpus.add_article(
        "cent.xml",
        &article("cent", "<drv><kap><tld/></kap><snc><dif>d</dif></snc></drv>"),
    );
    corpus.add_article(
        "cerbo.xml",
        &article("cerbo", "<drv><kap><tld/></kap><snc><dif>d</dif></snc></drv>"),
    );
    let db = corpus.build();

    let out = tempfile::tempdir().unwrap();
    db.save(out.path()).unwrap();

    let index = fs::read(out.path().join("assets/indices/index-eo.bin")).unwrap();
    let words: Vec<String> = decode_entries(&index)
        .unwrap()
        .into_iter()
        .map(|e| e.word)
        .collect();
    assert_eq!(words, vec!["cent", "cerbo", "ĉar"]);

    // Self-delimiting property: the root's offset covers the whole file
    let root = u32::from_le_bytes(index[0..4].try_into().unwrap()) & 0x7fffffff;
    assert_eq!(root as usize, index.len());
}

#[test]
fn paragraph_normalization() {
    let corpus = Corpus::new();
    corpus.add_article(
        "du.xml",
        &article(
            "du",
            "<drv><kap><tld/></kap>\
             <snc><dif>first</dif></snc>\
             <snc><dif>second</dif></snc></drv>",
        ),
    );
    corpus.add_article(
        "unu.xml",
        &article(
            "unu",
            "<drv><kap><tld/></kap><snc><dif>first</dif></snc></drv>",
        ),
    );
    let db = corpus.build();

    assert_eq!(db.articles()[0].sections[0].body.text, "1. first\n\n2. second");
    assert_eq!(db.articles()[1].sections[0].body.text, "first");
}

#[test]
fn utf16_coordinates_with_supplementary_plane() {
    let corpus = Corpus::new();
    corpus.add_article(
        "muz.xml",
        &article(
            "muz",
            "<drv><kap><tld/></kap><snc><dif>x <em>\u{1F000} y</em></dif></snc></drv>",
        ),
    );
    let db = corpus.build();

    let blob = article_blob(&db.articles()[0]).unwrap();
    let strings = read_blob_strings(&blob);
    let body = &strings[2];

    assert_eq!(body.text, "x \u{1F000} y");
    // 'x', ' ', surrogate pair, ' ', 'y'
    assert_eq!(body.utf16_len(), 6);

    let bold = body.spans.iter().find(|s| s.kind == SpanKind::Bold).unwrap();
    assert_eq!(bold.start, 2);
    assert_eq!(bold.length, 4);

    // Plain ASCII text has utf16 length equal to its char count
    assert_eq!(utf16_len("abcdef"), 6);
}

#[test]
fn uppercase_headword_gets_two_index_forms() {
    let corpus = Corpus::new();
    corpus.add_article(
        "lon.xml",
        &article(
            "London",
            "<drv><kap><tld/></kap><snc><dif>urbo</dif></snc></drv>",
        ),
    );
    let db = corpus.build();

    let out = tempfile::tempdir().unwrap();
    db.save(out.path()).unwrap();

    let index = fs::read(out.path().join("assets/indices/index-eo.bin")).unwrap();
    let entries = decode_entries(&index).unwrap();
    assert_eq!(entries.len(), 2);
    // The lower-cased search form and the unchanged form share the
    // reference; only the search form carries a display override
    assert_eq!(entries[0].word, "london");
    assert_eq!(entries[0].display.as_deref(), Some("London"));
    assert_eq!(entries[1].word, "London");
    assert_eq!(entries[1].display, None);
    assert!(entries.iter().all(|e| (e.article, e.section) == (0, 0)));
}

#[test]
fn translations_flow_into_indices_and_sections() {
    let corpus = Corpus::new();
    corpus.add_article(
        "kato.xml",
        &article(
            "kat",
            "<drv mrk=\"kat.0o\"><kap><tld/>o</kap>\
             <snc><dif>hejma besto</dif>\
             <trd lng=\"en\">cat</trd>\
             <trdgrp lng=\"fr\"><trd>chat</trd>, <trd>matou</trd></trdgrp>\
             </snc></drv>",
        ),
    );
    let db = corpus.build();

    let sections = &db.articles()[0].sections;
    assert_eq!(sections.len(), 3);
    assert_eq!(sections[1].title.text, "angla");
    assert_eq!(sections[1].body.text, "~o: cat");
    assert_eq!(sections[2].title.text, "franca");
    assert_eq!(sections[2].body.text, "~o: chat; ~o: matou");

    // Translation prefixes link back to the owning section
    let blob = article_blob(&db.articles()[0]).unwrap();
    let strings = read_blob_strings(&blob);
    // title + 3 sections × (title, body)
    assert_eq!(strings.len(), 7);
    let en_body = &strings[4];
    let prefix_span = en_body
        .spans
        .iter()
        .find(|s| s.kind == SpanKind::Reference)
        .unwrap();
    assert_eq!((prefix_span.start, prefix_span.length), (0, 2));
    assert_eq!((prefix_span.data1, prefix_span.data2), (0, 0));

    let out = tempfile::tempdir().unwrap();
    db.save(out.path()).unwrap();

    let en = fs::read(out.path().join("assets/indices/index-en.bin")).unwrap();
    let en_words: Vec<String> = decode_entries(&en)
        .unwrap()
        .into_iter()
        .map(|e| e.word)
        .collect();
    assert_eq!(en_words, vec!["cat"]);

    let fr = fs::read(out.path().join("assets/indices/index-fr.bin")).unwrap();
    let fr_words: Vec<String> = decode_entries(&fr)
        .unwrap()
        .into_iter()
        .map(|e| e.word)
        .collect();
    assert_eq!(fr_words, vec!["chat", "matou"]);

    // The manifest lists exactly the languages with entries
    let manifest = fs::read_to_string(out.path().join("res/xml/languages.xml")).unwrap();
    assert!(manifest.contains("<lang code=\"eo\">esperanta</lang>"));
    assert!(manifest.contains("<lang code=\"en\">angla</lang>"));
    assert!(manifest.contains("<lang code=\"fr\">franca</lang>"));
    assert!(!manifest.contains("germana"));
}

#[test]
fn external_entities_resolve_through_the_corpus() {
    let corpus = Corpus::new();
    corpus.add_file(
        "dtd/vokoxml.dtd",
        "<!ENTITY ccirc \"&#265;\">\n<!ENTITY scirc \"&#349;\">\n",
    );
    corpus.add_article(
        "cev.xml",
        "<?xml version=\"1.0\"?>\n\
         <!DOCTYPE vortaro SYSTEM \"../dtd/vokoxml.dtd\">\n\
         <vortaro><art><kap><rad>&ccirc;eval</rad></kap>\
         <drv><kap><tld/>o</kap><snc><dif>granda besto, &scirc;atata</dif></snc></drv>\
         </art></vortaro>",
    );
    let db = corpus.build();

    let section = &db.articles()[0].sections[0];
    assert_eq!(section.title.text, "ĉevalo");
    assert_eq!(section.body.text, "granda besto, ŝatata");
}

#[test]
fn single_file_database_round_trips() {
    let corpus = Corpus::new();
    corpus.add_article(
        "kato.xml",
        &article(
            "kat",
            "<drv><kap><tld/>o</kap><snc><dif>besto</dif>\
             <trd lng=\"en\">cat</trd></snc></drv>",
        ),
    );
    corpus.add_article(
        "sano.xml",
        &article(
            "san",
            "<drv><kap><tld/>o</kap><snc><dif>farto</dif></snc></drv>",
        ),
    );
    let db = corpus.build();

    let out = tempfile::tempdir().unwrap();
    let db_path = out.path().join("prevo.db");
    db.save_single(&db_path).unwrap();

    let data = fs::read(&db_path).unwrap();
    assert_eq!(&data[0..4], b"PRDB");

    let n_articles = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    assert_eq!(n_articles, 2);

    for i in 0..n_articles {
        let entry = 8 + i * 4;
        let offset = u32::from_le_bytes(data[entry..entry + 4].try_into().unwrap()) as usize;
        let size = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;

        // Every blob decodes cleanly and every span stays in bounds
        let strings = read_blob_strings(&data[offset + 4..offset + 4 + size]);
        assert!(!strings.is_empty());
        for s in &strings {
            let limit = s.utf16_len();
            for span in &s.spans {
                assert!(span.start as usize + span.length as usize <= limit);
            }
        }
    }
}

#[test]
fn every_emitted_blob_passes_the_decoder() {
    let corpus = Corpus::new();
    corpus.add_article(
        "plena.xml",
        &article(
            "plen",
            "<drv mrk=\"plen.a\"><kap><tld/>a</kap>\
             <snc><dif>kompleta, <ref tip=\"dif\" cel=\"plen.a\">mem</ref></dif>\
             <subsnc><dif>tute</dif></subsnc>\
             <subsnc><dif>ĝisrande</dif></subsnc>\
             </snc>\
             <rim>kun <em>graveco</em></rim>\
             <ekz><tld/>a glaso <aut>Zamenhof</aut></ekz>\
             <trd lng=\"de\">voll</trd></drv>",
        ),
    );
    let db = corpus.build();

    let out = tempfile::tempdir().unwrap();
    db.save(out.path()).unwrap();

    for entry in fs::read_dir(out.path().join("assets/articles")).unwrap() {
        let blob = fs::read(entry.unwrap().path()).unwrap();
        let strings = read_blob_strings(&blob);
        assert!(!strings.is_empty());
    }

    for entry in fs::read_dir(out.path().join("assets/indices")).unwrap() {
        let index = fs::read(entry.unwrap().path()).unwrap();
        decode_entries(&index).unwrap();
    }
}
