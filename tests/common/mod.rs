//! Shared helpers for integration tests: build a throwaway corpus tree
//! in directory layout and run the full compiler over it.

use std::fs;

use prevodb::{db::PrevoDb, source::RevoSource};
use tempfile::TempDir;

pub const DEFAULT_LINGVOJ: &str = "<?xml version=\"1.0\"?>\n\
    <lingvaro>\n\
    <lingvo kodo=\"eo\">esperanta</lingvo>\n\
    <lingvo kodo=\"en\">angla</lingvo>\n\
    <lingvo kodo=\"fr\">franca</lingvo>\n\
    <lingvo kodo=\"de\">germana</lingvo>\n\
    </lingvaro>\n";

pub struct Corpus {
    dir: TempDir,
}

impl Corpus {
    pub fn new() -> Corpus {
        let dir = tempfile::tempdir().expect("temp corpus dir");
        fs::create_dir_all(dir.path().join("cfg")).unwrap();
        fs::create_dir_all(dir.path().join("xml")).unwrap();
        fs::write(dir.path().join("cfg/lingvoj.xml"), DEFAULT_LINGVOJ).unwrap();
        Corpus { dir }
    }

    /// Adds `xml/<name>` with the given content. Articles are compiled
    /// in sorted file-name order, which fixes their article numbers.
    pub fn add_article(&self, name: &str, content: &str) -> &Corpus {
        fs::write(self.dir.path().join("xml").join(name), content).unwrap();
        self
    }

    /// Adds an arbitrary corpus entry such as a DTD file.
    pub fn add_file(&self, path: &str, content: &str) -> &Corpus {
        let full = self.dir.path().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
        self
    }

    pub fn source(&self) -> RevoSource {
        RevoSource::new(self.dir.path()).expect("corpus source")
    }

    pub fn build(&self) -> PrevoDb {
        PrevoDb::build(&self.source()).expect("corpus should compile")
    }
}

/// Wraps derivation markup in the standard article skeleton with the
/// given word root.
pub fn article(root: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<vortaro><art><kap><rad>{root}</rad></kap>{body}</art></vortaro>"
    )
}
