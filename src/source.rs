//! Source reader for the ReVo corpus.
//!
//! The corpus arrives either as a ZIP archive or as an unpacked directory
//! tree. Both variants expose the same two operations over virtual paths
//! (relative to a conceptual `revo/` prefix): list the entries matching a
//! glob, and open one entry as a byte stream. Archive mode shells out to
//! `unzip -l` / `unzip -p`, which must be present in `PATH`; directory
//! mode reads the filesystem directly.

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdout, Command, Stdio},
};

use glob::Pattern;
use walkdir::WalkDir;

use crate::error::PrevoError;

/// Read granularity for subprocess and file streaming.
const CHUNK_SIZE: usize = 512;

#[derive(Debug)]
pub enum RevoSource {
    Directory(PathBuf),
    Archive(PathBuf),
}

impl RevoSource {
    /// Chooses the variant by inspecting the path: a directory is read in
    /// place, anything else is treated as a ZIP archive.
    pub fn new(path: &Path) -> Result<RevoSource, PrevoError> {
        let meta = std::fs::metadata(path)
            .map_err(|e| PrevoError::NotFound(format!("{}: {e}", path.display())))?;

        if meta.is_dir() {
            Ok(RevoSource::Directory(path.to_path_buf()))
        } else {
            Ok(RevoSource::Archive(path.to_path_buf()))
        }
    }

    /// Lists entries matching `pattern` (a virtual path glob such as
    /// `xml/*.xml`), sorted for reproducible article numbering.
    pub fn list_files(&self, pattern: &str) -> Result<Vec<String>, PrevoError> {
        let matcher = Pattern::new(pattern)
            .map_err(|e| PrevoError::BadFormat(format!("Bad glob pattern {pattern:?}: {e}")))?;

        let mut files = match self {
            RevoSource::Directory(root) => list_directory(root, &matcher)?,
            RevoSource::Archive(zip) => list_archive(zip, pattern, &matcher)?,
        };

        files.sort();
        Ok(files)
    }

    /// Opens one entry as a stream. The returned handle reads in bounded
    /// chunks; archive mode pipes `unzip -p` and reports tool failures
    /// when the stream is drained.
    pub fn open(&self, path: &str) -> Result<SourceFile, PrevoError> {
        match self {
            RevoSource::Directory(root) => {
                let full = root.join(normalize_path(path));
                let file = File::open(&full)
                    .map_err(|e| PrevoError::NotFound(format!("{}: {e}", full.display())))?;
                Ok(SourceFile::Plain(file))
            }
            RevoSource::Archive(zip) => {
                let entry = format!("revo/{}", normalize_path(path));
                spawn_unzip(&["-p", &zip.to_string_lossy(), &entry])
            }
        }
    }

    /// Convenience wrapper: opens and fully reads one UTF-8 entry.
    pub fn read_to_string(&self, path: &str) -> Result<String, PrevoError> {
        let mut file = self.open(path)?;
        let mut data = Vec::new();
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let got = file.read_chunk(&mut buf)?;
            if got == 0 {
                break;
            }
            data.extend_from_slice(&buf[..got]);
        }

        Ok(String::from_utf8(data)?)
    }
}

/// Collapses `.` and `..` components so archive entry names cannot escape
/// the virtual root.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}

fn list_directory(root: &Path, matcher: &Pattern) -> Result<Vec<String>, PrevoError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| PrevoError::Io(format!("{e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| PrevoError::Io(format!("{e}")))?;
        let virt = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.matches(&virt) {
            files.push(virt);
        }
    }

    Ok(files)
}

fn list_archive(zip: &Path, pattern: &str, matcher: &Pattern) -> Result<Vec<String>, PrevoError> {
    let archive_glob = format!("revo/{pattern}");
    let mut file = spawn_unzip(&["-l", &zip.to_string_lossy(), &archive_glob])?;

    let mut parser = ListingParser::default();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let got = file.read_chunk(&mut buf)?;
        if got == 0 {
            break;
        }
        parser.handle_data(&buf[..got])?;
    }

    let mut files = Vec::new();
    for name in parser.files {
        // Entries come back with the archive's revo/ prefix; directories
        // and stray non-matching names are dropped.
        let Some(virt) = name.strip_prefix("revo/") else {
            continue;
        };
        if virt.is_empty() || virt.ends_with('/') {
            continue;
        }
        if matcher.matches(virt) {
            files.push(virt.to_string());
        }
    }

    Ok(files)
}

/// Incremental parser for `unzip -l` output. File names live in the fourth
/// whitespace-separated column between the two `---` separator lines.
#[derive(Debug, Default)]
struct ListingParser {
    line_buf: String,
    files: Vec<String>,
    in_list: bool,
}

impl ListingParser {
    fn handle_data(&mut self, data: &[u8]) -> Result<(), PrevoError> {
        if data.contains(&0) {
            return Err(PrevoError::BadFormat(
                "Embedded '\\0' found in unzip listing".to_string(),
            ));
        }

        self.line_buf.push_str(std::str::from_utf8(data)?);

        while let Some(newline) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline).collect();
            self.process_line(line.trim_end_matches(['\n', '\r']))?;
        }

        Ok(())
    }

    fn process_line(&mut self, line: &str) -> Result<(), PrevoError> {
        if line.starts_with("---") {
            self.in_list = !self.in_list;
            return Ok(());
        }

        if !self.in_list {
            return Ok(());
        }

        let mut rest = line;

        // Skip the length, date and time columns
        for _ in 0..3 {
            rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
            let end = rest
                .find(|c: char| c.is_ascii_whitespace())
                .ok_or_else(|| PrevoError::Unzip("Unexpected data from unzip".to_string()))?;
            rest = &rest[end..];
        }

        let name = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
        if name.is_empty() {
            return Err(PrevoError::Unzip("Unexpected data from unzip".to_string()));
        }

        self.files.push(name.to_string());
        Ok(())
    }
}

/// An open source entry: either a plain file or the stdout of an `unzip`
/// child process.
pub enum SourceFile {
    Plain(File),
    Unzip {
        child: Child,
        stdout: ChildStdout,
        stderr: ChildStderr,
        done: bool,
    },
}

impl SourceFile {
    /// Reads the next chunk into `buf`, returning the number of bytes
    /// read; 0 means end of stream. For the subprocess variant the tool's
    /// exit status is checked once its output is exhausted, so a failing
    /// `unzip` surfaces as an error rather than a silently short read.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, PrevoError> {
        match self {
            SourceFile::Plain(file) => Ok(file.read(buf)?),
            SourceFile::Unzip {
                child,
                stdout,
                stderr,
                done,
            } => {
                if *done {
                    return Ok(0);
                }

                let got = stdout.read(buf)?;
                if got > 0 {
                    return Ok(got);
                }

                *done = true;

                let mut err_buf = String::new();
                stderr.read_to_string(&mut err_buf).ok();
                let status = child.wait()?;

                if status.success() {
                    Ok(0)
                } else {
                    let message = err_buf
                        .lines()
                        .next()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .unwrap_or("Unzip failed")
                        .to_string();
                    Err(PrevoError::Unzip(message))
                }
            }
        }
    }
}

impl Drop for SourceFile {
    fn drop(&mut self) {
        if let SourceFile::Unzip { child, done, .. } = self {
            if !*done {
                child.kill().ok();
                child.wait().ok();
            }
        }
    }
}

fn spawn_unzip(args: &[&str]) -> Result<SourceFile, PrevoError> {
    tracing::debug!("Spawning unzip {:?}", args);

    let mut child = Command::new("unzip")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| PrevoError::Unzip(format!("Failed to spawn unzip: {e}")))?;

    let stdout = child.stdout.take().expect("stdout was piped");
    let stderr = child.stderr.take().expect("stderr was piped");

    Ok(SourceFile::Unzip {
        child,
        stdout,
        stderr,
        done: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(normalize_path("xml/abc.xml"), "xml/abc.xml");
        assert_eq!(normalize_path("xml/./abc.xml"), "xml/abc.xml");
        assert_eq!(normalize_path("xml/../dtd/voko.dtd"), "dtd/voko.dtd");
        assert_eq!(normalize_path("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize_path("a//b"), "a/b");
    }

    #[test]
    fn directory_listing_matches_glob() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("xml")).unwrap();
        fs::create_dir_all(tmp.path().join("cfg")).unwrap();
        fs::write(tmp.path().join("xml/b.xml"), "<x/>").unwrap();
        fs::write(tmp.path().join("xml/a.xml"), "<x/>").unwrap();
        fs::write(tmp.path().join("xml/notes.txt"), "").unwrap();
        fs::write(tmp.path().join("cfg/lingvoj.xml"), "<x/>").unwrap();

        let source = RevoSource::new(tmp.path()).unwrap();
        let files = source.list_files("xml/*.xml").unwrap();
        assert_eq!(files, vec!["xml/a.xml", "xml/b.xml"]);
    }

    #[test]
    fn directory_open_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("cfg")).unwrap();
        fs::write(tmp.path().join("cfg/lingvoj.xml"), "enhavo").unwrap();

        let source = RevoSource::new(tmp.path()).unwrap();
        assert_eq!(source.read_to_string("cfg/lingvoj.xml").unwrap(), "enhavo");
        assert!(matches!(
            source.read_to_string("cfg/missing.xml"),
            Err(PrevoError::NotFound(_))
        ));
    }

    #[test]
    fn listing_parser_takes_fourth_column() {
        let listing = b"Archive: revo.zip\n\
              Length      Date    Time    Name\n\
            ---------  ---------- -----   ----\n\
                 1024  2012-03-04 10:20   revo/xml/a.xml\n\
                 2048  2012-03-04 10:21   revo/xml/b.xml\n\
            ---------                     -------\n\
                 3072                     2 files\n";

        let mut parser = ListingParser::default();
        parser.handle_data(listing).unwrap();
        assert_eq!(parser.files, vec!["revo/xml/a.xml", "revo/xml/b.xml"]);
    }

    #[test]
    fn listing_parser_survives_arbitrary_chunking() {
        let listing = b"---\n   10  2012-01-01 00:00   revo/xml/a.xml\r\n---\n";

        for split in 1..listing.len() {
            let mut parser = ListingParser::default();
            parser.handle_data(&listing[..split]).unwrap();
            parser.handle_data(&listing[split..]).unwrap();
            assert_eq!(parser.files, vec!["revo/xml/a.xml"], "split at {split}");
        }
    }

    #[test]
    fn listing_parser_rejects_nul_and_short_lines() {
        let mut parser = ListingParser::default();
        assert!(parser.handle_data(b"abc\0def\n").is_err());

        let mut parser = ListingParser::default();
        assert!(matches!(
            parser.handle_data(b"---\n   10\n"),
            Err(PrevoError::Unzip(_))
        ));
    }
}
