//! Input collection: the ordered list of documents to merge
//!
//! Order is decided here and only here. Archive entries keep the order they
//! were stored in; loose files are sorted naturally by name so that
//! `2-talk.docx` comes before `10-talk.docx`.

use std::cmp::Ordering;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::error::Result;

/// One document to merge
#[derive(Debug, Clone, PartialEq)]
pub struct InputDocument {
    /// Name shown to the user and used for the fallback title
    pub display_name: String,
    pub raw_bytes: Vec<u8>,
    /// Position in merge order, starting at 0
    pub ordinal_position: usize,
}

impl InputDocument {
    /// Number `(name, bytes)` pairs in the order given
    pub fn ordered<I>(items: I) -> Vec<InputDocument>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        items
            .into_iter()
            .enumerate()
            .map(|(ordinal_position, (display_name, raw_bytes))| InputDocument {
                display_name,
                raw_bytes,
                ordinal_position,
            })
            .collect()
    }
}

/// Whether an archive entry is a document worth merging
///
/// Directories, macOS resource forks and Word lock files are skipped.
pub fn is_document_entry(name: &str) -> bool {
    let base = name.rsplit('/').next().unwrap_or(name);
    !name.ends_with('/')
        && !name.starts_with("__MACOSX/")
        && !base.starts_with("~$")
        && !base.starts_with("._")
        && base.to_ascii_lowercase().ends_with(".docx")
}

/// `.docx` entries of a zip archive, in archive order
pub fn read_archive(bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut documents = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        if file.is_dir() || !is_document_entry(&name) {
            debug!("Skipping archive entry {}", name);
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        documents.push((name, data));
    }
    Ok(documents)
}

/// Input documents from a zip archive, in archive order
pub fn from_archive(bytes: &[u8]) -> Result<Vec<InputDocument>> {
    Ok(InputDocument::ordered(read_archive(bytes)?))
}

/// Read files in the order given
pub fn read_files(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    paths
        .iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok((name, std::fs::read(path)?))
        })
        .collect()
}

/// Input documents from files, sorted naturally by file name
pub fn from_paths(paths: &[PathBuf]) -> Result<Vec<InputDocument>> {
    let mut sorted = paths.to_vec();
    sort_naturally(&mut sorted);
    Ok(InputDocument::ordered(read_files(&sorted)?))
}

/// Sort paths by file name, comparing digit runs as numbers
pub fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(&sort_key(a), &sort_key(b)));
}

fn sort_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Compare strings so that embedded numbers order by value
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_number(&mut a);
                let right = take_number(&mut b);
                let ordering = left
                    .trim_start_matches('0')
                    .len()
                    .cmp(&right.trim_start_matches('0').len())
                    .then_with(|| left.trim_start_matches('0').cmp(right.trim_start_matches('0')))
                    .then_with(|| left.len().cmp(&right.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("2-talk", "10-talk"), Ordering::Less);
        assert_eq!(natural_cmp("a10", "a9"), Ordering::Greater);
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
        assert_eq!(natural_cmp("x01", "x1"), Ordering::Greater);
        assert_eq!(natural_cmp("same", "same"), Ordering::Equal);
    }

    #[test]
    fn test_sort_naturally() {
        let mut paths = vec![
            PathBuf::from("dir/10 closing.docx"),
            PathBuf::from("other/2 keynote.docx"),
            PathBuf::from("1 Welcome.docx"),
        ];
        sort_naturally(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("1 Welcome.docx"),
                PathBuf::from("other/2 keynote.docx"),
                PathBuf::from("dir/10 closing.docx"),
            ]
        );
    }

    #[test]
    fn test_document_entries() {
        assert!(is_document_entry("papers/b_abstract.docx"));
        assert!(is_document_entry("UPPER.DOCX"));
        assert!(!is_document_entry("papers/"));
        assert!(!is_document_entry("__MACOSX/papers/._a.docx"));
        assert!(!is_document_entry("papers/~$a.docx"));
        assert!(!is_document_entry("notes.txt"));
        assert!(!is_document_entry("old.doc"));
    }

    #[test]
    fn test_archive_keeps_entry_order() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.add_directory("papers/", options).unwrap();
        for name in ["papers/z.docx", "readme.txt", "papers/a.docx", "~$z.docx"] {
            zip.start_file(name, options).unwrap();
            zip.write_all(name.as_bytes()).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();

        let documents = from_archive(&bytes).unwrap();
        let names: Vec<&str> = documents.iter().map(|d| d.display_name.as_str()).collect();
        assert_eq!(names, vec!["papers/z.docx", "papers/a.docx"]);
        assert_eq!(documents[1].ordinal_position, 1);
        assert_eq!(documents[0].raw_bytes, b"papers/z.docx".to_vec());
    }
}
