//! On-disk scratch area holding exported pages between export and import.
//!
//! One flat directory, one file per `(collection, page)`. Each file is a JSON
//! array of documents in canonical MongoDB Extended JSON, so every BSON type
//! survives the trip to disk unchanged.

use bson::{Bson, Document};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const PAGE_EXTENSION: &str = "json";
const PARTIAL_SUFFIX: &str = "tmp";
const NAME_EXTENSION: &str = "name";

/// Longest escaped collection kept verbatim in a file name. Leaves room for
/// the page index and suffixes under the usual 255-byte name limit.
const MAX_ESCAPED_STEM: usize = 200;

/// Prefix of digest stems. Never produced by escaping.
const DIGEST_MARKER: char = '~';
const DIGEST_HEX_LEN: usize = 64;

/// Identity of one page file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageKey {
    /// Owning collection.
    pub collection: String,
    /// 1-based page index.
    pub page: u32,
}

impl PageKey {
    /// Creates a page key.
    pub fn new(collection: impl Into<String>, page: u32) -> Self {
        Self {
            collection: collection.into(),
            page,
        }
    }

    /// File name for this page: `<stem>.<page>.json`.
    ///
    /// The stem is the escaped collection name, or `~<sha256-hex>` of the
    /// name when escaping would make it longer than the filesystem allows.
    /// Neither form contains `.`, so the name splits back into one key.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}.{}", self.stem(), self.page, PAGE_EXTENSION)
    }

    /// Decodes a file name produced by [`PageKey::file_name`].
    ///
    /// Returns `None` for anything that is not a canonical page file name,
    /// and for digest-named pages, whose collection is only recoverable from
    /// the name record [`ScratchStore::list_page_files`] reads.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        match parse_file_name(name)? {
            (Stem::Escaped(collection), page) => Some(Self { collection, page }),
            (Stem::Digest(_), _) => None,
        }
    }

    fn stem(&self) -> String {
        let escaped = escape_collection(&self.collection);
        if escaped.len() <= MAX_ESCAPED_STEM {
            escaped
        } else {
            digest_stem(&self.collection)
        }
    }
}

enum Stem {
    /// Decoded collection name.
    Escaped(String),
    /// Full `~<hex>` stem.
    Digest(String),
}

fn parse_file_name(name: &str) -> Option<(Stem, u32)> {
    let base = name.strip_suffix(PAGE_EXTENSION)?.strip_suffix('.')?;
    let (stem, page) = base.rsplit_once('.')?;

    let index: u32 = page.parse().ok()?;
    if index == 0 || index.to_string() != page {
        return None;
    }

    let parsed = match stem.strip_prefix(DIGEST_MARKER) {
        Some(digits) => {
            let canonical = digits.len() == DIGEST_HEX_LEN
                && digits
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
            if !canonical {
                return None;
            }
            Stem::Digest(stem.to_string())
        }
        None => Stem::Escaped(unescape_collection(stem)?),
    };
    Some((parsed, index))
}

fn digest_stem(collection: &str) -> String {
    format!(
        "{DIGEST_MARKER}{}",
        hex::encode(Sha256::digest(collection.as_bytes()))
    )
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-'
}

/// Percent-escapes every byte outside `[a-z0-9_-]`.
///
/// Uppercase letters are escaped too so `Users` and `users` stay distinct on
/// case-insensitive filesystems.
fn escape_collection(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            let _ = write!(out, "%{b:02X}");
        }
    }
    out
}

fn unescape_collection(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if is_plain(b) {
            out.push(b);
            i += 1;
            continue;
        }
        if b != b'%' {
            return None;
        }
        let hex = bytes.get(i + 1..i + 3)?;
        if !hex
            .iter()
            .all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(c))
        {
            return None;
        }
        let value = u8::from_str_radix(std::str::from_utf8(hex).ok()?, 16).ok()?;
        // A plain byte written as %XX is not canonical.
        if is_plain(value) {
            return None;
        }
        out.push(value);
        i += 3;
    }

    let name = String::from_utf8(out).ok()?;
    (!name.is_empty()).then_some(name)
}

/// Serializes a page of documents to canonical Extended JSON.
///
/// # Errors
///
/// Returns the JSON encoder error.
pub fn encode_page(documents: Vec<Document>) -> serde_json::Result<Vec<u8>> {
    let values: Vec<serde_json::Value> = documents
        .into_iter()
        .map(|doc| Bson::Document(doc).into_canonical_extjson())
        .collect();
    serde_json::to_vec(&values)
}

/// Parses a page written by [`encode_page`].
///
/// # Errors
///
/// Returns a description of the first malformed element.
pub fn decode_page(bytes: &[u8]) -> std::result::Result<Vec<Document>, String> {
    let values: Vec<serde_json::Value> =
        serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match Bson::try_from(value) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(other) => Err(format!(
                "element {i} is {:?}, expected a document",
                other.element_type()
            )),
            Err(e) => Err(format!("element {i}: {e}")),
        })
        .collect()
}

/// Scratch directory owner.
#[derive(Debug, Clone)]
pub struct ScratchStore {
    root: PathBuf,
}

impl ScratchStore {
    /// Creates a store rooted at `root`. Nothing touches the disk until
    /// [`ScratchStore::reset`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key`.
    #[must_use]
    pub fn page_path(&self, key: &PageKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Deletes and recreates the scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory cannot be removed or created.
    pub async fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(&self.root, e)),
        }
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::io(&self.root, e))?;

        debug!("Scratch directory ready at {}", self.root.display());
        Ok(())
    }

    /// Persists one page and returns the number of documents written.
    ///
    /// The page is written to a temporary sibling and renamed into place.
    /// Digest-named pages also get a `~<hex>.name` record holding the
    /// collection name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on disk failure.
    pub async fn write_page(
        &self,
        collection: &str,
        page: u32,
        documents: Vec<Document>,
    ) -> Result<usize> {
        let key = PageKey::new(collection, page);
        let path = self.page_path(&key);
        let partial = path.with_extension(format!("{PAGE_EXTENSION}.{PARTIAL_SUFFIX}"));

        let stem = key.stem();
        if stem.starts_with(DIGEST_MARKER) {
            let record = self.name_record_path(&stem);
            fs::write(&record, collection.as_bytes())
                .await
                .map_err(|e| Error::io(&record, e))?;
        }

        let count = documents.len();
        let bytes = encode_page(documents).map_err(|e| Error::PageFormat {
            path: path.clone(),
            message: e.to_string(),
        })?;

        fs::write(&partial, bytes)
            .await
            .map_err(|e| Error::io(&partial, e))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| Error::io(&path, e))?;

        debug!("Wrote {} documents to {}", count, path.display());
        Ok(count)
    }

    /// Lists every persisted page, sorted by collection then page index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or a name record cannot be
    /// read, or [`Error::PageFormat`] if a name record does not match its
    /// digest.
    pub async fn list_page_files(&self) -> Result<Vec<PageKey>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| Error::io(&self.root, e))?;

        let mut keys = Vec::new();
        let mut digested: HashMap<String, String> = HashMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.root, e))?
        {
            let name = entry.file_name();
            match name.to_str().and_then(parse_file_name) {
                Some((Stem::Escaped(collection), page)) => {
                    keys.push(PageKey { collection, page });
                }
                Some((Stem::Digest(stem), page)) => {
                    let collection = match digested.get(&stem) {
                        Some(collection) => collection.clone(),
                        None => {
                            let collection = self.read_name_record(&stem).await?;
                            digested.insert(stem, collection.clone());
                            collection
                        }
                    };
                    keys.push(PageKey { collection, page });
                }
                None => debug!("Ignoring non-page file {:?}", name),
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn name_record_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.{NAME_EXTENSION}"))
    }

    /// Collection name behind a digest stem, checked against the digest.
    async fn read_name_record(&self, stem: &str) -> Result<String> {
        let path = self.name_record_path(stem);
        let bytes = fs::read(&path).await.map_err(|e| Error::io(&path, e))?;

        match String::from_utf8(bytes) {
            Ok(collection) if digest_stem(&collection) == stem => Ok(collection),
            _ => Err(Error::PageFormat {
                path,
                message: "name record does not match its digest".to_string(),
            }),
        }
    }

    /// Reads one page. A missing file is an empty page.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file exists but cannot be read, or
    /// [`Error::PageFormat`] if it cannot be decoded.
    pub async fn read_page(&self, key: &PageKey) -> Result<Vec<Document>> {
        let path = self.page_path(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&path, e)),
        };

        decode_page(&bytes).map_err(|message| Error::PageFormat { path, message })
    }

    /// Removes the scratch directory. Failures are logged, never returned.
    pub async fn teardown(&self) {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => debug!("Removed scratch directory {}", self.root.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Could not remove scratch directory {}: {}",
                self.root.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
#[path = "scratch_tests.rs"]
mod tests;
