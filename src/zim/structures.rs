use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{Result, ZimError};

/// Cluster compression codes (low nibble of the cluster info byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Bzip2,
    Xz,
    Zstd,
    Unknown(u8),
}

impl Compression {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 | 1 => Compression::None,
            2 => Compression::Zlib,
            3 => Compression::Bzip2,
            4 => Compression::Xz,
            5 => Compression::Zstd,
            _ => Compression::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Compression::None => 1,
            Compression::Zlib => 2,
            Compression::Bzip2 => 3,
            Compression::Xz => 4,
            Compression::Zstd => 5,
            Compression::Unknown(v) => *v,
        }
    }
}

/// Fixed ZIM header - 80 bytes
#[derive(Debug, Clone)]
pub struct Header {
    pub major_version: u16,
    pub minor_version: u16,
    pub uuid: [u8; 16],
    pub entry_count: u32,
    pub cluster_count: u32,
    pub url_ptr_pos: u64,
    pub title_ptr_pos: u64,
    pub cluster_ptr_pos: u64,
    pub mime_list_pos: u64,
    pub main_page: u32,
    pub layout_page: u32,
    pub checksum_pos: u64,
}

impl Header {
    pub const MAGIC: u32 = 72_173_914;
    pub const SIZE: usize = 80;
    pub const NO_PAGE: u32 = 0xFFFF_FFFF;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(ZimError::corrupt("archive too small for a ZIM header"));
        }

        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != Self::MAGIC {
            return Err(ZimError::corrupt(format!("bad magic number {magic:#010x}")));
        }

        let major_version = cursor.read_u16::<LittleEndian>()?;
        let minor_version = cursor.read_u16::<LittleEndian>()?;
        if !matches!(major_version, 5 | 6) {
            return Err(ZimError::corrupt(format!(
                "unsupported major version {major_version}"
            )));
        }

        let mut uuid = [0u8; 16];
        cursor.read_exact(&mut uuid)?;

        Ok(Self {
            major_version,
            minor_version,
            uuid,
            entry_count: cursor.read_u32::<LittleEndian>()?,
            cluster_count: cursor.read_u32::<LittleEndian>()?,
            url_ptr_pos: cursor.read_u64::<LittleEndian>()?,
            title_ptr_pos: cursor.read_u64::<LittleEndian>()?,
            cluster_ptr_pos: cursor.read_u64::<LittleEndian>()?,
            mime_list_pos: cursor.read_u64::<LittleEndian>()?,
            main_page: cursor.read_u32::<LittleEndian>()?,
            layout_page: cursor.read_u32::<LittleEndian>()?,
            checksum_pos: cursor.read_u64::<LittleEndian>()?,
        })
    }

    /// Check that every table the header points at lies inside the archive.
    pub fn validate(&self, archive_size: u64) -> Result<()> {
        let table_end = |pos: u64, count: u32, width: u64, name: &str| -> Result<()> {
            let end = (count as u64)
                .checked_mul(width)
                .and_then(|len| pos.checked_add(len))
                .ok_or_else(|| ZimError::corrupt(format!("{name} overflows")))?;
            if pos < Self::SIZE as u64 || end > archive_size {
                return Err(ZimError::corrupt(format!(
                    "{name} at {pos} ({count} entries) lies outside the archive"
                )));
            }
            Ok(())
        };

        table_end(self.url_ptr_pos, self.entry_count, 8, "URL pointer list")?;
        table_end(self.title_ptr_pos, self.entry_count, 4, "title pointer list")?;
        table_end(self.cluster_ptr_pos, self.cluster_count, 8, "cluster pointer list")?;

        if self.mime_list_pos < Self::SIZE as u64 || self.mime_list_pos >= archive_size {
            return Err(ZimError::corrupt("MIME type list lies outside the archive"));
        }
        if self.has_checksum() && self.checksum_pos.saturating_add(16) > archive_size {
            return Err(ZimError::corrupt(format!(
                "checksum position {} lies outside the archive",
                self.checksum_pos
            )));
        }
        if self.has_main_page() && self.main_page >= self.entry_count {
            return Err(ZimError::corrupt(format!(
                "main page index {} out of range",
                self.main_page
            )));
        }
        Ok(())
    }

    pub fn has_main_page(&self) -> bool {
        self.main_page != Self::NO_PAGE
    }

    pub fn has_checksum(&self) -> bool {
        self.checksum_pos != 0
    }

    pub fn namespace_scheme(&self) -> NamespaceScheme {
        if self.major_version >= 6 && self.minor_version >= 1 {
            NamespaceScheme::New
        } else {
            NamespaceScheme::Legacy
        }
    }

    /// UUID in the usual 8-4-4-4-12 form
    pub fn uuid_string(&self) -> String {
        let hex: String = self.uuid.iter().map(|b| format!("{b:02x}")).collect();
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

/// How user-facing paths map onto namespaces.
///
/// Archives written since minor version 1 keep all user content in `C` and
/// show paths without a namespace; older archives keep articles in `A` and
/// show `A/Foo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceScheme {
    New,
    Legacy,
}

impl NamespaceScheme {
    pub fn content_namespace(&self) -> char {
        match self {
            NamespaceScheme::New => 'C',
            NamespaceScheme::Legacy => 'A',
        }
    }

    pub fn display_path(&self, namespace: char, url: &str) -> String {
        match self {
            NamespaceScheme::New if namespace == 'C' => url.to_string(),
            _ => format!("{namespace}/{url}"),
        }
    }

    /// (namespace, url) pairs to try, in order, for a user-supplied path.
    pub fn candidates<'a>(&self, path: &'a str) -> Vec<(char, &'a str)> {
        let explicit = split_namespace(path);
        let content = (self.content_namespace(), path);
        match (self, explicit) {
            (NamespaceScheme::New, Some(explicit)) => vec![content, explicit],
            (NamespaceScheme::Legacy, Some(explicit)) => vec![explicit, content],
            (_, None) => vec![content],
        }
    }
}

fn split_namespace(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let namespace = chars.next()?;
    if namespace.is_ascii() && chars.next() == Some('/') {
        Some((namespace, &path[2..]))
    } else {
        None
    }
}

/// Ordered MIME type strings referenced by directory entries
#[derive(Debug, Clone, Default)]
pub struct MimeTypeList {
    types: Vec<String>,
}

impl MimeTypeList {
    pub fn new(types: Vec<String>) -> Self {
        Self { types }
    }

    pub fn get(&self, index: u16) -> Result<&str> {
        self.types
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| ZimError::corrupt(format!("MIME type index {index} out of range")))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.types
    }
}

/// What a directory record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Content { mime_index: u16, cluster: u32, blob: u32 },
    Redirect { target: u32 },
    /// Link-target or deleted record: no blob, no target
    Tombstone,
}

/// Parsed directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub namespace: char,
    pub revision: u32,
    pub url: String,
    pub title: String,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub const REDIRECT_MIME: u16 = 0xFFFF;
    pub const LINK_TARGET_MIME: u16 = 0xFFFE;
    pub const DELETED_MIME: u16 = 0xFFFD;

    /// Titles are optional on disk; an empty one means "same as the url".
    pub fn title_or_url(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.kind, EntryKind::Redirect { .. })
    }
}

/// A resolved entry: always terminal content, never a redirect
#[derive(Debug, Clone)]
pub struct Entry {
    pub index: u32,
    pub path: String,
    pub title: String,
    pub mimetype: String,
    pub content: Vec<u8>,
    /// Path originally asked for, when a redirect chain was followed
    pub redirected_from: Option<String>,
}

impl Entry {
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn dump(&self) -> Dump<'_> {
        Dump {
            mimetype: &self.mimetype,
            data: &self.content,
        }
    }
}

/// Raw payload of an entry, handed to whatever renders it
#[derive(Debug, Clone, Copy)]
pub struct Dump<'a> {
    pub mimetype: &'a str,
    pub data: &'a [u8],
}

impl Dump<'_> {
    pub fn is_text(&self) -> bool {
        is_text_mimetype(self.mimetype)
    }
}

pub(crate) fn is_text_mimetype(mimetype: &str) -> bool {
    mimetype.starts_with("text/")
        || mimetype.starts_with("application/javascript")
        || mimetype.starts_with("application/json")
}

/// Path and title pair, as returned by listings and searches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub path: String,
    pub title: String,
}

/// A page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub results: Vec<Listing>,
    /// Total matches, known only when the whole archive was scanned
    pub estimated_total: Option<u64>,
}

/// Header-derived archive summary
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub file_size: u64,
    pub uuid: String,
    pub major_version: u16,
    pub minor_version: u16,
    pub entry_count: u32,
    pub cluster_count: u32,
    pub content_entry_count: u32,
    pub main_page_path: Option<String>,
    pub mimetypes: Vec<String>,
    pub has_fulltext_index: bool,
    pub has_title_index: bool,
    pub has_checksum: bool,
    /// `text/html` entries according to `M/Counter`
    pub article_count: Option<u64>,
    /// Image, video and audio entries according to `M/Counter`
    pub media_count: Option<u64>,
    pub illustrations: Vec<Illustration>,
    pub metadata: Vec<(String, String)>,
}

impl ArchiveInfo {
    pub fn has_illustration(&self) -> bool {
        !self.illustrations.is_empty()
    }
}

/// Per-MIME-type entry counts from the `M/Counter` metadata entry.
///
/// The value is `mime=count` pairs joined by `;`. MIME parameters such as
/// `text/html;raw=true` contain `;` themselves, so a part without a
/// numeric count is glued onto the following one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeCounter {
    counts: Vec<(String, u64)>,
}

impl MimeCounter {
    pub fn parse(value: &str) -> Self {
        let mut counts = Vec::new();
        let mut pending = String::new();
        for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            if !pending.is_empty() {
                pending.push(';');
            }
            pending.push_str(part);
            let parsed = pending
                .rsplit_once('=')
                .and_then(|(mime, count)| Some((mime.to_string(), count.parse().ok()?)));
            if let Some(pair) = parsed {
                counts.push(pair);
                pending.clear();
            }
        }
        Self { counts }
    }

    /// Sum of the counts whose MIME type starts with any of `prefixes`
    pub fn count_matching(&self, prefixes: &[&str]) -> u64 {
        self.counts
            .iter()
            .filter(|(mime, _)| prefixes.iter().any(|p| mime.starts_with(p)))
            .map(|(_, count)| count)
            .sum()
    }

    pub fn article_count(&self) -> u64 {
        self.count_matching(&["text/html"])
    }

    pub fn media_count(&self) -> u64 {
        self.count_matching(&["image/", "video/", "audio/"])
    }
}

/// An archive illustration (icon), named `M/Illustration_<W>x<H>@<scale>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Illustration {
    pub width: u32,
    pub height: u32,
    pub scale: u32,
}

impl Illustration {
    pub const PREFIX: &'static str = "Illustration_";

    /// Parse a metadata name such as `Illustration_48x48@1`
    pub fn from_metadata_name(name: &str) -> Option<Self> {
        let size = name.strip_prefix(Self::PREFIX)?;
        let (dims, scale) = size.split_once('@')?;
        let (width, height) = dims.split_once('x')?;
        Some(Self {
            width: width.parse().ok()?,
            height: height.parse().ok()?,
            scale: scale.parse().ok()?,
        })
    }
}

impl std::fmt::Display for Illustration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.scale)
    }
}
