//! In-memory ZIM fixtures for integration tests.
//!
//! `ZimBuilder` lays out a complete archive: header, MIME list, URL and
//! title pointer lists, cluster pointer list, directory records, clusters
//! and a checksum block. Records are sorted the way real writers sort them;
//! section order is selectable with [`Layout`].

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use runzim::{Archive, ArchiveOptions, MemoryReader, ZimError};

pub const NONE: u8 = 1;
pub const ZLIB: u8 = 2;
pub const BZIP2: u8 = 3;
pub const XZ: u8 = 4;
pub const ZSTD: u8 = 5;

const MAGIC: u32 = 72_173_914;
const NO_PAGE: u32 = 0xFFFF_FFFF;

/// Order of the sections after the MIME list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Pointer lists, then directory records, then clusters
    TablesFirst,
    /// Clusters, then directory records, then pointer lists, as libzim
    /// writes them
    ClustersFirst,
}

enum Body {
    Content { mime: u16, cluster: u32, blob: u32 },
    Redirect { target: (char, String) },
    Deleted,
}

struct Record {
    namespace: char,
    url: String,
    title: String,
    body: Body,
}

impl Record {
    fn url_key(&self) -> (u32, &[u8]) {
        (self.namespace as u32, self.url.as_bytes())
    }

    fn title_key(&self) -> (u32, &[u8]) {
        let key = if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        };
        (self.namespace as u32, key.as_bytes())
    }
}

pub struct ZimBuilder {
    major_version: u16,
    minor_version: u16,
    mimetypes: Vec<String>,
    clusters: Vec<(u8, Vec<Vec<u8>>)>,
    records: Vec<Record>,
    main_page: Option<(char, String)>,
    checksum: bool,
    layout: Layout,
}

impl Default for ZimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZimBuilder {
    /// Archive in the current layout: major 6, minor 1, content in `C`.
    pub fn new() -> Self {
        Self {
            major_version: 6,
            minor_version: 1,
            mimetypes: Vec::new(),
            clusters: Vec::new(),
            records: Vec::new(),
            main_page: None,
            checksum: true,
            layout: Layout::TablesFirst,
        }
    }

    /// Archive in the old layout: major 5, articles in `A`.
    pub fn legacy(mut self) -> Self {
        self.major_version = 5;
        self.minor_version = 0;
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn without_checksum(mut self) -> Self {
        self.checksum = false;
        self
    }

    /// Start a new cluster; following content goes into it.
    pub fn cluster(mut self, codec: u8) -> Self {
        self.clusters.push((codec, Vec::new()));
        self
    }

    pub fn content(
        mut self,
        namespace: char,
        url: &str,
        title: &str,
        mimetype: &str,
        data: &[u8],
    ) -> Self {
        if self.clusters.is_empty() {
            self.clusters.push((NONE, Vec::new()));
        }
        let mime = match self.mimetypes.iter().position(|m| m == mimetype) {
            Some(i) => i,
            None => {
                self.mimetypes.push(mimetype.to_string());
                self.mimetypes.len() - 1
            }
        };
        let cluster = self.clusters.len() - 1;
        let blobs = &mut self.clusters[cluster].1;
        blobs.push(data.to_vec());

        self.records.push(Record {
            namespace,
            url: url.to_string(),
            title: title.to_string(),
            body: Body::Content {
                mime: mime as u16,
                cluster: cluster as u32,
                blob: (blobs.len() - 1) as u32,
            },
        });
        self
    }

    pub fn article(self, url: &str, title: &str, html: &str) -> Self {
        self.content('C', url, title, "text/html", html.as_bytes())
    }

    pub fn redirect(
        mut self,
        namespace: char,
        url: &str,
        title: &str,
        target: (char, &str),
    ) -> Self {
        self.records.push(Record {
            namespace,
            url: url.to_string(),
            title: title.to_string(),
            body: Body::Redirect {
                target: (target.0, target.1.to_string()),
            },
        });
        self
    }

    pub fn deleted(mut self, namespace: char, url: &str) -> Self {
        self.records.push(Record {
            namespace,
            url: url.to_string(),
            title: String::new(),
            body: Body::Deleted,
        });
        self
    }

    pub fn main_page(mut self, namespace: char, url: &str) -> Self {
        self.main_page = Some((namespace, url.to_string()));
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.records.sort_by(|a, b| a.url_key().cmp(&b.url_key()));
        let records = self.records;
        let n = records.len() as u64;

        let index: HashMap<(char, String), u32> = records
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.namespace, r.url.clone()), i as u32))
            .collect();
        let lookup = |key: &(char, String)| -> u32 {
            *index
                .get(key)
                .unwrap_or_else(|| panic!("fixture has no entry {}/{}", key.0, key.1))
        };

        let mut titles: Vec<u32> = (0..records.len() as u32).collect();
        titles.sort_by(|&a, &b| records[a as usize].title_key().cmp(&records[b as usize].title_key()));

        let mut mime_list = Vec::new();
        for mimetype in &self.mimetypes {
            mime_list.extend_from_slice(mimetype.as_bytes());
            mime_list.push(0);
        }
        mime_list.push(0);

        let dirents: Vec<Vec<u8>> = records.iter().map(|r| encode_record(r, &lookup)).collect();
        let clusters: Vec<Vec<u8>> = self
            .clusters
            .iter()
            .map(|(codec, blobs)| encode_cluster(*codec, blobs))
            .collect();

        let dirents_len: u64 = dirents.iter().map(|d| d.len() as u64).sum();
        let clusters_len: u64 = clusters.iter().map(|c| c.len() as u64).sum();
        let tables_len = 12 * n + 8 * clusters.len() as u64;

        let mime_list_pos = 80u64;
        let body_pos = mime_list_pos + mime_list.len() as u64;
        let (url_ptr_pos, dirents_pos, clusters_pos) = match self.layout {
            Layout::TablesFirst => {
                let dirents_pos = body_pos + tables_len;
                (body_pos, dirents_pos, dirents_pos + dirents_len)
            }
            Layout::ClustersFirst => {
                let dirents_pos = body_pos + clusters_len;
                (dirents_pos + dirents_len, dirents_pos, body_pos)
            }
        };
        let title_ptr_pos = url_ptr_pos + 8 * n;
        let cluster_ptr_pos = title_ptr_pos + 4 * n;
        let end_pos = body_pos + tables_len + dirents_len + clusters_len;

        let mut tables = Vec::new();
        let mut pos = dirents_pos;
        for dirent in &dirents {
            tables.write_u64::<LittleEndian>(pos).unwrap();
            pos += dirent.len() as u64;
        }
        for index in titles {
            tables.write_u32::<LittleEndian>(index).unwrap();
        }
        let mut pos = clusters_pos;
        for cluster in &clusters {
            tables.write_u64::<LittleEndian>(pos).unwrap();
            pos += cluster.len() as u64;
        }

        let checksum_pos = if self.checksum { end_pos } else { 0 };
        let main_page = self.main_page.as_ref().map(lookup).unwrap_or(NO_PAGE);

        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(MAGIC).unwrap();
        out.write_u16::<LittleEndian>(self.major_version).unwrap();
        out.write_u16::<LittleEndian>(self.minor_version).unwrap();
        out.extend_from_slice(&[
            0x4a, 0x1f, 0x7c, 0x02, 0x9b, 0x33, 0x4e, 0x8d, 0xa5, 0x10, 0x6e, 0x2c, 0x71, 0x90,
            0xd4, 0x3b,
        ]);
        out.write_u32::<LittleEndian>(records.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(clusters.len() as u32).unwrap();
        out.write_u64::<LittleEndian>(url_ptr_pos).unwrap();
        out.write_u64::<LittleEndian>(title_ptr_pos).unwrap();
        out.write_u64::<LittleEndian>(cluster_ptr_pos).unwrap();
        out.write_u64::<LittleEndian>(mime_list_pos).unwrap();
        out.write_u32::<LittleEndian>(main_page).unwrap();
        out.write_u32::<LittleEndian>(NO_PAGE).unwrap();
        out.write_u64::<LittleEndian>(checksum_pos).unwrap();
        assert_eq!(out.len(), 80);

        out.extend(mime_list);
        match self.layout {
            Layout::TablesFirst => {
                out.extend(tables);
                dirents.into_iter().for_each(|d| out.extend(d));
                clusters.into_iter().for_each(|c| out.extend(c));
            }
            Layout::ClustersFirst => {
                clusters.into_iter().for_each(|c| out.extend(c));
                dirents.into_iter().for_each(|d| out.extend(d));
                out.extend(tables);
            }
        }
        assert_eq!(out.len() as u64, end_pos);
        if self.checksum {
            out.extend_from_slice(&[0u8; 16]);
        }
        out
    }
}

fn encode_record(record: &Record, lookup: &dyn Fn(&(char, String)) -> u32) -> Vec<u8> {
    let mut out = Vec::new();
    let mimetype = match record.body {
        Body::Content { mime, .. } => mime,
        Body::Redirect { .. } => 0xFFFF,
        Body::Deleted => 0xFFFD,
    };
    out.write_u16::<LittleEndian>(mimetype).unwrap();
    out.push(0);
    out.push(record.namespace as u8);
    out.write_u32::<LittleEndian>(0).unwrap();

    match &record.body {
        Body::Content { cluster, blob, .. } => {
            out.write_u32::<LittleEndian>(*cluster).unwrap();
            out.write_u32::<LittleEndian>(*blob).unwrap();
        }
        Body::Redirect { target } => {
            out.write_u32::<LittleEndian>(lookup(target)).unwrap();
        }
        Body::Deleted => {}
    }

    out.extend_from_slice(record.url.as_bytes());
    out.push(0);
    out.extend_from_slice(record.title.as_bytes());
    out.push(0);
    out
}

/// Info byte followed by the (possibly compressed) offset table and blobs.
fn encode_cluster(codec: u8, blobs: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    let mut offset = 4 * (blobs.len() as u32 + 1);
    payload.write_u32::<LittleEndian>(offset).unwrap();
    for blob in blobs {
        offset += blob.len() as u32;
        payload.write_u32::<LittleEndian>(offset).unwrap();
    }
    for blob in blobs {
        payload.extend_from_slice(blob);
    }

    let body = match codec {
        ZLIB => {
            let mut encoder =
                flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&payload).unwrap();
            encoder.finish().unwrap()
        }
        XZ => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(&payload).unwrap();
            encoder.finish().unwrap()
        }
        ZSTD => zstd::encode_all(&payload[..], 3).unwrap(),
        _ => payload,
    };

    let mut out = vec![codec];
    out.extend(body);
    out
}

pub const APPLE_HTML: &str =
    "<html><body><h1>Apple</h1><p>A crisp fruit that grows on trees.</p></body></html>";
pub const BANANA_HTML: &str =
    "<html><body><h1>Banana</h1><p>A long yellow fruit.</p></body></html>";
pub const CHERRY_HTML: &str =
    "<html><body><h1>Cherry</h1><p>A small red stone fruit.</p></body></html>";

/// Apple, Banana and Cherry articles, a `Fruit -> Apple` redirect, a title
/// metadata entry and `W/mainPage` pointing at Apple.
pub fn fruit_archive() -> Vec<u8> {
    fruit_archive_with(Layout::TablesFirst)
}

pub fn fruit_archive_with(layout: Layout) -> Vec<u8> {
    ZimBuilder::new()
        .layout(layout)
        .cluster(ZSTD)
        .article("Apple", "Apple", APPLE_HTML)
        .article("Banana", "Banana", BANANA_HTML)
        .article("Cherry", "Cherry", CHERRY_HTML)
        .content('M', "Title", "", "text/plain", b"Fruit Basket")
        .redirect('C', "Fruit", "Fruit", ('C', "Apple"))
        .redirect('W', "mainPage", "", ('C', "Apple"))
        .main_page('W', "mainPage")
        .build()
}

pub fn open(bytes: Vec<u8>) -> Archive<MemoryReader> {
    open_with(bytes, ArchiveOptions::default())
}

pub fn open_with(bytes: Vec<u8>, options: ArchiveOptions) -> Archive<MemoryReader> {
    match Archive::from_reader(Arc::new(MemoryReader::new(bytes)), options) {
        Ok(archive) => archive,
        Err(e) => panic!("fixture failed to open: {e}"),
    }
}

/// Error from opening `bytes`, panicking if the archive opens.
pub fn open_err(bytes: Vec<u8>) -> ZimError {
    match Archive::from_reader(Arc::new(MemoryReader::new(bytes)), ArchiveOptions::default()) {
        Ok(_) => panic!("archive unexpectedly opened"),
        Err(e) => e,
    }
}
