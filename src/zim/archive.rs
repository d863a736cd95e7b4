use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::debug;

use crate::error::{Result, ZimError};
use crate::io::{LocalFileReader, ReadAt};

use super::cluster::ClusterStore;
use super::decoder::Decoder;
use super::directory::{DirectoryIndex, ListOrder};
use super::options::ArchiveOptions;
use super::resolver::Resolver;
use super::search::SearchIndex;
use super::structures::{
    ArchiveInfo, DirectoryEntry, Entry, EntryKind, Header, Illustration, Listing, MimeCounter,
    MimeTypeList, NamespaceScheme, SearchResults,
};

/// Metadata keys reported by [`Archive::info`]
const INFO_METADATA: &[&str] = &[
    "Title",
    "Description",
    "Language",
    "Creator",
    "Publisher",
    "Date",
];

/// An opened ZIM archive.
///
/// Owns the byte source, the parsed header and MIME list, and the cluster
/// cache; everything is released when the archive is dropped.
pub struct Archive<R: ReadAt = LocalFileReader> {
    header: Header,
    mimetypes: MimeTypeList,
    directory: DirectoryIndex<R>,
    clusters: ClusterStore<R>,
    options: ArchiveOptions,
    file_size: u64,
}

impl Archive<LocalFileReader> {
    /// Open a ZIM file with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, ArchiveOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let reader = LocalFileReader::new(path).map_err(|source| ZimError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("opening {} ({} bytes)", path.display(), reader.size());
        Self::from_reader(Arc::new(reader), options)
    }
}

impl<R: ReadAt> Archive<R> {
    /// Parse the header and MIME list of an archive held by `reader`.
    ///
    /// Directory records and clusters are not touched until queried.
    pub fn from_reader(reader: Arc<R>, options: ArchiveOptions) -> Result<Self> {
        let decoder = Decoder::new(reader);
        let file_size = decoder.size();
        if file_size < Header::SIZE as u64 {
            return Err(ZimError::corrupt(format!(
                "archive is {file_size} bytes, smaller than a ZIM header"
            )));
        }

        let header = Header::from_bytes(&decoder.read_bytes(0, Header::SIZE)?)?;
        header.validate(file_size)?;
        let mimetypes = read_mime_list(&decoder, header.mime_list_pos)?;

        let clusters_end = if header.has_checksum() {
            header.checksum_pos
        } else {
            file_size
        };

        debug!(
            "ZIM {}.{}: {} entries, {} clusters, {} MIME types",
            header.major_version,
            header.minor_version,
            header.entry_count,
            header.cluster_count,
            mimetypes.as_slice().len()
        );

        Ok(Self {
            directory: DirectoryIndex::new(decoder.clone(), &header),
            clusters: ClusterStore::new(
                decoder,
                header.cluster_ptr_pos,
                header.cluster_count,
                clusters_end,
                options.cluster_cache_capacity,
            ),
            header,
            mimetypes,
            options,
            file_size,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    pub fn namespace_scheme(&self) -> NamespaceScheme {
        self.header.namespace_scheme()
    }

    pub fn mimetypes(&self) -> &MimeTypeList {
        &self.mimetypes
    }

    /// Clusters decompressed so far; repeated reads from a cached cluster
    /// leave this unchanged.
    pub fn cluster_decompressions(&self) -> u64 {
        self.clusters.decompressions()
    }

    fn resolver(&self) -> Resolver<'_, R> {
        Resolver {
            directory: &self.directory,
            clusters: &self.clusters,
            mimetypes: &self.mimetypes,
            scheme: self.namespace_scheme(),
            max_hops: self.options.max_redirect_hops,
        }
    }

    pub fn info(&self) -> Result<ArchiveInfo> {
        let resolver = self.resolver();
        let search = SearchIndex::new(&resolver);
        let scheme = self.namespace_scheme();

        let content = self
            .directory
            .prefix_range(ListOrder::Url, scheme.content_namespace(), "")?;

        let main_page_path = if self.header.has_main_page() {
            match resolver.follow(self.header.main_page) {
                Ok(terminal) => Some(self.display_path(&terminal.entry)),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let mut metadata = Vec::new();
        for key in INFO_METADATA {
            if let Some(value) = self.present_metadata(key)? {
                metadata.push((key.to_string(), value));
            }
        }

        let counter = self.present_metadata("Counter")?.map(|v| MimeCounter::parse(&v));

        Ok(ArchiveInfo {
            file_size: self.file_size,
            uuid: self.header.uuid_string(),
            major_version: self.header.major_version,
            minor_version: self.header.minor_version,
            entry_count: self.header.entry_count,
            cluster_count: self.header.cluster_count,
            content_entry_count: content.end - content.start,
            main_page_path,
            mimetypes: self.mimetypes.as_slice().to_vec(),
            has_fulltext_index: search.has_fulltext_index()?,
            has_title_index: search.has_title_index()?,
            has_checksum: self.header.has_checksum(),
            article_count: counter.as_ref().map(MimeCounter::article_count),
            media_count: counter.as_ref().map(MimeCounter::media_count),
            illustrations: self.illustrations()?,
            metadata,
        })
    }

    /// Like [`Archive::metadata`], but a record that resolves to a
    /// tombstone counts as absent.
    fn present_metadata(&self, name: &str) -> Result<Option<String>> {
        match self.metadata(name) {
            Err(e) if e.is_not_found() => Ok(None),
            other => other,
        }
    }

    /// Illustration sizes declared by `M/Illustration_*` content records,
    /// in URL order
    pub fn illustrations(&self) -> Result<Vec<Illustration>> {
        let range = self
            .directory
            .prefix_range(ListOrder::Url, 'M', Illustration::PREFIX)?;
        let mut illustrations = Vec::new();
        for position in range {
            let (_, entry) = self.directory.entry_at_position(ListOrder::Url, position)?;
            if entry.kind == EntryKind::Tombstone {
                continue;
            }
            if let Some(illustration) = Illustration::from_metadata_name(&entry.url) {
                illustrations.push(illustration);
            }
        }
        Ok(illustrations)
    }

    /// User-facing path of a directory record
    pub fn display_path(&self, entry: &DirectoryEntry) -> String {
        self.namespace_scheme().display_path(entry.namespace, &entry.url)
    }

    /// Raw directory record at `index`, redirects not followed
    pub fn directory_entry(&self, index: u32) -> Result<DirectoryEntry> {
        self.directory.entry_at(index)
    }

    /// Raw directory record for a user path, redirects not followed.
    pub fn lookup(&self, path: &str) -> Result<Option<(u32, DirectoryEntry)>> {
        for (namespace, url) in self.namespace_scheme().candidates(path) {
            if let Some(index) = self.directory.find_by_path(namespace, url)? {
                return Ok(Some((index, self.directory.entry_at(index)?)));
            }
        }
        Ok(None)
    }

    /// Resolved entry for `path`, or `None` when no such entry exists.
    pub fn find_entry(&self, path: &str) -> Result<Option<Entry>> {
        match self.lookup(path)? {
            Some((index, _)) => self.resolver().resolve(index).map(Some),
            None => Ok(None),
        }
    }

    /// Resolved entry for `path`; a missing path is [`ZimError::NotFound`].
    pub fn get_entry(&self, path: &str) -> Result<Entry> {
        self.find_entry(path)?.ok_or_else(|| ZimError::NotFound(path.to_string()))
    }

    pub fn entry_at(&self, index: u32) -> Result<Entry> {
        self.resolver().resolve(index)
    }

    pub fn main_entry(&self) -> Result<Option<Entry>> {
        if !self.header.has_main_page() {
            return Ok(None);
        }
        self.entry_at(self.header.main_page).map(Some)
    }

    /// Text of the `M/<name>` metadata entry, if present.
    pub fn metadata(&self, name: &str) -> Result<Option<String>> {
        match self.directory.find_by_path('M', name)? {
            Some(index) => {
                let entry = self.resolver().resolve(index)?;
                Ok(Some(String::from_utf8_lossy(&entry.content).into_owned()))
            }
            None => Ok(None),
        }
    }

    /// Content entries whose title starts with `prefix`, in title order.
    pub fn list_by_prefix(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Listing>> {
        let resolver = self.resolver();
        SearchIndex::new(&resolver).suggest(prefix, offset, limit)
    }

    pub fn search(&self, query: &str, offset: usize, limit: usize) -> Result<SearchResults> {
        let resolver = self.resolver();
        SearchIndex::new(&resolver).search(query, offset, limit, None)
    }

    /// Like [`Archive::search`], but gives up with [`ZimError::Cancelled`]
    /// once `cancel` is set.
    pub fn search_cancellable(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        cancel: &AtomicBool,
    ) -> Result<SearchResults> {
        let resolver = self.resolver();
        SearchIndex::new(&resolver).search(query, offset, limit, Some(cancel))
    }

    pub fn random_entry(&self) -> Result<Entry> {
        self.random_entry_with(&mut rand::thread_rng())
    }

    pub fn random_entry_with<G: Rng>(&self, rng: &mut G) -> Result<Entry> {
        let resolver = self.resolver();
        SearchIndex::new(&resolver).random(rng, self.options.random_retries)
    }

    /// Release the byte source and cluster cache.
    pub fn close(self) {
        debug!(
            "closing archive: {} clusters decompressed, {} cached",
            self.clusters.decompressions(),
            self.clusters.cached()
        );
    }
}

fn read_mime_list<R: ReadAt>(decoder: &Decoder<R>, mut offset: u64) -> Result<MimeTypeList> {
    let mut types = Vec::new();
    loop {
        let (mimetype, next) = decoder.read_string(offset)?;
        if mimetype.is_empty() {
            break;
        }
        if types.len() >= DirectoryEntry::DELETED_MIME as usize {
            return Err(ZimError::corrupt("MIME type list is not terminated"));
        }
        types.push(mimetype);
        offset = next;
    }
    Ok(MimeTypeList::new(types))
}
