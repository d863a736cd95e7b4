//! Turns directory records into terminal entries.

use tracing::trace;

use crate::error::{Result, ZimError};
use crate::io::ReadAt;

use super::cluster::ClusterStore;
use super::directory::DirectoryIndex;
use super::structures::{DirectoryEntry, Entry, EntryKind, MimeTypeList, NamespaceScheme};

/// A content record reached by following redirects
pub struct Terminal {
    pub index: u32,
    pub entry: DirectoryEntry,
    pub hops: usize,
}

pub struct Resolver<'a, R: ReadAt> {
    pub directory: &'a DirectoryIndex<R>,
    pub clusters: &'a ClusterStore<R>,
    pub mimetypes: &'a MimeTypeList,
    pub scheme: NamespaceScheme,
    pub max_hops: usize,
}

impl<R: ReadAt> Resolver<'_, R> {
    /// Follow redirect targets from `index` to the first content record.
    pub fn follow(&self, index: u32) -> Result<Terminal> {
        let mut current = index;
        let mut entry = self.directory.entry_at(current)?;
        let mut hops = 0;

        loop {
            match entry.kind {
                EntryKind::Content { .. } => {
                    return Ok(Terminal {
                        index: current,
                        entry,
                        hops,
                    });
                }
                EntryKind::Redirect { target } => {
                    if hops >= self.max_hops {
                        return Err(ZimError::RedirectLoop {
                            index,
                            hops: self.max_hops,
                        });
                    }
                    trace!("entry {} redirects to {}", current, target);
                    hops += 1;
                    current = target;
                    entry = self.directory.entry_at(current)?;
                }
                EntryKind::Tombstone => {
                    return Err(ZimError::NotFound(
                        self.scheme.display_path(entry.namespace, &entry.url),
                    ));
                }
            }
        }
    }

    /// Resolve `index` to its terminal content, fetching the blob.
    pub fn resolve(&self, index: u32) -> Result<Entry> {
        let terminal = self.follow(index)?;
        let redirected_from = if terminal.hops > 0 {
            let origin = self.directory.entry_at(index)?;
            Some(self.scheme.display_path(origin.namespace, &origin.url))
        } else {
            None
        };
        self.load(terminal, redirected_from)
    }

    fn load(&self, terminal: Terminal, redirected_from: Option<String>) -> Result<Entry> {
        let Terminal { index, entry, .. } = terminal;
        let EntryKind::Content {
            mime_index,
            cluster,
            blob,
        } = entry.kind
        else {
            return Err(ZimError::corrupt(format!("entry {index} is not content")));
        };

        let mimetype = self.mimetypes.get(mime_index)?.to_string();
        let content = self.clusters.get_blob(cluster, blob)?;

        Ok(Entry {
            index,
            path: self.scheme.display_path(entry.namespace, &entry.url),
            title: entry.title_or_url().to_string(),
            mimetype,
            content,
            redirected_from,
        })
    }
}
