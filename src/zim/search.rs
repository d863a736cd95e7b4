//! Prefix suggestion, full-text search and random selection.
//!
//! Suggestions walk the title-ordered list inside the user content namespace.
//! Full-text search probes for an embedded Xapian database but always answers
//! with a linear scan over HTML articles: the Xapian format lives
//! outside the ZIM layout and is not decoded here. The scan is O(n) in the
//! number of content entries and can be cancelled between clusters.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::error::{Result, ZimError};
use crate::io::ReadAt;

use super::directory::ListOrder;
use super::resolver::Resolver;
use super::structures::{Entry, EntryKind, Listing, NamespaceScheme, SearchResults};

/// (namespace, url) pairs where an embedded full-text index may live
const FULLTEXT_INDEX_PATHS: &[(char, &str)] =
    &[('X', "fulltext/xapian"), ('Z', "/fulltextIndex/xapian")];

const TITLE_INDEX_PATHS: &[(char, &str)] = &[('X', "title/xapian")];

/// Stylesheets, scripts and other text assets are not searched
fn is_article_mimetype(mimetype: &str) -> bool {
    mimetype.starts_with("text/html")
}

pub struct SearchIndex<'a, R: ReadAt> {
    resolver: &'a Resolver<'a, R>,
}

impl<'a, R: ReadAt> SearchIndex<'a, R> {
    pub fn new(resolver: &'a Resolver<'a, R>) -> Self {
        Self { resolver }
    }

    fn scheme(&self) -> NamespaceScheme {
        self.resolver.scheme
    }

    /// Titles starting with `prefix`, in title order.
    pub fn suggest(&self, prefix: &str, offset: usize, limit: usize) -> Result<Vec<Listing>> {
        let directory = self.resolver.directory;
        let namespace = self.scheme().content_namespace();
        let range = directory.prefix_range(ListOrder::Title, namespace, prefix)?;

        range
            .skip(offset)
            .take(limit)
            .map(|position| {
                let (_, entry) = directory.entry_at_position(ListOrder::Title, position)?;
                Ok(Listing {
                    path: self.scheme().display_path(entry.namespace, &entry.url),
                    title: entry.title_or_url().to_string(),
                })
            })
            .collect()
    }

    pub fn has_fulltext_index(&self) -> Result<bool> {
        self.any_present(FULLTEXT_INDEX_PATHS)
    }

    pub fn has_title_index(&self) -> Result<bool> {
        self.any_present(TITLE_INDEX_PATHS)
    }

    fn any_present(&self, paths: &[(char, &str)]) -> Result<bool> {
        for (namespace, url) in paths {
            if self.resolver.directory.find_by_path(*namespace, url)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Full-text search with pagination.
    ///
    /// `cancel` is checked whenever the scan moves into another cluster.
    pub fn search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<SearchResults> {
        if self.has_fulltext_index()? {
            debug!("embedded full-text index present but not decoded; using linear scan");
        }
        self.linear_scan(query, offset, limit, cancel)
    }

    fn linear_scan(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        cancel: Option<&AtomicBool>,
    ) -> Result<SearchResults> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Ok(SearchResults::default());
        }

        let directory = self.resolver.directory;
        let namespace = self.scheme().content_namespace();
        let range = directory.prefix_range(ListOrder::Url, namespace, "")?;
        debug!("linear scan for {:?} over {} entries", query, range.len());

        let wanted = offset.saturating_add(limit);
        let mut matched = 0usize;
        let mut results = Vec::new();
        let mut last_cluster = None;

        for position in range {
            let entry = directory.entry_at(position)?;
            let EntryKind::Content {
                mime_index,
                cluster,
                blob,
            } = entry.kind
            else {
                continue;
            };

            if last_cluster != Some(cluster) {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(ZimError::Cancelled);
                }
                last_cluster = Some(cluster);
            }

            if !is_article_mimetype(self.resolver.mimetypes.get(mime_index)?) {
                continue;
            }

            let hit = entry.title_or_url().to_lowercase().contains(&needle) || {
                let content = self.resolver.clusters.get_blob(cluster, blob)?;
                String::from_utf8_lossy(&content)
                    .to_lowercase()
                    .contains(&needle)
            };
            if !hit {
                continue;
            }

            if matched >= offset {
                results.push(Listing {
                    path: self.scheme().display_path(entry.namespace, &entry.url),
                    title: entry.title_or_url().to_string(),
                });
            }
            matched += 1;

            if matched >= wanted {
                return Ok(SearchResults {
                    results,
                    estimated_total: None,
                });
            }
        }

        Ok(SearchResults {
            results,
            estimated_total: Some(matched as u64),
        })
    }

    /// Uniformly drawn content entry from the content namespace.
    ///
    /// Draws landing on redirects or tombstones are re-rolled up to
    /// `retries` times; after that the list is probed forward (wrapping)
    /// from the last draw.
    pub fn random<G: Rng>(&self, rng: &mut G, retries: usize) -> Result<Entry> {
        let directory = self.resolver.directory;
        let namespace = self.scheme().content_namespace();
        let range = directory.prefix_range(ListOrder::Url, namespace, "")?;
        if range.is_empty() {
            return Err(ZimError::NoContentEntries);
        }

        let mut position = range.start;
        for attempt in 0..=retries {
            position = rng.gen_range(range.clone());
            if is_content(&directory.entry_at(position)?.kind) {
                return self.resolver.resolve(position);
            }
            debug!("random draw {} hit non-content entry {}", attempt, position);
        }

        let len = range.end - range.start;
        for step in 1..=len {
            let probe = range.start + (position - range.start + step) % len;
            if is_content(&directory.entry_at(probe)?.kind) {
                return self.resolver.resolve(probe);
            }
        }
        Err(ZimError::NoContentEntries)
    }
}

fn is_content(kind: &EntryKind) -> bool {
    matches!(kind, EntryKind::Content { .. })
}
