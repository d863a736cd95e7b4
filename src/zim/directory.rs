//! URL- and title-ordered entry tables.
//!
//! Neither table is materialized: a lookup reads one pointer and decodes one
//! directory record per probe. The URL pointer list holds file offsets of
//! records sorted by (namespace, url); the title pointer list holds entry
//! indices sorted by (namespace, title-or-url). Keys compare byte-wise.
//!
//! Sorting is trusted. On an archive whose lists are out of order the binary
//! searches still terminate and stay in bounds, they just return the wrong
//! range.

use byteorder::{LittleEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::io::Cursor;
use std::ops::Range;

use crate::error::{Result, ZimError};
use crate::io::ReadAt;

use super::decoder::Decoder;
use super::structures::{DirectoryEntry, EntryKind, Header};

/// Which pointer list a position refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    Url,
    Title,
}

pub struct DirectoryIndex<R: ReadAt> {
    decoder: Decoder<R>,
    entry_count: u32,
    url_ptr_pos: u64,
    title_ptr_pos: u64,
}

impl<R: ReadAt> DirectoryIndex<R> {
    pub fn new(decoder: Decoder<R>, header: &Header) -> Self {
        Self {
            decoder,
            entry_count: header.entry_count,
            url_ptr_pos: header.url_ptr_pos,
            title_ptr_pos: header.title_ptr_pos,
        }
    }

    pub fn len(&self) -> u32 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.entry_count {
            return Err(ZimError::corrupt(format!(
                "entry index {index} out of range ({} entries)",
                self.entry_count
            )));
        }
        Ok(())
    }

    /// Entry index stored at `position` of the given list.
    pub fn index_at(&self, order: ListOrder, position: u32) -> Result<u32> {
        self.check_index(position)?;
        match order {
            ListOrder::Url => Ok(position),
            ListOrder::Title => {
                let index = self
                    .decoder
                    .read_u32(self.title_ptr_pos + 4 * position as u64)?;
                self.check_index(index)?;
                Ok(index)
            }
        }
    }

    pub fn entry_at(&self, index: u32) -> Result<DirectoryEntry> {
        self.check_index(index)?;
        let offset = self.decoder.read_u64(self.url_ptr_pos + 8 * index as u64)?;
        self.parse_entry(offset)
    }

    pub fn entry_at_position(
        &self,
        order: ListOrder,
        position: u32,
    ) -> Result<(u32, DirectoryEntry)> {
        let index = self.index_at(order, position)?;
        Ok((index, self.entry_at(index)?))
    }

    /// Exact (namespace, url) lookup.
    pub fn find_by_path(&self, namespace: char, url: &str) -> Result<Option<u32>> {
        let position = self.lower_bound(ListOrder::Url, namespace, url)?;
        if position >= self.entry_count {
            return Ok(None);
        }
        let entry = self.entry_at(position)?;
        if entry.namespace == namespace && entry.url == url {
            Ok(Some(position))
        } else {
            Ok(None)
        }
    }

    /// Positions in `order` whose key lies in `namespace` and starts with
    /// `prefix`. An empty prefix yields the whole namespace.
    pub fn prefix_range(
        &self,
        order: ListOrder,
        namespace: char,
        prefix: &str,
    ) -> Result<Range<u32>> {
        let low = self.lower_bound(order, namespace, prefix)?;
        let high = partition_point(low, self.entry_count, |position| {
            let (_, entry) = self.entry_at_position(order, position)?;
            Ok(entry.namespace == namespace && sort_key(&entry, order).starts_with(prefix))
        })?;
        Ok(low..high)
    }

    /// First position whose (namespace, key) is not less than the target.
    fn lower_bound(&self, order: ListOrder, namespace: char, key: &str) -> Result<u32> {
        partition_point(0, self.entry_count, |position| {
            let (_, entry) = self.entry_at_position(order, position)?;
            Ok(compare(&entry, order, namespace, key) == Ordering::Less)
        })
    }

    fn parse_entry(&self, offset: u64) -> Result<DirectoryEntry> {
        let head = self.decoder.read_bytes(offset, 8)?;
        let mut cursor = Cursor::new(&head);
        let mimetype = cursor.read_u16::<LittleEndian>()?;
        let _parameter_len = cursor.read_u8()?;
        let namespace = cursor.read_u8()?;
        let revision = cursor.read_u32::<LittleEndian>()?;

        if !namespace.is_ascii() {
            return Err(ZimError::corrupt(format!(
                "directory entry at {offset} has non-ASCII namespace {namespace:#04x}"
            )));
        }

        let (kind, strings_at) = match mimetype {
            DirectoryEntry::REDIRECT_MIME => {
                let target = self.decoder.read_u32(offset + 8)?;
                (EntryKind::Redirect { target }, offset + 12)
            }
            DirectoryEntry::LINK_TARGET_MIME | DirectoryEntry::DELETED_MIME => {
                (EntryKind::Tombstone, offset + 8)
            }
            mime_index => {
                let cluster = self.decoder.read_u32(offset + 8)?;
                let blob = self.decoder.read_u32(offset + 12)?;
                (
                    EntryKind::Content {
                        mime_index,
                        cluster,
                        blob,
                    },
                    offset + 16,
                )
            }
        };

        let (url, title_at) = self.decoder.read_string(strings_at)?;
        let (title, _) = self.decoder.read_string(title_at)?;

        Ok(DirectoryEntry {
            namespace: namespace as char,
            revision,
            url,
            title,
            kind,
        })
    }
}

fn sort_key(entry: &DirectoryEntry, order: ListOrder) -> &str {
    match order {
        ListOrder::Url => &entry.url,
        ListOrder::Title => entry.title_or_url(),
    }
}

fn compare(entry: &DirectoryEntry, order: ListOrder, namespace: char, key: &str) -> Ordering {
    (entry.namespace as u32)
        .cmp(&(namespace as u32))
        .then_with(|| sort_key(entry, order).as_bytes().cmp(key.as_bytes()))
}

/// First position in `lo..hi` for which `pred` is false, assuming `pred`
/// holds for a prefix of the range. Probe errors abort the search.
pub(crate) fn partition_point<F>(mut lo: u32, mut hi: u32, mut pred: F) -> Result<u32>
where
    F: FnMut(u32) -> Result<bool>,
{
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid)? {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    Ok(lo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use byteorder::WriteBytesExt;
    use std::sync::Arc;

    enum Record<'a> {
        Content(&'a str, &'a str),
        Redirect(&'a str, &'a str, u32),
    }

    /// A bare directory: URL list at 0, title list after it, then records.
    /// Records must already be in URL order; titles are sorted here.
    fn directory(namespace: char, records: &[Record]) -> DirectoryIndex<MemoryReader> {
        let n = records.len();
        let url_ptr_pos = 0u64;
        let title_ptr_pos = 8 * n as u64;
        let mut body = Vec::new();
        let mut offsets = Vec::new();
        let mut titles = Vec::new();
        let base = title_ptr_pos + 4 * n as u64;

        for (i, record) in records.iter().enumerate() {
            offsets.push(base + body.len() as u64);
            let (url, title) = match record {
                Record::Content(url, title) => {
                    body.write_u16::<LittleEndian>(0).unwrap();
                    body.push(0);
                    body.push(namespace as u8);
                    body.write_u32::<LittleEndian>(0).unwrap();
                    body.write_u32::<LittleEndian>(0).unwrap();
                    body.write_u32::<LittleEndian>(i as u32).unwrap();
                    (url, title)
                }
                Record::Redirect(url, title, target) => {
                    body.write_u16::<LittleEndian>(DirectoryEntry::REDIRECT_MIME).unwrap();
                    body.push(0);
                    body.push(namespace as u8);
                    body.write_u32::<LittleEndian>(0).unwrap();
                    body.write_u32::<LittleEndian>(*target).unwrap();
                    (url, title)
                }
            };
            body.extend_from_slice(url.as_bytes());
            body.push(0);
            body.extend_from_slice(title.as_bytes());
            body.push(0);
            let key = if title.is_empty() { url } else { title };
            titles.push((key.to_string(), i as u32));
        }
        titles.sort();

        let mut data = Vec::new();
        for offset in offsets {
            data.write_u64::<LittleEndian>(offset).unwrap();
        }
        for (_, index) in titles {
            data.write_u32::<LittleEndian>(index).unwrap();
        }
        data.extend(body);

        DirectoryIndex {
            decoder: Decoder::new(Arc::new(MemoryReader::new(data))),
            entry_count: n as u32,
            url_ptr_pos,
            title_ptr_pos,
        }
    }

    fn sample() -> DirectoryIndex<MemoryReader> {
        directory(
            'C',
            &[
                Record::Content("apple.html", "Apple"),
                Record::Content("banana.html", "Banana"),
                Record::Content("blueberry.html", "Blueberry"),
                Record::Content("cherry.html", ""),
                Record::Redirect("fruit", "Fruit", 0),
            ],
        )
    }

    #[test]
    fn decodes_records() {
        let dir = sample();
        let entry = dir.entry_at(1).unwrap();
        assert_eq!(entry.namespace, 'C');
        assert_eq!(entry.url, "banana.html");
        assert_eq!(entry.title, "Banana");
        assert_eq!(
            entry.kind,
            EntryKind::Content {
                mime_index: 0,
                cluster: 0,
                blob: 1
            }
        );
        assert_eq!(dir.entry_at(4).unwrap().kind, EntryKind::Redirect { target: 0 });
        assert_eq!(dir.entry_at(3).unwrap().title_or_url(), "cherry.html");
        assert!(matches!(dir.entry_at(5), Err(ZimError::CorruptArchive(_))));
    }

    #[test]
    fn finds_exact_paths() {
        let dir = sample();
        assert_eq!(dir.find_by_path('C', "cherry.html").unwrap(), Some(3));
        assert_eq!(dir.find_by_path('C', "fruit").unwrap(), Some(4));
        assert_eq!(dir.find_by_path('C', "banana").unwrap(), None);
        assert_eq!(dir.find_by_path('C', "zzz").unwrap(), None);
        assert_eq!(dir.find_by_path('A', "apple.html").unwrap(), None);
        assert_eq!(dir.find_by_path('M', "apple.html").unwrap(), None);
    }

    #[test]
    fn prefix_ranges_by_title() {
        let dir = sample();
        let range = dir.prefix_range(ListOrder::Title, 'C', "B").unwrap();
        let titles: Vec<_> = range
            .map(|p| dir.entry_at_position(ListOrder::Title, p).unwrap().1.title)
            .collect();
        assert_eq!(titles, vec!["Banana", "Blueberry"]);

        assert_eq!(dir.prefix_range(ListOrder::Title, 'C', "").unwrap(), 0..5);
        assert!(dir.prefix_range(ListOrder::Title, 'C', "Q").unwrap().is_empty());
        assert!(dir.prefix_range(ListOrder::Title, 'M', "").unwrap().is_empty());
    }

    #[test]
    fn prefix_ranges_by_url() {
        let dir = sample();
        assert_eq!(dir.prefix_range(ListOrder::Url, 'C', "b").unwrap(), 1..3);
        assert_eq!(dir.prefix_range(ListOrder::Url, 'C', "fruit").unwrap(), 4..5);
    }

    #[test]
    fn partition_point_finds_boundary() {
        let values = [1, 3, 5, 7, 9];
        let pp = |target| partition_point(0, 5, |i| Ok(values[i as usize] < target)).unwrap();
        assert_eq!(pp(0), 0);
        assert_eq!(pp(5), 2);
        assert_eq!(pp(6), 3);
        assert_eq!(pp(10), 5);
    }

    #[test]
    fn unsorted_lists_do_not_panic() {
        let dir = directory(
            'C',
            &[
                Record::Content("zeta", "Zeta"),
                Record::Content("alpha", "Alpha"),
                Record::Content("mid", "Mid"),
            ],
        );
        // Results are unspecified, but the search stays in bounds.
        let range = dir.prefix_range(ListOrder::Url, 'C', "alpha").unwrap();
        assert!(range.end <= 3);
        let _ = dir.find_by_path('C', "alpha").unwrap();
    }
}
