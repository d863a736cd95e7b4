//! Cluster decompression and blob slicing.
//!
//! A cluster is the unit of compression: one info byte (low nibble codec,
//! bit `0x10` for 64-bit offsets) followed by the possibly-compressed
//! payload. The payload opens with a table of blob offsets; the first offset
//! divided by the offset width gives the number of offsets, which is one more
//! than the number of blobs.
//!
//! Decompressed clusters are kept in a small LRU cache. Clusters can run to
//! tens of megabytes, so the capacity is a count of clusters, not bytes.

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use lru::LruCache;
use parking_lot::Mutex;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};
use xz2::read::XzDecoder;

use crate::error::{Result, ZimError};
use crate::io::ReadAt;

use super::decoder::Decoder;
use super::structures::Compression;

const EXTENDED_FLAG: u8 = 0x10;

/// A decompressed cluster: payload plus its blob offset table
#[derive(Debug)]
pub struct Cluster {
    data: Vec<u8>,
    offsets: Vec<u64>,
}

impl Cluster {
    /// Parse a decompressed payload (the bytes after the info byte).
    pub fn from_payload(data: Vec<u8>, extended: bool) -> Result<Self> {
        let width = if extended { 8 } else { 4 };
        if data.len() < width {
            return Err(ZimError::corrupt("cluster too small for its offset table"));
        }

        let first = LittleEndian::read_uint(&data[..width], width);
        if first == 0 || first % width as u64 != 0 || first > data.len() as u64 {
            return Err(ZimError::corrupt(format!(
                "bad first blob offset {first} in cluster of {} bytes",
                data.len()
            )));
        }

        let count = (first / width as u64) as usize;
        let mut offsets = Vec::with_capacity(count);
        let mut previous = first;
        for chunk in data[..count * width].chunks_exact(width) {
            let offset = LittleEndian::read_uint(chunk, width);
            if offset < previous || offset > data.len() as u64 {
                return Err(ZimError::corrupt(format!(
                    "blob offset {offset} out of order or past cluster end"
                )));
            }
            previous = offset;
            offsets.push(offset);
        }

        Ok(Self { data, offsets })
    }

    pub fn blob_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn blob(&self, index: u32) -> Result<&[u8]> {
        let i = index as usize;
        if i >= self.blob_count() {
            return Err(ZimError::corrupt(format!(
                "blob {index} out of range (cluster has {})",
                self.blob_count()
            )));
        }
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        Ok(&self.data[start..end])
    }
}

/// Decompress a cluster payload (the bytes after the info byte) from `source`.
///
/// The offset table is decoded first and its last entry gives the payload
/// length, so reading stops there. Whatever follows the compressed stream in
/// the archive, such as directory tables after the last cluster, is never
/// consumed.
pub fn read_payload<S: Read>(
    compression: Compression,
    source: S,
    extended: bool,
) -> Result<Vec<u8>> {
    match compression {
        Compression::None => read_sized(source, extended, "uncompressed"),
        Compression::Zlib => read_sized(ZlibDecoder::new(source), extended, "zlib"),
        Compression::Xz => read_sized(XzDecoder::new(source), extended, "xz"),
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(source)
                .map_err(|e| ZimError::corrupt(format!("zstd cluster failed to open: {e}")))?
                .single_frame();
            read_sized(decoder, extended, "zstd")
        }
        Compression::Bzip2 | Compression::Unknown(_) => {
            Err(ZimError::UnsupportedCompression(compression.as_u8()))
        }
    }
}

fn read_sized<S: Read>(mut reader: S, extended: bool, codec: &str) -> Result<Vec<u8>> {
    let failed =
        |e: io::Error| ZimError::corrupt(format!("{codec} cluster failed to decompress: {e}"));
    let width = if extended { 8 } else { 4 };

    let mut data = vec![0u8; width];
    reader.read_exact(&mut data).map_err(failed)?;
    let first = LittleEndian::read_uint(&data, width);
    if first < width as u64 || first % width as u64 != 0 {
        return Err(ZimError::corrupt(format!(
            "bad first blob offset {first} in {codec} cluster"
        )));
    }

    fill_to(&mut reader, &mut data, first).map_err(failed)?;
    let last = LittleEndian::read_uint(&data[first as usize - width..], width);
    if last < first {
        return Err(ZimError::corrupt(format!(
            "last blob offset {last} precedes the offset table in {codec} cluster"
        )));
    }
    fill_to(&mut reader, &mut data, last).map_err(failed)?;
    Ok(data)
}

/// Grow `data` to exactly `len` bytes from `reader`.
fn fill_to<S: Read>(reader: &mut S, data: &mut Vec<u8>, len: u64) -> io::Result<()> {
    let missing = len - data.len() as u64;
    let got = reader.by_ref().take(missing).read_to_end(data)? as u64;
    if got < missing {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload ends after {} of {len} bytes", data.len()),
        ));
    }
    Ok(())
}

/// Locates clusters through the cluster pointer list and caches them.
pub struct ClusterStore<R: ReadAt> {
    decoder: Decoder<R>,
    ptr_pos: u64,
    count: u32,
    /// Where the last cluster stops (checksum position or archive end)
    end: u64,
    cache: Mutex<LruCache<u32, Arc<Cluster>>>,
    decompressions: AtomicU64,
}

impl<R: ReadAt> ClusterStore<R> {
    pub fn new(
        decoder: Decoder<R>,
        ptr_pos: u64,
        count: u32,
        end: u64,
        capacity: NonZeroUsize,
    ) -> Self {
        Self {
            decoder,
            ptr_pos,
            count,
            end,
            cache: Mutex::new(LruCache::new(capacity)),
            decompressions: AtomicU64::new(0),
        }
    }

    /// Number of clusters decompressed so far (cache misses)
    pub fn decompressions(&self) -> u64 {
        self.decompressions.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Byte range `[start, end)` of cluster `index` in the archive.
    pub fn cluster_range(&self, index: u32) -> Result<(u64, u64)> {
        if index >= self.count {
            return Err(ZimError::corrupt(format!(
                "cluster {index} out of range ({} clusters)",
                self.count
            )));
        }
        let start = self.decoder.read_u64(self.ptr_pos + 8 * index as u64)?;
        let end = if index + 1 < self.count {
            self.decoder.read_u64(self.ptr_pos + 8 * (index as u64 + 1))?
        } else {
            self.end
        };

        if start >= end || end > self.decoder.size() {
            return Err(ZimError::corrupt(format!(
                "cluster {index} has invalid range {start}..{end}"
            )));
        }
        Ok((start, end))
    }

    /// Decompressed cluster, from cache when possible.
    pub fn get_cluster(&self, index: u32) -> Result<Arc<Cluster>> {
        // Held across the load so a cluster is never decompressed twice.
        let mut cache = self.cache.lock();
        if let Some(cluster) = cache.get(&index) {
            return Ok(Arc::clone(cluster));
        }

        let cluster = Arc::new(self.load(index)?);
        if let Some((evicted, _)) = cache.push(index, Arc::clone(&cluster)) {
            if evicted != index {
                trace!("evicted cluster {} from cache", evicted);
            }
        }
        Ok(cluster)
    }

    pub fn get_blob(&self, cluster: u32, blob: u32) -> Result<Vec<u8>> {
        let cluster = self.get_cluster(cluster)?;
        Ok(cluster.blob(blob)?.to_vec())
    }

    fn load(&self, index: u32) -> Result<Cluster> {
        let (start, end) = self.cluster_range(index)?;
        let info = self.decoder.read_bytes(start, 1)?[0];
        let compression = Compression::from_u8(info & 0x0F);
        let extended = info & EXTENDED_FLAG != 0;

        let mut source = self.decoder.range_reader(start + 1, end)?;
        let payload = read_payload(compression, &mut source, extended)?;
        self.decompressions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "decompressed cluster {} ({:?}, read {} bytes -> {} bytes)",
            index,
            compression,
            end - start - 1 - source.remaining(),
            payload.len()
        );

        Cluster::from_payload(payload, extended)
    }
}
