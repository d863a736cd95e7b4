//! ZIM archive access.
//!
//! This module reads ZIM archives (the openZIM offline content format)
//! without loading them into memory: the header and MIME list are parsed on
//! open, and everything else is decoded on demand.
//!
//! ## Architecture
//!
//! Leaf-first:
//!
//! - `decoder`: bounds-checked integer, string and byte reads over a [`ReadAt`](crate::io::ReadAt) source
//! - `cluster`: cluster location, decompression, blob slicing and the LRU cluster cache
//! - `directory`: binary search over the URL- and title-ordered pointer lists
//! - `resolver`: redirect following and entry materialization
//! - `search`: prefix suggestion, full-text search (linear scan) and random selection
//! - `archive`: the [`Archive`] façade tying the above together
//!
//! ## ZIM Format Overview
//!
//! A ZIM file consists of:
//! 1. An 80-byte header with counts and the positions of every table
//! 2. A MIME type list referenced by index from directory records
//! 3. URL pointer list (record offsets) and title pointer list (entry indices)
//! 4. Cluster pointer list and the clusters themselves, each holding blobs
//! 5. An optional MD5 checksum at the end
//!
//! ## Supported Features
//!
//! - Major versions 5 and 6, old (`A/...`) and new (`C` only) namespace layouts
//! - Uncompressed, zlib, xz and zstd clusters, with 32- or 64-bit blob offsets
//! - Content, redirect and link-target/deleted records
//!
//! ## Limitations
//!
//! - No bzip2 clusters
//! - Embedded Xapian indexes are detected but not read; search scans linearly
//! - Read-only: no archive creation

mod archive;
mod cluster;
mod decoder;
mod directory;
mod options;
mod resolver;
mod search;
mod structures;

pub use archive::Archive;
pub use cluster::{Cluster, ClusterStore};
pub use decoder::{Decoder, RangeReader};
pub use directory::{DirectoryIndex, ListOrder};
pub use options::ArchiveOptions;
pub use structures::*;
