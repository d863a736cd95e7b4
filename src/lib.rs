//! # runzim
//!
//! A Rust reader for ZIM archives, the compressed offline format used for
//! Wikipedia and other wiki dumps.
//!
//! This library opens ZIM files from the local filesystem (or from bytes
//! already in memory) and answers queries by decoding only the parts of the
//! archive it needs: a binary search touches a handful of directory records,
//! and article bodies come from clusters that are decompressed on demand and
//! kept in a small LRU cache.
//!
//! ## Features
//!
//! - Archive information: counts, UUID, main page, metadata, MIME types
//! - Exact path lookup with redirect resolution
//! - Title-prefix listing (suggestions), paginated
//! - Full-text search by linear scan, paginated and cancellable
//! - Uniform random article selection
//! - zlib, xz and zstd cluster compression
//!
//! ## Example
//!
//! ```no_run
//! use runzim::Archive;
//!
//! fn main() -> anyhow::Result<()> {
//!     let archive = Archive::open("wikipedia_en_simple.zim")?;
//!
//!     // Titles starting with "Rust"
//!     for listing in archive.list_by_prefix("Rust", 10, 0)? {
//!         println!("{}\t{}", listing.path, listing.title);
//!     }
//!
//!     // Raw HTML of one article, redirects followed
//!     let entry = archive.get_entry("Rust_(programming_language)")?;
//!     println!("{} ({} bytes)", entry.mimetype, entry.size());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zim;

pub use cli::Cli;
pub use error::{Result, ZimError};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use zim::{Archive, ArchiveInfo, ArchiveOptions, Entry, Listing, SearchResults};
