use std::num::NonZeroUsize;

/// Tunables for an opened archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Decompressed clusters kept in the LRU cache
    pub cluster_cache_capacity: NonZeroUsize,
    /// Longest redirect chain followed before giving up
    pub max_redirect_hops: usize,
    /// Random draws re-rolled before probing for content linearly
    pub random_retries: usize,
}

impl ArchiveOptions {
    pub const DEFAULT_CLUSTER_CACHE: usize = 8;
    pub const DEFAULT_REDIRECT_HOPS: usize = 20;
    pub const DEFAULT_RANDOM_RETRIES: usize = 32;

    /// Zero is bumped to one; the cache always holds at least one cluster.
    pub fn with_cluster_cache_capacity(mut self, clusters: usize) -> Self {
        self.cluster_cache_capacity = NonZeroUsize::new(clusters).unwrap_or(NonZeroUsize::MIN);
        self
    }

    pub fn with_max_redirect_hops(mut self, hops: usize) -> Self {
        self.max_redirect_hops = hops;
        self
    }

    pub fn with_random_retries(mut self, retries: usize) -> Self {
        self.random_retries = retries;
        self
    }
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            cluster_cache_capacity: NonZeroUsize::new(Self::DEFAULT_CLUSTER_CACHE)
                .unwrap_or(NonZeroUsize::MIN),
            max_redirect_hops: Self::DEFAULT_REDIRECT_HOPS,
            random_retries: Self::DEFAULT_RANDOM_RETRIES,
        }
    }
}
