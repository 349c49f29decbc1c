//! Provides [`AssetCache`], a store of decoded images keyed by container and file name.

use dashmap::DashMap;
use image::DynamicImage;
use std::sync::Arc;

type Key = (String, String);

/// Decoded images keyed by `(container id, file name)`.
///
/// Entries never expire and the cache is unbounded; they only go away through
/// [`AssetCache::invalidate`]. Each operation locks only the shard holding its key, so operations
/// are atomic with respect to each other, with the last writer winning.
#[derive(Debug, Default)]
pub struct AssetCache {
    images: DashMap<Key, Arc<DynamicImage>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, container_id: &str, file_name: &str) -> Option<Arc<DynamicImage>> {
        self.images
            .get(&(container_id.to_owned(), file_name.to_owned()))
            .map(|entry| entry.value().clone())
    }

    pub fn put(&self, container_id: &str, file_name: &str, image: Arc<DynamicImage>) {
        self.images
            .insert((container_id.to_owned(), file_name.to_owned()), image);
    }

    /// Removes an entry. Does nothing if there is none.
    pub fn invalidate(&self, container_id: &str, file_name: &str) {
        if self
            .images
            .remove(&(container_id.to_owned(), file_name.to_owned()))
            .is_some()
        {
            trace!("Dropped cached {}/{}.", container_id, file_name);
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
