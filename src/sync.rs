//! Provides [`AssetSyncService`], which keeps the assets and the title of containers on the
//! console in sync with what the user wants them to be.
//!
//! The service is lenient: failures are logged with their exact cause and then reported as
//! `false`, `None`, an empty listing or a fallback title, which is all a front end needs to decide
//! whether to go on.

use crate::{
    asset::{self, AssetError},
    cache::AssetCache,
    format::TITLE_KEY,
    ftp::{RemoteTarget, Transport, TransportError},
    sfo::{self, SfoContainer, SfoError},
};
use image::DynamicImage;
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error;

/// The directory containing one directory of assets per container.
pub const APPMETA_ROOT: &str = "/user/appmeta/";
/// The directory containing the metadata of every container.
pub const SYSTEM_APPMETA_ROOT: &str = "/system_data/priv/appmeta/";
pub const PARAM_SFO: &str = "param.sfo";

/// Shown when a container has no title entry.
pub const UNTITLED: &str = "No Name";
/// Shown when the metadata file exists but is broken.
pub const BROKEN_TITLE: &str = "SFO Error";
/// Shown when the metadata file couldn't be fetched.
pub const UNREACHABLE_TITLE: &str = "Connection Error";

pub fn asset_path(container_id: &str, file_name: &str) -> String {
    format!("{}{}/{}", APPMETA_ROOT, container_id, file_name)
}

pub fn asset_dir(container_id: &str) -> String {
    format!("{}{}/", APPMETA_ROOT, container_id)
}

pub fn param_sfo_path(container_id: &str) -> String {
    format!("{}{}/{}", SYSTEM_APPMETA_ROOT, container_id, PARAM_SFO)
}

/// An error of a single service operation. Only used for logging and for the `Result`-returning
/// variants of the operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Sfo(#[from] SfoError),
    #[error("{0}")]
    Asset(#[from] AssetError),
}

/// The outcome of reading the title of a container.
///
/// Every failure has its own fallback text, so a container that is literally named
/// "No Name" can still be told apart from one without a title.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TitleLookup {
    /// The container's `TITLE` entry.
    Named(String),
    /// The metadata file has no `TITLE` entry.
    Untitled,
    /// The metadata file is structurally broken.
    Malformed,
    /// The metadata file couldn't be fetched.
    Unreachable,
}

impl TitleLookup {
    /// Returns the text to display for the container.
    pub fn display_text(&self) -> &str {
        match self {
            TitleLookup::Named(title) => title,
            TitleLookup::Untitled => UNTITLED,
            TitleLookup::Malformed => BROKEN_TITLE,
            TitleLookup::Unreachable => UNREACHABLE_TITLE,
        }
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        matches!(self, TitleLookup::Named(_))
    }
}

impl fmt::Display for TitleLookup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.display_text())
    }
}

/// Lists, fetches, replaces and deletes assets of containers on the console and reads and
/// renames their titles.
///
/// Decoded images are cached per `(container id, file name)` until the same asset is uploaded or
/// deleted through this service. Directory listings and titles are never cached.
///
/// Operations are not serialized against each other. Concurrent uploads, deletes and fetches of
/// the same asset race on its cache entry, so callers that issue them concurrently must
/// serialize them.
pub struct AssetSyncService<T> {
    transport: T,
    cache: AssetCache,
}

impl<T: Transport> AssetSyncService<T> {
    pub fn new(transport: T) -> Self {
        Self::with_cache(transport, AssetCache::new())
    }

    pub fn with_cache(transport: T, cache: AssetCache) -> Self {
        Self { transport, cache }
    }

    #[inline]
    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Lists the containers on the console, sorted by id.
    ///
    /// # Errors
    /// Returns the [`TransportError`] of the listing.
    pub fn try_list_game_containers(
        &self,
        target: &RemoteTarget,
    ) -> Result<Vec<String>, TransportError> {
        self.transport.list_directories(target, APPMETA_ROOT)
    }

    /// Lists the containers on the console, sorted by id. Returns an empty list on failure.
    pub fn list_game_containers(&self, target: &RemoteTarget) -> Vec<String> {
        self.try_list_game_containers(target).unwrap_or_else(|e| {
            warn!("Couldn't list containers on {}: {}", target.host, e);
            Vec::new()
        })
    }

    /// Lists the image and sound files of a container.
    ///
    /// # Errors
    /// Returns the [`TransportError`] of the listing.
    pub fn try_list_asset_files(
        &self,
        target: &RemoteTarget,
        container_id: &str,
    ) -> Result<BTreeSet<String>, TransportError> {
        self.transport.list_files(target, &asset_dir(container_id))
    }

    /// Lists the image and sound files of a container. Returns an empty set on failure.
    pub fn list_asset_files(&self, target: &RemoteTarget, container_id: &str) -> BTreeSet<String> {
        self.try_list_asset_files(target, container_id)
            .unwrap_or_else(|e| {
                warn!("Couldn't list assets of {}: {}", container_id, e);
                BTreeSet::new()
            })
    }

    /// Fetches and decodes an asset, serving it from the cache when possible.
    ///
    /// Failures are not cached.
    ///
    /// # Errors
    /// Returns a [`SyncError`] if the asset couldn't be fetched or decoded.
    pub fn try_fetch_asset(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        file_name: &str,
    ) -> Result<Arc<DynamicImage>, SyncError> {
        if let Some(image) = self.cache.get(container_id, file_name) {
            trace!("Serving {}/{} from cache.", container_id, file_name);
            return Ok(image);
        }

        let bytes = self
            .transport
            .fetch_bytes(target, &asset_path(container_id, file_name))?;
        let image = Arc::new(asset::decode_image(&bytes)?);
        self.cache.put(container_id, file_name, image.clone());

        Ok(image)
    }

    /// Fetches and decodes an asset, serving it from the cache when possible. Returns `None` on
    /// failure.
    pub fn fetch_asset(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        file_name: &str,
    ) -> Option<Arc<DynamicImage>> {
        self.try_fetch_asset(target, container_id, file_name)
            .map_err(|e| warn!("Couldn't fetch {}/{}: {}", container_id, file_name, e))
            .ok()
    }

    /// Encodes an image as PNG and uploads it over the asset, then drops the asset from the
    /// cache. The cache is left alone if the upload fails.
    ///
    /// # Errors
    /// Returns a [`SyncError`] if the image couldn't be encoded or stored.
    pub fn try_upload_asset(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        file_name: &str,
        image: &DynamicImage,
    ) -> Result<(), SyncError> {
        let bytes = asset::encode_png(image)?;
        self.transport
            .store_bytes(target, &asset_path(container_id, file_name), &bytes)?;
        self.cache.invalidate(container_id, file_name);

        info!("Uploaded {}/{}.", container_id, file_name);

        Ok(())
    }

    /// Like [`AssetSyncService::try_upload_asset`] but returns `false` on failure.
    pub fn upload_asset(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        file_name: &str,
        image: &DynamicImage,
    ) -> bool {
        self.try_upload_asset(target, container_id, file_name, image)
            .map_err(|e| warn!("Couldn't upload {}/{}: {}", container_id, file_name, e))
            .is_ok()
    }

    /// Deletes an asset, then drops it from the cache. The cache is left alone if the delete
    /// fails.
    ///
    /// # Errors
    /// Returns the [`TransportError`] of the delete.
    pub fn try_delete_asset(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        file_name: &str,
    ) -> Result<(), TransportError> {
        self.transport
            .delete_path(target, &asset_path(container_id, file_name))?;
        self.cache.invalidate(container_id, file_name);

        info!("Deleted {}/{}.", container_id, file_name);

        Ok(())
    }

    /// Like [`AssetSyncService::try_delete_asset`] but returns `false` on failure.
    pub fn delete_asset(&self, target: &RemoteTarget, container_id: &str, file_name: &str) -> bool {
        self.try_delete_asset(target, container_id, file_name)
            .map_err(|e| warn!("Couldn't delete {}/{}: {}", container_id, file_name, e))
            .is_ok()
    }

    /// Reads the title of a container from its metadata file.
    pub fn read_title(&self, target: &RemoteTarget, container_id: &str) -> TitleLookup {
        let bytes = match self
            .transport
            .fetch_bytes(target, &param_sfo_path(container_id))
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Couldn't fetch metadata of {}: {}", container_id, e);
                return TitleLookup::Unreachable;
            }
        };

        let title = SfoContainer::parse(&bytes)
            .and_then(|container| container.read_string(&bytes, TITLE_KEY));
        match title {
            Ok(title) => TitleLookup::Named(title),
            Err(SfoError::NotFound) => {
                warn!("Metadata of {} has no title.", container_id);
                TitleLookup::Untitled
            }
            Err(e) => {
                warn!("Couldn't read metadata of {}: {}", container_id, e);
                TitleLookup::Malformed
            }
        }
    }

    /// Rewrites the `TITLE` entry and all `TITLE_xx` entries of a container's metadata file.
    ///
    /// Titles that don't fit into an entry's slot are truncated. The asset cache is not
    /// touched.
    ///
    /// # Errors
    /// Returns a [`SyncError`] if the metadata file couldn't be fetched, parsed or stored.
    pub fn try_rename_title(
        &self,
        target: &RemoteTarget,
        container_id: &str,
        new_title: &str,
    ) -> Result<(), SyncError> {
        let path = param_sfo_path(container_id);
        let mut bytes = self.transport.fetch_bytes(target, &path)?;

        let container = SfoContainer::parse(&bytes)?;
        let report = container.write_string(&mut bytes, sfo::is_title_key, new_title)?;
        if report.updated == 0 {
            warn!("Metadata of {} has no title entries to rename.", container_id);
        }
        if report.truncated {
            warn!(
                "Title \"{}\" doesn't fit into the metadata of {} and was truncated.",
                new_title, container_id
            );
        }
        if report.split_char {
            warn!("The truncated title of {} ends in a partial character.", container_id);
        }

        self.transport.store_bytes(target, &path, &bytes)?;

        info!(
            "Renamed {} to \"{}\" ({} entries).",
            container_id, new_title, report.updated
        );

        Ok(())
    }

    /// Like [`AssetSyncService::try_rename_title`] but returns `false` on failure.
    pub fn rename_title(&self, target: &RemoteTarget, container_id: &str, new_title: &str) -> bool {
        self.try_rename_title(target, container_id, new_title)
            .map_err(|e| warn!("Couldn't rename {}: {}", container_id, e))
            .is_ok()
    }
}
