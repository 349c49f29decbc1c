//! Replaces the icon, cover images and background music of applications on a console and renames
//! them, talking to the console's FTP server.
//!
//! The crate has two halves:
//!
//! * [`sfo`] reads and patches 'param.sfo' metadata files in memory,
//! * [`sync`] moves assets and metadata between here and the console through short-lived
//!   [`ftp`] sessions, caching decoded images in an [`cache::AssetCache`].

#[macro_use]
extern crate log;

pub mod asset;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod ftp;
pub mod sfo;
pub mod sync;
pub mod util;

#[cfg(test)]
#[path = "../tests/common/sfo_fixture.rs"]
mod sfo_fixture;

pub use sync::{AssetSyncService, TitleLookup};
