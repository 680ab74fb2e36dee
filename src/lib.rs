//! fmtc - blog service whose media lives in Google Cloud Storage
//!
//! This crate provides:
//! - Cloud client bootstrap with swappable backends (Google Cloud, local, in-memory)
//! - A job registry over Cloud Datastore `Job` entities
//! - Bucket transfers (upload, download, wipe) and a media storage backend
//! - Posts stored in redb, served over a REST API

pub mod api;
pub mod cloud;
pub mod config;
pub mod datastore;
pub mod media;
pub mod object_store;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use cloud::CloudClients;
use config::Config;
use media::MediaStorage;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub cloud: CloudClients,
    pub media: MediaStorage,
}

impl AppState {
    /// Wire the media backend onto the job-artifact bucket.
    pub fn new(config: Config, db: Database, cloud: CloudClients) -> Self {
        let media = MediaStorage::new(
            std::sync::Arc::clone(&cloud.default_job_bucket),
            &config.media.storage_location,
        );
        Self {
            config,
            db,
            cloud,
            media,
        }
    }
}
