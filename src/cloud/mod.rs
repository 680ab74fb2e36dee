//! Process-wide cloud handles, built once at startup.
//!
//! [`CloudClients::connect`] picks the implementation from configuration:
//! credentialed Google clients, a local directory plus redb for development,
//! or in-memory stubs for CI. The handles are read-only afterwards.

pub mod auth;
pub mod compute;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{CloudBackend, CloudConfig};
use crate::datastore::{DatastoreClient, JobStore, LocalJobStore};
use crate::object_store::{
    GcsClient, LocalClient, MemoryClient, MemoryStore, ObjectStore, StorageClient,
};
use crate::storage::Database;
use auth::{Credentials, ServiceAccountKey, TokenProvider};
use compute::ComputeClient;

pub struct CloudClients {
    pub storage: Arc<dyn StorageClient>,
    pub jobs: Arc<dyn JobStore>,
    /// Only present with credentialed clients
    pub compute: Option<Arc<ComputeClient>>,
    /// General asset bucket
    pub default_bucket: Arc<dyn ObjectStore>,
    /// Job-artifact bucket
    pub default_job_bucket: Arc<dyn ObjectStore>,
}

impl CloudClients {
    /// Build the clients for the configured backend. `db` backs the local job store.
    pub async fn connect(config: &CloudConfig, db: &Database) -> anyhow::Result<Self> {
        match config.backend {
            CloudBackend::Gcs => Self::google(config).await,
            CloudBackend::Local => Self::local(config, db).await,
            CloudBackend::Memory => Self::memory(config).await,
        }
    }

    async fn google(config: &CloudConfig) -> anyhow::Result<Self> {
        let credentials = load_credentials(config).await?;
        let http = reqwest::Client::builder().build()?;
        let tokens = Arc::new(
            TokenProvider::new(http, credentials)
                .await
                .context("Failed to obtain an access token")?,
        );

        let storage: Arc<dyn StorageClient> = Arc::new(GcsClient::new(Arc::clone(&tokens)));
        let jobs = Arc::new(DatastoreClient::new(
            Arc::clone(&tokens),
            &config.project_id,
            &config.job_queue_name,
        ));
        let compute = Arc::new(ComputeClient::new(
            Arc::clone(&tokens),
            &config.project_id,
            &config.zone,
        ));

        info!(project = %config.project_id, "Using Google Cloud backend");
        Self::with_buckets(storage, jobs, Some(compute), config).await
    }

    async fn local(config: &CloudConfig, db: &Database) -> anyhow::Result<Self> {
        let client = LocalClient::new(&config.local_storage_path)?;
        client.create_bucket(&config.default_bucket)?;
        client.create_bucket(&config.default_job_bucket)?;

        let jobs = Arc::new(LocalJobStore::new(db.clone(), &config.job_queue_name));

        info!(path = %config.local_storage_path, "Using local storage backend");
        Self::with_buckets(Arc::new(client), jobs, None, config).await
    }

    /// Inert stand-ins: nothing leaves the process.
    pub async fn memory(config: &CloudConfig) -> anyhow::Result<Self> {
        let client = MemoryClient::new();
        client.insert_bucket(MemoryStore::new(&config.default_bucket).with_placeholder());
        client.create_bucket(&config.default_job_bucket);

        let jobs = Arc::new(LocalJobStore::new(
            Database::in_memory()?,
            &config.job_queue_name,
        ));

        info!("Using in-memory stub backend");
        Self::with_buckets(Arc::new(client), jobs, None, config).await
    }

    async fn with_buckets(
        storage: Arc<dyn StorageClient>,
        jobs: Arc<dyn JobStore>,
        compute: Option<Arc<ComputeClient>>,
        config: &CloudConfig,
    ) -> anyhow::Result<Self> {
        let default_bucket = storage
            .bucket(&config.default_bucket)
            .await
            .with_context(|| format!("Failed to resolve bucket {}", config.default_bucket))?;
        let default_job_bucket = storage
            .bucket(&config.default_job_bucket)
            .await
            .with_context(|| format!("Failed to resolve bucket {}", config.default_job_bucket))?;

        Ok(Self {
            storage,
            jobs,
            compute,
            default_bucket,
            default_job_bucket,
        })
    }
}

async fn load_credentials(config: &CloudConfig) -> anyhow::Result<Credentials> {
    let key = if let Some(ref json) = config.credentials_json {
        Some(ServiceAccountKey::from_json(json)?)
    } else if let Some(ref path) = config.credentials_file {
        Some(
            ServiceAccountKey::from_file(path)
                .await
                .with_context(|| format!("Failed to read credentials from {path}"))?,
        )
    } else {
        None
    };

    match key {
        Some(key) => {
            if let Some(ref project) = key.project_id {
                if project != &config.project_id {
                    tracing::warn!(
                        key_project = %project,
                        project = %config.project_id,
                        "Service account belongs to a different project"
                    );
                }
            }
            Ok(Credentials::ServiceAccount(key))
        }
        None => Ok(Credentials::MetadataServer),
    }
}
