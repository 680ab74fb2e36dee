//! Job registry: pipeline job records kept as `Job` entities under a single
//! `Job Queue` parent key.

mod local;
mod remote;

pub use local::LocalJobStore;
pub use remote::DatastoreClient;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::DatabaseError;

pub const JOB_KIND: &str = "Job";
pub const JOB_QUEUE_KIND: &str = "Job Queue";

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("Datastore entry not found for job {0}")]
    EntityNotFound(i64),
    #[error("More than one datastore entry for job {0}")]
    DuplicateJobNumber(i64),
    #[error("Datastore error: {0}")]
    Backend(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Input for [`JobStore::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub created: DateTime<Utc>,
    /// Email of the user who approved the job
    pub email: String,
    pub job_num: i64,
    /// Uploaded structure file name
    pub filename: String,
    pub status: String,
}

/// A stored `Job` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEntity {
    /// Numeric id of the entity key, allocated by the store
    pub id: i64,
    /// Creation time, refreshed on every status update
    pub date: DateTime<Utc>,
    pub email: String,
    pub job_num: i64,
    pub filename: String,
    pub status: String,
    pub error: bool,
}

impl JobEntity {
    pub fn from_new(id: i64, job: &NewJob) -> Self {
        Self {
            id,
            date: job.created,
            email: job.email.clone(),
            job_num: job.job_num,
            filename: job.filename.clone(),
            status: job.status.clone(),
            error: false,
        }
    }
}

/// Full key of a job entity: `Job Queue` parent name plus the job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKey {
    pub queue: String,
    pub id: i64,
}

/// Renders the flat key path the pipeline expects,
/// e.g. `Key('Job Queue', 'Ligand_Express', 'Job', 5629499534213120)`.
impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Key('{JOB_QUEUE_KIND}', '{}', '{JOB_KIND}', {})",
            self.queue, self.id
        )
    }
}

/// CRUD over job entities. Each call is a single-entity transaction; errors
/// from the backing service are returned unchanged, never retried.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateJobNumber` if the number is taken.
    async fn create(&self, job: &NewJob) -> Result<JobKey, DatastoreError>;
    async fn find(&self, job_num: i64) -> Result<Option<JobEntity>, DatastoreError>;
    /// Set the status and refresh the timestamp.
    async fn update(&self, job_num: i64, status: &str) -> Result<JobEntity, DatastoreError>;
    async fn remove(&self, job_num: i64) -> Result<(), DatastoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_display() {
        let key = JobKey {
            queue: "Ligand_Express".to_string(),
            id: 42,
        };
        assert_eq!(key.to_string(), "Key('Job Queue', 'Ligand_Express', 'Job', 42)");
    }

    #[test]
    fn test_entity_from_new_job() {
        let job = NewJob {
            created: Utc::now(),
            email: "a@b.c".to_string(),
            job_num: 7,
            filename: "protein.pdb".to_string(),
            status: "pending".to_string(),
        };
        let entity = JobEntity::from_new(1, &job);
        assert!(!entity.error);
        assert_eq!(entity.date, job.created);
        assert_eq!(entity.filename, "protein.pdb");
    }
}
