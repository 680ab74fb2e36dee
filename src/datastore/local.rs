use async_trait::async_trait;
use chrono::Utc;

use super::{DatastoreError, JobEntity, JobKey, JobStore, NewJob};
use crate::storage::Database;

/// Job store backed by the local redb database (disk or in-memory).
pub struct LocalJobStore {
    db: Database,
    queue: String,
}

impl LocalJobStore {
    pub fn new(db: Database, queue: &str) -> Self {
        Self {
            db,
            queue: queue.to_string(),
        }
    }
}

#[async_trait]
impl JobStore for LocalJobStore {
    async fn create(&self, job: &NewJob) -> Result<JobKey, DatastoreError> {
        let entity = self
            .db
            .insert_job(job)?
            .ok_or(DatastoreError::DuplicateJobNumber(job.job_num))?;

        let key = JobKey {
            queue: self.queue.clone(),
            id: entity.id,
        };
        tracing::info!(job_num = job.job_num, key = %key, "Created local job");
        Ok(key)
    }

    async fn find(&self, job_num: i64) -> Result<Option<JobEntity>, DatastoreError> {
        Ok(self.db.get_job_by_num(job_num)?)
    }

    async fn update(&self, job_num: i64, status: &str) -> Result<JobEntity, DatastoreError> {
        let job = self
            .db
            .update_job_status(job_num, status, Utc::now())?
            .ok_or(DatastoreError::EntityNotFound(job_num))?;
        tracing::debug!(job_num, status, "Updated local job");
        Ok(job)
    }

    async fn remove(&self, job_num: i64) -> Result<(), DatastoreError> {
        if !self.db.delete_job_by_num(job_num)? {
            return Err(DatastoreError::EntityNotFound(job_num));
        }
        tracing::debug!(job_num, "Removed local job");
        Ok(())
    }
}
