use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::tables::*;
use crate::datastore::{JobEntity, NewJob};

impl Database {
    // ========================================================================
    // Job operations
    // ========================================================================

    /// Store a new job entity. Returns `None` if the job number is already taken.
    pub fn insert_job(&self, job: &NewJob) -> Result<Option<JobEntity>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let inserted = {
            let mut numbers = write_txn.open_table(JOB_NUMBERS)?;
            let taken = numbers.get(job.job_num)?.is_some();
            if taken {
                None
            } else {
                let id = Database::next_id(&write_txn, "jobs")? as i64;
                let entity = JobEntity::from_new(id, job);
                numbers.insert(job.job_num, id)?;

                let mut table = write_txn.open_table(JOBS)?;
                let data = rmp_serde::to_vec_named(&entity)?;
                table.insert(id, data.as_slice())?;
                Some(entity)
            }
        };
        write_txn.commit()?;
        Ok(inserted)
    }

    /// Get a job by its job number
    pub fn get_job_by_num(&self, job_num: i64) -> Result<Option<JobEntity>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let numbers = read_txn.open_table(JOB_NUMBERS)?;

        let id = match numbers.get(job_num)? {
            Some(id) => id.value(),
            None => return Ok(None),
        };

        let table = read_txn.open_table(JOBS)?;
        match table.get(id)? {
            Some(data) => {
                let job: JobEntity = rmp_serde::from_slice(data.value())?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Set a job's status and timestamp. Returns `None` if no job has that number.
    pub fn update_job_status(
        &self,
        job_num: i64,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<JobEntity>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let updated = {
            let id = {
                let numbers = write_txn.open_table(JOB_NUMBERS)?;
                let result = numbers.get(job_num)?.map(|v| v.value());
                result
            };

            let mut table = write_txn.open_table(JOBS)?;
            let existing = match id {
                Some(id) => match table.get(id)? {
                    Some(data) => Some(rmp_serde::from_slice::<JobEntity>(data.value())?),
                    None => None,
                },
                None => None,
            };

            match existing {
                Some(mut job) => {
                    job.status = status.to_string();
                    job.date = now;
                    let data = rmp_serde::to_vec_named(&job)?;
                    table.insert(job.id, data.as_slice())?;
                    Some(job)
                }
                None => None,
            }
        };
        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a job by its job number
    pub fn delete_job_by_num(&self, job_num: i64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut numbers = write_txn.open_table(JOB_NUMBERS)?;
            let id = numbers.remove(job_num)?.map(|v| v.value());
            match id {
                Some(id) => {
                    let mut table = write_txn.open_table(JOBS)?;
                    table.remove(id)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}
