use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppJson, JSend};
use crate::cloud::compute::machine_type_for;
use crate::datastore::{JobEntity, NewJob};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub email: String,
    pub job_num: i64,
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub date: String,
    pub email: String,
    pub error: bool,
    pub filename: String,
    pub job_num: i64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct MachineTypeResponse {
    pub cpus: u32,
    pub name: String,
    pub memory_mb: Option<u64>,
    pub guest_cpus: Option<u32>,
    pub description: Option<String>,
    pub zone: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_job(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateJobRequest>,
) -> Result<Json<JSend<CreateJobResponse>>, ApiError> {
    if req.email.trim().is_empty() {
        return Err(ApiError::bad_request("email must not be empty"));
    }

    let job = NewJob {
        created: req.created.unwrap_or_else(Utc::now),
        email: req.email,
        job_num: req.job_num,
        filename: req.filename,
        status: req.status,
    };

    let key = state
        .cloud
        .jobs
        .create(&job)
        .await?;

    Ok(JSend::success(CreateJobResponse {
        key: key.to_string(),
    }))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_num): Path<i64>,
) -> Result<Json<JSend<JobResponse>>, ApiError> {
    let job = state
        .cloud
        .jobs
        .find(job_num)
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(JSend::success(job_to_response(&job)))
}

pub async fn update_job(
    State(state): State<Arc<AppState>>,
    Path(job_num): Path<i64>,
    AppJson(req): AppJson<UpdateJobRequest>,
) -> Result<Json<JSend<JobResponse>>, ApiError> {
    let job = state
        .cloud
        .jobs
        .update(job_num, &req.status)
        .await?;

    Ok(JSend::success(job_to_response(&job)))
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_num): Path<i64>,
) -> Result<Json<JSend<()>>, ApiError> {
    state
        .cloud
        .jobs
        .remove(job_num)
        .await?;

    Ok(JSend::success(()))
}

/// Machine type for a worker with `cpus` vCPUs, with live details when a compute client exists.
pub async fn machine_type(
    State(state): State<Arc<AppState>>,
    Path(cpus): Path<u32>,
) -> Result<Json<JSend<MachineTypeResponse>>, ApiError> {
    let name = machine_type_for(cpus)
        .ok_or_else(|| ApiError::bad_request(format!("No machine type for {cpus} vCPUs")))?;

    let response = match state.cloud.compute {
        Some(ref compute) => {
            let details = compute
                .machine_type(cpus)
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
            MachineTypeResponse {
                cpus,
                name: details.name,
                memory_mb: Some(details.memory_mb),
                guest_cpus: Some(details.guest_cpus),
                description: details.description,
                zone: Some(compute.zone().to_string()),
            }
        }
        None => MachineTypeResponse {
            cpus,
            name: name.to_string(),
            memory_mb: None,
            guest_cpus: None,
            description: None,
            zone: None,
        },
    };

    Ok(JSend::success(response))
}

// ============================================================================
// Helpers
// ============================================================================

fn job_to_response(job: &JobEntity) -> JobResponse {
    JobResponse {
        date: job.date.to_rfc3339(),
        email: job.email.clone(),
        error: job.error,
        filename: job.filename.clone(),
        job_num: job.job_num,
        status: job.status.clone(),
    }
}
