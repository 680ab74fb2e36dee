use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::auth::TokenProvider;

const API_BASE: &str = "https://compute.googleapis.com/compute/v1/projects";

/// Machine type used for a pipeline worker with the given vCPU count.
pub const MACHINE_TYPES: [(u32, &str); 6] = [
    (1, "n1-standard-1"),
    (2, "n1-highcpu-2"),
    (4, "n1-highcpu-4"),
    (8, "n1-highcpu-8"),
    (16, "n1-highcpu-16"),
    (32, "n1-highcpu-32"),
];

pub fn machine_type_for(cpus: u32) -> Option<&'static str> {
    MACHINE_TYPES
        .iter()
        .find(|(n, _)| *n == cpus)
        .map(|(_, name)| *name)
}

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("No machine type for {0} vCPUs")]
    UnsupportedCpuCount(u32),
    #[error("Compute error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineType {
    pub name: String,
    pub guest_cpus: u32,
    pub memory_mb: u64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Compute Engine client scoped to one project and zone.
pub struct ComputeClient {
    tokens: Arc<TokenProvider>,
    project_id: String,
    zone: String,
}

impl ComputeClient {
    pub fn new(tokens: Arc<TokenProvider>, project_id: &str, zone: &str) -> Self {
        Self {
            tokens,
            project_id: project_id.to_string(),
            zone: zone.to_string(),
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    fn machine_type_url(&self, name: &str) -> String {
        format!(
            "{API_BASE}/{}/zones/{}/machineTypes/{name}",
            self.project_id, self.zone
        )
    }

    /// Fetch the machine type resource backing a worker with `cpus` vCPUs.
    pub async fn machine_type(&self, cpus: u32) -> Result<MachineType, ComputeError> {
        let name = machine_type_for(cpus).ok_or(ComputeError::UnsupportedCpuCount(cpus))?;
        let token = self
            .tokens
            .token()
            .await
            .map_err(|e| ComputeError::Backend(e.to_string()))?;

        let resp = self
            .tokens
            .http()
            .get(self.machine_type_url(name))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ComputeError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ComputeError::Backend(format!(
                "machine type lookup failed ({status}): {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| ComputeError::Backend(e.to_string()))
    }
}
