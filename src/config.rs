use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub cloud: CloudConfig,
    pub media: MediaConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudBackend {
    Gcs,
    Local,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub backend: CloudBackend,
    pub project_id: String,
    pub zone: String,
    /// Parent key name for Job entities
    pub job_queue_name: String,
    /// General asset bucket
    pub default_bucket: String,
    /// Job-artifact bucket, also the media bucket
    pub default_job_bucket: String,
    /// Directory holding one subdirectory per bucket (local backend)
    pub local_storage_path: String,
    /// Path to a service account JSON key
    pub credentials_file: Option<String>,
    /// Service account JSON key passed inline
    pub credentials_json: Option<String>,
    /// Fetch tokens from the GCE metadata server when no key is configured
    pub use_metadata_server: bool,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Namespace prepended to every media blob path
    pub storage_location: String,
    /// Maximum stored name length for post media fields
    pub max_name_length: usize,
}

pub const DEFAULT_PROJECT_ID: &str = "cyclica-ligandexpress-46";
pub const DEFAULT_ZONE: &str = "us-central1-c";
pub const DEFAULT_JOBQUEUE_NAME: &str = "Ligand_Express";
pub const DEFAULT_BUCKET_NAME: &str = "ligex";
pub const DEFAULT_JOB_BUCKET_NAME: &str = "ligexprj";
pub const DEFAULT_STORAGE_LOCATION: &str = "science";

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            backend: CloudBackend::Local,
            project_id: DEFAULT_PROJECT_ID.to_string(),
            zone: DEFAULT_ZONE.to_string(),
            job_queue_name: DEFAULT_JOBQUEUE_NAME.to_string(),
            default_bucket: DEFAULT_BUCKET_NAME.to_string(),
            default_job_bucket: DEFAULT_JOB_BUCKET_NAME.to_string(),
            local_storage_path: "./files".to_string(),
            credentials_file: None,
            credentials_json: None,
            use_metadata_server: false,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_location: DEFAULT_STORAGE_LOCATION.to_string(),
            max_name_length: 100,
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let backend = match env_or("CLOUD_BACKEND", "local").to_lowercase().as_str() {
            "gcs" => CloudBackend::Gcs,
            "memory" => CloudBackend::Memory,
            _ => CloudBackend::Local,
        };

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let config = Config {
            node: NodeConfig {
                bind_address: env_or("BIND_ADDRESS", "0.0.0.0:8080"),
                data_dir: env_or("DATA_DIR", "./data"),
            },
            cloud: CloudConfig {
                backend,
                project_id: env_or("GOOGLE_PROJECT_ID", DEFAULT_PROJECT_ID),
                zone: env_or("GOOGLE_ZONE", DEFAULT_ZONE),
                job_queue_name: env_or("JOB_QUEUE_NAME", DEFAULT_JOBQUEUE_NAME),
                default_bucket: env_or("DEFAULT_BUCKET", DEFAULT_BUCKET_NAME),
                default_job_bucket: env_or("DEFAULT_JOB_BUCKET", DEFAULT_JOB_BUCKET_NAME),
                local_storage_path: env_or("LOCAL_STORAGE_PATH", "./files"),
                credentials_file: std::env::var("GOOGLE_CREDENTIALS_FILE").ok(),
                credentials_json: std::env::var("GOOGLE_CREDENTIALS").ok(),
                use_metadata_server: env_flag("GOOGLE_USE_METADATA"),
            },
            media: MediaConfig {
                storage_location: env_or("STORAGE_LOCATION", DEFAULT_STORAGE_LOCATION),
                ..Default::default()
            },
            test_mode: env_flag("TEST_MODE"),
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("GOOGLE_PROJECT_ID", &self.cloud.project_id),
            ("JOB_QUEUE_NAME", &self.cloud.job_queue_name),
            ("DEFAULT_BUCKET", &self.cloud.default_bucket),
            ("DEFAULT_JOB_BUCKET", &self.cloud.default_job_bucket),
            ("STORAGE_LOCATION", &self.media.storage_location),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} cannot be empty"
                )));
            }
        }

        if self.media.storage_location.contains('/') {
            return Err(ConfigError::ValidationError(
                "STORAGE_LOCATION must be a single path segment".to_string(),
            ));
        }

        if self.cloud.backend == CloudBackend::Gcs
            && self.cloud.credentials_file.is_none()
            && self.cloud.credentials_json.is_none()
            && !self.cloud.use_metadata_server
        {
            return Err(ConfigError::ValidationError(
                "GOOGLE_CREDENTIALS_FILE or GOOGLE_CREDENTIALS is required when CLOUD_BACKEND=gcs \
                 (or set GOOGLE_USE_METADATA=true)"
                    .to_string(),
            ));
        }

        if self.cloud.backend == CloudBackend::Memory && !self.test_mode {
            tracing::warn!("CLOUD_BACKEND=memory keeps all blobs and jobs in process memory");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            node: NodeConfig::default(),
            cloud: CloudConfig::default(),
            media: MediaConfig::default(),
            test_mode: true,
            max_upload_size: 1024,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_gcs_requires_credentials() {
        let mut config = base();
        config.cloud.backend = CloudBackend::Gcs;
        assert!(config.validate().is_err());

        config.cloud.credentials_json = Some("{}".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gcs_with_metadata_server() {
        let mut config = base();
        config.cloud.backend = CloudBackend::Gcs;
        config.cloud.use_metadata_server = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let mut config = base();
        config.cloud.default_job_bucket = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DEFAULT_JOB_BUCKET"));
    }

    #[test]
    fn test_nested_storage_location_rejected() {
        let mut config = base();
        config.media.storage_location = "science/team".to_string();
        assert!(config.validate().is_err());
    }
}
