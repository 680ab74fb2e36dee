//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::cloud::CloudClients;
use crate::config::{CloudBackend, CloudConfig, Config, MediaConfig, NodeConfig};
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState backed by a temporary database and local buckets.
pub async fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("buckets");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        cloud: CloudConfig {
            backend: CloudBackend::Local,
            local_storage_path: files_dir.to_string_lossy().to_string(),
            ..CloudConfig::default()
        },
        media: MediaConfig::default(),
        test_mode: true,
        max_upload_size: 10 * 1024 * 1024, // 10MB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let cloud = CloudClients::connect(&config.cloud, &db)
        .await
        .expect("Failed to connect local cloud clients");

    Arc::new(AppState::new(config, db, cloud))
}
